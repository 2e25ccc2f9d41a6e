//! Parsing of `wg show <name> dump` and `wg show interfaces` output.
//!
//! The dump is tab separated. The first line describes the interface
//! (`private-key public-key listen-port fwmark`), every further line one peer
//! (`public-key preshared-key endpoint allowed-ips latest-handshake
//! transfer-rx transfer-tx persistent-keepalive`). Absent values are written as
//! `(none)` or `off`.

use crate::error::{Result, WireGuardError};
use crate::keys::{PresharedKey, PrivateKey, PublicKey};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Live state of one interface as reported by `wg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDump {
    /// Interface private key.
    pub private_key: Option<PrivateKey>,
    /// Interface public key.
    pub public_key: Option<PublicKey>,
    /// Listen port, `0` when unset.
    pub listen_port: u16,
    /// Firewall mark.
    pub fwmark: Option<u32>,
    /// Peers currently configured on the interface.
    pub peers: Vec<PeerDump>,
}

impl InterfaceDump {
    /// An interface with no peers and no keys.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            private_key: None,
            public_key: None,
            listen_port: 0,
            fwmark: None,
            peers: Vec::new(),
        }
    }

    /// Finds a peer by public key.
    #[must_use]
    pub fn peer(&self, public_key: &PublicKey) -> Option<&PeerDump> {
        self.peers.iter().find(|p| &p.public_key == public_key)
    }
}

/// Live counters for one peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerDump {
    /// Peer public key.
    pub public_key: PublicKey,
    /// Preshared key, if configured.
    pub preshared_key: Option<PresharedKey>,
    /// Last seen remote endpoint (`host:port`).
    pub endpoint: Option<String>,
    /// Allowed IP ranges in CIDR notation.
    pub allowed_ips: Vec<String>,
    /// Unix timestamp of the latest handshake, `None` if there never was one.
    pub latest_handshake: Option<u64>,
    /// Bytes received.
    pub transfer_rx: u64,
    /// Bytes sent.
    pub transfer_tx: u64,
    /// Persistent keepalive interval in seconds.
    pub persistent_keepalive: Option<u16>,
}

impl PeerDump {
    /// A peer that has never talked to us.
    #[must_use]
    pub fn idle(public_key: PublicKey) -> Self {
        Self {
            public_key,
            preshared_key: None,
            endpoint: None,
            allowed_ips: Vec::new(),
            latest_handshake: None,
            transfer_rx: 0,
            transfer_tx: 0,
            persistent_keepalive: None,
        }
    }
}

fn absent(field: &str) -> bool {
    matches!(field, "" | "(none)" | "off")
}

fn invalid(line: usize, message: impl Into<String>) -> WireGuardError {
    WireGuardError::InvalidDump {
        line,
        message: message.into(),
    }
}

fn optional<T: FromStr>(line: usize, name: &str, field: &str) -> Result<Option<T>> {
    if absent(field) {
        return Ok(None);
    }
    field
        .parse()
        .map(Some)
        .map_err(|_| invalid(line, format!("bad {name}: {field:?}")))
}

fn number<T: FromStr>(line: usize, name: &str, field: &str) -> Result<T> {
    field
        .parse()
        .map_err(|_| invalid(line, format!("bad {name}: {field:?}")))
}

fn key<T>(line: usize, name: &str, field: &str, parse: fn(&str) -> Result<T>) -> Result<Option<T>> {
    if absent(field) {
        return Ok(None);
    }
    parse(field)
        .map(Some)
        .map_err(|e| invalid(line, format!("bad {name}: {e}")))
}

fn parse_peer(line: usize, text: &str) -> Result<PeerDump> {
    let fields: Vec<&str> = text.split('\t').collect();
    if fields.len() != 8 {
        return Err(invalid(
            line,
            format!("expected 8 peer fields, got {}", fields.len()),
        ));
    }

    let public_key = key(line, "public key", fields[0], PublicKey::from_base64)?
        .ok_or_else(|| invalid(line, "peer without public key"))?;
    let handshake: u64 = number(line, "latest handshake", fields[4])?;

    Ok(PeerDump {
        public_key,
        preshared_key: key(line, "preshared key", fields[1], PresharedKey::from_base64)?,
        endpoint: (!absent(fields[2])).then(|| fields[2].to_string()),
        allowed_ips: if absent(fields[3]) {
            Vec::new()
        } else {
            fields[3].split(',').map(|s| s.trim().to_string()).collect()
        },
        latest_handshake: (handshake != 0).then_some(handshake),
        transfer_rx: number(line, "transfer rx", fields[5])?,
        transfer_tx: number(line, "transfer tx", fields[6])?,
        persistent_keepalive: optional(line, "persistent keepalive", fields[7])?,
    })
}

/// Parses the output of `wg show <name> dump`.
///
/// # Errors
///
/// Returns [`WireGuardError::InvalidDump`] on empty output or malformed lines.
pub fn parse_dump(output: &str) -> Result<InterfaceDump> {
    let mut lines = output
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty());

    let (_, header) = lines
        .next()
        .ok_or_else(|| invalid(1, "empty dump output"))?;
    let fields: Vec<&str> = header.split('\t').collect();
    if fields.len() != 4 {
        return Err(invalid(
            1,
            format!("expected 4 interface fields, got {}", fields.len()),
        ));
    }

    let mut dump = InterfaceDump {
        private_key: key(1, "private key", fields[0], PrivateKey::from_base64)?,
        public_key: key(1, "public key", fields[1], PublicKey::from_base64)?,
        listen_port: number(1, "listen port", fields[2])?,
        fwmark: optional(1, "fwmark", fields[3])?,
        peers: Vec::new(),
    };

    for (idx, text) in lines {
        dump.peers.push(parse_peer(idx + 1, text)?);
    }

    Ok(dump)
}

/// Parses the output of `wg show interfaces`: whitespace separated names.
#[must_use]
pub fn parse_interface_list(output: &str) -> Vec<String> {
    output.split_whitespace().map(str::to_string).collect()
}

/// Renders a dump in the same format `wg` produces.
#[must_use]
pub fn render_dump(dump: &InterfaceDump) -> String {
    let mut out = format!(
        "{}\t{}\t{}\t{}\n",
        dump.private_key
            .as_ref()
            .map_or_else(|| "(none)".to_string(), PrivateKey::to_base64),
        dump.public_key
            .as_ref()
            .map_or_else(|| "(none)".to_string(), PublicKey::to_base64),
        dump.listen_port,
        dump.fwmark.map_or_else(|| "off".to_string(), |m| m.to_string()),
    );
    for peer in &dump.peers {
        out.push_str(&format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\n",
            peer.public_key,
            peer.preshared_key
                .as_ref()
                .map_or_else(|| "(none)".to_string(), PresharedKey::to_base64),
            peer.endpoint.as_deref().unwrap_or("(none)"),
            if peer.allowed_ips.is_empty() {
                "(none)".to_string()
            } else {
                peer.allowed_ips.join(",")
            },
            peer.latest_handshake.unwrap_or(0),
            peer.transfer_rx,
            peer.transfer_tx,
            peer.persistent_keepalive
                .map_or_else(|| "off".to_string(), |k| k.to_string()),
        ));
    }
    out
}
