//! Output formatting for CLI commands.
//!
//! Supports table (human-readable) and JSON output formats.

use std::fmt::Display;
use std::io::Write;
use std::net::Ipv4Addr;

use chrono::DateTime;
use ipnet::{IpNet, Ipv4Net};
use serde::Serialize;
use wgman_core::{Interface, PeerView, Setting, SyncState};

use crate::cli::Format;
use crate::error::CliError;

/// Output formatter that handles both table and JSON output.
#[derive(Debug, Clone, Default)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Check if JSON format is selected.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, Format::Json)
    }

    /// Write a serializable value to the output.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)
                    .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
                writeln!(writer)?;
            }
            Format::Table => value.write_table(writer)?,
        }
        Ok(())
    }

    /// Write a value to a string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_string<T>(&self, value: &T) -> Result<String, CliError>
    where
        T: Serialize + TableDisplay,
    {
        let mut buf = Vec::new();
        self.write(&mut buf, value)?;
        String::from_utf8(buf).map_err(|e| CliError::Format(format!("UTF-8 error: {e}")))
    }
}

/// Trait for types that can be displayed as a table.
pub trait TableDisplay {
    /// Write the value as human-readable text.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

// ============ Interfaces ============

/// Interface summary for listing.
#[derive(Debug, Clone, Serialize)]
pub struct InterfaceRow {
    /// Interface id.
    pub id: i64,
    /// Interface name.
    pub name: String,
    /// Address with prefix.
    pub local_ip: Ipv4Net,
    /// Listen port.
    pub port: u16,
    /// Desired state.
    pub enabled: bool,
    /// Live state; unknown when the tool could not be queried.
    pub running: Option<bool>,
    /// Number of peers.
    pub peers: usize,
}

/// Interfaces for display.
#[derive(Debug, Clone, Serialize)]
pub struct InterfaceList {
    /// All interfaces.
    pub interfaces: Vec<InterfaceRow>,
}

impl TableDisplay for InterfaceList {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.interfaces.is_empty() {
            writeln!(writer, "No interfaces")?;
            return Ok(());
        }

        writeln!(
            writer,
            "{:>4}  {:<15}  {:<18}  {:>5}  {:<8}  {:<8}  {:>5}",
            "ID", "NAME", "ADDRESS", "PORT", "ENABLED", "RUNNING", "PEERS"
        )?;
        writeln!(writer, "{}", "─".repeat(75))?;

        for row in &self.interfaces {
            writeln!(
                writer,
                "{:>4}  {:<15}  {:<18}  {:>5}  {:<8}  {:<8}  {:>5}",
                row.id,
                row.name,
                row.local_ip.to_string(),
                row.port,
                yes_no(row.enabled),
                row.running.map_or("?", yes_no),
                row.peers
            )?;
        }

        writeln!(writer)?;
        writeln!(writer, "Total: {} interface(s)", self.interfaces.len())?;
        Ok(())
    }
}

/// Detailed interface information. Never includes the private key.
#[derive(Debug, Clone, Serialize)]
pub struct InterfaceDetail {
    /// Interface id.
    pub id: i64,
    /// Interface name.
    pub name: String,
    /// Address with prefix.
    pub local_ip: Ipv4Net,
    /// Public hostname.
    pub public_hostname: String,
    /// Listen port.
    pub port: u16,
    /// Public key.
    pub public_key: String,
    /// Client DNS default.
    pub default_dns: String,
    /// Client allowed IPs default.
    pub default_allowed_ips: Vec<IpNet>,
    /// Client keepalive default.
    pub default_persistent_keepalive: u16,
    /// Hooks in `PreUp`, `PostUp`, `PreDown`, `PostDown` order.
    pub hooks: [String; 4],
    /// Desired state.
    pub enabled: bool,
    /// Live state.
    pub running: Option<bool>,
    /// Whether the file matches the stored state.
    pub file_state: String,
    /// Number of peers.
    pub peers: usize,
}

impl InterfaceDetail {
    /// Builds the detail view of an interface.
    #[must_use]
    pub fn new(
        interface: &Interface,
        running: Option<bool>,
        state: SyncState,
        peers: usize,
    ) -> Self {
        Self {
            id: interface.id,
            name: interface.name.clone(),
            local_ip: interface.local_ip,
            public_hostname: interface.public_hostname.clone(),
            port: interface.port,
            public_key: interface.public_key.to_base64(),
            default_dns: interface.default_dns.clone(),
            default_allowed_ips: interface.default_allowed_ips.clone(),
            default_persistent_keepalive: interface.default_persistent_keepalive,
            hooks: [
                interface.pre_up.clone(),
                interface.post_up.clone(),
                interface.pre_down.clone(),
                interface.post_down.clone(),
            ],
            enabled: interface.enabled,
            running,
            file_state: match state {
                SyncState::Materialized => "written".to_string(),
                SyncState::Stale => "stale".to_string(),
            },
            peers,
        }
    }
}

impl TableDisplay for InterfaceDetail {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Interface: {}", self.name)?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "ID:               {}", self.id)?;
        writeln!(writer, "Address:          {}", self.local_ip)?;
        writeln!(writer, "Endpoint:         {}:{}", self.public_hostname, self.port)?;
        writeln!(writer, "Public Key:       {}", self.public_key)?;
        writeln!(writer, "Enabled:          {}", yes_no(self.enabled))?;
        writeln!(writer, "Running:          {}", self.running.map_or("?", yes_no))?;
        writeln!(writer, "File:             {}", self.file_state)?;
        writeln!(writer, "Peers:            {}", self.peers)?;
        writeln!(writer)?;
        writeln!(writer, "Client Defaults")?;
        writeln!(writer, "  DNS:            {}", or_dash(&self.default_dns))?;
        writeln!(writer, "  Allowed IPs:    {}", list(&self.default_allowed_ips))?;
        writeln!(writer, "  Keepalive:      {}", keepalive(self.default_persistent_keepalive))?;

        let labels = ["PreUp", "PostUp", "PreDown", "PostDown"];
        if self.hooks.iter().any(|h| !h.is_empty()) {
            writeln!(writer)?;
            writeln!(writer, "Hooks")?;
            for (label, hook) in labels.iter().zip(&self.hooks) {
                if !hook.is_empty() {
                    writeln!(writer, "  {label:<14}  {hook}")?;
                }
            }
        }
        Ok(())
    }
}

// ============ Peers ============

/// A peer as printed. Never includes key material other than the public key.
#[derive(Debug, Clone, Serialize)]
pub struct PeerInfo {
    /// Peer id.
    pub id: i64,
    /// Owning interface id.
    pub interface_id: i64,
    /// Display name.
    pub name: String,
    /// Host address.
    pub address: Ipv4Addr,
    /// Public key.
    pub public_key: String,
    /// Server-side allowed IPs.
    pub allowed_ips: Setting<Vec<IpNet>>,
    /// Client-side allowed IPs.
    pub remote_allowed_ips: Setting<Vec<IpNet>>,
    /// Client DNS.
    pub remote_dns: Setting<String>,
    /// Client keepalive.
    pub remote_persistent_keepalive: Setting<u16>,
    /// Unix time of the latest handshake.
    pub latest_handshake: Option<u64>,
    /// Bytes received.
    pub transfer_rx: Option<u64>,
    /// Bytes sent.
    pub transfer_tx: Option<u64>,
}

impl From<PeerView> for PeerInfo {
    fn from(view: PeerView) -> Self {
        let peer = view.peer;
        Self {
            id: peer.id,
            interface_id: peer.interface_id,
            name: peer.name,
            address: peer.address,
            public_key: peer.public_key.to_base64(),
            allowed_ips: peer.allowed_ips,
            remote_allowed_ips: peer.remote_allowed_ips,
            remote_dns: peer.remote_dns,
            remote_persistent_keepalive: peer.remote_persistent_keepalive,
            latest_handshake: view.latest_handshake,
            transfer_rx: view.transfer_rx,
            transfer_tx: view.transfer_tx,
        }
    }
}

impl TableDisplay for PeerInfo {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Peer: {} ({})", self.id, or_dash(&self.name))?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Interface ID:     {}", self.interface_id)?;
        writeln!(writer, "Address:          {}", self.address)?;
        writeln!(writer, "Public Key:       {}", self.public_key)?;
        writeln!(writer, "Allowed IPs:      {}", setting(&self.allowed_ips, |v| list(v)))?;
        writeln!(writer)?;
        writeln!(writer, "Client")?;
        writeln!(
            writer,
            "  Allowed IPs:    {}",
            setting(&self.remote_allowed_ips, |v| list(v))
        )?;
        writeln!(writer, "  DNS:            {}", setting(&self.remote_dns, |v| or_dash(v).to_string()))?;
        writeln!(
            writer,
            "  Keepalive:      {}",
            setting(&self.remote_persistent_keepalive, |v| keepalive(*v))
        )?;
        writeln!(writer)?;
        writeln!(writer, "Statistics")?;
        writeln!(writer, "  Handshake:      {}", handshake(self.latest_handshake))?;
        writeln!(writer, "  Received:       {}", bytes(self.transfer_rx))?;
        writeln!(writer, "  Sent:           {}", bytes(self.transfer_tx))?;
        Ok(())
    }
}

/// Peers of one interface for display.
#[derive(Debug, Clone, Serialize)]
pub struct PeerList {
    /// Interface name.
    pub interface: String,
    /// Peers ordered by id.
    pub peers: Vec<PeerInfo>,
}

impl TableDisplay for PeerList {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.peers.is_empty() {
            writeln!(writer, "No peers on {}", self.interface)?;
            return Ok(());
        }

        writeln!(
            writer,
            "{:>4}  {:<16}  {:<15}  {:<12}  {:<20}  {:>10}  {:>10}",
            "ID", "NAME", "ADDRESS", "PUBLIC KEY", "HANDSHAKE", "RX", "TX"
        )?;
        writeln!(writer, "{}", "─".repeat(98))?;

        for peer in &self.peers {
            writeln!(
                writer,
                "{:>4}  {:<16}  {:<15}  {:<12}  {:<20}  {:>10}  {:>10}",
                peer.id,
                truncate(&peer.name, 16),
                peer.address.to_string(),
                truncate(&peer.public_key, 12),
                handshake(peer.latest_handshake),
                bytes(peer.transfer_rx),
                bytes(peer.transfer_tx)
            )?;
        }

        writeln!(writer)?;
        writeln!(writer, "Total: {} peer(s) on {}", self.peers.len(), self.interface)?;
        Ok(())
    }
}

/// A client configuration file.
#[derive(Debug, Clone, Serialize)]
pub struct ClientConfig {
    /// Peer id.
    pub peer: i64,
    /// File contents.
    pub config: String,
}

impl TableDisplay for ClientConfig {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        write!(writer, "{}", self.config)?;
        Ok(())
    }
}

/// The next free address of an interface.
#[derive(Debug, Clone, Serialize)]
pub struct NextAddress {
    /// Interface name.
    pub interface: String,
    /// Address.
    pub address: Ipv4Addr,
}

impl TableDisplay for NextAddress {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "{}", self.address)?;
        Ok(())
    }
}

// ============ Sync ============

/// Outcome of syncing one interface.
#[derive(Debug, Clone, Serialize)]
pub struct SyncRow {
    /// Interface name.
    pub interface: String,
    /// Whether the sync succeeded.
    pub ok: bool,
    /// Whether the interface was brought up.
    pub brought_up: bool,
    /// Failure message.
    pub error: Option<String>,
}

/// Outcome of `wgman sync`.
#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    /// One row per interface.
    pub results: Vec<SyncRow>,
}

impl SyncSummary {
    /// Number of failed interfaces.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.results.iter().filter(|r| !r.ok).count()
    }
}

impl TableDisplay for SyncSummary {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.results.is_empty() {
            writeln!(writer, "No interfaces")?;
            return Ok(());
        }
        for row in &self.results {
            match &row.error {
                None if row.brought_up => writeln!(writer, "✓ {} synced and up", row.interface)?,
                None => writeln!(writer, "✓ {} synced", row.interface)?,
                Some(e) => writeln!(writer, "✗ {}: {e}", row.interface)?,
            }
        }
        Ok(())
    }
}

// ============ Messages ============

/// Simple status message.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    /// Message text.
    pub message: String,
    /// Whether this is a success message.
    pub success: bool,
}

impl Message {
    /// Create a success message.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            success: true,
        }
    }

    /// Create an info message.
    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            success: false,
        }
    }
}

impl TableDisplay for Message {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.success {
            writeln!(writer, "✓ {}", self.message)?;
        } else {
            writeln!(writer, "{}", self.message)?;
        }
        Ok(())
    }
}

// ============ Helpers ============

/// Truncate a string to a maximum length, adding "..." if truncated.
#[must_use]
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{head}...")
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() { "-" } else { value }
}

fn list<T: Display>(items: &[T]) -> String {
    if items.is_empty() {
        return "-".to_string();
    }
    items.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

fn keepalive(secs: u16) -> String {
    if secs == 0 { "off".to_string() } else { format!("{secs}s") }
}

fn setting<T>(value: &Setting<T>, show: impl Fn(&T) -> String) -> String {
    match value {
        Setting::Override(v) => show(v),
        Setting::Inherit => "(inherit)".to_string(),
    }
}

fn handshake(at: Option<u64>) -> String {
    at.and_then(|secs| i64::try_from(secs).ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map_or_else(|| "never".to_string(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string())
}

fn bytes(value: Option<u64>) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let Some(mut n) = value else {
        return "-".to_string();
    };
    let mut unit = 0;
    let mut rem = 0;
    while n >= 1024 && unit < UNITS.len() - 1 {
        rem = n % 1024;
        n /= 1024;
        unit += 1;
    }
    if unit == 0 {
        format!("{n} B")
    } else {
        format!("{n}.{} {}", rem * 10 / 1024, UNITS[unit])
    }
}
