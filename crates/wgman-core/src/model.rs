//! Interface and peer records, their creation/update requests, and the
//! read models returned to callers.

use std::net::{Ipv4Addr, Ipv6Addr};

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use wgman_wireguard::{PresharedKey, PrivateKey, PublicKey};

use crate::error::{Error, Result};

/// Store-assigned interface id.
pub type InterfaceId = i64;

/// Store-assigned peer id.
pub type PeerId = i64;

/// Longest interface name the kernel accepts (`IFNAMSIZ - 1`).
pub const MAX_INTERFACE_NAME_LEN: usize = 15;

/// Characters that would corrupt a `wg-quick` file line.
const FORBIDDEN_CHARS: &[char] = &['\0', '\n', '\r'];

/// Values that count as "not set" when read from storage or requests.
pub trait Unset {
    /// Returns true for the empty value of the type.
    fn is_unset(&self) -> bool;
}

impl Unset for String {
    fn is_unset(&self) -> bool {
        self.trim().is_empty()
    }
}

impl<T> Unset for Vec<T> {
    fn is_unset(&self) -> bool {
        self.is_empty()
    }
}

impl Unset for u16 {
    fn is_unset(&self) -> bool {
        *self == 0
    }
}

/// A per-peer value that either overrides the interface default or inherits it.
///
/// Serialized as the plain value, or `null` for [`Setting::Inherit`]. On input,
/// `null`, an empty string, an empty list and `0` all mean inherit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Setting<T> {
    /// Use this value.
    Override(T),
    /// Use the interface default.
    Inherit,
}

impl<T> Default for Setting<T> {
    fn default() -> Self {
        Self::Inherit
    }
}

impl<T> Setting<T> {
    /// The override, if any.
    #[must_use]
    pub fn as_override(&self) -> Option<&T> {
        match self {
            Self::Override(v) => Some(v),
            Self::Inherit => None,
        }
    }

    /// True when the interface default applies.
    #[must_use]
    pub fn is_inherit(&self) -> bool {
        matches!(self, Self::Inherit)
    }

    /// The override, or `default` when inheriting.
    #[must_use]
    pub fn resolve_or(&self, default: &T) -> T
    where
        T: Clone,
    {
        self.as_override().unwrap_or(default).clone()
    }
}

impl<T: Unset> Setting<T> {
    /// Wraps an optional value, treating unset values as inherit.
    #[must_use]
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(v) if !v.is_unset() => Self::Override(v),
            _ => Self::Inherit,
        }
    }

    /// Wraps a value, treating an unset value as inherit.
    #[must_use]
    pub fn from_value(value: T) -> Self {
        Self::from_option(Some(value))
    }
}

impl<T: Serialize> Serialize for Setting<T> {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.as_override().serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for Setting<T>
where
    T: Deserialize<'de> + Unset,
{
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Self::from_option)
    }
}

/// One local tunnel endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    /// Store-assigned id.
    pub id: InterfaceId,
    /// Kernel interface name, also the config file stem.
    pub name: String,
    /// Own address with prefix; its network is the peer subnet.
    pub local_ip: Ipv4Net,
    /// Hostname clients use to reach this interface.
    pub public_hostname: String,
    /// UDP listen port.
    pub port: u16,
    /// Interface public key.
    pub public_key: PublicKey,
    /// Interface private key.
    pub private_key: PrivateKey,
    /// `PreUp` hook, empty when absent.
    #[serde(default)]
    pub pre_up: String,
    /// `PostUp` hook, empty when absent.
    #[serde(default)]
    pub post_up: String,
    /// `PreDown` hook, empty when absent.
    #[serde(default)]
    pub pre_down: String,
    /// `PostDown` hook, empty when absent.
    #[serde(default)]
    pub post_down: String,
    /// DNS server handed to clients that do not override it.
    pub default_dns: String,
    /// Client-side allowed IPs for peers that do not override them.
    pub default_allowed_ips: Vec<IpNet>,
    /// Client keepalive for peers that do not override it, `0` for none.
    pub default_persistent_keepalive: u16,
    /// Desired running state.
    pub enabled: bool,
}

impl Interface {
    /// The subnet peers are addressed from.
    #[must_use]
    pub fn subnet(&self) -> Ipv4Net {
        self.local_ip.trunc()
    }

    /// The interface's own address.
    #[must_use]
    pub fn address(&self) -> Ipv4Addr {
        self.local_ip.addr()
    }
}

/// One remote endpoint attached to an interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    /// Store-assigned id.
    pub id: PeerId,
    /// Owning interface.
    pub interface_id: InterfaceId,
    /// Display name, not unique.
    pub name: String,
    /// Peer public key.
    pub public_key: PublicKey,
    /// Peer private key, handed to the client in its config file.
    pub private_key: PrivateKey,
    /// Symmetric key shared between interface and peer.
    pub preshared_key: PresharedKey,
    /// Host address inside the interface subnet.
    pub address: Ipv4Addr,
    /// Server-side allowed IPs; inherit means the peer's own `/32`.
    #[serde(default)]
    pub allowed_ips: Setting<Vec<IpNet>>,
    /// Client-side allowed IPs.
    #[serde(default)]
    pub remote_allowed_ips: Setting<Vec<IpNet>>,
    /// Client-side DNS.
    #[serde(default)]
    pub remote_dns: Setting<String>,
    /// Client-side keepalive in seconds.
    #[serde(default)]
    pub remote_persistent_keepalive: Setting<u16>,
}

impl Peer {
    /// The peer's own address as a `/32` range.
    #[must_use]
    pub fn host_range(&self) -> IpNet {
        IpNet::V4(Ipv4Net::new_assert(self.address, 32))
    }
}

/// Interface creation defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceDefaults {
    /// Interface name.
    pub name: String,
    /// Own address with prefix.
    pub local_ip: Ipv4Net,
    /// Public hostname.
    pub public_hostname: String,
    /// Listen port.
    pub port: u16,
    /// Client DNS.
    pub dns: String,
    /// Client allowed IPs.
    pub allowed_ips: Vec<IpNet>,
    /// Client keepalive.
    pub persistent_keepalive: u16,
    /// Whether a new interface is brought up immediately.
    pub enabled: bool,
}

impl Default for InterfaceDefaults {
    fn default() -> Self {
        Self {
            name: "wg0".to_string(),
            local_ip: Ipv4Net::new_assert(Ipv4Addr::new(10, 20, 0, 1), 24),
            public_hostname: "localhost".to_string(),
            port: 51820,
            dns: "1.1.1.1".to_string(),
            allowed_ips: vec![
                IpNet::V4(Ipv4Net::new_assert(Ipv4Addr::UNSPECIFIED, 0)),
                IpNet::V6(Ipv6Net::new_assert(Ipv6Addr::UNSPECIFIED, 0)),
            ],
            persistent_keepalive: 25,
            enabled: false,
        }
    }
}

/// Request to create an interface. Unset fields take the configured defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewInterface {
    /// Interface name.
    pub name: Option<String>,
    /// Own address with prefix.
    pub local_ip: Option<Ipv4Net>,
    /// Public hostname.
    pub public_hostname: Option<String>,
    /// Listen port.
    pub port: Option<u16>,
    /// `PreUp` hook.
    pub pre_up: Option<String>,
    /// `PostUp` hook.
    pub post_up: Option<String>,
    /// `PreDown` hook.
    pub pre_down: Option<String>,
    /// `PostDown` hook.
    pub post_down: Option<String>,
    /// Default client DNS.
    pub default_dns: Option<String>,
    /// Default client allowed IPs.
    pub default_allowed_ips: Option<Vec<IpNet>>,
    /// Default client keepalive.
    pub default_persistent_keepalive: Option<u16>,
    /// Desired running state.
    pub enabled: Option<bool>,
}

/// Changes to an existing interface. `None` leaves a field as it is.
///
/// Name, address and keys are fixed at creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceUpdate {
    /// Public hostname.
    pub public_hostname: Option<String>,
    /// Listen port.
    pub port: Option<u16>,
    /// `PreUp` hook, empty string clears it.
    pub pre_up: Option<String>,
    /// `PostUp` hook, empty string clears it.
    pub post_up: Option<String>,
    /// `PreDown` hook, empty string clears it.
    pub pre_down: Option<String>,
    /// `PostDown` hook, empty string clears it.
    pub post_down: Option<String>,
    /// Default client DNS.
    pub default_dns: Option<String>,
    /// Default client allowed IPs.
    pub default_allowed_ips: Option<Vec<IpNet>>,
    /// Default client keepalive.
    pub default_persistent_keepalive: Option<u16>,
    /// Desired running state.
    pub enabled: Option<bool>,
}

impl InterfaceUpdate {
    /// Applies the update to a copy of `interface`.
    #[must_use]
    pub fn apply(&self, interface: &Interface) -> Interface {
        let mut next = interface.clone();
        if let Some(v) = &self.public_hostname {
            next.public_hostname.clone_from(v);
        }
        if let Some(v) = self.port {
            next.port = v;
        }
        if let Some(v) = &self.pre_up {
            next.pre_up.clone_from(v);
        }
        if let Some(v) = &self.post_up {
            next.post_up.clone_from(v);
        }
        if let Some(v) = &self.pre_down {
            next.pre_down.clone_from(v);
        }
        if let Some(v) = &self.post_down {
            next.post_down.clone_from(v);
        }
        if let Some(v) = &self.default_dns {
            next.default_dns.clone_from(v);
        }
        if let Some(v) = &self.default_allowed_ips {
            next.default_allowed_ips.clone_from(v);
        }
        if let Some(v) = self.default_persistent_keepalive {
            next.default_persistent_keepalive = v;
        }
        if let Some(v) = self.enabled {
            next.enabled = v;
        }
        next
    }
}

/// Request to create a peer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewPeer {
    /// Display name.
    pub name: String,
    /// Requested address; the lowest free host when `None`.
    pub address: Option<Ipv4Addr>,
    /// Server-side allowed IPs.
    pub allowed_ips: Setting<Vec<IpNet>>,
    /// Client-side allowed IPs.
    pub remote_allowed_ips: Setting<Vec<IpNet>>,
    /// Client-side DNS.
    pub remote_dns: Setting<String>,
    /// Client-side keepalive.
    pub remote_persistent_keepalive: Setting<u16>,
}

impl NewPeer {
    /// A peer request with only a name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Changes to an existing peer. `None` leaves a field as it is;
/// `Some(Setting::Inherit)` drops an override.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerUpdate {
    /// Display name.
    pub name: Option<String>,
    /// New address inside the interface subnet.
    pub address: Option<Ipv4Addr>,
    /// Server-side allowed IPs.
    pub allowed_ips: Option<Setting<Vec<IpNet>>>,
    /// Client-side allowed IPs.
    pub remote_allowed_ips: Option<Setting<Vec<IpNet>>>,
    /// Client-side DNS.
    pub remote_dns: Option<Setting<String>>,
    /// Client-side keepalive.
    pub remote_persistent_keepalive: Option<Setting<u16>>,
}

impl PeerUpdate {
    /// Applies the update to a copy of `peer`.
    #[must_use]
    pub fn apply(&self, peer: &Peer) -> Peer {
        let mut next = peer.clone();
        if let Some(v) = &self.name {
            next.name.clone_from(v);
        }
        if let Some(v) = self.address {
            next.address = v;
        }
        if let Some(v) = &self.allowed_ips {
            next.allowed_ips = v.clone();
        }
        if let Some(v) = &self.remote_allowed_ips {
            next.remote_allowed_ips = v.clone();
        }
        if let Some(v) = &self.remote_dns {
            next.remote_dns = v.clone();
        }
        if let Some(v) = &self.remote_persistent_keepalive {
            next.remote_persistent_keepalive = v.clone();
        }
        next
    }
}

/// Live link statistics for one peer. Never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerStats {
    /// Unix timestamp of the latest handshake.
    pub latest_handshake: Option<u64>,
    /// Bytes received from the peer.
    pub transfer_rx: Option<u64>,
    /// Bytes sent to the peer.
    pub transfer_tx: Option<u64>,
}

/// A peer together with its live statistics, as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerView {
    /// The peer record, possibly with defaults filled in.
    #[serde(flatten)]
    pub peer: Peer,
    /// Unix timestamp of the latest handshake.
    pub latest_handshake: Option<u64>,
    /// Bytes received from the peer.
    pub transfer_rx: Option<u64>,
    /// Bytes sent to the peer.
    pub transfer_tx: Option<u64>,
}

impl PeerView {
    /// Combines a peer with its statistics.
    #[must_use]
    pub fn new(peer: Peer, stats: PeerStats) -> Self {
        Self {
            peer,
            latest_handshake: stats.latest_handshake,
            transfer_rx: stats.transfer_rx,
            transfer_tx: stats.transfer_tx,
        }
    }

    /// The statistics part.
    #[must_use]
    pub fn stats(&self) -> PeerStats {
        PeerStats {
            latest_handshake: self.latest_handshake,
            transfer_rx: self.transfer_rx,
            transfer_tx: self.transfer_tx,
        }
    }
}

/// Checks that `name` is usable as a kernel interface name and file stem.
///
/// # Errors
///
/// Returns [`Error::Validation`] for empty, overlong or oddly spelled names.
pub fn validate_interface_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_INTERFACE_NAME_LEN {
        return Err(Error::Validation(format!(
            "interface name must be 1-{MAX_INTERFACE_NAME_LEN} characters, got {name:?}"
        )));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '=' | '+' | '.' | '-')))
    {
        return Err(Error::Validation(format!(
            "interface name {name:?} contains invalid character {c:?}"
        )));
    }
    if name == "." || name == ".." {
        return Err(Error::Validation(format!("interface name {name:?} is reserved")));
    }
    Ok(())
}

/// Checks that a free-text value can be written verbatim into a config line.
///
/// # Errors
///
/// Returns [`Error::Validation`] if the value contains a newline or NUL.
pub fn validate_text(field: &str, value: &str) -> Result<()> {
    if let Some(c) = value.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
        return Err(Error::Validation(format!(
            "{field} contains forbidden character {c:?}"
        )));
    }
    Ok(())
}

/// Checks that `address` is a usable host of the interface subnet other than
/// the interface's own address.
///
/// # Errors
///
/// Returns [`Error::Validation`] otherwise.
pub fn validate_peer_address(address: Ipv4Addr, local_ip: Ipv4Net) -> Result<()> {
    let subnet = local_ip.trunc();
    if !subnet.contains(&address) {
        return Err(Error::Validation(format!(
            "address {address} is outside {subnet}"
        )));
    }
    if subnet.prefix_len() < 31 && (address == subnet.network() || address == subnet.broadcast()) {
        return Err(Error::Validation(format!(
            "address {address} is not a usable host of {subnet}"
        )));
    }
    if address == local_ip.addr() {
        return Err(Error::Validation(format!(
            "address {address} belongs to the interface"
        )));
    }
    Ok(())
}

impl Interface {
    /// Validates every user-supplied field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for the first offending field.
    pub fn validate(&self) -> Result<()> {
        validate_interface_name(&self.name)?;
        validate_text("public_hostname", &self.public_hostname)?;
        validate_text("pre_up", &self.pre_up)?;
        validate_text("post_up", &self.post_up)?;
        validate_text("pre_down", &self.pre_down)?;
        validate_text("post_down", &self.post_down)?;
        validate_text("default_dns", &self.default_dns)?;
        if self.port == 0 {
            return Err(Error::Validation("port must not be 0".to_string()));
        }
        Ok(())
    }
}

impl Peer {
    /// Validates the peer against the interface it belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for the first offending field.
    pub fn validate(&self, interface: &Interface) -> Result<()> {
        validate_text("name", &self.name)?;
        if let Some(dns) = self.remote_dns.as_override() {
            validate_text("remote_dns", dns)?;
        }
        validate_peer_address(self.address, interface.local_ip)
    }
}
