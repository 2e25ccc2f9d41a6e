//! Record fixtures for unit tests.

use wgman_wireguard::{KeyPair, PresharedKey};

use crate::model::{Interface, InterfaceDefaults, InterfaceId, Peer, PeerId, Setting};

pub(crate) fn interface(id: InterfaceId, name: &str, local_ip: &str) -> Interface {
    let defaults = InterfaceDefaults::default();
    let (private_key, public_key) = KeyPair::generate().into_parts();
    Interface {
        id,
        name: name.to_string(),
        local_ip: local_ip.parse().expect("valid local ip"),
        public_hostname: "vpn.example.com".to_string(),
        port: defaults.port,
        public_key,
        private_key,
        pre_up: String::new(),
        post_up: String::new(),
        pre_down: String::new(),
        post_down: String::new(),
        default_dns: defaults.dns,
        default_allowed_ips: defaults.allowed_ips,
        default_persistent_keepalive: defaults.persistent_keepalive,
        enabled: false,
    }
}

pub(crate) fn peer(id: PeerId, interface_id: InterfaceId, address: &str) -> Peer {
    let (private_key, public_key) = KeyPair::generate().into_parts();
    Peer {
        id,
        interface_id,
        name: format!("peer-{id}"),
        public_key,
        private_key,
        preshared_key: PresharedKey::generate(),
        address: address.parse().expect("valid address"),
        allowed_ips: Setting::Inherit,
        remote_allowed_ips: Setting::Inherit,
        remote_dns: Setting::Inherit,
        remote_persistent_keepalive: Setting::Inherit,
    }
}
