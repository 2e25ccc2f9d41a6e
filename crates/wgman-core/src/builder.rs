//! Server and client configuration files in `wg-quick` format.
//!
//! Output depends only on the records passed in; peers are ordered by id so
//! the same state always renders to the same bytes.

use wgman_wireguard::{join_list, ConfigBlock, ConfigDocument};

use crate::model::{Interface, Peer};
use crate::resolve::effective;

/// Builds the interface's own configuration file with one `[Peer]` per peer.
#[must_use]
pub fn server_config(interface: &Interface, peers: &[Peer]) -> ConfigDocument {
    let head = ConfigBlock::new("Interface")
        .with("Address", interface.local_ip)
        .with("ListenPort", interface.port)
        .with("PrivateKey", interface.private_key.to_base64())
        .with("PreUp", &interface.pre_up)
        .with("PostUp", &interface.post_up)
        .with("PreDown", &interface.pre_down)
        .with("PostDown", &interface.post_down);

    let mut ordered: Vec<&Peer> = peers.iter().collect();
    ordered.sort_by_key(|p| p.id);

    ordered
        .into_iter()
        .fold(ConfigDocument::new().with_block(head), |doc, peer| {
            let allowed = effective(peer, interface).allowed_ips;
            doc.with_block(
                ConfigBlock::new("Peer")
                    .with("PublicKey", peer.public_key)
                    .with("PresharedKey", peer.preshared_key.to_base64())
                    .with("AllowedIPs", join_list(&allowed)),
            )
        })
}

/// Builds the file a client imports to connect as `peer`.
#[must_use]
pub fn client_config(peer: &Peer, interface: &Interface) -> ConfigDocument {
    let resolved = effective(peer, interface);

    let head = ConfigBlock::new("Interface")
        .with("Address", peer.host_range())
        .with("DNS", &resolved.remote_dns)
        .with("PrivateKey", peer.private_key.to_base64());

    let server = ConfigBlock::new("Peer")
        .with("PublicKey", interface.public_key)
        .with("PresharedKey", peer.preshared_key.to_base64())
        .with(
            "Endpoint",
            format!("{}:{}", interface.public_hostname, interface.port),
        )
        .with("AllowedIPs", join_list(&resolved.remote_allowed_ips))
        .with("PersistentKeepalive", resolved.remote_persistent_keepalive);

    ConfigDocument::new().with_block(head).with_block(server)
}
