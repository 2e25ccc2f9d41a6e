//! Live per-peer statistics, merged by public key.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;
use wgman_wireguard::ControlUtility;

use crate::error::{Error, Result};
use crate::model::{Interface, InterfaceId, Peer, PeerId, PeerStats};

/// Queries live counters for `peers`.
///
/// Issues one `list_running` call and one dump per live interface owning any
/// of the peers. Peers of interfaces that are not live, and peers missing from
/// a dump, get empty statistics.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if a peer's interface is not in `interfaces`
/// and [`Error::ExternalToolFailure`] if a query fails.
pub async fn collect<C: ControlUtility>(
    control: &C,
    interfaces: &[Interface],
    peers: &[Peer],
) -> Result<HashMap<PeerId, PeerStats>> {
    let by_id: HashMap<InterfaceId, &Interface> = interfaces.iter().map(|i| (i.id, i)).collect();

    let mut groups: BTreeMap<InterfaceId, Vec<&Peer>> = BTreeMap::new();
    for peer in peers {
        groups.entry(peer.interface_id).or_default().push(peer);
    }
    for id in groups.keys() {
        if !by_id.contains_key(id) {
            return Err(Error::interface_not_found(*id));
        }
    }

    let mut out: HashMap<PeerId, PeerStats> =
        peers.iter().map(|p| (p.id, PeerStats::default())).collect();
    if groups.is_empty() {
        return Ok(out);
    }

    let running: HashSet<String> = control.list_running().await?.into_iter().collect();

    for (interface_id, members) in groups {
        let Some(interface) = by_id.get(&interface_id) else {
            continue;
        };
        if !running.contains(&interface.name) {
            debug!(interface = %interface.name, "not running, skipping dump");
            continue;
        }
        let dump = control.dump(&interface.name).await?;
        for peer in members {
            if let Some(live) = dump.peer(&peer.public_key) {
                out.insert(
                    peer.id,
                    PeerStats {
                        latest_handshake: live.latest_handshake,
                        transfer_rx: Some(live.transfer_rx),
                        transfer_tx: Some(live.transfer_tx),
                    },
                );
            }
        }
    }

    Ok(out)
}
