//! One shared instance per entity id, plus a keyed statistics overlay.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Result;
use crate::model::{Interface, InterfaceId, Peer, PeerId, PeerStats};

/// Identity map for interfaces and peers.
///
/// Repeated lookups of the same id return the same `Arc` until the entry is
/// replaced by an update or removed by a delete. Live statistics are kept
/// beside the records, never inside them.
#[derive(Debug, Default)]
pub struct IdentityCache {
    interfaces: RwLock<HashMap<InterfaceId, Arc<Interface>>>,
    peers: RwLock<HashMap<PeerId, Arc<Peer>>>,
    stats: RwLock<HashMap<PeerId, PeerStats>>,
}

impl IdentityCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached interface, or the one produced by `load` on a miss.
    pub fn interface(
        &self,
        id: InterfaceId,
        load: impl FnOnce() -> Result<Interface>,
    ) -> Result<Arc<Interface>> {
        if let Some(hit) = self.interfaces.read().get(&id) {
            return Ok(Arc::clone(hit));
        }
        let loaded = load()?;
        Ok(Arc::clone(
            self.interfaces
                .write()
                .entry(id)
                .or_insert_with(|| Arc::new(loaded)),
        ))
    }

    /// Replaces the cached interface.
    pub fn put_interface(&self, interface: Interface) -> Arc<Interface> {
        let shared = Arc::new(interface);
        self.interfaces.write().insert(shared.id, Arc::clone(&shared));
        shared
    }

    /// Drops an interface.
    pub fn remove_interface(&self, id: InterfaceId) {
        self.interfaces.write().remove(&id);
    }

    /// The cached peer, or the one produced by `load` on a miss.
    pub fn peer(&self, id: PeerId, load: impl FnOnce() -> Result<Peer>) -> Result<Arc<Peer>> {
        if let Some(hit) = self.peers.read().get(&id) {
            return Ok(Arc::clone(hit));
        }
        let loaded = load()?;
        Ok(Arc::clone(
            self.peers.write().entry(id).or_insert_with(|| Arc::new(loaded)),
        ))
    }

    /// Replaces the cached peer.
    pub fn put_peer(&self, peer: Peer) -> Arc<Peer> {
        let shared = Arc::new(peer);
        self.peers.write().insert(shared.id, Arc::clone(&shared));
        shared
    }

    /// Drops a peer and its statistics.
    pub fn remove_peer(&self, id: PeerId) {
        self.peers.write().remove(&id);
        self.stats.write().remove(&id);
    }

    /// Last merged statistics for a peer; empty when unknown.
    #[must_use]
    pub fn stats(&self, id: PeerId) -> PeerStats {
        self.stats.read().get(&id).copied().unwrap_or_default()
    }

    /// Records statistics; empty statistics clear the entry.
    pub fn set_stats(&self, id: PeerId, stats: PeerStats) {
        let mut overlay = self.stats.write();
        if stats == PeerStats::default() {
            overlay.remove(&id);
        } else {
            overlay.insert(id, stats);
        }
    }

    /// Number of cached interfaces and peers.
    #[must_use]
    pub fn counts(&self) -> (usize, usize) {
        (self.interfaces.read().len(), self.peers.read().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::testutil::{interface, peer};

    #[test]
    fn repeated_lookup_returns_same_instance() {
        let cache = IdentityCache::new();
        let a = cache
            .interface(1, || Ok(interface(1, "gray", "10.20.30.1/24")))
            .expect("load");
        let b = cache
            .interface(1, || Err(Error::interface_not_found(1)))
            .expect("hit");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn put_replaces_entry() {
        let cache = IdentityCache::new();
        let old = cache.put_peer(peer(1, 1, "10.20.30.2"));
        let mut updated = (*old).clone();
        updated.name = "renamed".into();
        cache.put_peer(updated);
        let now = cache.peer(1, || Err(Error::peer_not_found(1))).expect("hit");
        assert_eq!(now.name, "renamed");
        assert!(!Arc::ptr_eq(&old, &now));
    }

    #[test]
    fn miss_propagates_loader_error() {
        let cache = IdentityCache::new();
        assert!(cache.peer(9, || Err(Error::peer_not_found(9))).is_err());
        assert_eq!(cache.counts(), (0, 0));
    }

    #[test]
    fn stats_overlay_is_shared_and_cleared() {
        let cache = IdentityCache::new();
        let stats = PeerStats {
            latest_handshake: Some(5),
            transfer_rx: Some(1),
            transfer_tx: Some(2),
        };
        cache.set_stats(3, stats);
        assert_eq!(cache.stats(3), stats);
        cache.set_stats(3, PeerStats::default());
        assert_eq!(cache.stats(3), PeerStats::default());
    }

    #[test]
    fn remove_peer_drops_stats() {
        let cache = IdentityCache::new();
        cache.put_peer(peer(3, 1, "10.20.30.2"));
        cache.set_stats(3, PeerStats { transfer_rx: Some(1), ..PeerStats::default() });
        cache.remove_peer(3);
        assert_eq!(cache.stats(3), PeerStats::default());
        assert_eq!(cache.counts(), (0, 0));
    }
}
