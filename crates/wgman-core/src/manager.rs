//! The manager: every interface and peer operation, wired to the store, the
//! control utility and the synchronizer.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use wgman_wireguard::ControlUtility;

use crate::allocator::allocate;
use crate::builder::client_config;
use crate::cache::IdentityCache;
use crate::error::{Error, Result};
use crate::locks::LockTable;
use crate::model::{
    validate_interface_name, validate_peer_address, Interface, InterfaceDefaults, InterfaceId,
    InterfaceUpdate, NewInterface, NewPeer, Peer, PeerId, PeerUpdate, PeerView,
};
use crate::resolve::fill_defaults;
use crate::stats;
use crate::store::EntityStore;
use crate::sync::{SyncReport, SyncState, Synchronizer};

/// Default directory for `wg-quick` configuration files.
pub const DEFAULT_CONFIG_DIR: &str = "/etc/wireguard";

/// Settings the manager needs beyond its collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Where `<name>.conf` files are written.
    pub config_dir: PathBuf,
    /// Values used for fields a creation request leaves unset.
    pub defaults: InterfaceDefaults,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from(DEFAULT_CONFIG_DIR),
            defaults: InterfaceDefaults::default(),
        }
    }
}

/// Switches for peer read models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewOptions {
    /// Write resolved defaults into the returned peer.
    pub fill_defaults: bool,
    /// Query live statistics before answering.
    pub fill_stats: bool,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            fill_defaults: true,
            fill_stats: true,
        }
    }
}

/// Result of syncing one interface during [`WgManager::sync_all`].
#[derive(Debug)]
pub struct SyncOutcome {
    /// Interface name.
    pub interface: String,
    /// What happened.
    pub result: Result<SyncReport>,
}

/// The reconciliation engine.
///
/// Every mutation takes the interface's lock, writes the store and then runs a
/// full sync of that interface. Reads take no lock.
pub struct WgManager<C, S> {
    control: C,
    store: S,
    sync: Synchronizer,
    cache: IdentityCache,
    locks: LockTable,
    defaults: InterfaceDefaults,
}

impl<C, S> WgManager<C, S>
where
    C: ControlUtility,
    S: EntityStore,
{
    /// Creates a manager over the given collaborators.
    pub fn new(control: C, store: S, config: ManagerConfig) -> Self {
        Self {
            control,
            store,
            sync: Synchronizer::new(config.config_dir),
            cache: IdentityCache::new(),
            locks: LockTable::new(),
            defaults: config.defaults,
        }
    }

    /// The control utility adapter.
    pub fn control(&self) -> &C {
        &self.control
    }

    /// The entity store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The synchronizer.
    pub fn synchronizer(&self) -> &Synchronizer {
        &self.sync
    }

    /// The identity cache.
    pub fn cache(&self) -> &IdentityCache {
        &self.cache
    }

    // ============ Interface Management ============

    /// Creates an interface with fresh keys and syncs it.
    ///
    /// The record is kept even if the sync fails.
    pub async fn create_interface(&self, new: NewInterface) -> Result<Arc<Interface>> {
        let _creation = self.locks.creation().await;
        let d = &self.defaults;
        let name = new.name.unwrap_or_else(|| d.name.clone());
        validate_interface_name(&name)?;
        if self.store.interface_by_name(&name)?.is_some() {
            return Err(Error::Conflict(format!("interface name {name} already in use")));
        }

        let (private_key, public_key) = self.control.generate_keypair().await?.into_parts();
        let candidate = Interface {
            id: 0,
            name,
            local_ip: new.local_ip.unwrap_or(d.local_ip),
            public_hostname: new
                .public_hostname
                .unwrap_or_else(|| d.public_hostname.clone()),
            port: new.port.unwrap_or(d.port),
            public_key,
            private_key,
            pre_up: new.pre_up.unwrap_or_default(),
            post_up: new.post_up.unwrap_or_default(),
            pre_down: new.pre_down.unwrap_or_default(),
            post_down: new.post_down.unwrap_or_default(),
            default_dns: new.default_dns.unwrap_or_else(|| d.dns.clone()),
            default_allowed_ips: new
                .default_allowed_ips
                .unwrap_or_else(|| d.allowed_ips.clone()),
            default_persistent_keepalive: new
                .default_persistent_keepalive
                .unwrap_or(d.persistent_keepalive),
            enabled: new.enabled.unwrap_or(d.enabled),
        };
        candidate.validate()?;

        let interface = self.store.insert_interface(candidate)?;
        info!(interface = %interface.name, id = interface.id, "interface created");
        let shared = self.cache.put_interface(interface);

        let _guard = self.locks.lock(shared.id).await;
        self.resync(&shared).await?;
        Ok(shared)
    }

    /// Looks up an interface by id.
    pub fn interface(&self, id: InterfaceId) -> Result<Arc<Interface>> {
        self.cache.interface(id, || self.store.interface(id))
    }

    /// Looks up an interface by name.
    pub fn interface_by_name(&self, name: &str) -> Result<Arc<Interface>> {
        let found = self
            .store
            .interface_by_name(name)?
            .ok_or_else(|| Error::interface_not_found(name))?;
        self.cache.interface(found.id, || Ok(found))
    }

    /// All interfaces ordered by id.
    pub fn interfaces(&self) -> Result<Vec<Arc<Interface>>> {
        self.store
            .interfaces()?
            .into_iter()
            .map(|i| self.cache.interface(i.id, || Ok(i)))
            .collect()
    }

    /// Applies an update and syncs the interface.
    pub async fn update_interface(
        &self,
        id: InterfaceId,
        update: InterfaceUpdate,
    ) -> Result<Arc<Interface>> {
        let _guard = self.locks.lock(id).await;
        let current = self.store.interface(id)?;
        let next = update.apply(&current);
        next.validate()?;
        self.store.update_interface(&next)?;
        info!(interface = %next.name, enabled = next.enabled, "interface updated");
        let shared = self.cache.put_interface(next);
        self.resync(&shared).await?;
        Ok(shared)
    }

    /// Marks an interface enabled and brings it up.
    pub async fn up_interface(&self, id: InterfaceId) -> Result<Arc<Interface>> {
        self.update_interface(
            id,
            InterfaceUpdate {
                enabled: Some(true),
                ..InterfaceUpdate::default()
            },
        )
        .await
    }

    /// Marks an interface disabled and brings it down.
    pub async fn down_interface(&self, id: InterfaceId) -> Result<Arc<Interface>> {
        self.update_interface(
            id,
            InterfaceUpdate {
                enabled: Some(false),
                ..InterfaceUpdate::default()
            },
        )
        .await
    }

    /// Brings a live interface down, then removes it, its peers and its file.
    ///
    /// If the tear-down fails nothing is removed.
    pub async fn delete_interface(&self, id: InterfaceId) -> Result<()> {
        let guard = self.locks.lock(id).await;
        let interface = self.store.interface(id)?;

        self.sync.remove(&self.control, &interface).await?;
        let removed = self.store.delete_interface(id)?;
        for peer in &removed {
            self.cache.remove_peer(peer.id);
        }
        self.cache.remove_interface(id);
        self.sync.discard(&interface).await?;

        drop(guard);
        self.locks.forget(id);
        info!(interface = %interface.name, peers = removed.len(), "interface deleted");
        Ok(())
    }

    /// Rewrites one interface's file and restarts it as needed.
    pub async fn sync_interface(&self, id: InterfaceId) -> Result<SyncReport> {
        let _guard = self.locks.lock(id).await;
        let interface = self.interface(id)?;
        self.resync(&interface).await
    }

    /// Syncs every interface, continuing past failures.
    pub async fn sync_all(&self) -> Result<Vec<SyncOutcome>> {
        let mut outcomes = Vec::new();
        for interface in self.store.interfaces()? {
            let result = self.sync_interface(interface.id).await;
            outcomes.push(SyncOutcome {
                interface: interface.name,
                result,
            });
        }
        Ok(outcomes)
    }

    /// Whether the file of an interface reflects its stored state.
    pub fn sync_state(&self, id: InterfaceId) -> Result<SyncState> {
        self.interface(id)?;
        Ok(self.sync.state(id))
    }

    /// Whether the interface is currently live.
    pub async fn is_running(&self, id: InterfaceId) -> Result<bool> {
        let interface = self.interface(id)?;
        Ok(self.control.is_running(&interface.name).await?)
    }

    async fn resync(&self, interface: &Interface) -> Result<SyncReport> {
        self.sync.mark_stale(interface.id);
        let peers = self.store.peers_of(interface.id)?;
        self.sync.sync(&self.control, interface, &peers).await
    }

    // ============ Peer Management ============

    /// Creates a peer with fresh keys and syncs its interface.
    ///
    /// Without an address the lowest free host is used. A requested address
    /// that is already taken fails with [`Error::Conflict`] before anything is
    /// written.
    pub async fn create_peer(&self, interface_id: InterfaceId, new: NewPeer) -> Result<Arc<Peer>> {
        let _guard = self.locks.lock(interface_id).await;
        let interface = self.store.interface(interface_id)?;

        let address = match new.address {
            Some(address) => {
                validate_peer_address(address, interface.local_ip)?;
                if let Some(holder) = self.store.peer_by_address(interface_id, address)? {
                    return Err(Error::Conflict(format!(
                        "address {address} already assigned to peer {}",
                        holder.id
                    )));
                }
                address
            }
            None => self.next_address(&interface)?,
        };

        let (private_key, public_key) = self.control.generate_keypair().await?.into_parts();
        let preshared_key = self.control.generate_preshared().await?;
        let candidate = Peer {
            id: 0,
            interface_id,
            name: new.name,
            public_key,
            private_key,
            preshared_key,
            address,
            allowed_ips: new.allowed_ips,
            remote_allowed_ips: new.remote_allowed_ips,
            remote_dns: new.remote_dns,
            remote_persistent_keepalive: new.remote_persistent_keepalive,
        };
        candidate.validate(&interface)?;

        let peer = self.store.insert_peer(candidate)?;
        info!(interface = %interface.name, peer = peer.id, address = %peer.address, "peer created");
        let shared = self.cache.put_peer(peer);
        self.resync(&interface).await?;
        Ok(shared)
    }

    /// Looks up a peer by id.
    pub fn peer(&self, id: PeerId) -> Result<Arc<Peer>> {
        self.cache.peer(id, || self.store.peer(id))
    }

    /// Peers of an interface ordered by id.
    pub fn peers_of(&self, interface_id: InterfaceId) -> Result<Vec<Arc<Peer>>> {
        self.interface(interface_id)?;
        self.store
            .peers_of(interface_id)?
            .into_iter()
            .map(|p| self.cache.peer(p.id, || Ok(p)))
            .collect()
    }

    /// Applies an update and syncs the peer's interface.
    pub async fn update_peer(&self, id: PeerId, update: PeerUpdate) -> Result<Arc<Peer>> {
        let interface_id = self.store.peer(id)?.interface_id;
        let _guard = self.locks.lock(interface_id).await;
        let interface = self.store.interface(interface_id)?;
        let current = self.store.peer(id)?;

        let next = update.apply(&current);
        next.validate(&interface)?;
        self.store.update_peer(&next)?;
        info!(interface = %interface.name, peer = id, "peer updated");
        let shared = self.cache.put_peer(next);
        self.resync(&interface).await?;
        Ok(shared)
    }

    /// Removes a peer and syncs its interface.
    pub async fn delete_peer(&self, id: PeerId) -> Result<()> {
        let interface_id = self.store.peer(id)?.interface_id;
        let _guard = self.locks.lock(interface_id).await;
        let interface = self.store.interface(interface_id)?;

        self.store.delete_peer(id)?;
        self.cache.remove_peer(id);
        info!(interface = %interface.name, peer = id, "peer deleted");
        self.resync(&interface).await?;
        Ok(())
    }

    /// The address the next peer of an interface would get.
    pub fn allocate_address(&self, interface_id: InterfaceId) -> Result<Ipv4Addr> {
        let interface = self.store.interface(interface_id)?;
        self.next_address(&interface)
    }

    fn next_address(&self, interface: &Interface) -> Result<Ipv4Addr> {
        let mut used: HashSet<Ipv4Addr> = self
            .store
            .peers_of(interface.id)?
            .iter()
            .map(|p| p.address)
            .collect();
        used.insert(interface.address());
        let address = allocate(interface.subnet(), &used)?;
        debug!(interface = %interface.name, %address, "allocated address");
        Ok(address)
    }

    // ============ Views ============

    /// The configuration file a client imports to connect as this peer.
    pub fn peer_config(&self, id: PeerId) -> Result<String> {
        let peer = self.peer(id)?;
        let interface = self.interface(peer.interface_id)?;
        Ok(client_config(&peer, &interface).render())
    }

    /// The peer with inherited values filled in.
    pub fn resolved_peer(&self, id: PeerId) -> Result<Peer> {
        let peer = self.peer(id)?;
        let interface = self.interface(peer.interface_id)?;
        Ok(fill_defaults(&peer, &interface))
    }

    /// All peers of an interface with inherited values filled in.
    pub fn resolved_peers(&self, interface_id: InterfaceId) -> Result<Vec<Peer>> {
        let interface = self.interface(interface_id)?;
        Ok(self
            .peers_of(interface_id)?
            .iter()
            .map(|p| fill_defaults(p, &interface))
            .collect())
    }

    /// One peer as returned to callers.
    pub async fn peer_view(&self, id: PeerId, options: ViewOptions) -> Result<PeerView> {
        let peer = self.peer(id)?;
        let interface = self.interface(peer.interface_id)?;
        let mut views = self.views(&interface, vec![peer], options).await?;
        views.pop().ok_or_else(|| Error::peer_not_found(id))
    }

    /// All peers of an interface as returned to callers.
    pub async fn peer_views(
        &self,
        interface_id: InterfaceId,
        options: ViewOptions,
    ) -> Result<Vec<PeerView>> {
        let interface = self.interface(interface_id)?;
        let peers = self.peers_of(interface_id)?;
        self.views(&interface, peers, options).await
    }

    async fn views(
        &self,
        interface: &Interface,
        peers: Vec<Arc<Peer>>,
        options: ViewOptions,
    ) -> Result<Vec<PeerView>> {
        if options.fill_stats {
            let owned: Vec<Peer> = peers.iter().map(|p| Peer::clone(p)).collect();
            let merged =
                stats::collect(&self.control, std::slice::from_ref(interface), &owned).await?;
            for (id, s) in merged {
                self.cache.set_stats(id, s);
            }
        }
        Ok(peers
            .iter()
            .map(|peer| {
                let record = if options.fill_defaults {
                    fill_defaults(peer, interface)
                } else {
                    Peer::clone(peer)
                };
                PeerView::new(record, self.cache.stats(peer.id))
            })
            .collect())
    }
}
