//! Persistence of interface and peer records.
//!
//! [`EntityStore`] is the seam the manager depends on. [`JsonStore`] keeps the
//! tables in memory and, when opened on a directory, snapshots them to
//! `wgman.json` after every write.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write as _;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;
use wgman_wireguard::PublicKey;

use crate::error::{Error, Result};
use crate::model::{Interface, InterfaceId, Peer, PeerId};

/// File name of the snapshot inside the state directory.
pub const STATE_FILE: &str = "wgman.json";

/// Record storage with the uniqueness rules of the data model.
///
/// Interface names are unique, peer addresses are unique per interface and
/// peer public keys are unique overall. Nothing else is enforced here.
pub trait EntityStore {
    /// Looks up an interface by id.
    fn interface(&self, id: InterfaceId) -> Result<Interface>;

    /// Looks up an interface by name.
    fn interface_by_name(&self, name: &str) -> Result<Option<Interface>>;

    /// All interfaces ordered by id.
    fn interfaces(&self) -> Result<Vec<Interface>>;

    /// Stores a new interface; the `id` field is ignored and assigned.
    fn insert_interface(&self, interface: Interface) -> Result<Interface>;

    /// Replaces an existing interface record.
    fn update_interface(&self, interface: &Interface) -> Result<()>;

    /// Removes an interface and all of its peers, returning the removed peers.
    fn delete_interface(&self, id: InterfaceId) -> Result<Vec<Peer>>;

    /// Looks up a peer by id.
    fn peer(&self, id: PeerId) -> Result<Peer>;

    /// Peers of one interface ordered by id.
    fn peers_of(&self, interface_id: InterfaceId) -> Result<Vec<Peer>>;

    /// The peer holding `address` on an interface.
    fn peer_by_address(&self, interface_id: InterfaceId, address: Ipv4Addr) -> Result<Option<Peer>>;

    /// Peers of one interface with the given display name.
    fn peers_by_name(&self, interface_id: InterfaceId, name: &str) -> Result<Vec<Peer>>;

    /// The peer with the given public key.
    fn peer_by_public_key(&self, public_key: &PublicKey) -> Result<Option<Peer>>;

    /// All peers ordered by id.
    fn peers(&self) -> Result<Vec<Peer>>;

    /// Stores a new peer; the `id` field is ignored and assigned.
    fn insert_peer(&self, peer: Peer) -> Result<Peer>;

    /// Replaces an existing peer record.
    fn update_peer(&self, peer: &Peer) -> Result<()>;

    /// Removes a peer, returning it.
    fn delete_peer(&self, id: PeerId) -> Result<Peer>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Tables {
    next_interface_id: InterfaceId,
    next_peer_id: PeerId,
    interfaces: BTreeMap<InterfaceId, Interface>,
    peers: BTreeMap<PeerId, Peer>,
}

impl Tables {
    fn check_interface_name(&self, interface: &Interface) -> Result<()> {
        if self
            .interfaces
            .values()
            .any(|i| i.name == interface.name && i.id != interface.id)
        {
            return Err(Error::Conflict(format!(
                "interface name {} already in use",
                interface.name
            )));
        }
        Ok(())
    }

    fn check_peer(&self, peer: &Peer) -> Result<()> {
        for other in self.peers.values().filter(|p| p.id != peer.id) {
            if other.interface_id == peer.interface_id && other.address == peer.address {
                return Err(Error::Conflict(format!(
                    "address {} already assigned to peer {}",
                    peer.address, other.id
                )));
            }
            if other.public_key == peer.public_key {
                return Err(Error::Conflict(format!(
                    "public key already used by peer {}",
                    other.id
                )));
            }
        }
        Ok(())
    }
}

/// In-memory tables with an optional JSON snapshot on disk.
#[derive(Debug)]
pub struct JsonStore {
    tables: RwLock<Tables>,
    path: Option<PathBuf>,
}

impl JsonStore {
    /// Creates a store that never touches the filesystem.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            path: None,
        }
    }

    /// Opens the store in `state_dir`, loading an existing snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the directory cannot be created or the
    /// snapshot cannot be parsed.
    pub fn open(state_dir: &Path) -> Result<Self> {
        fs::create_dir_all(state_dir).map_err(|e| {
            Error::Storage(format!("cannot create {}: {e}", state_dir.display()))
        })?;
        let path = state_dir.join(STATE_FILE);
        let tables = if path.exists() {
            let raw = fs::read_to_string(&path)
                .map_err(|e| Error::Storage(format!("cannot read {}: {e}", path.display())))?;
            serde_json::from_str(&raw)
                .map_err(|e| Error::Storage(format!("cannot parse {}: {e}", path.display())))?
        } else {
            Tables::default()
        };
        debug!(
            path = %path.display(),
            interfaces = tables.interfaces.len(),
            peers = tables.peers.len(),
            "opened entity store"
        );
        Ok(Self {
            tables: RwLock::new(tables),
            path: Some(path),
        })
    }

    /// Snapshot location, `None` for an in-memory store.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn save(&self, tables: &Tables) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(tables)
            .map_err(|e| Error::Storage(format!("cannot serialize state: {e}")))?;
        let tmp = path.with_extension("json.tmp");
        let write = || -> std::io::Result<()> {
            let mut options = fs::OpenOptions::new();
            options.write(true).create(true).truncate(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(0o600);
            }
            let mut file = options.open(&tmp)?;
            // A leftover temp file keeps its old mode.
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                file.set_permissions(fs::Permissions::from_mode(0o600))?;
            }
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp, path)
        };
        write().map_err(|e| Error::Storage(format!("cannot write {}: {e}", path.display())))
    }

    /// Applies `f` to a copy of the tables, persists it, then commits.
    fn mutate<R>(&self, f: impl FnOnce(&mut Tables) -> Result<R>) -> Result<R> {
        let mut guard = self.tables.write();
        let mut next = guard.clone();
        let out = f(&mut next)?;
        self.save(&next)?;
        *guard = next;
        Ok(out)
    }
}

impl Default for JsonStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl EntityStore for JsonStore {
    fn interface(&self, id: InterfaceId) -> Result<Interface> {
        self.tables
            .read()
            .interfaces
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::interface_not_found(id))
    }

    fn interface_by_name(&self, name: &str) -> Result<Option<Interface>> {
        Ok(self
            .tables
            .read()
            .interfaces
            .values()
            .find(|i| i.name == name)
            .cloned())
    }

    fn interfaces(&self) -> Result<Vec<Interface>> {
        Ok(self.tables.read().interfaces.values().cloned().collect())
    }

    fn insert_interface(&self, mut interface: Interface) -> Result<Interface> {
        self.mutate(|t| {
            interface.id = t.next_interface_id + 1;
            t.check_interface_name(&interface)?;
            t.next_interface_id = interface.id;
            t.interfaces.insert(interface.id, interface.clone());
            debug!(interface = %interface.name, id = interface.id, "inserted interface");
            Ok(interface)
        })
    }

    fn update_interface(&self, interface: &Interface) -> Result<()> {
        self.mutate(|t| {
            if !t.interfaces.contains_key(&interface.id) {
                return Err(Error::interface_not_found(interface.id));
            }
            t.check_interface_name(interface)?;
            t.interfaces.insert(interface.id, interface.clone());
            Ok(())
        })
    }

    fn delete_interface(&self, id: InterfaceId) -> Result<Vec<Peer>> {
        self.mutate(|t| {
            t.interfaces
                .remove(&id)
                .ok_or_else(|| Error::interface_not_found(id))?;
            let (removed, kept): (BTreeMap<_, _>, BTreeMap<_, _>) = std::mem::take(&mut t.peers)
                .into_iter()
                .partition(|(_, p)| p.interface_id == id);
            t.peers = kept;
            debug!(id, peers = removed.len(), "deleted interface");
            Ok(removed.into_values().collect())
        })
    }

    fn peer(&self, id: PeerId) -> Result<Peer> {
        self.tables
            .read()
            .peers
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::peer_not_found(id))
    }

    fn peers_of(&self, interface_id: InterfaceId) -> Result<Vec<Peer>> {
        Ok(self
            .tables
            .read()
            .peers
            .values()
            .filter(|p| p.interface_id == interface_id)
            .cloned()
            .collect())
    }

    fn peer_by_address(&self, interface_id: InterfaceId, address: Ipv4Addr) -> Result<Option<Peer>> {
        Ok(self
            .tables
            .read()
            .peers
            .values()
            .find(|p| p.interface_id == interface_id && p.address == address)
            .cloned())
    }

    fn peers_by_name(&self, interface_id: InterfaceId, name: &str) -> Result<Vec<Peer>> {
        Ok(self
            .tables
            .read()
            .peers
            .values()
            .filter(|p| p.interface_id == interface_id && p.name == name)
            .cloned()
            .collect())
    }

    fn peer_by_public_key(&self, public_key: &PublicKey) -> Result<Option<Peer>> {
        Ok(self
            .tables
            .read()
            .peers
            .values()
            .find(|p| &p.public_key == public_key)
            .cloned())
    }

    fn peers(&self) -> Result<Vec<Peer>> {
        Ok(self.tables.read().peers.values().cloned().collect())
    }

    fn insert_peer(&self, mut peer: Peer) -> Result<Peer> {
        self.mutate(|t| {
            if !t.interfaces.contains_key(&peer.interface_id) {
                return Err(Error::interface_not_found(peer.interface_id));
            }
            peer.id = t.next_peer_id + 1;
            t.check_peer(&peer)?;
            t.next_peer_id = peer.id;
            t.peers.insert(peer.id, peer.clone());
            debug!(peer = peer.id, interface_id = peer.interface_id, "inserted peer");
            Ok(peer)
        })
    }

    fn update_peer(&self, peer: &Peer) -> Result<()> {
        self.mutate(|t| {
            let current = t.peers.get(&peer.id).ok_or_else(|| Error::peer_not_found(peer.id))?;
            if current.interface_id != peer.interface_id {
                return Err(Error::Validation("a peer cannot move between interfaces".to_string()));
            }
            t.check_peer(peer)?;
            t.peers.insert(peer.id, peer.clone());
            Ok(())
        })
    }

    fn delete_peer(&self, id: PeerId) -> Result<Peer> {
        self.mutate(|t| t.peers.remove(&id).ok_or_else(|| Error::peer_not_found(id)))
    }
}
