//! Interface/peer reconciliation engine for `WireGuard`.
//!
//! Stored interfaces and peers are the desired state. The [`WgManager`] keeps
//! `wg-quick` configuration files and the live tunnel stack in line with them,
//! resolves per-peer overrides against interface defaults, allocates peer
//! addresses, and merges live link statistics into read models.

pub mod allocator;
pub mod builder;
pub mod cache;
pub mod error;
pub mod locks;
pub mod manager;
pub mod model;
pub mod resolve;
pub mod stats;
pub mod store;
pub mod sync;

#[cfg(test)]
mod testutil;

pub use error::{Error, Result};
pub use manager::{ManagerConfig, SyncOutcome, ViewOptions, WgManager, DEFAULT_CONFIG_DIR};
pub use model::{
    Interface, InterfaceDefaults, InterfaceId, InterfaceUpdate, NewInterface, NewPeer, Peer,
    PeerId, PeerStats, PeerUpdate, PeerView, Setting,
};
pub use resolve::EffectiveSettings;
pub use store::{EntityStore, JsonStore};
pub use sync::{SyncReport, SyncState};
