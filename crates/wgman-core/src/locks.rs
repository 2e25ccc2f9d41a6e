//! Per-interface mutation locks.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};

use crate::model::InterfaceId;

/// Serializes mutations of the same interface; creations share one lock.
#[derive(Debug, Default)]
pub struct LockTable {
    interfaces: parking_lot::Mutex<HashMap<InterfaceId, Arc<Mutex<()>>>>,
    creation: Mutex<()>,
}

impl LockTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to an interface.
    pub async fn lock(&self, id: InterfaceId) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(self.interfaces.lock().entry(id).or_default());
        lock.lock_owned().await
    }

    /// Waits for the global creation lock.
    pub async fn creation(&self) -> MutexGuard<'_, ()> {
        self.creation.lock().await
    }

    /// Drops the lock entry of a deleted interface.
    pub fn forget(&self, id: InterfaceId) {
        self.interfaces.lock().remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_interface_is_exclusive() {
        let table = LockTable::new();
        let guard = table.lock(1).await;
        let second = tokio::time::timeout(Duration::from_millis(50), table.lock(1)).await;
        assert!(second.is_err());
        drop(guard);
        let third = tokio::time::timeout(Duration::from_millis(50), table.lock(1)).await;
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn different_interfaces_do_not_block() {
        let table = LockTable::new();
        let _a = table.lock(1).await;
        let b = tokio::time::timeout(Duration::from_millis(50), table.lock(2)).await;
        assert!(b.is_ok());
    }
}
