//! Reconciliation of stored interface state with the live tunnel stack.
//!
//! A sync queries liveness, tears the interface down if it is live, rewrites
//! the configuration file wholesale and brings the interface back up when it
//! is enabled.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use wgman_wireguard::ControlUtility;

use crate::builder::server_config;
use crate::error::{Error, Result};
use crate::model::{Interface, InterfaceId, Peer};

/// Whether the file on disk reflects the latest stored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// A mutation happened since the file was last written.
    Stale,
    /// The file was written from the latest stored state.
    Materialized,
}

/// Outcome of a successful sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Whether the interface was live before the sync.
    pub was_running: bool,
    /// The configuration file that was written.
    pub path: PathBuf,
    /// Whether the interface was brought up.
    pub brought_up: bool,
}

/// Writes configuration files and drives `wg-quick` around them.
#[derive(Debug)]
pub struct Synchronizer {
    config_dir: PathBuf,
    states: Mutex<HashMap<InterfaceId, SyncState>>,
}

impl Synchronizer {
    /// Creates a synchronizer writing into `config_dir`.
    #[must_use]
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Directory holding the `<name>.conf` files.
    #[must_use]
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Location of the configuration file for `name`.
    #[must_use]
    pub fn config_path(&self, name: &str) -> PathBuf {
        self.config_dir.join(format!("{name}.conf"))
    }

    /// Current state of an interface; unknown interfaces are stale.
    #[must_use]
    pub fn state(&self, id: InterfaceId) -> SyncState {
        self.states
            .lock()
            .get(&id)
            .copied()
            .unwrap_or(SyncState::Stale)
    }

    /// Records that stored state changed.
    pub fn mark_stale(&self, id: InterfaceId) {
        self.states.lock().insert(id, SyncState::Stale);
    }

    fn forget(&self, id: InterfaceId) {
        self.states.lock().remove(&id);
    }

    /// Reconciles one interface with its peers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExternalToolFailure`] if the liveness query, tear-down
    /// or bring-up fails, and [`Error::Io`] if the file cannot be written.
    pub async fn sync<C: ControlUtility>(
        &self,
        control: &C,
        interface: &Interface,
        peers: &[Peer],
    ) -> Result<SyncReport> {
        let name = interface.name.as_str();
        self.mark_stale(interface.id);

        let path = self.config_path(name);
        let was_running = control.is_running(name).await?;
        let down_failure = if was_running {
            debug!(interface = %name, "tearing down before rewrite");
            control.down(name, &path).await.err()
        } else {
            None
        };

        let text = server_config(interface, peers).render();
        self.write_config(&path, &text).await?;
        self.states.lock().insert(interface.id, SyncState::Materialized);
        debug!(interface = %name, path = %path.display(), peers = peers.len(), "wrote configuration");

        if let Some(e) = down_failure {
            warn!(
                interface = %name,
                error = %e,
                "tear-down failed; live interface still runs the previous configuration"
            );
            return Err(Error::ExternalToolFailure(e));
        }

        let mut brought_up = false;
        if interface.enabled {
            if let Err(e) = control.up(name, &path).await {
                warn!(
                    interface = %name,
                    error = %e,
                    "bring-up failed; interface is enabled but down"
                );
                return Err(Error::ExternalToolFailure(e));
            }
            brought_up = true;
        }

        info!(interface = %name, was_running, brought_up, "interface synced");
        Ok(SyncReport {
            was_running,
            path,
            brought_up,
        })
    }

    /// Brings a live interface down and removes its configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExternalToolFailure`] if the interface is live and
    /// cannot be torn down; the file is kept in that case.
    pub async fn remove<C: ControlUtility>(&self, control: &C, interface: &Interface) -> Result<bool> {
        let name = interface.name.as_str();
        let was_running = control.is_running(name).await?;
        if was_running {
            control.down(name, &self.config_path(name)).await?;
            info!(interface = %name, "interface brought down");
        }
        Ok(was_running)
    }

    /// Deletes the configuration file of a removed interface.
    pub async fn discard(&self, interface: &Interface) -> Result<()> {
        let path = self.config_path(&interface.name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!(interface = %interface.name, path = %path.display(), "removed configuration"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::Io(e)),
        }
        self.forget(interface.id);
        Ok(())
    }

    async fn write_config(&self, path: &Path, text: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.config_dir).await?;
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(path).await?;
        file.write_all(text.as_bytes()).await?;
        file.flush().await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{interface, peer};
    use wgman_wireguard::{ControlCall, ControlOp, FakeControl};

    fn setup() -> (tempfile::TempDir, Synchronizer, FakeControl) {
        let dir = tempfile::tempdir().expect("tempdir");
        let sync = Synchronizer::new(dir.path());
        (dir, sync, FakeControl::new())
    }

    #[tokio::test]
    async fn disabled_and_stopped_only_writes_file() {
        let (_dir, sync, fake) = setup();
        let iface = interface(1, "gray", "10.20.30.1/24");
        let report = sync.sync(&fake, &iface, &[]).await.expect("sync");
        assert!(!report.was_running);
        assert!(!report.brought_up);
        assert!(report.path.ends_with("gray.conf"));
        assert_eq!(fake.calls(), vec![ControlCall::ListRunning]);
        let text = std::fs::read_to_string(&report.path).expect("read");
        assert!(text.starts_with("[Interface]\n"));
        assert_eq!(sync.state(1), SyncState::Materialized);
    }

    #[tokio::test]
    async fn enabled_and_running_is_bounced() {
        let (_dir, sync, fake) = setup();
        let mut iface = interface(1, "gray", "10.20.30.1/24");
        iface.enabled = true;
        fake.set_running("gray");
        let report = sync
            .sync(&fake, &iface, &[peer(1, 1, "10.20.30.2")])
            .await
            .expect("sync");
        assert!(report.was_running && report.brought_up);
        assert_eq!(
            fake.calls(),
            vec![
                ControlCall::ListRunning,
                ControlCall::Down("gray".into()),
                ControlCall::Up("gray".into()),
            ]
        );
        assert!(fake.running("gray"));
    }

    #[tokio::test]
    async fn wg_quick_is_pointed_at_the_written_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sync = Synchronizer::new(dir.path().join("srv").join("wg"));
        let fake = FakeControl::new();
        let mut iface = interface(1, "gray", "10.20.30.1/24");
        iface.enabled = true;
        let report = sync.sync(&fake, &iface, &[]).await.expect("sync");
        assert_eq!(report.path, dir.path().join("srv").join("wg").join("gray.conf"));
        assert_eq!(fake.config_path("gray"), Some(report.path.clone()));

        fake.clear_calls();
        sync.remove(&fake, &iface).await.expect("remove");
        assert_eq!(fake.calls(), vec![ControlCall::ListRunning, ControlCall::Down("gray".into())]);
        assert_eq!(fake.config_path("gray"), Some(report.path));
    }

    #[tokio::test]
    async fn disabling_a_running_interface_leaves_it_down() {
        let (_dir, sync, fake) = setup();
        let iface = interface(1, "gray", "10.20.30.1/24");
        fake.set_running("gray");
        let report = sync.sync(&fake, &iface, &[]).await.expect("sync");
        assert!(report.was_running && !report.brought_up);
        assert!(!fake.running("gray"));
    }

    #[tokio::test]
    async fn bring_up_failure_still_writes_file() {
        let (_dir, sync, fake) = setup();
        let mut iface = interface(1, "gray", "10.20.30.1/24");
        iface.enabled = true;
        fake.fail(ControlOp::Up);
        let err = sync.sync(&fake, &iface, &[]).await.expect_err("up fails");
        assert!(err.is_tool_failure());
        assert!(sync.config_path("gray").exists());
        assert_eq!(sync.state(1), SyncState::Materialized);
    }

    #[tokio::test]
    async fn tear_down_failure_skips_bring_up() {
        let (_dir, sync, fake) = setup();
        let mut iface = interface(1, "gray", "10.20.30.1/24");
        iface.enabled = true;
        fake.set_running("gray");
        fake.fail(ControlOp::Down);
        let err = sync.sync(&fake, &iface, &[]).await.expect_err("down fails");
        assert!(err.is_tool_failure());
        assert!(sync.config_path("gray").exists());
        assert_eq!(fake.count(&ControlCall::Up("gray".into())), 0);
    }

    #[tokio::test]
    async fn liveness_failure_leaves_state_stale() {
        let (_dir, sync, fake) = setup();
        let iface = interface(1, "gray", "10.20.30.1/24");
        fake.fail(ControlOp::ListRunning);
        assert!(sync.sync(&fake, &iface, &[]).await.is_err());
        assert!(!sync.config_path("gray").exists());
        assert_eq!(sync.state(1), SyncState::Stale);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn config_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let (_dir, sync, fake) = setup();
        let report = sync
            .sync(&fake, &interface(1, "gray", "10.20.30.1/24"), &[])
            .await
            .expect("sync");
        let mode = std::fs::metadata(&report.path).expect("meta").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn remove_and_discard() {
        let (_dir, sync, fake) = setup();
        let iface = interface(1, "gray", "10.20.30.1/24");
        sync.sync(&fake, &iface, &[]).await.expect("sync");
        fake.set_running("gray");
        assert!(sync.remove(&fake, &iface).await.expect("remove"));
        sync.discard(&iface).await.expect("discard");
        assert!(!sync.config_path("gray").exists());
        assert!(!fake.running("gray"));
        sync.discard(&iface).await.expect("discard twice");
    }
}
