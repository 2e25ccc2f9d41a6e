//! In-process [`ControlUtility`] for tests.
//!
//! Tracks which interfaces are up, records every call, serves configurable
//! per-peer statistics and can be told to fail specific operations.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::control::ControlUtility;
use crate::dump::{InterfaceDump, PeerDump};
use crate::error::{Result, WireGuardError};
use crate::keys::{KeyPair, PresharedKey, PublicKey};

/// Operations a [`FakeControl`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlOp {
    /// `wg show interfaces`.
    ListRunning,
    /// `wg show <name> dump`.
    Dump,
    /// `wg-quick up`.
    Up,
    /// `wg-quick down`.
    Down,
    /// Key generation.
    GenerateKeys,
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCall {
    /// `list_running()`.
    ListRunning,
    /// `dump(name)`.
    Dump(String),
    /// `up(name)`.
    Up(String),
    /// `down(name)`.
    Down(String),
    /// `generate_keypair()`.
    GenerateKeypair,
    /// `generate_preshared()`.
    GeneratePreshared,
}

#[derive(Debug, Default)]
struct FakeState {
    running: BTreeSet<String>,
    calls: Vec<ControlCall>,
    failures: HashSet<ControlOp>,
    stats: HashMap<String, HashMap<PublicKey, PeerDump>>,
    configs: HashMap<String, PathBuf>,
}

/// A fake control utility. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct FakeControl {
    state: Arc<Mutex<FakeState>>,
}

impl FakeControl {
    /// Creates a fake with nothing running.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks an interface as running without recording a call.
    pub fn set_running(&self, name: &str) {
        self.state.lock().running.insert(name.to_string());
    }

    /// Whether the fake believes `name` is up.
    #[must_use]
    pub fn running(&self, name: &str) -> bool {
        self.state.lock().running.contains(name)
    }

    /// Makes every subsequent `op` fail until [`FakeControl::clear_failures`].
    pub fn fail(&self, op: ControlOp) {
        self.state.lock().failures.insert(op);
    }

    /// Removes all injected failures.
    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Serves `stats` for its peer in future dumps of `interface`.
    pub fn set_peer_stats(&self, interface: &str, stats: PeerDump) {
        self.state
            .lock()
            .stats
            .entry(interface.to_string())
            .or_default()
            .insert(stats.public_key, stats);
    }

    /// Configuration file most recently passed to `up` or `down` for `name`.
    #[must_use]
    pub fn config_path(&self, name: &str) -> Option<PathBuf> {
        self.state.lock().configs.get(name).cloned()
    }

    /// Every call made so far, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<ControlCall> {
        self.state.lock().calls.clone()
    }

    /// Number of recorded calls equal to `call`.
    #[must_use]
    pub fn count(&self, call: &ControlCall) -> usize {
        self.state.lock().calls.iter().filter(|c| *c == call).count()
    }

    /// Forgets recorded calls.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    fn record(&self, call: ControlCall, op: ControlOp, command: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(call);
        if state.failures.contains(&op) {
            return Err(WireGuardError::CommandFailed {
                command: command.to_string(),
                exit_code: 1,
                stderr: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

impl ControlUtility for FakeControl {
    async fn list_running(&self) -> Result<Vec<String>> {
        self.record(ControlCall::ListRunning, ControlOp::ListRunning, "wg show interfaces")?;
        Ok(self.state.lock().running.iter().cloned().collect())
    }

    async fn dump(&self, name: &str) -> Result<InterfaceDump> {
        let command = format!("wg show {name} dump");
        self.record(ControlCall::Dump(name.to_string()), ControlOp::Dump, &command)?;
        let state = self.state.lock();
        if !state.running.contains(name) {
            return Err(WireGuardError::CommandFailed {
                command,
                exit_code: 1,
                stderr: format!("Unable to access interface: {name}"),
            });
        }
        let mut dump = InterfaceDump::empty();
        if let Some(peers) = state.stats.get(name) {
            dump.peers = peers.values().cloned().collect();
        }
        Ok(dump)
    }

    async fn up(&self, name: &str, config: &Path) -> Result<()> {
        let command = format!("wg-quick up {}", config.display());
        self.record(ControlCall::Up(name.to_string()), ControlOp::Up, &command)?;
        let mut state = self.state.lock();
        state.configs.insert(name.to_string(), config.to_path_buf());
        if !state.running.insert(name.to_string()) {
            return Err(WireGuardError::CommandFailed {
                command,
                exit_code: 1,
                stderr: format!("`{name}' already exists"),
            });
        }
        Ok(())
    }

    async fn down(&self, name: &str, config: &Path) -> Result<()> {
        let command = format!("wg-quick down {}", config.display());
        self.record(ControlCall::Down(name.to_string()), ControlOp::Down, &command)?;
        let mut state = self.state.lock();
        state.configs.insert(name.to_string(), config.to_path_buf());
        if !state.running.remove(name) {
            return Err(WireGuardError::CommandFailed {
                command,
                exit_code: 1,
                stderr: format!("`{name}' is not a WireGuard interface"),
            });
        }
        Ok(())
    }

    async fn generate_keypair(&self) -> Result<KeyPair> {
        self.record(ControlCall::GenerateKeypair, ControlOp::GenerateKeys, "wg genkey")?;
        Ok(KeyPair::generate())
    }

    async fn generate_preshared(&self) -> Result<PresharedKey> {
        self.record(ControlCall::GeneratePreshared, ControlOp::GenerateKeys, "wg genpsk")?;
        Ok(PresharedKey::generate())
    }
}
