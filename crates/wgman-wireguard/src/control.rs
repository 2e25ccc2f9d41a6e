//! The control utility adapter.
//!
//! [`ControlUtility`] is the seam between the reconciliation engine and the live
//! tunnel stack. [`WgTool`] drives the real `wg` and `wg-quick` programs; every
//! call is a subprocess bounded by a timeout.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::dump::{parse_dump, parse_interface_list, InterfaceDump};
use crate::error::{Result, WireGuardError};
use crate::keys::{KeyPair, PresharedKey, PrivateKey};

/// Default timeout for a single control utility invocation.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Operations on the live `WireGuard` stack.
#[allow(async_fn_in_trait)]
pub trait ControlUtility {
    /// Names of the interfaces that are currently up.
    async fn list_running(&self) -> Result<Vec<String>>;

    /// Live state and per-peer counters of one interface.
    async fn dump(&self, name: &str) -> Result<InterfaceDump>;

    /// Brings interface `name` up from the configuration file at `config`.
    async fn up(&self, name: &str, config: &Path) -> Result<()>;

    /// Tears interface `name` down using the configuration file at `config`.
    async fn down(&self, name: &str, config: &Path) -> Result<()>;

    /// Generates a fresh key pair.
    async fn generate_keypair(&self) -> Result<KeyPair>;

    /// Generates a fresh preshared key.
    async fn generate_preshared(&self) -> Result<PresharedKey>;

    /// Returns true if `name` is among the running interfaces.
    async fn is_running(&self, name: &str) -> Result<bool> {
        Ok(self.list_running().await?.iter().any(|n| n == name))
    }
}

/// Where to find the control programs and how long to wait for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolConfig {
    /// Path or name of the `wg` binary.
    pub wg_binary: PathBuf,
    /// Path or name of the `wg-quick` binary.
    pub wg_quick_binary: PathBuf,
    /// Upper bound for each invocation.
    pub timeout: Duration,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            wg_binary: PathBuf::from("wg"),
            wg_quick_binary: PathBuf::from("wg-quick"),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

/// [`ControlUtility`] backed by the `wg` and `wg-quick` programs.
#[derive(Debug, Clone, Default)]
pub struct WgTool {
    config: ToolConfig,
}

impl WgTool {
    /// Creates an adapter with the given tool configuration.
    #[must_use]
    pub fn new(config: ToolConfig) -> Self {
        Self { config }
    }

    /// Returns the tool configuration.
    #[must_use]
    pub fn config(&self) -> &ToolConfig {
        &self.config
    }

    async fn run<S: AsRef<OsStr>>(
        &self,
        program: &Path,
        args: &[S],
        stdin: Option<&str>,
    ) -> Result<String> {
        let description = describe(program, args);
        debug!(command = %description, "running control utility");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| WireGuardError::Spawn {
            command: description.clone(),
            message: e.to_string(),
        })?;

        let pipe = child.stdin.take();
        let exchange = async move {
            if let (Some(input), Some(mut pipe)) = (stdin, pipe) {
                pipe.write_all(input.as_bytes()).await?;
            }
            child.wait_with_output().await
        };

        let output = tokio::time::timeout(self.config.timeout, exchange)
            .await
            .map_err(|_| WireGuardError::Timeout {
                command: description.clone(),
                timeout_secs: self.config.timeout.as_secs(),
            })?
            .map_err(|e| WireGuardError::Spawn {
                command: description.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(WireGuardError::CommandFailed {
                command: description,
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn wg(&self, args: &[&str]) -> Result<String> {
        self.run(&self.config.wg_binary, args, None).await
    }

    async fn wg_quick(&self, verb: &str, config: &Path) -> Result<String> {
        let args = [OsStr::new(verb), config.as_os_str()];
        self.run(&self.config.wg_quick_binary, &args, None).await
    }
}

fn describe<S: AsRef<OsStr>>(program: &Path, args: &[S]) -> String {
    let mut s = program.display().to_string();
    for arg in args {
        s.push(' ');
        s.push_str(&arg.as_ref().to_string_lossy());
    }
    s
}

impl ControlUtility for WgTool {
    async fn list_running(&self) -> Result<Vec<String>> {
        let out = self.wg(&["show", "interfaces"]).await?;
        Ok(parse_interface_list(&out))
    }

    async fn dump(&self, name: &str) -> Result<InterfaceDump> {
        let out = self.wg(&["show", name, "dump"]).await?;
        parse_dump(&out)
    }

    // wg-quick takes the interface name from the file stem.
    async fn up(&self, name: &str, config: &Path) -> Result<()> {
        debug!(interface = %name, config = %config.display(), "bringing interface up");
        self.wg_quick("up", config).await.map(|_| ())
    }

    async fn down(&self, name: &str, config: &Path) -> Result<()> {
        debug!(interface = %name, config = %config.display(), "tearing interface down");
        self.wg_quick("down", config).await.map(|_| ())
    }

    async fn generate_keypair(&self) -> Result<KeyPair> {
        let private = self.wg(&["genkey"]).await?;
        let private = PrivateKey::from_base64(&private)?;
        let public = self
            .run(&self.config.wg_binary, &["pubkey"], Some(&format!("{}\n", private.to_base64())))
            .await?;
        let pair = KeyPair::from_private_key(private);
        if pair.public_key().to_base64() != public.trim() {
            return Err(WireGuardError::InvalidKey(
                "wg pubkey disagrees with the derived public key".to_string(),
            ));
        }
        Ok(pair)
    }

    async fn generate_preshared(&self) -> Result<PresharedKey> {
        let out = self.wg(&["genpsk"]).await?;
        PresharedKey::from_base64(&out)
    }
}
