//! `WireGuard` building blocks for wgman.
//!
//! This crate provides the Curve25519 key types, ordered configuration blocks in
//! `wg-quick` syntax, parsing of `wg show` output, and the [`ControlUtility`]
//! adapter that drives `wg` and `wg-quick`, along with an in-process fake.

mod block;
mod control;
mod dump;
pub mod error;
mod fake;
mod keys;

pub use block::{join_list, ConfigBlock, ConfigDocument};
pub use control::{ControlUtility, ToolConfig, WgTool, DEFAULT_COMMAND_TIMEOUT};
pub use dump::{parse_dump, parse_interface_list, render_dump, InterfaceDump, PeerDump};
pub use error::{Result, WireGuardError};
pub use fake::{ControlCall, ControlOp, FakeControl};
pub use keys::{KeyPair, PresharedKey, PrivateKey, PublicKey, KEY_SIZE};
