//! # wgman-cli
//!
//! Command-line front end for the `WireGuard` reconciliation engine.
//!
//! Every subcommand opens the JSON state store, performs one manager
//! operation and prints the result as a table or as JSON:
//!
//! ```text
//! ┌─────────┐   WgManager   ┌────────────┐   wg / wg-quick   ┌──────────┐
//! │  wgman  │──────────────►│ wgman-core │──────────────────►│  kernel  │
//! └─────────┘               └────────────┘                   └──────────┘
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod output;

pub use cli::{Cli, Commands, Format, InterfaceCommands, PeerCommands};
pub use commands::{InterfaceCommand, PeerCommand, SyncCommand};
pub use config::{WgmanConfig, DEFAULT_CONFIG_PATH};
pub use error::CliError;
pub use output::OutputFormat;
