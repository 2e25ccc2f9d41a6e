//! Command-line argument parsing with clap.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use ipnet::{IpNet, Ipv4Net};

/// Manage `WireGuard` interfaces and peers.
#[derive(Parser, Debug, Clone)]
#[command(name = "wgman")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file.
    #[arg(short, long, env = "WGMAN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    pub format: Format,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Interface management.
    Interface {
        /// Interface subcommand to execute.
        #[command(subcommand)]
        command: InterfaceCommands,
    },

    /// Peer management.
    Peer {
        /// Peer subcommand to execute.
        #[command(subcommand)]
        command: PeerCommands,
    },

    /// Rewrite every interface's file and restart live ones.
    Sync,

    /// Write a configuration file with default values.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

/// Interface subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum InterfaceCommands {
    /// List all interfaces.
    List,

    /// Show one interface.
    Show {
        /// Interface name.
        name: String,
    },

    /// Create an interface with fresh keys.
    Create(CreateInterfaceArgs),

    /// Change an interface's settings.
    Update(UpdateInterfaceArgs),

    /// Enable an interface and bring it up.
    Up {
        /// Interface name.
        name: String,
    },

    /// Disable an interface and bring it down.
    Down {
        /// Interface name.
        name: String,
    },

    /// Bring an interface down and delete it with all its peers.
    Delete {
        /// Interface name.
        name: String,
    },

    /// Rewrite one interface's file and restart it if live.
    Sync {
        /// Interface name.
        name: String,
    },
}

/// Hook and client-default options shared by create and update.
#[derive(Args, Debug, Clone, Default)]
pub struct InterfaceSettingsArgs {
    /// Hostname clients use to reach the interface.
    #[arg(long)]
    pub hostname: Option<String>,

    /// UDP listen port.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Default DNS handed to clients.
    #[arg(long)]
    pub dns: Option<String>,

    /// Default client allowed IPs (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub allowed_ips: Option<Vec<IpNet>>,

    /// Default client keepalive in seconds, 0 for none.
    #[arg(long)]
    pub keepalive: Option<u16>,

    /// `PreUp` hook.
    #[arg(long)]
    pub pre_up: Option<String>,

    /// `PostUp` hook.
    #[arg(long)]
    pub post_up: Option<String>,

    /// `PreDown` hook.
    #[arg(long)]
    pub pre_down: Option<String>,

    /// `PostDown` hook.
    #[arg(long)]
    pub post_down: Option<String>,
}

/// Arguments for `interface create`.
#[derive(Args, Debug, Clone)]
pub struct CreateInterfaceArgs {
    /// Interface name; the configured default when omitted.
    pub name: Option<String>,

    /// Interface address with prefix, e.g. 10.20.30.1/24.
    #[arg(short, long)]
    pub local_ip: Option<Ipv4Net>,

    /// Bring the interface up right away.
    #[arg(long)]
    pub enable: bool,

    /// Remaining settings.
    #[command(flatten)]
    pub settings: InterfaceSettingsArgs,
}

/// Arguments for `interface update`.
#[derive(Args, Debug, Clone)]
pub struct UpdateInterfaceArgs {
    /// Interface name.
    pub name: String,

    /// Settings to change.
    #[command(flatten)]
    pub settings: InterfaceSettingsArgs,
}

/// Peer subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum PeerCommands {
    /// List the peers of an interface.
    List {
        /// Interface name.
        interface: String,

        /// View options.
        #[command(flatten)]
        view: ViewArgs,
    },

    /// Show one peer.
    Show {
        /// Peer id.
        id: i64,

        /// View options.
        #[command(flatten)]
        view: ViewArgs,
    },

    /// Create a peer with fresh keys.
    Create(CreatePeerArgs),

    /// Change a peer's settings.
    Update(UpdatePeerArgs),

    /// Delete a peer.
    Delete {
        /// Peer id.
        id: i64,
    },

    /// Print the configuration file a client imports.
    Config {
        /// Peer id.
        id: i64,
    },

    /// Print the address the next peer would get.
    NextAddress {
        /// Interface name.
        interface: String,
    },
}

/// Read-model switches.
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct ViewArgs {
    /// Show overrides only, without inherited values.
    #[arg(long)]
    pub raw: bool,

    /// Skip the live statistics query.
    #[arg(long)]
    pub no_stats: bool,
}

/// Per-peer override options shared by create and update.
#[derive(Args, Debug, Clone, Default)]
pub struct PeerSettingsArgs {
    /// Server-side allowed IPs (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub allowed_ips: Vec<IpNet>,

    /// Client-side allowed IPs (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub remote_allowed_ips: Vec<IpNet>,

    /// Client DNS.
    #[arg(long)]
    pub dns: Option<String>,

    /// Client keepalive in seconds.
    #[arg(long)]
    pub keepalive: Option<u16>,
}

/// Arguments for `peer create`.
#[derive(Args, Debug, Clone)]
pub struct CreatePeerArgs {
    /// Interface name.
    pub interface: String,

    /// Display name.
    #[arg(short, long, default_value = "")]
    pub name: String,

    /// Peer address; the lowest free host when omitted.
    #[arg(short, long)]
    pub address: Option<Ipv4Addr>,

    /// Overrides.
    #[command(flatten)]
    pub settings: PeerSettingsArgs,
}

/// Arguments for `peer update`.
#[derive(Args, Debug, Clone)]
pub struct UpdatePeerArgs {
    /// Peer id.
    pub id: i64,

    /// Display name.
    #[arg(short, long)]
    pub name: Option<String>,

    /// New address inside the interface subnet.
    #[arg(short, long)]
    pub address: Option<Ipv4Addr>,

    /// Overrides.
    #[command(flatten)]
    pub settings: PeerSettingsArgs,

    /// Drop overrides so the interface defaults apply again.
    #[arg(long, value_enum, value_delimiter = ',')]
    pub inherit: Vec<PeerField>,
}

/// Overridable peer fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PeerField {
    /// Server-side allowed IPs.
    AllowedIps,
    /// Client-side allowed IPs.
    RemoteAllowedIps,
    /// Client DNS.
    Dns,
    /// Client keepalive.
    Keepalive,
}
