//! Command implementations.
//!
//! Each executor borrows the manager, runs one operation and writes the
//! result through an [`OutputFormat`].

use std::io::Write;

use tracing::warn;
use wgman_core::{
    EntityStore, Interface, InterfaceUpdate, NewInterface, NewPeer, PeerUpdate, Setting,
    ViewOptions, WgManager,
};
use wgman_wireguard::ControlUtility;

use crate::cli::{
    CreateInterfaceArgs, CreatePeerArgs, InterfaceCommands, InterfaceSettingsArgs, PeerCommands,
    PeerField, UpdatePeerArgs, ViewArgs,
};
use crate::error::CliError;
use crate::output::{
    ClientConfig, InterfaceDetail, InterfaceList, InterfaceRow, Message, NextAddress, OutputFormat,
    PeerInfo, PeerList, SyncRow, SyncSummary,
};

impl From<ViewArgs> for ViewOptions {
    fn from(args: ViewArgs) -> Self {
        Self {
            fill_defaults: !args.raw,
            fill_stats: !args.no_stats,
        }
    }
}

// ============ Interfaces ============

/// Interface command executor.
pub struct InterfaceCommand<'a, C, S> {
    manager: &'a WgManager<C, S>,
}

impl<'a, C, S> InterfaceCommand<'a, C, S>
where
    C: ControlUtility,
    S: EntityStore,
{
    /// Create a new interface command.
    #[must_use]
    pub fn new(manager: &'a WgManager<C, S>) -> Self {
        Self { manager }
    }

    /// Execute an interface subcommand.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation fails.
    pub async fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        command: &InterfaceCommands,
    ) -> Result<(), CliError> {
        match command {
            InterfaceCommands::List => {
                let list = self.list().await?;
                format.write(writer, &list)?;
            }
            InterfaceCommands::Show { name } => {
                let detail = self.show(name).await?;
                format.write(writer, &detail)?;
            }
            InterfaceCommands::Create(args) => {
                let created = self.manager.create_interface(new_interface(args)).await?;
                let msg = Message::success(format!(
                    "Interface {} created ({}, port {})",
                    created.name, created.local_ip, created.port
                ));
                format.write(writer, &msg)?;
            }
            InterfaceCommands::Update(args) => {
                let id = self.manager.interface_by_name(&args.name)?.id;
                self.manager
                    .update_interface(id, interface_update(&args.settings))
                    .await?;
                format.write(writer, &Message::success(format!("Interface {} updated", args.name)))?;
            }
            InterfaceCommands::Up { name } => {
                let id = self.manager.interface_by_name(name)?.id;
                self.manager.up_interface(id).await?;
                format.write(writer, &Message::success(format!("Interface {name} is up")))?;
            }
            InterfaceCommands::Down { name } => {
                let id = self.manager.interface_by_name(name)?.id;
                self.manager.down_interface(id).await?;
                format.write(writer, &Message::success(format!("Interface {name} is down")))?;
            }
            InterfaceCommands::Delete { name } => {
                let id = self.manager.interface_by_name(name)?.id;
                self.manager.delete_interface(id).await?;
                format.write(writer, &Message::success(format!("Interface {name} deleted")))?;
            }
            InterfaceCommands::Sync { name } => {
                let id = self.manager.interface_by_name(name)?.id;
                let report = self.manager.sync_interface(id).await?;
                let msg = Message::success(format!(
                    "Interface {name} synced to {}",
                    report.path.display()
                ));
                format.write(writer, &msg)?;
            }
        }
        Ok(())
    }

    /// All interfaces with their live state.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn list(&self) -> Result<InterfaceList, CliError> {
        let running = match self.manager.control().list_running().await {
            Ok(names) => Some(names),
            Err(e) => {
                warn!(error = %e, "could not query running interfaces");
                None
            }
        };

        let mut interfaces = Vec::new();
        for interface in self.manager.interfaces()? {
            interfaces.push(InterfaceRow {
                id: interface.id,
                name: interface.name.clone(),
                local_ip: interface.local_ip,
                port: interface.port,
                enabled: interface.enabled,
                running: running.as_ref().map(|names| names.contains(&interface.name)),
                peers: self.manager.peers_of(interface.id)?.len(),
            });
        }
        Ok(InterfaceList { interfaces })
    }

    /// One interface in detail.
    ///
    /// # Errors
    ///
    /// Returns an error if the interface does not exist.
    pub async fn show(&self, name: &str) -> Result<InterfaceDetail, CliError> {
        let interface = self.manager.interface_by_name(name)?;
        let running = self.running(&interface).await;
        let state = self.manager.sync_state(interface.id)?;
        let peers = self.manager.peers_of(interface.id)?.len();
        Ok(InterfaceDetail::new(&interface, running, state, peers))
    }

    async fn running(&self, interface: &Interface) -> Option<bool> {
        match self.manager.is_running(interface.id).await {
            Ok(running) => Some(running),
            Err(e) => {
                warn!(interface = %interface.name, error = %e, "could not query live state");
                None
            }
        }
    }
}

fn new_interface(args: &CreateInterfaceArgs) -> NewInterface {
    let s = &args.settings;
    NewInterface {
        name: args.name.clone(),
        local_ip: args.local_ip,
        public_hostname: s.hostname.clone(),
        port: s.port,
        pre_up: s.pre_up.clone(),
        post_up: s.post_up.clone(),
        pre_down: s.pre_down.clone(),
        post_down: s.post_down.clone(),
        default_dns: s.dns.clone(),
        default_allowed_ips: s.allowed_ips.clone(),
        default_persistent_keepalive: s.keepalive,
        enabled: args.enable.then_some(true),
    }
}

fn interface_update(s: &InterfaceSettingsArgs) -> InterfaceUpdate {
    InterfaceUpdate {
        public_hostname: s.hostname.clone(),
        port: s.port,
        pre_up: s.pre_up.clone(),
        post_up: s.post_up.clone(),
        pre_down: s.pre_down.clone(),
        post_down: s.post_down.clone(),
        default_dns: s.dns.clone(),
        default_allowed_ips: s.allowed_ips.clone(),
        default_persistent_keepalive: s.keepalive,
        enabled: None,
    }
}

// ============ Peers ============

/// Peer command executor.
pub struct PeerCommand<'a, C, S> {
    manager: &'a WgManager<C, S>,
}

impl<'a, C, S> PeerCommand<'a, C, S>
where
    C: ControlUtility,
    S: EntityStore,
{
    /// Create a new peer command.
    #[must_use]
    pub fn new(manager: &'a WgManager<C, S>) -> Self {
        Self { manager }
    }

    /// Execute a peer subcommand.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation fails.
    pub async fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        command: &PeerCommands,
    ) -> Result<(), CliError> {
        match command {
            PeerCommands::List { interface, view } => {
                let id = self.manager.interface_by_name(interface)?.id;
                let peers = self
                    .manager
                    .peer_views(id, (*view).into())
                    .await?
                    .into_iter()
                    .map(PeerInfo::from)
                    .collect();
                let list = PeerList {
                    interface: interface.clone(),
                    peers,
                };
                format.write(writer, &list)?;
            }
            PeerCommands::Show { id, view } => {
                let peer = self.manager.peer_view(*id, (*view).into()).await?;
                format.write(writer, &PeerInfo::from(peer))?;
            }
            PeerCommands::Create(args) => {
                let interface_id = self.manager.interface_by_name(&args.interface)?.id;
                let peer = self.manager.create_peer(interface_id, new_peer(args)).await?;
                let msg = Message::success(format!(
                    "Peer {} created on {} with address {}",
                    peer.id, args.interface, peer.address
                ));
                format.write(writer, &msg)?;
            }
            PeerCommands::Update(args) => {
                let update = peer_update(args)?;
                self.manager.update_peer(args.id, update).await?;
                format.write(writer, &Message::success(format!("Peer {} updated", args.id)))?;
            }
            PeerCommands::Delete { id } => {
                self.manager.delete_peer(*id).await?;
                format.write(writer, &Message::success(format!("Peer {id} deleted")))?;
            }
            PeerCommands::Config { id } => {
                let config = ClientConfig {
                    peer: *id,
                    config: self.manager.peer_config(*id)?,
                };
                format.write(writer, &config)?;
            }
            PeerCommands::NextAddress { interface } => {
                let id = self.manager.interface_by_name(interface)?.id;
                let next = NextAddress {
                    interface: interface.clone(),
                    address: self.manager.allocate_address(id)?,
                };
                format.write(writer, &next)?;
            }
        }
        Ok(())
    }
}

fn new_peer(args: &CreatePeerArgs) -> NewPeer {
    let s = &args.settings;
    NewPeer {
        name: args.name.clone(),
        address: args.address,
        allowed_ips: Setting::from_value(s.allowed_ips.clone()),
        remote_allowed_ips: Setting::from_value(s.remote_allowed_ips.clone()),
        remote_dns: Setting::from_option(s.dns.clone()),
        remote_persistent_keepalive: Setting::from_option(s.keepalive),
    }
}

fn peer_update(args: &UpdatePeerArgs) -> Result<PeerUpdate, CliError> {
    let s = &args.settings;
    let inherit = |field: PeerField| args.inherit.contains(&field);

    for (field, given, flag) in [
        (PeerField::AllowedIps, !s.allowed_ips.is_empty(), "allowed-ips"),
        (PeerField::RemoteAllowedIps, !s.remote_allowed_ips.is_empty(), "remote-allowed-ips"),
        (PeerField::Dns, s.dns.is_some(), "dns"),
        (PeerField::Keepalive, s.keepalive.is_some(), "keepalive"),
    ] {
        if given && inherit(field) {
            return Err(CliError::InvalidArgument(format!(
                "--{flag} conflicts with --inherit {flag}"
            )));
        }
    }

    let pick = |field: PeerField, value: Option<_>| {
        if inherit(field) {
            Some(Setting::Inherit)
        } else {
            value.map(Setting::Override)
        }
    };

    Ok(PeerUpdate {
        name: args.name.clone(),
        address: args.address,
        allowed_ips: pick(
            PeerField::AllowedIps,
            Some(s.allowed_ips.clone()).filter(|v| !v.is_empty()),
        ),
        remote_allowed_ips: pick(
            PeerField::RemoteAllowedIps,
            Some(s.remote_allowed_ips.clone()).filter(|v| !v.is_empty()),
        ),
        remote_dns: match (inherit(PeerField::Dns), &s.dns) {
            (true, _) => Some(Setting::Inherit),
            (false, v) => v.clone().map(Setting::from_value),
        },
        remote_persistent_keepalive: match (inherit(PeerField::Keepalive), s.keepalive) {
            (true, _) => Some(Setting::Inherit),
            (false, v) => v.map(Setting::from_value),
        },
    })
}

// ============ Sync ============

/// Sync-all command executor.
pub struct SyncCommand<'a, C, S> {
    manager: &'a WgManager<C, S>,
}

impl<'a, C, S> SyncCommand<'a, C, S>
where
    C: ControlUtility,
    S: EntityStore,
{
    /// Create a new sync command.
    #[must_use]
    pub fn new(manager: &'a WgManager<C, S>) -> Self {
        Self { manager }
    }

    /// Sync every interface and report each outcome.
    ///
    /// # Errors
    ///
    /// Returns an error after writing the summary if any interface failed.
    pub async fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
    ) -> Result<(), CliError> {
        let results = self
            .manager
            .sync_all()
            .await?
            .into_iter()
            .map(|outcome| match outcome.result {
                Ok(report) => SyncRow {
                    interface: outcome.interface,
                    ok: true,
                    brought_up: report.brought_up,
                    error: None,
                },
                Err(e) => SyncRow {
                    interface: outcome.interface,
                    ok: false,
                    brought_up: false,
                    error: Some(e.to_string()),
                },
            })
            .collect();
        let summary = SyncSummary { results };
        format.write(writer, &summary)?;

        match summary.failures() {
            0 => Ok(()),
            n => Err(CliError::Command(format!("{n} interface(s) failed to sync"))),
        }
    }
}
