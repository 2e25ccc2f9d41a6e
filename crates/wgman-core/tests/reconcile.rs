//! End-to-end reconciliation scenarios against the in-process control utility.
//!
//! These tests verify:
//! 1. Address allocation order and conflicts
//! 2. Client configuration defaults
//! 3. Statistics for stopped and running interfaces
//! 4. Interface deletion ordering and failure handling
//! 5. Divergence handling when `wg-quick` fails

use std::net::Ipv4Addr;
use std::sync::Arc;

use wgman_core::{
    EntityStore, Error, InterfaceDefaults, JsonStore, ManagerConfig, NewInterface, NewPeer,
    PeerStats, Setting, SyncState, ViewOptions, WgManager,
};
use wgman_wireguard::{ControlCall, ControlOp, FakeControl, PeerDump};

type Manager = WgManager<FakeControl, JsonStore>;

fn manager(dir: &tempfile::TempDir) -> Manager {
    WgManager::new(
        FakeControl::new(),
        JsonStore::in_memory(),
        ManagerConfig {
            config_dir: dir.path().to_path_buf(),
            defaults: InterfaceDefaults::default(),
        },
    )
}

fn gray(local_ip: &str) -> NewInterface {
    NewInterface {
        name: Some("gray".to_string()),
        local_ip: Some(local_ip.parse().expect("valid net")),
        public_hostname: Some("vpn.example.com".to_string()),
        ..NewInterface::default()
    }
}

// ============================================================================
// Address Allocation
// ============================================================================

#[tokio::test]
async fn allocation_starts_at_first_usable_host() {
    let dir = tempfile::tempdir().expect("tempdir");
    let m = manager(&dir);
    let iface = m.create_interface(gray("10.20.30.254/24")).await.expect("create");

    let first = m.allocate_address(iface.id).expect("allocate");
    assert_eq!(first, Ipv4Addr::new(10, 20, 30, 1));

    let peer = m
        .create_peer(iface.id, NewPeer::named("laptop"))
        .await
        .expect("peer");
    assert_eq!(peer.address, first);

    assert_eq!(m.allocate_address(iface.id).expect("allocate"), Ipv4Addr::new(10, 20, 30, 2));
}

#[tokio::test]
async fn allocation_skips_interface_address() {
    let dir = tempfile::tempdir().expect("tempdir");
    let m = manager(&dir);
    let iface = m.create_interface(gray("10.20.30.1/24")).await.expect("create");

    // The interface holds .1, so the first peer gets .2 rather than .1.
    assert_eq!(m.allocate_address(iface.id).expect("allocate"), Ipv4Addr::new(10, 20, 30, 2));
    let first = m
        .create_peer(iface.id, NewPeer::named("laptop"))
        .await
        .expect("peer");
    assert_eq!(first.address, Ipv4Addr::new(10, 20, 30, 2));
    let second = m
        .create_peer(iface.id, NewPeer::named("phone"))
        .await
        .expect("peer");
    assert_eq!(second.address, Ipv4Addr::new(10, 20, 30, 3));
}

#[tokio::test]
async fn allocation_never_reuses_a_held_address() {
    let dir = tempfile::tempdir().expect("tempdir");
    let m = manager(&dir);
    let iface = m.create_interface(gray("10.20.30.1/29")).await.expect("create");

    let mut seen = Vec::new();
    for i in 0..5 {
        let peer = m
            .create_peer(iface.id, NewPeer::named(format!("p{i}")))
            .await
            .expect("peer");
        assert!(!seen.contains(&peer.address));
        seen.push(peer.address);
    }
    let err = m.allocate_address(iface.id).expect_err("exhausted");
    assert!(matches!(err, Error::AddressSpaceExhausted { .. }));
}

#[tokio::test]
async fn requested_duplicate_address_is_conflict_without_mutation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let m = manager(&dir);
    let iface = m.create_interface(gray("10.20.30.1/24")).await.expect("create");
    let address = Ipv4Addr::new(10, 20, 30, 7);

    m.create_peer(
        iface.id,
        NewPeer {
            address: Some(address),
            ..NewPeer::named("first")
        },
    )
    .await
    .expect("first");
    m.control().clear_calls();

    let err = m
        .create_peer(
            iface.id,
            NewPeer {
                address: Some(address),
                ..NewPeer::named("second")
            },
        )
        .await
        .expect_err("conflict");
    assert!(matches!(err, Error::Conflict(_)));
    assert_eq!(m.store().peers_of(iface.id).expect("list").len(), 1);
    assert!(m.control().calls().is_empty());
}

#[tokio::test]
async fn invalid_requested_addresses_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let m = manager(&dir);
    let iface = m.create_interface(gray("10.20.30.1/24")).await.expect("create");

    for bad in ["10.20.31.5", "10.20.30.0", "10.20.30.255", "10.20.30.1"] {
        let err = m
            .create_peer(
                iface.id,
                NewPeer {
                    address: Some(bad.parse().expect("addr")),
                    ..NewPeer::named("bad")
                },
            )
            .await
            .expect_err(bad);
        assert!(matches!(err, Error::Validation(_)), "{bad}: {err}");
    }
    assert!(m.store().peers_of(iface.id).expect("list").is_empty());
}

// ============================================================================
// Configuration Text
// ============================================================================

#[tokio::test]
async fn client_config_inherits_keepalive() {
    let dir = tempfile::tempdir().expect("tempdir");
    let m = manager(&dir);
    let iface = m
        .create_interface(NewInterface {
            default_persistent_keepalive: Some(25),
            ..gray("10.20.30.1/24")
        })
        .await
        .expect("create");
    let peer = m
        .create_peer(iface.id, NewPeer::named("phone"))
        .await
        .expect("peer");

    let text = m.peer_config(peer.id).expect("config");
    assert!(text.contains("PersistentKeepalive = 25\n"));
    assert!(text.contains("Endpoint = vpn.example.com:51820\n"));
    assert_eq!(text, m.peer_config(peer.id).expect("config again"));
}

#[tokio::test]
async fn client_config_prefers_overrides() {
    let dir = tempfile::tempdir().expect("tempdir");
    let m = manager(&dir);
    let iface = m.create_interface(gray("10.20.30.1/24")).await.expect("create");
    let peer = m
        .create_peer(
            iface.id,
            NewPeer {
                remote_dns: Setting::Override("9.9.9.9".to_string()),
                remote_persistent_keepalive: Setting::Override(60),
                ..NewPeer::named("phone")
            },
        )
        .await
        .expect("peer");

    let text = m.peer_config(peer.id).expect("config");
    assert!(text.contains("DNS = 9.9.9.9\n"));
    assert!(text.contains("PersistentKeepalive = 60\n"));
    assert!(!text.contains("1.1.1.1"));
}

#[tokio::test]
async fn server_file_lists_every_peer() {
    let dir = tempfile::tempdir().expect("tempdir");
    let m = manager(&dir);
    let iface = m.create_interface(gray("10.20.30.1/24")).await.expect("create");
    let a = m.create_peer(iface.id, NewPeer::named("a")).await.expect("a");
    let b = m.create_peer(iface.id, NewPeer::named("b")).await.expect("b");

    let text = std::fs::read_to_string(dir.path().join("gray.conf")).expect("read");
    assert_eq!(text.matches("[Peer]").count(), 2);
    let pos_a = text.find(&a.public_key.to_base64()).expect("a listed");
    let pos_b = text.find(&b.public_key.to_base64()).expect("b listed");
    assert!(pos_a < pos_b);
    assert!(text.contains("AllowedIPs = 10.20.30.2/32\n"));
    assert_eq!(m.sync_state(iface.id).expect("state"), SyncState::Materialized);
}

// ============================================================================
// Statistics
// ============================================================================

#[tokio::test]
async fn disabled_interface_has_no_statistics_and_no_dump() {
    let dir = tempfile::tempdir().expect("tempdir");
    let m = manager(&dir);
    let iface = m.create_interface(gray("10.20.30.1/24")).await.expect("create");
    assert!(!iface.enabled);
    m.create_peer(iface.id, NewPeer::named("a")).await.expect("a");
    m.create_peer(iface.id, NewPeer::named("b")).await.expect("b");

    let views = m
        .peer_views(iface.id, ViewOptions::default())
        .await
        .expect("views");
    assert_eq!(views.len(), 2);
    for view in &views {
        assert_eq!(view.latest_handshake, None);
        assert_eq!(view.transfer_rx, None);
        assert_eq!(view.transfer_tx, None);
    }
    assert_eq!(m.control().count(&ControlCall::Dump("gray".into())), 0);
}

#[tokio::test]
async fn running_interface_statistics_are_merged_and_shared() {
    let dir = tempfile::tempdir().expect("tempdir");
    let m = manager(&dir);
    let iface = m
        .create_interface(NewInterface {
            enabled: Some(true),
            ..gray("10.20.30.1/24")
        })
        .await
        .expect("create");
    let peer = m.create_peer(iface.id, NewPeer::named("a")).await.expect("a");

    let mut live = PeerDump::idle(peer.public_key);
    live.latest_handshake = Some(1_700_000_000);
    live.transfer_rx = 4096;
    live.transfer_tx = 512;
    m.control().set_peer_stats("gray", live);

    let view = m.peer_view(peer.id, ViewOptions::default()).await.expect("view");
    assert_eq!(view.latest_handshake, Some(1_700_000_000));
    assert_eq!(view.transfer_rx, Some(4096));
    assert_eq!(view.transfer_tx, Some(512));
    assert_eq!(
        m.cache().stats(peer.id),
        PeerStats {
            latest_handshake: Some(1_700_000_000),
            transfer_rx: Some(4096),
            transfer_tx: Some(512),
        }
    );

    m.down_interface(iface.id).await.expect("down");
    let view = m.peer_view(peer.id, ViewOptions::default()).await.expect("view");
    assert_eq!(view.stats(), PeerStats::default());
}

// ============================================================================
// Deletion
// ============================================================================

#[tokio::test]
async fn delete_interface_brings_it_down_first_and_cascades() {
    let dir = tempfile::tempdir().expect("tempdir");
    let m = manager(&dir);
    let iface = m
        .create_interface(NewInterface {
            enabled: Some(true),
            ..gray("10.20.30.1/24")
        })
        .await
        .expect("create");
    let a = m.create_peer(iface.id, NewPeer::named("a")).await.expect("a");
    let b = m.create_peer(iface.id, NewPeer::named("b")).await.expect("b");
    assert!(m.control().running("gray"));
    m.control().clear_calls();

    m.delete_interface(iface.id).await.expect("delete");

    assert_eq!(
        m.control().calls(),
        vec![ControlCall::ListRunning, ControlCall::Down("gray".into())]
    );
    assert!(!m.control().running("gray"));
    assert!(m.store().peers().expect("list").is_empty());
    assert!(matches!(m.peer(a.id), Err(Error::NotFound { .. })));
    assert!(matches!(m.peer(b.id), Err(Error::NotFound { .. })));
    assert!(matches!(m.interface(iface.id), Err(Error::NotFound { .. })));
    assert!(!dir.path().join("gray.conf").exists());
}

#[tokio::test]
async fn failed_tear_down_keeps_records() {
    let dir = tempfile::tempdir().expect("tempdir");
    let m = manager(&dir);
    let iface = m
        .create_interface(NewInterface {
            enabled: Some(true),
            ..gray("10.20.30.1/24")
        })
        .await
        .expect("create");
    m.create_peer(iface.id, NewPeer::named("a")).await.expect("a");
    m.control().fail(ControlOp::Down);

    let err = m.delete_interface(iface.id).await.expect_err("down fails");
    assert!(err.is_tool_failure());
    assert!(m.store().interface(iface.id).is_ok());
    assert_eq!(m.store().peers_of(iface.id).expect("list").len(), 1);
    assert!(dir.path().join("gray.conf").exists());
}

#[tokio::test]
async fn stopped_interface_is_deleted_without_tear_down() {
    let dir = tempfile::tempdir().expect("tempdir");
    let m = manager(&dir);
    let iface = m.create_interface(gray("10.20.30.1/24")).await.expect("create");
    m.delete_interface(iface.id).await.expect("delete");
    assert_eq!(m.control().count(&ControlCall::Down("gray".into())), 0);
    assert!(m.interfaces().expect("list").is_empty());
}

// ============================================================================
// Divergence
// ============================================================================

#[tokio::test]
async fn bring_up_failure_keeps_enabled_and_writes_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let m = manager(&dir);
    let iface = m.create_interface(gray("10.20.30.1/24")).await.expect("create");
    m.control().fail(ControlOp::Up);

    let err = m.up_interface(iface.id).await.expect_err("up fails");
    assert!(err.is_tool_failure());
    assert!(m.store().interface(iface.id).expect("get").enabled);
    assert!(m.interface(iface.id).expect("get").enabled);
    assert!(dir.path().join("gray.conf").exists());
    assert!(!m.control().running("gray"));

    m.control().clear_failures();
    let report = m.sync_interface(iface.id).await.expect("retry");
    assert!(report.brought_up);
    assert!(m.is_running(iface.id).await.expect("running"));
}

#[tokio::test]
async fn sync_all_reports_each_interface() {
    let dir = tempfile::tempdir().expect("tempdir");
    let m = manager(&dir);
    m.create_interface(gray("10.20.30.1/24")).await.expect("gray");
    m.create_interface(NewInterface {
        name: Some("blue".into()),
        local_ip: Some("10.40.0.1/24".parse().expect("net")),
        enabled: Some(true),
        ..NewInterface::default()
    })
    .await
    .expect("blue");
    m.control().fail(ControlOp::Up);

    let outcomes = m.sync_all().await.expect("sync all");
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes[0].result.is_ok());
    assert_eq!(outcomes[1].interface, "blue");
    assert!(outcomes[1].result.as_ref().is_err_and(Error::is_tool_failure));
}

#[tokio::test]
async fn mutations_replace_shared_instances() {
    let dir = tempfile::tempdir().expect("tempdir");
    let m = manager(&dir);
    let iface = m.create_interface(gray("10.20.30.1/24")).await.expect("create");
    let before = m.interface(iface.id).expect("get");
    assert!(Arc::ptr_eq(&before, &m.interface(iface.id).expect("get again")));

    m.up_interface(iface.id).await.expect("up");
    let after = m.interface(iface.id).expect("get");
    assert!(!Arc::ptr_eq(&before, &after));
    assert!(after.enabled);
    assert!(!before.enabled);
}

#[tokio::test]
async fn state_survives_restart() {
    let state = tempfile::tempdir().expect("state dir");
    let conf = tempfile::tempdir().expect("config dir");
    let config = ManagerConfig {
        config_dir: conf.path().to_path_buf(),
        defaults: InterfaceDefaults::default(),
    };

    let peer_id = {
        let m = WgManager::new(
            FakeControl::new(),
            JsonStore::open(state.path()).expect("open"),
            config.clone(),
        );
        let iface = m.create_interface(gray("10.20.30.1/24")).await.expect("create");
        m.create_peer(iface.id, NewPeer::named("a")).await.expect("peer").id
    };

    let m = WgManager::new(
        FakeControl::new(),
        JsonStore::open(state.path()).expect("reopen"),
        config,
    );
    let peer = m.peer(peer_id).expect("peer survives");
    assert_eq!(peer.name, "a");
    assert_eq!(m.interface_by_name("gray").expect("iface").id, peer.interface_id);
}
