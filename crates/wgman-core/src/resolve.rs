//! Cascading peer overrides over interface defaults.

use std::collections::HashMap;

use ipnet::IpNet;

use crate::error::{Error, Result};
use crate::model::{Interface, InterfaceId, Peer, Setting};

/// The values a peer actually uses once inheritance is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveSettings {
    /// Server-side allowed IPs.
    pub allowed_ips: Vec<IpNet>,
    /// Client-side allowed IPs.
    pub remote_allowed_ips: Vec<IpNet>,
    /// Client-side DNS, empty for none.
    pub remote_dns: String,
    /// Client keepalive, `0` for none.
    pub remote_persistent_keepalive: u16,
}

/// Resolves every inheritable field of `peer` against `interface`.
#[must_use]
pub fn effective(peer: &Peer, interface: &Interface) -> EffectiveSettings {
    EffectiveSettings {
        allowed_ips: peer.allowed_ips.resolve_or(&vec![peer.host_range()]),
        remote_allowed_ips: peer
            .remote_allowed_ips
            .resolve_or(&interface.default_allowed_ips),
        remote_dns: peer.remote_dns.resolve_or(&interface.default_dns),
        remote_persistent_keepalive: peer
            .remote_persistent_keepalive
            .resolve_or(&interface.default_persistent_keepalive),
    }
}

/// Returns a copy of `peer` with resolved values written in as overrides.
///
/// Applying it to an already filled peer changes nothing.
#[must_use]
pub fn fill_defaults(peer: &Peer, interface: &Interface) -> Peer {
    let resolved = effective(peer, interface);
    Peer {
        allowed_ips: Setting::from_value(resolved.allowed_ips),
        remote_allowed_ips: Setting::from_value(resolved.remote_allowed_ips),
        remote_dns: Setting::from_value(resolved.remote_dns),
        remote_persistent_keepalive: Setting::from_value(resolved.remote_persistent_keepalive),
        ..peer.clone()
    }
}

/// Fills defaults for peers that may belong to different interfaces.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if a peer's interface is not in `interfaces`.
pub fn fill_defaults_all(peers: &[Peer], interfaces: &[Interface]) -> Result<Vec<Peer>> {
    let by_id: HashMap<InterfaceId, &Interface> = interfaces.iter().map(|i| (i.id, i)).collect();
    peers
        .iter()
        .map(|peer| {
            by_id
                .get(&peer.interface_id)
                .map(|iface| fill_defaults(peer, iface))
                .ok_or_else(|| Error::interface_not_found(peer.interface_id))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{interface, peer};
    use proptest::prelude::*;

    #[test]
    fn inherits_interface_defaults() {
        let iface = interface(1, "gray", "10.20.30.1/24");
        let p = peer(1, 1, "10.20.30.2");
        let eff = effective(&p, &iface);
        assert_eq!(eff.remote_dns, "1.1.1.1");
        assert_eq!(eff.remote_persistent_keepalive, 25);
        assert_eq!(eff.remote_allowed_ips, iface.default_allowed_ips);
        assert_eq!(
            eff.allowed_ips.iter().map(ToString::to_string).collect::<Vec<_>>(),
            vec!["10.20.30.2/32"]
        );
    }

    #[test]
    fn overrides_win() {
        let iface = interface(1, "gray", "10.20.30.1/24");
        let mut p = peer(1, 1, "10.20.30.2");
        p.remote_dns = Setting::Override("9.9.9.9".into());
        p.remote_persistent_keepalive = Setting::Override(10);
        p.allowed_ips = Setting::Override(vec!["192.168.1.0/24".parse().expect("net")]);
        let eff = effective(&p, &iface);
        assert_eq!(eff.remote_dns, "9.9.9.9");
        assert_eq!(eff.remote_persistent_keepalive, 10);
        assert_eq!(eff.allowed_ips[0].to_string(), "192.168.1.0/24");
    }

    #[test]
    fn fill_defaults_does_not_touch_identity() {
        let iface = interface(1, "gray", "10.20.30.1/24");
        let p = peer(4, 1, "10.20.30.9");
        let filled = fill_defaults(&p, &iface);
        assert_eq!(filled.id, 4);
        assert_eq!(filled.public_key, p.public_key);
        assert_eq!(filled.remote_dns, Setting::Override("1.1.1.1".into()));
    }

    #[test]
    fn zero_interface_keepalive_stays_inherit() {
        let mut iface = interface(1, "gray", "10.20.30.1/24");
        iface.default_persistent_keepalive = 0;
        let filled = fill_defaults(&peer(1, 1, "10.20.30.2"), &iface);
        assert!(filled.remote_persistent_keepalive.is_inherit());
    }

    #[test]
    fn fill_all_requires_interface() {
        let iface = interface(1, "gray", "10.20.30.1/24");
        let peers = vec![peer(1, 1, "10.20.30.2"), peer(2, 9, "10.20.30.3")];
        let err = fill_defaults_all(&peers, &[iface]).expect_err("missing interface");
        assert!(matches!(err, Error::NotFound { entity: "interface", .. }));
    }

    proptest! {
        #[test]
        fn resolving_twice_is_a_noop(keepalive in 0u16..600, dns in "[0-9.]{0,15}", host in 2u8..254) {
            let mut iface = interface(1, "gray", "10.20.30.1/24");
            iface.default_persistent_keepalive = keepalive;
            iface.default_dns = dns;
            let p = peer(1, 1, &format!("10.20.30.{host}"));
            let once = fill_defaults(&p, &iface);
            let twice = fill_defaults(&once, &iface);
            prop_assert_eq!(&once, &twice);
            prop_assert_eq!(effective(&p, &iface), effective(&once, &iface));
        }

        #[test]
        fn override_always_beats_default(over in 1u16..600, default in 0u16..600) {
            let mut iface = interface(1, "gray", "10.20.30.1/24");
            iface.default_persistent_keepalive = default;
            let mut p = peer(1, 1, "10.20.30.2");
            p.remote_persistent_keepalive = Setting::Override(over);
            prop_assert_eq!(effective(&p, &iface).remote_persistent_keepalive, over);
        }
    }
}
