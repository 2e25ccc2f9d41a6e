//! Peer address allocation.

use std::collections::HashSet;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;

use crate::error::{Error, Result};

/// Returns the numerically lowest usable host of `subnet` not in `used`.
///
/// Nothing is reserved; the caller must insert the peer before releasing the
/// interface lock.
///
/// # Errors
///
/// Returns [`Error::AddressSpaceExhausted`] when every host is taken.
pub fn allocate(subnet: Ipv4Net, used: &HashSet<Ipv4Addr>) -> Result<Ipv4Addr> {
    let subnet = subnet.trunc();
    subnet
        .hosts()
        .find(|ip| !used.contains(ip))
        .ok_or_else(|| Error::AddressSpaceExhausted {
            network: subnet.to_string(),
        })
}

/// Number of usable hosts in `subnet` not in `used`.
#[must_use]
pub fn available(subnet: Ipv4Net, used: &HashSet<Ipv4Addr>) -> usize {
    subnet.trunc().hosts().filter(|ip| !used.contains(ip)).count()
}
