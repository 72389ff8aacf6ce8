//! Local interface and subnet discovery

use crate::{Result, TransportError};
use std::net::{Ipv4Addr, SocketAddrV4};

/// An IPv4 interface address with its netmask
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub name: String,
    pub addr: Ipv4Addr,
    pub netmask: Ipv4Addr,
}

impl Interface {
    pub fn is_loopback(&self) -> bool {
        self.addr.is_loopback()
    }

    pub fn subnet(&self) -> Subnet {
        Subnet::new(self.addr, self.netmask)
    }
}

/// IPv4 network given by an address and a netmask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subnet {
    pub addr: Ipv4Addr,
    pub netmask: Ipv4Addr,
}

impl Subnet {
    pub fn new(addr: Ipv4Addr, netmask: Ipv4Addr) -> Self {
        Self { addr, netmask }
    }

    /// Subnet from CIDR prefix length (clamped to 32)
    pub fn with_prefix(addr: Ipv4Addr, prefix: u8) -> Self {
        let prefix = prefix.min(32) as u32;
        let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
        Self::new(addr, Ipv4Addr::from(mask))
    }

    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.addr) & u32::from(self.netmask))
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        let mask = u32::from(self.netmask);
        u32::from(ip) & mask == u32::from(self.addr) & mask
    }
}

/// IPv4 addresses of the local interfaces
///
/// With `include_loopback == false` the loopback interface is skipped.
pub fn local_interfaces(include_loopback: bool) -> Result<Vec<Interface>> {
    let addrs = nix::ifaddrs::getifaddrs()
        .map_err(|e| TransportError::network_with_source("Failed to list network interfaces", e))?;

    let mut interfaces = Vec::new();
    for ifaddr in addrs {
        let addr = ifaddr
            .address
            .as_ref()
            .and_then(|a| a.as_sockaddr_in())
            .map(|sin| *SocketAddrV4::from(*sin).ip());
        let netmask = ifaddr
            .netmask
            .as_ref()
            .and_then(|a| a.as_sockaddr_in())
            .map(|sin| *SocketAddrV4::from(*sin).ip());

        if let (Some(addr), Some(netmask)) = (addr, netmask) {
            if !include_loopback && addr.is_loopback() {
                continue;
            }
            interfaces.push(Interface {
                name: ifaddr.interface_name,
                addr,
                netmask,
            });
        }
    }
    Ok(interfaces)
}

/// Subnets of every local IPv4 interface, loopback included
pub fn local_subnets() -> Result<Vec<Subnet>> {
    Ok(local_interfaces(true)?.iter().map(Interface::subnet).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subnet_contains() {
        let lan = Subnet::new(Ipv4Addr::new(192, 168, 1, 3), Ipv4Addr::new(255, 255, 255, 0));
        assert!(lan.contains(Ipv4Addr::new(192, 168, 1, 200)));
        assert!(!lan.contains(Ipv4Addr::new(192, 168, 2, 1)));
        assert_eq!(lan.network(), Ipv4Addr::new(192, 168, 1, 0));
    }

    #[test]
    fn test_prefix_masks() {
        assert_eq!(Subnet::with_prefix(Ipv4Addr::LOCALHOST, 8).netmask, Ipv4Addr::new(255, 0, 0, 0));
        assert!(Subnet::with_prefix(Ipv4Addr::UNSPECIFIED, 0).contains(Ipv4Addr::new(8, 8, 8, 8)));
        assert_eq!(Subnet::with_prefix(Ipv4Addr::LOCALHOST, 40).netmask, Ipv4Addr::BROADCAST);
    }

    #[test]
    fn test_loopback_interface_listed() {
        let all = local_interfaces(true).unwrap();
        assert!(all.iter().any(Interface::is_loopback));
        let external = local_interfaces(false).unwrap();
        assert!(external.iter().all(|i| !i.is_loopback()));
    }
}
