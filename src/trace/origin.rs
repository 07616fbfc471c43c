//! Caller origin classification.
//!
//! # Responsibilities
//! - Resolve the host's own address and default network
//! - Decide whether a caller sits inside the trust boundary
//!
//! # Design Decisions
//! - Trust is purely address based: own subnet, loopback, link-local and the
//!   RFC1918 / unique-local ranges, plus operator-configured networks
//! - Host resolution happens once per process and is cached. The address comes from
//!   the default interface, or the first interface that is up when there is no default
//!   route
//! - When the host address cannot be resolved, no caller is internal

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::OnceLock;

use ipnet::{IpNet, Ipv4Net, Ipv6Net};

/// Loopback, link-local and private blocks.
const PRIVATE_BLOCKS: [IpNet; 10] = [
    IpNet::V4(Ipv4Net::new_assert(Ipv4Addr::new(127, 0, 0, 0), 8)),
    IpNet::V4(Ipv4Net::new_assert(Ipv4Addr::new(10, 0, 0, 0), 8)),
    IpNet::V4(Ipv4Net::new_assert(Ipv4Addr::new(172, 16, 0, 0), 12)),
    IpNet::V4(Ipv4Net::new_assert(Ipv4Addr::new(192, 168, 0, 0), 16)),
    IpNet::V4(Ipv4Net::new_assert(Ipv4Addr::new(169, 254, 0, 0), 16)),
    IpNet::V4(Ipv4Net::new_assert(Ipv4Addr::new(224, 0, 0, 0), 24)),
    IpNet::V6(Ipv6Net::new_assert(Ipv6Addr::LOCALHOST, 128)),
    IpNet::V6(Ipv6Net::new_assert(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0), 10)),
    IpNet::V6(Ipv6Net::new_assert(Ipv6Addr::new(0xfc00, 0, 0, 0, 0, 0, 0, 0), 7)),
    IpNet::V6(Ipv6Net::new_assert(Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0), 16)),
];

static HOST_NETWORK: OnceLock<Option<HostNetwork>> = OnceLock::new();

/// The host's own address and the network derived from its default mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostNetwork {
    pub addr: IpAddr,
    pub network: IpNet,
}

impl HostNetwork {
    /// Build from an address using the classful default mask
    /// (A: /8, B: /16, C: /24, IPv6: /64).
    pub fn from_addr(addr: IpAddr) -> Self {
        let network = match addr {
            IpAddr::V4(v4) => {
                let prefix = match v4.octets()[0] {
                    0..=127 => 8,
                    128..=191 => 16,
                    192..=223 => 24,
                    _ => 32,
                };
                IpNet::V4(Ipv4Net::new_assert(v4, prefix).trunc())
            }
            IpAddr::V6(v6) => IpNet::V6(Ipv6Net::new_assert(v6, 64).trunc()),
        };
        Self { addr, network }
    }

    /// Discover the host address from the system interfaces.
    pub fn resolve() -> Option<Self> {
        let from_default = match netdev::get_default_interface() {
            Ok(iface) => host_address(interface_addrs(&iface)),
            Err(e) => {
                tracing::debug!(error = %e, "No default interface, scanning all interfaces");
                None
            }
        };

        from_default
            .or_else(|| {
                netdev::get_interfaces()
                    .iter()
                    .filter(|iface| iface.is_up())
                    .find_map(|iface| host_address(interface_addrs(iface)))
            })
            .map(Self::from_addr)
    }

    /// Process-wide cached resolution.
    pub fn cached() -> Option<Self> {
        *HOST_NETWORK.get_or_init(|| match Self::resolve() {
            Some(host) => {
                tracing::info!(host_address = %host.addr, network = %host.network, "Resolved host network");
                Some(host)
            }
            None => {
                tracing::warn!("No routable host address, treating all callers as external");
                None
            }
        })
    }
}

/// Decides whether a caller already carries trusted trace context.
#[derive(Debug, Clone, Default)]
pub struct OriginClassifier {
    host: Option<HostNetwork>,
    trusted: Vec<IpNet>,
}

impl OriginClassifier {
    pub fn new(host: Option<HostNetwork>, trusted: Vec<IpNet>) -> Self {
        Self { host, trusted }
    }

    /// Classifier for the running host, with optional extra trusted networks.
    pub fn from_system(trusted: Vec<IpNet>) -> Self {
        Self::new(HostNetwork::cached(), trusted)
    }

    pub fn host(&self) -> Option<&HostNetwork> {
        self.host.as_ref()
    }

    pub fn is_internal(&self, peer: IpAddr) -> bool {
        let Some(host) = &self.host else {
            return false;
        };

        let peer = peer.to_canonical();
        host.network.contains(&peer)
            || is_private_or_local(peer)
            || self.trusted.iter().any(|net| net.contains(&peer))
    }
}

fn interface_addrs(iface: &netdev::Interface) -> impl Iterator<Item = IpAddr> + '_ {
    iface
        .ipv4
        .iter()
        .map(|net| IpAddr::V4(net.addr()))
        .chain(iface.ipv6.iter().map(|net| IpAddr::V6(net.addr())))
}

/// Pick the address identifying this host.
///
/// Loopback, link-local and unspecified addresses are skipped; IPv4 is preferred.
pub fn host_address(addrs: impl IntoIterator<Item = IpAddr>) -> Option<IpAddr> {
    let usable: Vec<IpAddr> = addrs.into_iter().filter(|addr| is_routable(*addr)).collect();
    usable
        .iter()
        .copied()
        .find(IpAddr::is_ipv4)
        .or_else(|| usable.first().copied())
}

fn is_routable(addr: IpAddr) -> bool {
    if addr.is_unspecified() || addr.is_loopback() {
        return false;
    }
    match addr {
        IpAddr::V4(v4) => !v4.is_link_local(),
        IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) != 0xfe80,
    }
}

/// Loopback, link-local or private address.
pub fn is_private_or_local(ip: IpAddr) -> bool {
    ip.is_loopback() || PRIVATE_BLOCKS.iter().any(|block| block.contains(&ip))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> OriginClassifier {
        OriginClassifier::new(
            Some(HostNetwork::from_addr("198.51.100.10".parse().unwrap())),
            Vec::new(),
        )
    }

    #[test]
    fn private_and_loopback_are_internal() {
        let c = classifier();
        for addr in [
            "127.0.0.1",
            "10.1.2.3",
            "192.168.1.1",
            "172.16.0.5",
            "169.254.10.1",
            "::1",
            "fe80::1",
            "fd12:3456::1",
            "::ffff:10.0.0.7",
        ] {
            assert!(c.is_internal(addr.parse().unwrap()), "{addr}");
        }
    }

    #[test]
    fn public_addresses_are_external() {
        let c = classifier();
        for addr in ["8.8.8.8", "203.0.113.5", "172.32.0.1", "2001:4860:4860::8888"] {
            assert!(!c.is_internal(addr.parse().unwrap()), "{addr}");
        }
    }

    #[test]
    fn own_subnet_is_internal() {
        let c = classifier();
        assert!(c.is_internal("198.51.100.77".parse().unwrap()));
        assert!(!c.is_internal("198.51.101.77".parse().unwrap()));
    }

    #[test]
    fn default_masks_are_classful() {
        let a = HostNetwork::from_addr("10.20.30.40".parse().unwrap());
        assert_eq!(a.network.to_string(), "10.0.0.0/8");
        let b = HostNetwork::from_addr("150.20.30.40".parse().unwrap());
        assert_eq!(b.network.to_string(), "150.20.0.0/16");
        let c = HostNetwork::from_addr("198.51.100.10".parse().unwrap());
        assert_eq!(c.network.to_string(), "198.51.100.0/24");
        let v6 = HostNetwork::from_addr("2001:db8::1".parse().unwrap());
        assert_eq!(v6.network.to_string(), "2001:db8::/64");
    }

    #[test]
    fn configured_networks_are_trusted() {
        let c = OriginClassifier::new(
            Some(HostNetwork::from_addr("198.51.100.10".parse().unwrap())),
            vec!["8.8.8.0/24".parse().unwrap()],
        );
        assert!(c.is_internal("8.8.8.8".parse().unwrap()));
        assert!(!c.is_internal("8.8.4.4".parse().unwrap()));
    }

    fn addrs(list: &[&str]) -> Vec<IpAddr> {
        list.iter().map(|a| a.parse().unwrap()).collect()
    }

    #[test]
    fn host_address_prefers_routable_ipv4() {
        let picked = host_address(addrs(&["fe80::1", "2001:db8::7", "169.254.3.3", "10.4.0.12"]));
        assert_eq!(picked, Some("10.4.0.12".parse().unwrap()));
    }

    #[test]
    fn host_address_falls_back_to_ipv6() {
        let picked = host_address(addrs(&["127.0.0.1", "fe80::1", "2001:db8::7"]));
        assert_eq!(picked, Some("2001:db8::7".parse().unwrap()));
    }

    #[test]
    fn host_address_ignores_loopback_only_hosts() {
        assert_eq!(host_address(addrs(&["127.0.0.1", "::1", "0.0.0.0"])), None);
        assert_eq!(host_address(Vec::new()), None);
    }

    #[test]
    fn unresolved_host_trusts_nobody() {
        let c = OriginClassifier::new(None, Vec::new());
        assert!(!c.is_internal("127.0.0.1".parse().unwrap()));
        assert!(!c.is_internal("10.0.0.7".parse().unwrap()));
    }
}
