//! Listening address discovery for the console source

use std::net::{IpAddr, Ipv4Addr};
use tracing::debug;

use crate::{Result, SyncError};

/// Finds the local address the console listener binds to.
pub trait InterfaceDiscovery: Send + Sync + 'static {
    fn discover(&self) -> Result<IpAddr>;
}

/// First IPv4 address of a wired interface, matched by name prefix.
#[derive(Debug, Clone)]
pub struct WiredInterface {
    prefix: String,
}

impl WiredInterface {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }
}

impl InterfaceDiscovery for WiredInterface {
    fn discover(&self) -> Result<IpAddr> {
        let interfaces = if_addrs::get_if_addrs()
            .map_err(|e| SyncError::discovery("network interface", e.to_string()))?;
        let candidates = interfaces.iter().filter_map(|iface| match iface.ip() {
            IpAddr::V4(ip) => Some((iface.name.as_str(), ip)),
            IpAddr::V6(_) => None,
        });
        let ip = select_address(candidates, &self.prefix).ok_or_else(|| {
            SyncError::discovery(
                "network interface",
                format!("no IPv4 interface named {}*", self.prefix),
            )
        })?;
        debug!(prefix = %self.prefix, %ip, "Wired interface found");
        Ok(IpAddr::V4(ip))
    }
}

/// Always the same address; used for loopback setups and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedAddress(pub IpAddr);

impl InterfaceDiscovery for FixedAddress {
    fn discover(&self) -> Result<IpAddr> {
        Ok(self.0)
    }
}

fn select_address<'a>(
    candidates: impl IntoIterator<Item = (&'a str, Ipv4Addr)>,
    prefix: &str,
) -> Option<Ipv4Addr> {
    let prefix = prefix.to_ascii_lowercase();
    candidates
        .into_iter()
        .find(|(name, _)| name.to_ascii_lowercase().starts_with(&prefix))
        .map(|(_, ip)| ip)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_matching_interface_wins_case_insensitively() {
        let candidates = [
            ("lo", Ipv4Addr::LOCALHOST),
            ("wlan0", Ipv4Addr::new(10, 0, 0, 2)),
            ("Ethernet 2", Ipv4Addr::new(192, 168, 1, 20)),
            ("eth1", Ipv4Addr::new(192, 168, 2, 20)),
        ];
        assert_eq!(select_address(candidates, "eth"), Some(Ipv4Addr::new(192, 168, 1, 20)));
        assert_eq!(select_address(candidates, "ETH1"), Some(Ipv4Addr::new(192, 168, 2, 20)));
    }

    #[test]
    fn no_match_is_none() {
        let candidates = [("lo", Ipv4Addr::LOCALHOST)];
        assert_eq!(select_address(candidates, "eth"), None);
    }

    #[test]
    fn fixed_address_is_returned_as_is() {
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        assert_eq!(FixedAddress(ip).discover().unwrap(), ip);
    }

    #[test]
    fn unknown_prefix_is_a_discovery_error() {
        let err = WiredInterface::new("no-such-interface-prefix").discover().unwrap_err();
        assert!(matches!(err, SyncError::Discovery { .. }));
    }
}
