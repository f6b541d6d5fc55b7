// src/core/allow_ip.rs

//! The CIDR allow-list gating the cache invalidation endpoint.

use crate::core::errors::RampartError;
use ipnet::IpNet;
use std::net::IpAddr;

/// A parsed list of network prefixes. An empty or malformed client address
/// never matches.
#[derive(Debug, Clone)]
pub struct AllowedNetworks {
    prefixes: Vec<IpNet>,
}

impl AllowedNetworks {
    /// Parses a comma-separated CIDR list. Bare addresses are treated as
    /// host prefixes. Malformed entries are a configuration error.
    pub fn parse(list: &str) -> Result<Self, RampartError> {
        let mut prefixes = Vec::new();
        for raw in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let net = if raw.contains('/') {
                raw.parse::<IpNet>()
                    .map_err(|e| RampartError::Config(format!("invalid CIDR prefix '{raw}': {e}")))?
            } else {
                raw.parse::<IpAddr>()
                    .map(IpNet::from)
                    .map_err(|e| RampartError::Config(format!("invalid IP address '{raw}': {e}")))?
            };
            prefixes.push(net);
        }
        Ok(Self { prefixes })
    }

    /// Checks a textual client address against the list.
    pub fn contains(&self, ip: &str) -> bool {
        let Ok(addr) = ip.parse::<IpAddr>() else {
            return false;
        };
        self.prefixes.iter().any(|net| net.contains(&addr))
    }
}
