//! Trusted-subnet admission gate: clients present `X-Real-IP`, which must
//! parse as IPv4 and fall inside the configured CIDR.

use std::net::Ipv4Addr;
use std::str::FromStr;

use ipnet::Ipv4Net;

use crate::WireError;

#[derive(Debug, Clone)]
pub struct TrustedSubnet {
    net: Ipv4Net,
}

impl TrustedSubnet {
    pub fn parse(cidr: &str) -> Result<Self, WireError> {
        let net = Ipv4Net::from_str(cidr).map_err(|error| WireError::Subnet(error.to_string()))?;
        Ok(Self { net })
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        self.net.contains(&addr)
    }
}

pub fn parse_real_ip(header_value: &str) -> Result<Ipv4Addr, WireError> {
    header_value
        .trim()
        .parse()
        .map_err(|_| WireError::Subnet(format!("'{header_value}' is not a valid IPv4 address")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_accepts_address_in_range() {
        let subnet = TrustedSubnet::parse("192.168.1.0/24").unwrap();
        assert!(subnet.contains("192.168.1.42".parse().unwrap()));
    }

    #[test]
    fn contains_rejects_address_outside_range() {
        let subnet = TrustedSubnet::parse("192.168.1.0/24").unwrap();
        assert!(!subnet.contains("10.0.0.1".parse().unwrap()));
    }

    #[test]
    fn parse_real_ip_rejects_non_ipv4() {
        assert!(parse_real_ip("not-an-ip").is_err());
    }
}
