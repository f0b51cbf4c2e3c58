use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::TopologyError;

/// An IPv4 network in CIDR notation. The address is always the network
/// address; host bits are rejected on parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    pub const ANY: Ipv4Cidr = Ipv4Cidr {
        network: Ipv4Addr::UNSPECIFIED,
        prefix: 0,
    };

    /// Caller guarantees `prefix <= 32` and no host bits.
    pub(crate) const fn from_parts(network: Ipv4Addr, prefix: u8) -> Self {
        Self { network, prefix }
    }

    pub fn new(network: Ipv4Addr, prefix: u8) -> Result<Self, TopologyError> {
        let cidr = Self { network, prefix };
        if prefix > 32 {
            return Err(TopologyError::InvalidCidr(cidr.to_string()));
        }
        if u32::from(network) & !cidr.mask() != 0 {
            return Err(TopologyError::HostBitsSet(cidr.to_string()));
        }
        Ok(cidr)
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    fn mask(&self) -> u32 {
        match self.prefix {
            0 => 0,
            p => u32::MAX << (32 - u32::from(p)),
        }
    }

    pub fn contains(&self, other: &Ipv4Cidr) -> bool {
        other.prefix >= self.prefix && u32::from(other.network) & self.mask() == u32::from(self.network)
    }

    /// The `index`-th subnet of size `/new_prefix` carved from this network.
    pub fn subnet(&self, new_prefix: u8, index: u32) -> Result<Ipv4Cidr, TopologyError> {
        if new_prefix < self.prefix || new_prefix > 32 {
            return Err(TopologyError::SubnetPrefix {
                parent: *self,
                prefix: new_prefix,
            });
        }
        let bits = u32::from(new_prefix - self.prefix);
        let capacity = 1u64 << bits;
        if u64::from(index) >= capacity {
            return Err(TopologyError::SubnetExhausted {
                parent: *self,
                prefix: new_prefix,
                needed: u64::from(index) + 1,
            });
        }
        let step = 1u64 << (32 - u32::from(new_prefix));
        let offset = u64::from(index) * step;
        let network = Ipv4Addr::from(u32::from(self.network) + offset as u32);
        Ipv4Cidr::new(network, new_prefix)
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TopologyError::InvalidCidr(s.to_owned());
        let (addr, prefix) = s.split_once('/').ok_or_else(invalid)?;
        let network: Ipv4Addr = addr.parse().map_err(|_| invalid())?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
        Ipv4Cidr::new(network, prefix)
    }
}

impl Serialize for Ipv4Cidr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Ipv4Cidr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_and_displays() {
        let c: Ipv4Cidr = "10.0.0.0/16".parse().unwrap();
        assert_eq!(c.prefix(), 16);
        assert_eq!(c.to_string(), "10.0.0.0/16");
    }

    #[test]
    fn rejects_host_bits_and_garbage() {
        assert!(matches!(
            "10.0.0.1/16".parse::<Ipv4Cidr>(),
            Err(TopologyError::HostBitsSet(_))
        ));
        assert!("10.0.0.0".parse::<Ipv4Cidr>().is_err());
        assert!("10.0.0.0/33".parse::<Ipv4Cidr>().is_err());
        assert!("ten/8".parse::<Ipv4Cidr>().is_err());
    }

    #[test]
    fn carves_slash_24s() {
        let vpc: Ipv4Cidr = "10.0.0.0/16".parse().unwrap();
        assert_eq!(vpc.subnet(24, 0).unwrap().to_string(), "10.0.0.0/24");
        assert_eq!(vpc.subnet(24, 1).unwrap().to_string(), "10.0.1.0/24");
        assert_eq!(vpc.subnet(24, 255).unwrap().to_string(), "10.0.255.0/24");
        assert!(matches!(
            vpc.subnet(24, 256),
            Err(TopologyError::SubnetExhausted { .. })
        ));
        assert!(vpc.subnet(8, 0).is_err());
    }

    #[test]
    fn any_contains_everything() {
        let c: Ipv4Cidr = "18.206.107.24/29".parse().unwrap();
        assert!(Ipv4Cidr::ANY.contains(&c));
        assert!(!c.contains(&Ipv4Cidr::ANY));
    }

    proptest! {
        #[test]
        fn subnets_stay_inside_parent(a in 0u8..=255, b in 0u8..=255, index in 0u32..256) {
            let parent = Ipv4Cidr::new(Ipv4Addr::new(a, b, 0, 0), 16).unwrap();
            let child = parent.subnet(24, index).unwrap();
            prop_assert!(parent.contains(&child));
            prop_assert_eq!(child.to_string().parse::<Ipv4Cidr>().unwrap(), child);
        }
    }
}
