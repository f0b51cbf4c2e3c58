//! Lookup in the published AWS IP range document (`ip-ranges.json`).

use serde::Deserialize;

use crate::TopologyError;
use crate::cidr::Ipv4Cidr;

pub const IP_RANGES_URL: &str = "https://ip-ranges.amazonaws.com/ip-ranges.json";

const INSTANCE_CONNECT_SERVICE: &str = "EC2_INSTANCE_CONNECT";

#[derive(Debug, Deserialize)]
struct IpRanges {
    prefixes: Vec<IpPrefix>,
}

#[derive(Debug, Deserialize)]
struct IpPrefix {
    ip_prefix: String,
    region: String,
    service: String,
}

/// EC2 Instance Connect source range for `region`.
pub fn instance_connect_cidr(ranges_json: &str, region: &str) -> Result<Ipv4Cidr, TopologyError> {
    let ranges: IpRanges = serde_json::from_str(ranges_json)?;
    ranges
        .prefixes
        .iter()
        .find(|p| p.service == INSTANCE_CONNECT_SERVICE && p.region == region)
        .ok_or_else(|| TopologyError::UnknownRegion(region.to_owned()))?
        .ip_prefix
        .parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "syncToken": "1",
        "prefixes": [
            { "ip_prefix": "3.5.140.0/22", "region": "ap-northeast-2", "service": "AMAZON", "network_border_group": "ap-northeast-2" },
            { "ip_prefix": "3.112.23.0/29", "region": "ap-northeast-1", "service": "EC2_INSTANCE_CONNECT", "network_border_group": "ap-northeast-1" },
            { "ip_prefix": "18.206.107.24/29", "region": "us-east-1", "service": "EC2_INSTANCE_CONNECT", "network_border_group": "us-east-1" }
        ]
    }"#;

    #[test]
    fn finds_region_range() {
        let cidr = instance_connect_cidr(SAMPLE, "ap-northeast-1").unwrap();
        assert_eq!(cidr.to_string(), "3.112.23.0/29");
    }

    #[test]
    fn unknown_region_is_an_error() {
        assert!(matches!(
            instance_connect_cidr(SAMPLE, "ap-northeast-2"),
            Err(TopologyError::UnknownRegion(r)) if r == "ap-northeast-2"
        ));
    }
}
