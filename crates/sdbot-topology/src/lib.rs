//! Declarative network layout for the compute subnet.
//!
//! The image-generation runtime runs in isolated subnets and reaches the
//! internet through a single NAT instance in a public subnet. This crate
//! only describes that layout; provisioning is left to whatever tool
//! consumes the JSON.

pub mod cidr;
pub mod ranges;
pub mod topology;
pub mod user_data;

use thiserror::Error;

pub use cidr::Ipv4Cidr;
pub use ranges::instance_connect_cidr;
pub use topology::{NetworkTopology, TopologyBuilder};
pub use user_data::render_user_data;

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("invalid CIDR `{0}`")]
    InvalidCidr(String),

    #[error("CIDR `{0}` has host bits set")]
    HostBitsSet(String),

    #[error("cannot carve /{prefix} subnets from {parent}")]
    SubnetPrefix { parent: Ipv4Cidr, prefix: u8 },

    #[error("{parent} has room for fewer than {needed} /{prefix} subnets")]
    SubnetExhausted {
        parent: Ipv4Cidr,
        prefix: u8,
        needed: u64,
    },

    #[error("at least one isolated subnet is required")]
    NoIsolatedSubnets,

    #[error("no instance connect range published for region `{0}`")]
    UnknownRegion(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
