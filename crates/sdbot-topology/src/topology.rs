use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::TopologyError;
use crate::cidr::Ipv4Cidr;
use crate::user_data::render_user_data;

/// Prefix length of every subnet in the layout.
pub const SUBNET_PREFIX: u8 = 24;

pub const DEFAULT_VPC_CIDR: Ipv4Cidr = Ipv4Cidr::from_parts(Ipv4Addr::new(10, 0, 0, 0), 16);

pub const NAT_INSTANCE_TYPE: &str = "t3.nano";

/// EC2 Instance Connect range for `us-east-1`.
pub const DEFAULT_INSTANCE_CONNECT_CIDR: &str = "18.206.107.24/29";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubnetKind {
    Public,
    /// No internet gateway route; egress only through the NAT instance.
    Isolated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub name: String,
    pub kind: SubnetKind,
    pub cidr: Ipv4Cidr,
    pub availability_zone: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum MachineImage {
    #[serde(rename = "amazon-linux-2")]
    #[strum(serialize = "amazon-linux-2")]
    AmazonLinux2,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NatInstance {
    pub name: String,
    pub instance_type: String,
    pub image: MachineImage,
    /// Name of the public subnet the instance lives in.
    pub subnet: String,
    /// Must be off for the instance to forward traffic it does not own.
    pub source_dest_check: bool,
    pub user_data: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Ingress,
    Egress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Tcp,
    All,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Peer {
    Cidr(Ipv4Cidr),
    /// Members of the rule's own security group.
    SameGroup,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityRule {
    pub direction: Direction,
    pub protocol: Protocol,
    /// `None` means every port.
    pub port: Option<u16>,
    pub peer: Peer,
    pub description: String,
}

impl SecurityRule {
    fn tcp(direction: Direction, port: u16, peer: Ipv4Cidr, description: impl Into<String>) -> Self {
        Self {
            direction,
            protocol: Protocol::Tcp,
            port: Some(port),
            peer: Peer::Cidr(peer),
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub name: String,
    pub rules: Vec<SecurityRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "name")]
pub enum RouteTarget {
    Instance(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Subnet whose route table carries the route.
    pub subnet: String,
    pub destination: Ipv4Cidr,
    pub target: RouteTarget,
}

/// One VPC with a public subnet hosting a NAT instance and isolated subnets
/// that reach the internet only through it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkTopology {
    pub name: String,
    pub vpc_cidr: Ipv4Cidr,
    pub subnets: Vec<Subnet>,
    pub nat_instance: NatInstance,
    pub security_group: SecurityGroup,
    pub routes: Vec<Route>,
}

impl NetworkTopology {
    pub fn builder(name: impl Into<String>) -> TopologyBuilder {
        TopologyBuilder::new(name)
    }

    pub fn subnets_of(&self, kind: SubnetKind) -> impl Iterator<Item = &Subnet> {
        self.subnets.iter().filter(move |s| s.kind == kind)
    }

    pub fn to_json(&self) -> Result<String, TopologyError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone)]
pub struct TopologyBuilder {
    name: String,
    vpc_cidr: Ipv4Cidr,
    availability_zone: String,
    isolated_subnets: u32,
    instance_connect: Option<Ipv4Cidr>,
}

impl TopologyBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vpc_cidr: DEFAULT_VPC_CIDR,
            availability_zone: "us-east-1a".to_owned(),
            isolated_subnets: 1,
            instance_connect: None,
        }
    }

    pub fn vpc_cidr(mut self, cidr: Ipv4Cidr) -> Self {
        self.vpc_cidr = cidr;
        self
    }

    pub fn availability_zone(mut self, zone: impl Into<String>) -> Self {
        self.availability_zone = zone.into();
        self
    }

    pub fn isolated_subnets(mut self, count: u32) -> Self {
        self.isolated_subnets = count;
        self
    }

    /// Source range allowed to reach the NAT instance over SSH. Defaults to
    /// [`DEFAULT_INSTANCE_CONNECT_CIDR`].
    pub fn instance_connect(mut self, cidr: Ipv4Cidr) -> Self {
        self.instance_connect = Some(cidr);
        self
    }

    pub fn build(self) -> Result<NetworkTopology, TopologyError> {
        if self.isolated_subnets == 0 {
            return Err(TopologyError::NoIsolatedSubnets);
        }
        let instance_connect = match self.instance_connect {
            Some(cidr) => cidr,
            None => DEFAULT_INSTANCE_CONNECT_CIDR.parse()?,
        };

        let public = Subnet {
            name: format!("{}-public", self.name),
            kind: SubnetKind::Public,
            cidr: self.vpc_cidr.subnet(SUBNET_PREFIX, 0)?,
            availability_zone: self.availability_zone.clone(),
        };
        let isolated = (0..self.isolated_subnets)
            .map(|i| {
                Ok(Subnet {
                    name: format!("{}-isolated-{}", self.name, i + 1),
                    kind: SubnetKind::Isolated,
                    cidr: self.vpc_cidr.subnet(SUBNET_PREFIX, i + 1)?,
                    availability_zone: self.availability_zone.clone(),
                })
            })
            .collect::<Result<Vec<_>, TopologyError>>()?;

        let nat_instance = NatInstance {
            name: format!("{}-nat", self.name),
            instance_type: NAT_INSTANCE_TYPE.to_owned(),
            image: MachineImage::AmazonLinux2,
            subnet: public.name.clone(),
            source_dest_check: false,
            user_data: render_user_data(),
        };

        let mut rules = Vec::new();
        for subnet in &isolated {
            for port in [80, 443] {
                rules.push(SecurityRule::tcp(
                    Direction::Ingress,
                    port,
                    subnet.cidr,
                    format!("port {port} from {}", subnet.name),
                ));
            }
        }
        for port in [80, 443] {
            rules.push(SecurityRule::tcp(
                Direction::Egress,
                port,
                Ipv4Cidr::ANY,
                format!("port {port} to the internet"),
            ));
        }
        rules.push(SecurityRule::tcp(
            Direction::Ingress,
            22,
            instance_connect,
            "ssh from instance connect",
        ));
        rules.push(SecurityRule {
            direction: Direction::Ingress,
            protocol: Protocol::All,
            port: None,
            peer: Peer::SameGroup,
            description: "all traffic within the group".to_owned(),
        });

        let routes = isolated
            .iter()
            .map(|s| Route {
                subnet: s.name.clone(),
                destination: Ipv4Cidr::ANY,
                target: RouteTarget::Instance(nat_instance.name.clone()),
            })
            .collect();

        let mut subnets = vec![public];
        subnets.extend(isolated);

        Ok(NetworkTopology {
            security_group: SecurityGroup {
                name: format!("{}-nat-sg", self.name),
                rules,
            },
            name: self.name,
            vpc_cidr: self.vpc_cidr,
            subnets,
            nat_instance,
            routes,
        })
    }
}
