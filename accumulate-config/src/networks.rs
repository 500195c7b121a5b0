//! The built-in network catalog.

use crate::config::{ConfigError, NetworkType, NodeType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeSpec {
    pub ip: &'static str,
    pub node_type: NodeType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subnet {
    pub name: &'static str,
    pub network_type: NetworkType,
    pub port: u16,
    pub nodes: &'static [NodeSpec],
}

const fn validator(ip: &'static str) -> NodeSpec {
    NodeSpec {
        ip,
        node_type: NodeType::Validator,
    }
}

static NETWORKS: &[Subnet] = &[
    Subnet {
        name: "BVC0",
        network_type: NetworkType::BlockValidator,
        port: 33000,
        nodes: &[validator("3.140.120.192"), validator("18.220.147.250")],
    },
    Subnet {
        name: "BVC1",
        network_type: NetworkType::BlockValidator,
        port: 33000,
        nodes: &[validator("65.0.156.146"), validator("13.234.254.178")],
    },
    Subnet {
        name: "BVC2",
        network_type: NetworkType::BlockValidator,
        port: 33000,
        nodes: &[validator("13.48.159.117"), validator("16.170.126.251")],
    },
    Subnet {
        name: "EastXeons",
        network_type: NetworkType::BlockValidator,
        port: 33000,
        nodes: &[validator("18.119.26.7"), validator("18.119.149.208")],
    },
    Subnet {
        name: "EastXeons-DC",
        network_type: NetworkType::Directory,
        port: 33100,
        nodes: &[validator("18.119.26.7"), validator("18.119.149.208")],
    },
    Subnet {
        name: "Badlands",
        network_type: NetworkType::BlockValidator,
        port: 35550,
        nodes: &[validator("127.0.0.1")],
    },
    Subnet {
        name: "Localhost",
        network_type: NetworkType::BlockValidator,
        port: 26656,
        nodes: &[
            validator("127.0.1.1"),
            validator("127.0.1.2"),
            validator("127.0.1.3"),
        ],
    },
];

/// Every known subnet.
pub fn all() -> &'static [Subnet] {
    NETWORKS
}

/// Finds a subnet by name, case-insensitively.
pub fn resolve(name: &str) -> Result<&'static Subnet, ConfigError> {
    NETWORKS
        .iter()
        .find(|subnet| subnet.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| ConfigError::UnknownNetwork(name.to_string()))
}

/// The block-validator subnets, in catalog order. The relay treats this as
/// the routing ring.
pub fn block_validators() -> Vec<&'static Subnet> {
    NETWORKS
        .iter()
        .filter(|subnet| subnet.network_type == NetworkType::BlockValidator)
        .collect()
}
