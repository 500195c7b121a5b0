//! Materialization of node directory trees.
//!
//! These functions form the on-disk interface between the CLI and the node:
//! one directory per node, holding the two config files and an empty data
//! directory. Errors are returned; the CLI layer formats them and decides
//! the exit code.

use std::fs;
use std::io::Write;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use crate::config::{Config, ConfigError, NetworkType, NodeType};
use crate::networks;

/// Options for materializing one subnet's nodes.
#[derive(Debug, Clone)]
pub struct InitOptions {
    pub work_dir: PathBuf,
    pub subnet_id: String,
    pub port: u16,
    pub configs: Vec<Config>,
    pub listen_ip: Vec<String>,
}

/// Writes `node0`, `node1`, … directory trees under the working directory.
pub fn materialize(options: &InitOptions) -> Result<(), ConfigError> {
    if options.configs.len() != options.listen_ip.len() {
        return Err(ConfigError::Invalid(
            "one listen address per config required".into(),
        ));
    }

    for (i, config) in options.configs.iter().enumerate() {
        let mut config = config.clone();
        config.consensus.moniker = format!("{}.{i}", options.subnet_id);
        config.consensus.listen_address = format!("{}:{}", options.listen_ip[i], options.port);

        let node_dir = options.work_dir.join(format!("node{i}"));
        config.store(&node_dir)?;
        fs::create_dir_all(node_dir.join("data"))?;
    }
    Ok(())
}

/// Builds configs for a catalog network and materializes its nodes.
pub fn init_network(
    work_dir: &Path,
    network: &str,
    no_empty_blocks: bool,
    no_website: bool,
) -> Result<(), ConfigError> {
    let subnet = networks::resolve(network)?;

    // The relay list: for a block validator, every block-validator subnet in
    // catalog order; a directory subnet relays only to itself.
    let relay_to: Vec<String> = match subnet.network_type {
        NetworkType::Directory => vec![subnet.name.to_string()],
        NetworkType::BlockValidator => networks::block_validators()
            .iter()
            .map(|s| s.name.to_string())
            .collect(),
    };

    let mut configs = Vec::with_capacity(subnet.nodes.len());
    let mut listen_ip = Vec::with_capacity(subnet.nodes.len());
    for node in subnet.nodes {
        let mut config = Config::default_for(subnet.network_type, node.node_type);
        config.accumulate.network = subnet.name.to_string();
        config.accumulate.networks = relay_to.clone();
        if no_empty_blocks {
            config.consensus.create_empty_blocks = false;
        }
        if no_website {
            config.accumulate.website_enabled = false;
        }
        configs.push(config);
        listen_ip.push("tcp://0.0.0.0".to_string());
    }

    materialize(&InitOptions {
        work_dir: work_dir.to_path_buf(),
        subnet_id: subnet.name.to_string(),
        port: subnet.port,
        configs,
        listen_ip,
    })
}

/// Bootstraps a follower for a catalog network.
///
/// The genesis document either comes from the given file or is fetched from
/// a catalog peer through `fetch`, with an explicit warning: the peer must
/// be trusted.
pub fn init_follower(
    work_dir: &Path,
    network: &str,
    listen: &str,
    genesis_doc: Option<&Path>,
    mut fetch: impl FnMut(&str) -> Result<Vec<u8>, String>,
) -> Result<(), ConfigError> {
    let subnet = networks::resolve(network)?;

    let (host, port) = parse_listen(listen)?;

    let genesis = match genesis_doc {
        Some(path) => fs::read(path)?,
        None => {
            let peer = subnet
                .nodes
                .first()
                .ok_or_else(|| ConfigError::Invalid("network has no nodes".into()))?;
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "WARNING!!! You are fetching the Genesis document from {ip}! \
                 Only do this if you trust {ip} and your connection to it!",
                ip = peer.ip
            );
            fetch(peer.ip).map_err(ConfigError::Invalid)?
        }
    };

    let mut config = Config::default_for(subnet.network_type, NodeType::Follower);
    config.accumulate.network = subnet.name.to_string();
    config.consensus.persistent_peers = subnet
        .nodes
        .iter()
        .map(|n| format!("{}:{}", n.ip, subnet.port))
        .collect::<Vec<_>>()
        .join(",");

    materialize(&InitOptions {
        work_dir: work_dir.to_path_buf(),
        subnet_id: subnet.name.to_string(),
        port,
        configs: vec![config],
        listen_ip: vec![host],
    })?;

    fs::write(work_dir.join("node0").join("config").join("genesis.json"), genesis)?;
    Ok(())
}

fn parse_listen(listen: &str) -> Result<(String, u16), ConfigError> {
    let rest = listen
        .strip_prefix("tcp://")
        .ok_or_else(|| ConfigError::Invalid(format!("invalid listen address {listen:?}")))?;
    match rest.rsplit_once(':') {
        Some((host, port)) => {
            let port: u16 = port
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("invalid port number {port:?}")))?;
            Ok((format!("tcp://{host}"), port))
        }
        None => Ok((listen.to_string(), 26656)),
    }
}

/// Options for a local multi-node cluster.
#[derive(Debug, Clone)]
pub struct DevnetOptions {
    pub work_dir: PathBuf,
    pub name: String,
    pub directory_nodes: usize,
    pub validators: usize,
    pub followers: usize,
    pub base_port: u16,
    pub base_ip: Ipv4Addr,
}

impl Default for DevnetOptions {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::new(),
            name: "DevNet".into(),
            directory_nodes: 1,
            validators: 2,
            followers: 1,
            base_port: 26656,
            base_ip: Ipv4Addr::new(127, 0, 1, 1),
        }
    }
}

/// Generates a local cluster: directory nodes under `dn/`, block-validator
/// nodes under `bvn/`, each on the next successive IP.
pub fn devnet(options: &DevnetOptions) -> Result<(), ConfigError> {
    if options.directory_nodes == 0 {
        return Err(ConfigError::Invalid(
            "must have at least one directory node".into(),
        ));
    }
    if options.validators == 0 {
        return Err(ConfigError::Invalid(
            "must have at least one block validator node".into(),
        ));
    }
    if options.base_ip.octets()[3] == 0 {
        return Err(ConfigError::Invalid(
            "base IP address must not end with .0".into(),
        ));
    }

    let total = options.directory_nodes + options.validators + options.followers;
    let mut ips = Vec::with_capacity(total);
    let mut ip = options.base_ip;
    for _ in 0..total {
        ips.push(format!("tcp://{ip}"));
        let mut octets = ip.octets();
        octets[3] = octets[3].wrapping_add(1);
        ip = Ipv4Addr::from(octets);
    }

    let directory_endpoint = format!("{}:{}", ips[0], options.base_port);
    let bvn_endpoint = format!("{}:{}", ips[options.directory_nodes], options.base_port);

    let mut build = |network_type: NetworkType, node_type: NodeType| {
        let mut config = Config::default_for(network_type, node_type);
        config.accumulate.network = options.name.clone();
        if network_type == NetworkType::Directory {
            config.accumulate.networks = vec![directory_endpoint.clone()];
        } else {
            config.accumulate.directory = directory_endpoint.clone();
            config.accumulate.networks = vec![bvn_endpoint.clone()];
        }
        config
    };

    let mut dir_configs = Vec::new();
    for _ in 0..options.directory_nodes {
        dir_configs.push(build(NetworkType::Directory, NodeType::Validator));
    }
    let mut bvn_configs = Vec::new();
    for _ in 0..options.validators {
        bvn_configs.push(build(NetworkType::BlockValidator, NodeType::Validator));
    }
    for _ in 0..options.followers {
        bvn_configs.push(build(NetworkType::BlockValidator, NodeType::Follower));
    }

    materialize(&InitOptions {
        work_dir: options.work_dir.join("dn"),
        subnet_id: options.name.clone(),
        port: options.base_port,
        configs: dir_configs,
        listen_ip: ips[..options.directory_nodes].to_vec(),
    })?;
    materialize(&InitOptions {
        work_dir: options.work_dir.join("bvn"),
        subnet_id: options.name.clone(),
        port: options.base_port,
        configs: bvn_configs,
        listen_ip: ips[options.directory_nodes..].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_network_materializes_every_node() {
        let dir = tempfile::tempdir().unwrap();
        init_network(dir.path(), "localhost", true, true).unwrap();

        for i in 0..3 {
            let node = dir.path().join(format!("node{i}"));
            assert!(node.join("config").join("config.toml").is_file());
            assert!(node.join("config").join("accumulate.toml").is_file());
            assert!(node.join("data").is_dir());

            let config = Config::load(&node).unwrap();
            assert_eq!(config.accumulate.network, "Localhost");
            assert!(!config.consensus.create_empty_blocks);
            assert!(!config.accumulate.website_enabled);
        }
    }

    #[test]
    fn devnet_rejects_ip_ending_in_zero() {
        let dir = tempfile::tempdir().unwrap();
        let options = DevnetOptions {
            work_dir: dir.path().to_path_buf(),
            base_ip: Ipv4Addr::new(127, 0, 1, 0),
            ..DevnetOptions::default()
        };
        assert!(matches!(devnet(&options), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn devnet_assigns_successive_ips() {
        let dir = tempfile::tempdir().unwrap();
        let options = DevnetOptions {
            work_dir: dir.path().to_path_buf(),
            ..DevnetOptions::default()
        };
        devnet(&options).unwrap();

        let dn0 = Config::load(&dir.path().join("dn").join("node0")).unwrap();
        assert_eq!(dn0.consensus.listen_address, "tcp://127.0.1.1:26656");
        assert_eq!(dn0.accumulate.network_type, NetworkType::Directory);

        let bvn0 = Config::load(&dir.path().join("bvn").join("node0")).unwrap();
        assert_eq!(bvn0.consensus.listen_address, "tcp://127.0.1.2:26656");
        assert_eq!(bvn0.accumulate.directory, "tcp://127.0.1.1:26656");

        let bvn2 = Config::load(&dir.path().join("bvn").join("node2")).unwrap();
        assert_eq!(bvn2.consensus.listen_address, "tcp://127.0.1.4:26656");
    }

    #[test]
    fn devnet_requires_validators() {
        let dir = tempfile::tempdir().unwrap();
        let options = DevnetOptions {
            work_dir: dir.path().to_path_buf(),
            validators: 0,
            ..DevnetOptions::default()
        };
        assert!(devnet(&options).is_err());
    }

    #[test]
    fn follower_init_uses_supplied_genesis_doc() {
        let dir = tempfile::tempdir().unwrap();
        let genesis = dir.path().join("genesis.json");
        fs::write(&genesis, b"{}").unwrap();

        init_follower(
            dir.path(),
            "badlands",
            "tcp://1.2.3.4:5678",
            Some(&genesis),
            |_| panic!("must not fetch when a genesis doc is supplied"),
        )
        .unwrap();

        let node = dir.path().join("node0");
        let config = Config::load(&node).unwrap();
        assert_eq!(config.consensus.listen_address, "tcp://1.2.3.4:5678");
        assert_eq!(config.consensus.persistent_peers, "127.0.0.1:35550");
        assert_eq!(
            fs::read(node.join("config").join("genesis.json")).unwrap(),
            b"{}"
        );
    }
}
