//! Node enumeration derived from a [`ConfigRoot`].
//!
//! Everything here is a pure function of the configuration: calling it twice
//! yields the same nodes in the same order.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::ConfigRoot;

/// Shard id used by the metachain in node and proxy configuration files.
pub const METACHAIN_SHARD_ID: u32 = u32::MAX;

pub const SEEDNODE_FOLDER: &str = "seednode";
pub const PROXY_FOLDER: &str = "proxy";
pub const CONFIG_FOLDER: &str = "config";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShardId {
    Shard(u32),
    Metachain,
}

impl ShardId {
    pub fn as_u32(self) -> u32 {
        match self {
            ShardId::Shard(id) => id,
            ShardId::Metachain => METACHAIN_SHARD_ID,
        }
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShardId::Shard(id) => write!(f, "{id}"),
            ShardId::Metachain => f.write_str("metachain"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeRole {
    Validator,
    Observer,
}

impl NodeRole {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeRole::Validator => "validator",
            NodeRole::Observer => "observer",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub role: NodeRole,
    pub index: usize,
    pub folder: PathBuf,
    pub shard: ShardId,
    pub host: String,
    pub api_port: u16,
    pub p2p_port: u16,
}

impl Node {
    /// Folder name, e.g. `validator00`.
    pub fn label(&self) -> String {
        node_folder_name(self.role, self.index)
    }

    pub fn config_folder(&self) -> PathBuf {
        self.folder.join(CONFIG_FOLDER)
    }

    pub fn api_address(&self) -> String {
        format!("http://{}:{}", self.host, self.api_port)
    }
}

/// Entry of the proxy's `Observers` list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyObserver {
    #[serde(rename = "ShardId")]
    pub shard_id: u32,
    #[serde(rename = "Address")]
    pub address: String,
}

pub fn node_folder_name(role: NodeRole, index: usize) -> String {
    format!("{}{index:02}", role.as_str())
}

/// Shard of the `index`-th node of a role with `per_shard` nodes per shard.
/// Nodes past the last regular shard belong to the metachain.
pub fn assign_shard(index: usize, per_shard: usize, num_shards: usize) -> ShardId {
    if per_shard == 0 {
        return ShardId::Metachain;
    }
    let shard = index / per_shard;
    if shard >= num_shards {
        return ShardId::Metachain;
    }
    let shard = u32::try_from(shard).unwrap_or(METACHAIN_SHARD_ID);
    assert!(
        shard < METACHAIN_SHARD_ID,
        "shard index {shard} collides with the metachain id"
    );
    ShardId::Shard(shard)
}

fn port_at(first: u16, index: usize) -> u16 {
    let port = usize::from(first) + index;
    assert!(
        port <= usize::from(u16::MAX),
        "port {port} out of range for node {index}"
    );
    port as u16
}

impl ConfigRoot {
    /// Saturates instead of overflowing; [`ConfigRoot::validate`] rejects
    /// counts that do not fit the port space.
    pub fn num_all_validators(&self) -> usize {
        self.shards
            .num_shards
            .saturating_mul(self.shards.num_validators_per_shard)
            .saturating_add(self.metashard.num_validators)
    }

    pub fn num_all_observers(&self) -> usize {
        self.shards
            .num_shards
            .saturating_mul(self.shards.num_observers_per_shard)
            .saturating_add(self.metashard.num_observers)
    }

    pub fn num_all_nodes(&self) -> usize {
        self.num_all_validators()
            .saturating_add(self.num_all_observers())
    }

    pub fn seednode_folder(&self) -> PathBuf {
        self.root_folder().join(SEEDNODE_FOLDER)
    }

    pub fn proxy_folder(&self) -> PathBuf {
        self.root_folder().join(PROXY_FOLDER)
    }

    pub fn validators(&self) -> Vec<Node> {
        self.nodes_of(
            NodeRole::Validator,
            self.num_all_validators(),
            self.shards.num_validators_per_shard,
            self.networking.port_first_validator,
            self.networking.port_first_validator_rest_api,
        )
    }

    pub fn observers(&self) -> Vec<Node> {
        self.nodes_of(
            NodeRole::Observer,
            self.num_all_observers(),
            self.shards.num_observers_per_shard,
            self.networking.port_first_observer,
            self.networking.port_first_observer_rest_api,
        )
    }

    /// Validators first, then observers.
    pub fn all_nodes(&self) -> Vec<Node> {
        let mut nodes = self.validators();
        nodes.extend(self.observers());
        nodes
    }

    /// Multiaddress every node uses to bootstrap peer discovery.
    pub fn seednode_address(&self, seednode_peer_id: &str) -> String {
        format!(
            "/ip4/{}/tcp/{}/p2p/{seednode_peer_id}",
            self.networking.host, self.networking.port_seednode
        )
    }

    pub fn proxy_observers(&self) -> Vec<ProxyObserver> {
        self.all_nodes()
            .into_iter()
            .map(|node| ProxyObserver {
                shard_id: node.shard.as_u32(),
                address: node.api_address(),
            })
            .collect()
    }

    fn nodes_of(
        &self,
        role: NodeRole,
        count: usize,
        per_shard: usize,
        first_p2p_port: u16,
        first_api_port: u16,
    ) -> Vec<Node> {
        let root = self.root_folder();
        (0..count)
            .map(|index| Node {
                role,
                index,
                folder: root.join(node_folder_name(role, index)),
                shard: assign_shard(index, per_shard, self.shards.num_shards),
                host: self.networking.host.clone(),
                api_port: port_at(first_api_port, index),
                p2p_port: port_at(first_p2p_port, index),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn topology(shards: usize, validators: usize, observers: usize, meta: usize) -> ConfigRoot {
        let mut config = ConfigRoot::default();
        config.shards.num_shards = shards;
        config.shards.num_validators_per_shard = validators;
        config.shards.num_observers_per_shard = observers;
        config.metashard.num_validators = meta;
        config
    }

    #[test]
    fn counts_and_shards_stay_in_range() {
        for shards in 1..=4 {
            for per_shard in 1..=3 {
                for meta in 1..=3 {
                    let config = topology(shards, per_shard, 1, meta);
                    let validators = config.validators();
                    assert_eq!(validators.len(), shards * per_shard + meta);

                    for node in &validators {
                        match node.shard {
                            ShardId::Shard(id) => assert!((id as usize) < shards),
                            ShardId::Metachain => {}
                        }
                    }
                    let metachain = validators
                        .iter()
                        .filter(|node| node.shard == ShardId::Metachain)
                        .count();
                    assert_eq!(metachain, meta);
                }
            }
        }
    }

    #[test]
    fn enumeration_is_idempotent() {
        let config = topology(3, 2, 1, 2);
        assert_eq!(config.validators(), config.validators());
        assert_eq!(config.observers(), config.observers());
    }

    #[test]
    fn small_network_layout() {
        let config = topology(2, 1, 0, 1);
        let validators = config.validators();

        let labels: Vec<String> = validators.iter().map(Node::label).collect();
        assert_eq!(labels, ["validator00", "validator01", "validator02"]);
        let shards: BTreeSet<ShardId> = validators.iter().map(|node| node.shard).collect();
        assert_eq!(
            shards,
            BTreeSet::from([ShardId::Shard(0), ShardId::Shard(1), ShardId::Metachain])
        );
        assert!(config.observers().is_empty());
    }

    #[test]
    fn ports_are_contiguous_per_role() {
        let config = topology(2, 2, 1, 1);
        let validators = config.validators();
        for (offset, node) in validators.iter().enumerate() {
            assert_eq!(
                node.api_port,
                config.networking.port_first_validator_rest_api + offset as u16
            );
            assert_eq!(node.p2p_port, config.networking.port_first_validator + offset as u16);
        }
        let observers = config.observers();
        assert_eq!(observers.len(), 2);
        assert_eq!(
            observers[1].api_address(),
            format!(
                "http://127.0.0.1:{}",
                config.networking.port_first_observer_rest_api + 1
            )
        );
    }

    #[test]
    fn zero_observers_per_shard_puts_observers_on_metachain() {
        assert_eq!(assign_shard(0, 0, 2), ShardId::Metachain);
        let mut config = topology(2, 1, 0, 1);
        config.metashard.num_observers = 2;
        assert!(config
            .observers()
            .iter()
            .all(|node| node.shard == ShardId::Metachain));
    }

    #[test]
    fn proxy_observers_use_numeric_metachain_id() {
        let config = topology(1, 1, 0, 1);
        let observers = config.proxy_observers();
        assert_eq!(observers.len(), 2);
        assert_eq!(observers[0].shard_id, 0);
        assert_eq!(observers[1].shard_id, METACHAIN_SHARD_ID);
    }

    #[test]
    fn folder_names_sort_in_enumeration_order() {
        let config = topology(4, 3, 0, 2);
        let labels: Vec<String> = config.validators().iter().map(Node::label).collect();
        let mut sorted = labels.clone();
        sorted.sort();
        assert_eq!(labels, sorted);
    }
}
