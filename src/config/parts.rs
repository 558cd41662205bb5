use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigPart;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct General {
    pub log_level: String,
    pub genesis_delay_seconds: u64,
    pub rounds_per_epoch: u64,
    pub round_duration_milliseconds: u64,
    pub folder: PathBuf,
    /// Folder holding the pre-generated wallets and node keys.
    pub key_material_folder: PathBuf,
}

impl Default for General {
    fn default() -> Self {
        Self {
            log_level: "*:DEBUG".to_string(),
            genesis_delay_seconds: 10,
            rounds_per_epoch: 100,
            round_duration_milliseconds: 6_000,
            folder: PathBuf::from("localnet"),
            key_material_folder: PathBuf::from("localnet-keys"),
        }
    }
}

impl ConfigPart for General {
    const FIELDS: &'static [&'static str] = &[
        "log_level",
        "genesis_delay_seconds",
        "rounds_per_epoch",
        "round_duration_milliseconds",
        "folder",
        "key_material_folder",
    ];
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Metashard {
    pub consensus_size: usize,
    pub num_observers: usize,
    pub num_validators: usize,
}

impl Default for Metashard {
    fn default() -> Self {
        Self {
            consensus_size: 1,
            num_observers: 0,
            num_validators: 1,
        }
    }
}

impl ConfigPart for Metashard {
    const FIELDS: &'static [&'static str] = &["consensus_size", "num_observers", "num_validators"];
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Shards {
    pub num_shards: usize,
    pub consensus_size: usize,
    pub num_observers_per_shard: usize,
    pub num_validators_per_shard: usize,
}

impl Default for Shards {
    fn default() -> Self {
        Self {
            num_shards: 2,
            consensus_size: 1,
            num_observers_per_shard: 0,
            num_validators_per_shard: 1,
        }
    }
}

impl ConfigPart for Shards {
    const FIELDS: &'static [&'static str] = &[
        "num_shards",
        "consensus_size",
        "num_observers_per_shard",
        "num_validators_per_shard",
    ];
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Networking {
    pub host: String,
    pub port_seednode: u16,
    pub port_seednode_rest_api: u16,
    pub port_proxy: u16,
    pub port_first_observer: u16,
    pub port_first_observer_rest_api: u16,
    pub port_first_validator: u16,
    pub port_first_validator_rest_api: u16,
}

impl Default for Networking {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port_seednode: 9_999,
            port_seednode_rest_api: 10_000,
            port_proxy: 7_950,
            port_first_observer: 21_100,
            port_first_observer_rest_api: 10_100,
            port_first_validator: 21_500,
            port_first_validator_rest_api: 10_200,
        }
    }
}

impl ConfigPart for Networking {
    const FIELDS: &'static [&'static str] = &[
        "host",
        "port_seednode",
        "port_seednode_rest_api",
        "port_proxy",
        "port_first_observer",
        "port_first_observer_rest_api",
        "port_first_validator",
        "port_first_validator_rest_api",
    ];
}
