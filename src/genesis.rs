//! Genesis data shared by every node of the network.
//!
//! All builders here are deterministic: the same topology and key material
//! always produce byte-identical documents, which is what lets every node
//! folder receive the same `genesis.json` and `nodesSetup.json`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::address::{compute_contract_address, Address};
use crate::config::ConfigRoot;
use crate::errors::{LocalnetError, LocalnetResult};
use crate::keys::{Account, KeyMaterial};

pub const ONE_EGLD: u128 = 1_000_000_000_000_000_000;
pub const ENTIRE_SUPPLY: u128 = 20_000_000 * ONE_EGLD;
pub const VALIDATOR_STAKE: u128 = 2_500 * ONE_EGLD;
pub const USER_BALANCE: u128 = 100_000 * ONE_EGLD;

/// User that receives whatever supply is left after fixed allocations.
pub const REMAINDER_NICKNAME: &str = "mike";
/// User owning the genesis smart contracts.
pub const GENESIS_CONTRACTS_OWNER: &str = "alice";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    pub address: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisEntry {
    pub nickname: String,
    pub address: String,
    #[serde(with = "amount")]
    pub supply: u128,
    #[serde(with = "amount")]
    pub balance: u128,
    #[serde(rename = "stakingvalue", with = "amount")]
    pub staking_value: u128,
    pub delegation: Delegation,
}

impl GenesisEntry {
    fn validator(account: &Account, stake: u128) -> Self {
        Self {
            nickname: account.nickname.clone(),
            address: account.address.to_bech32(),
            supply: stake,
            balance: 0,
            staking_value: stake,
            delegation: empty_delegation(),
        }
    }

    fn user(account: &Account, balance: u128) -> Self {
        Self {
            nickname: account.nickname.clone(),
            address: account.address.to_bech32(),
            supply: balance,
            balance,
            staking_value: 0,
            delegation: empty_delegation(),
        }
    }
}

fn empty_delegation() -> Delegation {
    Delegation {
        address: String::new(),
        value: "0".to_string(),
    }
}

/// Builds the genesis accounts: validators first, then users, with
/// [`REMAINDER_NICKNAME`] last and holding the rest of [`ENTIRE_SUPPLY`].
pub fn build_genesis(
    validator_wallets: &[Account],
    users: &BTreeMap<String, Account>,
) -> LocalnetResult<Vec<GenesisEntry>> {
    let remainder_account = users.get(REMAINDER_NICKNAME).ok_or_else(|| {
        LocalnetError::KeyMaterial(format!(
            "user `{REMAINDER_NICKNAME}` is required to receive the remaining supply"
        ))
    })?;

    let mut entries = Vec::with_capacity(validator_wallets.len() + users.len());
    let mut remaining_supply = ENTIRE_SUPPLY;
    let mut allocate = |amount: u128| {
        remaining_supply = remaining_supply.checked_sub(amount).ok_or_else(|| {
            LocalnetError::InvalidConfiguration(
                "fixed genesis allocations exceed the entire supply".to_string(),
            )
        })?;
        Ok::<_, LocalnetError>(amount)
    };

    for wallet in validator_wallets {
        entries.push(GenesisEntry::validator(wallet, allocate(VALIDATOR_STAKE)?));
    }
    for (nickname, account) in users {
        if nickname == REMAINDER_NICKNAME {
            continue;
        }
        entries.push(GenesisEntry::user(account, allocate(USER_BALANCE)?));
    }
    entries.push(GenesisEntry::user(remainder_account, remaining_supply));

    let total: u128 = entries.iter().map(|entry| entry.supply).sum();
    assert_eq!(total, ENTIRE_SUPPLY, "genesis supply must be fully allocated");
    Ok(entries)
}

pub fn build_genesis_for(
    config: &ConfigRoot,
    keys: &KeyMaterial,
) -> LocalnetResult<Vec<GenesisEntry>> {
    let wallets = keys.get_validator_wallets(config.num_all_validators())?;
    let users = keys.get_users()?;
    build_genesis(&wallets, &users)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialNode {
    pub pubkey: String,
    pub address: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodesSetup {
    pub start_time: u64,
    pub round_duration: u64,
    pub consensus_group_size: usize,
    pub min_nodes_per_shard: usize,
    pub meta_chain_consensus_group_size: usize,
    pub meta_chain_min_nodes: usize,
    pub hysteresis: f32,
    pub adaptivity: bool,
    pub initial_nodes: Vec<InitialNode>,
}

/// Builds `nodesSetup.json`. `start_time` is a unix timestamp in seconds.
pub fn build_nodes_setup(
    config: &ConfigRoot,
    keys: &KeyMaterial,
    start_time: u64,
) -> LocalnetResult<NodesSetup> {
    let wallets = keys.get_validator_wallets(config.num_all_validators())?;
    let initial_nodes = config
        .validators()
        .iter()
        .zip(&wallets)
        .map(|(node, wallet)| {
            Ok(InitialNode {
                pubkey: keys.validator_key(node.index)?.public_key,
                address: wallet.address.to_bech32(),
            })
        })
        .collect::<LocalnetResult<Vec<_>>>()?;

    Ok(NodesSetup {
        start_time,
        round_duration: config.general.round_duration_milliseconds,
        consensus_group_size: config.shards.consensus_size,
        min_nodes_per_shard: config.shards.consensus_size,
        meta_chain_consensus_group_size: config.metashard.consensus_size,
        meta_chain_min_nodes: config.metashard.consensus_size,
        hysteresis: 0.0,
        adaptivity: false,
        initial_nodes,
    })
}

pub fn genesis_contracts_owner(keys: &KeyMaterial) -> LocalnetResult<Address> {
    keys.get_users()?
        .remove(GENESIS_CONTRACTS_OWNER)
        .map(|account| account.address)
        .ok_or_else(|| {
            LocalnetError::KeyMaterial(format!(
                "user `{GENESIS_CONTRACTS_OWNER}` is required to own the genesis contracts"
            ))
        })
}

/// The delegation manager is the first contract deployed by the genesis owner.
pub fn delegation_manager_address(owner: &Address) -> Address {
    compute_contract_address(owner, 0)
}

/// Sets the owner of every entry in `genesisSmartContracts.json`.
pub fn patch_genesis_smart_contracts(document: &mut Value, owner: &Address) -> LocalnetResult<()> {
    let contracts = document.as_array_mut().ok_or_else(|| {
        LocalnetError::InvalidConfiguration(
            "genesisSmartContracts.json must contain an array".to_string(),
        )
    })?;
    for contract in contracts {
        let entry = contract.as_object_mut().ok_or_else(|| {
            LocalnetError::InvalidConfiguration(
                "genesisSmartContracts.json entries must be objects".to_string(),
            )
        })?;
        entry.insert("owner".to_string(), Value::String(owner.to_bech32()));
    }
    Ok(())
}

mod amount {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
