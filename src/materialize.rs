//! Writes the on-disk folder tree of a configured network.
//!
//! Every node folder receives a verbatim copy of the software's config
//! template, a handful of targeted patches, and the same genesis and
//! node-setup documents. Configuration is attempted once and is not
//! transactional: a failing node folder is left in place for inspection.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::Value as JsonValue;
use toml::{Table, Value};
use tracing::{error, info};

use crate::address::Address;
use crate::config::ConfigRoot;
use crate::errors::{LocalnetError, LocalnetResult};
use crate::genesis::{
    build_genesis_for, build_nodes_setup, delegation_manager_address, genesis_contracts_owner,
    patch_genesis_smart_contracts, GenesisEntry, NodesSetup,
};
use crate::keys::KeyMaterial;
use crate::software::BinaryParents;
use crate::topology::{Node, NodeRole, CONFIG_FOLDER};

pub const CHAIN_ID: &str = "localnet";
pub const MIN_ROUNDS_BETWEEN_EPOCHS_RATIO: u64 = 4;

pub const NODE_CONFIG_FILE: &str = "config.toml";
pub const API_CONFIG_FILE: &str = "api.toml";
pub const ENABLE_EPOCHS_FILE: &str = "enableEpochs.toml";
pub const P2P_CONFIG_FILE: &str = "p2p.toml";
pub const GENESIS_FILE: &str = "genesis.json";
pub const NODES_SETUP_FILE: &str = "nodesSetup.json";
pub const GENESIS_SMART_CONTRACTS_FILE: &str = "genesisSmartContracts.json";
pub const NODE_KEY_FILE: &str = "validatorKey.pem";
pub const SEEDNODE_KEY_FILE: &str = "p2pKey.pem";

/// Protocol features forced on from the first epochs of a local network.
const FEATURE_ACTIVATION_EPOCHS: &[(&str, i64)] = &[
    ("SCDeployEnableEpoch", 0),
    ("BuiltInFunctionsEnableEpoch", 0),
    ("RelayedTransactionsEnableEpoch", 0),
    ("PenalizedTooMuchGasEnableEpoch", 0),
    ("AheadOfTimeGasUsageEnableEpoch", 0),
    ("GasPriceModifierEnableEpoch", 0),
    ("RepairCallbackEnableEpoch", 0),
    ("ReturnDataToLastTransferEnableEpoch", 0),
    ("SenderInOutTransferEnableEpoch", 0),
    ("StakeEnableEpoch", 0),
    ("DoubleKeyProtectionEnableEpoch", 0),
    ("ESDTEnableEpoch", 0),
    ("RelayedTransactionsV2EnableEpoch", 0),
    ("StakingV2EnableEpoch", 1),
    ("GovernanceEnableEpoch", 1),
    ("DelegationManagerEnableEpoch", 1),
    ("DelegationSmartContractEnableEpoch", 1),
    ("CorrectLastUnjailedEnableEpoch", 1),
    ("BalanceWaitingListsEnableEpoch", 1),
    ("UnbondTokensV2EnableEpoch", 1),
    ("SaveJailedAlwaysEnableEpoch", 1),
    ("ValidatorToDelegationEnableEpoch", 1),
    ("ReDelegateBelowMinCheckEnableEpoch", 1),
    ("WaitingListFixEnableEpoch", 1),
    ("IncrementSCRNonceInMultiTransferEnableEpoch", 1),
    ("ESDTMultiTransferEnableEpoch", 1),
    ("GlobalMintBurnDisableEpoch", 1),
    ("ESDTTransferRoleEnableEpoch", 1),
    ("BuiltInFunctionOnMetaEnableEpoch", 1),
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigureSummary {
    pub root: PathBuf,
    pub validators: usize,
    pub observers: usize,
    pub genesis_owner: Address,
    pub delegation_manager: Address,
}

/// Everything that must be identical across node folders, derived before
/// the filesystem is touched.
struct SharedDocuments {
    genesis: Vec<GenesisEntry>,
    nodes_setup: NodesSetup,
    owner: Address,
    seednode_address: String,
}

pub fn configure_network(
    config: &ConfigRoot,
    software: &BinaryParents,
    keys: &KeyMaterial,
) -> LocalnetResult<ConfigureSummary> {
    let root = config.root_folder();
    if root.exists() {
        return Err(LocalnetError::AlreadyExists(root));
    }

    let seednode_key = keys.seednode_key()?;
    let owner = genesis_contracts_owner(keys)?;
    let shared = SharedDocuments {
        genesis: build_genesis_for(config, keys)?,
        nodes_setup: build_nodes_setup(config, keys, genesis_start_time(config)?)?,
        owner,
        seednode_address: config.seednode_address(&seednode_key.public_key),
    };
    let nodes = config.all_nodes();
    let node_keys = nodes
        .iter()
        .map(|node| match node.role {
            NodeRole::Validator => keys.validator_key(node.index),
            NodeRole::Observer => keys.observer_key(node.index),
        })
        .collect::<LocalnetResult<Vec<_>>>()?;

    fs::create_dir_all(&root).map_err(|err| LocalnetError::io(&root, err))?;
    info!(target = "localnet::configure", root = %root.display(), "writing network folders");

    materialize_seednode(config, software, &seednode_key.pem_path)?;

    for (node, key) in nodes.iter().zip(&node_keys) {
        materialize_node(config, software, node, &key.pem_path, &shared).map_err(|err| {
            error!(
                target = "localnet::configure",
                label = %node.label(),
                "unable to configure node folder: {err}"
            );
            err
        })?;
    }

    materialize_proxy(config, software)?;

    let delegation_manager = delegation_manager_address(&shared.owner);
    info!(
        target = "localnet::configure",
        nodes = nodes.len(),
        owner = %shared.owner,
        delegation_manager = %delegation_manager,
        "network configured"
    );

    Ok(ConfigureSummary {
        root,
        validators: config.num_all_validators(),
        observers: config.num_all_observers(),
        genesis_owner: shared.owner,
        delegation_manager,
    })
}

fn materialize_seednode(
    config: &ConfigRoot,
    software: &BinaryParents,
    key_file: &Path,
) -> LocalnetResult<()> {
    let folder = config.seednode_folder();
    let config_folder = folder.join(CONFIG_FOLDER);
    copy_dir_all(&software.seednode_config(), &config_folder)?;
    copy_file(&software.seednode_binary(), &folder.join("seednode"))?;
    copy_file(key_file, &config_folder.join(SEEDNODE_KEY_FILE))?;

    let port = config.networking.port_seednode;
    patch_toml_file(&config_folder.join(P2P_CONFIG_FILE), |table| {
        patch_seednode_p2p(table, port)
    })
}

fn materialize_node(
    config: &ConfigRoot,
    software: &BinaryParents,
    node: &Node,
    key_file: &Path,
    shared: &SharedDocuments,
) -> LocalnetResult<()> {
    let config_folder = node.config_folder();
    copy_dir_all(&software.node_config(), &config_folder)?;
    copy_node_binary(software, &node.folder)?;
    copy_file(key_file, &config_folder.join(NODE_KEY_FILE))?;

    patch_toml_file(&config_folder.join(NODE_CONFIG_FILE), |table| {
        patch_node_config(table, config)
    })?;
    patch_toml_file(&config_folder.join(API_CONFIG_FILE), patch_api_config)?;
    patch_toml_file(&config_folder.join(ENABLE_EPOCHS_FILE), patch_enable_epochs)?;
    patch_toml_file(&config_folder.join(P2P_CONFIG_FILE), |table| {
        patch_node_p2p(table, node, &shared.seednode_address)
    })?;

    let contracts_path = config_folder.join(GENESIS_SMART_CONTRACTS_FILE);
    let mut contracts = read_json(&contracts_path)?;
    patch_genesis_smart_contracts(&mut contracts, &shared.owner)?;
    write_json(&contracts_path, &contracts)?;

    write_json(&config_folder.join(GENESIS_FILE), &shared.genesis)?;
    write_json(&config_folder.join(NODES_SETUP_FILE), &shared.nodes_setup)
}

fn materialize_proxy(config: &ConfigRoot, software: &BinaryParents) -> LocalnetResult<()> {
    let folder = config.proxy_folder();
    let config_folder = folder.join(CONFIG_FOLDER);
    copy_dir_all(&software.proxy_config(), &config_folder)?;
    copy_file(&software.proxy_binary(), &folder.join("proxy"))?;
    patch_toml_file(&config_folder.join(NODE_CONFIG_FILE), |table| {
        patch_proxy_config(table, config)
    })
}

/// Rewrites `startTime` in every node's `nodesSetup.json` so genesis lies
/// `genesis_delay_seconds` in the future, identically for all nodes.
pub fn refresh_genesis_time(config: &ConfigRoot) -> LocalnetResult<u64> {
    let start_time = genesis_start_time(config)?;
    for node in config.all_nodes() {
        let path = node.config_folder().join(NODES_SETUP_FILE);
        let mut document = read_json(&path)?;
        let object = document.as_object_mut().ok_or_else(|| {
            LocalnetError::InvalidConfiguration(format!(
                "{} does not contain an object",
                path.display()
            ))
        })?;
        object.insert("startTime".to_string(), JsonValue::from(start_time));
        write_json(&path, &document)?;
    }
    Ok(start_time)
}

fn genesis_start_time(config: &ConfigRoot) -> LocalnetResult<u64> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).map_err(|err| {
        LocalnetError::InvalidConfiguration(format!("system clock is before the unix epoch: {err}"))
    })?;
    Ok(now.as_secs() + config.general.genesis_delay_seconds)
}

pub fn patch_node_config(table: &mut Table, config: &ConfigRoot) -> LocalnetResult<()> {
    table_mut(table, "GeneralSettings")?.insert("ChainID".to_string(), Value::from(CHAIN_ID));

    table_mut(table, "DbLookupExtensions")?.insert("Enabled".to_string(), Value::from(true));
    table_mut(table, "StateTriesConfig")?
        .insert("AccountsStatePruningEnabled".to_string(), Value::from(false));
    let pruning = table_mut(table, "StoragePruning")?;
    pruning.insert("ObserverCleanOldEpochsData".to_string(), Value::from(false));
    pruning.insert("AccountsTrieCleanOldEpochsData".to_string(), Value::from(false));

    let rounds_per_epoch = config.general.rounds_per_epoch;
    let epoch_start = table_mut(table, "EpochStartConfig")?;
    epoch_start.insert(
        "RoundsPerEpoch".to_string(),
        Value::from(toml_integer(rounds_per_epoch)?),
    );
    epoch_start.insert(
        "MinRoundsBetweenEpochs".to_string(),
        Value::from(toml_integer(rounds_per_epoch / MIN_ROUNDS_BETWEEN_EPOCHS_RATIO)?),
    );

    let virtual_machine = table_mut(table, "VirtualMachine")?;
    for section in ["Execution", "Querying"] {
        table_mut(virtual_machine, section)?.insert(
            "WasmVMVersions".to_string(),
            Value::Array(vec![open_ended_vm_version()]),
        );
    }
    Ok(())
}

fn open_ended_vm_version() -> Value {
    let mut version = Table::new();
    version.insert("StartEpoch".to_string(), Value::from(0));
    version.insert("Version".to_string(), Value::from("*"));
    Value::Table(version)
}

/// Opens every transaction route of the REST API.
pub fn patch_api_config(table: &mut Table) -> LocalnetResult<()> {
    let routes = table_mut(table_mut(table, "APIPackages")?, "transaction")?
        .get_mut("Routes")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| {
            LocalnetError::InvalidConfiguration(
                "api template has no APIPackages.transaction.Routes array".to_string(),
            )
        })?;
    for route in routes {
        let route = route.as_table_mut().ok_or_else(|| {
            LocalnetError::InvalidConfiguration("api route entries must be tables".to_string())
        })?;
        route.insert("Open".to_string(), Value::from(true));
    }
    Ok(())
}

pub fn patch_enable_epochs(table: &mut Table) -> LocalnetResult<()> {
    let epochs = table_mut(table, "EnableEpochs")?;
    for (flag, epoch) in FEATURE_ACTIVATION_EPOCHS {
        epochs.insert((*flag).to_string(), Value::from(*epoch));
    }
    Ok(())
}

pub fn patch_node_p2p(
    table: &mut Table,
    node: &Node,
    seednode_address: &str,
) -> LocalnetResult<()> {
    table_mut(table, "Node")?.insert("Port".to_string(), Value::from(node.p2p_port.to_string()));
    table_mut(table, "KadDhtPeerDiscovery")?.insert(
        "InitialPeerList".to_string(),
        Value::Array(vec![Value::from(seednode_address)]),
    );
    Ok(())
}

pub fn patch_seednode_p2p(table: &mut Table, port: u16) -> LocalnetResult<()> {
    table_mut(table, "Node")?.insert("Port".to_string(), Value::from(port.to_string()));
    Ok(())
}

pub fn patch_proxy_config(table: &mut Table, config: &ConfigRoot) -> LocalnetResult<()> {
    table_mut(table, "GeneralSettings")?.insert(
        "ServerPort".to_string(),
        Value::from(i64::from(config.networking.port_proxy)),
    );
    let observers = Value::try_from(config.proxy_observers())?;
    table.insert("Observers".to_string(), observers.clone());
    table.insert("FullHistoryNodes".to_string(), observers);
    Ok(())
}

fn table_mut<'a>(table: &'a mut Table, key: &str) -> LocalnetResult<&'a mut Table> {
    table
        .entry(key)
        .or_insert(Value::Table(Table::new()))
        .as_table_mut()
        .ok_or_else(|| {
            LocalnetError::InvalidConfiguration(format!("template key `{key}` is not a table"))
        })
}

fn toml_integer(value: u64) -> LocalnetResult<i64> {
    i64::try_from(value).map_err(|_| {
        LocalnetError::InvalidConfiguration(format!("{value} does not fit a TOML integer"))
    })
}

fn patch_toml_file<F>(path: &Path, patch: F) -> LocalnetResult<()>
where
    F: FnOnce(&mut Table) -> LocalnetResult<()>,
{
    let content = fs::read_to_string(path).map_err(|err| LocalnetError::io(path, err))?;
    let mut table: Table = toml::from_str(&content).map_err(|err| LocalnetError::toml(path, err))?;
    patch(&mut table)?;
    let encoded = toml::to_string_pretty(&table)?;
    fs::write(path, encoded).map_err(|err| LocalnetError::io(path, err))
}

fn read_json(path: &Path) -> LocalnetResult<JsonValue> {
    let content = fs::read_to_string(path).map_err(|err| LocalnetError::io(path, err))?;
    serde_json::from_str(&content).map_err(|err| LocalnetError::json(path, err))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> LocalnetResult<()> {
    let mut encoded =
        serde_json::to_string_pretty(value).map_err(|err| LocalnetError::json(path, err))?;
    encoded.push('\n');
    fs::write(path, encoded).map_err(|err| LocalnetError::io(path, err))
}

fn copy_file(source: &Path, destination: &Path) -> LocalnetResult<()> {
    if !source.is_file() {
        return Err(LocalnetError::MissingSoftware(source.to_path_buf()));
    }
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|err| LocalnetError::io(parent, err))?;
    }
    fs::copy(source, destination).map_err(|err| LocalnetError::io(destination, err))?;
    Ok(())
}

/// Copies the node binary together with any shared library next to it.
fn copy_node_binary(software: &BinaryParents, folder: &Path) -> LocalnetResult<()> {
    copy_file(&software.node_binary(), &folder.join("node"))?;

    let entries =
        fs::read_dir(&software.node).map_err(|err| LocalnetError::io(&software.node, err))?;
    for entry in entries {
        let path = entry.map_err(|err| LocalnetError::io(&software.node, err))?.path();
        let is_library = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("so") | Some("dylib")
        );
        if let (true, Some(name)) = (is_library, path.file_name()) {
            copy_file(&path, &folder.join(name))?;
        }
    }
    Ok(())
}

pub fn copy_dir_all(source: &Path, destination: &Path) -> LocalnetResult<()> {
    fs::create_dir_all(destination).map_err(|err| LocalnetError::io(destination, err))?;
    let entries = fs::read_dir(source).map_err(|err| LocalnetError::io(source, err))?;
    for entry in entries {
        let entry = entry.map_err(|err| LocalnetError::io(source, err))?;
        let path = entry.path();
        let target = destination.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(|err| LocalnetError::io(&path, err))?;
        if file_type.is_dir() {
            copy_dir_all(&path, &target)?;
        } else {
            fs::copy(&path, &target).map_err(|err| LocalnetError::io(&target, err))?;
        }
    }
    Ok(())
}
