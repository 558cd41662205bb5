//! Declarative description of a local network.
//!
//! A [`ConfigRoot`] starts from hard-coded defaults and is optionally
//! overridden once from a TOML document. Every section is a [`ConfigPart`]
//! that names the fields it accepts; overriding entries outside that list
//! is rejected before anything is mutated.

mod parts;
mod software;

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use toml::{Table, Value};

use crate::errors::{LocalnetError, LocalnetResult};

pub use parts::{General, Metashard, Networking, Shards};
pub use software::{Software, SoftwarePiece, SoftwareResolution};

/// A configuration section with a closed set of overridable fields.
pub trait ConfigPart: Serialize + DeserializeOwned {
    const FIELDS: &'static [&'static str];

    /// Applies `patch` to this section. Validation happens before mutation,
    /// so a rejected patch leaves the section untouched.
    fn override_with(&mut self, section: &str, patch: &Table) -> LocalnetResult<()> {
        validate_overriding_entries(section, Self::FIELDS, patch)?;

        let mut merged = section_table(self, section)?;
        for (key, value) in patch {
            merged.insert(key.clone(), value.clone());
        }
        let updated: Self = Value::Table(merged).try_into().map_err(|err| {
            LocalnetError::InvalidConfiguration(format!("section `{section}`: {err}"))
        })?;
        *self = updated;
        Ok(())
    }
}

pub(crate) fn validate_overriding_entries(
    section: &str,
    allowed: &[&str],
    patch: &Table,
) -> LocalnetResult<()> {
    let unknown: Vec<String> = patch
        .keys()
        .filter(|key| !allowed.contains(&key.as_str()))
        .cloned()
        .collect();
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(LocalnetError::UnknownConfiguration {
            section: section.to_string(),
            keys: unknown,
        })
    }
}

fn section_table<T: Serialize>(part: &T, section: &str) -> LocalnetResult<Table> {
    match Value::try_from(part)? {
        Value::Table(table) => Ok(table),
        other => Err(LocalnetError::InvalidConfiguration(format!(
            "section `{section}` serialized to a {} instead of a table",
            other.type_str()
        ))),
    }
}

pub(crate) fn expect_table<'a>(section: &str, value: &'a Value) -> LocalnetResult<&'a Table> {
    value.as_table().ok_or_else(|| {
        LocalnetError::InvalidConfiguration(format!(
            "section `{section}` must be a table, found a {}",
            value.type_str()
        ))
    })
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigRoot {
    pub general: General,
    pub software: Software,
    pub metashard: Metashard,
    pub shards: Shards,
    pub networking: Networking,
}

impl ConfigRoot {
    pub const SECTIONS: &'static [&'static str] =
        &["general", "software", "metashard", "shards", "networking"];

    /// Applies a patch section by section, in document order.
    ///
    /// Each section is atomic on its own, but the call as a whole is not: if
    /// a later section is rejected, sections already applied stay applied.
    pub fn override_with(&mut self, patch: &Table) -> LocalnetResult<()> {
        for (section, value) in patch {
            let table = expect_table(section, value)?;
            match section.as_str() {
                "general" => self.general.override_with(section, table)?,
                "software" => self.software.override_with(section, table)?,
                "metashard" => self.metashard.override_with(section, table)?,
                "shards" => self.shards.override_with(section, table)?,
                "networking" => self.networking.override_with(section, table)?,
                other => return Err(LocalnetError::UnknownSection(other.to_string())),
            }
        }
        Ok(())
    }

    pub fn to_dictionary(&self) -> LocalnetResult<Table> {
        section_table(self, "root")
    }

    pub fn from_file(path: &Path) -> LocalnetResult<Self> {
        let content = fs::read_to_string(path).map_err(|err| LocalnetError::io(path, err))?;
        let patch: Table =
            toml::from_str(&content).map_err(|err| LocalnetError::toml(path, err))?;
        let mut config = Self::default();
        config.override_with(&patch)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> LocalnetResult<()> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| LocalnetError::io(parent, err))?;
        }
        let encoded = toml::to_string_pretty(self)?;
        fs::write(path, encoded).map_err(|err| LocalnetError::io(path, err))?;
        Ok(())
    }

    /// Rejects topologies the derivation code cannot materialize.
    pub fn validate(&self) -> LocalnetResult<()> {
        let invalid = |message: String| Err(LocalnetError::InvalidConfiguration(message));

        if self.shards.num_shards == 0 {
            return invalid("shards.num_shards must be greater than zero".to_string());
        }
        if self.shards.consensus_size == 0
            || self.shards.consensus_size > self.shards.num_validators_per_shard
        {
            return invalid(format!(
                "shards.consensus_size must be between 1 and num_validators_per_shard ({})",
                self.shards.num_validators_per_shard
            ));
        }
        if self.metashard.consensus_size == 0
            || self.metashard.consensus_size > self.metashard.num_validators
        {
            return invalid(format!(
                "metashard.consensus_size must be between 1 and num_validators ({})",
                self.metashard.num_validators
            ));
        }
        if self.general.rounds_per_epoch == 0 {
            return invalid("general.rounds_per_epoch must be greater than zero".to_string());
        }
        if self.general.round_duration_milliseconds == 0 {
            return invalid(
                "general.round_duration_milliseconds must be greater than zero".to_string(),
            );
        }

        self.validate_port_ranges()
    }

    /// Total nodes of one role, rejected when it does not fit the port space.
    fn checked_node_count(
        &self,
        role: &str,
        per_shard: (&str, usize),
        metachain: (&str, usize),
    ) -> LocalnetResult<u32> {
        self.shards
            .num_shards
            .checked_mul(per_shard.1)
            .and_then(|sharded| sharded.checked_add(metachain.1))
            .and_then(|count| u32::try_from(count).ok())
            .filter(|count| *count <= u32::from(u16::MAX))
            .ok_or_else(|| {
                LocalnetError::InvalidConfiguration(format!(
                    "shards.num_shards, shards.{} and metashard.{} describe more {role}s than \
                     there are ports",
                    per_shard.0, metachain.0
                ))
            })
    }

    fn validate_port_ranges(&self) -> LocalnetResult<()> {
        let networking = &self.networking;
        let validators = self.checked_node_count(
            "validator",
            ("num_validators_per_shard", self.shards.num_validators_per_shard),
            ("num_validators", self.metashard.num_validators),
        )?;
        let observers = self.checked_node_count(
            "observer",
            ("num_observers_per_shard", self.shards.num_observers_per_shard),
            ("num_observers", self.metashard.num_observers),
        )?;
        let ranges = [
            ("port_seednode", u32::from(networking.port_seednode), 1),
            (
                "port_seednode_rest_api",
                u32::from(networking.port_seednode_rest_api),
                1,
            ),
            ("port_proxy", u32::from(networking.port_proxy), 1),
            (
                "port_first_validator",
                u32::from(networking.port_first_validator),
                validators,
            ),
            (
                "port_first_validator_rest_api",
                u32::from(networking.port_first_validator_rest_api),
                validators,
            ),
            (
                "port_first_observer",
                u32::from(networking.port_first_observer),
                observers,
            ),
            (
                "port_first_observer_rest_api",
                u32::from(networking.port_first_observer_rest_api),
                observers,
            ),
        ];

        for (index, (name, start, len)) in ranges.iter().enumerate() {
            if start + len > u32::from(u16::MAX) + 1 {
                return Err(LocalnetError::InvalidConfiguration(format!(
                    "networking.{name} range exceeds the highest port"
                )));
            }
            for (other_name, other_start, other_len) in &ranges[index + 1..] {
                let disjoint = *len == 0
                    || *other_len == 0
                    || start + len <= *other_start
                    || other_start + other_len <= *start;
                if !disjoint {
                    return Err(LocalnetError::InvalidConfiguration(format!(
                        "networking.{name} range overlaps networking.{other_name} range"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Root of the generated folder tree.
    pub fn root_folder(&self) -> PathBuf {
        expand_home(&self.general.folder)
    }
}

/// Expands a leading `~/` against `$HOME`.
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    fn patch(source: &str) -> Table {
        toml::from_str(source).expect("valid toml patch")
    }

    #[test]
    fn unknown_key_is_rejected_without_mutation() {
        let mut config = ConfigRoot::default();
        let result = config.override_with(&patch(
            r#"
            [general]
            rounds_per_epoch = 7
            bogus_key = 1
            "#,
        ));

        assert_matches!(
            result,
            Err(LocalnetError::UnknownConfiguration { ref section, ref keys })
                if section == "general" && keys == &vec!["bogus_key".to_string()]
        );
        assert_eq!(
            config.general.rounds_per_epoch,
            General::default().rounds_per_epoch
        );
    }

    #[test]
    fn unknown_section_is_rejected() {
        let mut config = ConfigRoot::default();
        let result = config.override_with(&patch("[sharding]\nnum_shards = 3\n"));
        assert_matches!(result, Err(LocalnetError::UnknownSection(name)) if name == "sharding");
    }

    #[test]
    fn mistyped_value_leaves_section_unchanged() {
        let mut config = ConfigRoot::default();
        let result = config.override_with(&patch("[shards]\nnum_shards = \"three\"\n"));
        assert_matches!(result, Err(LocalnetError::InvalidConfiguration(_)));
        assert_eq!(config.shards, Shards::default());
    }

    #[test]
    fn override_is_not_atomic_across_sections() {
        let mut config = ConfigRoot::default();
        let result = config.override_with(&patch(
            r#"
            [shards]
            num_shards = 3

            [metashard]
            nonsense = true
            "#,
        ));

        assert!(result.is_err());
        assert_eq!(config.shards.num_shards, 3);
        assert_eq!(config.metashard, Metashard::default());
    }

    #[test]
    fn nested_software_overrides_reach_pieces() {
        let mut config = ConfigRoot::default();
        config
            .override_with(&patch(
                r#"
                [software.mx_chain_go]
                resolution = "local-source"
                local_path = "/opt/mx-chain-go"
                "#,
            ))
            .expect("override software");

        assert_eq!(
            config.software.mx_chain_go.resolution,
            SoftwareResolution::LocalSource
        );
        assert_eq!(
            config.software.mx_chain_go.local_path,
            PathBuf::from("/opt/mx-chain-go")
        );
        assert_eq!(
            config.software.mx_chain_proxy_go,
            Software::default().mx_chain_proxy_go
        );

        let result = config.override_with(&patch(
            "[software.mx_chain_go]\nbranch = \"main\"\n",
        ));
        assert_matches!(
            result,
            Err(LocalnetError::UnknownConfiguration { section, .. })
                if section == "software.mx_chain_go"
        );
    }

    #[test]
    fn save_then_load_reproduces_dictionary() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("nested").join("localnet.toml");

        let mut config = ConfigRoot::default();
        config.shards.num_shards = 3;
        config.networking.host = "10.0.0.7".to_string();
        config.software.mx_chain_proxy_go.resolution = SoftwareResolution::LocalPrebuilt;
        config.save(&path).expect("save config");

        let loaded = ConfigRoot::from_file(&path).expect("load config");
        assert_eq!(
            loaded.to_dictionary().expect("dictionary"),
            config.to_dictionary().expect("dictionary")
        );
        assert_eq!(loaded, config);
    }

    #[test]
    fn validation_rejects_impossible_topologies() {
        let mut config = ConfigRoot::default();
        config.validate().expect("defaults are valid");

        config.shards.consensus_size = 2;
        assert_matches!(
            config.validate(),
            Err(LocalnetError::InvalidConfiguration(message))
                if message.contains("shards.consensus_size")
        );

        let mut config = ConfigRoot::default();
        config.shards.num_shards = 0;
        assert_matches!(config.validate(), Err(LocalnetError::InvalidConfiguration(_)));
    }

    #[test]
    fn validation_rejects_overlapping_ports() {
        let mut config = ConfigRoot::default();
        config.networking.port_first_observer_rest_api = 10_199;
        config.shards.num_observers_per_shard = 1;
        assert_matches!(
            config.validate(),
            Err(LocalnetError::InvalidConfiguration(message))
                if message.contains("port_first_validator_rest_api")
        );
    }

    #[test]
    fn validation_rejects_node_counts_beyond_port_space() {
        let mut config = ConfigRoot::default();
        config.shards.num_shards = 1;
        config.shards.num_validators_per_shard = (u32::MAX as usize).saturating_add(1);
        assert_matches!(
            config.validate(),
            Err(LocalnetError::InvalidConfiguration(message))
                if message.contains("shards.num_validators_per_shard")
        );

        let mut config = ConfigRoot::default();
        config.shards.num_shards = usize::MAX / 2;
        config.shards.num_validators_per_shard = usize::MAX / 2;
        assert_matches!(
            config.validate(),
            Err(LocalnetError::InvalidConfiguration(message)) if message.contains("validators")
        );

        let mut config = ConfigRoot::default();
        config.metashard.num_observers = usize::MAX;
        config.shards.num_observers_per_shard = 1;
        assert_matches!(
            config.validate(),
            Err(LocalnetError::InvalidConfiguration(message))
                if message.contains("metashard.num_observers")
        );
    }

    #[test]
    fn home_prefix_is_expanded() {
        let Some(home) = std::env::var_os("HOME") else {
            return;
        };
        assert_eq!(
            expand_home(Path::new("~/multiversx-sdk/localnet")),
            PathBuf::from(home).join("multiversx-sdk/localnet")
        );
        assert_eq!(expand_home(Path::new("localnet")), PathBuf::from("localnet"));
    }
}
