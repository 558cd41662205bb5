use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use toml::Table;

use super::{expect_table, validate_overriding_entries, ConfigPart};
use crate::errors::{LocalnetError, LocalnetResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SoftwareResolution {
    /// Download a source archive and build from it.
    Remote,
    /// Build from an already checked-out source tree.
    LocalSource,
    /// Use binaries that were built elsewhere.
    LocalPrebuilt,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SoftwarePiece {
    pub resolution: SoftwareResolution,
    pub archive_url: String,
    pub archive_download_folder: PathBuf,
    pub archive_extraction_folder: PathBuf,
    /// Source tree for `local-source`, command folder for `local-prebuilt`.
    pub local_path: PathBuf,
}

impl SoftwarePiece {
    fn remote(repository: &str) -> Self {
        Self {
            resolution: SoftwareResolution::Remote,
            archive_url: format!(
                "https://github.com/multiversx/{repository}/archive/refs/heads/master.zip"
            ),
            archive_download_folder: PathBuf::from(format!(
                "~/multiversx-sdk/localnet_software_remote/downloaded/{repository}"
            )),
            archive_extraction_folder: PathBuf::from(format!(
                "~/multiversx-sdk/localnet_software_remote/extracted/{repository}"
            )),
            local_path: PathBuf::from(format!(
                "~/multiversx-sdk/localnet_software_local/{repository}"
            )),
        }
    }
}

impl ConfigPart for SoftwarePiece {
    const FIELDS: &'static [&'static str] = &[
        "resolution",
        "archive_url",
        "archive_download_folder",
        "archive_extraction_folder",
        "local_path",
    ];
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Software {
    pub mx_chain_go: SoftwarePiece,
    pub mx_chain_proxy_go: SoftwarePiece,
}

impl Default for Software {
    fn default() -> Self {
        Self {
            mx_chain_go: SoftwarePiece::remote("mx-chain-go"),
            mx_chain_proxy_go: SoftwarePiece::remote("mx-chain-proxy-go"),
        }
    }
}

impl ConfigPart for Software {
    const FIELDS: &'static [&'static str] = &["mx_chain_go", "mx_chain_proxy_go"];

    fn override_with(&mut self, section: &str, patch: &Table) -> LocalnetResult<()> {
        validate_overriding_entries(section, Self::FIELDS, patch)?;

        let mut updated = self.clone();
        for (name, value) in patch {
            let nested = format!("{section}.{name}");
            let table = expect_table(&nested, value)?;
            let piece = match name.as_str() {
                "mx_chain_go" => &mut updated.mx_chain_go,
                "mx_chain_proxy_go" => &mut updated.mx_chain_proxy_go,
                other => {
                    return Err(LocalnetError::UnknownConfiguration {
                        section: section.to_string(),
                        keys: vec![other.to_string()],
                    })
                }
            };
            piece.override_with(&nested, table)?;
        }
        *self = updated;
        Ok(())
    }
}
