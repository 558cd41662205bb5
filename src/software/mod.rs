//! Locating the node, seednode and proxy executables and their config
//! templates.

mod archive;
mod build;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::{expand_home, ConfigRoot, SoftwarePiece, SoftwareResolution};
use crate::errors::{LocalnetError, LocalnetResult};
use crate::topology::CONFIG_FOLDER;

pub use archive::{download, extract};
pub use build::build_binaries;

/// File every source tree must contain before it is trusted.
pub const SOURCE_TREE_MARKER: &str = "go.mod";
const CMD_FOLDER: &str = "cmd";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolutionMode {
    RemoteArchive {
        url: String,
        download_folder: PathBuf,
        extraction_folder: PathBuf,
    },
    LocalSourceFolder {
        path: PathBuf,
    },
    /// `path` is a folder laid out like a source tree's `cmd/` folder.
    LocalPrebuiltCmdFolder {
        path: PathBuf,
    },
}

impl From<&SoftwarePiece> for ResolutionMode {
    fn from(piece: &SoftwarePiece) -> Self {
        match piece.resolution {
            SoftwareResolution::Remote => ResolutionMode::RemoteArchive {
                url: piece.archive_url.clone(),
                download_folder: expand_home(&piece.archive_download_folder),
                extraction_folder: expand_home(&piece.archive_extraction_folder),
            },
            SoftwareResolution::LocalSource => ResolutionMode::LocalSourceFolder {
                path: expand_home(&piece.local_path),
            },
            SoftwareResolution::LocalPrebuilt => ResolutionMode::LocalPrebuiltCmdFolder {
                path: expand_home(&piece.local_path),
            },
        }
    }
}

impl ResolutionMode {
    /// Source tree root, or `None` for prebuilt binaries.
    pub fn source_folder(&self) -> LocalnetResult<Option<PathBuf>> {
        let root = match self {
            ResolutionMode::RemoteArchive {
                extraction_folder, ..
            } => locate_extracted_root(extraction_folder)?,
            ResolutionMode::LocalSourceFolder { path } => path.clone(),
            ResolutionMode::LocalPrebuiltCmdFolder { .. } => return Ok(None),
        };
        ensure_source_tree(&root)?;
        Ok(Some(root))
    }

    /// Folder holding one sub-folder per executable.
    pub fn cmd_folder(&self) -> LocalnetResult<PathBuf> {
        let folder = match (self, self.source_folder()?) {
            (_, Some(source)) => source.join(CMD_FOLDER),
            (ResolutionMode::LocalPrebuiltCmdFolder { path }, None) => path.clone(),
            (_, None) => {
                return Err(LocalnetError::SoftwareResolution(
                    "source tree could not be located".to_string(),
                ))
            }
        };
        ensure_directory(&folder)?;
        Ok(folder)
    }

    /// Clears previous downloads, fetches the archive and unpacks it.
    /// Local modes have nothing to download.
    pub async fn download(&self) -> LocalnetResult<()> {
        let ResolutionMode::RemoteArchive {
            url,
            download_folder,
            extraction_folder,
        } = self
        else {
            return Ok(());
        };

        for folder in [download_folder, extraction_folder] {
            if folder.exists() {
                fs::remove_dir_all(folder).map_err(|err| LocalnetError::io(folder, err))?;
            }
            fs::create_dir_all(folder).map_err(|err| LocalnetError::io(folder, err))?;
        }

        let archive_path = download_folder.join(archive_file_name(url));
        download(url, &archive_path).await?;
        extract(&archive_path, extraction_folder).await?;

        let root = locate_extracted_root(extraction_folder)?;
        ensure_source_tree(&root)?;
        info!(
            target = "localnet::software",
            url = %url,
            source = %root.display(),
            "software archive ready"
        );
        Ok(())
    }
}

/// Parent folders of the three executables. Each holds the binary and its
/// `config/` template folder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinaryParents {
    pub node: PathBuf,
    pub seednode: PathBuf,
    pub proxy: PathBuf,
}

impl BinaryParents {
    pub fn node_binary(&self) -> PathBuf {
        self.node.join("node")
    }

    pub fn seednode_binary(&self) -> PathBuf {
        self.seednode.join("seednode")
    }

    pub fn proxy_binary(&self) -> PathBuf {
        self.proxy.join("proxy")
    }

    pub fn node_config(&self) -> PathBuf {
        self.node.join(CONFIG_FOLDER)
    }

    pub fn seednode_config(&self) -> PathBuf {
        self.seednode.join(CONFIG_FOLDER)
    }

    pub fn proxy_config(&self) -> PathBuf {
        self.proxy.join(CONFIG_FOLDER)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SoftwareResolver {
    pub chain: ResolutionMode,
    pub proxy: ResolutionMode,
}

impl SoftwareResolver {
    pub fn from_config(config: &ConfigRoot) -> Self {
        Self {
            chain: ResolutionMode::from(&config.software.mx_chain_go),
            proxy: ResolutionMode::from(&config.software.mx_chain_proxy_go),
        }
    }

    /// Resolves the folders of all three executables; fails if any of them
    /// (or its config template) is missing.
    pub fn resolve(&self) -> LocalnetResult<BinaryParents> {
        let chain_cmd = self.chain.cmd_folder()?;
        let proxy_cmd = self.proxy.cmd_folder()?;
        let parents = BinaryParents {
            node: chain_cmd.join("node"),
            seednode: chain_cmd.join("seednode"),
            proxy: proxy_cmd.join("proxy"),
        };

        for folder in [
            parents.node_config(),
            parents.seednode_config(),
            parents.proxy_config(),
        ] {
            ensure_directory(&folder)?;
        }
        Ok(parents)
    }

    pub async fn download(&self) -> LocalnetResult<()> {
        self.chain.download().await?;
        self.proxy.download().await
    }
}

/// The single top-level folder of an extracted archive, or the extraction
/// folder itself when there is not exactly one.
pub fn locate_extracted_root(extraction_folder: &Path) -> LocalnetResult<PathBuf> {
    ensure_directory(extraction_folder)?;
    let entries = fs::read_dir(extraction_folder)
        .map_err(|err| LocalnetError::io(extraction_folder, err))?;

    let mut subfolders = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|err| LocalnetError::io(extraction_folder, err))?
            .path();
        if path.is_dir() {
            subfolders.push(path);
        }
    }

    match subfolders.as_slice() {
        [single] => Ok(single.clone()),
        _ => Ok(extraction_folder.to_path_buf()),
    }
}

fn ensure_source_tree(folder: &Path) -> LocalnetResult<()> {
    ensure_directory(folder)?;
    let marker = folder.join(SOURCE_TREE_MARKER);
    if marker.is_file() {
        Ok(())
    } else {
        Err(LocalnetError::SoftwareResolution(format!(
            "{} is not a source tree: {SOURCE_TREE_MARKER} not found",
            folder.display()
        )))
    }
}

fn ensure_directory(folder: &Path) -> LocalnetResult<()> {
    if folder.is_dir() {
        Ok(())
    } else {
        Err(LocalnetError::MissingSoftware(folder.to_path_buf()))
    }
}

fn archive_file_name(url: &str) -> String {
    url.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("archive.zip")
        .to_string()
}
