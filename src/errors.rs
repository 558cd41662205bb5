use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LocalnetError {
    #[error("unknown configuration entries in section `{section}`: {}", keys.join(", "))]
    UnknownConfiguration { section: String, keys: Vec<String> },
    #[error("unknown configuration section `{0}`")]
    UnknownSection(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("{} already exists", .0.display())]
    AlreadyExists(PathBuf),
    #[error("missing software: {} not found", .0.display())]
    MissingSoftware(PathBuf),
    #[error("software resolution failed: {0}")]
    SoftwareResolution(String),
    #[error("key material error: {0}")]
    KeyMaterial(String),
    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unable to parse {}: {source}", path.display())]
    TomlParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("unable to encode configuration: {0}")]
    TomlEncode(#[from] toml::ser::Error),
    #[error("json error at {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("request to {url} failed: {message}")]
    Http { url: String, message: String },
    #[error("unable to extract archive {}: {message}", path.display())]
    Archive { path: PathBuf, message: String },
    #[error("process {label} failed: {message}")]
    Process { label: String, message: String },
}

impl LocalnetError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        LocalnetError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        LocalnetError::Json {
            path: path.into(),
            source,
        }
    }

    pub fn toml(path: impl Into<PathBuf>, source: toml::de::Error) -> Self {
        LocalnetError::TomlParse {
            path: path.into(),
            source,
        }
    }
}

pub type LocalnetResult<T> = Result<T, LocalnetError>;
