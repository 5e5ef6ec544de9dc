//! Compose configuration documents and their storage

mod document;
mod store;

pub use document::*;
pub use store::*;

use std::path::PathBuf;

use crate::runtime::ExecError;

/// Errors reading, parsing or persisting configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to resolve configuration: {0}")]
    Resolve(#[source] ExecError),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[source] serde_yaml::Error),

    #[error("Configuration root must be a mapping, found {0}")]
    NotAMapping(String),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[source] serde_yaml::Error),

    #[error("Failed to write compiled configuration '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove compiled configuration '{}': {source}", path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
