//! Error types for OnionTree repository access.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for repository operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reading an OnionTree repository.
#[derive(Debug, Error)]
pub enum Error {
    #[error("directory `{}` is not an OnionTree repository", .0.display())]
    NotOnionTree(PathBuf),

    #[error("service with ID `{0}` does not exist")]
    IdNotExists(String),

    #[error("service ID `{id}` does not match the pattern \"{pattern}\"")]
    InvalidId { id: String, pattern: &'static str },

    #[error("failed to read `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse service `{id}`: {source}")]
    Parse {
        id: String,
        #[source]
        source: serde_yaml::Error,
    },
}
