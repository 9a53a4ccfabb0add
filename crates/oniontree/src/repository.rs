//! Directory-backed repository and the trait the scanner reads through.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::service::{Service, validate_id};

const UNSORTED_DIR: &str = "unsorted";
const RECORD_EXT: &str = "yaml";

/// Read-only access to a set of service records.
pub trait ServiceRepository: Send + Sync {
    /// Location the records were read from. Reported on every scan event.
    fn dir(&self) -> &Path;

    /// IDs of every service in the repository.
    fn list_services(&self) -> Result<Vec<String>>;

    /// Read a single service record.
    fn get_service(&self, id: &str) -> Result<Service>;
}

/// An OnionTree repository rooted at a directory.
#[derive(Debug, Clone)]
pub struct OnionTree {
    dir: PathBuf,
}

impl OnionTree {
    /// Open an existing repository. Fails if `dir/unsorted` is missing.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.join(UNSORTED_DIR).is_dir() {
            return Err(Error::NotOnionTree(dir));
        }
        debug!(dir = %dir.display(), "oniontree repository opened");
        Ok(Self { dir })
    }

    fn unsorted_dir(&self) -> PathBuf {
        self.dir.join(UNSORTED_DIR)
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.unsorted_dir().join(format!("{id}.{RECORD_EXT}"))
    }
}

impl ServiceRepository for OnionTree {
    fn dir(&self) -> &Path {
        &self.dir
    }

    fn list_services(&self) -> Result<Vec<String>> {
        let unsorted = self.unsorted_dir();
        let mut ids = Vec::new();
        for entry in read_dir(&unsorted)? {
            let entry = entry.map_err(|source| Error::Io {
                path: unsorted.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn get_service(&self, id: &str) -> Result<Service> {
        validate_id(id)?;
        let path = self.record_path(id);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::IdNotExists(id.to_string()));
            }
            Err(source) => return Err(Error::Io { path, source }),
        };
        Service::from_yaml(id, &content)
    }
}

fn read_dir(path: &Path) -> Result<std::fs::ReadDir> {
    std::fs::read_dir(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}
