//! Service records as stored in an OnionTree repository.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const ID_PATTERN: &str = r"^[a-z0-9\-]+$";

static ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(ID_PATTERN).expect("service ID pattern is valid"));

/// Check that a service ID only uses lowercase letters, digits and dashes.
pub fn validate_id(id: &str) -> Result<()> {
    if ID_REGEX.is_match(id) {
        Ok(())
    } else {
        Err(Error::InvalidId {
            id: id.to_string(),
            pattern: ID_PATTERN,
        })
    }
}

/// A public key attached to a service record.
///
/// Keys are carried as-is; nothing in this crate parses the armored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fingerprint: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub value: String,
}

/// A service and the onion URLs it is reachable at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub public_keys: Vec<PublicKey>,
}

impl Service {
    /// Create an empty record with the given display name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Append URLs, trimming whitespace and skipping duplicates.
    ///
    /// Returns how many URLs were actually added.
    pub fn add_urls<I, S>(&mut self, urls: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = 0;
        for url in urls {
            let url = url.as_ref().trim();
            if url.is_empty() || self.urls.iter().any(|u| u == url) {
                continue;
            }
            self.urls.push(url.to_string());
            added += 1;
        }
        added
    }

    /// Parse a record from its YAML representation.
    pub fn from_yaml(id: &str, content: &str) -> Result<Self> {
        let mut service: Service = serde_yaml::from_str(content).map_err(|source| Error::Parse {
            id: id.to_string(),
            source,
        })?;
        // Records written by hand may repeat or pad URLs.
        let urls = std::mem::take(&mut service.urls);
        service.add_urls(urls);
        Ok(service)
    }
}
