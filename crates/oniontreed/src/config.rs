//! Daemon configuration file.
//!
//! ```toml
//! [scanner]
//! interval = "30s"
//! timeout = "15s"
//! transport = "http"
//! proxy = "127.0.0.1:9050"
//!
//! [api]
//! listen = "127.0.0.1:9100"
//! ```
//!
//! Command-line flags take precedence over the file.

use std::net::SocketAddr;
use std::path::Path;

use anyhow::Context;
use oniontree_scanner::{ScannerSection, TransportKind};
use serde::Deserialize;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:9100";

#[derive(Debug, Default, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub scanner: ScannerSection,
    #[serde(default)]
    pub api: ApiSection,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiSection {
    pub listen: Option<SocketAddr>,
}

/// Values given on the command line.
#[derive(Debug, Default)]
pub struct Overrides {
    pub listen: Option<SocketAddr>,
    pub interval: Option<String>,
    pub timeout: Option<String>,
    pub proxy: Option<String>,
    pub transport: Option<TransportKind>,
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply command-line overrides on top of the file values.
    pub fn merge(mut self, overrides: Overrides) -> Self {
        let scanner = &mut self.scanner;
        if overrides.interval.is_some() {
            scanner.interval = overrides.interval;
        }
        if overrides.timeout.is_some() {
            scanner.timeout = overrides.timeout;
        }
        if overrides.proxy.is_some() {
            scanner.proxy = overrides.proxy;
        }
        if overrides.transport.is_some() {
            scanner.transport = overrides.transport;
        }
        if overrides.listen.is_some() {
            self.api.listen = overrides.listen;
        }
        self
    }

    pub fn listen(&self) -> anyhow::Result<SocketAddr> {
        match self.api.listen {
            Some(addr) => Ok(addr),
            None => Ok(DEFAULT_LISTEN.parse()?),
        }
    }
}
