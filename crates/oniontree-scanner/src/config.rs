//! Scanner configuration.
//!
//! [`ScannerSection`] is the `[scanner]` table as written in a config
//! file, with every field optional and durations as strings ("30s",
//! "500ms", "2m"). [`ScannerConfig`] is the resolved form the scanner runs
//! with.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or resolving scanner configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration `{value}` for `{field}`")]
    InvalidDuration { field: &'static str, value: String },
}

/// How a worker decides whether a URL is reachable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Issue an HTTP `GET`; any response counts as online.
    #[default]
    Http,
    /// Open a TCP connection; a completed connect counts as online.
    Tcp,
}

/// The `[scanner]` table of a config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScannerSection {
    pub interval: Option<String>,
    pub timeout: Option<String>,
    pub transport: Option<TransportKind>,
    /// SOCKS5 proxy, usually a local Tor client (`127.0.0.1:9050`).
    pub proxy: Option<String>,
    pub event_buffer: Option<usize>,
}

/// Resolved scanner settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannerConfig {
    /// Pause between two probes of the same URL.
    pub scan_interval: Duration,
    /// Upper bound for a single probe.
    pub probe_timeout: Duration,
    pub transport: TransportKind,
    pub proxy: Option<String>,
    /// Capacity of the channels between the scanner and pipeline stages.
    pub event_buffer: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(15),
            transport: TransportKind::Http,
            proxy: None,
            event_buffer: 1024,
        }
    }
}

impl ScannerConfig {
    /// Resolve a config-file section on top of the defaults.
    pub fn from_section(section: &ScannerSection) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(value) = &section.interval {
            config.scan_interval = parse_field("interval", value)?;
        }
        if let Some(value) = &section.timeout {
            config.probe_timeout = parse_field("timeout", value)?;
        }
        if let Some(transport) = section.transport {
            config.transport = transport;
        }
        if let Some(proxy) = &section.proxy {
            config.proxy = Some(proxy.clone());
        }
        if let Some(buffer) = section.event_buffer {
            config.event_buffer = buffer.max(1);
        }
        Ok(config)
    }

    /// Load the `[scanner]` table of a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        #[derive(Deserialize)]
        struct File {
            #[serde(default)]
            scanner: ScannerSection,
        }

        let content = std::fs::read_to_string(path)?;
        let file: File = toml::from_str(&content)?;
        Self::from_section(&file.scanner)
    }
}

fn parse_field(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value).ok_or_else(|| ConfigError::InvalidDuration {
        field,
        value: value.to_string(),
    })
}

/// Parse a duration string like "5s", "500ms", "1m". A bare number is seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok()?.checked_mul(60).map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("10"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("soon"), None);
    }

    #[test]
    fn oversized_minutes_are_invalid() {
        assert_eq!(parse_duration("307445734561825862m"), None);

        let section = ScannerSection {
            interval: Some("307445734561825862m".to_string()),
            ..Default::default()
        };
        let err = ScannerConfig::from_section(&section).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDuration { field: "interval", .. }));
    }

    #[test]
    fn empty_section_keeps_defaults() {
        let config = ScannerConfig::from_section(&ScannerSection::default()).unwrap();
        assert_eq!(config, ScannerConfig::default());
    }

    #[test]
    fn section_overrides() {
        let section = ScannerSection {
            interval: Some("1m".to_string()),
            timeout: Some("750ms".to_string()),
            transport: Some(TransportKind::Tcp),
            proxy: Some("127.0.0.1:9050".to_string()),
            event_buffer: Some(0),
        };
        let config = ScannerConfig::from_section(&section).unwrap();
        assert_eq!(config.scan_interval, Duration::from_secs(60));
        assert_eq!(config.probe_timeout, Duration::from_millis(750));
        assert_eq!(config.transport, TransportKind::Tcp);
        assert_eq!(config.proxy.as_deref(), Some("127.0.0.1:9050"));
        assert_eq!(config.event_buffer, 1);
    }

    #[test]
    fn invalid_duration_names_field() {
        let section = ScannerSection {
            timeout: Some("fast".to_string()),
            ..Default::default()
        };
        let err = ScannerConfig::from_section(&section).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDuration { field: "timeout", .. }));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[scanner]
interval = "10s"
transport = "tcp"
"#
        )
        .unwrap();

        let config = ScannerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.scan_interval, Duration::from_secs(10));
        assert_eq!(config.transport, TransportKind::Tcp);
        assert_eq!(config.probe_timeout, Duration::from_secs(15));
    }

    #[test]
    fn file_without_scanner_table() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[api]\nlisten = \"127.0.0.1:9100\"").unwrap();
        let config = ScannerConfig::from_file(file.path()).unwrap();
        assert_eq!(config, ScannerConfig::default());
    }
}
