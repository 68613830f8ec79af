//! Engine configuration: `<data_dir>/config.toml` with every field
//! defaulted, then a few environment overrides on top.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

pub const ENV_DATA_DIR: &str = "PAIRING_DATA_DIR";
pub const ENV_BIND: &str = "PAIRING_BIND";
pub const ENV_SYNC_TOKEN: &str = "PAIRING_SYNC_TOKEN";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub queue_capacity: usize,
    pub save_every_signals: u32,
    pub save_interval_secs: u64,
    pub maintenance_interval_secs: u64,
    pub extraction_timeout_ms: u64,
    pub slow_signal_ms: u64,
    pub evidence_capacity: usize,
    pub http: HttpConfig,
    pub sync: SyncConfig,
    pub scan: ScanConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            save_every_signals: 10,
            save_interval_secs: 60,
            maintenance_interval_secs: 300,
            extraction_timeout_ms: 500,
            slow_signal_ms: 50,
            evidence_capacity: 10_000,
            http: HttpConfig::default(),
            sync: SyncConfig::default(),
            scan: ScanConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8300".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    MemoryStore,
    AgentBlock,
    Gateway,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SinkConfig {
    pub kind: SinkKind,
    pub url: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_sink_timeout")]
    pub timeout_secs: u64,
}

fn default_sink_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub enabled: bool,
    pub sinks: Vec<SinkConfig>,
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sinks: Vec::new(),
            max_attempts: 3,
            backoff_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub history_dir: Option<PathBuf>,
    pub pause_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            history_dir: None,
            pause_ms: 50,
        }
    }
}

impl EngineConfig {
    /// Read `path` if it exists, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            Self::from_toml(&text).with_context(|| format!("invalid config {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(bind) = var(ENV_BIND).filter(|s| !s.is_empty()) {
            self.http.bind = bind;
        }
        if let Some(token) = var(ENV_SYNC_TOKEN).filter(|s| !s.is_empty()) {
            for sink in self.sync.sinks.iter_mut().filter(|s| s.token.is_none()) {
                sink.token = Some(token.clone());
            }
        }
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.http
            .bind
            .parse()
            .with_context(|| format!("invalid bind address '{}'", self.http.bind))
    }

    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.save_interval_secs.max(1))
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs.max(1))
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_millis(self.extraction_timeout_ms)
    }

    pub fn slow_signal(&self) -> Duration {
        Duration::from_millis(self.slow_signal_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = EngineConfig::default();
        assert_eq!(c.queue_capacity, 1000);
        assert_eq!(c.save_every_signals, 10);
        assert_eq!(c.maintenance_interval(), Duration::from_secs(300));
        assert_eq!(c.http.bind, "127.0.0.1:8300");
        assert!(!c.sync.enabled);
        assert_eq!(c.scan.pause_ms, 50);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let c = EngineConfig::from_toml(
            r#"
            queue_capacity = 8

            [sync]
            enabled = true

            [[sync.sinks]]
            kind = "agent_block"
            url = "http://localhost:9000/blocks/founder"
            "#,
        )
        .unwrap();
        assert_eq!(c.queue_capacity, 8);
        assert_eq!(c.save_interval_secs, 60);
        assert!(c.sync.enabled);
        assert_eq!(c.sync.max_attempts, 3);
        assert_eq!(c.sync.sinks[0].kind, SinkKind::AgentBlock);
        assert_eq!(c.sync.sinks[0].timeout_secs, 10);
    }

    #[test]
    fn test_unknown_sink_kind_rejected() {
        let err = EngineConfig::from_toml(
            r#"
            [[sync.sinks]]
            kind = "carrier_pigeon"
            url = "x"
            "#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut c = EngineConfig::from_toml(
            r#"
            [[sync.sinks]]
            kind = "gateway"
            url = "http://a"

            [[sync.sinks]]
            kind = "memory_store"
            url = "http://b"
            token = "own"
            "#,
        )
        .unwrap();
        c.apply_env(|k| match k {
            ENV_BIND => Some("0.0.0.0:9999".to_string()),
            ENV_SYNC_TOKEN => Some("shared".to_string()),
            _ => None,
        });
        assert_eq!(c.http.bind, "0.0.0.0:9999");
        assert_eq!(c.sync.sinks[0].token.as_deref(), Some("shared"));
        assert_eq!(c.sync.sinks[1].token.as_deref(), Some("own"));
        assert_eq!(c.bind_addr().unwrap().port(), 9999);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let c = EngineConfig::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(c.queue_capacity, EngineConfig::default().queue_capacity);
    }
}
