// src/config.rs - Engine configuration and tag source resolution

use crate::{
    error::ConfigError,
    tags::{is_json, TagConfig, TagDocument, TagRegistry},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// MAIN CONFIGURATION
// ============================================================================

/// Main configuration document.
///
/// ```yaml
/// controller:
///   backend: s7
///   ip: 192.168.100.120
///   rack: 0
///   slot: 1
/// engine:
///   poll_interval_ms: 5000
///   read_timeout_ms: 1000
/// storage:
///   path: data_log.db
/// tags_file: tag_config.json
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Controller connection
    #[serde(default)]
    pub controller: ControllerConfig,

    /// Poll loop settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Reading log settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Inline tag definitions
    #[serde(default)]
    pub tags: Vec<TagConfig>,

    /// External tag file (`{"tags": [...]}`), resolved relative to the
    /// configuration file
    #[serde(default)]
    pub tags_file: Option<PathBuf>,

    /// Setpoint block for the write path
    #[serde(default)]
    pub setpoints: Option<SetpointConfig>,

    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

// ============================================================================
// SECTIONS
// ============================================================================

/// Which transport talks to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Siemens S7 over ISO-on-TCP (needs the `s7-support` feature)
    #[default]
    S7,
    /// In-memory controller
    Simulated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControllerConfig {
    #[serde(default)]
    pub backend: Backend,

    /// IP address of the controller
    #[serde(default = "default_ip")]
    pub ip: String,

    /// Rack number (usually 0)
    #[serde(default)]
    pub rack: u16,

    /// Slot number (1 for S7-1200/1500)
    #[serde(default = "default_slot")]
    pub slot: u16,

    /// Connect and socket timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Simulated backend only: let REAL values wander
    #[serde(default)]
    pub drift: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            ip: default_ip(),
            rack: 0,
            slot: default_slot(),
            connect_timeout_ms: default_connect_timeout(),
            drift: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Time between poll cycle starts
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Upper bound for one block read
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,

    /// Consecutive failed appends before an operational alert
    #[serde(default = "default_store_alert_threshold")]
    pub store_alert_threshold: u32,
}

impl EngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            read_timeout_ms: default_read_timeout(),
            store_alert_threshold: default_store_alert_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// SQLite database file
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// How long an append waits on a locked database
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

/// Consecutive REAL setpoints at the start of one data block.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetpointConfig {
    pub db: u16,
    #[serde(default = "default_setpoint_count")]
    pub count: usize,
}

// ============================================================================
// DEFAULT VALUE FUNCTIONS
// ============================================================================

fn default_ip() -> String { "192.168.100.120".to_string() }
fn default_slot() -> u16 { 1 }
fn default_connect_timeout() -> u64 { 2000 }
fn default_poll_interval() -> u64 { 5000 }
fn default_read_timeout() -> u64 { 1000 }
fn default_store_alert_threshold() -> u32 { 3 }
fn default_db_path() -> PathBuf { PathBuf::from("data_log.db") }
fn default_busy_timeout() -> u64 { 2000 }
fn default_setpoint_count() -> usize { 5 }

// ============================================================================
// LOADING
// ============================================================================

impl Config {
    /// Load from a file; `.json` is parsed as JSON, anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = if is_json(path) {
            Self::from_json(&text)?
        } else {
            Self::from_yaml(&text)?
        };
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("engine.poll_interval_ms must be > 0".into()));
        }
        if self.engine.read_timeout_ms == 0 {
            return Err(ConfigError::Invalid("engine.read_timeout_ms must be > 0".into()));
        }
        if self.engine.store_alert_threshold == 0 {
            return Err(ConfigError::Invalid("engine.store_alert_threshold must be > 0".into()));
        }
        if self.tags.is_empty() && self.tags_file.is_none() {
            return Err(ConfigError::Invalid("no tags configured (tags or tags_file)".into()));
        }
        if let Some(sp) = &self.setpoints {
            if sp.count == 0 {
                return Err(ConfigError::Invalid("setpoints.count must be > 0".into()));
            }
        }
        Ok(())
    }

    /// Resolve `tags_file` against the configuration's directory.
    pub fn tags_file_path(&self) -> Option<PathBuf> {
        let file = self.tags_file.as_ref()?;
        Some(match &self.base_dir {
            Some(dir) if file.is_relative() => dir.join(file),
            _ => file.clone(),
        })
    }

    /// Build the validated registry from inline tags followed by the tag
    /// file's tags. Names must be unique across both.
    pub fn registry(&self) -> Result<TagRegistry, ConfigError> {
        let mut raw = self.tags.clone();
        if let Some(path) = self.tags_file_path() {
            let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
            let doc: TagDocument = if is_json(&path) {
                serde_json::from_str(&text)?
            } else {
                serde_yaml::from_str(&text)?
            };
            raw.extend(doc.tags);
        }
        TagRegistry::load(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::from_yaml(
            r#"
tags:
  - { name: T1, db: 24, start: 0, type: REAL }
"#,
        )
        .unwrap();
        assert_eq!(config.engine.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.engine.read_timeout(), Duration::from_secs(1));
        assert_eq!(config.controller.backend, Backend::S7);
        assert_eq!(config.controller.slot, 1);
        assert_eq!(config.storage.path, PathBuf::from("data_log.db"));
        assert_eq!(config.registry().unwrap().len(), 1);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = Config::from_yaml(
            r#"
engine: { poll_interval_ms: 0 }
tags:
  - { name: T1, db: 24, start: 0, type: REAL }
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_no_tags_rejected() {
        assert!(Config::from_yaml("engine: {}").is_err());
    }

    #[test]
    fn test_unknown_section_rejected() {
        let err = Config::from_yaml(
            r#"
mqtt: { host: localhost }
tags:
  - { name: T1, db: 24, start: 0, type: REAL }
"#,
        );
        assert!(matches!(err, Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_tags_file_relative_to_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut tags = std::fs::File::create(dir.path().join("tag_config.json")).unwrap();
        write!(
            tags,
            r#"{{"tags": [{{"name": "Door1", "db": 25, "start": 0, "type": "BOOL", "bit": 0, "alarm_if": true}}]}}"#
        )
        .unwrap();

        let config_path = dir.path().join("tagwatch.yaml");
        std::fs::write(
            &config_path,
            "tags_file: tag_config.json\ntags:\n  - { name: T1, db: 24, start: 0, type: REAL, alarm_high: 36 }\n",
        )
        .unwrap();

        let config = Config::from_file(&config_path).unwrap();
        let registry = config.registry().unwrap();
        let names: Vec<_> = registry.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["T1", "Door1"]);
    }

    #[test]
    fn test_duplicate_across_sources_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("tags.yaml"),
            "tags:\n  - { name: T1, db: 24, start: 4, type: REAL }\n",
        )
        .unwrap();
        let config_path = dir.path().join("tagwatch.yaml");
        std::fs::write(
            &config_path,
            "tags_file: tags.yaml\ntags:\n  - { name: T1, db: 24, start: 0, type: REAL }\n",
        )
        .unwrap();
        let config = Config::from_file(&config_path).unwrap();
        assert!(matches!(config.registry(), Err(ConfigError::DuplicateName(_))));
    }

    #[test]
    fn test_json_config() {
        let config = Config::from_json(
            r#"{"controller": {"backend": "simulated"}, "setpoints": {"db": 36},
                "tags": [{"name": "T1", "db": 24, "start": 0, "type": "REAL"}]}"#,
        )
        .unwrap();
        assert_eq!(config.controller.backend, Backend::Simulated);
        assert_eq!(config.setpoints.unwrap().count, 5);
    }
}
