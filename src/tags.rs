// src/tags.rs - Tag registry: monitored points loaded once at startup
use crate::{alarm::AlarmRule, error::ConfigError, value::ValueType};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

// ============================================================================
// RAW TAG DOCUMENT
// ============================================================================

/// One tag as written in a tag file.
///
/// Field names follow the legacy `tag_config.json` layout so existing files
/// load unchanged. Which alarm field is present decides the rule kind; the
/// combination is checked in [`TagRegistry::load`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TagConfig {
    /// Unique tag name
    pub name: String,

    /// Data block number
    pub db: u16,

    /// Byte offset inside the data block
    pub start: u32,

    /// `REAL` or `BOOL`
    #[serde(rename = "type")]
    pub value_type: ValueType,

    /// Bit offset inside the byte (BOOL only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bit: Option<u8>,

    /// Alarm when value >= this (REAL only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alarm_high: Option<f64>,

    /// Alarm when value == this (BOOL only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alarm_if: Option<bool>,
}

/// Standalone tag file: `{"tags": [...]}`
#[derive(Debug, Clone, Deserialize)]
pub struct TagDocument {
    pub tags: Vec<TagConfig>,
}

// ============================================================================
// VALIDATED TAGS
// ============================================================================

/// Controller location of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TagAddress {
    pub db: u16,
    pub start: u32,
    /// Present only for BOOL tags, always 0..=7
    pub bit: Option<u8>,
}

impl std::fmt::Display for TagAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.bit {
            Some(bit) => write!(f, "DB{}.DBX{}.{}", self.db, self.start, bit),
            None => write!(f, "DB{}.DBD{}", self.db, self.start),
        }
    }
}

/// Immutable, validated tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagDefinition {
    pub name: String,
    pub address: TagAddress,
    pub value_type: ValueType,
    pub alarm_rule: Option<AlarmRule>,
}

impl TagDefinition {
    fn from_config(index: usize, raw: TagConfig) -> Result<Self, ConfigError> {
        let name = raw.name.trim().to_string();
        if name.is_empty() {
            return Err(ConfigError::EmptyName { index });
        }

        let bit = match (raw.value_type, raw.bit) {
            (ValueType::Boolean, Some(bit)) if bit <= 7 => Some(bit),
            (ValueType::Boolean, Some(bit)) => {
                return Err(ConfigError::InvalidAddress {
                    tag: name,
                    reason: format!("bit offset {} is outside 0..=7", bit),
                })
            }
            (ValueType::Boolean, None) => {
                return Err(ConfigError::InvalidAddress {
                    tag: name,
                    reason: "BOOL tags need a bit offset".into(),
                })
            }
            (ValueType::Float32, Some(_)) => {
                return Err(ConfigError::InvalidAddress {
                    tag: name,
                    reason: "REAL tags take no bit offset".into(),
                })
            }
            (ValueType::Float32, None) => None,
        };

        let alarm_rule = match (raw.alarm_high, raw.alarm_if) {
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingRules { tag: name }),
            (Some(threshold), None) => {
                if raw.value_type != ValueType::Float32 {
                    return Err(ConfigError::IncompatibleRule {
                        tag: name,
                        rule: "alarm_high",
                        value_type: raw.value_type.as_str(),
                    });
                }
                // Compared against the decoded f32, so round to f32 here
                let threshold = threshold as f32;
                if !threshold.is_finite() {
                    return Err(ConfigError::NonFiniteThreshold { tag: name });
                }
                Some(AlarmRule::HighThreshold(threshold))
            }
            (None, Some(expected)) => {
                if raw.value_type != ValueType::Boolean {
                    return Err(ConfigError::IncompatibleRule {
                        tag: name,
                        rule: "alarm_if",
                        value_type: raw.value_type.as_str(),
                    });
                }
                Some(AlarmRule::MatchBoolean(expected))
            }
            (None, None) => None,
        };

        Ok(Self {
            name,
            address: TagAddress {
                db: raw.db,
                start: raw.start,
                bit,
            },
            value_type: raw.value_type,
            alarm_rule,
        })
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// The validated set of monitored points.
///
/// Loading never touches the controller or the store.
///
/// # Examples
///
/// ```rust
/// use tagwatch::TagRegistry;
///
/// let registry = TagRegistry::from_json_str(r#"{"tags": [
///     {"name": "T1", "db": 24, "start": 0, "type": "REAL", "alarm_high": 36},
///     {"name": "Door1", "db": 25, "start": 0, "type": "BOOL", "bit": 0, "alarm_if": true}
/// ]}"#)?;
/// assert_eq!(registry.len(), 2);
/// # Ok::<(), tagwatch::ConfigError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TagRegistry {
    tags: Vec<TagDefinition>,
}

impl TagRegistry {
    /// Validate raw tags in file order.
    pub fn load(raw: Vec<TagConfig>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::with_capacity(raw.len());
        let mut tags = Vec::with_capacity(raw.len());

        for (index, config) in raw.into_iter().enumerate() {
            let tag = TagDefinition::from_config(index, config)?;
            if !seen.insert(tag.name.clone()) {
                return Err(ConfigError::DuplicateName(tag.name));
            }
            debug!(tag = %tag.name, address = %tag.address, "Registered tag");
            tags.push(tag);
        }

        Ok(Self { tags })
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let doc: TagDocument = serde_json::from_str(json)?;
        Self::load(doc.tags)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let doc: TagDocument = serde_yaml::from_str(yaml)?;
        Self::load(doc.tags)
    }

    /// Load a standalone tag file; `.json` is parsed as JSON, anything else
    /// as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        if is_json(path) {
            Self::from_json_str(&text)
        } else {
            Self::from_yaml_str(&text)
        }
    }

    pub fn tags(&self) -> &[TagDefinition] {
        &self.tags
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TagDefinition> {
        self.tags.iter()
    }

    pub fn get(&self, name: &str) -> Option<&TagDefinition> {
        self.tags.iter().find(|t| t.name == name)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl<'a> IntoIterator for &'a TagRegistry {
    type Item = &'a TagDefinition;
    type IntoIter = std::slice::Iter<'a, TagDefinition>;

    fn into_iter(self) -> Self::IntoIter {
        self.tags.iter()
    }
}

pub(crate) fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}
