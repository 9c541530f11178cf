use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};
use crate::storage::{Level, StorageLayout};

/// Retention and pruning policy for one aggregation level
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelPolicy {
    /// Days of the parent level consumed to build one day of this level
    pub retention_days: u32,
    /// Extra days kept past `retention_days` before daily files are pruned;
    /// `None` disables pruning for the level
    pub prune_buffer_days: Option<u32>,
}

impl LevelPolicy {
    pub const fn new(retention_days: u32, prune_buffer_days: Option<u32>) -> Self {
        Self {
            retention_days,
            prune_buffer_days,
        }
    }
}

/// Per-level policies.
///
/// Each `[levels.<label>]` table only overrides the fields it names; the
/// rest keep that level's defaults.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct LevelPolicies {
    #[serde(rename = "5m")]
    pub five_minutes: LevelPolicy,
    #[serde(rename = "30m")]
    pub thirty_minutes: LevelPolicy,
    #[serde(rename = "2h")]
    pub two_hours: LevelPolicy,
    #[serde(rename = "12h")]
    pub twelve_hours: LevelPolicy,
    #[serde(rename = "1w")]
    pub one_week: LevelPolicy,
}

impl Default for LevelPolicies {
    fn default() -> Self {
        Self {
            five_minutes: LevelPolicy::new(30, Some(7)),
            thirty_minutes: LevelPolicy::new(90, Some(30)),
            two_hours: LevelPolicy::new(730, None),
            twelve_hours: LevelPolicy::new(1825, None),
            one_week: LevelPolicy::new(1825, None),
        }
    }
}

/// Fields a `[levels.<label>]` table may set
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PolicyOverride {
    retention_days: Option<u32>,
    prune_buffer_days: Option<u32>,
}

impl PolicyOverride {
    fn apply(this: Option<Self>, base: LevelPolicy) -> LevelPolicy {
        let Some(this) = this else {
            return base;
        };

        LevelPolicy {
            retention_days: this.retention_days.unwrap_or(base.retention_days),
            prune_buffer_days: this.prune_buffer_days.or(base.prune_buffer_days),
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct LevelOverrides {
    #[serde(rename = "5m")]
    five_minutes: Option<PolicyOverride>,
    #[serde(rename = "30m")]
    thirty_minutes: Option<PolicyOverride>,
    #[serde(rename = "2h")]
    two_hours: Option<PolicyOverride>,
    #[serde(rename = "12h")]
    twelve_hours: Option<PolicyOverride>,
    #[serde(rename = "1w")]
    one_week: Option<PolicyOverride>,
}

impl<'de> Deserialize<'de> for LevelPolicies {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        let overrides = LevelOverrides::deserialize(deserializer)?;
        let base = Self::default();

        Ok(Self {
            five_minutes: PolicyOverride::apply(overrides.five_minutes, base.five_minutes),
            thirty_minutes: PolicyOverride::apply(overrides.thirty_minutes, base.thirty_minutes),
            two_hours: PolicyOverride::apply(overrides.two_hours, base.two_hours),
            twelve_hours: PolicyOverride::apply(overrides.twelve_hours, base.twelve_hours),
            one_week: PolicyOverride::apply(overrides.one_week, base.one_week),
        })
    }
}

/// Settings for the rollup cascade
///
/// Every field has a default, so an empty TOML document is a valid config:
///
/// ```toml
/// root = "/var/lib/airlog/logs"
/// raw_prefix = "temp_"
///
/// [levels.30m]
/// retention_days = 90
/// prune_buffer_days = 30
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct CascadeConfig {
    /// Storage root holding raw files and one directory per level
    pub root: PathBuf,
    /// File name prefix identifying raw log files at the root
    pub raw_prefix: String,
    pub levels: LevelPolicies,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./logs"),
            raw_prefix: "temp_".to_string(),
            levels: LevelPolicies::default(),
        }
    }
}

impl CascadeConfig {
    /// Default config rooted at `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(Error::io(path))?;
        Self::from_toml_str(&text)
    }

    /// Policy for an aggregated level; raw data has none
    pub fn policy(&self, level: Level) -> Option<LevelPolicy> {
        match level {
            Level::Raw => None,
            Level::FiveMinutes => Some(self.levels.five_minutes),
            Level::ThirtyMinutes => Some(self.levels.thirty_minutes),
            Level::TwoHours => Some(self.levels.two_hours),
            Level::TwelveHours => Some(self.levels.twelve_hours),
            Level::OneWeek => Some(self.levels.one_week),
        }
    }

    pub fn layout(&self) -> StorageLayout {
        StorageLayout::new(&self.root, &self.raw_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(CascadeConfig::from_toml_str("").unwrap(), CascadeConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = CascadeConfig::from_toml_str(
            r#"
            root = "/srv/logs"

            [levels.30m]
            retention_days = 14
            "#,
        )
        .unwrap();

        assert_eq!(config.root, PathBuf::from("/srv/logs"));
        assert_eq!(config.raw_prefix, "temp_");
        assert_eq!(config.policy(Level::ThirtyMinutes), Some(LevelPolicy::new(14, Some(30))));
        assert_eq!(config.policy(Level::TwoHours), Some(LevelPolicy::new(730, None)));
        assert_eq!(config.policy(Level::Raw), None);
    }

    #[test]
    fn test_level_override_keeps_other_defaults() {
        let config = CascadeConfig::from_toml_str("[levels.5m]\nretention_days = 45").unwrap();
        assert_eq!(config.policy(Level::FiveMinutes), Some(LevelPolicy::new(45, Some(7))));

        let config = CascadeConfig::from_toml_str("[levels.2h]\nprune_buffer_days = 60").unwrap();
        assert_eq!(config.policy(Level::TwoHours), Some(LevelPolicy::new(730, Some(60))));
        assert_eq!(config.policy(Level::FiveMinutes), Some(LevelPolicy::new(30, Some(7))));
    }

    #[test]
    fn test_unknown_level_or_field_is_rejected() {
        assert!(matches!(
            CascadeConfig::from_toml_str("[levels.10m]\nretention_days = 3"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            CascadeConfig::from_toml_str("[levels.5m]\nretention = 3"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_invalid_document() {
        assert!(matches!(
            CascadeConfig::from_toml_str("root = 5"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            CascadeConfig::load(dir.path().join("absent.toml")),
            Err(Error::Io { .. })
        ));
    }
}
