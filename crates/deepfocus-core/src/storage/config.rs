//! TOML-based application configuration.
//!
//! Stores:
//! - Session defaults (type, length, break intervals, timers)
//! - Distraction gate contacts and keywords
//! - Flow detector thresholds
//! - Task ranker limits
//!
//! Configuration is stored at `~/.config/deepfocus/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::ConfigError;
use crate::flow::FlowConfig;
use crate::gate::{GateConfig, GateLevel};
use crate::ranker::RankerConfig;
use crate::session::{EnvConfig, RuntimeTiming, SessionType};

/// Break reminder interval per session type, in minutes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BreakIntervals {
    #[serde(default = "default_deep_work_break")]
    pub deep_work: u32,
    #[serde(default = "default_regular_break")]
    pub regular: u32,
    #[serde(default = "default_light_break")]
    pub light: u32,
    #[serde(default = "default_creative_break")]
    pub creative: u32,
}

impl BreakIntervals {
    pub fn for_type(&self, session_type: SessionType) -> u32 {
        match session_type {
            SessionType::DeepWork => self.deep_work,
            SessionType::Regular => self.regular,
            SessionType::Light => self.light,
            SessionType::Creative => self.creative,
        }
    }
}

/// Session defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSection {
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default)]
    pub default_type: SessionType,
    #[serde(default = "default_planned_minutes")]
    pub planned_minutes: u32,
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    #[serde(default = "default_flow_eval_interval_secs")]
    pub flow_eval_interval_secs: u64,
    #[serde(default = "default_auto_end_grace_secs")]
    pub auto_end_grace_secs: u64,
    #[serde(default = "default_min_break_minutes")]
    pub min_break_minutes: u32,
    /// Self-assessed skill, 1-10.
    #[serde(default = "default_level")]
    pub skill_level: f64,
    /// Energy used for ranking when none is given, 1-10.
    #[serde(default = "default_energy_level")]
    pub energy_level: u8,
    #[serde(default)]
    pub break_interval_minutes: BreakIntervals,
}

/// Distraction gate settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GateSection {
    /// Unset: the session type's default level.
    #[serde(default)]
    pub level: Option<GateLevel>,
    #[serde(default)]
    pub emergency_contacts: Vec<String>,
    #[serde(default)]
    pub priority_contacts: Vec<String>,
    #[serde(default)]
    pub blocked_sources: Vec<String>,
    #[serde(default = "default_inactivity_threshold_secs")]
    pub inactivity_threshold_secs: u64,
    #[serde(default)]
    pub urgent_keywords: Vec<String>,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/deepfocus/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub gate: GateSection,
    #[serde(default)]
    pub flow: FlowConfig,
    #[serde(default)]
    pub ranker: RankerConfig,
}

// Default functions
fn default_user_id() -> String {
    crate::session::EnvConfig::default().user_id
}
fn default_planned_minutes() -> u32 {
    60
}
fn default_tick_interval_secs() -> u64 {
    1
}
fn default_flow_eval_interval_secs() -> u64 {
    30
}
fn default_auto_end_grace_secs() -> u64 {
    3
}
fn default_min_break_minutes() -> u32 {
    5
}
fn default_level() -> f64 {
    5.0
}
fn default_energy_level() -> u8 {
    5
}
fn default_inactivity_threshold_secs() -> u64 {
    30
}
fn default_deep_work_break() -> u32 {
    SessionType::DeepWork.default_break_interval_minutes()
}
fn default_regular_break() -> u32 {
    SessionType::Regular.default_break_interval_minutes()
}
fn default_light_break() -> u32 {
    SessionType::Light.default_break_interval_minutes()
}
fn default_creative_break() -> u32 {
    SessionType::Creative.default_break_interval_minutes()
}

impl Default for BreakIntervals {
    fn default() -> Self {
        Self {
            deep_work: default_deep_work_break(),
            regular: default_regular_break(),
            light: default_light_break(),
            creative: default_creative_break(),
        }
    }
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            default_type: SessionType::default(),
            planned_minutes: default_planned_minutes(),
            tick_interval_secs: default_tick_interval_secs(),
            flow_eval_interval_secs: default_flow_eval_interval_secs(),
            auto_end_grace_secs: default_auto_end_grace_secs(),
            min_break_minutes: default_min_break_minutes(),
            skill_level: default_level(),
            energy_level: default_energy_level(),
            break_interval_minutes: BreakIntervals::default(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as number")));
                        }
                    }
                    serde_json::Value::Array(_) => {
                        // Accept a JSON array or a comma-separated list.
                        serde_json::from_str(value).unwrap_or_else(|_| {
                            serde_json::Value::Array(
                                value
                                    .split(',')
                                    .map(str::trim)
                                    .filter(|s| !s.is_empty())
                                    .map(|s| serde_json::Value::String(s.to_string()))
                                    .collect(),
                            )
                        })
                    }
                    serde_json::Value::Object(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    serde_json::Value::Null if value.is_empty() || value == "null" => {
                        serde_json::Value::Null
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    fn collect_leaves(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, child) in map {
                    let path = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{prefix}.{key}")
                    };
                    Self::collect_leaves(&path, child, out);
                }
            }
            serde_json::Value::String(s) => out.push((prefix.to_string(), s.clone())),
            other => out.push((prefix.to_string(), other.to_string())),
        }
    }

    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk, writing the defaults when no file exists yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(err) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: err.to_string(),
            }),
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Change a value by dot-separated key without saving.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value does not fit it.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let to_invalid = |e: serde_json::Error| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        };
        let mut json = serde_json::to_value(&*self).map_err(to_invalid)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(to_invalid)?;
        Ok(())
    }

    /// Set a value by key and save. Returns error if key is unknown.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.apply(key, value)?;
        self.save()
    }

    /// Every leaf as `(dot.key, value)`, sorted by key.
    pub fn entries(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        if let Ok(json) = serde_json::to_value(self) {
            Self::collect_leaves("", &json, &mut out);
        }
        out.sort();
        out
    }

    /// Per-session environment for `session_type`.
    pub fn env_config(&self, session_type: SessionType) -> EnvConfig {
        EnvConfig {
            user_id: self.session.user_id.clone(),
            session_type,
            planned_minutes: self.session.planned_minutes,
            gate: GateConfig {
                level: self
                    .gate
                    .level
                    .unwrap_or_else(|| session_type.default_gate_level()),
                emergency_contacts: self.gate.emergency_contacts.clone(),
                priority_contacts: self.gate.priority_contacts.clone(),
                blocked_sources: self.gate.blocked_sources.clone(),
                urgent_keywords: self.gate.urgent_keywords.clone(),
                inactivity_threshold_secs: self.gate.inactivity_threshold_secs,
            },
            flow: self.flow.clone(),
            break_interval_minutes: self.session.break_interval_minutes.for_type(session_type),
            min_break_minutes: self.session.min_break_minutes,
            flow_eval_interval_secs: self.session.flow_eval_interval_secs,
            auto_end_grace_secs: self.session.auto_end_grace_secs,
            skill_level: Some(self.session.skill_level),
        }
    }

    pub fn runtime_timing(&self) -> RuntimeTiming {
        RuntimeTiming::from_secs(self.session.tick_interval_secs)
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
        assert_eq!(parsed.session.planned_minutes, 60);
        assert_eq!(parsed.ranker.max_tasks, 4);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let cfg: Config = toml::from_str("[gate]\nlevel = \"strict\"\n").unwrap();
        assert_eq!(cfg.gate.level, Some(GateLevel::Strict));
        assert_eq!(cfg.gate.inactivity_threshold_secs, 30);
        assert_eq!(cfg.flow.flow_threshold, 0.70);
        assert_eq!(cfg.session.break_interval_minutes.deep_work, 90);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("session.planned_minutes").as_deref(), Some("60"));
        assert_eq!(cfg.get("session.default_type").as_deref(), Some("regular"));
        assert_eq!(cfg.get("flow.min_confidence").as_deref(), Some("0.5"));
        assert!(cfg.get("session.missing_key").is_none());
    }

    #[test]
    fn apply_updates_numbers_lists_and_options() {
        let mut cfg = Config::default();
        cfg.apply("session.planned_minutes", "90").unwrap();
        cfg.apply("gate.emergency_contacts", "mom@family.net, boss@corp.io")
            .unwrap();
        cfg.apply("gate.level", "light").unwrap();
        cfg.apply("session.default_type", "deep_work").unwrap();

        assert_eq!(cfg.session.planned_minutes, 90);
        assert_eq!(
            cfg.gate.emergency_contacts,
            ["mom@family.net", "boss@corp.io"]
        );
        assert_eq!(cfg.gate.level, Some(GateLevel::Light));
        assert_eq!(cfg.session.default_type, SessionType::DeepWork);
    }

    #[test]
    fn apply_rejects_unknown_key_and_bad_value() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.apply("session.nonexistent", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(
            cfg.apply("session.planned_minutes", "soon"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(cfg.apply("gate.level", "paranoid").is_err());
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn env_config_uses_type_defaults_unless_overridden() {
        let mut cfg = Config::default();
        let deep = cfg.env_config(SessionType::DeepWork);
        assert_eq!(deep.gate.level, GateLevel::Strict);
        assert_eq!(deep.break_interval_minutes, 90);
        assert_eq!(deep.skill_level, Some(5.0));

        cfg.gate.level = Some(GateLevel::Light);
        assert_eq!(cfg.env_config(SessionType::DeepWork).gate.level, GateLevel::Light);
    }

    #[test]
    fn entries_lists_leaves() {
        let entries = Config::default().entries();
        assert!(entries
            .iter()
            .any(|(k, v)| k == "ranker.fill_ratio" && v == "0.8"));
        assert!(entries.windows(2).all(|w| w[0].0 <= w[1].0));
    }

    #[test]
    fn load_from_writes_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg, Config::default());
        assert!(path.exists());

        let mut changed = cfg.clone();
        changed.apply("ranker.max_tasks", "3").unwrap();
        changed.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap().ranker.max_tasks, 3);
    }
}
