//! Kiosk configuration — loaded once at startup, read-only thereafter.
//!
//! Missing file or missing fields fall back to defaults so a factory
//! device boots without provisioning.

use crate::error::{KioskError, KioskResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Thresholds the fraud engine evaluates against. Kept separate from
/// the rest of the config so the engine can take just this slice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudPolicy {
    /// Confidence below this is an outright deny.
    #[serde(default = "default_deny_below")]
    pub deny_below: f64,
    /// Confidence below this (but at or above `deny_below`) routes to
    /// the operator.
    #[serde(default = "default_review_below")]
    pub review_below: f64,
    /// Fixed cost of one meal, deducted on every recorded decision.
    #[serde(default = "default_meal_cost")]
    pub meal_cost: f64,
}

fn default_deny_below() -> f64 {
    0.60
}
fn default_review_below() -> f64 {
    0.75
}
fn default_meal_cost() -> f64 {
    5.0
}

impl Default for FraudPolicy {
    fn default() -> Self {
        Self {
            deny_below: default_deny_below(),
            review_below: default_review_below(),
            meal_cost: default_meal_cost(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KioskConfig {
    #[serde(default = "default_server_host")]
    pub server_host: String,
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    /// Seconds of no motion before the kiosk drops into low power.
    #[serde(default = "default_motion_timeout")]
    pub motion_timeout_secs: u64,
    #[serde(default = "default_offline_enabled")]
    pub offline_mode_enabled: bool,
    #[serde(default)]
    pub fraud: FraudPolicy,
}

fn default_server_host() -> String {
    "192.168.1.100".to_string()
}
fn default_server_port() -> u16 {
    5000
}
fn default_motion_timeout() -> u64 {
    30
}
fn default_offline_enabled() -> bool {
    true
}

impl Default for KioskConfig {
    fn default() -> Self {
        Self {
            server_host: default_server_host(),
            server_port: default_server_port(),
            motion_timeout_secs: default_motion_timeout(),
            offline_mode_enabled: default_offline_enabled(),
            fraud: FraudPolicy::default(),
        }
    }
}

impl KioskConfig {
    /// Parse a config from JSON. Unknown fields are ignored, absent
    /// fields take defaults.
    pub fn from_json(json: &str) -> KioskResult<Self> {
        let config = serde_json::from_str(json)?;
        Ok(config)
    }

    /// Load from a file, falling back to defaults when the file does
    /// not exist. A present-but-unparseable file is an error: a device
    /// with a corrupt config should surface that, not silently reset.
    pub fn load(path: &Path) -> KioskResult<Self> {
        if !path.exists() {
            log::info!("Config: {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_json(&content)
            .map_err(|e| KioskError::Config(format!("{}: {e}", path.display())))?;
        log::info!("Config: loaded from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_factory_settings() {
        let config = KioskConfig::default();
        assert_eq!(config.server_port, 5000);
        assert_eq!(config.motion_timeout_secs, 30);
        assert!(config.offline_mode_enabled);
        assert_eq!(config.fraud.deny_below, 0.60);
        assert_eq!(config.fraud.review_below, 0.75);
        assert_eq!(config.fraud.meal_cost, 5.0);
    }

    #[test]
    fn partial_json_fills_missing_fields() {
        let config = KioskConfig::from_json(r#"{"server_host": "10.0.0.7"}"#).unwrap();
        assert_eq!(config.server_host, "10.0.0.7");
        assert_eq!(config.server_port, 5000);
        assert_eq!(config.fraud.meal_cost, 5.0);
    }

    #[test]
    fn nested_fraud_overrides_apply() {
        let config =
            KioskConfig::from_json(r#"{"fraud": {"meal_cost": 6.5}}"#).unwrap();
        assert_eq!(config.fraud.meal_cost, 6.5);
        assert_eq!(config.fraud.deny_below, 0.60);
    }
}
