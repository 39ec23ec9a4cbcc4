//! Fraud scoring configuration
//!
//! All weights, thresholds, and band boundaries are configurable via
//! file/env, not hardcoded. The defaults are placeholders pending
//! empirical calibration against production traffic.

use glowcast_ledger::RiskLevel;
use serde::{Deserialize, Serialize};

/// Configuration for the fraud scorer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudConfig {
    // === Check weights (points added to the 0-100 score) ===
    /// Declared country differs from the IP-resolved country
    #[serde(default = "default_country_mismatch_weight")]
    pub country_mismatch_weight: u8,

    /// 24h transaction count above threshold
    #[serde(default = "default_velocity_tx_weight")]
    pub velocity_tx_weight: u8,

    /// 24h unique IP count above threshold
    #[serde(default = "default_velocity_ip_weight")]
    pub velocity_ip_weight: u8,

    /// 24h unique device-fingerprint count above threshold
    #[serde(default = "default_velocity_device_weight")]
    pub velocity_device_weight: u8,

    /// Single amount above threshold
    #[serde(default = "default_large_amount_weight")]
    pub large_amount_weight: u8,

    // === Velocity thresholds (trailing 24h window) ===
    #[serde(default = "default_velocity_tx_threshold")]
    pub velocity_tx_threshold: u32,

    #[serde(default = "default_velocity_ip_threshold")]
    pub velocity_ip_threshold: u32,

    #[serde(default = "default_velocity_device_threshold")]
    pub velocity_device_threshold: u32,

    /// Coin amount considered large for a single entry
    #[serde(default = "default_large_amount_threshold")]
    pub large_amount_threshold: u64,

    // === Risk bands (lower bound of each band) ===
    #[serde(default = "default_medium_band")]
    pub medium_band: u8,

    #[serde(default = "default_high_band")]
    pub high_band: u8,

    #[serde(default = "default_critical_band")]
    pub critical_band: u8,

    // === Latency budget ===
    /// Hard timeout for one scoring call; on expiry the service fails open
    #[serde(default = "default_score_timeout_ms")]
    pub score_timeout_ms: u64,
}

impl FraudConfig {
    /// Map a weighted score to its risk band
    pub fn band(&self, score: u8) -> RiskLevel {
        if score >= self.critical_band {
            RiskLevel::Critical
        } else if score >= self.high_band {
            RiskLevel::High
        } else if score >= self.medium_band {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

impl Default for FraudConfig {
    fn default() -> Self {
        Self {
            country_mismatch_weight: default_country_mismatch_weight(),
            velocity_tx_weight: default_velocity_tx_weight(),
            velocity_ip_weight: default_velocity_ip_weight(),
            velocity_device_weight: default_velocity_device_weight(),
            large_amount_weight: default_large_amount_weight(),
            velocity_tx_threshold: default_velocity_tx_threshold(),
            velocity_ip_threshold: default_velocity_ip_threshold(),
            velocity_device_threshold: default_velocity_device_threshold(),
            large_amount_threshold: default_large_amount_threshold(),
            medium_band: default_medium_band(),
            high_band: default_high_band(),
            critical_band: default_critical_band(),
            score_timeout_ms: default_score_timeout_ms(),
        }
    }
}

// Default value functions for serde

fn default_country_mismatch_weight() -> u8 {
    30
}

fn default_velocity_tx_weight() -> u8 {
    25
}

fn default_velocity_ip_weight() -> u8 {
    20
}

fn default_velocity_device_weight() -> u8 {
    15
}

fn default_large_amount_weight() -> u8 {
    10
}

fn default_velocity_tx_threshold() -> u32 {
    20
}

fn default_velocity_ip_threshold() -> u32 {
    3
}

fn default_velocity_device_threshold() -> u32 {
    3
}

fn default_large_amount_threshold() -> u64 {
    10_000
}

fn default_medium_band() -> u8 {
    25
}

fn default_high_band() -> u8 {
    50
}

fn default_critical_band() -> u8 {
    75
}

fn default_score_timeout_ms() -> u64 {
    250
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_boundaries() {
        let config = FraudConfig::default();
        assert_eq!(config.band(0), RiskLevel::Low);
        assert_eq!(config.band(24), RiskLevel::Low);
        assert_eq!(config.band(25), RiskLevel::Medium);
        assert_eq!(config.band(50), RiskLevel::High);
        assert_eq!(config.band(75), RiskLevel::Critical);
        assert_eq!(config.band(100), RiskLevel::Critical);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: FraudConfig = serde_json::from_str(r#"{"high_band": 60}"#).unwrap();
        assert_eq!(config.high_band, 60);
        assert_eq!(config.medium_band, default_medium_band());
    }
}
