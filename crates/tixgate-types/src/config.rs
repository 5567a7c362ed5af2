//! Configuration for the settlement engine.
//!
//! Only non-secret tuning lives here. Secrets (key-derivation salt, platform
//! signing key) are loaded separately by the settlement crate and never
//! serialized.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{constants, Result, TixgateError};

/// Settlement tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Platform share of primary sales in basis points.
    pub platform_fee_bps: u16,
    /// Confirmation polling.
    pub confirmation: ConfirmationConfig,
    /// How often, and how long, a request waits for a concurrent endpoint creation.
    pub endpoint_wait_attempts: u32,
    pub endpoint_wait_ms: u64,
    /// A claim older than this with nothing sent is reclaimed.
    pub endpoint_stale_ms: u64,
    /// Whether marketplace purchases need the platform's co-signature.
    pub registry_requires_authority: bool,
    /// Session cache lifetime.
    pub session_ttl_secs: i64,
}

/// Confirmation polling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    pub interval_ms: u64,
    pub max_attempts: u32,
}

impl ConfirmationConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            interval_ms: constants::DEFAULT_CONFIRM_INTERVAL_MS,
            max_attempts: constants::DEFAULT_CONFIRM_MAX_ATTEMPTS,
        }
    }
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            platform_fee_bps: constants::DEFAULT_PLATFORM_FEE_BPS,
            confirmation: ConfirmationConfig::default(),
            endpoint_wait_attempts: constants::DEFAULT_ENDPOINT_WAIT_ATTEMPTS,
            endpoint_wait_ms: constants::DEFAULT_ENDPOINT_WAIT_MS,
            endpoint_stale_ms: constants::DEFAULT_ENDPOINT_STALE_MS,
            registry_requires_authority: true,
            session_ttl_secs: constants::DEFAULT_SESSION_TTL_SECS,
        }
    }
}

impl SettlementConfig {
    /// Check value ranges.
    ///
    /// # Errors
    /// Returns [`TixgateError::Configuration`] on an out-of-range value.
    pub fn validate(&self) -> Result<()> {
        if u64::from(self.platform_fee_bps) > constants::BPS_DENOMINATOR {
            return Err(TixgateError::Configuration(format!(
                "platform_fee_bps {} exceeds {}",
                self.platform_fee_bps,
                constants::BPS_DENOMINATOR
            )));
        }
        if self.confirmation.max_attempts == 0 {
            return Err(TixgateError::Configuration(
                "confirmation.max_attempts must be > 0".into(),
            ));
        }
        if self.endpoint_stale_ms == 0 {
            return Err(TixgateError::Configuration(
                "endpoint_stale_ms must be > 0".into(),
            ));
        }
        if self.session_ttl_secs <= 0 {
            return Err(TixgateError::Configuration(
                "session_ttl_secs must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Defaults overlaid with `TIXGATE_FEE_BPS`, `TIXGATE_CONFIRM_INTERVAL_MS`
    /// and `TIXGATE_CONFIRM_MAX_ATTEMPTS`, then validated.
    ///
    /// # Errors
    /// Returns [`TixgateError::Configuration`] for an unparsable or
    /// out-of-range value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(v) = parse_var(&lookup, "TIXGATE_FEE_BPS")? {
            cfg.platform_fee_bps = v;
        }
        if let Some(v) = parse_var(&lookup, "TIXGATE_CONFIRM_INTERVAL_MS")? {
            cfg.confirmation.interval_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "TIXGATE_CONFIRM_MAX_ATTEMPTS")? {
            cfg.confirmation.max_attempts = v;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    #[must_use]
    pub fn endpoint_wait(&self) -> Duration {
        Duration::from_millis(self.endpoint_wait_ms)
    }

    #[must_use]
    pub fn endpoint_stale_after(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(i64::try_from(self.endpoint_stale_ms).unwrap_or(i64::MAX))
    }

    /// Zero-delay polling, for tests that drive an in-memory ledger.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            confirmation: ConfirmationConfig {
                interval_ms: 0,
                max_attempts: constants::DEFAULT_CONFIRM_MAX_ATTEMPTS,
            },
            endpoint_wait_ms: 1,
            ..Self::default()
        }
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|_| TixgateError::Configuration(format!("{key}={raw:?} is not a valid number")))
}
