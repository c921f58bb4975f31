//! Match timing and identifier settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for the lifecycle controller.
///
/// Durations are stored in seconds so the structure can be embedded directly
/// in a TOML configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchSettings {
    /// How long a freshly created match waits for an opponent
    pub pending_expiry_secs: u64,

    /// Grace period after the joiner leaves a ready match
    pub disconnect_grace_secs: u64,

    /// How long a finished match stays addressable before eviction
    pub finished_retention_secs: u64,

    /// How long a started match survives once neither player is connected
    pub abandoned_match_secs: u64,

    /// Length of generated match identifiers
    pub match_id_length: usize,
}

impl MatchSettings {
    pub fn pending_expiry(&self) -> Duration {
        Duration::from_secs(self.pending_expiry_secs)
    }

    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_secs(self.disconnect_grace_secs)
    }

    pub fn finished_retention(&self) -> Duration {
        Duration::from_secs(self.finished_retention_secs)
    }

    pub fn abandoned_match(&self) -> Duration {
        Duration::from_secs(self.abandoned_match_secs)
    }

    /// Checks that every duration and the id length are usable.
    pub fn validate(&self) -> Result<(), String> {
        if self.pending_expiry_secs == 0 {
            return Err("matches.pending_expiry_secs must be greater than 0".to_string());
        }
        if self.disconnect_grace_secs == 0 {
            return Err("matches.disconnect_grace_secs must be greater than 0".to_string());
        }
        if self.finished_retention_secs == 0 {
            return Err("matches.finished_retention_secs must be greater than 0".to_string());
        }
        if self.abandoned_match_secs == 0 {
            return Err("matches.abandoned_match_secs must be greater than 0".to_string());
        }
        if !(6..=64).contains(&self.match_id_length) {
            return Err("matches.match_id_length must be between 6 and 64".to_string());
        }
        Ok(())
    }
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            pending_expiry_secs: 10 * 60,
            disconnect_grace_secs: 5 * 60,
            finished_retention_secs: 30 * 60,
            abandoned_match_secs: 60 * 60,
            match_id_length: 12,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = MatchSettings::default();
        assert_eq!(settings.pending_expiry(), Duration::from_secs(600));
        assert_eq!(settings.disconnect_grace(), Duration::from_secs(300));
        assert_eq!(settings.abandoned_match(), Duration::from_secs(3600));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_and_short_ids() {
        let zero = MatchSettings { disconnect_grace_secs: 0, ..Default::default() };
        assert!(zero.validate().is_err());

        let never = MatchSettings { abandoned_match_secs: 0, ..Default::default() };
        assert!(never.validate().is_err());

        let short = MatchSettings { match_id_length: 3, ..Default::default() };
        assert!(short.validate().is_err());
    }
}
