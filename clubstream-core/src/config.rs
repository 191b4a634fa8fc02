// src/config.rs

use std::time::Duration;

/// Substring of a profile description that marks an account as a test
/// account. Only honoured when test-account exclusion is on.
pub const TEST_ACCOUNT_MARKER: &str = "DevTest";

/// How long a status message may sit in the channel without changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    /// Any entry, online or not.
    pub max_age: chrono::Duration,
    /// Entries showing an "ended" notice.
    pub offline_max_age: chrono::Duration,
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self {
            max_age: chrono::Duration::hours(48),
            offline_max_age: chrono::Duration::hours(6),
        }
    }
}

/// Runtime knobs of the bridge. Credentials stay with the platform clients.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// trackmania.io club ids whose members make up the roster.
    pub roster_source_ids: Vec<String>,
    pub roster_poll_interval: Duration,
    pub sweep_interval: Duration,
    pub expiry: ExpiryPolicy,
    /// Upper bound on the final forced sweep at shutdown.
    pub shutdown_timeout: Duration,
    pub exclude_test_accounts: bool,
    pub purge_subscriptions_on_start: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            roster_source_ids: vec!["0".to_string()],
            roster_poll_interval: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(60),
            expiry: ExpiryPolicy::default(),
            shutdown_timeout: Duration::from_secs(10),
            exclude_test_accounts: false,
            purge_subscriptions_on_start: true,
        }
    }
}

impl BridgeConfig {
    /// Splits a comma separated id list, dropping blanks.
    pub fn parse_source_ids(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }

    /// Test-account exclusion is a production-only switch.
    pub fn exclusion_for_environment(environment: &str) -> bool {
        environment.eq_ignore_ascii_case("production")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.roster_poll_interval, Duration::from_secs(3600));
        assert_eq!(cfg.sweep_interval, Duration::from_secs(60));
        assert_eq!(cfg.expiry.max_age, chrono::Duration::hours(48));
        assert_eq!(cfg.expiry.offline_max_age, chrono::Duration::hours(6));
        assert!(!cfg.exclude_test_accounts);
    }

    #[test]
    fn source_ids_are_split_and_trimmed() {
        assert_eq!(
            BridgeConfig::parse_source_ids(" 150, 24001 ,,"),
            vec!["150".to_string(), "24001".to_string()]
        );
        assert!(BridgeConfig::parse_source_ids("").is_empty());
    }

    #[test]
    fn exclusion_only_in_production() {
        assert!(BridgeConfig::exclusion_for_environment("production"));
        assert!(BridgeConfig::exclusion_for_environment("PRODUCTION"));
        assert!(!BridgeConfig::exclusion_for_environment("development"));
        assert!(!BridgeConfig::exclusion_for_environment(""));
    }
}
