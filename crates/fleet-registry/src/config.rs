//! Registry configuration and the wire-stable key names

use std::time::Duration;

/// Hash of `url -> descriptor JSON`, written directly by workers
pub const REGISTRY_KEY: &str = "expert_agents";

/// Sorted set of `url -> last heartbeat (unix seconds)`
pub const HEARTBEAT_KEY: &str = "agent_heartbeats";

/// Plain key whose `set`/`del` notifications announce an agent
pub fn marker_key(url: &str) -> String {
    format!("{REGISTRY_KEY}:{url}")
}

/// Registry tuning
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryConfig {
    /// An agent is live while its last heartbeat is at most this old
    pub heartbeat_timeout: Duration,
    /// Pause between reaper sweeps
    pub reap_interval: Duration,
    /// Pause after a failed sweep
    pub reap_retry: Duration,
    /// Reap descriptors that have no heartbeat entry at all
    pub require_heartbeat: bool,
    /// First reconnect delay of the fan-out worker
    pub reconnect_base: Duration,
    /// Upper bound on the reconnect delay
    pub reconnect_cap: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(30),
            reap_interval: Duration::from_secs(60),
            reap_retry: Duration::from_secs(30),
            require_heartbeat: false,
            reconnect_base: Duration::from_secs(1),
            reconnect_cap: Duration::from_secs(30),
        }
    }
}

impl RegistryConfig {
    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    pub fn with_reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval = interval;
        self
    }

    pub fn with_reap_retry(mut self, retry: Duration) -> Self {
        self.reap_retry = retry;
        self
    }

    pub fn with_require_heartbeat(mut self, require: bool) -> Self {
        self.require_heartbeat = require;
        self
    }

    pub fn with_reconnect_backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.reconnect_base = base;
        self.reconnect_cap = cap;
        self
    }

    /// Delay before reconnect attempt `attempt` (0-based): `min(base * 2^attempt, cap)`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(31));
        self.reconnect_base
            .checked_mul(factor)
            .map_or(self.reconnect_cap, |delay| delay.min(self.reconnect_cap))
    }
}

/// Worker-side heartbeat cadence
#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatConfig {
    /// Pause between heartbeats
    pub interval: Duration,
    /// How often tracked agents are checked for a vanished descriptor
    pub recovery_interval: Duration,
    /// Pause after a failed round
    pub error_backoff: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            recovery_interval: Duration::from_secs(30),
            error_backoff: Duration::from_secs(5),
        }
    }
}

impl HeartbeatConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_recovery_interval(mut self, interval: Duration) -> Self {
        self.recovery_interval = interval;
        self
    }

    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_marker_key() {
        assert_eq!(marker_key("http://a:1"), "expert_agents:http://a:1");
    }

    #[rstest]
    #[case(0, 1)]
    #[case(1, 2)]
    #[case(2, 4)]
    #[case(4, 16)]
    #[case(5, 30)]
    #[case(40, 30)]
    #[case(u32::MAX, 30)]
    fn test_backoff_is_capped(#[case] attempt: u32, #[case] secs: u64) {
        let config = RegistryConfig::default();
        assert_eq!(config.backoff(attempt), Duration::from_secs(secs));
    }

    #[test]
    fn test_defaults() {
        let config = RegistryConfig::default();
        assert_eq!(config.heartbeat_timeout, Duration::from_secs(30));
        assert_eq!(config.reap_interval, Duration::from_secs(60));
        assert!(!config.require_heartbeat);

        let heartbeat = HeartbeatConfig::default();
        assert_eq!(heartbeat.interval, Duration::from_secs(10));
        assert_eq!(heartbeat.recovery_interval, Duration::from_secs(30));
    }
}
