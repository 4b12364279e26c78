//! Processing configuration.

use std::time::Duration;

use tracing::warn;

use kestrel_core::{CorrelationId, ExecutionContext, MicroserviceId, TenantId};

use crate::retry::RetryPolicy;

pub const PING_INTERVAL_ENV: &str = "KESTREL_PING_INTERVAL_MS";
pub const CONNECT_TIMEOUT_ENV: &str = "KESTREL_CONNECT_TIMEOUT_MS";
pub const RETRY_BASE_DELAY_ENV: &str = "KESTREL_RETRY_BASE_DELAY_MS";
pub const RETRY_MAX_DELAY_ENV: &str = "KESTREL_RETRY_MAX_DELAY_MS";

/// Settings shared by every processor of a client.
#[derive(Debug, Clone)]
pub struct ProcessingConfig {
    /// How often the runtime is asked to ping each stream
    pub ping_interval: Duration,
    /// Missed pings tolerated before a stream is considered dead
    pub ping_timeout_factor: u32,
    /// How long to wait for the registration response
    pub connect_timeout: Duration,
    /// Backoff between attempts
    pub retry_policy: RetryPolicy,
    /// Context sent with every registration
    pub execution_context: ExecutionContext,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(5),
            ping_timeout_factor: 3,
            connect_timeout: Duration::from_secs(30),
            retry_policy: RetryPolicy::default(),
            execution_context: ExecutionContext::new(
                MicroserviceId::from_u128(0),
                TenantId::from_u128(0),
                "0.0.0",
                "development",
                CorrelationId::new(),
            ),
        }
    }
}

impl ProcessingConfig {
    /// Defaults overridden by `KESTREL_*` environment variables (milliseconds).
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let retry_policy = RetryPolicy {
            base_delay: duration_from_env(RETRY_BASE_DELAY_ENV, defaults.retry_policy.base_delay),
            max_delay: duration_from_env(RETRY_MAX_DELAY_ENV, defaults.retry_policy.max_delay),
            ..defaults.retry_policy.clone()
        };

        Self {
            ping_interval: duration_from_env(PING_INTERVAL_ENV, defaults.ping_interval),
            connect_timeout: duration_from_env(CONNECT_TIMEOUT_ENV, defaults.connect_timeout),
            retry_policy,
            ..defaults
        }
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    pub fn with_ping_timeout_factor(mut self, factor: u32) -> Self {
        self.ping_timeout_factor = factor.max(1);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_execution_context(mut self, context: ExecutionContext) -> Self {
        self.execution_context = context;
        self
    }

    /// Silence after which a stream fails with a ping timeout.
    pub fn ping_timeout(&self) -> Duration {
        self.ping_interval
            .saturating_mul(self.ping_timeout_factor.max(1))
    }
}

fn duration_from_env(key: &str, default: Duration) -> Duration {
    match std::env::var(key) {
        Ok(raw) => parse_millis(&raw).unwrap_or_else(|| {
            warn!(key, value = %raw, default_ms = default.as_millis() as u64, "ignoring invalid duration");
            default
        }),
        Err(_) => default,
    }
}

fn parse_millis(raw: &str) -> Option<Duration> {
    raw.trim().parse::<u64>().ok().map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_timeout_is_interval_times_factor() {
        let config = ProcessingConfig::default()
            .with_ping_interval(Duration::from_millis(200))
            .with_ping_timeout_factor(4);

        assert_eq!(config.ping_timeout(), Duration::from_millis(800));
    }

    #[test]
    fn zero_factor_is_raised_to_one() {
        let config = ProcessingConfig::default()
            .with_ping_interval(Duration::from_millis(200))
            .with_ping_timeout_factor(0);

        assert_eq!(config.ping_timeout(), Duration::from_millis(200));
    }

    #[test]
    fn millis_parsing() {
        assert_eq!(parse_millis(" 250 "), Some(Duration::from_millis(250)));
        assert_eq!(parse_millis("soon"), None);
        assert_eq!(parse_millis("-5"), None);
    }

    #[test]
    fn unset_variables_keep_defaults() {
        let default = Duration::from_millis(1234);

        assert_eq!(duration_from_env("KESTREL_TEST_UNSET_VARIABLE", default), default);
    }
}
