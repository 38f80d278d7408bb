//! Engine-wide configuration, overridable via environment variables.
//!
//! Mirrors the shape of the original `ExecutionLimits`/`TelemetryConfig`
//! `from_env` constructors: sane defaults, each overridable by one env var,
//! no config file layer (the declarative document format is the config
//! surface for test content; this struct only covers engine knobs).

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Default per-request timeout when a Test doesn't specify one.
    pub default_timeout: Duration,

    /// Worker concurrency cap for the Links check's HEAD/GET fan-out.
    pub links_concurrency: usize,

    /// Worker concurrency cap for the Latency check's repeated requests.
    pub latency_concurrency: usize,

    /// Port range the mock server picks an ephemeral bind address from
    /// when an element doesn't pin one explicitly.
    pub mock_port_range: (u16, u16),

    /// Ceiling on Tries for any single Test, guarding against a malformed
    /// document specifying an unbounded retry/poll loop.
    pub max_tries: u32,
}

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LINKS_CONCURRENCY: usize = 8;
const DEFAULT_LATENCY_CONCURRENCY: usize = 8;
const DEFAULT_MOCK_PORT_LOW: u16 = 19000;
const DEFAULT_MOCK_PORT_HIGH: u16 = 19999;
const DEFAULT_MAX_TRIES: u32 = 1000;

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            links_concurrency: DEFAULT_LINKS_CONCURRENCY,
            latency_concurrency: DEFAULT_LATENCY_CONCURRENCY,
            mock_port_range: (DEFAULT_MOCK_PORT_LOW, DEFAULT_MOCK_PORT_HIGH),
            max_tries: DEFAULT_MAX_TRIES,
        }
    }
}

impl EngineConfig {
    /// Builds configuration from the process environment.
    ///
    /// Recognized variables: `HTTPBENCH_DEFAULT_TIMEOUT_SECS`,
    /// `HTTPBENCH_LINKS_CONCURRENCY`, `HTTPBENCH_LATENCY_CONCURRENCY`,
    /// `HTTPBENCH_MOCK_PORT_LOW`, `HTTPBENCH_MOCK_PORT_HIGH`,
    /// `HTTPBENCH_MAX_TRIES`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(n) = env_usize("HTTPBENCH_DEFAULT_TIMEOUT_SECS") {
            config.default_timeout = Duration::from_secs(n as u64);
        }
        if let Some(n) = env_usize("HTTPBENCH_LINKS_CONCURRENCY") {
            config.links_concurrency = n;
        }
        if let Some(n) = env_usize("HTTPBENCH_LATENCY_CONCURRENCY") {
            config.latency_concurrency = n;
        }
        if let Some(n) = env_usize("HTTPBENCH_MOCK_PORT_LOW") {
            config.mock_port_range.0 = n as u16;
        }
        if let Some(n) = env_usize("HTTPBENCH_MOCK_PORT_HIGH") {
            config.mock_port_range.1 = n as u16;
        }
        if let Some(n) = env_usize("HTTPBENCH_MAX_TRIES") {
            config.max_tries = n as u32;
        }

        config
    }
}

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = EngineConfig::default();
        assert_eq!(config.default_timeout, Duration::from_secs(30));
        assert!(config.mock_port_range.0 < config.mock_port_range.1);
    }
}
