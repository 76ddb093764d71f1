//! Engine configuration.
//!
//! Defaults are tuned for co-located node services: small timeouts, a
//! bounded connection pool, and tens of concurrent traversals. Environment
//! variables override the defaults at startup (`.env` files are honoured),
//! and the builder-style `with_*` methods override both.

use std::time::Duration;

/// Timeouts, pool bounds, and the retry bound for outbound node calls.
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// Idle connections kept per destination by the REST pool.
    pub pool_max_idle_per_host: usize,
    /// TCP connect timeout, REST and RPC alike.
    pub connect_timeout: Duration,
    /// Whole-call timeout once the request is on the wire.
    pub read_timeout: Duration,
    /// Total attempts for REST connection-establishment failures.
    pub max_attempts: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            pool_max_idle_per_host: 25,
            connect_timeout: Duration::from_millis(500),
            read_timeout: Duration::from_secs(5),
            max_attempts: 3,
        }
    }
}

/// Readiness probing cadence and bounds.
#[derive(Clone, Debug)]
pub struct ReadinessConfig {
    /// Interval between full graph re-checks.
    pub interval: Duration,
    /// TCP connect probes per endpoint before calling it unreachable.
    pub probe_attempts: u32,
    /// Timeout of a single probe.
    pub probe_timeout: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            probe_attempts: 3,
            probe_timeout: Duration::from_millis(400),
        }
    }
}

/// Top-level engine configuration.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Concurrent in-flight traversals admitted before callers queue.
    pub max_concurrent_traversals: usize,
    /// Routing decisions retained for feedback replay.
    pub route_store_capacity: usize,
    pub transport: TransportConfig,
    pub readiness: ReadinessConfig,
    /// HTTP listen address of the inbound API.
    pub http_listen: String,
    /// TCP listen address of the inbound RPC surface.
    pub rpc_listen: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_traversals: 32,
            route_store_capacity: 10_000,
            transport: TransportConfig::default(),
            readiness: ReadinessConfig::default(),
            http_listen: "0.0.0.0:8080".into(),
            rpc_listen: "0.0.0.0:5000".into(),
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with `TRELLIS_*` environment variables.
    ///
    /// A missing or unparseable variable keeps the default.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        if let Some(v) = env_usize("TRELLIS_MAX_CONCURRENT") {
            config.max_concurrent_traversals = v;
        }
        if let Some(v) = env_usize("TRELLIS_ROUTE_STORE_CAPACITY") {
            config.route_store_capacity = v;
        }
        if let Some(v) = env_usize("TRELLIS_POOL_MAX_IDLE_PER_HOST") {
            config.transport.pool_max_idle_per_host = v;
        }
        if let Some(v) = env_millis("TRELLIS_CONNECT_TIMEOUT_MS") {
            config.transport.connect_timeout = v;
        }
        if let Some(v) = env_millis("TRELLIS_READ_TIMEOUT_MS") {
            config.transport.read_timeout = v;
        }
        if let Some(v) = env_u32("TRELLIS_MAX_ATTEMPTS") {
            config.transport.max_attempts = v.max(1);
        }
        if let Some(v) = env_millis("TRELLIS_READINESS_INTERVAL_MS") {
            config.readiness.interval = v;
        }
        if let Some(v) = env_u32("TRELLIS_READINESS_PROBES") {
            config.readiness.probe_attempts = v.max(1);
        }
        if let Some(v) = env_millis("TRELLIS_READINESS_PROBE_TIMEOUT_MS") {
            config.readiness.probe_timeout = v;
        }
        if let Ok(v) = std::env::var("TRELLIS_HTTP_LISTEN") {
            config.http_listen = v;
        }
        if let Ok(v) = std::env::var("TRELLIS_RPC_LISTEN") {
            config.rpc_listen = v;
        }
        config
    }

    #[must_use]
    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent_traversals = n;
        self
    }

    #[must_use]
    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    #[must_use]
    pub fn with_readiness(mut self, readiness: ReadinessConfig) -> Self {
        self.readiness = readiness;
        self
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok()?.parse().ok()
}

fn env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok()?.parse().ok()
}

fn env_millis(key: &str) -> Option<Duration> {
    Some(Duration::from_millis(
        std::env::var(key).ok()?.parse().ok()?,
    ))
}
