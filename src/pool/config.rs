/// Configuration for a [`ConnectionPool`](super::ConnectionPool).
///
/// The defaults suit a single-process service; tune `max_connections` and
/// `acquire_timeout_ms` first when contention shows up in the stats.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Hard upper bound on open connections.
    pub max_connections: usize,
    /// Connections opened eagerly at pool creation and kept through reaping.
    pub min_connections: usize,
    /// How long an acquire waits for a free connection before failing.
    pub acquire_timeout_ms: u64,
    /// Idle time after which a connection above the minimum is destroyed.
    pub idle_timeout_ms: u64,
    /// Reaper cadence; the health check runs at twice this interval.
    pub reap_interval_ms: u64,
    /// Connections older than this are destroyed on release.
    pub max_connection_age_ms: u64,
    /// Whether the TTL result cache is consulted at all.
    pub enable_result_cache: bool,
    /// Result-cache capacity; eviction is FIFO.
    pub max_cache_entries: usize,
    /// Whether statement text is interned for prepared-plan reuse.
    pub enable_statement_cache: bool,
    /// Whether idle connections are probed with `SELECT 1`.
    pub enable_health_checks: bool,
    /// Whether per-event pool logs are emitted.
    pub enable_logging: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 2,
            acquire_timeout_ms: 10_000,
            idle_timeout_ms: 30_000,
            reap_interval_ms: 10_000,
            max_connection_age_ms: 3_600_000,
            enable_result_cache: true,
            max_cache_entries: 1000,
            enable_statement_cache: true,
            enable_health_checks: true,
            enable_logging: false,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_connections(mut self, value: usize) -> Self {
        self.max_connections = value;
        self
    }

    #[must_use]
    pub fn with_min_connections(mut self, value: usize) -> Self {
        self.min_connections = value;
        self
    }

    #[must_use]
    pub fn with_acquire_timeout_ms(mut self, value: u64) -> Self {
        self.acquire_timeout_ms = value;
        self
    }

    #[must_use]
    pub fn with_idle_timeout_ms(mut self, value: u64) -> Self {
        self.idle_timeout_ms = value;
        self
    }

    #[must_use]
    pub fn with_reap_interval_ms(mut self, value: u64) -> Self {
        self.reap_interval_ms = value;
        self
    }

    #[must_use]
    pub fn with_max_connection_age_ms(mut self, value: u64) -> Self {
        self.max_connection_age_ms = value;
        self
    }

    #[must_use]
    pub fn with_result_cache(mut self, enabled: bool) -> Self {
        self.enable_result_cache = enabled;
        self
    }

    #[must_use]
    pub fn with_max_cache_entries(mut self, value: usize) -> Self {
        self.max_cache_entries = value;
        self
    }

    #[must_use]
    pub fn with_statement_cache(mut self, enabled: bool) -> Self {
        self.enable_statement_cache = enabled;
        self
    }

    #[must_use]
    pub fn with_health_checks(mut self, enabled: bool) -> Self {
        self.enable_health_checks = enabled;
        self
    }

    #[must_use]
    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.enable_logging = enabled;
        self
    }
}
