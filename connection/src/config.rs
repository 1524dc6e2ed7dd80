use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for an outbound queue manager. Immutable once the
/// manager is constructed.
pub struct Config {
    /// Maximum non-barrier entries per queue generation (default: 1024).
    /// Generation capacity is `queue_size + 1`; the extra slot is held
    /// back for a trailing barrier.
    pub queue_size: u32,
    /// Upper bound on the time between outgoing barriers (default: 1s).
    pub max_barrier: Duration,
    /// Work budget for a single flush iteration (default: 100us).
    pub max_work_time: Duration,
    /// Messages written between budget checks (default: 64).
    pub worktime_recheck_interval: u32,
    /// Retired generations kept for reuse (default: 4).
    pub queue_cache_capacity: usize,
    /// Remote address for datagram channels. `None` selects the stream
    /// envelope (default: None).
    pub remote: Option<SocketAddr>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue_size: 1024,
            max_barrier: Duration::from_secs(1),
            max_work_time: Duration::from_micros(100),
            worktime_recheck_interval: 64,
            queue_cache_capacity: 4,
            remote: None,
        }
    }
}
