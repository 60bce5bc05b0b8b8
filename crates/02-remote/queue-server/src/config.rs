/// Capacity used when `get`/`put` reference a queue nobody created yet.
pub const DEFAULT_MAX_MESSAGES: usize = 10_000;

/// Configuration for a queue server instance.
#[derive(Clone, Copy, Debug)]
pub struct ServerConfig {
    /// Capacity of queues created lazily by `get`/`put` rather than `create`.
    pub default_max_messages: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            default_max_messages: DEFAULT_MAX_MESSAGES,
        }
    }
}
