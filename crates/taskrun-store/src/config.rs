//! Store and in-memory database configuration.

/// Task run store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Page size used by `list_page` when the caller gives no limit.
    pub default_page_size: usize,

    /// Upper bound applied to any requested page size.
    pub max_page_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_page_size: 100,
            max_page_size: 1000,
        }
    }
}

/// In-memory database configuration.
#[derive(Debug, Clone, Default)]
pub struct MemoryDbConfig {
    /// Reject task runs whose flow run was never registered.
    pub enforce_flow_run_fk: bool,
}
