use std::time::Duration;

/// Configuration for the coordination core.
///
/// All knobs have conservative defaults; embedders override the fields they
/// care about.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// How long an operation may go without a progress update or state
    /// transition before the sweeper marks it expired.
    pub operation_ttl: Duration,
    /// Interval between expiry sweeps.
    pub sweep_interval: Duration,
    /// Page size for claimable-job listings.
    pub page_size: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            operation_ttl: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(60),
            page_size: 100,
        }
    }
}

impl CoordinatorConfig {
    pub fn with_operation_ttl(mut self, ttl: Duration) -> Self {
        self.operation_ttl = ttl;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}
