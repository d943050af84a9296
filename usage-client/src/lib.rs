pub mod client;
pub mod domain;
pub mod error;

pub use client::UsageClient;
pub use domain::{
    month_period_key, Cost, FuelType, MeteredReading, UsagePeriod, UsageSnapshot,
};
pub use error::FetchError;

/// Capability to fetch one period's worth of daily usage from the provider.
///
/// `period_key` is the provider's `YYYY-MM` month key; see
/// [`month_period_key`]. The returned snapshot covers both fuel types for
/// that period and is never mutated after construction.
#[async_trait::async_trait]
pub trait UsageFetcher: Send + Sync {
    async fn daily_usage(&self, period_key: &str) -> Result<UsageSnapshot, FetchError>;
}
