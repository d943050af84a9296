mod daily_usage;

pub use daily_usage::{
    month_period_key, Cost, FuelType, MeteredReading, UsagePeriod, UsageSnapshot,
};
