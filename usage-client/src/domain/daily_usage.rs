use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FuelType {
    Electricity,
    Gas,
}

impl FuelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Electricity => "electricity",
            Self::Gas => "gas",
        }
    }
}

/// One billing/metering interval. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsagePeriod {
    #[serde(with = "time::serde::iso8601")]
    pub start: OffsetDateTime,
    #[serde(with = "time::serde::iso8601")]
    pub end: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cost {
    pub amount: f64,
    pub currency_unit: String,
}

/// One metered reading for one fuel type over one interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeteredReading {
    pub interval: UsagePeriod,
    pub consumption: f64,
    pub cost: Cost,
}

/// One complete fetch result covering both fuel types.
///
/// The provider returns each fuel's readings in ascending chronological
/// order; the sequences are stored as received and never re-sorted. A new
/// fetch produces a new snapshot, never a mutation of an old one.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UsageSnapshot {
    #[serde(default)]
    pub electricity: Option<Vec<MeteredReading>>,
    #[serde(default)]
    pub gas: Option<Vec<MeteredReading>>,
}

impl UsageSnapshot {
    /// The most recent reading for a fuel type: the final element of its
    /// sequence, when the sequence is present and non-empty.
    pub fn last_reading(&self, fuel: FuelType) -> Option<&MeteredReading> {
        let readings = match fuel {
            FuelType::Electricity => self.electricity.as_ref()?,
            FuelType::Gas => self.gas.as_ref()?,
        };
        readings.last()
    }
}

/// The `YYYY-MM` period key the provider's daily-usage endpoint expects.
pub fn month_period_key(now: OffsetDateTime) -> String {
    format!("{:04}-{:02}", now.year(), u8::from(now.month()))
}
