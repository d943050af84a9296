use serde::Serialize;
use time::OffsetDateTime;
use usage_client::{FuelType, UsageSnapshot};

/// Which scalar a projection pulls out of a metered reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingField {
    Consumption,
    CostAmount,
}

/// Interval bounds of the reading a projected value came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntervalAttributes {
    #[serde(with = "time::serde::iso8601")]
    pub start_time: OffsetDateTime,
    #[serde(with = "time::serde::iso8601")]
    pub end_time: OffsetDateTime,
}

/// Result of applying one projection to the shared snapshot. `value` is
/// `None` when the selected fuel has no data; that is a normal degraded
/// state, not an error.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedReading {
    pub value: Option<f64>,
    pub attributes: Option<IntervalAttributes>,
}

impl ProjectedReading {
    pub fn unavailable() -> Self {
        Self {
            value: None,
            attributes: None,
        }
    }
}

/// A stateless projection of one displayable value out of the shared usage
/// snapshot. The key/name/icon/unit metadata is opaque here; the
/// presentation layer decides what to do with it.
#[derive(Debug, Clone)]
pub struct ReadingProjection {
    pub key: String,
    pub name: String,
    pub icon: String,
    pub unit: String,
    pub fuel: FuelType,
    pub field: ReadingField,
}

impl ReadingProjection {
    /// Pure function from (projection config, snapshot) to a projected value.
    /// Takes the last element of the selected fuel's sequence; missing
    /// snapshot or missing/empty sequence degrades to unavailable.
    pub fn compute(&self, snapshot: Option<&UsageSnapshot>) -> ProjectedReading {
        let Some(reading) = snapshot.and_then(|s| s.last_reading(self.fuel)) else {
            return ProjectedReading::unavailable();
        };

        let value = match self.field {
            ReadingField::Consumption => reading.consumption,
            ReadingField::CostAmount => reading.cost.amount,
        };

        ProjectedReading {
            value: Some(value),
            attributes: Some(IntervalAttributes {
                start_time: reading.interval.start,
                end_time: reading.interval.end,
            }),
        }
    }

    /// The four standard projections for one account: last reading and last
    /// cost per fuel type. `currency_unit` comes from the setup-time
    /// validation fetch.
    pub fn standard_set(account_id: &str, currency_unit: &str) -> Vec<ReadingProjection> {
        vec![
            ReadingProjection {
                key: format!("{account_id}_last_electricity_reading"),
                name: "Last Electricity Reading".to_string(),
                icon: "mdi:flash".to_string(),
                unit: "kWh".to_string(),
                fuel: FuelType::Electricity,
                field: ReadingField::Consumption,
            },
            ReadingProjection {
                key: format!("{account_id}_last_gas_reading"),
                name: "Last Gas Reading".to_string(),
                icon: "mdi:gas-cylinder".to_string(),
                unit: "kWh".to_string(),
                fuel: FuelType::Gas,
                field: ReadingField::Consumption,
            },
            ReadingProjection {
                key: format!("{account_id}_last_electricity_cost"),
                name: "Last Electricity Cost".to_string(),
                icon: "mdi:cash-multiple".to_string(),
                unit: currency_unit.to_string(),
                fuel: FuelType::Electricity,
                field: ReadingField::CostAmount,
            },
            ReadingProjection {
                key: format!("{account_id}_last_gas_cost"),
                name: "Last Gas Cost".to_string(),
                icon: "mdi:cash-multiple".to_string(),
                unit: currency_unit.to_string(),
                fuel: FuelType::Gas,
                field: ReadingField::CostAmount,
            },
        ]
    }
}
