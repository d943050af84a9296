use std::sync::{Arc, RwLock};

use serde::Serialize;
use usage_client::UsageSnapshot;

use crate::coordinator::SnapshotListener;
use crate::projection::{IntervalAttributes, ReadingProjection};

/// Rendered state of one sensor, as served by the HTTP surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorState {
    pub key: String,
    pub name: String,
    pub icon: String,
    pub unit: String,
    pub state: Option<f64>,
    pub available: bool,
    pub attributes: Option<IntervalAttributes>,
}

/// Presentation adapter over a set of projections.
///
/// Subscribed to a coordinator, it recomputes every projection on each
/// refresh notification and caches the results for readers. It never
/// fetches anything itself.
pub struct SensorSet {
    projections: Vec<ReadingProjection>,
    states: RwLock<Vec<SensorState>>,
}

impl SensorSet {
    pub fn new(projections: Vec<ReadingProjection>) -> Arc<Self> {
        let states = projections
            .iter()
            .map(unavailable_state)
            .collect();
        Arc::new(Self {
            projections,
            states: RwLock::new(states),
        })
    }

    pub fn states(&self) -> Vec<SensorState> {
        self.states.read().expect("states lock poisoned").clone()
    }

    fn apply(&self, snapshot: Option<&UsageSnapshot>) {
        let states = self
            .projections
            .iter()
            .map(|projection| {
                let projected = projection.compute(snapshot);
                if projected.value.is_none() {
                    tracing::warn!(sensor = %projection.key, "no usage data for sensor");
                }
                SensorState {
                    key: projection.key.clone(),
                    name: projection.name.clone(),
                    icon: projection.icon.clone(),
                    unit: projection.unit.clone(),
                    available: projected.value.is_some(),
                    state: projected.value,
                    attributes: projected.attributes,
                }
            })
            .collect();
        *self.states.write().expect("states lock poisoned") = states;
    }
}

impl SnapshotListener for SensorSet {
    fn on_refreshed(&self, snapshot: &Arc<UsageSnapshot>) {
        self.apply(Some(snapshot));
    }
}

fn unavailable_state(projection: &ReadingProjection) -> SensorState {
    SensorState {
        key: projection.key.clone(),
        name: projection.name.clone(),
        icon: projection.icon.clone(),
        unit: projection.unit.clone(),
        state: None,
        available: false,
        attributes: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use usage_client::{Cost, MeteredReading, UsagePeriod};

    fn snapshot() -> Arc<UsageSnapshot> {
        Arc::new(UsageSnapshot {
            electricity: Some(vec![MeteredReading {
                interval: UsagePeriod {
                    start: datetime!(2020-01-01 09:00 UTC),
                    end: datetime!(2020-01-01 10:00 UTC),
                },
                consumption: 1.2,
                cost: Cost {
                    amount: 0.30,
                    currency_unit: "GBP".to_string(),
                },
            }]),
            gas: Some(vec![]),
        })
    }

    fn state_by_key(states: &[SensorState], suffix: &str) -> SensorState {
        states
            .iter()
            .find(|s| s.key.ends_with(suffix))
            .expect("sensor present")
            .clone()
    }

    #[test]
    fn sensors_start_unavailable() {
        let sensors = SensorSet::new(ReadingProjection::standard_set("A-123", "GBP"));
        for state in sensors.states() {
            assert!(!state.available);
            assert_eq!(state.state, None);
            assert!(state.attributes.is_none());
        }
    }

    #[test]
    fn refresh_notification_updates_cached_states() {
        let sensors = SensorSet::new(ReadingProjection::standard_set("A-123", "GBP"));
        sensors.on_refreshed(&snapshot());

        let states = sensors.states();
        let electricity = state_by_key(&states, "last_electricity_reading");
        assert!(electricity.available);
        assert_eq!(electricity.state, Some(1.2));
        assert_eq!(electricity.unit, "kWh");
        assert_eq!(
            electricity.attributes.expect("interval attributes").end_time,
            datetime!(2020-01-01 10:00 UTC)
        );

        let electricity_cost = state_by_key(&states, "last_electricity_cost");
        assert_eq!(electricity_cost.state, Some(0.30));
        assert_eq!(electricity_cost.unit, "GBP");

        // Empty gas sequence leaves the gas sensors unavailable.
        let gas = state_by_key(&states, "last_gas_reading");
        assert!(!gas.available);
        assert_eq!(gas.state, None);
    }

    #[test]
    fn sensor_state_serializes_null_when_unavailable() {
        let sensors = SensorSet::new(ReadingProjection::standard_set("A-123", "GBP"));
        let states = sensors.states();
        let json = serde_json::to_value(&states[0]).expect("serializable");
        assert_eq!(json["state"], serde_json::Value::Null);
        assert_eq!(json["available"], serde_json::Value::Bool(false));
    }
}
