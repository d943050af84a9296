use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use time::OffsetDateTime;
use usage_client::{month_period_key, FuelType, UsageFetcher};

use crate::config::PollerConfig;
use crate::coordinator::{PollingCoordinator, Subscription};
use crate::projection::ReadingProjection;
use crate::sensors::SensorSet;

/// Setup failure for one account. `NotReady` is retryable: the owner is
/// expected to re-attempt setup later rather than give up.
#[derive(thiserror::Error, Debug)]
pub enum SetupError {
    #[error("provider not ready: {0}")]
    NotReady(String),
}

/// Everything one monitored account owns at runtime: its coordinator, its
/// sensor set, and the subscription that keeps scheduled polling alive.
pub struct AccountContext {
    pub account_id: String,
    pub coordinator: Arc<PollingCoordinator>,
    pub sensors: Arc<SensorSet>,
    _subscription: Subscription,
}

impl AccountContext {
    pub fn teardown(&self) {
        self.coordinator.shutdown();
    }
}

/// Sets up polling for one account.
///
/// One validation fetch resolves the cost currency from the account's last
/// electricity reading; a failed fetch or an account with no electricity
/// readings is reported as not ready so the owner can retry. On success the
/// coordinator is primed with an initial refresh and scheduled polling
/// starts.
pub async fn setup_account(
    fetcher: Arc<dyn UsageFetcher>,
    account_id: &str,
    poller: &PollerConfig,
) -> Result<AccountContext, SetupError> {
    let period_key = month_period_key(OffsetDateTime::now_utc());
    let usage = fetcher
        .daily_usage(&period_key)
        .await
        .map_err(|e| SetupError::NotReady(e.to_string()))?;

    let currency_unit = usage
        .last_reading(FuelType::Electricity)
        .map(|reading| reading.cost.currency_unit.clone())
        .ok_or_else(|| {
            SetupError::NotReady(format!(
                "no electricity readings to resolve a currency for account {account_id}"
            ))
        })?;

    let coordinator = PollingCoordinator::new(
        account_id,
        fetcher,
        poller.refresh_interval(),
        poller.fetch_timeout(),
    );
    let sensors = SensorSet::new(ReadingProjection::standard_set(account_id, &currency_unit));
    let subscription = coordinator.subscribe(sensors.clone());

    // Prime the shared snapshot so sensors have data as soon as they are
    // read. A failure here is not fatal; the scheduled tick will retry.
    if let Err(e) = coordinator.request_refresh().await {
        tracing::warn!(account = %account_id, error = %e, "initial usage refresh failed");
    }
    coordinator.start();

    tracing::info!(account = %account_id, currency = %currency_unit, "account polling ready");

    Ok(AccountContext {
        account_id: account_id.to_string(),
        coordinator,
        sensors,
        _subscription: subscription,
    })
}

/// Explicit registry of account contexts, keyed by account id and owned by
/// the binary's lifecycle. Accounts appear as their setup completes.
#[derive(Default)]
pub struct AccountRegistry {
    accounts: RwLock<HashMap<String, Arc<AccountContext>>>,
}

impl AccountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, context: AccountContext) {
        self.accounts
            .write()
            .expect("accounts lock poisoned")
            .insert(context.account_id.clone(), Arc::new(context));
    }

    pub fn get(&self, account_id: &str) -> Option<Arc<AccountContext>> {
        self.accounts
            .read()
            .expect("accounts lock poisoned")
            .get(account_id)
            .cloned()
    }

    /// Removes an account and shuts its coordinator down.
    pub fn remove(&self, account_id: &str) {
        let removed = self
            .accounts
            .write()
            .expect("accounts lock poisoned")
            .remove(account_id);
        if let Some(context) = removed {
            context.teardown();
        }
    }

    pub fn contexts(&self) -> Vec<Arc<AccountContext>> {
        let mut contexts: Vec<_> = self
            .accounts
            .read()
            .expect("accounts lock poisoned")
            .values()
            .cloned()
            .collect();
        contexts.sort_by(|a, b| a.account_id.cmp(&b.account_id));
        contexts
    }

    pub fn is_empty(&self) -> bool {
        self.accounts
            .read()
            .expect("accounts lock poisoned")
            .is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use usage_client::{Cost, FetchError, MeteredReading, UsagePeriod, UsageSnapshot};

    struct FixedFetcher {
        outcome: Result<UsageSnapshot, FetchError>,
    }

    #[async_trait::async_trait]
    impl UsageFetcher for FixedFetcher {
        async fn daily_usage(&self, _period_key: &str) -> Result<UsageSnapshot, FetchError> {
            self.outcome.clone()
        }
    }

    fn usage_with_electricity() -> UsageSnapshot {
        UsageSnapshot {
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
        }
    }

    #[tokio::test]
    async fn setup_resolves_currency_and_primes_sensors() {
        let fetcher = Arc::new(FixedFetcher {
            outcome: Ok(usage_with_electricity()),
        });

        let context = setup_account(fetcher, "A-123", &PollerConfig::default())
            .await
            .expect("setup succeeds");

        assert_eq!(context.account_id, "A-123");
        assert_eq!(context.coordinator.subscriber_count(), 1);
        assert!(context.coordinator.get_latest().is_some());

        let states = context.sensors.states();
        assert_eq!(states.len(), 4);
        let cost = states
            .iter()
            .find(|s| s.key == "A-123_last_electricity_cost")
            .expect("cost sensor");
        assert_eq!(cost.unit, "GBP");
        assert_eq!(cost.state, Some(0.30));

        context.teardown();
    }

    #[tokio::test]
    async fn setup_fetch_failure_is_not_ready() {
        let fetcher = Arc::new(FixedFetcher {
            outcome: Err(FetchError::Transport("connection refused".to_string())),
        });

        let Err(err) = setup_account(fetcher, "A-123", &PollerConfig::default()).await else {
            panic!("setup should not be ready");
        };
        assert!(matches!(err, SetupError::NotReady(_)));
    }

    #[tokio::test]
    async fn setup_without_electricity_readings_is_not_ready() {
        let fetcher = Arc::new(FixedFetcher {
            outcome: Ok(UsageSnapshot {
                electricity: Some(vec![]),
                gas: None,
            }),
        });

        let Err(err) = setup_account(fetcher, "A-123", &PollerConfig::default()).await else {
            panic!("setup should not be ready");
        };
        let SetupError::NotReady(reason) = err;
        assert!(reason.contains("currency"));
    }

    #[tokio::test]
    async fn registry_remove_tears_the_account_down() {
        let fetcher = Arc::new(FixedFetcher {
            outcome: Ok(usage_with_electricity()),
        });
        let context = setup_account(fetcher, "A-123", &PollerConfig::default())
            .await
            .expect("setup succeeds");

        let registry = AccountRegistry::new();
        registry.insert(context);
        assert!(registry.get("A-123").is_some());
        assert_eq!(registry.contexts().len(), 1);

        registry.remove("A-123");
        assert!(registry.get("A-123").is_none());
        assert!(registry.is_empty());
    }
}
