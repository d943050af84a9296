use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::coordinator::CoordinatorStatus;
use crate::sensors::SensorState;
use crate::setup::AccountRegistry;

#[derive(Clone)]
struct ApiState {
    registry: Arc<AccountRegistry>,
}

#[derive(Debug, Serialize)]
pub struct AccountSensors {
    pub account_id: String,
    pub sensors: Vec<SensorState>,
}

#[derive(Debug, Serialize)]
pub struct AccountStatus {
    pub account_id: String,
    #[serde(flatten)]
    pub status: CoordinatorStatus,
}

pub fn router(registry: Arc<AccountRegistry>) -> Router {
    Router::new()
        .route("/sensors", get(list_sensors))
        .route("/status", get(list_status))
        .with_state(ApiState { registry })
}

pub async fn serve(bind_addr: &str, registry: Arc<AccountRegistry>) -> anyhow::Result<()> {
    let addr: SocketAddr = bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid api bind addr: {e}"))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "sensor api listening");
    axum::serve(listener, router(registry).into_make_service()).await?;
    Ok(())
}

async fn list_sensors(State(state): State<ApiState>) -> Json<Vec<AccountSensors>> {
    let mut accounts = Vec::new();
    for context in state.registry.contexts() {
        // Refresh before reading, the same ordering the sensors rely on. A
        // failed on-demand refresh degrades to the last cached values.
        if let Err(e) = context.coordinator.request_refresh().await {
            tracing::warn!(
                account = %context.account_id,
                error = %e,
                "on-demand refresh failed, serving last known values"
            );
        }
        accounts.push(AccountSensors {
            account_id: context.account_id.clone(),
            sensors: context.sensors.states(),
        });
    }
    Json(accounts)
}

async fn list_status(State(state): State<ApiState>) -> Json<Vec<AccountStatus>> {
    let statuses = state
        .registry
        .contexts()
        .into_iter()
        .map(|context| AccountStatus {
            account_id: context.account_id.clone(),
            status: context.coordinator.status(),
        })
        .collect();
    Json(statuses)
}
