use anyhow::Result;
use polling_service::{
    config::AppConfig,
    metrics_server, observability,
    setup::{self, AccountRegistry},
};
use std::sync::Arc;
use usage_client::{UsageClient, UsageFetcher};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr);
    }

    let registry = Arc::new(AccountRegistry::new());

    // Each account sets up independently; a not-ready account retries on the
    // setup-retry interval without holding up the others or the API.
    for account in &cfg.accounts {
        let fetcher: Arc<dyn UsageFetcher> =
            Arc::new(UsageClient::new(&cfg.provider.base_url, &account.account_id));
        let account_id = account.account_id.clone();
        let poller = cfg.poller.clone();
        let registry = Arc::clone(&registry);

        tokio::spawn(async move {
            loop {
                match setup::setup_account(Arc::clone(&fetcher), &account_id, &poller).await {
                    Ok(context) => {
                        registry.insert(context);
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(
                            account = %account_id,
                            error = %e,
                            retry_in_secs = poller.setup_retry_secs,
                            "account setup not ready, will retry"
                        );
                        tokio::time::sleep(poller.setup_retry()).await;
                    }
                }
            }
        });
    }

    polling_service::http_api::serve(&cfg.api.bind_addr, registry).await
}
