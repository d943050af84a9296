use crate::domain::UsageSnapshot;
use crate::error::FetchError;
use crate::UsageFetcher;

/// HTTP client for the provider's daily-usage endpoint.
///
/// One client per monitored account. Authentication is handled by the
/// provider session layer upstream of this crate.
#[derive(Debug, Clone)]
pub struct UsageClient {
    http: reqwest::Client,
    base_url: String,
    account_id: String,
}

impl UsageClient {
    pub fn new(base_url: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            account_id: account_id.into(),
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    fn daily_usage_url(&self) -> String {
        format!(
            "{}/daily/{}",
            self.base_url.trim_end_matches('/'),
            self.account_id
        )
    }
}

#[async_trait::async_trait]
impl UsageFetcher for UsageClient {
    async fn daily_usage(&self, period_key: &str) -> Result<UsageSnapshot, FetchError> {
        let response = self
            .http
            .get(self.daily_usage_url())
            .query(&[("date", period_key)])
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        response
            .json::<UsageSnapshot>()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FuelType;

    const DAILY_BODY: &str = r#"
    {
        "electricity": [
            {
                "interval": {
                    "start": "2020-01-01T09:00:00Z",
                    "end": "2020-01-01T10:00:00Z"
                },
                "consumption": 1.2,
                "cost": { "amount": 0.30, "currencyUnit": "GBP" }
            }
        ],
        "gas": []
    }
    "#;

    #[tokio::test]
    async fn fetches_and_decodes_daily_usage() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/daily/A-123")
            .match_query(mockito::Matcher::UrlEncoded(
                "date".into(),
                "2020-01".into(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(DAILY_BODY)
            .create_async()
            .await;

        let client = UsageClient::new(server.url(), "A-123");
        let snapshot = client.daily_usage("2020-01").await.expect("fetch succeeds");

        let last = snapshot
            .last_reading(FuelType::Electricity)
            .expect("one electricity reading");
        assert_eq!(last.consumption, 1.2);
        assert_eq!(last.cost.currency_unit, "GBP");
        assert!(snapshot.last_reading(FuelType::Gas).is_none());

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn http_error_status_maps_to_transport() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let client = UsageClient::new(server.url(), "A-123");
        let err = client.daily_usage("2020-01").await.unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)));
    }

    #[tokio::test]
    async fn malformed_body_maps_to_decode() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("{\"electricity\": \"not-a-list\"}")
            .create_async()
            .await;

        let client = UsageClient::new(server.url(), "A-123");
        let err = client.daily_usage("2020-01").await.unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }
}
