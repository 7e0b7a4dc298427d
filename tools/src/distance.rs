use std::time::Duration;

use anyhow::Context;
use reqwest::Client;
use serde_json::Value;
use tracing::info;

use council_core::config::DistanceApiSettings;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const API_KEY_HEADER: &str = "x-api-key";

/// External school-distance service, queried by postcode.
#[derive(Clone)]
pub struct DistanceApi {
    client: Client,
    url: String,
    api_key: String,
}

impl DistanceApi {
    pub fn new(settings: &DistanceApiSettings) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: settings.url.clone(),
            api_key: settings.api_key.clone(),
        })
    }

    /// Returns the service's JSON untouched. Transport errors, non-success
    /// statuses and non-JSON bodies are all errors.
    pub async fn fetch(&self, postcode: &str) -> anyhow::Result<Value> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("postcode", postcode)])
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .context("distance API unreachable")?
            .error_for_status()
            .context("distance API rejected the request")?;

        let body: Value = response
            .json()
            .await
            .context("distance API returned invalid JSON")?;
        info!(postcode, "Fetched school distances");
        Ok(body)
    }
}
