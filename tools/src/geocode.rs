use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use council_core::registry::{required_arg, Tool, ToolArguments, ToolDefinition};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Coordinates for a postcode, passed through from the geocoding service.
///
/// On a non-success response only `status` is set. When the service could
/// not be reached at all, `status` is 0 and `error` says why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostcodeLocation {
    pub postcode: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PostcodeLocation {
    fn status_only(postcode: &str, status: u16) -> Self {
        Self {
            postcode: postcode.to_string(),
            status,
            latitude: None,
            longitude: None,
            error: None,
        }
    }

    fn failed(postcode: &str, status: u16, error: impl ToString) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::status_only(postcode, status)
        }
    }
}

// postcodes.io response shape
#[derive(Debug, Deserialize)]
struct LookupResponse {
    status: u16,
    result: Option<LookupResult>,
}

#[derive(Debug, Deserialize)]
struct LookupResult {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Clone)]
pub struct PostcodeGeocoder {
    client: Client,
    base_url: Url,
}

impl PostcodeGeocoder {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url).with_context(|| format!("Invalid postcode lookup URL '{}'", base_url))?;
        anyhow::ensure!(!base_url.cannot_be_a_base(), "Postcode lookup URL '{}' cannot take a path", base_url);
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, postcode: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("postcodes").push(postcode);
        }
        url
    }

    /// Looks the postcode up. Never fails; problems are reported in the result.
    pub async fn locate(&self, postcode: &str) -> PostcodeLocation {
        let response = match self.client.get(self.endpoint(postcode)).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(postcode, "Postcode lookup unreachable: {}", e);
                return PostcodeLocation::failed(postcode, 0, e);
            }
        };

        let status = response.status();
        if !status.is_success() {
            info!(postcode, status = status.as_u16(), "Postcode lookup rejected");
            return PostcodeLocation::status_only(postcode, status.as_u16());
        }

        match response.json::<LookupResponse>().await {
            Ok(body) => {
                let (latitude, longitude) = body
                    .result
                    .map(|r| (r.latitude, r.longitude))
                    .unwrap_or((None, None));
                PostcodeLocation {
                    postcode: postcode.to_string(),
                    status: body.status,
                    latitude,
                    longitude,
                    error: None,
                }
            }
            Err(e) => {
                warn!(postcode, "Postcode lookup returned an unreadable body: {}", e);
                PostcodeLocation::failed(postcode, status.as_u16(), e)
            }
        }
    }
}

/// `lookup_postcode`: lets the postcode agent check a postcode exists.
pub struct PostcodeLookupTool {
    geocoder: PostcodeGeocoder,
}

impl PostcodeLookupTool {
    pub fn new(geocoder: PostcodeGeocoder) -> Self {
        Self { geocoder }
    }
}

#[async_trait]
impl Tool for PostcodeLookupTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "lookup_postcode".to_string(),
            description: "Check a UK postcode and return its latitude and longitude".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "postcode": { "type": "string", "description": "UK postcode to look up" }
                },
                "required": ["postcode"]
            }),
        }
    }

    async fn execute(&self, args: &ToolArguments) -> anyhow::Result<String> {
        let postcode = required_arg(args, "postcode")?;
        let location = self.geocoder.locate(postcode).await;
        Ok(serde_json::to_string(&location)?)
    }
}
