use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use council_core::registry::{required_arg, Tool, ToolArguments, ToolDefinition};

use crate::distance::DistanceApi;

pub const IN_RANGE_NOTE: &str = "These are the ONLY schools within transport range.";
pub const OUT_OF_RANGE_NOTE: &str = "No schools are within transport range for this postcode.";

const EAST_LONDON_SCHOOLS: [&str; 2] = ["East London High School", "St Peter's School"];
const SOUTH_WEST_SCHOOLS: [&str; 2] = ["West London High School", "St Paul's School"];

/// Schools a postcode can get transport to, most relevant first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityResult {
    pub postcode: String,
    #[serde(rename = "valid_schools_for_transport")]
    pub valid_schools: Vec<String>,
    pub total_schools_found: usize,
    #[serde(rename = "important_note")]
    pub note: String,
}

impl EligibilityResult {
    fn new(postcode: &str, schools: &[&str], note: &str) -> Self {
        let valid_schools: Vec<String> = schools.iter().map(|s| s.to_string()).collect();
        Self {
            postcode: postcode.to_string(),
            total_schools_found: valid_schools.len(),
            valid_schools,
            note: note.to_string(),
        }
    }
}

/// Looks a postcode up in the simulated transport table.
///
/// Matching is on the leading characters, case-sensitive, with no format
/// validation: `"E"` wins over `"SW"`, anything else has no schools.
pub fn resolve(postcode: &str) -> EligibilityResult {
    if postcode.starts_with('E') {
        EligibilityResult::new(postcode, &EAST_LONDON_SCHOOLS, IN_RANGE_NOTE)
    } else if postcode.starts_with("SW") {
        EligibilityResult::new(postcode, &SOUTH_WEST_SCHOOLS, IN_RANGE_NOTE)
    } else {
        EligibilityResult::new(postcode, &[], OUT_OF_RANGE_NOTE)
    }
}

enum DistanceSource {
    Simulated,
    Remote(DistanceApi),
}

/// `get_school_distances`: the eligibility agent's lookup function.
pub struct SchoolDistanceTool {
    source: DistanceSource,
}

impl SchoolDistanceTool {
    pub fn simulated() -> Self {
        Self {
            source: DistanceSource::Simulated,
        }
    }

    /// Forwards lookups to an external distance service instead of the table.
    pub fn remote(api: DistanceApi) -> Self {
        Self {
            source: DistanceSource::Remote(api),
        }
    }
}

#[async_trait]
impl Tool for SchoolDistanceTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_school_distances".to_string(),
            description: "Return eligible schools for transport based on postcode".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "postcode": {
                        "type": "string",
                        "description": "The family's home postcode, e.g. E1 6AN"
                    }
                },
                "required": ["postcode"]
            }),
        }
    }

    async fn execute(&self, args: &ToolArguments) -> anyhow::Result<String> {
        let postcode = required_arg(args, "postcode")?;

        match &self.source {
            DistanceSource::Simulated => {
                let result = resolve(postcode);
                info!(postcode, schools = result.total_schools_found, "Resolved school eligibility");
                Ok(serde_json::to_string(&result)?)
            }
            DistanceSource::Remote(api) => {
                let body = api.fetch(postcode).await?;
                Ok(body.to_string())
            }
        }
    }
}
