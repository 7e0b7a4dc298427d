//! Local functions the hosted agents can call.

pub mod distance;
pub mod geocode;
pub mod postcode;

use anyhow::Result;
use tracing::info;

use council_core::config::ToolSettings;
use council_core::ToolRegistry;

pub use distance::DistanceApi;
pub use geocode::{PostcodeGeocoder, PostcodeLocation, PostcodeLookupTool};
pub use postcode::{resolve, EligibilityResult, SchoolDistanceTool};

/// Registers every tool the settings switch on.
///
/// `get_school_distances` is always present: backed by the external distance
/// API when one is configured, by the simulated table otherwise.
pub fn build_registry(settings: &ToolSettings) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();

    match &settings.distance_api {
        Some(api) => {
            info!("School distances served by {}", api.url);
            registry.register(SchoolDistanceTool::remote(DistanceApi::new(api)?));
        }
        None => registry.register(SchoolDistanceTool::simulated()),
    }

    if let Some(url) = &settings.postcode_lookup_url {
        info!("Postcode lookups served by {}", url);
        registry.register(PostcodeLookupTool::new(PostcodeGeocoder::new(url)?));
    }

    Ok(registry)
}
