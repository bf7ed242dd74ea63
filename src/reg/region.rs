use anyhow::{anyhow, Result};

pub const DEFAULT_REGION: &str = "us-south";

const REGION_REGISTRIES: &[(&str, &str)] = &[
    ("us-south", "https://us.icr.io"),
    ("us-east", "https://us.icr.io"),
    ("eu-gb", "https://uk.icr.io"),
    ("eu-de", "https://de.icr.io"),
    ("eu-es", "https://es.icr.io"),
    ("au-syd", "https://au.icr.io"),
    ("jp-tok", "https://jp.icr.io"),
    ("jp-osa", "https://jp2.icr.io"),
    ("ca-tor", "https://ca.icr.io"),
    ("br-sao", "https://br.icr.io"),
    ("global", "https://icr.io"),
];

/// Registry endpoint URL serving `region`.
pub fn registry_endpoint_for_region(region: &str) -> Result<String> {
    REGION_REGISTRIES
        .iter()
        .find(|(name, _)| *name == region)
        .map(|(_, endpoint)| endpoint.to_string())
        .ok_or_else(|| anyhow!("Unsupported IBM Cloud default region: {}", region))
}
