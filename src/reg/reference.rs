//! Image reference helpers following the distribution reference grammar:
//!
//! ```text
//! reference        := name [ ":" tag ] [ "@" digest ]
//! name             := [domain '/'] path-component ['/' path-component]*
//! domain           := domain-component ['.' domain-component]* [':' port-number]
//! domain-component := /([a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9])/
//! path-component   := alpha-numeric [separator alpha-numeric]*
//! alpha-numeric    := /[a-z0-9]+/
//! separator        := /[_.]|__|[-]*/
//! tag              := /[\w][\w.-]{0,127}/
//! digest           := digest-algorithm ":" digest-hex
//! ```

use std::sync::LazyLock;

use anyhow::{anyhow, bail, Result};
use regex::Regex;
use url::Url;

static REFERENCE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    let domain_component = r"(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9])";
    let domain = format!(r"{domain_component}(?:\.{domain_component})*(?::[0-9]+)?");
    let name_component = r"[a-z0-9]+(?:(?:[._]|__|[-]*)[a-z0-9]+)*";
    let name = format!(r"(?:{domain}/)?{name_component}(?:/{name_component})*");
    let tag = r"[0-9A-Za-z_][0-9A-Za-z_.-]{0,127}";
    let digest = r"[A-Za-z][A-Za-z0-9]*(?:[-_+.][A-Za-z][A-Za-z0-9]*)*:[0-9a-fA-F]{32,}";
    Regex::new(&format!(r"^{name}(?::{tag})?(?:@{digest})?$")).expect("reference regex is valid")
});

/// Checks that `image_name` is a well formed image reference.
pub fn validate_reference(image_name: &str) -> Result<()> {
    if !REFERENCE_REGEX.is_match(image_name) {
        bail!("Image Name is not correct format!");
    }
    Ok(())
}

/// The registry host named by the image, if its first segment looks like one.
pub fn registry_endpoint(image_name: &str) -> Option<String> {
    let first = image_name.split('/').next().unwrap_or_default();
    if !image_name.is_empty() && !first.contains('.') {
        return None;
    }
    Some(first.to_string())
}

/// Prefixes `image_name` with the host of `endpoint` unless it already names a registry.
pub fn add_registry(endpoint: &str, image_name: &str) -> Result<String> {
    let registry_url = Url::parse(endpoint)
        .map_err(|err| anyhow!("Bad registry URL for IBM Cloud default region: {}", err))?;
    if image_name.is_empty() {
        return Ok(image_name.to_string());
    }
    let first = image_name.split('/').next().unwrap_or_default();
    if first.contains('.') {
        return Ok(image_name.to_string());
    }
    let host = registry_url
        .host_str()
        .ok_or_else(|| anyhow!("Bad registry URL for IBM Cloud default region: {} has no host", endpoint))?;
    let name = image_name.strip_prefix('/').unwrap_or(image_name);
    Ok(format!("{}/{}", host, name))
}
