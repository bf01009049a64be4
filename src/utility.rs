//! Small, stateless helper functions used across the pipeline.

use anyhow::{Context, Result};

/// Downloads `url` in full and returns it as text, generalizing the
/// teacher's `download_and_store` (which writes straight to disk) for
/// callers that need to parse the body in memory, such as `resolve`
/// fetching the top-level `cluster.idx`.
pub async fn download_text(client: &reqwest::Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to GET {}", url))?;
    if !response.status().is_success() {
        anyhow::bail!("Failed to download {}: {}", url, response.status());
    }
    response
        .text()
        .await
        .with_context(|| format!("Response body from {} was not valid UTF-8", url))
}

/// Extracts the host component of `url`, stripping scheme, path, query
/// and port, for populating a [`crate::corpus::Document`]'s `domain`
/// attribute (spec §3).
pub fn host_of(url: &str) -> String {
    let without_scheme = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .unwrap_or(url);
    let host = without_scheme.split(['/', '?', '#']).next().unwrap_or("");
    host.split(':').next().unwrap_or(host).to_string()
}

/// Normalizes a URL for use as part of a filesystem path: strips the
/// scheme and any trailing slash, and replaces colons (port separators)
/// with underscores so the result is safe to use as a path component.
pub fn remove_scheme_trailing_slash_and_ports(url: &str) -> String {
    let url = if let Some(rest) = url.strip_prefix("http://") {
        rest
    } else if let Some(rest) = url.strip_prefix("https://") {
        rest
    } else {
        url
    };

    let url = if let Some(rest) = url.strip_suffix("/") {
        rest
    } else {
        url
    };

    str::replace(url, ":", "_")
}
