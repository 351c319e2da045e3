//! Release checking against GitHub.

use anyhow::{Context, Result};

pub const DEFAULT_REPO: &str = "calmhost/chancast";

/// Remove any leading `v` prefix from a Git tag.
pub fn normalize_version(tag: &str) -> &str {
    tag.trim_start_matches('v')
}

/// Simple semantic-ish comparison between two dotted version strings.
/// Non-numeric chunks (e.g. `rc1`) are treated as lower priority.
pub fn is_newer_version(current: &str, candidate: &str) -> bool {
    fn as_tuple(version: &str) -> Vec<u64> {
        version
            .split('.')
            .map(|chunk| chunk.parse().unwrap_or(0))
            .collect()
    }

    as_tuple(candidate) > as_tuple(current)
}

/// Fetch the latest release tag from GitHub for the given repository.
pub async fn fetch_latest_release_tag(repo: &str) -> Result<Option<String>> {
    let url = format!("https://api.github.com/repos/{repo}/releases/latest");

    let client = reqwest::Client::new();
    let response = client
        .get(&url)
        .header("Accept", "application/vnd.github+json")
        .header("User-Agent", "chancast-update")
        .send()
        .await
        .context("Failed to reach GitHub")?
        .error_for_status()
        .context("GitHub API error")?;

    let data: serde_json::Value = response.json().await.context("Unparsable release data")?;
    let tag = data
        .get("tag_name")
        .or_else(|| data.get("name"))
        .and_then(|value| value.as_str())
        .map(str::to_string);

    Ok(tag)
}
