//! Region locking and playlist filtering helpers.

use crate::config::ChannelDefinition;
use axum::http::HeaderMap;
use std::collections::HashSet;

/// Headers consulted, in order, when no `region` query parameter is given.
const REGION_HEADER_CANDIDATES: [&str; 4] = [
    "x-chancast-region",
    "x-region",
    "cf-ipcountry",
    "x-appengine-country",
];

/// Normalize to an ISO-3166 alpha-2 code, or None when the value does not
/// look like one.
fn normalize_region_code(value: Option<&str>) -> Option<String> {
    let candidate = value?.trim().to_uppercase();
    if candidate.len() == 2 && candidate.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(candidate)
    } else {
        None
    }
}

/// Best-effort extraction of a client region from a query parameter or
/// well-known proxy headers.
pub fn extract_region(query_region: Option<&str>, headers: &HeaderMap) -> Option<String> {
    if let Some(region) = normalize_region_code(query_region) {
        return Some(region);
    }

    for header in REGION_HEADER_CANDIDATES {
        let value = headers.get(header).and_then(|v| v.to_str().ok());
        if let Some(region) = normalize_region_code(value) {
            return Some(region);
        }
    }

    None
}

fn normalize_regions(regions: &[String]) -> Vec<String> {
    regions
        .iter()
        .filter_map(|r| normalize_region_code(Some(r)))
        .collect()
}

/// Whether the client region is authorised to view the channel.
///
/// An allow list requires a known, listed region; a block list only
/// rejects a known, listed region.
pub fn is_allowed_for_region(channel: &ChannelDefinition, region: Option<&str>) -> bool {
    let allow_list = normalize_regions(&channel.regions_allowed);
    let block_list = normalize_regions(&channel.regions_blocked);

    if !allow_list.is_empty() {
        match region {
            Some(r) if allow_list.iter().any(|a| a == r) => {}
            _ => return false,
        }
    }

    if !block_list.is_empty() {
        if let Some(r) = region {
            if block_list.iter().any(|b| b == r) {
                return false;
            }
        }
    }

    true
}

/// Comma-separated group names, lowercased.
pub fn parse_group_filter(raw: Option<&str>) -> Option<HashSet<String>> {
    let groups: HashSet<String> = raw?
        .split(',')
        .map(|item| item.trim().to_lowercase())
        .filter(|item| !item.is_empty())
        .collect();
    (!groups.is_empty()).then_some(groups)
}

/// Comma-separated channel ids; unparsable chunks are dropped.
pub fn parse_id_filter(raw: Option<&str>) -> Option<HashSet<u64>> {
    let ids: HashSet<u64> = raw?
        .split(',')
        .filter_map(|chunk| chunk.trim().parse().ok())
        .collect();
    (!ids.is_empty()).then_some(ids)
}

/// Channels satisfying the provided region/group/id filters.
pub fn filter_channels(
    channels: Vec<ChannelDefinition>,
    region: Option<&str>,
    groups: Option<&HashSet<String>>,
    ids: Option<&HashSet<u64>>,
) -> Vec<ChannelDefinition> {
    channels
        .into_iter()
        .filter(|channel| {
            if let Some(ids) = ids {
                if !ids.contains(&channel.id) {
                    return false;
                }
            }
            if let Some(groups) = groups {
                let group = channel
                    .group
                    .as_deref()
                    .unwrap_or("")
                    .trim()
                    .to_lowercase();
                if !groups.contains(&group) {
                    return false;
                }
            }
            is_allowed_for_region(channel, region)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel_with_regions(allowed: &[&str], blocked: &[&str]) -> ChannelDefinition {
        ChannelDefinition {
            id: 1,
            name: "Test".to_string(),
            source: "http://example.com".to_string(),
            regions_allowed: allowed.iter().map(|s| s.to_string()).collect(),
            regions_blocked: blocked.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn normalizes_alpha2_codes_only() {
        assert_eq!(normalize_region_code(Some(" de ")), Some("DE".to_string()));
        assert_eq!(normalize_region_code(Some("DEU")), None);
        assert_eq!(normalize_region_code(Some("4X")), None);
        assert_eq!(normalize_region_code(Some("")), None);
        assert_eq!(normalize_region_code(None), None);
    }

    #[test]
    fn query_param_beats_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-ipcountry", "US".parse().unwrap());
        assert_eq!(extract_region(Some("de"), &headers), Some("DE".to_string()));
        assert_eq!(extract_region(None, &headers), Some("US".to_string()));
    }

    #[test]
    fn allow_list_requires_known_region() {
        let channel = channel_with_regions(&["DE", "AT"], &[]);
        assert!(is_allowed_for_region(&channel, Some("DE")));
        assert!(!is_allowed_for_region(&channel, Some("US")));
        assert!(!is_allowed_for_region(&channel, None));
    }

    #[test]
    fn block_list_only_rejects_matches() {
        let channel = channel_with_regions(&[], &["US"]);
        assert!(!is_allowed_for_region(&channel, Some("US")));
        assert!(is_allowed_for_region(&channel, Some("DE")));
        assert!(is_allowed_for_region(&channel, None));
    }

    #[test]
    fn no_lists_means_open() {
        let channel = channel_with_regions(&[], &[]);
        assert!(is_allowed_for_region(&channel, None));
        assert!(is_allowed_for_region(&channel, Some("US")));
    }

    #[test]
    fn id_and_group_filters() {
        let mut a = channel_with_regions(&[], &[]);
        a.id = 1;
        a.group = Some("News".to_string());
        let mut b = channel_with_regions(&[], &[]);
        b.id = 2;
        b.group = Some("Sports".to_string());

        let groups = parse_group_filter(Some("news")).unwrap();
        let filtered = filter_channels(vec![a.clone(), b.clone()], None, Some(&groups), None);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, 1);

        let ids = parse_id_filter(Some("2, bogus, ")).unwrap();
        let filtered = filter_channels(vec![a, b], None, None, Some(&ids));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, 2);
    }
}
