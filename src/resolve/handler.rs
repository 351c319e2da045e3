//! Source handlers: delegation to an external resolver that turns an
//! indirect source (e.g. a video page URL) into a direct playable URL.

use crate::config::SourceHandlerConfig;
use crate::error::StreamError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::process::Stdio;
use tokio::process::Command;
use tracing::warn;

/// A direct playable URL plus extra transcoder input options discovered
/// during resolution (custom headers, protocol allow-list).
#[derive(Debug, Clone, Default)]
pub struct ResolvedSource {
    pub url: String,
    pub input_options: BTreeMap<String, String>,
}

/// Seam for media resolution. Network-bound and always fallible; a
/// failure is reported once and never retried here.
#[async_trait]
pub trait SourceResolver: Send + Sync {
    async fn resolve(
        &self,
        source: &str,
        handler: &SourceHandlerConfig,
    ) -> Result<ResolvedSource, StreamError>;
}

/// Resolver that shells out to the yt-dlp binary and reads its JSON dump.
pub struct YtDlpResolver {
    program: String,
}

impl YtDlpResolver {
    pub fn new() -> Self {
        Self {
            program: "yt-dlp".to_string(),
        }
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for YtDlpResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceResolver for YtDlpResolver {
    async fn resolve(
        &self,
        source: &str,
        handler: &SourceHandlerConfig,
    ) -> Result<ResolvedSource, StreamError> {
        let mut command = Command::new(&self.program);
        command
            .arg("--quiet")
            .arg("--no-warnings")
            .arg("--no-playlist")
            .arg("--skip-download")
            .arg("--dump-single-json")
            .arg("-f")
            .arg(handler.format.as_deref().unwrap_or("best"));

        if let Some(options) = &handler.options {
            for (key, value) in options {
                let flag = format!("--{}", key.replace('_', "-"));
                match value {
                    serde_json::Value::Bool(true) => {
                        command.arg(flag);
                    }
                    serde_json::Value::Bool(false) => {}
                    serde_json::Value::String(s) => {
                        command.arg(flag).arg(s);
                    }
                    serde_json::Value::Number(n) => {
                        command.arg(flag).arg(n.to_string());
                    }
                    _ => warn!("Ignoring non-scalar resolver option '{key}'"),
                }
            }
        }

        command
            .arg(source)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = command
            .output()
            .await
            .map_err(|e| StreamError::Resolution(format!("failed to run {}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StreamError::Resolution(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let info: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| StreamError::Resolution(format!("unparsable resolver output: {e}")))?;

        extract_resolved(&info)
    }
}

/// Pull the playable URL and input options out of a yt-dlp info dump.
fn extract_resolved(info: &serde_json::Value) -> Result<ResolvedSource, StreamError> {
    // A playlist dump nests the actual media in `entries`.
    let entry = match info.get("entries").and_then(|e| e.as_array()) {
        Some(entries) => entries
            .iter()
            .find(|e| !e.is_null())
            .ok_or_else(|| StreamError::Resolution("resolver returned an empty playlist".to_string()))?,
        None => info,
    };

    let url = entry
        .get("url")
        .or_else(|| entry.get("manifest_url"))
        .and_then(|u| u.as_str())
        .ok_or_else(|| {
            StreamError::Resolution("resolver did not provide a playable URL".to_string())
        })?
        .to_string();

    let mut input_options = BTreeMap::new();

    if let Some(headers) = entry.get("http_headers").and_then(|h| h.as_object()) {
        let header_lines: String = headers
            .iter()
            .filter_map(|(key, value)| value.as_str().map(|v| format!("{key}: {v}\r\n")))
            .collect();
        if !header_lines.is_empty() {
            input_options.insert("headers".to_string(), header_lines);
        }
    }

    if let Some(protocol) = entry.get("protocol").and_then(|p| p.as_str()) {
        if protocol.starts_with("m3u8") {
            input_options.insert(
                "protocol_whitelist".to_string(),
                "file,http,https,tcp,tls,crypto".to_string(),
            );
        }
    }

    Ok(ResolvedSource { url, input_options })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_url_and_headers() {
        let info = serde_json::json!({
            "url": "https://cdn.example.com/live.m3u8",
            "protocol": "m3u8_native",
            "http_headers": {"User-Agent": "agent"},
        });
        let resolved = extract_resolved(&info).unwrap();
        assert_eq!(resolved.url, "https://cdn.example.com/live.m3u8");
        assert_eq!(
            resolved.input_options["headers"],
            "User-Agent: agent\r\n"
        );
        assert_eq!(
            resolved.input_options["protocol_whitelist"],
            "file,http,https,tcp,tls,crypto"
        );
    }

    #[test]
    fn falls_back_to_manifest_url() {
        let info = serde_json::json!({"manifest_url": "https://cdn.example.com/master.m3u8"});
        let resolved = extract_resolved(&info).unwrap();
        assert_eq!(resolved.url, "https://cdn.example.com/master.m3u8");
        assert!(resolved.input_options.is_empty());
    }

    #[test]
    fn picks_first_playlist_entry() {
        let info = serde_json::json!({
            "entries": [null, {"url": "https://cdn.example.com/a"}],
        });
        let resolved = extract_resolved(&info).unwrap();
        assert_eq!(resolved.url, "https://cdn.example.com/a");
    }

    #[test]
    fn missing_url_is_resolution_failure() {
        let info = serde_json::json!({"title": "no url here"});
        assert!(matches!(
            extract_resolved(&info),
            Err(StreamError::Resolution(_))
        ));
    }

    #[test]
    fn empty_playlist_is_resolution_failure() {
        let info = serde_json::json!({"entries": [null]});
        assert!(matches!(
            extract_resolved(&info),
            Err(StreamError::Resolution(_))
        ));
    }
}
