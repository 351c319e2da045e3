use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub output: OutputConfig,

    /// Named transcoder output profiles referenced by channels.
    #[serde(default)]
    pub profiles: BTreeMap<String, EncodingProfile>,

    #[serde(default)]
    pub channels: Vec<ChannelDefinition>,

    #[serde(default)]
    pub scheduled_channels: Vec<ScheduledChannel>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Require a token on every route except /health and /metrics.
    #[serde(default = "default_auth_enabled")]
    pub enabled: bool,

    /// Shared token, accepted via the `X-Chancast-Token` header or a
    /// `token` query parameter.
    #[serde(default = "default_token")]
    pub token: String,
}

fn default_auth_enabled() -> bool {
    true
}
fn default_token() -> String {
    "changeme123".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: default_auth_enabled(),
            token: default_token(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Root directory for segmented output (HLS playlists, DASH manifests).
    /// Each process gets its own `<root>/<channel>/<variant>` subdirectory.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    /// Seconds to wait for a transcoder to exit after a graceful stop
    /// request before it is forcibly killed.
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("chancast_media")
}
fn default_grace_secs() -> u64 {
    5
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            scratch_dir: default_scratch_dir(),
            grace_secs: default_grace_secs(),
        }
    }
}

/// One configured media channel.
///
/// Read-only at request time; only the management API and the schedule
/// controller add or remove whole definitions.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ChannelDefinition {
    /// Unique positive id. Defaults to 0 (invalid) so scheduled entries
    /// may omit it and be rejected at load instead of at parse.
    #[serde(default)]
    pub id: u64,

    pub name: String,

    /// Input URI, or an opaque locator handed to a source handler.
    pub source: String,

    /// Named encoding profile. Required unless `custom_command` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    /// Fully custom transcoder invocation; bypasses the output planner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_command: Option<CustomCommandConfig>,

    /// Strategy for turning `source` into a direct playable URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<SourceHandlerConfig>,

    /// Transcoder input options (`-key value` pairs placed before `-i`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_options: Option<BTreeMap<String, serde_json::Value>>,

    /// Raw input arguments appended verbatim before `-i`. Kept loosely
    /// typed: a malformed value is ignored with a warning at start time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_args: Option<serde_json::Value>,

    /// Adaptive-bitrate variants selectable per request.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<VariantDefinition>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub regions_allowed: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub regions_blocked: Vec<String>,

    // Playlist/EPG presentation fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tvg_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epg_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_number: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_feed: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next_programs: Vec<ProgramHint>,
}

/// Upcoming program metadata surfaced in the playlist and EPG.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProgramHint {
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Named override bundle. A selected variant replaces whole fields of its
/// parent channel; fields it leaves unset are inherited unchanged.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VariantDefinition {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_command: Option<CustomCommandConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<SourceHandlerConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_options: Option<BTreeMap<String, serde_json::Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_args: Option<serde_json::Value>,
}

/// Custom transcoder invocation. The shorthand string form is equivalent
/// to `{ command = "<line>" }`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CustomCommandConfig {
    Line(String),
    Spec(CustomCommandSpec),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CustomCommandSpec {
    /// Command template; `{source}`, `{id}` and `{name}` are substituted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandTemplate>,

    /// Run the (string-form) command through a shell instead of
    /// tokenizing it.
    #[serde(default)]
    pub shell: bool,

    /// Replacement environment for the child process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CommandTemplate {
    Line(String),
    Argv(Vec<String>),
}

/// Source handler descriptor. `type = "yt_dlp"` delegates resolution to
/// the yt-dlp binary; anything else uses the source URI directly.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SourceHandlerConfig {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Extra flags forwarded to the resolver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<BTreeMap<String, serde_json::Value>>,
}

/// Named, immutable bundle of transcoder output options.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct EncodingProfile {
    #[serde(default)]
    pub output_format: OutputFormat,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hwaccel: Option<HwAccelConfig>,

    /// Strip video and default the audio codec to aac.
    #[serde(default)]
    pub audio_only: bool,

    /// Remaining entries become `-key value` output arguments.
    #[serde(flatten)]
    pub options: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// MPEG-TS to the process's stdout pipe.
    #[default]
    Ts,
    Hls,
    LlHls,
    Dash,
    Rtsp,
    Audio,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HwAccelConfig {
    /// Acceleration backend: nvidia, vaapi or videotoolbox. Anything
    /// else is ignored.
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

/// A channel definition plus an optional [start, end) availability window.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ScheduledChannel {
    #[serde(flatten)]
    pub channel: ChannelDefinition,

    /// UTC instant at which the channel becomes available. Absent or past
    /// means immediately.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,

    /// UTC instant at which the channel is withdrawn again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}
