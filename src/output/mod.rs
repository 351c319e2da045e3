//! Output planning: turns a named encoding profile into a concrete
//! transcoder output target and argument set.

use crate::config::{EncodingProfile, HwAccelConfig, OutputFormat};
use crate::error::StreamError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Where the transcoder writes its media output.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputTarget {
    /// Bytes flow out of the process's stdout pipe.
    Pipe,
    /// Playlist or manifest file inside a per-(channel,variant) directory.
    Path(PathBuf),
    /// Fixed-pattern local network address.
    Url(String),
}

/// A fully planned output: target plus the arguments that produce it.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSpec {
    pub target: OutputTarget,
    /// Output-side arguments, placed after `-i <source>`.
    pub args: Vec<String>,
    /// Global arguments prepended ahead of everything else (decode
    /// acceleration).
    pub global_args: Vec<String>,
}

impl OutputSpec {
    pub fn is_pipe(&self) -> bool {
        self.target == OutputTarget::Pipe
    }

    /// The final positional output argument handed to the transcoder.
    pub fn target_argument(&self) -> String {
        match &self.target {
            OutputTarget::Pipe => "pipe:1".to_string(),
            OutputTarget::Path(path) => path.to_string_lossy().to_string(),
            OutputTarget::Url(url) => url.clone(),
        }
    }
}

/// Plan the output for one (channel, variant) process.
pub fn plan_output(
    channel_id: u64,
    variant: &str,
    profile: &EncodingProfile,
    scratch_root: &Path,
) -> Result<OutputSpec, StreamError> {
    let mut options = profile.options.clone();
    let global_args = hwaccel_args(profile.hwaccel.as_ref());

    let audio_only = profile.audio_only || profile.output_format == OutputFormat::Audio;
    if audio_only {
        apply_audio_only(&mut options);
    }

    let (target, mut args) = match profile.output_format {
        OutputFormat::Hls | OutputFormat::LlHls => {
            let dir = fresh_variant_dir(scratch_root, channel_id, variant)?;
            let playlist = dir.join("index.m3u8");
            let args = hls_args(&mut options, profile.output_format == OutputFormat::LlHls);
            (OutputTarget::Path(playlist), args)
        }
        OutputFormat::Dash => {
            let dir = fresh_variant_dir(scratch_root, channel_id, variant)?;
            let manifest = dir.join("manifest.mpd");
            let args = dash_args(&mut options);
            (OutputTarget::Path(manifest), args)
        }
        OutputFormat::Rtsp => {
            // Static convention, enough for local consumption.
            let url = format!("rtsp://127.0.0.1:8554/channel_{channel_id}_{variant}");
            (OutputTarget::Url(url), vec!["-f".to_string(), "rtsp".to_string()])
        }
        OutputFormat::Ts | OutputFormat::Audio => {
            let mut args = Vec::new();
            if !options.contains_key("format") && !options.contains_key("f") {
                args.extend(["-f".to_string(), "mpegts".to_string()]);
            }
            (OutputTarget::Pipe, args)
        }
    };

    args.extend(render_options(&options));

    debug!(channel = channel_id, variant, ?args, "Planned transcoder output");

    Ok(OutputSpec {
        target,
        args,
        global_args,
    })
}

/// Global decode-acceleration flags. An unrecognized type is a no-op.
fn hwaccel_args(hwaccel: Option<&HwAccelConfig>) -> Vec<String> {
    let Some(conf) = hwaccel else {
        return Vec::new();
    };

    let mut args = Vec::new();
    match conf.kind.as_str() {
        "nvidia" => args.extend(["-hwaccel".to_string(), "cuda".to_string()]),
        "vaapi" => args.extend(["-hwaccel".to_string(), "vaapi".to_string()]),
        "videotoolbox" => args.extend(["-hwaccel".to_string(), "videotoolbox".to_string()]),
        other => {
            warn!("Unknown hwaccel type '{other}'; continuing without acceleration");
            return Vec::new();
        }
    }

    if let Some(device) = &conf.device {
        args.extend(["-hwaccel_device".to_string(), device.clone()]);
    }

    args
}

fn apply_audio_only(options: &mut BTreeMap<String, serde_json::Value>) {
    options.insert("vn".to_string(), serde_json::Value::Null);
    options
        .entry("acodec".to_string())
        .or_insert_with(|| serde_json::Value::String("aac".to_string()));
}

fn hls_args(options: &mut BTreeMap<String, serde_json::Value>, low_latency: bool) -> Vec<String> {
    let hls_time = take_scalar(options, "hls_time").unwrap_or_else(|| "4".to_string());
    let hls_list_size = take_scalar(options, "hls_list_size").unwrap_or_else(|| "0".to_string());
    let strftime = take_scalar(options, "strftime").unwrap_or_else(|| "0".to_string());
    let user_flags = take_scalar(options, "hls_flags").unwrap_or_default();

    // Low latency composes retention/announcement flags on top of any
    // user-specified flags; the plain mode defaults to rolling cleanup.
    let extra_flags = if low_latency {
        "delete_segments+append_list+omit_endlist+program_date_time"
    } else {
        "delete_segments+omit_endlist"
    };
    let combined_flags = [user_flags.as_str(), extra_flags]
        .iter()
        .filter(|flags| !flags.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("+");

    vec![
        "-f".to_string(),
        "hls".to_string(),
        "-hls_time".to_string(),
        hls_time,
        "-hls_list_size".to_string(),
        hls_list_size,
        "-hls_flags".to_string(),
        combined_flags,
        "-strftime".to_string(),
        strftime,
    ]
}

fn dash_args(options: &mut BTreeMap<String, serde_json::Value>) -> Vec<String> {
    let seg_duration = take_scalar(options, "seg_duration").unwrap_or_else(|| "4".to_string());
    let remove_at_exit = take_scalar(options, "remove_at_exit").unwrap_or_else(|| "1".to_string());

    vec![
        "-f".to_string(),
        "dash".to_string(),
        "-seg_duration".to_string(),
        seg_duration,
        "-remove_at_exit".to_string(),
        remove_at_exit,
    ]
}

/// Remove a scalar option and render it as a flag value.
fn take_scalar(options: &mut BTreeMap<String, serde_json::Value>, key: &str) -> Option<String> {
    let value = options.remove(key)?;
    match value {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Remaining profile options as `-key value` pairs. A null marks a bare
/// flag; anything non-scalar is skipped with a warning.
fn render_options(options: &BTreeMap<String, serde_json::Value>) -> Vec<String> {
    let mut args = Vec::new();
    for (key, value) in options {
        match value {
            serde_json::Value::Null => args.push(format!("-{key}")),
            serde_json::Value::Bool(true) => args.push(format!("-{key}")),
            serde_json::Value::Bool(false) => {}
            serde_json::Value::String(s) => {
                args.push(format!("-{key}"));
                args.push(s.clone());
            }
            serde_json::Value::Number(n) => {
                args.push(format!("-{key}"));
                args.push(n.to_string());
            }
            _ => warn!("Ignoring non-scalar output option '{key}'"),
        }
    }
    args
}

/// Per-(channel,variant) scratch directory, cleared of any previous run's
/// segments before use.
fn fresh_variant_dir(
    scratch_root: &Path,
    channel_id: u64,
    variant: &str,
) -> Result<PathBuf, StreamError> {
    let dir = scratch_root.join(channel_id.to_string()).join(variant);
    if dir.exists() {
        if let Err(e) = std::fs::remove_dir_all(&dir) {
            debug!("Failed to clean previous output at {:?}: {e}", dir);
        }
    }
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
