//! Transcoder process supervision.
//!
//! Owns the concurrent registry mapping a (channel, variant) key to at
//! most one live transcoder process, and the start/stop/cleanup logic
//! around it. Spawning never races: each key has its own async lock, and
//! a slot is created atomically on first access.

use crate::channels::DEFAULT_VARIANT;
use crate::config::{ChannelDefinition, EncodingProfile};
use crate::error::StreamError;
use crate::output::{plan_output, OutputSpec};
use crate::resolve::handler::SourceResolver;
use crate::resolve::{resolve_invocation, CommandLine, Invocation};
use chrono::Utc;
use dashmap::DashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Identifies one supervised process slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcessKey {
    pub channel: u64,
    pub variant: String,
}

impl std::fmt::Display for ProcessKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.channel, self.variant)
    }
}

/// Derive a variant tag for a private viewer session. The millisecond
/// timestamp plus a process-wide sequence number never collides with the
/// shared tag or another session's tag.
pub fn private_variant_tag(base: &str) -> String {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    format!(
        "{base}-{}-{}",
        Utc::now().timestamp_millis(),
        SEQ.fetch_add(1, Ordering::Relaxed)
    )
}

/// A live (or once-live) transcoder process. Cheap to clone; all clones
/// share the same underlying child.
#[derive(Clone)]
pub struct ProcessHandle {
    id: u64,
    pid: Option<u32>,
    child: Arc<Mutex<Child>>,
    stdout: Arc<Mutex<ChildStdout>>,
}

impl ProcessHandle {
    /// Registry-unique handle id; a respawn always gets a fresh one.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the process exists and has not exited.
    pub async fn is_alive(&self) -> bool {
        matches!(self.child.lock().await.try_wait(), Ok(None))
    }

    /// Shared stdout pipe. Concurrent readers each receive a disjoint
    /// portion of the byte stream.
    pub fn stdout(&self) -> Arc<Mutex<ChildStdout>> {
        Arc::clone(&self.stdout)
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("id", &self.id)
            .field("pid", &self.pid)
            .finish()
    }
}

#[derive(Default)]
struct Slot {
    handle: Option<ProcessHandle>,
}

/// Concurrent registry of live transcoder processes.
///
/// One instance is owned by the server for its whole lifetime; tests
/// construct their own for isolation.
pub struct ProcessSupervisor {
    slots: DashMap<ProcessKey, Arc<Mutex<Slot>>>,
    resolver: Arc<dyn SourceResolver>,
    scratch_root: PathBuf,
    grace: Duration,
    cleaned: AtomicBool,
    next_handle_id: AtomicU64,
}

impl ProcessSupervisor {
    pub fn new(resolver: Arc<dyn SourceResolver>, scratch_root: PathBuf, grace: Duration) -> Self {
        Self {
            slots: DashMap::new(),
            resolver,
            scratch_root,
            grace,
            cleaned: AtomicBool::new(false),
            next_handle_id: AtomicU64::new(1),
        }
    }

    /// Return the live process for (channel, variant), starting one if the
    /// slot is empty or its previous process has died. Concurrent callers
    /// for the same key serialize on the slot lock, so exactly one of them
    /// spawns; the rest reuse the new handle.
    ///
    /// A failed start caches nothing; the next call retries from scratch.
    pub async fn get_or_start(
        &self,
        channel: &ChannelDefinition,
        profile: &EncodingProfile,
        variant_tag: Option<&str>,
    ) -> Result<(ProcessHandle, String), StreamError> {
        let tag = variant_tag.unwrap_or(DEFAULT_VARIANT).to_string();
        let key = ProcessKey {
            channel: channel.id,
            variant: tag.clone(),
        };

        let slot = self.slots.entry(key.clone()).or_default().clone();
        let mut slot = slot.lock().await;

        if let Some(handle) = &slot.handle {
            if handle.is_alive().await {
                info!(
                    "Reusing transcoder for '{}' ({key}, pid {:?})",
                    channel.name,
                    handle.pid()
                );
                return Ok((handle.clone(), tag));
            }
            debug!("Previous transcoder for {key} has exited; respawning");
            slot.handle = None;
        }

        info!("Starting transcoder for '{}' ({key})", channel.name);

        let invocation = resolve_invocation(channel, self.resolver.as_ref()).await?;
        let handle = match &invocation {
            Invocation::Custom { .. } => self.spawn(channel, &invocation, None)?,
            Invocation::Transcode { .. } => {
                let spec = plan_output(channel.id, &tag, profile, &self.scratch_root)?;
                self.spawn(channel, &invocation, Some(&spec))?
            }
        };

        info!(
            "Transcoder started for '{}' ({key}, pid {:?})",
            channel.name,
            handle.pid()
        );

        slot.handle = Some(handle.clone());
        Ok((handle, tag))
    }

    fn spawn(
        &self,
        channel: &ChannelDefinition,
        invocation: &Invocation,
        output: Option<&OutputSpec>,
    ) -> Result<ProcessHandle, StreamError> {
        let mut command = match invocation {
            Invocation::Custom { command, env, cwd } => {
                let mut cmd = match command {
                    CommandLine::Argv(words) => {
                        let mut cmd = Command::new(&words[0]);
                        cmd.args(&words[1..]);
                        cmd
                    }
                    CommandLine::Shell(line) => {
                        #[cfg(unix)]
                        let (shell, flag) = ("/bin/sh", "-c");
                        #[cfg(not(unix))]
                        let (shell, flag) = ("cmd", "/C");
                        let mut cmd = Command::new(shell);
                        cmd.arg(flag).arg(line);
                        cmd
                    }
                };
                if let Some(env) = env {
                    // A configured environment replaces the inherited one.
                    cmd.env_clear().envs(env);
                }
                if let Some(cwd) = cwd {
                    cmd.current_dir(cwd);
                }
                cmd
            }
            Invocation::Transcode {
                source,
                input_options,
                input_args,
            } => {
                let spec = output.expect("transcode invocation needs an output plan");
                let mut cmd = Command::new("ffmpeg");
                cmd.args(&spec.global_args);
                for (key, value) in input_options {
                    cmd.arg(format!("-{key}"));
                    if !value.is_empty() {
                        cmd.arg(value);
                    }
                }
                cmd.args(input_args);
                cmd.arg("-i").arg(source);
                cmd.args(&spec.args);
                cmd.arg(spec.target_argument());
                cmd
            }
        };

        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let pid = child.id();

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| StreamError::Configuration("transcoder stdout not captured".into()))?;

        if let Some(stderr) = child.stderr.take() {
            forward_stderr(channel.name.clone(), stderr);
        }

        Ok(ProcessHandle {
            id: self.next_handle_id.fetch_add(1, Ordering::Relaxed),
            pid,
            child: Arc::new(Mutex::new(child)),
            stdout: Arc::new(Mutex::new(stdout)),
        })
    }

    /// Stop every process of a channel, or only one variant's process.
    ///
    /// Entries are removed from the registry before termination, so a
    /// concurrent `get_or_start` never observes a half-removed slot; it
    /// simply creates a fresh one.
    pub async fn stop(&self, channel_id: u64, variant: Option<&str>) {
        let keys: Vec<ProcessKey> = self
            .slots
            .iter()
            .filter(|entry| {
                entry.key().channel == channel_id
                    && variant.map_or(true, |v| entry.key().variant == v)
            })
            .map(|entry| entry.key().clone())
            .collect();

        // Remove every matching entry first, then terminate; a concurrent
        // get_or_start finds no entry and starts fresh rather than racing
        // a teardown in progress.
        let mut removed = Vec::new();
        for key in keys {
            if let Some(entry) = self.slots.remove(&key) {
                removed.push(entry);
            }
        }

        for (key, slot) in removed {
            let mut slot = slot.lock().await;
            if let Some(handle) = slot.handle.take() {
                self.terminate(&key, handle).await;
            }
        }
    }

    /// Graceful stop with bounded escalation: termination request, wait up
    /// to the grace period, then a forced kill.
    async fn terminate(&self, key: &ProcessKey, handle: ProcessHandle) {
        let mut child = handle.child.lock().await;

        if !matches!(child.try_wait(), Ok(None)) {
            debug!("Transcoder for {key} already exited");
            return;
        }

        warn!("Terminating transcoder for {key} (pid {:?})", child.id());

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;
            if let Some(pid) = child.id() {
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            }
        }
        #[cfg(not(unix))]
        {
            let _ = child.start_kill();
        }

        match tokio::time::timeout(self.grace, child.wait()).await {
            Ok(_) => info!("Transcoder for {key} stopped"),
            Err(_) => {
                error!(
                    "Transcoder for {key} did not exit within {:?}; killing",
                    self.grace
                );
                if let Err(e) = child.kill().await {
                    error!("Failed to kill transcoder for {key}: {e}");
                }
            }
        }
    }

    /// Stop every channel currently present. Safe to call more than once;
    /// only the first call does any work.
    pub async fn cleanup_all(&self) {
        if self.cleaned.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("Shutting down all active transcoders");
        let mut channel_ids: Vec<u64> = self.slots.iter().map(|e| e.key().channel).collect();
        channel_ids.sort_unstable();
        channel_ids.dedup();
        for channel_id in channel_ids {
            self.stop(channel_id, None).await;
        }
        info!("Transcoder cleanup complete");
    }

    /// Number of registered processes still alive.
    pub async fn active_count(&self) -> usize {
        let slots: Vec<Arc<Mutex<Slot>>> =
            self.slots.iter().map(|entry| entry.value().clone()).collect();

        let mut count = 0;
        for slot in slots {
            let slot = slot.lock().await;
            if let Some(handle) = &slot.handle {
                if handle.is_alive().await {
                    count += 1;
                }
            }
        }
        count
    }
}

/// Forward transcoder diagnostics line by line until the pipe closes.
/// Diagnostic text goes to the log only, never to viewers.
fn forward_stderr(channel_name: String, stderr: tokio::process::ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            info!(target: "transcoder", "[{channel_name}] {line}");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_tags_never_collide() {
        let a = private_variant_tag("default");
        let b = private_variant_tag("default");
        assert_ne!(a, b);
        assert!(a.starts_with("default-"));
        assert_ne!(a, DEFAULT_VARIANT);
    }

    #[test]
    fn process_key_display() {
        let key = ProcessKey {
            channel: 7,
            variant: "low".to_string(),
        };
        assert_eq!(key.to_string(), "7/low");
    }
}
