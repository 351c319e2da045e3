//! Time-windowed channel scheduling.
//!
//! Each scheduled definition moves through Pending -> Active -> Expired,
//! driven by at most two one-shot timers. Activation inserts the whole
//! definition into the channel registry; deactivation removes it and
//! stops every variant's transcoder.

use crate::channels::ChannelRegistry;
use crate::config::{ChannelDefinition, ScheduledChannel};
use crate::supervisor::ProcessSupervisor;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Parse a schedule timestamp as a UTC instant. A timestamp without
/// timezone information is assumed UTC with a warning.
pub fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    let candidate = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(candidate) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(candidate, format) {
            warn!("Timestamp '{candidate}' has no timezone; assuming UTC");
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    None
}

pub struct ScheduleController {
    registry: Arc<ChannelRegistry>,
    supervisor: Arc<ProcessSupervisor>,
    /// Ids of always-on channels. A scheduled definition colliding with
    /// one of these is never activated.
    static_ids: HashSet<u64>,
    /// Pending one-shot timers, keyed so a reload replaces rather than
    /// double-schedules.
    timers: DashMap<String, JoinHandle<()>>,
}

impl ScheduleController {
    pub fn new(
        registry: Arc<ChannelRegistry>,
        supervisor: Arc<ProcessSupervisor>,
        static_ids: HashSet<u64>,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            supervisor,
            static_ids,
            timers: DashMap::new(),
        })
    }

    /// Schedule every entry. A malformed entry is skipped with a log
    /// line; it never aborts the rest.
    pub fn load(self: &Arc<Self>, entries: &[ScheduledChannel]) {
        for entry in entries {
            self.schedule_entry(entry);
        }
    }

    pub fn schedule_entry(self: &Arc<Self>, entry: &ScheduledChannel) {
        let id = entry.channel.id;
        if id == 0 {
            warn!(
                "Skipping scheduled channel '{}' without an id",
                entry.channel.name
            );
            return;
        }
        if self.static_ids.contains(&id) {
            warn!("Scheduled channel {id} collides with a static channel; static wins");
            return;
        }

        let start = match &entry.start {
            Some(raw) => match parse_instant(raw) {
                Some(instant) => Some(instant),
                None => {
                    warn!("Skipping scheduled channel {id}: unparsable start '{raw}'");
                    return;
                }
            },
            None => None,
        };
        let end = match &entry.end {
            Some(raw) => match parse_instant(raw) {
                Some(instant) => Some(instant),
                None => {
                    warn!("Skipping scheduled channel {id}: unparsable end '{raw}'");
                    return;
                }
            },
            None => None,
        };

        if let (Some(start), Some(end)) = (start, end) {
            if end <= start {
                warn!("Skipping scheduled channel {id}: end {end} is not after start {start}");
                return;
            }
        }

        let now = Utc::now();

        if let Some(end) = end {
            if end <= now {
                debug!("Scheduled channel {id} already expired at {end}");
                let controller = Arc::clone(self);
                tokio::spawn(async move { controller.deactivate(id).await });
                return;
            }
        }

        match start {
            Some(start) if start > now => {
                info!("Scheduling channel {id} activation at {start}");
                let controller = Arc::clone(self);
                let definition = entry.channel.clone();
                self.set_timer(
                    format!("activate:{id}"),
                    (start - now).to_std().unwrap_or_default(),
                    async move { controller.activate(definition) },
                );
            }
            _ => self.activate(entry.channel.clone()),
        }

        if let Some(end) = end {
            info!("Scheduling channel {id} deactivation at {end}");
            let controller = Arc::clone(self);
            self.set_timer(
                format!("deactivate:{id}"),
                (end - now).to_std().unwrap_or_default(),
                async move { controller.deactivate(id).await },
            );
        }
    }

    /// Make the definition available. Idempotent: a timer firing after the
    /// id was already added through another path changes nothing.
    pub fn activate(&self, definition: ChannelDefinition) {
        let id = definition.id;
        if self.registry.contains(id) {
            info!("Channel {id} is already active; leaving it untouched");
            return;
        }
        info!("Activating scheduled channel {id} ('{}')", definition.name);
        self.registry.insert(definition);
    }

    /// Withdraw the definition and stop every variant's transcoder.
    /// No-op when the id is absent.
    pub async fn deactivate(&self, id: u64) {
        match self.registry.remove(id) {
            Some(definition) => {
                info!("Deactivating scheduled channel {id} ('{}')", definition.name);
                self.supervisor.stop(id, None).await;
            }
            None => debug!("Channel {id} is not active; nothing to deactivate"),
        }
    }

    /// One-shot timer with replace-by-key semantics.
    fn set_timer<F>(&self, key: String, delay: std::time::Duration, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
        if let Some(previous) = self.timers.insert(key, handle) {
            previous.abort();
        }
    }

    /// Cancel all pending timers.
    pub fn shutdown(&self) {
        for entry in self.timers.iter() {
            entry.value().abort();
        }
        self.timers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_with_offset() {
        let instant = parse_instant("2030-06-01T18:00:00+02:00").unwrap();
        assert_eq!(instant, Utc.with_ymd_and_hms(2030, 6, 1, 16, 0, 0).unwrap());
    }

    #[test]
    fn parses_zulu_suffix() {
        let instant = parse_instant("2030-06-01T18:00:00Z").unwrap();
        assert_eq!(instant, Utc.with_ymd_and_hms(2030, 6, 1, 18, 0, 0).unwrap());
    }

    #[test]
    fn naive_timestamp_assumed_utc() {
        let instant = parse_instant("2030-06-01 18:00:00").unwrap();
        assert_eq!(instant, Utc.with_ymd_and_hms(2030, 6, 1, 18, 0, 0).unwrap());
    }

    #[test]
    fn garbage_is_none() {
        assert!(parse_instant("not a time").is_none());
        assert!(parse_instant("").is_none());
    }
}
