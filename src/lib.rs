//! Chancast: a channel restreaming server.
//!
//! Supervises one external ffmpeg process per configured channel (and
//! per adaptive-bitrate variant), relays its output to any number of
//! HTTP viewers, and schedules time-windowed channels in and out of
//! availability.

pub mod channels;
pub mod config;
pub mod epg;
pub mod error;
pub mod output;
pub mod playlist;
pub mod resolve;
pub mod schedule;
pub mod server;
pub mod sessions;
pub mod supervisor;
pub mod update;
