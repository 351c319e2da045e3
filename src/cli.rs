use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "chancast")]
#[command(author, version, about = "Channel restreaming server powered by ffmpeg")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the streaming server
    Serve {
        /// Host to bind to (overrides the config file)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List the channels in the configuration
    List,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Check GitHub for a newer release
    Update {
        /// Repository to check (owner/repo)
        #[arg(long, default_value = chancast::update::DEFAULT_REPO)]
        repo: String,
    },

    /// Launch VLC pointed at a configured channel
    Vlc {
        /// Channel id to play
        channel_id: u64,

        /// Adaptive bitrate variant name to request
        #[arg(long)]
        variant: Option<String>,

        /// Start a private transcoder instead of sharing the channel's
        #[arg(long)]
        no_overlap: bool,
    },

    /// Display version information
    Version,
}
