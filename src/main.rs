mod cli;

use anyhow::Result;
use chancast::{config, server, update};
use clap::Parser;
use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise use defaults based on the
    // verbose flag. The `transcoder` target carries ffmpeg stderr.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "chancast=trace,transcoder=info,tower_http=debug".to_string()
        } else {
            "chancast=debug,transcoder=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Serve { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(serve(cli.config.as_deref(), host, port))
        }
        Commands::List => list_channels(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::CheckTools => check_tools(),
        Commands::Update { repo } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(check_update(&repo))
        }
        Commands::Vlc {
            channel_id,
            variant,
            no_overlap,
        } => launch_vlc(cli.config.as_deref(), channel_id, variant, no_overlap),
        Commands::Version => {
            println!("chancast {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn serve(
    config_path: Option<&std::path::Path>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    println!("chancast {}", env!("CARGO_PKG_VERSION"));
    println!(
        "Authentication: {}",
        if config.auth.enabled { "enabled" } else { "disabled" }
    );
    println!(
        "Serving {} channel(s) at http://{}:{}",
        config.channels.len(),
        config.server.host,
        config.server.port
    );
    if !config.scheduled_channels.is_empty() {
        println!(
            "{} scheduled channel(s) configured",
            config.scheduled_channels.len()
        );
    }

    server::start_server(config).await
}

fn list_channels(config_path: Option<&std::path::Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    if config.channels.is_empty() {
        println!("No channels found in the configuration.");
        return Ok(());
    }

    println!("Available channels:");
    for channel in &config.channels {
        let profile_label = match (&channel.custom_command, &channel.profile) {
            (Some(_), Some(profile)) => format!("{profile} (custom override)"),
            (Some(_), None) => "custom command".to_string(),
            (None, Some(profile)) => profile.clone(),
            (None, None) => "—".to_string(),
        };
        println!(
            "  - ID: {}, Name: {}, Profile: {}, Variants: {}",
            channel.id,
            channel.name,
            profile_label,
            channel.variants.len()
        );
    }

    Ok(())
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!("  Auth enabled: {}", config.auth.enabled);
            println!("  Profiles: {}", config.profiles.len());
            println!("  Channels: {}", config.channels.len());
            println!("  Scheduled channels: {}", config.scheduled_channels.len());
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Server: {}:{}", config.server.host, config.server.port);
        }
    }

    Ok(())
}

fn check_tools() -> Result<()> {
    println!("Checking external tools...\n");

    let tools = [
        ("ffmpeg", true),
        ("ffprobe", false),
        ("yt-dlp", false),
    ];
    let mut all_required_ok = true;

    for (name, required) in tools {
        match which::which(name) {
            Ok(path) => println!("✓ {} - {}", name, path.display()),
            Err(_) => {
                if required {
                    all_required_ok = false;
                    println!("✗ {name} (required)");
                } else {
                    println!("✗ {name} (optional)");
                }
            }
        }
    }

    println!();
    if all_required_ok {
        println!("All required tools are available!");
        println!("yt-dlp is only needed for channels using the yt_dlp handler.");
    } else {
        println!("ffmpeg is missing; no channel can be streamed without it.");
    }

    Ok(())
}

async fn check_update(repo: &str) -> Result<()> {
    let current = env!("CARGO_PKG_VERSION");
    println!("Current chancast version: {current}");

    let Some(tag) = update::fetch_latest_release_tag(repo).await? else {
        anyhow::bail!("No release information found for {repo}");
    };

    let latest = update::normalize_version(&tag);
    println!("Latest release: {latest} (tag {tag})");

    if update::is_newer_version(current, latest) {
        println!("A newer release is available.");
        println!("Upgrade with: cargo install --git https://github.com/{repo} --tag {tag}");
    } else {
        println!("You are already running the latest version.");
    }

    Ok(())
}

fn launch_vlc(
    config_path: Option<&std::path::Path>,
    channel_id: u64,
    variant: Option<String>,
    no_overlap: bool,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    // Prefer a localhost-friendly host when binding to all interfaces.
    let mut host = config.server.host.clone();
    if host == "0.0.0.0" || host == "::" {
        host = "127.0.0.1".to_string();
    }

    let mut params = Vec::new();
    if config.auth.enabled {
        params.push(format!("token={}", config.auth.token));
    }
    if let Some(variant) = variant {
        params.push(format!("variant={variant}"));
    }
    if no_overlap {
        params.push("overlap=false".to_string());
    }

    let query = if params.is_empty() {
        String::new()
    } else {
        format!("?{}", params.join("&"))
    };
    let url = format!("http://{}:{}/stream/{}{}", host, config.server.port, channel_id, query);

    println!("Starting VLC with URL: {url}");
    std::process::Command::new("vlc")
        .arg(&url)
        .status()
        .map_err(|_| anyhow::anyhow!("VLC is not installed or not found in PATH"))?;

    Ok(())
}
