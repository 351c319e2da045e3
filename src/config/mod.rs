mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./chancast.toml",
        "./config.toml",
        "~/.config/chancast/config.toml",
        "/etc/chancast/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    let mut seen_ids = HashSet::new();
    for channel in &config.channels {
        if channel.id == 0 {
            anyhow::bail!("Channel '{}' must have a positive id", channel.name);
        }
        if !seen_ids.insert(channel.id) {
            anyhow::bail!("Duplicate channel id {}", channel.id);
        }
        validate_channel(channel, &config.profiles)?;
    }

    // Scheduled entries are validated leniently by the schedule controller
    // (a malformed one is skipped, not fatal), but a broken profile
    // reference is a config mistake worth failing fast on.
    for scheduled in &config.scheduled_channels {
        if let Some(name) = &scheduled.channel.profile {
            if !config.profiles.contains_key(name) {
                anyhow::bail!(
                    "Scheduled channel '{}' references unknown profile '{}'",
                    scheduled.channel.name,
                    name
                );
            }
        }
    }

    Ok(())
}

pub(crate) fn validate_channel(
    channel: &ChannelDefinition,
    profiles: &std::collections::BTreeMap<String, EncodingProfile>,
) -> Result<()> {
    if channel.name.is_empty() {
        anyhow::bail!("Channel {} has an empty name", channel.id);
    }
    if channel.source.is_empty() {
        anyhow::bail!("Channel '{}' has an empty source", channel.name);
    }

    if channel.profile.is_none() && channel.custom_command.is_none() {
        anyhow::bail!(
            "Channel '{}' needs either a profile or a custom command",
            channel.name
        );
    }

    if let Some(name) = &channel.profile {
        if !profiles.contains_key(name) {
            anyhow::bail!(
                "Channel '{}' references unknown profile '{}'",
                channel.name,
                name
            );
        }
    }

    if let Some(CustomCommandConfig::Spec(spec)) = &channel.custom_command {
        if spec.command.is_none() {
            anyhow::bail!("Channel '{}' custom command is missing 'command'", channel.name);
        }
    }

    if let Some(handler) = &channel.handler {
        if handler.kind.to_lowercase() != "yt_dlp" {
            anyhow::bail!(
                "Channel '{}' has unsupported handler type '{}'",
                channel.name,
                handler.kind
            );
        }
    }

    let mut variant_names = HashSet::new();
    for variant in &channel.variants {
        if variant.name.is_empty() {
            anyhow::bail!("Channel '{}' has a variant with an empty name", channel.name);
        }
        if !variant_names.insert(variant.name.as_str()) {
            anyhow::bail!(
                "Channel '{}' has duplicate variant '{}'",
                channel.name,
                variant.name
            );
        }
        if let Some(name) = &variant.profile {
            if !profiles.contains_key(name) {
                anyhow::bail!(
                    "Variant '{}' of channel '{}' references unknown profile '{}'",
                    variant.name,
                    channel.name,
                    name
                );
            }
        }
    }

    Ok(())
}
