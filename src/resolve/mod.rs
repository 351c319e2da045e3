//! Input resolution: turns an effective channel definition into a
//! concrete transcoder invocation.
//!
//! A channel either carries a fully custom command (templated, optionally
//! shell-executed) or a source that is used directly or handed to a source
//! handler for resolution into a playable URL plus extra input options.

pub mod handler;

use crate::config::{ChannelDefinition, CommandTemplate, CustomCommandConfig, CustomCommandSpec};
use crate::error::StreamError;
use handler::SourceResolver;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// A launchable description of the transcoder process for one key.
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    Custom {
        command: CommandLine,
        env: Option<BTreeMap<String, String>>,
        cwd: Option<String>,
    },
    Transcode {
        source: String,
        /// `-key value` pairs placed before `-i`, already merged so that
        /// user-supplied options win over resolver-supplied ones.
        input_options: BTreeMap<String, String>,
        /// Raw arguments appended verbatim before `-i`.
        input_args: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandLine {
    /// Single string handed to the shell unchanged.
    Shell(String),
    /// Argument vector executed directly.
    Argv(Vec<String>),
}

/// Substitute `{source}`, `{id}` and `{name}` in a template fragment.
fn substitute(template: &str, channel: &ChannelDefinition) -> String {
    template
        .replace("{source}", &channel.source)
        .replace("{id}", &channel.id.to_string())
        .replace("{name}", &channel.name)
}

/// Split a command line using POSIX shell quoting rules: whitespace
/// separates words, single quotes are literal, double quotes allow
/// backslash escapes, a bare backslash escapes the next character.
pub fn split_shell_words(line: &str) -> Result<Vec<String>, StreamError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => {
                            return Err(StreamError::Configuration(
                                "unterminated single quote in command".to_string(),
                            ))
                        }
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(e @ ('"' | '\\' | '$' | '`')) => current.push(e),
                            Some(e) => {
                                current.push('\\');
                                current.push(e);
                            }
                            None => {
                                return Err(StreamError::Configuration(
                                    "unterminated double quote in command".to_string(),
                                ))
                            }
                        },
                        Some(c) => current.push(c),
                        None => {
                            return Err(StreamError::Configuration(
                                "unterminated double quote in command".to_string(),
                            ))
                        }
                    }
                }
            }
            '\\' => {
                in_word = true;
                match chars.next() {
                    Some(e) => current.push(e),
                    None => {
                        return Err(StreamError::Configuration(
                            "dangling backslash in command".to_string(),
                        ))
                    }
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }

    if in_word {
        words.push(current);
    }

    Ok(words)
}

/// Build the custom invocation for a channel, if one is configured.
fn prepare_custom_command(
    channel: &ChannelDefinition,
) -> Result<Option<Invocation>, StreamError> {
    let spec = match &channel.custom_command {
        None => return Ok(None),
        Some(CustomCommandConfig::Line(line)) => CustomCommandSpec {
            command: Some(CommandTemplate::Line(line.clone())),
            ..Default::default()
        },
        Some(CustomCommandConfig::Spec(spec)) => spec.clone(),
    };

    let template = spec.command.ok_or_else(|| {
        StreamError::Configuration("custom command is missing 'command'".to_string())
    })?;

    let command = match template {
        // List form substitutes into each token independently, so a
        // substituted value always stays a single argument.
        CommandTemplate::Argv(tokens) => CommandLine::Argv(
            tokens
                .iter()
                .map(|token| substitute(token, channel))
                .collect(),
        ),
        // String form substitutes first, then either keeps the raw line
        // for the shell or tokenizes it. A substituted value containing
        // whitespace therefore splits into several arguments; that is the
        // documented behavior of this form.
        CommandTemplate::Line(line) => {
            let formatted = substitute(&line, channel);
            if spec.shell {
                CommandLine::Shell(formatted)
            } else {
                let words = split_shell_words(&formatted)?;
                if words.is_empty() {
                    return Err(StreamError::Configuration(
                        "custom command is empty after substitution".to_string(),
                    ));
                }
                CommandLine::Argv(words)
            }
        }
    };

    if let CommandLine::Argv(words) = &command {
        if words.is_empty() {
            return Err(StreamError::Configuration(
                "custom command has no arguments".to_string(),
            ));
        }
    }

    Ok(Some(Invocation::Custom {
        command,
        env: spec.env,
        cwd: spec.cwd,
    }))
}

/// Render a loosely-typed option value as a flag value.
fn option_value(key: &str, value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Null => Some(String::new()),
        _ => {
            warn!("Ignoring non-scalar input option '{key}'");
            None
        }
    }
}

/// Raw input arguments, leniently validated: a malformed value is ignored
/// with a warning rather than failing the request.
fn collect_input_args(channel: &ChannelDefinition) -> Vec<String> {
    let Some(value) = &channel.input_args else {
        return Vec::new();
    };

    match value {
        serde_json::Value::Array(items) => {
            let mut args = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    serde_json::Value::String(s) => args.push(s.clone()),
                    _ => {
                        warn!(
                            "Channel '{}' input_args must contain only strings; ignoring",
                            channel.name
                        );
                        return Vec::new();
                    }
                }
            }
            args
        }
        _ => {
            warn!(
                "Channel '{}' input_args must be a list of arguments; ignoring",
                channel.name
            );
            Vec::new()
        }
    }
}

/// Resolve the effective definition into an invocation.
///
/// The resolver is only consulted for channels with a delegating handler;
/// a custom command or a direct source never touches it.
pub async fn resolve_invocation(
    channel: &ChannelDefinition,
    resolver: &dyn SourceResolver,
) -> Result<Invocation, StreamError> {
    if let Some(invocation) = prepare_custom_command(channel)? {
        return Ok(invocation);
    }

    if channel.source.is_empty() {
        return Err(StreamError::Configuration(format!(
            "channel '{}' is missing a source",
            channel.name
        )));
    }

    let resolved = match &channel.handler {
        Some(handler) if handler.kind.to_lowercase() == "yt_dlp" => {
            resolver.resolve(&channel.source, handler).await?
        }
        _ => handler::ResolvedSource {
            url: channel.source.clone(),
            input_options: BTreeMap::new(),
        },
    };

    // Resolver-provided options first; user-supplied ones win on collision.
    let mut input_options = resolved.input_options;
    if let Some(configured) = &channel.input_options {
        for (key, value) in configured {
            if let Some(rendered) = option_value(key, value) {
                input_options.insert(key.clone(), rendered);
            }
        }
    }

    let input_args = collect_input_args(channel);

    debug!(
        channel = channel.id,
        url = %resolved.url,
        ?input_args,
        "Resolved transcoder input"
    );

    Ok(Invocation::Transcode {
        source: resolved.url,
        input_options,
        input_args,
    })
}
