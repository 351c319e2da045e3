//! M3U playlist rendering.

use crate::config::ChannelDefinition;

/// Render the playlist for the given channels. `token` is appended to
/// each stream URL when auth is enabled so players can tune in directly.
pub fn render_m3u(channels: &[ChannelDefinition], base_url: &str, token: Option<&str>) -> String {
    let mut lines = vec!["#EXTM3U".to_string()];
    let base = base_url.trim_end_matches('/');
    let auth_query = token.map(|t| format!("?token={t}")).unwrap_or_default();

    for channel in channels {
        let mut attributes = vec![format!("tvg-id=\"{}\"", channel.id)];

        let tvg_name = channel.tvg_name.as_deref().unwrap_or(&channel.name);
        if !tvg_name.is_empty() {
            attributes.push(format!("tvg-name=\"{tvg_name}\""));
        }
        if let Some(logo) = &channel.logo {
            attributes.push(format!("tvg-logo=\"{logo}\""));
        }
        if let Some(group) = &channel.group {
            attributes.push(format!("group-title=\"{group}\""));
        }
        if let Some(number) = channel.channel_number {
            attributes.push(format!("channel-number=\"{number}\""));
        }

        lines.push(format!(
            "#EXTINF:-1 {},{}",
            attributes.join(" "),
            channel.name
        ));

        if let Some(next) = channel.next_programs.first() {
            let mut parts = vec![format!("title=\"{}\"", next.title)];
            if let Some(start) = &next.start {
                parts.push(format!("start=\"{start}\""));
            }
            if let Some(description) = &next.description {
                parts.push(format!("description=\"{description}\""));
            }
            lines.push(format!("#EXTREM:NEXT-PROGRAM {}", parts.join(" ")));
        }

        if let Some(feed) = &channel.program_feed {
            lines.push(format!("#EXTREM:PROGRAM-FEED url=\"{feed}\""));
        }

        if let Some(description) = &channel.description {
            lines.push(format!("#EXTREM:DESCRIPTION {description}"));
        }

        lines.push(format!("{base}/stream/{}{auth_query}", channel.id));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProgramHint;

    fn channel() -> ChannelDefinition {
        ChannelDefinition {
            id: 2,
            name: "News".to_string(),
            source: "http://example.com/news".to_string(),
            logo: Some("http://example.com/logo.png".to_string()),
            group: Some("Info".to_string()),
            channel_number: Some(102),
            ..Default::default()
        }
    }

    #[test]
    fn renders_header_and_stream_url() {
        let playlist = render_m3u(&[channel()], "http://127.0.0.1:8080/", None);
        let lines: Vec<&str> = playlist.lines().collect();

        assert_eq!(lines[0], "#EXTM3U");
        assert!(lines[1].starts_with("#EXTINF:-1 tvg-id=\"2\""));
        assert!(lines[1].contains("tvg-logo=\"http://example.com/logo.png\""));
        assert!(lines[1].contains("group-title=\"Info\""));
        assert!(lines[1].contains("channel-number=\"102\""));
        assert!(lines[1].ends_with(",News"));
        assert_eq!(lines.last().unwrap(), &"http://127.0.0.1:8080/stream/2");
    }

    #[test]
    fn token_is_appended_when_given() {
        let playlist = render_m3u(&[channel()], "http://host", Some("secret"));
        assert!(playlist.contains("http://host/stream/2?token=secret"));
    }

    #[test]
    fn program_hint_lines_are_emitted() {
        let mut def = channel();
        def.next_programs.push(ProgramHint {
            title: "Evening Show".to_string(),
            start: Some("2030-01-01T20:00:00Z".to_string()),
            end: None,
            description: Some("Daily recap".to_string()),
        });
        def.description = Some("Rolling news".to_string());

        let playlist = render_m3u(&[def], "http://host", None);
        assert!(playlist.contains(
            "#EXTREM:NEXT-PROGRAM title=\"Evening Show\" start=\"2030-01-01T20:00:00Z\" description=\"Daily recap\""
        ));
        assert!(playlist.contains("#EXTREM:DESCRIPTION Rolling news"));
    }
}
