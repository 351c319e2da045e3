//! XMLTV and JSON EPG payloads built from channel program hints.

use crate::config::ChannelDefinition;
use crate::schedule::parse_instant;
use chrono::{DateTime, Utc};

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn format_xmltv_time(instant: DateTime<Utc>) -> String {
    instant.format("%Y%m%d%H%M%S +0000").to_string()
}

fn epg_channel_id(channel: &ChannelDefinition) -> String {
    channel
        .epg_id
        .clone()
        .or_else(|| channel.tvg_name.clone())
        .unwrap_or_else(|| channel.id.to_string())
}

/// Render an XMLTV document for the given channels. Programs without a
/// parsable start time are left out.
pub fn build_xmltv(channels: &[ChannelDefinition]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    xml.push_str("<tv source-info-name=\"Chancast\" generator-info-name=\"Chancast\">\n");

    for channel in channels {
        let id = xml_escape(&epg_channel_id(channel));
        xml.push_str(&format!("  <channel id=\"{id}\">\n"));
        xml.push_str(&format!(
            "    <display-name>{}</display-name>\n",
            xml_escape(&channel.name)
        ));
        if let Some(tvg_name) = &channel.tvg_name {
            xml.push_str(&format!(
                "    <display-name>{}</display-name>\n",
                xml_escape(tvg_name)
            ));
        }
        if let Some(logo) = &channel.logo {
            xml.push_str(&format!("    <icon src=\"{}\"/>\n", xml_escape(logo)));
        }
        xml.push_str("  </channel>\n");
    }

    for channel in channels {
        let id = xml_escape(&epg_channel_id(channel));
        for program in &channel.next_programs {
            let Some(start) = program.start.as_deref().and_then(parse_instant) else {
                continue;
            };

            let mut attrs = format!("start=\"{}\" channel=\"{id}\"", format_xmltv_time(start));
            if let Some(end) = program.end.as_deref().and_then(parse_instant) {
                attrs.push_str(&format!(" stop=\"{}\"", format_xmltv_time(end)));
            }

            xml.push_str(&format!("  <programme {attrs}>\n"));
            xml.push_str(&format!(
                "    <title>{}</title>\n",
                xml_escape(&program.title)
            ));
            if let Some(description) = &program.description {
                xml.push_str(&format!("    <desc>{}</desc>\n", xml_escape(description)));
            }
            xml.push_str("  </programme>\n");
        }
    }

    xml.push_str("</tv>\n");
    xml
}

/// JSON EPG payload: one entry per channel with its program list.
pub fn build_epg_json(channels: &[ChannelDefinition]) -> serde_json::Value {
    let entries: Vec<serde_json::Value> = channels
        .iter()
        .map(|channel| {
            serde_json::json!({
                "id": channel.id,
                "epg_id": epg_channel_id(channel),
                "name": channel.name,
                "group": channel.group,
                "logo": channel.logo,
                "programs": channel.next_programs,
            })
        })
        .collect();
    serde_json::Value::Array(entries)
}
