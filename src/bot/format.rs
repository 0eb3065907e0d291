//! Chat message rendering.
//!
//! Builds the plain-text and HTML bodies for the bot's replies, keeping the
//! dispatcher itself free of presentation noise.

use chrono::{DateTime, Utc};

use crate::config::{ConfigKey, EffectiveConfig, Source};
use crate::core::StatusSnapshot;
use crate::health::HealthSummary;

/// Display groups in help/config order, with their keys.
pub fn groups() -> Vec<(&'static str, Vec<ConfigKey>)> {
    let mut grouped: Vec<(&'static str, Vec<ConfigKey>)> = Vec::new();
    for key in ConfigKey::ALL {
        match grouped.iter_mut().find(|(name, _)| *name == key.group()) {
            Some((_, keys)) => keys.push(key),
            None => grouped.push((key.group(), vec![key])),
        }
    }
    grouped
}

fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "Never".to_string())
}

fn format_uptime(seconds: i64) -> String {
    format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
}

/// `!status` body.
pub fn status(snapshot: &StatusSnapshot, health: &HealthSummary) -> String {
    let mut msg = format!(
        "🤖 **Slideshow Bot Status**\n\
         🏷️ **Version**: {}\n\
         ⏱️ **Uptime**: {}\n\
         ✅ **Last Success**: {}\n\
         💓 **Heartbeat Active**: {}\n\
         📅 **Next Scheduled Build**: {}\n",
        env!("CARGO_PKG_VERSION"),
        format_uptime(health.uptime_seconds),
        format_time(health.last_success),
        if health.heartbeat_active { "Yes" } else { "No" },
        format_time(snapshot.next_scheduled),
    );

    if let Some(running) = &snapshot.running {
        msg.push_str(&format!(
            "\n🚀 **Current Build**: {} ({})\n📅 **Started At**: {}\n",
            running.id,
            running.trigger,
            running.started_at.format("%H:%M:%S UTC"),
        ));
        if let Some(progress) = &snapshot.progress {
            msg.push_str(&format!("📝 **Stage**: {}", progress.stage));
            if !progress.detail.is_empty() {
                msg.push_str(&format!(" — {}", progress.detail));
            }
            msg.push('\n');

            let percent = progress.percent();
            if percent > 0 {
                let bars = usize::from(percent / 10);
                msg.push_str(&format!(
                    "📊 **Progress**: [{}{}] {}%\n",
                    "▓".repeat(bars),
                    "░".repeat(10 - bars),
                    percent,
                ));
            }
        }
    }

    if let Some(last) = &snapshot.last_build {
        match &last.outcome {
            Some(crate::domain::BuildOutcome::Success { output, .. }) => {
                msg.push_str(&format!("\n🎬 **Last Build**: success → {output}\n"));
            }
            Some(crate::domain::BuildOutcome::Failure { stage, reason }) => {
                msg.push_str(&format!("\n🎬 **Last Build**: failed at {stage}: {reason}\n"));
            }
            None => {}
        }
    }

    msg
}

/// `!get KEY` body.
pub fn single_value(key: ConfigKey, value: &str, source: Source) -> String {
    let origin = match source {
        Source::Override => "Runtime override active",
        Source::Environment => "Using environment value",
        Source::Default => "Using built-in default",
    };
    format!("📝 {key} = {value}\n({origin})")
}

/// `!get all` body: every key with its value and origin marker.
pub fn full_config(config: &EffectiveConfig) -> (String, String) {
    let mut lines = vec!["📋 **Full Configuration Status**\n".to_string()];
    let mut html = vec!["<h3>📋 Full Configuration Status</h3>".to_string()];

    for (group, keys) in groups() {
        lines.push(format!("\n**{group}**"));
        html.push(format!("<h4>{group}</h4>"));

        for key in keys {
            let (value, source) = config.entry(key);
            let shown = if value.is_empty() { "(unset)" } else { value };
            let is_override = source == Source::Override;
            let marker = if is_override { "🔹" } else { "▫️" };
            let label = if is_override { "(Override)" } else { "(Default)" };

            lines.push(format!("{marker} {key}: {shown} {label}"));
            let color = if is_override { "blue" } else { "green" };
            html.push(format!(
                "{marker} <font color='{color}'><b>{key}</b></font>: {shown} <i>{label}</i><br/>"
            ));
        }
    }

    lines.push("\n🔹 = Runtime override active".to_string());
    lines.push("▫️ = Environment/built-in value".to_string());
    html.push("<p>🔹 = Runtime override active<br/>▫️ = Environment/built-in value</p>".to_string());

    (lines.join("\n"), html.concat())
}

/// `!config` body: only the active overrides.
pub fn overrides(overrides: &[(String, String)]) -> String {
    if overrides.is_empty() {
        return "📋 **Current Configuration**\n\nNo runtime overrides active.\n\
                Use !set KEY VALUE to override a setting."
            .to_string();
    }

    let list = overrides
        .iter()
        .map(|(k, v)| format!("• {k} = {v}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "📋 **Current Configuration Overrides**\n\n{list}\n\n\
         Use !defaults to reset all to environment values."
    )
}

/// `!help` body.
pub fn help() -> (String, String) {
    let mut text = String::from(
        "🤖 **Slideshow Bot Help**\n\n\
         **🚀 Automation:**\n\
         • `!rebuild` - Trigger a manual video build\n\
         • `!status` - Show health, progress, and the last build\n\n\
         **⚙️ Configuration:**\n\
         • `!set KEY VALUE` - Override a setting\n\
         • `!get KEY` - Show the current value of a setting\n\
         • `!get all` - Show every setting and its origin\n\
         • `!config` - List active overrides\n\
         • `!defaults` - Reset all overrides\n\n\
         **❓ General:**\n\
         • `!help` - Show this message\n\n\
         **📝 Configurable Settings:**\n",
    );

    let mut html = String::from(
        "<h3>🤖 Slideshow Bot Help</h3>\
         <h4>🚀 Automation</h4><ul>\
         <li><code>!rebuild</code> - Trigger a manual video build</li>\
         <li><code>!status</code> - Show health, progress, and the last build</li></ul>\
         <h4>⚙️ Configuration</h4><ul>\
         <li><code>!set KEY VALUE</code> - Override a setting</li>\
         <li><code>!get KEY</code> - Show the current value of a setting</li>\
         <li><code>!get all</code> - Show every setting and its origin</li>\
         <li><code>!config</code> - List active overrides</li>\
         <li><code>!defaults</code> - Reset all overrides</li></ul>\
         <h4>📝 Configurable Settings</h4>",
    );

    for (group, keys) in groups() {
        let names: Vec<String> = keys.iter().map(|k| format!("`{k}`")).collect();
        text.push_str(&format!("\n**{group}**\n{}\n", names.join(", ")));

        let cells: String = keys
            .iter()
            .map(|k| format!("<code>{k}</code>"))
            .collect::<Vec<_>>()
            .join(" ");
        html.push_str(&format!("<h5>{group}</h5><p>{cells}</p>"));
    }

    (text, html)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigResolver, EnvSource, OverrideStore};

    #[test]
    fn test_groups_cover_every_key() {
        let total: usize = groups().iter().map(|(_, keys)| keys.len()).sum();
        assert_eq!(total, ConfigKey::ALL.len());
    }

    #[test]
    fn test_full_config_marks_overrides() {
        let resolver =
            ConfigResolver::new(OverrideStore::open_in_memory().unwrap(), EnvSource::default());
        resolver.set_override("IMAGE_DURATION", "15").unwrap();

        let (text, _) = full_config(&resolver.resolve_all().unwrap());
        assert!(text.contains("🔹 IMAGE_DURATION: 15 (Override)"));
        assert!(text.contains("▫️ TARGET_VIDEO_DURATION: 600 (Default)"));
    }

    #[test]
    fn test_overrides_empty_message() {
        let text = overrides(&[]);
        assert!(text.contains("No runtime overrides active"));
    }

    #[test]
    fn test_uptime_formatting() {
        assert_eq!(format_uptime(3_725), "1h 2m");
        assert_eq!(format_uptime(59), "0h 0m");
    }
}
