//! Output formatting: plain text or JSON, selected by `--output`.

use std::io::{self, Write};

use serde::Serialize;
use videoos_core::{EventKey, FeedbackEvent, FeedbackValue, SystemMode};

use crate::cli::OutputFormat;
use crate::error::CliError;

/// Render a single item: `detail_fn` for plain text, serde for JSON.
pub fn render_single<T: Serialize>(
    format: OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
) -> Result<String, CliError> {
    match format {
        OutputFormat::Plain => Ok(detail_fn(data)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(data)?),
    }
}

pub fn print_output(output: &str) {
    if output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

pub fn mode_detail(mode: &SystemMode) -> String {
    format!(
        "device mode: {}\npersona:     {}\napp:         {}{}\nmode:        {}\neco mode:    {}",
        if mode.device_mode_enabled() { "on" } else { "off" },
        mode.active_persona,
        mode.app,
        if mode.app_locked { " (locked)" } else { "" },
        mode.mode,
        mode.eco_mode,
    )
}

// ── Events ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct EventLine<'a> {
    key: EventKey,
    tag: u16,
    value: &'a FeedbackValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous: Option<&'a FeedbackValue>,
    initial: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
}

/// One line per event, for `watch`.
pub fn event_line(format: OutputFormat, event: &FeedbackEvent) -> Result<String, CliError> {
    match format {
        OutputFormat::Plain => Ok(plain_event(event)),
        OutputFormat::Json => Ok(serde_json::to_string(&EventLine {
            key: event.key,
            tag: event.key.tag(),
            value: &event.value,
            previous: event.previous_value.as_ref(),
            initial: event.initial,
            state: event.label(),
            session_id: event.session_id.as_deref(),
        })?),
    }
}

fn plain_event(event: &FeedbackEvent) -> String {
    let was = event
        .previous_value
        .as_ref()
        .map_or_else(String::new, |previous| format!(", was {previous}"));
    match event.key {
        EventKey::SessionState => format!(
            "session      {} ({}{was})",
            event.label().unwrap_or("unknown"),
            event.value
        ),
        EventKey::DeviceMode => format!(
            "device-mode  {} ({}{was})",
            if event.value.as_integer() == Some(1) { "on" } else { "off" },
            event.value
        ),
        EventKey::Error if event.is_error() => format!("error        {}", event.value),
        EventKey::Error => "error        (cleared)".to_owned(),
    }
}
