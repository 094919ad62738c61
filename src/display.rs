//! Console rendering of pushed events and REST results.
//!
//! Every function returns a `String` so the output can be asserted on; the
//! binary prints it.

use colored::*;
use serde_json::Value;

use crate::events::{AgentStateChange, Alert, HelixEvent, InboundMessage, RitualCompletion, UcfUpdate};

pub const BANNER_WIDTH: usize = 60;

/// `====` / title / `====` block.
pub fn banner(title: &str) -> String {
    let rule = "=".repeat(BANNER_WIDTH);
    format!("{rule}\n{}\n{rule}", title.bold())
}

/// Upper-case the first character.
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn format_ucf_update(timestamp: &str, update: &UcfUpdate) -> String {
    let ucf = &update.ucf;
    let mut out = format!(
        "[{timestamp}] {} (Phase: {})\n",
        "UCF Update".bright_cyan().bold(),
        update.phase
    );
    out.push_str(&format!("  Harmony:    {:.3}\n", ucf.harmony));
    out.push_str(&format!("  Resilience: {:.3}\n", ucf.resilience));
    out.push_str(&format!("  Prana:      {:.3}\n", ucf.prana));
    out.push_str(&format!("  Drishti:    {:.3}\n", ucf.drishti));
    out.push_str(&format!("  Klesha:     {:.3}\n", ucf.klesha));
    out.push_str(&format!("  Zoom:       {:.3}", ucf.zoom));
    if ucf.is_harmony_critical() {
        out.push_str(&format!("\n  {}", "WARNING: Harmony critical!".bright_red().bold()));
    }
    out
}

pub fn format_agent_state_change(timestamp: &str, change: &AgentStateChange) -> String {
    format!(
        "[{timestamp}] {}\n  Agent: {}\n  {} -> {}",
        "Agent State Change".bright_magenta().bold(),
        change.agent,
        change.old_status,
        change.new_status
    )
}

pub fn format_ritual_completion(timestamp: &str, done: &RitualCompletion) -> String {
    let steps = done
        .ritual
        .steps
        .map(|s| s.to_string())
        .unwrap_or_else(|| "?".to_string());
    let duration = done
        .ritual
        .duration_seconds
        .map(|d| d.to_string())
        .unwrap_or_else(|| "?".to_string());
    format!(
        "[{timestamp}] {}\n  Steps: {steps}\n  Duration: {duration}s",
        "Ritual Completed".bright_green().bold()
    )
}

pub fn format_alert(timestamp: &str, alert: &Alert) -> String {
    let mut out = format!(
        "[{timestamp}] {} ({})\n  {}",
        "Alert".bright_red().bold(),
        alert.severity.to_uppercase(),
        alert.message
    );
    if let Some(action) = alert.recommended_action.as_deref().filter(|a| !a.is_empty()) {
        out.push_str(&format!("\n  Recommended: {action}"));
    }
    out
}

pub fn format_unknown(timestamp: &str, message: &InboundMessage) -> String {
    format!(
        "[{timestamp}] Unknown event: {}\n  Data: {}",
        message.event, message.payload
    )
}

/// Render any inbound message. Malformed known events fall back to the raw
/// rendering.
pub fn format_event(message: &InboundMessage) -> String {
    let ts = message.timestamp.as_deref().unwrap_or("-");
    match message.typed() {
        Ok(HelixEvent::UcfUpdate(u)) => format_ucf_update(ts, &u),
        Ok(HelixEvent::AgentStateChange(c)) => format_agent_state_change(ts, &c),
        Ok(HelixEvent::RitualCompletion(r)) => format_ritual_completion(ts, &r),
        Ok(HelixEvent::Alert(a)) => format_alert(ts, &a),
        Ok(HelixEvent::Other(_)) | Err(_) => format_unknown(ts, message),
    }
}

/// One line per numeric field of a UCF response, in key order.
pub fn format_metrics(ucf: &Value) -> String {
    let Some(map) = ucf.as_object() else {
        return String::new();
    };
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    keys.into_iter()
        .filter_map(|k| map[k].as_f64().map(|v| format!("   {}: {v:.3}", capitalize(k))))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Number formatted with three decimals, or `?` when absent.
pub fn fmt3(v: &Value) -> String {
    v.as_f64()
        .map(|f| format!("{f:.3}"))
        .unwrap_or_else(|| "?".to_string())
}

/// String field, or `fallback` when absent.
pub fn text<'a>(v: &'a Value, fallback: &'a str) -> &'a str {
    v.as_str().unwrap_or(fallback)
}
