//! Messages pushed by the Helix WebSocket endpoint.
//!
//! Every frame is a JSON object of the shape
//! `{ "event": "...", "timestamp": "...", ...payload }`. [`InboundMessage`]
//! keeps the decoded value as-is; [`HelixEvent`] is a typed view over the
//! event kinds the service is known to emit.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{HelixError, Result};

/// Event name used when a frame carries no `event` field.
pub const UNKNOWN_EVENT: &str = "unknown";

/// Harmony below this value is reported as critical.
pub const CRITICAL_HARMONY: f64 = 0.40;

/// A decoded inbound frame. Transient: handed to one handler, then dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub event: String,
    pub timestamp: Option<String>,
    /// The full decoded JSON value, including `event` and `timestamp`.
    pub payload: Value,
}

impl InboundMessage {
    /// Decode a raw text or binary frame.
    ///
    /// # Errors
    /// Returns [`HelixError::Decode`] when the bytes are not valid JSON.
    pub fn decode(raw: &[u8]) -> Result<Self> {
        let payload: Value = serde_json::from_slice(raw)?;
        Ok(Self::from_value(payload))
    }

    /// Wrap an already-decoded value. Non-object values get the `unknown` event.
    pub fn from_value(payload: Value) -> Self {
        let event = payload
            .get("event")
            .and_then(Value::as_str)
            .unwrap_or(UNKNOWN_EVENT)
            .to_string();
        let timestamp = payload
            .get("timestamp")
            .and_then(Value::as_str)
            .map(str::to_string);
        Self { event, timestamp, payload }
    }

    /// Typed view of the payload.
    ///
    /// # Errors
    /// Returns [`HelixError::Json`] when a recognised event is missing a
    /// required field.
    pub fn typed(&self) -> Result<HelixEvent> {
        HelixEvent::from_message(self)
    }
}

/// Universal Coherence Field metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UcfMetrics {
    pub harmony: f64,
    pub resilience: f64,
    pub prana: f64,
    pub drishti: f64,
    pub klesha: f64,
    pub zoom: f64,
}

impl UcfMetrics {
    pub fn is_harmony_critical(&self) -> bool {
        self.harmony < CRITICAL_HARMONY
    }
}

/// Periodic `ucf_update` push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UcfUpdate {
    pub ucf: UcfMetrics,
    #[serde(default = "unknown_phase")]
    pub phase: String,
}

fn unknown_phase() -> String {
    "UNKNOWN".to_string()
}

/// `agent_state_change` push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStateChange {
    #[serde(default = "unknown_agent")]
    pub agent: String,
    #[serde(default = "unknown_status")]
    pub old_status: String,
    #[serde(default = "unknown_status")]
    pub new_status: String,
}

fn unknown_agent() -> String {
    "Unknown".to_string()
}

fn unknown_status() -> String {
    "unknown".to_string()
}

/// Body of a `ritual_completion` push. Both fields may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RitualInfo {
    #[serde(default)]
    pub steps: Option<u64>,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RitualCompletion {
    #[serde(default)]
    pub ritual: RitualInfo,
}

/// Severity-tagged `alert` push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(default = "default_severity")]
    pub severity: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_action: Option<String>,
}

fn default_severity() -> String {
    "info".to_string()
}

/// Typed view of an [`InboundMessage`].
#[derive(Debug, Clone, PartialEq)]
pub enum HelixEvent {
    UcfUpdate(UcfUpdate),
    AgentStateChange(AgentStateChange),
    RitualCompletion(RitualCompletion),
    Alert(Alert),
    /// Any event name this crate does not model.
    Other(String),
}

impl HelixEvent {
    pub const UCF_UPDATE: &'static str = "ucf_update";
    pub const AGENT_STATE_CHANGE: &'static str = "agent_state_change";
    pub const RITUAL_COMPLETION: &'static str = "ritual_completion";
    pub const ALERT: &'static str = "alert";

    fn from_message(msg: &InboundMessage) -> Result<Self> {
        let event = match msg.event.as_str() {
            Self::UCF_UPDATE => HelixEvent::UcfUpdate(parse(msg)?),
            Self::AGENT_STATE_CHANGE => HelixEvent::AgentStateChange(parse(msg)?),
            Self::RITUAL_COMPLETION => HelixEvent::RitualCompletion(parse(msg)?),
            Self::ALERT => HelixEvent::Alert(parse(msg)?),
            other => HelixEvent::Other(other.to_string()),
        };
        Ok(event)
    }

    /// Wire name of the event.
    pub fn name(&self) -> &str {
        match self {
            HelixEvent::UcfUpdate(_) => Self::UCF_UPDATE,
            HelixEvent::AgentStateChange(_) => Self::AGENT_STATE_CHANGE,
            HelixEvent::RitualCompletion(_) => Self::RITUAL_COMPLETION,
            HelixEvent::Alert(_) => Self::ALERT,
            HelixEvent::Other(name) => name,
        }
    }
}

fn parse<T: for<'de> Deserialize<'de>>(msg: &InboundMessage) -> Result<T> {
    T::deserialize(&msg.payload).map_err(|e| HelixError::Json {
        field: msg.event.clone(),
        detail: e.to_string(),
    })
}
