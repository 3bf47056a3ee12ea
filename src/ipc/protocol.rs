//! JSON message protocol spoken with the peer process.
//!
//! Every message is one JSON object with `action`, `command` and `message`
//! fields:
//!
//! ```text
//! → {"action":"started","command":"status","message":<unix ms>}     handshake
//! ← {"command":"status","action":"active"}                           keep-alive query
//! → {"action":"alive","command":"status","message":<unix ms>}       keep-alive reply
//! ← {"command":"sample","action":"process","message":{...}}          sample
//! ```

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};

/// Outbound status message (handshake and keep-alive reply).
#[derive(Debug, Clone, Serialize)]
pub struct StatusMessage {
    pub action: &'static str,
    pub command: &'static str,
    /// Unix time in milliseconds
    pub message: f64,
}

impl StatusMessage {
    /// Handshake announcing readiness, sent once on connect.
    pub fn started() -> Self {
        Self {
            action: "started",
            command: "status",
            message: unix_millis(),
        }
    }

    /// Reply to a keep-alive query.
    pub fn alive() -> Self {
        Self {
            action: "alive",
            command: "status",
            message: unix_millis(),
        }
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}

/// Current wall-clock time as fractional Unix milliseconds.
pub fn unix_millis() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1000.0
}

/// Classified inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// `status` / `active`
    StatusQuery,
    /// `sample` / `process`, carrying the raw `message` payload
    Sample(Value),
    /// Anything else; ignored by the ingestion loop
    Other {
        command: Option<String>,
        action: Option<String>,
    },
}

/// Decode and classify one inbound message.
pub fn decode(text: &str) -> Result<Inbound, ProtocolError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    let Value::Object(mut fields) = value else {
        return Err(ProtocolError::NotAnObject);
    };

    let command = string_field(&fields, "command");
    let action = string_field(&fields, "action");

    let inbound = match (command.as_deref(), action.as_deref()) {
        (Some("status"), Some("active")) => Inbound::StatusQuery,
        (Some("sample"), Some("process")) => {
            Inbound::Sample(fields.remove("message").unwrap_or(Value::Null))
        }
        _ => Inbound::Other { command, action },
    };

    Ok(inbound)
}

fn string_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields.get(key).and_then(Value::as_str).map(str::to_owned)
}

/// Build a sample message, as the peer sends it.
pub fn sample_message(sample_number: i64, channel_data: &[f64], timestamp: f64) -> String {
    serde_json::json!({
        "command": "sample",
        "action": "process",
        "message": {
            "channelData": channel_data,
            "sampleNumber": sample_number,
            "timeStamp": timestamp,
        }
    })
    .to_string()
}

/// Build a keep-alive query, as the peer sends it.
pub fn status_query() -> String {
    serde_json::json!({ "command": "status", "action": "active" }).to_string()
}

/// Protocol-level errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolError {
    Malformed(String),
    NotAnObject,
    Encode(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::Malformed(e) => write!(f, "Malformed message: {e}"),
            ProtocolError::NotAnObject => write!(f, "Message is not a JSON object"),
            ProtocolError::Encode(e) => write!(f, "Could not encode message: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}
