//! Frame codec for the two backend wire shapes.
//!
//! Stage-tagged frames look like `{"stage": "extract", "data": {...}}`, with
//! `{"stage": "error", "error": "..."}` for failures. Event-tagged frames are
//! either `{"step": "candidates", "data": {...}}` or a raw socket event
//! `["video_info", {...}]`. Both decode to the same [`InboundEvent`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::TransportVariant;
use crate::error::{TransportError, TransportResult};

pub const VIDEO_INFO: &str = "video_info";
pub const INFO: &str = "info";
pub const TRANSCRIPT: &str = "transcript";
pub const TRANSCRIPTION: &str = "transcription";
pub const EXTRACT: &str = "extract";
pub const CANDIDATES: &str = "candidates";
pub const VERIFICATION: &str = "verification";
pub const CONCLUSION: &str = "conclusion";
pub const COMPLETE: &str = "complete";
pub const ERROR: &str = "error";
/// Synthetic: the connection opened (or re-opened)
pub const CONNECT: &str = "connect";
/// Synthetic: the connection ended and will not come back by itself
pub const DISCONNECT: &str = "disconnect";
/// Client request on the event-tagged channel
pub const REQUEST_ANALYSIS: &str = "request_analysis";

/// One decoded inbound message, whatever its wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub name: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StageFrame {
    stage: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    error: Option<String>,
}

impl InboundEvent {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
            error: None,
        }
    }

    /// Synthetic `error` event carrying a message
    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            name: ERROR.to_string(),
            data: json!({ "error": message }),
            error: Some(message),
        }
    }

    pub fn is_error(&self) -> bool {
        self.name == ERROR
    }

    /// Best-effort failure text for an `error` event.
    ///
    /// Looks at the `error` field, then `data.error`, `data.message`, then a
    /// bare string payload.
    pub fn error_message(&self) -> Option<String> {
        if let Some(msg) = &self.error {
            return Some(msg.clone());
        }
        match &self.data {
            Value::String(s) => Some(s.clone()),
            Value::Object(map) => map
                .get("error")
                .or_else(|| map.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        }
        .or_else(|| self.is_error().then(|| "Unknown backend error".to_string()))
    }
}

/// Whether an event ends the wait started by a request on this variant.
pub fn is_terminal(variant: TransportVariant, name: &str) -> bool {
    match variant {
        TransportVariant::StageTagged => matches!(name, EXTRACT | COMPLETE | ERROR),
        TransportVariant::EventTagged => matches!(name, CONCLUSION | COMPLETE | ERROR),
    }
}

/// Decode one text frame.
pub fn decode(variant: TransportVariant, text: &str) -> TransportResult<InboundEvent> {
    let value: Value = serde_json::from_str(text)?;
    match variant {
        TransportVariant::StageTagged => decode_stage(value),
        TransportVariant::EventTagged => decode_event(value),
    }
}

fn decode_stage(value: Value) -> TransportResult<InboundEvent> {
    let frame: StageFrame =
        serde_json::from_value(value).map_err(|e| TransportError::Protocol {
            message: format!("stage-tagged frame: {}", e),
        })?;
    Ok(InboundEvent {
        name: frame.stage,
        data: frame.data,
        error: frame.error,
    })
}

fn decode_event(value: Value) -> TransportResult<InboundEvent> {
    match value {
        Value::Array(mut items) if !items.is_empty() => {
            let name = match items.remove(0) {
                Value::String(name) => name,
                other => {
                    return Err(TransportError::Protocol {
                        message: format!("event name must be a string, got {}", other),
                    })
                }
            };
            let data = if items.is_empty() {
                Value::Null
            } else {
                items.remove(0)
            };
            Ok(InboundEvent {
                name,
                data,
                error: None,
            })
        }
        Value::Object(mut map) => {
            let name = match map.get("step").and_then(Value::as_str) {
                Some(step) => step.to_string(),
                None => {
                    return Err(TransportError::Protocol {
                        message: "event-tagged frame without a step".to_string(),
                    })
                }
            };
            // A frame without `data` is its own payload
            let data = match map.remove("data") {
                Some(data) if !data.is_null() => data,
                _ => Value::Object(map),
            };
            Ok(InboundEvent {
                name,
                data,
                error: None,
            })
        }
        other => Err(TransportError::Protocol {
            message: format!("unrecognized event-tagged frame: {}", other),
        }),
    }
}

/// Frame that emits a named event on the event-tagged channel
pub fn event_frame(event: &str, payload: &Value) -> Value {
    json!([event, payload])
}
