//! OCPP-J message framing
//!
//! JSON-array transport envelope shared by every message on the socket:
//!
//! - **Call**       `[2, "<uniqueId>", "<action>", {<payload>}]`
//! - **CallResult** `[3, "<uniqueId>", {<payload>}]`
//! - **CallError**  `[4, "<uniqueId>", "<errorCode>", "<errorDescription>", {<errorDetails>}]`

use serde_json::Value;
use thiserror::Error;

// ── Message-type discriminants ─────────────────────────────────

const MSG_TYPE_CALL: u64 = 2;
const MSG_TYPE_CALL_RESULT: u64 = 3;
const MSG_TYPE_CALL_ERROR: u64 = 4;

/// A decoded transport frame.
#[derive(Debug, Clone)]
pub enum Frame {
    /// `[2, uniqueId, action, payload]`
    Call {
        unique_id: String,
        action: String,
        payload: Value,
    },
    /// `[3, uniqueId, payload]`
    CallResult { unique_id: String, payload: Value },
    /// `[4, uniqueId, errorCode, errorDescription, errorDetails]`
    CallError {
        unique_id: String,
        code: String,
        description: String,
        details: Value,
    },
}

/// A frame that violates the envelope shape. Every variant is a
/// malformed-frame condition: the frame is dropped, and answered with a
/// protocol error when a unique id could still be salvaged.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("frame is not a JSON array")]
    NotAnArray,

    #[error("message type discriminant is not an integer")]
    BadDiscriminant,

    #[error("unknown message type {0}")]
    UnknownMessageType(u64),

    #[error("expected at least {expected} elements, got {got}")]
    TooFewElements { expected: usize, got: usize },

    #[error("{0} must be a string")]
    FieldType(&'static str),
}

impl Frame {
    // ── Decoding ───────────────────────────────────────────

    /// Decode raw text into a [`Frame`].
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| FrameError::InvalidJson(e.to_string()))?;
        let arr = value.as_array().ok_or(FrameError::NotAnArray)?;

        let discriminant = arr
            .first()
            .ok_or(FrameError::TooFewElements {
                expected: 3,
                got: 0,
            })?
            .as_u64()
            .ok_or(FrameError::BadDiscriminant)?;

        match discriminant {
            MSG_TYPE_CALL => Self::decode_call(arr),
            MSG_TYPE_CALL_RESULT => Self::decode_call_result(arr),
            MSG_TYPE_CALL_ERROR => Self::decode_call_error(arr),
            other => Err(FrameError::UnknownMessageType(other)),
        }
    }

    fn decode_call(arr: &[Value]) -> Result<Self, FrameError> {
        if arr.len() < 4 {
            return Err(FrameError::TooFewElements {
                expected: 4,
                got: arr.len(),
            });
        }
        Ok(Self::Call {
            unique_id: string_field(&arr[1], "uniqueId")?,
            action: string_field(&arr[2], "action")?,
            payload: arr[3].clone(),
        })
    }

    fn decode_call_result(arr: &[Value]) -> Result<Self, FrameError> {
        if arr.len() < 3 {
            return Err(FrameError::TooFewElements {
                expected: 3,
                got: arr.len(),
            });
        }
        Ok(Self::CallResult {
            unique_id: string_field(&arr[1], "uniqueId")?,
            payload: arr[2].clone(),
        })
    }

    fn decode_call_error(arr: &[Value]) -> Result<Self, FrameError> {
        if arr.len() < 4 {
            return Err(FrameError::TooFewElements {
                expected: 4,
                got: arr.len(),
            });
        }
        Ok(Self::CallError {
            unique_id: string_field(&arr[1], "uniqueId")?,
            code: string_field(&arr[2], "errorCode")?,
            description: arr[3].as_str().unwrap_or_default().to_string(),
            details: arr.get(4).cloned().unwrap_or_else(empty_object),
        })
    }

    // ── Encoding ───────────────────────────────────────────

    /// Encode this frame to wire text. Inverse of [`Frame::decode`] for
    /// well-formed values.
    pub fn encode(&self) -> String {
        let arr = match self {
            Self::Call {
                unique_id,
                action,
                payload,
            } => Value::Array(vec![
                MSG_TYPE_CALL.into(),
                Value::String(unique_id.clone()),
                Value::String(action.clone()),
                payload.clone(),
            ]),
            Self::CallResult { unique_id, payload } => Value::Array(vec![
                MSG_TYPE_CALL_RESULT.into(),
                Value::String(unique_id.clone()),
                payload.clone(),
            ]),
            Self::CallError {
                unique_id,
                code,
                description,
                details,
            } => Value::Array(vec![
                MSG_TYPE_CALL_ERROR.into(),
                Value::String(unique_id.clone()),
                Value::String(code.clone()),
                Value::String(description.clone()),
                details.clone(),
            ]),
        };

        // serializing a Value never fails
        arr.to_string()
    }

    // ── Helpers ────────────────────────────────────────────

    pub fn unique_id(&self) -> &str {
        match self {
            Self::Call { unique_id, .. }
            | Self::CallResult { unique_id, .. }
            | Self::CallError { unique_id, .. } => unique_id,
        }
    }

    /// Build a `CallError` reply for a given unique id.
    pub fn error_reply(
        unique_id: impl Into<String>,
        code: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self::CallError {
            unique_id: unique_id.into(),
            code: code.into(),
            description: description.into(),
            details: empty_object(),
        }
    }
}

/// Best-effort extraction of the unique id from a frame that failed to
/// decode, so a malformed Call can still be answered with a CallError.
pub fn salvage_unique_id(text: &str) -> Option<String> {
    let value: Value = serde_json::from_str(text).ok()?;
    value
        .as_array()?
        .get(1)?
        .as_str()
        .map(|s| s.to_string())
}

fn string_field(value: &Value, name: &'static str) -> Result<String, FrameError> {
    value
        .as_str()
        .map(|s| s.to_string())
        .ok_or(FrameError::FieldType(name))
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

// ── Tests ──────────────────────────────────────────────────────
