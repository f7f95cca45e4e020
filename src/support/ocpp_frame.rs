//! OCPP-J message framing
//!
//! The three envelope shapes exchanged over the WebSocket:
//!
//! - **Call**       `[2, "<uniqueId>", "<action>", {<payload>}]`
//! - **CallResult** `[3, "<uniqueId>", {<payload>}]`
//! - **CallError**  `[4, "<uniqueId>", "<errorCode>", "<errorDescription>", {<errorDetails>}]`

use std::fmt;

use serde_json::Value;
use thiserror::Error;

const MSG_TYPE_CALL: u64 = 2;
const MSG_TYPE_CALL_RESULT: u64 = 3;
const MSG_TYPE_CALL_ERROR: u64 = 4;

// ── OcppFrame ──────────────────────────────────────────────────

/// A decoded OCPP-J envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum OcppFrame {
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
        error_code: String,
        error_description: String,
        error_details: Value,
    },
}

impl OcppFrame {
    /// Decode raw frame text.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| FrameError::InvalidJson(e.to_string()))?;
        let arr = value.as_array().ok_or(FrameError::NotAnArray)?;

        if arr.len() < 3 {
            return Err(FrameError::TooShort {
                expected: 3,
                got: arr.len(),
            });
        }

        let msg_type = arr[0].as_u64().ok_or(FrameError::InvalidMessageType)?;
        if !matches!(
            msg_type,
            MSG_TYPE_CALL | MSG_TYPE_CALL_RESULT | MSG_TYPE_CALL_ERROR
        ) {
            return Err(FrameError::UnknownMessageType(msg_type));
        }

        let unique_id = arr[1]
            .as_str()
            .ok_or(FrameError::FieldTypeMismatch("uniqueId must be a string"))?
            .to_string();

        match msg_type {
            MSG_TYPE_CALL => Self::parse_call(unique_id, arr),
            MSG_TYPE_CALL_RESULT => Ok(Self::CallResult {
                unique_id,
                payload: arr[2].clone(),
            }),
            _ => Ok(Self::parse_call_error(unique_id, arr)),
        }
    }

    fn parse_call(unique_id: String, arr: &[Value]) -> Result<Self, FrameError> {
        let action = arr[2]
            .as_str()
            .ok_or(FrameError::FieldTypeMismatch("action must be a string"))?
            .to_string();

        if arr.len() < 4 {
            return Err(FrameError::TooShort {
                expected: 4,
                got: arr.len(),
            });
        }

        Ok(Self::Call {
            unique_id,
            action,
            payload: arr[3].clone(),
        })
    }

    fn parse_call_error(unique_id: String, arr: &[Value]) -> Self {
        let error_code = arr[2]
            .as_str()
            .unwrap_or(ErrorCode::GenericError.as_str())
            .to_string();
        let error_description = arr
            .get(3)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let error_details = arr.get(4).cloned().unwrap_or_else(empty_object);

        Self::CallError {
            unique_id,
            error_code,
            error_description,
            error_details,
        }
    }

    // ── Serialization ──────────────────────────────────────

    /// Encode this frame as JSON text.
    pub fn serialize(&self) -> String {
        let arr = match self {
            Self::Call {
                unique_id,
                action,
                payload,
            } => Value::Array(vec![
                Value::from(MSG_TYPE_CALL),
                Value::String(unique_id.clone()),
                Value::String(action.clone()),
                payload.clone(),
            ]),

            Self::CallResult { unique_id, payload } => Value::Array(vec![
                Value::from(MSG_TYPE_CALL_RESULT),
                Value::String(unique_id.clone()),
                payload.clone(),
            ]),

            Self::CallError {
                unique_id,
                error_code,
                error_description,
                error_details,
            } => Value::Array(vec![
                Value::from(MSG_TYPE_CALL_ERROR),
                Value::String(unique_id.clone()),
                Value::String(error_code.clone()),
                Value::String(error_description.clone()),
                error_details.clone(),
            ]),
        };

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

    /// Build the `CallResult` answering the call with `unique_id`.
    pub fn result(unique_id: impl Into<String>, payload: Value) -> Self {
        Self::CallResult {
            unique_id: unique_id.into(),
            payload,
        }
    }

    /// Build a `CallError` with empty details.
    pub fn error_response(
        unique_id: impl Into<String>,
        error_code: ErrorCode,
        error_description: impl Into<String>,
    ) -> Self {
        Self::CallError {
            unique_id: unique_id.into(),
            error_code: error_code.to_string(),
            error_description: error_description.into(),
            error_details: empty_object(),
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self, Self::Call { .. })
    }
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

// ── Error codes ────────────────────────────────────────────────

/// OCPP-J 1.6 `CallError` error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotImplemented,
    NotSupported,
    InternalError,
    ProtocolError,
    SecurityError,
    FormationViolation,
    PropertyConstraintViolation,
    OccurenceConstraintViolation,
    TypeConstraintViolation,
    GenericError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotImplemented => "NotImplemented",
            Self::NotSupported => "NotSupported",
            Self::InternalError => "InternalError",
            Self::ProtocolError => "ProtocolError",
            Self::SecurityError => "SecurityError",
            Self::FormationViolation => "FormationViolation",
            Self::PropertyConstraintViolation => "PropertyConstraintViolation",
            // spelled as in the OCPP-J 1.6 specification
            Self::OccurenceConstraintViolation => "OccurenceConstraintViolation",
            Self::TypeConstraintViolation => "TypeConstraintViolation",
            Self::GenericError => "GenericError",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Errors ─────────────────────────────────────────────────────

/// Reasons a frame is rejected as a malformed envelope.
#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("frame is not a JSON array")]
    NotAnArray,
    #[error("expected at least {expected} elements, got {got}")]
    TooShort { expected: usize, got: usize },
    #[error("message type is not a number")]
    InvalidMessageType,
    #[error("unknown message type: {0}")]
    UnknownMessageType(u64),
    #[error("field type mismatch: {0}")]
    FieldTypeMismatch(&'static str),
}
