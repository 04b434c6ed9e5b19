use crate::protocol::{CertificateError, RejectionInfo, TransportError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error as ThisError;

///
/// CallFailure
///
/// Every failure a call can surface, as one inspectable type:
/// - pre-call argument validation,
/// - transport/agent/protocol faults (including rejections),
/// - typed business errors unwrapped from a method's `Err` arm.
///
/// Callers branch on the variant instead of parsing messages.
///

#[remain::sorted]
#[derive(Debug, ThisError)]
pub enum CallFailure {
    #[error(transparent)]
    Call(#[from] CallError),
    #[error(transparent)]
    Canister(#[from] CanisterError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl CallFailure {
    #[must_use]
    pub const fn is_call(&self) -> bool {
        matches!(self, Self::Call(_))
    }

    #[must_use]
    pub const fn is_canister(&self) -> bool {
        matches!(self, Self::Canister(_))
    }

    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    #[must_use]
    pub const fn as_call(&self) -> Option<&CallError> {
        match self {
            Self::Call(err) => Some(err),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_canister(&self) -> Option<&CanisterError> {
        match self {
            Self::Canister(err) => Some(err),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

///
/// CallError
///
/// Transport/agent/protocol-level failure for one call. The method name is
/// always attached so the failure is diagnosable without outer context.
///

#[derive(Debug, ThisError)]
#[error("failed to call method {method:?}: {kind}")]
pub struct CallError {
    pub method: String,
    #[source]
    pub kind: CallErrorKind,
}

impl CallError {
    pub(crate) fn new(method: impl Into<String>, kind: CallErrorKind) -> Self {
        Self {
            method: method.into(),
            kind,
        }
    }

    /// The rejection details, when the canister or subnet rejected the call.
    #[must_use]
    pub const fn rejection(&self) -> Option<&RejectionInfo> {
        match &self.kind {
            CallErrorKind::Rejected(info) => Some(info),
            _ => None,
        }
    }
}

///
/// CallErrorKind
///

#[remain::sorted]
#[derive(Debug, ThisError)]
pub enum CallErrorKind {
    #[error("candid serialization failed: {0}")]
    Candid(#[from] candid::Error),

    #[error(transparent)]
    Certificate(#[from] CertificateError),

    #[error("expected {expected} argument(s), got {got}")]
    InvalidArity { expected: usize, got: usize },

    #[error("method not found")]
    MethodNotFound,

    #[error("no root key available to verify a certified response")]
    MissingRootKey,

    #[error(
        "no reply after {attempts} poll attempt(s) over {elapsed_ms}ms (last status: {last_status})"
    )]
    PollingExceeded {
        attempts: u32,
        elapsed_ms: u64,
        last_status: String,
    },

    #[error("{0}")]
    Rejected(RejectionInfo),

    #[error("request is marked done; the reply is no longer available")]
    StatusDoneNoReply,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("unexpected response shape: {0}")]
    UnexpectedResponse(String),
}

///
/// CanisterError
///
/// Typed business error carried by a method's `Err` arm. `err` holds the raw
/// display-shaped payload; `code`, `message` and `details` are extracted from
/// it when the payload follows the common API error conventions.
///

#[derive(Clone, Debug, ThisError)]
#[error("{message}")]
pub struct CanisterError {
    /// Error code taken from a `code` field, a variant discriminant, or
    /// [`Self::UNKNOWN_CODE`].
    pub code: String,
    pub message: String,
    pub details: Option<Value>,
    /// The unmodified `Err` payload.
    pub err: Value,
}

impl CanisterError {
    pub const UNKNOWN_CODE: &'static str = "UNKNOWN_ERROR";

    /// Classify a display-shaped failure payload.
    ///
    /// Precedence: a string `code` field (message/details verbatim), then a
    /// `_type` discriminant, then a single-key object, then
    /// [`Self::UNKNOWN_CODE`] with a serialized payload as the message.
    #[must_use]
    pub fn from_payload(err: Value) -> Self {
        let mut code = None;
        let mut message = None;
        let mut details = None;
        let mut api_shape = false;

        if let Value::Object(map) = &err {
            if let Some(Value::String(c)) = map.get("code") {
                code = Some(c.clone());
                api_shape = true;
                if let Some(Value::String(m)) = map.get("message") {
                    message = Some(m.clone());
                }
                details = map.get("details").filter(|v| !v.is_null()).cloned();
            } else if let Some(Value::String(t)) = map.get("_type") {
                code = Some(t.clone());
            } else if map.len() == 1 {
                code = map.keys().next().cloned();
            }
        }

        let rendered = message.unwrap_or_else(|| render_payload(&err));
        let message = if api_shape {
            rendered
        } else {
            format!("Canister Error: {rendered}")
        };

        Self {
            code: code.unwrap_or_else(|| Self::UNKNOWN_CODE.to_string()),
            message,
            details,
            err,
        }
    }
}

/// Stable rendering of a payload for error messages. Scalars print bare,
/// compound values pretty-print; large integers already arrive as decimal
/// strings on the display side.
fn render_payload(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

///
/// ValidationError
///
/// Raised by a caller-supplied validator before any transform or network
/// activity happens.
///

#[derive(Clone, Debug, ThisError)]
#[error("validation failed for method {method:?}: {}", join_messages(.issues))]
pub struct ValidationError {
    pub method: String,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    #[must_use]
    pub fn new(method: impl Into<String>, issues: Vec<ValidationIssue>) -> Self {
        Self {
            method: method.into(),
            issues,
        }
    }

    /// All issues touching the given path segment.
    #[must_use]
    pub fn issues_at(&self, segment: &PathSegment) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|issue| issue.path.contains(segment))
            .collect()
    }

    #[must_use]
    pub fn has_issue_at(&self, segment: &PathSegment) -> bool {
        self.issues.iter().any(|issue| issue.path.contains(segment))
    }
}

fn join_messages(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|issue| issue.message.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

///
/// ValidationIssue
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ValidationIssue {
    /// Path to the offending field, e.g. `["to", "owner"]` or `["items", 2]`.
    pub path: Vec<PathSegment>,
    pub message: String,
    /// Machine-readable code such as `required` or `min_length`.
    pub code: Option<String>,
}

impl ValidationIssue {
    #[must_use]
    pub fn new(path: Vec<PathSegment>, message: impl Into<String>) -> Self {
        Self {
            path,
            message: message.into(),
            code: None,
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

///
/// PathSegment
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

impl std::fmt::Display for PathSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index(i) => write!(f, "[{i}]"),
            Self::Key(k) => write!(f, "{k}"),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

///
/// TESTS
///
