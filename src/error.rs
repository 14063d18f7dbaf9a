use std::error::Error;
use std::fmt::{Display, Formatter};

/// Stable error codes surfaced across the bridge boundary.
///
/// Engine-reported conditions (permission, contention, deadlines) are
/// translated onto the same set so the remote caller only ever sees one
/// taxonomy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeErrorCode {
    InvalidArgument,
    NotFound,
    FailedPrecondition,
    Aborted,
    DeadlineExceeded,
    Unavailable,
    PermissionDenied,
    ResourceExhausted,
    Unauthenticated,
    Unsupported,
    Internal,
}

impl BridgeErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeErrorCode::InvalidArgument => "invalid-argument",
            BridgeErrorCode::NotFound => "not-found",
            BridgeErrorCode::FailedPrecondition => "failed-precondition",
            BridgeErrorCode::Aborted => "aborted",
            BridgeErrorCode::DeadlineExceeded => "deadline-exceeded",
            BridgeErrorCode::Unavailable => "unavailable",
            BridgeErrorCode::PermissionDenied => "permission-denied",
            BridgeErrorCode::ResourceExhausted => "resource-exhausted",
            BridgeErrorCode::Unauthenticated => "unauthenticated",
            BridgeErrorCode::Unsupported => "unsupported",
            BridgeErrorCode::Internal => "internal-error",
        }
    }
}

/// Structured `{code, message}` error carried by every fallible operation.
#[derive(Clone, Debug)]
pub struct BridgeError {
    pub code: BridgeErrorCode,
    message: String,
}

impl BridgeError {
    pub fn new(code: BridgeErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for BridgeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code_str())
    }
}

impl Error for BridgeError {}

pub type BridgeResult<T> = Result<T, BridgeError>;

pub fn invalid_argument(message: impl Into<String>) -> BridgeError {
    BridgeError::new(BridgeErrorCode::InvalidArgument, message)
}

pub fn not_found(message: impl Into<String>) -> BridgeError {
    BridgeError::new(BridgeErrorCode::NotFound, message)
}

pub fn failed_precondition(message: impl Into<String>) -> BridgeError {
    BridgeError::new(BridgeErrorCode::FailedPrecondition, message)
}

pub fn aborted(message: impl Into<String>) -> BridgeError {
    BridgeError::new(BridgeErrorCode::Aborted, message)
}

pub fn deadline_exceeded(message: impl Into<String>) -> BridgeError {
    BridgeError::new(BridgeErrorCode::DeadlineExceeded, message)
}

pub fn unavailable(message: impl Into<String>) -> BridgeError {
    BridgeError::new(BridgeErrorCode::Unavailable, message)
}

pub fn permission_denied(message: impl Into<String>) -> BridgeError {
    BridgeError::new(BridgeErrorCode::PermissionDenied, message)
}

pub fn resource_exhausted(message: impl Into<String>) -> BridgeError {
    BridgeError::new(BridgeErrorCode::ResourceExhausted, message)
}

pub fn unsupported(message: impl Into<String>) -> BridgeError {
    BridgeError::new(BridgeErrorCode::Unsupported, message)
}

pub fn internal_error(message: impl Into<String>) -> BridgeError {
    BridgeError::new(BridgeErrorCode::Internal, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_render_as_wire_strings() {
        assert_eq!(unsupported("nope").code_str(), "unsupported");
        assert_eq!(internal_error("boom").code_str(), "internal-error");
        assert_eq!(deadline_exceeded("late").code_str(), "deadline-exceeded");
    }

    #[test]
    fn display_includes_code_and_message() {
        let err = invalid_argument("bad path");
        assert_eq!(err.to_string(), "bad path (invalid-argument)");
    }
}
