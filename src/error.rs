use serde::Serialize;

/// Errors surfaced to an HTTP client as a JSON error body.
///
/// Anything that can legitimately happen while handling a request gets a
/// variant here; anything that "should never happen" is handled by
/// returning a generic 500 at the call site rather than by adding a variant.
#[derive(Debug, thiserror::Error)]
pub enum WafError {
    #[error("request body exceeds the {0}-byte limit")]
    BodyTooLarge(usize),

    #[error("chunked transfer encoding is not supported")]
    ChunkedNotSupported,

    #[error("failed to read request body: {0}")]
    BodyReadFailed(String),
}

impl WafError {
    pub fn status(&self) -> hyper::StatusCode {
        match self {
            WafError::BodyTooLarge(_) => hyper::StatusCode::PAYLOAD_TOO_LARGE,
            WafError::ChunkedNotSupported => hyper::StatusCode::LENGTH_REQUIRED,
            WafError::BodyReadFailed(_) => hyper::StatusCode::BAD_REQUEST,
        }
    }
}

/// `{"error": "<message>", "status": <code>}` per the external interface contract.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub status: u16,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>, status: hyper::StatusCode) -> Self {
        Self {
            error: message.into(),
            status: status.as_u16(),
        }
    }
}

impl From<&WafError> for ErrorBody {
    fn from(err: &WafError) -> Self {
        ErrorBody::new(err.to_string(), err.status())
    }
}
