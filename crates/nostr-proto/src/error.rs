use thiserror::Error;

/// Errors produced while decoding or encoding protocol data.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message must be a JSON array with a string tag")]
    NotAnArray,

    #[error("missing element: {0}")]
    MissingElement(&'static str),

    #[error("invalid field: {0}")]
    InvalidField(&'static str),

    #[error("invalid hex in {field}: expected {expected} bytes")]
    InvalidHex {
        field: &'static str,
        expected: usize,
    },

    #[error("serialized frame exceeds {max} bytes (got {got})")]
    FrameTooLarge { max: usize, got: usize },
}
