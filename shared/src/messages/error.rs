use thiserror::Error;

/// Errors that can occur while encoding or decoding wire events
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Frame exceeds the maximum accepted size (SECURITY: possible resource exhaustion)
    #[error("Frame of {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },

    /// Event could not be serialized
    #[error("Failed to encode event: {reason}")]
    EncodeFailed { reason: String },

    /// Frame is not a valid event (SECURITY: potentially malformed or malicious frame)
    #[error("Failed to decode frame of {size} bytes: {reason}")]
    DecodeFailed { size: usize, reason: String },
}
