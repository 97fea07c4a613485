use serde::{de::DeserializeOwned, Serialize};

use crate::messages::{constants::MAX_FRAME_BYTES, error::CodecError};

/// Serializes an event into a JSON frame (no trailing delimiter)
pub fn encode<T: Serialize>(event: &T) -> Result<Vec<u8>, CodecError> {
    let bytes = serde_json::to_vec(event).map_err(|e| CodecError::EncodeFailed {
        reason: e.to_string(),
    })?;
    if bytes.len() > MAX_FRAME_BYTES {
        return Err(CodecError::FrameTooLarge {
            size: bytes.len(),
            limit: MAX_FRAME_BYTES,
        });
    }
    Ok(bytes)
}

/// Parses a JSON frame into an event
pub fn decode<T: DeserializeOwned>(frame: &[u8]) -> Result<T, CodecError> {
    if frame.len() > MAX_FRAME_BYTES {
        return Err(CodecError::FrameTooLarge {
            size: frame.len(),
            limit: MAX_FRAME_BYTES,
        });
    }
    serde_json::from_slice(frame).map_err(|e| CodecError::DecodeFailed {
        size: frame.len(),
        reason: e.to_string(),
    })
}
