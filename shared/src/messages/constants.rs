// Frame size limits

/// Largest encoded event accepted from or sent to the wire. Embeddings of a
/// few thousand dimensions fit comfortably; anything larger is rejected
/// before parsing.
pub const MAX_FRAME_BYTES: usize = 256 * 1024;
