//! Protocol-level error types.

/// Errors raised while encoding, decoding, or framing protocol messages.
///
/// Any of these terminates the owning session only; the daemon keeps
/// running.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A frame's declared or actual size exceeds the frame cap.
    #[error("frame too large: {size} bytes (limit: {limit} bytes)")]
    FrameTooLarge {
        /// Declared or actual frame size.
        size: usize,
        /// The frame cap, [`crate::MAX_FRAME_SIZE`].
        limit: usize,
    },

    /// Message serialization failed.
    #[error("message encoding failed: {0}")]
    Encode(serde_json::Error),

    /// Message deserialization failed.
    #[error("message decoding failed: {0}")]
    Decode(serde_json::Error),

    /// Underlying stream I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
