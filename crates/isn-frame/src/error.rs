use isn_layer::LayerError;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The length field does not belong to the configured mode or has too
    /// many continuation bytes.
    #[error("malformed length field (0x{byte:02x})")]
    MalformedLength { byte: u8 },

    /// The check byte following the length field does not match.
    #[error("length check mismatch (expected 0x{expected:02x}, found 0x{found:02x})")]
    LengthCheck { expected: u8, found: u8 },

    /// The frame body exceeds the configured maximum size.
    #[error("frame too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Frames carry at least a protocol tag.
    #[error("frame body is empty")]
    EmptyBody,

    /// The trailing checksum does not match the frame contents.
    #[error("checksum mismatch (expected 0x{expected:04x}, found 0x{found:04x})")]
    ChecksumMismatch { expected: u16, found: u16 },

    /// The frame configuration is out of range.
    #[error("invalid frame configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Linking the frame layer into a stack failed.
    #[error(transparent)]
    Layer(#[from] LayerError),
}

pub type Result<T> = std::result::Result<T, FrameError>;
