use thiserror::Error;

/// Everything a relay operation can fail with.
///
/// Every variant maps to a human-readable message reported back to the
/// client in a `{success: false, error}` acknowledgment; none of them is
/// fatal to the connection or the process.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("User not found")]
    UserNotFound,

    #[error("Chat not found")]
    ChatNotFound,

    /// Anonymous chat missing or past its expiry; joiners cannot tell which.
    #[error("Chat not found or expired")]
    ChatUnavailable,

    #[error("Channel not found")]
    ChannelNotFound,

    #[error("File not found or expired")]
    FileNotFound,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Invalid password")]
    InvalidPassword,

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: u64, max: u64 },

    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
