//! Error types for dvrip-client.

use thiserror::Error;

/// Main error type for all DVRIP operations.
#[derive(Debug, Error)]
pub enum DvripError {
    /// I/O error during resolution, connect, read or write.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error while building a request body.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Protocol violation in the inbound byte stream (bad identification
    /// byte, oversized payload length). Escalates to a disconnect; waiting
    /// requests observe [`DvripError::Disconnected`].
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The command was issued on a connection that is not connected.
    #[error("not connected")]
    NoConnection,

    /// The connection was closed while replies were awaited.
    #[error("connection closed")]
    Disconnected,

    /// A reply parsed as JSON but lacked a field the protocol requires.
    #[error("response missing expected field `{0}`")]
    MissingField(&'static str),

    /// The device reported a non-success `Ret` code.
    #[error("device error {code}: {}", device_error_message(*.code))]
    Device {
        /// Raw `Ret` value from the reply.
        code: i64,
    },
}

/// Result type alias using DvripError.
pub type Result<T> = std::result::Result<T, DvripError>;

/// `Ret` value the devices use for success.
pub const RET_SUCCESS: i64 = 100;

/// Human-readable message for a device-reported `Ret` code.
///
/// The registry is open-ended; unknown codes get a generic message and the
/// raw integer stays available on [`DvripError::Device`].
pub fn device_error_message(code: i64) -> &'static str {
    match code {
        100 => "success",
        101 => "unknown error",
        102 => "unsupported",
        103 => "illegal request",
        104 => "user already logged in",
        105 => "user not logged in",
        106 => "bad username or password",
        107 => "no permission",
        108 => "timeout",
        109 => "search failed",
        110 => "search succeeded, returning all results",
        111 => "search succeeded, returning some results",
        112 => "user already exists",
        113 => "user does not exist",
        114 => "group already exists",
        115 => "group does not exist",
        117 => "message format error",
        118 => "PTZ protocol not set",
        119 => "no file found",
        120 => "configured to enable",
        121 => "digital channel not connected",
        150 => "succeeded, device restart required",
        202 => "user not logged in",
        607 => "configuration does not exist",
        608 => "configuration parsing error",
        _ => "unrecognized device error",
    }
}
