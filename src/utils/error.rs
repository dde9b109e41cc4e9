//! Error types for hwvideo-bridge
//!
//! Every public operation reports failure as an explicit value. Library code
//! returns [`BridgeError`] through the crate [`Result`] alias; the C ABI maps
//! it onto [`ErrorCode`].

use crate::player::PlayerId;
use thiserror::Error;

/// Main error type for hwvideo-bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The id does not name a live player
    #[error("Unknown player: {0}")]
    UnknownPlayer(PlayerId),

    /// The decoder failed to open or parse the source
    #[error("Source error: {0}")]
    SourceError(String),

    /// The operation needs a source that has not been set
    #[error("No source set")]
    NoSource,

    /// Out-of-range numeric input
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Handle resolution received a null or invalidated frame object
    #[error("Invalid frame object: {0}")]
    InvalidFrameObject(String),

    /// No process-wide registry has been installed for the C ABI
    #[error("No player registry installed")]
    NotInitialized,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File error: {0}")]
    FileIO(#[from] std::io::Error),

    /// Generic error for unexpected situations
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::ffi::NulError> for BridgeError {
    fn from(err: std::ffi::NulError) -> Self {
        BridgeError::InvalidArgument(format!("FFI string error: {}", err))
    }
}

impl From<std::str::Utf8Error> for BridgeError {
    fn from(err: std::str::Utf8Error) -> Self {
        BridgeError::InvalidArgument(format!("FFI string is not UTF-8: {}", err))
    }
}

impl BridgeError {
    /// Create a source error from string
    pub fn source_error<S: Into<String>>(msg: S) -> Self {
        BridgeError::SourceError(msg.into())
    }

    /// Create an invalid argument error from string
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        BridgeError::InvalidArgument(msg.into())
    }

    /// Stable numeric code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            BridgeError::UnknownPlayer(_) => ErrorCode::UnknownPlayer,
            BridgeError::SourceError(_) => ErrorCode::SourceError,
            BridgeError::NoSource => ErrorCode::NoSource,
            BridgeError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            BridgeError::InvalidFrameObject(_) => ErrorCode::InvalidFrameObject,
            BridgeError::NotInitialized => ErrorCode::NotInitialized,
            BridgeError::Config(_) | BridgeError::FileIO(_) | BridgeError::Internal(_) => {
                ErrorCode::Internal
            }
        }
    }
}

/// Error codes returned across the C ABI
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Ok = 0,
    UnknownPlayer = 1,
    SourceError = 2,
    NoSource = 3,
    InvalidArgument = 4,
    InvalidFrameObject = 5,
    Internal = 6,
    NotInitialized = 7,
}

impl ErrorCode {
    /// Convert to the raw i32 for FFI return
    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

impl<T> From<&Result<T>> for ErrorCode {
    fn from(result: &Result<T>) -> Self {
        match result {
            Ok(_) => ErrorCode::Ok,
            Err(e) => e.code(),
        }
    }
}

/// Convenience type alias for Results in hwvideo-bridge
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Extension trait for converting other errors to BridgeError
pub trait IntoBridgeError<T> {
    /// Convert this error into a BridgeError with the given context
    fn source_err(self, context: &str) -> Result<T>;
    fn config_err(self, context: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> IntoBridgeError<T> for std::result::Result<T, E> {
    fn source_err(self, context: &str) -> Result<T> {
        self.map_err(|e| BridgeError::SourceError(format!("{}: {}", context, e)))
    }

    fn config_err(self, context: &str) -> Result<T> {
        self.map_err(|e| BridgeError::Config(format!("{}: {}", context, e)))
    }
}

/// Helper macro for creating internal errors with file and line information
#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::utils::error::BridgeError::Internal(
            format!("{} at {}:{}", $msg, file!(), line!())
        )
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::utils::error::BridgeError::Internal(
            format!("{} at {}:{}", format!($fmt, $($arg)*), file!(), line!())
        )
    };
}
