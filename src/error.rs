//! Bridge error types

use iohid_native::{IoReturn, NativeError};
use thiserror::Error;

/// Errors surfaced to host code
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to create HID manager")]
    ManagerCreationFailed,

    #[error("Failed to open HID manager: {0}")]
    ManagerOpenFailed(IoReturn),

    #[error("{method}: expected {expected} argument(s), got {actual}")]
    InvalidArgumentCount {
        method: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Unsupported value type: {0}")]
    UnsupportedValueType(String),

    #[error("No such method: {0}")]
    NoSuchMethod(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Native(#[from] NativeError),
}

pub type Result<T> = std::result::Result<T, Error>;
