//! Native layer error and result-code types

use thiserror::Error;

/// Errors raised by the native layer outside the manager's result codes
#[derive(Error, Debug)]
pub enum NativeError {
    #[error("HID error: {0}")]
    Hid(String),

    #[error("HID permission denied: {0}")]
    HidPermissionDenied(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<hidapi::HidError> for NativeError {
    fn from(e: hidapi::HidError) -> Self {
        let msg = e.to_string();
        if msg.contains("Permission denied") || msg.contains("EPERM") {
            NativeError::HidPermissionDenied(msg)
        } else {
            NativeError::Hid(msg)
        }
    }
}

/// Result code reported by native manager calls and passed to device callbacks.
///
/// Numeric values follow the platform's `kIOReturn*` constants so codes handed
/// to the host are the ones native tooling prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoReturn {
    Success,
    Error,
    NoDevice,
    NotPrivileged,
    ExclusiveAccess,
    Unsupported,
    NotOpen,
    Other(u32),
}

impl IoReturn {
    pub fn code(self) -> u32 {
        match self {
            IoReturn::Success => 0,
            IoReturn::Error => 0xE000_02BC,
            IoReturn::NoDevice => 0xE000_02C0,
            IoReturn::NotPrivileged => 0xE000_02C1,
            IoReturn::ExclusiveAccess => 0xE000_02C5,
            IoReturn::Unsupported => 0xE000_02C7,
            IoReturn::NotOpen => 0xE000_02CD,
            IoReturn::Other(code) => code,
        }
    }

    pub fn from_code(code: u32) -> Self {
        match code {
            0 => IoReturn::Success,
            0xE000_02BC => IoReturn::Error,
            0xE000_02C0 => IoReturn::NoDevice,
            0xE000_02C1 => IoReturn::NotPrivileged,
            0xE000_02C5 => IoReturn::ExclusiveAccess,
            0xE000_02C7 => IoReturn::Unsupported,
            0xE000_02CD => IoReturn::NotOpen,
            other => IoReturn::Other(other),
        }
    }

    #[inline]
    pub fn is_success(self) -> bool {
        self == IoReturn::Success
    }
}

impl std::fmt::Display for IoReturn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} (0x{:08X})", self, self.code())
    }
}

impl From<&NativeError> for IoReturn {
    fn from(e: &NativeError) -> Self {
        match e {
            NativeError::HidPermissionDenied(_) => IoReturn::NotPrivileged,
            NativeError::Hid(_) | NativeError::Internal(_) => IoReturn::Error,
        }
    }
}
