//! Host-facing method table
//!
//! Hosts call into a manager by method name with a slice of arguments. This
//! module owns the argument-count checks and the argument coercions; the
//! [`Manager`] methods themselves are strongly typed.

use iohid_native::HidBackend;
use tracing::debug;

use crate::callback::callback_argument;
use crate::context::HostContext;
use crate::error::{Error, Result};
use crate::manager::Manager;
use crate::value::HostValue;

pub const SET_DEVICE_MATCHING_CRITERIA: &str = "setDeviceMatchingCriteria";
pub const SET_DEVICE_MATCHING_CALLBACK: &str = "setDeviceMatchingCallback";
pub const SET_DEVICE_REMOVAL_CALLBACK: &str = "setDeviceRemovalCallback";
pub const SET_CLOSE_CALLBACK: &str = "setCloseCallback";
pub const OPEN: &str = "open";
pub const CLOSE: &str = "close";
pub const IS_OPEN: &str = "isOpen";

/// Every method a manager handle exposes
pub const METHODS: &[&str] = &[
    SET_DEVICE_MATCHING_CRITERIA,
    SET_DEVICE_MATCHING_CALLBACK,
    SET_DEVICE_REMOVAL_CALLBACK,
    SET_CLOSE_CALLBACK,
    OPEN,
    CLOSE,
    IS_OPEN,
];

/// Construct a manager handle. Constructor arguments are ignored.
pub fn create_manager(
    backend: &dyn HidBackend,
    context: &HostContext,
    args: &[HostValue],
) -> Result<Manager> {
    if !args.is_empty() {
        debug!("Ignoring {} constructor argument(s)", args.len());
    }
    Manager::new(backend, context)
}

/// Call `method` on `manager`
pub fn invoke(manager: &mut Manager, method: &str, args: &[HostValue]) -> Result<HostValue> {
    match method {
        SET_DEVICE_MATCHING_CRITERIA => {
            let [criteria] = expect_args::<1>(SET_DEVICE_MATCHING_CRITERIA, args)?;
            manager.set_device_matching_criteria(criteria)?;
        }
        SET_DEVICE_MATCHING_CALLBACK => {
            let [callback] = expect_args::<1>(SET_DEVICE_MATCHING_CALLBACK, args)?;
            let callback = callback_argument(SET_DEVICE_MATCHING_CALLBACK, callback)?;
            manager.set_device_matching_callback(callback);
        }
        SET_DEVICE_REMOVAL_CALLBACK => {
            let [callback] = expect_args::<1>(SET_DEVICE_REMOVAL_CALLBACK, args)?;
            let callback = callback_argument(SET_DEVICE_REMOVAL_CALLBACK, callback)?;
            manager.set_device_removal_callback(callback);
        }
        SET_CLOSE_CALLBACK => {
            let [callback] = expect_args::<1>(SET_CLOSE_CALLBACK, args)?;
            let callback = callback_argument(SET_CLOSE_CALLBACK, callback)?;
            manager.set_close_callback(callback);
        }
        OPEN => {
            expect_args::<0>(OPEN, args)?;
            manager.open()?;
        }
        CLOSE => {
            expect_args::<0>(CLOSE, args)?;
            manager.close();
        }
        IS_OPEN => {
            expect_args::<0>(IS_OPEN, args)?;
            return Ok(HostValue::Bool(manager.is_open()));
        }
        other => return Err(Error::NoSuchMethod(other.to_owned())),
    }
    Ok(HostValue::Undefined)
}

fn expect_args<'a, const N: usize>(
    method: &'static str,
    args: &'a [HostValue],
) -> Result<&'a [HostValue; N]> {
    <&[HostValue; N]>::try_from(args).map_err(|_| Error::InvalidArgumentCount {
        method,
        expected: N,
        actual: args.len(),
    })
}
