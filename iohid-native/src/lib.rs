//! Native HID manager layer
//!
//! This crate models the native side of the bridge:
//!
//! - a reference-counted typed object model (numbers, strings, arrays,
//!   dictionaries) used for matching criteria and device properties
//! - a run loop that must be driven on some thread for callbacks to fire
//! - the [`NativeManager`] / [`HidBackend`] interface consumed by the bridge
//! - a hidapi-backed backend and a recording mock backend

pub mod device;
pub mod error;
pub mod matching;
pub mod mock;
pub mod object;
pub mod run_loop;

mod hidapi_backend;
mod manager;

pub use device::{
    keys, transport, DeviceId, DeviceProperties, HidDevice, HidDeviceRef, ManagerId,
};
pub use error::{IoReturn, NativeError};
pub use hidapi_backend::{enumerate, HidApiBackend, HidApiConfig, DEFAULT_POLL_INTERVAL};
pub use manager::{DeviceCallback, HidBackend, HidOptions, NativeManager};
pub use matching::Matching;
pub use mock::{MockBackend, MockCall};
pub use object::{CfDictionary, CfMutableArray, CfMutableDictionary, CfRef, CfType};
pub use run_loop::{RunLoop, RunLoopSource, RunResult, SourceId, DEFAULT_MODE};
