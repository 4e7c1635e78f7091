//! HID discovery bridge
//!
//! Lets a single-threaded dynamic host describe which HID devices it cares
//! about and get called back when they attach or detach.
//!
//! - [`value`]: the host's dynamic value model
//! - [`marshal`]: conversion between host values and native objects
//! - [`manager`]: the handle owning one native manager
//! - [`callback`], [`registry`], [`context`]: moving native events from the
//!   run-loop thread to host callbacks
//! - [`bindings`]: the method table hosts call through
//!
//! # Example
//!
//! ```no_run
//! use iohid::native::HidApiBackend;
//! use iohid::{bindings, HostContext, HostFunction, HostObject};
//!
//! # async fn demo() -> iohid::Result<()> {
//! let backend = HidApiBackend::default();
//! let mut ctx = HostContext::new();
//! let mut manager = bindings::create_manager(&backend, &ctx, &[])?;
//!
//! let mut criteria = HostObject::new();
//! criteria.set("VendorID", 1452);
//! bindings::invoke(&mut manager, "setDeviceMatchingCriteria", &[criteria.into()])?;
//! bindings::invoke(
//!     &mut manager,
//!     "setDeviceMatchingCallback",
//!     &[HostFunction::new(|args| println!("attached: {:?}", args)).into()],
//! )?;
//! bindings::invoke(&mut manager, "open", &[])?;
//!
//! while let Some(dispatch) = ctx.dispatch_next().await {
//!     println!("{:?}", dispatch);
//! }
//! # Ok(())
//! # }
//! ```

pub mod bindings;
pub mod callback;
pub mod config;
pub mod context;
pub mod error;
pub mod manager;
pub mod marshal;
pub mod registry;
pub mod value;

mod event_loop;

pub use iohid_native as native;

pub use callback::EventKind;
pub use config::WatchConfig;
pub use context::{Dispatch, HostContext};
pub use error::{Error, Result};
pub use manager::Manager;
pub use marshal::{criteria_to_native, to_host, to_native, Criteria};
pub use registry::HandleToken;
pub use value::{HostFunction, HostObject, HostValue};

use iohid_native::{DeviceProperties, HidApiBackend, Matching};

/// One-shot listing of attached interfaces that satisfy `criteria`
/// (`null` lists everything)
pub fn list_devices(backend: &HidApiBackend, criteria: &HostValue) -> Result<Vec<DeviceProperties>> {
    let matching = Matching::from(criteria_to_native(criteria)?);
    let devices = backend.list_devices()?;
    Ok(devices
        .into_iter()
        .filter(|props| matching.matches(props))
        .collect())
}
