//! hidapi-backed native layer
//!
//! hidapi has no attach/detach notifications of its own, so the manager
//! schedules a polling source on its run loop: every `poll_interval` it
//! re-enumerates HID interfaces and diffs the result against the previous
//! snapshot, feeding additions and removals into the manager.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hidapi::HidApi;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::device::{transport, DeviceId, DeviceProperties, HidDevice, HidDeviceRef, ManagerId};
use crate::error::{IoReturn, NativeError};
use crate::manager::{
    matching_from, DeviceCallback, HidBackend, HidOptions, ManagerCore, NativeManager,
};
use crate::object::CfRef;
use crate::run_loop::{RunLoop, RunLoopSource, SourceId};

/// Default re-enumeration interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Configuration for [`HidApiBackend`]
#[derive(Debug, Clone)]
pub struct HidApiConfig {
    /// How often attached devices are re-enumerated
    pub poll_interval: Duration,
}

impl Default for HidApiConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Map the hidapi bus type to a transport name
fn transport_name(bus: hidapi::BusType) -> Option<&'static str> {
    match bus {
        hidapi::BusType::Usb => Some(transport::USB),
        hidapi::BusType::Bluetooth => Some(transport::BLUETOOTH),
        hidapi::BusType::I2c => Some(transport::I2C),
        hidapi::BusType::Spi => Some(transport::SPI),
        _ => None,
    }
}

fn properties_of(info: &hidapi::DeviceInfo) -> DeviceProperties {
    DeviceProperties {
        vendor_id: info.vendor_id(),
        product_id: info.product_id(),
        version_number: info.release_number(),
        manufacturer: info.manufacturer_string().map(|s| s.to_string()),
        product: info.product_string().map(|s| s.to_string()),
        serial_number: info.serial_number().map(|s| s.to_string()),
        transport: transport_name(info.bus_type()).map(str::to_owned),
        primary_usage_page: info.usage_page(),
        primary_usage: info.usage(),
        secondary_usages: Vec::new(),
        path: info.path().to_string_lossy().to_string(),
    }
}

/// Fold entries sharing a path into one device carrying all their usages.
///
/// Some platforms report one entry per top-level usage of the same device.
/// The first entry for a path supplies the primary usage; order of first
/// appearance is kept.
pub fn group_by_path(entries: Vec<DeviceProperties>) -> Vec<DeviceProperties> {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(entries.len());
    let mut devices: Vec<DeviceProperties> = Vec::with_capacity(entries.len());
    for props in entries {
        match index.get(&props.path) {
            Some(&i) => {
                devices[i].add_usage(props.primary_usage_page, props.primary_usage);
                for &(page, usage) in &props.secondary_usages {
                    devices[i].add_usage(page, usage);
                }
            }
            None => {
                index.insert(props.path.clone(), devices.len());
                devices.push(props);
            }
        }
    }
    devices
}

/// Enumerate every HID device currently attached
pub fn enumerate(api: &mut HidApi) -> Result<Vec<DeviceProperties>, NativeError> {
    api.refresh_devices()?;
    let devices = group_by_path(api.device_list().map(properties_of).collect());
    debug!("Enumerated {} HID devices", devices.len());
    Ok(devices)
}

/// Native layer backed by hidapi enumeration
pub struct HidApiBackend {
    config: HidApiConfig,
    next_manager: AtomicU64,
}

impl Default for HidApiBackend {
    fn default() -> Self {
        Self::new(HidApiConfig::default())
    }
}

impl HidApiBackend {
    pub fn new(config: HidApiConfig) -> Self {
        Self {
            config,
            next_manager: AtomicU64::new(1),
        }
    }

    /// One-shot listing of attached interfaces, outside any manager
    pub fn list_devices(&self) -> Result<Vec<DeviceProperties>, NativeError> {
        let mut api = HidApi::new()?;
        enumerate(&mut api)
    }
}

impl HidBackend for HidApiBackend {
    fn create_manager(&self, options: HidOptions) -> Option<Box<dyn NativeManager>> {
        if options != HidOptions::NONE {
            warn!("Unsupported manager options {:?}", options);
            return None;
        }
        let id = ManagerId(self.next_manager.fetch_add(1, Ordering::Relaxed));
        debug!("Created hidapi manager {:?}", id);
        Some(Box::new(HidApiManager {
            core: Arc::new(ManagerCore::new(id)),
            poll_interval: self.config.poll_interval,
            poller: None,
            scheduled: None,
        }))
    }
}

/// Manager whose events come from periodic hidapi enumeration
struct HidApiManager {
    core: Arc<ManagerCore>,
    poll_interval: Duration,
    /// Present while open
    poller: Option<Arc<Poller>>,
    /// Run loop and source id while scheduled
    scheduled: Option<(RunLoop, String, Option<SourceId>)>,
}

impl HidApiManager {
    fn attach_poller(&mut self) {
        if let (Some(poller), Some((run_loop, mode, source))) =
            (&self.poller, self.scheduled.as_mut())
        {
            if source.is_none() {
                let poller: Arc<dyn RunLoopSource> = Arc::clone(poller) as _;
                *source = Some(run_loop.add_source(poller, mode));
            }
        }
    }

    fn detach_poller(&mut self) {
        if let Some((run_loop, _, source)) = self.scheduled.as_mut() {
            if let Some(id) = source.take() {
                run_loop.remove_source(id);
            }
        }
    }
}

impl NativeManager for HidApiManager {
    fn id(&self) -> ManagerId {
        self.core.id()
    }

    fn set_device_matching(&mut self, matching: Option<&CfRef>) {
        self.core.set_matching(matching_from(matching, false));
    }

    fn set_device_matching_multiple(&mut self, multiple: Option<&CfRef>) {
        self.core.set_matching(matching_from(multiple, true));
    }

    fn register_device_matching_callback(&mut self, callback: Option<DeviceCallback>) {
        self.core.set_matching_callback(callback);
    }

    fn register_device_removal_callback(&mut self, callback: Option<DeviceCallback>) {
        self.core.set_removal_callback(callback);
    }

    fn schedule_with_run_loop(&mut self, run_loop: &RunLoop, mode: &str) {
        self.detach_poller();
        self.scheduled = Some((run_loop.clone(), mode.to_owned(), None));
        self.attach_poller();
    }

    fn unschedule_from_run_loop(&mut self, run_loop: &RunLoop, _mode: &str) {
        if matches!(&self.scheduled, Some((rl, _, _)) if rl.ptr_eq(run_loop)) {
            self.detach_poller();
            self.scheduled = None;
        }
    }

    fn open(&mut self, options: HidOptions) -> IoReturn {
        if options.0 & HidOptions::SEIZE_DEVICE.0 != 0 {
            return IoReturn::Unsupported;
        }
        if self.core.is_opened() {
            return IoReturn::Success;
        }

        let api = match HidApi::new() {
            Ok(api) => api,
            Err(e) => {
                let e = NativeError::from(e);
                warn!("Failed to initialize hidapi: {}", e);
                return IoReturn::from(&e);
            }
        };

        self.core.set_opened(true);
        self.poller = Some(Arc::new(Poller {
            core: Arc::clone(&self.core),
            interval: self.poll_interval,
            state: Mutex::new(PollState {
                api,
                snapshot: Snapshot::new(),
                last_poll: None,
            }),
        }));
        self.attach_poller();
        info!("Opened hidapi manager {:?}", self.core.id());
        IoReturn::Success
    }

    fn close(&mut self, _options: HidOptions) -> IoReturn {
        if !self.core.is_opened() {
            return IoReturn::NotOpen;
        }
        self.detach_poller();
        self.poller = None;
        self.core.set_opened(false);
        info!("Closed hidapi manager {:?}", self.core.id());
        IoReturn::Success
    }

    fn devices(&self) -> Vec<HidDeviceRef> {
        self.core.present()
    }
}

/// Attached devices as of the last enumeration
#[derive(Debug)]
struct Snapshot {
    /// Every attached device by path, matching or not
    known: HashMap<String, HidDeviceRef>,
    next_device: u64,
}

impl Snapshot {
    fn new() -> Self {
        Self {
            known: HashMap::new(),
            next_device: 1,
        }
    }

    /// Replace the snapshot with `current`, returning (added, removed).
    ///
    /// A device keeps its id while its path and properties stay the same.
    fn update(&mut self, current: Vec<DeviceProperties>) -> (Vec<HidDeviceRef>, Vec<DeviceId>) {
        let mut added = Vec::new();
        let mut removed = Vec::new();
        let mut seen = HashMap::with_capacity(current.len());
        for props in group_by_path(current) {
            let path = props.path.clone();
            let device = match self.known.remove(&path) {
                Some(existing) if existing.properties == props => existing,
                previous => {
                    // Same path, different device: report it as replaced
                    if let Some(previous) = previous {
                        removed.push(previous.id);
                    }
                    let id = DeviceId(self.next_device);
                    self.next_device += 1;
                    let device = Arc::new(HidDevice {
                        id,
                        properties: props,
                    });
                    added.push(Arc::clone(&device));
                    device
                }
            };
            seen.insert(path, device);
        }

        // Whatever is left in `known` disappeared
        removed.extend(self.known.values().map(|d| d.id));
        self.known = seen;
        (added, removed)
    }
}

struct PollState {
    api: HidApi,
    snapshot: Snapshot,
    last_poll: Option<Instant>,
}

/// Run-loop source diffing successive enumerations
struct Poller {
    core: Arc<ManagerCore>,
    interval: Duration,
    state: Mutex<PollState>,
}

impl Poller {
    /// Returns (added, removed) since the previous poll, or `None` when the
    /// interval has not elapsed or enumeration failed
    fn diff(&self) -> Option<(Vec<HidDeviceRef>, Vec<DeviceId>)> {
        let mut state = self.state.lock();
        if state
            .last_poll
            .is_some_and(|last| last.elapsed() < self.interval)
        {
            return None;
        }
        state.last_poll = Some(Instant::now());

        let current = match enumerate(&mut state.api) {
            Ok(devices) => devices,
            Err(e) => {
                warn!("HID enumeration failed: {}", e);
                return None;
            }
        };

        let (added, removed) = state.snapshot.update(current);
        if !added.is_empty() || !removed.is_empty() {
            debug!(
                "Enumeration diff: {} added, {} removed",
                added.len(),
                removed.len()
            );
        }
        Some((added, removed))
    }
}

impl RunLoopSource for Poller {
    fn perform(&self) {
        // Diff under the poll lock, deliver callbacks outside it
        if let Some((added, removed)) = self.diff() {
            for id in removed {
                self.core.device_removed(id);
            }
            for device in &added {
                self.core.device_added(device);
            }
        }
    }
}
