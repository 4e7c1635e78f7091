//! Device descriptors and property keys

use std::sync::Arc;

use serde::Serialize;

use crate::object::{CfMutableArray, CfMutableDictionary, CfRef, CfType};

/// Property keys understood by device matching and published in device
/// property dictionaries
pub mod keys {
    pub const VENDOR_ID: &str = "VendorID";
    pub const PRODUCT_ID: &str = "ProductID";
    pub const VERSION_NUMBER: &str = "VersionNumber";
    pub const MANUFACTURER: &str = "Manufacturer";
    pub const PRODUCT: &str = "Product";
    pub const SERIAL_NUMBER: &str = "SerialNumber";
    pub const TRANSPORT: &str = "Transport";
    pub const PRIMARY_USAGE_PAGE: &str = "PrimaryUsagePage";
    pub const PRIMARY_USAGE: &str = "PrimaryUsage";
    pub const DEVICE_USAGE_PAIRS: &str = "DeviceUsagePairs";
    pub const DEVICE_USAGE_PAGE: &str = "DeviceUsagePage";
    pub const DEVICE_USAGE: &str = "DeviceUsage";
    pub const DEVICE_PATH: &str = "DevicePath";
}

/// Transport names as published under [`keys::TRANSPORT`]
pub mod transport {
    pub const USB: &str = "USB";
    pub const BLUETOOTH: &str = "Bluetooth";
    pub const I2C: &str = "I2C";
    pub const SPI: &str = "SPI";
}

/// Stable identifier of a device for as long as it stays attached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DeviceId(pub u64);

/// Identifier of the manager that sent a callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ManagerId(pub u64);

/// Properties of one HID interface
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceProperties {
    pub vendor_id: u16,
    pub product_id: u16,
    pub version_number: u16,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    pub transport: Option<String>,
    pub primary_usage_page: u16,
    pub primary_usage: u16,
    /// Further top-level usages exposed under the same path
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub secondary_usages: Vec<(u16, u16)>,
    /// Platform path or identifier (transport-specific)
    pub path: String,
}

impl DeviceProperties {
    /// Integer-valued property by key
    pub fn integer(&self, key: &str) -> Option<i64> {
        let value = match key {
            keys::VENDOR_ID => self.vendor_id,
            keys::PRODUCT_ID => self.product_id,
            keys::VERSION_NUMBER => self.version_number,
            keys::PRIMARY_USAGE_PAGE | keys::DEVICE_USAGE_PAGE => self.primary_usage_page,
            keys::PRIMARY_USAGE | keys::DEVICE_USAGE => self.primary_usage,
            _ => return None,
        };
        Some(i64::from(value))
    }

    /// String-valued property by key
    pub fn string(&self, key: &str) -> Option<&str> {
        match key {
            keys::MANUFACTURER => self.manufacturer.as_deref(),
            keys::PRODUCT => self.product.as_deref(),
            keys::SERIAL_NUMBER => self.serial_number.as_deref(),
            keys::TRANSPORT => self.transport.as_deref(),
            keys::DEVICE_PATH => Some(&self.path),
            _ => None,
        }
    }

    /// (usage page, usage) pairs this interface exposes, primary first
    pub fn usage_pairs(&self) -> Vec<(u16, u16)> {
        let mut pairs = Vec::with_capacity(1 + self.secondary_usages.len());
        pairs.push((self.primary_usage_page, self.primary_usage));
        pairs.extend_from_slice(&self.secondary_usages);
        pairs
    }

    /// Record another top-level usage of the same device. Duplicates of
    /// pairs already present are ignored.
    pub fn add_usage(&mut self, page: u16, usage: u16) {
        if !self.usage_pairs().contains(&(page, usage)) {
            self.secondary_usages.push((page, usage));
        }
    }

    /// Native property dictionary, as delivered alongside device callbacks
    pub fn to_dictionary(&self) -> CfRef {
        let mut dict = CfMutableDictionary::new();
        let set_int = |dict: &mut CfMutableDictionary, key: &str, value: u16| {
            dict.set_value(&CfType::string(key), &CfType::number(i32::from(value)));
        };
        set_int(&mut dict, keys::VENDOR_ID, self.vendor_id);
        set_int(&mut dict, keys::PRODUCT_ID, self.product_id);
        set_int(&mut dict, keys::VERSION_NUMBER, self.version_number);
        set_int(&mut dict, keys::PRIMARY_USAGE_PAGE, self.primary_usage_page);
        set_int(&mut dict, keys::PRIMARY_USAGE, self.primary_usage);

        for key in [
            keys::MANUFACTURER,
            keys::PRODUCT,
            keys::SERIAL_NUMBER,
            keys::TRANSPORT,
            keys::DEVICE_PATH,
        ] {
            if let Some(value) = self.string(key) {
                dict.set_value(&CfType::string(key), &CfType::string(value));
            }
        }

        let mut pairs = CfMutableArray::new();
        for (page, usage) in self.usage_pairs() {
            let mut pair = CfMutableDictionary::new();
            set_int(&mut pair, keys::DEVICE_USAGE_PAGE, page);
            set_int(&mut pair, keys::DEVICE_USAGE, usage);
            pairs.append(&pair.freeze());
        }
        dict.set_value(&CfType::string(keys::DEVICE_USAGE_PAIRS), &pairs.freeze());

        dict.freeze()
    }
}

/// An attached HID interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HidDevice {
    pub id: DeviceId,
    pub properties: DeviceProperties,
}

/// Shared device reference handed to callbacks
pub type HidDeviceRef = Arc<HidDevice>;
