//! Watch configuration
//!
//! Loaded from TOML. Criteria tables use the native property keys directly:
//!
//! ```toml
//! poll_interval_ms = 250
//!
//! [[criteria]]
//! VendorID = 1452
//! ProductID = 591
//!
//! [[criteria]]
//! DeviceUsagePairs = [{ DeviceUsagePage = 1, DeviceUsage = 6 }]
//! ```

use std::path::Path;
use std::time::Duration;

use iohid_native::{HidApiConfig, DEFAULT_POLL_INTERVAL};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::value::{HostObject, HostValue};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// hidapi re-enumeration interval in milliseconds
    pub poll_interval_ms: Option<u64>,
    /// A device matching any table is reported; no tables means no filtering
    pub criteria: Vec<toml::Table>,
}

impl WatchConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval_ms
            .map_or(DEFAULT_POLL_INTERVAL, Duration::from_millis)
    }

    /// Backend settings, with `poll_ms` (from the command line) taking
    /// precedence over the file
    pub fn hidapi_config(&self, poll_ms: Option<u64>) -> HidApiConfig {
        HidApiConfig {
            poll_interval: poll_ms.map_or_else(|| self.poll_interval(), Duration::from_millis),
        }
    }

    /// Criteria as a host value: `null` when empty, otherwise a list of
    /// criteria objects
    pub fn criteria_value(&self) -> Result<HostValue> {
        if self.criteria.is_empty() {
            return Ok(HostValue::Null);
        }
        self.criteria
            .iter()
            .map(table_to_host)
            .collect::<Result<Vec<_>>>()
            .map(HostValue::Array)
    }
}

fn table_to_host(table: &toml::Table) -> Result<HostValue> {
    let mut obj = HostObject::new();
    for (key, value) in table {
        obj.set(key.as_str(), toml_to_host(value)?);
    }
    Ok(HostValue::Object(obj))
}

/// Convert a TOML value into the host value model
pub fn toml_to_host(value: &toml::Value) -> Result<HostValue> {
    Ok(match value {
        toml::Value::Integer(n) => HostValue::Number(*n as f64),
        toml::Value::Float(n) => HostValue::Number(*n),
        toml::Value::String(s) => HostValue::String(s.clone()),
        toml::Value::Boolean(b) => HostValue::Bool(*b),
        toml::Value::Array(items) => HostValue::Array(
            items
                .iter()
                .map(toml_to_host)
                .collect::<Result<Vec<_>>>()?,
        ),
        toml::Value::Table(table) => table_to_host(table)?,
        toml::Value::Datetime(dt) => {
            return Err(Error::Config(format!(
                "datetime {} is not a valid criteria value",
                dt
            )))
        }
    })
}
