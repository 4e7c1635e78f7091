//! Value marshalling between host values and native objects
//!
//! Host → native conversion is recursive and atomic: a collection is built in
//! a local mutable builder and only frozen once every child converted, so an
//! error drops whatever was built so far. Each child is retained by its
//! parent on insertion and the transient reference is released at the end of
//! the loop iteration.

use iohid_native::{
    keys, CfMutableArray, CfMutableDictionary, CfRef, CfType, HidDevice, IoReturn, Matching,
};

use crate::error::{Error, Result};
use crate::registry::HandleToken;
use crate::value::{HostObject, HostValue};

const TWO_POW_32: f64 = 4_294_967_296.0;

/// Host `ToInt32`: truncate toward zero and wrap modulo 2^32. NaN and
/// infinities become 0.
pub fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    let wrapped = n.trunc().rem_euclid(TWO_POW_32);
    wrapped as u32 as i32
}

/// Convert a host value into a native object.
///
/// Numbers, strings (primitive or boxed), arrays and plain objects convert;
/// anything else fails with [`Error::UnsupportedValueType`].
pub fn to_native(value: &HostValue) -> Result<CfRef> {
    match value {
        HostValue::Number(n) => Ok(CfType::number(to_int32(*n))),
        HostValue::String(s) | HostValue::StringObject(s) => Ok(CfType::string(s)),
        HostValue::Array(items) => array_to_native(items),
        HostValue::Object(obj) => object_to_native(obj),
        other => Err(Error::UnsupportedValueType(other.type_name().to_owned())),
    }
}

pub fn array_to_native(items: &[HostValue]) -> Result<CfRef> {
    let mut array = CfMutableArray::with_capacity(items.len());
    for item in items {
        let value = to_native(item)?;
        array.append(&value);
    }
    Ok(array.freeze())
}

/// Own enumerable properties only, in host enumeration order
pub fn object_to_native(obj: &HostObject) -> Result<CfRef> {
    let mut dict = CfMutableDictionary::new();
    for (key, value) in obj.own_enumerable() {
        let key = CfType::string(key);
        let value = to_native(value)?;
        dict.set_value(&key, &value);
    }
    Ok(dict.freeze())
}

/// Converted device-matching criteria, ready to install
#[derive(Debug, Clone, PartialEq)]
pub enum Criteria {
    /// No filtering
    Any,
    /// One criteria dictionary
    Single(CfRef),
    /// Array of criteria dictionaries, any of which may match
    Multiple(CfRef),
}

/// Convert the argument of `setDeviceMatchingCriteria`.
///
/// An array installs multiple criteria, an object a single one, and `null` or
/// `undefined` removes filtering.
pub fn criteria_to_native(value: &HostValue) -> Result<Criteria> {
    match value {
        HostValue::Null | HostValue::Undefined => Ok(Criteria::Any),
        HostValue::Array(items) => array_to_native(items).map(Criteria::Multiple),
        HostValue::Object(obj) => object_to_native(obj).map(Criteria::Single),
        other => Err(Error::UnsupportedValueType(other.type_name().to_owned())),
    }
}

impl From<Criteria> for Matching {
    fn from(criteria: Criteria) -> Self {
        match criteria {
            Criteria::Any => Matching::All,
            Criteria::Single(dict) => Matching::Single(dict),
            Criteria::Multiple(list) => Matching::Multiple(list),
        }
    }
}

/// Convert a native object back into a host value
pub fn to_host(value: &CfType) -> HostValue {
    match value {
        CfType::Number(n) => HostValue::Number(f64::from(*n)),
        CfType::String(s) => HostValue::String(s.clone()),
        CfType::Array(items) => HostValue::Array(items.iter().map(|v| to_host(v)).collect()),
        CfType::Dictionary(dict) => HostValue::Object(
            dict.iter()
                .map(|(k, v)| (key_string(k), to_host(v)))
                .collect(),
        ),
    }
}

/// String form of a dictionary key
fn key_string(key: &CfType) -> String {
    match key {
        CfType::String(s) => s.clone(),
        CfType::Number(n) => n.to_string(),
        other => format!("[object {}]", other.type_name()),
    }
}

/// Payload handed to device callbacks:
/// `{ deviceId, result, sender, properties }`
pub fn device_event_to_host(sender: HandleToken, result: IoReturn, device: &HidDevice) -> HostValue {
    let properties = device.properties.to_dictionary();
    let mut event = HostObject::new();
    event
        .set("deviceId", device.id.0 as f64)
        .set("result", f64::from(result.code()))
        .set("sender", sender.0 as f64)
        .set("properties", to_host(&properties));
    HostValue::Object(event)
}

/// Vendor/product summary used by log lines
pub fn describe(device: &HidDevice) -> String {
    let props = &device.properties;
    let name = props
        .string(keys::PRODUCT)
        .unwrap_or("unknown product");
    format!(
        "{:04X}:{:04X} {} ({})",
        props.vendor_id, props.product_id, name, props.path
    )
}
