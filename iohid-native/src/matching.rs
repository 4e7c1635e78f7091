//! Device matching against native criteria dictionaries

use crate::device::{keys, DeviceProperties};
use crate::object::{CfDictionary, CfRef, CfType};

/// Criteria currently installed in a manager
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Matching {
    /// No filtering: every device matches
    #[default]
    All,
    /// One criteria dictionary
    Single(CfRef),
    /// Any of several criteria dictionaries
    Multiple(CfRef),
}

impl Matching {
    /// Whether a device with these properties passes the criteria.
    ///
    /// A dictionary matches when every key it names is present on the device
    /// with an equal value. An empty list matches nothing; non-dictionary list
    /// elements are ignored.
    pub fn matches(&self, props: &DeviceProperties) -> bool {
        match self {
            Matching::All => true,
            Matching::Single(criteria) => criteria
                .as_dictionary()
                .is_some_and(|dict| dictionary_matches(dict, props)),
            Matching::Multiple(list) => list.as_array().is_some_and(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_dictionary())
                    .any(|dict| dictionary_matches(dict, props))
            }),
        }
    }
}

fn dictionary_matches(dict: &CfDictionary, props: &DeviceProperties) -> bool {
    dict.iter().all(|(key, value)| match key.as_str() {
        Some(key) => property_matches(key, value, props),
        None => false,
    })
}

fn property_matches(key: &str, value: &CfType, props: &DeviceProperties) -> bool {
    match key {
        keys::DEVICE_USAGE_PAIRS => match value.as_array() {
            Some(pairs) => pairs
                .iter()
                .filter_map(|pair| pair.as_dictionary())
                .any(|pair| usage_pair_matches(pair, props)),
            None => false,
        },
        keys::DEVICE_USAGE_PAGE | keys::DEVICE_USAGE => {
            let Some(wanted) = value.as_i32() else {
                return false;
            };
            props.usage_pairs().iter().any(|&(page, usage)| {
                let actual = if key == keys::DEVICE_USAGE_PAGE { page } else { usage };
                i64::from(actual) == i64::from(wanted)
            })
        }
        _ => match value {
            CfType::Number(wanted) => props.integer(key) == Some(i64::from(*wanted)),
            CfType::String(wanted) => props.string(key) == Some(wanted.as_str()),
            _ => false,
        },
    }
}

/// A usage-pair dictionary matches when one exposed pair satisfies every key
fn usage_pair_matches(pair: &CfDictionary, props: &DeviceProperties) -> bool {
    let page = pair.get(keys::DEVICE_USAGE_PAGE).and_then(|v| v.as_i32());
    let usage = pair.get(keys::DEVICE_USAGE).and_then(|v| v.as_i32());
    props.usage_pairs().iter().any(|&(p, u)| {
        page.map_or(true, |want| i32::from(p) == want)
            && usage.map_or(true, |want| i32::from(u) == want)
    })
}
