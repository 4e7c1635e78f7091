//! Reference-counted native object model
//!
//! Native objects are immutable once built and shared through [`CfRef`].
//! Collections are assembled with [`CfMutableArray`] / [`CfMutableDictionary`],
//! which retain every value appended to them. Dropping the last `CfRef`
//! releases the object and, transitively, every child it retained.

use std::sync::Arc;

/// Owned reference to a native object
pub type CfRef = Arc<CfType>;

/// Native typed object
#[derive(Debug, Clone, PartialEq)]
pub enum CfType {
    /// 32-bit signed integer number
    Number(i32),
    /// UTF-8 string
    String(String),
    /// Ordered collection
    Array(Vec<CfRef>),
    /// Key/value collection, insertion ordered
    Dictionary(CfDictionary),
}

impl CfType {
    /// Create an integer number object
    pub fn number(value: i32) -> CfRef {
        Arc::new(CfType::Number(value))
    }

    /// Create a string object from UTF-8 text
    pub fn string(value: &str) -> CfRef {
        Arc::new(CfType::String(value.to_owned()))
    }

    /// Native type name, as native tooling reports it
    pub fn type_name(&self) -> &'static str {
        match self {
            CfType::Number(_) => "CFNumber",
            CfType::String(_) => "CFString",
            CfType::Array(_) => "CFArray",
            CfType::Dictionary(_) => "CFDictionary",
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            CfType::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CfType::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[CfRef]> {
        match self {
            CfType::Array(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_dictionary(&self) -> Option<&CfDictionary> {
        match self {
            CfType::Dictionary(dict) => Some(dict),
            _ => None,
        }
    }
}

/// Immutable dictionary contents
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CfDictionary {
    entries: Vec<(CfRef, CfRef)>,
}

impl CfDictionary {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a value by string key
    pub fn get(&self, key: &str) -> Option<&CfRef> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&CfRef, &CfRef)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }
}

/// Mutable ordered collection under construction
#[derive(Debug, Default)]
pub struct CfMutableArray {
    values: Vec<CfRef>,
}

impl CfMutableArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
        }
    }

    /// Append a value; the array retains its own reference
    pub fn append(&mut self, value: &CfRef) {
        self.values.push(Arc::clone(value));
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Finish construction and hand out the owned reference
    pub fn freeze(self) -> CfRef {
        Arc::new(CfType::Array(self.values))
    }
}

/// Mutable key/value collection under construction
#[derive(Debug, Default)]
pub struct CfMutableDictionary {
    entries: Vec<(CfRef, CfRef)>,
}

impl CfMutableDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a pair; the dictionary retains both key and value
    pub fn set_value(&mut self, key: &CfRef, value: &CfRef) {
        match self.entries.iter_mut().find(|(k, _)| **k == **key) {
            Some(entry) => entry.1 = Arc::clone(value),
            None => self.entries.push((Arc::clone(key), Arc::clone(value))),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn freeze(self) -> CfRef {
        Arc::new(CfType::Dictionary(CfDictionary {
            entries: self.entries,
        }))
    }
}
