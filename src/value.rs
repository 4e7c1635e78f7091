//! Host dynamic value model
//!
//! Mirrors what a scripting host hands to the bridge: numbers are doubles,
//! objects are ordered property bags with enumerable flags and a prototype
//! chain, and functions are opaque callables that live on the host thread.

use std::fmt;
use std::rc::Rc;

/// A host callable. Host functions never leave the host thread.
#[derive(Clone)]
pub struct HostFunction {
    func: Rc<dyn Fn(&[HostValue])>,
}

impl HostFunction {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&[HostValue]) + 'static,
    {
        Self {
            func: Rc::new(func),
        }
    }

    pub fn call(&self, args: &[HostValue]) {
        (self.func)(args)
    }

    /// Whether both values refer to the same function object
    pub fn ptr_eq(&self, other: &HostFunction) -> bool {
        Rc::ptr_eq(&self.func, &other.func)
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[Function]")
    }
}

impl PartialEq for HostFunction {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

/// A dynamic host value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum HostValue {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// Boxed string object (`new String("...")`)
    StringObject(String),
    Array(Vec<HostValue>),
    Object(HostObject),
    Function(HostFunction),
}

impl HostValue {
    /// Type name as the host would report it
    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::Undefined => "undefined",
            HostValue::Null => "null",
            HostValue::Bool(_) => "boolean",
            HostValue::Number(_) => "number",
            HostValue::String(_) => "string",
            HostValue::StringObject(_) => "String",
            HostValue::Array(_) => "array",
            HostValue::Object(_) => "object",
            HostValue::Function(_) => "function",
        }
    }

    /// `null` or `undefined`
    pub fn is_nullish(&self) -> bool {
        matches!(self, HostValue::Null | HostValue::Undefined)
    }

    pub fn as_function(&self) -> Option<&HostFunction> {
        match self {
            HostValue::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HostValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(s) | HostValue::StringObject(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HostObject> {
        match self {
            HostValue::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[HostValue]> {
        match self {
            HostValue::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl From<f64> for HostValue {
    fn from(n: f64) -> Self {
        HostValue::Number(n)
    }
}

impl From<i32> for HostValue {
    fn from(n: i32) -> Self {
        HostValue::Number(f64::from(n))
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        HostValue::Bool(b)
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        HostValue::String(s.to_owned())
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        HostValue::String(s)
    }
}

impl From<Vec<HostValue>> for HostValue {
    fn from(items: Vec<HostValue>) -> Self {
        HostValue::Array(items)
    }
}

impl From<HostObject> for HostValue {
    fn from(obj: HostObject) -> Self {
        HostValue::Object(obj)
    }
}

impl From<HostFunction> for HostValue {
    fn from(f: HostFunction) -> Self {
        HostValue::Function(f)
    }
}

impl From<serde_json::Value> for HostValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => HostValue::Null,
            Value::Bool(b) => HostValue::Bool(b),
            Value::Number(n) => HostValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => HostValue::String(s),
            Value::Array(items) => {
                HostValue::Array(items.into_iter().map(HostValue::from).collect())
            }
            Value::Object(map) => HostValue::Object(
                map.into_iter()
                    .map(|(k, v)| (k, HostValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&HostValue> for serde_json::Value {
    fn from(value: &HostValue) -> Self {
        use serde_json::Value;
        match value {
            HostValue::Undefined | HostValue::Null | HostValue::Function(_) => Value::Null,
            HostValue::Bool(b) => Value::Bool(*b),
            HostValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 9.0e15 {
                    Value::from(*n as i64)
                } else {
                    serde_json::Number::from_f64(*n).map_or(Value::Null, Value::Number)
                }
            }
            HostValue::String(s) | HostValue::StringObject(s) => Value::String(s.clone()),
            HostValue::Array(items) => Value::Array(items.iter().map(Value::from).collect()),
            HostValue::Object(obj) => Value::Object(
                obj.own_enumerable()
                    .map(|(k, v)| (k.to_owned(), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

/// One own property of a host object
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub key: String,
    pub value: HostValue,
    pub enumerable: bool,
}

/// Host object: own properties in insertion order plus an optional prototype
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostObject {
    properties: Vec<Property>,
    prototype: Option<Box<HostObject>>,
}

impl HostObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an object inheriting from `prototype`
    pub fn with_prototype(prototype: HostObject) -> Self {
        Self {
            properties: Vec::new(),
            prototype: Some(Box::new(prototype)),
        }
    }

    /// Set an enumerable own property, keeping its position if it exists
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<HostValue>) -> &mut Self {
        self.define(key.into(), value.into(), true);
        self
    }

    /// Define a non-enumerable own property
    pub fn define_hidden(
        &mut self,
        key: impl Into<String>,
        value: impl Into<HostValue>,
    ) -> &mut Self {
        self.define(key.into(), value.into(), false);
        self
    }

    fn define(&mut self, key: String, value: HostValue, enumerable: bool) {
        match self.properties.iter_mut().find(|p| p.key == key) {
            Some(prop) => {
                prop.value = value;
                prop.enumerable = enumerable;
            }
            None => self.properties.push(Property {
                key,
                value,
                enumerable,
            }),
        }
    }

    /// Property lookup through the prototype chain
    pub fn get(&self, key: &str) -> Option<&HostValue> {
        self.get_own(key)
            .or_else(|| self.prototype.as_deref().and_then(|p| p.get(key)))
    }

    pub fn get_own(&self, key: &str) -> Option<&HostValue> {
        self.properties
            .iter()
            .find(|p| p.key == key)
            .map(|p| &p.value)
    }

    pub fn prototype(&self) -> Option<&HostObject> {
        self.prototype.as_deref()
    }

    /// Own enumerable properties in host enumeration order: array-index keys
    /// ascending, then the remaining keys in insertion order
    pub fn own_enumerable(&self) -> impl Iterator<Item = (&str, &HostValue)> {
        let mut indexed: Vec<(u32, &Property)> = Vec::new();
        let mut named: Vec<&Property> = Vec::new();
        for prop in self.properties.iter().filter(|p| p.enumerable) {
            match array_index(&prop.key) {
                Some(index) => indexed.push((index, prop)),
                None => named.push(prop),
            }
        }
        indexed.sort_by_key(|(index, _)| *index);

        indexed
            .into_iter()
            .map(|(_, p)| p)
            .chain(named)
            .map(|p| (p.key.as_str(), &p.value))
    }

    pub fn own_enumerable_keys(&self) -> Vec<&str> {
        self.own_enumerable().map(|(k, _)| k).collect()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, HostValue)> for HostObject {
    fn from_iter<I: IntoIterator<Item = (K, HostValue)>>(iter: I) -> Self {
        let mut obj = HostObject::new();
        for (k, v) in iter {
            obj.set(k, v);
        }
        obj
    }
}

/// Canonical array index (`"0"`, `"17"`, not `"01"` or `"4294967295"`)
fn array_index(key: &str) -> Option<u32> {
    if key.len() > 1 && key.starts_with('0') {
        return None;
    }
    key.parse::<u32>().ok().filter(|&i| i != u32::MAX)
}
