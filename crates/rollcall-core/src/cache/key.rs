//! Cache key derivation.
//!
//! Keys look like `<prefix><namespace>[_<name>:<value>|<name>:<value>...]`.
//! Parameters are kept in a `BTreeMap`, so they are always emitted sorted by
//! name. Every component is escaped: `\`, `_`, `|` and `:` get a leading `\`.
//! An unescaped `_` right after the namespace therefore always starts the
//! parameter list, which is what gives `clear_namespace` an exact boundary.

use std::collections::BTreeMap;
use std::fmt;

/// Marks the start of the parameter list.
const PARAMS_SEPARATOR: char = '_';
/// Separates two parameters.
const PAIR_SEPARATOR: char = '|';
/// Separates a parameter name from its value.
const VALUE_SEPARATOR: char = ':';
const ESCAPE: char = '\\';

/// A primitive query parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Str(s) => f.write_str(s),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(x) => write!(f, "{}", x),
            ParamValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(value.into())
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

/// Query parameters that narrow a namespace down to one cache entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: BTreeMap<String, ParamValue>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: Into<ParamValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (name, value) in iter {
            params.insert(name, value);
        }
        params
    }
}

fn push_escaped(out: &mut String, raw: &str) {
    for c in raw.chars() {
        if matches!(c, ESCAPE | PARAMS_SEPARATOR | PAIR_SEPARATOR | VALUE_SEPARATOR) {
            out.push(ESCAPE);
        }
        out.push(c);
    }
}

/// Key prefix shared by every entry of one namespace, params or not.
pub fn namespace_key(prefix: &str, namespace: &str) -> String {
    let mut key = String::with_capacity(prefix.len() + namespace.len());
    key.push_str(prefix);
    push_escaped(&mut key, namespace);
    key
}

/// Full storage key for a namespace and its parameters.
pub fn cache_key(prefix: &str, namespace: &str, params: &Params) -> String {
    let mut key = namespace_key(prefix, namespace);
    if params.is_empty() {
        return key;
    }

    key.push(PARAMS_SEPARATOR);
    for (i, (name, value)) in params.values.iter().enumerate() {
        if i > 0 {
            key.push(PAIR_SEPARATOR);
        }
        push_escaped(&mut key, name);
        key.push(VALUE_SEPARATOR);
        push_escaped(&mut key, &value.to_string());
    }
    key
}

/// Whether `key` belongs to the namespace whose bare key is `ns_key`.
pub fn in_namespace(key: &str, ns_key: &str) -> bool {
    match key.strip_prefix(ns_key) {
        Some("") => true,
        Some(rest) => rest.starts_with(PARAMS_SEPARATOR),
        None => false,
    }
}
