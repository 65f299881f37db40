//! The key-value annotation record attached to every node.
//!
//! A [`Metadata`] is an insertion-ordered map from string keys to
//! [`Value`]s. It carries a read-only flag that is kept in sync with the
//! owning node by the node's setter; callers never toggle it directly.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::errors::{Error, Result};

/// A metadata value: a scalar, a string, a list, or a nested map.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(value: IndexMap<String, Value>) -> Self {
        Value::Map(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v:?}"),
            Value::List(values) => {
                f.write_str("[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k:?}: {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

struct MetadataInner {
    /// Name of the owning node, used only for diagnostics.
    node_name: String,
    read_only: Cell<bool>,
    entries: RefCell<IndexMap<String, Value>>,
}

/// An insertion-ordered, read-only-toggleable key-value record.
///
/// Cheap to clone: clones share the same underlying storage, the way the
/// metadata reached through a node handle refers to the node's one
/// record.
#[derive(Clone)]
pub struct Metadata {
    inner: Rc<MetadataInner>,
}

impl Metadata {
    pub(crate) fn new(
        read_only: bool,
        node_name: impl Into<String>,
        entries: IndexMap<String, Value>,
    ) -> Self {
        Metadata {
            inner: Rc::new(MetadataInner {
                node_name: node_name.into(),
                read_only: Cell::new(read_only),
                entries: RefCell::new(entries),
            }),
        }
    }

    /// The name of the node this record is attached to.
    pub fn node_name(&self) -> String {
        self.inner.node_name.clone()
    }

    /// Whether this record is in read-only mode.
    pub fn read_only(&self) -> bool {
        self.inner.read_only.get()
    }

    /// Kept in sync by the owning node's read-only setter; never exposed
    /// to callers directly.
    pub(crate) fn set_read_only(&self, value: bool) {
        self.inner.read_only.set(value);
    }

    /// Returns a clone of the value for `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.entries.borrow().get(key).cloned()
    }

    /// Materializes a nested map value as a fresh sub-record carrying the
    /// same read-only flag and node-name label.
    pub fn nested(&self, key: &str) -> Option<Metadata> {
        match self.get(key) {
            Some(Value::Map(map)) => Some(Metadata::new(self.read_only(), self.node_name(), map)),
            _ => None,
        }
    }

    /// Adds or replaces an entry. Fails when the record is frozen.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        self.ensure_writable()?;
        self.inner
            .entries
            .borrow_mut()
            .insert(key.into(), value.into());
        Ok(())
    }

    /// Removes an entry, returning it. Absence is not an error.
    pub fn remove(&self, key: &str) -> Result<Option<Value>> {
        self.ensure_writable()?;
        Ok(self.inner.entries.borrow_mut().shift_remove(key))
    }

    /// Adds every pair in turn; fails on the first one when frozen.
    pub fn update<I, K, V>(&self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        for (key, value) in pairs {
            self.set(key, value)?;
        }
        Ok(())
    }

    /// Removes all entries.
    pub fn clear(&self) -> Result<()> {
        self.ensure_writable()?;
        self.inner.entries.borrow_mut().clear();
        Ok(())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.entries.borrow().contains_key(key)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.inner.entries.borrow().keys().cloned().collect()
    }

    /// A snapshot of the entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (String, Value)> {
        self.to_map().into_iter()
    }

    /// A deep snapshot of the entries as a plain ordered map.
    pub fn to_map(&self) -> IndexMap<String, Value> {
        self.inner.entries.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.borrow().is_empty()
    }

    /// Duplicates all entries into a new record. `read_only` defaults to
    /// the mode of the record being copied.
    pub fn copy(&self, read_only: Option<bool>) -> Metadata {
        Metadata::new(
            read_only.unwrap_or_else(|| self.read_only()),
            self.node_name(),
            self.to_map(),
        )
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.read_only() {
            return Err(Error::ReadOnly(self.node_name()));
        }
        Ok(())
    }
}

impl fmt::Display for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Metadata {:?} {{", self.inner.node_name)?;
        for (i, (k, v)) in self.inner.entries.borrow().iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, " {k:?}: {v}")?;
        }
        f.write_str(" }>")
    }
}

impl fmt::Debug for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
