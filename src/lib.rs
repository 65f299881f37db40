//! An in-memory hierarchical store for scientific datasets.
//!
//! A tree of named [`Group`]s (directory-like containers) and
//! [`Dataset`]s (array-backed leaves), each carrying an ordered
//! key-value [`Metadata`] record, plus a [`DatasetLogging`] adapter
//! that appends structured log records directly into a dataset.
//!
//! Every group indexes **all** of its descendants by relative path, so
//! any node is addressable in O(1) from any ancestor:
//!
//! ```
//! use datatree::{Group, Vertex};
//!
//! let root = Group::root();
//! let b = root.create_group("/a/b")?;
//! assert_eq!(root.get("/a/b")?.as_group().unwrap().name(), b.name());
//! assert!(root.group("/a")?.contains("b"));
//! # Ok::<(), datatree::Error>(())
//! ```

mod errors;
mod nodes;
mod path;

pub mod data;
pub mod logging;
pub mod metadata;

pub use data::{ArrayData, BinaryOp, DataType, LogValue, RecordArray, UnaryOp};
pub use errors::{Error, Result};
pub use logging::{Level, LogSink, Logger, Record};
pub use metadata::{Metadata, Value};
pub use nodes::{
    Dataset, DatasetLogging, DatasetOptions, Group, GroupOptions, LoggingOptions, Node,
    NodeFilter, Vertex, WeakDatasetLogging, DEFAULT_ATTRIBUTES, DEFAULT_DATE_FMT,
};

#[cfg(test)]
mod tests;
