//! A dataset specialized to append structured log records.
//!
//! The adapter subscribes to a [`LogSink`] and appends one row per
//! record. With a requested initial size it runs in auto-resize mode: a
//! logical cursor tracks the next free slot and the physical buffer
//! grows amortized, pre-filling new rows with the `Empty` sentinel.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::ops::Deref;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use tracing::debug;

use super::sealed::Sealed;
use super::vertex::{self, DatasetState, LoggingState, VertexInner, VertexKind};
use super::{Dataset, Group, Vertex};
use crate::data::{ArrayData, LogValue, RecordArray};
use crate::errors::{Error, Result};
use crate::logging::{Level, LogSink, Record};
use crate::metadata::Value;

/// Record attributes that default when none are configured.
pub const DEFAULT_ATTRIBUTES: [&str; 4] = ["asctime", "levelname", "name", "message"];

/// ISO-8601-like timestamp pattern with microsecond precision.
pub const DEFAULT_DATE_FMT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Every attribute a record can materialize.
const KNOWN_ATTRIBUTES: [&str; 6] = [
    "asctime",
    "levelname",
    "levelno",
    "name",
    "message",
    "created",
];

/// Options for creating or requiring a logging dataset.
#[derive(Clone, Default)]
pub struct LoggingOptions {
    level: Option<Level>,
    attributes: Option<Vec<String>>,
    date_fmt: Option<String>,
    size: Option<usize>,
    sink: Option<Rc<dyn LogSink>>,
    data: Option<ArrayData>,
    metadata: IndexMap<String, Value>,
}

impl LoggingOptions {
    pub fn new() -> Self {
        LoggingOptions::default()
    }

    /// Severity threshold of the adapter; defaults to `Info`.
    pub fn level(mut self, level: Level) -> Self {
        self.level = Some(level);
        self
    }

    /// The record attributes to materialize, one column each. Defaults
    /// to [`DEFAULT_ATTRIBUTES`]; an explicitly empty list fails.
    pub fn attributes(mut self, attributes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.attributes = Some(attributes.into_iter().map(Into::into).collect());
        self
    }

    /// Timestamp pattern for the `asctime` attribute; defaults to
    /// [`DEFAULT_DATE_FMT`].
    pub fn date_fmt(mut self, date_fmt: impl Into<String>) -> Self {
        self.date_fmt = Some(date_fmt.into());
        self
    }

    /// Requested initial row count. Enables auto-resize mode.
    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// The sink to subscribe to. There is no implied default sink: an
    /// adapter created without one stays detached until
    /// [`DatasetLogging::set_logger`] is called.
    pub fn sink(mut self, sink: Rc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Pre-existing record data to carry over.
    pub(crate) fn data(mut self, data: ArrayData) -> Self {
        self.data = Some(data);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub(crate) fn metadata_map(mut self, entries: IndexMap<String, Value>) -> Self {
        self.metadata.extend(entries);
        self
    }

    pub(crate) fn attribute_names(&self) -> Option<&[String]> {
        self.attributes.as_deref()
    }
}

/// A dataset that appends one row per structured log record.
#[derive(Clone)]
pub struct DatasetLogging(pub(crate) Dataset);

/// A non-owning handle to a logging dataset, held by sinks so that a
/// subscription never keeps a detached log alive.
#[derive(Clone)]
pub struct WeakDatasetLogging(Weak<VertexInner>);

impl WeakDatasetLogging {
    pub fn upgrade(&self) -> Option<DatasetLogging> {
        self.0.upgrade().map(|inner| DatasetLogging(Dataset(inner)))
    }
}

impl DatasetLogging {
    pub(crate) fn attach_new(
        parent: &Group,
        local_name: &str,
        options: LoggingOptions,
    ) -> Result<DatasetLogging> {
        let level = options.level.unwrap_or(Level::Info);
        let attributes = match options.attributes {
            Some(attributes) => attributes,
            None => DEFAULT_ATTRIBUTES.iter().map(|a| a.to_string()).collect(),
        };
        validate_attributes(&attributes)?;
        let date_fmt = options
            .date_fmt
            .unwrap_or_else(|| DEFAULT_DATE_FMT.to_string());

        let mut records = match options.data {
            Some(ArrayData::Records(records)) => {
                if records.names() != attributes.as_slice() {
                    return Err(Error::InvalidArgument(format!(
                        "the record data columns {:?} do not match the attributes {:?}",
                        records.names(),
                        attributes
                    )));
                }
                records
            }
            Some(other) => {
                return Err(Error::TypeMismatch {
                    expected: "record data",
                    found: other.dtype().name(),
                })
            }
            None => RecordArray::new(attributes.clone())?,
        };

        let auto_resize = options.size.is_some();
        if let Some(size) = options.size {
            records.grow_to(size);
        }
        let cursor = records.written_len();

        // These marker keys distinguish a logging dataset from a plain
        // dataset after the tree is copied or rebuilt.
        let mut metadata = options.metadata;
        metadata.insert("logging_level".to_string(), Value::Int(level.value()));
        metadata.insert(
            "logging_level_name".to_string(),
            Value::Str(level.name().to_string()),
        );
        metadata.insert(
            "logging_date_format".to_string(),
            Value::Str(date_fmt.clone()),
        );

        let inner = vertex::attach(
            parent,
            local_name,
            false,
            metadata,
            VertexKind::DatasetLogging(
                DatasetState {
                    data: RefCell::new(ArrayData::Records(records)),
                    writable: Cell::new(true),
                },
                LoggingState {
                    attributes,
                    date_fmt,
                    level: Cell::new(level),
                    auto_resize,
                    cursor: Cell::new(cursor),
                    sink: RefCell::new(None),
                },
            ),
        )?;
        let logging = DatasetLogging(Dataset(inner));
        if let Some(sink) = options.sink {
            logging.set_logger(sink);
        }
        Ok(logging)
    }

    /// The dataset view of this node; both refer to the same vertex.
    pub fn as_dataset(&self) -> Dataset {
        self.0.clone()
    }

    /// The attribute names materialized into each row, in column order.
    pub fn attributes(&self) -> &[String] {
        &self.0 .0.logging_state().attributes
    }

    /// The timestamp pattern used for the `asctime` attribute.
    pub fn date_fmt(&self) -> &str {
        &self.0 .0.logging_state().date_fmt
    }

    /// The adapter's severity threshold.
    pub fn level(&self) -> Level {
        self.0 .0.logging_state().level.get()
    }

    /// Whether the physical buffer grows amortized ahead of the cursor.
    pub fn is_auto_resize(&self) -> bool {
        self.0 .0.logging_state().auto_resize
    }

    /// Number of rows recorded so far; in auto-resize mode this lags the
    /// physical size.
    pub fn logical_len(&self) -> usize {
        self.0 .0.logging_state().cursor.get()
    }

    /// The sink this adapter is subscribed to, if any.
    pub fn sink(&self) -> Option<Rc<dyn LogSink>> {
        self.0 .0.logging_state().sink.borrow().clone()
    }

    /// Materializes the configured attributes of `record` into one row.
    ///
    /// In auto-resize mode the physical buffer grows before the write
    /// whenever the cursor has caught up with it; otherwise the row is
    /// appended, growing the buffer by exactly one.
    pub fn emit(&self, record: &Record) -> Result<()> {
        let state = self.0 .0.logging_state();
        let dataset = self.0 .0.dataset_state();
        if !dataset.writable.get() {
            return Err(Error::ReadOnly(self.name()));
        }

        let row: Vec<LogValue> = state
            .attributes
            .iter()
            .map(|attribute| materialize(attribute, record, &state.date_fmt))
            .collect();

        let mut data = dataset.data.borrow_mut();
        let records = match &mut *data {
            ArrayData::Records(records) => records,
            _ => unreachable!("logging dataset holds record data"),
        };

        if state.auto_resize {
            let cursor = state.cursor.get();
            if cursor >= records.len() {
                let next = records.len() + 1;
                let capacity = next + (next >> 3) + if next < 9 { 3 } else { 6 };
                debug!(name = %self.0 .0.name, capacity, "growing log buffer");
                records.grow_to(capacity);
            }
            records.set_row(cursor, row)?;
            state.cursor.set(cursor + 1);
        } else {
            records.push_row(row)?;
            state.cursor.set(state.cursor.get() + 1);
        }
        Ok(())
    }

    /// Drops every row whose first attribute column is still the
    /// never-written sentinel. A plain null-ness test would also drop
    /// recorded rows holding falsy values, so the sentinel itself is
    /// compared.
    pub fn remove_empty_rows(&self) -> Result<()> {
        let dataset = self.0 .0.dataset_state();
        if !dataset.writable.get() {
            return Err(Error::ReadOnly(self.name()));
        }
        let mut data = dataset.data.borrow_mut();
        if let ArrayData::Records(records) = &mut *data {
            records.retain_rows(|row| row[0] != LogValue::Empty);
            self.0 .0.logging_state().cursor.set(records.len());
        }
        Ok(())
    }

    /// Subscribes this adapter to `sink`, leaving any previous sink
    /// first. A sink whose level is unset or coarser than the adapter's
    /// is raised to the adapter's level.
    pub fn set_logger(&self, sink: Rc<dyn LogSink>) {
        let state = self.0 .0.logging_state();
        let level = state.level.get();
        if sink.level() == Level::NotSet || sink.level() > level {
            sink.set_level(level);
        }
        self.remove_handler();
        sink.add_handler(self);
        *state.sink.borrow_mut() = Some(sink);
    }

    /// Unsubscribes from the sink without detaching this dataset from
    /// its tree. A no-op when already detached.
    pub fn remove_handler(&self) {
        if let Some(sink) = &*self.0 .0.logging_state().sink.borrow() {
            sink.remove_handler(self);
        }
    }

    /// Whether two handles refer to the same adapter. Logging datasets
    /// compare by identity only, so a sink's membership tests never
    /// conflate two distinct, possibly empty logs.
    pub fn ptr_eq(&self, other: &DatasetLogging) -> bool {
        Rc::ptr_eq(&self.0 .0, &other.0 .0)
    }

    pub fn downgrade(&self) -> WeakDatasetLogging {
        WeakDatasetLogging(Rc::downgrade(&self.0 .0))
    }
}

fn validate_attributes(attributes: &[String]) -> Result<()> {
    if attributes.is_empty() {
        return Err(Error::InvalidArgument(
            "must specify at least one record attribute name".to_string(),
        ));
    }
    for attribute in attributes {
        if !KNOWN_ATTRIBUTES.contains(&attribute.as_str()) {
            return Err(Error::InvalidArgument(format!(
                "unknown record attribute {attribute:?}, expected one of {KNOWN_ATTRIBUTES:?}"
            )));
        }
    }
    Ok(())
}

fn materialize(attribute: &str, record: &Record, date_fmt: &str) -> LogValue {
    match attribute {
        "asctime" => LogValue::Str(record.created.format(date_fmt).to_string()),
        "levelname" => LogValue::Str(record.level.name().to_string()),
        "levelno" => LogValue::Int(record.level.value()),
        "name" => LogValue::Str(record.name.clone()),
        "message" => LogValue::Str(record.message.clone()),
        "created" => LogValue::Float(record.created.timestamp_micros() as f64 / 1e6),
        _ => unreachable!("attributes are validated at construction"),
    }
}

impl Deref for DatasetLogging {
    type Target = Dataset;

    fn deref(&self) -> &Dataset {
        &self.0
    }
}

impl Sealed for DatasetLogging {
    fn vertex(&self) -> &Rc<VertexInner> {
        &self.0 .0
    }
}

impl Vertex for DatasetLogging {
    fn read_only(&self) -> bool {
        self.0.read_only()
    }
}

impl fmt::Display for DatasetLogging {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<DatasetLogging {:?} shape={:?} dtype=record ({} metadata)>",
            self.0 .0.name,
            self.0.shape(),
            self.0 .0.metadata.len()
        )
    }
}

impl fmt::Debug for DatasetLogging {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
