//! The logging-sink collaborator contract and the in-crate reference
//! sink.
//!
//! A sink exposes a mutable severity level and add/remove of
//! handler-like subscribers; the adapter's `emit` is invoked
//! synchronously, one structured [`Record`] per event. There is no
//! implicit global sink: subscriptions are always explicit.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use chrono::{DateTime, Local};
use tracing::debug;

use crate::errors::{Error, Result};
use crate::nodes::{DatasetLogging, WeakDatasetLogging};

/// Severity of a log record, ordered from unset to critical.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Level {
    NotSet = 0,
    Debug = 10,
    Info = 20,
    Warning = 30,
    Error = 40,
    Critical = 50,
}

impl Level {
    pub fn name(&self) -> &'static str {
        match self {
            Level::NotSet => "NOTSET",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
        }
    }

    /// The numeric severity value.
    pub fn value(self) -> i64 {
        self as i64
    }

    pub fn from_value(value: i64) -> Option<Level> {
        match value {
            0 => Some(Level::NotSet),
            10 => Some(Level::Debug),
            20 => Some(Level::Info),
            30 => Some(Level::Warning),
            40 => Some(Level::Error),
            50 => Some(Level::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Level {
    type Err = Error;

    fn from_str(s: &str) -> Result<Level> {
        match s {
            "NOTSET" => Ok(Level::NotSet),
            "DEBUG" => Ok(Level::Debug),
            "INFO" => Ok(Level::Info),
            "WARNING" => Ok(Level::Warning),
            "ERROR" => Ok(Level::Error),
            "CRITICAL" => Ok(Level::Critical),
            other => Err(Error::InvalidArgument(format!(
                "unknown logging level {other:?}"
            ))),
        }
    }
}

/// One structured log event.
#[derive(Clone, Debug)]
pub struct Record {
    /// Name of the originating logger.
    pub name: String,
    pub level: Level,
    pub message: String,
    pub created: DateTime<Local>,
}

impl Record {
    pub fn new(name: impl Into<String>, level: Level, message: impl Into<String>) -> Record {
        Record {
            name: name.into(),
            level,
            message: message.into(),
            created: Local::now(),
        }
    }
}

/// The minimal capability contract of an external logging sink: a
/// mutable severity level and add/remove of handler-like subscribers.
pub trait LogSink {
    fn level(&self) -> Level;

    fn set_level(&self, level: Level);

    fn add_handler(&self, handler: &DatasetLogging);

    fn remove_handler(&self, handler: &DatasetLogging);
}

struct LoggerInner {
    name: String,
    level: Cell<Level>,
    /// Subscribers are held weakly: the tree owns its logging datasets,
    /// and a log dropped from its tree simply stops receiving records.
    handlers: RefCell<Vec<WeakDatasetLogging>>,
}

/// The in-crate reference sink: dispatches records synchronously to
/// every subscribed adapter whose level admits them. Cheap to clone;
/// clones share the same subscriber list.
#[derive(Clone)]
pub struct Logger {
    inner: Rc<LoggerInner>,
}

impl Logger {
    /// A named logger with an unset level.
    pub fn new(name: impl Into<String>) -> Logger {
        Logger {
            inner: Rc::new(LoggerInner {
                name: name.into(),
                level: Cell::new(Level::NotSet),
                handlers: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Builds a record and forwards it to every live subscriber whose
    /// level admits it, gated by this logger's own level.
    pub fn log(&self, level: Level, message: impl Into<String>) -> Result<()> {
        let own = self.inner.level.get();
        if own != Level::NotSet && level < own {
            return Ok(());
        }
        let record = Record::new(self.inner.name.clone(), level, message);
        for handler in self.live_handlers() {
            if record.level >= handler.level() {
                handler.emit(&record)?;
            }
        }
        Ok(())
    }

    pub fn debug(&self, message: impl Into<String>) -> Result<()> {
        self.log(Level::Debug, message)
    }

    pub fn info(&self, message: impl Into<String>) -> Result<()> {
        self.log(Level::Info, message)
    }

    pub fn warning(&self, message: impl Into<String>) -> Result<()> {
        self.log(Level::Warning, message)
    }

    pub fn error(&self, message: impl Into<String>) -> Result<()> {
        self.log(Level::Error, message)
    }

    pub fn critical(&self, message: impl Into<String>) -> Result<()> {
        self.log(Level::Critical, message)
    }

    /// Live subscribers, pruning the ones whose dataset is gone.
    fn live_handlers(&self) -> Vec<DatasetLogging> {
        let mut handlers = self.inner.handlers.borrow_mut();
        handlers.retain(|weak| weak.upgrade().is_some());
        handlers.iter().filter_map(WeakDatasetLogging::upgrade).collect()
    }
}

impl LogSink for Logger {
    fn level(&self) -> Level {
        self.inner.level.get()
    }

    fn set_level(&self, level: Level) {
        self.inner.level.set(level);
    }

    fn add_handler(&self, handler: &DatasetLogging) {
        let mut handlers = self.inner.handlers.borrow_mut();
        let already = handlers
            .iter()
            .filter_map(WeakDatasetLogging::upgrade)
            .any(|existing| existing.ptr_eq(handler));
        if !already {
            handlers.push(handler.downgrade());
        } else {
            debug!(logger = %self.inner.name, "handler already subscribed");
        }
    }

    fn remove_handler(&self, handler: &DatasetLogging) {
        self.inner.handlers.borrow_mut().retain(|weak| {
            weak.upgrade()
                .map(|existing| !existing.ptr_eq(handler))
                .unwrap_or(false)
        });
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Logger {:?} level={} ({} handlers)>",
            self.inner.name,
            self.inner.level.get(),
            self.inner.handlers.borrow().len()
        )
    }
}
