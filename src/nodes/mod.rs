//! The node kinds of the tree: groups, datasets and logging datasets.
//!
//! Node handles are cheap to clone; clones refer to the same vertex.
//! The kinds form a closed set, discriminated by the [`Node`] enum.

mod dataset;
mod dataset_logging;
mod group;
pub(crate) mod vertex;

use std::fmt;
use std::rc::Rc;

pub use dataset::{Dataset, DatasetOptions};
pub use dataset_logging::{
    DatasetLogging, LoggingOptions, WeakDatasetLogging, DEFAULT_ATTRIBUTES, DEFAULT_DATE_FMT,
};
pub use group::{Group, GroupOptions, NodeFilter};

use crate::errors::{Error, Result};
use crate::metadata::{Metadata, Value};
use crate::path;
use vertex::{VertexInner, VertexKind};

mod sealed {
    use super::vertex::VertexInner;
    use std::rc::Rc;

    pub trait Sealed {
        fn vertex(&self) -> &Rc<VertexInner>;
    }
}

use sealed::Sealed;

/// The identity surface shared by every node kind.
pub trait Vertex: Sealed {
    /// The absolute, `/`-delimited name of this node.
    fn name(&self) -> String {
        self.vertex().name.clone()
    }

    /// The trailing segment of the absolute name.
    fn local_name(&self) -> String {
        path::local_name(&self.vertex().name).to_string()
    }

    /// The parent group, while this node is attached to one.
    fn parent(&self) -> Option<Group> {
        self.vertex().parent_group()
    }

    /// The parent chain up to the root, exclusive of self.
    fn ancestors(&self) -> Vec<Group> {
        let mut out = Vec::new();
        let mut current = self.parent();
        while let Some(group) = current {
            current = group.parent();
            out.push(group);
        }
        out
    }

    /// The metadata record attached to this node.
    fn metadata(&self) -> Metadata {
        self.vertex().metadata.clone()
    }

    /// Whether this node is in read-only mode.
    fn read_only(&self) -> bool {
        self.vertex().read_only.get()
    }

    /// Sets the read-only mode, cascading to the metadata, the buffer
    /// and every descendant. Never fails and never propagates upward.
    fn set_read_only(&self, value: bool) {
        vertex::cascade_read_only(self.vertex(), value);
    }

    /// Adds key-value pairs to this node's metadata.
    fn add_metadata<I, K, V>(&self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.metadata().update(pairs)
    }

    /// Whether two handles refer to the same vertex.
    fn vertex_eq(&self, other: &impl Vertex) -> bool {
        Rc::ptr_eq(self.vertex(), other.vertex())
    }
}

/// Any addressable entity in the tree.
#[derive(Clone)]
pub enum Node {
    Group(Group),
    Dataset(Dataset),
    DatasetLogging(DatasetLogging),
}

impl Node {
    pub(crate) fn from_inner(inner: &Rc<VertexInner>) -> Node {
        match &inner.kind {
            VertexKind::Group(_) => Node::Group(Group(Rc::clone(inner))),
            VertexKind::Dataset(_) => Node::Dataset(Dataset(Rc::clone(inner))),
            VertexKind::DatasetLogging(..) => {
                Node::DatasetLogging(DatasetLogging(Dataset(Rc::clone(inner))))
            }
        }
    }

    pub(crate) fn vertex_rc(&self) -> &Rc<VertexInner> {
        self.vertex()
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Node::Group(_))
    }

    /// Whether this node wraps an array buffer; true for logging
    /// datasets as well.
    pub fn is_dataset(&self) -> bool {
        matches!(self, Node::Dataset(_) | Node::DatasetLogging(_))
    }

    pub fn is_dataset_logging(&self) -> bool {
        matches!(self, Node::DatasetLogging(_))
    }

    pub fn as_group(&self) -> Option<Group> {
        match self {
            Node::Group(group) => Some(group.clone()),
            _ => None,
        }
    }

    /// The dataset view of this node, for both plain and logging
    /// datasets.
    pub fn as_dataset(&self) -> Option<Dataset> {
        match self {
            Node::Dataset(dataset) => Some(dataset.clone()),
            Node::DatasetLogging(logging) => Some(logging.as_dataset()),
            Node::Group(_) => None,
        }
    }

    pub fn as_dataset_logging(&self) -> Option<DatasetLogging> {
        match self {
            Node::DatasetLogging(logging) => Some(logging.clone()),
            _ => None,
        }
    }

    pub fn into_group(self) -> Result<Group> {
        match self {
            Node::Group(group) => Ok(group),
            other => Err(Error::TypeMismatch {
                expected: "a group",
                found: other.kind_name(),
            }),
        }
    }

    pub fn into_dataset(self) -> Result<Dataset> {
        match self.as_dataset() {
            Some(dataset) => Ok(dataset),
            None => Err(Error::TypeMismatch {
                expected: "a dataset",
                found: self.kind_name(),
            }),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Group(_) => "a group",
            Node::Dataset(_) => "a dataset",
            Node::DatasetLogging(_) => "a logging dataset",
        }
    }

    /// Whether two handles refer to the same vertex.
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(self.vertex(), other.vertex())
    }
}

impl Sealed for Node {
    fn vertex(&self) -> &Rc<VertexInner> {
        match self {
            Node::Group(group) => group.vertex(),
            Node::Dataset(dataset) => dataset.vertex(),
            Node::DatasetLogging(logging) => logging.vertex(),
        }
    }
}

impl Vertex for Node {
    fn read_only(&self) -> bool {
        match self {
            Node::Group(group) => group.read_only(),
            Node::Dataset(dataset) => dataset.read_only(),
            Node::DatasetLogging(logging) => logging.read_only(),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Group(group) => fmt::Display::fmt(group, f),
            Node::Dataset(dataset) => fmt::Display::fmt(dataset, f),
            Node::DatasetLogging(logging) => fmt::Display::fmt(logging, f),
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
