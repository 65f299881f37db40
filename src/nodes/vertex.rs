//! The shared identity and lifecycle machinery behind every node.
//!
//! A vertex is registered into the index of *every* ancestor under the
//! path relative to that ancestor, so any node is reachable in O(1) from
//! any ancestor. Creation validates the relative key against every
//! affected ancestor before touching any index, removal scrubs every
//! index above the removal point, and the read-only flag cascades down
//! through the whole subtree.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use tracing::debug;

use super::{Group, Node};
use crate::data::ArrayData;
use crate::errors::{Error, Result};
use crate::logging::{Level, LogSink};
use crate::metadata::{Metadata, Value};
use crate::path;

pub(crate) struct VertexInner {
    /// Absolute, `/`-delimited name, unique across the entire tree.
    pub(crate) name: String,
    /// Non-owning back-reference; the parent owns this vertex through
    /// its index.
    pub(crate) parent: RefCell<Option<Weak<VertexInner>>>,
    pub(crate) read_only: Cell<bool>,
    pub(crate) metadata: Metadata,
    pub(crate) kind: VertexKind,
}

pub(crate) enum VertexKind {
    Group(GroupState),
    Dataset(DatasetState),
    DatasetLogging(DatasetState, LoggingState),
}

#[derive(Default)]
pub(crate) struct GroupState {
    /// The cross-level index: every descendant, keyed by its path
    /// relative to this group, in insertion order.
    pub(crate) index: RefCell<IndexMap<String, Node>>,
}

pub(crate) struct DatasetState {
    pub(crate) data: RefCell<ArrayData>,
    /// Whether the buffer currently permits writes; the node-level
    /// read-only flag cascades into this.
    pub(crate) writable: Cell<bool>,
}

pub(crate) struct LoggingState {
    /// Column layout of the record buffer, in order.
    pub(crate) attributes: Vec<String>,
    pub(crate) date_fmt: String,
    pub(crate) level: Cell<Level>,
    pub(crate) auto_resize: bool,
    /// Next free slot; distinct from the buffer's physical size in
    /// auto-resize mode.
    pub(crate) cursor: Cell<usize>,
    pub(crate) sink: RefCell<Option<Rc<dyn LogSink>>>,
}

impl VertexInner {
    pub(crate) fn group_state(&self) -> &GroupState {
        match &self.kind {
            VertexKind::Group(state) => state,
            _ => unreachable!("vertex {:?} is not a group", self.name),
        }
    }

    pub(crate) fn dataset_state(&self) -> &DatasetState {
        match &self.kind {
            VertexKind::Dataset(state) | VertexKind::DatasetLogging(state, _) => state,
            VertexKind::Group(_) => unreachable!("vertex {:?} is not a dataset", self.name),
        }
    }

    pub(crate) fn logging_state(&self) -> &LoggingState {
        match &self.kind {
            VertexKind::DatasetLogging(_, state) => state,
            _ => unreachable!("vertex {:?} is not a logging dataset", self.name),
        }
    }

    pub(crate) fn parent_group(&self) -> Option<Group> {
        self.parent
            .borrow()
            .as_ref()
            .and_then(Weak::upgrade)
            .map(Group)
    }
}

/// Creates a vertex under `parent` and registers it with every ancestor.
///
/// The relative key is checked for collisions at every affected ancestor
/// before any index is touched, so a naming conflict leaves the whole
/// tree unchanged.
pub(crate) fn attach(
    parent: &Group,
    local_name: &str,
    read_only: bool,
    metadata: IndexMap<String, Value>,
    kind: VertexKind,
) -> Result<Rc<VertexInner>> {
    path::validate_local_name(local_name)?;

    let absolute = path::join(&parent.0.name, local_name);
    let segments = path::segments(&absolute);

    let mut targets: Vec<(Rc<VertexInner>, String)> = Vec::new();
    let mut ancestor = Some(Rc::clone(&parent.0));
    while let Some(current) = ancestor {
        let key = path::relative_key(&segments, targets.len() + 1);
        if current.group_state().index.borrow().contains_key(&key) {
            return Err(Error::DuplicateName(key));
        }
        let next = current.parent.borrow().as_ref().and_then(Weak::upgrade);
        targets.push((current, key));
        ancestor = next;
    }

    let inner = Rc::new(VertexInner {
        name: absolute.clone(),
        parent: RefCell::new(Some(Rc::downgrade(&parent.0))),
        read_only: Cell::new(read_only),
        metadata: Metadata::new(read_only, absolute.as_str(), metadata),
        kind,
    });

    let node = Node::from_inner(&inner);
    for (ancestor, key) in targets {
        ancestor
            .group_state()
            .index
            .borrow_mut()
            .insert(key, node.clone());
    }
    debug!(name = %absolute, "created vertex");
    Ok(inner)
}

/// Builds a vertex that is not registered in any tree: a root group, a
/// copied dataset, or an arithmetic result.
pub(crate) fn detached(
    name: impl Into<String>,
    parent: Option<Weak<VertexInner>>,
    read_only: bool,
    metadata: Metadata,
    kind: VertexKind,
) -> Rc<VertexInner> {
    Rc::new(VertexInner {
        name: name.into(),
        parent: RefCell::new(parent),
        read_only: Cell::new(read_only),
        metadata,
        kind,
    })
}

/// Propagates the read-only mode to the vertex itself, its metadata, its
/// buffer (datasets) and every indexed descendant. Never propagates
/// upward.
pub(crate) fn cascade_read_only(inner: &Rc<VertexInner>, value: bool) {
    inner.read_only.set(value);
    inner.metadata.set_read_only(value);
    match &inner.kind {
        VertexKind::Group(state) => {
            let children: Vec<Node> = state.index.borrow().values().cloned().collect();
            for child in children {
                cascade_read_only(child.vertex_rc(), value);
            }
        }
        VertexKind::Dataset(state) | VertexKind::DatasetLogging(state, _) => {
            state.writable.set(!value);
        }
    }
}
