//! The tree container: a node owning the cross-level index of all of
//! its descendants.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use regex::Regex;
use tracing::{debug, instrument};

use super::sealed::Sealed;
use super::vertex::{self, GroupState, VertexInner, VertexKind};
use super::{Dataset, DatasetLogging, DatasetOptions, LoggingOptions, Node, Vertex};
use crate::errors::{Error, Result};
use crate::metadata::{Metadata, Value};
use crate::path;

/// A container node. Its index maps the relative path of **every**
/// descendant (not just direct children) to that descendant, so lookups
/// from any ancestor are O(1).
#[derive(Clone)]
pub struct Group(pub(crate) Rc<VertexInner>);

/// Options for creating or requiring a group.
#[derive(Clone, Debug, Default)]
pub struct GroupOptions {
    read_only: Option<bool>,
    metadata: IndexMap<String, Value>,
}

impl GroupOptions {
    pub fn new() -> Self {
        GroupOptions::default()
    }

    /// Read-only mode of the new group; defaults to the mode of the
    /// group it is created in.
    pub fn read_only(mut self, value: bool) -> Self {
        self.read_only = Some(value);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Regular-expression filter over local names for [`Group::groups_filtered`]
/// and [`Group::datasets_filtered`]. Both patterns use search semantics
/// (match anywhere in the local name); an `exclude` match wins over an
/// `include` match.
#[derive(Clone, Debug, Default)]
pub struct NodeFilter {
    exclude: Option<Regex>,
    include: Option<Regex>,
}

impl NodeFilter {
    pub fn new() -> Self {
        NodeFilter::default()
    }

    pub fn exclude(mut self, pattern: &str) -> Result<Self> {
        self.exclude = Some(compile(pattern)?);
        Ok(self)
    }

    pub fn include(mut self, pattern: &str) -> Result<Self> {
        self.include = Some(compile(pattern)?);
        Ok(self)
    }

    fn matches(&self, local_name: &str) -> bool {
        if let Some(exclude) = &self.exclude {
            if exclude.is_match(local_name) {
                return false;
            }
        }
        if let Some(include) = &self.include {
            if !include.is_match(local_name) {
                return false;
            }
        }
        true
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::InvalidArgument(format!("bad pattern: {e}")))
}

impl Group {
    /// A standalone root group named `/`.
    pub fn root() -> Group {
        Group::root_with(IndexMap::new())
    }

    /// A standalone root group carrying the given metadata.
    pub fn root_with(metadata: IndexMap<String, Value>) -> Group {
        Group(vertex::detached(
            "/",
            None,
            false,
            Metadata::new(false, "/", metadata),
            VertexKind::Group(GroupState::default()),
        ))
    }

    pub(crate) fn attach_new(
        parent: &Group,
        local_name: &str,
        read_only: bool,
        metadata: IndexMap<String, Value>,
    ) -> Result<Group> {
        let inner = vertex::attach(
            parent,
            local_name,
            read_only,
            metadata,
            VertexKind::Group(GroupState::default()),
        )?;
        Ok(Group(inner))
    }

    /// Creates a new group, creating any missing intermediate groups.
    pub fn create_group(&self, name: &str) -> Result<Group> {
        self.create_group_with(name, GroupOptions::default())
    }

    /// Creates a new group with explicit options, creating any missing
    /// intermediate groups with the resolved read-only mode.
    #[instrument(skip_all, fields(name = %name))]
    pub fn create_group_with(&self, name: &str, options: GroupOptions) -> Result<Group> {
        self.ensure_writable()?;
        let read_only = options.read_only.unwrap_or_else(|| self.read_only());
        let (local, parent) = self.create_ancestors(name, read_only)?;
        Group::attach_new(&parent, &local, read_only, options.metadata)
    }

    /// Idempotent variant of [`Group::create_group_with`]: an existing
    /// group gets its read-only flag updated (if given) and the metadata
    /// merged in.
    pub fn require_group(&self, name: &str, options: GroupOptions) -> Result<Group> {
        let key = path::normalize(name);
        match self.find(&key) {
            Some(Node::Group(group)) => {
                if let Some(read_only) = options.read_only {
                    group.set_read_only(read_only);
                }
                group.add_metadata(options.metadata)?;
                Ok(group)
            }
            Some(_) => Err(Error::DuplicateName(key)),
            None => self.create_group_with(&key, options),
        }
    }

    /// Creates a new dataset, creating any missing intermediate groups.
    #[instrument(skip_all, fields(name = %name))]
    pub fn create_dataset(&self, name: &str, options: DatasetOptions) -> Result<Dataset> {
        self.ensure_writable()?;
        let read_only = options.read_only.unwrap_or_else(|| self.read_only());
        let (local, parent) = self.create_ancestors(name, read_only)?;
        let data = options.build_data()?;
        Dataset::attach_new(&parent, &local, read_only, options.into_metadata(), data)
    }

    /// Idempotent variant of [`Group::create_dataset`]: an existing
    /// dataset gets its read-only flag updated (if given) and the
    /// metadata merged in. The construction fields (shape, dtype, data)
    /// are never applied to an existing dataset.
    pub fn require_dataset(&self, name: &str, options: DatasetOptions) -> Result<Dataset> {
        let key = path::normalize(name);
        match self.find(&key) {
            Some(node) => match node.as_dataset() {
                Some(dataset) => {
                    if let Some(read_only) = options.read_only {
                        dataset.set_read_only(read_only);
                    }
                    dataset.add_metadata(options.into_metadata())?;
                    Ok(dataset)
                }
                None => Err(Error::DuplicateName(key)),
            },
            None => self.create_dataset(&key, options),
        }
    }

    /// Creates a dataset that appends structured log records.
    #[instrument(skip_all, fields(name = %name))]
    pub fn create_dataset_logging(
        &self,
        name: &str,
        options: LoggingOptions,
    ) -> Result<DatasetLogging> {
        self.ensure_writable()?;
        // Logging datasets are created writable; ancestors inherit that.
        let (local, parent) = self.create_ancestors(name, false)?;
        DatasetLogging::attach_new(&parent, &local, options)
    }

    /// Requires that a logging dataset exists. An existing plain dataset
    /// with a record buffer and the logging marker metadata is
    /// re-registered as a logging dataset; anything else with the same
    /// name fails.
    pub fn require_dataset_logging(
        &self,
        name: &str,
        options: LoggingOptions,
    ) -> Result<DatasetLogging> {
        let key = path::normalize(name);
        match self.find(&key) {
            Some(Node::DatasetLogging(logging)) => {
                if let Some(attributes) = options.attribute_names() {
                    if logging.attributes() != attributes {
                        return Err(Error::InvalidArgument(format!(
                            "the attribute names of the existing logging dataset are \
                             {:?} which does not equal {:?}",
                            logging.attributes(),
                            attributes
                        )));
                    }
                }
                Ok(logging)
            }
            Some(Node::Dataset(dataset)) => self.rebuild_as_logging(&key, dataset, options),
            Some(Node::Group(_)) => Err(Error::DuplicateName(key)),
            None => self.create_dataset_logging(&key, options),
        }
    }

    /// Replaces an existing plain dataset carrying logged rows with a
    /// logging dataset holding the same data.
    fn rebuild_as_logging(
        &self,
        key: &str,
        dataset: Dataset,
        options: LoggingOptions,
    ) -> Result<DatasetLogging> {
        let meta = dataset.metadata();
        let markers_present = meta.contains_key("logging_level")
            && meta.contains_key("logging_level_name")
            && meta.contains_key("logging_date_format");
        if !markers_present {
            return Err(Error::InvalidArgument(
                "the required dataset was found but it is not used for logging".to_string(),
            ));
        }
        let data = dataset.data().clone();
        let names: Vec<String> = match data.records() {
            Some(records) => records.names().to_vec(),
            None => {
                return Err(Error::InvalidArgument(
                    "the required dataset was found but it does not hold record data".to_string(),
                ))
            }
        };
        if let Some(attributes) = options.attribute_names() {
            if names != attributes {
                return Err(Error::InvalidArgument(format!(
                    "the attribute names of the existing logging dataset are {names:?} \
                     which does not equal {attributes:?}"
                )));
            }
        }
        let date_fmt = meta
            .get("logging_date_format")
            .and_then(|v| v.as_str().map(str::to_string));

        self.detach(key);
        // The rebuild bypasses the read-only guard the way the original
        // temporarily unfreezes the group, without cascading.
        let was_read_only = self.0.read_only.get();
        self.0.read_only.set(false);
        let mut options = options
            .attributes(names)
            .data(data)
            .metadata_map(meta.to_map());
        if let Some(date_fmt) = date_fmt {
            options = options.date_fmt(date_fmt);
        }
        let result = self.create_dataset_logging(key, options);
        self.0.read_only.set(was_read_only);
        result
    }

    /// Deep-copies an externally-constructed subtree under `name`,
    /// preserving nested structure, metadata and read-only modes.
    pub fn add_group(&self, name: &str, group: &Group) -> Result<Group> {
        self.ensure_writable()?;
        let base = path::normalize(name);
        let target = self.create_group_with(
            &base,
            GroupOptions {
                read_only: Some(group.read_only()),
                metadata: group.metadata().to_map(),
            },
        )?;
        for (key, node) in group.entries() {
            let child_name = format!("{base}{key}");
            match node {
                Node::Group(child) => {
                    self.create_group_with(
                        &child_name,
                        GroupOptions {
                            read_only: Some(child.read_only()),
                            metadata: child.metadata().to_map(),
                        },
                    )?;
                }
                Node::Dataset(child) => {
                    self.copy_dataset_to(&child_name, &child)?;
                }
                Node::DatasetLogging(child) => {
                    // A copied subtree carries the rows but not the
                    // subscription; the copy is a plain dataset.
                    self.copy_dataset_to(&child_name, &child)?;
                }
            }
        }
        Ok(target)
    }

    /// Deep-copies a dataset (buffer and metadata) into this tree under
    /// `name`.
    pub fn add_dataset(&self, name: &str, dataset: &Dataset) -> Result<Dataset> {
        self.ensure_writable()?;
        self.copy_dataset_to(&path::normalize(name), dataset)
    }

    fn copy_dataset_to(&self, name: &str, dataset: &Dataset) -> Result<Dataset> {
        self.create_dataset(
            name,
            DatasetOptions::new()
                .read_only(dataset.read_only())
                .data(dataset.data().clone())
                .metadata_map(dataset.metadata().to_map()),
        )
    }

    /// Deep-copies a logging dataset, keeping its level, attributes,
    /// date format and sink subscription.
    pub fn add_dataset_logging(
        &self,
        name: &str,
        logging: &DatasetLogging,
    ) -> Result<DatasetLogging> {
        self.ensure_writable()?;
        let mut options = LoggingOptions::new()
            .level(logging.level())
            .attributes(logging.attributes().to_vec())
            .date_fmt(logging.date_fmt().to_string())
            .data(logging.data().clone())
            .metadata_map(logging.metadata().to_map());
        if let Some(sink) = logging.sink() {
            options = options.sink(sink);
        }
        self.create_dataset_logging(&path::normalize(name), options)
    }

    /// Removes a node and its whole subtree from this tree. Absence is
    /// success, not an error; the detached subtree stays internally
    /// consistent and usable standalone.
    #[instrument(skip_all, fields(name = %name))]
    pub fn remove(&self, name: &str) -> Result<Option<Node>> {
        self.ensure_writable()?;
        Ok(self.detach(&path::normalize(name)))
    }

    fn detach(&self, key: &str) -> Option<Node> {
        let popped = self.0.group_state().index.borrow_mut().shift_remove(key)?;

        // Scrub every index that may still reference the popped node or
        // one of its descendants: the chain from the popped node's
        // direct parent up to the root covers the intermediate groups,
        // this group, and every ancestor above it.
        let prefix = format!("{}/", popped.vertex_rc().name);
        let mut holder = popped.vertex_rc().parent_group();
        while let Some(group) = holder {
            group.0.group_state().index.borrow_mut().retain(|_, node| {
                !Rc::ptr_eq(node.vertex_rc(), popped.vertex_rc())
                    && !node.vertex_rc().name.starts_with(&prefix)
            });
            holder = group.parent();
        }

        // The subtree becomes a standalone root.
        *popped.vertex_rc().parent.borrow_mut() = None;
        debug!(name = %popped.vertex_rc().name, "detached subtree");
        Some(popped)
    }

    /// Direct index hit for a node at `name` (relative to this group).
    pub fn get(&self, name: &str) -> Result<Node> {
        self.find(name).ok_or_else(|| Error::NotFound {
            key: path::key(name),
            owner: self.name(),
        })
    }

    /// Like [`Group::get`], with absence as `None`.
    pub fn find(&self, name: &str) -> Option<Node> {
        let key = path::key(name);
        self.0.group_state().index.borrow().get(&key).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// The group at `name`; fails when the node is of another kind.
    pub fn group(&self, name: &str) -> Result<Group> {
        self.get(name)?.into_group()
    }

    /// The dataset at `name`; fails when the node is of another kind.
    pub fn dataset(&self, name: &str) -> Result<Dataset> {
        self.get(name)?.into_dataset()
    }

    /// Snapshot of the index: every descendant with its relative key,
    /// in insertion order.
    pub fn entries(&self) -> Vec<(String, Node)> {
        self.0
            .group_state()
            .index
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Number of indexed descendants.
    pub fn len(&self) -> usize {
        self.0.group_state().index.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.group_state().index.borrow().is_empty()
    }

    /// Every descendant group, in insertion order.
    pub fn groups(&self) -> impl Iterator<Item = Group> {
        self.nodes().into_iter().filter_map(|node| node.as_group())
    }

    /// Descendant groups whose local name passes `filter`.
    pub fn groups_filtered(&self, filter: &NodeFilter) -> impl Iterator<Item = Group> {
        let filter = filter.clone();
        self.groups().filter(move |g| filter.matches(&g.local_name()))
    }

    /// Every descendant dataset (plain and logging), in insertion order.
    pub fn datasets(&self) -> impl Iterator<Item = Dataset> {
        self.nodes().into_iter().filter_map(|node| node.as_dataset())
    }

    /// Descendant datasets whose local name passes `filter`.
    pub fn datasets_filtered(&self, filter: &NodeFilter) -> impl Iterator<Item = Dataset> {
        let filter = filter.clone();
        self.datasets()
            .filter(move |d| filter.matches(&d.local_name()))
    }

    /// Direct child groups only (one level).
    pub fn descendants(&self) -> Vec<Group> {
        self.entries()
            .into_iter()
            .filter(|(key, _)| !key[1..].contains(path::SEPARATOR))
            .filter_map(|(_, node)| node.as_group())
            .collect()
    }

    /// Renders the subtree listing, indented per level.
    pub fn tree(&self, indent: usize) -> String {
        let mut entries = self.entries();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let mut out = self.to_string();
        for (key, node) in entries {
            out.push('\n');
            out.push_str(&" ".repeat(indent * key.matches(path::SEPARATOR).count()));
            out.push_str(&node.to_string());
        }
        out
    }

    fn nodes(&self) -> Vec<Node> {
        self.0
            .group_state()
            .index
            .borrow()
            .values()
            .cloned()
            .collect()
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.read_only() {
            return Err(Error::ReadOnly(self.name()));
        }
        Ok(())
    }

    /// Creates the missing intermediate groups of `name` with the given
    /// read-only mode, reusing existing ones unchanged. Returns the
    /// terminal segment and its parent.
    fn create_ancestors(&self, name: &str, read_only: bool) -> Result<(String, Group)> {
        let normalized = path::normalize(name);
        let segments: Vec<&str> = normalized[1..].split(path::SEPARATOR).collect();
        let mut parent = self.clone();
        for segment in &segments[..segments.len() - 1] {
            parent = match parent.find(segment) {
                Some(node) => node.into_group()?,
                None => Group::attach_new(&parent, segment, read_only, IndexMap::new())?,
            };
        }
        Ok((segments[segments.len() - 1].to_string(), parent))
    }
}

impl Sealed for Group {
    fn vertex(&self) -> &Rc<VertexInner> {
        &self.0
    }
}

impl Vertex for Group {}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Group {:?} ({} groups, {} datasets, {} metadata)>",
            self.0.name,
            self.groups().count(),
            self.datasets().count(),
            self.0.metadata.len()
        )
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
