//! Helpers for the `/`-delimited naming scheme of the tree.
//!
//! Every node carries an absolute, slash-delimited name analogous to a
//! UNIX file path. Groups index their descendants under *relative* keys:
//! the key of a node at an ancestor at distance `d` is `/` followed by
//! the trailing `d` segments of the node's absolute name.

use crate::errors::{Error, Result};

pub(crate) const SEPARATOR: char = '/';

/// Normalizes a user-supplied path for the create/require/add/remove
/// family: strips surrounding separators and prepends a single one.
pub(crate) fn normalize(name: &str) -> String {
    format!("/{}", name.trim_matches(SEPARATOR))
}

/// Normalizes a lookup key: the index keys all start with a separator.
pub(crate) fn key(name: &str) -> String {
    if name.starts_with(SEPARATOR) {
        name.to_string()
    } else {
        format!("/{name}")
    }
}

/// Composes a child's absolute name from its parent's name and the
/// child's local name. The root is named `/`, so no separator is
/// inserted after a parent name that already ends in one.
pub(crate) fn join(parent: &str, local: &str) -> String {
    if parent.ends_with(SEPARATOR) {
        format!("{parent}{local}")
    } else {
        format!("{parent}/{local}")
    }
}

/// The trailing segment of an absolute name.
pub(crate) fn local_name(absolute: &str) -> &str {
    match absolute.rsplit_once(SEPARATOR) {
        Some((_, local)) => local,
        None => absolute,
    }
}

/// Validates the local name of a non-root node: it must be non-empty and
/// must not itself contain a separator (separators only arise from
/// composing with the parent's name).
pub(crate) fn validate_local_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidArgument(
            "a node name must be a non-empty string".to_string(),
        ));
    }
    if name.contains(SEPARATOR) {
        return Err(Error::InvalidArgument(format!(
            "the node name {name:?} cannot contain the {SEPARATOR:?} character",
        )));
    }
    Ok(())
}

/// The segments of an absolute name, in order.
pub(crate) fn segments(absolute: &str) -> Vec<&str> {
    absolute
        .split(SEPARATOR)
        .filter(|s| !s.is_empty())
        .collect()
}

/// The relative key of a node at an ancestor `distance` levels above it,
/// derived from the trailing segments of the node's absolute name.
pub(crate) fn relative_key(segments: &[&str], distance: usize) -> String {
    format!("/{}", segments[segments.len() - distance..].join("/"))
}
