//! Graph nodes: directories, files and program symbols.

use std::collections::BTreeSet;

use super::attributes::AttributeStore;
use super::range::Range;
use super::{attr, Attributable};

/// Type name applied when an element was built without one.
pub const UNKNOWN_TYPE: &str = "UNKNOWNTYPE";

/// A node in the hierarchical graph.
///
/// Hierarchy and edge membership are kept as ids rather than references; the
/// owning [`super::Graph`] is the arena that resolves them. This keeps the
/// parent/child and node/edge relations free of reference cycles.
#[derive(Debug, Clone)]
pub struct Node {
    id: String,
    type_name: String,
    attrs: AttributeStore,
    pub(super) parent: Option<String>,
    pub(super) children: Vec<String>,
    pub(super) level: u32,
    pub(super) incoming: BTreeSet<String>,
    pub(super) outgoing: BTreeSet<String>,
}

impl Node {
    /// Creates a detached node of the given type.
    pub fn new(type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        Self {
            id: String::new(),
            type_name: if type_name.is_empty() {
                UNKNOWN_TYPE.to_string()
            } else {
                type_name
            },
            attrs: AttributeStore::new(),
            parent: None,
            children: Vec::new(),
            level: 0,
            incoming: BTreeSet::new(),
            outgoing: BTreeSet::new(),
        }
    }

    /// The unique id. Empty until assigned; immutable once the node is in a
    /// graph.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Assigns the id and mirrors it into the `Linkage.Name` attribute.
    pub fn set_id(&mut self, id: impl Into<String>) {
        let id = id.into();
        self.attrs.set_string(attr::LINKAGE_NAME, id.clone());
        self.id = id;
    }

    /// The element type, e.g. `"Function"` or `"Directory"`.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Non-unique display name (`Source.Name`).
    pub fn source_name(&self) -> &str {
        self.attrs.string(attr::SOURCE_NAME).unwrap_or_default()
    }

    /// Sets the display name.
    pub fn set_source_name(&mut self, name: impl Into<String>) {
        self.attrs.set_string(attr::SOURCE_NAME, name);
    }

    /// Parent node id, if any.
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Child node ids in insertion order.
    pub fn children(&self) -> &[String] {
        &self.children
    }

    /// Depth in the hierarchy; roots are level 0. Valid after
    /// [`super::Graph::finalize`].
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Ids of edges pointing at this node.
    pub fn incoming(&self) -> impl Iterator<Item = &str> {
        self.incoming.iter().map(String::as_str)
    }

    /// Ids of edges leaving this node.
    pub fn outgoing(&self) -> impl Iterator<Item = &str> {
        self.outgoing.iter().map(String::as_str)
    }

    /// Two nodes are isomorphic when every attribute store matches. Used only
    /// before a node is added to the graph.
    pub fn is_isomorphic(&self, other: &Node) -> bool {
        self.type_name == other.type_name && self.attrs.has_same_attributes(&other.attrs)
    }
}

impl Attributable for Node {
    fn attrs(&self) -> &AttributeStore {
        &self.attrs
    }

    fn attrs_mut(&mut self) -> &mut AttributeStore {
        &mut self.attrs
    }
}

/// Source-location helpers shared by graph elements.
impl Node {
    /// The source range, synthesising a degenerate one-character range from
    /// `Source.Line`/`Source.Column` when no explicit range was stored.
    pub fn source_range(&self) -> Option<Range> {
        if let Some(r) = self.attrs.range(attr::SOURCE_RANGE) {
            return Some(r);
        }
        let line = self.attrs.int(attr::SOURCE_LINE)?;
        let column = self.attrs.int(attr::SOURCE_COLUMN).unwrap_or(1);
        // Stored 1-based; ranges are 0-based.
        Some(Range::degenerate(
            (line - 1).max(0) as u32,
            (column - 1).max(0) as u32,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_type_falls_back_to_unknown() {
        let node = Node::new("");
        assert_eq!(node.type_name(), UNKNOWN_TYPE);
    }

    #[test]
    fn set_id_mirrors_linkage_name() {
        let mut node = Node::new("Class");
        node.set_id("pkg.Foo");
        assert_eq!(node.id(), "pkg.Foo");
        assert_eq!(node.attrs().string(attr::LINKAGE_NAME), Some("pkg.Foo"));
    }

    #[test]
    fn source_range_prefers_explicit_range() {
        let mut node = Node::new("Method");
        node.attrs_mut().set_int(attr::SOURCE_LINE, 10);
        node.attrs_mut()
            .set_range(attr::SOURCE_RANGE, &Range::new(3, 0, 9, 1));
        assert_eq!(node.source_range(), Some(Range::new(3, 0, 9, 1)));
    }

    #[test]
    fn source_range_synthesised_from_line() {
        let mut node = Node::new("Variable");
        node.attrs_mut().set_int(attr::SOURCE_LINE, 10);
        node.attrs_mut().set_int(attr::SOURCE_COLUMN, 5);
        // 1-based attributes become a 0-based one-character range.
        assert_eq!(node.source_range(), Some(Range::degenerate(9, 4)));
    }

    #[test]
    fn source_range_absent_without_line() {
        let node = Node::new("File");
        assert_eq!(node.source_range(), None);
    }

    #[test]
    fn isomorphism_compares_type_and_attributes() {
        let mut a = Node::new("Class");
        a.set_source_name("Foo");
        let mut b = Node::new("Class");
        b.set_source_name("Foo");
        assert!(a.is_isomorphic(&b));

        b.attrs_mut().set_int("Metric.Lines.LOC", 1);
        assert!(!a.is_isomorphic(&b));

        let mut c = Node::new("Interface");
        c.set_source_name("Foo");
        assert!(!a.is_isomorphic(&c));
    }
}
