//! The hierarchical graph model.
//!
//! A [`Graph`] owns [`Node`]s and [`Edge`]s addressed by string id. Both are
//! [`Attributable`]: they carry typed attribute stores plus canonical
//! source-location attributes. Hierarchy (parent/children, levels, roots) is
//! tracked on the graph and recomputed by [`Graph::finalize`].

pub mod attributes;
pub mod edge;
pub mod graph;
pub mod node;
pub mod range;

pub use attributes::AttributeStore;
pub use edge::Edge;
pub use graph::Graph;
pub use node::{Node, UNKNOWN_TYPE};
pub use range::Range;

/// Canonical attribute names.
pub mod attr {
    /// Display name of the element.
    pub const SOURCE_NAME: &str = "Source.Name";
    /// Filename (without directory) the element comes from.
    pub const SOURCE_FILE: &str = "Source.File";
    /// Project-relative directory of the element's file.
    pub const SOURCE_PATH: &str = "Source.Path";
    /// 1-based line of the element's name.
    pub const SOURCE_LINE: &str = "Source.Line";
    /// 1-based column of the element's name.
    pub const SOURCE_COLUMN: &str = "Source.Column";
    /// Range attribute covering the whole element.
    pub const SOURCE_RANGE: &str = "SourceRange";
    /// Range attribute covering just the element's name.
    pub const SELECTION_RANGE: &str = "SelectionRange";
    /// Mirror of the node id.
    pub const LINKAGE_NAME: &str = "Linkage.Name";
    /// Hover text prefetched from the language server.
    pub const HOVER_TEXT: &str = "HoverText";
    /// Lines of code.
    pub const LOC: &str = "Metric.Lines.LOC";
    /// Hierarchy level written by the finalizer.
    pub const METRICS_LEVEL: &str = "Metrics.Level";
    /// Methods per class, recorded by the package correction pass.
    pub const NUM_METHODS: &str = "Num_Methods";
    /// Toggle set on symbols the server tags as deprecated.
    pub const DEPRECATED: &str = "Deprecated";
}

/// Shared access to an element's attribute stores.
pub trait Attributable {
    /// The element's attribute stores.
    fn attrs(&self) -> &AttributeStore;
    /// Mutable access to the attribute stores.
    fn attrs_mut(&mut self) -> &mut AttributeStore;
}
