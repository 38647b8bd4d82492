//! Import configuration: which project, which server, which graph elements.

use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;
use lsp_types::{ServerCapabilities, SymbolKind};

/// Semantic edge kinds the importer can extract.
///
/// The variant order is the fixed order relation queries are issued in for
/// every node during the edge phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum)]
pub enum EdgeKind {
    /// `textDocument/definition`.
    Definition,
    /// `textDocument/declaration`.
    Declaration,
    /// `textDocument/typeDefinition`.
    TypeDefinition,
    /// `textDocument/implementation`.
    Implementation,
    /// `textDocument/references`.
    Reference,
    /// `callHierarchy/outgoingCalls`.
    Call,
    /// `typeHierarchy/supertypes`.
    Extend,
}

impl EdgeKind {
    /// All kinds in query order.
    pub const ALL: [EdgeKind; 7] = [
        EdgeKind::Definition,
        EdgeKind::Declaration,
        EdgeKind::TypeDefinition,
        EdgeKind::Implementation,
        EdgeKind::Reference,
        EdgeKind::Call,
        EdgeKind::Extend,
    ];

    /// The edge type string written to the graph.
    pub fn edge_type(self) -> &'static str {
        match self {
            EdgeKind::Definition => "Definition",
            EdgeKind::Declaration => "Declaration",
            EdgeKind::TypeDefinition => "Of_Type",
            EdgeKind::Implementation => "Implementation_Of",
            EdgeKind::Reference => "Reference",
            EdgeKind::Call => "Call",
            EdgeKind::Extend => "Extend",
        }
    }

    /// Whether the stored edge runs against the semantic direction of the
    /// relation. Reference and implementation results name the *users* of
    /// the queried symbol, so their edges are the reversed ones.
    pub fn reversed(self) -> bool {
        matches!(self, EdgeKind::Implementation | EdgeKind::Reference)
    }

    /// Whether the query direction is swapped before insertion. A reference
    /// query already yields the reversed declaration-to-use orientation, so
    /// of the reversed kinds only implementation needs the mechanical swap
    /// (turning "interface to implementor" into `Implementation_Of`).
    pub fn swaps_query_direction(self) -> bool {
        matches!(self, EdgeKind::Implementation)
    }

    /// Whether the server advertises the capability behind this kind.
    pub fn supported_by(self, caps: &ServerCapabilities) -> bool {
        match self {
            EdgeKind::Definition => caps.definition_provider.is_some(),
            EdgeKind::Declaration => caps.declaration_provider.is_some(),
            EdgeKind::TypeDefinition => caps.type_definition_provider.is_some(),
            EdgeKind::Implementation => caps.implementation_provider.is_some(),
            EdgeKind::Reference => caps.references_provider.is_some(),
            EdgeKind::Call => caps.call_hierarchy_provider.is_some(),
            EdgeKind::Extend => caps.type_hierarchy_provider.is_some(),
        }
    }
}

/// Node kinds the importer may materialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum)]
pub enum NodeKind {
    /// One node per imported file (not an LSP symbol kind).
    File,
    /// LSP `Module`.
    Module,
    /// LSP `Namespace`.
    Namespace,
    /// LSP `Package`.
    Package,
    /// LSP `Class`.
    Class,
    /// LSP `Method`.
    Method,
    /// LSP `Property`.
    Property,
    /// LSP `Field`.
    Field,
    /// LSP `Constructor`.
    Constructor,
    /// LSP `Enum`.
    Enum,
    /// LSP `Interface`.
    Interface,
    /// LSP `Function`.
    Function,
    /// LSP `Variable`.
    Variable,
    /// LSP `Constant`.
    Constant,
    /// LSP `Struct`.
    Struct,
    /// LSP `EnumMember`.
    EnumMember,
    /// LSP `Event`.
    Event,
    /// LSP `Operator`.
    Operator,
    /// LSP `TypeParameter`.
    TypeParameter,
}

impl NodeKind {
    /// Everything, including the file nodes.
    pub const ALL: [NodeKind; 19] = [
        NodeKind::File,
        NodeKind::Module,
        NodeKind::Namespace,
        NodeKind::Package,
        NodeKind::Class,
        NodeKind::Method,
        NodeKind::Property,
        NodeKind::Field,
        NodeKind::Constructor,
        NodeKind::Enum,
        NodeKind::Interface,
        NodeKind::Function,
        NodeKind::Variable,
        NodeKind::Constant,
        NodeKind::Struct,
        NodeKind::EnumMember,
        NodeKind::Event,
        NodeKind::Operator,
        NodeKind::TypeParameter,
    ];

    /// Maps an LSP symbol kind onto a node kind; `None` for kinds the graph
    /// has no use for (strings, numbers, ...).
    pub fn from_symbol_kind(kind: SymbolKind) -> Option<NodeKind> {
        Some(match kind {
            SymbolKind::MODULE => NodeKind::Module,
            SymbolKind::NAMESPACE => NodeKind::Namespace,
            SymbolKind::PACKAGE => NodeKind::Package,
            SymbolKind::CLASS => NodeKind::Class,
            SymbolKind::METHOD => NodeKind::Method,
            SymbolKind::PROPERTY => NodeKind::Property,
            SymbolKind::FIELD => NodeKind::Field,
            SymbolKind::CONSTRUCTOR => NodeKind::Constructor,
            SymbolKind::ENUM => NodeKind::Enum,
            SymbolKind::INTERFACE => NodeKind::Interface,
            SymbolKind::FUNCTION => NodeKind::Function,
            SymbolKind::VARIABLE => NodeKind::Variable,
            SymbolKind::CONSTANT => NodeKind::Constant,
            SymbolKind::STRUCT => NodeKind::Struct,
            SymbolKind::ENUM_MEMBER => NodeKind::EnumMember,
            SymbolKind::EVENT => NodeKind::Event,
            SymbolKind::OPERATOR => NodeKind::Operator,
            SymbolKind::TYPE_PARAMETER => NodeKind::TypeParameter,
            _ => return None,
        })
    }

    /// The node type string written to the graph.
    pub fn type_name(self) -> &'static str {
        match self {
            NodeKind::File => "File",
            NodeKind::Module => "Module",
            NodeKind::Namespace => "Namespace",
            NodeKind::Package => "Package",
            NodeKind::Class => "Class",
            NodeKind::Method => "Method",
            NodeKind::Property => "Property",
            NodeKind::Field => "Field",
            NodeKind::Constructor => "Constructor",
            NodeKind::Enum => "Enum",
            NodeKind::Interface => "Interface",
            NodeKind::Function => "Function",
            NodeKind::Variable => "Variable",
            NodeKind::Constant => "Constant",
            NodeKind::Struct => "Struct",
            NodeKind::EnumMember => "EnumMember",
            NodeKind::Event => "Event",
            NodeKind::Operator => "Operator",
            NodeKind::TypeParameter => "TypeParameter",
        }
    }
}

/// Diagnostic severities that may be counted onto nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum)]
pub enum DiagnosticLevel {
    /// LSP severity 1.
    Error,
    /// LSP severity 2.
    Warning,
    /// LSP severity 3.
    Information,
    /// LSP severity 4.
    Hint,
}

impl DiagnosticLevel {
    /// All severities.
    pub const ALL: [DiagnosticLevel; 4] = [
        DiagnosticLevel::Error,
        DiagnosticLevel::Warning,
        DiagnosticLevel::Information,
        DiagnosticLevel::Hint,
    ];

    /// The counter attribute bumped on enclosing nodes.
    pub fn counter_attribute(self) -> &'static str {
        match self {
            DiagnosticLevel::Error => "Metrics.LSP_Error",
            DiagnosticLevel::Warning => "Metrics.LSP_Warning",
            DiagnosticLevel::Information => "Metrics.LSP_Information",
            DiagnosticLevel::Hint => "Metrics.LSP_Hint",
        }
    }

    /// Maps the wire severity.
    pub fn from_lsp(severity: lsp_types::DiagnosticSeverity) -> Option<DiagnosticLevel> {
        Some(match severity {
            lsp_types::DiagnosticSeverity::ERROR => DiagnosticLevel::Error,
            lsp_types::DiagnosticSeverity::WARNING => DiagnosticLevel::Warning,
            lsp_types::DiagnosticSeverity::INFORMATION => DiagnosticLevel::Information,
            lsp_types::DiagnosticSeverity::HINT => DiagnosticLevel::Hint,
            _ => return None,
        })
    }
}

/// Everything the importer needs to know for one run.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Project root the graph is relative to.
    pub project_root: PathBuf,
    /// Registry name of the server to drive.
    pub server: String,
    /// Directories to search; defaults to the project root.
    pub include_dirs: Vec<PathBuf>,
    /// Paths to skip: plain prefixes, or regexes when ending with `$`.
    pub exclude_paths: Vec<String>,
    /// Uniform per-request timeout.
    pub timeout: Duration,
    /// Edge kinds to extract.
    pub edge_kinds: Vec<EdgeKind>,
    /// Node kinds to materialize.
    pub node_kinds: Vec<NodeKind>,
    /// Diagnostic severities to count.
    pub diagnostic_levels: Vec<DiagnosticLevel>,
    /// Drop edges whose source and target coincide.
    pub avoid_self_references: bool,
    /// Drop edges pointing at the source's parent.
    pub avoid_parent_references: bool,
    /// Degree of the edge-phase task pool; `None` picks a system default.
    pub jobs: Option<usize>,
    /// Use the interval-tree index (`false` selects the linear scan).
    pub optimized_lookup: bool,
    /// Append per-phase timings to this CSV file.
    pub perf_csv: Option<PathBuf>,
    /// Tee the LSP byte streams into temp files.
    pub log_lsp_io: bool,
}

impl ImportConfig {
    /// A configuration with everything enabled for `project_root`/`server`.
    pub fn new(project_root: impl Into<PathBuf>, server: impl Into<String>) -> Self {
        Self {
            project_root: project_root.into(),
            server: server.into(),
            include_dirs: Vec::new(),
            exclude_paths: Vec::new(),
            timeout: Duration::from_secs(10),
            edge_kinds: EdgeKind::ALL.to_vec(),
            node_kinds: NodeKind::ALL.to_vec(),
            diagnostic_levels: DiagnosticLevel::ALL.to_vec(),
            avoid_self_references: false,
            avoid_parent_references: false,
            jobs: None,
            optimized_lookup: true,
            perf_csv: None,
            log_lsp_io: false,
        }
    }

    /// Effective include roots: the configured ones, or the project root.
    pub fn effective_includes(&self) -> Vec<PathBuf> {
        if self.include_dirs.is_empty() {
            vec![self.project_root.clone()]
        } else {
            self.include_dirs.clone()
        }
    }

    /// Whether a node kind is enabled.
    pub fn node_kind_enabled(&self, kind: NodeKind) -> bool {
        self.node_kinds.contains(&kind)
    }

    /// Whether an edge kind is enabled.
    pub fn edge_kind_enabled(&self, kind: EdgeKind) -> bool {
        self.edge_kinds.contains(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_table_matches_the_wire_protocol() {
        assert_eq!(EdgeKind::TypeDefinition.edge_type(), "Of_Type");
        assert_eq!(EdgeKind::Implementation.edge_type(), "Implementation_Of");
        assert!(EdgeKind::Reference.reversed());
        assert!(EdgeKind::Implementation.reversed());
        assert!(!EdgeKind::Call.reversed());
        assert!(!EdgeKind::Definition.reversed());
        // Only implementation swaps at insertion time; reference results
        // already arrive in the reversed orientation.
        assert!(EdgeKind::Implementation.swaps_query_direction());
        assert!(!EdgeKind::Reference.swaps_query_direction());
    }

    #[test]
    fn symbol_kind_mapping_covers_declarations() {
        assert_eq!(
            NodeKind::from_symbol_kind(SymbolKind::FUNCTION),
            Some(NodeKind::Function)
        );
        assert_eq!(
            NodeKind::from_symbol_kind(SymbolKind::STRUCT),
            Some(NodeKind::Struct)
        );
        assert_eq!(NodeKind::from_symbol_kind(SymbolKind::STRING), None);
    }

    #[test]
    fn default_config_enables_everything() {
        let cfg = ImportConfig::new("/tmp/project", "rust-analyzer");
        assert_eq!(cfg.edge_kinds.len(), EdgeKind::ALL.len());
        assert!(cfg.node_kind_enabled(NodeKind::File));
        assert!(!cfg.avoid_self_references);
        assert_eq!(cfg.effective_includes(), vec![PathBuf::from("/tmp/project")]);
    }

    #[test]
    fn severity_counters_are_named_by_level() {
        assert_eq!(
            DiagnosticLevel::Warning.counter_attribute(),
            "Metrics.LSP_Warning"
        );
        assert_eq!(
            DiagnosticLevel::from_lsp(lsp_types::DiagnosticSeverity::HINT),
            Some(DiagnosticLevel::Hint)
        );
    }
}
