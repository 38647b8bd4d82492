//! Error types for codegraph.
//!
//! This module defines all error types used throughout the application,
//! organized by subsystem: LSP, graph model, importer, and output.

use std::path::PathBuf;

use thiserror::Error;

/// Errors related to LSP client operations.
#[derive(Debug, Error)]
pub enum LspError {
    /// The language server process failed to start.
    #[error("failed to start language server: {0}")]
    ServerStartFailed(String),

    /// The language server process exited unexpectedly.
    #[error("language server exited unexpectedly: {0}")]
    ServerExited(String),

    /// Failed to initialize the language server.
    #[error("language server initialization failed: {0}")]
    InitializationFailed(String),

    /// The language server returned an error response.
    #[error("language server error: {message} (code: {code})")]
    ServerError {
        /// The error code from the language server.
        code: i32,
        /// The error message from the language server.
        message: String,
    },

    /// A request to the language server timed out.
    #[error("language server request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The language server is not initialized.
    #[error("language server not initialized")]
    NotInitialized,

    /// Failed to send a request to the language server.
    #[error("failed to send request to language server: {0}")]
    RequestFailed(String),

    /// The server answered `textDocument/documentSymbol` with the deprecated
    /// flat `SymbolInformation` shape, which carries no hierarchy.
    #[error(
        "server '{server}' returned flat SymbolInformation for documentSymbol; \
         a hierarchy-capable server is required (consider a newer release or a \
         different server for this language)"
    )]
    FlatDocumentSymbols {
        /// Name of the offending server.
        server: String,
    },

    /// Invalid position in document.
    #[error("invalid position: line {line}, column {column}")]
    InvalidPosition {
        /// The line number.
        line: u32,
        /// The column number.
        column: u32,
    },

    /// Document not found or not open.
    #[error("document not found: {0}")]
    DocumentNotFound(String),
}

/// Errors raised by graph mutations.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A node with the same id is already present.
    #[error("node id already present in graph: {0}")]
    DuplicateNode(String),

    /// The referenced node does not exist in the graph.
    #[error("unknown node id: {0}")]
    UnknownNode(String),

    /// Reparenting would make a node its own ancestor.
    #[error("reparenting '{child}' under '{parent}' would create a cycle")]
    HierarchyCycle {
        /// The node being moved.
        child: String,
        /// The proposed parent.
        parent: String,
    },

    /// An edge endpoint is missing from the graph.
    #[error("edge '{edge}' references node '{node}' which is not in the graph")]
    DanglingEndpoint {
        /// The edge id.
        edge: String,
        /// The missing endpoint id.
        node: String,
    },
}

/// Errors raised while setting up or running an import.
#[derive(Debug, Error)]
pub enum ImportError {
    /// A precondition failed before any LSP traffic was started.
    #[error("setup error: {0}")]
    Setup(String),

    /// The requested server is not in the registry.
    #[error("unknown language server '{0}' (see --help for registered servers)")]
    UnknownServer(String),

    /// No file under the include roots matches the server's extensions.
    #[error("no matching source files under {root} for server '{server}'")]
    NoMatchingFiles {
        /// The project root that was searched.
        root: PathBuf,
        /// The server whose extensions were used.
        server: String,
    },

    /// The import was cancelled cooperatively.
    #[error("operation cancelled")]
    Cancelled,

    /// LSP failure that is fatal for the import.
    #[error(transparent)]
    Lsp(#[from] LspError),

    /// Graph invariant violation.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// IO error while reading project files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while writing output artifacts.
#[derive(Debug, Error)]
pub enum OutputError {
    /// The output file exists and overwriting was not requested.
    #[error("output file {0} exists (pass --overwrite to replace it)")]
    AlreadyExists(PathBuf),

    /// XML serialization failure.
    #[error("failed to serialize GXL: {0}")]
    Serialize(String),

    /// IO error while writing the output file.
    #[error("failed to write {path}: {source}")]
    Write {
        /// Destination path.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
}

/// A unified error type for the entire application.
#[derive(Debug, Error)]
pub enum Error {
    /// LSP-related error.
    #[error("LSP error: {0}")]
    Lsp(#[from] LspError),

    /// Graph-model error.
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    /// Import pipeline error.
    #[error("import error: {0}")]
    Import(#[from] ImportError),

    /// Output error.
    #[error("output error: {0}")]
    Output(#[from] OutputError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Generic IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized Result type for codegraph operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lsp_error_display() {
        let err = LspError::ServerStartFailed("connection refused".to_string());
        assert_eq!(
            err.to_string(),
            "failed to start language server: connection refused"
        );
    }

    #[test]
    fn test_error_conversion() {
        let lsp_err = LspError::NotInitialized;
        let err: Error = lsp_err.into();
        assert!(matches!(err, Error::Lsp(LspError::NotInitialized)));
    }

    #[test]
    fn test_import_error_from_lsp_error() {
        let lsp_err = LspError::DocumentNotFound("/path/to/file.rs".to_string());
        let import_err: ImportError = lsp_err.into();
        assert!(matches!(import_err, ImportError::Lsp(_)));
    }

    #[test]
    fn test_flat_symbols_message_names_server() {
        let err = LspError::FlatDocumentSymbols {
            server: "gopls".to_string(),
        };
        assert!(err.to_string().contains("gopls"));
        assert!(err.to_string().contains("SymbolInformation"));
    }
}
