//! codegraph
//!
//! Extracts a typed, hierarchical dependency graph from a source project by
//! driving an external language server, and serializes it as GXL.
//!
//! # Overview
//!
//! This library provides:
//! - An LSP client/handler pair that spawns and talks to language servers
//! - A hierarchical graph model with typed attribute stores
//! - The import pipeline turning LSP symbols and cross-references into
//!   nodes and edges
//! - A GXL writer for the finished graph
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                ┌─────────────────┐
//! │      CLI        │───────────────►│    Importer     │
//! └─────────────────┘                └────────┬────────┘
//!                                             │
//!                                      ┌──────▼──────┐
//!                                      │ LSP Handler │
//!                                      └──────┬──────┘
//!                                             │
//!                                      ┌──────▼──────┐
//!                                      │  LSP Client │
//!                                      └──────┬──────┘
//!                                             │ JSON-RPC
//!                                      ┌──────▼────────┐
//!                                      │   Language    │
//!                                      │   Server      │
//!                                      │(rust-analyzer)│
//!                                      └───────────────┘
//! ```
//!
//! # Modules
//!
//! - [`error`] - Error types for the entire application
//! - [`registry`] - Table of supported language servers
//! - [`lsp`] - LSP client and handler
//! - [`graph`] - Graph, node, edge and attribute model
//! - [`interval`] - Range index behind target resolution
//! - [`importer`] - The import pipeline
//! - [`gxl`] - GXL output
//!
//! # Example
//!
//! ```ignore
//! use codegraph::config::ImportConfig;
//! use codegraph::importer::{CancelFlag, Importer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ImportConfig::new("/path/to/project", "rust-analyzer");
//!     let importer = Importer::new(config)?;
//!     let graph = importer.run(&CancelFlag::new()).await?;
//!     codegraph::gxl::write_gxl_file(&graph, "out.gxl".as_ref(), false)?;
//!     Ok(())
//! }
//! ```

// Enforce documentation and other quality attributes
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are too strict
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]

pub mod config;
pub mod error;
pub mod graph;
pub mod gxl;
pub mod importer;
pub mod interval;
pub mod lsp;
pub mod registry;

// Re-export commonly used types at the crate root
pub use error::{Error, Result};
