//! LSP (Language Server Protocol) client module.
//!
//! This module talks to external language servers: [`client`] owns the child
//! process and the JSON-RPC mainloop, [`handler`] is the high-level facade
//! the importer drives, and [`types`] converts between wire types and the
//! graph model.

pub mod client;
pub mod handler;
pub mod types;

use crate::error::LspError;

/// Result type for LSP operations.
pub type LspResult<T> = std::result::Result<T, LspError>;

pub use client::LspClient;
pub use handler::{HandlerState, LspHandler};
pub use types::SourceLocation;
