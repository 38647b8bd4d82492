//! High-level facade over the LSP client.
//!
//! The handler owns the client lifecycle, applies the single uniform
//! per-request timeout, gates operations on server capabilities and maps
//! per-request failures into empty results so the importer never has to
//! special-case a flaky server. Timeouts truncate; only startup failures are
//! fatal.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use lsp_types::{
    CallHierarchyItem, Diagnostic, DocumentSymbol, DocumentSymbolResponse, Position,
    PublishDiagnosticsParams, ServerCapabilities, TypeHierarchyItem, request,
};
use tokio::sync::Mutex;

use crate::error::LspError;
use crate::registry::ServerSpec;

use super::LspResult;
use super::client::LspClient;
use super::types::{SourceLocation, extract_hover_text, goto_response_locations};

/// How long the progress tracker must stay quiet before the server counts
/// as ready.
const READY_QUIET_PERIOD: Duration = Duration::from_millis(500);
/// Poll interval while waiting for readiness.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Readiness wait gives up after this many multiples of the request timeout.
const READY_TIMEOUT_FACTOR: u32 = 8;

/// gopls answers hover requests for files outside its module graph with this
/// error; it carries no signal for the import.
const GO_NO_METADATA: &str = "no package metadata for file";

/// Lifecycle states of the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    /// No server process.
    Uninitialised,
    /// Process spawned, waiting for the initial work-done progress burst.
    Initialising,
    /// Accepting requests.
    Ready,
    /// Shutdown in progress.
    ShuttingDown,
}

/// High-level interface to one language server.
pub struct LspHandler {
    client: LspClient,
    spec: &'static ServerSpec,
    timeout: Duration,
    state: Mutex<HandlerState>,
}

impl LspHandler {
    /// Spawns the server for `spec`, initializes it and waits until its
    /// initial work-done progress burst has settled.
    ///
    /// ## Errors
    /// Fatal when the process cannot be spawned or `initialize` fails; a
    /// server that never announces progress is not an error.
    pub async fn start(
        spec: &'static ServerSpec,
        executable: &Path,
        workspace_root: &Path,
        timeout: Duration,
        log_io: bool,
    ) -> LspResult<Self> {
        let client = LspClient::builder()
            .server_command(executable)
            .server_args(spec.args.iter().copied())
            .workspace_root(workspace_root)
            .initialization_options(spec.initialization_options())
            .init_timeout(timeout.max(Duration::from_secs(30)))
            .log_io(log_io)
            .build()
            .await?;

        let handler = Self {
            client,
            spec,
            timeout,
            state: Mutex::new(HandlerState::Initialising),
        };
        handler.await_readiness().await;
        *handler.state.lock().await = HandlerState::Ready;
        Ok(handler)
    }

    /// Waits until all observed work-done tokens have ended and none has been
    /// created for 500 ms. Gives up (and proceeds) after 8x the request
    /// timeout: some servers never announce progress.
    async fn await_readiness(&self) {
        let deadline = tokio::time::Instant::now() + self.timeout * READY_TIMEOUT_FACTOR;
        loop {
            let quiescent = self
                .client
                .progress_state(|p| p.quiescent_since(READY_QUIET_PERIOD));
            if quiescent {
                let announced = self.client.progress_state(|p| p.seen_any());
                tracing::debug!(announced, "server ready");
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::debug!("server still busy after readiness window, proceeding");
                return;
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> HandlerState {
        *self.state.lock().await
    }

    /// The registry entry this handler drives.
    pub fn spec(&self) -> &'static ServerSpec {
        self.spec
    }

    /// Capabilities the server advertised.
    pub fn capabilities(&self) -> &ServerCapabilities {
        self.client.capabilities()
    }

    /// Whether the server supports hover requests.
    pub fn supports_hover(&self) -> bool {
        self.capabilities().hover_provider.is_some()
    }

    /// Whether the server supports pull diagnostics.
    pub fn supports_pull_diagnostics(&self) -> bool {
        self.capabilities().diagnostic_provider.is_some()
    }

    /// Paths of the LSP I/O logs, when enabled.
    pub fn io_log_paths(&self) -> Option<&(std::path::PathBuf, std::path::PathBuf)> {
        self.client.io_log_paths()
    }

    /// The uniform per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Applies the uniform timeout to a request future.
    async fn bounded<T>(&self, fut: impl Future<Output = LspResult<T>>) -> LspResult<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| LspError::Timeout(self.timeout))?
    }

    /// Applies the timeout and maps any failure to an empty list; a sequence
    /// that fails midway is truncated silently.
    async fn bounded_list<T>(
        &self,
        what: &'static str,
        fut: impl Future<Output = LspResult<Vec<T>>>,
    ) -> Vec<T> {
        match self.bounded(fut).await {
            Ok(items) => items,
            Err(e) => {
                tracing::trace!("{what}: {e}");
                Vec::new()
            }
        }
    }

    /// Opens a document; the language id comes from the registry entry.
    /// ## Errors
    pub async fn open_document(&self, path: &Path) -> LspResult<()> {
        self.client.did_open(path, self.spec.language_id(path)).await
    }

    /// Opens a document at most once; used by the parallel edge phase.
    /// ## Errors
    pub async fn ensure_document_open(&self, path: &Path) -> LspResult<bool> {
        self.client
            .ensure_open(path, self.spec.language_id(path))
            .await
    }

    /// Closes a document.
    /// ## Errors
    pub async fn close_document(&self, path: &Path) -> LspResult<()> {
        self.client.did_close(path).await
    }

    /// Hierarchical document symbols.
    ///
    /// ## Errors
    /// [`LspError::FlatDocumentSymbols`] when the server only produces the
    /// deprecated flat shape: the import cannot build a hierarchy from it.
    pub async fn document_symbols(&self, path: &Path) -> LspResult<Vec<DocumentSymbol>> {
        let response = match self.bounded(self.client.document_symbols(path)).await {
            Ok(response) => response,
            Err(LspError::Timeout(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        match response {
            Some(DocumentSymbolResponse::Nested(symbols)) => Ok(symbols),
            Some(DocumentSymbolResponse::Flat(symbols)) if symbols.is_empty() => Ok(Vec::new()),
            Some(DocumentSymbolResponse::Flat(_)) => Err(LspError::FlatDocumentSymbols {
                server: self.spec.name.to_string(),
            }),
            None => Ok(Vec::new()),
        }
    }

    /// Hover text at a position, flattened to plain text. Timeouts and the
    /// Go server's spurious metadata error yield `None`.
    pub async fn hover_text(&self, path: &Path, position: Position) -> Option<String> {
        match self.bounded(self.client.hover(path, position)).await {
            Ok(hover) => hover.map(|h| extract_hover_text(h.contents)),
            Err(LspError::RequestFailed(msg)) if msg.contains(GO_NO_METADATA) => None,
            Err(e) => {
                tracing::trace!("hover: {e}");
                None
            }
        }
    }

    async fn goto<R>(&self, path: &Path, position: Position) -> Vec<SourceLocation>
    where
        R: request::Request<
                Params = lsp_types::GotoDefinitionParams,
                Result = Option<lsp_types::GotoDefinitionResponse>,
            >,
    {
        match self.bounded(self.client.goto_request::<R>(path, position)).await {
            Ok(Some(response)) => goto_response_locations(response),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::trace!("{}: {e}", R::METHOD);
                Vec::new()
            }
        }
    }

    /// `textDocument/definition`.
    pub async fn definition(&self, path: &Path, position: Position) -> Vec<SourceLocation> {
        self.goto::<request::GotoDefinition>(path, position).await
    }

    /// `textDocument/declaration`.
    pub async fn declaration(&self, path: &Path, position: Position) -> Vec<SourceLocation> {
        self.goto::<request::GotoDeclaration>(path, position).await
    }

    /// `textDocument/typeDefinition`.
    pub async fn type_definition(&self, path: &Path, position: Position) -> Vec<SourceLocation> {
        self.goto::<request::GotoTypeDefinition>(path, position).await
    }

    /// `textDocument/implementation`.
    pub async fn implementation(&self, path: &Path, position: Position) -> Vec<SourceLocation> {
        self.goto::<request::GotoImplementation>(path, position).await
    }

    /// `textDocument/references` without the declaration itself.
    pub async fn references(&self, path: &Path, position: Position) -> Vec<SourceLocation> {
        let locations = self
            .bounded_list("references", self.client.references(path, position, false))
            .await;
        locations
            .into_iter()
            .filter_map(SourceLocation::from_location)
            .collect()
    }

    /// Outgoing calls from the symbol at `position`: prepares the call
    /// hierarchy, keeps the items accepted by `filter` (callers pass a
    /// predicate matching the queried symbol's position) and flattens each
    /// item's callees. A failed prepare is a warning, not an error.
    pub async fn outgoing_calls(
        &self,
        filter: impl Fn(&CallHierarchyItem) -> bool,
        path: &Path,
        position: Position,
    ) -> Vec<CallHierarchyItem> {
        let items = match self
            .bounded(self.client.prepare_call_hierarchy(path, position))
            .await
        {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!("callHierarchy/prepare failed: {e}");
                return Vec::new();
            }
        };

        let mut targets = Vec::new();
        for item in items.into_iter().filter(|i| filter(i)) {
            let calls = self
                .bounded_list("outgoingCalls", self.client.outgoing_calls(item))
                .await;
            targets.extend(calls.into_iter().map(|call| call.to));
        }
        targets
    }

    /// Supertypes of the symbol at `position`, via typeHierarchy/prepare +
    /// supertypes, mirroring [`Self::outgoing_calls`].
    pub async fn supertypes(
        &self,
        filter: impl Fn(&TypeHierarchyItem) -> bool,
        path: &Path,
        position: Position,
    ) -> Vec<TypeHierarchyItem> {
        let items = match self
            .bounded(self.client.prepare_type_hierarchy(path, position))
            .await
        {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!("typeHierarchy/prepare failed: {e}");
                return Vec::new();
            }
        };

        let mut supertypes = Vec::new();
        for item in items.into_iter().filter(|i| filter(i)) {
            let parents = self
                .bounded_list("supertypes", self.client.supertypes(item))
                .await;
            supertypes.extend(parents);
        }
        supertypes
    }

    /// Pull diagnostics for one document.
    pub async fn pull_diagnostics(&self, path: &Path) -> Vec<Diagnostic> {
        self.bounded_list("pullDiagnostics", self.client.pull_diagnostics(path))
            .await
    }

    /// Drains the batches of server-pushed diagnostics buffered so far.
    pub fn drain_pushed_diagnostics(&self) -> Vec<PublishDiagnosticsParams> {
        self.client.drain_pushed_diagnostics()
    }

    /// Shuts the server down. Best effort: servers flagged `skip_shutdown`
    /// block on their shutdown streams and are terminated directly; everyone
    /// else gets the handshake, with termination as the timeout fallback.
    pub async fn shutdown(&self) {
        *self.state.lock().await = HandlerState::ShuttingDown;
        if self.spec.skip_shutdown {
            if let Err(e) = self.client.terminate().await {
                tracing::debug!("terminate failed: {e}");
            }
        } else {
            match tokio::time::timeout(self.timeout, self.client.shutdown()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::debug!("shutdown handshake failed: {e}");
                    let _ = self.client.terminate().await;
                }
                Err(_) => {
                    tracing::debug!("shutdown handshake timed out");
                    let _ = self.client.terminate().await;
                }
            }
        }
        *self.state.lock().await = HandlerState::Uninitialised;
    }
}

impl std::fmt::Debug for LspHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LspHandler")
            .field("server", &self.spec.name)
            .field("timeout", &self.timeout)
            .finish()
    }
}
