//! LSP client implementation.
//!
//! This module provides the core LSP client that spawns and communicates
//! with language servers using the Language Server Protocol. It owns the
//! child process, runs the JSON-RPC mainloop, and buffers server-pushed
//! notifications (diagnostics, work-done progress, log messages) for the
//! importer to consume.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Write as _;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::sync::{Arc, Mutex as StdMutex};
use std::task::{Context, Poll};
use std::time::Instant;

use async_lsp::concurrency::ConcurrencyLayer;
use async_lsp::panic::CatchUnwindLayer;
use async_lsp::router::Router;
use async_lsp::tracing::TracingLayer;
use async_lsp::{LanguageServer, ServerSocket};
use futures::io::{AsyncRead, AsyncWrite};
use lsp_types::{
    CallHierarchyItem, CallHierarchyOutgoingCall, CallHierarchyOutgoingCallsParams,
    CallHierarchyPrepareParams, ClientCapabilities, ClientInfo, Diagnostic,
    DiagnosticClientCapabilities, DidCloseTextDocumentParams, DidOpenTextDocumentParams,
    DocumentSymbolClientCapabilities, DocumentSymbolParams, DocumentSymbolResponse,
    DynamicRegistrationClientCapabilities, GotoCapability, GotoDefinitionParams,
    GotoDefinitionResponse, Hover, HoverClientCapabilities, HoverParams, InitializeParams,
    InitializedParams, MarkupKind, MessageType, NumberOrString, PartialResultParams,
    ProgressParamsValue, PublishDiagnosticsClientCapabilities, PublishDiagnosticsParams,
    ReferenceContext, ReferenceParams, SemanticTokenModifier, SemanticTokenType,
    SemanticTokensClientCapabilities, ServerCapabilities, SymbolKind, SymbolKindCapability,
    SymbolTag, TagSupport, TextDocumentClientCapabilities, TextDocumentIdentifier,
    TextDocumentItem, TextDocumentPositionParams, TextDocumentSyncClientCapabilities, TokenFormat,
    TraceValue, TypeHierarchyItem, TypeHierarchyPrepareParams, TypeHierarchySupertypesParams,
    Url, WindowClientCapabilities, WorkDoneProgress, WorkDoneProgressParams, notification,
    request,
};
use serde_json::Value;
use tokio::sync::Mutex;
use tower::ServiceBuilder;

use crate::error::LspError;

use super::LspResult;
use super::types::path_to_url;

/// Server log lines matching any of these substrings are noise, not faults:
/// ordinary shutdown-sequence warnings, gopls/jdtls complaining about files
/// outside their module metadata, and OmniSharp rejecting didOpen for
/// documents it has not catalogued yet.
const BENIGN_SERVER_MESSAGES: &[&str] = &[
    "client exited without proper shutdown sequence",
    "received shutdown request",
    "no package metadata for file",
    "Classpath is incomplete",
    "Error loading workspace",
    "Handling the didOpen notification failed",
];

/// Returns whether a server log message is on the benign allow-list.
pub fn is_benign_server_message(message: &str) -> bool {
    BENIGN_SERVER_MESSAGES.iter().any(|m| message.contains(m))
}

/// Buffer of server-pushed `publishDiagnostics` batches.
#[derive(Debug, Default)]
pub struct DiagnosticsBuffer {
    queue: VecDeque<PublishDiagnosticsParams>,
    by_file: HashMap<Url, Vec<Diagnostic>>,
}

impl DiagnosticsBuffer {
    fn push(&mut self, params: PublishDiagnosticsParams) {
        self.by_file
            .insert(params.uri.clone(), params.diagnostics.clone());
        self.queue.push_back(params);
    }

    fn drain(&mut self) -> Vec<PublishDiagnosticsParams> {
        self.by_file.clear();
        self.queue.drain(..).collect()
    }
}

/// Work-done progress bookkeeping used to detect server readiness.
#[derive(Debug, Default)]
pub struct ProgressState {
    active: HashSet<String>,
    last_event: Option<Instant>,
    seen_any: bool,
}

impl ProgressState {
    fn token_key(token: &NumberOrString) -> String {
        match token {
            NumberOrString::Number(n) => n.to_string(),
            NumberOrString::String(s) => s.clone(),
        }
    }

    fn touch(&mut self) {
        self.last_event = Some(Instant::now());
        self.seen_any = true;
    }

    /// All observed tokens have ended and no token event happened for
    /// `quiet` — or the server never announced progress at all.
    pub fn quiescent_since(&self, quiet: std::time::Duration) -> bool {
        if !self.active.is_empty() {
            return false;
        }
        match self.last_event {
            Some(at) => at.elapsed() >= quiet,
            None => !self.seen_any,
        }
    }

    /// Whether any progress token was ever observed.
    pub fn seen_any(&self) -> bool {
        self.seen_any
    }
}

/// State for handling LSP client notifications.
///
/// The router owns one instance; the [`LspClient`] keeps clones of the
/// shared buffers so the importer can read what the router collected.
struct ClientState {
    diagnostics: Arc<StdMutex<DiagnosticsBuffer>>,
    progress: Arc<StdMutex<ProgressState>>,
}

/// Configuration for building an LSP client.
#[derive(Debug, Clone)]
pub struct LspClientConfig {
    /// Command to start the language server.
    pub server_command: PathBuf,
    /// Arguments to pass to the language server.
    pub server_args: Vec<String>,
    /// Root directory of the workspace.
    pub workspace_root: PathBuf,
    /// Server-specific options for the `initialize` request.
    pub initialization_options: Option<Value>,
    /// Timeout for initialization.
    pub init_timeout: std::time::Duration,
    /// Tee the byte streams to/from the server into temp files.
    pub log_io: bool,
}

impl Default for LspClientConfig {
    fn default() -> Self {
        Self {
            server_command: PathBuf::from("rust-analyzer"),
            server_args: Vec::new(),
            workspace_root: PathBuf::from("."),
            initialization_options: None,
            init_timeout: std::time::Duration::from_secs(30),
            log_io: false,
        }
    }
}

/// Builder for constructing an LSP client.
#[derive(Debug, Default)]
pub struct LspClientBuilder {
    config: LspClientConfig,
}

impl LspClientBuilder {
    /// Creates a new builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the server command.
    #[must_use]
    pub fn server_command(mut self, command: impl Into<PathBuf>) -> Self {
        self.config.server_command = command.into();
        self
    }

    /// Sets the server arguments.
    #[must_use]
    pub fn server_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config.server_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the workspace root.
    #[must_use]
    pub fn workspace_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.workspace_root = path.into();
        self
    }

    /// Sets the server's initialization options.
    #[must_use]
    pub fn initialization_options(mut self, options: Option<Value>) -> Self {
        self.config.initialization_options = options;
        self
    }

    /// Sets the initialization timeout.
    #[must_use]
    pub fn init_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config.init_timeout = timeout;
        self
    }

    /// Enables teeing of the LSP byte streams into temp files.
    #[must_use]
    pub fn log_io(mut self, enabled: bool) -> Self {
        self.config.log_io = enabled;
        self
    }

    /// Builds the LSP client.
    ///
    /// This spawns the language server process, wires up the mainloop and
    /// performs the `initialize` handshake.
    ///
    /// ## Errors
    /// Fatal when the process cannot be spawned or initialization fails.
    pub async fn build(self) -> LspResult<LspClient> {
        let workspace_root = self.config.workspace_root.canonicalize().map_err(|e| {
            LspError::InitializationFailed(format!("failed to canonicalize workspace root: {e}"))
        })?;

        // Spawn the language server process
        let mut cmd = async_process::Command::new(&self.config.server_command);
        cmd.args(&self.config.server_args)
            .current_dir(&workspace_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            LspError::ServerStartFailed(format!(
                "failed to spawn '{}': {}",
                self.config.server_command.display(),
                e
            ))
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LspError::ServerStartFailed("failed to capture stdout".to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| LspError::ServerStartFailed("failed to capture stdin".to_string()))?;

        let diagnostics = Arc::new(StdMutex::new(DiagnosticsBuffer::default()));
        let progress = Arc::new(StdMutex::new(ProgressState::default()));
        let io_logs = if self.config.log_io {
            Some(IoLogs::create()?)
        } else {
            None
        };

        // Create the mainloop with router for notifications
        let router_diagnostics = Arc::clone(&diagnostics);
        let router_progress = Arc::clone(&progress);
        let (mainloop, server) = async_lsp::MainLoop::new_client(move |_client| {
            let mut router = Router::new(ClientState {
                diagnostics: router_diagnostics,
                progress: router_progress,
            });

            // Track work-done progress tokens; quiescence gates readiness.
            router.notification::<notification::Progress>(|this, prog| {
                if let Ok(mut state) = this.progress.lock() {
                    let key = ProgressState::token_key(&prog.token);
                    match prog.value {
                        ProgressParamsValue::WorkDone(WorkDoneProgress::Begin(_)) => {
                            state.active.insert(key);
                        }
                        ProgressParamsValue::WorkDone(WorkDoneProgress::End(_)) => {
                            state.active.remove(&key);
                        }
                        ProgressParamsValue::WorkDone(WorkDoneProgress::Report(_)) => {}
                    }
                    state.touch();
                }
                ControlFlow::Continue(())
            });

            // Buffer pushed diagnostics for the importer to drain.
            router.notification::<notification::PublishDiagnostics>(|this, diag| {
                if let Ok(mut buffer) = this.diagnostics.lock() {
                    buffer.push(diag);
                }
                ControlFlow::Continue(())
            });

            router.notification::<notification::LogMessage>(|_this, log| {
                if !is_benign_server_message(&log.message) {
                    tracing::trace!(kind = ?log.typ, "server log: {}", log.message);
                }
                ControlFlow::Continue(())
            });

            router.notification::<notification::ShowMessage>(|_this, msg| {
                match msg.typ {
                    MessageType::ERROR => tracing::error!("server: {}", msg.message),
                    MessageType::WARNING => tracing::warn!("server: {}", msg.message),
                    _ => tracing::info!("server: {}", msg.message),
                }
                ControlFlow::Continue(())
            });

            // The server asks permission before creating a progress token.
            router.request::<request::WorkDoneProgressCreate, _>(|this, params| {
                if let Ok(mut state) = this.progress.lock() {
                    state
                        .active
                        .insert(ProgressState::token_key(&params.token));
                    state.touch();
                }
                async move { Ok(()) }
            });

            // Servers poll configuration they never received; answer null
            // per section so they fall back to defaults.
            router.request::<request::WorkspaceConfiguration, _>(|_this, params| {
                let sections = params.items.len();
                async move { Ok(vec![Value::Null; sections]) }
            });

            router.request::<request::RegisterCapability, _>(|_this, _params| async move {
                Ok(())
            });
            router.request::<request::UnregisterCapability, _>(|_this, _params| async move {
                Ok(())
            });

            router.unhandled_notification(|_this, notif| {
                tracing::trace!(method = %notif.method, "unhandled server notification");
                ControlFlow::Continue(())
            });

            // Build the service with layers
            ServiceBuilder::new()
                .layer(TracingLayer::default())
                .layer(CatchUnwindLayer::default())
                .layer(ConcurrencyLayer::default())
                .service(router)
        });

        // Spawn the mainloop to handle communication
        let log_paths = io_logs.as_ref().map(IoLogs::paths);
        let mainloop_handle = tokio::spawn(async move {
            let (from_server_log, to_server_log) = match io_logs {
                Some(logs) => (Some(logs.from_server), Some(logs.to_server)),
                None => (None, None),
            };
            let stdout = TeeReader::new(stdout, from_server_log);
            let stdin = TeeWriter::new(stdin, to_server_log);
            mainloop.run_buffered(stdout, stdin).await.ok();
        });

        // Prepare initialization parameters
        let workspace_uri = Url::from_file_path(&workspace_root).map_err(|()| {
            LspError::InitializationFailed(format!(
                "invalid workspace root path: {}",
                workspace_root.display()
            ))
        })?;

        #[allow(deprecated)] // root_uri: workspace folders are deliberately off
        let init_params = InitializeParams {
            process_id: Some(std::process::id()),
            root_uri: Some(workspace_uri),
            workspace_folders: None,
            initialization_options: self.config.initialization_options.clone(),
            capabilities: client_capabilities(),
            trace: Some(TraceValue::Off),
            client_info: Some(ClientInfo {
                name: "codegraph".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            locale: None,
            work_done_progress_params: WorkDoneProgressParams::default(),
            ..Default::default()
        };

        // Wrap server in Arc<Mutex<>> for shared mutable access
        let server = Arc::new(Mutex::new(server));

        // Send initialize request
        let init_result = tokio::time::timeout(
            self.config.init_timeout,
            server.lock().await.initialize(init_params),
        )
        .await
        .map_err(|_| LspError::Timeout(self.config.init_timeout))?
        .map_err(|e| LspError::InitializationFailed(format!("initialize request failed: {e:?}")))?;

        let capabilities = Arc::new(init_result.capabilities);

        // Send initialized notification
        server
            .lock()
            .await
            .initialized(InitializedParams {})
            .map_err(|e| {
                LspError::InitializationFailed(format!("initialized notification failed: {e:?}"))
            })?;

        Ok(LspClient {
            server,
            _mainloop_handle: mainloop_handle,
            capabilities,
            open_documents: Arc::new(Mutex::new(HashSet::new())),
            child: Arc::new(Mutex::new(child)),
            diagnostics,
            progress,
            io_log_paths: log_paths,
        })
    }
}

/// Advertised client capabilities: hierarchical document symbols with tag and
/// kind value sets, the goto family without link support, plaintext/markdown
/// hover, call and type hierarchy, push diagnostics with tags, and semantic
/// tokens. Dynamic registration and workspace folders stay off.
fn client_capabilities() -> ClientCapabilities {
    let symbol_kinds = vec![
        SymbolKind::FILE,
        SymbolKind::MODULE,
        SymbolKind::NAMESPACE,
        SymbolKind::PACKAGE,
        SymbolKind::CLASS,
        SymbolKind::METHOD,
        SymbolKind::PROPERTY,
        SymbolKind::FIELD,
        SymbolKind::CONSTRUCTOR,
        SymbolKind::ENUM,
        SymbolKind::INTERFACE,
        SymbolKind::FUNCTION,
        SymbolKind::VARIABLE,
        SymbolKind::CONSTANT,
        SymbolKind::STRING,
        SymbolKind::NUMBER,
        SymbolKind::BOOLEAN,
        SymbolKind::ARRAY,
        SymbolKind::OBJECT,
        SymbolKind::KEY,
        SymbolKind::NULL,
        SymbolKind::ENUM_MEMBER,
        SymbolKind::STRUCT,
        SymbolKind::EVENT,
        SymbolKind::OPERATOR,
        SymbolKind::TYPE_PARAMETER,
    ];

    ClientCapabilities {
        text_document: Some(TextDocumentClientCapabilities {
            synchronization: Some(TextDocumentSyncClientCapabilities {
                dynamic_registration: Some(false),
                will_save: Some(false),
                will_save_wait_until: Some(false),
                did_save: Some(false),
            }),
            hover: Some(HoverClientCapabilities {
                dynamic_registration: Some(false),
                content_format: Some(vec![MarkupKind::PlainText, MarkupKind::Markdown]),
            }),
            definition: Some(GotoCapability {
                dynamic_registration: Some(false),
                link_support: Some(false),
            }),
            declaration: Some(GotoCapability {
                dynamic_registration: Some(false),
                link_support: Some(false),
            }),
            type_definition: Some(GotoCapability {
                dynamic_registration: Some(false),
                link_support: Some(false),
            }),
            implementation: Some(GotoCapability {
                dynamic_registration: Some(false),
                link_support: Some(false),
            }),
            references: Some(DynamicRegistrationClientCapabilities {
                dynamic_registration: Some(false),
            }),
            document_symbol: Some(DocumentSymbolClientCapabilities {
                dynamic_registration: Some(false),
                hierarchical_document_symbol_support: Some(true),
                symbol_kind: Some(SymbolKindCapability {
                    value_set: Some(symbol_kinds),
                }),
                tag_support: Some(TagSupport {
                    value_set: vec![SymbolTag::DEPRECATED],
                }),
            }),
            call_hierarchy: Some(DynamicRegistrationClientCapabilities {
                dynamic_registration: Some(false),
            }),
            type_hierarchy: Some(lsp_types::TypeHierarchyClientCapabilities {
                dynamic_registration: Some(false),
            }),
            publish_diagnostics: Some(PublishDiagnosticsClientCapabilities {
                related_information: Some(true),
                tag_support: Some(TagSupport {
                    value_set: vec![
                        lsp_types::DiagnosticTag::UNNECESSARY,
                        lsp_types::DiagnosticTag::DEPRECATED,
                    ],
                }),
                ..Default::default()
            }),
            diagnostic: Some(DiagnosticClientCapabilities {
                dynamic_registration: Some(false),
                related_document_support: Some(false),
            }),
            semantic_tokens: Some(SemanticTokensClientCapabilities {
                token_types: vec![
                    SemanticTokenType::NAMESPACE,
                    SemanticTokenType::TYPE,
                    SemanticTokenType::CLASS,
                    SemanticTokenType::ENUM,
                    SemanticTokenType::INTERFACE,
                    SemanticTokenType::STRUCT,
                    SemanticTokenType::TYPE_PARAMETER,
                    SemanticTokenType::PARAMETER,
                    SemanticTokenType::VARIABLE,
                    SemanticTokenType::PROPERTY,
                    SemanticTokenType::ENUM_MEMBER,
                    SemanticTokenType::EVENT,
                    SemanticTokenType::FUNCTION,
                    SemanticTokenType::METHOD,
                    SemanticTokenType::MACRO,
                    SemanticTokenType::KEYWORD,
                    SemanticTokenType::MODIFIER,
                    SemanticTokenType::COMMENT,
                    SemanticTokenType::STRING,
                    SemanticTokenType::NUMBER,
                    SemanticTokenType::REGEXP,
                    SemanticTokenType::OPERATOR,
                ],
                token_modifiers: vec![
                    SemanticTokenModifier::DECLARATION,
                    SemanticTokenModifier::DEFINITION,
                    SemanticTokenModifier::READONLY,
                    SemanticTokenModifier::STATIC,
                    SemanticTokenModifier::DEPRECATED,
                    SemanticTokenModifier::ABSTRACT,
                ],
                formats: vec![TokenFormat::RELATIVE],
                ..Default::default()
            }),
            ..Default::default()
        }),
        window: Some(WindowClientCapabilities {
            work_done_progress: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// LSP client for communicating with language servers.
///
/// The client manages the lifecycle of a language server process and exposes
/// the raw LSP operations; timeout policy lives one level up in the handler.
pub struct LspClient {
    /// The language server handle for making requests.
    server: Arc<Mutex<ServerSocket>>,
    /// Handle to the mainloop task.
    _mainloop_handle: tokio::task::JoinHandle<()>,
    /// Server capabilities from initialization.
    capabilities: Arc<ServerCapabilities>,
    /// Set of currently open documents.
    open_documents: Arc<Mutex<HashSet<Url>>>,
    /// The language server process handle (kept alive to prevent kill-on-drop).
    child: Arc<Mutex<async_process::Child>>,
    /// Pushed diagnostics collected by the router.
    diagnostics: Arc<StdMutex<DiagnosticsBuffer>>,
    /// Work-done progress state collected by the router.
    progress: Arc<StdMutex<ProgressState>>,
    /// Temp-file paths of the I/O tee, when enabled.
    io_log_paths: Option<(PathBuf, PathBuf)>,
}

impl std::fmt::Debug for LspClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LspClient")
            .field("capabilities", &self.capabilities)
            .field("io_log_paths", &self.io_log_paths)
            .finish()
    }
}

impl LspClient {
    /// Creates a new builder for constructing an LSP client.
    pub fn builder() -> LspClientBuilder {
        LspClientBuilder::new()
    }

    /// Server capabilities advertised at initialization.
    pub fn capabilities(&self) -> &ServerCapabilities {
        &self.capabilities
    }

    /// Paths of the I/O log temp files, when logging was enabled.
    pub fn io_log_paths(&self) -> Option<&(PathBuf, PathBuf)> {
        self.io_log_paths.as_ref()
    }

    /// Snapshot of the work-done progress state.
    pub fn progress_state<T>(&self, f: impl FnOnce(&ProgressState) -> T) -> T {
        let state = self.progress.lock().unwrap_or_else(|e| e.into_inner());
        f(&state)
    }

    /// Drains all buffered `publishDiagnostics` batches.
    pub fn drain_pushed_diagnostics(&self) -> Vec<PublishDiagnosticsParams> {
        self.diagnostics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
    }

    /// Shuts down the language server gracefully.
    /// ## Errors
    pub async fn shutdown(&self) -> LspResult<()> {
        self.server
            .lock()
            .await
            .shutdown(())
            .await
            .map_err(|e| LspError::RequestFailed(format!("shutdown request failed: {e:?}")))?;

        self.server
            .lock()
            .await
            .exit(())
            .map_err(|e| LspError::RequestFailed(format!("exit notification failed: {e:?}")))?;

        Ok(())
    }

    /// Terminates the server process without a shutdown handshake. Used for
    /// servers that block on their shutdown streams.
    pub async fn terminate(&self) -> LspResult<()> {
        self.child
            .lock()
            .await
            .kill()
            .map_err(|e| LspError::ServerExited(format!("failed to kill server: {e}")))?;
        Ok(())
    }

    /// Opens a document, sending `textDocument/didOpen`.
    /// ## Errors
    pub async fn did_open(&self, path: &Path, language_id: &str) -> LspResult<()> {
        let uri = path_to_url(path)?;

        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            LspError::DocumentNotFound(format!("failed to read '{}': {}", path.display(), e))
        })?;

        let params = DidOpenTextDocumentParams {
            text_document: TextDocumentItem {
                uri: uri.clone(),
                language_id: language_id.to_string(),
                version: 0,
                text: content,
            },
        };

        self.server
            .lock()
            .await
            .did_open(params)
            .map_err(|e| LspError::RequestFailed(format!("didOpen notification failed: {e:?}")))?;

        self.open_documents.lock().await.insert(uri);

        Ok(())
    }

    /// Opens a document only if it is not already open. Returns whether the
    /// didOpen was actually sent.
    /// ## Errors
    pub async fn ensure_open(&self, path: &Path, language_id: &str) -> LspResult<bool> {
        let uri = path_to_url(path)?;
        if self.open_documents.lock().await.contains(&uri) {
            return Ok(false);
        }
        self.did_open(path, language_id).await?;
        Ok(true)
    }

    /// Closes a document, sending `textDocument/didClose`.
    /// ## Errors
    pub async fn did_close(&self, path: &Path) -> LspResult<()> {
        let uri = path_to_url(path)?;

        let params = DidCloseTextDocumentParams {
            text_document: TextDocumentIdentifier { uri: uri.clone() },
        };

        self.server
            .lock()
            .await
            .did_close(params)
            .map_err(|e| LspError::RequestFailed(format!("didClose notification failed: {e:?}")))?;

        self.open_documents.lock().await.remove(&uri);

        Ok(())
    }

    /// Gets all symbols in a document.
    /// ## Errors
    pub async fn document_symbols(&self, path: &Path) -> LspResult<Option<DocumentSymbolResponse>> {
        let uri = path_to_url(path)?;

        let params = DocumentSymbolParams {
            text_document: TextDocumentIdentifier { uri },
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
        };

        self.server
            .lock()
            .await
            .document_symbol(params)
            .await
            .map_err(|e| LspError::RequestFailed(format!("document_symbol failed: {e:?}")))
    }

    /// Gets hover information for the symbol at the given position.
    /// ## Errors
    pub async fn hover(&self, path: &Path, position: lsp_types::Position) -> LspResult<Option<Hover>> {
        let uri = path_to_url(path)?;

        let params = HoverParams {
            text_document_position_params: TextDocumentPositionParams {
                text_document: TextDocumentIdentifier { uri },
                position,
            },
            work_done_progress_params: WorkDoneProgressParams::default(),
        };

        self.server
            .lock()
            .await
            .hover(params)
            .await
            .map_err(|e| LspError::RequestFailed(format!("hover failed: {e:?}")))
    }

    /// One adaptor for the whole goto family: definition, declaration,
    /// typeDefinition and implementation all share the same param and
    /// response shapes.
    /// ## Errors
    pub async fn goto_request<R>(
        &self,
        path: &Path,
        position: lsp_types::Position,
    ) -> LspResult<Option<GotoDefinitionResponse>>
    where
        R: request::Request<Params = GotoDefinitionParams, Result = Option<GotoDefinitionResponse>>,
    {
        let uri = path_to_url(path)?;

        let params = GotoDefinitionParams {
            text_document_position_params: TextDocumentPositionParams {
                text_document: TextDocumentIdentifier { uri },
                position,
            },
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
        };

        self.server
            .lock()
            .await
            .request::<R>(params)
            .await
            .map_err(|e| LspError::RequestFailed(format!("{} failed: {e:?}", R::METHOD)))
    }

    /// Finds all references to the symbol at the given position.
    /// ## Errors
    pub async fn references(
        &self,
        path: &Path,
        position: lsp_types::Position,
        include_declaration: bool,
    ) -> LspResult<Vec<lsp_types::Location>> {
        let uri = path_to_url(path)?;

        let params = ReferenceParams {
            text_document_position: TextDocumentPositionParams {
                text_document: TextDocumentIdentifier { uri },
                position,
            },
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
            context: ReferenceContext {
                include_declaration,
            },
        };

        let result = self
            .server
            .lock()
            .await
            .references(params)
            .await
            .map_err(|e| LspError::RequestFailed(format!("references failed: {e:?}")))?;

        Ok(result.unwrap_or_default())
    }

    /// Prepares call hierarchy items for the given position.
    /// ## Errors
    pub async fn prepare_call_hierarchy(
        &self,
        path: &Path,
        position: lsp_types::Position,
    ) -> LspResult<Vec<CallHierarchyItem>> {
        let uri = path_to_url(path)?;

        let params = CallHierarchyPrepareParams {
            text_document_position_params: TextDocumentPositionParams {
                text_document: TextDocumentIdentifier { uri },
                position,
            },
            work_done_progress_params: WorkDoneProgressParams::default(),
        };

        let result = self
            .server
            .lock()
            .await
            .request::<request::CallHierarchyPrepare>(params)
            .await
            .map_err(|e| {
                LspError::RequestFailed(format!("prepare_call_hierarchy failed: {e:?}"))
            })?;

        Ok(result.unwrap_or_default())
    }

    /// Gets outgoing calls for a prepared call-hierarchy item. Sent through
    /// the generic request path: some servers reject the typed wrapper's
    /// params for this method.
    /// ## Errors
    pub async fn outgoing_calls(
        &self,
        item: CallHierarchyItem,
    ) -> LspResult<Vec<CallHierarchyOutgoingCall>> {
        let params = CallHierarchyOutgoingCallsParams {
            item,
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
        };

        let result = self
            .server
            .lock()
            .await
            .request::<request::CallHierarchyOutgoingCalls>(params)
            .await
            .map_err(|e| LspError::RequestFailed(format!("outgoing_calls failed: {e:?}")))?;

        Ok(result.unwrap_or_default())
    }

    /// Prepares type hierarchy items for the given position.
    /// ## Errors
    pub async fn prepare_type_hierarchy(
        &self,
        path: &Path,
        position: lsp_types::Position,
    ) -> LspResult<Vec<TypeHierarchyItem>> {
        let uri = path_to_url(path)?;

        let params = TypeHierarchyPrepareParams {
            text_document_position_params: TextDocumentPositionParams {
                text_document: TextDocumentIdentifier { uri },
                position,
            },
            work_done_progress_params: WorkDoneProgressParams::default(),
        };

        let result = self
            .server
            .lock()
            .await
            .request::<request::TypeHierarchyPrepare>(params)
            .await
            .map_err(|e| {
                LspError::RequestFailed(format!("prepare_type_hierarchy failed: {e:?}"))
            })?;

        Ok(result.unwrap_or_default())
    }

    /// Gets supertypes for a prepared type-hierarchy item.
    /// ## Errors
    pub async fn supertypes(&self, item: TypeHierarchyItem) -> LspResult<Vec<TypeHierarchyItem>> {
        let params = TypeHierarchySupertypesParams {
            item,
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
        };

        let result = self
            .server
            .lock()
            .await
            .request::<request::TypeHierarchySupertypes>(params)
            .await
            .map_err(|e| LspError::RequestFailed(format!("supertypes failed: {e:?}")))?;

        Ok(result.unwrap_or_default())
    }

    /// Pulls diagnostics for one document (`textDocument/diagnostic`).
    /// ## Errors
    pub async fn pull_diagnostics(&self, path: &Path) -> LspResult<Vec<Diagnostic>> {
        use lsp_types::{
            DocumentDiagnosticParams, DocumentDiagnosticReport, DocumentDiagnosticReportResult,
        };

        let uri = path_to_url(path)?;

        let params = DocumentDiagnosticParams {
            text_document: TextDocumentIdentifier { uri },
            identifier: None,
            previous_result_id: None,
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
        };

        let result = self
            .server
            .lock()
            .await
            .request::<request::DocumentDiagnosticRequest>(params)
            .await
            .map_err(|e| LspError::RequestFailed(format!("pull diagnostics failed: {e:?}")))?;

        Ok(match result {
            DocumentDiagnosticReportResult::Report(DocumentDiagnosticReport::Full(report)) => {
                report.full_document_diagnostic_report.items
            }
            _ => Vec::new(),
        })
    }
}

/// Paths and handles of the optional I/O tee.
struct IoLogs {
    from_server: std::fs::File,
    to_server: std::fs::File,
    from_path: PathBuf,
    to_path: PathBuf,
}

impl IoLogs {
    fn create() -> LspResult<Self> {
        let dir = std::env::temp_dir();
        let pid = std::process::id();
        let from_path = dir.join(format!("codegraph-lsp-{pid}-from-server.log"));
        let to_path = dir.join(format!("codegraph-lsp-{pid}-to-server.log"));
        let open = |p: &Path| {
            std::fs::File::create(p).map_err(|e| {
                LspError::InitializationFailed(format!(
                    "failed to create LSP I/O log {}: {e}",
                    p.display()
                ))
            })
        };
        Ok(Self {
            from_server: open(&from_path)?,
            to_server: open(&to_path)?,
            from_path,
            to_path,
        })
    }

    fn paths(&self) -> (PathBuf, PathBuf) {
        (self.from_path.clone(), self.to_path.clone())
    }
}

/// AsyncRead wrapper copying everything it reads into a log file.
struct TeeReader<R> {
    inner: R,
    log: Option<std::fs::File>,
}

impl<R> TeeReader<R> {
    fn new(inner: R, log: Option<std::fs::File>) -> Self {
        Self { inner, log }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for TeeReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<std::io::Result<usize>> {
        let this = &mut *self;
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(n)) => {
                if let Some(log) = &mut this.log {
                    let _ = log.write_all(&buf[..n]);
                }
                Poll::Ready(Ok(n))
            }
            other => other,
        }
    }
}

/// AsyncWrite wrapper copying everything it writes into a log file.
struct TeeWriter<W> {
    inner: W,
    log: Option<std::fs::File>,
}

impl<W> TeeWriter<W> {
    fn new(inner: W, log: Option<std::fs::File>) -> Self {
        Self { inner, log }
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for TeeWriter<W> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let this = &mut *self;
        match Pin::new(&mut this.inner).poll_write(cx, buf) {
            Poll::Ready(Ok(n)) => {
                if let Some(log) = &mut this.log {
                    let _ = log.write_all(&buf[..n]);
                }
                Poll::Ready(Ok(n))
            }
            other => other,
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_close(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_default() {
        let builder = LspClientBuilder::new();
        assert_eq!(
            builder.config.server_command,
            PathBuf::from("rust-analyzer")
        );
    }

    #[test]
    fn test_builder_configuration() {
        let builder = LspClientBuilder::new()
            .server_command("pylsp")
            .server_args(["--verbose"])
            .workspace_root("/home/user/project")
            .init_timeout(std::time::Duration::from_secs(60));

        assert_eq!(builder.config.server_command, PathBuf::from("pylsp"));
        assert_eq!(builder.config.server_args, vec!["--verbose"]);
        assert_eq!(
            builder.config.workspace_root,
            PathBuf::from("/home/user/project")
        );
        assert_eq!(
            builder.config.init_timeout,
            std::time::Duration::from_secs(60)
        );
    }

    #[test]
    fn benign_messages_are_filtered() {
        assert!(is_benign_server_message(
            "gopls: no package metadata for file file:///tmp/x.go"
        ));
        assert!(is_benign_server_message(
            "E[12:00] Handling the didOpen notification failed"
        ));
        assert!(!is_benign_server_message("panic: index out of range"));
    }

    #[test]
    fn progress_quiescence_rules() {
        let mut state = ProgressState::default();
        // Never saw progress at all: quiescent immediately.
        assert!(state.quiescent_since(std::time::Duration::from_millis(500)));

        state.active.insert("token-1".to_string());
        state.touch();
        assert!(!state.quiescent_since(std::time::Duration::ZERO));

        state.active.clear();
        // Tokens ended but the last event was just now.
        assert!(!state.quiescent_since(std::time::Duration::from_secs(5)));
        assert!(state.quiescent_since(std::time::Duration::ZERO));
    }

    #[test]
    fn diagnostics_buffer_drains_completely() {
        let mut buffer = DiagnosticsBuffer::default();
        let uri = Url::parse("file:///tmp/a.rs").unwrap();
        buffer.push(PublishDiagnosticsParams {
            uri: uri.clone(),
            diagnostics: vec![],
            version: None,
        });
        buffer.push(PublishDiagnosticsParams {
            uri,
            diagnostics: vec![],
            version: None,
        });
        assert_eq!(buffer.drain().len(), 2);
        assert!(buffer.drain().is_empty());
    }
}
