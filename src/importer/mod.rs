//! The import pipeline.
//!
//! Drives the LSP handler through the phases described in the crate docs:
//! discover files, materialize nodes serially, build the per-file range
//! indexes, fan relation queries out in parallel, fold diagnostics in and
//! aggregate metrics up the hierarchy.

pub mod discovery;
pub mod metrics;
pub mod packages;
pub mod perf;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures::StreamExt as _;
use lsp_types::{DocumentSymbol, Position};
use tokio::sync::{Mutex, Semaphore};
use uuid::Uuid;

use crate::config::{DiagnosticLevel, EdgeKind, ImportConfig, NodeKind};
use crate::error::ImportError;
use crate::graph::{attr, Attributable, Edge, Graph, Node, Range};
use crate::interval::{Entry, SymbolIndex};
use crate::lsp::types::{from_lsp_position, SourceLocation};
use crate::lsp::LspHandler;
use crate::registry::{self, ServerSpec};

use perf::PhaseTimer;

/// Pull diagnostics stay disabled until a capability audit of the registered
/// servers justifies switching; push covers all of them today.
const PULL_DIAGNOSTICS: bool = false;

/// In-flight relation queries across all edge-phase tasks. Language servers
/// throttle poorly above this.
const RELATION_QUERY_PERMITS: usize = 4;

/// Cooperative cancellation flag checked at every phase and loop head.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates an un-cancelled flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<(), ImportError> {
        if self.is_cancelled() {
            Err(ImportError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Where a symbol node can be queried: its file and its name position.
#[derive(Debug, Clone)]
struct SymbolSite {
    node_id: String,
    file: PathBuf,
    position: Position,
}

/// One import run.
pub struct Importer {
    config: ImportConfig,
    spec: &'static ServerSpec,
    executable: PathBuf,
}

impl Importer {
    /// Validates the configuration. Everything here fails before any LSP
    /// traffic: unknown server, missing project root, unresolvable
    /// executable.
    pub fn new(mut config: ImportConfig) -> Result<Self, ImportError> {
        let spec = registry::by_name(&config.server)
            .ok_or_else(|| ImportError::UnknownServer(config.server.clone()))?;

        config.project_root = config.project_root.canonicalize().map_err(|e| {
            ImportError::Setup(format!(
                "project root {} not accessible: {e}",
                config.project_root.display()
            ))
        })?;
        config.include_dirs = config
            .include_dirs
            .iter()
            .map(|d| {
                d.canonicalize().map_err(|e| {
                    ImportError::Setup(format!(
                        "include directory {} not accessible: {e}",
                        d.display()
                    ))
                })
            })
            .collect::<Result<_, _>>()?;

        let executable = spec.resolve_executable().ok_or_else(|| {
            ImportError::Setup(format!(
                "executable '{}' for server '{}' not found on PATH",
                spec.executable, spec.name
            ))
        })?;

        Ok(Self {
            config,
            spec,
            executable,
        })
    }

    /// The validated configuration.
    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    /// Runs the whole pipeline and returns the finished graph.
    pub async fn run(&self, cancel: &CancelFlag) -> Result<Graph, ImportError> {
        let mut timer = PhaseTimer::new();

        timer.start("discover");
        cancel.check()?;
        let files = discovery::discover_files(&self.config, self.spec)?;
        if files.is_empty() {
            return Err(ImportError::NoMatchingFiles {
                root: self.config.project_root.clone(),
                server: self.spec.name.to_string(),
            });
        }
        tracing::info!(files = files.len(), server = self.spec.name, "starting import");

        timer.start("initialize");
        let handler = LspHandler::start(
            self.spec,
            &self.executable,
            &self.config.project_root,
            self.config.timeout,
            self.config.log_lsp_io,
        )
        .await?;
        if let Some((from, to)) = handler.io_log_paths() {
            tracing::info!(
                "LSP I/O logged to {} and {}",
                from.display(),
                to.display()
            );
        }

        let result = self.run_phases(&handler, files, cancel, &mut timer).await;

        handler.shutdown().await;
        timer.finish();
        if let Some(csv) = &self.config.perf_csv {
            if let Err(e) = timer.append_csv(csv) {
                tracing::warn!("failed to write performance CSV: {e}");
            }
        }
        result
    }

    async fn run_phases(
        &self,
        handler: &LspHandler,
        files: Vec<PathBuf>,
        cancel: &CancelFlag,
        timer: &mut PhaseTimer,
    ) -> Result<Graph, ImportError> {
        let graph_name = self
            .config
            .project_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string());
        let mut graph = Graph::new(graph_name);

        timer.start("nodes");
        let mut node_phase = NodePhase {
            config: &self.config,
            handler,
            graph: &mut graph,
            sites: Vec::new(),
        };
        for file in &files {
            cancel.check()?;
            node_phase.import_file(file).await?;
        }
        let sites = node_phase.sites;

        if self.spec.java_family {
            timer.start("packages");
            packages::synthesize_packages(&mut graph)?;
        }

        timer.start("index");
        cancel.check()?;
        let indexes = self.build_indexes(&graph);

        timer.start("edges");
        cancel.check()?;
        let edges_added = self
            .edge_phase(handler, &graph_mutex(&mut graph), &indexes, sites, cancel)
            .await;
        tracing::info!(edges = edges_added, "edge phase complete");

        timer.start("diagnostics");
        cancel.check()?;
        self.apply_diagnostics(handler, &mut graph, &indexes, &files)
            .await;

        timer.start("aggregate");
        metrics::aggregate(&mut graph, &[attr::LOC], false, true);
        let counters: Vec<&str> = DiagnosticLevel::ALL
            .iter()
            .map(|l| l.counter_attribute())
            .collect();
        metrics::aggregate(&mut graph, &counters, true, true);

        timer.start("finalize");
        graph.set_base_path(&self.config.project_root);
        graph.finalize();
        Ok(graph)
    }

    /// Groups every node carrying a source range by file and builds one
    /// index per file.
    fn build_indexes(&self, graph: &Graph) -> HashMap<PathBuf, SymbolIndex> {
        let mut per_file: HashMap<PathBuf, Vec<Entry>> = HashMap::new();
        for node in graph.nodes() {
            let Some(range) = node.attrs().range(attr::SOURCE_RANGE) else {
                continue;
            };
            let Some(file) = node.attrs().string(attr::SOURCE_FILE) else {
                continue;
            };
            let dir = node.attrs().string(attr::SOURCE_PATH).unwrap_or_default();
            let path = self.config.project_root.join(dir).join(file);
            per_file
                .entry(path)
                .or_default()
                .push(Entry::new(range, node.id()));
        }
        per_file
            .into_iter()
            .map(|(path, entries)| {
                (path, SymbolIndex::build(entries, self.config.optimized_lookup))
            })
            .collect()
    }

    /// The parallel edge phase: every (file, node) site runs the enabled,
    /// capability-gated relation queries in fixed order; a global semaphore
    /// bounds in-flight LSP requests. Per-site failures are absorbed.
    async fn edge_phase(
        &self,
        handler: &LspHandler,
        graph: &Mutex<&mut Graph>,
        indexes: &HashMap<PathBuf, SymbolIndex>,
        sites: Vec<SymbolSite>,
        cancel: &CancelFlag,
    ) -> usize {
        let kinds: Vec<EdgeKind> = EdgeKind::ALL
            .into_iter()
            .filter(|k| self.config.edge_kind_enabled(*k))
            .filter(|k| {
                let supported = k.supported_by(handler.capabilities());
                if !supported {
                    tracing::debug!(kind = ?k, "server lacks capability, skipping");
                }
                supported
            })
            .collect();
        if kinds.is_empty() || sites.is_empty() {
            return 0;
        }

        // Parent snapshot so the parent-reference filter runs without the
        // graph lock; the hierarchy does not change during this phase.
        let parents: HashMap<String, String> = {
            let g = graph.lock().await;
            g.nodes()
                .filter_map(|n| Some((n.id().to_string(), n.parent()?.to_string())))
                .collect()
        };

        let jobs = self.config.jobs.unwrap_or_else(|| {
            std::thread::available_parallelism().map_or(4, |n| n.get())
        });
        let semaphore = Semaphore::new(RELATION_QUERY_PERMITS);
        let counter = AtomicUsize::new(0);

        futures::stream::iter(sites)
            .for_each_concurrent(jobs, |site| {
                let kinds = &kinds;
                let parents = &parents;
                let semaphore = &semaphore;
                let counter = &counter;
                async move {
                    if cancel.is_cancelled() {
                        return;
                    }
                    if let Err(e) = self
                        .process_site(
                            handler, graph, indexes, parents, semaphore, kinds, &site, counter,
                        )
                        .await
                    {
                        tracing::warn!(node = %site.node_id, "relation queries failed: {e}");
                    }
                }
            })
            .await;

        counter.into_inner()
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_site(
        &self,
        handler: &LspHandler,
        graph: &Mutex<&mut Graph>,
        indexes: &HashMap<PathBuf, SymbolIndex>,
        parents: &HashMap<String, String>,
        semaphore: &Semaphore,
        kinds: &[EdgeKind],
        site: &SymbolSite,
        counter: &AtomicUsize,
    ) -> Result<(), ImportError> {
        if let Err(e) = handler.ensure_document_open(&site.file).await {
            tracing::debug!("didOpen for {} failed: {e}", site.file.display());
        }

        let position = site.position;
        let probe = Range::degenerate(position.line, position.character);
        for kind in kinds {
            let locations: Vec<SourceLocation> = {
                let Ok(_permit) = semaphore.acquire().await else {
                    return Ok(());
                };
                match kind {
                    EdgeKind::Definition => handler.definition(&site.file, position).await,
                    EdgeKind::Declaration => handler.declaration(&site.file, position).await,
                    EdgeKind::TypeDefinition => {
                        handler.type_definition(&site.file, position).await
                    }
                    EdgeKind::Implementation => {
                        handler.implementation(&site.file, position).await
                    }
                    EdgeKind::Reference => handler.references(&site.file, position).await,
                    EdgeKind::Call => handler
                        .outgoing_calls(
                            |item| Range::from(item.selection_range).contains(&probe)
                                || Range::from(item.range).contains(&probe),
                            &site.file,
                            position,
                        )
                        .await
                        .into_iter()
                        .filter_map(|item| {
                            Some(SourceLocation {
                                path: item.uri.to_file_path().ok()?,
                                range: item.range.into(),
                                selection_range: Some(item.selection_range.into()),
                            })
                        })
                        .collect(),
                    EdgeKind::Extend => handler
                        .supertypes(
                            |item| Range::from(item.selection_range).contains(&probe)
                                || Range::from(item.range).contains(&probe),
                            &site.file,
                            position,
                        )
                        .await
                        .into_iter()
                        .filter_map(|item| {
                            Some(SourceLocation {
                                path: item.uri.to_file_path().ok()?,
                                range: item.range.into(),
                                selection_range: Some(item.selection_range.into()),
                            })
                        })
                        .collect(),
                }
            };

            for location in locations {
                let Some(target) = self.resolve_target(indexes, &location) else {
                    continue;
                };
                self.insert_edge(graph, parents, *kind, &site.node_id, &target, counter)
                    .await;
            }
        }
        Ok(())
    }

    /// Resolves a reported location to the tightest enclosing node. Targets
    /// outside the project root stay unresolved by design.
    fn resolve_target(
        &self,
        indexes: &HashMap<PathBuf, SymbolIndex>,
        location: &SourceLocation,
    ) -> Option<String> {
        if !location.path.starts_with(&self.config.project_root) {
            return None;
        }
        let index = indexes.get(&location.path)?;
        let winners = index.tightest_enclosing(&location.range);
        if let Some(first) = winners.first() {
            return Some((*first).to_string());
        }
        // The full range missed (e.g. a link whose target range spills past
        // the indexed symbols); fall back to the name range.
        let selection = location.selection_range?;
        index
            .tightest_enclosing(&selection)
            .first()
            .map(|s| (*s).to_string())
    }

    /// Applies the insertion filters in order: self-reference drop,
    /// parent-reference drop, direction reversal, duplicate-id drop.
    async fn insert_edge(
        &self,
        graph: &Mutex<&mut Graph>,
        parents: &HashMap<String, String>,
        kind: EdgeKind,
        source: &str,
        target: &str,
        counter: &AtomicUsize,
    ) {
        if self.config.avoid_self_references && source == target {
            return;
        }
        if self.config.avoid_parent_references
            && parents.get(source).is_some_and(|p| p == target)
        {
            return;
        }
        let mut edge = Edge::new(kind.edge_type(), source, target);
        if kind.swaps_query_direction() {
            edge.reverse();
        }
        let mut g = graph.lock().await;
        match g.add_edge(edge) {
            Ok(true) => {
                counter.fetch_add(1, Ordering::Relaxed);
            }
            Ok(false) => {}
            Err(e) => tracing::warn!("dropping edge: {e}"),
        }
    }

    /// Folds diagnostics into severity counters on the tightest enclosing
    /// nodes. Push mode drains what the server sent spontaneously, after one
    /// timeout window of settling.
    async fn apply_diagnostics(
        &self,
        handler: &LspHandler,
        graph: &mut Graph,
        indexes: &HashMap<PathBuf, SymbolIndex>,
        files: &[PathBuf],
    ) {
        if PULL_DIAGNOSTICS && handler.supports_pull_diagnostics() {
            for file in files {
                let diagnostics = handler.pull_diagnostics(file).await;
                self.bump_counters(graph, indexes.get(file), diagnostics);
            }
        } else {
            tokio::time::sleep(self.config.timeout).await;
            for batch in handler.drain_pushed_diagnostics() {
                let Ok(path) = batch.uri.to_file_path() else {
                    continue;
                };
                self.bump_counters(graph, indexes.get(&path), batch.diagnostics);
            }
        }
    }

    fn bump_counters(
        &self,
        graph: &mut Graph,
        index: Option<&SymbolIndex>,
        diagnostics: Vec<lsp_types::Diagnostic>,
    ) {
        let Some(index) = index else {
            return;
        };
        for diagnostic in diagnostics {
            // Severity is optional on the wire; unspecified means error.
            let level = diagnostic
                .severity
                .and_then(DiagnosticLevel::from_lsp)
                .unwrap_or(DiagnosticLevel::Error);
            if !self.config.diagnostic_levels.contains(&level) {
                continue;
            }
            let targets: Vec<String> = index
                .tightest_enclosing(&diagnostic.range.into())
                .into_iter()
                .map(str::to_string)
                .collect();
            for id in targets {
                if let Some(node) = graph.node_mut(&id) {
                    node.attrs_mut().increment_int(level.counter_attribute(), 1);
                }
            }
        }
    }
}

/// Wraps the graph for the edge phase; only edge insertion happens under
/// this lock.
fn graph_mutex(graph: &mut Graph) -> Mutex<&mut Graph> {
    Mutex::new(graph)
}

/// Serial node phase state: one file at a time, documents opened and closed
/// in pairs.
struct NodePhase<'a> {
    config: &'a ImportConfig,
    handler: &'a LspHandler,
    graph: &'a mut Graph,
    sites: Vec<SymbolSite>,
}

impl NodePhase<'_> {
    async fn import_file(&mut self, file: &Path) -> Result<(), ImportError> {
        let Ok(relative) = file.strip_prefix(&self.config.project_root) else {
            tracing::warn!("{} lies outside the project root, skipped", file.display());
            return Ok(());
        };
        let relative = relative.to_path_buf();

        if let Err(e) = self.handler.open_document(file).await {
            tracing::warn!("could not open {}: {e}", file.display());
            return Ok(());
        }

        let result = self.import_open_file(file, &relative).await;

        if let Err(e) = self.handler.close_document(file).await {
            tracing::debug!("could not close {}: {e}", file.display());
        }
        result
    }

    async fn import_open_file(
        &mut self,
        file: &Path,
        relative: &Path,
    ) -> Result<(), ImportError> {
        let rel_dir = relative
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| format!("{}/", p.to_string_lossy()))
            .unwrap_or_default();
        let file_name = relative
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_stem = file
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_name.clone());

        let dir_node = self.ensure_directories(&rel_dir);
        let file_node = if self.config.node_kind_enabled(NodeKind::File) {
            Some(
                self.add_file_node(file, relative, &rel_dir, &file_name, &file_stem, dir_node.as_deref())
                    .await?,
            )
        } else {
            None
        };

        let symbols = match self.handler.document_symbols(file).await {
            Ok(symbols) => symbols,
            Err(e @ crate::error::LspError::FlatDocumentSymbols { .. }) => {
                return Err(ImportError::Lsp(e));
            }
            Err(e) => {
                tracing::warn!("documentSymbol for {} failed: {e}", file.display());
                Vec::new()
            }
        };

        let top_parent = file_node.or(dir_node);
        self.add_symbols(symbols, top_parent, file_stem, file, &rel_dir, &file_name)
            .await;
        Ok(())
    }

    /// Creates the chain of directory nodes from the project root down to
    /// `rel_dir`, returning the deepest node's id. Ids are project-relative
    /// with a trailing slash.
    fn ensure_directories(&mut self, rel_dir: &str) -> Option<String> {
        let mut parent: Option<String> = None;
        let mut prefix = String::new();
        for component in rel_dir.split('/').filter(|c| !c.is_empty()) {
            prefix.push_str(component);
            prefix.push('/');
            if !self.graph.contains_node(&prefix) {
                let mut node = Node::new("Directory");
                node.set_id(prefix.clone());
                node.set_source_name(component);
                let parent_prefix = &prefix[..prefix.len() - component.len() - 1];
                node.attrs_mut().set_string(attr::SOURCE_PATH, parent_prefix);
                if self.graph.add_node(node).is_ok() {
                    let _ = self.graph.reparent(&prefix, parent.as_deref());
                }
            }
            parent = Some(prefix.clone());
        }
        parent
    }

    async fn add_file_node(
        &mut self,
        file: &Path,
        relative: &Path,
        rel_dir: &str,
        file_name: &str,
        file_stem: &str,
        dir_node: Option<&str>,
    ) -> Result<String, ImportError> {
        let id = relative.to_string_lossy().into_owned();
        if self.graph.contains_node(&id) {
            return Ok(id);
        }

        let loc = tokio::fs::read_to_string(file)
            .await
            .map(|content| content.lines().count() as i64)
            .unwrap_or(0);

        let mut node = Node::new("File");
        node.set_id(id.clone());
        node.set_source_name(file_stem);
        node.attrs_mut().set_string(attr::SOURCE_FILE, file_name);
        node.attrs_mut().set_string(attr::SOURCE_PATH, rel_dir);
        node.attrs_mut().set_int(attr::LOC, loc);
        self.graph.add_node(node)?;
        self.graph.reparent(&id, dir_node)?;
        Ok(id)
    }

    /// Depth-first walk over the symbol tree with an explicit stack. Skipped
    /// kinds splice their children onto the nearest enabled ancestor; the id
    /// prefix always follows the symbol hierarchy.
    async fn add_symbols(
        &mut self,
        symbols: Vec<DocumentSymbol>,
        parent_node: Option<String>,
        parent_name: String,
        file: &Path,
        rel_dir: &str,
        file_name: &str,
    ) {
        let mut stack: Vec<(DocumentSymbol, Option<String>, String)> = symbols
            .into_iter()
            .rev()
            .map(|s| (s, parent_node.clone(), parent_name.clone()))
            .collect();

        while let Some((symbol, parent_node, parent_name)) = stack.pop() {
            let name = symbol.name.clone();
            let children = symbol.children.clone().unwrap_or_default();

            let kind = NodeKind::from_symbol_kind(symbol.kind)
                .filter(|k| self.config.node_kind_enabled(*k));
            let child_parent = match kind {
                Some(kind) => {
                    let id = self
                        .add_symbol_node(&symbol, kind, parent_node.as_deref(), &parent_name, file, rel_dir, file_name)
                        .await;
                    Some(id)
                }
                None => parent_node,
            };

            for child in children.into_iter().rev() {
                stack.push((child, child_parent.clone(), name.clone()));
            }
        }
    }

    async fn add_symbol_node(
        &mut self,
        symbol: &DocumentSymbol,
        kind: NodeKind,
        parent_node: Option<&str>,
        parent_name: &str,
        file: &Path,
        rel_dir: &str,
        file_name: &str,
    ) -> String {
        let range: Range = symbol.range.into();
        let selection: Range = symbol.selection_range.into();
        let (line, column) = from_lsp_position(symbol.selection_range.start);

        let mut node = Node::new(kind.type_name());
        let plain_id = if parent_name.is_empty() {
            symbol.name.clone()
        } else {
            format!("{parent_name}.{}", symbol.name)
        };
        node.set_id(plain_id.clone());
        node.set_source_name(&symbol.name);
        node.attrs_mut().set_string(attr::SOURCE_FILE, file_name);
        node.attrs_mut().set_string(attr::SOURCE_PATH, rel_dir);
        node.attrs_mut().set_int(attr::SOURCE_LINE, i64::from(line));
        node.attrs_mut().set_int(attr::SOURCE_COLUMN, i64::from(column));
        node.attrs_mut().set_range(attr::SOURCE_RANGE, &range);
        node.attrs_mut().set_range(attr::SELECTION_RANGE, &selection);
        node.attrs_mut().set_int(attr::LOC, i64::from(range.line_span()));
        #[allow(deprecated)] // pre-3.16 servers still use the bare flag
        let deprecated = symbol
            .tags
            .as_ref()
            .is_some_and(|tags| tags.contains(&lsp_types::SymbolTag::DEPRECATED))
            || symbol.deprecated == Some(true);
        if deprecated {
            node.attrs_mut().set_toggle(attr::DEPRECATED);
        }

        if let Some(existing) = self.graph.find_isomorphic(&node) {
            let id = existing.id().to_string();
            tracing::debug!(node = %id, "reusing isomorphic node");
            return id;
        }

        if self.handler.supports_hover() {
            if let Some(text) = self
                .handler
                .hover_text(file, symbol.selection_range.start)
                .await
            {
                node.attrs_mut().set_string(attr::HOVER_TEXT, text);
            }
        }

        if self.graph.contains_node(node.id()) {
            let unique = format!("{plain_id}#{}", Uuid::new_v4());
            tracing::debug!(node = %plain_id, "id collision, using {unique}");
            node.set_id(unique);
        }
        let id = node.id().to_string();
        if let Err(e) = self.graph.add_node(node) {
            tracing::warn!("could not add node: {e}");
            return id;
        }
        let _ = self.graph.reparent(&id, parent_node);

        self.sites.push(SymbolSite {
            node_id: id.clone(),
            file: file.to_path_buf(),
            position: symbol.selection_range.start,
        });
        id
    }
}
