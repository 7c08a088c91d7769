//! Reference lookup for the changed spans of one file.
//!
//! Each call owns a fresh analyzer process for the duration of one file:
//! spawn, `initialize`, `didOpen`, one `textDocument/references` per span,
//! then `close`. Any failure below spawn degrades to fewer references.

use super::client::{ProtocolClient, DEFAULT_REQUEST_TIMEOUT};
use super::registry::AnalyzerRegistry;
use super::uri::{path_to_uri, uri_to_relative_path, utf16_column};
use super::LspError;
use crate::session::ReferenceFinder;
use crate::symbols::{ChangedSpan, Reference};
use futures::future::BoxFuture;
use log::{debug, warn};
use lsp_types::notification::{DidOpenTextDocument, Initialized};
use lsp_types::request::{Initialize, References};
use lsp_types::{
    ClientCapabilities, DidOpenTextDocumentParams, InitializeParams, InitializedParams, Location,
    PartialResultParams, Position, ReferenceContext, ReferenceParams, TextDocumentIdentifier,
    TextDocumentItem, TextDocumentPositionParams, Uri, WorkDoneProgressParams, WorkspaceFolder,
};
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Lifecycle of one resolver session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    NotStarted,
    Spawned,
    Initialized,
    Querying,
    Closed,
}

#[derive(Debug, Clone)]
pub struct ReferenceResolver {
    registry: AnalyzerRegistry,
    timeout: Duration,
    cancel: CancellationToken,
}

impl Default for ReferenceResolver {
    fn default() -> Self {
        Self::new(AnalyzerRegistry::default())
    }
}

impl ReferenceResolver {
    pub fn new(registry: AnalyzerRegistry) -> Self {
        Self {
            registry,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Calls made by this resolver are aborted once `cancel` fires.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Attach references to `spans` of the file at `path` (relative to `root`).
    ///
    /// Never fails: spans come back in the same order, with references for
    /// every span whose lookup succeeded.
    pub async fn find_references(
        &self,
        root: &Path,
        spans: Vec<ChangedSpan>,
        path: &str,
    ) -> Vec<ChangedSpan> {
        let mut state = SessionState::NotStarted;
        if spans.is_empty() {
            return spans;
        }
        let Some(analyzer) = self.registry.for_path(path) else {
            debug!("[find_references] no analyzer for {path}");
            return spans;
        };
        if self.cancel.is_cancelled() {
            debug!("[find_references] {path}: cancelled before spawn");
            return spans;
        }

        let client = match ProtocolClient::spawn(&analyzer.command, &analyzer.args, root) {
            Ok(client) => client
                .with_timeout(self.timeout)
                .with_cancellation(self.cancel.child_token()),
            Err(e) => {
                warn!("[find_references] {path}: {e}");
                return spans;
            }
        };
        advance(&mut state, SessionState::Spawned, path);

        let spans =
            run_session(&client, root, spans, path, &analyzer.language_id, &mut state).await;

        client.close().await;
        advance(&mut state, SessionState::Closed, path);
        spans
    }
}

impl ReferenceFinder for ReferenceResolver {
    fn find_references<'a>(
        &'a self,
        root: &'a Path,
        spans: Vec<ChangedSpan>,
        path: &'a str,
    ) -> BoxFuture<'a, Vec<ChangedSpan>> {
        Box::pin(ReferenceResolver::find_references(self, root, spans, path))
    }
}

fn advance(state: &mut SessionState, next: SessionState, path: &str) {
    debug!("[find_references] {path}: {state:?} -> {next:?}");
    *state = next;
}

/// Drive an already-connected client through handshake and queries.
///
/// The caller owns the client and is responsible for closing it.
pub async fn resolve_with_client(
    client: &ProtocolClient,
    root: &Path,
    spans: Vec<ChangedSpan>,
    path: &str,
    language_id: &str,
) -> Vec<ChangedSpan> {
    let mut state = SessionState::Spawned;
    run_session(client, root, spans, path, language_id, &mut state).await
}

async fn run_session(
    client: &ProtocolClient,
    root: &Path,
    mut spans: Vec<ChangedSpan>,
    path: &str,
    language_id: &str,
    state: &mut SessionState,
) -> Vec<ChangedSpan> {
    if let Err(e) = initialize(client, root).await {
        warn!("[find_references] {path}: analyzer failed to initialize: {e}");
        return spans;
    }
    advance(state, SessionState::Initialized, path);

    let file_path = root.join(path);
    let uri = match path_to_uri(&file_path) {
        Ok(uri) => uri,
        Err(e) => {
            warn!("[find_references] {path}: {e}");
            return spans;
        }
    };

    let content = match tokio::fs::read_to_string(&file_path).await {
        Ok(content) => Some(content),
        Err(e) => {
            debug!("[find_references] {path}: could not read for didOpen: {e}");
            None
        }
    };
    if let Some(text) = &content {
        let params = DidOpenTextDocumentParams {
            text_document: TextDocumentItem {
                uri: uri.clone(),
                language_id: language_id.to_owned(),
                version: 1,
                text: text.clone(),
            },
        };
        if let Err(e) = client.notify_typed::<DidOpenTextDocument>(params).await {
            debug!("[find_references] {path}: didOpen failed: {e}");
        }
    }

    advance(state, SessionState::Querying, path);
    for span in &mut spans {
        if !span.has_anchor() {
            continue;
        }
        let character = content
            .as_deref()
            .and_then(|text| text.lines().nth(span.anchor_line as usize))
            .map_or(span.anchor_column, |line| {
                utf16_column(line, span.anchor_column as usize)
            });
        let position = Position::new(span.anchor_line, character);

        match client.request::<References>(reference_params(&uri, position)).await {
            Ok(locations) => {
                let locations = locations.unwrap_or_default();
                debug!(
                    "[find_references] {path}: {} -> {} references",
                    span.name,
                    locations.len()
                );
                span.references
                    .extend(locations.iter().map(|loc| reference_from_location(root, loc)));
                span.references_checked = true;
            }
            Err(LspError::Cancelled) => {
                debug!("[find_references] {path}: cancelled");
                break;
            }
            Err(e) => warn!("[find_references] {path}: {} skipped: {e}", span.name),
        }
    }

    spans
}

async fn initialize(client: &ProtocolClient, root: &Path) -> Result<(), LspError> {
    let root_uri = path_to_uri(root)?;
    let name = root
        .file_name()
        .map_or_else(|| root.display().to_string(), |n| n.to_string_lossy().into_owned());

    #[allow(deprecated, reason = "older analyzers only read rootUri")]
    let params = InitializeParams {
        process_id: Some(std::process::id()),
        root_uri: Some(root_uri.clone()),
        workspace_folders: Some(vec![WorkspaceFolder {
            uri: root_uri,
            name,
        }]),
        capabilities: ClientCapabilities::default(),
        ..InitializeParams::default()
    };

    client.request::<Initialize>(params).await?;
    client.notify_typed::<Initialized>(InitializedParams {}).await
}

fn reference_params(uri: &Uri, position: Position) -> ReferenceParams {
    ReferenceParams {
        text_document_position: TextDocumentPositionParams {
            text_document: TextDocumentIdentifier { uri: uri.clone() },
            position,
        },
        work_done_progress_params: WorkDoneProgressParams::default(),
        partial_result_params: PartialResultParams::default(),
        context: ReferenceContext {
            include_declaration: false,
        },
    }
}

fn reference_from_location(root: &Path, location: &Location) -> Reference {
    Reference {
        path: uri_to_relative_path(root, location.uri.as_str()),
        line: location.range.start.line + 1,
        start_column: location.range.start.character,
        end_column: location.range.end.character,
        context: None,
        context_start_line: None,
    }
}
