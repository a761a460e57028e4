use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, error, info, warn};
use ropey::Rope;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tower_lsp::jsonrpc::{Error, Result};
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};

use crate::completions;
use crate::config::Settings;
use crate::context;
use crate::signature;
use crate::store::CompanyStore;

pub const RELOAD_COMMAND: &str = "dt.reloadLibraries";
const STORE_WATCHER_ID: &str = "dt-store-watcher";

pub struct DocumentState {
    pub rope: Rope,
    pub source: String,
}

pub struct Backend {
    pub client: Client,
    pub document_map: DashMap<String, DocumentState>,
    pub store: Arc<RwLock<CompanyStore>>,
    pub settings: Arc<RwLock<Settings>>,
}

struct TextDocumentItem {
    uri: Url,
    text: String,
}

impl Backend {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            document_map: DashMap::new(),
            store: Arc::new(RwLock::new(CompanyStore::new())),
            settings: Arc::new(RwLock::new(Settings::default())),
        }
    }

    fn on_change(&self, params: TextDocumentItem) {
        self.document_map.insert(
            params.uri.to_string(),
            DocumentState {
                rope: Rope::from_str(&params.text),
                source: params.text,
            },
        );
    }

    /// Load the collection named by the current settings. A failed load
    /// leaves the previous collection in place.
    async fn reload_store(&self) {
        let path = self.settings.read().await.store_path.clone();
        let result = {
            let mut store = self.store.write().await;
            store.rebind(path).map(|()| {
                let source = store
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "no store configured".to_string());
                (
                    store.entries().len(),
                    store.snapshot().diagnostics().len(),
                    store.version(),
                    source,
                )
            })
        };

        match result {
            Ok((companies, dropped, version, source)) => {
                info!("store v{version}: {companies} companies, {dropped} rows dropped");
                let message = format!(
                    "Loaded {companies} company libraries from {source} ({dropped} invalid rows skipped)"
                );
                self.client.log_message(MessageType::INFO, message).await;
            }
            Err(e) => {
                error!("failed to load company libraries: {e}");
                self.client
                    .show_message(
                        MessageType::ERROR,
                        format!("Company libraries not reloaded: {e}"),
                    )
                    .await;
            }
        }
    }

    async fn watch_store(&self, path: Option<&Path>) {
        if let Err(e) = self
            .client
            .unregister_capability(vec![Unregistration {
                id: STORE_WATCHER_ID.to_string(),
                method: "workspace/didChangeWatchedFiles".to_string(),
            }])
            .await
        {
            debug!("no previous store watcher: {e}");
        }

        let Some(path) = path else {
            return;
        };
        let options = DidChangeWatchedFilesRegistrationOptions {
            watchers: vec![FileSystemWatcher {
                glob_pattern: GlobPattern::String(path.display().to_string()),
                kind: Some(WatchKind::all()),
            }],
        };
        let register_options = match serde_json::to_value(options) {
            Ok(v) => v,
            Err(e) => {
                warn!("Failed to encode store watcher: {e}");
                return;
            }
        };
        let registrations = vec![Registration {
            id: STORE_WATCHER_ID.to_string(),
            method: "workspace/didChangeWatchedFiles".to_string(),
            register_options: Some(register_options),
        }];
        if let Err(e) = self.client.register_capability(registrations).await {
            warn!("Failed to register store watcher: {e}");
        }
    }

    async fn is_store_file(&self, uri: &Url) -> bool {
        let Ok(changed) = uri.to_file_path() else {
            return false;
        };
        let settings = self.settings.read().await;
        settings
            .store_path
            .as_deref()
            .is_some_and(|store| same_file(store, &changed))
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    let canonical = |p: &Path| p.canonicalize().unwrap_or_else(|_| PathBuf::from(p));
    a == b || canonical(a) == canonical(b)
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        let settings = Settings::from_value(params.initialization_options.as_ref())
            .unwrap_or_default()
            .with_env_fallback();
        debug!("initial settings: {settings:?}");
        *self.settings.write().await = settings;

        Ok(InitializeResult {
            server_info: Some(ServerInfo {
                name: "dt-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            offset_encoding: None,
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::FULL),
                        ..Default::default()
                    },
                )),
                completion_provider: Some(CompletionOptions {
                    resolve_provider: Some(false),
                    trigger_characters: Some(
                        context::TRIGGER_CHARACTERS
                            .iter()
                            .map(|c| c.to_string())
                            .collect(),
                    ),
                    work_done_progress_options: Default::default(),
                    all_commit_characters: None,
                    completion_item: None,
                }),
                signature_help_provider: Some(SignatureHelpOptions {
                    trigger_characters: Some(vec![",".to_string()]),
                    retrigger_characters: Some(vec![" ".to_string()]),
                    work_done_progress_options: Default::default(),
                }),
                execute_command_provider: Some(ExecuteCommandOptions {
                    commands: vec![RELOAD_COMMAND.to_string()],
                    work_done_progress_options: Default::default(),
                }),
                ..ServerCapabilities::default()
            },
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        debug!("initialized!");
        let path = self.settings.read().await.store_path.clone();
        self.watch_store(path.as_deref()).await;
        self.reload_store().await;
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        self.on_change(TextDocumentItem {
            uri: params.text_document.uri,
            text: params.text_document.text,
        });
        debug!("file opened!");
    }

    async fn did_change(&self, mut params: DidChangeTextDocumentParams) {
        // Full sync: the last change carries the whole document.
        let Some(change) = params.content_changes.pop() else {
            return;
        };
        self.on_change(TextDocumentItem {
            uri: params.text_document.uri,
            text: change.text,
        });
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        self.document_map.remove(&params.text_document.uri.to_string());
        debug!("file closed!");
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri.to_string();
        let position = params.text_document_position.position;
        let trigger = params
            .context
            .as_ref()
            .and_then(|c| c.trigger_character.as_deref());
        debug!("completion requested for {uri} at {position:?} (trigger {trigger:?})");

        let index = self.store.read().await.snapshot();
        let items = self
            .document_map
            .get(&uri)
            .and_then(|doc| completions::get_completions(&doc, position, trigger, &index));

        Ok(items.map(CompletionResponse::Array))
    }

    async fn signature_help(&self, params: SignatureHelpParams) -> Result<Option<SignatureHelp>> {
        let uri = params.text_document_position_params.text_document.uri.to_string();
        let position = params.text_document_position_params.position;

        let index = self.store.read().await.snapshot();
        let help = self.document_map.get(&uri).and_then(|doc| {
            let line = doc.rope.get_line(position.line as usize)?.to_string();
            let prefix = context::line_prefix(&line, position.character as usize);
            signature::signature_help(prefix, &index)
        });

        Ok(help)
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        let settings = {
            let mut current = self.settings.write().await;
            let Some(settings) = current.updated(&params.settings) else {
                debug!("configuration change does not affect the store");
                return;
            };
            *current = settings.clone();
            settings
        };
        info!("store path changed to {:?}", settings.store_path);
        self.watch_store(settings.store_path.as_deref()).await;
        self.reload_store().await;
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        for change in &params.changes {
            if self.is_store_file(&change.uri).await {
                debug!("store file {:?}: {}", change.typ, change.uri);
                self.reload_store().await;
                return;
            }
        }
    }

    async fn execute_command(&self, params: ExecuteCommandParams) -> Result<Option<Value>> {
        if params.command != RELOAD_COMMAND {
            return Err(Error::invalid_params(format!(
                "unknown command `{}`",
                params.command
            )));
        }

        self.reload_store().await;
        let store = self.store.read().await;
        Ok(Some(json!({
            "version": store.version(),
            "companies": store.entries().len(),
        })))
    }
}
