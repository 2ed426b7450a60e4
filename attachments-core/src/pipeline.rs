//! High-level pipeline: input string → unpack → route → process → artifacts.
//!
//! [`Attachments`] is the context object owning both registries and the
//! process-wide configuration layer. [`Attachments::att`] is the main
//! entrypoint; it never fails. Every problem ends up as data in an artifact's
//! `flags.error` or `flags.note`.
//!
//! # Flow
//! 1. Split the inline `[key: value]` suffix off the input and overlay call options.
//! 2. Move a `ref` option into GitHub inputs as `?ref=`.
//! 3. Resolve [`Config`] (call patch > process-wide patch > environment > defaults).
//! 4. Unpack. On failure, retry through the remote service when a key is
//!    configured and the mode allows it; otherwise return one error artifact
//!    for the whole input.
//! 5. Process every entry with at most `concurrency` in flight, keeping the
//!    unpack order, then fill in `flags.source`.
//!
//! # Per-file policy
//! See [`PreferMode`]. Local processors run on the blocking pool; a panic is
//! caught and treated like any other unexpected local failure.
//!
//! # Testing
//! A remote service can be injected with [`Attachments::with_remote`], e.g. a
//! `MockRemoteService`. Without one, an [`HttpService`] is built from the
//! resolved configuration on each call.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use tracing::{debug, info, warn};

use crate::artifact::Artifact;
use crate::config::{Config, ConfigPatch, PreferMode};
use crate::contract::{Capability, Processor, RemoteService, UnpackHandler, UnpackedEntry};
use crate::download::is_github_repo_root_url;
use crate::dsl::parse_dsl;
use crate::error::{ProcessError, ServiceError, UnpackError};
use crate::options::ProcessOptions;
use crate::processor::ProcessorRegistry;
use crate::service::HttpService;
use crate::unpack::{unpack_input, HandlerList, UnpackRegistry};

/// Per-call settings for [`Attachments::att`].
#[derive(Clone, Default)]
pub struct CallOptions {
    /// Highest-priority configuration layer.
    pub config: ConfigPatch,
    /// Processor options; override any parsed from the inline suffix.
    pub options: ProcessOptions,
    /// One-off unpack handlers layered over the registry.
    pub handlers: HandlerList,
}

impl fmt::Debug for CallOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefixes: Vec<&str> = self.handlers.iter().map(|(p, _)| p.as_str()).collect();
        f.debug_struct("CallOptions")
            .field("config", &self.config)
            .field("options", &self.options)
            .field("handlers", &prefixes)
            .finish()
    }
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: ConfigPatch) -> Self {
        self.config = config;
        self
    }

    pub fn with_option(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.options.insert(key, value);
        self
    }

    pub fn with_handler(mut self, prefix: &str, handler: Arc<dyn UnpackHandler>) -> Self {
        self.handlers.push((prefix.to_string(), handler));
        self
    }
}

/// Registries, process-wide configuration and an optional injected remote service.
pub struct Attachments {
    processors: ProcessorRegistry,
    unpackers: UnpackRegistry,
    config: RwLock<ConfigPatch>,
    remote: Option<Arc<dyn RemoteService>>,
}

impl Default for Attachments {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Attachments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachments")
            .field("processors", &self.processors)
            .field("unpackers", &self.unpackers)
            .field("remote_injected", &self.remote.is_some())
            .finish()
    }
}

/// What happened when a local processor was run.
enum LocalOutcome {
    Done(Artifact),
    Missing(String),
    Failed(String),
    Panicked(String),
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "processor panicked".to_string()
    }
}

/// Move a `ref` option into a GitHub input as a query parameter.
///
/// Other inputs are returned unchanged and keep their `ref` option.
pub fn apply_source_options(input: &str, options: &mut ProcessOptions) -> String {
    if !(input.starts_with("github://") || is_github_repo_root_url(input)) {
        return input.to_string();
    }
    let reference = match options.remove("ref") {
        Some(serde_json::Value::String(s)) => s,
        Some(serde_json::Value::Null) | None => return input.to_string(),
        Some(other) => other.to_string(),
    };
    if reference.is_empty() {
        return input.to_string();
    }
    let separator = if input.contains('?') { '&' } else { '?' };
    format!("{input}{separator}ref={reference}")
}

impl Attachments {
    /// A context with built-in processors and no custom unpack handlers.
    pub fn new() -> Self {
        Self {
            processors: ProcessorRegistry::new(),
            unpackers: UnpackRegistry::new(),
            config: RwLock::new(ConfigPatch::default()),
            remote: None,
        }
    }

    /// Use `remote` instead of an HTTP client built from configuration.
    pub fn with_remote(mut self, remote: Arc<dyn RemoteService>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn processors(&self) -> &ProcessorRegistry {
        &self.processors
    }

    pub fn unpackers(&self) -> &UnpackRegistry {
        &self.unpackers
    }

    pub fn register_processor(&self, key: &str, processor: Arc<dyn Processor>) {
        self.processors.register(key, processor);
    }

    pub fn register_unpack_handler(&self, prefix: &str, handler: Arc<dyn UnpackHandler>) {
        self.unpackers.register(prefix, handler);
    }

    /// Overlay `patch` on the process-wide configuration layer.
    pub fn configure(&self, patch: ConfigPatch) {
        let mut current = self.config.write().unwrap_or_else(PoisonError::into_inner);
        *current = patch.or(current.clone());
    }

    pub fn reset_config(&self) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = ConfigPatch::default();
    }

    /// Restore both registries and the configuration layer to their initial state.
    pub fn reset(&self) {
        self.processors.reset();
        self.unpackers.reset();
        self.reset_config();
    }

    /// Resolve the effective configuration for a call.
    pub fn resolve_config(&self, call: &ConfigPatch) -> Config {
        let process_wide = self
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Config::resolve(call, &process_wide)
    }

    fn remote_for(&self, config: &Config) -> Arc<dyn RemoteService> {
        match &self.remote {
            Some(remote) => remote.clone(),
            None => Arc::new(HttpService::from_config(config)),
        }
    }

    /// Resolve `input` into entries using this context's handlers plus `overrides`.
    pub async fn unpack(
        &self,
        input: &str,
        overrides: &[(String, Arc<dyn UnpackHandler>)],
    ) -> Result<Vec<UnpackedEntry>, UnpackError> {
        let config = self.resolve_config(&ConfigPatch::default());
        unpack_input(&self.unpackers, input, overrides, &config).await
    }

    /// Remote service health; never fails.
    pub async fn health(&self, call: &ConfigPatch) -> serde_json::Value {
        let config = self.resolve_config(call);
        self.remote_for(&config).health().await
    }

    /// Turn any input into artifacts: one per unpacked file, or a single error
    /// artifact when the input cannot be unpacked. An empty directory yields none.
    pub async fn att(&self, input: &str, call: &CallOptions) -> Vec<Artifact> {
        let (path, parsed) = parse_dsl(input);
        let mut options = parsed.merged_with(&call.options);
        let input = apply_source_options(&path, &mut options);

        let config = self.resolve_config(&call.config);
        config.trace_loaded();
        let remote = self.remote_for(&config);

        let entries =
            match unpack_input(&self.unpackers, &input, &call.handlers, &config).await {
                Ok(entries) => entries,
                Err(e) => match self.unpack_fallback(&input, e, &options, &config, remote.as_ref()).await {
                    Ok(entries) => entries,
                    Err(artifact) => return vec![artifact],
                },
            };

        info!(input = %input, files = entries.len(), concurrency = config.concurrency, "Processing unpacked files");
        let config = &config;
        let options = &options;
        let remote = remote.as_ref();
        stream::iter(entries)
            .map(|entry| async move {
                self.process_single(&entry.name, entry.content, options, config, remote)
                    .await
            })
            .buffered(config.concurrency)
            .collect()
            .await
    }

    async fn unpack_fallback(
        &self,
        input: &str,
        error: UnpackError,
        options: &ProcessOptions,
        config: &Config,
        remote: &dyn RemoteService,
    ) -> Result<Vec<UnpackedEntry>, Artifact> {
        warn!(input = input, error = %error, "Unpack failed");
        if !config.has_api_key() || config.prefer == PreferMode::LocalOnly {
            return Err(Artifact::error(input, format!("unpack failed: {error}")));
        }
        match remote.unpack(input, options).await {
            Ok(entries) => {
                info!(input = input, files = entries.len(), "Unpacked via service");
                Ok(entries)
            }
            Err(se) => Err(Artifact::error(
                input,
                format!("unpack failed: {error}; service: {se}"),
            )),
        }
    }

    async fn run_local(
        processor: Arc<dyn Processor>,
        filename: &str,
        data: Bytes,
        options: &ProcessOptions,
    ) -> LocalOutcome {
        if let Capability::Missing { feature, hint } = processor.capability() {
            return LocalOutcome::Missing(
                ProcessError::MissingCapability { feature, hint }.to_string(),
            );
        }
        let name = filename.to_string();
        let options = options.clone();
        let joined =
            tokio::task::spawn_blocking(move || processor.process(&data, &name, &options)).await;
        match joined {
            Ok(Ok(artifact)) => LocalOutcome::Done(artifact),
            Ok(Err(e @ ProcessError::MissingCapability { .. })) => {
                LocalOutcome::Missing(e.to_string())
            }
            Ok(Err(ProcessError::Failed(message))) => LocalOutcome::Failed(message),
            Err(e) if e.is_panic() => LocalOutcome::Panicked(panic_message(e.into_panic())),
            Err(e) => LocalOutcome::Panicked(e.to_string()),
        }
    }

    async fn via_service(
        remote: &dyn RemoteService,
        filename: &str,
        data: Bytes,
        options: &ProcessOptions,
    ) -> Result<Artifact, ServiceError> {
        let artifact = remote.process(data, filename, options).await?;
        Ok(artifact.flag("via", "service"))
    }

    /// Process one file under the configured [`PreferMode`]. Never fails.
    pub async fn process_single(
        &self,
        filename: &str,
        data: Bytes,
        options: &ProcessOptions,
        config: &Config,
        remote: &dyn RemoteService,
    ) -> Artifact {
        let processor = self.processors.route(filename, &data);
        let has_key = config.has_api_key();
        debug!(
            filename = filename,
            mode = %config.prefer,
            local = processor.is_some(),
            has_key,
            "Routing file"
        );

        let artifact = match config.prefer {
            PreferMode::ServiceOnly => {
                if !has_key {
                    Artifact::error(filename, "service-only mode but no API key configured")
                } else {
                    Self::via_service(remote, filename, data, options)
                        .await
                        .unwrap_or_else(|se| Artifact::error(filename, format!("service error: {se}")))
                }
            }

            PreferMode::LocalOnly => match processor {
                None => Artifact::empty(filename, "no local processor available"),
                Some(processor) => match Self::run_local(processor, filename, data, options).await {
                    LocalOutcome::Done(artifact) => artifact,
                    LocalOutcome::Missing(note) => Artifact::empty(filename, note),
                    LocalOutcome::Failed(m) | LocalOutcome::Panicked(m) => {
                        Artifact::error(filename, format!("local processing failed: {m}"))
                    }
                },
            },

            PreferMode::Service => {
                if has_key {
                    match Self::via_service(remote, filename, data.clone(), options).await {
                        Ok(artifact) if artifact.error_message().is_none() => return artifact.normalize(filename),
                        Ok(artifact) => {
                            debug!(filename = filename, error = ?artifact.error_message(), "Service artifact has error, falling back to local");
                        }
                        Err(se) => {
                            debug!(filename = filename, error = %se, "Service failed, falling back to local");
                        }
                    }
                }
                match processor {
                    None => Artifact::empty(filename, "no processor available"),
                    Some(processor) => match Self::run_local(processor, filename, data, options).await {
                        LocalOutcome::Done(artifact) => artifact,
                        LocalOutcome::Missing(note) => Artifact::empty(filename, note),
                        LocalOutcome::Failed(m) | LocalOutcome::Panicked(m) => {
                            Artifact::error(filename, format!("processing failed: {m}"))
                        }
                    },
                }
            }

            PreferMode::Local => match processor {
                Some(processor) => {
                    match Self::run_local(processor, filename, data.clone(), options).await {
                        LocalOutcome::Done(artifact) => artifact,
                        LocalOutcome::Failed(m) => Artifact::error(filename, m),
                        LocalOutcome::Missing(note) if has_key => {
                            info!(filename = filename, reason = %note, "Local capability missing, using service");
                            Self::via_service(remote, filename, data, options)
                                .await
                                .unwrap_or_else(|se| {
                                    Artifact::error(
                                        filename,
                                        format!("local processing unavailable: {note}; service error: {se}"),
                                    )
                                })
                        }
                        LocalOutcome::Missing(note) => Artifact::empty(filename, note),
                        LocalOutcome::Panicked(m) if has_key => {
                            warn!(filename = filename, panic = %m, "Local processor panicked, using service");
                            Self::via_service(remote, filename, data, options)
                                .await
                                .unwrap_or_else(|se| {
                                    Artifact::error(filename, format!("service processing failed: {se}"))
                                })
                        }
                        LocalOutcome::Panicked(m) => {
                            Artifact::error(filename, format!("local processing failed: {m}"))
                        }
                    }
                }
                None if has_key => Self::via_service(remote, filename, data, options)
                    .await
                    .unwrap_or_else(|se| {
                        Artifact::error(filename, format!("service processing failed: {se}"))
                    }),
                None => Artifact::empty(filename, "no processor available"),
            },
        };

        artifact.normalize(filename)
    }
}

static GLOBAL: Lazy<Attachments> = Lazy::new(Attachments::new);

/// The process-wide default context used by the free functions.
pub fn global() -> &'static Attachments {
    &GLOBAL
}

/// [`Attachments::att`] on the [`global`] context.
pub async fn att(input: &str, call: &CallOptions) -> Vec<Artifact> {
    global().att(input, call).await
}

/// [`Attachments::unpack`] on the [`global`] context.
pub async fn unpack(
    input: &str,
    overrides: &[(String, Arc<dyn UnpackHandler>)],
) -> Result<Vec<UnpackedEntry>, UnpackError> {
    global().unpack(input, overrides).await
}

pub fn register_processor(key: &str, processor: Arc<dyn Processor>) {
    global().register_processor(key, processor);
}

pub fn register_unpack_handler(prefix: &str, handler: Arc<dyn UnpackHandler>) {
    global().register_unpack_handler(prefix, handler);
}

pub fn configure(patch: ConfigPatch) {
    global().configure(patch);
}
