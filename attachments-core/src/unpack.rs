//! # unpack: resolve an input string into a flat list of entries
//!
//! Resolution is two steps. [`classify`] maps the input onto exactly one
//! [`InputKind`], trying, in order: registered custom prefixes (registration
//! order, call-time overrides replacing colliding prefixes), GitHub repository
//! roots, other HTTP(S) URLs, existing directories, existing files. Then
//! [`resolve`] handles each kind exhaustively.
//!
//! Custom prefixes live in an [`UnpackRegistry`]; the orchestrator owns one
//! per [`Attachments`](crate::pipeline::Attachments) context.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;
use tracing::{debug, info};

use crate::archive::explode;
use crate::config::Config;
use crate::contract::{UnpackHandler, UnpackedEntry};
use crate::download::{clone_and_walk, is_github_repo_root_url, parse_github_spec, HttpFetcher};
use crate::error::UnpackError;
use crate::sanitize::is_raw_archive_name;
use crate::walk::walk_directory;

/// Ordered `(prefix, handler)` pairs.
pub type HandlerList = Vec<(String, Arc<dyn UnpackHandler>)>;

/// Prefix-keyed registry of custom unpack handlers.
///
/// Iteration follows registration order; re-registering a prefix replaces
/// the handler in place. Reads may run concurrently; writes are expected
/// during setup only.
pub struct UnpackRegistry {
    handlers: RwLock<HandlerList>,
    builtins: HandlerList,
}

impl Default for UnpackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for UnpackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnpackRegistry")
            .field("prefixes", &self.prefixes())
            .finish()
    }
}

fn upsert(list: &mut HandlerList, prefix: &str, handler: Arc<dyn UnpackHandler>) {
    match list.iter_mut().find(|(p, _)| p == prefix) {
        Some(slot) => slot.1 = handler,
        None => list.push((prefix.to_string(), handler)),
    }
}

impl UnpackRegistry {
    pub fn new() -> Self {
        Self::with_builtins(Vec::new())
    }

    /// A registry whose [`reset`](Self::reset) state is `builtins`.
    pub fn with_builtins(builtins: HandlerList) -> Self {
        Self {
            handlers: RwLock::new(builtins.clone()),
            builtins,
        }
    }

    pub fn register(&self, prefix: &str, handler: Arc<dyn UnpackHandler>) {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        upsert(&mut handlers, prefix, handler);
        debug!(prefix = prefix, "Registered unpack handler");
    }

    /// Register one handler for several prefixes.
    pub fn register_many(&self, prefixes: &[&str], handler: Arc<dyn UnpackHandler>) {
        for prefix in prefixes {
            self.register(prefix, handler.clone());
        }
    }

    pub fn unregister(&self, prefix: &str) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let before = handlers.len();
        handlers.retain(|(p, _)| p != prefix);
        handlers.len() != before
    }

    /// Drop every custom registration, restoring the construction-time set.
    pub fn reset(&self) {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        *handlers = self.builtins.clone();
    }

    pub fn snapshot(&self) -> HandlerList {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn prefixes(&self) -> Vec<String> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(p, _)| p.clone())
            .collect()
    }

    /// Registered handlers with `overrides` applied: colliding prefixes are
    /// replaced in place, new ones appended.
    pub fn merged_with(&self, overrides: &[(String, Arc<dyn UnpackHandler>)]) -> HandlerList {
        let mut merged = self.snapshot();
        for (prefix, handler) in overrides {
            upsert(&mut merged, prefix, handler.clone());
        }
        merged
    }
}

/// The single classification of an input string.
#[derive(Clone)]
pub enum InputKind {
    Custom {
        prefix: String,
        handler: Arc<dyn UnpackHandler>,
    },
    Github,
    Http,
    Directory(PathBuf),
    File(PathBuf),
    Unsupported,
}

impl fmt::Debug for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputKind::Custom { prefix, .. } => f.debug_tuple("Custom").field(prefix).finish(),
            InputKind::Github => f.write_str("Github"),
            InputKind::Http => f.write_str("Http"),
            InputKind::Directory(p) => f.debug_tuple("Directory").field(p).finish(),
            InputKind::File(p) => f.debug_tuple("File").field(p).finish(),
            InputKind::Unsupported => f.write_str("Unsupported"),
        }
    }
}

impl InputKind {
    pub fn label(&self) -> &'static str {
        match self {
            InputKind::Custom { .. } => "custom",
            InputKind::Github => "github",
            InputKind::Http => "http",
            InputKind::Directory(_) => "directory",
            InputKind::File(_) => "file",
            InputKind::Unsupported => "unsupported",
        }
    }
}

/// Map `input` onto exactly one [`InputKind`]. Prefix checks precede any
/// filesystem lookup.
pub fn classify(input: &str, handlers: &[(String, Arc<dyn UnpackHandler>)]) -> InputKind {
    if let Some((prefix, handler)) = handlers.iter().find(|(p, _)| input.starts_with(p.as_str())) {
        return InputKind::Custom {
            prefix: prefix.clone(),
            handler: handler.clone(),
        };
    }
    if input.starts_with("github://") || is_github_repo_root_url(input) {
        return InputKind::Github;
    }
    if input.starts_with("http://") || input.starts_with("https://") {
        return InputKind::Http;
    }
    let path = Path::new(input);
    if path.is_dir() {
        return InputKind::Directory(path.to_path_buf());
    }
    if path.is_file() {
        return InputKind::File(path.to_path_buf());
    }
    InputKind::Unsupported
}

fn read_local_file(path: &Path) -> Result<Vec<UnpackedEntry>, UnpackError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "blob".to_string());
    let data = Bytes::from(fs::read(path)?);
    if is_raw_archive_name(&name) {
        explode(&name, data)
    } else {
        Ok(vec![UnpackedEntry::new(name, data)])
    }
}

async fn blocking<F>(f: F) -> Result<Vec<UnpackedEntry>, UnpackError>
where
    F: FnOnce() -> Result<Vec<UnpackedEntry>, UnpackError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| UnpackError::Task(e.to_string()))?
}

/// Resolve an already-classified input.
pub async fn resolve(
    input: &str,
    kind: InputKind,
    fetcher: &HttpFetcher,
) -> Result<Vec<UnpackedEntry>, UnpackError> {
    match kind {
        InputKind::Custom { prefix, handler } => {
            debug!(prefix = %prefix, "Delegating to custom unpack handler");
            handler.unpack(input).await
        }
        InputKind::Github => {
            let spec = parse_github_spec(input)?;
            blocking(move || clone_and_walk(&spec)).await
        }
        InputKind::Http => fetcher.fetch_entries(input).await,
        InputKind::Directory(path) => blocking(move || walk_directory(&path)).await,
        InputKind::File(path) => blocking(move || read_local_file(&path)).await,
        InputKind::Unsupported => Err(UnpackError::Unsupported {
            input: input.to_string(),
        }),
    }
}

/// Classify and resolve `input` against `registry` plus call-time `overrides`.
pub async fn unpack_input(
    registry: &UnpackRegistry,
    input: &str,
    overrides: &[(String, Arc<dyn UnpackHandler>)],
    config: &Config,
) -> Result<Vec<UnpackedEntry>, UnpackError> {
    let handlers = registry.merged_with(overrides);
    let kind = classify(input, &handlers);
    info!(input = input, kind = kind.label(), "Unpacking input");
    let entries = resolve(input, kind, &HttpFetcher::from_config(config)).await?;
    debug!(input = input, entries = entries.len(), "Unpacked input");
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::handler_fn;
    use std::fs;
    use tempfile::tempdir;

    fn tagged(tag: &'static str) -> Arc<dyn UnpackHandler> {
        handler_fn(move |_| Ok(vec![UnpackedEntry::new(tag, Bytes::new())]))
    }

    #[test]
    fn classification_is_a_total_order() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, "a").unwrap();
        let handlers: HandlerList = vec![("https://github.com/acme/".to_string(), tagged("x"))];

        assert!(matches!(
            classify("https://github.com/acme/repo", &handlers),
            InputKind::Custom { ref prefix, .. } if prefix == "https://github.com/acme/"
        ));
        assert!(matches!(classify("https://github.com/other/repo", &handlers), InputKind::Github));
        assert!(matches!(classify("github://o/r", &[]), InputKind::Github));
        assert!(matches!(
            classify("https://github.com/o/r/archive/main.zip", &[]),
            InputKind::Http
        ));
        assert!(matches!(classify("http://example.com/x", &[]), InputKind::Http));
        assert!(matches!(
            classify(dir.path().to_str().unwrap(), &[]),
            InputKind::Directory(_)
        ));
        assert!(matches!(classify(file.to_str().unwrap(), &[]), InputKind::File(_)));
        assert!(matches!(
            classify("/definitely/not/here.txt", &[]),
            InputKind::Unsupported
        ));
    }

    #[test]
    fn overrides_replace_in_place_and_append() {
        let registry = UnpackRegistry::new();
        registry.register("a://", tagged("a"));
        registry.register("b://", tagged("b"));
        registry.register("a://", tagged("a2"));
        assert_eq!(registry.prefixes(), vec!["a://", "b://"]);

        let merged = registry.merged_with(&[
            ("b://".to_string(), tagged("b-override")),
            ("c://".to_string(), tagged("c")),
        ]);
        let prefixes: Vec<&str> = merged.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(prefixes, vec!["a://", "b://", "c://"]);
        // Registry itself is untouched by overrides.
        assert_eq!(registry.prefixes(), vec!["a://", "b://"]);
    }

    #[test]
    fn reset_restores_builtins_only() {
        let registry = UnpackRegistry::with_builtins(vec![("s3://".to_string(), tagged("s3"))]);
        registry.register_many(&["dropbox://", "dbx://"], tagged("dropbox"));
        assert!(registry.unregister("dbx://"));
        assert!(!registry.unregister("dbx://"));
        assert_eq!(registry.prefixes(), vec!["s3://", "dropbox://"]);

        registry.reset();
        assert_eq!(registry.prefixes(), vec!["s3://"]);
    }

    #[tokio::test]
    async fn unsupported_input_reports_the_input() {
        let registry = UnpackRegistry::new();
        let err = unpack_input(&registry, "nope://thing", &[], &Config::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Unsupported or non-existent input: nope://thing");
    }
}
