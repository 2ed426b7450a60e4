//! Processor registry and router.
//!
//! Keys are lower-case extensions with a leading dot (`.xlsx`) or sentinel
//! keys wrapped in double underscores (`__text__`). Routing tries the file's
//! extension first, then falls back to [`TEXT_KEY`] when the bytes look like
//! text.

pub mod pdf;
pub mod text;
pub mod xlsx;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::contract::Processor;

pub use pdf::PdfProcessor;
pub use text::{guess_decode, is_text_bytes, TextProcessor, TEXT_EXTENSIONS};
pub use xlsx::XlsxProcessor;

/// Catch-all key for content that passes the text heuristic.
pub const TEXT_KEY: &str = "__text__";

pub type ProcessorMap = HashMap<String, Arc<dyn Processor>>;

/// Normalise a registration key: sentinels pass through, extensions gain a
/// leading dot and are lower-cased.
pub fn normalize_key(key: &str) -> String {
    let key = key.trim();
    if key.starts_with("__") {
        return key.to_string();
    }
    let key = if key.starts_with('.') {
        key.to_string()
    } else {
        format!(".{key}")
    };
    key.to_lowercase()
}

/// The processors every registry starts with.
pub fn builtin_processors() -> ProcessorMap {
    let mut map = ProcessorMap::new();
    let text: Arc<dyn Processor> = Arc::new(TextProcessor);
    map.insert(TEXT_KEY.to_string(), text.clone());
    for ext in TEXT_EXTENSIONS {
        map.insert(ext.to_string(), text.clone());
    }
    map.insert(".xlsx".to_string(), Arc::new(XlsxProcessor));
    map.insert(".pdf".to_string(), Arc::new(PdfProcessor));
    map
}

/// Availability of each optional capability in this build.
pub fn capabilities() -> BTreeMap<String, bool> {
    BTreeMap::from([
        ("text".to_string(), true),
        ("xlsx".to_string(), cfg!(feature = "xlsx")),
        ("pdf".to_string(), cfg!(feature = "pdf")),
        ("service".to_string(), true),
    ])
}

/// Extension-keyed processor registry with a frozen built-in set.
pub struct ProcessorRegistry {
    processors: RwLock<ProcessorMap>,
    builtins: ProcessorMap,
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}

impl ProcessorRegistry {
    /// A registry holding [`builtin_processors`].
    pub fn new() -> Self {
        Self::with_builtins(builtin_processors())
    }

    pub fn with_builtins(builtins: ProcessorMap) -> Self {
        let builtins: ProcessorMap = builtins
            .into_iter()
            .map(|(k, v)| (normalize_key(&k), v))
            .collect();
        Self {
            processors: RwLock::new(builtins.clone()),
            builtins,
        }
    }

    pub fn register(&self, key: &str, processor: Arc<dyn Processor>) {
        let key = normalize_key(key);
        debug!(key = %key, "Registered processor");
        self.processors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, processor);
    }

    pub fn unregister(&self, key: &str) -> bool {
        self.processors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&normalize_key(key))
            .is_some()
    }

    /// Restore exactly the construction-time set.
    pub fn reset(&self) {
        *self
            .processors
            .write()
            .unwrap_or_else(PoisonError::into_inner) = self.builtins.clone();
    }

    pub fn snapshot(&self) -> ProcessorMap {
        self.processors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn Processor>> {
        self.processors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&normalize_key(key))
            .cloned()
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .processors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Pick the processor for `filename`: by extension, then the text catch-all.
    pub fn route(&self, filename: &str, data: &[u8]) -> Option<Arc<dyn Processor>> {
        let processors = self.processors.read().unwrap_or_else(PoisonError::into_inner);
        let ext = Path::new(filename)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()));
        if let Some(processor) = ext.as_deref().and_then(|e| processors.get(e)) {
            return Some(processor.clone());
        }
        if is_text_bytes(data) {
            return processors.get(TEXT_KEY).cloned();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::Artifact;
    use crate::contract::processor_fn;

    #[test]
    fn keys_are_normalised() {
        assert_eq!(normalize_key("PDF"), ".pdf");
        assert_eq!(normalize_key(" .Md "), ".md");
        assert_eq!(normalize_key("__text__"), "__text__");
    }

    #[test]
    fn routing_by_extension_then_heuristic() {
        let registry = ProcessorRegistry::new();
        assert!(registry.route("Notes.TXT", b"x").is_some());
        // Unknown extension with text content goes to the catch-all.
        assert!(registry.route("Makefile", b"all:\n\tcargo build\n").is_some());
        // Unknown extension with binary content has no processor.
        assert!(registry.route("blob.bin", b"\x00\x01\x02").is_none());
    }

    #[test]
    fn reset_restores_exactly_the_builtins() {
        let registry = ProcessorRegistry::new();
        let before = registry.keys();
        let frozen = registry.snapshot();

        registry.register("foo", processor_fn(|_, _, _| Ok(Artifact::with_text("foo"))));
        assert!(registry.unregister(".md"));
        assert!(registry.get(".foo").is_some());
        assert!(registry.get(".md").is_none());

        assert!(!frozen.contains_key(".foo"));
        registry.reset();
        assert_eq!(registry.keys(), before);
        assert!(registry.get(".foo").is_none());
    }
}
