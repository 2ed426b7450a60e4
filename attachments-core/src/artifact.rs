use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Free-form metadata attached to an artifact.
pub type Flags = serde_json::Map<String, Value>;

/// Normalised processing result for one file.
///
/// All content fields are always present; missing fields in a deserialised
/// (remote) artifact take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Artifact {
    pub text: String,
    pub images: Vec<ImageRecord>,
    /// Reserved; always empty for now.
    pub audio: Vec<Value>,
    /// Reserved; always empty for now.
    pub video: Vec<Value>,
    pub flags: Flags,
}

/// A rendered page image. Serialised with its payload base64-encoded under `bytes_b64`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageRecord {
    pub name: String,
    pub mimetype: String,
    #[serde(rename = "bytes_b64", with = "base64_bytes")]
    pub bytes: Vec<u8>,
    pub page: u32,
}

impl Artifact {
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Artifact describing a failure for `source`.
    pub fn error(source: &str, error: impl Into<String>) -> Self {
        let error: String = error.into();
        Self::default().flag("source", source).flag("error", error)
    }

    /// Artifact with no content and an explanatory note (not a failure).
    pub fn empty(source: &str, note: impl Into<String>) -> Self {
        let note: String = note.into();
        Self::default().flag("source", source).flag("note", note)
    }

    pub fn flag(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.flags.insert(key.to_string(), value.into());
        self
    }

    /// The `flags.error` message, if any non-empty one is set.
    pub fn error_message(&self) -> Option<&str> {
        match self.flags.get("error") {
            Some(Value::String(s)) if !s.is_empty() => Some(s.as_str()),
            Some(Value::Null) | Some(Value::Bool(false)) | None => None,
            Some(Value::String(_)) => None,
            Some(_) => Some("error"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
            && self.images.is_empty()
            && self.audio.is_empty()
            && self.video.is_empty()
    }

    /// Fill in `flags.source` when the processor did not set it.
    pub fn normalize(mut self, source: &str) -> Self {
        self.flags
            .entry("source")
            .or_insert_with(|| Value::String(source.to_string()));
        self
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
