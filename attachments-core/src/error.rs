use std::io;

/// Failures while resolving an input into unpacked entries.
///
/// Any of these aborts the unpack of one top-level input as a whole; the
/// orchestrator turns it into a single error artifact for that input.
#[derive(Debug, thiserror::Error)]
pub enum UnpackError {
    #[error("Unsupported or non-existent input: {input}")]
    Unsupported { input: String },

    #[error("archive '{name}' is corrupted: {reason}")]
    ArchiveCorrupt { name: String, reason: String },

    #[error("Remote file exceeds max size ({limit_mb} MB): {url}")]
    SizeLimitExceeded { url: String, limit_mb: u64 },

    #[error("Invalid GitHub spec: {0}")]
    InvalidGithubSpec(String),

    #[error("git clone failed: {0}")]
    Clone(String),

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("unpack handler for '{prefix}' failed: {reason}")]
    Handler { prefix: String, reason: String },

    #[error("background task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl UnpackError {
    pub(crate) fn corrupt(name: &str, reason: impl ToString) -> Self {
        UnpackError::ArchiveCorrupt {
            name: if name.is_empty() {
                "blob".to_string()
            } else {
                name.to_string()
            },
            reason: reason.to_string(),
        }
    }

    pub(crate) fn from_reqwest(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            UnpackError::Timeout {
                url: url.to_string(),
            }
        } else {
            UnpackError::Http {
                url: url.to_string(),
                source,
            }
        }
    }
}

/// Failures talking to the remote processing service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("No API key configured. Set via configure(api_key=...) or ATTACHMENTS_API_KEY env var")]
    MissingApiKey,

    #[error("Service request timed out after {0}s")]
    Timeout(u64),

    #[error("Service request failed: {0}")]
    Request(String),

    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("Service response could not be decoded: {0}")]
    Decode(String),
}

impl ServiceError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ServiceError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Outcome of a local processor that did not produce an artifact.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessError {
    /// The processor exists but the capability it needs was not compiled in
    /// or is otherwise unavailable. Recoverable through the remote service.
    #[error("{feature} processing requires {hint}")]
    MissingCapability { feature: String, hint: String },

    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid prefer value: {0}. Valid: local, service, local-only, service-only")]
    InvalidPrefer(String),
}
