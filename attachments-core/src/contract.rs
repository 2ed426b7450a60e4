//! # contract: pluggable seams of the pipeline
//!
//! This module defines the data passed between stages and the three traits
//! the pipeline is extended through:
//!
//! - [`UnpackHandler`]: resolves inputs carrying a custom prefix (e.g. `s3://`)
//!   into [`UnpackedEntry`] values. Registered in an
//!   [`UnpackRegistry`](crate::unpack::UnpackRegistry).
//! - [`Processor`]: decodes one file's bytes into an [`Artifact`]. Registered
//!   in a [`ProcessorRegistry`](crate::processor::ProcessorRegistry).
//! - [`RemoteService`]: the optional remote processing service used as a
//!   fallback when local capability is missing.
//!
//! ## Mocking & Testing
//! - `UnpackHandler` and `RemoteService` are annotated for `mockall`
//!   (`MockUnpackHandler`, `MockRemoteService`), exported under the
//!   `test-export-mocks` feature so integration tests can script them.
//! - Closures can stand in for handlers and processors through
//!   [`handler_fn`] and [`processor_fn`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::artifact::Artifact;
use crate::error::{ProcessError, ServiceError, UnpackError};
use crate::options::ProcessOptions;

/// One logical file produced by unpacking: a forward-slash virtual path and its bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct UnpackedEntry {
    pub name: String,
    pub content: Bytes,
}

impl UnpackedEntry {
    pub fn new(name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

impl fmt::Debug for UnpackedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnpackedEntry")
            .field("name", &self.name)
            .field("len", &self.content.len())
            .finish()
    }
}

/// Resolver for inputs starting with a registered prefix.
///
/// Receives the complete original input string, prefix included.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait UnpackHandler: Send + Sync {
    async fn unpack(&self, input: &str) -> Result<Vec<UnpackedEntry>, UnpackError>;
}

/// Whether a processor can run in this build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    Available,
    Missing { feature: String, hint: String },
}

impl Capability {
    pub fn is_available(&self) -> bool {
        matches!(self, Capability::Available)
    }
}

/// Decoder from raw bytes to an [`Artifact`].
///
/// Recoverable conditions are returned as `Err(ProcessError)` or as an
/// artifact carrying `flags.error`; panics are caught by the orchestrator and
/// reported against the originating file.
pub trait Processor: Send + Sync {
    /// Checked before [`Processor::process`] is called.
    fn capability(&self) -> Capability {
        Capability::Available
    }

    fn process(
        &self,
        data: &[u8],
        filename: &str,
        options: &ProcessOptions,
    ) -> Result<Artifact, ProcessError>;
}

/// Client of the remote processing service.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// `POST /process`: process one file remotely.
    async fn process(
        &self,
        data: Bytes,
        filename: &str,
        options: &ProcessOptions,
    ) -> Result<Artifact, ServiceError>;

    /// `POST /unpack`: let the service resolve an input it can reach.
    async fn unpack(
        &self,
        input: &str,
        options: &ProcessOptions,
    ) -> Result<Vec<UnpackedEntry>, ServiceError>;

    /// `GET /health`: status and feature map. Never fails; transport errors
    /// are reported as `{"status": "error", "error": ...}`.
    async fn health(&self) -> serde_json::Value;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F> UnpackHandler for FnHandler<F>
where
    F: Fn(&str) -> Result<Vec<UnpackedEntry>, UnpackError> + Send + Sync,
{
    async fn unpack(&self, input: &str) -> Result<Vec<UnpackedEntry>, UnpackError> {
        (self.0)(input)
    }
}

/// Wrap a synchronous closure as an [`UnpackHandler`].
pub fn handler_fn<F>(f: F) -> Arc<dyn UnpackHandler>
where
    F: Fn(&str) -> Result<Vec<UnpackedEntry>, UnpackError> + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

struct FnProcessor<F>(F);

impl<F> Processor for FnProcessor<F>
where
    F: Fn(&[u8], &str, &ProcessOptions) -> Result<Artifact, ProcessError> + Send + Sync,
{
    fn process(
        &self,
        data: &[u8],
        filename: &str,
        options: &ProcessOptions,
    ) -> Result<Artifact, ProcessError> {
        (self.0)(data, filename, options)
    }
}

/// Wrap a closure as a [`Processor`].
pub fn processor_fn<F>(f: F) -> Arc<dyn Processor>
where
    F: Fn(&[u8], &str, &ProcessOptions) -> Result<Artifact, ProcessError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnProcessor(f))
}
