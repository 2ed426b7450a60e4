#![doc = "attachments-core: turn files, directories, archives and remote sources into LLM-ready artifacts."]

//! All business logic for attachments lives here; the `attachments` crate is
//! command-line glue only.
//!
//! # Usage
//! ```no_run
//! use attachments_core::{att, CallOptions};
//!
//! # async fn demo() {
//! let artifacts = att("docs/[rows: 50]", &CallOptions::new()).await;
//! for artifact in &artifacts {
//!     println!("{}: {} chars", artifact.flags["source"], artifact.text.len());
//! }
//! # }
//! ```
//!
//! For isolated registries (tests, multi-tenant use) build an
//! [`Attachments`] context instead of using the [`global`] one.

pub mod archive;
pub mod artifact;
pub mod config;
pub mod contract;
pub mod download;
pub mod dsl;
pub mod error;
pub mod options;
pub mod pipeline;
pub mod processor;
pub mod sanitize;
pub mod service;
pub mod unpack;
pub mod walk;

pub use artifact::{Artifact, Flags, ImageRecord};
pub use config::{Config, ConfigPatch, PreferMode};
pub use contract::{
    handler_fn, processor_fn, Capability, Processor, RemoteService, UnpackHandler, UnpackedEntry,
};
pub use dsl::{format_dsl, parse_dsl};
pub use error::{ConfigError, ProcessError, ServiceError, UnpackError};
pub use options::ProcessOptions;
pub use pipeline::{
    att, configure, global, register_processor, register_unpack_handler, unpack, Attachments,
    CallOptions,
};
pub use processor::{capabilities, ProcessorRegistry};
pub use service::HttpService;
pub use unpack::UnpackRegistry;

#[cfg(any(test, feature = "test-export-mocks"))]
pub use contract::{MockRemoteService, MockUnpackHandler};
