//! Remote fetchers: GitHub shallow clones and single-resource HTTP(S) downloads.
//!
//! Both produce in-memory [`UnpackedEntry`](crate::contract::UnpackedEntry)
//! values; nothing fetched outlives the call.

pub mod github;
pub mod http;

pub use github::{clone_and_walk, is_github_repo_root_url, parse_github_spec, GithubSpec};
pub use http::{filename_from_content_disposition, HttpFetcher};
