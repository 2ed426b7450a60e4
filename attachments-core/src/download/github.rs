use std::process::Command;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{error, info};
use url::Url;

use crate::contract::UnpackedEntry;
use crate::error::UnpackError;
use crate::walk::walk_directory;

const GITHUB_SCHEME: &str = "github://";
const GITHUB_HTTPS: &str = "https://github.com/";

static OWNER_REPO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9][-a-zA-Z0-9_.]*[a-zA-Z0-9]?/[a-zA-Z0-9][-a-zA-Z0-9_.]*[a-zA-Z0-9]?(\.git)?$",
    )
    .expect("valid regex")
});

/// Rejected even when the pattern above matches.
const FORBIDDEN: &[&str] = &["--", "..", ";", "|", "&", "$", "`", "\n", "\r"];

/// A validated repository root, optionally pinned to a branch or tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GithubSpec {
    pub owner: String,
    pub repo: String,
    pub reference: Option<String>,
}

impl GithubSpec {
    pub fn clone_url(&self) -> String {
        format!("https://github.com/{}/{}.git", self.owner, self.repo)
    }
}

/// True for `https://github.com/<owner>/<repo>[.git][?...]` with exactly two path segments.
pub fn is_github_repo_root_url(input: &str) -> bool {
    if !input.starts_with(GITHUB_HTTPS) {
        return false;
    }
    Url::parse(input)
        .map(|url| url.path().split('/').filter(|s| !s.is_empty()).count() == 2)
        .unwrap_or(false)
}

fn validate_owner_repo(owner_repo: &str) -> Result<(), UnpackError> {
    if !OWNER_REPO.is_match(owner_repo) {
        return Err(UnpackError::InvalidGithubSpec(format!(
            "Invalid GitHub owner/repo format: {owner_repo}"
        )));
    }
    if FORBIDDEN.iter().any(|pattern| owner_repo.contains(pattern)) {
        return Err(UnpackError::InvalidGithubSpec(format!(
            "Invalid characters in GitHub spec: {owner_repo}"
        )));
    }
    Ok(())
}

fn ref_from_query(query: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "ref")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

fn split_owner_repo(owner_repo: &str) -> Result<(String, String), UnpackError> {
    let (owner, repo) = owner_repo
        .split_once('/')
        .ok_or_else(|| UnpackError::InvalidGithubSpec(owner_repo.to_string()))?;
    let repo = repo.strip_suffix(".git").unwrap_or(repo);
    Ok((owner.to_string(), repo.to_string()))
}

/// Parse `github://owner/repo[?ref=X]` or a GitHub repository-root URL.
pub fn parse_github_spec(input: &str) -> Result<GithubSpec, UnpackError> {
    if let Some(rest) = input.strip_prefix(GITHUB_SCHEME) {
        let (path, query) = rest.split_once('?').unwrap_or((rest, ""));
        let owner_repo = path.trim_matches('/');
        validate_owner_repo(owner_repo)?;
        let (owner, repo) = split_owner_repo(owner_repo)?;
        return Ok(GithubSpec {
            owner,
            repo,
            reference: ref_from_query(query),
        });
    }

    if input.starts_with(GITHUB_HTTPS) {
        let url = Url::parse(input)
            .map_err(|e| UnpackError::InvalidGithubSpec(format!("{input}: {e}")))?;
        let parts: Vec<&str> = url.path().split('/').filter(|s| !s.is_empty()).collect();
        if parts.len() != 2 {
            return Err(UnpackError::InvalidGithubSpec(format!(
                "Unsupported GitHub spec: {input}"
            )));
        }
        let owner_repo = parts.join("/");
        validate_owner_repo(&owner_repo)?;
        let (owner, repo) = split_owner_repo(&owner_repo)?;
        return Ok(GithubSpec {
            owner,
            repo,
            reference: url.query().and_then(ref_from_query),
        });
    }

    Err(UnpackError::InvalidGithubSpec(format!(
        "Unsupported GitHub spec: {input}"
    )))
}

/// Shallow-clone `spec` into a scratch directory and read the tree into memory.
///
/// Blocking. The clone directory is removed before returning.
pub fn clone_and_walk(spec: &GithubSpec) -> Result<Vec<UnpackedEntry>, UnpackError> {
    let checkout = tempfile::Builder::new()
        .prefix("attachments_github_")
        .tempdir()?;
    let repo_url = spec.clone_url();
    let reference = spec.reference.as_deref().unwrap_or("HEAD");

    let mut command = Command::new("git");
    command.args(["clone", "--depth", "1"]);
    if let Some(branch) = &spec.reference {
        command.arg("--branch").arg(branch);
    }
    command.arg(&repo_url).arg(checkout.path());

    info!(
        repo_url = %repo_url,
        reference = reference,
        path = %checkout.path().display(),
        "Cloning git repository"
    );
    let output = command.output().map_err(|e| {
        error!(error = ?e, repo_url = %repo_url, "Failed to launch git process");
        UnpackError::Clone(e.to_string())
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        error!(
            repo_url = %repo_url,
            reference = reference,
            status = ?output.status,
            stderr = %stderr,
            "Git exited with non-zero code"
        );
        let reason = if stderr.is_empty() {
            output.status.to_string()
        } else {
            stderr
        };
        return Err(UnpackError::Clone(reason));
    }
    info!(repo_url = %repo_url, reference = reference, "Successfully cloned git repository");

    let entries = walk_directory(checkout.path())?;
    if let Err(e) = checkout.close() {
        error!(error = ?e, "Failed to remove clone directory");
    }
    Ok(entries)
}
