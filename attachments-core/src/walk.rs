use std::fs;
use std::path::Path;

use bytes::Bytes;
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

use crate::archive::explode;
use crate::contract::UnpackedEntry;
use crate::error::UnpackError;
use crate::sanitize::is_raw_archive_name;

/// Directory names pruned at any depth.
pub const SKIPPED_DIRS: &[&str] = &[".git", ".hg", ".svn", "__pycache__"];

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIPPED_DIRS.contains(&name))
}

fn relative_name(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let segments: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

/// Read every regular file below `root` into memory, in file-name order.
///
/// Unreadable files (permissions, dangling links) are skipped. Files named like
/// raw archives are exploded; a corrupt one fails the whole walk.
pub fn walk_directory(root: &Path) -> Result<Vec<UnpackedEntry>, UnpackError> {
    info!(path = %root.display(), "Walking directory");
    let mut entries = Vec::new();
    let mut skipped = 0usize;

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped_dir(e));

    for item in walker {
        let item = match item {
            Ok(item) => item,
            Err(e) => {
                debug!(error = %e, "Skipping unreadable directory entry");
                skipped += 1;
                continue;
            }
        };
        if item.file_type().is_dir() || !item.path().is_file() {
            continue;
        }
        let Some(name) = relative_name(root, item.path()) else {
            continue;
        };
        let content = match fs::read(item.path()) {
            Ok(content) => Bytes::from(content),
            Err(e) => {
                debug!(path = %item.path().display(), error = ?e, "Skipping unreadable file");
                skipped += 1;
                continue;
            }
        };

        if is_raw_archive_name(&name) {
            entries.extend(explode(&name, content)?);
        } else {
            entries.push(UnpackedEntry::new(name, content));
        }
    }

    debug!(path = %root.display(), files = entries.len(), skipped, "Directory walk complete");
    Ok(entries)
}
