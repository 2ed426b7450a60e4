//! ZIP/TAR identification and recursive flattening into [`UnpackedEntry`] values.
//!
//! Expansion is driven by an explicit work stack rather than call recursion,
//! so pathological nesting costs heap, not stack. Output order is the
//! depth-first enumeration order of the containers.

use std::io::{Cursor, Read};

use bytes::Bytes;
use tracing::debug;

use crate::contract::UnpackedEntry;
use crate::error::UnpackError;
use crate::sanitize::{is_raw_archive_name, join_virtual, sanitize_member_name};

/// Stream compression wrapped around a TAR payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
    Xz,
}

pub fn detect_compression(data: &[u8]) -> Compression {
    match data {
        [0x1F, 0x8B, ..] => Compression::Gzip,
        [b'B', b'Z', b'h', ..] => Compression::Bzip2,
        [0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00, ..] => Compression::Xz,
        _ => Compression::None,
    }
}

fn decoder(data: &[u8]) -> Box<dyn Read + '_> {
    match detect_compression(data) {
        Compression::None => Box::new(data),
        Compression::Gzip => Box::new(flate2::read::GzDecoder::new(data)),
        Compression::Bzip2 => Box::new(bzip2::read::BzDecoder::new(data)),
        Compression::Xz => Box::new(xz2::read::XzDecoder::new(data)),
    }
}

/// True iff the stream starts with the ZIP local-file-header signature.
pub fn is_zip(data: &[u8]) -> bool {
    data.starts_with(b"PK")
}

/// True iff the (possibly gzip/bzip2/xz compressed) stream parses as a TAR
/// archive with at least one valid header. This decodes the first header, so
/// it is authoritative but not free.
pub fn is_tar(data: &[u8]) -> bool {
    if data.is_empty() {
        return false;
    }
    let mut archive = tar::Archive::new(decoder(data));
    let mut entries = match archive.entries() {
        Ok(entries) => entries,
        Err(_) => return false,
    };
    // An archive that ends before its first header counts as "not a tar".
    matches!(entries.next(), Some(Ok(_)))
}

fn is_expandable_archive(name: &str, data: &[u8]) -> bool {
    is_raw_archive_name(name) && (is_zip(data) || is_tar(data))
}

enum Work {
    Expand { name: String, data: Bytes },
    Emit(UnpackedEntry),
}

/// Flatten `data` into entries named below `container_name`.
///
/// Members are expanded further only when their name carries a raw archive
/// suffix *and* their bytes verify as ZIP or TAR. Bytes that are neither are
/// emitted verbatim under `container_name` (or `"blob"` when it is empty).
/// A malformed member fails the whole call; no partial output is returned.
pub fn explode(container_name: &str, data: Bytes) -> Result<Vec<UnpackedEntry>, UnpackError> {
    let mut out = Vec::new();
    let mut stack = vec![Work::Expand {
        name: container_name.to_string(),
        data,
    }];

    while let Some(work) = stack.pop() {
        let (name, data) = match work {
            Work::Emit(entry) => {
                out.push(entry);
                continue;
            }
            Work::Expand { name, data } => (name, data),
        };

        let members = if is_zip(&data) {
            read_zip_members(&name, &data)?
        } else if is_tar(&data) {
            read_tar_members(&name, &data)?
        } else {
            let name = if name.is_empty() { "blob".to_string() } else { name };
            out.push(UnpackedEntry::new(name, data));
            continue;
        };
        debug!(container = %name, members = members.len(), "Exploded archive");

        stack.extend(members.into_iter().rev().map(|(member_name, member_data)| {
            if is_expandable_archive(&member_name, &member_data) {
                Work::Expand {
                    name: member_name,
                    data: member_data,
                }
            } else {
                Work::Emit(UnpackedEntry::new(member_name, member_data))
            }
        }));
    }

    Ok(out)
}

fn member_virtual_name(container: &str, raw: &str) -> String {
    let member = sanitize_member_name(raw);
    let member = if member.is_empty() {
        "blob".to_string()
    } else {
        member
    };
    join_virtual(container, &member)
}

fn read_zip_members(name: &str, data: &[u8]) -> Result<Vec<(String, Bytes)>, UnpackError> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(data)).map_err(|e| UnpackError::corrupt(name, e))?;
    let mut members = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut file = archive
            .by_index(index)
            .map_err(|e| UnpackError::corrupt(name, e))?;
        if file.is_dir() {
            continue;
        }
        let virtual_name = member_virtual_name(name, file.name());
        let mut content = Vec::new();
        file.read_to_end(&mut content)
            .map_err(|e| UnpackError::corrupt(name, format!("{}: {e}", file.name())))?;
        members.push((virtual_name, Bytes::from(content)));
    }
    Ok(members)
}

fn read_tar_members(name: &str, data: &[u8]) -> Result<Vec<(String, Bytes)>, UnpackError> {
    let mut archive = tar::Archive::new(decoder(data));
    let entries = archive
        .entries()
        .map_err(|e| UnpackError::corrupt(name, e))?;
    let mut members = Vec::new();
    for entry in entries {
        let mut entry = entry.map_err(|e| UnpackError::corrupt(name, e))?;
        let entry_type = entry.header().entry_type();
        if !(entry_type.is_file() || entry_type.is_contiguous() || entry_type.is_gnu_sparse()) {
            continue;
        }
        let raw = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let virtual_name = member_virtual_name(name, &raw);
        let mut content = Vec::new();
        entry
            .read_to_end(&mut content)
            .map_err(|e| UnpackError::corrupt(name, format!("{raw}: {e}")))?;
        members.push((virtual_name, Bytes::from(content)));
    }
    Ok(members)
}
