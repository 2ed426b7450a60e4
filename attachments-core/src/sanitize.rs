//! Name normalisation for archive members, walked files and download names.

/// Only these "raw" archive formats are expanded. Zip-based document formats
/// such as `.xlsx`/`.docx` are deliberately absent.
pub const RAW_ARCHIVE_SUFFIXES: &[&str] = &[
    ".zip", ".tar", ".tgz", ".tar.gz", ".tbz2", ".tar.bz2", ".txz", ".tar.xz",
];

/// Returns true when `name` ends with one of [`RAW_ARCHIVE_SUFFIXES`] (case-insensitive).
pub fn is_raw_archive_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    RAW_ARCHIVE_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
}

/// Normalise a raw member or download name into a relative, forward-slash path.
///
/// Backslashes become `/`, leading slashes are dropped, and any `""`, `"."`
/// or `".."` segment is removed. Never fails: hostile input degrades to an
/// empty string, which callers replace with a fallback name.
pub fn sanitize_member_name(name: &str) -> String {
    name.replace('\\', "/")
        .split('/')
        .filter(|segment| !matches!(*segment, "" | "." | ".."))
        .collect::<Vec<_>>()
        .join("/")
}

/// Join a container's virtual name with a member name.
pub(crate) fn join_virtual(container: &str, member: &str) -> String {
    if container.is_empty() {
        member.to_string()
    } else {
        format!("{container}/{member}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_traversal_segments() {
        assert_eq!(sanitize_member_name("../../etc/passwd"), "etc/passwd");
        assert_eq!(sanitize_member_name("/abs/./path//file.txt"), "abs/path/file.txt");
        assert_eq!(sanitize_member_name("dir\\sub\\..\\x.txt"), "dir/sub/x.txt");
    }

    #[test]
    fn degenerate_names_become_empty() {
        assert_eq!(sanitize_member_name(""), "");
        assert_eq!(sanitize_member_name("///"), "");
        assert_eq!(sanitize_member_name("../.."), "");
    }

    #[test]
    fn raw_archive_suffixes_are_case_insensitive() {
        assert!(is_raw_archive_name("a/B.ZIP"));
        assert!(is_raw_archive_name("release.tar.gz"));
        assert!(is_raw_archive_name("bundle.TXZ"));
        assert!(!is_raw_archive_name("table.xlsx"));
        assert!(!is_raw_archive_name("report.docx"));
        assert!(!is_raw_archive_name("notes.gz"));
    }

    #[test]
    fn join_virtual_skips_empty_container() {
        assert_eq!(join_virtual("", "x.txt"), "x.txt");
        assert_eq!(join_virtual("outer.zip", "inner/x.txt"), "outer.zip/inner/x.txt");
    }
}
