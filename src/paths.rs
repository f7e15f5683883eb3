//! Path helpers for host paths.
//!
//! Host paths arrive as strings in the host's own convention, which is not
//! necessarily the convention of the platform we run on. These helpers accept
//! both `/` and `\` as separators and compare case-insensitively.

const SEPARATORS: [char; 2] = ['/', '\\'];

/// Last component of a host path.
pub(crate) fn file_name(path: &str) -> &str {
    path.rsplit(SEPARATORS).next().unwrap_or(path)
}

/// File name without its final extension.
pub(crate) fn file_stem(path: &str) -> &str {
    let name = file_name(path);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

/// Final extension, without the dot.
pub(crate) fn extension(path: &str) -> Option<&str> {
    let name = file_name(path);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
        _ => None,
    }
}

/// Everything before the last separator.
pub(crate) fn parent(path: &str) -> Option<&str> {
    path.rfind(SEPARATORS).map(|i| &path[..i])
}

/// Normalised key for case- and separator-insensitive comparison.
pub(crate) fn path_key(path: &str) -> String {
    path.replace('\\', "/").to_lowercase()
}

pub(crate) fn same_path(a: &str, b: &str) -> bool {
    path_key(a) == path_key(b)
}
