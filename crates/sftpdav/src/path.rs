//! Virtual-to-remote path mapping.
//!
//! Remote hosts are POSIX, so paths are handled as `/`-separated strings
//! rather than `std::path` values, which would follow local platform rules.

/// Marker appended to a directory key to address the directory itself.
const SELF_MARKER: &str = "/.";

/// Join a virtual path onto the session's home directory.
///
/// The virtual path is treated as relative to `home` even when it starts
/// with `/`. The result is lexically cleaned: empty and `.` components are
/// dropped and `..` removes the previous component (never above `/`).
pub fn resolve(home: &str, virtual_path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for component in home.split('/').chain(virtual_path.split('/')) {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("/{}", parts.join("/"))
}

/// Parent directory of an absolute remote path. The parent of `/` is `/`.
pub fn parent_of(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => trimmed[..idx].to_string(),
    }
}

/// Last component of an absolute remote path. The base name of `/` is `/`.
pub fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/";
    }
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Cache key under which the metadata of the served root itself is stored.
///
/// `dir` is the parent of the resolved root. The key can never collide
/// with a listing key because listing keys are cleaned paths.
pub fn self_key(dir: &str) -> String {
    format!("{}{SELF_MARKER}", dir.trim_end_matches('/'))
}

/// Normalize a virtual path as received from the WebDAV layer.
///
/// Strips trailing slashes (collections arrive as `/dir/`) and maps the
/// empty path to `/`.
pub(crate) fn normalize_virtual(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_joins_onto_home() {
        assert_eq!(resolve("/root", "/"), "/root");
        assert_eq!(resolve("/root", "/foo.txt"), "/root/foo.txt");
        assert_eq!(resolve("/home/alice", "/a/b/c"), "/home/alice/a/b/c");
        assert_eq!(resolve("/home/alice/", "docs/"), "/home/alice/docs");
    }

    #[test]
    fn test_resolve_cleans_components() {
        assert_eq!(resolve("/root", "/a/./b//c"), "/root/a/b/c");
        assert_eq!(resolve("/root", "/a/../b"), "/root/b");
        assert_eq!(resolve("/root", "/../../.."), "/");
        assert_eq!(resolve("/", "/"), "/");
    }

    #[test]
    fn test_parent_of() {
        assert_eq!(parent_of("/root/foo.txt"), "/root");
        assert_eq!(parent_of("/root"), "/");
        assert_eq!(parent_of("/"), "/");
        assert_eq!(parent_of("/a/b/"), "/a");
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("/root/foo.txt"), "foo.txt");
        assert_eq!(base_name("/root"), "root");
        assert_eq!(base_name("/"), "/");
    }

    #[test]
    fn test_self_key() {
        assert_eq!(self_key("/"), "/.");
        assert_eq!(self_key("/home"), "/home/.");
        assert_ne!(self_key("/home"), "/home");
    }

    #[test]
    fn test_normalize_virtual() {
        assert_eq!(normalize_virtual(""), "/");
        assert_eq!(normalize_virtual("/"), "/");
        assert_eq!(normalize_virtual("/dir/"), "/dir");
        assert_eq!(normalize_virtual("file.txt"), "/file.txt");
    }
}
