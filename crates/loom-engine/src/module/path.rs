//! Import path resolution inside a virtual file tree.
//!
//! Paths are plain `/`-separated strings; nothing touches the filesystem.

/// Resolve `reference` as written in the module at `importer`.
///
/// References not starting with `.` are bare names and come back
/// unchanged. Relative references are applied segment by segment to the
/// importer's directory: `..` goes up one level, `...` goes up two, `.` is
/// ignored. The result is absolute with no repeated slashes. Going above
/// the root stays at the root.
pub fn resolve_path(importer: &str, reference: &str) -> String {
    if !reference.starts_with('.') {
        return reference.to_string();
    }

    let mut segments: Vec<&str> = importer.split('/').filter(|s| !s.is_empty()).collect();
    segments.pop();

    for part in reference.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            "..." => {
                segments.pop();
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    format!("/{}", segments.join("/"))
}

/// Whether `reference` names a file of the tree rather than an external
/// module.
pub fn is_internal(reference: &str) -> bool {
    reference.starts_with('/')
}
