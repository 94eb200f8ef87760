use std::path::{Path, PathBuf};

/// Normalize a path string based on the current operating system
///
/// On Windows the string is kept; elsewhere backslashes become forward slashes.
///
/// # Example
///
/// ```
/// use multiconv_sfz::parser::path_utils::normalize_path;
///
/// let normalized = normalize_path("samples\\piano\\C4.wav");
///
/// #[cfg(not(windows))]
/// assert_eq!(normalized, "samples/piano/C4.wav");
/// ```
pub fn normalize_path(path: &str) -> String {
    if cfg!(windows) {
        path.to_string()
    } else {
        path.replace('\\', "/")
    }
}

/// Combine a default path with a sample path
///
/// An absolute sample path is used as-is; a relative one is appended to the
/// default path.
///
/// ```
/// use multiconv_sfz::parser::path_utils::combine_sample_path;
/// use std::path::PathBuf;
///
/// let combined = combine_sample_path("samples/piano/", "C4.wav");
/// assert_eq!(combined, PathBuf::from("samples/piano/C4.wav"));
/// ```
pub fn combine_sample_path(default_path: &str, sample_path: &str) -> PathBuf {
    let sample = PathBuf::from(normalize_path(sample_path));
    if sample.is_absolute() || default_path.is_empty() {
        return sample;
    }
    PathBuf::from(normalize_path(default_path)).join(sample)
}

/// Resolve a `sample` opcode to a file path
///
/// Relative paths are taken relative to the folder of the SFZ file, after
/// applying the `default_path` of the control section.
pub fn resolve_sample_path(sample_path: &str, default_path: Option<&str>, sfz_file_path: Option<&Path>) -> PathBuf {
    let combined = combine_sample_path(default_path.unwrap_or(""), sample_path);
    if combined.is_absolute() {
        return combined;
    }
    match sfz_file_path.and_then(Path::parent) {
        Some(folder) => folder.join(combined),
        None => combined,
    }
}

/// True for generated sources like `*sine` or `*noise`, which are no files.
pub fn is_generator(sample_path: &str) -> bool {
    sample_path.starts_with('*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_sample_path() {
        assert_eq!(combine_sample_path("", "a.wav"), PathBuf::from("a.wav"));
        assert_eq!(combine_sample_path("samples\\", "sub\\a.wav"), PathBuf::from("samples/sub/a.wav"));
        assert_eq!(combine_sample_path("samples/", "/abs/a.wav"), PathBuf::from("/abs/a.wav"));
    }

    #[test]
    fn test_resolve_relative_to_sfz_folder() {
        let resolved = resolve_sample_path("C4 soft.wav", Some("Piano/"), Some(Path::new("/lib/Piano.sfz")));
        assert_eq!(resolved, PathBuf::from("/lib/Piano/C4 soft.wav"));
        assert_eq!(resolve_sample_path("a.wav", None, None), PathBuf::from("a.wav"));
        assert!(is_generator("*sine"));
    }
}
