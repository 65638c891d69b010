//! Output-relative path validation.
//!
//! Stylesheet paths are derived from hrefs found in emitted HTML, which is
//! effectively untrusted input. Paths are normalized here before any backend
//! touches the disk.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates and normalizes a path relative to the output directory.
///
/// - `.` components, repeated separators and trailing slashes are dropped,
/// - `..` is resolved lexically and rejected if it would leave the output
///   directory,
/// - leading `/` is treated as "root of the output directory" (an href like
///   `/css/site.css` refers to `css/site.css`),
/// - backslashes are treated as separators on every platform, since hrefs are
///   URL paths and not native paths,
/// - null bytes and drive/UNC prefixes are rejected.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use fold_storage::validate_path;
///
/// assert_eq!(validate_path("/css/site.css").unwrap(), Path::new("css/site.css"));
/// assert_eq!(validate_path("css\\fonts\\icons.css").unwrap(), Path::new("css/fonts/icons.css"));
/// assert_eq!(validate_path("css/../main.css").unwrap(), Path::new("main.css"));
/// assert!(validate_path("../outside.css").is_err());
/// assert!(validate_path("").is_err());
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let original = path.as_ref();
    let normalized = match original.to_str() {
        Some(s) if s.contains('\\') => PathBuf::from(s.replace('\\', "/")),
        _ => original.to_path_buf(),
    };
    let mut components = Vec::new();
    for component in normalized.components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but cause
                // truncation in C-based syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(original.to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
                }
            },
        }
    }
    if components.is_empty() {
        exn::bail!(ErrorKind::InvalidPath(original.to_path_buf()));
    }
    Ok(components.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("main.css", "main.css")]
    #[case("css/main.css", "css/main.css")]
    #[case("/css/main.css", "css/main.css")]
    #[case("./css//main.css", "css/main.css")]
    #[case("css/vendor/../main.css", "css/main.css")]
    #[case("css\\main.css", "css/main.css")]
    #[case("css/", "css")]
    fn test_valid_paths(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(validate(input).unwrap(), Path::new(expected));
    }

    #[rstest]
    #[case("")]
    #[case(".")]
    #[case("/")]
    #[case("..")]
    #[case("../main.css")]
    #[case("css/../../main.css")]
    #[case("..\\main.css")]
    #[case("ma\0in.css")]
    fn test_invalid_paths(#[case] input: &str) {
        let err = validate(input).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
    }
}
