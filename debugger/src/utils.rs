use std::{borrow::Cow, path::Path};

pub fn normalise_path(path: &Path) -> Cow<'_, Path> {
    // Try to expand tilde prefix to home directory
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return Cow::Owned(home.join(stripped));
        }
        // If home directory cannot be determined, log and return path as-is
        tracing::warn!("cannot determine home directory, using path as-is");
    }
    Cow::Borrowed(path)
}

/// The transport cannot reliably launch binaries whose path falls outside
/// the portable filename character set.
pub fn is_portable_path(path: &Path) -> bool {
    path.to_str().map(|s| s.is_ascii()).unwrap_or(false)
}

/// Wire form of a source path: forward slashes only.
pub fn wire_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn portable_paths_are_ascii() {
        assert!(is_portable_path(Path::new("/usr/bin/gdb")));
        assert!(!is_portable_path(Path::new("/home/josé/gdb")));
    }

    #[test]
    fn wire_paths_use_forward_slashes() {
        assert_eq!(wire_path(Path::new(r"C:\src\main.c")), "C:/src/main.c");
        assert_eq!(wire_path(Path::new("/src/main.c")), "/src/main.c");
    }

    #[test]
    fn tilde_expands_to_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(
                normalise_path(Path::new("~/bin/gdb")).into_owned(),
                home.join("bin/gdb")
            );
        }
        // no tilde, no change
        assert_eq!(
            normalise_path(Path::new("/usr/bin/gdb")).into_owned(),
            PathBuf::from("/usr/bin/gdb")
        );
    }
}
