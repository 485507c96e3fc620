//! The state module handles persisting breakpoints and watch expressions
//! between debugging sessions.
//!
//! Both lists are stored as JSON arrays next to the project they belong
//! to. A missing file reads as an empty list; everything else that goes
//! wrong is surfaced to the caller and never affects an active session.

use std::{
    io::{Read, Write},
    path::Path,
};

use eyre::Context;
use serde::{Deserialize, Serialize};

pub use debugger::Breakpoint;

/// One persisted watch expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchRecord {
    pub name: String,
}

pub fn save_breakpoints(breakpoints: &[Breakpoint], writer: impl Write) -> eyre::Result<()> {
    serde_json::to_writer_pretty(writer, breakpoints).context("saving breakpoints")?;
    Ok(())
}

pub fn save_breakpoints_to(
    breakpoints: &[Breakpoint],
    path: impl AsRef<Path>,
) -> eyre::Result<()> {
    let f = std::fs::File::create(path.as_ref()).context("creating breakpoint file")?;
    save_breakpoints(breakpoints, &f).context("saving breakpoint file")?;
    Ok(())
}

pub fn load_breakpoints(reader: impl Read) -> eyre::Result<Vec<Breakpoint>> {
    let breakpoints = serde_json::from_reader(reader).context("reading breakpoints")?;
    Ok(breakpoints)
}

/// Load breakpoints, resolving relative filenames against the list's own
/// directory. A missing file is an empty list.
pub fn load_breakpoints_from(path: impl AsRef<Path>) -> eyre::Result<Vec<Breakpoint>> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no breakpoint file");
        return Ok(Vec::new());
    }
    let f = std::fs::File::open(path).context("opening breakpoint file")?;
    let mut breakpoints = load_breakpoints(f).context("loading breakpoint file")?;
    if let Some(dir) = path.parent() {
        for bp in &mut breakpoints {
            if bp.filename.is_relative() {
                bp.filename = dir.join(&bp.filename);
            }
        }
    }
    Ok(breakpoints)
}

pub fn save_watches(watches: &[WatchRecord], writer: impl Write) -> eyre::Result<()> {
    serde_json::to_writer_pretty(writer, watches).context("saving watches")?;
    Ok(())
}

pub fn save_watches_to(watches: &[WatchRecord], path: impl AsRef<Path>) -> eyre::Result<()> {
    let f = std::fs::File::create(path.as_ref()).context("creating watch file")?;
    save_watches(watches, &f).context("saving watch file")?;
    Ok(())
}

pub fn load_watches(reader: impl Read) -> eyre::Result<Vec<WatchRecord>> {
    let watches = serde_json::from_reader(reader).context("reading watches")?;
    Ok(watches)
}

/// A missing file is an empty list.
pub fn load_watches_from(path: impl AsRef<Path>) -> eyre::Result<Vec<WatchRecord>> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no watch file");
        return Ok(Vec::new());
    }
    let f = std::fs::File::open(path).context("opening watch file")?;
    load_watches(f).context("loading watch file")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn breakpoints_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("breakpoints.json");

        let mut saved = vec![
            Breakpoint::new("/src/main.c", 10, "x > 1"),
            Breakpoint::new("/src/other.c", 3, ""),
        ];
        saved[0].number = 7;
        save_breakpoints_to(&saved, &path).unwrap();

        let loaded = load_breakpoints_from(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].filename, PathBuf::from("/src/main.c"));
        assert_eq!(loaded[0].line, 10);
        assert_eq!(loaded[0].condition, "x > 1");
        assert!(loaded[0].enabled);
        // session-assigned numbers never survive a round trip
        assert_eq!(loaded[0].number, -1);
    }

    #[test]
    fn relative_filenames_resolve_against_the_list_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("breakpoints.json");
        save_breakpoints_to(&[Breakpoint::new("main.c", 5, "")], &path).unwrap();

        let loaded = load_breakpoints_from(&path).unwrap();
        assert_eq!(loaded[0].filename, dir.path().join("main.c"));
    }

    #[test]
    fn missing_files_read_as_empty_lists() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_breakpoints_from(dir.path().join("none.json"))
            .unwrap()
            .is_empty());
        assert!(load_watches_from(dir.path().join("none.json"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn corrupt_files_are_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("breakpoints.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(load_breakpoints_from(&path).is_err());
    }

    #[test]
    fn watches_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watches.json");
        let saved = vec![
            WatchRecord { name: "x".to_string() },
            WatchRecord { name: "list->head".to_string() },
        ];
        save_watches_to(&saved, &path).unwrap();
        assert_eq!(load_watches_from(&path).unwrap(), saved);
    }
}
