//! Breakpoint and register models owned by the orchestrator.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

fn unbound() -> i64 {
    -1
}

fn enabled() -> bool {
    true
}

/// A user breakpoint at (file, line) granularity.
///
/// The debugger-assigned number is transient session state: it is never
/// persisted and is reset to unbound whenever the session ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub filename: PathBuf,
    pub line: i64,
    #[serde(default)]
    pub condition: String,
    #[serde(default = "enabled")]
    pub enabled: bool,
    #[serde(skip_serializing, default = "unbound")]
    pub number: i64,
}

impl Breakpoint {
    pub fn new(filename: impl Into<PathBuf>, line: i64, condition: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            line,
            condition: condition.into(),
            enabled: true,
            number: unbound(),
        }
    }

    pub fn is_bound(&self) -> bool {
        self.number >= 0
    }
}

#[derive(Debug, Default)]
pub struct BreakpointList {
    items: Vec<Breakpoint>,
}

impl BreakpointList {
    pub fn items(&self) -> &[Breakpoint] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Insert, replacing any existing breakpoint at the same location.
    pub fn add(&mut self, breakpoint: Breakpoint) {
        self.remove(&breakpoint.filename, breakpoint.line);
        self.items.push(breakpoint);
    }

    pub fn at(&self, filename: &Path, line: i64) -> Option<&Breakpoint> {
        self.items
            .iter()
            .find(|bp| bp.filename == filename && bp.line == line)
    }

    pub fn remove(&mut self, filename: &Path, line: i64) -> Option<Breakpoint> {
        let index = self
            .items
            .iter()
            .position(|bp| bp.filename == filename && bp.line == line)?;
        Some(self.items.remove(index))
    }

    pub fn remove_file(&mut self, filename: &Path) {
        self.items.retain(|bp| bp.filename != filename);
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn set_condition(&mut self, filename: &Path, line: i64, condition: &str) -> bool {
        match self
            .items
            .iter_mut()
            .find(|bp| bp.filename == filename && bp.line == line)
        {
            Some(bp) => {
                bp.condition = condition.to_string();
                true
            }
            None => false,
        }
    }

    /// Record the debugger-assigned number for a location.
    pub fn bind_number(&mut self, filename: &Path, line: i64, number: i64) -> bool {
        match self
            .items
            .iter_mut()
            .find(|bp| bp.filename == filename && bp.line == line)
        {
            Some(bp) => {
                bp.number = number;
                true
            }
            None => false,
        }
    }

    /// Forget every debugger-assigned number, e.g. when the session ends.
    pub fn invalidate_numbers(&mut self) {
        for bp in &mut self.items {
            bp.number = unbound();
        }
    }

    /// Lines `start_line..start_line + count` were deleted from the file:
    /// breakpoints inside the deleted range disappear, later ones shift up.
    pub fn on_file_delete_lines(&mut self, filename: &Path, start_line: i64, count: i64) {
        self.items.retain_mut(|bp| {
            if bp.filename != filename || bp.line < start_line {
                return true;
            }
            if bp.line >= start_line + count {
                bp.line -= count;
                true
            } else {
                false
            }
        });
    }

    /// `count` lines were inserted before `start_line`: breakpoints at or
    /// after it shift down.
    pub fn on_file_insert_lines(&mut self, filename: &Path, start_line: i64, count: i64) {
        for bp in &mut self.items {
            if bp.filename == filename && bp.line >= start_line {
                bp.line += count;
            }
        }
    }
}

/// CPU register names and their most recent formatted values, keyed by the
/// register index reported by the debugger.
#[derive(Debug, Default, Clone)]
pub struct RegisterSet {
    pub names: Vec<String>,
    pub values: HashMap<usize, String>,
}

impl RegisterSet {
    pub fn clear(&mut self) {
        self.names.clear();
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_with(lines: &[i64]) -> BreakpointList {
        let mut list = BreakpointList::default();
        for &line in lines {
            list.add(Breakpoint::new("/src/main.c", line, ""));
        }
        list
    }

    fn lines(list: &BreakpointList) -> Vec<i64> {
        list.items().iter().map(|bp| bp.line).collect()
    }

    #[test]
    fn add_replaces_duplicate_location() {
        let mut list = list_with(&[10]);
        list.add(Breakpoint::new("/src/main.c", 10, "x > 1"));
        assert_eq!(list.len(), 1);
        assert_eq!(list.at(Path::new("/src/main.c"), 10).unwrap().condition, "x > 1");
    }

    #[test]
    fn deleting_lines_shifts_and_drops_breakpoints() {
        let mut list = list_with(&[5, 10, 11, 20]);
        // lines 10 and 11 vanish, line 20 moves up
        list.on_file_delete_lines(Path::new("/src/main.c"), 10, 2);
        assert_eq!(lines(&list), vec![5, 18]);
    }

    #[test]
    fn inserting_lines_shifts_breakpoints_down() {
        let mut list = list_with(&[5, 10, 20]);
        list.on_file_insert_lines(Path::new("/src/main.c"), 10, 3);
        assert_eq!(lines(&list), vec![5, 13, 23]);
    }

    #[test]
    fn edits_in_other_files_are_ignored() {
        let mut list = list_with(&[10]);
        list.on_file_delete_lines(Path::new("/src/other.c"), 1, 100);
        assert_eq!(lines(&list), vec![10]);
    }

    #[test]
    fn numbers_are_transient() {
        let mut list = list_with(&[10]);
        assert!(list.bind_number(Path::new("/src/main.c"), 10, 3));
        assert!(list.at(Path::new("/src/main.c"), 10).unwrap().is_bound());
        list.invalidate_numbers();
        assert!(!list.at(Path::new("/src/main.c"), 10).unwrap().is_bound());
        // the number never reaches the serialized form
        let json = serde_json::to_string(list.items()).unwrap();
        assert!(!json.contains("number"));
    }
}
