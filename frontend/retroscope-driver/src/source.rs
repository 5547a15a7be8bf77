//! Source file cache for callstack display.
//!
//! Whole files are read once and split into lines. Load failures are not
//! cached so a file that appears later (e.g. after a rebuild) starts working
//! without restarting the debugger.

use rustc_hash::FxHashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct SourceCache {
    files: FxHashMap<PathBuf, Vec<String>>,
}

impl SourceCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The text of 1-based line `line_no`, or `None` when the file cannot be
    /// read or is shorter than that.
    pub fn line(&mut self, path: &Path, line_no: u32) -> Option<&str> {
        if line_no == 0 {
            return None;
        }

        let lines = self.load(path)?;
        lines.get(line_no as usize - 1).map(String::as_str)
    }

    pub fn total_lines(&mut self, path: &Path) -> usize {
        self.load(path).map_or(0, Vec::len)
    }

    fn load(&mut self, path: &Path) -> Option<&Vec<String>> {
        if !self.files.contains_key(path) {
            let contents = fs::read_to_string(path).ok()?;
            let lines = contents.lines().map(str::to_owned).collect();
            self.files.insert(path.to_path_buf(), lines);
        }

        self.files.get(path)
    }
}
