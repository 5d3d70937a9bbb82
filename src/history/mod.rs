//! Command history.
//!
//! [`History`] is the 1-based log the interpreter records every input line
//! in. Only the storage primitives are required; replay lookups, truncation,
//! filtering and persistence are provided on top of them, so both
//! implementations behave identically:
//!
//! - [`MemoryHistory`]: a bounded in-memory buffer, used with the plain
//!   line reader.
//! - [`EditorConsole`]: the `rustyline` editor's own history, so arrow-key
//!   recall sees exactly what the interpreter recorded.
//!
//! A [`Console`] pairs a line source with its history and is chosen once at
//! startup by [`open_console`].

pub mod console;
pub mod memory;

pub use console::{Console, EditorConsole, PlainConsole, ReadOutcome, open_console};
pub use memory::MemoryHistory;

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use regex::Regex;

/// Default number of retained entries.
pub const DEFAULT_MAX_LENGTH: usize = 512;

pub trait History {
    /// Appends a line. Unforced appends skip blank lines; forced appends
    /// record the line as given.
    fn append(&mut self, line: &str, force: bool);

    /// Entry `index` (1-based).
    fn get(&self, index: usize) -> Option<String>;

    fn total(&self) -> usize;

    /// Removes entry `index`; out-of-range indexes are ignored.
    fn remove(&mut self, index: usize);

    fn clear(&mut self);

    /// Sets the retention limit, dropping the oldest entries if needed.
    fn set_max_length(&mut self, max: usize);

    fn max_length(&self) -> usize;

    /// Most recent entry that starts with `prefix` and is not `excluded`.
    fn last_matching(&self, prefix: &str, excluded: &dyn Fn(&str) -> bool) -> Option<String> {
        (1..=self.total())
            .rev()
            .filter_map(|i| self.get(i))
            .find(|entry| entry.starts_with(prefix) && !excluded(entry))
    }

    /// All entries, oldest first.
    fn entries(&self) -> Vec<String> {
        (1..=self.total()).filter_map(|i| self.get(i)).collect()
    }

    fn replace_all(&mut self, entries: Vec<String>) {
        self.clear();
        for entry in entries {
            self.append(&entry, true);
        }
    }

    /// Drops entry `index` and everything after it. Out-of-range indexes
    /// leave the history untouched.
    fn cut_back_to(&mut self, index: usize) {
        if index == 0 || index > self.total() {
            return;
        }
        let mut kept = self.entries();
        kept.truncate(index - 1);
        self.replace_all(kept);
    }

    /// Drops every entry matching `pattern`.
    fn remove_matching(&mut self, pattern: &Regex) {
        let entries = self.entries();
        if entries.iter().any(|e| pattern.is_match(e)) {
            let kept = entries.into_iter().filter(|e| !pattern.is_match(e)).collect();
            self.replace_all(kept);
        }
    }

    /// Writes one entry per line.
    fn save(&self, path: &Path) -> io::Result<()> {
        tracing::debug!(path = %path.display(), entries = self.total(), "saving history");
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = io::BufWriter::new(fs::File::create(path)?);
        for entry in self.entries() {
            writeln!(file, "{entry}")?;
        }
        file.flush()
    }

    /// Replaces the history with the file's contents, keeping only the most
    /// recent `max_length()` entries.
    fn load(&mut self, path: &Path) -> io::Result<()> {
        tracing::debug!(path = %path.display(), "loading history");
        let contents = fs::read_to_string(path)?;
        let lines: Vec<String> = contents
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        let skip = lines.len().saturating_sub(self.max_length());
        self.replace_all(lines.into_iter().skip(skip).collect());
        Ok(())
    }
}
