use std::io::{self, BufRead, IsTerminal, Write};

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use rustyline::history::{History as _, SearchDirection};

use super::{History, MemoryHistory};
use crate::core::ShellResult;

/// Result of asking a console for one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Line(String),
    /// Ctrl-C at the prompt.
    Interrupted,
    /// Ctrl-D or end of the input stream.
    Eof,
}

/// A line source together with the history it records into.
pub trait Console {
    fn read_line(&mut self, prompt: &str) -> ShellResult<ReadOutcome>;
    fn history(&self) -> &dyn History;
    fn history_mut(&mut self) -> &mut dyn History;
    /// Name shown at startup, e.g. "rustyline".
    fn name(&self) -> &str;
}

/// Picks the line editor for an interactive terminal, the plain reader
/// otherwise.
pub fn open_console(plain: bool, max_length: usize) -> Box<dyn Console> {
    if !plain && io::stdin().is_terminal() {
        match EditorConsole::new(max_length) {
            Ok(console) => return Box::new(console),
            Err(err) => tracing::warn!("line editor unavailable, using plain input: {err}"),
        }
    }
    Box::new(PlainConsole::stdin(max_length))
}

/// Line editor console. The editor's own history is the command history,
/// so recall with the arrow keys matches what `history` lists.
pub struct EditorConsole {
    editor: DefaultEditor,
    max_length: usize,
}

impl EditorConsole {
    pub fn new(max_length: usize) -> ShellResult<Self> {
        let config = rustyline::Config::builder()
            .history_ignore_dups(false)?
            .history_ignore_space(false)
            .auto_add_history(false)
            .max_history_size(max_length)?
            .build();
        Ok(Self {
            editor: DefaultEditor::with_config(config)?,
            max_length,
        })
    }
}

impl Console for EditorConsole {
    fn read_line(&mut self, prompt: &str) -> ShellResult<ReadOutcome> {
        match self.editor.readline(prompt) {
            Ok(line) => Ok(ReadOutcome::Line(line)),
            Err(ReadlineError::Interrupted) => Ok(ReadOutcome::Interrupted),
            Err(ReadlineError::Eof) => Ok(ReadOutcome::Eof),
            Err(err) => Err(err.into()),
        }
    }

    fn history(&self) -> &dyn History {
        self
    }

    fn history_mut(&mut self) -> &mut dyn History {
        self
    }

    fn name(&self) -> &str {
        "rustyline"
    }
}

impl History for EditorConsole {
    fn append(&mut self, line: &str, force: bool) {
        if !force && line.trim().is_empty() {
            return;
        }
        if let Err(err) = self.editor.add_history_entry(line) {
            tracing::warn!("could not record history entry: {err}");
        }
    }

    fn get(&self, index: usize) -> Option<String> {
        let i = index.checked_sub(1)?;
        self.editor
            .history()
            .get(i, SearchDirection::Forward)
            .ok()
            .flatten()
            .map(|found| found.entry.into_owned())
    }

    fn total(&self) -> usize {
        self.editor.history().len()
    }

    fn remove(&mut self, index: usize) {
        if index == 0 || index > self.total() {
            return;
        }
        let mut entries = self.entries();
        entries.remove(index - 1);
        self.replace_all(entries);
    }

    fn clear(&mut self) {
        if let Err(err) = self.editor.clear_history() {
            tracing::warn!("could not clear history: {err}");
        }
    }

    fn set_max_length(&mut self, max: usize) {
        self.max_length = max;
        if let Err(err) = self.editor.history_mut().set_max_len(max) {
            tracing::warn!("could not resize history: {err}");
        }
    }

    fn max_length(&self) -> usize {
        self.max_length
    }
}

/// Reads lines from any buffered reader, recording into a [`MemoryHistory`].
pub struct PlainConsole {
    reader: Box<dyn BufRead>,
    prompt_out: Option<Box<dyn Write>>,
    history: MemoryHistory,
}

impl PlainConsole {
    /// Silent console over `reader`; prompts are not printed.
    pub fn new(reader: Box<dyn BufRead>, max_length: usize) -> Self {
        Self {
            reader,
            prompt_out: None,
            history: MemoryHistory::new(max_length),
        }
    }

    /// Standard input, with prompts written to standard output.
    #[must_use]
    pub fn stdin(max_length: usize) -> Self {
        Self {
            reader: Box::new(io::BufReader::new(io::stdin())),
            prompt_out: Some(Box::new(io::stdout())),
            history: MemoryHistory::new(max_length),
        }
    }
}

impl Console for PlainConsole {
    fn read_line(&mut self, prompt: &str) -> ShellResult<ReadOutcome> {
        if let Some(out) = self.prompt_out.as_mut() {
            write!(out, "{prompt}")?;
            out.flush()?;
        }

        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(ReadOutcome::Eof);
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(ReadOutcome::Line(line))
    }

    fn history(&self) -> &dyn History {
        &self.history
    }

    fn history_mut(&mut self) -> &mut dyn History {
        &mut self.history
    }

    fn name(&self) -> &str {
        "plain"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_plain_console_reads_until_eof() {
        let input = Cursor::new(b"select 1;\r\n\nlast".to_vec());
        let mut console = PlainConsole::new(Box::new(input), 10);
        assert_eq!(console.read_line("? ").unwrap(), ReadOutcome::Line("select 1;".into()));
        assert_eq!(console.read_line("? ").unwrap(), ReadOutcome::Line(String::new()));
        assert_eq!(console.read_line("? ").unwrap(), ReadOutcome::Line("last".into()));
        assert_eq!(console.read_line("? ").unwrap(), ReadOutcome::Eof);
        assert_eq!(console.name(), "plain");
    }

    #[test]
    fn test_plain_console_history_is_separate_from_reading() {
        let mut console = PlainConsole::new(Box::new(Cursor::new(Vec::new())), 10);
        console.history_mut().append("select 1", false);
        assert_eq!(console.history().total(), 1);
        assert_eq!(console.history().max_length(), 10);
    }
}
