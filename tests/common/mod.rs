// Shared fixtures for the integration tests
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Write};
use std::rc::Rc;

use sqlcmd::config::{Configuration, DatabaseConfig};
use sqlcmd::core::ShellResult;
use sqlcmd::driver::{DriverRegistry, DummyDriver, DummyJournal};
use sqlcmd::history::{Console, History, MemoryHistory, PlainConsole, ReadOutcome};
use sqlcmd::Shell;
use tempfile::TempDir;

/// Output sink the test keeps a handle to after giving it to the shell.
#[derive(Clone, Default)]
pub struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl SharedBuf {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }

    pub fn take(&self) -> String {
        let bytes = std::mem::take(&mut *self.0.borrow_mut());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Console that replays a fixed sequence of read outcomes, then reports
/// end of input.
pub struct ScriptedConsole {
    outcomes: VecDeque<ReadOutcome>,
    history: MemoryHistory,
}

impl ScriptedConsole {
    pub fn new(outcomes: Vec<ReadOutcome>) -> Self {
        Self {
            outcomes: outcomes.into(),
            history: MemoryHistory::new(100),
        }
    }

    pub fn lines(lines: &[&str]) -> Self {
        Self::new(lines.iter().map(|l| ReadOutcome::Line((*l).to_string())).collect())
    }
}

impl Console for ScriptedConsole {
    fn read_line(&mut self, _prompt: &str) -> ShellResult<ReadOutcome> {
        Ok(self.outcomes.pop_front().unwrap_or(ReadOutcome::Eof))
    }

    fn history(&self) -> &dyn History {
        &self.history
    }

    fn history_mut(&mut self) -> &mut dyn History {
        &mut self.history
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub fn database(alias: &str, driver: &str, database: &str) -> DatabaseConfig {
    DatabaseConfig {
        aliases: vec![alias.to_string()],
        host: "localhost".to_string(),
        port: None,
        database: database.to_string(),
        user: String::new(),
        password: String::new(),
        driver: driver.to_string(),
    }
}

/// Configuration whose history files live in `dir`.
pub fn config_in(dir: &TempDir, databases: Vec<DatabaseConfig>) -> Configuration {
    let mut config = Configuration::default();
    config.settings.history_dir = Some(dir.path().to_path_buf());
    for db in databases {
        config.add(db).unwrap();
    }
    config
}

/// A shell connected (on startup) to a journaled dummy database aliased
/// `dummy`.
pub struct DummySession {
    pub shell: Shell,
    pub out: SharedBuf,
    pub journal: Rc<RefCell<DummyJournal>>,
    pub dir: TempDir,
}

impl DummySession {
    pub fn new(console: Box<dyn Console>) -> Self {
        let dir = TempDir::new().unwrap();
        let journal = Rc::new(RefCell::new(DummyJournal::default()));
        let mut registry = DriverRegistry::new();
        registry
            .register("dummy", Rc::new(DummyDriver::with_journal(Rc::clone(&journal))), false)
            .unwrap();
        let config = config_in(&dir, vec![database("dummy", "dummy", "scratch")]);

        let out = SharedBuf::default();
        let mut shell = Shell::new(config, registry, console).with_output(Box::new(out.clone()));
        shell.set_database("dummy").unwrap();
        Self {
            shell,
            out,
            journal,
            dir,
        }
    }

    pub fn with_lines(lines: &[&str]) -> Self {
        Self::new(Box::new(ScriptedConsole::lines(lines)))
    }

    pub fn history_path(&self) -> std::path::PathBuf {
        self.dir.path().join("history_dummy")
    }
}

/// Plain console over an in-memory script.
pub fn plain_console(input: &str) -> Box<dyn Console> {
    Box::new(PlainConsole::new(Box::new(io::Cursor::new(input.as_bytes().to_vec())), 100))
}
