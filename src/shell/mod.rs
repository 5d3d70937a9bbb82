//! The command interpreter.
//!
//! Each input line goes through [`Shell::precmd`], which records it in the
//! history, handles comments, and accumulates multi-line statements until
//! the `;` terminator arrives. A complete command is then dispatched to its
//! handler (see `commands.rs`). [`Shell::onecmd`] is the error boundary:
//! everything except a broken terminal is reported and the loop continues.

pub mod commands;
pub mod input;
pub mod render;
pub mod variables;

pub use input::Input;
pub use variables::{Options, VarType, VarValue, Variables};

use std::collections::VecDeque;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::config::{CMDLINE_ALIAS, Configuration, DatabaseConfig};
use crate::core::{DbError, ShellError, ShellResult};
use crate::driver::{Connection, DriverRegistry};
use crate::history::{Console, History, ReadOutcome};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// History entries that are plain comments (`-- text`).
static COMMENT_ENTRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^--\s").expect("comment pattern is valid"));

/// Whether the interpreter keeps reading after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

pub struct Shell {
    config: Configuration,
    registry: DriverRegistry,
    console: Box<dyn Console>,
    out: Box<dyn Write>,
    vars: Variables,
    db: Option<Connection>,
    db_config: Option<DatabaseConfig>,
    history_file: Option<PathBuf>,
    /// Lines waiting to be run ahead of console input (loaded files).
    queue: VecDeque<String>,
    /// Fragments of the statement being accumulated.
    partial: Vec<String>,
    /// History index of the first fragment.
    partial_start: usize,
    interactive: bool,
}

impl Shell {
    #[must_use]
    pub fn new(config: Configuration, registry: DriverRegistry, console: Box<dyn Console>) -> Self {
        let mut vars = Variables::new();
        vars.on_change("autocommit", Self::autocommit_changed);
        Self {
            config,
            registry,
            console,
            out: Box::new(io::stdout()),
            vars,
            db: None,
            db_config: None,
            history_file: None,
            queue: VecDeque::new(),
            partial: Vec::new(),
            partial_start: 0,
            interactive: true,
        }
    }

    /// Sends all interpreter output to `out` instead of stdout.
    #[must_use]
    pub fn with_output(mut self, out: Box<dyn Write>) -> Self {
        self.out = out;
        self
    }

    #[must_use]
    pub const fn variables(&self) -> &Variables {
        &self.vars
    }

    #[must_use]
    pub fn history(&self) -> &dyn History {
        self.console.history()
    }

    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.db.is_some()
    }

    #[must_use]
    pub const fn is_accumulating(&self) -> bool {
        !self.partial.is_empty()
    }

    #[must_use]
    pub fn history_file(&self) -> Option<&Path> {
        self.history_file.as_deref()
    }

    /// Selects the database `cmdloop` connects to on startup.
    pub fn set_database(&mut self, alias: &str) -> ShellResult<()> {
        self.db_config = Some(self.config.find_match(alias)?.clone());
        Ok(())
    }

    fn prompt(&self) -> &'static str {
        if !self.interactive {
            ""
        } else if self.is_accumulating() {
            "> "
        } else {
            "? "
        }
    }

    /// Runs until end of input. Connects to the selected database first,
    /// if there is one.
    pub fn cmdloop(&mut self) -> ShellResult<()> {
        self.preloop()?;
        loop {
            let flow = match self.queue.pop_front() {
                Some(line) => self.onecmd(&line)?,
                None => {
                    let prompt = self.prompt();
                    match self.console.read_line(prompt)? {
                        ReadOutcome::Line(line) => self.onecmd(&line)?,
                        ReadOutcome::Interrupted => {
                            self.discard_partial();
                            writeln!(self.out, "^C")?;
                            Flow::Continue
                        }
                        ReadOutcome::Eof => {
                            self.abandon_partial()?;
                            self.execute("eof")?
                        }
                    }
                }
            };
            self.out.flush()?;
            if flow == Flow::Stop {
                return Ok(());
            }
        }
    }

    /// Runs the commands in `path` without prompting, then stops.
    pub fn run_file(&mut self, path: &Path) -> ShellResult<()> {
        self.load_file(path).map_err(|err| {
            ShellError::bad_command(format!("Failed to load file \"{}\": {err}", path.display()))
        })?;
        self.queue.push_back(input::END_MARKER.to_string());
        self.interactive = false;
        self.cmdloop()
    }

    fn preloop(&mut self) -> ShellResult<()> {
        if self.interactive {
            writeln!(
                self.out,
                "sqlcmd, version {VERSION} (input: {})\n\nType \"help\" or \"?\" for help.\n",
                self.console.name()
            )?;
        }
        match self.db_config.clone() {
            Some(db_config) => self.connect_to(db_config),
            None => {
                self.init_history();
                Ok(())
            }
        }
    }

    /// Processes one raw input line.
    pub fn onecmd(&mut self, line: &str) -> ShellResult<Flow> {
        match self.precmd(line)? {
            Some(command) => self.execute(&command),
            None => Ok(Flow::Continue),
        }
    }

    /// Dispatches a complete command, reporting any non-fatal error.
    pub fn execute(&mut self, command: &str) -> ShellResult<Flow> {
        match self.dispatch(command) {
            Ok(flow) => Ok(flow),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                self.report(err)?;
                Ok(Flow::Continue)
            }
        }
    }

    fn report(&mut self, err: ShellError) -> io::Result<()> {
        match err {
            ShellError::Db(DbError::Warning { message }) => {
                writeln!(self.out, "WARNING: {message}")
            }
            ShellError::Db(DbError::Error { message, trace }) => {
                writeln!(self.out, "ERROR: {message}")?;
                if self.vars.flag("stacktrace") {
                    writeln!(self.out, "{trace}")?;
                }
                if let Some(db) = self.db.as_mut() {
                    if let Err(err) = db.rollback() {
                        tracing::warn!("rollback after error failed: {err}");
                    }
                }
                Ok(())
            }
            other => {
                tracing::debug!("command failed: {other}");
                writeln!(self.out, "ERROR: {other}")
            }
        }
    }

    /// Classifies and records one line. Returns the command to dispatch,
    /// or `None` if the line was consumed (comment, blank, continuation).
    pub fn precmd(&mut self, line: &str) -> ShellResult<Option<String>> {
        let input = input::classify(line, self.is_accumulating());
        if input == Input::Blank {
            return Ok(None);
        }

        self.record(line.trim());

        match input {
            Input::Blank | Input::Comment(None) => Ok(None),
            Input::Comment(Some(body)) => {
                if let Err(err) = self.structured_comment(&body) {
                    self.report(err)?;
                }
                Ok(None)
            }
            Input::End => {
                self.abandon_partial()?;
                Ok(Some("eof".to_string()))
            }
            Input::Meta(command) => Ok(Some(command)),
            Input::Command(command) => {
                if input::needs_terminator(&command) && !input::ends_with_terminator(&command) {
                    self.partial_start = self.console.history().total();
                    self.partial.push(command);
                    Ok(None)
                } else {
                    Ok(non_empty(input::strip_terminator(&command)))
                }
            }
            Input::Continuation(text) => {
                let complete = input::ends_with_terminator(&text);
                self.partial.push(text);
                if !complete {
                    return Ok(None);
                }
                let full = std::mem::take(&mut self.partial).join(" ");
                let history = self.console.history_mut();
                history.cut_back_to(self.partial_start);
                history.append(&full, true);
                self.restore_history_limit();
                Ok(non_empty(input::strip_terminator(&full)))
            }
        }
    }

    /// Appends a line to history, then purges bare comments. While a
    /// statement is accumulating nothing is evicted, so `partial_start`
    /// still points at its first line when it completes.
    fn record(&mut self, line: &str) {
        let accumulating = self.is_accumulating();
        let history = self.console.history_mut();
        if accumulating && history.total() >= history.max_length() {
            history.set_max_length(history.total() + 1);
        }
        history.append(line, false);
        history.remove_matching(&COMMENT_ENTRY);
    }

    fn restore_history_limit(&mut self) {
        let max = self.config.settings.history_max;
        self.console.history_mut().set_max_length(max);
    }

    fn discard_partial(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            None
        } else {
            self.restore_history_limit();
            Some(std::mem::take(&mut self.partial).join(" "))
        }
    }

    /// Drops an incomplete statement at end of input, with a warning.
    fn abandon_partial(&mut self) -> io::Result<()> {
        match self.discard_partial() {
            Some(text) => writeln!(
                self.out,
                "WARNING: Discarding incomplete statement \"{text}\""
            ),
            None => Ok(()),
        }
    }

    /// `--set var value` and friends.
    fn structured_comment(&mut self, body: &str) -> ShellResult<()> {
        let (word, args) = input::split_first(body);
        match word {
            "set" => self.handle_set(args),
            _ => {
                tracing::debug!(word, "ignoring structured comment");
                Ok(())
            }
        }
    }

    /// Applies a variable change, running its hook first.
    pub fn set_variable(&mut self, name: &str, text: &str) -> ShellResult<()> {
        let Some(change) = self.vars.prepare(name, text)? else {
            return Ok(());
        };
        if let Some(hook) = change.hook {
            hook(self, &change.value)?;
        }
        tracing::debug!(name = change.name, value = %change.value, "variable set");
        self.vars.store(change.name, change.value);
        Ok(())
    }

    fn autocommit_changed(shell: &mut Self, value: &VarValue) -> ShellResult<()> {
        if *value == VarValue::Bool(true) {
            if let Some(db) = shell.db.as_mut() {
                writeln!(shell.out, "Autocommit enabled. Committing current transaction.")?;
                db.commit()?;
            }
        }
        Ok(())
    }

    fn connection(&mut self) -> ShellResult<&mut Connection> {
        self.db.as_mut().ok_or(ShellError::NotConnected)
    }

    /// Closes any open connection (saving its history), then connects.
    pub fn connect_to(&mut self, db_config: DatabaseConfig) -> ShellResult<()> {
        let descriptor = self.registry.resolve(&db_config.driver)?.clone();

        if let Some(db) = self.db.take() {
            if let Err(err) = db.close() {
                self.report(err.into())?;
            }
            self.save_history()?;
        }

        writeln!(
            self.out,
            "Connecting to {} database \"{}\" on host {}.",
            descriptor.display_name, db_config.database, db_config.host
        )?;
        let conn = Connection::open(&descriptor.key, descriptor.factory.as_ref(), &db_config.params())?;
        self.db = Some(conn);

        let alias = db_config.primary_alias();
        self.history_file = (alias != CMDLINE_ALIAS)
            .then(|| self.config.settings.history_dir().join(format!("history_{alias}")));
        self.db_config = Some(db_config);
        self.init_history();
        Ok(())
    }

    fn init_history(&mut self) {
        let history = self.console.history_mut();
        history.clear();
        history.set_max_length(self.config.settings.history_max);
        if let Some(path) = self.history_file.as_deref() {
            match history.load(path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    tracing::warn!(path = %path.display(), "could not load history: {err}");
                }
            }
        }
    }

    fn save_history(&mut self) -> io::Result<()> {
        let Some(path) = self.history_file.clone() else {
            return Ok(());
        };
        writeln!(self.out, "Saving history file \"{}\"", path.display())?;
        if let Err(err) = self.console.history().save(&path) {
            tracing::warn!(path = %path.display(), "could not save history: {err}");
            writeln!(
                self.out,
                "ERROR: Unable to save history file \"{}\": {err}",
                path.display()
            )?;
        }
        Ok(())
    }

    /// Queues the lines of `path` to run next, ahead of anything already
    /// queued.
    fn load_file(&mut self, path: &Path) -> io::Result<()> {
        let contents = fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "loading command file");
        for line in contents.lines().rev() {
            self.queue.push_front(line.to_string());
        }
        Ok(())
    }
}

fn non_empty(command: &str) -> Option<String> {
    (!command.is_empty()).then(|| command.to_string())
}
