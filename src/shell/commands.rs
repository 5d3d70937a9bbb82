//! Command handlers.

use std::io::Write;
use std::path::Path;

use comfy_table::{Cell, Table, presets::UTF8_FULL};

use super::input::{self, Input, META_PREFIX};
use super::render;
use super::{Flow, Shell};
use crate::core::{ShellError, ShellResult};

/// One help entry: names, usage line, summary.
struct HelpTopic {
    names: &'static [&'static str],
    usage: &'static str,
    summary: &'static str,
}

const HELP: &[HelpTopic] = &[
    HelpTopic {
        names: &["select", "show"],
        usage: "select ...;",
        summary: "Run a query and print the result set.",
    },
    HelpTopic {
        names: &["insert", "update", "delete", "create", "drop"],
        usage: "insert|update|delete|create|drop ...;",
        summary: "Run a data-modifying statement and print the row count.",
    },
    HelpTopic {
        names: &["describe", "desc"],
        usage: "describe table [full];",
        summary: "Show a table's columns, and its indexes with \"full\".",
    },
    HelpTopic {
        names: &["begin"],
        usage: "begin",
        summary: "Start a transaction. Accepted for scripts; otherwise a no-op.",
    },
    HelpTopic {
        names: &["commit", "rollback"],
        usage: "commit | rollback",
        summary: "End the current transaction. Ignored while autocommit is on.",
    },
    HelpTopic {
        names: &["history", "hist", "h"],
        usage: "history",
        summary: "Show the numbered command history.",
    },
    HelpTopic {
        names: &["r"],
        usage: "r [num | prefix]   (or !num)",
        summary: "Re-run history entry num, the latest entry starting with prefix, or the previous command.",
    },
    HelpTopic {
        names: &["connect"],
        usage: "connect alias",
        summary: "Close the current connection and connect to another database.",
    },
    HelpTopic {
        names: &["load"],
        usage: "load file   (or @file)",
        summary: "Run the commands in a file.",
    },
    HelpTopic {
        names: &["set"],
        usage: ".set [name value]   (or --set name value)",
        summary: "Show all variables, or set one. See \"help variables\".",
    },
    HelpTopic {
        names: &["drivers"],
        usage: ".drivers",
        summary: "List the registered database drivers.",
    },
    HelpTopic {
        names: &["help", "?"],
        usage: "help [topic]",
        summary: "Show help.",
    },
    HelpTopic {
        names: &["exit", "quit", "eof"],
        usage: ".exit | .quit | Ctrl-D",
        summary: "Close the connection, save the history, and leave.",
    },
];

impl Shell {
    /// Routes a complete command to its handler by leading token.
    pub(super) fn dispatch(&mut self, command: &str) -> ShellResult<Flow> {
        let (verb, args) = input::split_first(command);
        if let Some(meta) = verb.strip_prefix(META_PREFIX) {
            return self.dispatch_meta(meta, args);
        }

        match verb {
            "select" | "show" => self.do_query(command),
            "insert" | "update" | "delete" | "create" | "drop" => self.do_update(command),
            "describe" | "desc" => self.do_describe(args),
            "begin" => {
                self.connection()?;
                Ok(Flow::Continue)
            }
            "commit" | "rollback" => self.do_end_transaction(verb),
            "history" | "hist" | "h" => self.do_history(),
            "r" => self.do_rerun(args),
            "connect" => self.do_connect(args),
            "load" => self.do_load(args),
            "help" | "?" => self.do_help(args),
            "eof" => self.do_eof(),
            _ => self.do_default(command),
        }
    }

    fn dispatch_meta(&mut self, name: &str, args: &str) -> ShellResult<Flow> {
        match name {
            "connect" => self.do_connect(args),
            "load" => self.do_load(args),
            "set" => {
                self.handle_set(args)?;
                Ok(Flow::Continue)
            }
            "history" | "hist" | "h" => self.do_history(),
            "r" => self.do_rerun(args),
            "describe" | "desc" => self.do_describe(args),
            "drivers" => self.do_drivers(),
            "help" | "?" => self.do_help(args),
            "exit" | "quit" => self.do_eof(),
            _ => Err(ShellError::bad_command(format!(
                "Unknown command: \"{META_PREFIX}{name}\""
            ))),
        }
    }

    fn do_query(&mut self, statement: &str) -> ShellResult<Flow> {
        let opts = self.vars.options();
        let db = self.db.as_mut().ok_or(ShellError::NotConnected)?;
        let mut cursor = db.cursor()?;
        render::exec_sql(&mut *self.out, &mut cursor, statement, &opts)?;
        render::render_result_set(&mut *self.out, &mut cursor, &opts)?;
        cursor.close()?;
        if opts.autocommit {
            db.commit()?;
        }
        Ok(Flow::Continue)
    }

    fn do_update(&mut self, statement: &str) -> ShellResult<Flow> {
        let opts = self.vars.options();
        let db = self.db.as_mut().ok_or(ShellError::NotConnected)?;
        let mut cursor = db.cursor()?;
        render::exec_sql(&mut *self.out, &mut cursor, statement, &opts)?;
        writeln!(self.out, "{}", render::row_count_message(cursor.row_count()))?;
        cursor.close()?;
        if opts.autocommit {
            db.commit()?;
        }
        Ok(Flow::Continue)
    }

    /// Anything without a handler goes to the database as-is.
    fn do_default(&mut self, statement: &str) -> ShellResult<Flow> {
        let opts = self.vars.options();
        let db = self.db.as_mut().ok_or(ShellError::NotConnected)?;
        let mut cursor = db.cursor()?;
        render::exec_sql(&mut *self.out, &mut cursor, statement, &opts)?;
        if cursor.description().is_some() {
            render::render_result_set(&mut *self.out, &mut cursor, &opts)?;
        } else {
            writeln!(self.out, "{}", render::row_count_message(cursor.row_count()))?;
        }
        cursor.close()?;
        if opts.autocommit {
            db.commit()?;
        }
        Ok(Flow::Continue)
    }

    fn do_describe(&mut self, args: &str) -> ShellResult<Flow> {
        let words: Vec<&str> = args.split_whitespace().collect();
        let (table, full) = match words.as_slice() {
            [table] => (*table, false),
            [table, full] if full.eq_ignore_ascii_case("full") => (*table, true),
            _ => return Err(ShellError::bad_command("Usage: describe table [full]")),
        };

        let opts = self.vars.options();
        let db = self.db.as_mut().ok_or(ShellError::NotConnected)?;
        let mut cursor = db.cursor()?;
        let columns = cursor.table_metadata(table)?;
        let indexes = if full {
            Some(cursor.index_metadata(table)?)
        } else {
            None
        };
        cursor.close()?;

        render::render_description(
            &mut *self.out,
            table,
            &columns,
            indexes.as_ref().map(Option::as_deref),
        )?;
        if opts.autocommit {
            db.commit()?;
        }
        Ok(Flow::Continue)
    }

    fn do_end_transaction(&mut self, verb: &str) -> ShellResult<Flow> {
        let autocommit = self.vars.flag("autocommit");
        let db = self.db.as_mut().ok_or(ShellError::NotConnected)?;
        if autocommit {
            writeln!(self.out, "WARNING: Autocommit is enabled. \"{verb}\" ignored")?;
        } else if verb == "commit" {
            db.commit()?;
        } else {
            db.rollback()?;
        }
        Ok(Flow::Continue)
    }

    fn do_history(&mut self) -> ShellResult<Flow> {
        for (i, entry) in self.console.history().entries().iter().enumerate() {
            writeln!(self.out, "{:>4}: {entry}", i + 1)?;
        }
        Ok(Flow::Continue)
    }

    /// Finds the history line `r` refers to. Re-run commands are never
    /// selected.
    fn find_rerun(&self, arg: Option<&str>) -> ShellResult<Option<String>> {
        let history = self.console.history();
        match arg {
            None => Ok(history.last_matching("", &input::is_rerun)),
            Some(arg) => match arg.parse::<usize>() {
                Ok(n) => match history.get(n) {
                    Some(entry) if input::is_rerun(&entry) => Err(ShellError::bad_command(
                        format!("Command {n} is itself a re-run command."),
                    )),
                    found => Ok(found),
                },
                Err(_) => Ok(history.last_matching(arg, &input::is_rerun)),
            },
        }
    }

    fn do_rerun(&mut self, args: &str) -> ShellResult<Flow> {
        let words: Vec<&str> = args.split_whitespace().collect();
        if words.len() > 1 {
            return Err(ShellError::bad_command("Too many parameters to \"r\" command."));
        }

        let Some(line) = self.find_rerun(words.first().copied())? else {
            writeln!(self.out, "No match.")?;
            return Ok(Flow::Continue);
        };
        writeln!(self.out, "{line}")?;
        self.console.history_mut().append(&line, false);

        let command = match input::classify(&line, false) {
            Input::Command(command) => input::strip_terminator(&command).to_string(),
            Input::Meta(command) => command,
            Input::End => "eof".to_string(),
            Input::Comment(Some(body)) => {
                self.structured_comment(&body)?;
                return Ok(Flow::Continue);
            }
            Input::Blank | Input::Comment(None) | Input::Continuation(_) => {
                return Ok(Flow::Continue);
            }
        };
        if command.is_empty() {
            return Ok(Flow::Continue);
        }

        // The line was just printed; suppress the SQL echo.
        let echo = self.vars.flag("echo");
        self.vars.store("echo", super::VarValue::Bool(false));
        let result = self.dispatch(&command);
        self.vars.store("echo", super::VarValue::Bool(echo));
        result
    }

    fn do_connect(&mut self, args: &str) -> ShellResult<Flow> {
        let words: Vec<&str> = args.split_whitespace().collect();
        let [alias] = words.as_slice() else {
            return Err(ShellError::bad_command("Usage: connect alias"));
        };
        let db_config = self.config.find_match(alias)?.clone();
        self.connect_to(db_config)?;
        Ok(Flow::Continue)
    }

    fn do_load(&mut self, args: &str) -> ShellResult<Flow> {
        let words: Vec<&str> = args.split_whitespace().collect();
        let file = match words.as_slice() {
            [file] => *file,
            [] => return Err(ShellError::bad_command("Usage: load file")),
            _ => return Err(ShellError::bad_command("Too many arguments to \"load\" (\"@\")")),
        };
        self.load_file(Path::new(file)).map_err(|err| {
            ShellError::bad_command(format!("Unable to load file \"{file}\": {err}"))
        })?;
        Ok(Flow::Continue)
    }

    pub(super) fn handle_set(&mut self, args: &str) -> ShellResult<()> {
        let words: Vec<&str> = args.split_whitespace().collect();
        match words.as_slice() {
            [] => {
                let width = self.vars.iter().map(|v| v.name.len()).max().unwrap_or(0);
                for var in self.vars.iter() {
                    writeln!(self.out, "{:<width$} = {}", var.name, var.value)?;
                }
                Ok(())
            }
            [name, value] => self.set_variable(name, value),
            _ => Err(ShellError::bad_command("Incorrect number of arguments")),
        }
    }

    fn do_drivers(&mut self) -> ShellResult<Flow> {
        let current = self.db.as_ref().map(|db| db.driver_key().to_string());
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["Key", "Name", "Connected"]);
        for descriptor in self.registry.iter() {
            let connected = current.as_deref() == Some(descriptor.key.as_str());
            table.add_row(vec![
                Cell::new(&descriptor.key),
                Cell::new(&descriptor.display_name),
                Cell::new(if connected { "*" } else { "" }),
            ]);
        }
        writeln!(self.out, "{table}")?;
        Ok(Flow::Continue)
    }

    fn do_help(&mut self, args: &str) -> ShellResult<Flow> {
        let topic = args.trim().to_lowercase();
        match topic.as_str() {
            "" => {
                let mut table = Table::new();
                table.load_preset(UTF8_FULL);
                table.set_header(vec!["Command", "Description"]);
                for entry in HELP {
                    table.add_row(vec![Cell::new(entry.usage), Cell::new(entry.summary)]);
                }
                writeln!(self.out, "{table}")?;
                writeln!(
                    self.out,
                    "SQL statements end with \";\" and may span several lines.\n\
                     Type \"help <command>\" or \"help variables\" for more."
                )?;
            }
            "variables" => self.help_variables()?,
            name => {
                let name = name.trim_start_matches(META_PREFIX);
                let entry = HELP
                    .iter()
                    .find(|entry| entry.names.contains(&name))
                    .ok_or_else(|| ShellError::bad_command(format!("No help for \"{name}\"")))?;
                writeln!(self.out, "Usage: {}\n\n{}", entry.usage, entry.summary)?;
            }
        }
        Ok(Flow::Continue)
    }

    fn help_variables(&mut self) -> ShellResult<()> {
        writeln!(
            self.out,
            "Variables are set with \".set name value\", or with the structured\n\
             comment \"--set name value\" so that scripts stay portable.\n\
             Boolean values: on, off, yes, no, true, false, 1, 0.\n"
        )?;
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["Name", "Type", "Default", "Description"]);
        for var in self.vars.iter() {
            table.add_row(vec![
                Cell::new(var.name),
                Cell::new(var.kind),
                Cell::new(&var.default),
                Cell::new(var.description),
            ]);
        }
        writeln!(self.out, "{table}")?;
        Ok(())
    }

    fn do_eof(&mut self) -> ShellResult<Flow> {
        if self.interactive {
            writeln!(self.out, "\nBye.")?;
            self.save_history()?;
        }
        if let Some(db) = self.db.take() {
            if let Err(err) = db.close() {
                self.report(err.into())?;
            }
        }
        Ok(Flow::Stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Configuration, DatabaseConfig};
    use crate::core::{ColumnDescription, IndexMetadata, TypeTag, Value};
    use crate::driver::{DriverRegistry, DummyDriver, DummyJournal, Scripted};
    use crate::history::PlainConsole;
    use std::cell::RefCell;
    use std::io;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct Captured(Rc<RefCell<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn take(&self) -> String {
            String::from_utf8_lossy(&std::mem::take(&mut *self.0.borrow_mut())).into_owned()
        }
    }

    struct Fixture {
        shell: Shell,
        out: Captured,
        journal: Rc<RefCell<DummyJournal>>,
        dir: tempfile::TempDir,
    }

    fn connected() -> Fixture {
        let dir = tempfile::TempDir::new().unwrap();
        let journal = Rc::new(RefCell::new(DummyJournal::default()));
        let mut registry = DriverRegistry::new();
        registry
            .register("dummy", Rc::new(DummyDriver::with_journal(Rc::clone(&journal))), false)
            .unwrap();

        let mut config = Configuration::default();
        config.settings.history_dir = Some(dir.path().to_path_buf());
        config
            .add(DatabaseConfig {
                aliases: vec!["test".into()],
                host: "localhost".into(),
                port: None,
                database: "testdb".into(),
                user: String::new(),
                password: String::new(),
                driver: "dummy".into(),
            })
            .unwrap();

        let out = Captured::default();
        let console = PlainConsole::new(Box::new(io::Cursor::new(Vec::new())), 100);
        let mut shell = Shell::new(config, registry, Box::new(console)).with_output(Box::new(out.clone()));
        let db_config = shell.config.find_match("test").unwrap().clone();
        shell.connect_to(db_config).unwrap();
        shell.set_variable("timings", "off").unwrap();
        out.take();
        Fixture {
            shell,
            out,
            journal,
            dir,
        }
    }

    fn run(fx: &mut Fixture, line: &str) -> Flow {
        fx.shell.onecmd(line).unwrap()
    }

    #[test]
    fn test_update_reports_unknown_row_count() {
        let mut fx = connected();
        fx.journal.borrow_mut().push(Scripted::count(Some(-1)));
        run(&mut fx, "UPDATE t SET a = 1;");
        let text = fx.out.take();
        assert_eq!(text, "update t SET a = 1\nNo row count available.\n");
        assert_eq!(fx.journal.borrow().commits, 1);
    }

    #[test]
    fn test_delete_runs_as_delete() {
        let mut fx = connected();
        fx.journal.borrow_mut().push(Scripted::count(Some(1)));
        run(&mut fx, "delete from t;");
        assert_eq!(fx.journal.borrow().executed.last().unwrap(), "delete from t");
        assert!(fx.out.take().ends_with("1 row\n"));
    }

    #[test]
    fn test_error_reports_and_rolls_back() {
        let mut fx = connected();
        fx.journal.borrow_mut().push(Scripted::Error("relation \"t\" does not exist".into()));
        assert_eq!(run(&mut fx, "select * from t;"), Flow::Continue);
        assert!(fx.out.take().contains("ERROR: relation \"t\" does not exist"));
        assert_eq!(fx.journal.borrow().rollbacks, 1);
        assert_eq!(fx.journal.borrow().commits, 0);
    }

    #[test]
    fn test_warning_is_reported_without_rollback() {
        let mut fx = connected();
        fx.journal.borrow_mut().push(Scripted::Warning("truncated".into()));
        run(&mut fx, "insert into t values (1);");
        assert!(fx.out.take().contains("WARNING: truncated"));
        assert_eq!(fx.journal.borrow().rollbacks, 0);
    }

    #[test]
    fn test_autocommit_enable_commits_once() {
        let mut fx = connected();
        run(&mut fx, ".set autocommit off");
        run(&mut fx, "insert into t values (1);");
        assert_eq!(fx.journal.borrow().commits, 0);

        run(&mut fx, ".set autocommit on");
        assert_eq!(fx.journal.borrow().commits, 1);
        assert!(fx.out.take().contains("Autocommit enabled. Committing current transaction."));

        run(&mut fx, ".set autocommit on");
        assert_eq!(fx.journal.borrow().commits, 1);
    }

    #[test]
    fn test_commit_ignored_under_autocommit() {
        let mut fx = connected();
        run(&mut fx, "commit");
        assert_eq!(fx.out.take(), "WARNING: Autocommit is enabled. \"commit\" ignored\n");
        assert_eq!(fx.journal.borrow().commits, 0);

        run(&mut fx, "--set autocommit false");
        run(&mut fx, "rollback");
        assert_eq!(fx.journal.borrow().rollbacks, 1);
    }

    #[test]
    fn test_default_handler_forwards_verbatim() {
        let mut fx = connected();
        fx.journal.borrow_mut().push(Scripted::rows(
            vec![ColumnDescription::new("x", "int", Some(TypeTag::Number))],
            vec![vec![Value::Integer(1)]],
        ));
        run(&mut fx, "PRAGMA table_list;");
        assert_eq!(fx.journal.borrow().executed.last().unwrap(), "pragma table_list");
        assert!(fx.out.take().contains("1 row\n\nx\n-\n1\n"));

        run(&mut fx, "vacuum;");
        assert!(fx.out.take().ends_with("No row count available.\n"));
    }

    #[test]
    fn test_not_connected() {
        let mut fx = connected();
        run(&mut fx, "eof");
        assert!(!fx.shell.is_connected());
        fx.out.take();
        run(&mut fx, "select 1;");
        assert_eq!(fx.out.take(), "ERROR: Not connected to a database.\n");
    }

    #[test]
    fn test_history_listing_and_rerun() {
        let mut fx = connected();
        fx.journal.borrow_mut().push(Scripted::count(Some(2)));
        fx.journal.borrow_mut().push(Scripted::count(Some(2)));
        run(&mut fx, "update t set a = 1;");
        run(&mut fx, "h");
        let listing = fx.out.take();
        assert!(listing.contains("   1: update t set a = 1;\n"));
        assert!(listing.contains("   2: h\n"));

        run(&mut fx, "r upd");
        let text = fx.out.take();
        // Echo is suppressed for the re-run statement itself.
        assert_eq!(text, "update t set a = 1;\n2 rows\n");
        assert!(fx.shell.variables().flag("echo"));
        assert_eq!(fx.journal.borrow().executed.len(), 2);
    }

    #[test]
    fn test_rerun_edge_cases() {
        let mut fx = connected();
        run(&mut fx, "r");
        assert_eq!(fx.out.take(), "No match.\n");

        run(&mut fx, "r 1");
        assert!(fx.out.take().contains("is itself a re-run command"));

        run(&mut fx, "r 1 2");
        assert_eq!(fx.out.take(), "ERROR: Too many parameters to \"r\" command.\n");
    }

    #[test]
    fn test_rerun_previous_skips_rerun_commands() {
        let mut fx = connected();
        run(&mut fx, "begin");
        run(&mut fx, "!1");
        run(&mut fx, "r");
        let text = fx.out.take();
        assert_eq!(text, "begin\nbegin\n");
    }

    #[test]
    fn test_rerun_by_prefix_skips_rerun_commands() {
        let mut fx = connected();
        run(&mut fx, "rollback");
        fx.out.take();
        run(&mut fx, "r r");
        assert_eq!(
            fx.out.take(),
            "rollback\nWARNING: Autocommit is enabled. \"rollback\" ignored\n"
        );
    }

    #[test]
    fn test_describe() {
        let mut fx = connected();
        fx.journal.borrow_mut().push(Scripted::rows(
            vec![ColumnDescription::new("id", "int", Some(TypeTag::Number))],
            Vec::new(),
        ));
        fx.journal.borrow_mut().indexes = Some(vec![IndexMetadata::new("t_id", vec!["id".into()], None)]);
        run(&mut fx, "describe t full;");
        let text = fx.out.take();
        assert!(text.contains("Table t:"));
        assert!(text.contains("t_id Columns:     (id)"));

        run(&mut fx, "desc t everything;");
        assert_eq!(fx.out.take(), "ERROR: Usage: describe table [full]\n");
    }

    #[test]
    fn test_set_listing_and_errors() {
        let mut fx = connected();
        run(&mut fx, ".set");
        let text = fx.out.take();
        assert!(text.contains("autocommit = true\n"));
        assert!(text.contains("binarymax  = 20\n"));
        assert!(text.contains("timings    = false\n"));

        run(&mut fx, ".set echo");
        assert_eq!(fx.out.take(), "ERROR: Incorrect number of arguments\n");
        run(&mut fx, ".set binarymax lots");
        assert_eq!(fx.out.take(), "ERROR: Bad argument to \"set binarymax\"\n");
    }

    #[test]
    fn test_help_and_drivers() {
        let mut fx = connected();
        run(&mut fx, "help");
        assert!(fx.out.take().contains("describe table [full];"));
        run(&mut fx, "? variables");
        let text = fx.out.take();
        assert!(text.contains("binarymax"));
        assert!(text.contains("integer"));
        run(&mut fx, "help .set");
        assert!(fx.out.take().starts_with("Usage: .set [name value]"));
        run(&mut fx, "help frobnicate");
        assert_eq!(fx.out.take(), "ERROR: No help for \"frobnicate\"\n");
        run(&mut fx, ".drivers");
        assert!(fx.out.take().contains("Dummy (no database)"));
    }

    #[test]
    fn test_unknown_meta_command() {
        let mut fx = connected();
        run(&mut fx, ".frob");
        assert_eq!(fx.out.take(), "ERROR: Unknown command: \".frob\"\n");
    }

    #[test]
    fn test_load_queues_lines() {
        let mut fx = connected();
        let path = fx.dir.path().join("script.sql");
        std::fs::write(&path, "update t\nset a = 1;\ncommit\n").unwrap();
        run(&mut fx, &format!("@{}", path.display()));
        assert_eq!(
            fx.shell.queue.iter().cloned().collect::<Vec<_>>(),
            vec!["update t", "set a = 1;", "commit"]
        );

        run(&mut fx, "load /no/such/file.sql");
        assert!(fx.out.take().starts_with("ERROR: Unable to load file \"/no/such/file.sql\""));
    }

    #[test]
    fn test_eof_closes_and_saves_history() {
        let mut fx = connected();
        run(&mut fx, "begin");
        assert_eq!(run(&mut fx, "EOF"), Flow::Stop);
        let text = fx.out.take();
        assert!(text.starts_with("\nBye.\nSaving history file"));
        assert_eq!(fx.journal.borrow().closed, 1);
        let saved = std::fs::read_to_string(fx.shell.history_file().unwrap()).unwrap();
        assert_eq!(saved, "begin\nEOF\n");
    }
}
