// Interpreter sessions against the journaled dummy driver
mod common;

use common::{DummySession, ScriptedConsole};
use sqlcmd::driver::Scripted;
use sqlcmd::history::ReadOutcome;

#[test]
fn test_multi_line_statement_is_one_history_entry() {
    let mut session = DummySession::with_lines(&[
        "--set timings off",
        "select *",
        "  from T",
        "where a = 'X';",
    ]);
    session.shell.cmdloop().unwrap();

    assert_eq!(
        session.journal.borrow().executed,
        vec!["select * from T where a = 'X'"]
    );
    assert_eq!(
        session.shell.history().entries(),
        vec!["--set timings off", "select * from T where a = 'X';"]
    );

    let saved = std::fs::read_to_string(session.history_path()).unwrap();
    assert_eq!(saved, "--set timings off\nselect * from T where a = 'X';\n");
}

#[test]
fn test_startup_and_shutdown_messages() {
    let mut session = DummySession::with_lines(&[]);
    session.shell.cmdloop().unwrap();
    let text = session.out.text();
    assert!(text.starts_with("sqlcmd, version "));
    assert!(text.contains("Connecting to Dummy (no database) database \"scratch\" on host localhost.\n"));
    assert!(text.contains("\nBye.\nSaving history file \""));
    assert_eq!(session.journal.borrow().closed, 1);
    assert!(!session.shell.is_connected());
}

#[test]
fn test_negative_row_count_is_unknown() {
    let mut session = DummySession::with_lines(&["--set timings off", "update t set x = 1;"]);
    session.journal.borrow_mut().push(Scripted::count(Some(-1)));
    session.shell.cmdloop().unwrap();
    assert!(session.out.text().contains("update t set x = 1\nNo row count available.\n"));
}

#[test]
fn test_enabling_autocommit_commits_once() {
    let mut session = DummySession::with_lines(&[
        "--set timings off",
        ".set autocommit off",
        "insert into t values (1);",
        "update t set a = 2;",
        ".set autocommit on",
    ]);
    session.shell.cmdloop().unwrap();

    assert_eq!(session.journal.borrow().commits, 1);
    let text = session.out.text();
    assert_eq!(text.matches("Autocommit enabled. Committing current transaction.").count(), 1);
}

#[test]
fn test_error_rolls_back_and_continues() {
    let mut session = DummySession::with_lines(&["--set timings off", "frobnicate t;", "delete from t;"]);
    session.journal.borrow_mut().push(Scripted::Error("syntax error at \"frobnicate\"".into()));
    session.journal.borrow_mut().push(Scripted::count(Some(1)));
    session.shell.cmdloop().unwrap();

    let text = session.out.text();
    assert!(text.contains("frobnicate t\nERROR: syntax error at \"frobnicate\"\n"));
    assert!(text.contains("delete from t\n1 row\n"));
    let journal = session.journal.borrow();
    assert_eq!(journal.rollbacks, 1);
    assert_eq!(journal.executed, vec!["frobnicate t", "delete from t"]);
}

#[test]
fn test_interrupt_discards_partial_statement() {
    let console = ScriptedConsole::new(vec![
        ReadOutcome::Line("select *".into()),
        ReadOutcome::Interrupted,
        ReadOutcome::Line("commit".into()),
    ]);
    let mut session = DummySession::new(Box::new(console));
    session.shell.cmdloop().unwrap();

    let text = session.out.text();
    assert!(text.contains("^C\nWARNING: Autocommit is enabled. \"commit\" ignored\n"));
    assert!(session.journal.borrow().executed.is_empty());
}

#[test]
fn test_end_marker_while_accumulating() {
    let mut session = DummySession::with_lines(&["select *", "EOF", "select 1;"]);
    session.shell.cmdloop().unwrap();

    let text = session.out.text();
    assert!(text.contains("WARNING: Discarding incomplete statement \"select *\"\n\nBye."));
    assert!(session.journal.borrow().executed.is_empty());
}

#[test]
fn test_run_file_is_non_interactive() {
    let mut session = DummySession::with_lines(&[]);
    let script = session.dir.path().join("script.sql");
    std::fs::write(
        &script,
        "--set timings off\ninsert into t values (1);\n-- a comment\nupdate t\n  set a = 2;\n",
    )
    .unwrap();
    session.shell.run_file(&script).unwrap();

    assert_eq!(
        session.journal.borrow().executed,
        vec!["insert into t values (1)", "update t set a = 2"]
    );
    let text = session.out.text();
    assert!(!text.contains("Type \"help\""));
    assert!(!text.contains("Bye."));
    assert!(!session.history_path().exists());
    assert_eq!(session.journal.borrow().closed, 1);
}

#[test]
fn test_nested_load_runs_in_place() {
    let mut session = DummySession::with_lines(&[]);
    let inner = session.dir.path().join("inner.sql");
    let outer = session.dir.path().join("outer.sql");
    std::fs::write(&inner, "select 1;\n").unwrap();
    std::fs::write(&outer, format!("@{}\nselect 2;\n", inner.display())).unwrap();
    session.shell.run_file(&outer).unwrap();

    assert_eq!(session.journal.borrow().executed, vec!["select 1", "select 2"]);
}

#[test]
fn test_missing_script_is_an_error() {
    let mut session = DummySession::with_lines(&[]);
    let err = session
        .shell
        .run_file(&session.dir.path().join("absent.sql"))
        .unwrap_err();
    assert!(err.to_string().starts_with("Failed to load file"));
}

#[test]
fn test_rerun_by_number_suppresses_echo() {
    let mut session = DummySession::with_lines(&["--set timings off", "delete from t;", "!2"]);
    session.journal.borrow_mut().push(Scripted::count(Some(3)));
    session.journal.borrow_mut().push(Scripted::count(Some(0)));
    session.shell.cmdloop().unwrap();

    let text = session.out.text();
    assert!(text.contains("delete from t\n3 rows\ndelete from t;\n0 rows\n"));
    assert_eq!(session.journal.borrow().executed.len(), 2);
}
