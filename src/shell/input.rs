//! Line classification and rewriting, independent of interpreter state.

/// Marks a comment line. `--set var value` is a structured comment.
pub const COMMENT_PREFIX: &str = "--";
/// Leading character of meta-commands, e.g. `.set`.
pub const META_PREFIX: char = '.';
pub const TERMINATOR: char = ';';
/// Sentinel line queued after a script, and the command Ctrl-D maps to.
pub const END_MARKER: &str = "EOF";

/// Commands that are complete without a trailing terminator.
const NO_TERMINATOR: &[&str] = &[
    "load", "connect", "h", "history", "hist", "help", "?", "r", "begin", "commit", "rollback",
    "eof",
];

/// What one input line means before any state is consulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Blank,
    /// `Some(body)` for a structured comment (`--set a b` gives `set a b`).
    Comment(Option<String>),
    End,
    /// A `.command`, with `@` and `!` shorthands already expanded.
    Meta(String),
    /// SQL or a bare-word command, first token lower-cased.
    Command(String),
    /// A line read while a statement is being accumulated, verbatim.
    Continuation(String),
}

/// Splits off the first whitespace-delimited token.
#[must_use]
pub fn split_first(line: &str) -> (&str, &str) {
    let line = line.trim();
    match line.find(char::is_whitespace) {
        Some(i) => (&line[..i], line[i..].trim_start()),
        None => (line, ""),
    }
}

fn join(first: &str, rest: &str) -> String {
    if rest.is_empty() {
        first.to_string()
    } else {
        format!("{first} {rest}")
    }
}

/// Classifies a raw input line. While `accumulating`, only comments and the
/// end marker are recognised; everything else continues the statement.
#[must_use]
pub fn classify(line: &str, accumulating: bool) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Blank;
    }

    let (first, rest) = split_first(line);
    let lower = first.to_lowercase();

    if let Some(body) = first.strip_prefix(COMMENT_PREFIX) {
        return if body.is_empty() {
            Input::Comment(None)
        } else {
            Input::Comment(Some(join(&body.to_lowercase(), rest)))
        };
    }

    if is_end_marker(line, &lower, rest, accumulating) {
        return Input::End;
    }

    if accumulating {
        return Input::Continuation(line.to_string());
    }

    match expand_shorthand(first, rest) {
        Some(meta) => Input::Meta(meta),
        None if lower.starts_with(META_PREFIX) => Input::Meta(join(&lower, rest)),
        None => Input::Command(join(&lower, rest)),
    }
}

fn is_end_marker(line: &str, lower: &str, rest: &str, accumulating: bool) -> bool {
    if line == END_MARKER {
        return true;
    }
    rest.is_empty()
        && (matches!(lower, ".exit" | ".quit") || (!accumulating && lower == "eof"))
}

/// `@file` and `@ file` become `.load file`; `!n` becomes `.r n`.
fn expand_shorthand(first: &str, rest: &str) -> Option<String> {
    let (command, arg) = if let Some(arg) = first.strip_prefix('@') {
        (".load", arg)
    } else if let Some(arg) = first.strip_prefix('!') {
        (".r", arg)
    } else {
        return None;
    };
    let args = [arg, rest]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    Some(join(command, &args))
}

/// Whether `command` is incomplete until it ends with the terminator.
#[must_use]
pub fn needs_terminator(command: &str) -> bool {
    let (first, _) = split_first(command);
    !first.starts_with(META_PREFIX) && !NO_TERMINATOR.contains(&first.to_lowercase().as_str())
}

#[must_use]
pub fn ends_with_terminator(command: &str) -> bool {
    command.trim_end().ends_with(TERMINATOR)
}

/// Removes one trailing terminator and any whitespace before it.
#[must_use]
pub fn strip_terminator(command: &str) -> &str {
    let trimmed = command.trim_end();
    trimmed.strip_suffix(TERMINATOR).unwrap_or(trimmed).trim_end()
}

/// Whether `line` is itself a re-run request (`r`, `.r` or `!n`).
#[must_use]
pub fn is_rerun(line: &str) -> bool {
    let (first, _) = split_first(line);
    first.starts_with('!') || matches!(first.to_lowercase().as_str(), "r" | ".r")
}
