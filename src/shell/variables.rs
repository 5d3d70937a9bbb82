//! Typed interpreter settings (`.set name value`).

use std::collections::BTreeMap;
use std::fmt;

use super::Shell;
use crate::core::{ShellError, ShellResult};

/// Called when a variable's value changes, before the new value is stored.
pub type Hook = fn(&mut Shell, &VarValue) -> ShellResult<()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    Boolean,
    Integer,
    String,
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::String => "string",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl fmt::Display for VarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

/// Accepts on/off, yes/no, 1/0 and true/false, in any case.
#[must_use]
pub fn parse_bool(text: &str) -> Option<bool> {
    match text.to_lowercase().as_str() {
        "on" | "yes" | "1" | "true" => Some(true),
        "off" | "no" | "0" | "false" => Some(false),
        _ => None,
    }
}

impl VarType {
    fn parse(self, text: &str) -> Option<VarValue> {
        match self {
            Self::Boolean => parse_bool(text).map(VarValue::Bool),
            Self::Integer => text.parse().ok().map(VarValue::Int),
            Self::String => Some(VarValue::Str(text.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: &'static str,
    pub kind: VarType,
    pub default: VarValue,
    pub value: VarValue,
    pub description: &'static str,
    hook: Option<Hook>,
}

impl Variable {
    fn new(name: &'static str, default: VarValue, description: &'static str) -> Self {
        let kind = match default {
            VarValue::Bool(_) => VarType::Boolean,
            VarValue::Int(_) => VarType::Integer,
            VarValue::Str(_) => VarType::String,
        };
        Self {
            name,
            kind,
            value: default.clone(),
            default,
            description,
            hook: None,
        }
    }
}

/// Snapshot of the settings the rendering code reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    pub echo: bool,
    pub timings: bool,
    pub autocommit: bool,
    pub stacktrace: bool,
    pub showbinary: bool,
    /// `None` means unlimited.
    pub binarymax: Option<usize>,
}

impl Default for Options {
    fn default() -> Self {
        Variables::new().options()
    }
}

/// A change accepted by [`Variables::prepare`] but not yet stored.
#[derive(Debug)]
pub struct PendingChange {
    pub name: &'static str,
    pub value: VarValue,
    pub hook: Option<Hook>,
}

#[derive(Debug, Clone)]
pub struct Variables {
    vars: BTreeMap<&'static str, Variable>,
}

impl Default for Variables {
    fn default() -> Self {
        Self::new()
    }
}

impl Variables {
    /// The standard variable set, with no hooks attached.
    #[must_use]
    pub fn new() -> Self {
        let vars = [
            Variable::new("echo", VarValue::Bool(true), "Whether or not SQL statements are echoed."),
            Variable::new(
                "timings",
                VarValue::Bool(true),
                "Whether or not to show how long SQL statements take.",
            ),
            Variable::new(
                "autocommit",
                VarValue::Bool(true),
                "Whether SQL statements are auto-committed or not.",
            ),
            Variable::new(
                "stacktrace",
                VarValue::Bool(false),
                "Whether or not to show a stack trace on error.",
            ),
            Variable::new(
                "showbinary",
                VarValue::Bool(false),
                "Whether or not to try to display BINARY column values.",
            ),
            Variable::new(
                "binarymax",
                VarValue::Int(20),
                "Number of characters to show in a BINARY column, if \"showbinary\" is \"true\".",
            ),
        ];
        Self {
            vars: vars.into_iter().map(|v| (v.name, v)).collect(),
        }
    }

    /// Attaches a change hook. Unknown names are ignored.
    pub fn on_change(&mut self, name: &str, hook: Hook) {
        if let Some(var) = self.vars.get_mut(name) {
            var.hook = Some(hook);
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.vars.get(name)
    }

    /// Boolean value of `name`; false for unknown or non-boolean variables.
    #[must_use]
    pub fn flag(&self, name: &str) -> bool {
        matches!(self.get(name).map(|v| &v.value), Some(VarValue::Bool(true)))
    }

    fn int(&self, name: &str) -> Option<i64> {
        match self.get(name).map(|v| &v.value) {
            Some(VarValue::Int(i)) => Some(*i),
            _ => None,
        }
    }

    /// Variables in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.vars.values()
    }

    /// Parses `text` for `name`. Returns `None` when the value would not
    /// change.
    pub fn prepare(&self, name: &str, text: &str) -> ShellResult<Option<PendingChange>> {
        let var = self
            .vars
            .get(name)
            .ok_or_else(|| ShellError::bad_command(format!("No such variable: \"{name}\"")))?;
        let value = var
            .kind
            .parse(text)
            .ok_or_else(|| ShellError::bad_command(format!("Bad argument to \"set {name}\"")))?;
        if value == var.value {
            return Ok(None);
        }
        Ok(Some(PendingChange {
            name: var.name,
            value,
            hook: var.hook,
        }))
    }

    /// Stores a value directly, without running hooks.
    pub fn store(&mut self, name: &str, value: VarValue) {
        if let Some(var) = self.vars.get_mut(name) {
            var.value = value;
        }
    }

    #[must_use]
    pub fn options(&self) -> Options {
        Options {
            echo: self.flag("echo"),
            timings: self.flag("timings"),
            autocommit: self.flag("autocommit"),
            stacktrace: self.flag("stacktrace"),
            showbinary: self.flag("showbinary"),
            binarymax: self.int("binarymax").and_then(|n| usize::try_from(n).ok()),
        }
    }
}
