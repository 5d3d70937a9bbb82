use std::path::PathBuf;

use clap::Parser;

use crate::config::{DatabaseConfig, parse_inline_spec};
use crate::core::{ShellError, ShellResult};

/// Interactive SQL command interpreter
#[derive(Parser, Debug)]
#[command(name = "sqlcmd", version)]
#[command(about = "Interactive SQL command interpreter", long_about = None)]
pub struct Args {
    /// Database alias from the configuration file, and/or @file to run
    #[arg(value_name = "ALIAS|@FILE", num_args = 0..=2)]
    pub positionals: Vec<String>,

    /// Ad-hoc connection: database,driver,host[:port],user,password
    #[arg(short = 'd', long = "db", value_name = "SPEC")]
    pub db: Option<String>,

    /// Configuration file (default: <config dir>/sqlcmd/config.toml)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Log level or filter directives; SQLCMD_LOG overrides it
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    /// Write log output to this file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Read plain lines from stdin, without the line editor
    #[arg(long)]
    pub plain: bool,
}

/// Which database to connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Alias(String),
    Inline(DatabaseConfig),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub target: Target,
    /// Script to run instead of the interactive prompt.
    pub script: Option<PathBuf>,
}

impl Args {
    /// Applies the positional-argument rules and parses an inline spec.
    pub fn resolve(&self) -> ShellResult<Invocation> {
        let (alias, script) = match self.positionals.as_slice() {
            [] => (None, None),
            [only] => match only.strip_prefix('@') {
                Some(file) => (None, Some(file)),
                None => (Some(only.as_str()), None),
            },
            [alias, file] => {
                let file = file.strip_prefix('@').ok_or_else(|| {
                    ShellError::configuration("File parameter must start with \"@\"")
                })?;
                (Some(alias.as_str()), Some(file))
            }
            _ => return Err(ShellError::configuration("Too many arguments")),
        };

        if script.is_some_and(str::is_empty) {
            return Err(ShellError::configuration("Missing file name after \"@\""));
        }

        let target = match (alias, self.db.as_deref()) {
            (Some(_), Some(_)) => {
                return Err(ShellError::configuration(
                    "You cannot specify both an alias and \"-d\"",
                ));
            }
            (None, None) => {
                return Err(ShellError::configuration(
                    "You must specify either an alias or a valid argument to \"-d\"",
                ));
            }
            (Some(alias), None) => Target::Alias(alias.to_string()),
            (None, Some(spec)) => Target::Inline(parse_inline_spec(spec)?),
        };

        Ok(Invocation {
            target,
            script: script.map(PathBuf::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CMDLINE_ALIAS;

    fn resolve(argv: &[&str]) -> ShellResult<Invocation> {
        let args = Args::try_parse_from(std::iter::once("sqlcmd").chain(argv.iter().copied()))
            .map_err(|e| ShellError::configuration(e.to_string()))?;
        args.resolve()
    }

    #[test]
    fn test_alias_only() {
        let inv = resolve(&["prod"]).unwrap();
        assert_eq!(inv.target, Target::Alias("prod".into()));
        assert_eq!(inv.script, None);
    }

    #[test]
    fn test_alias_and_script() {
        let inv = resolve(&["prod", "@setup.sql"]).unwrap();
        assert_eq!(inv.target, Target::Alias("prod".into()));
        assert_eq!(inv.script, Some(PathBuf::from("setup.sql")));
    }

    #[test]
    fn test_inline_spec_with_script() {
        let inv = resolve(&["-d", "app,sqlite,,,", "@run.sql"]).unwrap();
        match inv.target {
            Target::Inline(db) => {
                assert_eq!(db.primary_alias(), CMDLINE_ALIAS);
                assert_eq!(db.driver, "sqlite");
            }
            other => panic!("expected inline target, got {other:?}"),
        }
        assert_eq!(inv.script, Some(PathBuf::from("run.sql")));
    }

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["sqlcmd", "prod"]).unwrap();
        assert_eq!(args.log_level, "warn");
        assert!(!args.plain);
        assert!(args.config.is_none());
    }

    #[test]
    fn test_rejected_combinations() {
        assert!(resolve(&[]).is_err());
        assert!(resolve(&["prod", "setup.sql"]).is_err());
        assert!(resolve(&["-d", "app,sqlite,,,", "prod"]).is_err());
        assert!(resolve(&["-d", "app,sqlite"]).is_err());
        assert!(resolve(&["@"]).is_err());
        assert!(resolve(&["a", "@b", "c"]).is_err());
    }
}
