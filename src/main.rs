use std::process::ExitCode;

use clap::Parser;

use sqlcmd::cli::{Args, Target};
use sqlcmd::config::{CMDLINE_ALIAS, Configuration};
use sqlcmd::driver::DriverRegistry;
use sqlcmd::history::open_console;
use sqlcmd::logging::init_tracing;
use sqlcmd::{Shell, ShellResult};

fn run(args: &Args) -> ShellResult<()> {
    init_tracing(&args.log_level, args.log_file.as_deref())?;
    let invocation = args.resolve()?;

    let mut config = Configuration::load(args.config.as_deref())?;
    let mut registry = DriverRegistry::with_builtins();
    config.register_drivers(&mut registry)?;

    let alias = match invocation.target {
        Target::Alias(alias) => alias,
        Target::Inline(db) => {
            config.add(db)?;
            CMDLINE_ALIAS.to_string()
        }
    };

    let console = open_console(args.plain, config.settings.history_max);
    let mut shell = Shell::new(config, registry, console);
    shell.set_database(&alias)?;

    match invocation.script {
        Some(script) => shell.run_file(&script),
        None => shell.cmdloop(),
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err}");
            eprintln!("ERROR: {err}");
            ExitCode::FAILURE
        }
    }
}
