mod catalog;
mod cli;
mod commands;
mod config;
mod document;
mod ui;

#[cfg(test)]
mod scenarios;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    let level = if cli.quiet {
        log::LevelFilter::Error
    } else {
        log_level
    };
    // ureq and rustls stay at warn
    env_logger::Builder::new()
        .filter_level(level.min(log::LevelFilter::Warn))
        .filter_module("catalyst", level)
        .filter_module("catalystkit", level)
        .filter_module("declarative", level)
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    match cli.command {
        Command::Apply(args) => commands::apply::run(&ctx, &cli.connection, args),
        Command::Run(args) => commands::run::run(&ctx, &cli.connection, args),
        Command::Kinds => commands::kinds::list(&ctx, &cli.connection),
        Command::Describe { kind } => commands::kinds::describe(&cli.connection, &kind),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "catalyst", &mut io::stdout());
            Ok(())
        }
    }
}
