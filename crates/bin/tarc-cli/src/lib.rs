use std::path::Path;

use clap::ValueEnum;
use tarc_runtime::{
    Config, LeakCheck,
    log,
    replay::{self, ReplaySummary},
    utils::error::ReportableError,
};

#[derive(clap::Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Replay script to run
    #[clap(value_parser)]
    pub file: String,

    /// What to do with arrays that are still alive when the script ends
    #[arg(long, value_enum, default_value_t = LeakCheckArg::Warn)]
    pub leak_check: LeakCheckArg,

    /// Print the parsed statements instead of running them
    #[arg(long, default_value_t = false)]
    pub emit_statements: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LeakCheckArg {
    Ignore,
    Warn,
    Error,
}

impl Args {
    pub fn to_config(&self) -> Config {
        let leak_check = match self.leak_check {
            LeakCheckArg::Ignore => LeakCheck::Ignore,
            LeakCheckArg::Warn => LeakCheck::Warn,
            LeakCheckArg::Error => LeakCheck::Error,
        };
        Config { leak_check }
    }
}

pub fn emit_statements(content: &str, path: &Path) -> Result<(), Vec<Box<dyn ReportableError>>> {
    let stmts = replay::parse(content, path).map_err(|errs| {
        errs.into_iter()
            .map(|e| Box::new(e) as Box<dyn ReportableError>)
            .collect::<Vec<_>>()
    })?;
    for stmt in stmts {
        println!("{:?}", stmt.command);
    }
    Ok(())
}

/// Replay `content` with stdin as input and stdout as output.
pub fn run_file(
    args: &Args,
    content: &str,
    path: &Path,
) -> Result<ReplaySummary, Vec<Box<dyn ReportableError>>> {
    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let stdout = std::io::stdout();
    let mut output = stdout.lock();
    let summary = replay::run_source(
        content,
        path.to_path_buf(),
        args.to_config(),
        &mut input,
        &mut output,
    )?;
    log::info!(
        "{} statements replayed, {} arrays leaked",
        summary.statements,
        summary.leaked
    );
    Ok(summary)
}
