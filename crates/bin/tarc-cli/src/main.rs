//! Command line interface for the tarc array runtime.
//!
//! Replays a script of runtime calls, prints whatever it writes and checks the
//! heap for leaked arrays afterwards.

use clap::Parser;
use tarc_cli::{Args, emit_statements, run_file};
use tarc_runtime::log;
use tarc_runtime::utils::{error::report, fileloader};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if cfg!(debug_assertions) | cfg!(test) {
        colog::default_builder()
            .filter_level(log::LevelFilter::Trace)
            .init();
    } else {
        colog::default_builder().init();
    }

    let args = Args::parse();
    let fullpath = fileloader::get_canonical_path(&args.file)?;
    let content = fileloader::load(&fullpath)?;
    let res = if args.emit_statements {
        emit_statements(&content, &fullpath)
    } else {
        run_file(&args, &content, &fullpath).map(|_| ())
    };
    if let Err(e) = res {
        report(&content, fullpath.clone(), &e);
        return Err(format!("Failed to process {}", args.file).into());
    }
    Ok(())
}
