use std::path::PathBuf;

use tarc_runtime::{
    Config, LeakCheck,
    replay::{self, ReplaySummary},
    utils::{
        error::{ReportableError, report},
        fileloader,
    },
};

/// Output lines printed by `write` together with the run summary.
pub type TestOutput = (Vec<String>, ReplaySummary);

pub fn run_source_test(
    src: &str,
    path: Option<PathBuf>,
    config: Config,
) -> Result<TestOutput, Vec<Box<dyn ReportableError>>> {
    run_source_with_input(src, path, config, "")
}

pub fn run_source_with_input(
    src: &str,
    path: Option<PathBuf>,
    config: Config,
    input: &str,
) -> Result<TestOutput, Vec<Box<dyn ReportableError>>> {
    let path = path.unwrap_or_else(|| PathBuf::from("(from template)"));
    let mut input = input.as_bytes();
    let mut out = vec![];
    let summary = replay::run_source(src, path, config, &mut input, &mut out)?;
    let lines = String::from_utf8_lossy(&out)
        .lines()
        .map(ToString::to_string)
        .collect();
    Ok((lines, summary))
}

pub fn run_file_with_config(path: &'static str, config: Config) -> Option<TestOutput> {
    let (file, src) = load_src(path);
    let res = run_source_test(&src, Some(file.clone()), config);
    match res {
        Ok(res) => Some(res),
        Err(errs) => {
            report(&src, file, &errs);
            None
        }
    }
}

/// Run a script that must not leak any array object.
pub fn run_file_test(path: &'static str) -> Option<Vec<String>> {
    let config = Config {
        leak_check: LeakCheck::Error,
    };
    run_file_with_config(path, config).map(|(lines, _)| lines)
}

pub fn run_error_test(path: &'static str) -> Vec<Box<dyn ReportableError>> {
    let (file, src) = load_src(path);
    let res = run_source_test(&src, Some(file), Config::default());
    match res {
        Ok(_res) => {
            panic!("this test should emit errors")
        }
        Err(errs) => errs,
    }
}

pub fn load_src(path: &'static str) -> (PathBuf, String) {
    let crate_root = option_env!("TEST_ROOT").expect(
        r#"You must set TEST_ROOT environment variable to run test.
        You should put the line like below to your build.rs.
        fn main() {
            println!("cargo:rustc-env=TEST_ROOT={}", env!("CARGO_MANIFEST_DIR"));
        }
        "#,
    );
    let file = [crate_root, "tests/tarc", path]
        .iter()
        .collect::<PathBuf>()
        .canonicalize()
        .expect("canonicalize failed");
    println!("{}", file.display());
    let src = fileloader::load(&file).expect("failed to load file");
    (file, src)
}
