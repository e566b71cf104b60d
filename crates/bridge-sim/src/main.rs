//! CLI entry point for the tag bridge simulator binary.

use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

use bridge_sim::{simulate, Scenario};
use serde as _;
use tag_bridge as _;
use thiserror as _;
use tracing::error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};
#[cfg(test)]
use {rstest as _, tempfile as _};

const USAGE_TEXT: &str = "\
Usage: tag-bridge-sim <command> [options]

Commands:
  run <scenario> [--log-level <level>] [--json]  Run a scenario to completion

Options:
  -l, --log-level <level>  Log filter, e.g. debug or tag_bridge=trace
                           (default: RUST_LOG, else warn)
      --json               Print the report as JSON
  -h, --help               Show this help message

Examples:
  tag-bridge-sim run scenario.json
  tag-bridge-sim run scenario.json --log-level debug
  tag-bridge-sim run scenario.json --json
";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Run(RunArgs),
}

#[derive(Debug, PartialEq, Eq)]
struct RunArgs {
    scenario: PathBuf,
    log_level: Option<String>,
    json: bool,
}

#[derive(Debug)]
enum ParseResult {
    Command(Command),
    Help,
}

fn parse_args(mut args: impl Iterator<Item = OsString>) -> Result<ParseResult, String> {
    let first = args.next().ok_or_else(|| "missing command".to_string())?;

    if first == "--help" || first == "-h" {
        return Ok(ParseResult::Help);
    }

    let command_str = first.to_string_lossy().to_string();

    match command_str.as_str() {
        "run" => parse_run_args(args)
            .map(Command::Run)
            .map(ParseResult::Command),
        other => Err(format!("unknown command: {other}")),
    }
}

#[allow(clippy::while_let_on_iterator)]
fn parse_run_args(mut args: impl Iterator<Item = OsString>) -> Result<RunArgs, String> {
    let mut scenario: Option<PathBuf> = None;
    let mut log_level: Option<String> = None;
    let mut json = false;

    while let Some(arg) = args.next() {
        if arg == "--help" || arg == "-h" {
            return Err(USAGE_TEXT.to_string());
        }

        if arg == "--json" {
            json = true;
            continue;
        }

        if arg == "-l" || arg == "--log-level" {
            let value = args
                .next()
                .ok_or_else(|| "missing value for --log-level".to_string())?;
            log_level = Some(value.to_string_lossy().to_string());
            continue;
        }

        if arg.to_string_lossy().starts_with('-') {
            return Err(format!("unknown option: {}", arg.to_string_lossy()));
        }

        if scenario.is_some() {
            return Err("multiple scenario paths provided".to_string());
        }
        scenario = Some(PathBuf::from(arg));
    }

    let scenario = scenario.ok_or_else(|| "missing scenario path".to_string())?;
    Ok(RunArgs {
        scenario,
        log_level,
        json,
    })
}

fn init_logging(level: Option<&str>) -> Result<(), String> {
    let filter = match level {
        Some(level) => {
            EnvFilter::try_new(level).map_err(|e| format!("invalid log level {level}: {e}"))?
        }
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| e.to_string())
}

fn run(args: &RunArgs) -> Result<(), i32> {
    if let Err(e) = init_logging(args.log_level.as_deref()) {
        eprintln!("error: {e}");
        return Err(1);
    }

    let scenario = match Scenario::load(&args.scenario) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return Err(1);
        }
    };

    let report = match simulate(&scenario) {
        Ok(r) => r,
        Err(e) => {
            error!(scenario = %args.scenario.display(), "simulation aborted");
            eprintln!("error: {e}");
            return Err(2);
        }
    };

    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("error: failed to encode report: {e}");
                return Err(1);
            }
        }
    } else {
        println!("Simulated {}", args.scenario.display());
        println!("{report}");
    }

    Ok(())
}

fn main() {
    let exit_code = match parse_args(env::args_os().skip(1)) {
        Ok(ParseResult::Help) => {
            println!("{USAGE_TEXT}");
            0
        }
        Ok(ParseResult::Command(Command::Run(args))) => match run(&args) {
            Ok(()) => 0,
            Err(code) => code,
        },
        Err(error) => {
            if error.starts_with("Usage:") {
                println!("{error}");
            } else {
                eprintln!("error: {error}");
                eprintln!("{USAGE_TEXT}");
            }
            1
        }
    };

    std::process::exit(exit_code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_command() {
        let result = parse_args(
            [
                OsString::from("run"),
                OsString::from("scenario.json"),
                OsString::from("--log-level"),
                OsString::from("debug"),
                OsString::from("--json"),
            ]
            .into_iter(),
        )
        .expect("valid run args should parse");

        let ParseResult::Command(Command::Run(args)) = result else {
            panic!("expected run command");
        };
        assert_eq!(
            args,
            RunArgs {
                scenario: PathBuf::from("scenario.json"),
                log_level: Some("debug".to_string()),
                json: true,
            }
        );
    }

    #[test]
    fn parses_short_log_flag() {
        let args = parse_run_args(
            [
                OsString::from("-l"),
                OsString::from("trace"),
                OsString::from("s.json"),
            ]
            .into_iter(),
        )
        .expect("short flag should parse");
        assert_eq!(args.log_level.as_deref(), Some("trace"));
        assert!(!args.json);
    }

    #[test]
    fn parses_help_flag() {
        let result = parse_args([OsString::from("-h")].into_iter())
            .expect("help should parse without error");
        assert!(matches!(result, ParseResult::Help));
    }

    #[test]
    fn rejects_unknown_command() {
        let error = parse_args([OsString::from("replay")].into_iter())
            .expect_err("unknown command should fail parse");
        assert!(error.contains("unknown command"));
    }

    #[test]
    fn run_requires_a_scenario() {
        let error = parse_run_args(std::iter::empty()).expect_err("missing scenario");
        assert!(error.contains("missing scenario"));
    }

    #[test]
    fn log_level_needs_a_value() {
        let error = parse_run_args([OsString::from("--log-level")].into_iter())
            .expect_err("missing value");
        assert!(error.contains("missing value"));
    }

    #[test]
    fn rejects_second_scenario() {
        let error = parse_run_args([OsString::from("a.json"), OsString::from("b.json")].into_iter())
            .expect_err("two scenarios");
        assert!(error.contains("multiple scenario"));
    }
}
