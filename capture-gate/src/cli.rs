use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use capture_gate_log::{LogConfig, LogFormat, LogLevel};
use capture_gate_triggers::{ConfigError, GateConfig};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;

use crate::scenario::{self, Scenario};

/// Replays capture gate scenarios and validates trigger configuration.
#[derive(Debug, Parser)]
#[command(verbatim_doc_comment, version)]
pub struct Cli {
    /// The log level of the capture gate crates.
    #[arg(long, global = true, default_value = "info")]
    log_level: LogLevel,

    /// The log output format: auto, pretty, simplified or json.
    #[arg(long, global = true, default_value = "auto")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replays a scenario and prints a status report for every check.
    Simulate(SimulateArgs),
    /// Parses a remote configuration and reports every problem in it.
    Validate(ValidateArgs),
}

#[derive(Debug, Args)]
struct SimulateArgs {
    /// Path to the scenario file, in YAML or JSON.
    scenario: PathBuf,

    /// Loads persisted decisions from this JSON file and saves them back after the run.
    ///
    /// Consecutive runs sharing a state file behave like reloads of the same page.
    #[arg(short, long)]
    state: Option<PathBuf>,

    /// Pretty print the output JSON.
    #[arg(long)]
    pretty: bool,
}

#[derive(Debug, Args)]
struct ValidateArgs {
    /// Path to the remote configuration JSON file.
    config: PathBuf,
}

impl Cli {
    /// Returns the logging configuration requested on the command line.
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.log_level,
            format: self.log_format,
            ..Default::default()
        }
    }

    /// Runs the command, writing its output to stdout.
    pub fn run(self) -> Result<()> {
        self.run_with(&mut io::stdout().lock())
    }

    fn run_with(self, out: &mut impl Write) -> Result<()> {
        match self.command {
            Command::Simulate(args) => simulate(args, out),
            Command::Validate(args) => validate(args, out),
        }
    }
}

fn load_state(path: &Path) -> Result<BTreeMap<String, Value>> {
    if !path.exists() {
        capture_gate_log::debug!(path = %path.display(), "starting with empty state");
        return Ok(BTreeMap::new());
    }

    let json = fs::read_to_string(path).context("failed to read state file")?;
    serde_json::from_str(&json).context("failed to parse state file")
}

fn simulate(args: SimulateArgs, out: &mut impl Write) -> Result<()> {
    let yaml = fs::read_to_string(&args.scenario).context("failed to read scenario")?;
    let scenario = Scenario::from_yaml(&yaml).context("failed to parse scenario")?;

    let state = match args.state {
        Some(ref path) => load_state(path)?,
        None => BTreeMap::new(),
    };

    let (results, state) = scenario::replay(&scenario, state);

    for result in &results {
        if args.pretty {
            serde_json::to_writer_pretty(&mut *out, result)?;
        } else {
            serde_json::to_writer(&mut *out, result)?;
        }
        writeln!(out)?;
    }

    if let Some(ref path) = args.state {
        let json = serde_json::to_string_pretty(&state)?;
        fs::write(path, json).context("failed to write state file")?;
    }

    Ok(())
}

fn validate(args: ValidateArgs, out: &mut impl Write) -> Result<()> {
    let json = fs::read_to_string(&args.config).context("failed to read configuration")?;
    let config = GateConfig::from_json(&json)?;

    let problems = config.validate();
    if problems.is_empty() {
        writeln!(out, "configuration is valid")?;
        return Ok(());
    }

    for problem in &problems {
        writeln!(out, "{}", capture_gate_log::LogError(problem))?;
    }

    let invalid = problems
        .iter()
        .filter(|problem| matches!(problem, ConfigError::InvalidPattern(_)))
        .count();

    if invalid > 0 {
        bail!("{invalid} url pattern(s) failed to compile");
    }

    Ok(())
}
