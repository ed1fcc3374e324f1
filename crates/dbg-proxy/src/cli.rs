use clap::{Parser, Subcommand};
use itertools::Itertools;
use miette::IntoDiagnostic;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing::info;

use crate::replay::{Replay, Scenario, Step};

#[derive(Parser, Debug)]
#[command(name = "dbg-proxy")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(after_help = "# Examples:\n\n\
    ## To replay a scenario and print every event as JSON:\n\
    dbg-proxy replay session.toml\n\n\
    ## To validate a scenario:\n\
    dbg-proxy check session.toml")]
#[command(
    about = "Replays scripted debug sessions through the breakpoint and session proxy.",
    long_about = None
)]
pub struct Cli {
    #[clap(subcommand)]
    commands: Commands,

    /// Log proxy activity at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a scenario and print each bus event as a JSON line
    Replay {
        #[arg(value_name = "SCENARIO")]
        scenario: PathBuf,
    },
    /// Parse and validate a scenario without running it
    Check {
        #[arg(value_name = "SCENARIO")]
        scenario: PathBuf,
    },
}

impl Cli {
    pub fn run(&self) -> miette::Result<()> {
        crate::log::init(self.verbose);

        match &self.commands {
            Commands::Replay { scenario } => {
                let scenario = Scenario::load(scenario)?;
                let records = Replay::new(&scenario).run()?;
                info!(records = records.len(), "Replay finished");

                let stdout = io::stdout();
                let mut writer = BufWriter::new(stdout.lock());
                for record in &records {
                    serde_json::to_writer(&mut writer, record).into_diagnostic()?;
                    writeln!(writer).into_diagnostic()?;
                }
                writer.flush().into_diagnostic()
            }
            Commands::Check { scenario: path } => {
                let scenario = Scenario::load(path)?;
                let sessions = scenario
                    .steps
                    .iter()
                    .filter(|step| matches!(step, Step::Start))
                    .count();
                println!(
                    "{}: {} breakpoints, {} steps, {} sessions ({})",
                    path.display(),
                    scenario.breakpoints.len(),
                    scenario.steps.len(),
                    sessions,
                    scenario
                        .breakpoints
                        .iter()
                        .map(|bp| crate::Breakpoint::from(bp).to_string())
                        .join(", ")
                );
                Ok(())
            }
        }
    }
}
