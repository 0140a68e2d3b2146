//! CLI entrypoint for the C11 threads conformance harness.

use std::path::PathBuf;

use c11threads_harness::contract_matrix::ContractMatrix;
use c11threads_harness::runner::{self, ConformanceRunner};
use c11threads_harness::scenarios::SCENARIOS;
use c11threads_harness::structured_log::LogEmitter;
use clap::{Parser, Subcommand};

const SUITE: &str = "c11threads";

/// Conformance tooling for the C11 threads facade.
#[derive(Debug, Parser)]
#[command(name = "c11threads-harness")]
#[command(about = "Conformance harness for the C11 threads facade")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run conformance scenarios against the live ABI.
    Run {
        /// Structured JSONL log path.
        #[arg(long, default_value = "target/conformance/c11threads.log.jsonl")]
        log: PathBuf,
        /// Optional artifact index JSON path covering the log.
        #[arg(long)]
        artifact_index: Option<PathBuf>,
        /// Run only the named scenarios (repeatable).
        #[arg(long)]
        only: Vec<String>,
        /// Run identifier embedded in trace ids.
        #[arg(long, default_value = "local")]
        run_id: String,
    },
    /// List scenario names.
    List,
    /// Validate a structured JSONL log.
    ValidateLog {
        #[arg(long)]
        log: PathBuf,
    },
    /// Emit the mutex transition contract as JSON.
    ContractMatrix {
        /// Output JSON path (if omitted, prints to stdout).
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            log,
            artifact_index,
            only,
            run_id,
        } => {
            if let Some(parent) = log.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            let mut emitter = LogEmitter::to_file(&log, SUITE, &run_id)?;
            let summary = ConformanceRunner::new(SUITE, &run_id)
                .with_only(only)
                .run(&mut emitter)?;
            drop(emitter);

            for report in &summary.reports {
                match &report.message {
                    None => eprintln!("PASS {} ({} ms)", report.name, report.duration_ms),
                    Some(msg) => eprintln!("FAIL {}: {msg}", report.name),
                }
            }
            eprintln!(
                "{}/{} passed, timedlock strategy {}",
                summary.passed, summary.total, summary.timedlock_strategy
            );
            eprintln!("Wrote log to {}", log.display());

            if let Some(index_path) = artifact_index {
                runner::write_artifact_index(
                    &index_path,
                    &run_id,
                    SUITE,
                    &[(log.as_path(), "log")],
                )?;
                eprintln!("Wrote artifact index to {}", index_path.display());
            }
            if !summary.is_success() {
                return Err(format!("{} scenario(s) failed", summary.failed).into());
            }
        }
        Command::List => {
            for s in SCENARIOS {
                println!("{:<36} {:<8} {}", s.name, s.api_family.as_str(), s.description);
            }
        }
        Command::ValidateLog { log } => {
            let lines = runner::validate_log(&log)?;
            eprintln!("{}: {lines} valid line(s)", log.display());
        }
        Command::ContractMatrix { output } => {
            let json = ContractMatrix::build().to_json()?;
            if let Some(path) = output {
                std::fs::write(&path, json)?;
                eprintln!("Wrote contract matrix to {}", path.display());
            } else {
                println!("{json}");
            }
        }
    }

    Ok(())
}
