//! Scenario runner and evidence writer.

use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use c11threads_abi::observe;
use c11threads_core::ApiFamily;
use c11threads_core::config::TIMEDLOCK_STRATEGY;
use serde::Serialize;
use thiserror::Error;

use crate::scenarios::{SCENARIOS, Scenario, find};
use crate::structured_log::{ArtifactIndex, LogEmitter, LogEntry, LogLevel, Outcome, StreamKind};

/// Scenarios share process-wide counters and statics; run one at a time.
static SCENARIO_LOCK: Mutex<()> = Mutex::new(());

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown scenario: {0}")]
    UnknownScenario(String),
    #[error("{path}: {count} invalid log line(s), first: {first}")]
    InvalidLog {
        path: String,
        count: usize,
        first: String,
    },
}

/// Result of one scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: &'static str,
    pub api_family: &'static str,
    pub symbol: &'static str,
    pub outcome: Outcome,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Aggregate result of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub timedlock_strategy: &'static str,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub reports: Vec<ScenarioReport>,
}

impl RunSummary {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Runs a selection of scenarios, logging each result.
#[derive(Debug, Clone)]
pub struct ConformanceRunner {
    pub suite: String,
    pub run_id: String,
    pub only: Vec<String>,
}

impl ConformanceRunner {
    #[must_use]
    pub fn new(suite: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            suite: suite.into(),
            run_id: run_id.into(),
            only: Vec::new(),
        }
    }

    /// Restrict the run to the named scenarios.
    #[must_use]
    pub fn with_only(mut self, names: Vec<String>) -> Self {
        self.only = names;
        self
    }

    fn selected(&self) -> Result<Vec<&'static Scenario>, HarnessError> {
        if self.only.is_empty() {
            return Ok(SCENARIOS.iter().collect());
        }
        self.only
            .iter()
            .map(|name| find(name).ok_or_else(|| HarnessError::UnknownScenario(name.clone())))
            .collect()
    }

    pub fn run(&self, log: &mut LogEmitter) -> Result<RunSummary, HarnessError> {
        let scenarios = self.selected()?;
        let _serial = SCENARIO_LOCK
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        log.emit_entry(
            LogEntry::new("", LogLevel::Info, "run_start")
                .with_stream(StreamKind::Conformance)
                .with_details(serde_json::json!({
                    "run_id": self.run_id,
                    "scenarios": scenarios.len(),
                    "timedlock_strategy": TIMEDLOCK_STRATEGY.as_str(),
                })),
        )?;

        let mut reports = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            let report = run_one(scenario);
            let level = if report.outcome == Outcome::Pass {
                LogLevel::Info
            } else {
                LogLevel::Error
            };
            let mut entry = LogEntry::new("", level, "scenario_result")
                .with_stream(StreamKind::Conformance)
                .with_api(report.api_family, report.symbol)
                .with_outcome(report.outcome)
                .with_duration_ms(report.duration_ms)
                .with_details(serde_json::json!({ "scenario": report.name }));
            if let Some(message) = &report.message {
                entry = entry.with_details(serde_json::json!({
                    "scenario": report.name,
                    "message": message,
                }));
            }
            log.emit_entry(entry)?;
            reports.push(report);
        }

        let passed = reports.iter().filter(|r| r.outcome == Outcome::Pass).count();
        let summary = RunSummary {
            run_id: self.run_id.clone(),
            timedlock_strategy: TIMEDLOCK_STRATEGY.as_str(),
            total: reports.len(),
            passed,
            failed: reports.len() - passed,
            reports,
        };

        let counters: serde_json::Map<String, serde_json::Value> = ApiFamily::ALL
            .iter()
            .map(|family| {
                let snap = observe::snapshot(*family);
                (
                    family.as_str().to_string(),
                    serde_json::json!({
                        "calls": snap.calls,
                        "busy": snap.busy,
                        "errors": snap.errors,
                    }),
                )
            })
            .collect();
        let end_level = if summary.is_success() {
            LogLevel::Info
        } else {
            LogLevel::Error
        };
        log.emit_entry(
            LogEntry::new("", end_level, "run_end")
                .with_stream(StreamKind::Conformance)
                .with_outcome(if summary.is_success() {
                    Outcome::Pass
                } else {
                    Outcome::Fail
                })
                .with_details(serde_json::json!({
                    "total": summary.total,
                    "passed": summary.passed,
                    "failed": summary.failed,
                    "counters": counters,
                    "poll_retries": observe::poll_retries(),
                })),
        )?;
        log.flush()?;
        Ok(summary)
    }
}

fn run_one(scenario: &'static Scenario) -> ScenarioReport {
    let t0 = Instant::now();
    let result = (scenario.check)();
    let duration_ms = u64::try_from(t0.elapsed().as_millis()).unwrap_or(u64::MAX);
    let (outcome, message) = match result {
        Ok(()) => (Outcome::Pass, None),
        Err(message) => (Outcome::Fail, Some(message)),
    };
    ScenarioReport {
        name: scenario.name,
        api_family: scenario.api_family.as_str(),
        symbol: scenario.symbol,
        outcome,
        duration_ms,
        message,
    }
}

fn hex_lower(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

/// Lowercase hex SHA-256 of a file's contents.
pub fn sha256_file(path: &Path) -> Result<String, HarnessError> {
    use sha2::Digest;
    let data = std::fs::read(path)?;
    Ok(hex_lower(&sha2::Sha256::digest(&data)))
}

/// Write an artifact index covering `artifacts` (path, kind) to `output`.
pub fn write_artifact_index(
    output: &Path,
    run_id: &str,
    suite: &str,
    artifacts: &[(&Path, &str)],
) -> Result<ArtifactIndex, HarnessError> {
    let mut index = ArtifactIndex::new(run_id, suite);
    for (path, kind) in artifacts {
        let size = std::fs::metadata(path)?.len();
        index
            .add(path.display().to_string(), *kind, sha256_file(path)?)
            .describe_last(size, format!("{kind} for run {run_id}"));
    }
    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, index.to_json()?)?;
    Ok(index)
}

/// Validate a JSONL log, failing on the first batch of schema violations.
pub fn validate_log(path: &Path) -> Result<usize, HarnessError> {
    let (lines, errors) = crate::structured_log::validate_log_file(path)?;
    match errors.first() {
        None => Ok(lines),
        Some(first) => Err(HarnessError::InvalidLog {
            path: path.display().to_string(),
            count: errors.len(),
            first: first.to_string(),
        }),
    }
}
