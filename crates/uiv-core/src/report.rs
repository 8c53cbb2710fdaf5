//! Check results and run reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::UivError;

/// Note appended to a report when the caller cancels the run
pub const CANCELLED_NOTE: &str = "execution was cancelled";

/// Outcome of one check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    /// Observed state matched the expectation
    Passed,
    /// Page was observed and disagreed
    Failed,
    /// Page could not be observed (timeout, driver error, lost session)
    Error,
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckStatus::Passed => write!(f, "passed"),
            CheckStatus::Failed => write!(f, "failed"),
            CheckStatus::Error => write!(f, "error"),
        }
    }
}

/// Result of executing one check; immutable once built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    name: String,
    status: CheckStatus,
    detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    artifact_path: Option<PathBuf>,
    #[serde(default)]
    duration_ms: u64,
}

impl CheckResult {
    pub fn passed(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::with_status(name, CheckStatus::Passed, detail)
    }

    pub fn failed(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::with_status(name, CheckStatus::Failed, detail)
    }

    pub fn error(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::with_status(name, CheckStatus::Error, detail)
    }

    /// Downgrade an error into a result: observation failures become
    /// `failed`, everything else `error`.
    pub fn from_error(name: impl Into<String>, err: &UivError) -> Self {
        let status = if err.is_failure() {
            CheckStatus::Failed
        } else {
            CheckStatus::Error
        };
        let detail = match err {
            UivError::NotFound(_) => "element not found".to_string(),
            other => other.to_string(),
        };
        Self::with_status(name, status, detail)
    }

    fn with_status(name: impl Into<String>, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            detail: detail.into(),
            artifact_path: None,
            duration_ms: 0,
        }
    }

    /// Attach the screenshot taken for this check
    pub fn with_artifact(mut self, path: PathBuf) -> Self {
        self.artifact_path = Some(path);
        self
    }

    pub fn with_duration(mut self, elapsed: Duration) -> Self {
        self.duration_ms = elapsed.as_millis() as u64;
        self
    }

    /// Same result under another name (nested checks report under their parent)
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Prefix the detail, keeping status and artifact
    pub fn prefixed(mut self, prefix: &str) -> Self {
        self.detail = format!("{}{}", prefix, self.detail);
        self
    }

    /// Append text to the detail
    pub fn annotated(mut self, note: &str) -> Self {
        self.detail.push_str(note);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> CheckStatus {
        self.status
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn artifact_path(&self) -> Option<&Path> {
        self.artifact_path.as_deref()
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn is_passed(&self) -> bool {
        self.status == CheckStatus::Passed
    }
}

/// Overall run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Passed,
    Failed,
}

/// Finalized outcome of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    target_url: String,
    status: RunStatus,
    started_at: DateTime<Utc>,
    duration_ms: u64,
    cancelled: bool,
    results: Vec<CheckResult>,
    #[serde(default)]
    notes: Vec<String>,
    #[serde(default)]
    artifacts: Vec<PathBuf>,
}

impl RunReport {
    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn passed(&self) -> bool {
        self.status == RunStatus::Passed
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn results(&self) -> &[CheckResult] {
        &self.results
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    /// Run-level captures (per-check screenshots live on their results)
    pub fn artifacts(&self) -> &[PathBuf] {
        &self.artifacts
    }

    /// Number of results with the given status
    pub fn count(&self, status: CheckStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    /// One-line human summary
    pub fn summary(&self) -> String {
        let passed = self.count(CheckStatus::Passed);
        let mut line = format!(
            "{}/{} checks passed against {} in {:.2}s",
            passed,
            self.results.len(),
            self.target_url,
            self.duration_ms as f64 / 1000.0
        );
        if self.cancelled {
            line.push_str(" (cancelled)");
        }
        line
    }
}

/// Append-only builder owned by the running check loop
#[derive(Debug)]
pub struct ReportBuilder {
    target_url: String,
    started_at: DateTime<Utc>,
    clock: std::time::Instant,
    results: Vec<CheckResult>,
    notes: Vec<String>,
    artifacts: Vec<PathBuf>,
    cancelled: bool,
}

impl ReportBuilder {
    pub fn new(target_url: impl Into<String>) -> Self {
        Self {
            target_url: target_url.into(),
            started_at: Utc::now(),
            clock: std::time::Instant::now(),
            results: Vec::new(),
            notes: Vec::new(),
            artifacts: Vec::new(),
            cancelled: false,
        }
    }

    pub fn push(&mut self, result: CheckResult) {
        self.results.push(result);
    }

    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    pub fn artifact(&mut self, path: PathBuf) {
        self.artifacts.push(path);
    }

    pub fn mark_cancelled(&mut self) {
        if !self.cancelled {
            self.cancelled = true;
            self.notes.push(CANCELLED_NOTE.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Freeze into a report. Passed iff not cancelled and every result passed;
    /// an empty, uncancelled run passes vacuously.
    pub fn finish(self) -> RunReport {
        let all_passed = self.results.iter().all(CheckResult::is_passed);
        let status = if all_passed && !self.cancelled {
            RunStatus::Passed
        } else {
            RunStatus::Failed
        };
        RunReport {
            target_url: self.target_url,
            status,
            started_at: self.started_at,
            duration_ms: self.clock.elapsed().as_millis() as u64,
            cancelled: self.cancelled,
            results: self.results,
            notes: self.notes,
            artifacts: self.artifacts,
        }
    }
}
