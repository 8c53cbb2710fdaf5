//! Verification runner
//!
//! Drives one target page through an ordered list of checks inside one
//! browser session and produces one [`RunReport`].
//!
//! A run moves through `NotStarted → Navigated → Checking* → Reporting →
//! Closed`. A failing check never aborts the checks after it; only a lost
//! session or cancellation stops the loop early. The session is held in a
//! [`SessionGuard`], so it is closed on every exit path.

use crate::artifact::ArtifactStore;
use crate::driver::{PageDriver, SessionLauncher};
use crate::screenshot::{capture, capture_spec};
use crate::verification::evaluate;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uiv_core::{
    validate_target_url, CaptureSpec, CheckResult, CheckSpec, CheckStatus, ReportBuilder, Result,
    RunReport, RunnerSettings, Suite, UivError,
};

/// Detail recorded for checks skipped after the session is lost
pub const SESSION_UNAVAILABLE: &str = "session unavailable";

/// Lifecycle of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum RunPhase {
    #[default]
    NotStarted,
    Navigated,
    Checking,
    Reporting,
    Closed,
}

impl RunPhase {
    /// Forward-only transitions; `Checking` may repeat, `Closed` is terminal
    pub fn can_advance(self, next: RunPhase) -> bool {
        match self {
            RunPhase::Closed => next == RunPhase::Closed,
            RunPhase::Checking => next >= RunPhase::Checking,
            current => next > current,
        }
    }

    /// Move to `next` if allowed; returns whether the phase changed or repeated
    pub fn advance(&mut self, next: RunPhase) -> bool {
        if self.can_advance(next) {
            if *self != next {
                debug!("Run phase {:?} -> {:?}", self, next);
            }
            *self = next;
            true
        } else {
            warn!("Ignoring run phase regression {:?} -> {:?}", self, next);
            false
        }
    }
}

/// Owns the page driver for a run and closes it on drop
pub struct SessionGuard {
    driver: Box<dyn PageDriver>,
    closed: bool,
}

impl SessionGuard {
    pub fn new(driver: Box<dyn PageDriver>) -> Self {
        Self {
            driver,
            closed: false,
        }
    }

    /// Close the session; later calls are no-ops
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.driver.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Deref for SessionGuard {
    type Target = dyn PageDriver;

    fn deref(&self) -> &Self::Target {
        self.driver.as_ref()
    }
}

impl DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.driver.as_mut()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.close();
    }
}

/// Validated input to a run
#[derive(Debug, Clone)]
pub struct RunPlan {
    target_url: String,
    checks: Vec<CheckSpec>,
    captures: Vec<CaptureSpec>,
    artifact_dir: PathBuf,
}

impl RunPlan {
    /// Validate everything up front so a bad plan never launches a browser
    pub fn new(
        target_url: impl Into<String>,
        checks: Vec<CheckSpec>,
        artifact_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let target_url = target_url.into();
        validate_target_url(&target_url)?;

        let mut names = std::collections::HashSet::new();
        for check in &checks {
            check.validate()?;
            if !names.insert(check.name()) {
                return Err(UivError::config(check.name(), "duplicate check name"));
            }
            if let Some(file) = &check.options().screenshot {
                ArtifactStore::validate_name(file)?;
            }
        }

        Ok(Self {
            target_url,
            checks,
            captures: Vec::new(),
            artifact_dir: artifact_dir.into(),
        })
    }

    /// Add run-level screenshots taken after the checks
    pub fn with_captures(mut self, captures: Vec<CaptureSpec>) -> Result<Self> {
        for capture in &captures {
            ArtifactStore::validate_name(&capture.file_name)?;
        }
        self.captures = captures;
        Ok(self)
    }

    /// Build a plan from a suite, with optional command-line overrides
    pub fn from_suite(
        suite: &Suite,
        target_override: Option<&str>,
        artifact_override: Option<&Path>,
    ) -> Result<Self> {
        let target = target_override
            .map(str::to_string)
            .or_else(|| suite.target_url.clone())
            .ok_or_else(|| UivError::config("target_url", "no target URL in suite or arguments"))?;
        let artifact_dir = artifact_override
            .map(Path::to_path_buf)
            .unwrap_or_else(|| suite.artifact_dir.clone());

        Self::new(target, suite.check_specs()?, artifact_dir)?.with_captures(suite.capture_specs()?)
    }

    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    pub fn checks(&self) -> &[CheckSpec] {
        &self.checks
    }

    pub fn captures(&self) -> &[CaptureSpec] {
        &self.captures
    }

    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }

    /// Same plan against another target, writing to another directory
    pub fn retarget(&self, target_url: &str, artifact_dir: impl Into<PathBuf>) -> Result<Self> {
        validate_target_url(target_url)?;
        Ok(Self {
            target_url: target_url.to_string(),
            artifact_dir: artifact_dir.into(),
            ..self.clone()
        })
    }
}

/// Executes run plans; holds no state between runs
pub struct Runner<L> {
    launcher: L,
    settings: RunnerSettings,
}

impl<L: SessionLauncher> Runner<L> {
    pub fn new(launcher: L, settings: RunnerSettings) -> Self {
        Self { launcher, settings }
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    /// Run `plan` in a fresh session.
    ///
    /// Only setup failures (artifact directory) are returned as `Err`; every
    /// page-side problem ends up in the report. Cancelling `cancel` stops the
    /// run at the next suspension point and returns the partial report.
    #[instrument(skip_all, fields(target = %plan.target_url()))]
    pub async fn run(&self, plan: &RunPlan, cancel: &CancellationToken) -> Result<RunReport> {
        let store = ArtifactStore::new(plan.artifact_dir());
        store.ensure_dir().await?;

        let mut phase = RunPhase::default();
        let mut report = ReportBuilder::new(plan.target_url());
        info!("Starting run with {} check(s)", plan.checks().len());

        let launched = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            launched = self.launcher.launch() => Some(launched),
        };
        let driver = match launched {
            None => {
                report.mark_cancelled();
                return Ok(finish(report, &mut phase));
            }
            Some(Err(e)) => {
                warn!("Could not open browser session: {}", e);
                let detail = format!("{}: {}", SESSION_UNAVAILABLE, e);
                for check in plan.checks() {
                    report.push(CheckResult::error(check.name(), detail.clone()));
                }
                return Ok(finish(report, &mut phase));
            }
            Some(Ok(driver)) => driver,
        };
        let mut session = SessionGuard::new(driver);

        let deadline = self.settings.check_deadline();
        let navigated = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            nav = tokio::time::timeout(deadline, session.navigate(plan.target_url())) => Some(nav),
        };
        let navigation_error = match navigated {
            None => {
                report.mark_cancelled();
                session.close();
                return Ok(finish(report, &mut phase));
            }
            Some(Ok(Ok(()))) => None,
            Some(Ok(Err(e))) => Some(e.to_string()),
            Some(Err(_)) => Some(
                UivError::Timeout {
                    what: format!("navigation to {}", plan.target_url()),
                    waited_ms: deadline.as_millis() as u64,
                }
                .to_string(),
            ),
        };
        if let Some(error) = navigation_error {
            warn!("Navigation failed: {}", error);
            for check in plan.checks() {
                report.push(CheckResult::error(
                    check.name(),
                    format!("navigation failed: {}", error),
                ));
            }
            session.close();
            return Ok(finish(report, &mut phase));
        }
        phase.advance(RunPhase::Navigated);

        let mut session_alive = true;
        for (index, spec) in plan.checks().iter().enumerate() {
            if cancel.is_cancelled() {
                report.mark_cancelled();
                break;
            }
            phase.advance(RunPhase::Checking);

            let Some(result) = self.run_check(&mut session, spec, cancel).await else {
                report.mark_cancelled();
                break;
            };

            if result.status() == CheckStatus::Error && !probe(&mut session).await {
                session_alive = false;
            }

            let result = if session_alive {
                self.attach_screenshot(&mut session, &store, spec, result, &mut report)
                    .await
            } else {
                result
            };
            log_result(&result);
            report.push(result);

            if !session_alive {
                warn!("Session lost, skipping {} remaining check(s)", plan.checks().len() - index - 1);
                for rest in &plan.checks()[index + 1..] {
                    report.push(CheckResult::error(rest.name(), SESSION_UNAVAILABLE));
                }
                break;
            }
        }

        phase.advance(RunPhase::Reporting);
        if session_alive && !cancel.is_cancelled() {
            for spec in plan.captures() {
                let captured = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    c = tokio::time::timeout(deadline, capture_spec(&mut *session, &store, spec)) => Some(c),
                };
                match captured {
                    None => {
                        report.mark_cancelled();
                        break;
                    }
                    Some(Ok(Ok(capture))) => {
                        if let Some(warning) = capture.warning {
                            report.note(warning);
                        }
                        report.artifact(capture.path);
                    }
                    Some(Ok(Err(e))) => {
                        report.note(format!("screenshot {} failed: {}", spec.file_name, e))
                    }
                    Some(Err(_)) => report.note(format!(
                        "screenshot {} timed out after {}ms",
                        spec.file_name,
                        deadline.as_millis()
                    )),
                }
            }
        }

        session.close();
        Ok(finish(report, &mut phase))
    }

    /// One check under the deadline; `None` when cancelled
    async fn run_check(
        &self,
        session: &mut SessionGuard,
        spec: &CheckSpec,
        cancel: &CancellationToken,
    ) -> Option<CheckResult> {
        let started = Instant::now();
        let deadline = self.settings.check_deadline();
        debug!("Running check {}", spec);

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            outcome = tokio::time::timeout(deadline, evaluate(&mut **session, spec, &self.settings)) => outcome,
        };

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => CheckResult::from_error(spec.name(), &e),
            Err(_) => CheckResult::error(spec.name(), timeout_detail(spec, deadline)),
        };
        Some(result.with_duration(started.elapsed()))
    }

    async fn attach_screenshot(
        &self,
        session: &mut SessionGuard,
        store: &ArtifactStore,
        spec: &CheckSpec,
        result: CheckResult,
        report: &mut ReportBuilder,
    ) -> CheckResult {
        let Some(file_name) = &spec.options().screenshot else {
            return result;
        };
        let deadline = self.settings.check_deadline();
        match tokio::time::timeout(
            deadline,
            capture(&mut **session, store, Some(spec.locator()), file_name),
        )
        .await
        {
            Ok(Ok(capture)) => {
                if let Some(warning) = capture.warning {
                    report.note(warning);
                }
                result.with_artifact(capture.path)
            }
            Ok(Err(e)) => {
                report.note(format!("screenshot for '{}' failed: {}", spec.name(), e));
                result
            }
            Err(_) => {
                report.note(format!(
                    "screenshot for '{}' timed out after {}ms",
                    spec.name(),
                    deadline.as_millis()
                ));
                result
            }
        }
    }
}

async fn probe(session: &mut SessionGuard) -> bool {
    let alive = session.is_alive().await;
    if !alive {
        warn!("Browser session is no longer usable");
    }
    alive
}

fn timeout_detail(spec: &CheckSpec, deadline: Duration) -> String {
    UivError::Timeout {
        what: format!("check '{}'", spec.name()),
        waited_ms: deadline.as_millis() as u64,
    }
    .to_string()
}

fn log_result(result: &CheckResult) {
    match result.status() {
        CheckStatus::Passed => info!("{}: {}", result.name(), result.detail()),
        CheckStatus::Failed | CheckStatus::Error => {
            warn!("{} {}: {}", result.status(), result.name(), result.detail())
        }
    }
}

fn finish(report: ReportBuilder, phase: &mut RunPhase) -> RunReport {
    phase.advance(RunPhase::Reporting);
    phase.advance(RunPhase::Closed);
    let report = report.finish();
    info!("{}", report.summary());
    report
}
