//! End-to-end runner behaviour against an in-memory page

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use uiv_browser::{
    BoundingBox, ElementSnapshot, PageDriver, RunPlan, Runner, SessionLauncher,
    SESSION_UNAVAILABLE,
};
use uiv_core::{
    CaptureSpec, CheckSpec, CheckStatus, Locator, RunStatus, RunnerSettings, Suite, UivError,
    CANCELLED_NOTE,
};

const TARGET: &str = "http://localhost:4173";

#[derive(Debug, Clone, Default)]
struct FakeElement {
    role: String,
    name: String,
    /// Selectors this element answers to
    selectors: Vec<String>,
    attributes: BTreeMap<String, String>,
    text: String,
    visible: bool,
    parent: Option<usize>,
    /// Replacement applied to this element when clicked
    on_click: Option<Box<FakeElement>>,
}

impl FakeElement {
    fn new(role: &str, name: &str) -> Self {
        Self {
            role: role.to_string(),
            name: name.to_string(),
            text: name.to_string(),
            visible: true,
            ..Default::default()
        }
    }

    fn css(mut self, selector: &str) -> Self {
        self.selectors.push(selector.to_string());
        self
    }

    fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    fn child_of(mut self, parent: usize) -> Self {
        self.parent = Some(parent);
        self
    }

    fn toggles_to(mut self, next: FakeElement) -> Self {
        self.on_click = Some(Box::new(next));
        self
    }
}

#[derive(Default)]
struct Counters {
    launches: AtomicUsize,
    closes: AtomicUsize,
    navigations: AtomicUsize,
}

#[derive(Clone, Default)]
struct Behaviour {
    fail_launch: bool,
    fail_navigation: bool,
    /// Queries for this selector never return
    hang_on: Option<String>,
    /// Querying this selector kills the session
    crash_on: Option<String>,
}

struct FakePage {
    elements: Vec<FakeElement>,
    behaviour: Behaviour,
    counters: Arc<Counters>,
    dead: bool,
    closed: bool,
}

impl FakePage {
    fn matches_selector(&self, locator: &Locator, selector: &str) -> bool {
        match locator {
            Locator::Css { selector: s } => s == selector,
            Locator::Within { parent, child } => {
                self.matches_selector(parent, selector) || self.matches_selector(child, selector)
            }
            Locator::Role { .. } => false,
        }
    }

    fn is_inside(&self, index: usize, ancestor: usize) -> bool {
        let mut current = self.elements[index].parent;
        while let Some(p) = current {
            if p == ancestor {
                return true;
            }
            current = self.elements[p].parent;
        }
        false
    }

    fn resolve(&self, locator: &Locator) -> Vec<usize> {
        match locator {
            Locator::Role { role, name, exact } => (0..self.elements.len())
                .filter(|&i| {
                    let el = &self.elements[i];
                    el.role == *role
                        && match name {
                            None => true,
                            Some(n) if *exact => el.name == *n,
                            Some(n) => el.name.to_lowercase().contains(&n.to_lowercase()),
                        }
                })
                .collect(),
            Locator::Css { selector } => (0..self.elements.len())
                .filter(|&i| self.elements[i].selectors.contains(selector))
                .collect(),
            Locator::Within { parent, child } => match self.resolve(parent).first() {
                Some(&scope) => self
                    .resolve(child)
                    .into_iter()
                    .filter(|&i| self.is_inside(i, scope))
                    .collect(),
                None => Vec::new(),
            },
        }
    }

    fn ensure_alive(&self) -> uiv_core::Result<()> {
        if self.dead || self.closed {
            Err(UivError::SessionUnavailable("target closed".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn navigate(&mut self, _url: &str) -> uiv_core::Result<()> {
        self.ensure_alive()?;
        self.counters.navigations.fetch_add(1, Ordering::SeqCst);
        if self.behaviour.fail_navigation {
            return Err(UivError::Browser("net::ERR_CONNECTION_REFUSED".to_string()));
        }
        Ok(())
    }

    async fn query(
        &mut self,
        locator: &Locator,
        attributes: &[String],
    ) -> uiv_core::Result<Vec<ElementSnapshot>> {
        self.ensure_alive()?;
        if let Some(selector) = self.behaviour.crash_on.clone() {
            if self.matches_selector(locator, &selector) {
                self.dead = true;
                return Err(UivError::Browser("Target closed".to_string()));
            }
        }
        if let Some(selector) = self.behaviour.hang_on.clone() {
            if self.matches_selector(locator, &selector) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }

        Ok(self
            .resolve(locator)
            .into_iter()
            .map(|i| {
                let el = &self.elements[i];
                ElementSnapshot {
                    visible: el.visible,
                    text: el.text.clone(),
                    attributes: attributes
                        .iter()
                        .map(|a| (a.clone(), el.attributes.get(a).cloned()))
                        .collect(),
                    bounds: Some(BoundingBox {
                        x: 0.0,
                        y: 20.0 * i as f64,
                        width: 100.0,
                        height: 20.0,
                    }),
                }
            })
            .collect())
    }

    async fn click(&mut self, locator: &Locator, index: usize) -> uiv_core::Result<()> {
        self.ensure_alive()?;
        let Some(&target) = self.resolve(locator).get(index) else {
            return Err(UivError::NotFound(locator.to_string()));
        };
        if let Some(next) = self.elements[target].on_click.take() {
            let parent = self.elements[target].parent;
            self.elements[target] = FakeElement { parent, ..*next };
        }
        Ok(())
    }

    async fn screenshot(&mut self, _clip: Option<BoundingBox>) -> uiv_core::Result<Vec<u8>> {
        self.ensure_alive()?;
        Ok(b"\x89PNG\r\n\x1a\n".to_vec())
    }

    async fn is_alive(&mut self) -> bool {
        !self.dead && !self.closed
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

struct FakeLauncher {
    elements: Vec<FakeElement>,
    behaviour: Behaviour,
    counters: Arc<Counters>,
}

impl FakeLauncher {
    fn new(elements: Vec<FakeElement>) -> Self {
        Self {
            elements,
            behaviour: Behaviour::default(),
            counters: Arc::new(Counters::default()),
        }
    }

    fn with(mut self, behaviour: Behaviour) -> Self {
        self.behaviour = behaviour;
        self
    }
}

#[async_trait]
impl SessionLauncher for FakeLauncher {
    async fn launch(&self) -> uiv_core::Result<Box<dyn PageDriver>> {
        self.counters.launches.fetch_add(1, Ordering::SeqCst);
        if self.behaviour.fail_launch {
            return Err(UivError::Browser("Could not auto detect a chrome executable".to_string()));
        }
        Ok(Box::new(FakePage {
            elements: self.elements.clone(),
            behaviour: self.behaviour.clone(),
            counters: Arc::clone(&self.counters),
            dead: false,
            closed: false,
        }))
    }
}

/// The demo page the scenarios are written against
fn demo_page() -> Vec<FakeElement> {
    vec![
        // 0
        FakeElement::new("navigation", "Phase Navigation"),
        // 1
        FakeElement::new("link", "Phase 1 (Linear)").child_of(0),
        // 2
        FakeElement::new("link", "Phase 2 (Nonlinear)")
            .child_of(0)
            .attr("aria-current", "page"),
        // 3
        FakeElement::new("region", "Controls")
            .css("[aria-label=\"Controls\"]")
            .css(".control-panel"),
        // 4
        FakeElement::new("combobox", "Trainer type")
            .child_of(3)
            .attr("aria-label", "Trainer type"),
        // 5
        FakeElement::new("button", "3. Simulation Start")
            .child_of(3)
            .attr("style:color", "rgb(255, 255, 255)")
            .toggles_to(
                FakeElement::new("button", "3. Simulation Stop")
                    .attr("style:color", "rgb(255, 255, 255)"),
            ),
    ]
}

fn fast_settings() -> RunnerSettings {
    RunnerSettings {
        timeout_ms: 50,
        settle_ms: 0,
        poll_interval_ms: 10,
    }
}

fn plan(checks: Vec<CheckSpec>, dir: &TempDir) -> RunPlan {
    RunPlan::new(TARGET, checks, dir.path().join("verification")).unwrap()
}

fn controls_visible() -> CheckSpec {
    CheckSpec::element_visible("controls visible", Locator::css("[aria-label=\"Controls\"]"))
}

fn trainer_labelled() -> CheckSpec {
    CheckSpec::attribute_equals(
        "trainer labelled",
        Locator::role("combobox").named("Trainer type"),
        "aria-label",
        "Trainer type",
    )
}

fn nav_has_links() -> CheckSpec {
    CheckSpec::element_visible(
        "nav has links",
        Locator::role("link").within(Locator::role("navigation").named("Phase Navigation")),
    )
}

#[tokio::test]
async fn test_all_checks_pass_in_order() {
    let dir = TempDir::new().unwrap();
    let launcher = FakeLauncher::new(demo_page());
    let counters = Arc::clone(&launcher.counters);
    let runner = Runner::new(launcher, fast_settings());

    let plan = plan(
        vec![controls_visible(), trainer_labelled(), nav_has_links()],
        &dir,
    );
    let report = runner.run(&plan, &CancellationToken::new()).await.unwrap();

    assert_eq!(report.status(), RunStatus::Passed);
    assert!(report.passed());
    let names: Vec<_> = report.results().iter().map(|r| r.name()).collect();
    assert_eq!(names, vec!["controls visible", "trainer labelled", "nav has links"]);
    assert_eq!(report.results()[2].detail(), "element visible (2 matches, used first)");
    assert!(!report.cancelled());
    assert_eq!(counters.launches.load(Ordering::SeqCst), 1);
    assert_eq!(counters.navigations.load(Ordering::SeqCst), 1);
    assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_one_failure_does_not_stop_the_run() {
    let dir = TempDir::new().unwrap();
    let runner = Runner::new(FakeLauncher::new(demo_page()), fast_settings());

    let impossible = CheckSpec::attribute_equals(
        "impossible label",
        Locator::role("combobox").named("Trainer type"),
        "aria-label",
        "Nonexistent",
    );
    let plan = plan(vec![controls_visible(), impossible, trainer_labelled()], &dir);
    let report = runner.run(&plan, &CancellationToken::new()).await.unwrap();

    assert_eq!(report.status(), RunStatus::Failed);
    let statuses: Vec<_> = report.results().iter().map(|r| r.status()).collect();
    assert_eq!(
        statuses,
        vec![CheckStatus::Passed, CheckStatus::Failed, CheckStatus::Passed]
    );
    assert_eq!(
        report.results()[1].detail(),
        "expected 'Nonexistent', got 'Trainer type'"
    );
}

#[tokio::test]
async fn test_repeated_runs_agree() {
    let dir = TempDir::new().unwrap();
    let launcher = FakeLauncher::new(demo_page());
    let counters = Arc::clone(&launcher.counters);
    let runner = Runner::new(launcher, fast_settings());
    let plan = plan(vec![controls_visible(), trainer_labelled()], &dir);

    let first = runner.run(&plan, &CancellationToken::new()).await.unwrap();
    let second = runner.run(&plan, &CancellationToken::new()).await.unwrap();

    let outcome = |r: &uiv_core::RunReport| {
        r.results()
            .iter()
            .map(|c| (c.name().to_string(), c.status(), c.detail().to_string()))
            .collect::<Vec<_>>()
    };
    assert_eq!(outcome(&first), outcome(&second));
    assert_eq!(counters.launches.load(Ordering::SeqCst), 2);
    assert_eq!(counters.closes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_missing_element_fails_and_waiting_times_out() {
    let dir = TempDir::new().unwrap();
    let runner = Runner::new(FakeLauncher::new(demo_page()), fast_settings());

    let missing = CheckSpec::element_visible("legend", Locator::css(".legend"));
    let awaited = CheckSpec::element_visible("spinner", Locator::css(".spinner")).waiting();
    let plan = plan(vec![missing, awaited], &dir);
    let report = runner.run(&plan, &CancellationToken::new()).await.unwrap();

    let legend = &report.results()[0];
    assert_eq!(legend.status(), CheckStatus::Failed);
    assert_eq!(legend.detail(), "element not found");

    let spinner = &report.results()[1];
    assert_eq!(spinner.status(), CheckStatus::Error);
    assert!(spinner.detail().starts_with("timed out after"));
    assert!(spinner.detail().contains("css=.spinner"));
}

#[tokio::test]
async fn test_hung_check_hits_deadline_and_run_continues() {
    let dir = TempDir::new().unwrap();
    let launcher = FakeLauncher::new(demo_page()).with(Behaviour {
        hang_on: Some(".slow".to_string()),
        ..Default::default()
    });
    let runner = Runner::new(launcher, fast_settings());

    let slow = CheckSpec::element_visible("slow widget", Locator::css(".slow"));
    let plan = plan(vec![slow, trainer_labelled()], &dir);
    let report = runner.run(&plan, &CancellationToken::new()).await.unwrap();

    let slow = &report.results()[0];
    assert_eq!(slow.status(), CheckStatus::Error);
    assert_eq!(slow.detail(), "timed out after 100ms waiting for check 'slow widget'");
    assert!(slow.duration_ms() >= 100);
    assert_eq!(report.results()[1].status(), CheckStatus::Passed);
}

#[tokio::test]
async fn test_trainer_select_by_accessible_name() {
    let dir = TempDir::new().unwrap();
    let runner = Runner::new(FakeLauncher::new(demo_page()), fast_settings());

    let report = runner
        .run(&plan(vec![trainer_labelled()], &dir), &CancellationToken::new())
        .await
        .unwrap();

    let result = &report.results()[0];
    assert_eq!(result.status(), CheckStatus::Passed);
    assert_eq!(result.detail(), "aria-label = 'Trainer type'");
}

#[tokio::test]
async fn test_click_toggles_and_independent_style_check_fails() {
    let dir = TempDir::new().unwrap();
    let runner = Runner::new(FakeLauncher::new(demo_page()), fast_settings());

    let toggle = CheckSpec::click_then_assert(
        "simulation toggles",
        Locator::role("button").named("3. Simulation Start"),
        CheckSpec::element_visible(
            "stop visible",
            Locator::role("button").named("3. Simulation Stop"),
        ),
    );
    let colour = CheckSpec::attribute_one_of(
        "stop text colour",
        Locator::role("button").named("3. Simulation Stop"),
        "style:color",
        ["rgb(0, 0, 0)", "black"],
    );
    let report = runner
        .run(&plan(vec![toggle, colour], &dir), &CancellationToken::new())
        .await
        .unwrap();

    let toggle = &report.results()[0];
    assert_eq!(toggle.name(), "simulation toggles");
    assert_eq!(toggle.status(), CheckStatus::Passed);
    assert_eq!(toggle.detail(), "after click: element visible");

    let colour = &report.results()[1];
    assert_eq!(colour.status(), CheckStatus::Failed);
    assert_eq!(
        colour.detail(),
        "expected one of ['rgb(0, 0, 0)', 'black'], got 'rgb(255, 255, 255)'"
    );
    assert_eq!(report.status(), RunStatus::Failed);
}

#[tokio::test]
async fn test_absent_attribute_reports_null() {
    let dir = TempDir::new().unwrap();
    let runner = Runner::new(FakeLauncher::new(demo_page()), fast_settings());

    let current = CheckSpec::attribute_equals(
        "phase 1 current",
        Locator::role("link")
            .named("Phase 1 (Linear)")
            .within(Locator::role("navigation").named("Phase Navigation")),
        "aria-current",
        "page",
    );
    let report = runner
        .run(&plan(vec![current], &dir), &CancellationToken::new())
        .await
        .unwrap();

    let result = &report.results()[0];
    assert_eq!(result.status(), CheckStatus::Failed);
    assert_eq!(result.detail(), "expected 'page', got 'null'");
}

#[tokio::test]
async fn test_unknown_kind_rejected_before_launch() {
    let launcher = FakeLauncher::new(demo_page());
    let counters = Arc::clone(&launcher.counters);
    let _runner = Runner::new(launcher, fast_settings());

    let suite = Suite::from_toml(
        r#"
target_url = "http://localhost:4173"

[[checks]]
name = "hover shows tooltip"
kind = "hover-then-assert"
css = ".help"
"#,
    )
    .unwrap();

    let err = RunPlan::from_suite(&suite, None, None).unwrap_err();
    assert!(matches!(err, UivError::Config { .. }));
    assert!(err.to_string().contains("hover shows tooltip"));
    assert_eq!(counters.launches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_session_loss_skips_remaining_checks() {
    let dir = TempDir::new().unwrap();
    let launcher = FakeLauncher::new(demo_page()).with(Behaviour {
        crash_on: Some(".crash".to_string()),
        ..Default::default()
    });
    let counters = Arc::clone(&launcher.counters);
    let runner = Runner::new(launcher, fast_settings());

    let crash = CheckSpec::element_visible("crashing widget", Locator::css(".crash"));
    let plan = plan(
        vec![controls_visible(), crash, trainer_labelled(), nav_has_links()],
        &dir,
    );
    let report = runner.run(&plan, &CancellationToken::new()).await.unwrap();

    assert_eq!(report.results().len(), 4);
    assert_eq!(report.results()[0].status(), CheckStatus::Passed);
    assert_eq!(report.results()[1].status(), CheckStatus::Error);
    for skipped in &report.results()[2..] {
        assert_eq!(skipped.status(), CheckStatus::Error);
        assert_eq!(skipped.detail(), SESSION_UNAVAILABLE);
    }
    assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_launch_failure_marks_every_check() {
    let dir = TempDir::new().unwrap();
    let launcher = FakeLauncher::new(demo_page()).with(Behaviour {
        fail_launch: true,
        ..Default::default()
    });
    let runner = Runner::new(launcher, fast_settings());

    let report = runner
        .run(
            &plan(vec![controls_visible(), trainer_labelled()], &dir),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.status(), RunStatus::Failed);
    for result in report.results() {
        assert_eq!(result.status(), CheckStatus::Error);
        assert!(result.detail().starts_with("session unavailable: "));
    }
}

#[tokio::test]
async fn test_navigation_failure_marks_every_check() {
    let dir = TempDir::new().unwrap();
    let launcher = FakeLauncher::new(demo_page()).with(Behaviour {
        fail_navigation: true,
        ..Default::default()
    });
    let counters = Arc::clone(&launcher.counters);
    let runner = Runner::new(launcher, fast_settings());

    let report = runner
        .run(
            &plan(vec![controls_visible(), trainer_labelled()], &dir),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.results().len(), 2);
    for result in report.results() {
        assert_eq!(result.status(), CheckStatus::Error);
        assert!(result.detail().starts_with("navigation failed: "));
        assert!(result.detail().contains("ERR_CONNECTION_REFUSED"));
    }
    assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cancellation_returns_partial_report() {
    let dir = TempDir::new().unwrap();
    let launcher = FakeLauncher::new(demo_page()).with(Behaviour {
        hang_on: Some(".slow".to_string()),
        ..Default::default()
    });
    let counters = Arc::clone(&launcher.counters);
    let runner = Runner::new(
        launcher,
        RunnerSettings {
            timeout_ms: 60_000,
            ..fast_settings()
        },
    );

    let slow = CheckSpec::element_visible("slow widget", Locator::css(".slow"));
    let plan = plan(vec![controls_visible(), slow, trainer_labelled()], &dir);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let report = tokio::time::timeout(Duration::from_secs(5), runner.run(&plan, &cancel))
        .await
        .expect("run should stop promptly after cancellation")
        .unwrap();

    assert!(report.cancelled());
    assert_eq!(report.status(), RunStatus::Failed);
    assert_eq!(report.results().len(), 1);
    assert_eq!(report.results()[0].name(), "controls visible");
    assert!(report.notes().iter().any(|n| n == CANCELLED_NOTE));
    assert!(report.summary().ends_with("(cancelled)"));
    assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cancelled_before_start_launches_nothing() {
    let dir = TempDir::new().unwrap();
    let launcher = FakeLauncher::new(demo_page());
    let counters = Arc::clone(&launcher.counters);
    let runner = Runner::new(launcher, fast_settings());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = runner
        .run(&plan(vec![controls_visible()], &dir), &cancel)
        .await
        .unwrap();

    assert!(report.cancelled());
    assert!(report.results().is_empty());
    assert_eq!(counters.closes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_screenshots_and_capture_fallback() {
    let dir = TempDir::new().unwrap();
    let launcher = FakeLauncher::new(demo_page());
    let counters = Arc::clone(&launcher.counters);
    let runner = Runner::new(launcher, fast_settings());

    let plan = plan(
        vec![nav_has_links().with_screenshot("navigation.png")],
        &dir,
    )
    .with_captures(vec![
        CaptureSpec::region(Locator::css(".control-panel"), "control_panel.png"),
        CaptureSpec::region(Locator::css(".legend"), "legend"),
    ])
    .unwrap();
    let report = runner.run(&plan, &CancellationToken::new()).await.unwrap();

    let nav = &report.results()[0];
    let shot = nav.artifact_path().unwrap();
    assert!(shot.ends_with("navigation.png"));
    assert!(shot.exists());

    assert_eq!(report.artifacts().len(), 2);
    assert!(report.artifacts()[1].ends_with("legend.png"));
    assert!(report
        .notes()
        .iter()
        .any(|n| n.contains("css=.legend not found")));
    assert!(report.passed());
    assert_eq!(counters.launches.load(Ordering::SeqCst), 1);
}
