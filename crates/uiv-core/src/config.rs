//! Suite files and runner settings
//!
//! A suite is the declarative input to a run: target URL, artifact directory,
//! timing and browser settings, the ordered check records and any run-level
//! screenshots. Suites are TOML by default; a `.json` extension switches to JSON.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::check::{CheckDef, CheckSpec, LocatorDef};
use crate::error::{Result, UivError};
use crate::locator::Locator;

/// Timing knobs for a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerSettings {
    /// Bound on every wait (navigation, element appearance)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Pause after a click before the follow-up assertion
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Polling interval while waiting for elements
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// Browser launch settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserSettings {
    #[serde(default = "default_headless")]
    pub headless: bool,

    #[serde(default = "default_window_width")]
    pub window_width: u32,

    #[serde(default = "default_window_height")]
    pub window_height: u32,

    #[serde(default)]
    pub user_agent: Option<String>,
}

/// A run-level screenshot taken after all checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureDef {
    #[serde(flatten)]
    pub region: LocatorDef,
    pub file: String,
}

/// Validated run-level screenshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSpec {
    /// Region to clip to; `None` means the full page
    pub region: Option<Locator>,
    pub file_name: String,
}

impl CaptureSpec {
    pub fn full_page(file_name: impl Into<String>) -> Self {
        Self {
            region: None,
            file_name: file_name.into(),
        }
    }

    pub fn region(region: Locator, file_name: impl Into<String>) -> Self {
        Self {
            region: Some(region),
            file_name: file_name.into(),
        }
    }
}

/// Suite file contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suite {
    /// Page under test; may be supplied on the command line instead
    #[serde(default)]
    pub target_url: Option<String>,

    /// Where screenshots go
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    #[serde(default)]
    pub runner: RunnerSettings,

    #[serde(default)]
    pub browser: BrowserSettings,

    #[serde(default)]
    pub checks: Vec<CheckDef>,

    #[serde(default)]
    pub captures: Vec<CaptureDef>,
}

// Default value providers
fn default_timeout_ms() -> u64 {
    5_000
}

fn default_settle_ms() -> u64 {
    300
}

fn default_poll_interval_ms() -> u64 {
    50
}

fn default_headless() -> bool {
    true
}

fn default_window_width() -> u32 {
    1280
}

fn default_window_height() -> u32 {
    800
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("verification")
}

impl RunnerSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Hard ceiling for a single check, including a click and its settle time
    pub fn check_deadline(&self) -> Duration {
        self.timeout() * 2 + self.settle()
    }
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            settle_ms: default_settle_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            window_width: default_window_width(),
            window_height: default_window_height(),
            user_agent: None,
        }
    }
}

impl Suite {
    /// Read a suite from disk; the extension picks the format
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let suite: Self = if is_json {
            serde_json::from_str(&content)
                .map_err(|e| UivError::ConfigParse(format!("{}: {}", path.display(), e)))?
        } else {
            Self::from_toml(&content)
                .map_err(|e| UivError::ConfigParse(format!("{}: {}", path.display(), e)))?
        };

        info!(
            "Loaded suite {} ({} check(s), {} capture(s))",
            path.display(),
            suite.checks.len(),
            suite.captures.len()
        );
        Ok(suite)
    }

    /// Parse TOML suite text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| UivError::ConfigParse(e.to_string()))
    }

    /// Write the example suite to `path`, creating parent directories
    pub fn write_example(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, EXAMPLE_SUITE)?;
        Ok(())
    }

    /// Validate every check record, in order
    pub fn check_specs(&self) -> Result<Vec<CheckSpec>> {
        let mut seen = HashSet::new();
        let mut specs = Vec::with_capacity(self.checks.len());
        for def in &self.checks {
            let spec = CheckSpec::try_from(def.clone())?;
            if !seen.insert(spec.name().to_string()) {
                return Err(UivError::config(spec.name(), "duplicate check name"));
            }
            specs.push(spec);
        }
        Ok(specs)
    }

    /// Validate the run-level screenshot records
    pub fn capture_specs(&self) -> Result<Vec<CaptureSpec>> {
        self.captures
            .iter()
            .map(|def| {
                let owner = format!("capture {}", def.file);
                if def.file.trim().is_empty() {
                    return Err(UivError::config(owner, "file must not be empty"));
                }
                let region = if def.region.is_empty() {
                    None
                } else {
                    Some(def.region.to_locator(&owner)?)
                };
                Ok(CaptureSpec {
                    region,
                    file_name: def.file.clone(),
                })
            })
            .collect()
    }
}

/// Reject anything that is not an absolute http(s) URL with a host, or a file URL
pub fn validate_target_url(target: &str) -> Result<()> {
    let invalid = |reason: String| UivError::config("target_url", reason);

    if target.chars().any(char::is_whitespace) {
        return Err(invalid(format!("'{}' contains whitespace", target)));
    }
    let parsed = Url::parse(target).map_err(|e| invalid(format!("'{}': {}", target, e)))?;

    match parsed.scheme() {
        "http" | "https" => {
            if parsed.host_str().map_or(true, str::is_empty) {
                return Err(invalid(format!("'{}' has no host", target)));
            }
        }
        "file" => {
            if parsed.path() == "/" {
                return Err(invalid(format!("'{}' names no file", target)));
            }
        }
        other => {
            return Err(invalid(format!(
                "'{}' uses unsupported scheme '{}', expected http, https or file",
                target, other
            )))
        }
    }
    debug!("Target URL {} accepted", parsed);
    Ok(())
}

/// Suite written by `uiv init`
pub const EXAMPLE_SUITE: &str = r#"# uiv suite: checks run top to bottom against one page.
target_url = "http://localhost:4173"
artifact_dir = "verification"

[runner]
timeout_ms = 5000
settle_ms = 300

[browser]
headless = true
window_width = 1280
window_height = 800

[[checks]]
name = "controls region present"
kind = "element-visible"
css = "[aria-label=\"Controls\"]"
wait = true

[[checks]]
name = "trainer select labelled"
kind = "attribute-equals"
role = "combobox"
accessible_name = "Trainer type"
attribute = "aria-label"
expected = "Trainer type"

[[checks]]
name = "active phase marked current"
kind = "attribute-equals"
role = "link"
accessible_name = "Phase 1 (Linear)"
within = { role = "navigation", accessible_name = "Phase Navigation" }
attribute = "aria-current"
expected = "page"
screenshot = "navigation.png"

[[checks]]
name = "simulation toggles"
kind = "click-then-assert"
role = "button"
accessible_name = "3. Simulation Start"

[checks.then]
kind = "element-visible"
role = "button"
accessible_name = "3. Simulation Stop"

[[checks]]
name = "stop button text colour"
kind = "attribute-one-of"
role = "button"
accessible_name = "3. Simulation Stop"
attribute = "style:color"
expected = ["rgb(0, 0, 0)", "black"]

[[captures]]
css = ".control-panel"
file = "control_panel.png"

[[captures]]
file = "page.png"
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::CheckKind;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = RunnerSettings::default();
        assert_eq!(settings.timeout(), Duration::from_secs(5));
        assert_eq!(settings.settle(), Duration::from_millis(300));
        assert_eq!(settings.check_deadline(), Duration::from_millis(10_300));

        let browser = BrowserSettings::default();
        assert!(browser.headless);
        assert!(browser.user_agent.is_none());
    }

    #[test]
    fn test_example_suite_parses() {
        let suite = Suite::from_toml(EXAMPLE_SUITE).unwrap();
        assert_eq!(suite.target_url.as_deref(), Some("http://localhost:4173"));

        let specs = suite.check_specs().unwrap();
        assert_eq!(specs.len(), 5);
        assert_eq!(specs[0].kind(), &CheckKind::ElementVisible);
        assert!(specs[0].options().wait);
        assert_eq!(specs[2].options().screenshot.as_deref(), Some("navigation.png"));
        assert_eq!(specs[3].kind().tag(), "click-then-assert");

        let captures = suite.capture_specs().unwrap();
        assert_eq!(captures.len(), 2);
        assert_eq!(captures[0].region, Some(Locator::css(".control-panel")));
        assert_eq!(captures[1], CaptureSpec::full_page("page.png"));
    }

    #[test]
    fn test_minimal_suite_uses_defaults() {
        let suite = Suite::from_toml(
            r#"
            [[checks]]
            name = "heading"
            kind = "text-contains"
            role = "heading"
            expected = "Neural"
            "#,
        )
        .unwrap();

        assert!(suite.target_url.is_none());
        assert_eq!(suite.artifact_dir, PathBuf::from("verification"));
        assert_eq!(suite.runner, RunnerSettings::default());
        assert_eq!(suite.check_specs().unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_kind_fails_validation() {
        let suite = Suite::from_toml(
            r#"
            [[checks]]
            name = "bogus"
            kind = "nonexistent"
            role = "button"
            "#,
        )
        .unwrap();

        let err = suite.check_specs().unwrap_err();
        assert!(matches!(err, UivError::Config { .. }));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let suite = Suite::from_toml(
            r#"
            [[checks]]
            name = "same"
            kind = "element-visible"
            role = "button"

            [[checks]]
            name = "same"
            kind = "element-visible"
            role = "link"
            "#,
        )
        .unwrap();

        assert!(suite.check_specs().is_err());
    }

    #[test]
    fn test_load_json_with_camel_case_name() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("suite.json");
        std::fs::write(
            &path,
            r#"{
                "target_url": "http://localhost:3001",
                "checks": [
                    {"name": "select", "kind": "attribute-equals", "role": "combobox",
                     "accessibleName": "Training Method", "attribute": "aria-label",
                     "expected": "Training Method"}
                ]
            }"#,
        )
        .unwrap();

        let suite = Suite::load(&path).unwrap();
        let specs = suite.check_specs().unwrap();
        assert_eq!(
            specs[0].locator(),
            &Locator::role("combobox").named("Training Method")
        );
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.toml");
        std::fs::write(&path, "[[checks]\nname =").unwrap();

        assert!(matches!(Suite::load(&path), Err(UivError::ConfigParse(_))));
    }

    #[test]
    fn test_write_example_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("suites/ui.toml");
        Suite::write_example(&path).unwrap();

        let suite = Suite::load(&path).unwrap();
        assert_eq!(suite.checks.len(), 5);
    }

    #[test]
    fn test_validate_target_url() {
        assert!(validate_target_url("http://localhost:4173").is_ok());
        assert!(validate_target_url("https://example.com/app").is_ok());
        assert!(validate_target_url("file:///tmp/index.html").is_ok());
        assert!(validate_target_url("localhost:4173").is_err());
        assert!(validate_target_url("http://").is_err());
        assert!(validate_target_url("/index.html").is_err());
        assert!(validate_target_url("http://local host").is_err());
        assert!(validate_target_url("file:///").is_err());
        assert!(validate_target_url("ftp://example.com/app").is_err());
    }

    #[test]
    fn test_validate_target_url_rejects_malformed() {
        for bad in ["http://:4173", "http://[::1", "https://#frag", "http://a:b:c:d"] {
            let err = validate_target_url(bad).unwrap_err();
            assert!(
                matches!(err, UivError::Config { .. }),
                "{} should be a config error",
                bad
            );
        }
        assert!(validate_target_url("http://[::1]:4173/").is_ok());
        assert!(validate_target_url("http://127.0.0.1:5173/#/phase/2").is_ok());
    }
}
