//! Browser automation and check execution for uiv
//!
//! This crate drives a Chrome/Chromium page through the Chrome DevTools
//! Protocol (CDP) and evaluates [`uiv_core::CheckSpec`]s against it.
//!
//! # Features
//!
//! - **Browser Management**: Launch Chrome, or attach to one already running
//! - **Locator Resolution**: Role + accessible name, CSS, and scoped lookups
//!   resolved in-page
//! - **Check Evaluation**: Visibility, attribute, computed-style, text and
//!   click-then-assert checks
//! - **Screenshots**: Region captures with full-page fallback
//! - **Runner**: Ordered execution with per-check deadlines, session-loss
//!   detection and cooperative cancellation
//!
//! # Example
//!
//! ```no_run
//! use uiv_browser::{BrowserConfig, ChromeLauncher, RunPlan, Runner};
//! use uiv_core::{CheckSpec, Locator, RunnerSettings};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let plan = RunPlan::new(
//!         "http://localhost:4173",
//!         vec![CheckSpec::attribute_equals(
//!             "trainer select labelled",
//!             Locator::role("combobox").named("Trainer type"),
//!             "aria-label",
//!             "Trainer type",
//!         )],
//!         "verification",
//!     )?;
//!
//!     let runner = Runner::new(
//!         ChromeLauncher::new(BrowserConfig::default()),
//!         RunnerSettings::default(),
//!     );
//!     let report = runner.run(&plan, &CancellationToken::new()).await?;
//!     println!("{}", report.summary());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Requirements
//!
//! - Chrome or Chromium browser installed
//! - For connecting to existing browser: `chrome --remote-debugging-port=9222`
//!
//! # Architecture
//!
//! - [`driver`]: The [`PageDriver`] seam between the runner and a page
//! - [`browser`]: `headless_chrome` implementation of the seam
//! - [`query`]: In-page locator resolver
//! - [`verification`]: Evaluation of a single check
//! - [`screenshot`] / [`artifact`]: Captures and where they are written
//! - [`runner`]: Run lifecycle and report assembly

pub mod artifact;
pub mod browser;
pub mod driver;
pub mod query;
pub mod runner;
pub mod screenshot;
pub mod verification;

// Re-export commonly used types
pub use artifact::{ArtifactStore, StoredArtifact};
pub use browser::{BrowserConfig, BrowserSession, ChromeLauncher};
pub use driver::{BoundingBox, ElementSnapshot, PageDriver, SessionLauncher};
pub use runner::{RunPhase, RunPlan, Runner, SessionGuard, SESSION_UNAVAILABLE};
pub use screenshot::{capture, capture_spec, Capture};
pub use verification::{evaluate, locate};
