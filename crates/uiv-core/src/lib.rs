//! # uiv-core
//!
//! Value types for the uiv UI verification harness.
//!
//! - [`CheckSpec`]: one named verification step, validated at construction
//! - [`CheckResult`] / [`RunReport`]: immutable outcomes of a run
//! - [`Locator`]: role + accessible name, or CSS selector
//! - [`Suite`]: the declarative suite file (TOML or JSON)
//!
//! Nothing here touches a browser; see `uiv-browser` for the runner.

mod check;
mod config;
mod error;
mod locator;
mod report;

pub use check::{
    normalize_whitespace, CheckDef, CheckKind, CheckOptions, CheckSpec, Expected, KindTag,
    LocatorDef, MAX_NESTING,
};
pub use config::{
    validate_target_url, BrowserSettings, CaptureDef, CaptureSpec, RunnerSettings, Suite,
    EXAMPLE_SUITE,
};
pub use error::{Result, UivError};
pub use locator::Locator;
pub use report::{CheckResult, CheckStatus, ReportBuilder, RunReport, RunStatus, CANCELLED_NOTE};
