//! Page driver abstraction
//!
//! The runner talks to the page only through [`PageDriver`], so it can run
//! against a real Chrome session or an in-memory fake in tests. Drivers are
//! produced by a [`SessionLauncher`], one per run.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uiv_core::{Locator, Result};

/// Element rectangle in page (document) coordinates, CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// What the page reported about one matched element
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementSnapshot {
    /// Has layout boxes and is not `visibility: hidden`
    pub visible: bool,
    /// Raw `textContent`
    #[serde(default)]
    pub text: String,
    /// Requested attributes; `None` when the attribute is absent
    #[serde(default)]
    pub attributes: BTreeMap<String, Option<String>>,
    #[serde(default)]
    pub bounds: Option<BoundingBox>,
}

impl ElementSnapshot {
    /// Value of a requested attribute, `None` if absent or not requested
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(|v| v.as_deref())
    }
}

/// One live page, exclusively owned by a run
#[async_trait]
pub trait PageDriver: Send {
    /// Load `url` and wait for navigation to finish
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// All elements matching `locator`, in document order, with the
    /// requested attributes (`style:<prop>` reads computed style)
    async fn query(&mut self, locator: &Locator, attributes: &[String])
        -> Result<Vec<ElementSnapshot>>;

    /// Click the `index`-th match of `locator`
    async fn click(&mut self, locator: &Locator, index: usize) -> Result<()>;

    /// PNG screenshot, clipped to `clip` or of the full page
    async fn screenshot(&mut self, clip: Option<BoundingBox>) -> Result<Vec<u8>>;

    /// Cheap probe: can the page still be observed?
    async fn is_alive(&mut self) -> bool;

    /// Release the session. Must be idempotent.
    fn close(&mut self);
}

/// Opens a fresh session for each run
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn PageDriver>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_from_page_json() {
        let json = r##"{
            "visible": true,
            "text": "Phase 1 (Linear)",
            "attributes": {"aria-current": null, "href": "#linear"},
            "bounds": {"x": 10, "y": 20, "width": 120, "height": 32}
        }"##;
        let snapshot: ElementSnapshot = serde_json::from_str(json).unwrap();

        assert!(snapshot.visible);
        assert_eq!(snapshot.attribute("aria-current"), None);
        assert_eq!(snapshot.attribute("href"), Some("#linear"));
        assert_eq!(snapshot.attribute("title"), None);
        assert!(!snapshot.bounds.unwrap().is_empty());
    }

    #[test]
    fn test_snapshot_defaults() {
        let snapshot: ElementSnapshot = serde_json::from_str(r#"{"visible": false}"#).unwrap();
        assert!(snapshot.text.is_empty());
        assert!(snapshot.attributes.is_empty());
        assert!(snapshot.bounds.is_none());
    }
}
