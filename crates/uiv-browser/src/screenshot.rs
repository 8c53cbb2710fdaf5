//! Screenshot capture with region fallback

use crate::artifact::ArtifactStore;
use crate::driver::PageDriver;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use uiv_core::{CaptureSpec, Locator, Result};

/// Outcome of a capture
#[derive(Debug, Clone)]
pub struct Capture {
    /// Where the PNG was written
    pub path: PathBuf,
    /// Set when the region was not found and the full page was captured instead
    pub warning: Option<String>,
}

/// Capture `region` (or the full page) into `file_name` under the store.
///
/// A region that matches nothing, or matches only elements without a layout
/// box, falls back to a full-page screenshot; the fallback is reported in
/// [`Capture::warning`], not as an error.
pub async fn capture(
    driver: &mut dyn PageDriver,
    store: &ArtifactStore,
    region: Option<&Locator>,
    file_name: &str,
) -> Result<Capture> {
    ArtifactStore::validate_name(file_name)?;

    let mut warning = None;
    let clip = match region {
        Some(locator) => {
            let matches = driver.query(locator, &[]).await?;
            let bounds = matches
                .iter()
                .find_map(|m| m.bounds.filter(|b| !b.is_empty()));
            if bounds.is_none() {
                let message = format!(
                    "screenshot region {} not found, captured full page to {}",
                    locator, file_name
                );
                warn!("{}", message);
                warning = Some(message);
            }
            bounds
        }
        None => None,
    };

    match &clip {
        Some(b) => debug!("Capturing region {}x{} at ({}, {})", b.width, b.height, b.x, b.y),
        None => debug!("Capturing full page"),
    }
    let data = driver.screenshot(clip).await?;
    let artifact = store.store(file_name, &data).await?;

    info!(
        "Screenshot stored: {} ({} bytes)",
        artifact.path.display(),
        artifact.size_bytes
    );

    Ok(Capture {
        path: artifact.path,
        warning,
    })
}

/// Run-level capture described by a suite record
pub async fn capture_spec(
    driver: &mut dyn PageDriver,
    store: &ArtifactStore,
    spec: &CaptureSpec,
) -> Result<Capture> {
    capture(driver, store, spec.region.as_ref(), &spec.file_name).await
}
