//! Check evaluation against a live page

use crate::driver::{ElementSnapshot, PageDriver};
use futures::future::BoxFuture;
use std::time::Instant;
use tracing::{debug, info};
use uiv_core::{
    normalize_whitespace, CheckKind, CheckResult, CheckSpec, Locator, Result, RunnerSettings,
    UivError,
};

/// Longest observed text quoted in a failure detail
const MAX_QUOTED: usize = 80;

/// Find the elements for a check.
///
/// With `wait`, polls until something matches or the timeout elapses
/// (`Timeout`); otherwise queries once and reports `NotFound` on no match.
pub async fn locate(
    driver: &mut dyn PageDriver,
    locator: &Locator,
    attributes: &[String],
    wait: bool,
    settings: &RunnerSettings,
) -> Result<Vec<ElementSnapshot>> {
    locate_until(driver, locator, attributes, wait, false, settings).await
}

/// Like [`locate`], but a waiting lookup with `require_visible` also waits
/// for the first match to become visible
async fn locate_until(
    driver: &mut dyn PageDriver,
    locator: &Locator,
    attributes: &[String],
    wait: bool,
    require_visible: bool,
    settings: &RunnerSettings,
) -> Result<Vec<ElementSnapshot>> {
    if !wait {
        let matches = driver.query(locator, attributes).await?;
        if matches.is_empty() {
            return Err(UivError::NotFound(locator.to_string()));
        }
        return Ok(matches);
    }

    let started = Instant::now();
    loop {
        let matches = driver.query(locator, attributes).await?;
        let ready = match matches.first() {
            Some(first) => !require_visible || first.visible,
            None => false,
        };
        if ready {
            debug!("{} ready after {:?}", locator, started.elapsed());
            return Ok(matches);
        }
        if started.elapsed() >= settings.timeout() {
            let what = if matches.is_empty() {
                locator.to_string()
            } else {
                format!("{} to become visible", locator)
            };
            return Err(UivError::Timeout {
                what,
                waited_ms: started.elapsed().as_millis() as u64,
            });
        }
        tokio::time::sleep(settings.poll_interval()).await;
    }
}

/// Evaluate one check.
///
/// Observation failures (`NotFound`, mismatches) come back as `failed`
/// results. Errors that prevented observation are returned as `Err` for the
/// runner to classify, except inside a click-then-assert, where the nested
/// outcome is folded into the parent's result.
pub fn evaluate<'a>(
    driver: &'a mut dyn PageDriver,
    spec: &'a CheckSpec,
    settings: &'a RunnerSettings,
) -> BoxFuture<'a, Result<CheckResult>> {
    Box::pin(async move {
        let attributes = spec.attributes_needed();
        let require_visible = matches!(spec.kind(), CheckKind::ElementVisible);
        let matches = match locate_until(
            driver,
            spec.locator(),
            &attributes,
            spec.options().wait,
            require_visible,
            settings,
        )
        .await
        {
            Ok(matches) => matches,
            Err(e) if e.is_failure() => return Ok(CheckResult::from_error(spec.name(), &e)),
            Err(e) => return Err(e),
        };

        let ambiguity = if matches.len() > 1 {
            format!(" ({} matches, used first)", matches.len())
        } else {
            String::new()
        };
        let first = &matches[0];
        let normalize = spec.options().normalize;

        let outcome = match spec.kind() {
            CheckKind::ElementVisible => {
                if first.visible {
                    Ok("element visible".to_string())
                } else {
                    Err(UivError::AssertionMismatch("element is not visible".to_string()))
                }
            }
            CheckKind::AttributeEquals {
                attribute,
                expected,
            } => assert_equals(first, attribute, expected, normalize),
            CheckKind::AttributeOneOf {
                attribute,
                expected,
            } => assert_one_of(first, attribute, expected, normalize),
            CheckKind::TextContains { expected } => assert_text(first, expected, normalize),
            CheckKind::ClickThenAssert { then } => {
                info!("Clicking {}", spec.locator());
                driver.click(spec.locator(), 0).await?;
                tokio::time::sleep(settings.settle()).await;

                let nested = match evaluate(driver, then, settings).await {
                    Ok(result) => result,
                    Err(e) if e.is_session_loss() => return Err(e),
                    Err(e) => CheckResult::from_error(then.name(), &e),
                };
                return Ok(nested
                    .renamed(spec.name())
                    .prefixed("after click: ")
                    .annotated(&ambiguity));
            }
        };

        let result = match outcome {
            Ok(detail) => CheckResult::passed(spec.name(), detail),
            Err(e) => CheckResult::from_error(spec.name(), &e),
        };
        Ok(result.annotated(&ambiguity))
    })
}

fn prepare(value: &str, normalize: bool) -> String {
    if normalize {
        normalize_whitespace(value)
    } else {
        value.to_string()
    }
}

fn quoted(value: Option<&str>) -> String {
    match value {
        Some(v) if v.chars().count() > MAX_QUOTED => {
            let head: String = v.chars().take(MAX_QUOTED).collect();
            format!("'{}…'", head)
        }
        Some(v) => format!("'{}'", v),
        None => "'null'".to_string(),
    }
}

fn assert_equals(
    element: &ElementSnapshot,
    attribute: &str,
    expected: &str,
    normalize: bool,
) -> Result<String> {
    let observed = element.attribute(attribute);
    let matches = observed.map(|v| prepare(v, normalize)) == Some(prepare(expected, normalize));
    if matches {
        Ok(format!("{} = {}", attribute, quoted(observed)))
    } else {
        Err(UivError::AssertionMismatch(format!(
            "expected {}, got {}",
            quoted(Some(expected)),
            quoted(observed)
        )))
    }
}

fn assert_one_of(
    element: &ElementSnapshot,
    attribute: &str,
    expected: &[String],
    normalize: bool,
) -> Result<String> {
    let observed = element.attribute(attribute);
    let found = observed.is_some_and(|v| {
        let v = prepare(v, normalize);
        expected.iter().any(|e| prepare(e, normalize) == v)
    });
    if found {
        Ok(format!("{} = {}", attribute, quoted(observed)))
    } else {
        let set = expected
            .iter()
            .map(|e| quoted(Some(e.as_str())))
            .collect::<Vec<_>>()
            .join(", ");
        Err(UivError::AssertionMismatch(format!(
            "expected one of [{}], got {}",
            set,
            quoted(observed)
        )))
    }
}

fn assert_text(element: &ElementSnapshot, expected: &str, normalize: bool) -> Result<String> {
    let text = prepare(&element.text, normalize);
    if text.contains(&prepare(expected, normalize)) {
        Ok(format!("text contains {}", quoted(Some(expected))))
    } else {
        Err(UivError::AssertionMismatch(format!(
            "expected text containing {}, got {}",
            quoted(Some(expected)),
            quoted(Some(text.as_str()))
        )))
    }
}
