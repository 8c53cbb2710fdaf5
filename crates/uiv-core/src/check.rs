//! Check specifications
//!
//! A [`CheckSpec`] is one named, ordered verification step. Specs are built
//! either programmatically or from a [`CheckDef`] record read out of a suite
//! file; both paths end in [`CheckSpec::validate`], so an invalid spec never
//! reaches a browser.

use crate::error::{Result, UivError};
use crate::locator::Locator;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum number of `then` levels below a top-level `click-then-assert`
pub const MAX_NESTING: usize = 4;

/// Kind of verification a check performs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CheckKind {
    /// First match is rendered
    ElementVisible,
    /// Attribute (or `style:` computed property) equals a value
    AttributeEquals { attribute: String, expected: String },
    /// Attribute value is one of a set
    AttributeOneOf {
        attribute: String,
        expected: Vec<String>,
    },
    /// Text content contains a substring
    TextContains { expected: String },
    /// Click, let the page settle, then run a nested check
    ClickThenAssert { then: Box<CheckSpec> },
}

impl CheckKind {
    /// Wire name of this kind
    pub fn tag(&self) -> &'static str {
        match self {
            Self::ElementVisible => "element-visible",
            Self::AttributeEquals { .. } => "attribute-equals",
            Self::AttributeOneOf { .. } => "attribute-one-of",
            Self::TextContains { .. } => "text-contains",
            Self::ClickThenAssert { .. } => "click-then-assert",
        }
    }
}

/// Kind names accepted in suite files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindTag {
    ElementVisible,
    AttributeEquals,
    AttributeOneOf,
    TextContains,
    ClickThenAssert,
}

impl FromStr for KindTag {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "element-visible" => Ok(Self::ElementVisible),
            "attribute-equals" => Ok(Self::AttributeEquals),
            "attribute-one-of" => Ok(Self::AttributeOneOf),
            "text-contains" => Ok(Self::TextContains),
            "click-then-assert" => Ok(Self::ClickThenAssert),
            other => Err(format!("unknown kind '{}'", other)),
        }
    }
}

/// Per-check flags
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckOptions {
    /// Collapse runs of whitespace and trim before comparing
    pub normalize: bool,
    /// Poll for the element until the run timeout instead of querying once
    pub wait: bool,
    /// Capture the located element into this artifact file after the check
    pub screenshot: Option<String>,
}

/// A validated verification step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckSpec {
    name: String,
    locator: Locator,
    #[serde(flatten)]
    kind: CheckKind,
    options: CheckOptions,
}

impl CheckSpec {
    fn new(name: impl Into<String>, locator: Locator, kind: CheckKind) -> Self {
        Self {
            name: name.into(),
            locator,
            kind,
            options: CheckOptions::default(),
        }
    }

    pub fn element_visible(name: impl Into<String>, locator: Locator) -> Self {
        Self::new(name, locator, CheckKind::ElementVisible)
    }

    pub fn attribute_equals(
        name: impl Into<String>,
        locator: Locator,
        attribute: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            locator,
            CheckKind::AttributeEquals {
                attribute: attribute.into(),
                expected: expected.into(),
            },
        )
    }

    pub fn attribute_one_of<I, S>(
        name: impl Into<String>,
        locator: Locator,
        attribute: impl Into<String>,
        expected: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            name,
            locator,
            CheckKind::AttributeOneOf {
                attribute: attribute.into(),
                expected: expected.into_iter().map(Into::into).collect(),
            },
        )
    }

    pub fn text_contains(
        name: impl Into<String>,
        locator: Locator,
        expected: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            locator,
            CheckKind::TextContains {
                expected: expected.into(),
            },
        )
    }

    /// Click `locator`, then evaluate `then`
    pub fn click_then_assert(name: impl Into<String>, locator: Locator, then: CheckSpec) -> Self {
        Self::new(
            name,
            locator,
            CheckKind::ClickThenAssert {
                then: Box::new(then),
            },
        )
    }

    pub fn normalized(mut self) -> Self {
        self.options.normalize = true;
        self
    }

    pub fn waiting(mut self) -> Self {
        self.options.wait = true;
        self
    }

    pub fn with_screenshot(mut self, file_name: impl Into<String>) -> Self {
        self.options.screenshot = Some(file_name.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn kind(&self) -> &CheckKind {
        &self.kind
    }

    pub fn options(&self) -> &CheckOptions {
        &self.options
    }

    /// Attribute names the page has to report for this check's own element
    pub fn attributes_needed(&self) -> Vec<String> {
        match &self.kind {
            CheckKind::AttributeEquals { attribute, .. }
            | CheckKind::AttributeOneOf { attribute, .. } => vec![attribute.clone()],
            _ => Vec::new(),
        }
    }

    /// Check the kind-specific invariants
    pub fn validate(&self) -> Result<()> {
        self.validate_at(0)
    }

    fn validate_at(&self, depth: usize) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(UivError::config("<unnamed>", "name must not be empty"));
        }
        self.locator
            .validate()
            .map_err(|reason| UivError::config(&self.name, reason))?;

        match &self.kind {
            CheckKind::ElementVisible => {}
            CheckKind::AttributeEquals { attribute, .. } => {
                validate_attribute(&self.name, attribute)?;
            }
            CheckKind::AttributeOneOf {
                attribute,
                expected,
            } => {
                validate_attribute(&self.name, attribute)?;
                if expected.is_empty() {
                    return Err(UivError::config(
                        &self.name,
                        "attribute-one-of needs at least one expected value",
                    ));
                }
            }
            CheckKind::TextContains { .. } => {}
            CheckKind::ClickThenAssert { then } => {
                if depth + 1 > MAX_NESTING {
                    return Err(UivError::config(
                        &self.name,
                        format!("click-then-assert nested deeper than {}", MAX_NESTING),
                    ));
                }
                then.validate_at(depth + 1)?;
            }
        }

        if let Some(file) = &self.options.screenshot {
            if depth > 0 {
                return Err(UivError::config(
                    &self.name,
                    "screenshot is only supported on top-level checks",
                ));
            }
            if file.trim().is_empty() {
                return Err(UivError::config(&self.name, "screenshot file name is empty"));
            }
        }
        Ok(())
    }
}

fn validate_attribute(check: &str, attribute: &str) -> Result<()> {
    let bare = attribute.strip_prefix("style:").unwrap_or(attribute);
    if bare.trim().is_empty() {
        return Err(UivError::config(check, "attribute name must not be empty"));
    }
    Ok(())
}

impl fmt::Display for CheckSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.name, self.kind.tag(), self.locator)
    }
}

/// Collapse whitespace runs to single spaces and trim
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Locator fields as they appear in a suite record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocatorDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(
        default,
        alias = "accessibleName",
        skip_serializing_if = "Option::is_none"
    )]
    pub accessible_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exact: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub within: Option<Box<LocatorDef>>,
}

impl LocatorDef {
    /// Whether any locator field is set
    pub fn is_empty(&self) -> bool {
        self.role.is_none() && self.css.is_none() && self.within.is_none()
    }

    /// Build a locator; `owner` names the check for error messages
    pub fn to_locator(&self, owner: &str) -> Result<Locator> {
        let target = match (&self.role, &self.css) {
            (Some(_), Some(_)) => {
                return Err(UivError::config(owner, "give either 'role' or 'css', not both"))
            }
            (None, None) => {
                return Err(UivError::config(owner, "missing locator: set 'role' or 'css'"))
            }
            (Some(role), None) => {
                let mut locator = Locator::role(role.clone());
                if let Some(name) = &self.accessible_name {
                    locator = locator.named(name.clone());
                }
                if self.exact == Some(false) {
                    locator = locator.inexact();
                }
                locator
            }
            (None, Some(css)) => {
                if self.accessible_name.is_some() {
                    return Err(UivError::config(
                        owner,
                        "'accessible_name' only applies to role locators",
                    ));
                }
                Locator::css(css.clone())
            }
        };

        let locator = match &self.within {
            Some(parent) => target.within(parent.to_locator(owner)?),
            None => target,
        };
        locator
            .validate()
            .map_err(|reason| UivError::config(owner, reason))?;
        Ok(locator)
    }
}

/// Expected value: a single string or a set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expected {
    One(String),
    Many(Vec<String>),
}

/// One check record as written in a suite file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckDef {
    #[serde(default)]
    pub name: String,
    pub kind: String,
    #[serde(flatten)]
    pub locator: LocatorDef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Expected>,
    #[serde(default)]
    pub normalize: bool,
    #[serde(default)]
    pub wait: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub then: Option<Box<CheckDef>>,
}

impl CheckDef {
    fn into_spec(self, fallback_name: Option<&str>) -> Result<CheckSpec> {
        let name = match (self.name.trim().is_empty(), fallback_name) {
            (false, _) => self.name.clone(),
            (true, Some(parent)) => format!("{} (then)", parent),
            (true, None) => return Err(UivError::config("<unnamed>", "name must not be empty")),
        };

        let tag: KindTag = self
            .kind
            .parse()
            .map_err(|reason: String| UivError::config(&name, reason))?;
        let locator = self.locator.to_locator(&name)?;

        let kind = match tag {
            KindTag::ElementVisible => CheckKind::ElementVisible,
            KindTag::AttributeEquals => CheckKind::AttributeEquals {
                attribute: required_attribute(&name, self.attribute)?,
                expected: expect_one(&name, self.expected)?,
            },
            KindTag::AttributeOneOf => CheckKind::AttributeOneOf {
                attribute: required_attribute(&name, self.attribute)?,
                expected: match self.expected {
                    Some(Expected::Many(values)) => values,
                    Some(Expected::One(value)) => vec![value],
                    None => return Err(UivError::config(&name, "missing 'expected'")),
                },
            },
            KindTag::TextContains => CheckKind::TextContains {
                expected: expect_one(&name, self.expected)?,
            },
            KindTag::ClickThenAssert => {
                let then = self.then.ok_or_else(|| {
                    UivError::config(&name, "click-then-assert needs a 'then' check")
                })?;
                CheckKind::ClickThenAssert {
                    then: Box::new(then.into_spec(Some(&name))?),
                }
            }
        };

        let spec = CheckSpec {
            name,
            locator,
            kind,
            options: CheckOptions {
                normalize: self.normalize,
                wait: self.wait,
                screenshot: self.screenshot,
            },
        };
        spec.validate()?;
        Ok(spec)
    }
}

impl TryFrom<CheckDef> for CheckSpec {
    type Error = UivError;

    fn try_from(def: CheckDef) -> Result<Self> {
        def.into_spec(None)
    }
}

fn required_attribute(check: &str, attribute: Option<String>) -> Result<String> {
    attribute.ok_or_else(|| UivError::config(check, "missing 'attribute'"))
}

fn expect_one(check: &str, expected: Option<Expected>) -> Result<String> {
    match expected {
        Some(Expected::One(value)) => Ok(value),
        Some(Expected::Many(_)) => Err(UivError::config(
            check,
            "'expected' must be a single string for this kind",
        )),
        None => Err(UivError::config(check, "missing 'expected'")),
    }
}
