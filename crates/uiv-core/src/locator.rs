//! Element locators
//!
//! A [`Locator`] names elements the way assistive technology sees them
//! (role plus accessible name) or, as a fallback, by CSS selector. Locators
//! are plain data: they are serialized to JSON and resolved inside the page.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How to find elements on the page. Matches are always in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum Locator {
    /// ARIA role with optional accessible name
    Role {
        role: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        /// Exact (whitespace-collapsed) name match; otherwise case-insensitive substring
        #[serde(default = "default_exact")]
        exact: bool,
    },
    /// CSS selector
    Css { selector: String },
    /// Resolve `child` inside the first match of `parent`
    Within {
        parent: Box<Locator>,
        child: Box<Locator>,
    },
}

fn default_exact() -> bool {
    true
}

impl Locator {
    /// Any element with the given role
    pub fn role(role: impl Into<String>) -> Self {
        Self::Role {
            role: role.into(),
            name: None,
            exact: true,
        }
    }

    /// CSS selector locator
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css {
            selector: selector.into(),
        }
    }

    /// Restrict a role locator to an accessible name.
    ///
    /// On a scoped locator this applies to the child; on CSS it has no effect.
    pub fn named(self, name: impl Into<String>) -> Self {
        match self {
            Self::Role { role, exact, .. } => Self::Role {
                role,
                name: Some(name.into()),
                exact,
            },
            Self::Within { parent, child } => Self::Within {
                parent,
                child: Box::new(child.named(name)),
            },
            css @ Self::Css { .. } => css,
        }
    }

    /// Switch a role locator to case-insensitive substring name matching
    pub fn inexact(self) -> Self {
        match self {
            Self::Role { role, name, .. } => Self::Role {
                role,
                name,
                exact: false,
            },
            Self::Within { parent, child } => Self::Within {
                parent,
                child: Box::new(child.inexact()),
            },
            css @ Self::Css { .. } => css,
        }
    }

    /// Scope this locator inside the first match of `parent`
    pub fn within(self, parent: Locator) -> Self {
        Self::Within {
            parent: Box::new(parent),
            child: Box::new(self),
        }
    }

    /// Structural validation, returns a reason on failure
    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            Self::Role { role, name, .. } => {
                if role.trim().is_empty() {
                    return Err("role must not be empty".to_string());
                }
                if role.chars().any(char::is_whitespace) {
                    return Err(format!("role '{}' must be a single token", role));
                }
                if matches!(name, Some(n) if n.trim().is_empty()) {
                    return Err("accessible name must not be blank".to_string());
                }
                Ok(())
            }
            Self::Css { selector } => {
                if selector.trim().is_empty() {
                    Err("css selector must not be empty".to_string())
                } else {
                    Ok(())
                }
            }
            Self::Within { parent, child } => {
                parent.validate()?;
                child.validate()
            }
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Role { role, name: None, .. } => write!(f, "role={}", role),
            Self::Role {
                role,
                name: Some(name),
                exact: true,
            } => write!(f, "role={} \"{}\"", role, name),
            Self::Role {
                role,
                name: Some(name),
                exact: false,
            } => write!(f, "role={} ~\"{}\"", role, name),
            Self::Css { selector } => write!(f, "css={}", selector),
            Self::Within { parent, child } => write!(f, "{} >> {}", parent, child),
        }
    }
}
