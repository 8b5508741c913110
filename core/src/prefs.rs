//! Validation preferences.
//!
//! [`Preferences`] are supplied per validation call and can be loaded from
//! YAML or JSON text. Schemas carry [`PreferenceOverrides`] that are layered
//! on top when they are validated.
//!
//! # Example YAML
//!
//! ```yaml
//! abort_early: false
//! convert: true
//! errors:
//!   label: path
//!   language: es
//!   wrap_label: "'"
//!   escape_html: false
//! messages:
//!   binary.length:
//!     en: "{{#label}} must be exactly {{#limit}} bytes"
//!     es: "{{#label}} debe tener {{#limit}} bytes"
//! context:
//!   max_upload: 1024
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::messages::{Messages, RenderOptions};
use crate::value::Context;

/// How error labels are derived when a schema has no `label` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelMode {
    /// The full dot-joined path (`"a.b"`).
    #[default]
    Path,
    /// The last path segment (`"b"`).
    Key,
    /// Always the generic `value` label.
    Off,
}

/// Error construction and rendering settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorPreferences {
    pub label: LabelMode,
    /// Locale used to pick localized messages.
    pub language: Option<String>,
    /// Characters wrapped around labels when rendered (`"` by default).
    pub wrap_label: Option<String>,
    /// Escape `{{#token}}` output for HTML embedding.
    pub escape_html: bool,
}

impl Default for ErrorPreferences {
    fn default() -> Self {
        Self {
            label: LabelMode::Path,
            language: None,
            wrap_label: Some("\"".to_string()),
            escape_html: false,
        }
    }
}

/// Settings for one validation call.
///
/// # Examples
///
/// ```
/// use typeshape_core::Preferences;
///
/// let prefs = Preferences::from_yaml_str("abort_early: false\nerrors:\n  language: es\n").unwrap();
/// assert!(!prefs.abort_early);
/// assert!(prefs.convert);
/// assert_eq!(prefs.errors.language.as_deref(), Some("es"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Stop at the first hard error instead of collecting all of them.
    pub abort_early: bool,
    /// Run coercions and casts.
    pub convert: bool,
    pub errors: ErrorPreferences,
    /// Message overrides keyed by error code.
    pub messages: Messages,
    /// Values reachable through `$` references.
    pub context: Context,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            abort_early: true,
            convert: true,
            errors: ErrorPreferences::default(),
            messages: Messages::default(),
            context: Context::new(),
        }
    }
}

impl Preferences {
    /// Parses preferences from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`Yaml`](crate::SchemaError::Yaml) if parsing fails, including
    /// when a message template does not compile.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Parses preferences from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`Json`](crate::SchemaError::Json) if parsing fails.
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Returns a copy with schema-level overrides applied.
    pub fn with_overrides(&self, overrides: &PreferenceOverrides) -> Preferences {
        let mut prefs = self.clone();
        if let Some(abort_early) = overrides.abort_early {
            prefs.abort_early = abort_early;
        }
        if let Some(convert) = overrides.convert {
            prefs.convert = convert;
        }
        if let Some(language) = &overrides.language {
            prefs.errors.language = Some(language.clone());
        }
        prefs.messages.merge(&overrides.messages);
        prefs
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            escape_html: self.errors.escape_html,
        }
    }
}

/// Preferences attached to a schema, applied over the caller's.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferenceOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_early: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub convert: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Messages::is_empty")]
    pub messages: Messages,
}

impl PreferenceOverrides {
    /// Overlays `other`; set fields in `other` win.
    pub fn merge(&self, other: &PreferenceOverrides) -> PreferenceOverrides {
        let mut merged = self.clone();
        if other.abort_early.is_some() {
            merged.abort_early = other.abort_early;
        }
        if other.convert.is_some() {
            merged.convert = other.convert;
        }
        if other.language.is_some() {
            merged.language = other.language.clone();
        }
        merged.messages.merge(&other.messages);
        merged
    }

    pub fn is_empty(&self) -> bool {
        self.abort_early.is_none()
            && self.convert.is_none()
            && self.language.is_none()
            && self.messages.is_empty()
    }
}
