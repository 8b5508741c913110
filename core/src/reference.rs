//! References to values resolved at validation time.
//!
//! A reference key names where a rule argument or a conditional branch gets
//! its value from:
//!
//! | key      | resolves against                              |
//! |----------|-----------------------------------------------|
//! | `a.b`    | sibling `a.b` (the parent container, ancestor 1) |
//! | `.a`     | the value under validation itself (ancestor 0)  |
//! | `..a`    | the parent container (ancestor 1)               |
//! | `...a`   | the grandparent (ancestor 2)                    |
//! | `$a.b`   | the caller-supplied preference context          |
//!
//! Ancestors are supplied by the caller through [`State`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};
use crate::prefs::Preferences;
use crate::value::Value;

/// Where a reference starts resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefRoot {
    /// The value under validation or one of its ancestors.
    Value,
    /// [`Preferences::context`].
    Context,
}

/// A parsed reference key.
///
/// # Examples
///
/// ```
/// use typeshape_core::{Reference, RefRoot};
///
/// let sibling = Reference::parse("limits.max").unwrap();
/// assert_eq!(sibling.ancestor(), 1);
/// assert_eq!(sibling.path(), ["limits", "max"]);
///
/// let global = Reference::parse("$maxSize").unwrap();
/// assert_eq!(global.root(), RefRoot::Context);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Reference {
    key: String,
    root: RefRoot,
    ancestor: usize,
    path: Vec<String>,
}

impl Reference {
    /// Parses a reference key.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidReference`] for empty keys, empty path
    /// segments, or a bare `$`.
    pub fn parse(key: &str) -> Result<Self> {
        let invalid = |reason: &str| SchemaError::InvalidReference {
            key: key.to_string(),
            reason: reason.to_string(),
        };

        if key.is_empty() {
            return Err(invalid("key cannot be empty"));
        }

        let (root, ancestor, rest) = if let Some(rest) = key.strip_prefix('$') {
            if rest.is_empty() {
                return Err(invalid("context reference needs a path"));
            }
            (RefRoot::Context, 0, rest)
        } else {
            let dots = key.chars().take_while(|c| *c == '.').count();
            let ancestor = if dots == 0 { 1 } else { dots - 1 };
            (RefRoot::Value, ancestor, &key[dots..])
        };

        let path = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split('.').map(String::from).collect::<Vec<_>>()
        };
        if path.iter().any(String::is_empty) {
            return Err(invalid("path segments cannot be empty"));
        }

        Ok(Self {
            key: key.to_string(),
            root,
            ancestor,
            path,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn root(&self) -> RefRoot {
        self.root
    }

    /// Number of levels above the value under validation (0 = the value).
    pub fn ancestor(&self) -> usize {
        self.ancestor
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Returns `true` when the reference looks outside the value itself.
    pub fn is_external(&self) -> bool {
        self.root == RefRoot::Context || self.ancestor > 0
    }

    /// Resolves against the value under validation, the caller's ancestors,
    /// or the preference context. Missing targets resolve to
    /// [`Value::Undefined`].
    pub fn resolve(&self, value: &Value, state: &State, prefs: &Preferences) -> Value {
        match self.root {
            RefRoot::Context => {
                let Some((first, rest)) = self.path.split_first() else {
                    return Value::Undefined;
                };
                prefs
                    .context
                    .get(first)
                    .map(|found| found.lookup(rest))
                    .unwrap_or_default()
            }
            RefRoot::Value => {
                let base = if self.ancestor == 0 {
                    Some(value)
                } else {
                    state.ancestors.get(self.ancestor - 1)
                };
                base.map(|base| base.lookup(&self.path)).unwrap_or_default()
            }
        }
    }
}

impl TryFrom<String> for Reference {
    type Error = SchemaError;

    fn try_from(key: String) -> Result<Self> {
        Reference::parse(&key)
    }
}

impl From<Reference> for String {
    fn from(reference: Reference) -> Self {
        reference.key
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ref:{}", self.key)
    }
}

/// Position of the value under validation within its caller's data.
///
/// `ancestors[0]` is the immediate container, `ancestors[1]` its container,
/// and so on. `path` locates the value for error reporting and labels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct State {
    pub path: Vec<String>,
    pub ancestors: Vec<Value>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a path segment.
    pub fn with_path(mut self, segment: impl Into<String>) -> Self {
        self.path.push(segment.into());
        self
    }

    /// Appends the next ancestor outward (parent first).
    pub fn with_ancestor(mut self, ancestor: impl Into<Value>) -> Self {
        self.ancestors.push(ancestor.into());
        self
    }

    /// The key of the value within its container.
    pub fn key(&self) -> Option<&str> {
        self.path.last().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_ancestors() {
        assert_eq!(Reference::parse("a").unwrap().ancestor(), 1);
        assert_eq!(Reference::parse(".a").unwrap().ancestor(), 0);
        assert_eq!(Reference::parse("..a").unwrap().ancestor(), 1);
        assert_eq!(Reference::parse("...a").unwrap().ancestor(), 2);
        assert!(Reference::parse(".").unwrap().path().is_empty());
    }

    #[test]
    fn test_parse_rejects_bad_keys() {
        assert!(Reference::parse("").is_err());
        assert!(Reference::parse("$").is_err());
        assert!(Reference::parse("a..b").is_err());
    }

    #[test]
    fn test_resolve_sibling_self_and_context() {
        let parent = Value::from(json!({"size": 3, "data": "abc"}));
        let state = State::new().with_path("data").with_ancestor(parent);
        let mut prefs = Preferences::default();
        prefs.context.insert("max".into(), Value::from(10));

        let value = Value::from("abc");
        assert_eq!(
            Reference::parse("size").unwrap().resolve(&value, &state, &prefs),
            Value::from(3)
        );
        assert_eq!(
            Reference::parse(".length").unwrap().resolve(&value, &state, &prefs),
            Value::from(3)
        );
        assert_eq!(
            Reference::parse("$max").unwrap().resolve(&value, &state, &prefs),
            Value::from(10)
        );
        assert_eq!(
            Reference::parse("...missing").unwrap().resolve(&value, &state, &prefs),
            Value::Undefined
        );
    }

    #[test]
    fn test_serde_as_key_string() {
        let reference = Reference::parse("a.b").unwrap();
        let json = serde_json::to_value(&reference).unwrap();
        assert_eq!(json, json!("a.b"));
        let back: Reference = serde_json::from_value(json).unwrap();
        assert_eq!(back, reference);
    }
}
