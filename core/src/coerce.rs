//! Pre-validation coercion and post-validation casting.
//!
//! A [`Coerce`] converts an alternate input representation into the type's
//! native one before any rule runs. It is attempted only when the input's
//! [`representation`](Value::representation) equals the declared `from`;
//! when the conversion errors, declines (`Ok(None)`) or panics, the value
//! continues unchanged and the type's base validation reports the mismatch.
//!
//! A [`Cast`] converts a valid native value into a requested output
//! representation. It runs only after every rule passed, and it cannot fail.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::rules::{BoxError, Helpers, isolate};
use crate::value::Value;

/// Coercion method: `Ok(Some(v))` converts, `Ok(None)` or `Err` declines.
pub type CoerceFn =
    Arc<dyn Fn(&Value, &Helpers<'_>) -> std::result::Result<Option<Value>, BoxError> + Send + Sync>;

/// Guard deciding whether a cast applies to a value.
pub type CastGuard = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Cast conversion.
pub type CastFn = Arc<dyn Fn(&Value, &Helpers<'_>) -> Value + Send + Sync>;

/// Input conversion declared by a type.
#[derive(Clone)]
pub struct Coerce {
    from: String,
    method: CoerceFn,
}

impl Coerce {
    pub fn new<F>(from: impl Into<String>, method: F) -> Self
    where
        F: Fn(&Value, &Helpers<'_>) -> std::result::Result<Option<Value>, BoxError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            from: from.into(),
            method: Arc::new(method),
        }
    }

    /// Representation name this coercion accepts.
    pub fn representation(&self) -> &str {
        &self.from
    }

    /// Attempts the conversion. `None` means "no coercion performed".
    pub fn apply(&self, value: &Value, helpers: &Helpers<'_>) -> Option<Value> {
        if value.representation() != self.from {
            return None;
        }
        match isolate(|| (self.method)(value, helpers)) {
            Ok(Ok(Some(converted))) => Some(converted),
            Ok(Ok(None)) => {
                debug!(from = %self.from, "coercion declined");
                None
            }
            Ok(Err(err)) => {
                debug!(from = %self.from, error = %err, "coercion failed, value left unchanged");
                None
            }
            Err(message) => {
                warn!(from = %self.from, panic = %message, "coercion panicked, value left unchanged");
                None
            }
        }
    }
}

impl fmt::Debug for Coerce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coerce").field("from", &self.from).finish()
    }
}

/// Output conversion declared by a type, keyed by target name.
#[derive(Clone)]
pub struct Cast {
    from: CastGuard,
    to: CastFn,
}

impl Cast {
    pub fn new<G, F>(from: G, to: F) -> Self
    where
        G: Fn(&Value) -> bool + Send + Sync + 'static,
        F: Fn(&Value, &Helpers<'_>) -> Value + Send + Sync + 'static,
    {
        Self {
            from: Arc::new(from),
            to: Arc::new(to),
        }
    }

    pub fn applies_to(&self, value: &Value) -> bool {
        (self.from)(value)
    }

    /// Converts `value`, or returns it unchanged when the guard rejects it
    /// or the conversion panics.
    pub fn apply(&self, value: Value, helpers: &Helpers<'_>) -> Value {
        if !self.applies_to(&value) {
            debug!(representation = value.representation(), "cast guard rejected value");
            return value;
        }
        match isolate(|| (self.to)(&value, helpers)) {
            Ok(cast) => cast,
            Err(message) => {
                warn!(panic = %message, "cast panicked, value left unchanged");
                value
            }
        }
    }
}

impl fmt::Debug for Cast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cast")
    }
}
