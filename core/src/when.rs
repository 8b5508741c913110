//! Conditional branches.
//!
//! [`Schema::when`] records a branch in the `whens` term. At validation time
//! every branch is evaluated in order against the value (or the value a
//! reference points at) and the selected `then`/`otherwise` schemas are
//! concatenated onto a copy of the schema with its branches removed.
//!
//! ```
//! use std::sync::Arc;
//! use typeshape_core::*;
//!
//! let descriptor = Arc::new(
//!     extend(
//!         &TypeDescriptor::base(),
//!         Extension::new("thing").term("whens", TermInit::Null),
//!     )
//!     .unwrap(),
//! );
//! let schema = Schema::new(descriptor.clone());
//! let strict = Schema::new(descriptor).forbidden().unwrap();
//!
//! let conditional = schema
//!     .when(
//!         Reference::parse("$locked").unwrap(),
//!         WhenOptions::new().then(strict),
//!     )
//!     .unwrap();
//!
//! let mut prefs = Preferences::default();
//! prefs.context.insert("locked".into(), Value::Bool(true));
//! let report = conditional.validate_with(Value::from("x"), &prefs, &State::new());
//! assert_eq!(report.errors[0].code, "any.unknown");
//! ```

use tracing::{debug, warn};

use crate::error::{Result, SchemaError};
use crate::prefs::Preferences;
use crate::reference::{Reference, State};
use crate::schema::Schema;
use crate::terms::TermItem;
use crate::value::Value;

/// What a branch tests.
#[derive(Debug, Clone)]
pub enum Condition {
    /// Test the value a reference resolves to.
    Ref(Reference),
    /// Test the value itself against a schema.
    Schema(Schema),
}

impl From<Reference> for Condition {
    fn from(reference: Reference) -> Self {
        Condition::Ref(reference)
    }
}

impl From<Schema> for Condition {
    fn from(schema: Schema) -> Self {
        Condition::Schema(schema)
    }
}

/// One case of a switch branch.
#[derive(Debug, Clone)]
pub struct SwitchCase {
    is: Schema,
    then: Schema,
    otherwise: Option<Schema>,
}

impl SwitchCase {
    pub fn new(is: Schema, then: Schema) -> Self {
        Self {
            is,
            then,
            otherwise: None,
        }
    }

    /// Fallback when no case matched. Only allowed on the last case.
    pub fn otherwise(mut self, schema: Schema) -> Self {
        self.otherwise = Some(schema);
        self
    }

    pub fn is_schema(&self) -> &Schema {
        &self.is
    }

    pub fn then_schema(&self) -> &Schema {
        &self.then
    }

    pub fn otherwise_schema(&self) -> Option<&Schema> {
        self.otherwise.as_ref()
    }
}

/// Options for [`Schema::when`].
#[derive(Debug, Clone, Default)]
pub struct WhenOptions {
    is: Option<Schema>,
    not: Option<Schema>,
    then: Option<Schema>,
    otherwise: Option<Schema>,
    switch: Vec<SwitchCase>,
    break_: bool,
}

impl WhenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is(mut self, schema: Schema) -> Self {
        self.is = Some(schema);
        self
    }

    /// Matches when the referenced value fails `schema`.
    pub fn not(mut self, schema: Schema) -> Self {
        self.not = Some(schema);
        self
    }

    pub fn then(mut self, schema: Schema) -> Self {
        self.then = Some(schema);
        self
    }

    pub fn otherwise(mut self, schema: Schema) -> Self {
        self.otherwise = Some(schema);
        self
    }

    pub fn switch(mut self, case: SwitchCase) -> Self {
        self.switch.push(case);
        self
    }

    /// Stops evaluating later branches once this one selected a schema.
    pub fn break_on_match(mut self) -> Self {
        self.break_ = true;
        self
    }
}

/// A validated conditional branch.
#[derive(Debug, Clone)]
pub struct When {
    reference: Option<Reference>,
    is: Option<Schema>,
    not: Option<Schema>,
    then: Option<Schema>,
    otherwise: Option<Schema>,
    switch: Vec<SwitchCase>,
    break_: bool,
}

impl When {
    pub fn reference(&self) -> Option<&Reference> {
        self.reference.as_ref()
    }

    pub fn is_schema(&self) -> Option<&Schema> {
        self.is.as_ref()
    }

    pub fn not_schema(&self) -> Option<&Schema> {
        self.not.as_ref()
    }

    pub fn then_schema(&self) -> Option<&Schema> {
        self.then.as_ref()
    }

    pub fn otherwise_schema(&self) -> Option<&Schema> {
        self.otherwise.as_ref()
    }

    pub fn switch_cases(&self) -> &[SwitchCase] {
        &self.switch
    }

    pub fn breaks(&self) -> bool {
        self.break_
    }

    fn branches(&self) -> impl Iterator<Item = &Schema> {
        self.is
            .iter()
            .chain(self.not.iter())
            .chain(self.then.iter())
            .chain(self.otherwise.iter())
            .chain(self.switch.iter().flat_map(|case| {
                std::iter::once(&case.is)
                    .chain(std::iter::once(&case.then))
                    .chain(case.otherwise.iter())
            }))
    }

    /// Picks the schema this branch contributes for `value`, if any.
    fn select(&self, value: &Value, state: &State, prefs: &Preferences) -> Option<Schema> {
        let input = match &self.reference {
            Some(reference) => reference.resolve(value, state, prefs),
            None => value.clone(),
        };
        let matches = |schema: &Schema| schema.validate_with(input.clone(), prefs, state).is_ok();

        if !self.switch.is_empty() {
            for case in &self.switch {
                if matches(&case.is) {
                    return Some(case.then.clone());
                }
                if let Some(otherwise) = &case.otherwise {
                    return Some(otherwise.clone());
                }
            }
            return None;
        }

        let matched = match (&self.is, &self.not) {
            (Some(is), _) => matches(is),
            (None, Some(not)) => !matches(not),
            (None, None) => input.is_truthy(),
        };
        if matched {
            self.then.clone()
        } else {
            self.otherwise.clone()
        }
    }
}

/// An entry of the `whens` term.
#[derive(Debug, Clone)]
pub enum WhenTerm {
    Branch(When),
    /// A merge deferred until the preceding branches are resolved.
    Concat(Schema),
}

impl Schema {
    /// Adds a conditional branch.
    ///
    /// With a reference condition the referenced value is tested against
    /// `is` (or must fail `not`, or be truthy when neither is given), or
    /// walked through the `switch` cases. With a schema condition the value
    /// itself is tested against that schema.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidValue`] for inconsistent options,
    /// [`SchemaError::IncompatibleTypes`] when a branch schema cannot be
    /// merged into this one, or [`SchemaError::UnknownTerm`] when the type
    /// has no `whens` term.
    pub fn when(&self, condition: impl Into<Condition>, options: WhenOptions) -> Result<Schema> {
        let invalid =
            |message: &str| -> Result<Schema> { Err(SchemaError::InvalidValue(message.to_string())) };
        let has_outcome = options.then.is_some() || options.otherwise.is_some();

        let when = match condition.into() {
            Condition::Ref(reference) => {
                if options.is.is_some() && options.not.is_some() {
                    return invalid("cannot combine is with not");
                }
                if !options.switch.is_empty() {
                    if options.is.is_some() || options.not.is_some() || has_outcome {
                        return invalid("cannot combine switch with is, not, then or otherwise");
                    }
                    let last = options.switch.len() - 1;
                    if options.switch[..last].iter().any(|case| case.otherwise.is_some()) {
                        return invalid("otherwise can only be used in the last switch case");
                    }
                } else if !has_outcome {
                    return invalid("when requires at least one of then, otherwise or switch");
                }
                When {
                    reference: Some(reference),
                    is: options.is,
                    not: options.not,
                    then: options.then,
                    otherwise: options.otherwise,
                    switch: options.switch,
                    break_: options.break_,
                }
            }
            Condition::Schema(is) => {
                if options.is.is_some() || options.not.is_some() || !options.switch.is_empty() {
                    return invalid("schema conditions do not support is, not or switch");
                }
                if !has_outcome {
                    return invalid("when requires at least one of then or otherwise");
                }
                When {
                    reference: None,
                    is: Some(is),
                    not: None,
                    then: options.then,
                    otherwise: options.otherwise,
                    switch: Vec::new(),
                    break_: options.break_,
                }
            }
        };

        for outcome in when
            .then
            .iter()
            .chain(when.otherwise.iter())
            .chain(when.switch.iter().flat_map(|case| std::iter::once(&case.then).chain(case.otherwise.iter())))
        {
            self.merged_descriptor(outcome)?;
        }

        let mut schema = self.add_term("whens", TermItem::When(WhenTerm::Branch(when.clone())))?;
        if let Some(reference) = &when.reference {
            schema.register_reference(reference);
        }
        for branch in when.branches() {
            schema.register(branch);
        }
        Ok(schema)
    }

    /// Resolves the `whens` term for `value`. Returns `None` when the schema
    /// has no branches.
    pub(crate) fn resolve_whens(
        &self,
        value: &Value,
        state: &State,
        prefs: &Preferences,
    ) -> Option<Schema> {
        if !self.has_whens() {
            return None;
        }
        let items = self.term("whens").unwrap_or_default();

        let mut selected = Vec::new();
        for item in items.iter().filter_map(TermItem::as_when) {
            match item {
                WhenTerm::Concat(schema) => selected.push(schema.clone()),
                WhenTerm::Branch(when) => {
                    let Some(schema) = when.select(value, state, prefs) else {
                        continue;
                    };
                    selected.push(schema);
                    if when.break_ {
                        break;
                    }
                }
            }
        }

        let mut resolved = self.clone();
        resolved.terms.insert("whens".to_string(), None);
        for schema in &selected {
            match resolved.concat(schema) {
                Ok(merged) => resolved = merged,
                Err(err) => warn!(error = %err, "skipping conditional schema that cannot be merged"),
            }
        }
        debug!(selected = selected.len(), path = ?state.path, "resolved conditional branches");
        Some(resolved)
    }
}
