//! Extensible schema-type engine.
//!
//! A type is declared once as an immutable [`TypeDescriptor`]: default flags,
//! term slots, parameterized rules, modifiers, coercion, casts, base
//! validation, default messages and manifest hooks. Derived types are built
//! with [`extend`], which merges an [`Extension`] into a parent descriptor.
//!
//! A [`Schema`] is an instance of a type. Builders ([`Schema::add_rule`],
//! [`Schema::set_flag`], [`Schema::add_term`], [`Schema::when`], ...) return
//! new schemas, so published schemas are immutable and can be validated from
//! many threads at once.
//!
//! Validation ([`Schema::validate`], [`Schema::validate_with`]) never fails;
//! it returns a [`ValidationReport`] with the resulting value, errors and
//! warnings. Construction problems are reported synchronously as
//! [`SchemaError`].
//!
//! Schemas round-trip through [`Description`] ([`Schema::describe`],
//! [`build`], [`TypeRegistry::build`]).
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use typeshape_core::*;
//!
//! let word = extend(
//!     &TypeDescriptor::base(),
//!     Extension::new("word")
//!         .coerce(Coerce::new("number", |value, _| {
//!             Ok(value.as_f64().map(|n| Value::from(n.to_string())))
//!         }))
//!         .rule(
//!             RuleDescriptor::new("length")
//!                 .arg(
//!                     ArgSpec::new("limit")
//!                         .reference()
//!                         .assert(|arg| arg.as_value().is_some_and(is_limit), "must be a positive integer"),
//!                 )
//!                 .validate(|value, helpers, args, _| {
//!                     if value.len().map(|len| len as f64) == args.value("limit").as_f64() {
//!                         return RuleOutcome::Pass;
//!                     }
//!                     let mut local = Context::new();
//!                     local.insert("limit".into(), args.value("limit").clone());
//!                     helpers.error("word.length", local).into()
//!                 }),
//!         )
//!         .message("word.length", "{{#label}} must be {{#limit}} characters long"),
//! )
//! .unwrap();
//!
//! let schema = Schema::new(Arc::new(word))
//!     .add_rule(Rule::new("length").arg("limit", 3))
//!     .unwrap();
//!
//! assert!(schema.validate(123).is_ok());
//! let report = schema.validate("hello");
//! assert_eq!(report.errors[0].code, "word.length");
//! assert_eq!(report.errors[0].message, "\"value\" must be 3 characters long");
//! ```

mod coerce;
mod descriptor;
mod error;
mod manifest;
mod messages;
mod prefs;
mod reference;
mod rules;
mod schema;
mod terms;
mod validate;
mod value;
mod when;

pub use coerce::{Cast, CastFn, CastGuard, Coerce, CoerceFn};
pub use descriptor::{
    BaseOutcome, Extension, ManifestHook, TermInit, TypeDescriptor, TypeValidate, extend,
};
pub use error::{Result, SchemaError, ValidationError, ValidationReport};
pub use manifest::{
    Description, RuleDescription, SwitchDescription, TypeRegistry, WhenDescription, build,
};
pub use messages::{DEFAULT_LOCALE, Message, MessageSource, Messages, RenderOptions, Template, compile};
pub use prefs::{ErrorPreferences, LabelMode, PreferenceOverrides, Preferences};
pub use reference::{RefRoot, Reference, State};
pub use rules::{
    Arg, ArgSpec, Args, Assertion, BoxError, CustomResult, CustomValidator, FUNCTION_MARKER,
    Helpers, MAX_SAFE_INTEGER, Modifier, Rule, RuleDescriptor, RuleInstance, RuleOutcome,
    RuleValidate, compare, is_limit, isolate,
};
pub use schema::{PRESENCE_FORBIDDEN, PRESENCE_OPTIONAL, PRESENCE_REQUIRED, Schema};
pub use terms::{Adjuster, Alteration, TermItem};
pub use value::{Context, REPRESENTATIONS, Value};
pub use when::{Condition, SwitchCase, When, WhenOptions, WhenTerm};
