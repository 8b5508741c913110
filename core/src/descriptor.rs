//! Type descriptors and the extension mechanism.
//!
//! A [`TypeDescriptor`] records everything a type declares: flag defaults,
//! term slots, rules, modifiers, coercion, casts, base validation, default
//! messages and manifest hooks. Types are never subclassed; [`extend`]
//! merges an [`Extension`] into a parent descriptor and returns a new,
//! immutable one. Malformed declarations fail here, not at validation time.
//!
//! # Example
//!
//! ```
//! use typeshape_core::*;
//!
//! let even = extend(
//!     &TypeDescriptor::base(),
//!     Extension::new("even")
//!         .rule(
//!             RuleDescriptor::new("even").validate(|value, helpers, _, _| {
//!                 match value.as_f64() {
//!                     Some(n) if n % 2.0 == 0.0 => RuleOutcome::Pass,
//!                     _ => helpers.error("even.odd", Context::new()).into(),
//!                 }
//!             }),
//!         )
//!         .message("even.odd", "{{#label}} must be even"),
//! )
//! .unwrap();
//!
//! let schema = Schema::new(std::sync::Arc::new(even)).add_rule(Rule::new("even")).unwrap();
//! assert!(schema.validate(Value::from(4)).is_ok());
//! assert_eq!(schema.validate(Value::from(3)).errors[0].message, "\"value\" must be even");
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::coerce::{Cast, Coerce};
use crate::error::{Result, SchemaError, ValidationError};
use crate::manifest::{Description, TypeRegistry};
use crate::messages::{MessageSource, Messages, compile};
use crate::rules::{Helpers, Modifier, RuleDescriptor, RuleInstance};
use crate::schema::Schema;
use crate::value::{Context, REPRESENTATIONS, Value};

/// Result of a type's base validation: the (possibly replaced) value and
/// the errors that stop validation.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseOutcome {
    pub value: Value,
    pub errors: Vec<ValidationError>,
}

/// Base validation run after coercion and before rules. `None` means the
/// value is acceptable as is.
pub type TypeValidate = Arc<dyn Fn(&Value, &Helpers<'_>) -> Option<BaseOutcome> + Send + Sync>;

/// Manifest hook replaying a description's type-specific keys onto a schema.
pub type ManifestHook =
    Arc<dyn Fn(Schema, &Description, &TypeRegistry) -> Result<Schema> + Send + Sync>;

/// Initial state of a term slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermInit {
    /// Absent until the first element is added.
    Null,
    /// Starts as an empty list.
    Empty,
}

/// Immutable declaration of a schema type.
#[derive(Clone)]
pub struct TypeDescriptor {
    type_name: String,
    lineage: Vec<String>,
    flags: BTreeMap<String, Value>,
    terms: BTreeMap<String, TermInit>,
    rules: BTreeMap<String, RuleDescriptor>,
    modifiers: BTreeMap<String, Modifier>,
    coerce: Option<Coerce>,
    cast: BTreeMap<String, Cast>,
    validate: Option<TypeValidate>,
    messages: Messages,
    manifest: Vec<ManifestHook>,
}

impl TypeDescriptor {
    /// The root descriptor every type extends. It declares nothing.
    pub fn base() -> Self {
        Self {
            type_name: "base".to_string(),
            lineage: Vec::new(),
            flags: BTreeMap::new(),
            terms: BTreeMap::new(),
            rules: BTreeMap::new(),
            modifiers: BTreeMap::new(),
            coerce: None,
            cast: BTreeMap::new(),
            validate: None,
            messages: Messages::new(),
            manifest: Vec::new(),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Ancestor type names, root first.
    pub fn lineage(&self) -> &[String] {
        &self.lineage
    }

    /// Returns `true` if `type_name` is this type or one of its ancestors.
    pub fn is_a(&self, type_name: &str) -> bool {
        self.type_name == type_name || self.lineage.iter().any(|t| t == type_name)
    }

    pub fn flag_default(&self, name: &str) -> Option<&Value> {
        self.flags.get(name)
    }

    pub fn flags(&self) -> &BTreeMap<String, Value> {
        &self.flags
    }

    pub fn terms(&self) -> &BTreeMap<String, TermInit> {
        &self.terms
    }

    pub fn rule(&self, name: &str) -> Option<&RuleDescriptor> {
        self.rules.get(name)
    }

    pub fn rules(&self) -> impl Iterator<Item = &RuleDescriptor> {
        self.rules.values()
    }

    pub fn modifier(&self, name: &str) -> Option<&Modifier> {
        self.modifiers.get(name)
    }

    pub fn coerce(&self) -> Option<&Coerce> {
        self.coerce.as_ref()
    }

    pub fn cast(&self, to: &str) -> Option<&Cast> {
        self.cast.get(to)
    }

    pub fn cast_targets(&self) -> impl Iterator<Item = &str> {
        self.cast.keys().map(String::as_str)
    }

    pub fn base_validate(&self) -> Option<&TypeValidate> {
        self.validate.as_ref()
    }

    pub fn messages(&self) -> &Messages {
        &self.messages
    }

    pub fn manifest_hooks(&self) -> &[ManifestHook] {
        &self.manifest
    }

    /// Returns the rule whose validate function and argument specs serve
    /// `name` (the rule itself, or its dispatch target).
    pub fn dispatch(&self, name: &str) -> Option<&RuleDescriptor> {
        let rule = self.rules.get(name)?;
        match rule.dispatch_method() {
            Some(method) if method != name => self.rules.get(method),
            _ => Some(rule),
        }
    }

    /// Default instance options for rule `name`: the dispatch target's
    /// options overlaid with the rule's own.
    pub fn default_options(&self, name: &str) -> Context {
        let mut options = self
            .dispatch(name)
            .map(|target| target.options().clone())
            .unwrap_or_default();
        if let Some(own) = self.rules.get(name) {
            options.extend(own.options().clone());
        }
        options
    }

    /// Applies a declared modifier to a rule instance.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownModifier`] when the type does not declare
    /// `name`, or whatever the modifier itself rejects.
    pub fn apply_modifier(&self, rule: &mut RuleInstance, name: &str, value: &Value) -> Result<()> {
        let modifier = self
            .modifiers
            .get(name)
            .ok_or_else(|| SchemaError::UnknownModifier(name.to_string()))?;
        modifier(rule, value)
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("type_name", &self.type_name)
            .field("lineage", &self.lineage)
            .field("flags", &self.flags)
            .field("terms", &self.terms)
            .field("rules", &self.rules.keys().collect::<Vec<_>>())
            .field("modifiers", &self.modifiers.keys().collect::<Vec<_>>())
            .field("coerce", &self.coerce)
            .field("cast", &self.cast.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Additions merged into a parent descriptor by [`extend`].
#[derive(Default)]
pub struct Extension {
    type_name: String,
    flags: BTreeMap<String, Value>,
    terms: BTreeMap<String, TermInit>,
    rules: Vec<RuleDescriptor>,
    modifiers: BTreeMap<String, Modifier>,
    coerce: Option<Coerce>,
    cast: BTreeMap<String, Cast>,
    validate: Option<TypeValidate>,
    messages: Vec<(String, MessageSource)>,
    manifest: Option<ManifestHook>,
}

impl Extension {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Default::default()
        }
    }

    pub fn flag(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.flags.insert(name.into(), default.into());
        self
    }

    pub fn term(mut self, name: impl Into<String>, init: TermInit) -> Self {
        self.terms.insert(name.into(), init);
        self
    }

    pub fn rule(mut self, rule: RuleDescriptor) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn modifier<F>(mut self, name: impl Into<String>, modifier: F) -> Self
    where
        F: Fn(&mut RuleInstance, &Value) -> Result<()> + Send + Sync + 'static,
    {
        self.modifiers.insert(name.into(), Arc::new(modifier));
        self
    }

    pub fn coerce(mut self, coerce: Coerce) -> Self {
        self.coerce = Some(coerce);
        self
    }

    pub fn cast(mut self, to: impl Into<String>, cast: Cast) -> Self {
        self.cast.insert(to.into(), cast);
        self
    }

    pub fn validate<F>(mut self, validate: F) -> Self
    where
        F: Fn(&Value, &Helpers<'_>) -> Option<BaseOutcome> + Send + Sync + 'static,
    {
        self.validate = Some(Arc::new(validate));
        self
    }

    pub fn message(mut self, code: impl Into<String>, source: impl Into<MessageSource>) -> Self {
        self.messages.push((code.into(), source.into()));
        self
    }

    pub fn manifest<F>(mut self, build: F) -> Self
    where
        F: Fn(Schema, &Description, &TypeRegistry) -> Result<Schema> + Send + Sync + 'static,
    {
        self.manifest = Some(Arc::new(build));
        self
    }
}

/// Merges `additions` into `base`, producing a new type descriptor.
///
/// New flags, terms, modifiers, casts and messages are added and override
/// same-named entries of `base`. A rule whose name already exists in `base`
/// is composed with the parent rule (see [`RuleDescriptor`]). The coercion
/// and base validation are replaced when the additions declare them, and
/// manifest hooks are chained parent first.
///
/// # Errors
///
/// Returns [`SchemaError::InvalidDeclaration`] when the type name, a flag,
/// term or rule name, or an argument name is empty; when argument names
/// repeat; when a rule dispatches to an unknown rule or ends up with no
/// validate function; when the coercion names an unknown representation;
/// or when a message template does not compile.
pub fn extend(base: &TypeDescriptor, additions: Extension) -> Result<TypeDescriptor> {
    let invalid = |message: String| SchemaError::InvalidDeclaration(message);

    let type_name = additions.type_name.trim().to_string();
    if type_name.is_empty() {
        return Err(invalid("type name cannot be empty".to_string()));
    }

    let mut lineage = base.lineage.clone();
    lineage.push(base.type_name.clone());

    let mut flags = base.flags.clone();
    for (name, default) in additions.flags {
        if name.trim().is_empty() {
            return Err(invalid(format!("type {type_name} declares a flag without a name")));
        }
        flags.insert(name, default);
    }

    let mut terms = base.terms.clone();
    for (name, init) in additions.terms {
        if name.trim().is_empty() {
            return Err(invalid(format!("type {type_name} declares a term without a name")));
        }
        terms.insert(name, init);
    }

    let mut rules = base.rules.clone();
    for rule in additions.rules {
        check_rule_shape(&type_name, &rule)?;
        let merged = match rules.get(rule.name()) {
            Some(parent) => RuleDescriptor::compose(parent, rule),
            None => rule,
        };
        rules.insert(merged.name().to_string(), merged);
    }

    for rule in rules.values() {
        let target = match rule.dispatch_method() {
            Some(method) => rules.get(method).ok_or_else(|| {
                invalid(format!(
                    "rule {} dispatches to unknown rule {method}",
                    rule.name()
                ))
            })?,
            None => rule,
        };
        if !target.has_validate() {
            return Err(invalid(format!(
                "rule {} of type {type_name} has no validate function",
                rule.name()
            )));
        }
    }

    let mut modifiers = base.modifiers.clone();
    modifiers.extend(additions.modifiers);

    let coerce = additions.coerce.or_else(|| base.coerce.clone());
    if let Some(coerce) = &coerce {
        if !REPRESENTATIONS.contains(&coerce.representation()) {
            return Err(invalid(format!(
                "type {type_name} coerces from unknown representation {}",
                coerce.representation()
            )));
        }
    }

    let mut cast = base.cast.clone();
    cast.extend(additions.cast);

    let mut messages = base.messages.clone();
    for (code, source) in additions.messages {
        if code.trim().is_empty() {
            return Err(invalid(format!("type {type_name} declares a message without a code")));
        }
        let message =
            compile(source).map_err(|err| invalid(format!("message {code}: {err}")))?;
        messages.insert(code, message);
    }

    let mut manifest = base.manifest.clone();
    manifest.extend(additions.manifest);

    debug!(type_name = %type_name, parent = %base.type_name, rules = rules.len(), "declared type");

    Ok(TypeDescriptor {
        type_name,
        lineage,
        flags,
        terms,
        rules,
        modifiers,
        coerce,
        cast,
        validate: additions.validate.or_else(|| base.validate.clone()),
        messages,
        manifest,
    })
}

fn check_rule_shape(type_name: &str, rule: &RuleDescriptor) -> Result<()> {
    let invalid = |message: String| SchemaError::InvalidDeclaration(message);

    if rule.name().trim().is_empty() {
        return Err(invalid(format!("type {type_name} declares a rule without a name")));
    }

    let mut seen = std::collections::HashSet::new();
    for spec in rule.args() {
        if spec.name().trim().is_empty() {
            return Err(invalid(format!(
                "rule {} declares an argument without a name",
                rule.name()
            )));
        }
        if !seen.insert(spec.name()) {
            return Err(invalid(format!(
                "rule {} declares argument {} twice",
                rule.name(),
                spec.name()
            )));
        }
    }
    Ok(())
}
