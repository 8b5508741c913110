//! The immutable schema value and its builder operations.
//!
//! A [`Schema`] binds a [`TypeDescriptor`] to concrete flag values, term
//! collections, an ordered list of rule instances, allowed/denied value sets
//! and preference overrides. Every builder takes `&self` and returns a new
//! schema, so a published schema can be shared as the base of many others.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use typeshape_core::*;
//!
//! let sized = extend(
//!     &TypeDescriptor::base(),
//!     Extension::new("sized")
//!         .rule(
//!             RuleDescriptor::new("max")
//!                 .arg(ArgSpec::new("limit").assert(|a| a.as_value().is_some_and(is_limit), "must be a positive integer"))
//!                 .validate(|value, helpers, args, _| {
//!                     let limit = args.value("limit").as_f64().unwrap_or(0.0);
//!                     match value.len() {
//!                         Some(len) if len as f64 <= limit => RuleOutcome::Pass,
//!                         _ => helpers.error("sized.max", Context::new()).into(),
//!                     }
//!                 }),
//!         )
//!         .message("sized.max", "{{#label}} is longer than {{#limit}}"),
//! )
//! .unwrap();
//!
//! let base = Schema::new(Arc::new(sized));
//! let schema = base.add_rule(Rule::new("max").arg("limit", 2)).unwrap();
//!
//! assert!(base.add_rule(Rule::new("max").arg("limit", -1)).is_err());
//! assert!(schema.validate(Value::from("ab")).is_ok());
//! assert_eq!(
//!     schema.validate(Value::from("abc")).errors[0].message,
//!     "\"value\" is longer than 2"
//! );
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::descriptor::{TermInit, TypeDescriptor};
use crate::error::{Result, SchemaError};
use crate::messages::MessageSource;
use crate::prefs::PreferenceOverrides;
use crate::reference::Reference;
use crate::rules::{Arg, Rule, RuleInstance};
use crate::terms::TermItem;
use crate::value::Value;
use crate::when::WhenTerm;

/// Presence flag values.
pub const PRESENCE_REQUIRED: &str = "required";
pub const PRESENCE_OPTIONAL: &str = "optional";
pub const PRESENCE_FORBIDDEN: &str = "forbidden";

/// A schema: an instance of a type with concrete settings.
#[derive(Debug, Clone)]
pub struct Schema {
    pub(crate) descriptor: Arc<TypeDescriptor>,
    pub(crate) flags: BTreeMap<String, Value>,
    pub(crate) terms: BTreeMap<String, Option<Vec<TermItem>>>,
    pub(crate) rules: Vec<RuleInstance>,
    pub(crate) valids: Vec<Value>,
    pub(crate) invalids: Vec<Value>,
    pub(crate) preferences: Option<PreferenceOverrides>,
    pub(crate) refs: Vec<Reference>,
}

impl Schema {
    /// Creates an empty schema of the given type with every declared term
    /// slot initialized.
    pub fn new(descriptor: Arc<TypeDescriptor>) -> Self {
        let terms = descriptor
            .terms()
            .iter()
            .map(|(name, init)| {
                let slot = match init {
                    TermInit::Null => None,
                    TermInit::Empty => Some(Vec::new()),
                };
                (name.clone(), slot)
            })
            .collect();

        Self {
            descriptor,
            flags: BTreeMap::new(),
            terms,
            rules: Vec::new(),
            valids: Vec::new(),
            invalids: Vec::new(),
            preferences: None,
            refs: Vec::new(),
        }
    }

    pub fn type_name(&self) -> &str {
        self.descriptor.type_name()
    }

    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    /// Returns the flag value, falling back to the type's default.
    pub fn flag(&self, name: &str) -> Option<&Value> {
        self.flags
            .get(name)
            .or_else(|| self.descriptor.flag_default(name))
    }

    /// Flags set on this schema (defaults excluded).
    pub fn flags(&self) -> &BTreeMap<String, Value> {
        &self.flags
    }

    pub fn rules(&self) -> &[RuleInstance] {
        &self.rules
    }

    pub fn valids(&self) -> &[Value] {
        &self.valids
    }

    pub fn invalids(&self) -> &[Value] {
        &self.invalids
    }

    pub fn preferences(&self) -> Option<&PreferenceOverrides> {
        self.preferences.as_ref()
    }

    /// External references used by this schema or its registered children.
    pub fn references(&self) -> &[Reference] {
        &self.refs
    }

    // -----------------------------------------------------------------------
    // Flags
    // -----------------------------------------------------------------------

    /// Sets a flag. Setting a flag to its default (or to `undefined`) clears
    /// it.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidValue`] for an empty flag name.
    pub fn set_flag(&self, name: &str, value: impl Into<Value>) -> Result<Schema> {
        if name.trim().is_empty() {
            return Err(SchemaError::InvalidValue("flag name cannot be empty".to_string()));
        }
        let value = value.into();
        let mut schema = self.clone();
        let is_default = match self.descriptor.flag_default(name) {
            Some(default) => *default == value,
            None => value.is_undefined(),
        };
        if is_default {
            schema.flags.remove(name);
        } else {
            schema.flags.insert(name.to_string(), value);
        }
        Ok(schema)
    }

    /// Sets the schema identifier used by [`shared`](Schema::shared).
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidValue`] for an empty id or one
    /// containing a period.
    pub fn id(&self, id: &str) -> Result<Schema> {
        if id.trim().is_empty() {
            return Err(SchemaError::InvalidValue("id must be a non-empty string".to_string()));
        }
        if id.contains('.') {
            return Err(SchemaError::InvalidValue(format!("id {id} cannot contain periods")));
        }
        self.set_flag("id", id)
    }

    /// Overrides the label used in error messages.
    pub fn label(&self, label: &str) -> Result<Schema> {
        if label.is_empty() {
            return Err(SchemaError::InvalidValue("label must be a non-empty string".to_string()));
        }
        self.set_flag("label", label)
    }

    pub fn required(&self) -> Result<Schema> {
        self.set_flag("presence", PRESENCE_REQUIRED)
    }

    pub fn optional(&self) -> Result<Schema> {
        self.set_flag("presence", Value::Undefined)
    }

    pub fn forbidden(&self) -> Result<Schema> {
        self.set_flag("presence", PRESENCE_FORBIDDEN)
    }

    /// Presence of this schema (`optional` unless set).
    pub fn presence(&self) -> &str {
        self.flag("presence")
            .and_then(Value::as_str)
            .unwrap_or(PRESENCE_OPTIONAL)
    }

    /// Requests casting valid values to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownCast`] when the type declares no such
    /// cast.
    pub fn cast(&self, to: &str) -> Result<Schema> {
        if self.descriptor.cast(to).is_none() {
            return Err(SchemaError::UnknownCast {
                type_name: self.type_name().to_string(),
                to: to.to_string(),
            });
        }
        self.set_flag("cast", to)
    }

    /// Attaches preference overrides applied whenever this schema validates.
    pub fn prefs(&self, overrides: PreferenceOverrides) -> Result<Schema> {
        let mut schema = self.clone();
        let merged = match &self.preferences {
            Some(existing) => existing.merge(&overrides),
            None => overrides,
        };
        schema.preferences = (!merged.is_empty()).then_some(merged);
        Ok(schema)
    }

    // -----------------------------------------------------------------------
    // Allowed and denied values
    // -----------------------------------------------------------------------

    /// Adds values that always pass, bypassing rules.
    pub fn allow<I, V>(&self, values: I) -> Result<Schema>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut schema = self.clone();
        for value in values {
            let value = value.into();
            if value.is_undefined() {
                return Err(SchemaError::InvalidValue("cannot allow undefined".to_string()));
            }
            schema.invalids.retain(|v| *v != value);
            if !schema.valids.contains(&value) {
                schema.valids.push(value);
            }
        }
        Ok(schema)
    }

    /// Restricts the schema to the given values.
    pub fn valid<I, V>(&self, values: I) -> Result<Schema>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.allow(values)?.set_flag("only", true)
    }

    /// Adds values that always fail with `any.invalid`.
    pub fn invalid<I, V>(&self, values: I) -> Result<Schema>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut schema = self.clone();
        for value in values {
            let value = value.into();
            if value.is_undefined() {
                return Err(SchemaError::InvalidValue("cannot deny undefined".to_string()));
            }
            schema.valids.retain(|v| *v != value);
            if !schema.invalids.contains(&value) {
                schema.invalids.push(value);
            }
        }
        Ok(schema)
    }

    // -----------------------------------------------------------------------
    // Rules
    // -----------------------------------------------------------------------

    /// Binds a rule to its arguments and inserts it.
    ///
    /// Arguments are checked against the argument specs of the rule (or of
    /// the rule it dispatches to): unknown names and references on
    /// literal-only arguments are rejected, and literal values must pass the
    /// argument's [`ArgSpec`](crate::rules::ArgSpec) assertion. A missing argument is asserted as `undefined`.
    /// Queued modifiers run on the new instance before it is inserted.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownRule`], [`SchemaError::UnexpectedArgument`],
    /// [`SchemaError::ReferenceNotAllowed`], [`SchemaError::InvalidArgument`]
    /// or whatever a queued modifier rejects.
    pub fn add_rule(&self, rule: Rule) -> Result<Schema> {
        let (name, args, options, warn, modifiers) = rule.into_parts();
        let unknown = || SchemaError::UnknownRule {
            type_name: self.type_name().to_string(),
            rule: name.clone(),
        };
        let own = self.descriptor.rule(&name).ok_or_else(unknown)?;
        let target = self.descriptor.dispatch(&name).ok_or_else(unknown)?;

        for arg_name in args.keys() {
            if !target.args().iter().any(|spec| spec.name() == arg_name.as_str()) {
                return Err(SchemaError::UnexpectedArgument {
                    rule: name.clone(),
                    arg: arg_name.clone(),
                });
            }
        }

        let missing = Arg::Value(Value::Undefined);
        for spec in target.args() {
            let arg = args.get(spec.name()).unwrap_or(&missing);
            if let Arg::Ref(_) = arg {
                if !spec.accepts_reference() {
                    return Err(SchemaError::ReferenceNotAllowed {
                        rule: name.clone(),
                        arg: spec.name().to_string(),
                    });
                }
                continue;
            }
            spec.check(arg).map_err(|reason| SchemaError::InvalidArgument {
                rule: name.clone(),
                arg: spec.name().to_string(),
                reason,
            })?;
        }

        let mut instance_options = self.descriptor.default_options(&name);
        instance_options.extend(options);

        let mut instance = RuleInstance::new(
            name.clone(),
            target.name().to_string(),
            args,
            instance_options,
            warn.unwrap_or_else(|| own.is_warn()),
        );
        for (modifier, value) in &modifiers {
            self.descriptor.apply_modifier(&mut instance, modifier, value)?;
        }

        let mut schema = self.clone();
        for reference in instance.references() {
            schema.register_reference(reference);
        }
        schema.insert_rule(instance, own.is_multi());
        Ok(schema)
    }

    /// Applies a declared modifier to the most recently added rule.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::EmptyRuleset`] when the schema has no rules,
    /// or [`SchemaError::UnknownModifier`].
    pub fn modify(&self, modifier: &str, value: impl Into<Value>) -> Result<Schema> {
        let value = value.into();
        let mut schema = self.clone();
        let last = schema
            .rules
            .last_mut()
            .ok_or_else(|| SchemaError::EmptyRuleset(modifier.to_string()))?;
        self.descriptor.apply_modifier(last, modifier, &value)?;
        Ok(schema)
    }

    /// Keeps the last rule when a later same-name rule is added.
    pub fn keep(&self) -> Result<Schema> {
        self.modify("keep", true)
    }

    /// Overrides the message of the last rule.
    pub fn message(&self, message: impl Into<MessageSource>) -> Result<Schema> {
        let value = match message.into() {
            MessageSource::Text(text) => Value::String(text),
            MessageSource::Localized(map) => Value::Object(
                map.into_iter()
                    .map(|(locale, text)| (locale, Value::String(text)))
                    .collect(),
            ),
        };
        self.modify("message", value)
    }

    /// Demotes failures of the last rule to warnings.
    pub fn warn(&self) -> Result<Schema> {
        self.modify("warn", true)
    }

    pub(crate) fn insert_rule(&mut self, instance: RuleInstance, multi: bool) {
        if !multi {
            self.rules
                .retain(|existing| existing.name() != instance.name() || existing.is_keep());
        }
        self.rules.push(instance);
    }

    // -----------------------------------------------------------------------
    // Composition
    // -----------------------------------------------------------------------

    /// Merges `other` into this schema.
    ///
    /// The result takes the more derived of the two types. Flags, allowed and
    /// denied values, preferences and terms of `other` are layered on top;
    /// its rules replace same-name single rules (unless kept) and are
    /// appended. When this schema has conditional branches the merge is
    /// deferred until they are resolved at validation time.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::IncompatibleTypes`] when neither type derives
    /// from the other.
    pub fn concat(&self, other: &Schema) -> Result<Schema> {
        let descriptor = self.merged_descriptor(other)?;

        if self.has_whens() {
            let mut schema = self.clone();
            schema
                .terms
                .entry("whens".to_string())
                .or_insert(None)
                .get_or_insert_with(Vec::new)
                .push(TermItem::When(WhenTerm::Concat(other.clone())));
            schema.register(other);
            return Ok(schema);
        }

        let mut schema = self.clone();
        if !Arc::ptr_eq(&descriptor, &self.descriptor) {
            schema.descriptor = descriptor;
            for (name, init) in schema.descriptor.terms() {
                schema.terms.entry(name.clone()).or_insert(match init {
                    TermInit::Null => None,
                    TermInit::Empty => Some(Vec::new()),
                });
            }
        }

        schema.flags.extend(other.flags.clone());

        for value in &other.valids {
            schema.invalids.retain(|v| v != value);
            if !schema.valids.contains(value) {
                schema.valids.push(value.clone());
            }
        }
        for value in &other.invalids {
            schema.valids.retain(|v| v != value);
            if !schema.invalids.contains(value) {
                schema.invalids.push(value.clone());
            }
        }

        if let Some(overrides) = &other.preferences {
            schema.preferences = Some(match &schema.preferences {
                Some(existing) => existing.merge(overrides),
                None => overrides.clone(),
            });
        }

        for instance in &other.rules {
            let multi = other
                .descriptor
                .rule(instance.name())
                .is_some_and(|rule| rule.is_multi());
            schema.insert_rule(instance.clone(), multi);
        }

        for (name, items) in &other.terms {
            let Some(items) = items else {
                schema.terms.entry(name.clone()).or_insert(None);
                continue;
            };
            schema
                .terms
                .entry(name.clone())
                .or_insert(None)
                .get_or_insert_with(Vec::new)
                .extend(items.iter().cloned());
        }

        schema.register(other);
        Ok(schema)
    }

    /// The type a merge of `self` and `other` ends up with: the more derived
    /// of the two.
    pub(crate) fn merged_descriptor(&self, other: &Schema) -> Result<Arc<TypeDescriptor>> {
        if self.type_name() == other.type_name() || self.descriptor.is_a(other.type_name()) {
            Ok(self.descriptor.clone())
        } else if other.descriptor.is_a(self.type_name()) {
            Ok(other.descriptor.clone())
        } else {
            Err(SchemaError::IncompatibleTypes {
                base: self.type_name().to_string(),
                other: other.type_name().to_string(),
            })
        }
    }

    pub(crate) fn has_whens(&self) -> bool {
        self.terms
            .get("whens")
            .and_then(Option::as_ref)
            .is_some_and(|items| !items.is_empty())
    }

    /// Links the external references of `child` into this schema.
    pub(crate) fn register(&mut self, child: &Schema) {
        for reference in &child.refs {
            self.register_reference(reference);
        }
    }

    pub(crate) fn register_reference(&mut self, reference: &Reference) {
        if reference.is_external() && !self.refs.contains(reference) {
            self.refs.push(reference.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::descriptor::{Extension, extend};
    use crate::rules::{ArgSpec, RuleDescriptor, RuleOutcome, is_limit};

    use super::*;

    fn test_type() -> Arc<TypeDescriptor> {
        let limit = || {
            ArgSpec::new("limit")
                .reference()
                .assert(|arg| arg.as_value().is_some_and(is_limit), "must be a positive integer")
        };
        Arc::new(
            extend(
                &TypeDescriptor::base(),
                Extension::new("test")
                    .flag("only", false)
                    .term("notes", TermInit::Empty)
                    .term("whens", TermInit::Null)
                    .rule(
                        RuleDescriptor::new("length")
                            .method("length")
                            .arg(limit())
                            .option("operator", "=")
                            .validate(|_, _, _, _| RuleOutcome::Pass),
                    )
                    .rule(RuleDescriptor::new("max").method("length").option("operator", "<="))
                    .rule(
                        RuleDescriptor::new("tag")
                            .arg(ArgSpec::new("name"))
                            .multi()
                            .validate(|_, _, _, _| RuleOutcome::Pass),
                    )
                    .modifier("keep", |rule: &mut RuleInstance, value: &Value| {
                        rule.set_keep(value.as_bool().unwrap_or(true));
                        Ok(())
                    }),
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_new_initializes_terms() {
        let schema = Schema::new(test_type());
        assert!(matches!(schema.terms.get("notes"), Some(Some(items)) if items.is_empty()));
        assert!(matches!(schema.terms.get("whens"), Some(None)));
        assert!(schema.terms.get("tags").is_none());
    }

    #[test]
    fn test_builders_do_not_mutate_base() {
        let base = Schema::new(test_type());
        let derived = base.add_rule(Rule::new("length").arg("limit", 3)).unwrap();
        assert!(base.rules().is_empty());
        assert_eq!(derived.rules().len(), 1);
        assert_eq!(derived.rules()[0].method(), "length");
    }

    #[test]
    fn test_single_rules_replace_and_multi_rules_append() {
        let schema = Schema::new(test_type())
            .add_rule(Rule::new("length").arg("limit", 3))
            .unwrap()
            .add_rule(Rule::new("length").arg("limit", 4))
            .unwrap()
            .add_rule(Rule::new("tag").arg("name", "a"))
            .unwrap()
            .add_rule(Rule::new("tag").arg("name", "b"))
            .unwrap();

        let names: Vec<_> = schema.rules().iter().map(RuleInstance::name).collect();
        assert_eq!(names, ["length", "tag", "tag"]);
        assert_eq!(schema.rules()[0].arg("limit").and_then(Arg::as_value), Some(&Value::from(4)));
    }

    #[test]
    fn test_kept_rule_survives_replacement() {
        let schema = Schema::new(test_type())
            .add_rule(Rule::new("length").arg("limit", 3))
            .unwrap()
            .keep()
            .unwrap()
            .add_rule(Rule::new("length").arg("limit", 4))
            .unwrap();
        assert_eq!(schema.rules().len(), 2);
    }

    #[test]
    fn test_dispatched_rule_uses_target_args_and_options() {
        let schema = Schema::new(test_type())
            .add_rule(Rule::new("max").arg("limit", 2))
            .unwrap();
        let rule = &schema.rules()[0];
        assert_eq!(rule.name(), "max");
        assert_eq!(rule.method(), "length");
        assert_eq!(rule.option("operator"), Some(&Value::from("<=")));
    }

    #[test]
    fn test_add_rule_rejects_bad_arguments() {
        let base = Schema::new(test_type());
        assert!(matches!(
            base.add_rule(Rule::new("length").arg("limit", -1)),
            Err(SchemaError::InvalidArgument { .. })
        ));
        assert!(matches!(
            base.add_rule(Rule::new("length")),
            Err(SchemaError::InvalidArgument { .. })
        ));
        assert!(matches!(
            base.add_rule(Rule::new("length").arg("limit", 1).arg("size", 2)),
            Err(SchemaError::UnexpectedArgument { .. })
        ));
        assert!(matches!(
            base.add_rule(Rule::new("tag").arg("name", Reference::parse("a").unwrap())),
            Err(SchemaError::ReferenceNotAllowed { .. })
        ));
        assert!(matches!(
            base.add_rule(Rule::new("unknown")),
            Err(SchemaError::UnknownRule { .. })
        ));
    }

    #[test]
    fn test_references_are_registered() {
        let schema = Schema::new(test_type())
            .add_rule(Rule::new("length").arg("limit", Reference::parse("size").unwrap()))
            .unwrap();
        assert_eq!(schema.references().len(), 1);
        assert_eq!(schema.references()[0].key(), "size");
    }

    #[test]
    fn test_modifiers_need_rules() {
        let base = Schema::new(test_type());
        assert!(matches!(base.keep(), Err(SchemaError::EmptyRuleset(_))));
        let with_rule = base.add_rule(Rule::new("length").arg("limit", 1)).unwrap();
        assert!(matches!(with_rule.warn(), Err(SchemaError::UnknownModifier(_))));
    }

    #[test]
    fn test_set_flag_clears_defaults() {
        let schema = Schema::new(test_type());
        let only = schema.set_flag("only", true).unwrap();
        assert_eq!(only.flag("only"), Some(&Value::Bool(true)));
        let cleared = only.set_flag("only", false).unwrap();
        assert!(cleared.flags().is_empty());
        assert_eq!(cleared.flag("only"), Some(&Value::Bool(false)));
    }

    #[test]
    fn test_valid_and_invalid_sets() {
        let schema = Schema::new(test_type())
            .valid(["a", "b"])
            .unwrap()
            .invalid(["b"])
            .unwrap();
        assert_eq!(schema.valids(), [Value::from("a")]);
        assert_eq!(schema.invalids(), [Value::from("b")]);
        assert_eq!(schema.flag("only"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_id_and_label_validation() {
        let schema = Schema::new(test_type());
        assert!(schema.id("a.b").is_err());
        assert!(schema.id("").is_err());
        assert!(schema.label("").is_err());
        assert_eq!(schema.id("blob").unwrap().flag("id"), Some(&Value::from("blob")));
    }

    #[test]
    fn test_presence_flags() {
        let schema = Schema::new(test_type());
        assert_eq!(schema.presence(), PRESENCE_OPTIONAL);
        let required = schema.required().unwrap();
        assert_eq!(required.presence(), PRESENCE_REQUIRED);
        assert_eq!(required.optional().unwrap().presence(), PRESENCE_OPTIONAL);
        assert_eq!(schema.forbidden().unwrap().presence(), PRESENCE_FORBIDDEN);
    }

    #[test]
    fn test_cast_requires_declared_target() {
        let schema = Schema::new(test_type());
        assert!(matches!(schema.cast("string"), Err(SchemaError::UnknownCast { .. })));
    }

    #[test]
    fn test_concat_merges_rules_flags_and_values() {
        let left = Schema::new(test_type())
            .add_rule(Rule::new("length").arg("limit", 3))
            .unwrap()
            .add_rule(Rule::new("tag").arg("name", "a"))
            .unwrap()
            .allow(["x"])
            .unwrap();
        let right = Schema::new(test_type())
            .add_rule(Rule::new("length").arg("limit", 5))
            .unwrap()
            .add_rule(Rule::new("tag").arg("name", "b"))
            .unwrap()
            .label("size")
            .unwrap()
            .invalid(["x"])
            .unwrap();

        let merged = left.concat(&right).unwrap();
        let names: Vec<_> = merged.rules().iter().map(RuleInstance::name).collect();
        assert_eq!(names, ["tag", "length", "tag"]);
        assert_eq!(merged.flag("label"), Some(&Value::from("size")));
        assert!(merged.valids().is_empty());
        assert_eq!(merged.invalids(), [Value::from("x")]);
    }

    #[test]
    fn test_concat_rejects_unrelated_types() {
        let other = Arc::new(extend(&TypeDescriptor::base(), Extension::new("other")).unwrap());
        let result = Schema::new(test_type()).concat(&Schema::new(other));
        assert!(matches!(result, Err(SchemaError::IncompatibleTypes { .. })));
    }

    #[test]
    fn test_concat_takes_derived_type() {
        let parent = test_type();
        let child = Arc::new(extend(&parent, Extension::new("child")).unwrap());
        let merged = Schema::new(parent).concat(&Schema::new(child)).unwrap();
        assert_eq!(merged.type_name(), "child");
    }
}
