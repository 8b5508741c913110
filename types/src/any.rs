//! The root `any` type.
//!
//! Every built-in type extends `any`. It declares the `only` flag, the
//! annotation and composition terms, the `custom` and `warning` rules, the
//! `keep`/`message`/`warn` modifiers and the manifest hook that replays
//! those terms when a schema is rebuilt from a [`Description`].

use std::sync::{Arc, LazyLock};

use tracing::warn;
use typeshape_core::{
    Arg, ArgSpec, Args, Context, CustomResult, CustomValidator, Description, Extension, Helpers,
    MessageSource, Messages, PreferenceOverrides, Result, Rule, RuleDescriptor, RuleInstance,
    RuleOutcome, Schema, SchemaError, SwitchCase, TermInit, TypeDescriptor, TypeRegistry, Value,
    WhenDescription, WhenOptions, compile, extend, isolate,
};

static ANY: LazyLock<Arc<TypeDescriptor>> = LazyLock::new(|| {
    Arc::new(extend(&TypeDescriptor::base(), declaration()).expect("built-in any type must be well formed"))
});

/// Descriptor of the `any` type.
pub fn any_type() -> Arc<TypeDescriptor> {
    ANY.clone()
}

/// An empty `any` schema.
pub fn any() -> Schema {
    Schema::new(any_type())
}

fn declaration() -> Extension {
    Extension::new("any")
        .flag("only", false)
        .term("alterations", TermInit::Null)
        .term("examples", TermInit::Null)
        .term("externals", TermInit::Null)
        .term("metas", TermInit::Empty)
        .term("notes", TermInit::Empty)
        .term("shared", TermInit::Null)
        .term("tags", TermInit::Empty)
        .term("whens", TermInit::Null)
        .rule(
            RuleDescriptor::new("custom")
                .arg(ArgSpec::new("method").assert(Arg::is_func, "must be a function"))
                .arg(ArgSpec::new("description").assert(
                    |arg| match arg.as_value() {
                        Some(Value::Undefined) => true,
                        Some(Value::String(text)) => !text.is_empty(),
                        _ => false,
                    },
                    "must be a non-empty string",
                ))
                .multi()
                .validate(validate_custom),
        )
        .rule(
            RuleDescriptor::new("warning")
                .arg(ArgSpec::new("code").assert(
                    |arg| arg.as_value().and_then(Value::as_str).is_some_and(|code| !code.is_empty()),
                    "must be a non-empty string",
                ))
                .arg(ArgSpec::new("local").assert(
                    |arg| matches!(arg.as_value(), Some(Value::Undefined | Value::Object(_))),
                    "must be an object",
                ))
                .multi()
                .warn()
                .validate(|_, helpers, args, _| {
                    let code = args.value("code").as_str().unwrap_or("any.warning");
                    let local = args.value("local").as_object().cloned().unwrap_or_default();
                    helpers.error(code, local).into()
                }),
        )
        .modifier("keep", |rule, value| {
            rule.set_keep(enabled("keep", value)?);
            Ok(())
        })
        .modifier("message", |rule, value| {
            rule.set_message(compile(MessageSource::from_value(value)?)?);
            Ok(())
        })
        .modifier("warn", |rule, value| {
            rule.set_warn(enabled("warn", value)?);
            Ok(())
        })
        .message("any.custom", "{{#label}} failed custom validation because {{#error.message}}")
        .message("any.invalid", "{{#label}} contains an invalid value")
        .message(
            "any.only",
            "{{#label}} must be {if(#valids.length == 1, \"\", \"one of \")}{{#valids}}",
        )
        .message("any.ref", "{{#label}} {{#arg}} references {{:#ref}} which {{#reason}}")
        .message("any.required", "{{#label}} is required")
        .message("any.unknown", "{{#label}} is not allowed")
        .manifest(build_terms)
}

/// Reads a modifier's on/off value. `undefined` means on.
fn enabled(modifier: &str, value: &Value) -> Result<bool> {
    match value {
        Value::Undefined => Ok(true),
        Value::Bool(enabled) => Ok(*enabled),
        other => Err(SchemaError::InvalidValue(format!(
            "{modifier} expects a boolean, got {}",
            other.representation()
        ))),
    }
}

fn validate_custom(value: &Value, helpers: &Helpers<'_>, args: &Args, _: &RuleInstance) -> RuleOutcome {
    let Some(method) = args.func("method") else {
        return RuleOutcome::Pass;
    };

    let reason = match isolate(|| method.call(value, helpers)) {
        Ok(Ok(outcome)) => return outcome,
        Ok(Err(err)) => err.to_string(),
        Err(panic) => {
            warn!(label = %helpers.label(), panic = %panic, "custom validator panicked");
            panic
        }
    };

    let mut error = Context::new();
    error.insert("message".to_string(), Value::String(reason));
    let mut local = Context::new();
    local.insert("error".to_string(), Value::Object(error));
    helpers.error("any.custom", local).into()
}

fn build_terms(mut schema: Schema, description: &Description, registry: &TypeRegistry) -> Result<Schema> {
    for example in &description.examples {
        schema = schema.example(example.clone())?;
    }
    for external in &description.externals {
        schema = schema.external(external.clone())?;
    }
    for meta in &description.metas {
        schema = schema.meta(meta.clone())?;
    }
    for note in &description.notes {
        schema = schema.note(annotation("notes", note)?)?;
    }
    for tag in &description.tags {
        schema = schema.tag(annotation("tags", tag)?)?;
    }

    if !description.alterations.is_empty() {
        schema = schema.alter(
            description
                .alterations
                .iter()
                .map(|alteration| (alteration.target.clone(), alteration.adjuster.clone())),
        )?;
    }

    for when in &description.whens {
        schema = build_when(schema, when, registry)?;
    }

    for shared in &description.shared {
        schema = schema.shared(registry.build(shared)?)?;
    }

    Ok(schema)
}

fn annotation<'a>(term: &str, value: &'a Value) -> Result<&'a str> {
    value.as_str().ok_or_else(|| {
        SchemaError::InvalidDescription(format!(
            "{term} entries must be strings, got {}",
            value.representation()
        ))
    })
}

fn build_when(schema: Schema, when: &WhenDescription, registry: &TypeRegistry) -> Result<Schema> {
    let nested = |description: &Option<Box<Description>>| -> Result<Option<Schema>> {
        description
            .as_deref()
            .map(|description| registry.build(description))
            .transpose()
    };

    if let Some(concat) = &when.concat {
        return schema.concat(&registry.build(concat)?);
    }

    let mut options = WhenOptions::new();
    if let Some(then) = nested(&when.then)? {
        options = options.then(then);
    }
    if let Some(otherwise) = nested(&when.otherwise)? {
        options = options.otherwise(otherwise);
    }
    if when.break_ {
        options = options.break_on_match();
    }

    let Some(reference) = &when.reference else {
        let is = nested(&when.is)?.ok_or_else(|| {
            SchemaError::InvalidDescription("a when without ref must describe is".to_string())
        })?;
        return schema.when(is, options);
    };

    if let Some(is) = nested(&when.is)? {
        options = options.is(is);
    }
    if let Some(not) = nested(&when.not)? {
        options = options.not(not);
    }
    for case in &when.switch {
        let mut switch = SwitchCase::new(registry.build(&case.is)?, registry.build(&case.then)?);
        if let Some(otherwise) = &case.otherwise {
            switch = switch.otherwise(registry.build(otherwise)?);
        }
        options = options.switch(switch);
    }
    schema.when(reference.clone(), options)
}

/// Builders provided by the `any` type to every schema that extends it.
pub trait AnySchema {
    /// Adds a custom validator. An `Err` or a panic from `method` is reported
    /// as a single `any.custom` error.
    fn custom<F>(&self, method: F, description: Option<&str>) -> Result<Schema>
    where
        F: Fn(&Value, &Helpers<'_>) -> CustomResult + Send + Sync + 'static;

    /// Adds a rule that always produces the `code` warning.
    fn warning(&self, code: &str, local: Option<Context>) -> Result<Schema>;

    /// Overrides error messages for this schema.
    fn messages(&self, messages: Messages) -> Result<Schema>;

    fn example(&self, value: impl Into<Value>) -> Result<Schema>;
    fn external(&self, value: impl Into<Value>) -> Result<Schema>;
    fn meta(&self, value: impl Into<Value>) -> Result<Schema>;
    fn note(&self, note: &str) -> Result<Schema>;
    fn tag(&self, tag: &str) -> Result<Schema>;
}

impl AnySchema for Schema {
    fn custom<F>(&self, method: F, description: Option<&str>) -> Result<Schema>
    where
        F: Fn(&Value, &Helpers<'_>) -> CustomResult + Send + Sync + 'static,
    {
        let mut rule = Rule::new("custom").arg("method", CustomValidator::new(method));
        if let Some(description) = description {
            rule = rule.arg("description", Value::from(description));
        }
        self.add_rule(rule)
    }

    fn warning(&self, code: &str, local: Option<Context>) -> Result<Schema> {
        let mut rule = Rule::new("warning").arg("code", Value::from(code));
        if let Some(local) = local {
            rule = rule.arg("local", Value::from(local));
        }
        self.add_rule(rule)
    }

    fn messages(&self, messages: Messages) -> Result<Schema> {
        self.prefs(PreferenceOverrides {
            messages,
            ..Default::default()
        })
    }

    fn example(&self, value: impl Into<Value>) -> Result<Schema> {
        self.add_term("examples", defined("example", value.into())?)
    }

    fn external(&self, value: impl Into<Value>) -> Result<Schema> {
        self.add_term("externals", defined("external", value.into())?)
    }

    fn meta(&self, value: impl Into<Value>) -> Result<Schema> {
        self.add_term("metas", defined("meta", value.into())?)
    }

    fn note(&self, note: &str) -> Result<Schema> {
        self.add_term("notes", Value::from(non_empty("note", note)?))
    }

    fn tag(&self, tag: &str) -> Result<Schema> {
        self.add_term("tags", Value::from(non_empty("tag", tag)?))
    }
}

fn defined(what: &str, value: Value) -> Result<Value> {
    if value.is_undefined() {
        return Err(SchemaError::InvalidValue(format!("{what} cannot be undefined")));
    }
    Ok(value)
}

fn non_empty<'a>(what: &str, text: &'a str) -> Result<&'a str> {
    if text.trim().is_empty() {
        return Err(SchemaError::InvalidValue(format!("{what} must be a non-empty string")));
    }
    Ok(text)
}
