//! The validation pipeline.
//!
//! Steps, in order:
//!
//! 1. schema-level preference overrides are layered over the caller's;
//! 2. conditional branches are resolved and validation restarts on the
//!    resolved schema;
//! 3. coercion, when `convert` is on and the representation matches;
//! 4. presence (`any.required`, `any.unknown`);
//! 5. allowed values (which finish validation early), `only`, denied values;
//! 6. the type's base validation, whose errors stop validation;
//! 7. rules in registration order, references resolved and asserted first;
//! 8. casting, when requested and no hard error was produced.
//!
//! Validation never fails: problems are reported in the returned
//! [`ValidationReport`].

use std::borrow::Cow;
use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{ValidationError, ValidationReport};
use crate::prefs::Preferences;
use crate::reference::State;
use crate::rules::{Arg, Args, Helpers, RuleInstance, RuleOutcome};
use crate::schema::{PRESENCE_FORBIDDEN, PRESENCE_REQUIRED, Schema};
use crate::value::{Context, Value};

impl Schema {
    /// Validates a value with default preferences at the root position.
    pub fn validate(&self, value: impl Into<Value>) -> ValidationReport {
        self.validate_with(value, &Preferences::default(), &State::new())
    }

    /// Validates a value with explicit preferences and position.
    ///
    /// `state` supplies the path used for labels and the ancestors that
    /// sibling and parent references resolve against.
    pub fn validate_with(
        &self,
        value: impl Into<Value>,
        prefs: &Preferences,
        state: &State,
    ) -> ValidationReport {
        let value = value.into();
        let prefs = match &self.preferences {
            Some(overrides) => Cow::Owned(prefs.with_overrides(overrides)),
            None => Cow::Borrowed(prefs),
        };

        if let Some(resolved) = self.resolve_whens(&value, state, &prefs) {
            return resolved.validate_with(value, &prefs, state);
        }

        let report = Run {
            schema: self,
            prefs: &prefs,
            state,
            original: &value,
        }
        .execute();

        debug!(
            type_name = self.type_name(),
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "validated value"
        );
        report
    }
}

struct Run<'a> {
    schema: &'a Schema,
    prefs: &'a Preferences,
    state: &'a State,
    original: &'a Value,
}

impl<'a> Run<'a> {
    fn helpers<'b>(&'b self, value: &'b Value) -> Helpers<'b> {
        Helpers::new(self.schema, self.state, self.prefs, value, self.original)
    }

    fn error(&self, code: &str, value: &Value, local: Context) -> ValidationError {
        Helpers::new(self.schema, self.state, self.prefs, value, self.original).error(code, local)
    }

    fn execute(&self) -> ValidationReport {
        let schema = self.schema;
        let mut value = self.original.clone();
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if self.prefs.convert && !value.is_undefined() {
            if let Some(coerce) = schema.descriptor().coerce() {
                let coerced = coerce.apply(&value, &self.helpers(self.original));
                if let Some(coerced) = coerced {
                    value = coerced;
                }
            }
        }

        let presence = schema.presence();
        if value.is_undefined() {
            if presence == PRESENCE_REQUIRED {
                errors.push(self.error("any.required", &value, Context::new()));
            }
            return ValidationReport {
                value,
                errors,
                warnings,
            };
        }
        if presence == PRESENCE_FORBIDDEN {
            errors.push(self.error("any.unknown", &value, Context::new()));
            return ValidationReport {
                value,
                errors,
                warnings,
            };
        }

        if schema.valids().contains(&value) {
            return self.finish(value, errors, warnings);
        }
        if schema.flag("only").and_then(Value::as_bool) == Some(true) {
            let mut local = Context::new();
            local.insert("valids".to_string(), Value::Array(schema.valids().to_vec()));
            errors.push(self.error("any.only", &value, local));
            if self.prefs.abort_early {
                return self.finish(value, errors, warnings);
            }
        }
        if schema.invalids().contains(&value) {
            let mut local = Context::new();
            local.insert("invalids".to_string(), Value::Array(schema.invalids().to_vec()));
            errors.push(self.error("any.invalid", &value, local));
            if self.prefs.abort_early {
                return self.finish(value, errors, warnings);
            }
        }

        if let Some(base) = schema.descriptor().base_validate() {
            let outcome = base(&value, &self.helpers(&value));
            if let Some(outcome) = outcome {
                value = outcome.value;
                if !outcome.errors.is_empty() {
                    errors.extend(outcome.errors);
                    return self.finish(value, errors, warnings);
                }
            }
        }

        for rule in schema.rules() {
            let args = match self.resolve_args(rule, &value) {
                Ok(args) => args,
                Err(error) => {
                    errors.push(error);
                    if self.prefs.abort_early {
                        break;
                    }
                    continue;
                }
            };
            let Some(validate) = schema
                .descriptor()
                .rule(rule.method())
                .and_then(|definition| definition.validator())
            else {
                continue;
            };

            let outcome = validate(&value, &self.helpers(&value).with_rule(rule), &args, rule);
            match outcome {
                RuleOutcome::Pass => {}
                RuleOutcome::Value(corrected) => value = corrected,
                RuleOutcome::Errors(found) if found.is_empty() => {}
                RuleOutcome::Errors(found) if rule.is_warn() => warnings.extend(found),
                RuleOutcome::Errors(found) => {
                    errors.extend(found);
                    if self.prefs.abort_early {
                        break;
                    }
                }
            }
        }

        self.finish(value, errors, warnings)
    }

    /// Resolves reference arguments and re-runs their assertions. A failed
    /// assertion becomes an `any.ref` error.
    fn resolve_args(&self, rule: &RuleInstance, value: &Value) -> Result<Args, ValidationError> {
        let definition = self.schema.descriptor().rule(rule.method());
        let mut resolved = BTreeMap::new();

        for (name, arg) in rule.args() {
            let Arg::Ref(reference) = arg else {
                resolved.insert(name.clone(), arg.clone());
                continue;
            };
            let target = Arg::Value(reference.resolve(value, self.state, self.prefs));
            let spec = definition.and_then(|d| d.args().iter().find(|spec| spec.name() == name.as_str()));
            if let Some(Err(reason)) = spec.map(|spec| spec.check(&target)) {
                let mut local = Context::new();
                local.insert("ref".to_string(), Value::String(reference.to_string()));
                local.insert("arg".to_string(), Value::from(name.as_str()));
                local.insert("reason".to_string(), Value::String(reason));
                return Err(self.error("any.ref", value, local));
            }
            resolved.insert(name.clone(), target);
        }

        Ok(Args::new(resolved))
    }

    fn finish(
        &self,
        value: Value,
        errors: Vec<ValidationError>,
        warnings: Vec<ValidationError>,
    ) -> ValidationReport {
        let mut report = ValidationReport {
            value,
            errors,
            warnings,
        };
        if !report.errors.is_empty() || !self.prefs.convert || report.value.is_undefined() {
            return report;
        }

        let cast = self
            .schema
            .flag("cast")
            .and_then(Value::as_str)
            .and_then(|to| self.schema.descriptor().cast(to));
        if let Some(cast) = cast {
            let current = report.value.clone();
            let casted = cast.apply(
                current,
                &Helpers::new(self.schema, self.state, self.prefs, &report.value, self.original),
            );
            report.value = casted;
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::coerce::{Cast, Coerce};
    use crate::descriptor::{BaseOutcome, Extension, TypeDescriptor, extend};
    use crate::prefs::PreferenceOverrides;
    use crate::reference::Reference;
    use crate::rules::{ArgSpec, Rule, RuleDescriptor, compare, is_limit};

    use super::*;

    /// A small text type: coerces numbers to strings, rejects non-strings,
    /// checks lengths and can cast to a number of characters.
    fn text() -> Schema {
        let descriptor = extend(
            &TypeDescriptor::base(),
            Extension::new("text")
                .flag("only", false)
                .coerce(Coerce::new("number", |value: &Value, _: &Helpers<'_>| {
                    Ok(value.as_f64().map(|n| Value::String(n.to_string())))
                }))
                .validate(|value: &Value, helpers: &Helpers<'_>| {
                    if value.as_str().is_some() {
                        return None;
                    }
                    Some(BaseOutcome {
                        value: value.clone(),
                        errors: vec![helpers.error("text.base", Context::new())],
                    })
                })
                .rule(
                    RuleDescriptor::new("length")
                        .method("length")
                        .arg(
                            ArgSpec::new("limit")
                                .reference()
                                .assert(|arg| arg.as_value().is_some_and(is_limit), "must be a positive integer"),
                        )
                        .option("operator", "=")
                        .validate(|value, helpers, args, rule| {
                            let len = value.len().unwrap_or(0) as f64;
                            let limit = args.value("limit").as_f64().unwrap_or(0.0);
                            let operator = rule.option("operator").and_then(Value::as_str).unwrap_or("=");
                            if compare(len, limit, operator) {
                                return RuleOutcome::Pass;
                            }
                            let mut local = Context::new();
                            local.insert("limit".into(), Value::from(limit));
                            helpers.error(&format!("text.{}", rule.name()), local).into()
                        }),
                )
                .rule(RuleDescriptor::new("max").method("length").option("operator", "<="))
                .rule(
                    RuleDescriptor::new("trim")
                        .validate(|value, _, _, _| Value::from(value.as_str().unwrap_or("").trim()).into()),
                )
                .rule(
                    RuleDescriptor::new("lower")
                        .multi()
                        .validate(|value, helpers, _, _| {
                            match value.as_str() {
                                Some(s) if s.chars().all(|c| !c.is_uppercase()) => RuleOutcome::Pass,
                                _ => helpers.error("text.lower", Context::new()).into(),
                            }
                        }),
                )
                .modifier("warn", |rule: &mut RuleInstance, value: &Value| {
                    rule.set_warn(value.as_bool().unwrap_or(true));
                    Ok(())
                })
                .cast("number", Cast::new(|v| v.as_str().is_some(), |v, _| Value::from(v.len().unwrap_or(0))))
                .message("text.base", "{{#label}} must be text")
                .message("text.length", "{{#label}} must have {{#limit}} characters")
                .message("text.max", "{{#label}} must have at most {{#limit}} characters")
                .message("text.lower", "{{#label}} must be lowercase")
                .message("any.required", "{{#label}} is required")
                .message("any.unknown", "{{#label}} is not allowed")
                .message("any.only", "{{#label}} must be one of {{#valids}}")
                .message("any.invalid", "{{#label}} contains an invalid value")
                .message("any.ref", "{{#label}} {{#arg}} references {{:#ref}} which {{#reason}}"),
        )
        .unwrap();
        Schema::new(Arc::new(descriptor))
    }

    #[test]
    fn test_coercion_then_rules() {
        let schema = text().add_rule(Rule::new("length").arg("limit", 1)).unwrap();
        let report = schema.validate(5);
        assert!(report.is_ok());
        assert_eq!(report.value, Value::from("5"));
    }

    #[test]
    fn test_convert_off_skips_coercion() {
        let prefs = Preferences {
            convert: false,
            ..Default::default()
        };
        let report = text().validate_with(5, &prefs, &State::new());
        assert_eq!(report.errors[0].code, "text.base");
        assert_eq!(report.errors[0].message, "\"value\" must be text");
    }

    #[test]
    fn test_presence() {
        assert!(text().validate(Value::Undefined).is_ok());
        let required = text().required().unwrap().validate(Value::Undefined);
        assert_eq!(required.errors[0].code, "any.required");
        let forbidden = text().forbidden().unwrap();
        assert!(forbidden.validate(Value::Undefined).is_ok());
        assert_eq!(forbidden.validate("a").errors[0].code, "any.unknown");
    }

    #[test]
    fn test_allowed_values_bypass_rules() {
        let schema = text()
            .add_rule(Rule::new("length").arg("limit", 10))
            .unwrap()
            .allow([Value::Null])
            .unwrap();
        assert!(schema.validate(Value::Null).is_ok());
        assert_eq!(schema.validate(true).errors[0].code, "text.base");
    }

    #[test]
    fn test_only_and_invalid() {
        let only = text().valid(["a", "b"]).unwrap();
        let report = only.validate("c");
        assert_eq!(report.errors[0].code, "any.only");
        assert_eq!(report.errors[0].message, "\"value\" must be one of [a, b]");

        let denied = text().invalid(["x"]).unwrap();
        assert_eq!(denied.validate("x").errors[0].code, "any.invalid");
        assert!(denied.validate("y").is_ok());
    }

    #[test]
    fn test_rule_corrections_flow_to_later_rules() {
        let schema = text()
            .add_rule(Rule::new("trim"))
            .unwrap()
            .add_rule(Rule::new("max").arg("limit", 2))
            .unwrap();
        let report = schema.validate("  ab  ");
        assert!(report.is_ok());
        assert_eq!(report.value, Value::from("ab"));
    }

    #[test]
    fn test_abort_early_and_collect_all() {
        let schema = text()
            .add_rule(Rule::new("length").arg("limit", 1))
            .unwrap()
            .add_rule(Rule::new("lower"))
            .unwrap();
        assert_eq!(schema.validate("AB").errors.len(), 1);

        let prefs = Preferences {
            abort_early: false,
            ..Default::default()
        };
        let codes: Vec<_> = schema
            .validate_with("AB", &prefs, &State::new())
            .errors
            .into_iter()
            .map(|e| e.code)
            .collect();
        assert_eq!(codes, ["text.length", "text.lower"]);
    }

    #[test]
    fn test_warnings_do_not_fail() {
        let schema = text()
            .add_rule(Rule::new("lower"))
            .unwrap()
            .warn()
            .unwrap()
            .add_rule(Rule::new("max").arg("limit", 5))
            .unwrap();
        let report = schema.validate("ABC");
        assert!(report.is_ok());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].code, "text.lower");
    }

    #[test]
    fn test_reference_arguments() {
        let schema = text()
            .add_rule(Rule::new("length").arg("limit", Reference::parse("size").unwrap()))
            .unwrap();
        let state = |size: serde_json::Value| {
            State::new()
                .with_path("name")
                .with_ancestor(Value::from(serde_json::json!({ "size": size })))
        };
        let prefs = Preferences::default();

        assert!(schema.validate_with("abc", &prefs, &state(serde_json::json!(3))).is_ok());

        let wrong = schema.validate_with("ab", &prefs, &state(serde_json::json!(3)));
        assert_eq!(wrong.errors[0].message, "\"name\" must have 3 characters");

        let invalid = schema.validate_with("ab", &prefs, &state(serde_json::json!(-1)));
        assert_eq!(invalid.errors[0].code, "any.ref");
        assert_eq!(
            invalid.errors[0].message,
            "\"name\" limit references ref:size which must be a positive integer"
        );
    }

    #[test]
    fn test_cast_runs_only_on_success() {
        let schema = text()
            .add_rule(Rule::new("max").arg("limit", 3))
            .unwrap()
            .cast("number")
            .unwrap();
        assert_eq!(schema.validate("abc").value, Value::from(3));
        let failed = schema.validate("abcd");
        assert!(!failed.is_ok());
        assert_eq!(failed.value, Value::from("abcd"));
    }

    #[test]
    fn test_schema_preferences_apply() {
        let schema = text()
            .add_rule(Rule::new("length").arg("limit", 1))
            .unwrap()
            .add_rule(Rule::new("lower"))
            .unwrap()
            .prefs(PreferenceOverrides {
                abort_early: Some(false),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(schema.validate("AB").errors.len(), 2);
    }

    #[test]
    fn test_label_flag_and_path() {
        let schema = text().label("Title").unwrap();
        assert_eq!(schema.validate(true).errors[0].message, "\"Title\" must be text");

        let state = State::new().with_path("meta").with_path("title");
        let report = text().validate_with(true, &Preferences::default(), &state);
        assert_eq!(report.errors[0].message, "\"meta.title\" must be text");
        assert_eq!(report.errors[0].path, ["meta", "title"]);
    }
}
