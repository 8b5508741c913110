//! Integration tests for the typeshape-types crate.

use std::sync::Arc;
use std::thread;

use serde_json::json;
use typeshape_types::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn describe_json(schema: &Schema) -> serde_json::Value {
    serde_json::to_value(schema.describe()).unwrap()
}

/// Rebuilds through JSON text, the way a stored description is loaded.
fn rebuild_from_json(schema: &Schema) -> Schema {
    let text = serde_json::to_string(&schema.describe()).unwrap();
    registry().build(&Description::from_json_str(&text).unwrap()).unwrap()
}

/// Rebuilds from the in-memory description, keeping functions intact.
fn rebuild_in_memory(schema: &Schema) -> Schema {
    registry().build(&schema.describe()).unwrap()
}

fn reference(key: &str) -> Reference {
    Reference::parse(key).unwrap()
}

fn sibling_state(parent: serde_json::Value) -> State {
    State::new().with_path("payload").with_ancestor(Value::from(parent))
}

fn assert_round_trip(schema: &Schema) {
    let original = describe_json(schema);
    let rebuilt = rebuild_from_json(schema);
    assert_eq!(describe_json(&rebuilt), original);
    assert_eq!(describe_json(&rebuild_from_json(&rebuilt)), original);
}

// ---------------------------------------------------------------------------
// End-to-end
// ---------------------------------------------------------------------------

#[test]
fn test_binary_length_end_to_end() {
    let schema = binary().length(3).unwrap();
    let report = schema.validate("5");

    assert_eq!(report.value, Value::Bytes(b"5".to_vec()));
    assert_eq!(report.errors.len(), 1);
    let error = &report.errors[0];
    assert_eq!(error.code, "binary.length");
    assert_eq!(error.context_value("limit"), Some(&Value::from(3)));
    assert_eq!(error.message, "\"value\" must be 3 bytes");
    assert!(report.warnings.is_empty());
}

#[test]
fn test_binary_accepts_buffers_and_strings() {
    let schema = binary().min(2).unwrap().max(4).unwrap();
    assert!(schema.validate(vec![1u8, 2, 3]).is_ok());
    assert!(schema.validate("abc").is_ok());
    assert_eq!(schema.validate("abcde").errors[0].code, "binary.max");
}

#[test]
fn test_label_in_messages() {
    let report = binary()
        .label("Payload")
        .unwrap()
        .max(1)
        .unwrap()
        .validate("ab");
    assert_eq!(
        report.errors[0].message,
        "\"Payload\" must be less than or equal to 1 bytes"
    );
}

// ---------------------------------------------------------------------------
// Manifest idempotence
// ---------------------------------------------------------------------------

#[test]
fn test_manifest_flags_and_rules() {
    let schema = binary()
        .encoding("base64")
        .unwrap()
        .cast("string")
        .unwrap()
        .id("blob")
        .unwrap()
        .min(1)
        .unwrap()
        .keep()
        .unwrap()
        .max(10)
        .unwrap()
        .message("too big")
        .unwrap()
        .warn()
        .unwrap();
    assert_round_trip(&schema);

    let json = describe_json(&schema);
    assert_eq!(json["flags"]["encoding"], "base64");
    assert_eq!(json["rules"][0]["keep"], true);
    assert_eq!(json["rules"][1]["message"], "too big");
    assert_eq!(json["rules"][1]["warn"], true);
    assert!(json["rules"][1].get("options").is_none());
}

#[test]
fn test_manifest_simple_terms() {
    let schema = any()
        .example(1)
        .unwrap()
        .example("two")
        .unwrap()
        .external("audit")
        .unwrap()
        .meta(Value::from(json!({"owner": "payments"})))
        .unwrap()
        .note("first note")
        .unwrap()
        .note("second note")
        .unwrap()
        .tag("api")
        .unwrap();
    assert_round_trip(&schema);

    let json = describe_json(&schema);
    assert_eq!(json["examples"], json!([1, "two"]));
    assert_eq!(json["notes"], json!(["first note", "second note"]));
    assert_eq!(json["metas"], json!([{"owner": "payments"}]));
}

#[test]
fn test_manifest_allow_invalid_and_prefs() {
    let schema = any()
        .valid(["a", "b"])
        .unwrap()
        .invalid(["c"])
        .unwrap()
        .required()
        .unwrap()
        .messages(Messages::from_sources([("any.only", "{{#label}} is not on the list")]).unwrap())
        .unwrap();
    assert_round_trip(&schema);

    let rebuilt = rebuild_from_json(&schema);
    assert_eq!(rebuilt.validate("z").errors[0].message, "\"value\" is not on the list");
    assert_eq!(rebuilt.validate(Value::Undefined).errors[0].code, "any.required");
}

#[test]
fn test_manifest_whens() {
    let schema = binary()
        .when(
            reference("kind"),
            WhenOptions::new()
                .is(any().valid(["short"]).unwrap())
                .then(binary().max(2).unwrap())
                .otherwise(binary().max(10).unwrap()),
        )
        .unwrap()
        .when(
            binary().min(4).unwrap(),
            WhenOptions::new().then(binary().label("Large").unwrap()),
        )
        .unwrap()
        .when(
            reference("$mode"),
            WhenOptions::new()
                .switch(SwitchCase::new(any().valid(["strict"]).unwrap(), binary().length(1).unwrap()))
                .switch(
                    SwitchCase::new(any().valid(["loose"]).unwrap(), binary().max(100).unwrap())
                        .otherwise(binary().min(0).unwrap()),
                )
                .break_on_match(),
        )
        .unwrap()
        .concat(&binary().tag("merged").unwrap())
        .unwrap();
    assert_round_trip(&schema);

    let json = describe_json(&schema);
    assert_eq!(json["whens"].as_array().map(Vec::len), Some(4));
    assert_eq!(json["whens"][0]["ref"], "kind");
    assert!(json["whens"][1].get("ref").is_none());
    assert_eq!(json["whens"][2]["break"], true);
    assert_eq!(json["whens"][3]["concat"]["tags"], json!(["merged"]));
}

#[test]
fn test_manifest_shared() {
    let shared = binary().id("blob").unwrap().max(4).unwrap();
    let schema = any().shared(shared).unwrap();
    assert_round_trip(&schema);

    let rebuilt = rebuild_from_json(&schema);
    let blob = rebuilt.shared_schema("blob").unwrap();
    assert_eq!(blob.type_name(), "binary");
    assert_eq!(blob.validate("abcde").errors[0].code, "binary.max");
}

#[test]
fn test_manifest_alterations_in_memory() {
    let schema = any()
        .alter([
            ("post", Adjuster::new(|schema: Schema| schema.required())),
            ("patch", Adjuster::new(|schema: Schema| schema.optional())),
        ])
        .unwrap();
    let rebuilt = rebuild_in_memory(&schema);
    assert_eq!(describe_json(&rebuilt), describe_json(&schema));
    assert_eq!(describe_json(&schema)["alterations"][0]["adjuster"], FUNCTION_MARKER);

    let tailored = rebuilt.tailor(&["post"]).unwrap();
    assert_eq!(tailored.presence(), PRESENCE_REQUIRED);
}

#[test]
fn test_manifest_custom_in_memory() {
    let schema = any()
        .custom(|_, _| Err("always fails".into()), Some("rejects everything"))
        .unwrap();
    let rebuilt = rebuild_in_memory(&schema);
    assert_eq!(describe_json(&rebuilt), describe_json(&schema));
    assert_eq!(rebuilt.validate(1).errors[0].code, "any.custom");
}

#[test]
fn test_functions_cannot_be_loaded_from_json() {
    let schema = any().custom(|_, _| Ok(RuleOutcome::Pass), None).unwrap();
    let text = serde_json::to_string(&schema.describe()).unwrap();
    let description = Description::from_json_str(&text).unwrap();
    assert!(registry().build(&description).is_err());
}

#[test]
fn test_manifest_from_yaml() {
    let yaml = r#"
type: binary
flags:
  encoding: hex
rules:
  - name: max
    args:
      limit: 2
notes:
  - hex payload
"#;
    let schema = registry()
        .build(&Description::from_yaml_str(yaml).unwrap())
        .unwrap();
    assert!(schema.validate("ffee").is_ok());
    assert_eq!(schema.validate("ffeedd").errors[0].code, "binary.max");
    assert_eq!(schema.term("notes").map(<[_]>::len), Some(1));
}

#[test]
fn test_unknown_keys_are_ignored() {
    let description = Description::from_json_str(r#"{"type": "any", "renames": [1]}"#).unwrap();
    assert!(registry().build(&description).is_ok());
    assert!(registry().build(&Description::from_json_str(r#"{"type": "uuid"}"#).unwrap()).is_err());
}

// ---------------------------------------------------------------------------
// Multiplicity
// ---------------------------------------------------------------------------

#[test]
fn test_single_rules_replace() {
    let schema = binary().max(3).unwrap().max(5).unwrap();
    assert_eq!(schema.rules().len(), 1);
    assert!(schema.validate("abcd").is_ok());
}

#[test]
fn test_kept_rules_survive_replacement() {
    let schema = binary().max(3).unwrap().keep().unwrap().max(5).unwrap();
    assert_eq!(schema.rules().len(), 2);
    assert_eq!(schema.validate("abcd").errors[0].code, "binary.max");
}

#[test]
fn test_multi_rules_append() {
    let schema = any()
        .custom(|_, _| Ok(RuleOutcome::Pass), None)
        .unwrap()
        .custom(|_, _| Ok(RuleOutcome::Pass), None)
        .unwrap()
        .warning("any.first", None)
        .unwrap()
        .warning("any.second", None)
        .unwrap();
    assert_eq!(schema.rules().len(), 4);
    assert_eq!(schema.validate(1).warnings.len(), 2);
}

// ---------------------------------------------------------------------------
// Argument assertion
// ---------------------------------------------------------------------------

#[test]
fn test_literal_arguments_are_asserted() {
    for limit in [Value::from(-1), Value::from(2.5), Value::from("3")] {
        match binary().length(limit) {
            Err(SchemaError::InvalidArgument { rule, arg, reason }) => {
                assert_eq!(rule, "length");
                assert_eq!(arg, "limit");
                assert_eq!(reason, "must be a positive integer");
            }
            other => panic!("expected an invalid argument, got {other:?}"),
        }
    }
    assert!(binary().max(Value::Undefined).is_err());
}

#[test]
fn test_argument_names_and_references_are_checked() {
    assert!(matches!(
        binary().add_rule(Rule::new("length").arg("size", 3)),
        Err(SchemaError::UnexpectedArgument { .. })
    ));
    assert!(matches!(
        binary().add_rule(Rule::new("trim")),
        Err(SchemaError::UnknownRule { .. })
    ));
    assert!(matches!(
        any().add_rule(Rule::new("warning").arg("code", reference("code"))),
        Err(SchemaError::ReferenceNotAllowed { .. })
    ));
    assert!(matches!(
        any().add_rule(Rule::new("warning").arg("code", "any.note").arg("local", 3)),
        Err(SchemaError::InvalidArgument { .. })
    ));
}

#[test]
fn test_resolved_references_are_asserted() {
    let schema = binary().max(reference("limit")).unwrap();

    let report = schema.validate_with("abc", &Preferences::default(), &sibling_state(json!({"limit": 2})));
    assert_eq!(report.errors[0].code, "binary.max");
    assert_eq!(report.errors[0].context_value("limit"), Some(&Value::from(2)));
    assert_eq!(report.errors[0].path, vec!["payload".to_string()]);

    let report = schema.validate_with("abc", &Preferences::default(), &sibling_state(json!({"limit": "x"})));
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].code, "any.ref");
    assert_eq!(report.errors[0].context_value("ref"), Some(&Value::from("ref:limit")));
}

#[test]
fn test_context_references() {
    let schema = binary().length(reference("$size")).unwrap();
    let mut prefs = Preferences::default();
    prefs.context.insert("size".to_string(), Value::from(2));
    assert!(schema.validate_with("ab", &prefs, &State::new()).is_ok());
    assert_eq!(schema.validate_with("abc", &prefs, &State::new()).errors[0].code, "binary.length");
}

// ---------------------------------------------------------------------------
// Coercion
// ---------------------------------------------------------------------------

#[test]
fn test_failed_coercion_falls_through_to_base() {
    let schema = binary().encoding("hex").unwrap();
    let report = schema.validate("zz");
    assert_eq!(report.value, Value::from("zz"));
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].code, "binary.base");
}

#[test]
fn test_coercion_respects_convert() {
    let prefs = Preferences {
        convert: false,
        ..Default::default()
    };
    let report = binary().validate_with("abc", &prefs, &State::new());
    assert_eq!(report.errors[0].code, "binary.base");
}

#[test]
fn test_coercion_per_encoding() {
    let cases = [
        ("utf8", "hi", b"hi".to_vec()),
        ("hex", "6869", b"hi".to_vec()),
        ("base64", "aGk=", b"hi".to_vec()),
        ("base64url", "aGk", b"hi".to_vec()),
        ("latin1", "hi", b"hi".to_vec()),
        ("ucs2", "h", vec![b'h', 0]),
    ];
    for (encoding, input, expected) in cases {
        let schema = binary().encoding(encoding).unwrap();
        assert_eq!(schema.validate(input).value, Value::Bytes(expected), "{encoding}");
    }
}

#[test]
fn test_cast_runs_only_on_success() {
    let schema = binary().cast("string").unwrap().max(2).unwrap();
    assert_eq!(schema.validate("ab").value, Value::from("ab"));
    assert_eq!(schema.validate("abc").value, Value::Bytes(b"abc".to_vec()));
}

// ---------------------------------------------------------------------------
// Custom validators
// ---------------------------------------------------------------------------

#[test]
fn test_custom_error_is_wrapped() {
    let schema = binary()
        .custom(|_, _| Err("checksum mismatch".into()), None)
        .unwrap();
    let report = schema.validate("abc");
    assert_eq!(report.errors.len(), 1);
    let error = &report.errors[0];
    assert_eq!(error.code, "any.custom");
    assert_eq!(
        error.context_value("error").map(|e| e.child("message")),
        Some(Value::from("checksum mismatch"))
    );
    assert_eq!(error.message, "\"value\" failed custom validation because checksum mismatch");
}

#[test]
fn test_custom_panic_is_wrapped() {
    let schema = any()
        .custom(|_, _| panic!("validator exploded"), None)
        .unwrap();
    let report = schema.validate("abc");
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].code, "any.custom");
    assert_eq!(
        report.errors[0].context_value("error").map(|e| e.child("message")),
        Some(Value::from("validator exploded"))
    );
}

#[test]
fn test_custom_sees_coerced_value() {
    let schema = binary()
        .custom(
            |value, _| match value.as_bytes() {
                Some(bytes) => Ok(RuleOutcome::Value(Value::from(bytes.len()))),
                None => Err("not bytes".into()),
            },
            Some("byte count"),
        )
        .unwrap();
    assert_eq!(schema.validate("abcd").value, Value::from(4));
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

#[test]
fn test_warn_demotes_rule_errors() {
    let schema = binary().max(2).unwrap().warn().unwrap();
    let report = schema.validate("abcd");
    assert!(report.is_ok());
    assert_eq!(report.value, Value::Bytes(b"abcd".to_vec()));
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].code, "binary.max");
}

#[test]
fn test_warn_on_rule_request() {
    let schema = binary()
        .add_rule(Rule::new("min").arg("limit", 5).warn(true))
        .unwrap();
    let report = schema.validate("abc");
    assert!(report.errors.is_empty());
    assert_eq!(report.warnings[0].code, "binary.min");
}

#[test]
fn test_warning_rule() {
    let mut local = Context::new();
    local.insert("since".to_string(), Value::from("v2"));
    let schema = any().warning("any.deprecated", Some(local)).unwrap();
    let report = schema.validate("x");
    assert!(report.is_ok());
    assert_eq!(report.warnings[0].code, "any.deprecated");
    assert_eq!(report.warnings[0].context_value("since"), Some(&Value::from("v2")));
}

// ---------------------------------------------------------------------------
// Conditional branches
// ---------------------------------------------------------------------------

#[test]
fn test_reference_branch() {
    let schema = binary()
        .when(
            reference("kind"),
            WhenOptions::new()
                .is(any().valid(["short"]).unwrap())
                .then(binary().max(2).unwrap())
                .otherwise(binary().max(10).unwrap()),
        )
        .unwrap();
    let prefs = Preferences::default();

    let short = schema.validate_with("abcd", &prefs, &sibling_state(json!({"kind": "short"})));
    assert_eq!(short.errors[0].code, "binary.max");
    assert_eq!(short.errors[0].context_value("limit"), Some(&Value::from(2)));

    let long = schema.validate_with("abcd", &prefs, &sibling_state(json!({"kind": "long"})));
    assert!(long.is_ok());
}

#[test]
fn test_branch_on_any_promotes_type() {
    let schema = any()
        .when(
            reference("$binary"),
            WhenOptions::new().then(binary().length(1).unwrap()),
        )
        .unwrap();
    let mut prefs = Preferences::default();
    prefs.context.insert("binary".to_string(), Value::Bool(true));

    assert_eq!(schema.validate_with("ab", &prefs, &State::new()).errors[0].code, "binary.length");
    assert!(schema.validate("ab").is_ok());
}

// ---------------------------------------------------------------------------
// Allowed values and presence
// ---------------------------------------------------------------------------

#[test]
fn test_only_messages() {
    assert_eq!(
        any().valid(["a", "b"]).unwrap().validate("c").errors[0].message,
        "\"value\" must be one of [a, b]"
    );
    assert_eq!(
        any().valid(["a"]).unwrap().validate("c").errors[0].message,
        "\"value\" must be a"
    );
    assert_eq!(
        any().invalid(["c"]).unwrap().validate("c").errors[0].code,
        "any.invalid"
    );
    assert_eq!(
        any().forbidden().unwrap().validate(1).errors[0].message,
        "\"value\" is not allowed"
    );
}

// ---------------------------------------------------------------------------
// Preferences
// ---------------------------------------------------------------------------

#[test]
fn test_yaml_preferences() {
    let prefs = Preferences::from_yaml_str(
        r#"
abort_early: false
errors:
  language: es
messages:
  binary.max:
    en: "{{#label}} is too long"
    es: "{{#label}} es demasiado largo"
"#,
    )
    .unwrap();
    let schema = binary().min(5).unwrap().max(2).unwrap();
    let report = schema.validate_with("abc", &prefs, &State::new());

    assert_eq!(report.errors.len(), 2);
    assert_eq!(report.errors[0].code, "binary.min");
    assert_eq!(report.errors[1].message, "\"value\" es demasiado largo");
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[test]
fn test_schemas_validate_across_threads() {
    let schema = Arc::new(
        binary()
            .max(3)
            .unwrap()
            .custom(|_, _| Ok(RuleOutcome::Pass), None)
            .unwrap(),
    );
    let handles: Vec<_> = (1..=4)
        .map(|len| {
            let schema = Arc::clone(&schema);
            thread::spawn(move || schema.validate("a".repeat(len)).is_ok())
        })
        .collect();
    let results: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results, vec![true, true, true, false]);
}
