//! The `binary` type: byte buffers.
//!
//! Strings are coerced into bytes using the schema's `encoding` flag
//! (`utf8` by default). A string that does not decode under that encoding is
//! left as is and then fails the base check with `binary.base`. Buffers can
//! be cast back to `string`.

use std::sync::{Arc, LazyLock};

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use typeshape_core::{
    Arg, ArgSpec, Args, BaseOutcome, BoxError, Cast, Coerce, Context, Extension, Helpers, Result,
    Rule, RuleDescriptor, RuleInstance, RuleOutcome, Schema, SchemaError, TypeDescriptor, Value,
    compare, extend, is_limit,
};

use crate::any::any_type;

/// Encoding names accepted by [`BinarySchema::encoding`].
pub const ENCODINGS: &[&str] = &[
    "utf8", "utf-8", "hex", "base64", "base64url", "latin1", "binary", "ascii", "ucs2", "utf16le",
];

const PADDING_OPTIONAL: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, PADDING_OPTIONAL);
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, PADDING_OPTIONAL);

static BINARY: LazyLock<Arc<TypeDescriptor>> = LazyLock::new(|| {
    Arc::new(extend(&any_type(), declaration()).expect("built-in binary type must be well formed"))
});

/// Returns `true` if `name` is a supported encoding.
pub fn is_encoding(name: &str) -> bool {
    ENCODINGS.contains(&name)
}

/// Descriptor of the `binary` type.
pub fn binary_type() -> Arc<TypeDescriptor> {
    BINARY.clone()
}

/// An empty `binary` schema.
pub fn binary() -> Schema {
    Schema::new(binary_type())
}

fn declaration() -> Extension {
    Extension::new("binary")
        .flag("encoding", "utf8")
        .coerce(Coerce::new("string", |value, helpers| {
            let encoding = helpers
                .flag("encoding")
                .and_then(Value::as_str)
                .unwrap_or("utf8");
            match value.as_str() {
                Some(text) => decode(text, encoding).map(|bytes| Some(Value::Bytes(bytes))),
                None => Ok(None),
            }
        }))
        .validate(|value, helpers| {
            if value.is_bytes() {
                return None;
            }
            Some(BaseOutcome {
                value: value.clone(),
                errors: vec![helpers.error("binary.base", Context::new())],
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
                .validate(validate_length),
        )
        .rule(RuleDescriptor::new("max").method("length").option("operator", "<="))
        .rule(RuleDescriptor::new("min").method("length").option("operator", ">="))
        .cast(
            "string",
            Cast::new(Value::is_bytes, |value, _| match value.as_bytes() {
                Some(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
                None => value.clone(),
            }),
        )
        .message("binary.base", "{{#label}} must be a buffer or a string")
        .message("binary.length", "{{#label}} must be {{#limit}} bytes")
        .message("binary.max", "{{#label}} must be less than or equal to {{#limit}} bytes")
        .message("binary.min", "{{#label}} must be at least {{#limit}} bytes")
}

fn validate_length(value: &Value, helpers: &Helpers<'_>, args: &Args, rule: &RuleInstance) -> RuleOutcome {
    let limit = args.value("limit");
    let operator = rule.option("operator").and_then(Value::as_str).unwrap_or("=");
    if let (Some(len), Some(bound)) = (value.len(), limit.as_f64()) {
        if compare(len as f64, bound, operator) {
            return RuleOutcome::Pass;
        }
    }

    let mut local = Context::new();
    local.insert("limit".to_string(), limit.clone());
    local.insert("value".to_string(), value.clone());
    helpers
        .error(&format!("binary.{}", rule.name()), local)
        .into()
}

/// Decodes `text` under a supported encoding.
fn decode(text: &str, encoding: &str) -> std::result::Result<Vec<u8>, BoxError> {
    match encoding {
        "utf8" | "utf-8" => Ok(text.as_bytes().to_vec()),
        "hex" => Ok(hex::decode(text)?),
        "base64" => Ok(STANDARD_LENIENT.decode(text.replace('-', "+").replace('_', "/"))?),
        "base64url" => Ok(URL_SAFE_LENIENT.decode(text)?),
        "latin1" | "binary" | "ascii" => Ok(text.chars().map(|c| (c as u32 & 0xff) as u8).collect()),
        "ucs2" | "utf16le" => Ok(text.encode_utf16().flat_map(u16::to_le_bytes).collect()),
        other => Err(format!("unsupported encoding {other}").into()),
    }
}

/// Builders provided by the `binary` type.
pub trait BinarySchema {
    /// Sets the encoding used to coerce strings.
    fn encoding(&self, encoding: &str) -> Result<Schema>;

    /// Requires exactly `limit` bytes. `limit` may be a reference.
    fn length(&self, limit: impl Into<Arg>) -> Result<Schema>;

    fn max(&self, limit: impl Into<Arg>) -> Result<Schema>;

    fn min(&self, limit: impl Into<Arg>) -> Result<Schema>;
}

impl BinarySchema for Schema {
    fn encoding(&self, encoding: &str) -> Result<Schema> {
        if !is_encoding(encoding) {
            return Err(SchemaError::InvalidValue(format!("invalid encoding: {encoding}")));
        }
        self.set_flag("encoding", encoding)
    }

    fn length(&self, limit: impl Into<Arg>) -> Result<Schema> {
        self.add_rule(Rule::new("length").arg("limit", limit))
    }

    fn max(&self, limit: impl Into<Arg>) -> Result<Schema> {
        self.add_rule(Rule::new("max").arg("limit", limit))
    }

    fn min(&self, limit: impl Into<Arg>) -> Result<Schema> {
        self.add_rule(Rule::new("min").arg("limit", limit))
    }
}
