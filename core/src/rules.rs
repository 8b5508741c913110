//! Rule declarations, rule instances and the helpers handed to user code.
//!
//! A [`RuleDescriptor`] is the static definition a type declares: validate
//! function, ordered [`ArgSpec`]s, multiplicity and default warn flag. A
//! [`Rule`] is a request to bind a descriptor to concrete arguments; the
//! schema turns it into a [`RuleInstance`] after asserting every literal
//! argument.
//!
//! User code (custom validators, coercions, casts, adjusters) is run through
//! [`isolate`] so a panic is reported as a value instead of unwinding through
//! the engine.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, ValidationError};
use crate::messages::Message;
use crate::prefs::{LabelMode, Preferences};
use crate::reference::{Reference, State};
use crate::schema::Schema;
use crate::value::{Context, Value};

/// Largest integer a limit argument may hold (2^53 - 1).
pub const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Marker emitted when a function is serialized into a description.
pub const FUNCTION_MARKER: &str = "[function]";

/// Boxed error returned by user-supplied functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result of a custom validator.
pub type CustomResult = std::result::Result<RuleOutcome, BoxError>;

/// Validate function of a rule descriptor.
pub type RuleValidate =
    Arc<dyn Fn(&Value, &Helpers<'_>, &Args, &RuleInstance) -> RuleOutcome + Send + Sync>;

/// Argument assertion predicate.
pub type Assertion = Arc<dyn Fn(&Arg) -> bool + Send + Sync>;

/// Post-registration adjustment of a single rule instance.
pub type Modifier = Arc<dyn Fn(&mut RuleInstance, &Value) -> Result<()> + Send + Sync>;

/// Runs user code, converting a panic into its message.
pub fn isolate<T>(f: impl FnOnce() -> T) -> std::result::Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "user code panicked".to_string()
    }
}

/// Compares two numbers with one of `=`, `<`, `<=`, `>`, `>=`.
pub fn compare(a: f64, b: f64, operator: &str) -> bool {
    match operator {
        "=" => a == b,
        "<" => a < b,
        "<=" => a <= b,
        ">" => a > b,
        ">=" => a >= b,
        _ => false,
    }
}

/// Returns `true` for non-negative safe integers.
pub fn is_limit(value: &Value) -> bool {
    value
        .as_f64()
        .is_some_and(|n| n.fract() == 0.0 && (0.0..=MAX_SAFE_INTEGER).contains(&n))
}

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

/// A user-supplied validation function.
#[derive(Clone)]
pub struct CustomValidator(Arc<dyn Fn(&Value, &Helpers<'_>) -> CustomResult + Send + Sync>);

impl CustomValidator {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value, &Helpers<'_>) -> CustomResult + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, value: &Value, helpers: &Helpers<'_>) -> CustomResult {
        (self.0)(value, helpers)
    }
}

impl fmt::Debug for CustomValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(FUNCTION_MARKER)
    }
}

impl Serialize for CustomValidator {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(FUNCTION_MARKER)
    }
}

/// A bound rule argument.
#[derive(Debug, Clone)]
pub enum Arg {
    /// Literal, asserted at registration.
    Value(Value),
    /// Resolved (and asserted) at validation time.
    Ref(Reference),
    /// A function argument.
    Func(CustomValidator),
}

impl Arg {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Arg::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            Arg::Ref(reference) => Some(reference),
            _ => None,
        }
    }

    pub fn as_func(&self) -> Option<&CustomValidator> {
        match self {
            Arg::Func(func) => Some(func),
            _ => None,
        }
    }

    pub fn is_func(&self) -> bool {
        matches!(self, Arg::Func(_))
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Arg::Value(value)
    }
}

impl From<Reference> for Arg {
    fn from(reference: Reference) -> Self {
        Arg::Ref(reference)
    }
}

impl From<CustomValidator> for Arg {
    fn from(func: CustomValidator) -> Self {
        Arg::Func(func)
    }
}

macro_rules! arg_from_value {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Arg {
                fn from(value: $ty) -> Self {
                    Arg::Value(Value::from(value))
                }
            }
        )*
    };
}

arg_from_value!(&str, String, bool, f64, i32, i64, u32, u64, usize, Context);

impl Serialize for Arg {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Arg::Value(value) => value.serialize(serializer),
            Arg::Ref(reference) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("ref", reference.key())?;
                map.end()
            }
            Arg::Func(func) => func.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Arg {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        if let serde_json::Value::Object(map) = &json {
            if map.len() == 1 {
                if let Some(serde_json::Value::String(key)) = map.get("ref") {
                    return Reference::parse(key).map(Arg::Ref).map_err(D::Error::custom);
                }
            }
        }
        Ok(Arg::Value(Value::from_json(json)))
    }
}

/// Declaration of one rule argument.
///
/// # Examples
///
/// ```
/// use typeshape_core::{is_limit, Arg, ArgSpec, Value};
///
/// let spec = ArgSpec::new("limit")
///     .reference()
///     .assert(|arg| arg.as_value().is_some_and(is_limit), "must be a positive integer");
///
/// assert!(spec.check(&Arg::from(3)).is_ok());
/// assert_eq!(spec.check(&Arg::from(-1)).unwrap_err(), "must be a positive integer");
/// ```
#[derive(Clone)]
pub struct ArgSpec {
    name: String,
    reference: bool,
    assert: Option<Assertion>,
    message: Option<String>,
}

impl ArgSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reference: false,
            assert: None,
            message: None,
        }
    }

    /// Allows the argument to be bound to a [`Reference`].
    pub fn reference(mut self) -> Self {
        self.reference = true;
        self
    }

    /// Sets the assertion predicate and the reason reported when it fails.
    pub fn assert<F>(mut self, predicate: F, message: impl Into<String>) -> Self
    where
        F: Fn(&Arg) -> bool + Send + Sync + 'static,
    {
        self.assert = Some(Arc::new(predicate));
        self.message = Some(message.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn accepts_reference(&self) -> bool {
        self.reference
    }

    pub fn has_assertion(&self) -> bool {
        self.assert.is_some()
    }

    /// Runs the assertion, returning the failure reason.
    pub fn check(&self, arg: &Arg) -> std::result::Result<(), String> {
        match &self.assert {
            Some(predicate) if !predicate(arg) => Err(self
                .message
                .clone()
                .unwrap_or_else(|| "failed assertion".to_string())),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for ArgSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArgSpec")
            .field("name", &self.name)
            .field("reference", &self.reference)
            .field("assert", &self.assert.is_some())
            .field("message", &self.message)
            .finish()
    }
}

/// Arguments handed to a validate function, references already resolved.
#[derive(Debug, Clone, Default)]
pub struct Args(BTreeMap<String, Arg>);

static UNDEFINED: Value = Value::Undefined;

impl Args {
    pub(crate) fn new(args: BTreeMap<String, Arg>) -> Self {
        Self(args)
    }

    pub fn get(&self, name: &str) -> Option<&Arg> {
        self.0.get(name)
    }

    /// Returns the literal (or resolved) value, `undefined` when absent.
    pub fn value(&self, name: &str) -> &Value {
        self.0
            .get(name)
            .and_then(Arg::as_value)
            .unwrap_or(&UNDEFINED)
    }

    pub fn func(&self, name: &str) -> Option<&CustomValidator> {
        self.0.get(name).and_then(Arg::as_func)
    }
}

// ---------------------------------------------------------------------------
// Outcomes and helpers
// ---------------------------------------------------------------------------

/// Result of running a rule.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    /// The value passes unchanged.
    Pass,
    /// The value passes, replaced by a corrected one.
    Value(Value),
    /// The value fails.
    Errors(Vec<ValidationError>),
}

impl From<ValidationError> for RuleOutcome {
    fn from(error: ValidationError) -> Self {
        RuleOutcome::Errors(vec![error])
    }
}

impl From<Vec<ValidationError>> for RuleOutcome {
    fn from(errors: Vec<ValidationError>) -> Self {
        RuleOutcome::Errors(errors)
    }
}

impl From<Value> for RuleOutcome {
    fn from(value: Value) -> Self {
        RuleOutcome::Value(value)
    }
}

/// Validation-time view handed to validate functions, coercions and casts.
#[derive(Clone, Copy)]
pub struct Helpers<'a> {
    schema: &'a Schema,
    state: &'a State,
    prefs: &'a Preferences,
    value: &'a Value,
    original: &'a Value,
    rule: Option<&'a RuleInstance>,
}

impl<'a> Helpers<'a> {
    pub(crate) fn new(
        schema: &'a Schema,
        state: &'a State,
        prefs: &'a Preferences,
        value: &'a Value,
        original: &'a Value,
    ) -> Self {
        Self {
            schema,
            state,
            prefs,
            value,
            original,
            rule: None,
        }
    }

    pub(crate) fn with_rule(&self, rule: &'a RuleInstance) -> Helpers<'a> {
        Helpers {
            rule: Some(rule),
            ..*self
        }
    }

    /// Rebinds the current value (used when a rule corrected it).
    pub fn with_value<'b>(&'b self, value: &'b Value) -> Helpers<'b> {
        Helpers {
            schema: self.schema,
            state: self.state,
            prefs: self.prefs,
            value,
            original: self.original,
            rule: self.rule,
        }
    }

    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    pub fn state(&self) -> &'a State {
        self.state
    }

    pub fn prefs(&self) -> &'a Preferences {
        self.prefs
    }

    pub fn value(&self) -> &'a Value {
        self.value
    }

    /// The value as supplied, before coercion.
    pub fn original(&self) -> &'a Value {
        self.original
    }

    pub fn rule(&self) -> Option<&'a RuleInstance> {
        self.rule
    }

    /// Shortcut for [`Schema::flag`].
    pub fn flag(&self, name: &str) -> Option<&'a Value> {
        self.schema.flag(name)
    }

    /// The unwrapped label of the value under validation.
    pub fn label(&self) -> String {
        if let Some(label) = self.schema.flag("label").and_then(Value::as_str) {
            return label.to_string();
        }
        let derived = match self.prefs.errors.label {
            LabelMode::Path if !self.state.path.is_empty() => Some(self.state.path.join(".")),
            LabelMode::Key => self.state.key().map(String::from),
            _ => None,
        };
        derived.unwrap_or_else(|| "value".to_string())
    }

    /// Builds an error through the standard path: context gets `value`,
    /// `label` and `key`, and the message is rendered from the rule's
    /// override, the preference messages, or the type's defaults, in that
    /// order.
    pub fn error(&self, code: &str, local: Context) -> ValidationError {
        let mut context = local;
        context
            .entry("value".to_string())
            .or_insert_with(|| self.value.clone());
        let label = self.label();
        context.insert("label".to_string(), Value::String(label.clone()));
        if let Some(key) = self.state.key() {
            context
                .entry("key".to_string())
                .or_insert_with(|| Value::from(key));
        }

        let message = self.render(code, &context, &label);
        ValidationError {
            code: code.to_string(),
            message,
            path: self.state.path.clone(),
            context,
        }
    }

    fn render(&self, code: &str, context: &Context, label: &str) -> String {
        let mut render_context = context.clone();
        if let Some(rule) = self.rule {
            for (name, arg) in rule.args() {
                if let Arg::Value(value) = arg {
                    render_context
                        .entry(name.clone())
                        .or_insert_with(|| value.clone());
                }
            }
        }
        let wrapped = match &self.prefs.errors.wrap_label {
            Some(wrap) => format!("{wrap}{label}{wrap}"),
            None => label.to_string(),
        };
        render_context.insert("label".to_string(), Value::String(wrapped.clone()));

        let message = self
            .rule
            .and_then(RuleInstance::message)
            .or_else(|| self.prefs.messages.get(code))
            .or_else(|| self.schema.descriptor().messages().get(code));

        match message {
            Some(message) => message.render(
                self.prefs.errors.language.as_deref(),
                &render_context,
                &self.prefs.render_options(),
            ),
            None => format!("{wrapped} failed with unregistered error code {code}"),
        }
    }
}

impl fmt::Debug for Helpers<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Helpers")
            .field("type", &self.schema.type_name())
            .field("path", &self.state.path)
            .field("value", self.value)
            .field("rule", &self.rule.map(RuleInstance::name))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Descriptors and instances
// ---------------------------------------------------------------------------

/// Static rule definition declared by a type.
///
/// Fields left unset are inherited when the rule overrides a parent rule of
/// the same name (see [`extend`](crate::extend)).
#[derive(Clone)]
pub struct RuleDescriptor {
    name: String,
    method: Option<String>,
    validate: Option<RuleValidate>,
    args: Option<Vec<ArgSpec>>,
    multi: Option<bool>,
    warn: Option<bool>,
    options: Context,
}

impl RuleDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method: None,
            validate: None,
            args: None,
            multi: None,
            warn: None,
            options: Context::new(),
        }
    }

    /// Dispatches validation (and argument specs) to another rule.
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn validate<F>(mut self, validate: F) -> Self
    where
        F: Fn(&Value, &Helpers<'_>, &Args, &RuleInstance) -> RuleOutcome + Send + Sync + 'static,
    {
        self.validate = Some(Arc::new(validate));
        self
    }

    pub fn arg(mut self, spec: ArgSpec) -> Self {
        self.args.get_or_insert_with(Vec::new).push(spec);
        self
    }

    /// Instances are appended instead of replacing same-name instances.
    pub fn multi(mut self) -> Self {
        self.multi = Some(true);
        self
    }

    /// Instances report failures as warnings by default.
    pub fn warn(mut self) -> Self {
        self.warn = Some(true);
        self
    }

    /// Default instance option (e.g. a comparison operator).
    pub fn option(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dispatch_method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    pub fn has_validate(&self) -> bool {
        self.validate.is_some()
    }

    pub fn args(&self) -> &[ArgSpec] {
        self.args.as_deref().unwrap_or(&[])
    }

    pub fn is_multi(&self) -> bool {
        self.multi.unwrap_or(false)
    }

    pub fn is_warn(&self) -> bool {
        self.warn.unwrap_or(false)
    }

    pub fn options(&self) -> &Context {
        &self.options
    }

    pub(crate) fn validator(&self) -> Option<&RuleValidate> {
        self.validate.as_ref()
    }

    /// Layers `child` over `parent`. Unset fields are inherited; when both
    /// declare a validate function the parent runs first and the child
    /// validates its result.
    pub(crate) fn compose(parent: &RuleDescriptor, child: RuleDescriptor) -> RuleDescriptor {
        let validate = match (parent.validate.clone(), child.validate) {
            (Some(first), Some(second)) => Some(chain(first, second)),
            (inherited, own) => own.or(inherited),
        };
        let mut options = parent.options.clone();
        options.extend(child.options);

        RuleDescriptor {
            name: child.name,
            method: child.method.or_else(|| parent.method.clone()),
            validate,
            args: child.args.or_else(|| parent.args.clone()),
            multi: child.multi.or(parent.multi),
            warn: child.warn.or(parent.warn),
            options,
        }
    }
}

fn chain(first: RuleValidate, second: RuleValidate) -> RuleValidate {
    Arc::new(move |value: &Value, helpers: &Helpers<'_>, args: &Args, rule: &RuleInstance| {
        match first(value, helpers, args, rule) {
            RuleOutcome::Pass => second(value, helpers, args, rule),
            RuleOutcome::Value(corrected) => {
                match second(&corrected, &helpers.with_value(&corrected), args, rule) {
                    RuleOutcome::Pass => RuleOutcome::Value(corrected),
                    other => other,
                }
            }
            errors => errors,
        }
    })
}

impl fmt::Debug for RuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleDescriptor")
            .field("name", &self.name)
            .field("method", &self.method)
            .field("validate", &self.validate.is_some())
            .field("args", &self.args)
            .field("multi", &self.is_multi())
            .field("warn", &self.is_warn())
            .field("options", &self.options)
            .finish()
    }
}

/// A rule bound to concrete arguments inside a schema.
#[derive(Debug, Clone)]
pub struct RuleInstance {
    name: String,
    method: String,
    args: BTreeMap<String, Arg>,
    options: Context,
    keep: bool,
    message: Option<Message>,
    warn: bool,
}

impl RuleInstance {
    pub(crate) fn new(
        name: String,
        method: String,
        args: BTreeMap<String, Arg>,
        options: Context,
        warn: bool,
    ) -> Self {
        Self {
            name,
            method,
            args,
            options,
            keep: false,
            message: None,
            warn,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the rule whose validate function runs this instance.
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn args(&self) -> &BTreeMap<String, Arg> {
        &self.args
    }

    pub fn arg(&self, name: &str) -> Option<&Arg> {
        self.args.get(name)
    }

    pub fn options(&self) -> &Context {
        &self.options
    }

    pub fn option(&self, name: &str) -> Option<&Value> {
        self.options.get(name)
    }

    pub fn is_keep(&self) -> bool {
        self.keep
    }

    pub fn message(&self) -> Option<&Message> {
        self.message.as_ref()
    }

    pub fn is_warn(&self) -> bool {
        self.warn
    }

    pub fn set_keep(&mut self, keep: bool) {
        self.keep = keep;
    }

    pub fn set_message(&mut self, message: Message) {
        self.message = Some(message);
    }

    pub fn set_warn(&mut self, warn: bool) {
        self.warn = warn;
    }

    pub fn references(&self) -> impl Iterator<Item = &Reference> {
        self.args.values().filter_map(Arg::as_reference)
    }
}

/// Request to add a rule to a schema.
///
/// # Examples
///
/// ```
/// use typeshape_core::{Reference, Rule};
///
/// let literal = Rule::new("length").arg("limit", 3);
/// let dynamic = Rule::new("length").arg("limit", Reference::parse("size").unwrap());
/// let demoted = Rule::new("length").arg("limit", 3).modify("warn", true);
/// assert_eq!(literal.name(), "length");
/// # let _ = (dynamic, demoted);
/// ```
#[derive(Debug, Clone)]
pub struct Rule {
    name: String,
    args: BTreeMap<String, Arg>,
    options: Context,
    warn: Option<bool>,
    modifiers: Vec<(String, Value)>,
}

impl Rule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: BTreeMap::new(),
            options: Context::new(),
            warn: None,
            modifiers: Vec::new(),
        }
    }

    pub fn arg(mut self, name: impl Into<String>, arg: impl Into<Arg>) -> Self {
        self.args.insert(name.into(), arg.into());
        self
    }

    pub fn option(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    /// Overrides the descriptor's default warn flag.
    pub fn warn(mut self, warn: bool) -> Self {
        self.warn = Some(warn);
        self
    }

    /// Queues a modifier, applied to the instance before it is inserted.
    pub fn modify(mut self, modifier: impl Into<String>, value: impl Into<Value>) -> Self {
        self.modifiers.push((modifier.into(), value.into()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        String,
        BTreeMap<String, Arg>,
        Context,
        Option<bool>,
        Vec<(String, Value)>,
    ) {
        (self.name, self.args, self.options, self.warn, self.modifiers)
    }
}
