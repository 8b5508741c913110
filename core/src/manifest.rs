//! Schema descriptions and rebuilding schemas from them.
//!
//! [`Schema::describe`] produces a [`Description`], a plain serde value that
//! can be written as JSON or YAML. [`build`] replays a description onto a
//! base schema: flags, allowed/denied values, preferences and rules are
//! handled generically, then every manifest hook declared by the type runs
//! to replay its own term categories. [`TypeRegistry`] maps type names to
//! descriptors so nested descriptions can be rebuilt.
//!
//! Functions (custom validators, adjusters) serialize as `"[function]"` and
//! cannot be deserialized; an in-memory description keeps them intact.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use typeshape_core::*;
//!
//! let descriptor = Arc::new(extend(&TypeDescriptor::base(), Extension::new("thing")).unwrap());
//! let registry = TypeRegistry::new().with(descriptor);
//!
//! let schema = registry.schema("thing").unwrap().label("Thing").unwrap().valid(["a"]).unwrap();
//! let json = serde_json::to_value(schema.describe()).unwrap();
//! assert_eq!(json["type"], "thing");
//! assert_eq!(json["allow"], serde_json::json!(["a"]));
//!
//! let rebuilt = registry.build(&Description::from_json_str(&json.to_string()).unwrap()).unwrap();
//! assert_eq!(rebuilt.flag("label"), Some(&Value::from("Thing")));
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::descriptor::TypeDescriptor;
use crate::error::{Result, SchemaError};
use crate::messages::{MessageSource, compile};
use crate::prefs::PreferenceOverrides;
use crate::reference::Reference;
use crate::rules::{Arg, Rule, RuleInstance};
use crate::schema::Schema;
use crate::terms::{Alteration, TermItem};
use crate::value::{Context, Value};
use crate::when::WhenTerm;

fn is_false(value: &bool) -> bool {
    !*value
}

/// Serializable description of a schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Description {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub flags: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invalid: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<PreferenceOverrides>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<RuleDescription>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub externals: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metas: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alterations: Vec<Alteration>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub whens: Vec<WhenDescription>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shared: Vec<Description>,
    /// Keys this layer does not interpret, such as terms of other types.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Description {
    /// Parses a description from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Parses a description from YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }
}

/// A rule instance as it appears in a [`Description`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleDescription {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub args: BTreeMap<String, Arg>,
    /// Options that differ from the rule's defaults.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: Context,
    #[serde(default, skip_serializing_if = "is_false")]
    pub keep: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageSource>,
    /// Present only when it differs from the rule's default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warn: Option<bool>,
}

/// A `whens` entry as it appears in a [`Description`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WhenDescription {
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is: Option<Box<Description>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not: Option<Box<Description>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub then: Option<Box<Description>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otherwise: Option<Box<Description>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub switch: Vec<SwitchDescription>,
    #[serde(rename = "break", default, skip_serializing_if = "is_false")]
    pub break_: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concat: Option<Box<Description>>,
}

/// One case of a described switch branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchDescription {
    pub is: Description,
    pub then: Description,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otherwise: Option<Description>,
}

impl Schema {
    /// Describes this schema.
    pub fn describe(&self) -> Description {
        let mut description = Description {
            type_name: self.type_name().to_string(),
            flags: self.flags.clone(),
            allow: self.valids.clone(),
            invalid: self.invalids.clone(),
            preferences: self.preferences.clone(),
            rules: self.rules.iter().map(|rule| self.describe_rule(rule)).collect(),
            ..Default::default()
        };

        for (name, items) in &self.terms {
            let Some(items) = items else {
                continue;
            };
            let values = || {
                items
                    .iter()
                    .filter_map(TermItem::as_value)
                    .cloned()
                    .collect::<Vec<_>>()
            };
            match name.as_str() {
                "examples" => description.examples = values(),
                "externals" => description.externals = values(),
                "metas" => description.metas = values(),
                "notes" => description.notes = values(),
                "tags" => description.tags = values(),
                "alterations" => {
                    description.alterations = items
                        .iter()
                        .filter_map(TermItem::as_alteration)
                        .cloned()
                        .collect();
                }
                "whens" => {
                    description.whens = items
                        .iter()
                        .filter_map(TermItem::as_when)
                        .map(describe_when)
                        .collect();
                }
                "shared" => {
                    description.shared = items
                        .iter()
                        .filter_map(TermItem::as_schema)
                        .map(|schema| schema.describe())
                        .collect();
                }
                other => {
                    let values: Vec<_> = values().iter().map(Value::to_json).collect();
                    if !values.is_empty() {
                        description
                            .extra
                            .insert(other.to_string(), serde_json::Value::Array(values));
                    }
                }
            }
        }

        description
    }

    fn describe_rule(&self, rule: &RuleInstance) -> RuleDescription {
        let defaults = self.descriptor.default_options(rule.name());
        let options = rule
            .options()
            .iter()
            .filter(|(name, value)| defaults.get(name.as_str()) != Some(*value))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        let default_warn = self
            .descriptor
            .rule(rule.name())
            .is_some_and(|definition| definition.is_warn());

        RuleDescription {
            name: rule.name().to_string(),
            args: rule.args().clone(),
            options,
            keep: rule.is_keep(),
            message: rule.message().map(|message| message.source().clone()),
            warn: (rule.is_warn() != default_warn).then_some(rule.is_warn()),
        }
    }
}

fn describe_when(term: &WhenTerm) -> WhenDescription {
    let boxed = |schema: &Schema| Box::new(schema.describe());
    match term {
        WhenTerm::Concat(schema) => WhenDescription {
            concat: Some(boxed(schema)),
            ..Default::default()
        },
        WhenTerm::Branch(when) => WhenDescription {
            reference: when.reference().cloned(),
            is: when.is_schema().map(boxed),
            not: when.not_schema().map(boxed),
            then: when.then_schema().map(boxed),
            otherwise: when.otherwise_schema().map(boxed),
            switch: when
                .switch_cases()
                .iter()
                .map(|case| SwitchDescription {
                    is: case.is_schema().describe(),
                    then: case.then_schema().describe(),
                    otherwise: case.otherwise_schema().map(Schema::describe),
                })
                .collect(),
            break_: when.breaks(),
            concat: None,
        },
    }
}

/// Rebuilds a schema by replaying `description` onto `base`.
///
/// # Errors
///
/// Returns [`SchemaError::InvalidDescription`] when the description names a
/// different type than `base`, and propagates every builder error raised
/// while replaying.
pub fn build(base: &Schema, description: &Description, registry: &TypeRegistry) -> Result<Schema> {
    if description.type_name != base.type_name() {
        return Err(SchemaError::InvalidDescription(format!(
            "cannot build a {} description on a {} schema",
            description.type_name,
            base.type_name()
        )));
    }

    let mut schema = base.clone();
    for (name, value) in &description.flags {
        schema = schema.set_flag(name, value.clone())?;
    }
    if !description.allow.is_empty() {
        schema = schema.allow(description.allow.iter().cloned())?;
    }
    if !description.invalid.is_empty() {
        schema = schema.invalid(description.invalid.iter().cloned())?;
    }
    if let Some(preferences) = &description.preferences {
        schema = schema.prefs(preferences.clone())?;
    }

    for rule in &description.rules {
        let mut request = Rule::new(rule.name.as_str());
        for (name, arg) in &rule.args {
            request = request.arg(name.as_str(), arg.clone());
        }
        for (name, value) in &rule.options {
            request = request.option(name.as_str(), value.clone());
        }
        if let Some(warn) = rule.warn {
            request = request.warn(warn);
        }
        schema = schema.add_rule(request)?;

        if let Some(instance) = schema.rules.last_mut() {
            if rule.keep {
                instance.set_keep(true);
            }
            if let Some(message) = &rule.message {
                instance.set_message(compile(message.clone())?);
            }
        }
    }

    for hook in base.descriptor().manifest_hooks() {
        schema = hook(schema, description, registry)?;
    }

    debug!(type_name = %description.type_name, rules = description.rules.len(), "rebuilt schema from description");
    Ok(schema)
}

/// Type descriptors by name.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: BTreeMap<String, Arc<TypeDescriptor>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a descriptor, replacing any previous one with that name.
    pub fn register(&mut self, descriptor: Arc<TypeDescriptor>) {
        self.types
            .insert(descriptor.type_name().to_string(), descriptor);
    }

    pub fn with(mut self, descriptor: Arc<TypeDescriptor>) -> Self {
        self.register(descriptor);
        self
    }

    pub fn get(&self, type_name: &str) -> Option<&Arc<TypeDescriptor>> {
        self.types.get(type_name)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Returns an empty schema of the named type.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownType`] for unregistered names.
    pub fn schema(&self, type_name: &str) -> Result<Schema> {
        self.get(type_name)
            .map(|descriptor| Schema::new(descriptor.clone()))
            .ok_or_else(|| SchemaError::UnknownType(type_name.to_string()))
    }

    /// Builds a schema from a description, picking the base by its type.
    pub fn build(&self, description: &Description) -> Result<Schema> {
        let base = self.schema(&description.type_name)?;
        build(&base, description, self)
    }
}
