//! Term collections: simple value lists, alterations and shared schemas.
//!
//! Terms are named collections declared by a type. Simple categories hold
//! plain values; `alterations` hold `{target, adjuster}` pairs applied by
//! [`Schema::tailor`]; `shared` holds nested schemas registered by id. The
//! `whens` category is managed by [`Schema::when`](crate::Schema::when).

use std::fmt;
use std::sync::Arc;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::error::{Result, SchemaError};
use crate::rules::{FUNCTION_MARKER, isolate};
use crate::schema::Schema;
use crate::value::Value;
use crate::when::WhenTerm;

/// A schema transformation registered under an alteration target.
#[derive(Clone)]
pub struct Adjuster(Arc<dyn Fn(Schema) -> Result<Schema> + Send + Sync>);

impl Adjuster {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Schema) -> Result<Schema> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn apply(&self, schema: Schema) -> Result<Schema> {
        (self.0)(schema)
    }
}

impl fmt::Debug for Adjuster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(FUNCTION_MARKER)
    }
}

impl Serialize for Adjuster {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(FUNCTION_MARKER)
    }
}

impl<'de> Deserialize<'de> for Adjuster {
    fn deserialize<D: Deserializer<'de>>(_deserializer: D) -> std::result::Result<Self, D::Error> {
        Err(D::Error::custom("adjuster functions cannot be deserialized"))
    }
}

/// An alteration registered on a schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alteration {
    pub target: String,
    pub adjuster: Adjuster,
}

/// One element of a term collection.
#[derive(Debug, Clone)]
pub enum TermItem {
    Value(Value),
    Alteration(Alteration),
    When(WhenTerm),
    Schema(Arc<Schema>),
}

impl TermItem {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            TermItem::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_alteration(&self) -> Option<&Alteration> {
        match self {
            TermItem::Alteration(alteration) => Some(alteration),
            _ => None,
        }
    }

    pub fn as_when(&self) -> Option<&WhenTerm> {
        match self {
            TermItem::When(when) => Some(when),
            _ => None,
        }
    }

    pub fn as_schema(&self) -> Option<&Arc<Schema>> {
        match self {
            TermItem::Schema(schema) => Some(schema),
            _ => None,
        }
    }
}

impl From<Value> for TermItem {
    fn from(value: Value) -> Self {
        TermItem::Value(value)
    }
}

impl Schema {
    /// Returns the items of a term, `None` when the slot is unset or not
    /// declared.
    pub fn term(&self, name: &str) -> Option<&[TermItem]> {
        self.terms.get(name).and_then(Option::as_deref)
    }

    /// Appends one element to a declared term.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownTerm`] when the type does not declare
    /// `name`.
    pub fn add_term(&self, name: &str, item: impl Into<TermItem>) -> Result<Schema> {
        if !self.descriptor.terms().contains_key(name) {
            return Err(SchemaError::UnknownTerm {
                type_name: self.type_name().to_string(),
                term: name.to_string(),
            });
        }
        let item = item.into();
        let mut schema = self.clone();
        match &item {
            TermItem::Schema(child) => schema.register(child),
            TermItem::When(WhenTerm::Concat(child)) => schema.register(child),
            _ => {}
        }
        schema
            .terms
            .entry(name.to_string())
            .or_insert(None)
            .get_or_insert_with(Vec::new)
            .push(item);
        Ok(schema)
    }

    /// Registers adjusters by target name for later [`tailor`](Schema::tailor)
    /// calls.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidValue`] for an empty map or an empty
    /// target name, or [`SchemaError::UnknownTerm`] when the type has no
    /// `alterations` term.
    pub fn alter<I, K>(&self, targets: I) -> Result<Schema>
    where
        I: IntoIterator<Item = (K, Adjuster)>,
        K: Into<String>,
    {
        let mut schema = self.clone();
        let mut added = 0;
        for (target, adjuster) in targets {
            let target = target.into();
            if target.is_empty() {
                return Err(SchemaError::InvalidValue(
                    "alteration target must be a non-empty string".to_string(),
                ));
            }
            schema = schema.add_term("alterations", TermItem::Alteration(Alteration { target, adjuster }))?;
            added += 1;
        }
        if added == 0 {
            return Err(SchemaError::InvalidValue(
                "alterations must contain at least one target".to_string(),
            ));
        }
        Ok(schema)
    }

    /// Applies every registered alteration whose target is listed, in
    /// registration order.
    ///
    /// # Errors
    ///
    /// Propagates adjuster errors and reports a panicking adjuster as
    /// [`SchemaError::AdjusterPanicked`].
    pub fn tailor(&self, targets: &[&str]) -> Result<Schema> {
        let alterations: Vec<Alteration> = self
            .term("alterations")
            .unwrap_or_default()
            .iter()
            .filter_map(TermItem::as_alteration)
            .filter(|alteration| targets.contains(&alteration.target.as_str()))
            .cloned()
            .collect();

        let mut schema = self.clone();
        for alteration in alterations {
            debug!(target = %alteration.target, "applying alteration");
            let current = schema;
            schema = isolate(|| alteration.adjuster.apply(current)).map_err(|message| {
                SchemaError::AdjusterPanicked {
                    target: alteration.target.clone(),
                    message,
                }
            })??;
        }
        Ok(schema)
    }

    /// Registers a nested schema by its `id` flag. The nested schema is held
    /// by reference and its external references are linked into this one.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidValue`] when the schema has no id, or
    /// [`SchemaError::UnknownTerm`] when the type has no `shared` term.
    pub fn shared(&self, schema: impl Into<Arc<Schema>>) -> Result<Schema> {
        let schema = schema.into();
        if schema.flag("id").and_then(Value::as_str).is_none() {
            return Err(SchemaError::InvalidValue(
                "shared schema must have an id".to_string(),
            ));
        }
        self.add_term("shared", TermItem::Schema(schema))
    }

    /// Looks up a shared schema by id. The most recent registration wins.
    pub fn shared_schema(&self, id: &str) -> Option<&Arc<Schema>> {
        self.term("shared")?
            .iter()
            .rev()
            .filter_map(TermItem::as_schema)
            .find(|schema| schema.flag("id").and_then(Value::as_str) == Some(id))
    }
}
