//! Identifier translation
//!
//! Maps `(type, producer id)` to the consumer id the target store assigned,
//! and rewrites reference markers in attributes through that mapping.
//! Records must arrive after everything they reference; a marker pointing
//! at a key that was never inserted is a [`Error::MissingReference`].

use crate::record::{Attributes, Id, Reference, Target, Value};
use crate::{Error, Result};
use std::collections::HashMap;

/// `(type, producer id) -> consumer id`, owned by one loader
#[derive(Debug, Clone, Default)]
pub struct TranslationTable {
    ids: HashMap<String, HashMap<Id, Id>>,
    len: usize,
}

impl TranslationTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a mapping; an existing one is overwritten and returned
    pub fn insert(&mut self, type_name: &str, id: Id, translated: Id) -> Option<Id> {
        let previous = self
            .ids
            .entry(type_name.to_string())
            .or_default()
            .insert(id, translated);
        if previous.is_none() {
            self.len += 1;
        }
        previous
    }

    /// Consumer id for `(type, id)`, if loaded
    pub fn get(&self, type_name: &str, id: &Id) -> Option<&Id> {
        self.ids.get(type_name).and_then(|ids| ids.get(id))
    }

    /// Consumer id for `(type, id)` or a missing reference error
    pub fn resolve(&self, type_name: &str, id: &Id) -> Result<Id> {
        self.get(type_name, id)
            .cloned()
            .ok_or_else(|| Error::missing_reference(type_name, id.clone()))
    }

    /// Replace a marker by its translated id(s)
    pub fn resolve_reference(&self, reference: &Reference) -> Result<Value> {
        match &reference.target {
            Target::One(id) => Ok(Value::Id(self.resolve(&reference.target_type, id)?)),
            Target::Many(ids) => ids
                .iter()
                .map(|id| self.resolve(&reference.target_type, id).map(Value::Id))
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
        }
    }

    /// Copy of `value` with every nested marker translated
    pub fn rewrite_value(&self, value: &Value) -> Result<Value> {
        match value {
            Value::Ref(reference) => self.resolve_reference(reference),
            Value::List(items) if value.has_references() => items
                .iter()
                .map(|item| self.rewrite_value(item))
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
            Value::Map(map) if value.has_references() => self.rewrite(map).map(Value::Map),
            other => Ok(other.clone()),
        }
    }

    /// Copy of `attributes` with every marker translated, order preserved
    pub fn rewrite(&self, attributes: &Attributes) -> Result<Attributes> {
        attributes
            .iter()
            .map(|(name, value)| -> Result<(String, Value)> {
                Ok((name.clone(), self.rewrite_value(value)?))
            })
            .collect()
    }

    /// Number of mappings
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
