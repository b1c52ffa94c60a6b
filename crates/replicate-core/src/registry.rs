//! Type registry for record reconstruction
//!
//! The loader never guesses how to build an object from a record. The host
//! registers one [`Reconstruct`] capability per record type name and hands
//! the registry to the loader at construction time.

use crate::record::{Attributes, Id};
use crate::{Error, Result};
use std::any::Any;
use std::collections::HashMap;

/// Result of reconstructing one record on the consumer side
pub struct Reconstructed {
    /// Consumer-side identifier assigned to the new object
    pub id: Id,
    /// The constructed object, handed to loader stages
    pub object: Box<dyn Any>,
}

impl Reconstructed {
    /// Pair a consumer id with the object built for it
    pub fn new(id: impl Into<Id>, object: impl Any) -> Self {
        Self {
            id: id.into(),
            object: Box::new(object),
        }
    }
}

impl std::fmt::Debug for Reconstructed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconstructed").field("id", &self.id).finish()
    }
}

/// Per-type reconstruction capability
pub trait Reconstruct {
    /// Build an object from a producer id and already-translated attributes
    fn reconstruct(&mut self, id: &Id, attributes: &Attributes) -> Result<Reconstructed>;
}

impl<F> Reconstruct for F
where
    F: FnMut(&Id, &Attributes) -> Result<Reconstructed>,
{
    fn reconstruct(&mut self, id: &Id, attributes: &Attributes) -> Result<Reconstructed> {
        self(id, attributes)
    }
}

/// Table of record type name to reconstruction capability
#[derive(Default)]
pub struct TypeRegistry<'a> {
    types: HashMap<String, Box<dyn Reconstruct + 'a>>,
}

impl<'a> TypeRegistry<'a> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            types: HashMap::new(),
        }
    }

    /// Register the capability for `type_name`, replacing any earlier one
    pub fn register(&mut self, type_name: impl Into<String>, capability: impl Reconstruct + 'a) {
        let type_name = type_name.into();
        if self
            .types
            .insert(type_name.clone(), Box::new(capability))
            .is_some()
        {
            tracing::debug!("Replaced reconstruction capability for {}", type_name);
        }
    }

    /// Builder form of [`register`](Self::register)
    pub fn with(mut self, type_name: impl Into<String>, capability: impl Reconstruct + 'a) -> Self {
        self.register(type_name, capability);
        self
    }

    /// Capability for `type_name`
    pub fn get_mut(&mut self, type_name: &str) -> Result<&mut (dyn Reconstruct + 'a)> {
        self.types
            .get_mut(type_name)
            .map(|capability| &mut **capability)
            .ok_or_else(|| Error::unresolvable_type(type_name))
    }

    /// Reconstruct a record of `type_name`
    pub fn reconstruct(
        &mut self,
        type_name: &str,
        id: &Id,
        attributes: &Attributes,
    ) -> Result<Reconstructed> {
        self.get_mut(type_name)?.reconstruct(id, attributes)
    }

    /// True if `type_name` has a capability
    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Registered type names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// True if no type is registered
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl std::fmt::Debug for TypeRegistry<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.names())
            .finish()
    }
}
