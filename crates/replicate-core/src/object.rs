//! Generic attribute-bag objects
//!
//! [`ReplicantObject`] carries a type name, an id and attributes without any
//! application schema behind it. [`ObjectType`] is the matching
//! reconstruction capability: it assigns fresh sequential ids on the
//! consumer side and keeps every object it built.

use crate::dumper::Replicant;
use crate::record::{Attributes, Id, Record, Value};
use crate::registry::{Reconstruct, Reconstructed};
use crate::Result;
use std::cell::RefCell;
use std::rc::Rc;

/// Schema-less replicant
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicantObject {
    /// Record type name
    pub type_name: String,
    /// Identifier
    pub id: Id,
    /// Attributes
    pub attributes: Attributes,
}

impl ReplicantObject {
    /// Create an object
    pub fn new(type_name: impl Into<String>, id: impl Into<Id>, attributes: Attributes) -> Self {
        Self {
            type_name: type_name.into(),
            id: id.into(),
            attributes,
        }
    }

    /// Attribute by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }
}

impl Replicant for ReplicantObject {
    fn describe(&self) -> Result<Record> {
        Ok(Record::new(
            self.type_name.clone(),
            self.id.clone(),
            self.attributes.clone(),
        ))
    }

    fn key(&self) -> Option<(String, Id)> {
        Some((self.type_name.clone(), self.id.clone()))
    }
}

/// Objects built by an [`ObjectType`], shared with the caller
pub type ObjectStore = Rc<RefCell<Vec<ReplicantObject>>>;

/// Reconstructs records into [`ReplicantObject`]s with new integer ids
#[derive(Debug)]
pub struct ObjectType {
    type_name: String,
    next_id: i64,
    store: ObjectStore,
}

impl ObjectType {
    /// Assign ids starting at 1
    pub fn new(type_name: impl Into<String>) -> Self {
        Self::starting_at(type_name, 1)
    }

    /// Assign ids starting at `first_id`
    pub fn starting_at(type_name: impl Into<String>, first_id: i64) -> Self {
        Self {
            type_name: type_name.into(),
            next_id: first_id,
            store: ObjectStore::default(),
        }
    }

    /// Handle to the objects built so far
    pub fn store(&self) -> ObjectStore {
        self.store.clone()
    }
}

impl Reconstruct for ObjectType {
    fn reconstruct(&mut self, _id: &Id, attributes: &Attributes) -> Result<Reconstructed> {
        let id = Id::Int(self.next_id);
        self.next_id += 1;

        let object = ReplicantObject::new(self.type_name.clone(), id.clone(), attributes.clone());
        self.store.borrow_mut().push(object.clone());
        Ok(Reconstructed::new(id, object))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_type_assigns_fresh_ids() {
        let mut things = ObjectType::starting_at("Thing", 500);
        let store = things.store();

        let first = things.reconstruct(&Id::Int(1), &Attributes::new()).unwrap();
        let second = things.reconstruct(&Id::Int(1), &Attributes::new()).unwrap();

        assert_eq!(first.id, Id::Int(500));
        assert_eq!(second.id, Id::Int(501));
        assert_eq!(store.borrow().len(), 2);
        assert_eq!(
            first.object.downcast_ref::<ReplicantObject>().map(|o| &o.id),
            Some(&Id::Int(500))
        );
    }

    #[test]
    fn test_describe_round_trips_fields() {
        let mut attrs = Attributes::new();
        attrs.insert("n".into(), Value::Int(123));
        let object = ReplicantObject::new("Thing", 3, attrs.clone());

        let record = object.describe().unwrap();
        assert_eq!(record, Record::new("Thing", 3, attrs));
        assert_eq!(object.key(), Some(("Thing".to_string(), Id::Int(3))));
    }
}
