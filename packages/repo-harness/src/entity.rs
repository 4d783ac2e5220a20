//! Shared entity objects.
//!
//! An entity is a bag of named field values tagged with its class name.
//! Handles are reference-counted and compared by pointer, so the same
//! database row loaded twice through the identity map yields the very
//! same handle, and a detached copy compares unequal.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::value::Value;

#[derive(Debug)]
struct EntityObject {
    class: String,
    fields: BTreeMap<String, Value>,
}

#[derive(Clone)]
pub struct EntityRef(Arc<RwLock<EntityObject>>);

impl EntityRef {
    pub(crate) fn new(class: impl Into<String>, fields: BTreeMap<String, Value>) -> Self {
        Self(Arc::new(RwLock::new(EntityObject {
            class: class.into(),
            fields,
        })))
    }

    pub fn class(&self) -> String {
        self.0.read().class.clone()
    }

    /// Current value of `field`, `None` when the object has no such field.
    pub fn get(&self, field: &str) -> Option<Value> {
        self.0.read().fields.get(field).cloned()
    }

    pub fn get_or_null(&self, field: &str) -> Value {
        self.get(field).unwrap_or(Value::Null)
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.0.read().fields.contains_key(field)
    }

    /// Entities currently held by a to-many field, empty for anything else.
    pub fn collection(&self, field: &str) -> Vec<EntityRef> {
        match self.get(field) {
            Some(Value::Collection(items)) => items,
            _ => Vec::new(),
        }
    }

    /// Related entity held by a to-one field.
    pub fn related(&self, field: &str) -> Option<EntityRef> {
        match self.get(field) {
            Some(Value::Entity(entity)) => Some(entity),
            _ => None,
        }
    }

    pub(crate) fn set(&self, field: impl Into<String>, value: Value) {
        self.0.write().fields.insert(field.into(), value);
    }

    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut BTreeMap<String, Value>) -> R) -> R {
        f(&mut self.0.write().fields)
    }

    pub fn ptr_eq(&self, other: &EntityRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    #[cfg(test)]
    pub(crate) fn strong_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

impl PartialEq for EntityRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for EntityRef {}

// Entities form cycles through bidirectional associations, so Debug never descends into fields.
impl fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:#x}", self.class(), self.addr())
    }
}
