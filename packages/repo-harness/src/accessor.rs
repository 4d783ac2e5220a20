//! Direct field access on entity objects.
//!
//! Values are written straight into the object's field table; nothing
//! resembling a setter runs, so population is deterministic regardless of
//! what the domain code would do on assignment.

use std::collections::BTreeMap;

use tracing::debug;
use uuid::Uuid;

use crate::entity::EntityRef;
use crate::error::HarnessError;
use crate::metadata::{EmbeddableMeta, EntityMeta, FieldKind, IdGeneration};
use crate::value::{Embedded, Value};

pub struct PropertyAccessor;

impl PropertyAccessor {
    /// Constructs a new object of `meta`'s type.
    ///
    /// Constructor parameters are matched by name against `properties`;
    /// unmatched parameters fall back to their declared default, and a
    /// parameter without one fails with `MissingConstructorArgument`.
    pub fn instantiate(
        meta: &EntityMeta,
        properties: &[(String, Value)],
    ) -> Result<EntityRef, HarnessError> {
        let mut fields = initial_fields(meta);

        if meta.id_generation == IdGeneration::Uuid {
            if let [id] = meta.identifier.as_slice() {
                fields.insert(id.clone(), Value::Uuid(Uuid::new_v4()));
            }
        }

        for param in &meta.constructor {
            let supplied = properties
                .iter()
                .rev()
                .find(|(name, _)| *name == param.name)
                .map(|(_, v)| v.clone());
            let value = match (supplied, &param.default) {
                (Some(v), _) => v,
                (None, Some(default)) => default.clone(),
                (None, None) => {
                    return Err(HarnessError::MissingConstructorArgument {
                        class: meta.name.clone(),
                        parameter: param.name.clone(),
                    })
                }
            };
            if meta.field(&param.name).is_some() {
                fields.insert(param.name.clone(), value);
            }
        }

        Ok(EntityRef::new(&meta.name, fields))
    }

    /// Blank object for hydration: defaults only, the constructor never runs.
    pub fn instantiate_without_constructor(meta: &EntityMeta) -> EntityRef {
        EntityRef::new(&meta.name, initial_fields(meta))
    }

    /// Writes every property that names a mapped field; other keys are skipped.
    pub fn set_properties(
        entity: &EntityRef,
        meta: &EntityMeta,
        properties: impl IntoIterator<Item = (String, Value)>,
    ) {
        for (name, value) in properties {
            if meta.field(&name).is_some() {
                Self::set_property(entity, name, value);
            } else {
                debug!(class = %meta.name, field = %name, "skipping unmapped property");
            }
        }
    }

    pub fn set_property(entity: &EntityRef, field: impl Into<String>, value: Value) {
        entity.set(field, value);
    }

    pub fn get_property(entity: &EntityRef, field: &str) -> Option<Value> {
        entity.get(field)
    }

    /// Writes sub-fields of an embedded value object in place.
    pub fn set_embedded_properties(
        entity: &EntityRef,
        field: &str,
        embeddable: &EmbeddableMeta,
        values: impl IntoIterator<Item = (String, Value)>,
    ) {
        entity.update(|fields| {
            let slot = fields
                .entry(field.to_string())
                .or_insert_with(|| Value::Embedded(new_embedded(embeddable)));
            if !matches!(slot, Value::Embedded(_)) {
                *slot = Value::Embedded(new_embedded(embeddable));
            }
            if let Value::Embedded(embedded) = slot {
                for (name, value) in values {
                    embedded.fields.insert(name, value);
                }
            }
        });
    }

    /// Reads a dotted embedded path such as `embed.val`.
    pub fn get_embedded_property(entity: &EntityRef, field: &str, sub: &str) -> Option<Value> {
        match entity.get(field)? {
            Value::Embedded(embedded) => embedded.fields.get(sub).cloned(),
            _ => None,
        }
    }
}

fn initial_fields(meta: &EntityMeta) -> BTreeMap<String, Value> {
    meta.fields
        .iter()
        .map(|field| {
            let initial = match &field.kind {
                FieldKind::Embedded(embeddable) => Value::Embedded(new_embedded(embeddable)),
                _ => field.default.clone(),
            };
            (field.name.clone(), initial)
        })
        .collect()
}

fn new_embedded(embeddable: &EmbeddableMeta) -> Embedded {
    Embedded {
        class: embeddable.class.clone(),
        fields: embeddable
            .fields
            .iter()
            .map(|f| (f.name.clone(), Value::Null))
            .collect(),
    }
}
