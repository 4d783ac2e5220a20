//! Builds entity graphs from nested population data.
//!
//! Every entity created along the way is scheduled for insertion and kept
//! in an instance registry so the caller can refresh them all after the
//! flush. To-many items get their back-reference set from the data; the
//! owning collection itself is left alone and only filled by the refresh.

use std::collections::BTreeMap;

use tracing::debug;

use crate::accessor::PropertyAccessor;
use crate::data::{Data, Input};
use crate::entity::EntityRef;
use crate::error::HarnessError;
use crate::metadata::{EntityMeta, FieldKind};
use crate::orm::EntityManager;
use crate::value::Value;

/// What to populate: a class to construct, or an existing object.
#[derive(Clone, Debug)]
pub enum Target {
    Class(String),
    Instance(EntityRef),
}

impl From<&str> for Target {
    fn from(v: &str) -> Self {
        Target::Class(v.to_string())
    }
}

impl From<String> for Target {
    fn from(v: String) -> Self {
        Target::Class(v)
    }
}

impl From<EntityRef> for Target {
    fn from(v: EntityRef) -> Self {
        Target::Instance(v)
    }
}

impl From<&EntityRef> for Target {
    fn from(v: &EntityRef) -> Self {
        Target::Instance(v.clone())
    }
}

pub struct Populator<'a> {
    em: &'a mut EntityManager,
    instances: Vec<EntityRef>,
}

impl<'a> Populator<'a> {
    pub fn new(em: &'a mut EntityManager) -> Self {
        Self {
            em,
            instances: Vec::new(),
        }
    }

    /// Creates or fills the root entity and everything its data describes.
    pub fn populate(&mut self, target: impl Into<Target>, data: Data) -> Result<EntityRef, HarnessError> {
        match target.into() {
            Target::Class(class) => self.instantiate_and_populate(&class, data),
            Target::Instance(entity) => self.populate_entity(&entity, data),
        }
    }

    /// Every entity touched so far, each once, in creation order.
    pub fn instances(&self) -> &[EntityRef] {
        &self.instances
    }

    pub fn into_instances(self) -> Vec<EntityRef> {
        self.instances
    }

    fn register(&mut self, entity: &EntityRef) {
        if !self.instances.iter().any(|e| e.ptr_eq(entity)) {
            self.instances.push(entity.clone());
        }
    }

    fn instantiate_and_populate(&mut self, class: &str, data: Data) -> Result<EntityRef, HarnessError> {
        let meta = self.em.metadata(class)?;
        let (scalars, relations) = split_scalars_and_relations(&meta, data);

        // Related objects that already exist may feed the constructor too.
        let mut properties: Vec<(String, Value)> = scalars
            .iter()
            .filter_map(|(k, v)| match v {
                Input::Value(value) => Some((k.to_string(), value.clone())),
                _ => None,
            })
            .collect();
        properties.extend(relations.iter().filter_map(|(k, v)| match v {
            Input::Value(value @ Value::Entity(_)) => Some((k.to_string(), value.clone())),
            _ => None,
        }));

        let entity = PropertyAccessor::instantiate(&meta, &properties)?;
        self.fill(&entity, &meta, scalars, relations)?;
        Ok(entity)
    }

    fn populate_entity(&mut self, entity: &EntityRef, data: Data) -> Result<EntityRef, HarnessError> {
        let meta = self.em.metadata(&entity.class())?;
        let (scalars, relations) = split_scalars_and_relations(&meta, data);
        self.fill(entity, &meta, scalars, relations)?;
        Ok(entity.clone())
    }

    fn fill(
        &mut self,
        entity: &EntityRef,
        meta: &EntityMeta,
        scalars: Data,
        relations: Data,
    ) -> Result<(), HarnessError> {
        self.register(entity);

        let mut properties: Vec<(String, Value)> = Vec::new();
        let mut embedded: BTreeMap<String, Vec<(String, Value)>> = BTreeMap::new();
        for (key, input) in scalars {
            match input {
                Input::Value(value) => match key.split_once('.') {
                    Some((owner, sub)) => embedded
                        .entry(owner.to_string())
                        .or_default()
                        .push((sub.to_string(), value)),
                    None => properties.push((key, value)),
                },
                Input::Map(nested) => {
                    let Some(FieldKind::Embedded(_)) = meta.field(&key).map(|f| &f.kind) else {
                        return Err(HarnessError::invalid_argument(format!(
                            "Field \"{key}\" of entity \"{}\" is not embedded and cannot take a mapping",
                            meta.name
                        )));
                    };
                    for (sub, input) in nested {
                        match input {
                            Input::Value(value) => embedded.entry(key.clone()).or_default().push((sub, value)),
                            other => debug!(
                                class = %meta.name,
                                field = %format!("{key}.{sub}"),
                                input = %other.type_name(),
                                "ignoring non-scalar embedded input"
                            ),
                        }
                    }
                }
                Input::List(_) => {
                    return Err(HarnessError::invalid_argument(format!(
                        "Field \"{key}\" of entity \"{}\" cannot take a list",
                        meta.name
                    )))
                }
            }
        }

        properties.extend(self.instantiate_relations(entity, meta, relations)?);
        PropertyAccessor::set_properties(entity, meta, properties);
        populate_embeddables(entity, meta, embedded);

        self.em.persist(entity)?;
        Ok(())
    }

    fn instantiate_relations(
        &mut self,
        master: &EntityRef,
        meta: &EntityMeta,
        relations: Data,
    ) -> Result<Vec<(String, Value)>, HarnessError> {
        let mut assigned = Vec::new();
        for (field, input) in relations {
            let kind = meta.require_field(&field)?.kind.clone();
            match (kind, input) {
                (FieldKind::ToMany { target, mapped_by }, Input::List(items)) => {
                    for item in items {
                        let Input::Map(mut nested) = item else {
                            return Err(invalid_association(meta, &field, "mapping", &item));
                        };
                        if let Some(back) = &mapped_by {
                            nested.insert(back.clone(), master);
                        }
                        let child = self.instantiate_and_populate(&target, nested)?;
                        self.register(&child);
                    }
                }
                (FieldKind::ToMany { .. }, input @ Input::Map(_)) => {
                    return Err(invalid_association(meta, &field, "a list of mappings", &input));
                }
                (FieldKind::ToOne { target, inversed_by, .. }, Input::Map(mut nested)) => {
                    if let Some(back) = inversed_by {
                        let target_meta = self.em.metadata(&target)?;
                        let links_back = matches!(
                            target_meta.field(&back).map(|f| &f.kind),
                            Some(FieldKind::ToOne { .. })
                        );
                        if links_back && nested.get(&back).is_none() {
                            nested.insert(back, master);
                        }
                    }
                    let child = self.instantiate_and_populate(&target, nested)?;
                    self.register(&child);
                    assigned.push((field, Value::Entity(child)));
                }
                (FieldKind::ToOne { .. }, input @ Input::List(_)) => {
                    return Err(invalid_association(meta, &field, "mapping", &input));
                }
                (_, Input::Value(value)) => assigned.push((field, value)),
                (_, input) => {
                    return Err(invalid_association(meta, &field, "an association value", &input));
                }
            }
        }
        Ok(assigned)
    }
}

fn split_scalars_and_relations(meta: &EntityMeta, data: Data) -> (Data, Data) {
    let mut scalars = Data::new();
    let mut relations = Data::new();
    for (field, input) in data {
        if meta.has_association(&field) {
            relations.insert(field, input);
        } else {
            // Unknown sub-fields of an embedded value are reported when it is filled.
            let mapped = match field.split_once('.') {
                Some((owner, _)) => matches!(meta.field(owner).map(|f| &f.kind), Some(FieldKind::Embedded(_))),
                None => meta.field(&field).is_some(),
            };
            if !mapped {
                debug!(class = %meta.name, %field, "ignoring unmapped key");
            }
            scalars.insert(field, input);
        }
    }
    (scalars, relations)
}

fn populate_embeddables(
    entity: &EntityRef,
    meta: &EntityMeta,
    mut collected: BTreeMap<String, Vec<(String, Value)>>,
) {
    for (field, embeddable) in meta.embedded_fields() {
        let Some(values) = collected.remove(field) else {
            continue;
        };
        let (known, unknown): (Vec<_>, Vec<_>) = values
            .into_iter()
            .partition(|(sub, _)| embeddable.get(sub).is_some());
        for (sub, _) in unknown {
            debug!(class = %meta.name, field = %format!("{field}.{sub}"), "ignoring unmapped key");
        }
        if !known.is_empty() {
            PropertyAccessor::set_embedded_properties(entity, field, embeddable, known);
        }
    }
}

fn invalid_association(meta: &EntityMeta, field: &str, expected: &'static str, got: &Input) -> HarnessError {
    HarnessError::InvalidAssociationInput {
        class: meta.name.clone(),
        field: field.to_string(),
        expected,
        got: got.type_name(),
    }
}
