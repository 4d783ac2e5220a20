//! Mapping metadata: one field-descriptor table per entity type.
//!
//! Everything the harness does with an entity is driven from these tables:
//! which keys are associations, where embedded values live, which columns
//! back which fields, and how the identifier is formed.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::HarnessError;
use crate::value::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Text,
    Boolean,
    Float,
    /// Stored as hyphenated text.
    Uuid,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdGeneration {
    /// Assigned by the store on insert.
    Auto,
    /// Supplied by the caller.
    Assigned,
    /// Generated when the object is constructed.
    Uuid,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EmbeddedField {
    pub name: String,
    pub column: String,
    pub column_type: ColumnType,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EmbeddableMeta {
    pub class: String,
    pub fields: Vec<EmbeddedField>,
}

impl EmbeddableMeta {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            fields: Vec::new(),
        }
    }

    /// Adds a field; the column is prefixed with the owning field name when the embeddable is attached.
    pub fn field(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        let name = name.into();
        self.fields.push(EmbeddedField {
            column: name.clone(),
            name,
            column_type,
        });
        self
    }

    pub fn get(&self, name: &str) -> Option<&EmbeddedField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldKind {
    Scalar {
        column: String,
        column_type: ColumnType,
    },
    Embedded(EmbeddableMeta),
    ToOne {
        target: String,
        join_column: String,
        inversed_by: Option<String>,
        cascade_persist: bool,
    },
    ToMany {
        target: String,
        mapped_by: Option<String>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldMeta {
    pub name: String,
    pub kind: FieldKind,
    /// Value a freshly constructed object holds.
    pub default: Value,
}

impl FieldMeta {
    pub fn is_association(&self) -> bool {
        matches!(self.kind, FieldKind::ToOne { .. } | FieldKind::ToMany { .. })
    }

    pub fn is_to_many(&self) -> bool {
        matches!(self.kind, FieldKind::ToMany { .. })
    }

    pub fn target(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::ToOne { target, .. } | FieldKind::ToMany { target, .. } => Some(target),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CtorParam {
    pub name: String,
    /// `None` marks a required parameter.
    pub default: Option<Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EntityMeta {
    pub name: String,
    pub table: String,
    pub fields: Vec<FieldMeta>,
    pub identifier: Vec<String>,
    pub id_generation: IdGeneration,
    pub constructor: Vec<CtorParam>,
}

impl EntityMeta {
    pub fn builder(name: impl Into<String>) -> EntityMetaBuilder {
        EntityMetaBuilder::new(name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn require_field(&self, name: &str) -> Result<&FieldMeta, HarnessError> {
        self.field(name)
            .ok_or_else(|| HarnessError::unknown_field(&self.name, name))
    }

    pub fn has_association(&self, name: &str) -> bool {
        self.field(name).is_some_and(FieldMeta::is_association)
    }

    pub fn is_identifier_composite(&self) -> bool {
        self.identifier.len() > 1
    }

    pub fn embedded_fields(&self) -> impl Iterator<Item = (&str, &EmbeddableMeta)> {
        self.fields.iter().filter_map(|f| match &f.kind {
            FieldKind::Embedded(e) => Some((f.name.as_str(), e)),
            _ => None,
        })
    }

    pub fn to_one_fields(&self) -> impl Iterator<Item = &FieldMeta> {
        self.fields
            .iter()
            .filter(|f| matches!(f.kind, FieldKind::ToOne { .. }))
    }

    /// Column behind a scalar, to-one, or dotted embedded path (`embed.val`).
    pub fn column_for(&self, path: &str) -> Option<String> {
        if let Some((owner, sub)) = path.split_once('.') {
            return match &self.field(owner)?.kind {
                FieldKind::Embedded(e) => e.get(sub).map(|f| embedded_column(owner, &f.column)),
                _ => None,
            };
        }
        match &self.field(path)?.kind {
            FieldKind::Scalar { column, .. } => Some(column.clone()),
            FieldKind::ToOne { join_column, .. } => Some(join_column.clone()),
            FieldKind::Embedded(_) | FieldKind::ToMany { .. } => None,
        }
    }

    pub fn is_auto_increment(&self) -> bool {
        self.id_generation == IdGeneration::Auto && self.identifier.len() == 1
    }
}

pub(crate) fn embedded_column(owner: &str, column: &str) -> String {
    format!("{owner}_{column}")
}

pub struct EntityMetaBuilder {
    meta: EntityMeta,
}

impl EntityMetaBuilder {
    fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            meta: EntityMeta {
                table: to_table_name(&name),
                name,
                fields: Vec::new(),
                identifier: Vec::new(),
                id_generation: IdGeneration::Assigned,
                constructor: Vec::new(),
            },
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.meta.table = table.into();
        self
    }

    /// Single identifier field.
    pub fn id(mut self, name: impl Into<String>, column_type: ColumnType, generation: IdGeneration) -> Self {
        let name = name.into();
        self.meta.id_generation = generation;
        self.meta.identifier = vec![name.clone()];
        self.scalar(name, column_type)
    }

    /// Adds a field to a composite identifier; declare parts in key order.
    pub fn id_part(mut self, name: impl Into<String>) -> Self {
        self.meta.identifier.push(name.into());
        self
    }

    pub fn scalar(self, name: impl Into<String>, column_type: ColumnType) -> Self {
        let name = name.into();
        let column = name.clone();
        self.scalar_with_column(name, column, column_type)
    }

    pub fn scalar_with_column(
        mut self,
        name: impl Into<String>,
        column: impl Into<String>,
        column_type: ColumnType,
    ) -> Self {
        self.meta.fields.push(FieldMeta {
            name: name.into(),
            kind: FieldKind::Scalar {
                column: column.into(),
                column_type,
            },
            default: Value::Null,
        });
        self
    }

    pub fn embedded(mut self, name: impl Into<String>, embeddable: EmbeddableMeta) -> Self {
        self.meta.fields.push(FieldMeta {
            name: name.into(),
            kind: FieldKind::Embedded(embeddable),
            default: Value::Null,
        });
        self
    }

    pub fn to_one(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.to_one_with(name, target, None, false)
    }

    pub fn to_one_with(
        mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        inversed_by: Option<&str>,
        cascade_persist: bool,
    ) -> Self {
        let name = name.into();
        self.meta.fields.push(FieldMeta {
            kind: FieldKind::ToOne {
                target: target.into(),
                join_column: format!("{name}_id"),
                inversed_by: inversed_by.map(str::to_string),
                cascade_persist,
            },
            name,
            default: Value::Null,
        });
        self
    }

    pub fn to_many(mut self, name: impl Into<String>, target: impl Into<String>, mapped_by: Option<&str>) -> Self {
        self.meta.fields.push(FieldMeta {
            name: name.into(),
            kind: FieldKind::ToMany {
                target: target.into(),
                mapped_by: mapped_by.map(str::to_string),
            },
            default: Value::Collection(Vec::new()),
        });
        self
    }

    /// Value the constructor assigns when the caller supplies none.
    pub fn default_value(mut self, field: &str, value: impl Into<Value>) -> Self {
        if let Some(f) = self.meta.fields.iter_mut().find(|f| f.name == field) {
            f.default = value.into();
        }
        self
    }

    /// Declares a constructor parameter bound to the field of the same name.
    pub fn ctor_param(mut self, name: impl Into<String>, default: Option<Value>) -> Self {
        self.meta.constructor.push(CtorParam {
            name: name.into(),
            default,
        });
        self
    }

    pub fn build(self) -> EntityMeta {
        self.meta
    }
}

fn to_table_name(class: &str) -> String {
    let mut out = String::with_capacity(class.len() + 4);
    for (i, ch) in class.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 && !out.ends_with('_') {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else if ch == ':' || ch == '\\' {
            if !out.ends_with('_') {
                out.push('_');
            }
        } else {
            out.push(ch);
        }
    }
    out
}

/// All mapped entity types, keyed by class name.
#[derive(Clone, Debug, Default)]
pub struct MetadataRegistry {
    entities: HashMap<String, Arc<EntityMeta>>,
    order: Vec<String>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, meta: EntityMeta) -> &mut Self {
        if !self.entities.contains_key(&meta.name) {
            self.order.push(meta.name.clone());
        }
        self.entities.insert(meta.name.clone(), Arc::new(meta));
        self
    }

    pub fn with(mut self, meta: EntityMeta) -> Self {
        self.register(meta);
        self
    }

    pub fn get(&self, class: &str) -> Result<Arc<EntityMeta>, HarnessError> {
        self.entities
            .get(class)
            .cloned()
            .ok_or_else(|| HarnessError::unknown_entity(class))
    }

    pub fn contains(&self, class: &str) -> bool {
        self.entities.contains_key(class)
    }

    /// Entities in registration order.
    pub fn all(&self) -> impl Iterator<Item = &Arc<EntityMeta>> {
        self.order.iter().filter_map(|name| self.entities.get(name))
    }

    /// Column type of the single identifier of `class`, following to-one identifiers.
    pub fn id_column_type(&self, class: &str) -> Result<ColumnType, HarnessError> {
        let meta = self.get(class)?;
        let [id] = meta.identifier.as_slice() else {
            return Err(HarnessError::invalid_argument(format!(
                "{class} has a composite identifier and cannot be referenced by a single join column"
            )));
        };
        match &meta.require_field(id)?.kind {
            FieldKind::Scalar { column_type, .. } => Ok(*column_type),
            FieldKind::ToOne { target, .. } => self.id_column_type(target),
            _ => Err(HarnessError::invalid_argument(format!(
                "identifier {class}.{id} must be a scalar or to-one field"
            ))),
        }
    }

    /// Column of the single identifier of `class`.
    pub fn id_column(&self, class: &str) -> Result<String, HarnessError> {
        let meta = self.get(class)?;
        let [id] = meta.identifier.as_slice() else {
            return Err(HarnessError::invalid_argument(format!(
                "{class} has a composite identifier"
            )));
        };
        meta.column_for(id)
            .ok_or_else(|| HarnessError::unknown_field(&meta.name, id))
    }
}
