use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::entity::EntityRef;

/// A field value as seen by the harness.
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Uuid(Uuid),
    Embedded(Embedded),
    Entity(EntityRef),
    Collection(Vec<EntityRef>),
}

/// An embedded value object: no identity, stored inline in the owner's row.
#[derive(Clone, Debug, PartialEq)]
pub struct Embedded {
    pub class: String,
    pub fields: BTreeMap<String, Value>,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&EntityRef> {
        match self {
            Value::Entity(e) => Some(e),
            _ => None,
        }
    }

    /// Type label used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "double",
            Value::Text(_) => "string",
            Value::Uuid(_) => "uuid",
            Value::Embedded(_) => "embedded",
            Value::Entity(_) => "entity",
            Value::Collection(_) => "collection",
        }
    }

    /// Scalars only; arrays and objects have no single-value meaning.
    pub fn from_json(json: &JsonValue) -> Option<Value> {
        match json {
            JsonValue::Null => Some(Value::Null),
            JsonValue::Bool(b) => Some(Value::Bool(*b)),
            JsonValue::Number(n) => n
                .as_i64()
                .map(Value::Int)
                .or_else(|| n.as_f64().map(Value::Float)),
            JsonValue::String(s) => Some(Value::Text(s.clone())),
            JsonValue::Array(_) | JsonValue::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::from(*i),
            Value::Float(f) => JsonValue::from(*f),
            Value::Text(s) => JsonValue::String(s.clone()),
            Value::Uuid(u) => JsonValue::String(u.to_string()),
            Value::Embedded(e) => JsonValue::Object(
                e.fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Entity(e) => JsonValue::String(e.class()),
            Value::Collection(items) => {
                JsonValue::Array(items.iter().map(|e| JsonValue::String(e.class())).collect())
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Uuid(a), Value::Uuid(b)) => a == b,
            (Value::Embedded(a), Value::Embedded(b)) => a == b,
            (Value::Entity(a), Value::Entity(b)) => a.ptr_eq(b),
            (Value::Collection(a), Value::Collection(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.ptr_eq(y))
            }
            _ => false,
        }
    }
}

// Rendering follows var_export conventions so debug lines read naturally.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "'{s}'"),
            Value::Uuid(u) => write!(f, "{u}"),
            Value::Embedded(e) => write!(f, "{}", e.class),
            Value::Entity(e) => write!(f, "{}", e.class()),
            Value::Collection(items) => write!(f, "collection({})", items.len()),
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v.into())
            }
        })*
    };
}

value_from! {
    bool => Bool,
    i64 => Int,
    i32 => Int,
    u32 => Int,
    f64 => Float,
    String => Text,
    &str => Text,
    Uuid => Uuid,
    EntityRef => Entity,
    Vec<EntityRef> => Collection,
}

impl From<&EntityRef> for Value {
    fn from(v: &EntityRef) -> Self {
        Value::Entity(v.clone())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Identifier of a persisted entity.
///
/// Parts that are themselves entities (identifier through a to-one
/// association) are returned as the raw entity.
#[derive(Clone, Debug, PartialEq)]
pub enum PrimaryKey {
    Single(Value),
    Composite(Vec<Value>),
}

impl PrimaryKey {
    pub fn values(&self) -> Vec<Value> {
        match self {
            PrimaryKey::Single(v) => vec![v.clone()],
            PrimaryKey::Composite(vs) => vs.clone(),
        }
    }

    pub fn as_single(&self) -> Option<&Value> {
        match self {
            PrimaryKey::Single(v) => Some(v),
            PrimaryKey::Composite(_) => None,
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, PrimaryKey::Composite(_))
    }
}

impl From<PrimaryKey> for Value {
    /// Single keys unwrap to their value; composite keys have no scalar form and become `Null`.
    fn from(pk: PrimaryKey) -> Self {
        match pk {
            PrimaryKey::Single(v) => v,
            PrimaryKey::Composite(_) => Value::Null,
        }
    }
}
