//! Row mapping between entity objects and table columns.

use std::collections::BTreeMap;

use sea_orm::sea_query::{Alias, Expr, Query, SelectStatement, SimpleExpr, Value as SeaValue};
use sea_orm::QueryResult;
use uuid::Uuid;

use crate::entity::EntityRef;
use crate::error::HarnessError;
use crate::metadata::{embedded_column, ColumnType, EntityMeta, FieldKind, MetadataRegistry};
use crate::value::Value;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum ColumnSource {
    Field(String),
    Embedded { field: String, sub: String },
    ToOne { field: String, target: String },
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ColumnSpec {
    pub column: String,
    pub column_type: ColumnType,
    pub source: ColumnSource,
}

/// Column values of one row, keyed by column name. Related entities are
/// represented by their identifier value.
pub(crate) type RowState = BTreeMap<String, Value>;

/// Every column backing `meta`, in field declaration order.
pub(crate) fn columns(
    meta: &EntityMeta,
    registry: &MetadataRegistry,
) -> Result<Vec<ColumnSpec>, HarnessError> {
    let mut out = Vec::new();
    for field in &meta.fields {
        match &field.kind {
            FieldKind::Scalar {
                column,
                column_type,
            } => out.push(ColumnSpec {
                column: column.clone(),
                column_type: *column_type,
                source: ColumnSource::Field(field.name.clone()),
            }),
            FieldKind::Embedded(embeddable) => {
                for sub in &embeddable.fields {
                    out.push(ColumnSpec {
                        column: embedded_column(&field.name, &sub.column),
                        column_type: sub.column_type,
                        source: ColumnSource::Embedded {
                            field: field.name.clone(),
                            sub: sub.name.clone(),
                        },
                    });
                }
            }
            FieldKind::ToOne {
                target,
                join_column,
                ..
            } => out.push(ColumnSpec {
                column: join_column.clone(),
                column_type: registry.id_column_type(target)?,
                source: ColumnSource::ToOne {
                    field: field.name.clone(),
                    target: target.clone(),
                },
            }),
            FieldKind::ToMany { .. } => {}
        }
    }
    Ok(out)
}

/// Replaces a related entity with its (single) identifier value.
pub(crate) fn flat_value(value: &Value, registry: &MetadataRegistry) -> Result<Value, HarnessError> {
    match value {
        Value::Entity(entity) => {
            let meta = registry.get(&entity.class())?;
            let [id] = meta.identifier.as_slice() else {
                return Err(HarnessError::invalid_argument(format!(
                    "{} has a composite identifier and cannot be used as a single value",
                    meta.name
                )));
            };
            match entity.get_or_null(id) {
                Value::Null => Err(HarnessError::flush(format!(
                    "related {} entity has no identifier yet",
                    meta.name
                ))),
                inner => flat_value(&inner, registry),
            }
        }
        Value::Collection(_) | Value::Embedded(_) => Err(HarnessError::invalid_argument(format!(
            "{} values cannot be stored in a single column",
            value.type_name()
        ))),
        other => Ok(other.clone()),
    }
}

/// Current column values of `entity`.
pub(crate) fn row_values(
    entity: &EntityRef,
    specs: &[ColumnSpec],
    registry: &MetadataRegistry,
) -> Result<RowState, HarnessError> {
    let mut row = RowState::new();
    for spec in specs {
        let value = match &spec.source {
            ColumnSource::Field(field) => entity.get_or_null(field),
            ColumnSource::Embedded { field, sub } => match entity.get(field) {
                Some(Value::Embedded(e)) => e.fields.get(sub).cloned().unwrap_or_default(),
                _ => Value::Null,
            },
            ColumnSource::ToOne { field, .. } => match entity.get_or_null(field) {
                Value::Null => Value::Null,
                related => flat_value(&related, registry)?,
            },
        };
        row.insert(spec.column.clone(), value);
    }
    Ok(row)
}

/// Identifier values of `entity` in declaration order, entity parts flattened.
pub(crate) fn identifier_values(
    entity: &EntityRef,
    meta: &EntityMeta,
    registry: &MetadataRegistry,
) -> Result<Vec<Value>, HarnessError> {
    meta.identifier
        .iter()
        .map(|id| flat_value(&entity.get_or_null(id), registry))
        .collect()
}

/// Identifier columns of `meta` in declaration order.
pub(crate) fn identifier_columns(meta: &EntityMeta) -> Result<Vec<String>, HarnessError> {
    meta.identifier
        .iter()
        .map(|id| {
            meta.column_for(id)
                .ok_or_else(|| HarnessError::unknown_field(&meta.name, id))
        })
        .collect()
}

/// Identity-map key built from flattened identifier values.
pub(crate) fn identity_key(values: &[Value]) -> Option<String> {
    if values.iter().any(Value::is_null) {
        return None;
    }
    let parts: Vec<String> = values
        .iter()
        .map(|v| match v {
            Value::Text(s) => s.clone(),
            other => other.to_string(),
        })
        .collect();
    Some(parts.join("\u{1f}"))
}

pub(crate) fn to_sea_value(value: &Value, column_type: ColumnType) -> Result<SeaValue, HarnessError> {
    Ok(match (value, column_type) {
        (Value::Null, ColumnType::Integer) => SeaValue::BigInt(None),
        (Value::Null, ColumnType::Boolean) => SeaValue::Bool(None),
        (Value::Null, ColumnType::Float) => SeaValue::Double(None),
        (Value::Null, ColumnType::Text | ColumnType::Uuid) => SeaValue::String(None),
        (Value::Bool(b), _) => SeaValue::Bool(Some(*b)),
        (Value::Int(i), ColumnType::Float) => SeaValue::Double(Some(*i as f64)),
        (Value::Int(i), _) => SeaValue::BigInt(Some(*i)),
        (Value::Float(f), _) => SeaValue::Double(Some(*f)),
        (Value::Text(s), _) => s.clone().into(),
        (Value::Uuid(u), _) => u.to_string().into(),
        (other, _) => {
            return Err(HarnessError::invalid_argument(format!(
                "cannot bind {} value as a query parameter",
                other.type_name()
            )))
        }
    })
}

/// Binds any scalar without a known column type.
pub(crate) fn to_untyped_sea_value(value: &Value) -> Result<SeaValue, HarnessError> {
    let column_type = match value {
        Value::Int(_) => ColumnType::Integer,
        Value::Bool(_) => ColumnType::Boolean,
        Value::Float(_) => ColumnType::Float,
        _ => ColumnType::Text,
    };
    to_sea_value(value, column_type)
}

pub(crate) fn read_column(
    row: &QueryResult,
    column: &str,
    column_type: ColumnType,
) -> Result<Value, HarnessError> {
    let value = match column_type {
        ColumnType::Integer => row.try_get_by::<Option<i64>, _>(column)?.map(Value::Int),
        ColumnType::Boolean => row.try_get_by::<Option<bool>, _>(column)?.map(Value::Bool),
        ColumnType::Float => row.try_get_by::<Option<f64>, _>(column)?.map(Value::Float),
        ColumnType::Text => row.try_get_by::<Option<String>, _>(column)?.map(Value::Text),
        ColumnType::Uuid => match row.try_get_by::<Option<String>, _>(column)? {
            Some(raw) => Some(Value::Uuid(Uuid::parse_str(&raw).map_err(|e| {
                HarnessError::invalid_argument(format!("column {column} holds an invalid uuid: {e}"))
            })?)),
            None => None,
        },
    };
    Ok(value.unwrap_or_default())
}

pub(crate) fn read_row(row: &QueryResult, specs: &[ColumnSpec]) -> Result<RowState, HarnessError> {
    specs
        .iter()
        .map(|spec| Ok((spec.column.clone(), read_column(row, &spec.column, spec.column_type)?)))
        .collect()
}

/// `column = value` conditions for every identifier column.
pub(crate) fn identifier_condition(
    meta: &EntityMeta,
    specs: &[ColumnSpec],
    values: &[Value],
) -> Result<Vec<SimpleExpr>, HarnessError> {
    let columns = identifier_columns(meta)?;
    if columns.len() != values.len() {
        return Err(HarnessError::invalid_argument(format!(
            "{} expects {} identifier value(s), got {}",
            meta.name,
            columns.len(),
            values.len()
        )));
    }
    columns
        .iter()
        .zip(values)
        .map(|(column, value)| {
            let column_type = specs
                .iter()
                .find(|s| s.column == *column)
                .map(|s| s.column_type)
                .unwrap_or(ColumnType::Text);
            Ok(Expr::col((Alias::new(&meta.table), Alias::new(column)))
                .eq(to_sea_value(value, column_type)?))
        })
        .collect()
}

/// `SELECT <all columns> FROM <table>`.
pub(crate) fn select_all(meta: &EntityMeta, specs: &[ColumnSpec]) -> SelectStatement {
    let mut stmt = Query::select();
    stmt.from(Alias::new(&meta.table));
    for spec in specs {
        stmt.column((Alias::new(&meta.table), Alias::new(&spec.column)));
    }
    stmt
}
