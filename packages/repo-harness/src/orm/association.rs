//! Translates a [`Filter`] into joins and conditions on a [`QueryBuilder`].

use crate::error::HarnessError;
use crate::filter::{CompareOp, Criteria, Filter, FilterValue};
use crate::metadata::{EntityMeta, FieldKind, MetadataRegistry};
use crate::orm::query::{Predicate, QueryBuilder};

/// Adds `filter` to `qb`, depth first.
///
/// Nested filters on associations inner-join the target as
/// `<alias>__<field>` and recurse there. Nested filters on embedded fields
/// are read as dotted keys. Criteria and expressions are merged as they
/// are; their key in the filter is ignored.
pub fn build_association_query(
    qb: &mut QueryBuilder,
    registry: &MetadataRegistry,
    class: &str,
    alias: &str,
    filter: &Filter,
) -> Result<(), HarnessError> {
    let meta = registry.get(class)?;
    for (key, value) in filter.iter() {
        match value {
            FilterValue::Criteria(criteria) => {
                qb.add_criteria(alias, criteria);
            }
            FilterValue::Expression(expr) => {
                qb.add_criteria(alias, &Criteria::new().and_where(expr.clone()));
            }
            FilterValue::Nested(nested) => {
                let field = meta.require_field(key)?;
                match &field.kind {
                    FieldKind::ToOne { target, .. } | FieldKind::ToMany { target, .. } => {
                        let join_alias = format!("{alias}__{key}");
                        qb.inner_join(alias, key, &join_alias, target);
                        build_association_query(qb, registry, target, &join_alias, nested)?;
                    }
                    FieldKind::Embedded(_) => {
                        embedded_conditions(qb, &meta, alias, key, nested)?;
                    }
                    FieldKind::Scalar { .. } => {
                        return Err(HarnessError::invalid_filter(
                            class,
                            format!("\"{key}\" is not an association and cannot take a nested filter"),
                        ))
                    }
                }
            }
            FilterValue::IsNull => {
                require_column(&meta, key)?;
                qb.and_where(Predicate::IsNull {
                    alias: alias.to_string(),
                    field: key.to_string(),
                });
            }
            FilterValue::Equals(v) => {
                require_column(&meta, key)?;
                let param = qb.next_parameter(v.clone());
                qb.and_where(Predicate::Compare {
                    alias: alias.to_string(),
                    field: key.to_string(),
                    op: CompareOp::Eq,
                    param,
                });
            }
        }
    }
    Ok(())
}

fn embedded_conditions(
    qb: &mut QueryBuilder,
    meta: &EntityMeta,
    alias: &str,
    owner: &str,
    nested: &Filter,
) -> Result<(), HarnessError> {
    for (sub, value) in nested.iter() {
        let path = format!("{owner}.{sub}");
        require_column(meta, &path)?;
        let predicate = match value {
            FilterValue::IsNull => Predicate::IsNull {
                alias: alias.to_string(),
                field: path,
            },
            FilterValue::Equals(v) => Predicate::Compare {
                alias: alias.to_string(),
                param: qb.next_parameter(v.clone()),
                field: path,
                op: CompareOp::Eq,
            },
            _ => {
                return Err(HarnessError::invalid_filter(
                    &meta.name,
                    format!("embedded field \"{path}\" only takes scalar values"),
                ))
            }
        };
        qb.and_where(predicate);
    }
    Ok(())
}

fn require_column(meta: &EntityMeta, key: &str) -> Result<(), HarnessError> {
    if meta.column_for(key).is_some() {
        return Ok(());
    }
    match meta.field(key) {
        Some(_) => Err(HarnessError::invalid_filter(
            &meta.name,
            format!("\"{key}\" cannot be compared to a single value"),
        )),
        None => Err(HarnessError::unknown_field(&meta.name, key)),
    }
}
