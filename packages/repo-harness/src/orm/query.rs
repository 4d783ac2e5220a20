//! Query builder over aliases, joins and positional parameters.
//!
//! Parameters are numbered by one counter per builder, so every `?N` in a
//! query names a distinct value no matter how many joins or criteria
//! contribute to it.

use std::fmt::Write as _;

use sea_orm::sea_query::{
    Alias, Asterisk, Cond, Condition, Expr, JoinType, Order as SeaOrder, Query, SelectStatement,
    SimpleExpr,
};

use crate::error::HarnessError;
use crate::filter::{CompareOp, Criteria, Expression, Order};
use crate::metadata::{EntityMeta, FieldKind, MetadataRegistry};
use crate::orm::persister::{flat_value, identifier_columns, to_untyped_sea_value};
use crate::value::Value;

#[derive(Clone, Debug, PartialEq)]
pub struct Join {
    pub parent_alias: String,
    pub field: String,
    pub alias: String,
    pub class: String,
}

/// A predicate bound to an alias; values live in the parameter list.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Compare {
        alias: String,
        field: String,
        op: CompareOp,
        param: usize,
    },
    In {
        alias: String,
        field: String,
        params: Vec<usize>,
        negated: bool,
    },
    IsNull {
        alias: String,
        field: String,
    },
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
}

/// What a compiled query selects.
#[derive(Clone, Debug, PartialEq)]
pub enum Selection {
    /// Rows of the root entity; joins may repeat a row, callers de-duplicate.
    Entities,
    /// `COUNT(*)` aliased `cnt`.
    Count,
    /// One field of the root entity.
    Field(String),
}

#[derive(Clone, Debug)]
pub struct QueryBuilder {
    root_class: String,
    root_alias: String,
    joins: Vec<Join>,
    predicates: Vec<Predicate>,
    orderings: Vec<(String, String, Order)>,
    parameters: Vec<Value>,
}

impl QueryBuilder {
    pub fn new(class: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            root_class: class.into(),
            root_alias: alias.into(),
            joins: Vec::new(),
            predicates: Vec::new(),
            orderings: Vec::new(),
            parameters: Vec::new(),
        }
    }

    pub fn root_class(&self) -> &str {
        &self.root_class
    }

    pub fn root_alias(&self) -> &str {
        &self.root_alias
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn parameters(&self) -> &[Value] {
        &self.parameters
    }

    /// Binds `value` to the next free positional index.
    pub fn next_parameter(&mut self, value: Value) -> usize {
        self.parameters.push(value);
        self.parameters.len() - 1
    }

    pub fn inner_join(
        &mut self,
        parent_alias: impl Into<String>,
        field: impl Into<String>,
        alias: impl Into<String>,
        class: impl Into<String>,
    ) -> &mut Self {
        self.joins.push(Join {
            parent_alias: parent_alias.into(),
            field: field.into(),
            alias: alias.into(),
            class: class.into(),
        });
        self
    }

    pub fn and_where(&mut self, predicate: Predicate) -> &mut Self {
        self.predicates.push(predicate);
        self
    }

    pub fn order_by(&mut self, alias: impl Into<String>, field: impl Into<String>, order: Order) -> &mut Self {
        self.orderings.push((alias.into(), field.into(), order));
        self
    }

    /// Merges a criteria object: its predicate becomes one more AND-ed
    /// condition and its orderings are appended, all resolved at `alias`.
    pub fn add_criteria(&mut self, alias: &str, criteria: &Criteria) -> &mut Self {
        if let Some(expr) = criteria.predicate() {
            let predicate = self.bind_expression(alias, expr);
            self.predicates.push(predicate);
        }
        for (field, order) in criteria.orderings() {
            self.orderings.push((alias.to_string(), field.clone(), *order));
        }
        self
    }

    fn bind_expression(&mut self, alias: &str, expr: &Expression) -> Predicate {
        match expr {
            Expression::Compare { field, op, value } => {
                let bound = match (op, value) {
                    (CompareOp::Contains, Value::Text(s)) => Value::Text(format!("%{s}%")),
                    (CompareOp::StartsWith, Value::Text(s)) => Value::Text(format!("{s}%")),
                    (CompareOp::EndsWith, Value::Text(s)) => Value::Text(format!("%{s}")),
                    _ => value.clone(),
                };
                Predicate::Compare {
                    alias: alias.to_string(),
                    field: field.clone(),
                    op: *op,
                    param: self.next_parameter(bound),
                }
            }
            Expression::In {
                field,
                values,
                negated,
            } => Predicate::In {
                alias: alias.to_string(),
                field: field.clone(),
                params: values.iter().map(|v| self.next_parameter(v.clone())).collect(),
                negated: *negated,
            },
            Expression::IsNull { field } => Predicate::IsNull {
                alias: alias.to_string(),
                field: field.clone(),
            },
            Expression::And(parts) => {
                Predicate::All(parts.iter().map(|p| self.bind_expression(alias, p)).collect())
            }
            Expression::Or(parts) => {
                Predicate::Any(parts.iter().map(|p| self.bind_expression(alias, p)).collect())
            }
        }
    }

    /// Human-readable form of the query, logged before execution.
    pub fn to_dql(&self) -> String {
        let mut out = format!(
            "SELECT {alias} FROM {class} {alias}",
            alias = self.root_alias,
            class = self.root_class
        );
        for join in &self.joins {
            let _ = write!(out, " INNER JOIN {}.{} {}", join.parent_alias, join.field, join.alias);
        }
        if !self.predicates.is_empty() {
            let rendered: Vec<String> = self.predicates.iter().map(render_predicate).collect();
            let _ = write!(out, " WHERE {}", rendered.join(" AND "));
        }
        for (i, (alias, field, order)) in self.orderings.iter().enumerate() {
            let lead = if i == 0 { " ORDER BY " } else { ", " };
            let dir = match order {
                Order::Asc => "ASC",
                Order::Desc => "DESC",
            };
            let _ = write!(out, "{lead}{alias}.{field} {dir}");
        }
        out
    }

    fn class_of(&self, alias: &str) -> Option<&str> {
        if alias == self.root_alias {
            return Some(&self.root_class);
        }
        self.joins
            .iter()
            .find(|j| j.alias == alias)
            .map(|j| j.class.as_str())
    }

    fn meta_of(
        &self,
        alias: &str,
        registry: &MetadataRegistry,
    ) -> Result<std::sync::Arc<EntityMeta>, HarnessError> {
        let class = self.class_of(alias).ok_or_else(|| {
            HarnessError::invalid_filter(&self.root_class, format!("unknown alias {alias}"))
        })?;
        registry.get(class)
    }

    fn column_expr(
        &self,
        alias: &str,
        field: &str,
        registry: &MetadataRegistry,
    ) -> Result<Expr, HarnessError> {
        let meta = self.meta_of(alias, registry)?;
        let column = meta.column_for(field).ok_or_else(|| {
            HarnessError::invalid_filter(
                &meta.name,
                format!("\"{field}\" is not a column-backed field"),
            )
        })?;
        Ok(Expr::col((Alias::new(alias), Alias::new(column))))
    }

    fn param(&self, index: usize, registry: &MetadataRegistry) -> Result<sea_orm::sea_query::Value, HarnessError> {
        let value = self.parameters.get(index).ok_or_else(|| {
            HarnessError::invalid_filter(&self.root_class, format!("parameter ?{index} is unbound"))
        })?;
        to_untyped_sea_value(&flat_value(value, registry)?)
    }

    fn compile_predicate(
        &self,
        predicate: &Predicate,
        registry: &MetadataRegistry,
    ) -> Result<Condition, HarnessError> {
        Ok(match predicate {
            Predicate::Compare {
                alias,
                field,
                op,
                param,
            } => {
                let col = self.column_expr(alias, field, registry)?;
                let value = self.param(*param, registry)?;
                let expr: SimpleExpr = match op {
                    CompareOp::Eq => col.eq(value),
                    CompareOp::Neq => col.ne(value),
                    CompareOp::Lt => col.lt(value),
                    CompareOp::Lte => col.lte(value),
                    CompareOp::Gt => col.gt(value),
                    CompareOp::Gte => col.gte(value),
                    CompareOp::Contains | CompareOp::StartsWith | CompareOp::EndsWith => {
                        let pattern = match value {
                            sea_orm::sea_query::Value::String(Some(s)) => s.to_string(),
                            other => {
                                return Err(HarnessError::invalid_filter(
                                    &self.root_class,
                                    format!("{field} can only be matched against text, got {other:?}"),
                                ))
                            }
                        };
                        col.like(pattern)
                    }
                };
                Cond::all().add(expr)
            }
            Predicate::In {
                alias,
                field,
                params,
                negated,
            } => {
                let col = self.column_expr(alias, field, registry)?;
                let values = params
                    .iter()
                    .map(|p| self.param(*p, registry))
                    .collect::<Result<Vec<_>, _>>()?;
                Cond::all().add(if *negated {
                    col.is_not_in(values)
                } else {
                    col.is_in(values)
                })
            }
            Predicate::IsNull { alias, field } => {
                Cond::all().add(self.column_expr(alias, field, registry)?.is_null())
            }
            Predicate::All(parts) => parts.iter().try_fold(Cond::all(), |cond, p| {
                Ok::<_, HarnessError>(cond.add(self.compile_predicate(p, registry)?))
            })?,
            Predicate::Any(parts) => parts.iter().try_fold(Cond::any(), |cond, p| {
                Ok::<_, HarnessError>(cond.add(self.compile_predicate(p, registry)?))
            })?,
        })
    }

    /// Compiles into an executable `SELECT`.
    pub fn compile(
        &self,
        registry: &MetadataRegistry,
        selection: &Selection,
    ) -> Result<SelectStatement, HarnessError> {
        let root = registry.get(&self.root_class)?;
        let mut stmt = Query::select();
        stmt.from_as(Alias::new(&root.table), Alias::new(&self.root_alias));

        match selection {
            Selection::Entities => {
                stmt.column((Alias::new(&self.root_alias), Asterisk));
            }
            Selection::Count => {
                stmt.expr_as(Expr::cust("COUNT(*)"), Alias::new("cnt"));
            }
            Selection::Field(field) => {
                let column = root.column_for(field).ok_or_else(|| {
                    HarnessError::invalid_filter(&root.name, format!("\"{field}\" is not a column-backed field"))
                })?;
                stmt.column((Alias::new(&self.root_alias), Alias::new(column)));
            }
        }

        for join in &self.joins {
            let parent = self.meta_of(&join.parent_alias, registry)?;
            let target = registry.get(&join.class)?;
            let field = parent.require_field(&join.field)?;
            let (target_col, parent_col) = match &field.kind {
                FieldKind::ToOne { join_column, .. } => {
                    (registry.id_column(&target.name)?, join_column.clone())
                }
                FieldKind::ToMany {
                    mapped_by: Some(mapped_by),
                    ..
                } => {
                    let back = target.column_for(mapped_by).ok_or_else(|| {
                        HarnessError::unknown_field(&target.name, mapped_by)
                    })?;
                    (back, registry.id_column(&parent.name)?)
                }
                _ => {
                    return Err(HarnessError::invalid_filter(
                        &parent.name,
                        format!("\"{}\" cannot be joined", join.field),
                    ))
                }
            };
            stmt.join_as(
                JoinType::InnerJoin,
                Alias::new(&target.table),
                Alias::new(&join.alias),
                Expr::col((Alias::new(&join.alias), Alias::new(target_col)))
                    .equals((Alias::new(&join.parent_alias), Alias::new(parent_col))),
            );
        }

        if !self.predicates.is_empty() {
            let cond = self.predicates.iter().try_fold(Cond::all(), |cond, p| {
                Ok::<_, HarnessError>(cond.add(self.compile_predicate(p, registry)?))
            })?;
            stmt.cond_where(cond);
        }

        if *selection != Selection::Count {
            for (alias, field, order) in &self.orderings {
                let meta = self.meta_of(alias, registry)?;
                let column = meta.column_for(field).ok_or_else(|| {
                    HarnessError::invalid_filter(&meta.name, format!("cannot order by \"{field}\""))
                })?;
                let order = match order {
                    Order::Asc => SeaOrder::Asc,
                    Order::Desc => SeaOrder::Desc,
                };
                stmt.order_by((Alias::new(alias), Alias::new(column)), order);
            }
            if *selection == Selection::Entities && self.orderings.is_empty() {
                for column in identifier_columns(&root)? {
                    stmt.order_by((Alias::new(&self.root_alias), Alias::new(column)), SeaOrder::Asc);
                }
            }
        }

        Ok(stmt)
    }
}

fn render_predicate(predicate: &Predicate) -> String {
    match predicate {
        Predicate::Compare {
            alias,
            field,
            op,
            param,
        } => format!("{alias}.{field} {} ?{param}", op.dql()),
        Predicate::In {
            alias,
            field,
            params,
            negated,
        } => {
            let list: Vec<String> = params.iter().map(|p| format!("?{p}")).collect();
            let kw = if *negated { "NOT IN" } else { "IN" };
            format!("{alias}.{field} {kw}({})", list.join(", "))
        }
        Predicate::IsNull { alias, field } => format!("{alias}.{field} IS NULL"),
        Predicate::All(parts) | Predicate::Any(parts) => {
            let sep = if matches!(predicate, Predicate::All(_)) { " AND " } else { " OR " };
            let rendered: Vec<String> = parts.iter().map(|p| format!("({})", render_predicate(p))).collect();
            rendered.join(sep)
        }
    }
}
