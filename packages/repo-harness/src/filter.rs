//! Query filters for the `see`/`grab` operations.
//!
//! A [`Filter`] is an ordered list of `(key, value)` pairs. For
//! [`FilterValue::Criteria`] and [`FilterValue::Expression`] the key is
//! ignored: the expression carries its own field name. Builders generate a
//! throwaway key for such entries, but a caller-supplied key is just as
//! meaningless, which is easy to trip over when a filter is written by hand.

use std::fmt;

use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::entity::EntityRef;
use crate::error::HarnessError;
use crate::value::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Contains,
    StartsWith,
    EndsWith,
}

impl CompareOp {
    pub(crate) fn dql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Neq => "<>",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Contains | CompareOp::StartsWith | CompareOp::EndsWith => "LIKE",
        }
    }
}

/// A single predicate over named fields.
#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    In {
        field: String,
        values: Vec<Value>,
        negated: bool,
    },
    IsNull {
        field: String,
    },
    And(Vec<Expression>),
    Or(Vec<Expression>),
}

impl Expression {
    fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Expression::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    pub fn neq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Neq, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Lt, value)
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Lte, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Gt, value)
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Gte, value)
    }

    pub fn contains(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::compare(field, CompareOp::Contains, needle.into())
    }

    pub fn starts_with(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::compare(field, CompareOp::StartsWith, prefix.into())
    }

    pub fn ends_with(field: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self::compare(field, CompareOp::EndsWith, suffix.into())
    }

    pub fn is_in<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Expression::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    pub fn not_in<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Expression::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Expression::IsNull {
            field: field.into(),
        }
    }

    pub fn and(parts: impl IntoIterator<Item = Expression>) -> Self {
        Expression::And(parts.into_iter().collect())
    }

    pub fn or(parts: impl IntoIterator<Item = Expression>) -> Self {
        Expression::Or(parts.into_iter().collect())
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Compare { field, op, value } => match op {
                CompareOp::Contains => write!(f, "{field} CONTAINS {value}"),
                CompareOp::StartsWith => write!(f, "{field} STARTS WITH {value}"),
                CompareOp::EndsWith => write!(f, "{field} ENDS WITH {value}"),
                _ => write!(f, "{field} {} {value}", op.dql()),
            },
            Expression::In {
                field,
                values,
                negated,
            } => {
                let list: Vec<String> = values.iter().map(ToString::to_string).collect();
                let kw = if *negated { "NOT IN" } else { "IN" };
                write!(f, "{field} {kw} ({})", list.join(", "))
            }
            Expression::IsNull { field } => write!(f, "{field} IS NULL"),
            Expression::And(parts) | Expression::Or(parts) => {
                let sep = if matches!(self, Expression::And(_)) { " AND " } else { " OR " };
                let rendered: Vec<String> = parts.iter().map(|p| format!("({p})")).collect();
                write!(f, "{}", rendered.join(sep))
            }
        }
    }
}

/// Filtering plus ordering, merged into a query verbatim.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Criteria {
    pub(crate) predicate: Option<Expression>,
    pub(crate) orderings: Vec<(String, Order)>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and_where(mut self, expr: Expression) -> Self {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => Expression::And(vec![existing, expr]),
            None => expr,
        });
        self
    }

    pub fn or_where(mut self, expr: Expression) -> Self {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => Expression::Or(vec![existing, expr]),
            None => expr,
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, order: Order) -> Self {
        self.orderings.push((field.into(), order));
        self
    }

    pub fn predicate(&self) -> Option<&Expression> {
        self.predicate.as_ref()
    }

    pub fn orderings(&self) -> &[(String, Order)] {
        &self.orderings
    }
}

impl fmt::Display for Criteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Criteria(")?;
        if let Some(p) = &self.predicate {
            write!(f, "WHERE {p}")?;
        }
        for (i, (field, order)) in self.orderings.iter().enumerate() {
            let sep = if i == 0 && self.predicate.is_none() { "" } else { " " };
            let dir = if *order == Order::Asc { "ASC" } else { "DESC" };
            let lead = if i == 0 { "ORDER BY " } else { ", " };
            write!(f, "{sep}{lead}{field} {dir}")?;
        }
        write!(f, ")")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FilterValue {
    Equals(Value),
    IsNull,
    Nested(Filter),
    Criteria(Criteria),
    Expression(Expression),
}

impl FilterValue {
    fn to_json(&self) -> JsonValue {
        match self {
            FilterValue::Equals(v) => v.to_json(),
            FilterValue::IsNull => JsonValue::Null,
            FilterValue::Nested(f) => f.to_json(),
            FilterValue::Criteria(c) => JsonValue::String(c.to_string()),
            FilterValue::Expression(e) => JsonValue::String(e.to_string()),
        }
    }

    fn from_json(json: JsonValue) -> Result<Self, String> {
        match json {
            JsonValue::Null => Ok(FilterValue::IsNull),
            JsonValue::Object(_) => Filter::from_json(json).map(FilterValue::Nested),
            JsonValue::Array(_) => Err("lists are not valid filter values".to_string()),
            scalar => Ok(FilterValue::Equals(Value::from_json(&scalar).unwrap_or_default())),
        }
    }
}

macro_rules! filter_value_from {
    ($($ty:ty),* $(,)?) => {
        $(impl From<$ty> for FilterValue {
            fn from(v: $ty) -> Self {
                match Value::from(v) {
                    Value::Null => FilterValue::IsNull,
                    other => FilterValue::Equals(other),
                }
            }
        })*
    };
}

filter_value_from!(bool, i64, i32, u32, f64, String, &str, Uuid, EntityRef, &EntityRef, Value);

impl From<Filter> for FilterValue {
    fn from(v: Filter) -> Self {
        FilterValue::Nested(v)
    }
}

impl From<Criteria> for FilterValue {
    fn from(v: Criteria) -> Self {
        FilterValue::Criteria(v)
    }
}

impl From<Expression> for FilterValue {
    fn from(v: Expression) -> Self {
        FilterValue::Expression(v)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter(Vec<(String, FilterValue)>);

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Objects nest, `null` means IS NULL, scalars mean equality.
    pub fn from_json(json: JsonValue) -> Result<Self, String> {
        match json {
            JsonValue::Object(map) => map
                .into_iter()
                .map(|(k, v)| FilterValue::from_json(v).map(|fv| (k, fv)))
                .collect::<Result<Vec<_>, _>>()
                .map(Filter),
            other => Err(format!("filter must be an object, got {other}")),
        }
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.0.push((field.into(), value.into()));
        self
    }

    pub fn eq(self, field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.with(field, value)
    }

    pub fn is_null(self, field: impl Into<String>) -> Self {
        self.with(field, FilterValue::IsNull)
    }

    pub fn nested(self, association: impl Into<String>, filter: Filter) -> Self {
        self.with(association, FilterValue::Nested(filter))
    }

    pub fn criteria(self, criteria: Criteria) -> Self {
        let key = self.0.len().to_string();
        self.with(key, FilterValue::Criteria(criteria))
    }

    pub fn expr(self, expression: Expression) -> Self {
        let key = self.0.len().to_string();
        self.with(key, FilterValue::Expression(expression))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FilterValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl TryFrom<JsonValue> for Filter {
    type Error = HarnessError;

    fn try_from(json: JsonValue) -> Result<Self, Self::Error> {
        Filter::from_json(json).map_err(HarnessError::invalid_argument)
    }
}
