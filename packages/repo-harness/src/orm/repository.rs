//! Per-entity repositories and their stand-ins.
//!
//! A fake repository is a set of method stubs layered over the real one:
//! stubbed methods answer from the stub, everything else still queries
//! the database.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::entity::EntityRef;
use crate::error::HarnessError;
use crate::filter::{Filter, FilterValue};
use crate::metadata::EntityMeta;
use crate::orm::association::build_association_query;
use crate::orm::entity_manager::EntityManager;
use crate::orm::query::QueryBuilder;
use crate::value::{PrimaryKey, Value};

/// Result of a stubbed repository method.
#[derive(Clone, Debug, PartialEq)]
pub enum StubReturn {
    Entities(Vec<EntityRef>),
    Entity(Option<EntityRef>),
    Value(Value),
}

impl StubReturn {
    fn kind(&self) -> &'static str {
        match self {
            StubReturn::Entities(_) => "a list of entities",
            StubReturn::Entity(_) => "a single entity",
            StubReturn::Value(_) => "a value",
        }
    }
}

impl From<Vec<EntityRef>> for StubReturn {
    fn from(v: Vec<EntityRef>) -> Self {
        StubReturn::Entities(v)
    }
}

impl From<EntityRef> for StubReturn {
    fn from(v: EntityRef) -> Self {
        StubReturn::Entity(Some(v))
    }
}

impl From<Option<EntityRef>> for StubReturn {
    fn from(v: Option<EntityRef>) -> Self {
        StubReturn::Entity(v)
    }
}

impl From<Value> for StubReturn {
    fn from(v: Value) -> Self {
        StubReturn::Value(v)
    }
}

pub type StubFn = Arc<dyn Fn(&[Value]) -> StubReturn + Send + Sync>;

#[derive(Clone)]
pub enum MethodStub {
    Returns(StubReturn),
    Calls(StubFn),
}

impl MethodStub {
    fn invoke(&self, args: &[Value]) -> StubReturn {
        match self {
            MethodStub::Returns(r) => r.clone(),
            MethodStub::Calls(f) => f(args),
        }
    }
}

impl fmt::Debug for MethodStub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodStub::Returns(r) => f.debug_tuple("Returns").field(r).finish(),
            MethodStub::Calls(_) => f.write_str("Calls(..)"),
        }
    }
}

/// Method stubs keyed by method name (`find`, `find_by`, or any custom name).
#[derive(Clone, Debug, Default)]
pub struct FakeRepository {
    stubs: HashMap<String, MethodStub>,
}

impl FakeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn returns(mut self, method: impl Into<String>, value: impl Into<StubReturn>) -> Self {
        self.stubs.insert(method.into(), MethodStub::Returns(value.into()));
        self
    }

    pub fn calls<F>(mut self, method: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[Value]) -> StubReturn + Send + Sync + 'static,
    {
        self.stubs.insert(method.into(), MethodStub::Calls(Arc::new(f)));
        self
    }

    pub fn stub(&self, method: &str) -> Option<&MethodStub> {
        self.stubs.get(method)
    }

    pub fn is_empty(&self) -> bool {
        self.stubs.is_empty()
    }
}

impl FromIterator<(String, MethodStub)> for FakeRepository {
    fn from_iter<I: IntoIterator<Item = (String, MethodStub)>>(iter: I) -> Self {
        Self {
            stubs: iter.into_iter().collect(),
        }
    }
}

/// Repository for one entity type, borrowed from the entity manager.
pub struct Repository<'a> {
    em: &'a mut EntityManager,
    meta: Arc<EntityMeta>,
    fake: Option<FakeRepository>,
}

impl<'a> Repository<'a> {
    pub(crate) fn new(em: &'a mut EntityManager, meta: Arc<EntityMeta>, fake: Option<FakeRepository>) -> Self {
        Self { em, meta, fake }
    }

    pub fn class_name(&self) -> &str {
        &self.meta.name
    }

    pub fn is_fake(&self) -> bool {
        self.fake.is_some()
    }

    fn stubbed(&self, method: &str, args: &[Value]) -> Option<StubReturn> {
        self.fake
            .as_ref()
            .and_then(|f| f.stub(method))
            .map(|stub| stub.invoke(args))
    }

    pub async fn find(&mut self, id: PrimaryKey) -> Result<Option<EntityRef>, HarnessError> {
        if let Some(ret) = self.stubbed("find", &id.values()) {
            return expect_entity("find", ret);
        }
        self.em.find(&self.meta.name, id).await
    }

    pub async fn find_all(&mut self) -> Result<Vec<EntityRef>, HarnessError> {
        if let Some(ret) = self.stubbed("find_all", &[]) {
            return expect_entities("find_all", ret);
        }
        self.query(&Filter::new()).await
    }

    /// Stub closures receive the filter's equality values in order.
    pub async fn find_by(&mut self, criteria: &Filter) -> Result<Vec<EntityRef>, HarnessError> {
        if let Some(ret) = self.stubbed("find_by", &stub_args(criteria)) {
            return expect_entities("find_by", ret);
        }
        self.query(criteria).await
    }

    pub async fn find_one_by(&mut self, criteria: &Filter) -> Result<Option<EntityRef>, HarnessError> {
        if let Some(ret) = self.stubbed("find_one_by", &stub_args(criteria)) {
            return expect_entity("find_one_by", ret);
        }
        Ok(self.query(criteria).await?.into_iter().next())
    }

    pub async fn count(&mut self, criteria: &Filter) -> Result<u64, HarnessError> {
        if let Some(ret) = self.stubbed("count", &stub_args(criteria)) {
            return match ret {
                StubReturn::Value(Value::Int(n)) if n >= 0 => Ok(n as u64),
                other => Err(HarnessError::StubMismatch {
                    method: "count".into(),
                    expected: "a non-negative integer",
                    got: other.kind(),
                }),
            };
        }
        let mut qb = QueryBuilder::new(&self.meta.name, "s");
        build_association_query(&mut qb, &self.em.registry(), &self.meta.name, "s", criteria)?;
        self.em.select_count(&qb).await
    }

    /// Invokes a method by name. Custom names exist only as stubs.
    pub async fn call(&mut self, method: &str, args: &[Value]) -> Result<StubReturn, HarnessError> {
        if let Some(ret) = self.stubbed(method, args) {
            return Ok(ret);
        }
        match method {
            "find_all" => Ok(StubReturn::Entities(self.find_all().await?)),
            "find" => {
                let id = match args {
                    [single] => PrimaryKey::Single(single.clone()),
                    many => PrimaryKey::Composite(many.to_vec()),
                };
                Ok(StubReturn::Entity(self.find(id).await?))
            }
            _ => Err(HarnessError::UnknownRepositoryMethod {
                class: self.meta.name.clone(),
                method: method.to_string(),
            }),
        }
    }

    async fn query(&mut self, criteria: &Filter) -> Result<Vec<EntityRef>, HarnessError> {
        let mut qb = QueryBuilder::new(&self.meta.name, "s");
        build_association_query(&mut qb, &self.em.registry(), &self.meta.name, "s", criteria)?;
        self.em.select_entities(&qb).await
    }
}

fn stub_args(criteria: &Filter) -> Vec<Value> {
    criteria
        .iter()
        .filter_map(|(_, v)| match v {
            FilterValue::Equals(value) => Some(value.clone()),
            FilterValue::IsNull => Some(Value::Null),
            _ => None,
        })
        .collect()
}

fn expect_entities(method: &str, ret: StubReturn) -> Result<Vec<EntityRef>, HarnessError> {
    match ret {
        StubReturn::Entities(items) => Ok(items),
        other => Err(HarnessError::StubMismatch {
            method: method.to_string(),
            expected: "a list of entities",
            got: other.kind(),
        }),
    }
}

fn expect_entity(method: &str, ret: StubReturn) -> Result<Option<EntityRef>, HarnessError> {
    match ret {
        StubReturn::Entity(entity) => Ok(entity),
        other => Err(HarnessError::StubMismatch {
            method: method.to_string(),
            expected: "a single entity",
            got: other.kind(),
        }),
    }
}
