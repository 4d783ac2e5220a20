//! Fixture loading: resolution of fixture references, the shared reference
//! store, purging and execution.

pub mod executor;
pub mod purger;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::entity::EntityRef;
use crate::error::{HarnessError, FIXTURE_CAPABILITY};
use crate::metadata::MetadataRegistry;
use crate::orm::EntityManager;

pub use executor::FixtureExecutor;
pub use purger::Purger;

/// A unit of test data.
#[async_trait]
pub trait Fixture: Send + Sync {
    /// Unique name; fixtures with the same name are loaded once.
    fn name(&self) -> &str;

    async fn load(&self, ctx: &mut FixtureContext<'_>) -> Result<(), HarnessError>;
}

/// Entities shared between fixtures of one load call.
#[derive(Debug, Default)]
pub struct ReferenceRepository {
    references: HashMap<String, EntityRef>,
}

impl ReferenceRepository {
    pub fn add_reference(&mut self, name: impl Into<String>, entity: EntityRef) {
        self.references.insert(name.into(), entity);
    }

    pub fn get_reference(&self, name: &str) -> Result<EntityRef, HarnessError> {
        self.references
            .get(name)
            .cloned()
            .ok_or_else(|| HarnessError::UnknownReference {
                name: name.to_string(),
            })
    }

    pub fn has_reference(&self, name: &str) -> bool {
        self.references.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}

/// What a fixture sees while loading.
pub struct FixtureContext<'a> {
    pub em: &'a mut EntityManager,
    pub references: &'a mut ReferenceRepository,
}

impl FixtureContext<'_> {
    pub fn add_reference(&mut self, name: impl Into<String>, entity: EntityRef) {
        self.references.add_reference(name, entity);
    }

    pub fn get_reference(&self, name: &str) -> Result<EntityRef, HarnessError> {
        self.references.get_reference(name)
    }
}

pub type FixtureFactory = Arc<dyn Fn() -> Result<Arc<dyn Fixture>, String> + Send + Sync>;

/// Fixture types known by name.
#[derive(Clone, Default)]
pub struct FixtureRegistry {
    factories: HashMap<String, FixtureFactory>,
}

impl FixtureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Result<Arc<dyn Fixture>, String> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn with<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn Fixture>, String> + Send + Sync + 'static,
    {
        self.register(name, factory);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    fn instantiate(&self, name: &str) -> Option<Result<Arc<dyn Fixture>, String>> {
        self.factories.get(name).map(|factory| factory())
    }
}

impl fmt::Debug for FixtureRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("FixtureRegistry").field("fixtures", &names).finish()
    }
}

/// Anything a caller may pass as a fixture.
#[derive(Clone)]
pub enum FixtureRef {
    /// Name looked up in the [`FixtureRegistry`].
    Class(String),
    Instance(Arc<dyn Fixture>),
    /// An entity object; never a fixture.
    Object(EntityRef),
    /// Any other value; never a fixture.
    Other(JsonValue),
}

impl From<&str> for FixtureRef {
    fn from(v: &str) -> Self {
        FixtureRef::Class(v.to_string())
    }
}

impl From<String> for FixtureRef {
    fn from(v: String) -> Self {
        FixtureRef::Class(v)
    }
}

impl From<Arc<dyn Fixture>> for FixtureRef {
    fn from(v: Arc<dyn Fixture>) -> Self {
        FixtureRef::Instance(v)
    }
}

impl From<EntityRef> for FixtureRef {
    fn from(v: EntityRef) -> Self {
        FixtureRef::Object(v)
    }
}

impl From<JsonValue> for FixtureRef {
    fn from(v: JsonValue) -> Self {
        match v {
            JsonValue::String(name) => FixtureRef::Class(name),
            other => FixtureRef::Other(other),
        }
    }
}

/// Collects fixtures in order, skipping names already added.
#[derive(Default)]
pub struct Loader {
    fixtures: Vec<Arc<dyn Fixture>>,
}

impl Loader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_fixture(&mut self, fixture: Arc<dyn Fixture>) -> bool {
        if self.fixtures.iter().any(|f| f.name() == fixture.name()) {
            return false;
        }
        self.fixtures.push(fixture);
        true
    }

    pub fn fixtures(&self) -> &[Arc<dyn Fixture>] {
        &self.fixtures
    }

    pub fn into_fixtures(self) -> Vec<Arc<dyn Fixture>> {
        self.fixtures
    }

    /// Resolves every reference, failing on the first unusable one.
    pub fn resolve(
        refs: impl IntoIterator<Item = FixtureRef>,
        fixtures: &FixtureRegistry,
        entities: &MetadataRegistry,
    ) -> Result<Self, HarnessError> {
        let mut loader = Loader::new();
        for fixture_ref in refs {
            let instance = match fixture_ref {
                FixtureRef::Class(name) => match fixtures.instantiate(&name) {
                    Some(Ok(instance)) => instance,
                    Some(Err(cause)) => {
                        return Err(HarnessError::FixtureLoadFailure {
                            detail: format!("Fixture class \"{name}\" could not be loaded, got {cause}"),
                        })
                    }
                    None if entities.contains(&name) => {
                        return Err(HarnessError::UnsuitableFixtureType {
                            detail: format!(
                                "Fixture class \"{name}\" does not inherit from \"{FIXTURE_CAPABILITY}\""
                            ),
                        })
                    }
                    None => return Err(HarnessError::UnknownFixtureClass { name }),
                },
                FixtureRef::Instance(instance) => instance,
                FixtureRef::Object(entity) => {
                    return Err(HarnessError::UnsuitableFixtureType {
                        detail: format!(
                            "Fixture \"{}\" does not inherit from \"{FIXTURE_CAPABILITY}\"",
                            entity.class()
                        ),
                    })
                }
                FixtureRef::Other(value) => {
                    return Err(HarnessError::UnsuitableFixtureType {
                        detail: format!(
                            "Fixture is expected to be an instance or class name, inherited from \"{FIXTURE_CAPABILITY}\"; got \"{}\" instead",
                            json_type_name(&value)
                        ),
                    })
                }
            };
            loader.add_fixture(instance);
        }
        Ok(loader)
    }
}

fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "NULL",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(n) if n.is_i64() || n.is_u64() => "integer",
        JsonValue::Number(_) => "double",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
