//! Fixtures used by the fixture-loading suite.

use std::sync::Arc;

use async_trait::async_trait;
use repo_harness::{EntityRef, Fixture, FixtureContext, FixtureRegistry, HarnessError, PropertyAccessor, Value};

use super::entities::PLAIN;

async fn plain_entity(ctx: &mut FixtureContext<'_>, name: &str) -> Result<EntityRef, HarnessError> {
    let meta = ctx.em.metadata(PLAIN)?;
    let entity = PropertyAccessor::instantiate(&meta, &[])?;
    PropertyAccessor::set_property(&entity, "name", Value::from(name));
    ctx.em.persist(&entity)?;
    ctx.em.flush().await?;
    Ok(entity)
}

/// Persists one `PlainEntity` named `from <name>`.
pub struct NamedFixture(pub &'static str);

#[async_trait]
impl Fixture for NamedFixture {
    fn name(&self) -> &str {
        self.0
    }

    async fn load(&self, ctx: &mut FixtureContext<'_>) -> Result<(), HarnessError> {
        plain_entity(ctx, &format!("from {}", self.0)).await?;
        Ok(())
    }
}

/// Like [`NamedFixture`], also publishing the entity under `reference`.
pub struct SharedFixture {
    pub name: &'static str,
    pub reference: &'static str,
}

#[async_trait]
impl Fixture for SharedFixture {
    fn name(&self) -> &str {
        self.name
    }

    async fn load(&self, ctx: &mut FixtureContext<'_>) -> Result<(), HarnessError> {
        let entity = plain_entity(ctx, &format!("from {}", self.name)).await?;
        ctx.add_reference(self.reference, entity);
        Ok(())
    }
}

/// Copies the name of an entity another fixture published.
pub struct ReferenceConsumer;

#[async_trait]
impl Fixture for ReferenceConsumer {
    fn name(&self) -> &str {
        "ReferenceConsumer"
    }

    async fn load(&self, ctx: &mut FixtureContext<'_>) -> Result<(), HarnessError> {
        let shared = ctx.get_reference("shared-testfixture-1")?;
        let name = match shared.get_or_null("name") {
            Value::Text(name) => name,
            other => other.to_string(),
        };
        plain_entity(ctx, &format!("copy of {name}")).await?;
        Ok(())
    }
}

/// Persists without flushing; the loader writes the row.
pub struct PersistOnlyFixture;

#[async_trait]
impl Fixture for PersistOnlyFixture {
    fn name(&self) -> &str {
        "PersistOnlyFixture"
    }

    async fn load(&self, ctx: &mut FixtureContext<'_>) -> Result<(), HarnessError> {
        let meta = ctx.em.metadata(PLAIN)?;
        let entity = PropertyAccessor::instantiate(&meta, &[("name".to_string(), Value::from("persisted only"))])?;
        ctx.em.persist(&entity)
    }
}

pub struct FailingFixture;

#[async_trait]
impl Fixture for FailingFixture {
    fn name(&self) -> &str {
        "FailingFixture"
    }

    async fn load(&self, ctx: &mut FixtureContext<'_>) -> Result<(), HarnessError> {
        plain_entity(ctx, "from FailingFixture").await?;
        Err(HarnessError::invalid_argument("fixture exploded"))
    }
}

pub fn registry() -> FixtureRegistry {
    FixtureRegistry::new()
        .with("TestFixture1", || Ok(Arc::new(NamedFixture("TestFixture1")) as Arc<dyn Fixture>))
        .with("TestFixture2", || Ok(Arc::new(NamedFixture("TestFixture2")) as Arc<dyn Fixture>))
        .with("SharedTestFixture1", || {
            Ok(Arc::new(SharedFixture {
                name: "SharedTestFixture1",
                reference: "shared-testfixture-1",
            }) as Arc<dyn Fixture>)
        })
        .with("SharedTestFixture2", || {
            Ok(Arc::new(SharedFixture {
                name: "SharedTestFixture2",
                reference: "shared-testfixture-2",
            }) as Arc<dyn Fixture>)
        })
        .with("ReferenceConsumer", || Ok(Arc::new(ReferenceConsumer) as Arc<dyn Fixture>))
        .with("PersistOnlyFixture", || Ok(Arc::new(PersistOnlyFixture) as Arc<dyn Fixture>))
        .with("FailingFixture", || Ok(Arc::new(FailingFixture) as Arc<dyn Fixture>))
}
