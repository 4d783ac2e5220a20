//! The repository test façade.
//!
//! ```ignore
//! let mut h = RepositoryHarness::new(HarnessConfig::default(), source);
//! h.before_suite().await?;
//! h.before_test().await?;
//! let id = h.have_in_repository("User", Data::new().with("name", "davert")).await?;
//! h.see_in_repository("User", Filter::new().eq("name", "davert")).await?;
//! h.after_test().await;
//! ```

pub mod assertion;
pub mod lifecycle;
pub mod populator;
pub mod source;

use tracing::debug;

use crate::config::HarnessConfig;
use crate::data::Data;
use crate::entity::EntityRef;
use crate::error::HarnessError;
use crate::filter::Filter;
use crate::fixtures::{FixtureExecutor, FixtureRef, FixtureRegistry, Loader, Purger, ReferenceRepository};
use crate::orm::{build_association_query, EntityManager, FakeRepository, QueryBuilder, Repository};
use crate::value::{PrimaryKey, Value};

pub use assertion::Assertion;
pub use lifecycle::IsolationState;
pub use populator::{Populator, Target};
pub use source::{SessionCallback, SessionObject, SessionProvider, SessionSource, UrlSessionProvider};

const ROOT_ALIAS: &str = "s";

pub struct RepositoryHarness {
    config: HarnessConfig,
    source: SessionSource,
    fixtures: FixtureRegistry,
    em: Option<EntityManager>,
    state: IsolationState,
}

impl RepositoryHarness {
    pub fn new(config: HarnessConfig, source: SessionSource) -> Self {
        Self {
            config,
            source,
            fixtures: FixtureRegistry::default(),
            em: None,
            state: IsolationState::Idle,
        }
    }

    /// Fixture types `load_fixtures` may name.
    pub fn with_fixtures(mut self, fixtures: FixtureRegistry) -> Self {
        self.fixtures = fixtures;
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn state(&self) -> IsolationState {
        self.state
    }

    /// The held entity manager, obtained from the source when none is held yet.
    pub async fn entity_manager(&mut self) -> Result<&mut EntityManager, HarnessError> {
        if self.em.is_none() {
            self.em = Some(self.source.obtain().await?);
            if self.state == IsolationState::Idle {
                self.state = IsolationState::Connected;
            }
        }
        let em = self
            .em
            .as_mut()
            .ok_or_else(|| HarnessError::config("EntityManager can't be obtained"))?;
        em.session().connect().await?;
        Ok(em)
    }

    pub async fn repository(&mut self, class: &str) -> Result<Repository<'_>, HarnessError> {
        self.entity_manager().await?.repository(class)
    }

    /// Creates the entity and everything nested in `data`, then returns its primary key.
    pub async fn have_in_repository(
        &mut self,
        target: impl Into<Target>,
        data: Data,
    ) -> Result<PrimaryKey, HarnessError> {
        let em = self.entity_manager().await?;
        let mut populator = Populator::new(em);
        let entity = populator.populate(target, data)?;
        let instances = populator.into_instances();

        em.flush().await?;
        for instance in &instances {
            em.refresh(instance).await?;
        }

        let pk = em.identifier(&entity)?;
        debug!("{}", describe_creation(em, &entity, &pk)?);
        Ok(pk)
    }

    pub async fn see_in_repository(&mut self, class: &str, filter: Filter) -> Result<(), HarnessError> {
        self.proceed_see_in_repository(class, &filter).await?.assert()
    }

    pub async fn dont_see_in_repository(&mut self, class: &str, filter: Filter) -> Result<(), HarnessError> {
        self.proceed_see_in_repository(class, &filter).await?.assert_not()
    }

    async fn proceed_see_in_repository(&mut self, class: &str, filter: &Filter) -> Result<Assertion, HarnessError> {
        let em = self.entity_manager().await?;
        em.flush().await?;
        let qb = association_query(em, class, filter)?;
        let count = em.select_count(&qb).await?;
        Ok(Assertion::presence(class, filter, count > 0))
    }

    /// Value of `field` on the single entity matching `filter`.
    pub async fn grab_from_repository(
        &mut self,
        class: &str,
        field: &str,
        filter: Filter,
    ) -> Result<Value, HarnessError> {
        let em = self.entity_manager().await?;
        em.flush().await?;
        let qb = association_query(em, class, &filter)?;
        let mut values = em.select_field(&qb, field).await?;
        match values.len() {
            1 => Ok(values.remove(0)),
            found => Err(HarnessError::NonUniqueOrMissingResult {
                class: class.to_string(),
                found,
            }),
        }
    }

    pub async fn grab_entities_from_repository(
        &mut self,
        class: &str,
        filter: Filter,
    ) -> Result<Vec<EntityRef>, HarnessError> {
        let em = self.entity_manager().await?;
        em.flush().await?;
        let qb = association_query(em, class, &filter)?;
        em.select_entities(&qb).await
    }

    pub async fn grab_entity_from_repository(
        &mut self,
        class: &str,
        filter: Filter,
    ) -> Result<EntityRef, HarnessError> {
        let mut entities = self.grab_entities_from_repository(class, filter).await?;
        match entities.len() {
            1 => Ok(entities.remove(0)),
            found => Err(HarnessError::NonUniqueOrMissingResult {
                class: class.to_string(),
                found,
            }),
        }
    }

    /// Resolves and runs fixtures in the given order; purges first unless `append`.
    pub async fn load_fixtures<I, R>(&mut self, fixtures: I, append: bool) -> Result<ReferenceRepository, HarnessError>
    where
        I: IntoIterator<Item = R>,
        R: Into<FixtureRef>,
    {
        let purge_mode = self.config.purge_mode;
        let registry = self.fixtures.clone();
        let em = self.entity_manager().await?;
        let loader = Loader::resolve(fixtures.into_iter().map(Into::into), &registry, &em.registry())?;
        let executor = FixtureExecutor::new(Purger::new(purge_mode));
        executor
            .execute(em, loader.fixtures(), append)
            .await
            .map_err(|e| HarnessError::FixtureLoadFailure {
                detail: format!("Fixtures could not be loaded, got {e}"),
            })
    }

    pub async fn refresh_entities(&mut self, entities: &[EntityRef]) -> Result<(), HarnessError> {
        let em = self.entity_manager().await?;
        for entity in entities {
            em.refresh(entity).await?;
        }
        Ok(())
    }

    pub async fn clear_entity_manager(&mut self) -> Result<(), HarnessError> {
        self.entity_manager().await?.clear();
        Ok(())
    }

    pub async fn flush_to_database(&mut self) -> Result<(), HarnessError> {
        self.entity_manager().await?.flush().await
    }

    /// Installs `fake` as the repository for `class`. Loaded entities are detached first.
    pub async fn have_fake_repository(&mut self, class: &str, fake: FakeRepository) -> Result<(), HarnessError> {
        let em = self.entity_manager().await?;
        em.clear();
        em.install_fake_repository(class, fake)
    }
}

fn association_query(em: &EntityManager, class: &str, filter: &Filter) -> Result<QueryBuilder, HarnessError> {
    let mut qb = QueryBuilder::new(class, ROOT_ALIAS);
    build_association_query(&mut qb, &em.registry(), class, ROOT_ALIAS, filter)?;
    debug!(dql = %qb.to_dql(), "association query built");
    Ok(qb)
}

fn describe_creation(em: &EntityManager, entity: &EntityRef, pk: &PrimaryKey) -> Result<String, HarnessError> {
    let (label, parts) = match pk {
        PrimaryKey::Single(v) => ("primary key", std::slice::from_ref(v)),
        PrimaryKey::Composite(vs) => ("composite primary key of", vs.as_slice()),
    };
    let rendered = parts
        .iter()
        .map(|part| match part {
            Value::Entity(related) => Ok(format!("{}: {}", related.class(), render_key(&em.identifier(related)?))),
            other => Ok(other.to_string()),
        })
        .collect::<Result<Vec<_>, HarnessError>>()?;
    Ok(format!("{} entity created with {label} {}", entity.class(), rendered.join(", ")))
}

fn render_key(pk: &PrimaryKey) -> String {
    match pk {
        PrimaryKey::Single(v) => v.to_string(),
        PrimaryKey::Composite(vs) => {
            let items: Vec<String> = vs.iter().enumerate().map(|(i, v)| format!("{i} => {v}")).collect();
            format!("array ({})", items.join(", "))
        }
    }
}
