use std::sync::Arc;

use tracing::debug;

use crate::error::HarnessError;
use crate::fixtures::{Fixture, FixtureContext, Purger, ReferenceRepository};
use crate::orm::EntityManager;

/// Runs fixtures in order inside one transaction, flushing before the commit.
pub struct FixtureExecutor {
    purger: Purger,
}

impl FixtureExecutor {
    pub fn new(purger: Purger) -> Self {
        Self { purger }
    }

    /// Purges first unless `append`; returns the references the fixtures registered.
    pub async fn execute(
        &self,
        em: &mut EntityManager,
        fixtures: &[Arc<dyn Fixture>],
        append: bool,
    ) -> Result<ReferenceRepository, HarnessError> {
        em.session().begin_transaction().await?;
        match self.run(em, fixtures, append).await {
            Ok(references) => {
                em.session().commit().await?;
                Ok(references)
            }
            Err(e) => {
                if let Err(rollback) = em.session().rollback().await {
                    debug!(error = %rollback, "fixture rollback failed");
                }
                em.clear();
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        em: &mut EntityManager,
        fixtures: &[Arc<dyn Fixture>],
        append: bool,
    ) -> Result<ReferenceRepository, HarnessError> {
        if !append {
            debug!(mode = %self.purger.mode(), "purging database");
            self.purger.purge(em).await?;
            em.clear();
        }

        let mut references = ReferenceRepository::default();
        for fixture in fixtures {
            debug!(fixture = fixture.name(), "loading fixture");
            let mut ctx = FixtureContext {
                em: &mut *em,
                references: &mut references,
            };
            fixture.load(&mut ctx).await?;
        }
        em.flush().await?;
        Ok(references)
    }
}
