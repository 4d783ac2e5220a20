//! Per-test transactional isolation.
//!
//! With cleanup enabled each test runs inside a transaction that the
//! after-test hook rolls back. Rollback failures at these boundaries are
//! logged and never returned.

use tracing::{debug, info};

use crate::config::HarnessConfig;
use crate::db::Session;
use crate::error::HarnessError;
use crate::harness::RepositoryHarness;
use crate::orm::EntityManager;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IsolationState {
    /// No session obtained yet.
    #[default]
    Idle,
    Connected,
    InTransaction,
}

impl RepositoryHarness {
    /// Obtains a fresh session from the configured source.
    pub async fn before_suite(&mut self) -> Result<(), HarnessError> {
        let mut em = self.source.obtain().await?;
        em.session().connect().await?;
        self.em = Some(em);
        self.state = IsolationState::Connected;
        info!(cleanup = self.config.cleanup, purge_mode = %self.config.purge_mode, "repository harness connected");
        Ok(())
    }

    /// Discards leftovers of an earlier test and opens the test transaction.
    pub async fn before_test(&mut self) -> Result<(), HarnessError> {
        let cleanup = self.config.cleanup;
        let em = self.entity_manager().await?;
        if cleanup {
            rollback_all(em.session()).await;
            em.session().begin_transaction().await?;
            debug!("Transaction started");
        }
        self.state = if cleanup {
            IsolationState::InTransaction
        } else {
            IsolationState::Connected
        };
        Ok(())
    }

    /// Reverts the test's changes, forgets loaded entities and closes the session.
    pub async fn after_test(&mut self) {
        let cleanup = self.config.cleanup;
        let Some(em) = self.em.as_mut() else {
            return;
        };
        if cleanup {
            rollback_all(em.session()).await;
        }
        clean(em);
        em.session().close().await;
        self.state = IsolationState::Connected;
    }

    /// Swaps the configuration between tests, re-running the test hooks around it.
    pub async fn reconfigure(&mut self, config: HarnessConfig) -> Result<(), HarnessError> {
        if self.em.is_none() {
            self.config = config;
            return Ok(());
        }
        self.after_test().await;
        self.config = config;
        self.before_test().await
    }
}

fn clean(em: &mut EntityManager) {
    em.reset_repositories();
    em.clear();
}

async fn rollback_all(session: &mut Session) {
    if !session.is_transaction_active() {
        return;
    }
    while session.transaction_nesting_level() > 0 {
        if let Err(e) = session.rollback().await {
            debug!(error = %e, "rollback failed, continuing");
        }
    }
    debug!("Transaction cancelled; all changes reverted.");
}
