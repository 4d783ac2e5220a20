//! Where the harness gets its entity manager from.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::info;

use crate::config::{HarnessConfig, DEFAULT_DATABASE_URL};
use crate::db::sanitize_db_url;
use crate::error::HarnessError;
use crate::metadata::MetadataRegistry;
use crate::orm::EntityManager;

const NO_SOURCE: &str = "No session source configured.\n\
    Provide either a session callback returning an EntityManager\n\
    or a SessionProvider to obtain one";
const NOT_OBTAINED: &str = "EntityManager can't be obtained.\n\
    The configured session source returned nothing";
const NOT_A_SESSION: &str = "Connection object is not an instance of EntityManager.\n\
    Use a session callback or a SessionProvider to specify one";

pub type SessionObject = Box<dyn Any + Send>;

pub type SessionCallback =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Option<SessionObject>, HarnessError>> + Send + Sync>;

/// Injected collaborator that owns the way a session is built.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn entity_manager(&self) -> Result<Option<EntityManager>, HarnessError>;
}

#[derive(Clone, Default)]
pub enum SessionSource {
    #[default]
    None,
    /// Type-erased result; anything but an [`EntityManager`] is rejected.
    Callback(SessionCallback),
    Provider(Arc<dyn SessionProvider>),
}

impl SessionSource {
    pub fn callback<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<SessionObject>, HarnessError>> + Send + 'static,
    {
        SessionSource::Callback(Arc::new(move || f().boxed()))
    }

    pub fn provider(provider: impl SessionProvider + 'static) -> Self {
        SessionSource::Provider(Arc::new(provider))
    }

    pub fn is_configured(&self) -> bool {
        !matches!(self, SessionSource::None)
    }

    pub async fn obtain(&self) -> Result<EntityManager, HarnessError> {
        let object = match self {
            SessionSource::None => return Err(HarnessError::config(NO_SOURCE)),
            SessionSource::Provider(provider) => {
                return provider
                    .entity_manager()
                    .await?
                    .ok_or_else(|| HarnessError::config(NOT_OBTAINED))
            }
            SessionSource::Callback(callback) => callback().await?,
        };
        let object = object.ok_or_else(|| HarnessError::config(NOT_OBTAINED))?;
        object
            .downcast::<EntityManager>()
            .map(|em| *em)
            .map_err(|_| HarnessError::config(NOT_A_SESSION))
    }
}

impl fmt::Debug for SessionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionSource::None => f.write_str("None"),
            SessionSource::Callback(_) => f.write_str("Callback(..)"),
            SessionSource::Provider(_) => f.write_str("Provider(..)"),
        }
    }
}

/// Connects to a database URL with a fixed set of mapped entities.
pub struct UrlSessionProvider {
    url: String,
    registry: Arc<MetadataRegistry>,
}

impl UrlSessionProvider {
    pub fn new(url: impl Into<String>, registry: impl Into<Arc<MetadataRegistry>>) -> Self {
        Self {
            url: url.into(),
            registry: registry.into(),
        }
    }

    /// Uses the configured URL, falling back to an in-memory SQLite database.
    pub fn from_config(config: &HarnessConfig, registry: impl Into<Arc<MetadataRegistry>>) -> Self {
        Self::new(config.database_url(), registry)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SessionProvider for UrlSessionProvider {
    async fn entity_manager(&self) -> Result<Option<EntityManager>, HarnessError> {
        info!(url = %sanitize_db_url(&self.url), "opening harness session");
        EntityManager::connect(&self.url, Arc::clone(&self.registry))
            .await
            .map(Some)
    }
}

impl Default for UrlSessionProvider {
    fn default() -> Self {
        Self::new(DEFAULT_DATABASE_URL, MetadataRegistry::new())
    }
}
