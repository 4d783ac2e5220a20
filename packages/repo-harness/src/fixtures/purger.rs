use sea_orm::sea_query::{Alias, Query, Table};
use sea_orm::DatabaseBackend;
use tracing::{debug, warn};

use crate::config::PurgeMode;
use crate::error::HarnessError;
use crate::metadata::MetadataRegistry;
use crate::orm::EntityManager;

/// Empties every mapped table before a non-appending fixture load.
pub struct Purger {
    mode: PurgeMode,
}

impl Purger {
    pub fn new(mode: PurgeMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> PurgeMode {
        self.mode
    }

    pub async fn purge(&self, em: &mut EntityManager) -> Result<(), HarnessError> {
        let registry = em.registry();
        let backend = em.backend();
        let mode = if self.mode == PurgeMode::Truncate && backend == DatabaseBackend::Sqlite {
            warn!("SQLite has no TRUNCATE; purging with DELETE instead");
            PurgeMode::Delete
        } else {
            self.mode
        };

        for table in purge_order(&registry) {
            let sql = match mode {
                PurgeMode::Delete => {
                    let stmt = Query::delete().from_table(Alias::new(&table)).to_owned();
                    em.session().build(&stmt)
                }
                PurgeMode::Truncate => {
                    let stmt = Table::truncate()
                        .table(Alias::new(&table))
                        .to_owned();
                    em.session().build(&stmt)
                }
            };
            em.session().execute(sql).await?;
            debug!(%table, %mode, "table purged");
        }
        Ok(())
    }
}

/// Tables ordered so that rows referencing another table go first.
pub(crate) fn purge_order(registry: &MetadataRegistry) -> Vec<String> {
    let metas: Vec<_> = registry.all().cloned().collect();
    let mut ordered: Vec<String> = Vec::with_capacity(metas.len());
    let mut remaining = metas;
    // Dependencies first, then reversed below.
    while !remaining.is_empty() {
        let before = remaining.len();
        remaining.retain(|meta| {
            let ready = meta.to_one_fields().all(|f| match f.target() {
                Some(target) if target != meta.name => ordered.contains(&target.to_string()),
                _ => true,
            });
            if ready {
                ordered.push(meta.name.clone());
            }
            !ready
        });
        if remaining.len() == before {
            ordered.extend(remaining.drain(..).map(|m| m.name.clone()));
        }
    }
    ordered
        .iter()
        .rev()
        .filter_map(|name| registry.get(name).ok().map(|m| m.table.clone()))
        .collect()
}
