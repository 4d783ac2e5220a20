//! Creates and drops tables for mapped entities.
//!
//! Only what tests need: one table per entity, identifier as primary key,
//! every other column nullable. Foreign keys are not declared.

use sea_orm::sea_query::{Alias, ColumnDef, Index, Table, TableCreateStatement};
use sea_orm::DatabaseBackend;
use tracing::debug;

use crate::error::HarnessError;
use crate::metadata::{ColumnType, EntityMeta, MetadataRegistry};
use crate::orm::entity_manager::EntityManager;
use crate::orm::persister::{self, identifier_columns};

pub struct SchemaTool<'a> {
    em: &'a mut EntityManager,
}

impl<'a> SchemaTool<'a> {
    pub fn new(em: &'a mut EntityManager) -> Self {
        Self { em }
    }

    /// Creates tables for every registered entity.
    pub async fn create_all(&mut self) -> Result<(), HarnessError> {
        let classes: Vec<String> = self.em.registry().all().map(|m| m.name.clone()).collect();
        self.create_schema(&classes).await
    }

    pub async fn create_schema<S: AsRef<str>>(&mut self, classes: &[S]) -> Result<(), HarnessError> {
        let registry = self.em.registry();
        let backend = self.em.backend();
        for class in classes {
            let meta = registry.get(class.as_ref())?;
            let stmt = create_table_statement(&meta, &registry, backend)?;
            let sql = self.em.session().build(&stmt);
            self.em.session().execute(sql).await?;
            debug!(class = %meta.name, table = %meta.table, "table created");
        }
        Ok(())
    }

    pub async fn drop_schema<S: AsRef<str>>(&mut self, classes: &[S]) -> Result<(), HarnessError> {
        let registry = self.em.registry();
        for class in classes {
            let meta = registry.get(class.as_ref())?;
            let stmt = Table::drop()
                .table(Alias::new(&meta.table))
                .if_exists()
                .to_owned();
            let sql = self.em.session().build(&stmt);
            self.em.session().execute(sql).await?;
            debug!(class = %meta.name, table = %meta.table, "table dropped");
        }
        Ok(())
    }
}

pub(crate) fn create_table_statement(
    meta: &EntityMeta,
    registry: &MetadataRegistry,
    backend: DatabaseBackend,
) -> Result<TableCreateStatement, HarnessError> {
    let specs = persister::columns(meta, registry)?;
    let ids = identifier_columns(meta)?;
    let auto = meta.is_auto_increment();

    let mut stmt = Table::create();
    stmt.table(Alias::new(&meta.table)).if_not_exists();
    for spec in &specs {
        let is_id = ids.contains(&spec.column);
        let mut def = ColumnDef::new(Alias::new(&spec.column));
        match spec.column_type {
            // SQLite only auto-increments a column declared exactly INTEGER.
            ColumnType::Integer if auto && is_id && backend == DatabaseBackend::Sqlite => def.integer(),
            ColumnType::Integer => def.big_integer(),
            ColumnType::Text | ColumnType::Uuid => def.text(),
            ColumnType::Boolean => def.boolean(),
            ColumnType::Float => def.double(),
        };
        if is_id {
            def.not_null();
            if ids.len() == 1 {
                def.primary_key();
                if auto {
                    def.auto_increment();
                }
            }
        } else {
            def.null();
        }
        stmt.col(&mut def);
    }
    if ids.len() > 1 {
        let mut pk = Index::create();
        for column in &ids {
            pk.col(Alias::new(column));
        }
        stmt.primary_key(&mut pk);
    }
    Ok(stmt.to_owned())
}
