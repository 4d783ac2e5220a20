//! Persistence context: identity map, pending inserts, flush, refresh and
//! the query entry points used by repositories and the harness.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use sea_orm::sea_query::{Alias, Expr, Order as SeaOrder, Query, SimpleExpr};
use sea_orm::{DatabaseBackend, DatabaseConnection};
use tracing::debug;

use crate::accessor::PropertyAccessor;
use crate::db::{connect, Session};
use crate::entity::EntityRef;
use crate::error::HarnessError;
use crate::metadata::{ColumnType, EntityMeta, FieldKind, MetadataRegistry};
use crate::orm::persister::{
    self, identifier_columns, identifier_condition, identity_key, read_column, read_row,
    select_all, to_sea_value, ColumnSource, RowState,
};
use crate::orm::query::{QueryBuilder, Selection};
use crate::orm::repository::{FakeRepository, Repository};
use crate::orm::unit_of_work::{EntryState, UnitOfWork};
use crate::value::{PrimaryKey, Value};

pub struct EntityManager {
    session: Session,
    registry: Arc<MetadataRegistry>,
    uow: UnitOfWork,
    fake_repositories: HashMap<String, FakeRepository>,
}

impl fmt::Debug for EntityManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityManager")
            .field("backend", &self.session.backend())
            .field("managed", &self.uow.len())
            .field("fake_repositories", &self.fake_repositories.len())
            .finish()
    }
}

impl EntityManager {
    pub fn new(conn: DatabaseConnection, registry: impl Into<Arc<MetadataRegistry>>) -> Self {
        Self {
            session: Session::new(conn),
            registry: registry.into(),
            uow: UnitOfWork::default(),
            fake_repositories: HashMap::new(),
        }
    }

    /// Connects to `url` and wraps the connection.
    pub async fn connect(
        url: &str,
        registry: impl Into<Arc<MetadataRegistry>>,
    ) -> Result<Self, HarnessError> {
        Ok(Self::new(connect(url).await?, registry))
    }

    pub fn registry(&self) -> Arc<MetadataRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn metadata(&self, class: &str) -> Result<Arc<EntityMeta>, HarnessError> {
        self.registry.get(class)
    }

    pub fn session(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn backend(&self) -> DatabaseBackend {
        self.session.backend()
    }

    /// Schedules `entity` for insertion on the next flush.
    pub fn persist(&mut self, entity: &EntityRef) -> Result<(), HarnessError> {
        let class = entity.class();
        self.registry.get(&class)?;
        if self.uow.schedule_insert(entity) {
            debug!(%class, "entity scheduled for insertion");
        }
        Ok(())
    }

    pub fn contains(&self, entity: &EntityRef) -> bool {
        self.uow.contains(entity)
    }

    pub fn detach(&mut self, entity: &EntityRef) {
        self.uow.detach(entity);
    }

    /// Detaches every entity; later lookups load fresh objects.
    ///
    /// Detached entities lose their to-many collections and one-to-one
    /// back-links, so bidirectional graphs hold no reference cycles.
    /// Owning to-one fields keep their targets.
    pub fn clear(&mut self) {
        for entity in self.uow.entities() {
            self.unlink_inverse_sides(&entity);
        }
        self.uow.clear();
        debug!("Entity manager cleared");
    }

    fn unlink_inverse_sides(&self, entity: &EntityRef) {
        let Ok(meta) = self.registry.get(&entity.class()) else {
            return;
        };
        for field in &meta.fields {
            match &field.kind {
                FieldKind::ToMany { .. } => entity.set(field.name.clone(), Value::Collection(Vec::new())),
                FieldKind::ToOne { .. } if self.is_one_to_one_back_link(&meta.name, &field.name) => {
                    entity.set(field.name.clone(), Value::Null)
                }
                _ => {}
            }
        }
    }

    /// Whether some to-one association targeting `class` names `field` as its inverse.
    fn is_one_to_one_back_link(&self, class: &str, field: &str) -> bool {
        self.registry.all().any(|owner| {
            owner.fields.iter().any(|f| {
                matches!(
                    &f.kind,
                    FieldKind::ToOne { target, inversed_by: Some(back), .. } if target == class && back == field
                )
            })
        })
    }

    /// Identifier of `entity`; to-one parts are returned as the related entity.
    pub fn identifier(&self, entity: &EntityRef) -> Result<PrimaryKey, HarnessError> {
        let meta = self.registry.get(&entity.class())?;
        let values: Vec<Value> = meta.identifier.iter().map(|id| entity.get_or_null(id)).collect();
        Ok(match <[Value; 1]>::try_from(values) {
            Ok([single]) => PrimaryKey::Single(single),
            Err(values) => PrimaryKey::Composite(values),
        })
    }

    /// Inserts scheduled entities, then writes changes to managed ones.
    pub async fn flush(&mut self) -> Result<(), HarnessError> {
        self.cascade_persist()?;
        let mut pending = self.uow.take_scheduled();
        let inserted = self.insert_pending(&mut pending).await;
        if inserted.is_err() {
            self.uow.reschedule(pending);
        }
        inserted?;
        self.update_dirty().await
    }

    fn cascade_persist(&mut self) -> Result<(), HarnessError> {
        let mut i = 0;
        while let Some(entity) = self.uow.scheduled().get(i).cloned() {
            i += 1;
            let meta = self.registry.get(&entity.class())?;
            for field in meta.to_one_fields() {
                let FieldKind::ToOne {
                    cascade_persist: true,
                    ..
                } = field.kind
                else {
                    continue;
                };
                if let Some(related) = entity.related(&field.name) {
                    if !self.uow.contains(&related) {
                        self.persist(&related)?;
                    }
                }
            }
        }
        Ok(())
    }

    async fn insert_pending(&mut self, pending: &mut Vec<EntityRef>) -> Result<(), HarnessError> {
        while !pending.is_empty() {
            let mut ready = None;
            for (idx, entity) in pending.iter().enumerate() {
                if self.dependencies_inserted(entity, pending)? {
                    ready = Some(idx);
                    break;
                }
            }
            let Some(idx) = ready else {
                let classes: Vec<String> = pending.iter().map(EntityRef::class).collect();
                return Err(HarnessError::flush(format!(
                    "circular dependency between new entities: {}",
                    classes.join(", ")
                )));
            };
            let entity = pending.remove(idx);
            if let Err(e) = self.insert(&entity).await {
                pending.insert(0, entity);
                return Err(e);
            }
        }
        Ok(())
    }

    fn dependencies_inserted(
        &self,
        entity: &EntityRef,
        pending: &[EntityRef],
    ) -> Result<bool, HarnessError> {
        let meta = self.registry.get(&entity.class())?;
        for field in meta.to_one_fields() {
            let Some(related) = entity.related(&field.name) else {
                continue;
            };
            if related.ptr_eq(entity) {
                continue;
            }
            match self.uow.state(&related) {
                Some(EntryState::Managed) => {}
                Some(EntryState::New) if pending.iter().any(|p| p.ptr_eq(&related)) => {
                    return Ok(false)
                }
                _ => {
                    return Err(HarnessError::flush(format!(
                        "A new entity was found through the relationship '{}#{}' that was not configured to cascade persist operations for entity: {related:?}",
                        meta.name, field.name
                    )))
                }
            }
        }
        Ok(true)
    }

    async fn insert(&mut self, entity: &EntityRef) -> Result<(), HarnessError> {
        let meta = self.registry.get(&entity.class())?;
        let specs = persister::columns(&meta, &self.registry)?;
        let mut row = persister::row_values(entity, &specs, &self.registry)?;

        let generated = if meta.is_auto_increment() {
            identifier_columns(&meta)?
                .into_iter()
                .next()
                .filter(|col| row.get(col).map_or(true, Value::is_null))
        } else {
            None
        };
        if generated.is_none() {
            if let Some(missing) = meta.identifier.iter().find(|id| entity.get_or_null(id).is_null()) {
                return Err(HarnessError::flush(format!(
                    "Entity of type {} is missing an assigned ID for field '{missing}'",
                    meta.name
                )));
            }
        }

        let mut stmt = Query::insert();
        stmt.into_table(Alias::new(&meta.table));
        let mut columns = Vec::new();
        let mut values: Vec<SimpleExpr> = Vec::new();
        for spec in &specs {
            if generated.as_deref() == Some(spec.column.as_str()) {
                continue;
            }
            let value = row.get(&spec.column).cloned().unwrap_or_default();
            columns.push(Alias::new(&spec.column));
            values.push(to_sea_value(&value, spec.column_type)?.into());
        }
        if columns.is_empty() {
            stmt.or_default_values();
        } else {
            stmt.columns(columns);
            stmt.values(values)?;
        }

        if let Some(column) = generated {
            let id = if self.backend() == DatabaseBackend::Postgres {
                stmt.returning_col(Alias::new(&column));
                let sql = self.session.build(&stmt);
                let inserted = self
                    .session
                    .query_one(sql)
                    .await?
                    .ok_or_else(|| HarnessError::flush(format!("insert into {} returned no row", meta.table)))?;
                read_column(&inserted, &column, ColumnType::Integer)?
            } else {
                let sql = self.session.build(&stmt);
                let result = self.session.execute(sql).await?;
                Value::Int(result.last_insert_id() as i64)
            };
            entity.set(meta.identifier[0].clone(), id.clone());
            row.insert(column, id);
        } else {
            let sql = self.session.build(&stmt);
            self.session.execute(sql).await?;
        }

        let ids = persister::identifier_values(entity, &meta, &self.registry)?;
        self.uow.register_managed(entity, identity_key(&ids), row);
        debug!(class = %meta.name, table = %meta.table, "entity inserted");
        Ok(())
    }

    async fn update_dirty(&mut self) -> Result<(), HarnessError> {
        for entity in self.uow.managed() {
            let meta = self.registry.get(&entity.class())?;
            let specs = persister::columns(&meta, &self.registry)?;
            let row = persister::row_values(&entity, &specs, &self.registry)?;
            let Some(snapshot) = self.uow.snapshot(&entity).cloned() else {
                continue;
            };
            let changed: Vec<_> = specs
                .iter()
                .filter(|s| snapshot.get(&s.column) != row.get(&s.column))
                .collect();
            if changed.is_empty() {
                continue;
            }

            let mut stmt = Query::update();
            stmt.table(Alias::new(&meta.table));
            for spec in &changed {
                let value = row.get(&spec.column).cloned().unwrap_or_default();
                stmt.value(Alias::new(&spec.column), to_sea_value(&value, spec.column_type)?);
            }
            let ids: Vec<Value> = identifier_columns(&meta)?
                .iter()
                .map(|c| snapshot.get(c).cloned().unwrap_or_default())
                .collect();
            for cond in identifier_condition(&meta, &specs, &ids)? {
                stmt.and_where(cond);
            }
            let sql = self.session.build(&stmt);
            self.session.execute(sql).await?;
            self.uow.set_snapshot(&entity, row);
            debug!(class = %meta.name, columns = changed.len(), "entity updated");
        }
        Ok(())
    }

    /// Entity with identifier `id`, from the identity map when already loaded.
    pub async fn find(&mut self, class: &str, id: PrimaryKey) -> Result<Option<EntityRef>, HarnessError> {
        let meta = self.registry.get(class)?;
        let values = id
            .values()
            .iter()
            .map(|v| persister::flat_value(v, &self.registry))
            .collect::<Result<Vec<_>, _>>()?;
        let Some(key) = identity_key(&values) else {
            return Ok(None);
        };
        if let Some(existing) = self.uow.lookup(class, &key) {
            return Ok(Some(existing));
        }

        let specs = persister::columns(&meta, &self.registry)?;
        let mut stmt = select_all(&meta, &specs);
        for cond in identifier_condition(&meta, &specs, &values)? {
            stmt.and_where(cond);
        }
        let sql = self.session.build(&stmt);
        let state = match self.session.query_one(sql).await? {
            Some(row) => read_row(&row, &specs)?,
            None => return Ok(None),
        };
        Ok(Some(self.hydrate(meta, state).await?))
    }

    /// Reloads `entity` from its row, replacing every field.
    pub async fn refresh(&mut self, entity: &EntityRef) -> Result<(), HarnessError> {
        if self.uow.state(entity) != Some(EntryState::Managed) {
            return Err(HarnessError::invalid_argument(format!(
                "Entity {entity:?} is not managed"
            )));
        }
        let meta = self.registry.get(&entity.class())?;
        let specs = persister::columns(&meta, &self.registry)?;
        let ids = persister::identifier_values(entity, &meta, &self.registry)?;
        let mut stmt = select_all(&meta, &specs);
        for cond in identifier_condition(&meta, &specs, &ids)? {
            stmt.and_where(cond);
        }
        let sql = self.session.build(&stmt);
        let state = match self.session.query_one(sql).await? {
            Some(row) => read_row(&row, &specs)?,
            None => {
                return Err(HarnessError::NonUniqueOrMissingResult {
                    class: meta.name.clone(),
                    found: 0,
                })
            }
        };
        self.load_state(entity, &meta, &state).await?;
        debug!(class = %meta.name, "entity refreshed");
        Ok(())
    }

    /// Turns a row into an entity, reusing the managed instance when present.
    fn hydrate(&mut self, meta: Arc<EntityMeta>, state: RowState) -> BoxFuture<'_, Result<EntityRef, HarnessError>> {
        Box::pin(async move {
            let ids: Vec<Value> = identifier_columns(&meta)?
                .iter()
                .map(|c| state.get(c).cloned().unwrap_or_default())
                .collect();
            let key = identity_key(&ids);
            if let Some(existing) = key.as_deref().and_then(|k| self.uow.lookup(&meta.name, k)) {
                return Ok(existing);
            }
            let entity = PropertyAccessor::instantiate_without_constructor(&meta);
            self.uow.register_managed(&entity, key, state.clone());
            self.load_state(&entity, &meta, &state).await?;
            Ok(entity)
        })
    }

    async fn load_state(
        &mut self,
        entity: &EntityRef,
        meta: &EntityMeta,
        state: &RowState,
    ) -> Result<(), HarnessError> {
        let specs = persister::columns(meta, &self.registry)?;
        for spec in &specs {
            let value = state.get(&spec.column).cloned().unwrap_or_default();
            match &spec.source {
                ColumnSource::Field(field) => entity.set(field.clone(), value),
                ColumnSource::Embedded { field, sub } => entity.update(|fields| {
                    if let Some(Value::Embedded(embedded)) = fields.get_mut(field) {
                        embedded.fields.insert(sub.clone(), value);
                    }
                }),
                ColumnSource::ToOne { field, target } => {
                    let related = if value.is_null() {
                        Value::Null
                    } else {
                        self.find(target, PrimaryKey::Single(value)).await?.into()
                    };
                    entity.set(field.clone(), related);
                }
            }
        }

        for field in &meta.fields {
            if let FieldKind::ToMany {
                target,
                mapped_by: Some(mapped_by),
            } = &field.kind
            {
                let items = self.load_collection(entity, meta, target, mapped_by).await?;
                entity.set(field.name.clone(), Value::Collection(items));
            }
        }

        self.uow.set_snapshot(entity, state.clone());
        Ok(())
    }

    async fn load_collection(
        &mut self,
        owner: &EntityRef,
        owner_meta: &EntityMeta,
        target: &str,
        mapped_by: &str,
    ) -> Result<Vec<EntityRef>, HarnessError> {
        let [owner_id] = owner_meta.identifier.as_slice() else {
            return Ok(Vec::new());
        };
        let owner_value = persister::flat_value(&owner.get_or_null(owner_id), &self.registry)?;
        if owner_value.is_null() {
            return Ok(Vec::new());
        }

        let target_meta = self.registry.get(target)?;
        let specs = persister::columns(&target_meta, &self.registry)?;
        let back = specs
            .iter()
            .find(|s| matches!(&s.source, ColumnSource::ToOne { field, .. } if field == mapped_by))
            .ok_or_else(|| HarnessError::unknown_field(&target_meta.name, mapped_by))?;

        let mut stmt = select_all(&target_meta, &specs);
        stmt.and_where(
            Expr::col((Alias::new(&target_meta.table), Alias::new(&back.column)))
                .eq(to_sea_value(&owner_value, back.column_type)?),
        );
        for column in identifier_columns(&target_meta)? {
            stmt.order_by((Alias::new(&target_meta.table), Alias::new(column)), SeaOrder::Asc);
        }
        let sql = self.session.build(&stmt);
        let states = self
            .session
            .query_all(sql)
            .await?
            .iter()
            .map(|row| read_row(row, &specs))
            .collect::<Result<Vec<_>, _>>()?;

        let mut items = Vec::with_capacity(states.len());
        for state in states {
            items.push(self.hydrate(Arc::clone(&target_meta), state).await?);
        }
        Ok(items)
    }

    /// Distinct root entities matched by `qb`, in query order.
    pub async fn select_entities(&mut self, qb: &QueryBuilder) -> Result<Vec<EntityRef>, HarnessError> {
        debug!(dql = %qb.to_dql(), parameters = ?qb.parameters(), "Executing query");
        let meta = self.registry.get(qb.root_class())?;
        let specs = persister::columns(&meta, &self.registry)?;
        let stmt = qb.compile(&self.registry, &Selection::Entities)?;
        let sql = self.session.build(&stmt);
        let states = self
            .session
            .query_all(sql)
            .await?
            .iter()
            .map(|row| read_row(row, &specs))
            .collect::<Result<Vec<_>, _>>()?;

        let mut out: Vec<EntityRef> = Vec::with_capacity(states.len());
        for state in states {
            let entity = self.hydrate(Arc::clone(&meta), state).await?;
            if !out.iter().any(|e| e.ptr_eq(&entity)) {
                out.push(entity);
            }
        }
        Ok(out)
    }

    pub async fn select_count(&mut self, qb: &QueryBuilder) -> Result<u64, HarnessError> {
        debug!(dql = %qb.to_dql(), parameters = ?qb.parameters(), "Executing count query");
        let stmt = qb.compile(&self.registry, &Selection::Count)?;
        let sql = self.session.build(&stmt);
        let count = match self.session.query_one(sql).await? {
            Some(row) => row.try_get_by::<i64, _>("cnt")?,
            None => 0,
        };
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Values of one root field for every matched row.
    pub async fn select_field(&mut self, qb: &QueryBuilder, field: &str) -> Result<Vec<Value>, HarnessError> {
        debug!(dql = %qb.to_dql(), %field, "Executing field query");
        let meta = self.registry.get(qb.root_class())?;
        let column = meta
            .column_for(field)
            .ok_or_else(|| HarnessError::unknown_field(&meta.name, field))?;
        let column_type = persister::columns(&meta, &self.registry)?
            .into_iter()
            .find(|s| s.column == column)
            .map(|s| s.column_type)
            .unwrap_or(ColumnType::Text);
        let stmt = qb.compile(&self.registry, &Selection::Field(field.to_string()))?;
        let sql = self.session.build(&stmt);
        self.session
            .query_all(sql)
            .await?
            .iter()
            .map(|row| read_column(row, &column, column_type))
            .collect()
    }

    /// Repository for `class`, faked when a stand-in is installed.
    pub fn repository(&mut self, class: &str) -> Result<Repository<'_>, HarnessError> {
        let meta = self.registry.get(class)?;
        let fake = self.fake_repositories.get(class).cloned();
        Ok(Repository::new(self, meta, fake))
    }

    pub fn install_fake_repository(&mut self, class: &str, fake: FakeRepository) -> Result<(), HarnessError> {
        self.registry.get(class)?;
        self.fake_repositories.insert(class.to_string(), fake);
        debug!(%class, "fake repository installed");
        Ok(())
    }

    pub fn has_fake_repository(&self, class: &str) -> bool {
        self.fake_repositories.contains_key(class)
    }

    /// Drops every installed fake repository.
    pub fn reset_repositories(&mut self) {
        if !self.fake_repositories.is_empty() {
            debug!(count = self.fake_repositories.len(), "fake repositories removed");
        }
        self.fake_repositories.clear();
    }
}
