//! Identity map plus the set of entities awaiting insertion.

use std::collections::HashMap;

use crate::entity::EntityRef;
use crate::orm::persister::RowState;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum EntryState {
    /// Scheduled for insertion on the next flush.
    New,
    /// Has a row; `snapshot` holds the column values last written or read.
    Managed,
}

struct Entry {
    entity: EntityRef,
    state: EntryState,
    key: Option<(String, String)>,
    snapshot: RowState,
}

#[derive(Default)]
pub(crate) struct UnitOfWork {
    entries: HashMap<usize, Entry>,
    identity_map: HashMap<(String, String), EntityRef>,
    scheduled: Vec<EntityRef>,
}

impl UnitOfWork {
    pub fn state(&self, entity: &EntityRef) -> Option<EntryState> {
        self.entries.get(&entity.addr()).map(|e| e.state)
    }

    pub fn contains(&self, entity: &EntityRef) -> bool {
        self.entries.contains_key(&entity.addr())
    }

    /// Returns `false` when the entity was already known.
    pub fn schedule_insert(&mut self, entity: &EntityRef) -> bool {
        if self.contains(entity) {
            return false;
        }
        self.entries.insert(
            entity.addr(),
            Entry {
                entity: entity.clone(),
                state: EntryState::New,
                key: None,
                snapshot: RowState::new(),
            },
        );
        self.scheduled.push(entity.clone());
        true
    }

    pub fn take_scheduled(&mut self) -> Vec<EntityRef> {
        std::mem::take(&mut self.scheduled)
    }

    pub fn reschedule(&mut self, entities: Vec<EntityRef>) {
        self.scheduled.extend(entities);
    }

    pub fn scheduled(&self) -> &[EntityRef] {
        &self.scheduled
    }

    pub fn lookup(&self, class: &str, key: &str) -> Option<EntityRef> {
        self.identity_map
            .get(&(class.to_string(), key.to_string()))
            .cloned()
    }

    /// Records `entity` as persisted under `key`.
    pub fn register_managed(&mut self, entity: &EntityRef, key: Option<String>, snapshot: RowState) {
        let key = key.map(|k| (entity.class(), k));
        if let Some(k) = &key {
            self.identity_map.insert(k.clone(), entity.clone());
        }
        self.entries.insert(
            entity.addr(),
            Entry {
                entity: entity.clone(),
                state: EntryState::Managed,
                key,
                snapshot,
            },
        );
    }

    pub fn snapshot(&self, entity: &EntityRef) -> Option<&RowState> {
        self.entries.get(&entity.addr()).map(|e| &e.snapshot)
    }

    pub fn set_snapshot(&mut self, entity: &EntityRef, snapshot: RowState) {
        if let Some(entry) = self.entries.get_mut(&entity.addr()) {
            entry.snapshot = snapshot;
        }
    }

    pub fn managed(&self) -> Vec<EntityRef> {
        self.entries
            .values()
            .filter(|e| e.state == EntryState::Managed)
            .map(|e| e.entity.clone())
            .collect()
    }

    /// Every tracked entity, new or managed.
    pub fn entities(&self) -> Vec<EntityRef> {
        self.entries.values().map(|e| e.entity.clone()).collect()
    }

    pub fn detach(&mut self, entity: &EntityRef) {
        if let Some(entry) = self.entries.remove(&entity.addr()) {
            if let Some(key) = entry.key {
                self.identity_map.remove(&key);
            }
        }
        self.scheduled.retain(|e| !e.ptr_eq(entity));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.identity_map.clear();
        self.scheduled.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
