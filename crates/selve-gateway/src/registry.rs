//! Entity registry: the engine's mirror of what the gateway knows.
//!
//! Entities are keyed by `(kind, id)`. The registry only changes when the
//! gateway reports something: discovery reads, unsolicited events, or a
//! confirmed delete. Updates are last-write-wins.

use std::collections::BTreeMap;

use chrono::Utc;
use parking_lot::RwLock;
use selve_protocol::IdMask;
use tracing::debug;

use crate::entity::{Entity, EntityKind, EntityUpdate};

/// Result of merging one update.
#[derive(Debug, Clone)]
pub struct Applied {
    /// Snapshot after the merge.
    pub entity: Entity,
    /// The entity did not exist before.
    pub created: bool,
    /// The merge changed the name or any attribute.
    pub changed: bool,
}

/// Thread-safe entity store.
#[derive(Debug, Default)]
pub struct Registry {
    entities: RwLock<BTreeMap<(EntityKind, u8), Entity>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: EntityKind, id: u8) -> Option<Entity> {
        self.entities.read().get(&(kind, id)).cloned()
    }

    pub fn contains(&self, kind: EntityKind, id: u8) -> bool {
        self.entities.read().contains_key(&(kind, id))
    }

    /// Entities of one kind, ordered by id.
    pub fn list(&self, kind: EntityKind) -> Vec<Entity> {
        self.entities
            .read()
            .range((kind, 0)..=(kind, u8::MAX))
            .map(|(_, e)| e.clone())
            .collect()
    }

    /// Every entity, ordered by kind then id.
    pub fn all(&self) -> Vec<Entity> {
        self.entities.read().values().cloned().collect()
    }

    /// Ids currently held for `kind`.
    pub fn ids(&self, kind: EntityKind) -> IdMask {
        let guard = self.entities.read();
        IdMask(
            guard
                .range((kind, 0)..=(kind, u8::MAX))
                .fold(0u64, |mask, ((_, id), _)| mask | (1u64 << *id)),
        )
    }

    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.entities.read().range((kind, 0)..=(kind, u8::MAX)).count()
    }

    /// Merge an update, creating a placeholder first if the id is new.
    pub fn apply(&self, update: &EntityUpdate) -> Applied {
        let (kind, id) = update.key();
        let mut guard = self.entities.write();
        let created = !guard.contains_key(&(kind, id));
        if created {
            debug!("creating {} {}", kind, id);
        }
        let entity = guard.entry((kind, id)).or_insert_with(|| Entity::placeholder(kind, id));
        let before = (!created).then(|| entity.clone());

        if update.apply_to(entity) {
            entity.last_updated = Utc::now();
        }

        let changed = before.map_or(true, |b| !b.same_content(entity));
        Applied {
            entity: entity.clone(),
            created,
            changed,
        }
    }

    pub fn remove(&self, kind: EntityKind, id: u8) -> Option<Entity> {
        self.entities.write().remove(&(kind, id))
    }

    /// Drop entities of `kind` whose ids the gateway no longer reports.
    pub fn retain_ids(&self, kind: EntityKind, ids: IdMask) -> Vec<Entity> {
        let mut guard = self.entities.write();
        let stale: Vec<_> = guard
            .range((kind, 0)..=(kind, u8::MAX))
            .filter(|((_, id), _)| !ids.contains(*id))
            .map(|(key, _)| *key)
            .collect();
        stale.into_iter().filter_map(|key| guard.remove(&key)).collect()
    }

    /// Lowest id of `kind` not held locally.
    pub fn find_free_id(&self, kind: EntityKind) -> Option<u8> {
        let used = self.ids(kind);
        (0..=kind.max_id()).find(|id| !used.contains(*id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use selve_protocol::*;

    fn group(id: u8, name: &str, members: &[u8]) -> EntityUpdate {
        EntityUpdate::Group(GroupRecord {
            name: Some(name.to_string()),
            id,
            members: IdMask::from_ids(members.iter().copied()).unwrap(),
        })
    }

    #[test]
    fn test_apply_creates_then_updates() {
        let registry = Registry::new();
        let first = registry.apply(&group(3, "Living Room", &[1, 2, 5]));
        assert!(first.created && first.changed);
        assert!(!first.entity.placeholder);

        let again = registry.apply(&group(3, "Living Room", &[1, 2, 5]));
        assert!(!again.created);
        assert!(!again.changed);

        let renamed = registry.apply(&group(3, "Lounge", &[1, 2, 5]));
        assert!(renamed.changed);
        assert_eq!(registry.get(EntityKind::Group, 3).unwrap().name.as_deref(), Some("Lounge"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_list_is_per_kind_and_ordered() {
        let registry = Registry::new();
        registry.apply(&group(7, "b", &[]));
        registry.apply(&group(2, "a", &[]));
        registry.apply(&EntityUpdate::SensorInfo(SensorInfo {
            name: None,
            id: 2,
            rf_address: 9,
        }));

        let groups: Vec<u8> = registry.list(EntityKind::Group).iter().map(|e| e.id).collect();
        assert_eq!(groups, vec![2, 7]);
        assert_eq!(registry.count(EntityKind::Sensor), 1);
        assert_eq!(registry.ids(EntityKind::Group).ids(), vec![2, 7]);
    }

    #[test]
    fn test_retain_ids_prunes() {
        let registry = Registry::new();
        for id in [1, 2, 3] {
            registry.apply(&group(id, "g", &[]));
        }
        let removed = registry.retain_ids(EntityKind::Group, IdMask::from_ids([1, 3]).unwrap());
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, 2);
        assert!(!registry.contains(EntityKind::Group, 2));
    }

    #[test]
    fn test_find_free_id() {
        let registry = Registry::new();
        assert_eq!(registry.find_free_id(EntityKind::Sensor), Some(0));
        for id in 0..=7 {
            registry.apply(&EntityUpdate::SensorInfo(SensorInfo {
                name: None,
                id,
                rf_address: 0,
            }));
        }
        assert_eq!(registry.find_free_id(EntityKind::Sensor), None);
        registry.remove(EntityKind::Sensor, 5);
        assert_eq!(registry.find_free_id(EntityKind::Sensor), Some(5));
    }
}
