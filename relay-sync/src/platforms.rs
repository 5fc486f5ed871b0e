//! Generic entity ↔ platform associations (`model_platform` rows).

use std::collections::BTreeSet;

use chrono::Utc;

use relay_core::{Catalog, EntityRef, ModelPlatformAssociation, Platform, PlatformId, Store};

use crate::error::SyncError;

pub struct PlatformRelations<'a> {
    store: &'a dyn Store,
    catalog: &'a Catalog,
}

impl<'a> PlatformRelations<'a> {
    pub fn new(store: &'a dyn Store, catalog: &'a Catalog) -> Self {
        Self { store, catalog }
    }

    /// Replace the entity's platform set: delete every association, then insert
    /// `platform_ids`, in one transaction.
    pub fn set_platforms(
        &self,
        entity: &EntityRef,
        platform_ids: &[PlatformId],
    ) -> Result<(), SyncError> {
        let ids: BTreeSet<PlatformId> = platform_ids.iter().copied().collect();
        for id in &ids {
            self.require(*id)?;
        }

        let now = Utc::now();
        let mut tx = self.store.begin()?;
        let removed = tx.delete_associations(entity)?;
        for id in &ids {
            tx.upsert_association(ModelPlatformAssociation::new(entity, *id, now))?;
        }
        tx.commit()?;

        tracing::debug!(
            "{entity}: replaced {removed} platform association(s) with {}",
            ids.len()
        );
        Ok(())
    }

    /// Associate one platform; a no-op beyond `updated_at` if already present.
    pub fn add_platform(&self, entity: &EntityRef, platform_id: PlatformId) -> Result<(), SyncError> {
        self.require(platform_id)?;
        let mut tx = self.store.begin()?;
        tx.upsert_association(ModelPlatformAssociation::new(entity, platform_id, Utc::now()))?;
        tx.commit()?;
        Ok(())
    }

    /// Drop one association; returns whether it existed.
    pub fn remove_platform(
        &self,
        entity: &EntityRef,
        platform_id: PlatformId,
    ) -> Result<bool, SyncError> {
        let mut tx = self.store.begin()?;
        let existed = tx.delete_association(entity, platform_id)?;
        tx.commit()?;
        Ok(existed)
    }

    pub fn has_platform(&self, entity: &EntityRef, platform_id: PlatformId) -> Result<bool, SyncError> {
        Ok(self
            .store
            .associations_for(entity)?
            .iter()
            .any(|row| row.platform_id == platform_id))
    }

    /// Platforms associated with `entity`. Rows pointing at platforms no longer
    /// in the catalog are skipped.
    pub fn platforms_for(&self, entity: &EntityRef) -> Result<Vec<Platform>, SyncError> {
        Ok(self
            .store
            .associations_for(entity)?
            .iter()
            .filter_map(|row| self.catalog.platform(row.platform_id).cloned())
            .collect())
    }

    fn require(&self, platform_id: PlatformId) -> Result<&Platform, SyncError> {
        self.catalog
            .platform(platform_id)
            .ok_or(SyncError::UnknownPlatform(platform_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::MemoryStore;

    fn catalog() -> Catalog {
        let mut catalog = Catalog::default();
        for (name, domain) in [("a", "a.test"), ("b", "b.test"), ("c", "c.test")] {
            catalog
                .add_platform(name, domain, format!("tok-{name}"))
                .expect("add");
        }
        catalog
    }

    fn ids(platforms: &[Platform]) -> BTreeSet<u64> {
        platforms.iter().map(|p| p.id.0).collect()
    }

    #[test]
    fn set_platforms_replaces_the_whole_set() {
        let store = MemoryStore::new();
        let catalog = catalog();
        let relations = PlatformRelations::new(&store, &catalog);
        let post = EntityRef::new("Post", "9");

        relations
            .set_platforms(&post, &[PlatformId(1), PlatformId(2)])
            .expect("set");
        relations
            .set_platforms(&post, &[PlatformId(2), PlatformId(3), PlatformId(3)])
            .expect("set");

        let platforms = relations.platforms_for(&post).expect("list");
        assert_eq!(ids(&platforms), BTreeSet::from([2, 3]));
    }

    #[test]
    fn set_platforms_with_empty_list_clears() {
        let store = MemoryStore::new();
        let catalog = catalog();
        let relations = PlatformRelations::new(&store, &catalog);
        let post = EntityRef::new("Post", "9");

        relations
            .set_platforms(&post, &[PlatformId(1), PlatformId(2)])
            .expect("set");
        relations.set_platforms(&post, &[]).expect("clear");

        assert!(relations.platforms_for(&post).expect("list").is_empty());
    }

    #[test]
    fn unknown_platform_leaves_existing_set_untouched() {
        let store = MemoryStore::new();
        let catalog = catalog();
        let relations = PlatformRelations::new(&store, &catalog);
        let post = EntityRef::new("Post", "9");
        relations.set_platforms(&post, &[PlatformId(1)]).expect("set");

        let err = relations
            .set_platforms(&post, &[PlatformId(2), PlatformId(42)])
            .unwrap_err();
        assert!(matches!(err, SyncError::UnknownPlatform(PlatformId(42))));
        assert!(relations.has_platform(&post, PlatformId(1)).expect("has"));
    }

    #[test]
    fn add_and_remove_are_idempotent() {
        let store = MemoryStore::new();
        let catalog = catalog();
        let relations = PlatformRelations::new(&store, &catalog);
        let user = EntityRef::new("User", "7");

        relations.add_platform(&user, PlatformId(2)).expect("add");
        relations.add_platform(&user, PlatformId(2)).expect("add again");
        assert_eq!(relations.platforms_for(&user).expect("list").len(), 1);
        assert!(relations.has_platform(&user, PlatformId(2)).expect("has"));

        assert!(relations.remove_platform(&user, PlatformId(2)).expect("remove"));
        assert!(!relations.remove_platform(&user, PlatformId(2)).expect("remove again"));
        assert!(!relations.has_platform(&user, PlatformId(2)).expect("has"));
    }

    #[test]
    fn associations_are_scoped_per_entity() {
        let store = MemoryStore::new();
        let catalog = catalog();
        let relations = PlatformRelations::new(&store, &catalog);
        let post = EntityRef::new("Post", "1");
        let user = EntityRef::new("User", "1");

        relations.set_platforms(&post, &[PlatformId(1)]).expect("set");
        relations.set_platforms(&user, &[PlatformId(3)]).expect("set");
        relations.set_platforms(&post, &[]).expect("clear");

        assert!(relations.has_platform(&user, PlatformId(3)).expect("has"));
    }
}
