//! Persistence seam.
//!
//! [`Store`] is the only shared mutable resource of the relay. Writes happen
//! through a [`Transaction`]: staged operations become visible to other
//! readers on [`Transaction::commit`], and dropping an uncommitted transaction
//! discards them.
//!
//! Main rows live in a table named after the entity type they were applied
//! under and are addressed by the canonical string of their business key
//! ([`crate::types::key_string`]). [`MemoryStore`] is the in-process backend.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::StoreError;
use crate::types::{
    EntityRef, EntityType, FieldMap, MainRecord, MetaRecord, ModelPlatformAssociation,
    PlatformId,
};

/// Committed-state reads plus the transaction primitive.
pub trait Store: Send + Sync {
    /// Open a unit of work.
    fn begin(&self) -> Result<Box<dyn Transaction + '_>, StoreError>;

    fn find_main(&self, table: &EntityType, key: &str) -> Result<Option<MainRecord>, StoreError>;

    /// Meta rows of one owner, ordered by meta key.
    fn meta_for(&self, meta_table: &str, owner_key: &str) -> Result<Vec<MetaRecord>, StoreError>;

    fn associations_for(
        &self,
        entity: &EntityRef,
    ) -> Result<Vec<ModelPlatformAssociation>, StoreError>;
}

/// Staged writes against a [`Store`]. Reads observe the transaction's own
/// staged writes.
pub trait Transaction {
    fn find_main(&mut self, table: &EntityType, key: &str)
        -> Result<Option<MainRecord>, StoreError>;

    /// Write `fields` onto the row `(table, key)`, creating it when absent.
    /// Fields not named in `fields` keep their stored values.
    fn write_main(
        &mut self,
        table: &EntityType,
        key: &str,
        entity_type: &EntityType,
        fields: &FieldMap,
    ) -> Result<(), StoreError>;

    /// Insert or overwrite the row unique on `(meta_table, owner_key, meta_key)`.
    fn upsert_meta(&mut self, meta: MetaRecord) -> Result<(), StoreError>;

    /// Remove every association of `entity`; returns the number removed.
    fn delete_associations(&mut self, entity: &EntityRef) -> Result<usize, StoreError>;

    /// Remove one association; returns whether it existed.
    fn delete_association(
        &mut self,
        entity: &EntityRef,
        platform_id: PlatformId,
    ) -> Result<bool, StoreError>;

    /// Insert the association, or refresh `updated_at` if it exists.
    fn upsert_association(&mut self, row: ModelPlatformAssociation) -> Result<(), StoreError>;

    fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

type MainKey = (EntityType, String);
type MetaKey = (String, String, String);
type AssocKey = (EntityRef, PlatformId);

#[derive(Debug, Default)]
struct Tables {
    main: BTreeMap<MainKey, MainRecord>,
    meta: BTreeMap<MetaKey, MetaRecord>,
    associations: BTreeMap<AssocKey, ModelPlatformAssociation>,
}

impl Tables {
    fn apply(&mut self, op: Op) {
        match op {
            Op::WriteMain {
                table,
                key,
                entity_type,
                fields,
            } => {
                let row = self
                    .main
                    .entry((table, key))
                    .or_insert_with(|| MainRecord {
                        entity_type: entity_type.clone(),
                        fields: FieldMap::new(),
                    });
                row.entity_type = entity_type;
                row.fields.extend(fields);
            }
            Op::UpsertMeta(meta) => {
                let key = (
                    meta.meta_table.clone(),
                    meta.owner_key.clone(),
                    meta.meta_key.clone(),
                );
                self.meta.insert(key, meta);
            }
            Op::DeleteAssociations(entity) => {
                self.associations.retain(|(owner, _), _| owner != &entity);
            }
            Op::DeleteAssociation(entity, platform_id) => {
                self.associations.remove(&(entity, platform_id));
            }
            Op::UpsertAssociation(row) => {
                let key = (row.entity(), row.platform_id);
                match self.associations.get_mut(&key) {
                    Some(existing) => existing.updated_at = row.updated_at,
                    None => {
                        self.associations.insert(key, row);
                    }
                }
            }
        }
    }

    fn associations_of(&self, entity: &EntityRef) -> Vec<ModelPlatformAssociation> {
        self.associations
            .iter()
            .filter(|((owner, _), _)| owner == entity)
            .map(|(_, row)| row.clone())
            .collect()
    }
}

#[derive(Debug, Clone)]
enum Op {
    WriteMain {
        table: EntityType,
        key: String,
        entity_type: EntityType,
        fields: FieldMap,
    },
    UpsertMeta(MetaRecord),
    DeleteAssociations(EntityRef),
    DeleteAssociation(EntityRef, PlatformId),
    UpsertAssociation(ModelPlatformAssociation),
}

/// Mutex-guarded in-memory [`Store`].
///
/// Transactions stage operations and replay them under the lock on commit, so
/// two concurrent writers to one row interleave per field, last commit wins.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Number of main rows in `table`.
    pub fn main_count(&self, table: &EntityType) -> Result<usize, StoreError> {
        Ok(self.lock()?.main.keys().filter(|(t, _)| t == table).count())
    }

    /// Number of meta rows in `meta_table`.
    pub fn meta_count(&self, meta_table: &str) -> Result<usize, StoreError> {
        Ok(self
            .lock()?
            .meta
            .keys()
            .filter(|(t, _, _)| t == meta_table)
            .count())
    }
}

impl Store for MemoryStore {
    fn begin(&self) -> Result<Box<dyn Transaction + '_>, StoreError> {
        Ok(Box::new(MemoryTransaction {
            store: self,
            ops: Vec::new(),
        }))
    }

    fn find_main(&self, table: &EntityType, key: &str) -> Result<Option<MainRecord>, StoreError> {
        Ok(self
            .lock()?
            .main
            .get(&(table.clone(), key.to_owned()))
            .cloned())
    }

    fn meta_for(&self, meta_table: &str, owner_key: &str) -> Result<Vec<MetaRecord>, StoreError> {
        Ok(self
            .lock()?
            .meta
            .iter()
            .filter(|((t, owner, _), _)| t == meta_table && owner == owner_key)
            .map(|(_, row)| row.clone())
            .collect())
    }

    fn associations_for(
        &self,
        entity: &EntityRef,
    ) -> Result<Vec<ModelPlatformAssociation>, StoreError> {
        Ok(self.lock()?.associations_of(entity))
    }
}

struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    ops: Vec<Op>,
}

impl MemoryTransaction<'_> {
    /// `seed` (a slice of committed state) with the staged ops selected by
    /// `touches` replayed on top.
    fn overlay(&self, mut seed: Tables, touches: impl Fn(&Op) -> bool) -> Tables {
        for op in &self.ops {
            if touches(op) {
                seed.apply(op.clone());
            }
        }
        seed
    }

    /// Associations of `entity` as this transaction sees them.
    fn associations_view(&self, entity: &EntityRef) -> Result<Tables, StoreError> {
        let committed = self
            .store
            .lock()?
            .associations
            .iter()
            .filter(|((owner, _), _)| owner == entity)
            .map(|(key, row)| (key.clone(), row.clone()))
            .collect();
        let seed = Tables {
            associations: committed,
            ..Tables::default()
        };
        Ok(self.overlay(seed, |op| match op {
            Op::DeleteAssociations(owner) | Op::DeleteAssociation(owner, _) => owner == entity,
            Op::UpsertAssociation(row) => &row.entity() == entity,
            _ => false,
        }))
    }
}

impl Transaction for MemoryTransaction<'_> {
    fn find_main(
        &mut self,
        table: &EntityType,
        key: &str,
    ) -> Result<Option<MainRecord>, StoreError> {
        let row_key = (table.clone(), key.to_owned());
        let mut seed = Tables::default();
        if let Some(row) = self.store.lock()?.main.get(&row_key) {
            seed.main.insert(row_key.clone(), row.clone());
        }
        let mut view = self.overlay(seed, |op| {
            matches!(op, Op::WriteMain { table: t, key: k, .. } if t == table && k == key)
        });
        Ok(view.main.remove(&row_key))
    }

    fn write_main(
        &mut self,
        table: &EntityType,
        key: &str,
        entity_type: &EntityType,
        fields: &FieldMap,
    ) -> Result<(), StoreError> {
        self.ops.push(Op::WriteMain {
            table: table.clone(),
            key: key.to_owned(),
            entity_type: entity_type.clone(),
            fields: fields.clone(),
        });
        Ok(())
    }

    fn upsert_meta(&mut self, meta: MetaRecord) -> Result<(), StoreError> {
        self.ops.push(Op::UpsertMeta(meta));
        Ok(())
    }

    fn delete_associations(&mut self, entity: &EntityRef) -> Result<usize, StoreError> {
        let existing = self.associations_view(entity)?.associations.len();
        self.ops.push(Op::DeleteAssociations(entity.clone()));
        Ok(existing)
    }

    fn delete_association(
        &mut self,
        entity: &EntityRef,
        platform_id: PlatformId,
    ) -> Result<bool, StoreError> {
        let existed = self
            .associations_view(entity)?
            .associations
            .contains_key(&(entity.clone(), platform_id));
        self.ops
            .push(Op::DeleteAssociation(entity.clone(), platform_id));
        Ok(existed)
    }

    fn upsert_association(&mut self, row: ModelPlatformAssociation) -> Result<(), StoreError> {
        self.ops.push(Op::UpsertAssociation(row));
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut tables = self.store.lock()?;
        for op in self.ops {
            tables.apply(op);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn user() -> EntityType {
        EntityType::from("User")
    }

    fn fields(pairs: &[(&str, serde_json::Value)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn uncommitted_writes_are_discarded_on_drop() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().expect("begin");
            tx.write_main(&user(), "1", &user(), &fields(&[("id", json!(1))]))
                .expect("write");
            assert!(tx.find_main(&user(), "1").expect("find").is_some());
        }
        assert!(store.find_main(&user(), "1").expect("find").is_none());
    }

    #[test]
    fn transaction_reads_see_committed_rows_under_staged_writes() {
        let store = MemoryStore::new();
        let post = EntityRef::new("Post", "3");
        let now = Utc::now();
        let mut seed = store.begin().expect("begin");
        seed.write_main(
            &user(),
            "1",
            &user(),
            &fields(&[("id", json!(1)), ("login", json!("a")), ("email", json!("a@x"))]),
        )
        .expect("seed");
        seed.write_main(&user(), "2", &user(), &fields(&[("id", json!(2))]))
            .expect("seed");
        seed.upsert_association(ModelPlatformAssociation::new(&post, PlatformId(2), now))
            .expect("seed");
        seed.commit().expect("commit");

        let mut tx = store.begin().expect("begin");
        tx.write_main(&user(), "1", &user(), &fields(&[("login", json!("b"))]))
            .expect("write");
        let row = tx.find_main(&user(), "1").expect("find").expect("row");
        assert_eq!(row.get("login"), Some(&json!("b")));
        assert_eq!(row.get("email"), Some(&json!("a@x")));
        assert!(tx.find_main(&user(), "2").expect("find").is_some());
        assert!(tx.find_main(&user(), "3").expect("find").is_none());

        tx.upsert_association(ModelPlatformAssociation::new(&post, PlatformId(1), now))
            .expect("upsert");
        tx.upsert_association(ModelPlatformAssociation::new(
            &EntityRef::new("User", "1"),
            PlatformId(1),
            now,
        ))
        .expect("upsert");
        assert_eq!(tx.delete_associations(&post).expect("delete"), 2);
        assert!(!tx.delete_association(&post, PlatformId(1)).expect("delete"));
        drop(tx);

        assert_eq!(
            store.find_main(&user(), "1").expect("find").expect("row").get("login"),
            Some(&json!("a"))
        );
        assert_eq!(store.associations_for(&post).expect("rows").len(), 1);
    }

    #[test]
    fn commit_publishes_staged_writes() {
        let store = MemoryStore::new();
        let mut tx = store.begin().expect("begin");
        tx.write_main(&user(), "1", &user(), &fields(&[("id", json!(1))]))
            .expect("write");
        tx.commit().expect("commit");
        assert_eq!(store.main_count(&user()).expect("count"), 1);
    }

    #[test]
    fn concurrent_writers_merge_per_field() {
        let store = MemoryStore::new();
        let mut seed = store.begin().expect("begin");
        seed.write_main(
            &user(),
            "1",
            &user(),
            &fields(&[("id", json!(1)), ("login", json!("a")), ("email", json!("a@x"))]),
        )
        .expect("seed");
        seed.commit().expect("commit");

        let mut first = store.begin().expect("begin");
        let mut second = store.begin().expect("begin");
        first
            .write_main(&user(), "1", &user(), &fields(&[("login", json!("b"))]))
            .expect("write");
        second
            .write_main(&user(), "1", &user(), &fields(&[("email", json!("c@x"))]))
            .expect("write");
        second.commit().expect("commit");
        first.commit().expect("commit");

        let row = store.find_main(&user(), "1").expect("find").expect("row");
        assert_eq!(row.get("login"), Some(&json!("b")));
        assert_eq!(row.get("email"), Some(&json!("c@x")));
    }

    #[test]
    fn meta_upsert_is_unique_per_owner_and_key() {
        let store = MemoryStore::new();
        let meta = |value: &str| MetaRecord {
            meta_table: "user_meta".into(),
            foreign_key: "user_id".into(),
            owner_key: "7".into(),
            meta_key: "role".into(),
            meta_value: json!(value),
        };
        let mut tx = store.begin().expect("begin");
        tx.upsert_meta(meta("admin")).expect("meta");
        tx.upsert_meta(meta("editor")).expect("meta");
        tx.commit().expect("commit");

        let rows = store.meta_for("user_meta", "7").expect("meta");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].meta_value, json!("editor"));
    }

    #[test]
    fn association_upsert_keeps_created_at() {
        let store = MemoryStore::new();
        let entity = EntityRef::new("Post", "3");
        let first = Utc::now();
        let mut tx = store.begin().expect("begin");
        tx.upsert_association(ModelPlatformAssociation::new(&entity, PlatformId(1), first))
            .expect("upsert");
        tx.commit().expect("commit");

        let later = first + chrono::Duration::seconds(10);
        let mut tx = store.begin().expect("begin");
        tx.upsert_association(ModelPlatformAssociation::new(&entity, PlatformId(1), later))
            .expect("upsert");
        tx.commit().expect("commit");

        let rows = store.associations_for(&entity).expect("rows");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].created_at, first);
        assert_eq!(rows[0].updated_at, later);
    }
}
