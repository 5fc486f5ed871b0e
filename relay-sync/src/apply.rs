//! Apply engine: merge an inbound record into local storage.
//!
//! ## `apply`: one transaction per call
//!
//! 1. Look up the entity type's schema (unknown → `UnsupportedEntityType`).
//! 2. Partition the payload into main fields and meta fields.
//! 3. Normalize date fields (never fails; falls back to "now").
//! 4. Upsert the main row by business key, writing only the supplied fields.
//! 5. Upsert one meta row per meta field, using the schema of the row's
//!    resolved type.
//! 6. Commit and return the main record.
//!
//! Any error before the commit drops the transaction, discarding every staged
//! write. Replaying the same payload converges on the same rows.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

use relay_core::{
    key_string, EntitySchema, EntityType, FieldMap, MainRecord, MetaRecord, SchemaRegistry, Store,
};

use crate::error::SyncError;

/// Canonical stored timestamp format.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Value some sources use for "no date".
pub const ZERO_DATE: &str = "0000-00-00 00:00:00";

pub struct ApplyEngine<'a> {
    schema: &'a SchemaRegistry,
    store: &'a dyn Store,
}

impl<'a> ApplyEngine<'a> {
    pub fn new(schema: &'a SchemaRegistry, store: &'a dyn Store) -> Self {
        Self { schema, store }
    }

    /// Upsert `fields` as an `entity_type` record. See the module docs.
    pub fn apply(&self, entity_type: &EntityType, fields: FieldMap) -> Result<MainRecord, SyncError> {
        let schema = self
            .schema
            .get(entity_type)
            .ok_or_else(|| SyncError::unsupported(entity_type))?;

        let (mut main, meta) = schema.partition(fields);
        normalize_dates(schema, &mut main, Utc::now());

        let key = schema
            .key_of(&main)
            .map(key_string)
            .ok_or_else(|| SyncError::MissingKey {
                entity_type: entity_type.clone(),
                key_field: schema.key_field.clone(),
            })?;

        tracing::debug!(
            "applying {entity_type}#{key}: {} main field(s), {} meta field(s)",
            main.len(),
            meta.len()
        );

        let result = self.apply_in_transaction(entity_type, schema, &key, main, meta);
        match &result {
            Ok(record) => tracing::info!(
                "applied {entity_type}#{key} as {}",
                record.entity_type
            ),
            Err(err) => tracing::warn!("apply of {entity_type}#{key} rolled back: {err}"),
        }
        result
    }

    fn apply_in_transaction(
        &self,
        entity_type: &EntityType,
        schema: &EntitySchema,
        key: &str,
        main: FieldMap,
        meta: FieldMap,
    ) -> Result<MainRecord, SyncError> {
        let mut tx = self.store.begin()?;

        // Main row: locate or create a shell, then write the supplied fields.
        let existing = tx.find_main(entity_type, key)?;
        let base_type = existing
            .as_ref()
            .map(|r| r.entity_type.clone())
            .unwrap_or_else(|| entity_type.clone());
        let resolved = schema.resolve_type(&base_type, &main);
        tx.write_main(entity_type, key, &resolved, &main)?;

        let mut record = existing.unwrap_or_else(|| MainRecord {
            entity_type: resolved.clone(),
            fields: FieldMap::new(),
        });
        record.entity_type = resolved;
        record.fields.extend(main);

        // Meta rows follow the resolved record type.
        let meta_schema = self
            .schema
            .get(&record.entity_type)
            .ok_or_else(|| SyncError::unsupported(&record.entity_type))?;
        for (meta_key, meta_value) in meta {
            tx.upsert_meta(MetaRecord {
                meta_table: meta_schema.meta_table.clone(),
                foreign_key: meta_schema.meta_foreign_key.clone(),
                owner_key: key.to_string(),
                meta_key,
                meta_value,
            })?;
        }

        sync_taxonomies(&record);

        tx.commit()?;
        Ok(record)
    }
}

/// Category/tag associations are not propagated.
fn sync_taxonomies(_record: &MainRecord) {}

/// Rewrite every schema date field present in `main` to [`DATE_FORMAT`]; fill
/// absent `default_now` fields with `now`.
pub fn normalize_dates(schema: &EntitySchema, main: &mut FieldMap, now: DateTime<Utc>) {
    for date in &schema.date_fields {
        let normalized = match main.get(&date.name) {
            Some(raw) => normalize_date(&date.name, raw, now),
            None if date.default_now => now.format(DATE_FORMAT).to_string(),
            None => continue,
        };
        main.insert(date.name.clone(), Value::String(normalized));
    }
}

/// Canonical timestamp for `raw`; empty, zero or unparsable input yields `now`.
pub fn normalize_date(field: &str, raw: &Value, now: DateTime<Utc>) -> String {
    let fallback = || now.format(DATE_FORMAT).to_string();
    let parsed = match raw {
        Value::Null => return fallback(),
        Value::String(s) if s.trim().is_empty() || s.trim() == ZERO_DATE => return fallback(),
        Value::String(s) => parse_timestamp(s.trim()),
        Value::Number(n) => n
            .as_i64()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .map(|dt| dt.naive_utc()),
        _ => None,
    };
    match parsed {
        Some(dt) => dt.format(DATE_FORMAT).to_string(),
        None => {
            tracing::warn!("failed to parse date field '{field}' ({raw}); using current time");
            fallback()
        }
    }
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }
    for format in [DATE_FORMAT, "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y/%m/%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
