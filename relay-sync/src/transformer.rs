//! Wire representation of outbound entities.
//!
//! A [`Transformer`] turns a stored entity into the flat `model` map of a
//! [`relay_core::SyncPayload`]. Entity types without a registered transformer
//! send every field of their main row ([`AllFields`]).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use relay_core::{EntityType, FieldMap, MainRecord, MetaRecord};

/// A stored entity as seen by a transformer.
#[derive(Debug, Clone, Copy)]
pub struct EntityView<'a> {
    pub record: &'a MainRecord,
    /// Meta rows of the record, ordered by key.
    pub meta: &'a [MetaRecord],
}

impl EntityView<'_> {
    pub fn meta_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.meta
            .iter()
            .find(|m| m.meta_key == key)
            .map(|m| &m.meta_value)
    }
}

pub trait Transformer: Send + Sync {
    fn transform(&self, entity: &EntityView<'_>) -> FieldMap;

    /// Extra delay added to the capture delay for this entity type.
    fn delay(&self) -> Duration {
        Duration::ZERO
    }
}

/// Every main-row field, unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllFields;

impl Transformer for AllFields {
    fn transform(&self, entity: &EntityView<'_>) -> FieldMap {
        entity.record.fields.clone()
    }
}

/// Main-row fields plus selected meta values flattened into the model.
///
/// Meta keys that collide with a main field are skipped.
#[derive(Debug, Clone, Default)]
pub struct MetaProjection {
    /// `None` projects every meta row.
    keys: Option<Vec<String>>,
    delay: Duration,
}

impl MetaProjection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn only<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: Some(keys.into_iter().map(Into::into).collect()),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Transformer for MetaProjection {
    fn transform(&self, entity: &EntityView<'_>) -> FieldMap {
        let mut model = entity.record.fields.clone();
        let wanted: Box<dyn Iterator<Item = &MetaRecord>> = match &self.keys {
            None => Box::new(entity.meta.iter()),
            Some(keys) => Box::new(
                entity
                    .meta
                    .iter()
                    .filter(move |m| keys.iter().any(|k| k == &m.meta_key)),
            ),
        };
        for meta in wanted {
            model
                .entry(meta.meta_key.clone())
                .or_insert_with(|| meta.meta_value.clone());
        }
        model
    }

    fn delay(&self) -> Duration {
        self.delay
    }
}

/// Entity type → transformer binding.
#[derive(Clone, Default)]
pub struct TransformerRegistry {
    bindings: HashMap<EntityType, Arc<dyn Transformer>>,
}

impl TransformerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, entity_type: impl Into<EntityType>, transformer: impl Transformer + 'static) {
        self.bindings
            .insert(entity_type.into(), Arc::new(transformer));
    }

    /// Builder-style [`Self::bind`].
    pub fn with(mut self, entity_type: impl Into<EntityType>, transformer: impl Transformer + 'static) -> Self {
        self.bind(entity_type, transformer);
        self
    }

    pub fn for_type(&self, entity_type: &EntityType) -> &dyn Transformer {
        match self.bindings.get(entity_type) {
            Some(transformer) => transformer.as_ref(),
            None => &AllFields,
        }
    }

    pub fn delay_for(&self, entity_type: &EntityType) -> Duration {
        self.for_type(entity_type).delay()
    }
}

impl std::fmt::Debug for TransformerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformerRegistry")
            .field("bound", &self.bindings.keys().collect::<Vec<_>>())
            .finish()
    }
}
