// Copyright 2025 Cowboy AI, LLC.

//! Serialization bridge: flat snapshots of composed objects
//!
//! A snapshot is one flat key/value map. It stores the class context, so the
//! reader can find (or rebuild) the same composition, the target's fields
//! under a `field.` prefix and one nested flat map per mixin slot.
//!
//! Restoring never runs default construction: every slot must come from the
//! snapshot. Initialization hooks run with [`InitReason::Deserialization`],
//! followed by on-deserialized hooks of the mixins and then the target.
//!
//! [`InitReason::Deserialization`]: crate::runtime::InitReason::Deserialization

use indexmap::IndexMap;
use schemars::schema::RootSchema;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::composer::Composer;
use crate::context::ClassContext;
use crate::errors::{CompositionError, CompositionResult};
use crate::identifiers::TypeKey;
use crate::member::{FieldSet, Value};
use crate::runtime::{ComposedObject, InstanceInitializer, MixinInstance, MixinShape};

/// Key of the serialized class context
pub const CONFIGURATION_KEY: &str = "__configuration";
/// Key of the mixin slot list
pub const EXTENSIONS_KEY: &str = "__extensions";
/// Key of a slot's mixin index
pub const MIXIN_INDEX_KEY: &str = "__mixin_index";
/// Key of a slot's mixin type
pub const MIXIN_TYPE_KEY: &str = "__mixin_type";
/// Key of a slot's shape
pub const MIXIN_SHAPE_KEY: &str = "__mixin_shape";
/// Prefix of field entries
pub const FIELD_PREFIX: &str = "field.";

/// Flat key/value snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct FlatSnapshot {
    entries: IndexMap<String, Value>,
}

impl FlatSnapshot {
    /// Empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Read an entry
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Write an entry
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// Field entries with the prefix removed
    pub fn fields(&self) -> FieldSet {
        self.entries
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(FIELD_PREFIX)
                    .map(|name| (name.to_string(), value.clone()))
            })
            .collect()
    }

    fn with_fields(mut self, fields: &FieldSet) -> Self {
        for (name, value) in fields {
            self.entries
                .insert(format!("{FIELD_PREFIX}{name}"), value.clone());
        }
        self
    }

    /// Encode as JSON
    pub fn to_json(&self) -> CompositionResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from JSON
    ///
    /// # Errors
    ///
    /// Returns `Serialization` for malformed input
    pub fn from_json(json: &str) -> CompositionResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    fn into_value(self) -> Value {
        Value::Object(self.entries.into_iter().collect())
    }

    fn from_value(value: &Value) -> CompositionResult<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }
}

/// JSON schema of [`FlatSnapshot`]
pub fn snapshot_schema() -> RootSchema {
    schema_for!(FlatSnapshot)
}

/// Write an object's state into a snapshot
///
/// # Errors
///
/// Returns `Serialization` when the class context cannot be encoded
pub fn snapshot(object: &ComposedObject) -> CompositionResult<FlatSnapshot> {
    let mut snapshot = FlatSnapshot::new();
    snapshot.insert(
        CONFIGURATION_KEY,
        serde_json::to_value(object.composition().context())?,
    );

    let mut extensions = Vec::with_capacity(object.extensions().len());
    for (index, instance) in object.extensions().iter().enumerate() {
        let mut slot = FlatSnapshot::new();
        slot.insert(MIXIN_INDEX_KEY, Value::from(index));
        slot.insert(MIXIN_TYPE_KEY, serde_json::to_value(instance.mixin_type())?);
        slot.insert(MIXIN_SHAPE_KEY, serde_json::to_value(instance.shape())?);
        extensions.push(slot.with_fields(instance.fields()).into_value());
    }
    snapshot.insert(EXTENSIONS_KEY, Value::Array(extensions));

    let snapshot = snapshot.with_fields(object.fields());
    debug!(
        target_type = %object.target(),
        entries = snapshot.len(),
        "Captured snapshot"
    );
    Ok(snapshot)
}

/// Restores objects from snapshots through a composer
#[derive(Debug, Clone)]
pub struct SerializationBridge {
    composer: Composer,
}

impl SerializationBridge {
    /// Create a bridge resolving compositions through `composer`
    pub fn new(composer: Composer) -> Self {
        Self { composer }
    }

    /// Composer used to resolve compositions
    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    /// Write an object's state into a snapshot
    ///
    /// # Errors
    ///
    /// Returns `Serialization` when the class context cannot be encoded
    pub fn serialize(&self, object: &ComposedObject) -> CompositionResult<FlatSnapshot> {
        snapshot(object)
    }

    /// Restore an object
    ///
    /// # Errors
    ///
    /// Returns `Serialization` for malformed snapshots, composition errors
    /// and `SerializationMismatch` when the mixin slots do not fit the
    /// composition
    pub fn deserialize(&self, snapshot: &FlatSnapshot) -> CompositionResult<ComposedObject> {
        self.restore(snapshot, None)
    }

    /// Restore an object that must be an instance of `expected`
    ///
    /// # Errors
    ///
    /// As [`SerializationBridge::deserialize`], plus `SerializationMismatch`
    /// when the snapshot holds another target
    pub fn deserialize_as(
        &self,
        snapshot: &FlatSnapshot,
        expected: &TypeKey,
    ) -> CompositionResult<ComposedObject> {
        self.restore(snapshot, Some(expected))
    }

    fn restore(
        &self,
        snapshot: &FlatSnapshot,
        expected: Option<&TypeKey>,
    ) -> CompositionResult<ComposedObject> {
        let context: ClassContext = serde_json::from_value(
            snapshot
                .get(CONFIGURATION_KEY)
                .cloned()
                .ok_or_else(|| missing_entry(CONFIGURATION_KEY))?,
        )?;
        context.validate()?;

        if let Some(expected) = expected {
            if context.target() != expected {
                warn!(expected = %expected, found = %context.target(), "Snapshot target mismatch");
                return Err(CompositionError::SerializationMismatch {
                    expected: expected.to_string(),
                    found: context.target().to_string(),
                });
            }
        }

        let composition = self.composer.compose(&context)?;
        let definition = Arc::clone(composition.definition());

        let slots = snapshot
            .get(EXTENSIONS_KEY)
            .and_then(Value::as_array)
            .ok_or_else(|| missing_entry(EXTENSIONS_KEY))?;
        if slots.len() != definition.mixin_count() {
            return Err(CompositionError::SerializationMismatch {
                expected: format!("{} mixin slots", definition.mixin_count()),
                found: format!("{} mixin slots", slots.len()),
            });
        }

        let mut restored = Vec::with_capacity(slots.len());
        for slot in slots {
            let slot = FlatSnapshot::from_value(slot)?;
            let mixin_type: TypeKey = serde_json::from_value(
                slot.get(MIXIN_TYPE_KEY)
                    .cloned()
                    .ok_or_else(|| missing_entry(MIXIN_TYPE_KEY))?,
            )?;
            let shape: MixinShape = serde_json::from_value(
                slot.get(MIXIN_SHAPE_KEY)
                    .cloned()
                    .ok_or_else(|| missing_entry(MIXIN_SHAPE_KEY))?,
            )?;
            let Some(current) = definition.mixin_index(&mixin_type) else {
                return Err(CompositionError::SerializationMismatch {
                    expected: format!("a mixin of {}", definition.key()),
                    found: mixin_type.to_string(),
                });
            };
            let recorded = slot.get(MIXIN_INDEX_KEY).and_then(Value::as_u64);
            if recorded != Some(current as u64) {
                debug!(
                    mixin = %mixin_type,
                    recorded = ?recorded,
                    current,
                    "Mixin slot moved since the snapshot was taken"
                );
            }
            restored.push(MixinInstance::from_parts(mixin_type, shape, slot.fields()));
        }

        let object = ComposedObject::allocate(Arc::clone(&composition), snapshot.fields());
        InstanceInitializer::new(composition).restore(object, restored)
    }
}

fn missing_entry(key: &str) -> CompositionError {
    CompositionError::Serialization(format!("snapshot has no {key} entry"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Test field entries are prefixed and stripped
    #[test]
    fn test_field_prefixing() {
        let mut fields = FieldSet::new();
        fields.insert("total".to_string(), json!(10));
        let snapshot = FlatSnapshot::new().with_fields(&fields);
        assert_eq!(snapshot.get("field.total"), Some(&json!(10)));
        assert_eq!(snapshot.fields(), fields);
    }

    /// Test snapshots encode as flat JSON objects
    #[test]
    fn test_snapshot_json() {
        let mut snapshot = FlatSnapshot::new();
        snapshot.insert("field.total", json!(10));
        let json = snapshot.to_json().unwrap();
        assert_eq!(json, r#"{"field.total":10}"#);
        assert_eq!(FlatSnapshot::from_json(&json).unwrap(), snapshot);
    }

    /// Test the schema describes an object
    #[test]
    fn test_snapshot_schema() {
        let schema = serde_json::to_value(snapshot_schema()).unwrap();
        assert_eq!(schema["type"], json!("object"));
    }

    /// Test missing configuration is reported
    #[test]
    fn test_missing_configuration() {
        let bridge = SerializationBridge::new(Composer::new(crate::catalog::TypeCatalog::new()));
        let err = bridge.deserialize(&FlatSnapshot::new()).unwrap_err();
        assert!(matches!(err, CompositionError::Serialization(ref m) if m.contains(CONFIGURATION_KEY)));
    }
}
