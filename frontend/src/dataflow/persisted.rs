//! Named state fields mirrored in a client-side key/value store
//!
//! Each [`PersistedField`] owns one store key. Values are written as a small
//! versioned JSON envelope (`{"v":1,"data":...}`); an absent value is
//! represented by removing the key. Entries that cannot be decoded are
//! replaced with the field's fallback so a corrupt store heals itself.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use thiserror::Error;

use shared::ItemList;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("Client-side storage is not available")]
    Unavailable,
    #[error("Failed to write '{key}': {reason}")]
    Write { key: String, reason: String },
    #[error("Failed to encode value: {0}")]
    Encode(String),
    #[error("Failed to decode value: {0}")]
    Decode(String),
}

// ===== KEY/VALUE STORES =====

/// Minimal string store, the shape of browser `localStorage`.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// In-memory store. Clones share their contents.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    items: Rc<RefCell<BTreeMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        self.items.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.items.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.items
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.items.borrow_mut().remove(key);
        Ok(())
    }
}

// ===== CODECS =====

/// Converts a field value to and from its stored string form.
pub trait StateCodec<T> {
    fn pack(&self, value: &T) -> Result<String, StorageError>;
    fn unpack(&self, raw: &str) -> Result<T, StorageError>;

    /// True if `raw` decoded fine but is in an outdated format that should be
    /// rewritten.
    fn needs_rewrite(&self, _raw: &str) -> bool {
        false
    }
}

const ENVELOPE_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    v: u32,
    data: &'a T,
}

#[derive(Deserialize)]
struct Envelope<T> {
    v: u32,
    data: T,
}

/// The default codec: serde_json inside a versioned envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<T: Serialize + DeserializeOwned> StateCodec<T> for JsonCodec {
    fn pack(&self, value: &T) -> Result<String, StorageError> {
        serde_json::to_string(&EnvelopeRef {
            v: ENVELOPE_VERSION,
            data: value,
        })
        .map_err(|e| StorageError::Encode(e.to_string()))
    }

    fn unpack(&self, raw: &str) -> Result<T, StorageError> {
        let envelope: Envelope<T> =
            serde_json::from_str(raw).map_err(|e| StorageError::Decode(e.to_string()))?;
        if envelope.v != ENVELOPE_VERSION {
            return Err(StorageError::Decode(format!(
                "unsupported envelope version {}",
                envelope.v
            )));
        }
        Ok(envelope.data)
    }
}

/// Item lists, also accepting the old `type:::name:::a^^^b###...` form.
/// Legacy lists of an unknown type are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct ItemListsCodec;

impl ItemListsCodec {
    const LEGACY_LIST_SEPARATOR: &'static str = "###";

    fn is_legacy(raw: &str) -> bool {
        !raw.trim_start().starts_with('{')
    }
}

impl StateCodec<Vec<ItemList>> for ItemListsCodec {
    fn pack(&self, value: &Vec<ItemList>) -> Result<String, StorageError> {
        JsonCodec.pack(value)
    }

    fn unpack(&self, raw: &str) -> Result<Vec<ItemList>, StorageError> {
        if !Self::is_legacy(raw) {
            return JsonCodec.unpack(raw);
        }
        if !raw.contains(ItemList::LEGACY_FIELD_SEPARATOR) {
            return Err(StorageError::Decode(format!(
                "not an item list: {raw:?}"
            )));
        }
        Ok(raw
            .split(Self::LEGACY_LIST_SEPARATOR)
            .filter_map(ItemList::unpack_legacy)
            .collect())
    }

    fn needs_rewrite(&self, raw: &str) -> bool {
        Self::is_legacy(raw)
    }
}

// ===== PERSISTED FIELD =====

/// What [`PersistedField::load`] found in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Absent,
    Loaded,
    /// Decoded from an outdated format and rewritten.
    Migrated,
    /// Could not be decoded; the fallback was loaded and written back.
    Recovered,
}

type ChangeHook<T> = Box<dyn FnMut(Option<&T>)>;

/// A named value mirrored under one store key.
pub struct PersistedField<T> {
    name: String,
    key: String,
    value: Option<T>,
    codec: Box<dyn StateCodec<T>>,
    fallback: fn() -> Option<T>,
    on_change: Option<ChangeHook<T>>,
    log_target: String,
}

impl<T: Serialize + DeserializeOwned + Default + 'static> PersistedField<T> {
    /// JSON field that falls back to `T::default()` on corrupt data.
    pub fn json(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self::with_codec(name, key, JsonCodec, || Some(T::default()))
    }
}

impl<T: 'static> PersistedField<T> {
    /// JSON field for values with no natural default; corrupt data loads as absent.
    pub fn json_optional(name: impl Into<String>, key: impl Into<String>) -> Self
    where
        T: Serialize + DeserializeOwned,
    {
        Self::with_codec(name, key, JsonCodec, || None)
    }

    pub fn with_codec(
        name: impl Into<String>,
        key: impl Into<String>,
        codec: impl StateCodec<T> + 'static,
        fallback: fn() -> Option<T>,
    ) -> Self {
        let name = name.into();
        Self {
            log_target: format!("PersistedState.{name}"),
            name,
            key: key.into(),
            value: None,
            codec: Box::new(codec),
            fallback,
            on_change: None,
        }
    }

    /// Hook invoked with the new value after every load or explicit change.
    pub fn with_change_hook(mut self, hook: impl FnMut(Option<&T>) + 'static) -> Self {
        self.on_change = Some(Box::new(hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn value_or_default(&self) -> T
    where
        T: Clone + Default,
    {
        self.value.clone().unwrap_or_default()
    }

    /// Stored form of `value`; `None` means "no entry".
    pub fn pack(&self, value: Option<&T>) -> Result<Option<String>, StorageError> {
        value.map(|v| self.codec.pack(v)).transpose()
    }

    pub fn unpack(&self, raw: Option<&str>) -> Result<Option<T>, StorageError> {
        raw.map(|r| self.codec.unpack(r)).transpose()
    }

    /// Read the field from `store`. Never fails: undecodable entries are
    /// replaced by the fallback, which is also written back.
    pub fn load(&mut self, store: &dyn KeyValueStore) -> LoadOutcome {
        let Some(raw) = store.get(&self.key) else {
            self.value = None;
            return LoadOutcome::Absent;
        };
        let outcome = match self.codec.unpack(&raw) {
            Ok(value) => {
                self.value = Some(value);
                if self.codec.needs_rewrite(&raw) {
                    log::info!(target: self.log_target.as_str(), "Migrating stored format");
                    self.write_current(store);
                    LoadOutcome::Migrated
                } else {
                    LoadOutcome::Loaded
                }
            }
            Err(error) => {
                log::warn!(
                    target: self.log_target.as_str(),
                    "Unable to decode stored value, resetting: {error}"
                );
                self.value = (self.fallback)();
                self.write_current(store);
                LoadOutcome::Recovered
            }
        };
        self.notify();
        outcome
    }

    /// Write `value` under this field's key without touching the held value.
    pub fn store(&self, store: &dyn KeyValueStore, value: Option<&T>) -> Result<(), StorageError> {
        match self.pack(value)? {
            Some(packed) => store.set(&self.key, &packed),
            None => store.remove(&self.key),
        }
    }

    /// Set, persist and announce a new value.
    ///
    /// The held value and the change hook are updated even if the write fails.
    pub fn change_and_persist(
        &mut self,
        store: &dyn KeyValueStore,
        value: Option<T>,
    ) -> Result<(), StorageError> {
        log::info!(target: self.log_target.as_str(), "Changed");
        self.value = value;
        let written = self.store(store, self.value.as_ref());
        self.notify();
        written
    }

    /// Set and persist a value without invoking the change hook.
    pub fn persist(&mut self, store: &dyn KeyValueStore, value: T) -> Result<(), StorageError> {
        log::debug!(target: self.log_target.as_str(), "Stored");
        self.value = Some(value);
        self.store(store, self.value.as_ref())
    }

    /// Drop the value and its store entry.
    pub fn clear(&mut self, store: &dyn KeyValueStore) -> Result<(), StorageError> {
        self.value = None;
        store.remove(&self.key)
    }

    fn write_current(&self, store: &dyn KeyValueStore) {
        if let Err(error) = self.store(store, self.value.as_ref()) {
            log::error!(target: self.log_target.as_str(), "Failed to rewrite entry: {error}");
        }
    }

    fn notify(&mut self) {
        if let Some(hook) = self.on_change.as_mut() {
            hook(self.value.as_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{DatasetId, ItemListType};
    use std::collections::BTreeSet;

    fn datasets(ids: &[&str]) -> BTreeSet<DatasetId> {
        ids.iter().map(|id| DatasetId::new(*id)).collect()
    }

    #[test]
    fn test_set_valued_field_round_trips_regardless_of_order() {
        let store = MemoryStore::new();
        let mut field: PersistedField<BTreeSet<DatasetId>> =
            PersistedField::json("datasets", "OTG.datasets");

        field.persist(&store, datasets(&["b", "a"])).unwrap();
        let mut reloaded: PersistedField<BTreeSet<DatasetId>> =
            PersistedField::json("datasets", "OTG.datasets");
        assert_eq!(reloaded.load(&store), LoadOutcome::Loaded);
        assert_eq!(reloaded.value(), Some(&datasets(&["a", "b"])));
        assert_eq!(store.get("OTG.datasets").unwrap(), r#"{"v":1,"data":["a","b"]}"#);
    }

    #[test]
    fn test_absent_value_clears_key() {
        let store = MemoryStore::new();
        let mut field: PersistedField<Vec<String>> = PersistedField::json("probes", "OTG.probes");
        field.persist(&store, vec!["p1".into()]).unwrap();
        assert_eq!(store.len(), 1);

        field.change_and_persist(&store, None).unwrap();
        assert!(store.is_empty());
        assert_eq!(field.load(&store), LoadOutcome::Absent);
        assert_eq!(field.value(), None);
        assert!(field.value_or_default().is_empty());
    }

    #[test]
    fn test_change_hook_sees_every_change() {
        let store = MemoryStore::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let mut field: PersistedField<bool> = PersistedField::json("guide", "OTG.guide")
            .with_change_hook(move |v| sink.borrow_mut().push(v.copied()));

        // Absent entries load silently
        field.load(&store);
        field.change_and_persist(&store, Some(true)).unwrap();
        field.persist(&store, false).unwrap();
        field.load(&store);

        assert_eq!(*seen.borrow(), vec![Some(true), Some(false)]);
    }

    #[test]
    fn test_corrupt_entry_recovers_and_heals() {
        let store = MemoryStore::new();
        store.set("OTG.compounds", "{not json").unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let mut field: PersistedField<Vec<String>> =
            PersistedField::json("compounds", "OTG.compounds").with_change_hook(
                move |v: Option<&Vec<String>>| sink.borrow_mut().push(v.cloned()),
            );

        assert_eq!(field.load(&store), LoadOutcome::Recovered);
        assert_eq!(field.value(), Some(&Vec::new()));
        assert_eq!(store.get("OTG.compounds").unwrap(), r#"{"v":1,"data":[]}"#);
        assert_eq!(*seen.borrow(), vec![Some(Vec::new())]);

        assert_eq!(field.load(&store), LoadOutcome::Loaded);
    }

    #[test]
    fn test_corrupt_optional_entry_is_removed() {
        let store = MemoryStore::new();
        store.set("OTG.customColumn", r#"{"v":9,"data":null}"#).unwrap();
        let mut field: PersistedField<shared::Column> =
            PersistedField::json_optional("customColumn", "OTG.customColumn");

        assert_eq!(field.load(&store), LoadOutcome::Recovered);
        assert_eq!(field.value(), None);
        assert!(store.get("OTG.customColumn").is_none());
    }

    #[test]
    fn test_legacy_item_lists_are_migrated() {
        let store = MemoryStore::new();
        store
            .set(
                "OTG.lists",
                "probes:::liver set:::p1^^^p2###genes:::old:::x###compounds:::mine:::aspirin",
            )
            .unwrap();
        let mut field: PersistedField<Vec<ItemList>> =
            PersistedField::with_codec("lists", "OTG.lists", ItemListsCodec, || Some(Vec::new()));

        assert_eq!(field.load(&store), LoadOutcome::Migrated);
        let lists = field.value().unwrap();
        assert_eq!(lists.len(), 2);
        assert_eq!(lists[0].list_type, ItemListType::Probes);
        assert_eq!(lists[0].items, vec!["p1", "p2"]);
        assert_eq!(lists[1].name, "mine");

        assert!(store.get("OTG.lists").unwrap().starts_with(r#"{"v":1"#));
        assert_eq!(field.load(&store), LoadOutcome::Loaded);
    }
}
