//! Viewer state persisted in the client-side store
//!
//! Every piece of chosen state survives a page reload through one
//! [`PersistedField`] under `<prefix>.<name>`. The setters here are the only
//! write path; failures to write are returned so callers can surface them.

use futures_signals::signal::{Mutable, Signal};
use std::collections::BTreeSet;
use std::rc::Rc;

use shared::{Column, DatasetId, Group, ItemList, SampleClass, StorageSection, ValueType};

use crate::dataflow::{ItemListsCodec, KeyValueStore, LoadOutcome, PersistedField, StorageError};
use crate::state::ChosenState;

pub struct ViewerStorage {
    store: Rc<dyn KeyValueStore>,
    pub datasets: PersistedField<BTreeSet<DatasetId>>,
    pub sample_class: PersistedField<SampleClass>,
    pub compounds: PersistedField<Vec<String>>,
    pub compound: PersistedField<String>,
    pub value_type: PersistedField<ValueType>,
    pub columns: PersistedField<Vec<Group>>,
    pub custom_column: PersistedField<Column>,
    pub probes: PersistedField<Vec<String>>,
    pub item_lists: PersistedField<Vec<ItemList>>,
    pub show_guide: PersistedField<bool>,
    guide_visible: Mutable<bool>,
}

impl ViewerStorage {
    pub fn new(section: &StorageSection, store: Rc<dyn KeyValueStore>) -> Self {
        let key = |name: &str| format!("{}.{}", section.prefix, name);
        let guide_visible = Mutable::new(true);
        let guide_sink = guide_visible.clone();
        Self {
            store,
            datasets: PersistedField::json("datasets", key("datasets")),
            sample_class: PersistedField::json("sampleClass", key("sampleClass")),
            compounds: PersistedField::json("compounds", key("compounds")),
            compound: PersistedField::json_optional("compound", key("compound")),
            value_type: PersistedField::json("valueType", key("valueType")),
            columns: PersistedField::json("columns", key("columns")),
            custom_column: PersistedField::json_optional("customColumn", key("customColumn")),
            probes: PersistedField::json("probes", key("probes")),
            item_lists: PersistedField::with_codec(
                "itemLists",
                key("itemLists"),
                ItemListsCodec,
                || Some(Vec::new()),
            ),
            show_guide: PersistedField::json("showGuide", key("showGuide"))
                .with_change_hook(move |show: Option<&bool>| {
                    guide_sink.set_neq(show.copied().unwrap_or(true));
                }),
            guide_visible,
        }
    }

    pub fn store(&self) -> Rc<dyn KeyValueStore> {
        self.store.clone()
    }

    /// Reload every field from the store.
    pub fn load_all(&mut self) -> Vec<(&'static str, LoadOutcome)> {
        let store = self.store.clone();
        let store = store.as_ref();
        vec![
            ("datasets", self.datasets.load(store)),
            ("sampleClass", self.sample_class.load(store)),
            ("compounds", self.compounds.load(store)),
            ("compound", self.compound.load(store)),
            ("valueType", self.value_type.load(store)),
            ("columns", self.columns.load(store)),
            ("customColumn", self.custom_column.load(store)),
            ("probes", self.probes.load(store)),
            ("itemLists", self.item_lists.load(store)),
            ("showGuide", self.show_guide.load(store)),
        ]
    }

    /// The chosen state as currently held by the fields; absent values are empty.
    pub fn chosen_state(&self) -> ChosenState {
        ChosenState {
            datasets: self.datasets.value_or_default(),
            sample_class: self.sample_class.value_or_default(),
            compounds: self.compounds.value_or_default(),
            compound: self.compound.value().cloned(),
            value_type: self.value_type.value_or_default(),
            columns: self.columns.value_or_default(),
            custom_column: self.custom_column.value().cloned(),
            probes: self.probes.value_or_default(),
            item_lists: self.item_lists.value_or_default(),
        }
    }

    pub fn set_datasets(&mut self, datasets: BTreeSet<DatasetId>) -> Result<(), StorageError> {
        let store = self.store.clone();
        self.datasets.persist(store.as_ref(), datasets)
    }

    pub fn set_sample_class(&mut self, sample_class: SampleClass) -> Result<(), StorageError> {
        let store = self.store.clone();
        self.sample_class.persist(store.as_ref(), sample_class)
    }

    pub fn set_compounds(&mut self, compounds: Vec<String>) -> Result<(), StorageError> {
        let store = self.store.clone();
        self.compounds.persist(store.as_ref(), compounds)
    }

    pub fn set_compound(&mut self, compound: Option<String>) -> Result<(), StorageError> {
        let store = self.store.clone();
        self.compound.change_and_persist(store.as_ref(), compound)
    }

    pub fn set_value_type(&mut self, value_type: ValueType) -> Result<(), StorageError> {
        let store = self.store.clone();
        self.value_type.persist(store.as_ref(), value_type)
    }

    pub fn set_columns(&mut self, columns: Vec<Group>) -> Result<(), StorageError> {
        let store = self.store.clone();
        self.columns.persist(store.as_ref(), columns)
    }

    pub fn set_custom_column(&mut self, column: Option<Column>) -> Result<(), StorageError> {
        let store = self.store.clone();
        self.custom_column.change_and_persist(store.as_ref(), column)
    }

    pub fn set_probes(&mut self, probes: Vec<String>) -> Result<(), StorageError> {
        let store = self.store.clone();
        self.probes.persist(store.as_ref(), probes)
    }

    pub fn set_item_lists(&mut self, lists: Vec<ItemList>) -> Result<(), StorageError> {
        let store = self.store.clone();
        self.item_lists.persist(store.as_ref(), lists)
    }

    pub fn set_show_guide(&mut self, show: bool) -> Result<(), StorageError> {
        let store = self.store.clone();
        self.show_guide.change_and_persist(store.as_ref(), Some(show))
    }

    pub fn guide_visible(&self) -> bool {
        self.guide_visible.get()
    }

    pub fn guide_visible_signal(&self) -> impl Signal<Item = bool> + use<> {
        self.guide_visible.signal()
    }

    /// Remove every stored entry and forget the held values.
    pub fn clear_all(&mut self) -> Result<(), StorageError> {
        let store = self.store.clone();
        let store = store.as_ref();
        self.datasets.clear(store)?;
        self.sample_class.clear(store)?;
        self.compounds.clear(store)?;
        self.compound.clear(store)?;
        self.value_type.clear(store)?;
        self.columns.clear(store)?;
        self.custom_column.clear(store)?;
        self.probes.clear(store)?;
        self.item_lists.clear(store)?;
        self.show_guide.clear(store)?;
        log::info!("Cleared all stored viewer state");
        Ok(())
    }
}
