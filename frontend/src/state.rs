//! The user's current selections and the signals that change them

use std::collections::BTreeSet;

use shared::{Column, DataSchema, DatasetId, Group, ItemList, SampleClass, ValueType};

/// Change notification flowing through the listener tree.
#[derive(Debug, Clone, PartialEq)]
pub enum DataSignal {
    Datasets(BTreeSet<DatasetId>),
    SampleClass(SampleClass),
    Compounds(Vec<String>),
    /// The authoritative compound list for the current sample class.
    /// Informational: it does not change any chosen state.
    AvailableCompounds(Vec<String>),
    /// The single compound a view focuses on, e.g. a ranking chart.
    Compound(Option<String>),
    ValueType(ValueType),
    Columns(Vec<Group>),
    CustomColumn(Option<Column>),
    Probes(Vec<String>),
    ItemLists(Vec<ItemList>),
}

impl DataSignal {
    pub fn name(&self) -> &'static str {
        match self {
            DataSignal::Datasets(_) => "datasets",
            DataSignal::SampleClass(_) => "sampleClass",
            DataSignal::Compounds(_) => "compounds",
            DataSignal::AvailableCompounds(_) => "availableCompounds",
            DataSignal::Compound(_) => "compound",
            DataSignal::ValueType(_) => "valueType",
            DataSignal::Columns(_) => "columns",
            DataSignal::CustomColumn(_) => "customColumn",
            DataSignal::Probes(_) => "probes",
            DataSignal::ItemLists(_) => "itemLists",
        }
    }
}

/// Local copy of the chosen state, held by every listener.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChosenState {
    pub datasets: BTreeSet<DatasetId>,
    pub sample_class: SampleClass,
    pub compounds: Vec<String>,
    pub compound: Option<String>,
    pub value_type: ValueType,
    pub columns: Vec<Group>,
    pub custom_column: Option<Column>,
    pub probes: Vec<String>,
    pub item_lists: Vec<ItemList>,
}

impl ChosenState {
    /// Update the field `signal` refers to.
    pub fn apply(&mut self, signal: &DataSignal) {
        match signal {
            DataSignal::Datasets(ds) => self.datasets = ds.clone(),
            DataSignal::SampleClass(sc) => self.sample_class = sc.clone(),
            DataSignal::Compounds(c) => self.compounds = dedup(c),
            DataSignal::AvailableCompounds(_) => {}
            DataSignal::Compound(compound) => self.compound = compound.clone(),
            DataSignal::ValueType(value_type) => self.value_type = *value_type,
            DataSignal::Columns(groups) => self.columns = groups.clone(),
            DataSignal::CustomColumn(column) => self.custom_column = column.clone(),
            DataSignal::Probes(p) => self.probes = p.clone(),
            DataSignal::ItemLists(lists) => self.item_lists = lists.clone(),
        }
    }

    /// Signals that reproduce this state in another listener, in dependency order.
    pub fn replay(&self) -> Vec<DataSignal> {
        vec![
            DataSignal::Datasets(self.datasets.clone()),
            DataSignal::SampleClass(self.sample_class.clone()),
            DataSignal::Probes(self.probes.clone()),
            DataSignal::Compounds(self.compounds.clone()),
            DataSignal::Compound(self.compound.clone()),
            DataSignal::ValueType(self.value_type),
            DataSignal::Columns(self.columns.clone()),
            DataSignal::CustomColumn(self.custom_column.clone()),
            DataSignal::ItemLists(self.item_lists.clone()),
        ]
    }

    /// Signals for every field of `other` that differs from this state.
    pub fn diff(&self, other: &ChosenState) -> Vec<DataSignal> {
        other
            .replay()
            .into_iter()
            .filter(|signal| {
                let mut updated = self.clone();
                updated.apply(signal);
                updated != *self
            })
            .collect()
    }

    /// Drop chosen groups that no longer fit the chosen sample class.
    /// Returns the removed groups.
    pub fn retain_compatible_columns(&mut self, schema: &dyn DataSchema) -> Vec<Group> {
        let (kept, dropped): (Vec<Group>, Vec<Group>) = self
            .columns
            .drain(..)
            .partition(|g| g.compatible_with(&self.sample_class, schema));
        self.columns = kept;
        dropped
    }

    pub fn all_samples(&self) -> impl Iterator<Item = &shared::Sample> {
        self.columns.iter().flat_map(|g| g.samples.iter())
    }
}

fn dedup(items: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    items
        .iter()
        .filter(|item| seen.insert(item.as_str()))
        .cloned()
        .collect()
}
