use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::schema::DataSchema;

// ===== ATTRIBUTE VOCABULARY =====

/// The fixed vocabulary of experimental attributes a `SampleClass` can constrain.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    Organism,
    TestType,
    OrganId,
    SinRepType,
    CompoundName,
    DoseLevel,
    ExposureTime,
    Platform,
}

impl Attribute {
    pub const ALL: [Attribute; 8] = [
        Attribute::Organism,
        Attribute::TestType,
        Attribute::OrganId,
        Attribute::SinRepType,
        Attribute::CompoundName,
        Attribute::DoseLevel,
        Attribute::ExposureTime,
        Attribute::Platform,
    ];

    /// Internal ID, as used by the sample service
    pub fn id(&self) -> &'static str {
        match self {
            Attribute::Organism => "organism",
            Attribute::TestType => "test_type",
            Attribute::OrganId => "organ_id",
            Attribute::SinRepType => "sin_rep_type",
            Attribute::CompoundName => "compound_name",
            Attribute::DoseLevel => "dose_level",
            Attribute::ExposureTime => "exposure_time",
            Attribute::Platform => "platform_id",
        }
    }

    /// Human-readable title
    pub fn title(&self) -> &'static str {
        match self {
            Attribute::Organism => "Organism",
            Attribute::TestType => "Test type",
            Attribute::OrganId => "Organ",
            Attribute::SinRepType => "Repeat type",
            Attribute::CompoundName => "Compound",
            Attribute::DoseLevel => "Dose",
            Attribute::ExposureTime => "Time",
            Attribute::Platform => "Platform",
        }
    }

    pub fn from_id(id: &str) -> Option<Attribute> {
        Self::ALL.iter().copied().find(|a| a.id() == id)
    }
}

// ===== SAMPLE CLASS =====

/// A key/value constraint over the attribute vocabulary identifying a category of samples.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct SampleClass(BTreeMap<Attribute, String>);

impl SampleClass {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, attribute: Attribute, value: impl Into<String>) -> Self {
        self.put(attribute, value);
        self
    }

    pub fn get(&self, attribute: Attribute) -> Option<&str> {
        self.0.get(&attribute).map(String::as_str)
    }

    pub fn put(&mut self, attribute: Attribute, value: impl Into<String>) {
        self.0.insert(attribute, value.into());
    }

    pub fn remove(&mut self, attribute: Attribute) -> Option<String> {
        self.0.remove(&attribute)
    }

    pub fn contains(&self, attribute: Attribute) -> bool {
        self.0.contains_key(&attribute)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Attribute, &str)> {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// A copy restricted to the given keys.
    pub fn copy_only(&self, keys: &[Attribute]) -> SampleClass {
        SampleClass(
            self.0
                .iter()
                .filter(|(k, _)| keys.contains(k))
                .map(|(k, v)| (*k, v.clone()))
                .collect(),
        )
    }

    /// True if every attribute constrained by both classes has the same value in each.
    pub fn compatible(&self, other: &SampleClass) -> bool {
        self.0
            .iter()
            .all(|(k, v)| other.0.get(k).is_none_or(|ov| ov == v))
    }

    /// Compatible, and `other` constrains every attribute that `self` does.
    pub fn strict_compatible(&self, other: &SampleClass) -> bool {
        self.0.iter().all(|(k, v)| other.0.get(k) == Some(v))
    }

    /// Number of attributes on which the two classes agree.
    pub fn agreement(&self, other: &SampleClass) -> usize {
        self.0
            .iter()
            .filter(|(k, v)| other.0.get(k) == Some(v))
            .count()
    }
}

impl fmt::Display for SampleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(k, v)| format!("{}={}", k.id(), v))
            .collect();
        write!(f, "SampleClass({})", parts.join(", "))
    }
}

impl FromIterator<(Attribute, String)> for SampleClass {
    fn from_iter<I: IntoIterator<Item = (Attribute, String)>>(iter: I) -> Self {
        SampleClass(iter.into_iter().collect())
    }
}

/// Anything that carries a sample class.
pub trait HasClass {
    fn sample_class(&self) -> &SampleClass;
}

/// Items whose class is compatible with `sc`, in their original order.
pub fn filter_compatible<'a, T: HasClass>(sc: &SampleClass, from: &'a [T]) -> Vec<&'a T> {
    from.iter()
        .filter(|item| sc.compatible(item.sample_class()))
        .collect()
}

/// Distinct values of `key` over the given items, in first-seen order.
pub fn collect_inner<'a, T: HasClass + 'a>(
    from: impl IntoIterator<Item = &'a T>,
    key: Attribute,
) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut values = Vec::new();
    for item in from {
        if let Some(v) = item.sample_class().get(key) {
            if seen.insert(v.to_string()) {
                values.push(v.to_string());
            }
        }
    }
    values
}

// ===== DATASETS =====

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct DatasetId(pub String);

impl DatasetId {
    pub fn new(id: impl Into<String>) -> Self {
        DatasetId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    pub id: DatasetId,
    pub title: String,
    pub description: String,
}

// ===== SAMPLES =====

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ParameterValue {
    Numerical(f64),
    Text(String),
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Numerical(n) => write!(f, "{}", n),
            ParameterValue::Text(s) => f.write_str(s),
        }
    }
}

/// A single microarray sample (a "barcode").
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Sample {
    pub id: String,
    pub sample_class: SampleClass,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterValue>,
}

impl Sample {
    pub fn new(id: impl Into<String>, sample_class: SampleClass) -> Self {
        Self {
            id: id.into(),
            sample_class,
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: ParameterValue) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }
}

impl HasClass for Sample {
    fn sample_class(&self) -> &SampleClass {
        &self.sample_class
    }
}

// ===== GROUPS AND COLUMNS =====

/// A named, colored set of samples, displayed as one column of the expression table.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Group {
    pub name: String,
    pub color: String,
    pub samples: Vec<Sample>,
}

impl Group {
    pub fn new(name: impl Into<String>, samples: Vec<Sample>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
            samples,
        }
    }

    pub fn contains_sample(&self, sample_id: &str) -> bool {
        self.samples.iter().any(|s| s.id == sample_id)
    }

    /// Distinct values of `attribute` across the group's samples.
    pub fn collect(&self, attribute: Attribute) -> Vec<String> {
        collect_inner(&self.samples, attribute)
    }

    /// A group fits a sample class when every sample agrees with it on the schema's
    /// macro parameters.
    pub fn compatible_with(&self, sc: &SampleClass, schema: &dyn DataSchema) -> bool {
        let macro_class = schema.as_macro_class(sc);
        self.samples
            .iter()
            .all(|s| macro_class.compatible(&schema.as_macro_class(&s.sample_class)))
    }

    /// Short description of the major/medium/minor triples in this group, at most `limit`
    /// entries (or all of them if `limit` is `None`).
    pub fn triples(
        &self,
        schema: &dyn DataSchema,
        limit: Option<usize>,
        separator: &str,
    ) -> String {
        let mut triples: Vec<String> = Vec::new();
        for sample in &self.samples {
            let t = schema.triple_string(&sample.sample_class);
            if !triples.contains(&t) {
                triples.push(t);
            }
        }
        match limit {
            Some(n) if triples.len() > n => {
                let mut s = triples[..n].join(separator);
                s.push_str(separator);
                s.push_str("...");
                s
            }
            _ => triples.join(separator),
        }
    }
}

/// Picks group colors from a palette in round-robin order.
#[derive(Debug, Clone)]
pub struct GroupColors {
    palette: Vec<String>,
    next: usize,
}

impl GroupColors {
    pub fn new(palette: Vec<String>) -> Self {
        Self { palette, next: 0 }
    }

    pub fn pick(&mut self) -> String {
        if self.palette.is_empty() {
            return "#FF7300".to_string();
        }
        let color = self.palette[self.next % self.palette.len()].clone();
        self.next = (self.next + 1) % self.palette.len();
        color
    }

    pub fn index_of(&self, color: &str) -> Option<usize> {
        self.palette.iter().position(|c| c == color)
    }
}

/// A displayable data column: either a whole group or a single sample.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", content = "column", rename_all = "snake_case")]
pub enum Column {
    Group(Group),
    Sample(Sample),
}

impl Column {
    pub fn short_title(&self) -> &str {
        match self {
            Column::Group(g) => &g.name,
            Column::Sample(s) => &s.id,
        }
    }

    pub fn samples(&self) -> &[Sample] {
        match self {
            Column::Group(g) => &g.samples,
            Column::Sample(s) => std::slice::from_ref(s),
        }
    }
}

// ===== ITEM LISTS =====

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ItemListType {
    Probes,
    Compounds,
}

impl ItemListType {
    pub fn id(&self) -> &'static str {
        match self {
            ItemListType::Probes => "probes",
            ItemListType::Compounds => "compounds",
        }
    }

    pub fn from_id(id: &str) -> Option<ItemListType> {
        match id {
            "probes" => Some(ItemListType::Probes),
            "compounds" => Some(ItemListType::Compounds),
            _ => None,
        }
    }
}

/// A typed, named list of items. Probe lists may actually hold gene identifiers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ItemList {
    pub list_type: ItemListType,
    pub name: String,
    pub items: Vec<String>,
}

impl ItemList {
    pub const LEGACY_FIELD_SEPARATOR: &'static str = ":::";
    pub const LEGACY_ITEM_SEPARATOR: &'static str = "^^^";

    pub fn new(list_type: ItemListType, name: impl Into<String>, items: Vec<String>) -> Self {
        Self {
            list_type,
            name: name.into(),
            items,
        }
    }

    pub fn size(&self) -> usize {
        self.items.len()
    }

    /// Parse the old `type:::name:::item^^^item` form. Lists of an unknown type are ignored.
    pub fn unpack_legacy(input: &str) -> Option<ItemList> {
        let fields: Vec<&str> = input.split(Self::LEGACY_FIELD_SEPARATOR).collect();
        if fields.len() < 3 {
            return None;
        }
        let list_type = ItemListType::from_id(fields[0])?;
        let items = fields[2]
            .split(Self::LEGACY_ITEM_SEPARATOR)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Some(ItemList::new(list_type, fields[1], items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::OtgSchema;

    fn rat_liver() -> SampleClass {
        SampleClass::new()
            .with(Attribute::Organism, "Rat")
            .with(Attribute::TestType, "in vivo")
            .with(Attribute::OrganId, "Liver")
            .with(Attribute::SinRepType, "Single")
    }

    #[test]
    fn test_compatibility_ignores_unshared_keys() {
        let sc = rat_liver();
        let narrower = rat_liver().with(Attribute::CompoundName, "acetaminophen");
        assert!(sc.compatible(&narrower));
        assert!(narrower.compatible(&sc));
        assert!(sc.strict_compatible(&narrower));
        assert!(!narrower.strict_compatible(&sc));

        let kidney = rat_liver().with(Attribute::OrganId, "Kidney");
        assert!(!sc.compatible(&kidney));
    }

    #[test]
    fn test_copy_only_keeps_requested_keys() {
        let sc = rat_liver().with(Attribute::DoseLevel, "High");
        let macro_only = sc.copy_only(&[Attribute::Organism, Attribute::DoseLevel]);
        assert_eq!(macro_only.len(), 2);
        assert_eq!(macro_only.get(Attribute::DoseLevel), Some("High"));
        assert_eq!(macro_only.get(Attribute::OrganId), None);
    }

    #[test]
    fn test_group_compatibility_uses_macro_parameters() {
        let schema = OtgSchema;
        let sample = Sample::new("s1", rat_liver().with(Attribute::CompoundName, "aspirin"));
        let group = Group::new("g", vec![sample], "#fff");

        // Differing compound is not a macro parameter
        let other_compound = rat_liver().with(Attribute::CompoundName, "caffeine");
        assert!(group.compatible_with(&other_compound, &schema));

        let human = rat_liver().with(Attribute::Organism, "Human");
        assert!(!group.compatible_with(&human, &schema));
    }

    #[test]
    fn test_group_colors_round_robin() {
        let mut colors = GroupColors::new(vec!["a".into(), "b".into()]);
        assert_eq!(colors.pick(), "a");
        assert_eq!(colors.pick(), "b");
        assert_eq!(colors.pick(), "a");
        assert_eq!(colors.index_of("b"), Some(1));
    }

    #[test]
    fn test_legacy_item_list_parsing() {
        let list = ItemList::unpack_legacy("compounds:::my list:::aspirin^^^caffeine").unwrap();
        assert_eq!(list.list_type, ItemListType::Compounds);
        assert_eq!(list.name, "my list");
        assert_eq!(list.items, vec!["aspirin", "caffeine"]);

        assert!(ItemList::unpack_legacy("genes:::x:::a").is_none());
        assert!(ItemList::unpack_legacy("probes:::missing items").is_none());
    }

    #[test]
    fn test_column_serialization_is_tagged() {
        let column = Column::Sample(Sample::new("003017629013", rat_liver()));
        let json = serde_json::to_string(&column).unwrap();
        assert!(json.contains("\"kind\":\"sample\""));
        let back: Column = serde_json::from_str(&json).unwrap();
        assert_eq!(back, column);
    }
}
