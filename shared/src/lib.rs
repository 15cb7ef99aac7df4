//! Domain vocabulary shared between the Toxygates viewer frontend and its services:
//! sample classes, datasets, groups, item lists, data schemas, units and viewer config.

pub mod config;
pub mod sample;
pub mod schema;
pub mod units;

pub use config::{
    AppSection, ConfigError, LoadingSection, MigrationStrategy, StorageSection, UiSection,
    ViewerConfig,
};
pub use sample::{
    Attribute, Column, Dataset, DatasetId, Group, GroupColors, HasClass, ItemList, ItemListType,
    ParameterValue, Sample, SampleClass, collect_inner, filter_compatible,
};
pub use schema::{DataSchema, OtgSchema, SchemaError, ValueType};
pub use units::{Unit, collect_samples, form_units, units_contain};

// ===== UTILITY FUNCTIONS =====

/// Keep the members of `chosen` that also occur in `valid`, preserving the order of `chosen`.
pub fn filter_by_membership(chosen: &[String], valid: &[String]) -> Vec<String> {
    let valid: std::collections::HashSet<&str> = valid.iter().map(String::as_str).collect();
    chosen
        .iter()
        .filter(|c| valid.contains(c.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_by_membership_keeps_chosen_order() {
        let chosen: Vec<String> = ["C", "A", "B"].iter().map(|s| s.to_string()).collect();
        let valid: Vec<String> = ["B", "C", "D"].iter().map(|s| s.to_string()).collect();
        assert_eq!(filter_by_membership(&chosen, &valid), vec!["C", "B"]);
    }
}
