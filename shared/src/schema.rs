use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sample::{Attribute, SampleClass};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueType {
    #[default]
    Folds,
    Absolute,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Invalid parameter (not sortable): {0}")]
    NotSortable(&'static str),
}

/// Describes how sample attributes are organised for a particular kind of dataset.
pub trait DataSchema {
    /// The attribute that identifies the treatment, e.g. the compound.
    fn major_parameter(&self) -> Attribute;
    fn medium_parameter(&self) -> Attribute;
    fn minor_parameter(&self) -> Attribute;
    fn time_parameter(&self) -> Attribute;
    fn time_group_parameter(&self) -> Attribute;

    /// Attributes that must agree for samples to be shown side by side.
    fn macro_parameters(&self) -> &'static [Attribute];

    /// Values of a sortable attribute in their natural order.
    fn sorted_values(&self, attribute: Attribute) -> Result<&'static [&'static str], SchemaError>;

    fn is_control_value(&self, value: &str) -> bool;

    fn is_major_param_shared_control(&self, value: &str) -> bool;

    fn is_selection_control(&self, sc: &SampleClass) -> bool {
        sc.get(self.medium_parameter())
            .is_some_and(|v| self.is_control_value(v))
    }

    fn title(&self, attribute: Attribute) -> &'static str {
        attribute.title()
    }

    /// Sort values of `attribute` by the schema order. Unknown values go last.
    fn sort(&self, attribute: Attribute, values: &mut [String]) -> Result<(), SchemaError> {
        let order = self.sorted_values(attribute)?;
        values.sort_by_key(|v| order.iter().position(|o| o == v).unwrap_or(order.len()));
        Ok(())
    }

    /// Hides control doses when fold values are displayed.
    fn filter_values_for_display(
        &self,
        value_type: Option<ValueType>,
        attribute: Attribute,
        from: &[String],
    ) -> Vec<String> {
        let hide_controls = attribute == self.medium_parameter()
            && matches!(value_type, None | Some(ValueType::Folds));
        from.iter()
            .filter(|v| !(hide_controls && self.is_control_value(v)))
            .cloned()
            .collect()
    }

    fn as_macro_class(&self, sc: &SampleClass) -> SampleClass {
        sc.copy_only(self.macro_parameters())
    }

    fn as_unit_class(&self, sc: &SampleClass) -> SampleClass {
        let mut keys: Vec<Attribute> = self.macro_parameters().to_vec();
        keys.push(self.major_parameter());
        keys.push(self.medium_parameter());
        keys.push(self.minor_parameter());
        sc.copy_only(&keys)
    }

    fn label(&self, sc: &SampleClass) -> String {
        self.macro_parameters()
            .iter()
            .map(|a| format!("{}/", sc.get(*a).unwrap_or("")))
            .collect()
    }

    fn triple_string(&self, sc: &SampleClass) -> String {
        let get = |a: Attribute| sc.get(a).unwrap_or("").to_string();
        format!(
            "{}/{}/{}",
            get(self.major_parameter()),
            get(self.medium_parameter()),
            get(self.minor_parameter())
        )
    }
}

/// Schema of the Open TG-GATEs toxicogenomics data.
#[derive(Debug, Clone, Copy, Default)]
pub struct OtgSchema;

impl OtgSchema {
    pub const ALL_TIMES: [&'static str; 10] = [
        "2 hr", "3 hr", "6 hr", "8 hr", "9 hr", "24 hr", "4 day", "8 day", "15 day", "29 day",
    ];
    pub const ALL_DOSES: [&'static str; 4] = ["Control", "Low", "Middle", "High"];
    const MACRO_PARAMETERS: [Attribute; 4] = [
        Attribute::Organism,
        Attribute::TestType,
        Attribute::OrganId,
        Attribute::SinRepType,
    ];

    /// Number of points in a time or dose series for this class.
    pub fn num_data_points_in_series(&self, sc: &SampleClass) -> usize {
        if sc.get(Attribute::TestType) == Some("in vitro") { 3 } else { 4 }
    }

    pub fn platform_organism(&self, platform: &str) -> Option<&'static str> {
        if platform.starts_with("HG") {
            Some("Human")
        } else if platform.starts_with("Rat") {
            Some("Rat")
        } else if platform.starts_with("Mouse") {
            Some("Mouse")
        } else {
            None
        }
    }
}

impl DataSchema for OtgSchema {
    fn major_parameter(&self) -> Attribute {
        Attribute::CompoundName
    }

    fn medium_parameter(&self) -> Attribute {
        Attribute::DoseLevel
    }

    fn minor_parameter(&self) -> Attribute {
        Attribute::ExposureTime
    }

    fn time_parameter(&self) -> Attribute {
        Attribute::ExposureTime
    }

    fn time_group_parameter(&self) -> Attribute {
        Attribute::DoseLevel
    }

    fn macro_parameters(&self) -> &'static [Attribute] {
        &Self::MACRO_PARAMETERS
    }

    fn sorted_values(&self, attribute: Attribute) -> Result<&'static [&'static str], SchemaError> {
        match attribute {
            Attribute::ExposureTime => Ok(&Self::ALL_TIMES),
            Attribute::DoseLevel => Ok(&Self::ALL_DOSES),
            other => Err(SchemaError::NotSortable(other.id())),
        }
    }

    fn is_control_value(&self, value: &str) -> bool {
        value == "Control"
    }

    fn is_major_param_shared_control(&self, value: &str) -> bool {
        value.to_lowercase().starts_with("shared_control")
    }
}
