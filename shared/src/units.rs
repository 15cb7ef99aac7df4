use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::sample::{Attribute, HasClass, ParameterValue, Sample, SampleClass};
use crate::schema::DataSchema;

const CONCATENATION_SEPARATOR: &str = " / ";

/// Aggregated representative of all samples sharing one unit class
/// (macro parameters plus major/medium/minor).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Unit {
    pub sample_class: SampleClass,
    pub samples: Vec<Sample>,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterValue>,
}

impl HasClass for Unit {
    fn sample_class(&self) -> &SampleClass {
        &self.sample_class
    }
}

impl Unit {
    pub fn new(sample_class: SampleClass, samples: Vec<Sample>) -> Self {
        Self {
            sample_class,
            samples,
            parameters: BTreeMap::new(),
        }
    }

    /// Fill in aggregate values for every parameter carried by any sample.
    /// Existing values are kept unless `overwrite` is set.
    pub fn compute_parameters(&mut self, overwrite: bool) {
        let keys: BTreeSet<String> = self
            .samples
            .iter()
            .flat_map(|s| s.parameters.keys().cloned())
            .collect();
        for key in keys {
            if !overwrite && self.parameters.contains_key(&key) {
                continue;
            }
            let numerical = self
                .samples
                .iter()
                .any(|s| matches!(s.parameters.get(&key), Some(ParameterValue::Numerical(_))));
            if numerical {
                self.average_parameter(&key);
            } else {
                self.concatenate_parameter(&key);
            }
        }
    }

    /// Mean of the numerical values of `key`. Text values are skipped.
    pub fn average_parameter(&mut self, key: &str) {
        let values: Vec<f64> = self
            .samples
            .iter()
            .filter_map(|s| match s.parameters.get(key) {
                Some(ParameterValue::Numerical(n)) => Some(*n),
                _ => None,
            })
            .collect();
        if !values.is_empty() {
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            self.parameters
                .insert(key.to_string(), ParameterValue::Numerical(mean));
        }
    }

    /// Distinct values of `key`, joined in first-seen order.
    pub fn concatenate_parameter(&mut self, key: &str) {
        let mut distinct: Vec<String> = Vec::new();
        for sample in &self.samples {
            if let Some(value) = sample.parameters.get(key) {
                let value = value.to_string();
                if !distinct.contains(&value) {
                    distinct.push(value);
                }
            }
        }
        if !distinct.is_empty() {
            self.parameters.insert(
                key.to_string(),
                ParameterValue::Text(distinct.join(CONCATENATION_SEPARATOR)),
            );
        }
    }
}

/// Group samples into units by their unit class. Units come out ordered by class.
pub fn form_units(schema: &dyn DataSchema, samples: &[Sample]) -> Vec<Unit> {
    let mut groups: BTreeMap<SampleClass, Vec<Sample>> = BTreeMap::new();
    for sample in samples {
        groups
            .entry(schema.as_unit_class(&sample.sample_class))
            .or_default()
            .push(sample.clone());
    }
    groups
        .into_iter()
        .map(|(sc, samples)| Unit::new(sc, samples))
        .collect()
}

pub fn collect_samples(units: &[Unit]) -> Vec<Sample> {
    units.iter().flat_map(|u| u.samples.iter().cloned()).collect()
}

pub fn units_contain(units: &[Unit], attribute: Attribute, value: &str) -> bool {
    units
        .iter()
        .any(|u| u.sample_class.get(attribute) == Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::OtgSchema;

    fn sample(id: &str, compound: &str, dose: &str) -> Sample {
        Sample::new(
            id,
            SampleClass::new()
                .with(Attribute::Organism, "Rat")
                .with(Attribute::CompoundName, compound)
                .with(Attribute::DoseLevel, dose)
                .with(Attribute::ExposureTime, "24 hr")
                .with(Attribute::Platform, "Rat230_2"),
        )
    }

    #[test]
    fn test_form_units_groups_by_unit_class() {
        let samples = vec![
            sample("s1", "aspirin", "High"),
            sample("s2", "aspirin", "High"),
            sample("s3", "aspirin", "Low"),
        ];
        let units = form_units(&OtgSchema, &samples);
        assert_eq!(units.len(), 2);
        let high = units
            .iter()
            .find(|u| u.sample_class.get(Attribute::DoseLevel) == Some("High"))
            .unwrap();
        assert_eq!(high.samples.len(), 2);
        assert!(!high.sample_class.contains(Attribute::Platform));
        assert_eq!(collect_samples(&units).len(), 3);
        assert!(units_contain(&units, Attribute::DoseLevel, "Low"));
    }

    #[test]
    fn test_compute_parameters_averages_and_concatenates() {
        let s1 = sample("s1", "a", "High")
            .with_parameter("liver_wt", ParameterValue::Numerical(2.0))
            .with_parameter("pathology", ParameterValue::Text("necrosis".into()));
        let s2 = sample("s2", "a", "High")
            .with_parameter("liver_wt", ParameterValue::Numerical(4.0))
            .with_parameter("pathology", ParameterValue::Text("hypertrophy".into()));
        let s3 = sample("s3", "a", "High")
            .with_parameter("liver_wt", ParameterValue::Text("n/a".into()))
            .with_parameter("pathology", ParameterValue::Text("necrosis".into()));

        let mut unit = Unit::new(SampleClass::new(), vec![s1, s2, s3]);
        unit.compute_parameters(false);
        assert_eq!(
            unit.parameters.get("liver_wt"),
            Some(&ParameterValue::Numerical(3.0))
        );
        assert_eq!(
            unit.parameters.get("pathology"),
            Some(&ParameterValue::Text("necrosis / hypertrophy".into()))
        );
    }
}
