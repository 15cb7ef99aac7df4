//! Scripted sample service for tests
//!
//! Records every call together with its reply slot so a test can resolve the
//! replies in any order it likes.

use std::cell::RefCell;
use std::collections::BTreeSet;

use shared::{Attribute, DatasetId, Sample, SampleClass};

use super::{Reply, SampleService, ServiceError};

#[derive(Default)]
pub struct ScriptedService {
    pub dataset_calls: RefCell<Vec<(BTreeSet<DatasetId>, Reply<Vec<SampleClass>>)>>,
    pub parameter_calls: RefCell<Vec<(SampleClass, Attribute, Reply<Vec<String>>)>>,
    pub sample_calls: RefCell<Vec<Reply<Vec<Sample>>>>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dataset_call_count(&self) -> usize {
        self.dataset_calls.borrow().len()
    }

    pub fn parameter_call_count(&self) -> usize {
        self.parameter_calls.borrow().len()
    }

    pub fn last_parameter_class(&self) -> Option<SampleClass> {
        self.parameter_calls.borrow().last().map(|(sc, _, _)| sc.clone())
    }

    /// The reply slot is cloned out first so resolution may trigger new calls.
    pub fn answer_datasets(&self, index: usize, classes: Vec<SampleClass>) {
        let reply = self.dataset_calls.borrow()[index].1.clone();
        reply.resolve_success(classes).unwrap();
    }

    pub fn fail_datasets(&self, index: usize, message: &str) {
        let reply = self.dataset_calls.borrow()[index].1.clone();
        reply
            .resolve_failure(ServiceError::Server(message.to_string()))
            .unwrap();
    }

    pub fn answer_parameters(&self, index: usize, values: &[&str]) {
        let reply = self.parameter_calls.borrow()[index].2.clone();
        reply
            .resolve_success(values.iter().map(|v| v.to_string()).collect())
            .unwrap();
    }

    pub fn fail_parameters(&self, index: usize, message: &str) {
        let reply = self.parameter_calls.borrow()[index].2.clone();
        reply
            .resolve_failure(ServiceError::Transport(message.to_string()))
            .unwrap();
    }
}

impl SampleService for ScriptedService {
    fn choose_datasets(&self, datasets: &BTreeSet<DatasetId>, reply: Reply<Vec<SampleClass>>) {
        self.dataset_calls
            .borrow_mut()
            .push((datasets.clone(), reply));
    }

    fn parameter_values(
        &self,
        sample_class: &SampleClass,
        parameter: Attribute,
        reply: Reply<Vec<String>>,
    ) {
        self.parameter_calls
            .borrow_mut()
            .push((sample_class.clone(), parameter, reply));
    }

    fn samples_by_id(&self, _ids: &[String], reply: Reply<Vec<Sample>>) {
        self.sample_calls.borrow_mut().push(reply);
    }

    fn samples(&self, _sample_class: &SampleClass, reply: Reply<Vec<Sample>>) {
        self.sample_calls.borrow_mut().push(reply);
    }
}
