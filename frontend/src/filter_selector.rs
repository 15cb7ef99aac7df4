//! Dataset → sample class → compound loading
//!
//! [`FilterAndSelector`] coordinates the filter tools (dataset and sample class
//! choice) with the compound selector. Each step of a load produces a
//! [`Reply`]; a step is skipped by resolving its reply as bypassed when the
//! state it depends on has not changed, and later steps check
//! [`Outcome::actually_ran`] to decide whether they must run again.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use shared::{DataSchema, DatasetId, ItemList, SampleClass, filter_by_membership};

use crate::config::ViewerStorage;
use crate::dataflow::{Outcome, PendingRequests, Scheduler, StorageError};
use crate::error_display::{Alerts, ErrorAlert};
use crate::listeners::{DataView, ListenerTree, NodeId, ViewRef};
use crate::platform::{Reply, SampleService, begin_pending_request};
use crate::state::{ChosenState, DataSignal};

// ===== FILTER TOOLS =====

/// Dataset and sample class choice, limited to the classes the server
/// reported for the chosen datasets.
#[derive(Debug, Clone, Default)]
pub struct FilterTools {
    datasets: BTreeSet<DatasetId>,
    available: Vec<SampleClass>,
    showing: SampleClass,
}

impl FilterTools {
    pub fn set_datasets(&mut self, datasets: BTreeSet<DatasetId>) {
        if self.datasets != datasets {
            self.datasets = datasets;
            self.available.clear();
        }
    }

    pub fn datasets(&self) -> &BTreeSet<DatasetId> {
        &self.datasets
    }

    pub fn set_available(&mut self, classes: Vec<SampleClass>) {
        self.available = classes;
    }

    pub fn available(&self) -> &[SampleClass] {
        &self.available
    }

    /// Show `candidate`, or the available class that agrees with it on the most
    /// attributes if it is not available. Ties go to the first such class.
    pub fn set_sample_class(&mut self, candidate: &SampleClass) {
        if self.available.is_empty() || self.available.contains(candidate) {
            self.showing = candidate.clone();
            return;
        }
        let mut best: Option<(&SampleClass, usize)> = None;
        for sc in &self.available {
            let score = candidate.agreement(sc);
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((sc, score));
            }
        }
        if let Some((closest, _)) = best {
            log::info!("{} is not available, showing {} instead", candidate, closest);
            self.showing = closest.clone();
        }
    }

    pub fn current_sample_class_showing(&self) -> &SampleClass {
        &self.showing
    }
}

// ===== COMPOUND SELECTOR =====

#[derive(Debug, Clone, Default)]
pub struct CompoundSelector {
    all: Vec<String>,
    chosen: Vec<String>,
}

impl CompoundSelector {
    pub fn accept_compounds(&mut self, all: &[String]) {
        self.all = all.to_vec();
    }

    pub fn all_compounds(&self) -> &[String] {
        &self.all
    }

    pub fn set_chosen_compounds(&mut self, chosen: Vec<String>) {
        self.chosen = chosen;
    }

    pub fn chosen_compounds(&self) -> &[String] {
        &self.chosen
    }
}

// ===== ORCHESTRATOR =====

/// Collaborators of the orchestrator.
pub struct SelectorContext {
    pub service: Rc<dyn SampleService>,
    pub storage: Rc<RefCell<ViewerStorage>>,
    pub pending: PendingRequests,
    pub alerts: Alerts,
    pub scheduler: Scheduler,
    pub schema: Rc<dyn DataSchema>,
    /// Ignore completions of loads superseded by a newer one.
    pub discard_stale_responses: bool,
}

struct SelectorCore {
    chosen: ChosenState,
    filter_tools: FilterTools,
    compound_selector: CompoundSelector,
    // None until the first load, so that load always fetches
    remembered_datasets: Option<BTreeSet<DatasetId>>,
    remembered_sample_class: Option<SampleClass>,
    generation: u64,
}

impl DataView for SelectorCore {
    fn chosen(&self) -> &ChosenState {
        &self.chosen
    }

    fn chosen_mut(&mut self) -> &mut ChosenState {
        &mut self.chosen
    }

    fn react(&mut self, signal: &DataSignal) {
        match signal {
            DataSignal::Datasets(datasets) => self.filter_tools.set_datasets(datasets.clone()),
            DataSignal::SampleClass(sc) => self.filter_tools.set_sample_class(sc),
            DataSignal::Compounds(_) => self
                .compound_selector
                .set_chosen_compounds(self.chosen.compounds.clone()),
            DataSignal::AvailableCompounds(all) => self.compound_selector.accept_compounds(all),
            _ => {}
        }
    }
}

type TreeLink = (Rc<ListenerTree>, NodeId);

/// Filter tools plus compound selector, as shown on the columns and ranking
/// screens. Clones share the same state.
#[derive(Clone)]
pub struct FilterAndSelector {
    core: Rc<RefCell<SelectorCore>>,
    ctx: Rc<SelectorContext>,
    link: Rc<RefCell<Option<TreeLink>>>,
}

impl FilterAndSelector {
    pub fn new(ctx: SelectorContext) -> Self {
        Self {
            core: Rc::new(RefCell::new(SelectorCore {
                chosen: ChosenState::default(),
                filter_tools: FilterTools::default(),
                compound_selector: CompoundSelector::default(),
                remembered_datasets: None,
                remembered_sample_class: None,
                generation: 0,
            })),
            ctx: Rc::new(ctx),
            link: Rc::new(RefCell::new(None)),
        }
    }

    /// The view to register in the listener tree.
    pub fn view(&self) -> ViewRef {
        self.core.clone()
    }

    /// Changes made here are emitted from `node` to its listeners.
    pub fn attach(&self, tree: Rc<ListenerTree>, node: NodeId) {
        *self.link.borrow_mut() = Some((tree, node));
    }

    pub fn chosen(&self) -> ChosenState {
        self.core.borrow().chosen.clone()
    }

    pub fn filter_tools(&self) -> FilterTools {
        self.core.borrow().filter_tools.clone()
    }

    pub fn compound_selector(&self) -> CompoundSelector {
        self.core.borrow().compound_selector.clone()
    }

    /// Load the chosen datasets and sample class from storage, telling the
    /// server about the datasets and fetching compounds only when needed.
    ///
    /// The returned reply resolves with the valid compounds, as fetched or
    /// as previously known.
    pub fn load_datasets_and_sample_class(&self) -> Reply<Vec<String>> {
        let (new_datasets, candidate, stored_compounds) = {
            let mut storage = self.ctx.storage.borrow_mut();
            let store = storage.store();
            storage.datasets.load(store.as_ref());
            storage.sample_class.load(store.as_ref());
            storage.compounds.load(store.as_ref());
            (
                storage.datasets.value_or_default(),
                storage.sample_class.value_or_default(),
                storage.compounds.value_or_default(),
            )
        };
        let generation = self.next_generation();
        let sample_classes: Reply<Vec<SampleClass>> = Reply::new(&self.ctx.scheduler);
        let compounds: Reply<Vec<String>> = Reply::new(&self.ctx.scheduler);

        // Remembered values only move on success, so a failed load is retried in full
        let datasets_changed =
            self.core.borrow().remembered_datasets.as_ref() != Some(&new_datasets);
        if datasets_changed {
            let this = self.clone();
            let requested = new_datasets.clone();
            sample_classes.on_success(move |_| {
                if this.is_current(generation) {
                    this.accept_datasets(requested);
                }
            });
            self.fetch_sample_classes(&sample_classes, &new_datasets);
        } else {
            log::debug!("Datasets unchanged, not fetching sample classes");
            if let Err(error) = sample_classes.resolve_bypassed(Vec::new()) {
                log::error!("Failed to bypass sample class fetch: {error}");
            }
        }

        let sample_class_changed =
            self.core.borrow().remembered_sample_class.as_ref() != Some(&candidate);
        self.warn_later_if_sample_class_invalid(&sample_classes, candidate.clone());
        self.process_sample_classes_later(
            &sample_classes,
            &compounds,
            candidate,
            sample_class_changed,
            generation,
        );
        self.process_compounds_later(&compounds, stored_compounds, generation);
        compounds
    }

    /// The user picked `datasets` in the filter tools. They are persisted
    /// once the server has accepted them.
    pub fn filter_tools_datasets_changed(
        &self,
        datasets: BTreeSet<DatasetId>,
    ) -> Reply<Vec<String>> {
        let generation = self.next_generation();
        let sample_classes: Reply<Vec<SampleClass>> = Reply::new(&self.ctx.scheduler);
        let compounds: Reply<Vec<String>> = Reply::new(&self.ctx.scheduler);
        let chosen_compounds = self.core.borrow().chosen.compounds.clone();
        self.process_compounds_later(&compounds, chosen_compounds, generation);

        let this = self.clone();
        let reply = compounds.clone();
        let requested = datasets.clone();
        sample_classes.on_success(move |classes| {
            if !this.is_current(generation) {
                log::debug!("Discarding sample classes of superseded dataset choice");
                return;
            }
            this.persist("datasets", |storage| storage.set_datasets(requested.clone()));
            this.accept_datasets(requested);
            let candidate = this.core.borrow().chosen.sample_class.clone();
            let settled = this.settle_sample_class(Some(classes), &candidate);
            this.remember_sample_class_on_success(&reply, settled.clone(), generation);
            this.fetch_compounds(&reply, &settled);
        });
        self.fetch_sample_classes(&sample_classes, &datasets);
        compounds
    }

    /// The user picked `sample_class` in the filter tools.
    pub fn filter_tools_sample_class_changed(
        &self,
        sample_class: SampleClass,
    ) -> Reply<Vec<String>> {
        let generation = self.next_generation();
        self.persist("sample class", |storage| storage.set_sample_class(sample_class.clone()));
        let (changed, chosen_compounds) = {
            let mut core = self.core.borrow_mut();
            let changed = core.chosen.sample_class != sample_class;
            core.chosen.sample_class = sample_class.clone();
            (changed, core.chosen.compounds.clone())
        };
        if changed {
            self.emit(DataSignal::SampleClass(sample_class.clone()));
        }
        let compounds: Reply<Vec<String>> = Reply::new(&self.ctx.scheduler);
        self.process_compounds_later(&compounds, chosen_compounds, generation);
        self.remember_sample_class_on_success(&compounds, sample_class.clone(), generation);
        self.fetch_compounds(&compounds, &sample_class);
        compounds
    }

    pub fn compound_selector_compounds_changed(&self, compounds: Vec<String>) {
        self.persist("compounds", |storage| storage.set_compounds(compounds.clone()));
        {
            let mut core = self.core.borrow_mut();
            core.chosen.compounds = compounds.clone();
            core.compound_selector.set_chosen_compounds(compounds.clone());
        }
        self.emit(DataSignal::Compounds(compounds));
    }

    pub fn compound_selector_item_lists_changed(&self, lists: Vec<ItemList>) {
        self.persist("item lists", |storage| storage.set_item_lists(lists.clone()));
        self.core.borrow_mut().chosen.item_lists = lists.clone();
        self.emit(DataSignal::ItemLists(lists));
    }

    /// The server accepted `datasets`: show them and remember them as current.
    fn accept_datasets(&self, datasets: BTreeSet<DatasetId>) {
        {
            let mut core = self.core.borrow_mut();
            core.filter_tools.set_datasets(datasets.clone());
            core.remembered_datasets = Some(datasets.clone());
            core.chosen.datasets = datasets.clone();
        }
        self.emit(DataSignal::Datasets(datasets));
    }

    fn fetch_sample_classes(
        &self,
        reply: &Reply<Vec<SampleClass>>,
        datasets: &BTreeSet<DatasetId>,
    ) {
        begin_pending_request(
            reply,
            &self.ctx.pending,
            &self.ctx.alerts,
            "Unable to choose datasets",
        );
        self.ctx.service.choose_datasets(datasets, reply.clone());
    }

    fn fetch_compounds(&self, reply: &Reply<Vec<String>>, sample_class: &SampleClass) {
        begin_pending_request(
            reply,
            &self.ctx.pending,
            &self.ctx.alerts,
            "Unable to retrieve values for parameter",
        );
        self.ctx
            .service
            .parameter_values(sample_class, self.ctx.schema.major_parameter(), reply.clone());
    }

    fn warn_later_if_sample_class_invalid(
        &self,
        sample_classes: &Reply<Vec<SampleClass>>,
        candidate: SampleClass,
    ) {
        let alerts = self.ctx.alerts.clone();
        sample_classes.on_resolve(move |outcome| {
            // A bypassed reply carries no class list to check against
            if let Outcome::Fetched(classes) = outcome {
                if !classes.contains(&candidate) {
                    let shown = candidate.to_string();
                    alerts.add(ErrorAlert::new_invalid_sample_class_warning(&shown));
                }
            }
        });
    }

    fn process_sample_classes_later(
        &self,
        sample_classes: &Reply<Vec<SampleClass>>,
        compounds: &Reply<Vec<String>>,
        candidate: SampleClass,
        sample_class_changed: bool,
        generation: u64,
    ) {
        let this = self.clone();
        let compounds = compounds.clone();
        sample_classes.on_resolve(move |outcome| {
            let Some(classes) = outcome.value() else {
                return;
            };
            if !this.is_current(generation) {
                log::debug!("Discarding sample classes of superseded load");
                return;
            }
            let fetched = outcome.actually_ran();
            let settled = this.settle_sample_class(fetched.then_some(classes), &candidate);
            this.remember_sample_class_on_success(&compounds, settled.clone(), generation);
            if fetched || sample_class_changed {
                this.fetch_compounds(&compounds, &settled);
            } else {
                log::debug!("Sample class unchanged, reusing known compounds");
                let known = this.core.borrow().compound_selector.all_compounds().to_vec();
                if let Err(error) = compounds.resolve_bypassed(known) {
                    log::error!("Failed to bypass compound fetch: {error}");
                }
            }
        });
    }

    fn process_compounds_later(
        &self,
        compounds: &Reply<Vec<String>>,
        new_chosen: Vec<String>,
        generation: u64,
    ) {
        let this = self.clone();
        compounds.on_success(move |all| {
            if !this.is_current(generation) {
                return;
            }
            this.core.borrow_mut().compound_selector.accept_compounds(all);
            this.emit(DataSignal::AvailableCompounds(all.clone()));
        });

        let this = self.clone();
        compounds.on_success(move |_| {
            if !this.is_current(generation) {
                log::debug!("Discarding compounds of superseded load");
                return;
            }
            let chosen = {
                let mut core = this.core.borrow_mut();
                let chosen =
                    filter_by_membership(&new_chosen, core.compound_selector.all_compounds());
                core.compound_selector.set_chosen_compounds(chosen.clone());
                core.chosen.compounds = chosen.clone();
                chosen
            };
            this.persist("compounds", |storage| storage.set_compounds(chosen.clone()));
            this.emit(DataSignal::Compounds(chosen));
        });
    }

    /// Apply `candidate` to the filter tools and persist whatever they settled on.
    fn settle_sample_class(
        &self,
        available: Option<&Vec<SampleClass>>,
        candidate: &SampleClass,
    ) -> SampleClass {
        let (settled, changed) = {
            let mut core = self.core.borrow_mut();
            if let Some(classes) = available {
                core.filter_tools.set_available(classes.clone());
            }
            core.filter_tools.set_sample_class(candidate);
            let settled = core.filter_tools.current_sample_class_showing().clone();
            let changed = core.chosen.sample_class != settled;
            core.chosen.sample_class = settled.clone();
            (settled, changed)
        };
        self.persist("sample class", |storage| storage.set_sample_class(settled.clone()));
        if changed {
            self.emit(DataSignal::SampleClass(settled.clone()));
        }
        settled
    }

    /// `sample_class` counts as loaded once its compounds arrive.
    fn remember_sample_class_on_success(
        &self,
        compounds: &Reply<Vec<String>>,
        sample_class: SampleClass,
        generation: u64,
    ) {
        let this = self.clone();
        compounds.on_success(move |_| {
            if this.is_current(generation) {
                this.core.borrow_mut().remembered_sample_class = Some(sample_class.clone());
            }
        });
    }

    fn next_generation(&self) -> u64 {
        let mut core = self.core.borrow_mut();
        core.generation += 1;
        core.generation
    }

    fn is_current(&self, generation: u64) -> bool {
        !self.ctx.discard_stale_responses || self.core.borrow().generation == generation
    }

    fn persist(
        &self,
        what: &str,
        write: impl FnOnce(&mut ViewerStorage) -> Result<(), StorageError>,
    ) {
        let result = write(&mut self.ctx.storage.borrow_mut());
        if let Err(error) = result {
            self.ctx
                .alerts
                .add(ErrorAlert::new_storage_error(what, &error.to_string()));
        }
    }

    fn emit(&self, signal: DataSignal) {
        let link = self.link.borrow().clone();
        match link {
            Some((tree, node)) => {
                if let Err(error) = tree.emit(node, &signal) {
                    log::error!("Failed to propagate {}: {error}", signal.name());
                }
            }
            None => log::trace!("Selector not attached, dropping {} signal", signal.name()),
        }
    }
}
