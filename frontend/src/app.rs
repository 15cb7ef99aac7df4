//! ViewerApp - wires storage, screens, listeners and the sample service together

use anyhow::Context;
use futures_signals::signal::Signal;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;

use shared::{
    Column, DataSchema, Group, GroupColors, OtgSchema, Sample, ValueType, ViewerConfig,
};

use crate::config::ViewerStorage;
use crate::dataflow::{
    EventLoop, KeyValueStore, LoadOutcome, PendingRequests, StorageError, WaitDialog,
};
use crate::error_display::{Alerts, ErrorAlert};
use crate::filter_selector::{FilterAndSelector, SelectorContext};
use crate::listeners::{DataView, ListenerTree, ListenerTreeBuilder, NodeId, TreeError};
use crate::platform::{Reply, SampleService};
use crate::screens::{NavigationError, Screen, ScreenSequence, ScreenView};
use crate::state::DataSignal;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Navigation(#[from] NavigationError),
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub const DEFAULT_SCREEN: &str = "default";
pub const COLUMNS_SCREEN: &str = "columns";
pub const RANKING_SCREEN: &str = "ranking";
pub const SAMPLE_DETAIL_SCREEN: &str = "sample-detail";

fn viewer_screens() -> Vec<Screen> {
    vec![
        Screen::new(DEFAULT_SCREEN, "Start"),
        Screen::new(COLUMNS_SCREEN, "Sample groups"),
        Screen::new("data", "View data").requires(COLUMNS_SCREEN),
        Screen::new(RANKING_SCREEN, "Compound ranking"),
        Screen::new("pathology", "Pathologies").requires(COLUMNS_SCREEN),
        Screen::new(SAMPLE_DETAIL_SCREEN, "Sample details").requires(COLUMNS_SCREEN),
    ]
}

/// Which parts of the chosen state a screen's status line shows: datasets, groups.
fn status_parts(key: &str) -> (bool, bool) {
    match key {
        // Ranking works across all groups
        RANKING_SCREEN => (true, false),
        _ => (true, true),
    }
}

/// Self-contained viewer application
pub struct ViewerApp {
    pub config: ViewerConfig,
    event_loop: EventLoop,
    storage: Rc<RefCell<ViewerStorage>>,
    pub pending: PendingRequests,
    pub wait_dialog: Rc<WaitDialog>,
    pub alerts: Alerts,
    pub selector: FilterAndSelector,
    screens: ScreenSequence,
    tree: Rc<ListenerTree>,
    selector_node: NodeId,
    views: IndexMap<String, (Rc<RefCell<ScreenView>>, NodeId)>,
    group_colors: GroupColors,
}

impl ViewerApp {
    pub fn new(
        config: ViewerConfig,
        store: Rc<dyn KeyValueStore>,
        service: Rc<dyn SampleService>,
    ) -> Result<Self, AppError> {
        let event_loop = EventLoop::new();
        let storage = Rc::new(RefCell::new(ViewerStorage::new(&config.storage, store)));
        let wait_dialog = Rc::new(WaitDialog::new(config.ui.wait_message.clone()));
        let pending = PendingRequests::new(wait_dialog.clone());
        let alerts = Alerts::with_default_error_message(&config.ui.default_error_message);
        let schema: Rc<dyn DataSchema> = Rc::new(OtgSchema);

        let selector = FilterAndSelector::new(SelectorContext {
            service,
            storage: storage.clone(),
            pending: pending.clone(),
            alerts: alerts.clone(),
            scheduler: event_loop.scheduler(),
            schema: schema.clone(),
            discard_stale_responses: config.loading.discard_stale_responses,
        });

        let mut screens = ScreenSequence::new();
        for screen in viewer_screens() {
            screens.add(screen)?;
        }

        // Every screen listens to the filter so that a load reaches all of them
        let mut builder = ListenerTreeBuilder::new();
        let selector_node = builder.add_root("filter", selector.view())?;
        let keys: Vec<String> = screens.keys().map(str::to_string).collect();
        let mut views = IndexMap::new();
        for key in keys {
            let (datasets, groups) = status_parts(&key);
            let view = ScreenView::new(key.clone(), schema.clone())
                .with_status_parts(datasets, groups);
            let view = Rc::new(RefCell::new(view));
            let node = builder.add_listener(selector_node, key.clone(), view.clone())?;
            views.insert(key, (view, node));
        }
        let tree = Rc::new(builder.build());
        selector.attach(tree.clone(), selector_node);

        let group_colors = GroupColors::new(config.ui.group_colors.clone());
        log::info!("Viewer ready with {} screens", views.len());

        Ok(Self {
            config,
            event_loop,
            storage,
            pending,
            wait_dialog,
            alerts,
            selector,
            screens,
            tree,
            selector_node,
            views,
            group_colors,
        })
    }

    /// Build the app from a TOML config, repairing fixable values.
    pub fn from_config_str(
        content: &str,
        store: Rc<dyn KeyValueStore>,
        service: Rc<dyn SampleService>,
    ) -> anyhow::Result<Self> {
        let mut config =
            ViewerConfig::from_toml_str(content).context("Failed to load viewer config")?;
        for warning in config.validate_and_fix() {
            log::warn!("Config: {}", warning);
        }
        let app = Self::new(config, store, service).context("Failed to assemble viewer")?;
        Ok(app)
    }

    pub fn storage(&self) -> Rc<RefCell<ViewerStorage>> {
        self.storage.clone()
    }

    pub fn screens(&self) -> &ScreenSequence {
        &self.screens
    }

    pub fn view(&self, key: &str) -> Option<Rc<RefCell<ScreenView>>> {
        self.views.get(key).map(|(view, _)| view.clone())
    }

    pub fn status_signal(&self, key: &str) -> Option<impl Signal<Item = String> + use<>> {
        self.views.get(key).map(|(view, _)| view.borrow().status_signal())
    }

    pub fn guide_visible_signal(&self) -> impl Signal<Item = bool> + use<> {
        self.storage.borrow().guide_visible_signal()
    }

    /// Show `key`, bring its view up to date with stored state, then run the
    /// actions queued on it.
    pub fn show_screen(&mut self, key: &str) -> Result<(), AppError> {
        self.screens.attempt_proceed(key)?;
        let (view, node) = self
            .views
            .get(key)
            .map(|(view, node)| (view.clone(), *node))
            .ok_or_else(|| NavigationError::UnknownScreen(key.to_string()))?;

        let stored = {
            let mut storage = self.storage.borrow_mut();
            for (name, outcome) in storage.load_all() {
                if outcome == LoadOutcome::Recovered {
                    log::warn!("Stored {} was unreadable and has been reset", name);
                }
            }
            storage.chosen_state()
        };
        let changes = view.borrow().chosen().diff(&stored);
        for signal in &changes {
            self.tree.signal(node, signal)?;
        }

        for (name, action) in self.screens.take_actions(key)? {
            log::debug!("Running queued action '{}' on '{}'", name, key);
            action();
        }
        Ok(())
    }

    /// Queue `action` to run when `key` is next shown.
    pub fn queue_on_screen(
        &mut self,
        key: &str,
        name: &str,
        action: impl FnOnce() + 'static,
    ) -> Result<(), AppError> {
        Ok(self.screens.enqueue(key, name, action)?)
    }

    /// Reload datasets, sample class and compounds from storage.
    pub fn load_filter_state(&self) -> Reply<Vec<String>> {
        self.selector.load_datasets_and_sample_class()
    }

    /// The user finished editing sample groups.
    pub fn columns_changed(&mut self, groups: Vec<Group>) -> Result<(), AppError> {
        self.storage.borrow_mut().set_columns(groups.clone())?;
        let configured = !groups.is_empty();
        self.tree.signal(self.selector_node, &DataSignal::Columns(groups))?;
        self.screens.set_configured(COLUMNS_SCREEN, configured)?;
        Ok(())
    }

    /// The user focused a single compound, or cleared the focus.
    pub fn compound_changed(&mut self, compound: Option<String>) -> Result<(), AppError> {
        self.storage.borrow_mut().set_compound(compound.clone())?;
        self.tree.signal(self.selector_node, &DataSignal::Compound(compound))?;
        Ok(())
    }

    pub fn value_type_changed(&mut self, value_type: ValueType) -> Result<(), AppError> {
        self.storage.borrow_mut().set_value_type(value_type)?;
        self.tree.signal(self.selector_node, &DataSignal::ValueType(value_type))?;
        Ok(())
    }

    pub fn new_group(&mut self, name: &str, samples: Vec<Sample>) -> Group {
        Group::new(name, samples, self.group_colors.pick())
    }

    /// Open the sample detail screen on `column`.
    pub fn display_sample_detail(&mut self, column: Column) -> Result<(), AppError> {
        self.storage.borrow_mut().set_custom_column(Some(column))?;
        self.show_screen(SAMPLE_DETAIL_SCREEN)
    }

    pub fn set_show_guide(&self, show: bool) -> Result<(), AppError> {
        Ok(self.storage.borrow_mut().set_show_guide(show)?)
    }

    /// Forget all stored choices and go back to unconfigured screens.
    pub fn clear_state(&self) -> Result<(), AppError> {
        self.storage.borrow_mut().clear_all()?;
        self.screens.deconfigure_all();
        self.alerts.add(ErrorAlert::new_info(
            "Session cleared",
            "All saved choices have been removed.",
        ));
        Ok(())
    }

    /// Drive queued callbacks until nothing is left to run.
    pub fn run_until_idle(&self) {
        self.event_loop.run_until_idle();
    }
}
