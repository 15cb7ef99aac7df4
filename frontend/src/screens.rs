//! Screen sequence and navigation
//!
//! Screens form a fixed sequence. A screen is enabled when its predicate over
//! the sequence holds (typically "an earlier screen is configured"); the user
//! may only navigate to enabled screens. Work that needs a screen to be
//! visible is queued on it and runs when the screen is next shown.

use futures_signals::signal::{Mutable, Signal};
use indexmap::IndexMap;
use std::rc::Rc;
use thiserror::Error;

use shared::{DataSchema, Group};

use crate::listeners::DataView;
use crate::state::{ChosenState, DataSignal};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NavigationError {
    #[error("Unknown screen '{0}'")]
    UnknownScreen(String),
    #[error("Screen '{0}' is registered twice")]
    DuplicateScreen(String),
    #[error("Screen '{0}' is not available yet")]
    NotEnabled(String),
}

pub type EnabledPredicate = Rc<dyn Fn(&ScreenSequence) -> bool>;

// ===== ACTION QUEUE =====

/// Named deferred actions. Enqueueing a name that is already queued replaces
/// the old action and moves it to the back.
#[derive(Default)]
pub struct ActionQueue {
    actions: IndexMap<String, Box<dyn FnOnce()>>,
}

impl ActionQueue {
    pub fn enqueue(&mut self, name: impl Into<String>, action: impl FnOnce() + 'static) {
        let name = name.into();
        self.actions.shift_remove(&name);
        self.actions.insert(name, Box::new(action));
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.actions.keys().map(String::as_str).collect()
    }

    /// Remove all queued actions, in queue order.
    pub fn take_all(&mut self) -> Vec<(String, Box<dyn FnOnce()>)> {
        self.actions.drain(..).collect()
    }
}

// ===== SCREENS =====

pub struct Screen {
    key: String,
    title: String,
    configured: Mutable<bool>,
    visible: bool,
    enabled: EnabledPredicate,
    actions: ActionQueue,
}

impl Screen {
    /// A screen that is always enabled.
    pub fn new(key: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
            configured: Mutable::new(false),
            visible: false,
            enabled: Rc::new(|_: &ScreenSequence| true),
            actions: ActionQueue::default(),
        }
    }

    pub fn enabled_when(mut self, predicate: impl Fn(&ScreenSequence) -> bool + 'static) -> Self {
        self.enabled = Rc::new(predicate);
        self
    }

    /// Enabled once the screen `key` is configured.
    pub fn requires(self, key: &str) -> Self {
        let key = key.to_string();
        self.enabled_when(move |screens| screens.is_configured(&key))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }
}

#[derive(Default)]
pub struct ScreenSequence {
    screens: Vec<Screen>,
    current: Option<usize>,
}

impl ScreenSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, screen: Screen) -> Result<(), NavigationError> {
        if self.screens.iter().any(|s| s.key == screen.key) {
            return Err(NavigationError::DuplicateScreen(screen.key));
        }
        self.screens.push(screen);
        Ok(())
    }

    fn index(&self, key: &str) -> Result<usize, NavigationError> {
        self.screens
            .iter()
            .position(|s| s.key == key)
            .ok_or_else(|| NavigationError::UnknownScreen(key.to_string()))
    }

    pub fn screen(&self, key: &str) -> Result<&Screen, NavigationError> {
        Ok(&self.screens[self.index(key)?])
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.screens.iter().map(|s| s.key.as_str())
    }

    pub fn set_configured(&self, key: &str, configured: bool) -> Result<(), NavigationError> {
        let screen = self.screen(key)?;
        if screen.configured.get() != configured {
            log::debug!("Screen '{}' configured: {}", key, configured);
            screen.configured.set(configured);
        }
        Ok(())
    }

    /// Unknown screens are never configured.
    pub fn is_configured(&self, key: &str) -> bool {
        self.screen(key).is_ok_and(|s| s.configured.get())
    }

    pub fn configured_signal(
        &self,
        key: &str,
    ) -> Result<impl Signal<Item = bool> + use<>, NavigationError> {
        Ok(self.screen(key)?.configured.signal())
    }

    pub fn is_enabled(&self, key: &str) -> bool {
        self.screen(key)
            .map(|s| s.enabled.clone())
            .is_ok_and(|enabled| enabled(self))
    }

    pub fn enabled_screens(&self) -> Vec<&str> {
        self.keys().filter(|key| self.is_enabled(key)).collect()
    }

    pub fn current(&self) -> Option<&Screen> {
        self.current.map(|i| &self.screens[i])
    }

    /// Make `key` the visible screen if it is enabled. Its queued actions are
    /// left for [`ScreenSequence::take_actions`], after its state has loaded.
    pub fn attempt_proceed(&mut self, key: &str) -> Result<(), NavigationError> {
        let index = self.index(key)?;
        if !self.is_enabled(key) {
            log::info!("Refusing to show disabled screen '{}'", key);
            return Err(NavigationError::NotEnabled(key.to_string()));
        }
        if let Some(previous) = self.current.replace(index) {
            self.screens[previous].visible = false;
        }
        self.screens[index].visible = true;
        log::info!("Showing screen '{}'", key);
        Ok(())
    }

    /// Hide the visible screen, if any.
    pub fn hide_current(&mut self) {
        if let Some(index) = self.current.take() {
            self.screens[index].visible = false;
            log::debug!("Hid screen '{}'", self.screens[index].key);
        }
    }

    /// Forget every screen's configuration, e.g. after the stored state was cleared.
    pub fn deconfigure_all(&self) {
        for screen in &self.screens {
            screen.configured.set_neq(false);
        }
    }

    /// Queue `action` to run when `key` is next shown.
    pub fn enqueue(
        &mut self,
        key: &str,
        name: impl Into<String>,
        action: impl FnOnce() + 'static,
    ) -> Result<(), NavigationError> {
        let index = self.index(key)?;
        self.screens[index].actions.enqueue(name, action);
        Ok(())
    }

    pub fn take_actions(
        &mut self,
        key: &str,
    ) -> Result<Vec<(String, Box<dyn FnOnce()>)>, NavigationError> {
        let index = self.index(key)?;
        Ok(self.screens[index].actions.take_all())
    }

    pub fn queued_actions(&self, key: &str) -> Result<Vec<&str>, NavigationError> {
        Ok(self.screen(key)?.actions.names())
    }
}

// ===== SCREEN VIEW =====

/// The data view behind a screen: holds its chosen state and the status
/// line summarising it.
pub struct ScreenView {
    key: String,
    chosen: ChosenState,
    schema: Rc<dyn DataSchema>,
    show_datasets: bool,
    show_groups: bool,
    status: Mutable<String>,
}

impl ScreenView {
    pub fn new(key: impl Into<String>, schema: Rc<dyn DataSchema>) -> Self {
        Self {
            key: key.into(),
            chosen: ChosenState::default(),
            schema,
            show_datasets: true,
            show_groups: true,
            status: Mutable::new(String::new()),
        }
    }

    pub fn with_status_parts(mut self, datasets: bool, groups: bool) -> Self {
        self.show_datasets = datasets;
        self.show_groups = groups;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn status(&self) -> String {
        self.status.get_cloned()
    }

    pub fn status_signal(&self) -> impl Signal<Item = String> + use<> {
        self.status.signal_cloned()
    }

    fn update_status(&self) {
        let mut parts = Vec::new();
        if self.show_datasets && !self.chosen.datasets.is_empty() {
            let names: Vec<&str> = self.chosen.datasets.iter().map(|d| d.as_str()).collect();
            parts.push(format!("Datasets: {}", names.join(", ")));
        }
        if self.show_groups && !self.chosen.columns.is_empty() {
            let mut groups: Vec<&Group> = self.chosen.columns.iter().collect();
            groups.sort_by(|a, b| a.name.cmp(&b.name));
            for group in groups {
                parts.push(format!(
                    "{} ({})",
                    group.name,
                    group.triples(self.schema.as_ref(), Some(2), ", ")
                ));
            }
        }
        self.status.set_neq(parts.join(" | "));
    }
}

impl DataView for ScreenView {
    fn chosen(&self) -> &ChosenState {
        &self.chosen
    }

    fn chosen_mut(&mut self) -> &mut ChosenState {
        &mut self.chosen
    }

    fn react(&mut self, signal: &DataSignal) {
        match signal {
            DataSignal::SampleClass(_) => {
                let dropped = self.chosen.retain_compatible_columns(self.schema.as_ref());
                if !dropped.is_empty() {
                    log::info!(
                        "Screen '{}' dropped {} column(s) incompatible with the sample class",
                        self.key,
                        dropped.len()
                    );
                }
                self.update_status();
            }
            DataSignal::Datasets(_) | DataSignal::Columns(_) => self.update_status(),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Attribute, DatasetId, OtgSchema, Sample, SampleClass};
    use std::cell::RefCell;

    fn viewer_screens() -> ScreenSequence {
        let mut screens = ScreenSequence::new();
        screens.add(Screen::new("default", "Start")).unwrap();
        screens.add(Screen::new("columns", "Sample groups")).unwrap();
        screens
            .add(Screen::new("data", "View data").requires("columns"))
            .unwrap();
        screens
    }

    #[test]
    fn test_navigation_requires_configuration() {
        let mut screens = viewer_screens();
        assert_eq!(screens.enabled_screens(), vec!["default", "columns"]);
        assert_eq!(
            screens.attempt_proceed("data"),
            Err(NavigationError::NotEnabled("data".to_string()))
        );

        screens.set_configured("columns", true).unwrap();
        screens.attempt_proceed("data").unwrap();
        assert_eq!(screens.current().map(Screen::key), Some("data"));
        assert!(screens.screen("data").unwrap().is_visible());

        screens.attempt_proceed("default").unwrap();
        assert!(!screens.screen("data").unwrap().is_visible());

        screens.hide_current();
        assert!(screens.current().is_none());
        assert!(!screens.screen("default").unwrap().is_visible());
    }

    #[test]
    fn test_deconfigure_all_disables_dependents() {
        let screens = viewer_screens();
        screens.set_configured("columns", true).unwrap();
        assert!(screens.is_enabled("data"));

        screens.deconfigure_all();
        assert!(!screens.is_configured("columns"));
        assert!(!screens.is_enabled("data"));
    }

    #[test]
    fn test_duplicate_and_unknown_screens() {
        let mut screens = viewer_screens();
        assert_eq!(
            screens.add(Screen::new("data", "Again")),
            Err(NavigationError::DuplicateScreen("data".to_string()))
        );
        assert!(!screens.is_enabled("ranking"));
        assert_eq!(
            screens.set_configured("ranking", true),
            Err(NavigationError::UnknownScreen("ranking".to_string()))
        );
    }

    #[test]
    fn test_requeued_action_replaces_and_moves_to_back() {
        let mut screens = viewer_screens();
        let ran = Rc::new(RefCell::new(Vec::new()));
        for (name, tag) in [("a", "a1"), ("b", "b"), ("a", "a2")] {
            let ran = ran.clone();
            screens
                .enqueue("columns", name, move || ran.borrow_mut().push(tag))
                .unwrap();
        }
        assert_eq!(screens.queued_actions("columns").unwrap(), vec!["b", "a"]);

        for (_, action) in screens.take_actions("columns").unwrap() {
            action();
        }
        assert_eq!(*ran.borrow(), vec!["b", "a2"]);
        assert!(screens.queued_actions("columns").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_configured_signal() {
        use futures::StreamExt;
        use futures_signals::signal::SignalExt;

        let screens = viewer_screens();
        let mut configured = screens.configured_signal("columns").unwrap().to_stream();
        assert_eq!(configured.next().await, Some(false));
        screens.set_configured("columns", true).unwrap();
        assert_eq!(configured.next().await, Some(true));
    }

    #[test]
    fn test_screen_view_drops_incompatible_columns() {
        let rat = SampleClass::new().with(Attribute::Organism, "Rat");
        let mouse = SampleClass::new().with(Attribute::Organism, "Mouse");
        let mut view = ScreenView::new("columns", Rc::new(OtgSchema));

        let group = Group::new(
            "Rat group",
            vec![Sample::new("s1", rat.clone().with(Attribute::CompoundName, "aspirin"))],
            "#fff",
        );
        let signals = [
            DataSignal::Datasets([DatasetId::new("otg")].into_iter().collect()),
            DataSignal::SampleClass(rat),
            DataSignal::Columns(vec![group]),
        ];
        for signal in &signals {
            view.chosen_mut().apply(signal);
            view.react(signal);
        }
        assert_eq!(view.status(), "Datasets: otg | Rat group (aspirin//)");

        let signal = DataSignal::SampleClass(mouse);
        view.chosen_mut().apply(&signal);
        view.react(&signal);
        assert!(view.chosen().columns.is_empty());
        assert_eq!(view.status(), "Datasets: otg");
    }
}
