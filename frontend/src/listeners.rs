//! Listener tree
//!
//! Every data view keeps its own [`ChosenState`] and forwards incoming signals
//! to its listeners. The tree is assembled once with a [`ListenerTreeBuilder`]
//! and is immutable afterwards, so a signal always reaches the same nodes in
//! the same order: the receiving node first, then its listeners depth-first in
//! registration order.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

use crate::state::{ChosenState, DataSignal};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("Widget '{0}' is already part of the listener tree")]
    DuplicateWidget(String),
    #[error("Unknown listener node {0:?}")]
    UnknownNode(NodeId),
    #[error("Widget '{0}' is busy and cannot receive a signal")]
    Reentrant(String),
}

/// A view that holds chosen state and may react to changes of it.
pub trait DataView {
    fn chosen(&self) -> &ChosenState;
    fn chosen_mut(&mut self) -> &mut ChosenState;

    /// Called after the local state has been updated from `signal`.
    fn react(&mut self, _signal: &DataSignal) {}
}

pub type ViewRef = Rc<RefCell<dyn DataView>>;

/// A listener with no behaviour beyond remembering the chosen state.
#[derive(Debug, Default)]
pub struct PlainListener {
    pub chosen: ChosenState,
}

impl DataView for PlainListener {
    fn chosen(&self) -> &ChosenState {
        &self.chosen
    }

    fn chosen_mut(&mut self) -> &mut ChosenState {
        &mut self.chosen
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

struct Node {
    label: String,
    view: ViewRef,
    listeners: Vec<NodeId>,
    parent: Option<NodeId>,
}

#[derive(Default)]
pub struct ListenerTreeBuilder {
    nodes: Vec<Node>,
}

impl ListenerTreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a top-level view, typically a screen.
    pub fn add_root(
        &mut self,
        label: impl Into<String>,
        view: ViewRef,
    ) -> Result<NodeId, TreeError> {
        self.insert(None, label.into(), view)
    }

    /// Register `view` as a listener of `parent`.
    pub fn add_listener(
        &mut self,
        parent: NodeId,
        label: impl Into<String>,
        view: ViewRef,
    ) -> Result<NodeId, TreeError> {
        if parent.0 >= self.nodes.len() {
            return Err(TreeError::UnknownNode(parent));
        }
        self.insert(Some(parent), label.into(), view)
    }

    fn insert(
        &mut self,
        parent: Option<NodeId>,
        label: String,
        view: ViewRef,
    ) -> Result<NodeId, TreeError> {
        if self.nodes.iter().any(|n| Rc::ptr_eq(&n.view, &view)) {
            return Err(TreeError::DuplicateWidget(label));
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            label,
            view,
            listeners: Vec::new(),
            parent,
        });
        if let Some(parent) = parent {
            self.nodes[parent.0].listeners.push(id);
        }
        Ok(id)
    }

    pub fn build(self) -> ListenerTree {
        ListenerTree { nodes: self.nodes }
    }
}

pub struct ListenerTree {
    nodes: Vec<Node>,
}

impl fmt::Debug for ListenerTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.nodes.iter().map(|n| (&n.label, &n.listeners)))
            .finish()
    }
}

impl ListenerTree {
    fn node(&self, id: NodeId) -> Result<&Node, TreeError> {
        self.nodes.get(id.0).ok_or(TreeError::UnknownNode(id))
    }

    pub fn label(&self, id: NodeId) -> Result<&str, TreeError> {
        Ok(&self.node(id)?.label)
    }

    pub fn view(&self, id: NodeId) -> Result<ViewRef, TreeError> {
        Ok(self.node(id)?.view.clone())
    }

    pub fn listeners(&self, id: NodeId) -> Result<&[NodeId], TreeError> {
        Ok(&self.node(id)?.listeners)
    }

    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>, TreeError> {
        Ok(self.node(id)?.parent)
    }

    pub fn roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.parent.is_none())
            .map(|(i, _)| NodeId(i))
    }

    pub fn find(&self, label: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.label == label).map(NodeId)
    }

    /// Deliver `signal` to `target` and then to everything below it.
    pub fn signal(&self, target: NodeId, signal: &DataSignal) -> Result<(), TreeError> {
        self.node(target)?;
        self.deliver(target, signal)
    }

    /// Forward a change that `origin` already applied to itself to its listeners.
    pub fn emit(&self, origin: NodeId, signal: &DataSignal) -> Result<(), TreeError> {
        for listener in self.node(origin)?.listeners.clone() {
            self.deliver(listener, signal)?;
        }
        Ok(())
    }

    /// Replay the chosen state of `from` into `to` and its subtree.
    pub fn propagate_to(&self, from: NodeId, to: NodeId) -> Result<(), TreeError> {
        let signals = {
            let source = self.node(from)?;
            let view = source
                .view
                .try_borrow()
                .map_err(|_| TreeError::Reentrant(source.label.clone()))?;
            view.chosen().replay()
        };
        for signal in &signals {
            self.signal(to, signal)?;
        }
        Ok(())
    }

    fn deliver(&self, id: NodeId, signal: &DataSignal) -> Result<(), TreeError> {
        let node = self.node(id)?;
        {
            let mut view = node
                .view
                .try_borrow_mut()
                .map_err(|_| TreeError::Reentrant(node.label.clone()))?;
            view.chosen_mut().apply(signal);
            view.react(signal);
        }
        log::trace!("{} <- {}", node.label, signal.name());
        for listener in &node.listeners {
            self.deliver(*listener, signal)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Attribute, SampleClass};

    /// Records the order in which nodes react.
    struct Recorder {
        name: &'static str,
        chosen: ChosenState,
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl DataView for Recorder {
        fn chosen(&self) -> &ChosenState {
            &self.chosen
        }

        fn chosen_mut(&mut self) -> &mut ChosenState {
            &mut self.chosen
        }

        fn react(&mut self, _signal: &DataSignal) {
            self.log.borrow_mut().push(self.name);
        }
    }

    fn recorder(name: &'static str, log: &Rc<RefCell<Vec<&'static str>>>) -> ViewRef {
        Rc::new(RefCell::new(Recorder {
            name,
            chosen: ChosenState::default(),
            log: log.clone(),
        }))
    }

    fn compounds(names: &[&str]) -> DataSignal {
        DataSignal::Compounds(names.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_signals_reach_subtree_pre_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut builder = ListenerTreeBuilder::new();
        let root = builder.add_root("root", recorder("root", &log)).unwrap();
        let a = builder.add_listener(root, "a", recorder("a", &log)).unwrap();
        builder.add_listener(a, "a1", recorder("a1", &log)).unwrap();
        builder.add_listener(root, "b", recorder("b", &log)).unwrap();
        builder.add_listener(a, "a2", recorder("a2", &log)).unwrap();
        let tree = builder.build();

        tree.signal(root, &compounds(&["aspirin"])).unwrap();
        assert_eq!(*log.borrow(), vec!["root", "a", "a1", "a2", "b"]);

        let b = tree.find("b").unwrap();
        let view = tree.view(b).unwrap();
        assert_eq!(view.borrow().chosen().compounds, vec!["aspirin"]);
    }

    #[test]
    fn test_emit_skips_origin() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut builder = ListenerTreeBuilder::new();
        let root = builder.add_root("root", recorder("root", &log)).unwrap();
        let a = builder.add_listener(root, "a", recorder("a", &log)).unwrap();
        builder.add_listener(a, "a1", recorder("a1", &log)).unwrap();
        let tree = builder.build();

        tree.emit(a, &compounds(&["x"])).unwrap();
        assert_eq!(*log.borrow(), vec!["a1"]);
    }

    #[test]
    fn test_propagate_to_replays_state() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let source = Rc::new(RefCell::new(PlainListener::default()));
        source.borrow_mut().chosen.sample_class =
            SampleClass::new().with(Attribute::Organism, "Rat");
        source.borrow_mut().chosen.probes = vec!["p1".into()];

        let mut builder = ListenerTreeBuilder::new();
        let from = builder.add_root("source", source.clone()).unwrap();
        let to = builder.add_root("target", recorder("target", &log)).unwrap();
        let tree = builder.build();
        assert_eq!(tree.roots().count(), 2);

        tree.propagate_to(from, to).unwrap();
        let target = tree.view(to).unwrap();
        assert_eq!(*target.borrow().chosen(), source.borrow().chosen);
        assert_eq!(log.borrow().len(), 9);
    }

    #[test]
    fn test_widget_registered_twice_is_rejected() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let shared_view = recorder("twice", &log);
        let mut builder = ListenerTreeBuilder::new();
        let root = builder.add_root("root", recorder("root", &log)).unwrap();
        builder.add_listener(root, "first", shared_view.clone()).unwrap();

        assert_eq!(
            builder.add_listener(root, "second", shared_view),
            Err(TreeError::DuplicateWidget("second".to_string()))
        );
        assert_eq!(
            builder.add_listener(NodeId(42), "orphan", recorder("o", &log)),
            Err(TreeError::UnknownNode(NodeId(42)))
        );
    }

    #[test]
    fn test_busy_widget_reports_reentrancy() {
        let view: ViewRef = Rc::new(RefCell::new(PlainListener::default()));
        let mut builder = ListenerTreeBuilder::new();
        let root = builder.add_root("root", view.clone()).unwrap();
        let tree = builder.build();

        let _held = view.borrow_mut();
        assert_eq!(
            tree.signal(root, &compounds(&["x"])),
            Err(TreeError::Reentrant("root".to_string()))
        );
    }
}
