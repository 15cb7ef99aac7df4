//! Toxygates viewer client core
//!
//! Asynchronous state propagation for the viewer: deferred server replies,
//! a shared wait indicator, persisted user choices and the listener tree that
//! keeps every screen in step with them.

pub mod app;
pub mod config;
pub mod dataflow;
pub mod error_display;
pub mod filter_selector;
pub mod listeners;
pub mod platform;
pub mod screens;
pub mod state;

pub use app::{AppError, ViewerApp};
pub use config::ViewerStorage;
pub use filter_selector::{FilterAndSelector, SelectorContext};
pub use state::{ChosenState, DataSignal};
