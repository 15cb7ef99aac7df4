//! In-flight request accounting
//!
//! The viewer shows a modal wait indicator while at least one server request
//! is outstanding. [`PendingRequests`] owns the counter and toggles the
//! indicator only on the 0 -> 1 and 1 -> 0 transitions.

use futures_signals::signal::{Mutable, Signal, SignalExt};
use std::rc::Rc;
use thiserror::Error;

use super::deferred::Deferred;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PendingError {
    #[error("Request finished with no request pending")]
    Underflow,
}

/// Anything that can show or hide the "please wait" state.
pub trait WaitIndicator {
    fn show(&self);
    fn hide(&self);
}

/// Wait indicator backed by a signal, for the UI layer to render.
#[derive(Clone, Debug)]
pub struct WaitDialog {
    message: String,
    visible: Mutable<bool>,
}

impl WaitDialog {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            visible: Mutable::new(false),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_visible(&self) -> bool {
        self.visible.get()
    }

    pub fn visible_signal(&self) -> impl Signal<Item = bool> + use<> {
        self.visible.signal()
    }
}

impl WaitIndicator for WaitDialog {
    fn show(&self) {
        log::debug!("Showing wait dialog: {}", self.message);
        self.visible.set_neq(true);
    }

    fn hide(&self) {
        self.visible.set_neq(false);
    }
}

/// Shared counter of outstanding requests. Clones share the counter.
#[derive(Clone)]
pub struct PendingRequests {
    count: Mutable<usize>,
    indicator: Rc<dyn WaitIndicator>,
}

impl PendingRequests {
    pub fn new(indicator: Rc<dyn WaitIndicator>) -> Self {
        Self {
            count: Mutable::new(0),
            indicator,
        }
    }

    pub fn begin(&self) {
        let count = {
            let mut count = self.count.lock_mut();
            *count += 1;
            *count
        };
        if count == 1 {
            self.indicator.show();
        }
    }

    /// Fails without changing anything if no request is pending.
    pub fn end(&self) -> Result<(), PendingError> {
        let count = {
            let mut count = self.count.lock_mut();
            if *count == 0 {
                log::error!("Pending request counter would go negative");
                return Err(PendingError::Underflow);
            }
            *count -= 1;
            *count
        };
        if count == 0 {
            self.indicator.hide();
        }
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.count.get()
    }

    pub fn is_waiting(&self) -> bool {
        self.count() > 0
    }

    pub fn waiting_signal(&self) -> impl Signal<Item = bool> + use<> {
        self.count.signal().map(|count| count > 0).dedupe()
    }

    /// Count `deferred` as in flight until it resolves, either way.
    pub fn track<T: 'static, E: 'static>(&self, deferred: &Deferred<T, E>) {
        self.begin();
        let pending = self.clone();
        deferred.on_resolve(move |_| {
            if let Err(error) = pending.end() {
                log::error!("Tracked request finished twice: {error}");
            }
        });
    }
}
