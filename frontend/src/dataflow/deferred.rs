//! Deferred values
//!
//! A [`Deferred`] is a single-assignment slot for the result of an operation
//! that may be fetched asynchronously or bypassed because a cached value is
//! already good enough. Continuations are attached with [`Deferred::on_resolve`]
//! and friends; they run exactly once, in registration order.
//!
//! How a value arrived is part of the value: [`Outcome::Fetched`] versus
//! [`Outcome::Bypassed`]. Downstream steps use that to decide whether their
//! own caches are still valid.

use futures::channel::oneshot;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::rc::Rc;
use thiserror::Error;

use super::scheduler::Scheduler;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeferredError {
    #[error("Deferred value was already resolved")]
    AlreadyResolved,
    #[error("Deferred value was dropped before it resolved")]
    Abandoned,
}

/// How a deferred value was settled.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T, E> {
    /// The underlying operation ran and produced a value.
    Fetched(T),
    /// The operation was skipped; the value was supplied directly.
    Bypassed(T),
    Failed(E),
}

impl<T, E> Outcome<T, E> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Fetched(v) | Outcome::Bypassed(v) => Some(v),
            Outcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&E> {
        match self {
            Outcome::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn succeeded(&self) -> bool {
        !matches!(self, Outcome::Failed(_))
    }

    /// True only if the underlying operation was actually performed.
    pub fn actually_ran(&self) -> bool {
        matches!(self, Outcome::Fetched(_))
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            Outcome::Fetched(v) | Outcome::Bypassed(v) => Ok(v),
            Outcome::Failed(e) => Err(e),
        }
    }
}

type Callback<T, E> = Box<dyn FnOnce(&Outcome<T, E>)>;

struct Slot<T, E> {
    outcome: Option<Rc<Outcome<T, E>>>,
    callbacks: Vec<Callback<T, E>>,
}

/// Single-assignment value with ordered completion callbacks.
///
/// Clones share the same slot. Callbacks registered before resolution run
/// synchronously inside the resolving call; callbacks registered afterwards
/// are queued on the [`Scheduler`] and run on a later event loop turn.
pub struct Deferred<T, E> {
    slot: Rc<RefCell<Slot<T, E>>>,
    scheduler: Scheduler,
}

impl<T, E> Clone for Deferred<T, E> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Deferred<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.borrow();
        let state = match slot.outcome.as_deref() {
            None => "pending",
            Some(Outcome::Fetched(_)) => "fetched",
            Some(Outcome::Bypassed(_)) => "bypassed",
            Some(Outcome::Failed(_)) => "failed",
        };
        f.debug_struct("Deferred")
            .field("state", &state)
            .field("callbacks", &slot.callbacks.len())
            .finish()
    }
}

impl<T: 'static, E: 'static> Deferred<T, E> {
    pub fn new(scheduler: &Scheduler) -> Self {
        Self {
            slot: Rc::new(RefCell::new(Slot {
                outcome: None,
                callbacks: Vec::new(),
            })),
            scheduler: scheduler.clone(),
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Resolve with a value produced by actually running the operation.
    pub fn resolve_success(&self, value: T) -> Result<(), DeferredError> {
        self.resolve(Outcome::Fetched(value))
    }

    /// Resolve without running the operation (the "bypass" path).
    pub fn resolve_bypassed(&self, value: T) -> Result<(), DeferredError> {
        self.resolve(Outcome::Bypassed(value))
    }

    pub fn resolve_failure(&self, error: E) -> Result<(), DeferredError> {
        self.resolve(Outcome::Failed(error))
    }

    fn resolve(&self, outcome: Outcome<T, E>) -> Result<(), DeferredError> {
        let (outcome, callbacks) = {
            let Ok(mut slot) = self.slot.try_borrow_mut() else {
                log::error!("Deferred value resolved while it was being inspected");
                return Err(DeferredError::AlreadyResolved);
            };
            if slot.outcome.is_some() {
                log::error!("Attempted to resolve an already resolved deferred value");
                return Err(DeferredError::AlreadyResolved);
            }
            let outcome = Rc::new(outcome);
            slot.outcome = Some(outcome.clone());
            (outcome, std::mem::take(&mut slot.callbacks))
        };
        // The slot is released here, so callbacks may register more callbacks
        for callback in callbacks {
            callback(&outcome);
        }
        Ok(())
    }

    /// Register a completion callback.
    ///
    /// Runs synchronously at resolution if the value is still pending,
    /// otherwise on a later event loop turn.
    pub fn on_resolve(&self, callback: impl FnOnce(&Outcome<T, E>) + 'static) -> &Self {
        let resolved = self.slot.borrow().outcome.clone();
        match resolved {
            None => self.slot.borrow_mut().callbacks.push(Box::new(callback)),
            Some(outcome) => self.scheduler.schedule_deferred(move || callback(&outcome)),
        }
        self
    }

    /// Register a callback that only runs on success (fetched or bypassed).
    pub fn on_success(&self, callback: impl FnOnce(&T) + 'static) -> &Self {
        self.on_resolve(move |outcome| {
            if let Some(value) = outcome.value() {
                callback(value);
            }
        })
    }

    pub fn on_failure(&self, callback: impl FnOnce(&E) + 'static) -> &Self {
        self.on_resolve(move |outcome| {
            if let Some(error) = outcome.error() {
                callback(error);
            }
        })
    }

    pub fn is_done(&self) -> bool {
        self.slot.borrow().outcome.is_some()
    }

    /// `None` while pending.
    pub fn succeeded(&self) -> Option<bool> {
        self.slot.borrow().outcome.as_deref().map(Outcome::succeeded)
    }

    /// True only once resolved through the fetch path.
    pub fn actually_ran(&self) -> bool {
        self.slot
            .borrow()
            .outcome
            .as_deref()
            .is_some_and(Outcome::actually_ran)
    }

    pub fn outcome(&self) -> Option<Rc<Outcome<T, E>>> {
        self.slot.borrow().outcome.clone()
    }

    /// Derive a deferred value from this one.
    ///
    /// The mapped value keeps the fetched/bypassed status of the source;
    /// failures pass through unchanged.
    pub fn then<U: 'static>(&self, map: impl FnOnce(&T) -> U + 'static) -> Deferred<U, E>
    where
        E: Clone,
    {
        let mapped = Deferred::new(&self.scheduler);
        let target = mapped.clone();
        self.on_resolve(move |outcome| {
            let result = match outcome {
                Outcome::Fetched(v) => target.resolve_success(map(v)),
                Outcome::Bypassed(v) => target.resolve_bypassed(map(v)),
                Outcome::Failed(e) => target.resolve_failure(e.clone()),
            };
            if let Err(error) = result {
                log::error!("Failed to resolve mapped deferred value: {error}");
            }
        });
        mapped
    }

    /// Future that completes with the outcome.
    ///
    /// Fails with [`DeferredError::Abandoned`] if every handle is dropped
    /// while the value is still pending.
    pub fn wait(&self) -> impl Future<Output = Result<Outcome<T, E>, DeferredError>> + 'static
    where
        T: Clone,
        E: Clone,
    {
        let (sender, receiver) = oneshot::channel();
        let resolved = self.slot.borrow().outcome.clone();
        match resolved {
            Some(outcome) => {
                let _ = sender.send((*outcome).clone());
            }
            None => {
                self.slot.borrow_mut().callbacks.push(Box::new(move |outcome| {
                    let _ = sender.send(outcome.clone());
                }));
            }
        }
        async move { receiver.await.map_err(|_| DeferredError::Abandoned) }
    }
}

/// Deferred pair that resolves once both inputs have.
///
/// Fails with the first input's error if it failed, otherwise with the second
/// input's error. The pair counts as bypassed only if both inputs were bypassed.
pub fn combine<T, U, E>(first: &Deferred<T, E>, second: &Deferred<U, E>) -> Deferred<(T, U), E>
where
    T: Clone + 'static,
    U: Clone + 'static,
    E: Clone + 'static,
{
    let combined = Deferred::new(&first.scheduler);

    let settle = {
        let (first, second, combined) = (first.clone(), second.clone(), combined.clone());
        move || {
            // Both inputs may already be resolved, in which case both
            // callbacks reach this point
            if combined.is_done() {
                return;
            }
            let (Some(a), Some(b)) = (first.outcome(), second.outcome()) else {
                return;
            };
            let result = match (a.as_ref(), b.as_ref()) {
                (Outcome::Failed(e), _) | (_, Outcome::Failed(e)) => {
                    combined.resolve_failure(e.clone())
                }
                (Outcome::Bypassed(x), Outcome::Bypassed(y)) => {
                    combined.resolve_bypassed((x.clone(), y.clone()))
                }
                (x, y) => match (x.value(), y.value()) {
                    (Some(x), Some(y)) => combined.resolve_success((x.clone(), y.clone())),
                    _ => Ok(()),
                },
            };
            if let Err(error) = result {
                log::error!("Failed to resolve combined deferred value: {error}");
            }
        }
    };

    let settle_again = settle.clone();
    first.on_resolve(move |_| settle());
    second.on_resolve(move |_| settle_again());
    combined
}
