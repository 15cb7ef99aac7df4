//! Core dataflow primitives for the viewer's asynchronous state
//!
//! This module provides the building blocks that are independent of the
//! Toxygates domain:
//!
//! - **[`EventLoop`] / [`Scheduler`]** - single-threaded task queue with
//!   "run on a later turn" semantics
//! - **[`Deferred`]** - single-assignment value that records whether it was
//!   fetched or bypassed, with ordered completion callbacks
//! - **[`PendingRequests`]** - in-flight request counter driving the wait indicator
//! - **[`PersistedField`]** - named value mirrored in a client-side store
//!
//! # Threading
//!
//! Everything here is `!Send` and lives on the UI thread. Callbacks never run
//! concurrently; they interleave only at resolution points.

pub mod deferred;
pub mod pending;
pub mod persisted;
pub mod scheduler;

pub use deferred::{Deferred, DeferredError, Outcome, combine};
pub use pending::{PendingError, PendingRequests, WaitDialog, WaitIndicator};
pub use persisted::{
    ItemListsCodec, JsonCodec, KeyValueStore, LoadOutcome, MemoryStore, PersistedField,
    StateCodec, StorageError,
};
pub use scheduler::{EventLoop, Scheduler};
