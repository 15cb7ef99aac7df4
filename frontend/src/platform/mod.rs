//! Platform abstraction layer for the Toxygates viewer
//!
//! Provides the interface between the viewer state and the outside world:
//! the remote sample service and, in the browser, the client-side store.

use std::collections::BTreeSet;
use thiserror::Error;

use shared::{Attribute, DatasetId, Sample, SampleClass};

use crate::dataflow::{Deferred, PendingRequests};
use crate::error_display::{Alerts, ErrorAlert};

#[cfg(feature = "web")]
pub mod web;
#[cfg(feature = "web")]
pub use web::LocalStorage;

#[cfg(test)]
pub(crate) mod testing;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error("Connection failed: {0}")]
    Transport(String),
    #[error("{0}")]
    Server(String),
}

/// Reply slot of a sample service call.
pub type Reply<T> = Deferred<T, ServiceError>;

/// Remote sample service. Every call completes by resolving `reply` exactly
/// once, possibly before the call returns.
pub trait SampleService {
    /// Restrict the service session to `datasets`; replies with the sample
    /// classes available in them.
    fn choose_datasets(&self, datasets: &BTreeSet<DatasetId>, reply: Reply<Vec<SampleClass>>);

    /// Distinct values of `parameter` among samples matching `sample_class`.
    fn parameter_values(
        &self,
        sample_class: &SampleClass,
        parameter: Attribute,
        reply: Reply<Vec<String>>,
    );

    fn samples_by_id(&self, ids: &[String], reply: Reply<Vec<Sample>>);

    fn samples(&self, sample_class: &SampleClass, reply: Reply<Vec<Sample>>);
}

/// Show the wait indicator until `reply` resolves; on failure, alert the user
/// with `failure_message` followed by the error.
pub fn begin_pending_request<T: 'static>(
    reply: &Reply<T>,
    pending: &PendingRequests,
    alerts: &Alerts,
    failure_message: &str,
) {
    pending.track(reply);
    let alerts = alerts.clone();
    let failure_message = failure_message.to_string();
    reply.on_failure(move |error| {
        let alert = ErrorAlert::new_remote_call_error(
            &failure_message,
            &error.to_string(),
            alerts.default_error_message(),
        );
        alerts.add(alert);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataflow::{EventLoop, WaitDialog};
    use crate::error_display::NotificationVariant;
    use std::rc::Rc;

    #[test]
    fn test_failed_request_alerts_and_ends() {
        let event_loop = EventLoop::new();
        let dialog = Rc::new(WaitDialog::new("Please wait..."));
        let pending = PendingRequests::new(dialog.clone());
        let alerts = Alerts::new();

        let reply: Reply<Vec<String>> = Reply::new(&event_loop.scheduler());
        begin_pending_request(&reply, &pending, &alerts, "Unable to retrieve values");
        assert!(dialog.is_visible());

        reply
            .resolve_failure(ServiceError::Server("no such dataset".into()))
            .unwrap();
        assert!(!dialog.is_visible());
        let shown = alerts.snapshot();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].variant, NotificationVariant::Error);
        assert_eq!(shown[0].message, "Unable to retrieve values: no such dataset");
    }

    #[test]
    fn test_blank_failure_shows_configured_message() {
        let event_loop = EventLoop::new();
        let pending = PendingRequests::new(Rc::new(WaitDialog::new("wait")));
        let alerts = Alerts::with_default_error_message("Server unavailable.");

        let reply: Reply<u32> = Reply::new(&event_loop.scheduler());
        begin_pending_request(&reply, &pending, &alerts, "Unable to choose datasets");
        reply.resolve_failure(ServiceError::Server(String::new())).unwrap();
        assert_eq!(alerts.snapshot()[0].message, "Unable to choose datasets: Server unavailable.");
    }

    #[test]
    fn test_successful_request_is_silent() {
        let event_loop = EventLoop::new();
        let pending = PendingRequests::new(Rc::new(WaitDialog::new("wait")));
        let alerts = Alerts::new();

        let reply: Reply<u32> = Reply::new(&event_loop.scheduler());
        begin_pending_request(&reply, &pending, &alerts, "unused");
        reply.resolve_success(3).unwrap();
        assert_eq!(pending.count(), 0);
        assert!(alerts.snapshot().is_empty());
    }
}
