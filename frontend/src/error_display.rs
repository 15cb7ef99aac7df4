use futures_signals::signal::Signal;
use futures_signals::signal_vec::{MutableVec, SignalVec, SignalVecExt};
use shared::UiSection;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Notification variant for styling different types of toasts
#[derive(Debug, Clone, PartialEq, Copy, Default)]
pub enum NotificationVariant {
    /// Red styling for errors
    #[default]
    Error,
    /// Amber styling for recoverable problems the user should know about
    Warning,
    /// Blue styling for informational messages
    Info,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorAlert {
    pub id: String,
    pub title: String,
    pub message: String,
    pub technical_error: String, // Raw technical error for console logging
    pub auto_dismiss_ms: u64,
    pub variant: NotificationVariant,
}

impl ErrorAlert {
    /// A failed server call, prefixed with what the viewer was trying to do.
    /// A server error without text is shown as `fallback`.
    pub fn new_remote_call_error(context: &str, error: &str, fallback: &str) -> Self {
        let friendly = if error.trim().is_empty() {
            fallback.to_string()
        } else {
            make_error_user_friendly(error)
        };
        Self {
            id: next_alert_id("rpc_error"),
            title: "Server Error".to_string(),
            message: format!("{}: {}", context, friendly),
            technical_error: format!("{}: {}", context, error),
            auto_dismiss_ms: 0,
            variant: NotificationVariant::Error,
        }
    }

    pub fn new_invalid_sample_class_warning(sample_class: &str) -> Self {
        Self {
            id: next_alert_id("sample_class_warning"),
            title: "Sample Class Unavailable".to_string(),
            message: "The chosen sample class is not available in the chosen datasets; \
                      the closest valid one was selected instead."
                .to_string(),
            technical_error: format!("Invalid sample class for datasets: {}", sample_class),
            auto_dismiss_ms: 5000,
            variant: NotificationVariant::Warning,
        }
    }

    pub fn new_storage_error(key: &str, error: &str) -> Self {
        Self {
            id: next_alert_id("storage_error"),
            title: "Storage Error".to_string(),
            message: "Your selections could not be saved in this browser.".to_string(),
            technical_error: format!("Storage error for {}: {}", key, error),
            auto_dismiss_ms: 5000,
            variant: NotificationVariant::Warning,
        }
    }

    pub fn new_info(title: &str, message: &str) -> Self {
        Self {
            id: next_alert_id("info"),
            title: title.to_string(),
            message: message.to_string(),
            technical_error: String::new(),
            auto_dismiss_ms: 3000,
            variant: NotificationVariant::Info,
        }
    }
}

pub fn make_error_user_friendly(error: &str) -> String {
    let error_lower = error.to_lowercase();

    if error_lower.contains("timeout") || error_lower.contains("timed out") {
        "The server took too long to respond. Please try again.".to_string()
    } else if error_lower.contains("connection") || error_lower.contains("network") {
        "Connection error. Please check your network connection.".to_string()
    } else if error_lower.contains("session") && error_lower.contains("expired") {
        "Your session has expired. Please reload the page.".to_string()
    } else {
        // Keep original error but make it more presentable
        error.trim().to_string()
    }
}

// Global toast management
static TOAST_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn next_alert_id(kind: &str) -> String {
    format!("{}_{}", kind, TOAST_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Active notifications, newest last. Clones share the same list.
#[derive(Clone)]
pub struct Alerts {
    active_toasts: MutableVec<ErrorAlert>,
    default_error_message: Rc<str>,
}

impl Default for Alerts {
    fn default() -> Self {
        Self::with_default_error_message(&UiSection::default().default_error_message)
    }
}

impl Alerts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_error_message(message: &str) -> Self {
        Self {
            active_toasts: MutableVec::new(),
            default_error_message: Rc::from(message),
        }
    }

    /// Shown in place of a server error that carries no text
    pub fn default_error_message(&self) -> &str {
        &self.default_error_message
    }

    pub fn add(&self, alert: ErrorAlert) {
        match alert.variant {
            NotificationVariant::Error => log::error!("{}", alert.technical_error),
            NotificationVariant::Warning => log::warn!("{}", alert.technical_error),
            NotificationVariant::Info => log::info!("{}: {}", alert.title, alert.message),
        }
        self.active_toasts.lock_mut().push_cloned(alert);
    }

    pub fn dismiss(&self, id: &str) -> bool {
        let mut toasts = self.active_toasts.lock_mut();
        match toasts.iter().position(|alert| alert.id == id) {
            Some(index) => {
                toasts.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        self.active_toasts.lock_mut().clear();
    }

    pub fn snapshot(&self) -> Vec<ErrorAlert> {
        self.active_toasts.lock_ref().to_vec()
    }

    pub fn count(&self, variant: NotificationVariant) -> usize {
        self.active_toasts
            .lock_ref()
            .iter()
            .filter(|alert| alert.variant == variant)
            .count()
    }

    pub fn active_toasts_signal_vec(&self) -> impl SignalVec<Item = ErrorAlert> + use<> {
        self.active_toasts.signal_vec_cloned()
    }

    pub fn len_signal(&self) -> impl Signal<Item = usize> + use<> {
        self.active_toasts.signal_vec_cloned().len()
    }
}
