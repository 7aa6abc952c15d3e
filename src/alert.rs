//! Non-blocking user notifications ("toasts").
use std::sync::Mutex;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Error,
    Info,
    Success,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub level: AlertLevel,
    pub message: String,
    pub title: Option<String>,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, alert: Alert);

    fn error(&self, message: &str, title: Option<&str>) {
        self.notify(Alert::new(AlertLevel::Error, message, title));
    }

    fn info(&self, message: &str, title: Option<&str>) {
        self.notify(Alert::new(AlertLevel::Info, message, title));
    }

    fn success(&self, message: &str, title: Option<&str>) {
        self.notify(Alert::new(AlertLevel::Success, message, title));
    }

    fn warning(&self, message: &str, title: Option<&str>) {
        self.notify(Alert::new(AlertLevel::Warning, message, title));
    }
}

impl Alert {
    pub fn new(level: AlertLevel, message: &str, title: Option<&str>) -> Self {
        Self {
            level,
            message: message.to_string(),
            title: title.map(str::to_string),
        }
    }
}

/// Writes each toast to the log at the matching level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, alert: Alert) {
        let title = alert.title.as_deref().unwrap_or("");
        match alert.level {
            AlertLevel::Error => error!(title, "Error: {}", alert.message),
            AlertLevel::Info => info!(title, "Info: {}", alert.message),
            AlertLevel::Success => info!(title, "Success: {}", alert.message),
            AlertLevel::Warning => warn!(title, "Warning: {}", alert.message),
        }
    }
}

/// Keeps every alert; used by tests and by callers that render alerts themselves.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingNotifier {
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<Alert> {
        self.alerts().pop()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, alert: Alert) {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push(alert);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_notifier_keeps_order() {
        let notifier = RecordingNotifier::default();
        notifier.success("Mailing successfully saved!", None);
        notifier.error("There are some errors.", Some("Network"));
        let alerts = notifier.alerts();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].level, AlertLevel::Success);
        assert_eq!(alerts[1].title.as_deref(), Some("Network"));
        assert_eq!(notifier.last().unwrap().level, AlertLevel::Error);
    }
}
