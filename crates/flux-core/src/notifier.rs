//! Notification hook point (§4.7 `notify`, SPEC_FULL.md §H).
//!
//! Concrete delivery (webhook, desktop notification, etc.) is out of scope;
//! this crate only defines the seam and a no-op implementation so the
//! executor has something to call by default.

use crate::ast::Notify;

pub trait Notifier: Send + Sync {
    fn on_success(&self, task_name: &str, message: &str);
    fn on_failure(&self, task_name: &str, message: &str);
}

/// Default notifier: drops every notification. Swapped out by embedders
/// that want a real delivery mechanism.
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn on_success(&self, _task_name: &str, _message: &str) {}
    fn on_failure(&self, _task_name: &str, _message: &str) {}
}

pub fn dispatch(notifier: &dyn Notifier, task_name: &str, notify: &Notify, success: bool) {
    if success {
        if let Some(msg) = &notify.success {
            notifier.on_success(task_name, msg);
        }
    } else if let Some(msg) = &notify.failure {
        notifier.on_failure(task_name, msg);
    }
}
