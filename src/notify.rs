//! Notification collaborator interface
//!
//! Mirrors the browser notification permission model: a tool may only show
//! a notification after the permission query/request dance succeeds.

/// Outcome of a permission query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
    /// The user has not been asked yet
    Undecided,
}

/// Fire-and-forget notification surface
pub trait Notifier: Send + Sync {
    /// Current permission state without prompting the user
    fn permission(&self) -> Permission;

    /// Prompt the user and return the resulting state
    fn request_permission(&self) -> Permission;

    /// Show a notification; delivery is best-effort
    fn notify(&self, title: &str, body: &str);
}

/// Headless notifier that writes notifications to the log
#[derive(Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl Notifier for LogNotifier {
    fn permission(&self) -> Permission {
        Permission::Granted
    }

    fn request_permission(&self) -> Permission {
        Permission::Granted
    }

    fn notify(&self, title: &str, body: &str) {
        tracing::info!(title, body, "notification");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_notifier_always_granted() {
        let notifier = LogNotifier::new();
        assert_eq!(notifier.permission(), Permission::Granted);
        assert_eq!(notifier.request_permission(), Permission::Granted);
        notifier.notify("Hearth", "hello");
    }

    #[test]
    fn test_permission_equality() {
        assert_eq!(Permission::Granted, Permission::Granted);
        assert_ne!(Permission::Granted, Permission::Denied);
        assert_ne!(Permission::Denied, Permission::Undecided);
    }
}
