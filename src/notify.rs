// src/notify.rs

//! User-visible notification sink.
//!
//! The coordinator and controller never render UI themselves; they raise
//! notifications through this seam so a host runtime (or a test) decides
//! how to surface them.

use std::sync::Mutex;

/// Kind of a raised notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Failure,
    Info,
    Welcome,
}

/// Sink for user-visible notifications and opened surfaces.
pub trait NotificationSink: Send + Sync {
    /// Raise a notification.
    fn notify(&self, kind: NotificationKind, title: &str, message: &str);

    /// Open a user-facing surface (welcome page, remote search view).
    fn open_surface(&self, url: &str);
}

/// Default sink that routes notifications to the log.
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, kind: NotificationKind, title: &str, message: &str) {
        match kind {
            NotificationKind::Failure => log::error!("[{title}] {message}"),
            NotificationKind::Success | NotificationKind::Info | NotificationKind::Welcome => {
                log::info!("[{title}] {message}")
            }
        }
    }

    fn open_surface(&self, url: &str) {
        log::info!("Open: {url}");
    }
}

/// Recording sink for tests and embedders that render notifications
/// themselves.
#[derive(Default)]
pub struct MemoryNotifier {
    notifications: Mutex<Vec<(NotificationKind, String, String)>>,
    surfaces: Mutex<Vec<String>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of raised notifications in order.
    pub fn notifications(&self) -> Vec<(NotificationKind, String, String)> {
        self.notifications.lock().expect("notifier poisoned").clone()
    }

    /// Snapshot of opened surface URLs in order.
    pub fn surfaces(&self) -> Vec<String> {
        self.surfaces.lock().expect("notifier poisoned").clone()
    }
}

impl NotificationSink for MemoryNotifier {
    fn notify(&self, kind: NotificationKind, title: &str, message: &str) {
        self.notifications
            .lock()
            .expect("notifier poisoned")
            .push((kind, title.to_string(), message.to_string()));
    }

    fn open_surface(&self, url: &str) {
        self.surfaces
            .lock()
            .expect("notifier poisoned")
            .push(url.to_string());
    }
}
