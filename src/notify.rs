//! User-facing notifications
//!
//! Rendering (toasts, message boxes) belongs to the host shell. The library
//! only decides what to say; [`ConsoleNotifier`] is the fallback renderer.

use std::fmt;

/// Severity of a notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// A short message for the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            title: "PDF Merge".to_string(),
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            title: "PDF Merge - Error".to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.message)
    }
}

/// Capability to show a notice
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &Notice);
}

/// Prints notices: errors to stderr, everything else to stdout
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notice: &Notice) {
        match notice.level {
            NoticeLevel::Error => eprintln!("{}", notice),
            NoticeLevel::Info => println!("{}", notice),
        }
    }
}
