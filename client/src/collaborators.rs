// src/collaborators.rs

//! Seams to the rendering layer: navigation and user-visible error display.

/// Router of the hosting UI.
pub trait Navigator: Send + Sync {
    fn redirect_to_login(&self, login_path: &str);
}

/// User-visible error display (toast, banner, ...).
pub trait ErrorReporter: Send + Sync {
    fn show_error(&self, message: &str);
}

/// Headless collaborators that only log. Used by the binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogCollaborators;

impl Navigator for LogCollaborators {
    fn redirect_to_login(&self, login_path: &str) {
        tracing::warn!("Session rejected by the server, redirecting to {}", login_path);
    }
}

impl ErrorReporter for LogCollaborators {
    fn show_error(&self, message: &str) {
        tracing::error!("{}", message);
    }
}
