//! Terminal stand-in for page navigation.

use std::io::Write;
use std::sync::Mutex;
use std::sync::PoisonError;

use examguard_core::{Navigator, Route};

/// Prints notifications to stderr and remembers where the user was sent.
///
/// A terminal has no pages; "navigating" ends the current command and tells
/// the user what to run next.
#[derive(Debug, Default)]
pub struct TerminalNavigator {
    last_route: Mutex<Option<Route>>,
}

impl TerminalNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent navigation target, if any.
    pub fn last_route(&self) -> Option<Route> {
        *self
            .last_route
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Navigator for TerminalNavigator {
    fn notify(&self, message: &str) {
        // Raw mode may be active: return the carriage explicitly.
        let mut err = std::io::stderr().lock();
        let _ = write!(err, "\r\n*** {message} ***\r\n");
        let _ = err.flush();
    }

    fn navigate(&self, route: Route) {
        log::info!("navigating to {route}");
        *self
            .last_route
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(route);
        let hint = match route {
            Route::Login => "session ended; sign in again with `examguard login <email>`",
            Route::Dashboard => "returned to dashboard",
        };
        let mut err = std::io::stderr().lock();
        let _ = write!(err, "\r\n-> {} ({hint})\r\n", route.path());
        let _ = err.flush();
    }
}
