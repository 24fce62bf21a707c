//! Navigation seam for session teardown side effects.
//!
//! Forced logout and termination verdicts end in a user-visible notification
//! and a navigation. Both go through [`Navigator`] so they can be observed in
//! tests and replaced per environment (browser, terminal).

use std::sync::{Arc, Mutex, PoisonError};

/// Navigation targets this client ever leaves for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// The login entry point.
    Login,
    /// Away from the exam, back to the principal's landing page.
    Dashboard,
}

impl Route {
    /// Path of the route within the exam web application.
    pub fn path(self) -> &'static str {
        match self {
            Self::Login => "/login",
            Self::Dashboard => "/dashboard",
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

pub trait Navigator {
    /// Blocking user notification.
    fn notify(&self, message: &str);
    fn navigate(&self, route: Route);
}

impl<N: Navigator + ?Sized> Navigator for Arc<N> {
    fn notify(&self, message: &str) {
        (**self).notify(message)
    }

    fn navigate(&self, route: Route) {
        (**self).navigate(route)
    }
}

/// A side effect recorded by [`RecordingNavigator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationEvent {
    Notified(String),
    Navigated(Route),
}

/// Navigator that records instead of acting. Used for headless runs and tests.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    events: Mutex<Vec<NavigationEvent>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NavigationEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of navigations to `route` so far.
    pub fn navigations_to(&self, route: Route) -> usize {
        self.events()
            .iter()
            .filter(|e| **e == NavigationEvent::Navigated(route))
            .count()
    }

    pub fn notifications(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                NavigationEvent::Notified(m) => Some(m),
                NavigationEvent::Navigated(_) => None,
            })
            .collect()
    }

    fn push(&self, event: NavigationEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl Navigator for RecordingNavigator {
    fn notify(&self, message: &str) {
        self.push(NavigationEvent::Notified(message.to_string()));
    }

    fn navigate(&self, route: Route) {
        self.push(NavigationEvent::Navigated(route));
    }
}
