//! Shared application state

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use resound::service::Service;

use crate::auth::Authenticator;

/// State shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Engine entry point
    pub service: Service,
    /// Request authenticator
    pub auth: Arc<dyn Authenticator>,
    /// Health gate; flipped off when a shutdown signal arrives so load
    /// balancers drain the instance before the listener closes
    healthy: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(service: Service, auth: Arc<dyn Authenticator>) -> Self {
        AppState {
            service,
            auth,
            healthy: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }
}
