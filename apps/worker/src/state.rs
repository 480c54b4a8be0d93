use std::sync::Arc;

use crate::store::JobStore;

/// Shared state injected into the status/enqueue route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
}
