//! Shared application state for all routes.

use crate::bootstrap::Runtime;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    /// Frozen after bootstrap; read concurrently by every request.
    pub runtime: Arc<Runtime>,
}

impl AppState {
    pub fn new(runtime: Runtime) -> Self {
        AppState {
            runtime: Arc::new(runtime),
        }
    }
}
