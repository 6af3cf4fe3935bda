//! Shared application state

use std::sync::Arc;

use tally_objects::CounterRouter;

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Routes each counter key to its live instance
    pub router: Arc<CounterRouter>,
}

impl AppState {
    pub fn new(router: CounterRouter) -> Self {
        Self {
            router: Arc::new(router),
        }
    }
}
