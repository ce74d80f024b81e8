use std::sync::Arc;

use crate::coach::Coach;
use crate::config::Config;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub coach: Arc<Coach>,
    pub config: Config,
}
