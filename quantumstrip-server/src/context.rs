use std::sync::Arc;

use axum::extract::FromRef;
use quantumstrip_core::Core;

#[derive(Clone, FromRef)]
pub struct ServerContext {
    pub core: Arc<Core>,
    /// Tokens per minute charged for private shows
    pub show_rate: i64,
}
