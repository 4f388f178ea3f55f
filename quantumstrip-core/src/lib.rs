//! The domain layer of the platform: streaming sessions, WebRTC signaling
//! relay, private show billing, and the media server gateway. The HTTP crate
//! wraps this without adding behavior of its own.

use std::sync::Arc;

mod db;
mod gateway;
mod sessions;
mod shows;
mod util;

#[cfg(test)]
mod testing;

pub use db::*;
pub use gateway::*;
pub use sessions::*;
pub use shows::*;
pub use util::random_string;

/// What every subsystem needs access to
#[derive(Clone)]
pub struct CoreContext {
    pub database: Arc<dyn Database>,
    pub gateway: Arc<dyn MediaGateway>,
}

/// The entrypoint to everything the platform does
pub struct Core {
    context: CoreContext,

    pub sessions: SessionCoordinator,
    pub shows: PrivateShowLedger,
}

impl Core {
    pub fn new(database: Arc<dyn Database>, gateway: Arc<dyn MediaGateway>) -> Self {
        let context = CoreContext { database, gateway };

        let sessions = SessionCoordinator::new(&context);
        let shows = PrivateShowLedger::new(&context);

        Self {
            context,
            sessions,
            shows,
        }
    }

    /// Resolves the user a bearer token belongs to
    pub async fn user_by_token(&self, token: &str) -> Result<UserData> {
        self.context.database.user_by_token(token).await
    }

    /// Whether the external media server is reachable
    pub async fn healthy(&self) -> bool {
        self.context.gateway.health_check().await
    }
}
