//! Shared fixtures for the unit tests

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    BootstrapConfig, Broadcast, Core, Database, GatewayError, GatewayResult, MediaGateway,
    MemoryDatabase, ModelProfileData, UserData, UserRole,
};

/// A gateway that never talks to anything, records what was asked of it, and
/// can be told to start failing
#[derive(Default)]
pub struct MockGateway {
    fail_create: AtomicBool,
    fail_teardown: AtomicBool,
    pub created: Mutex<Vec<String>>,
    pub started: Mutex<Vec<String>>,
    pub stopped: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
}

impl MockGateway {
    pub fn fail_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    pub fn fail_teardown(&self) {
        self.fail_teardown.store(true, Ordering::SeqCst);
    }

    fn refusal() -> GatewayError {
        GatewayError::Response {
            status: 503,
            message: "mock refusal".to_string(),
        }
    }
}

#[async_trait]
impl MediaGateway for MockGateway {
    async fn create_broadcast(
        &self,
        external_id: &str,
        display_name: &str,
        _is_public: bool,
    ) -> GatewayResult<Broadcast> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Self::refusal());
        }

        self.created.lock().push(external_id.to_string());

        Ok(Broadcast {
            stream_id: external_id.to_string(),
            status: Some("created".to_string()),
            name: Some(display_name.to_string()),
        })
    }

    async fn start_broadcast(&self, external_id: &str) -> GatewayResult<()> {
        self.started.lock().push(external_id.to_string());
        Ok(())
    }

    async fn stop_broadcast(&self, external_id: &str) -> GatewayResult<()> {
        if self.fail_teardown.load(Ordering::SeqCst) {
            return Err(Self::refusal());
        }

        self.stopped.lock().push(external_id.to_string());
        Ok(())
    }

    async fn delete_broadcast(&self, external_id: &str) -> GatewayResult<()> {
        if self.fail_teardown.load(Ordering::SeqCst) {
            return Err(Self::refusal());
        }

        self.deleted.lock().push(external_id.to_string());
        Ok(())
    }

    async fn bootstrap_config(&self) -> GatewayResult<BootstrapConfig> {
        Ok(BootstrapConfig::fallback())
    }

    async fn health_check(&self) -> bool {
        true
    }
}

pub struct TestCore {
    pub core: Core,
    pub db: Arc<MemoryDatabase>,
    pub gateway: Arc<MockGateway>,
}

/// A core over an empty in-memory database and a mock gateway. Tests seed the
/// database through the returned handle.
pub fn test_core() -> TestCore {
    let db = Arc::new(MemoryDatabase::new());
    let gateway = Arc::new(MockGateway::default());

    let core = Core::new(
        Arc::clone(&db) as Arc<dyn Database>,
        Arc::clone(&gateway) as Arc<dyn MediaGateway>,
    );

    TestCore { core, db, gateway }
}

pub fn viewer_user(id: &str) -> UserData {
    UserData {
        id: id.to_string(),
        username: id.to_string(),
        display_name: id.to_string(),
        role: UserRole::Viewer,
    }
}

pub fn model_user(id: &str) -> UserData {
    UserData {
        id: id.to_string(),
        username: id.to_string(),
        display_name: id.to_string(),
        role: UserRole::Model,
    }
}

/// An available, live model profile with zeroed counters
pub fn live_model_profile(user_id: &str) -> ModelProfileData {
    ModelProfileData {
        user_id: user_id.to_string(),
        is_live: true,
        is_available: true,
        show_rate: 20,
        total_viewers: 0,
        total_shows: 0,
        total_earnings: 0,
        available_balance: 0,
        last_online: None,
        thumbnail: None,
    }
}
