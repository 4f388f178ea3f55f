use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

mod data;
pub use data::*;

mod pg;
pub use pg::*;

mod memory;
pub use memory::*;

pub type Result<T> = std::result::Result<T, DatabaseError>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// An unknown or internal error happened with the database
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A resource in the database doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
}

impl DatabaseError {
    pub fn corrupt(resource: &'static str, detail: String) -> Self {
        Self::Internal(format!("corrupt {resource} record: {detail}").into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Helper trait to reduce boilerplate
pub trait IntoDatabaseError {
    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError;
    fn any(self) -> DatabaseError;
}

/// Represents a type that can fetch and mutate platform data in a database.
///
/// Everything with real invariants lives behind this trait: the atomic
/// find-or-create for sessions, the destructive FIFO drain of the signaling
/// mailbox, and the one-shot settlement of a private show.
#[async_trait]
pub trait Database: Send + Sync {
    /// Resolves a bearer token issued by the identity service
    async fn user_by_token(&self, token: &str) -> Result<UserData>;

    async fn model_by_user_id(&self, user_id: &str) -> Result<ModelProfileData>;
    async fn list_live_models(&self) -> Result<Vec<ModelProfileData>>;
    /// Counts models that are available or were online since the given time
    async fn count_online_models(&self, active_since: DateTime<Utc>) -> Result<i64>;
    async fn update_model_status(&self, update: ModelStatusUpdate) -> Result<ModelProfileData>;
    async fn update_model_thumbnail(&self, user_id: &str, thumbnail: &str) -> Result<()>;
    /// Increments the model's aggregate viewer counter
    async fn add_model_viewer(&self, user_id: &str) -> Result<()>;

    async fn viewer_by_user_id(&self, user_id: &str) -> Result<ViewerProfileData>;

    /// The unique session with status `active` for (model, kind), if any
    async fn active_session(&self, model_id: &str, kind: SessionKind) -> Result<SessionData>;
    async fn session_by_id(&self, session_id: &str) -> Result<SessionData>;
    /// Inserts the session unless an active one already exists for the same
    /// (model, kind), in which case the existing one is returned. The
    /// check-and-insert must be atomic; the returned flag is true when the
    /// new session was inserted.
    async fn find_or_create_session(&self, new_session: NewSession) -> Result<(SessionData, bool)>;
    async fn end_session(&self, session_id: &str, ended_at: DateTime<Utc>) -> Result<()>;

    async fn create_participant(&self, new_participant: NewParticipant) -> Result<ParticipantData>;
    /// Active participants of a session
    async fn count_session_participants(&self, session_id: &str) -> Result<i64>;

    async fn create_signal(&self, new_signal: NewSignal) -> Result<SignalData>;
    /// Atomically removes and returns all pending signals addressed to the
    /// recipient within the session, oldest first.
    async fn drain_signals(&self, session_id: &str, recipient_id: &str) -> Result<Vec<SignalData>>;

    async fn create_show(&self, new_show: NewShow) -> Result<PrivateShowData>;
    async fn show_by_id(&self, show_id: &str) -> Result<PrivateShowData>;
    /// Transitions the show from `requested` to `active`. Returns None when
    /// the show is no longer in the `requested` state.
    async fn activate_show(
        &self,
        show_id: &str,
        started_at: DateTime<Utc>,
    ) -> Result<Option<PrivateShowData>>;
    /// Applies the settlement as one atomic unit: terminal status write,
    /// conditional viewer debit, model credit, and two ledger entries. A show
    /// that is no longer `active` settles nothing; a viewer balance below the
    /// cost ends the show unpaid with no balance mutation on either side.
    async fn settle_show(&self, settlement: ShowSettlement) -> Result<SettlementOutcome>;
}

#[derive(Debug)]
pub struct ModelStatusUpdate {
    pub user_id: PrimaryKey,
    pub is_live: bool,
    pub is_available: bool,
    pub last_online: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewSession {
    pub id: PrimaryKey,
    pub model_id: PrimaryKey,
    pub created_by: PrimaryKey,
    pub kind: SessionKind,
    pub broadcast_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewParticipant {
    pub id: PrimaryKey,
    pub session_id: PrimaryKey,
    pub viewer_id: PrimaryKey,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewSignal {
    pub id: PrimaryKey,
    pub session_id: PrimaryKey,
    pub from_user_id: PrimaryKey,
    pub to_user_id: PrimaryKey,
    pub kind: SignalKind,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewShow {
    pub id: PrimaryKey,
    pub viewer_id: PrimaryKey,
    pub model_id: PrimaryKey,
    pub rate_per_minute: i64,
    pub created_at: DateTime<Utc>,
}

/// The amounts a settlement applies, computed by the ledger up front
#[derive(Debug, Clone)]
pub struct ShowSettlement {
    pub show_id: PrimaryKey,
    pub viewer_id: PrimaryKey,
    pub model_id: PrimaryKey,
    pub ended_at: DateTime<Utc>,
    pub duration_minutes: i64,
    pub total_cost: i64,
    pub platform_fee: i64,
    pub model_earnings: i64,
}

#[derive(Debug)]
pub enum SettlementOutcome {
    /// The viewer was debited and the model credited
    Settled(PrivateShowData),
    /// The balance did not cover the cost; the show ended unpaid
    InsufficientFunds(PrivateShowData),
    /// The show was not `active` anymore, nothing was applied
    AlreadySettled,
}
