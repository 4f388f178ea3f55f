use chrono::{DateTime, Utc};
use serde_json::Value;

/// The type used for primary keys in the database.
pub type PrimaryKey = String;

/// The role a user was given by the identity service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserRole {
    Viewer,
    Model,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Model => "model",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "viewer" => Some(Self::Viewer),
            "model" => Some(Self::Model),
            _ => None,
        }
    }
}

/// A platform account. Registration and token issuance belong to the
/// identity service, this is only the mirrored record.
#[derive(Debug, Clone)]
pub struct UserData {
    pub id: PrimaryKey,
    pub username: String,
    pub display_name: String,
    pub role: UserRole,
}

/// The streaming profile of a model account
#[derive(Debug, Clone)]
pub struct ModelProfileData {
    /// Keyed by the model's user id, there is no separate profile id
    pub user_id: PrimaryKey,
    pub is_live: bool,
    pub is_available: bool,
    /// Tokens per minute for private shows
    pub show_rate: i64,
    pub total_viewers: i64,
    pub total_shows: i64,
    pub total_earnings: i64,
    pub available_balance: i64,
    pub last_online: Option<DateTime<Utc>>,
    pub thumbnail: Option<String>,
}

/// The token wallet of a viewer account
#[derive(Debug, Clone)]
pub struct ViewerProfileData {
    pub user_id: PrimaryKey,
    pub token_balance: i64,
    pub total_spent: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Public,
    Private,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "public" => Some(Self::Public),
            "private" => Some(Self::Private),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Ended,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Ended => "ended",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "ended" => Some(Self::Ended),
            _ => None,
        }
    }
}

/// One logical streaming session, shared between the broadcasting model and
/// every viewer that joins it. Never deleted, only status-transitioned.
#[derive(Debug, Clone)]
pub struct SessionData {
    pub id: PrimaryKey,
    pub model_id: PrimaryKey,
    /// The user that brought the session into existence
    pub created_by: PrimaryKey,
    pub kind: SessionKind,
    pub status: SessionStatus,
    /// The broadcast object identifier on the external media server
    pub broadcast_id: String,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl SessionData {
    /// Whether the given user is one of the two parties of this session
    pub fn is_party(&self, user_id: &str) -> bool {
        self.model_id == user_id || self.created_by == user_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantStatus {
    Active,
    Left,
}

impl ParticipantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Left => "left",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "left" => Some(Self::Left),
            _ => None,
        }
    }
}

/// A viewer that joined an existing session. Best-effort bookkeeping, the
/// session does not depend on these records to be torn down.
#[derive(Debug, Clone)]
pub struct ParticipantData {
    pub id: PrimaryKey,
    pub session_id: PrimaryKey,
    pub viewer_id: PrimaryKey,
    pub joined_at: DateTime<Utc>,
    pub status: ParticipantStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::IceCandidate => "ice-candidate",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "offer" => Some(Self::Offer),
            "answer" => Some(Self::Answer),
            "ice-candidate" => Some(Self::IceCandidate),
            _ => None,
        }
    }
}

/// A pending WebRTC negotiation message. One-shot: deleted as a batch when
/// the recipient drains its mailbox.
#[derive(Debug, Clone)]
pub struct SignalData {
    pub id: PrimaryKey,
    pub session_id: PrimaryKey,
    pub from_user_id: PrimaryKey,
    pub to_user_id: PrimaryKey,
    pub kind: SignalKind,
    /// Opaque SDP or ICE blob, passed through untouched
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowStatus {
    Requested,
    Active,
    Completed,
    EndedInsufficientFunds,
}

impl ShowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::EndedInsufficientFunds => "ended_insufficient_funds",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "requested" => Some(Self::Requested),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "ended_insufficient_funds" => Some(Self::EndedInsufficientFunds),
            _ => None,
        }
    }
}

/// A private show and its billing state
#[derive(Debug, Clone)]
pub struct PrivateShowData {
    pub id: PrimaryKey,
    pub viewer_id: PrimaryKey,
    pub model_id: PrimaryKey,
    pub rate_per_minute: i64,
    pub status: ShowStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
    pub total_cost: Option<i64>,
}

impl PrivateShowData {
    pub fn is_party(&self, user_id: &str) -> bool {
        self.viewer_id == user_id || self.model_id == user_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    PrivateShow,
    Earning,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrivateShow => "private_show",
            Self::Earning => "earning",
        }
    }
}

/// A token ledger entry
#[derive(Debug, Clone)]
pub struct TransactionData {
    pub id: PrimaryKey,
    pub user_id: PrimaryKey,
    pub kind: TransactionKind,
    pub tokens: i64,
    pub description: String,
    pub show_id: Option<PrimaryKey>,
    pub created_at: DateTime<Utc>,
}
