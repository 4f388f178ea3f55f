use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, query, query_as, query_scalar, Error as SqlxError, PgPool};

use crate::util::random_string;

use super::{
    Database, DatabaseError, IntoDatabaseError, ModelProfileData, ModelStatusUpdate,
    NewParticipant, NewSession, NewShow, NewSignal, ParticipantData, ParticipantStatus,
    PrivateShowData, Result, SessionData, SessionKind, SessionStatus, SettlementOutcome,
    ShowSettlement, ShowStatus, SignalData, SignalKind, TransactionKind, UserData, UserRole,
    ViewerProfileData,
};

/// A postgres database implementation for the platform
pub struct PgDatabase {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    username: String,
    display_name: String,
    role: String,
}

#[derive(sqlx::FromRow)]
struct ModelProfileRow {
    user_id: String,
    is_live: bool,
    is_available: bool,
    show_rate: i64,
    total_viewers: i64,
    total_shows: i64,
    total_earnings: i64,
    available_balance: i64,
    last_online: Option<DateTime<Utc>>,
    thumbnail: Option<String>,
}

#[derive(sqlx::FromRow)]
struct ViewerProfileRow {
    user_id: String,
    token_balance: i64,
    total_spent: i64,
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    model_id: String,
    created_by: String,
    kind: String,
    status: String,
    broadcast_id: String,
    created_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct ParticipantRow {
    id: String,
    session_id: String,
    viewer_id: String,
    joined_at: DateTime<Utc>,
    status: String,
}

#[derive(sqlx::FromRow)]
struct SignalRow {
    id: String,
    session_id: String,
    from_user_id: String,
    to_user_id: String,
    kind: String,
    payload: Value,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ShowRow {
    id: String,
    viewer_id: String,
    model_id: String,
    rate_per_minute: i64,
    status: String,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    duration_minutes: Option<i64>,
    total_cost: Option<i64>,
}

impl TryFrom<UserRow> for UserData {
    type Error = DatabaseError;

    fn try_from(row: UserRow) -> Result<Self> {
        let role = UserRole::parse(&row.role)
            .ok_or_else(|| DatabaseError::corrupt("user", format!("unknown role {}", row.role)))?;

        Ok(Self {
            id: row.id,
            username: row.username,
            display_name: row.display_name,
            role,
        })
    }
}

impl From<ModelProfileRow> for ModelProfileData {
    fn from(row: ModelProfileRow) -> Self {
        Self {
            user_id: row.user_id,
            is_live: row.is_live,
            is_available: row.is_available,
            show_rate: row.show_rate,
            total_viewers: row.total_viewers,
            total_shows: row.total_shows,
            total_earnings: row.total_earnings,
            available_balance: row.available_balance,
            last_online: row.last_online,
            thumbnail: row.thumbnail,
        }
    }
}

impl From<ViewerProfileRow> for ViewerProfileData {
    fn from(row: ViewerProfileRow) -> Self {
        Self {
            user_id: row.user_id,
            token_balance: row.token_balance,
            total_spent: row.total_spent,
        }
    }
}

impl TryFrom<SessionRow> for SessionData {
    type Error = DatabaseError;

    fn try_from(row: SessionRow) -> Result<Self> {
        let kind = SessionKind::parse(&row.kind).ok_or_else(|| {
            DatabaseError::corrupt("session", format!("unknown kind {}", row.kind))
        })?;
        let status = SessionStatus::parse(&row.status).ok_or_else(|| {
            DatabaseError::corrupt("session", format!("unknown status {}", row.status))
        })?;

        Ok(Self {
            id: row.id,
            model_id: row.model_id,
            created_by: row.created_by,
            kind,
            status,
            broadcast_id: row.broadcast_id,
            created_at: row.created_at,
            ended_at: row.ended_at,
        })
    }
}

impl TryFrom<ParticipantRow> for ParticipantData {
    type Error = DatabaseError;

    fn try_from(row: ParticipantRow) -> Result<Self> {
        let status = ParticipantStatus::parse(&row.status).ok_or_else(|| {
            DatabaseError::corrupt("participant", format!("unknown status {}", row.status))
        })?;

        Ok(Self {
            id: row.id,
            session_id: row.session_id,
            viewer_id: row.viewer_id,
            joined_at: row.joined_at,
            status,
        })
    }
}

impl TryFrom<SignalRow> for SignalData {
    type Error = DatabaseError;

    fn try_from(row: SignalRow) -> Result<Self> {
        let kind = SignalKind::parse(&row.kind)
            .ok_or_else(|| DatabaseError::corrupt("signal", format!("unknown kind {}", row.kind)))?;

        Ok(Self {
            id: row.id,
            session_id: row.session_id,
            from_user_id: row.from_user_id,
            to_user_id: row.to_user_id,
            kind,
            payload: row.payload,
            created_at: row.created_at,
        })
    }
}

impl TryFrom<ShowRow> for PrivateShowData {
    type Error = DatabaseError;

    fn try_from(row: ShowRow) -> Result<Self> {
        let status = ShowStatus::parse(&row.status).ok_or_else(|| {
            DatabaseError::corrupt("private show", format!("unknown status {}", row.status))
        })?;

        Ok(Self {
            id: row.id,
            viewer_id: row.viewer_id,
            model_id: row.model_id,
            rate_per_minute: row.rate_per_minute,
            status,
            created_at: row.created_at,
            started_at: row.started_at,
            ended_at: row.ended_at,
            duration_minutes: row.duration_minutes,
            total_cost: row.total_cost,
        })
    }
}

impl PgDatabase {
    pub async fn new(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        sqlx::migrate!("../migrations")
            .run(&pool)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn user_by_token(&self, token: &str) -> Result<UserData> {
        query_as::<_, UserRow>(
            "SELECT id, username, display_name, role FROM users WHERE token = $1",
        )
        .bind(token)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("user", "token"))?
        .try_into()
    }

    async fn model_by_user_id(&self, user_id: &str) -> Result<ModelProfileData> {
        query_as::<_, ModelProfileRow>("SELECT * FROM model_profiles WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("model", "user_id"))
            .map(Into::into)
    }

    async fn list_live_models(&self) -> Result<Vec<ModelProfileData>> {
        let rows = query_as::<_, ModelProfileRow>(
            "SELECT * FROM model_profiles WHERE is_live AND is_available",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn count_online_models(&self, active_since: DateTime<Utc>) -> Result<i64> {
        query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM model_profiles WHERE is_available OR last_online >= $1",
        )
        .bind(active_since)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn update_model_status(&self, update: ModelStatusUpdate) -> Result<ModelProfileData> {
        let updated = query(
            "UPDATE model_profiles SET
                is_live = $1,
                is_available = $2,
                last_online = $3
            WHERE user_id = $4",
        )
        .bind(update.is_live)
        .bind(update.is_available)
        .bind(update.last_online)
        .bind(&update.user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        if updated.rows_affected() == 0 {
            return Err(DatabaseError::NotFound {
                resource: "model",
                identifier: "user_id",
            });
        }

        self.model_by_user_id(&update.user_id).await
    }

    async fn update_model_thumbnail(&self, user_id: &str, thumbnail: &str) -> Result<()> {
        let updated = query("UPDATE model_profiles SET thumbnail = $1 WHERE user_id = $2")
            .bind(thumbnail)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        if updated.rows_affected() == 0 {
            return Err(DatabaseError::NotFound {
                resource: "model",
                identifier: "user_id",
            });
        }

        Ok(())
    }

    async fn add_model_viewer(&self, user_id: &str) -> Result<()> {
        query("UPDATE model_profiles SET total_viewers = total_viewers + 1 WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn viewer_by_user_id(&self, user_id: &str) -> Result<ViewerProfileData> {
        query_as::<_, ViewerProfileRow>("SELECT * FROM viewer_profiles WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("viewer", "user_id"))
            .map(Into::into)
    }

    async fn active_session(&self, model_id: &str, kind: SessionKind) -> Result<SessionData> {
        query_as::<_, SessionRow>(
            "SELECT * FROM streaming_sessions
            WHERE model_id = $1 AND kind = $2 AND status = 'active'",
        )
        .bind(model_id)
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("session", "model_id"))?
        .try_into()
    }

    async fn session_by_id(&self, session_id: &str) -> Result<SessionData> {
        query_as::<_, SessionRow>("SELECT * FROM streaming_sessions WHERE id = $1")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("session", "id"))?
            .try_into()
    }

    async fn find_or_create_session(&self, new_session: NewSession) -> Result<(SessionData, bool)> {
        // The partial unique index on (model_id, kind) WHERE status = 'active'
        // makes this insert the atomic arbiter of the one-active-session
        // invariant.
        let inserted = query(
            "INSERT INTO streaming_sessions (id, model_id, created_by, kind, status, broadcast_id, created_at)
            VALUES ($1, $2, $3, $4, 'active', $5, $6)
            ON CONFLICT (model_id, kind) WHERE status = 'active' DO NOTHING",
        )
        .bind(&new_session.id)
        .bind(&new_session.model_id)
        .bind(&new_session.created_by)
        .bind(new_session.kind.as_str())
        .bind(&new_session.broadcast_id)
        .bind(new_session.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        if inserted.rows_affected() == 1 {
            let session = self.session_by_id(&new_session.id).await?;
            Ok((session, true))
        } else {
            let existing = self
                .active_session(&new_session.model_id, new_session.kind)
                .await?;
            Ok((existing, false))
        }
    }

    async fn end_session(&self, session_id: &str, ended_at: DateTime<Utc>) -> Result<()> {
        let updated = query(
            "UPDATE streaming_sessions SET status = 'ended', ended_at = $1 WHERE id = $2",
        )
        .bind(ended_at)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        if updated.rows_affected() == 0 {
            return Err(DatabaseError::NotFound {
                resource: "session",
                identifier: "id",
            });
        }

        Ok(())
    }

    async fn create_participant(&self, new_participant: NewParticipant) -> Result<ParticipantData> {
        query_as::<_, ParticipantRow>(
            "INSERT INTO session_participants (id, session_id, viewer_id, joined_at, status)
            VALUES ($1, $2, $3, $4, 'active')
            RETURNING *",
        )
        .bind(&new_participant.id)
        .bind(&new_participant.session_id)
        .bind(&new_participant.viewer_id)
        .bind(new_participant.joined_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?
        .try_into()
    }

    async fn count_session_participants(&self, session_id: &str) -> Result<i64> {
        query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM session_participants
            WHERE session_id = $1 AND status = 'active'",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn create_signal(&self, new_signal: NewSignal) -> Result<SignalData> {
        query_as::<_, SignalRow>(
            "INSERT INTO webrtc_signals (id, session_id, from_user_id, to_user_id, kind, payload, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *",
        )
        .bind(&new_signal.id)
        .bind(&new_signal.session_id)
        .bind(&new_signal.from_user_id)
        .bind(&new_signal.to_user_id)
        .bind(new_signal.kind.as_str())
        .bind(&new_signal.payload)
        .bind(new_signal.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?
        .try_into()
    }

    async fn drain_signals(&self, session_id: &str, recipient_id: &str) -> Result<Vec<SignalData>> {
        let rows = query_as::<_, SignalRow>(
            "WITH drained AS (
                DELETE FROM webrtc_signals
                WHERE session_id = $1 AND to_user_id = $2
                RETURNING *
            )
            SELECT * FROM drained ORDER BY created_at ASC",
        )
        .bind(session_id)
        .bind(recipient_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn create_show(&self, new_show: NewShow) -> Result<PrivateShowData> {
        query_as::<_, ShowRow>(
            "INSERT INTO private_shows (id, viewer_id, model_id, rate_per_minute, status, created_at)
            VALUES ($1, $2, $3, $4, 'requested', $5)
            RETURNING *",
        )
        .bind(&new_show.id)
        .bind(&new_show.viewer_id)
        .bind(&new_show.model_id)
        .bind(new_show.rate_per_minute)
        .bind(new_show.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?
        .try_into()
    }

    async fn show_by_id(&self, show_id: &str) -> Result<PrivateShowData> {
        query_as::<_, ShowRow>("SELECT * FROM private_shows WHERE id = $1")
            .bind(show_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("private show", "id"))?
            .try_into()
    }

    async fn activate_show(
        &self,
        show_id: &str,
        started_at: DateTime<Utc>,
    ) -> Result<Option<PrivateShowData>> {
        let updated = query(
            "UPDATE private_shows SET status = 'active', started_at = $1
            WHERE id = $2 AND status = 'requested'",
        )
        .bind(started_at)
        .bind(show_id)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        if updated.rows_affected() == 0 {
            return Ok(None);
        }

        self.show_by_id(show_id).await.map(Some)
    }

    async fn settle_show(&self, settlement: ShowSettlement) -> Result<SettlementOutcome> {
        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        // Lock the show row and re-check the precondition inside the
        // transaction, so concurrent settlements apply at most once.
        let show: Option<ShowRow> = query_as(
            "SELECT * FROM private_shows WHERE id = $1 AND status = 'active' FOR UPDATE",
        )
        .bind(&settlement.show_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        if show.is_none() {
            return Ok(SettlementOutcome::AlreadySettled);
        }

        let debited = query(
            "UPDATE viewer_profiles SET
                token_balance = token_balance - $1,
                total_spent = total_spent + $1
            WHERE user_id = $2 AND token_balance >= $1",
        )
        .bind(settlement.total_cost)
        .bind(&settlement.viewer_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        if debited.rows_affected() == 0 {
            let show: ShowRow = query_as(
                "UPDATE private_shows SET
                    status = 'ended_insufficient_funds',
                    ended_at = $1,
                    duration_minutes = $2,
                    total_cost = 0
                WHERE id = $3
                RETURNING *",
            )
            .bind(settlement.ended_at)
            .bind(settlement.duration_minutes)
            .bind(&settlement.show_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| e.any())?;

            tx.commit().await.map_err(|e| e.any())?;
            return Ok(SettlementOutcome::InsufficientFunds(show.try_into()?));
        }

        query(
            "UPDATE model_profiles SET
                available_balance = available_balance + $1,
                total_earnings = total_earnings + $1,
                total_shows = total_shows + 1
            WHERE user_id = $2",
        )
        .bind(settlement.model_earnings)
        .bind(&settlement.model_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        query(
            "INSERT INTO transactions (id, user_id, kind, tokens, description, show_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7), ($8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(random_string(32))
        .bind(&settlement.viewer_id)
        .bind(TransactionKind::PrivateShow.as_str())
        .bind(settlement.total_cost)
        .bind(format!(
            "Private show ({} minutes)",
            settlement.duration_minutes
        ))
        .bind(&settlement.show_id)
        .bind(settlement.ended_at)
        .bind(random_string(32))
        .bind(&settlement.model_id)
        .bind(TransactionKind::Earning.as_str())
        .bind(settlement.model_earnings)
        .bind(format!(
            "Private show earnings ({} minutes)",
            settlement.duration_minutes
        ))
        .bind(&settlement.show_id)
        .bind(settlement.ended_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        let show: ShowRow = query_as(
            "UPDATE private_shows SET
                status = 'completed',
                ended_at = $1,
                duration_minutes = $2,
                total_cost = $3
            WHERE id = $4
            RETURNING *",
        )
        .bind(settlement.ended_at)
        .bind(settlement.duration_minutes)
        .bind(settlement.total_cost)
        .bind(&settlement.show_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        tx.commit().await.map_err(|e| e.any())?;
        Ok(SettlementOutcome::Settled(show.try_into()?))
    }
}

impl IntoDatabaseError for SqlxError {
    fn any(self) -> DatabaseError {
        DatabaseError::Internal(Box::new(self))
    }

    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError {
        match self {
            SqlxError::RowNotFound => DatabaseError::NotFound {
                resource,
                identifier,
            },
            e => Self::any(e),
        }
    }
}
