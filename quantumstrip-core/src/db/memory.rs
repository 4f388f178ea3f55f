use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::util::random_string;

use super::{
    Database, DatabaseError, ModelProfileData, ModelStatusUpdate, NewParticipant, NewSession,
    NewShow, NewSignal, ParticipantData, ParticipantStatus, PrivateShowData, Result, SessionData,
    SessionKind, SessionStatus, SettlementOutcome, ShowSettlement, ShowStatus, SignalData,
    TransactionData, TransactionKind, UserData, ViewerProfileData,
};

/// An in-memory database used by unit tests and local development. A single
/// lock over the whole state gives every operation the atomicity the
/// coordinator and ledger rely on.
#[derive(Default)]
pub struct MemoryDatabase {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    users: Vec<UserData>,
    tokens: HashMap<String, String>,
    models: HashMap<String, ModelProfileData>,
    viewers: HashMap<String, ViewerProfileData>,
    sessions: Vec<SessionData>,
    participants: Vec<ParticipantData>,
    signals: Vec<SignalData>,
    shows: Vec<PrivateShowData>,
    transactions: Vec<TransactionData>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user along with the bearer token the identity service
    /// issued for it
    pub fn add_user(&self, user: UserData, token: &str) {
        let mut state = self.state.lock();

        state.tokens.insert(token.to_string(), user.id.clone());
        state.users.push(user);
    }

    pub fn add_model(&self, profile: ModelProfileData) {
        self.state
            .lock()
            .models
            .insert(profile.user_id.clone(), profile);
    }

    pub fn add_viewer(&self, profile: ViewerProfileData) {
        self.state
            .lock()
            .viewers
            .insert(profile.user_id.clone(), profile);
    }

    /// All ledger entries, oldest first
    pub fn transactions(&self) -> Vec<TransactionData> {
        self.state.lock().transactions.clone()
    }
}

fn not_found(resource: &'static str, identifier: &'static str) -> DatabaseError {
    DatabaseError::NotFound {
        resource,
        identifier,
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn user_by_token(&self, token: &str) -> Result<UserData> {
        let state = self.state.lock();

        let user_id = state
            .tokens
            .get(token)
            .ok_or_else(|| not_found("user", "token"))?;

        state
            .users
            .iter()
            .find(|u| &u.id == user_id)
            .cloned()
            .ok_or_else(|| not_found("user", "token"))
    }

    async fn model_by_user_id(&self, user_id: &str) -> Result<ModelProfileData> {
        self.state
            .lock()
            .models
            .get(user_id)
            .cloned()
            .ok_or_else(|| not_found("model", "user_id"))
    }

    async fn list_live_models(&self) -> Result<Vec<ModelProfileData>> {
        Ok(self
            .state
            .lock()
            .models
            .values()
            .filter(|m| m.is_live && m.is_available)
            .cloned()
            .collect())
    }

    async fn count_online_models(&self, active_since: DateTime<Utc>) -> Result<i64> {
        Ok(self
            .state
            .lock()
            .models
            .values()
            .filter(|m| m.is_available || m.last_online.is_some_and(|t| t >= active_since))
            .count() as i64)
    }

    async fn update_model_status(&self, update: ModelStatusUpdate) -> Result<ModelProfileData> {
        let mut state = self.state.lock();

        let model = state
            .models
            .get_mut(&update.user_id)
            .ok_or_else(|| not_found("model", "user_id"))?;

        model.is_live = update.is_live;
        model.is_available = update.is_available;
        model.last_online = Some(update.last_online);

        Ok(model.clone())
    }

    async fn update_model_thumbnail(&self, user_id: &str, thumbnail: &str) -> Result<()> {
        let mut state = self.state.lock();

        let model = state
            .models
            .get_mut(user_id)
            .ok_or_else(|| not_found("model", "user_id"))?;

        model.thumbnail = Some(thumbnail.to_string());
        Ok(())
    }

    async fn add_model_viewer(&self, user_id: &str) -> Result<()> {
        if let Some(model) = self.state.lock().models.get_mut(user_id) {
            model.total_viewers += 1;
        }

        Ok(())
    }

    async fn viewer_by_user_id(&self, user_id: &str) -> Result<ViewerProfileData> {
        self.state
            .lock()
            .viewers
            .get(user_id)
            .cloned()
            .ok_or_else(|| not_found("viewer", "user_id"))
    }

    async fn active_session(&self, model_id: &str, kind: SessionKind) -> Result<SessionData> {
        self.state
            .lock()
            .sessions
            .iter()
            .find(|s| {
                s.model_id == model_id && s.kind == kind && s.status == SessionStatus::Active
            })
            .cloned()
            .ok_or_else(|| not_found("session", "model_id"))
    }

    async fn session_by_id(&self, session_id: &str) -> Result<SessionData> {
        self.state
            .lock()
            .sessions
            .iter()
            .find(|s| s.id == session_id)
            .cloned()
            .ok_or_else(|| not_found("session", "id"))
    }

    async fn find_or_create_session(&self, new_session: NewSession) -> Result<(SessionData, bool)> {
        let mut state = self.state.lock();

        // Check and insert under the same lock
        let existing = state
            .sessions
            .iter()
            .find(|s| {
                s.model_id == new_session.model_id
                    && s.kind == new_session.kind
                    && s.status == SessionStatus::Active
            })
            .cloned();

        if let Some(existing) = existing {
            return Ok((existing, false));
        }

        let session = SessionData {
            id: new_session.id,
            model_id: new_session.model_id,
            created_by: new_session.created_by,
            kind: new_session.kind,
            status: SessionStatus::Active,
            broadcast_id: new_session.broadcast_id,
            created_at: new_session.created_at,
            ended_at: None,
        };

        state.sessions.push(session.clone());
        Ok((session, true))
    }

    async fn end_session(&self, session_id: &str, ended_at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock();

        let session = state
            .sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or_else(|| not_found("session", "id"))?;

        session.status = SessionStatus::Ended;
        session.ended_at = Some(ended_at);
        Ok(())
    }

    async fn create_participant(&self, new_participant: NewParticipant) -> Result<ParticipantData> {
        let participant = ParticipantData {
            id: new_participant.id,
            session_id: new_participant.session_id,
            viewer_id: new_participant.viewer_id,
            joined_at: new_participant.joined_at,
            status: ParticipantStatus::Active,
        };

        self.state.lock().participants.push(participant.clone());
        Ok(participant)
    }

    async fn count_session_participants(&self, session_id: &str) -> Result<i64> {
        Ok(self
            .state
            .lock()
            .participants
            .iter()
            .filter(|p| p.session_id == session_id && p.status == ParticipantStatus::Active)
            .count() as i64)
    }

    async fn create_signal(&self, new_signal: NewSignal) -> Result<SignalData> {
        let signal = SignalData {
            id: new_signal.id,
            session_id: new_signal.session_id,
            from_user_id: new_signal.from_user_id,
            to_user_id: new_signal.to_user_id,
            kind: new_signal.kind,
            payload: new_signal.payload,
            created_at: new_signal.created_at,
        };

        self.state.lock().signals.push(signal.clone());
        Ok(signal)
    }

    async fn drain_signals(&self, session_id: &str, recipient_id: &str) -> Result<Vec<SignalData>> {
        let mut state = self.state.lock();

        // Insertion order is creation order, which keeps the drain FIFO
        let mut drained = Vec::new();
        state.signals.retain(|s| {
            if s.session_id == session_id && s.to_user_id == recipient_id {
                drained.push(s.clone());
                false
            } else {
                true
            }
        });

        Ok(drained)
    }

    async fn create_show(&self, new_show: NewShow) -> Result<PrivateShowData> {
        let show = PrivateShowData {
            id: new_show.id,
            viewer_id: new_show.viewer_id,
            model_id: new_show.model_id,
            rate_per_minute: new_show.rate_per_minute,
            status: ShowStatus::Requested,
            created_at: new_show.created_at,
            started_at: None,
            ended_at: None,
            duration_minutes: None,
            total_cost: None,
        };

        self.state.lock().shows.push(show.clone());
        Ok(show)
    }

    async fn show_by_id(&self, show_id: &str) -> Result<PrivateShowData> {
        self.state
            .lock()
            .shows
            .iter()
            .find(|s| s.id == show_id)
            .cloned()
            .ok_or_else(|| not_found("private show", "id"))
    }

    async fn activate_show(
        &self,
        show_id: &str,
        started_at: DateTime<Utc>,
    ) -> Result<Option<PrivateShowData>> {
        let mut state = self.state.lock();

        let show = state
            .shows
            .iter_mut()
            .find(|s| s.id == show_id)
            .ok_or_else(|| not_found("private show", "id"))?;

        if show.status != ShowStatus::Requested {
            return Ok(None);
        }

        show.status = ShowStatus::Active;
        show.started_at = Some(started_at);
        Ok(Some(show.clone()))
    }

    async fn settle_show(&self, settlement: ShowSettlement) -> Result<SettlementOutcome> {
        let mut state = self.state.lock();

        let Some(index) = state
            .shows
            .iter()
            .position(|s| s.id == settlement.show_id && s.status == ShowStatus::Active)
        else {
            return Ok(SettlementOutcome::AlreadySettled);
        };

        let covered = state
            .viewers
            .get(&settlement.viewer_id)
            .is_some_and(|v| v.token_balance >= settlement.total_cost);

        if !covered {
            let show = &mut state.shows[index];
            show.status = ShowStatus::EndedInsufficientFunds;
            show.ended_at = Some(settlement.ended_at);
            show.duration_minutes = Some(settlement.duration_minutes);
            show.total_cost = Some(0);

            return Ok(SettlementOutcome::InsufficientFunds(show.clone()));
        }

        if let Some(viewer) = state.viewers.get_mut(&settlement.viewer_id) {
            viewer.token_balance -= settlement.total_cost;
            viewer.total_spent += settlement.total_cost;
        }

        if let Some(model) = state.models.get_mut(&settlement.model_id) {
            model.available_balance += settlement.model_earnings;
            model.total_earnings += settlement.model_earnings;
            model.total_shows += 1;
        }

        state.transactions.push(TransactionData {
            id: random_string(32),
            user_id: settlement.viewer_id.clone(),
            kind: TransactionKind::PrivateShow,
            tokens: settlement.total_cost,
            description: format!("Private show ({} minutes)", settlement.duration_minutes),
            show_id: Some(settlement.show_id.clone()),
            created_at: settlement.ended_at,
        });
        state.transactions.push(TransactionData {
            id: random_string(32),
            user_id: settlement.model_id.clone(),
            kind: TransactionKind::Earning,
            tokens: settlement.model_earnings,
            description: format!(
                "Private show earnings ({} minutes)",
                settlement.duration_minutes
            ),
            show_id: Some(settlement.show_id.clone()),
            created_at: settlement.ended_at,
        });

        let show = &mut state.shows[index];
        show.status = ShowStatus::Completed;
        show.ended_at = Some(settlement.ended_at);
        show.duration_minutes = Some(settlement.duration_minutes);
        show.total_cost = Some(settlement.total_cost);

        Ok(SettlementOutcome::Settled(show.clone()))
    }
}

#[cfg(test)]
mod test {
    use crate::testing::viewer_user;
    use crate::Database;

    use super::MemoryDatabase;

    #[tokio::test]
    async fn test_user_by_token() {
        let db = MemoryDatabase::new();
        db.add_user(viewer_user("viewer-1"), "token-a");

        let user = db.user_by_token("token-a").await.expect("token resolves");
        assert_eq!(user.id, "viewer-1");

        let missing = db.user_by_token("token-b").await;
        assert!(missing.is_err_and(|e| e.is_not_found()));
    }
}
