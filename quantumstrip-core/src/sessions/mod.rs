use chrono::{Duration, Utc};
use log::{info, warn};
use serde_json::Value;
use thiserror::Error;

use crate::{
    BootstrapConfig, CoreContext, DatabaseError, GatewayError, ModelProfileData,
    ModelStatusUpdate, NewParticipant, NewSession, NewSignal, SessionData, SessionKind,
    SignalData, SignalKind, UserData, UserRole,
};
use crate::util::random_string;

/// Creates, shares, and tears down streaming sessions, and relays WebRTC
/// signaling between the two sides of one.
pub struct SessionCoordinator {
    context: CoreContext,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Model not found")]
    ModelNotFound,
    #[error("Model is currently unavailable")]
    ModelUnavailable,
    #[error("Model is not currently live")]
    ModelNotLive,
    #[error("Streaming session not found")]
    SessionNotFound,
    #[error("No active streaming session found for this model")]
    NoActiveSession,
    #[error("Not authorized for this session")]
    NotAParty,
    #[error("Only models can update streaming status")]
    NotAModel,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Database(DatabaseError),
}

/// A session together with the connection bootstrap a client needs right now
#[derive(Debug)]
pub struct SessionHandle {
    pub session: SessionData,
    pub bootstrap: BootstrapConfig,
    /// True when this call brought the session into existence
    pub created: bool,
}

/// A live model with its current audience size
#[derive(Debug)]
pub struct LiveModel {
    pub profile: ModelProfileData,
    pub current_viewers: i64,
}

#[derive(Debug)]
pub struct OnlineCounts {
    pub online_models: i64,
    pub live_models: i64,
}

impl SessionCoordinator {
    pub fn new(context: &CoreContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Returns the model's active session of the given kind, creating one if
    /// none exists. Idempotent: repeated or concurrent calls for the same
    /// model yield the same session.
    pub async fn create_or_get(
        &self,
        model_id: &str,
        kind: SessionKind,
        requested_by: &UserData,
    ) -> Result<SessionHandle, SessionError> {
        let db = &self.context.database;

        match db.active_session(model_id, kind).await {
            Ok(session) => {
                return Ok(SessionHandle {
                    session,
                    bootstrap: self.bootstrap().await,
                    created: false,
                })
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(SessionError::Database(e)),
        }

        let model = db.model_by_user_id(model_id).await.map_err(|e| match e {
            e if e.is_not_found() => SessionError::ModelNotFound,
            e => SessionError::Database(e),
        })?;

        if !model.is_available {
            return Err(SessionError::ModelUnavailable);
        }

        let session_id = random_string(32);
        let broadcast_id = format!("stream_{session_id}");

        // Provisioning failure is fatal, nothing was persisted yet
        self.context
            .gateway
            .create_broadcast(
                &broadcast_id,
                &format!("Stream for model {model_id}"),
                kind == SessionKind::Public,
            )
            .await?;

        if let Err(e) = self.context.gateway.start_broadcast(&broadcast_id).await {
            warn!("Could not start broadcast {broadcast_id}: {e}");
        }

        let (session, created) = db
            .find_or_create_session(NewSession {
                id: session_id,
                model_id: model_id.to_string(),
                created_by: requested_by.id.clone(),
                kind,
                broadcast_id: broadcast_id.clone(),
                created_at: Utc::now(),
            })
            .await
            .map_err(SessionError::Database)?;

        if !created {
            // Lost the race against a concurrent create. The session that won
            // is the shared one, so the broadcast provisioned here is an
            // orphan and gets cleaned up.
            self.teardown_broadcast(&broadcast_id).await;
        } else if kind == SessionKind::Public {
            db.add_model_viewer(model_id)
                .await
                .map_err(SessionError::Database)?;

            info!("Created streaming session {} for model {model_id}", session.id);
        }

        Ok(SessionHandle {
            session,
            bootstrap: self.bootstrap().await,
            created,
        })
    }

    /// Joins the model's existing active session. Never creates one: a viewer
    /// arriving before the model is live gets `NoActiveSession` and re-polls.
    pub async fn join(
        &self,
        model_id: &str,
        kind: SessionKind,
        viewer: &UserData,
    ) -> Result<SessionHandle, SessionError> {
        let db = &self.context.database;

        let model = db.model_by_user_id(model_id).await.map_err(|e| match e {
            e if e.is_not_found() => SessionError::ModelNotFound,
            e => SessionError::Database(e),
        })?;

        if !model.is_live {
            return Err(SessionError::ModelNotLive);
        }

        let session = db.active_session(model_id, kind).await.map_err(|e| match e {
            e if e.is_not_found() => SessionError::NoActiveSession,
            e => SessionError::Database(e),
        })?;

        db.create_participant(NewParticipant {
            id: random_string(32),
            session_id: session.id.clone(),
            viewer_id: viewer.id.clone(),
            joined_at: Utc::now(),
        })
        .await
        .map_err(SessionError::Database)?;

        info!(
            "Viewer {} joined session {} of model {model_id}",
            viewer.id, session.id
        );

        Ok(SessionHandle {
            session,
            bootstrap: self.bootstrap().await,
            created: false,
        })
    }

    /// Ends a session. The external broadcast is torn down best-effort: the
    /// local record always reaches `ended`, even when the media server is
    /// unreachable or the broadcast is already gone.
    pub async fn end(&self, session_id: &str, user: &UserData) -> Result<(), SessionError> {
        let db = &self.context.database;

        let session = db.session_by_id(session_id).await.map_err(|e| match e {
            e if e.is_not_found() => SessionError::SessionNotFound,
            e => SessionError::Database(e),
        })?;

        if !session.is_party(&user.id) {
            return Err(SessionError::NotAParty);
        }

        self.teardown_broadcast(&session.broadcast_id).await;

        db.end_session(session_id, Utc::now())
            .await
            .map_err(SessionError::Database)?;

        info!("Streaming session ended: {session_id}");
        Ok(())
    }

    /// Read-only discovery of a model's active public session
    pub async fn active_for_model(&self, model_id: &str) -> Result<SessionHandle, SessionError> {
        let session = self
            .context
            .database
            .active_session(model_id, SessionKind::Public)
            .await
            .map_err(|e| match e {
                e if e.is_not_found() => SessionError::NoActiveSession,
                e => SessionError::Database(e),
            })?;

        Ok(SessionHandle {
            session,
            bootstrap: self.bootstrap().await,
            created: false,
        })
    }

    /// Appends a signaling message to the recipient's mailbox
    pub async fn send_signal(
        &self,
        session_id: &str,
        from: &UserData,
        to_user_id: &str,
        kind: SignalKind,
        payload: Value,
    ) -> Result<SignalData, SessionError> {
        let db = &self.context.database;

        let session = db.session_by_id(session_id).await.map_err(|e| match e {
            e if e.is_not_found() => SessionError::SessionNotFound,
            e => SessionError::Database(e),
        })?;

        if !session.is_party(&from.id) {
            return Err(SessionError::NotAParty);
        }

        db.create_signal(NewSignal {
            id: random_string(32),
            session_id: session_id.to_string(),
            from_user_id: from.id.clone(),
            to_user_id: to_user_id.to_string(),
            kind,
            payload,
            created_at: Utc::now(),
        })
        .await
        .map_err(SessionError::Database)
    }

    /// Removes and returns the recipient's pending signals, oldest first.
    /// At-most-once: a drained signal is gone.
    pub async fn drain_signals(
        &self,
        session_id: &str,
        recipient: &UserData,
    ) -> Result<Vec<SignalData>, SessionError> {
        self.context
            .database
            .drain_signals(session_id, &recipient.id)
            .await
            .map_err(SessionError::Database)
    }

    /// Updates a model's presence. Going offline also ends the model's active
    /// public session, so the session record doesn't stay `active` forever.
    pub async fn update_model_status(
        &self,
        user: &UserData,
        is_live: bool,
        is_available: bool,
    ) -> Result<ModelProfileData, SessionError> {
        if user.role != UserRole::Model {
            return Err(SessionError::NotAModel);
        }

        let db = &self.context.database;

        let profile = db
            .update_model_status(ModelStatusUpdate {
                user_id: user.id.clone(),
                is_live,
                is_available,
                last_online: Utc::now(),
            })
            .await
            .map_err(|e| match e {
                e if e.is_not_found() => SessionError::ModelNotFound,
                e => SessionError::Database(e),
            })?;

        if !is_live {
            match db.active_session(&user.id, SessionKind::Public).await {
                Ok(session) => {
                    self.teardown_broadcast(&session.broadcast_id).await;
                    db.end_session(&session.id, Utc::now())
                        .await
                        .map_err(SessionError::Database)?;

                    info!("Model {} went offline, ended session {}", user.id, session.id);
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(SessionError::Database(e)),
            }
        }

        Ok(profile)
    }

    pub async fn update_model_thumbnail(
        &self,
        user: &UserData,
        model_id: &str,
        thumbnail: &str,
    ) -> Result<(), SessionError> {
        if user.role != UserRole::Model {
            return Err(SessionError::NotAModel);
        }

        if user.id != model_id {
            return Err(SessionError::NotAParty);
        }

        self.context
            .database
            .update_model_thumbnail(model_id, thumbnail)
            .await
            .map_err(|e| match e {
                e if e.is_not_found() => SessionError::ModelNotFound,
                e => SessionError::Database(e),
            })
    }

    /// Currently live models with their audience sizes
    pub async fn live_models(&self) -> Result<Vec<LiveModel>, SessionError> {
        let db = &self.context.database;

        let profiles = db.list_live_models().await.map_err(SessionError::Database)?;
        let mut result = Vec::with_capacity(profiles.len());

        for profile in profiles {
            let current_viewers = match db
                .active_session(&profile.user_id, SessionKind::Public)
                .await
            {
                Ok(session) => db
                    .count_session_participants(&session.id)
                    .await
                    .map_err(SessionError::Database)?,
                Err(e) if e.is_not_found() => 0,
                Err(e) => return Err(SessionError::Database(e)),
            };

            result.push(LiveModel {
                profile,
                current_viewers,
            });
        }

        Ok(result)
    }

    /// Counts of online (available or active within the last hour) and live
    /// models
    pub async fn online_counts(&self) -> Result<OnlineCounts, SessionError> {
        let db = &self.context.database;

        let one_hour_ago = Utc::now() - Duration::hours(1);
        let online_models = db
            .count_online_models(one_hour_ago)
            .await
            .map_err(SessionError::Database)?;
        let live_models = db.list_live_models().await.map_err(SessionError::Database)?.len() as i64;

        Ok(OnlineCounts {
            online_models,
            live_models,
        })
    }

    /// Fetches a fresh bootstrap configuration, falling back to public STUN
    /// when the gateway cannot provide one
    async fn bootstrap(&self) -> BootstrapConfig {
        match self.context.gateway.bootstrap_config().await {
            Ok(config) => config,
            Err(e) => {
                warn!("Could not fetch bootstrap config, using fallback: {e}");
                BootstrapConfig::fallback()
            }
        }
    }

    /// Stops and deletes the external broadcast, logging failures instead of
    /// propagating them. A dangling broadcast is preferable to a session that
    /// cannot be ended.
    async fn teardown_broadcast(&self, broadcast_id: &str) {
        if let Err(e) = self.context.gateway.stop_broadcast(broadcast_id).await {
            warn!("Could not stop broadcast {broadcast_id}: {e}");
        }

        if let Err(e) = self.context.gateway.delete_broadcast(broadcast_id).await {
            warn!("Could not delete broadcast {broadcast_id}: {e}");
        }
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use crate::testing::{model_user, test_core, viewer_user, TestCore};
    use crate::{Database, SessionKind, SessionStatus, SignalKind};

    use super::SessionError;

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let TestCore { core, db, gateway } = test_core();
        let model = model_user("model-1");
        db.add_model(crate::testing::live_model_profile("model-1"));

        let first = core
            .sessions
            .create_or_get(&model.id, SessionKind::Public, &model)
            .await
            .expect("session is created");

        let second = core
            .sessions
            .create_or_get(&model.id, SessionKind::Public, &model)
            .await
            .expect("existing session is returned");

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.session.id, second.session.id);

        // The second call took the fast path and provisioned nothing
        assert_eq!(gateway.created.lock().len(), 1);
        assert_eq!(gateway.started.lock().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_creates_share_one_session() {
        let TestCore { core, db, .. } = test_core();
        let model = model_user("model-1");
        db.add_model(crate::testing::live_model_profile("model-1"));

        let (first, second) = tokio::join!(
            core.sessions
                .create_or_get(&model.id, SessionKind::Public, &model),
            core.sessions
                .create_or_get(&model.id, SessionKind::Public, &model),
        );

        let first = first.expect("first call succeeds");
        let second = second.expect("second call succeeds");

        assert_eq!(
            first.session.id, second.session.id,
            "both calls must resolve to the same session"
        );
    }

    #[tokio::test]
    async fn test_join_shares_the_model_session() {
        let TestCore { core, db, .. } = test_core();
        let model = model_user("model-1");
        let viewer = viewer_user("viewer-1");
        db.add_model(crate::testing::live_model_profile("model-1"));

        let created = core
            .sessions
            .create_or_get(&model.id, SessionKind::Public, &model)
            .await
            .expect("session is created");

        let joined = core
            .sessions
            .join(&model.id, SessionKind::Public, &viewer)
            .await
            .expect("viewer joins the existing session");

        assert_eq!(created.session.id, joined.session.id);
        assert!(!joined.created);
    }

    #[tokio::test]
    async fn test_join_without_session_fails() {
        let TestCore { core, db, .. } = test_core();
        let viewer = viewer_user("viewer-1");
        db.add_model(crate::testing::live_model_profile("model-1"));

        let result = core
            .sessions
            .join("model-1", SessionKind::Public, &viewer)
            .await;

        assert!(matches!(result, Err(SessionError::NoActiveSession)));
    }

    #[tokio::test]
    async fn test_create_for_unavailable_model_fails() {
        let TestCore { core, db, .. } = test_core();
        let model = model_user("model-1");

        let mut profile = crate::testing::live_model_profile("model-1");
        profile.is_available = false;
        db.add_model(profile);

        let result = core
            .sessions
            .create_or_get(&model.id, SessionKind::Public, &model)
            .await;

        assert!(matches!(result, Err(SessionError::ModelUnavailable)));
    }

    #[tokio::test]
    async fn test_drain_is_destructive_and_ordered() {
        let TestCore { core, db, .. } = test_core();
        let model = model_user("model-1");
        let viewer = viewer_user("viewer-1");
        db.add_model(crate::testing::live_model_profile("model-1"));

        let handle = core
            .sessions
            .create_or_get(&model.id, SessionKind::Public, &viewer)
            .await
            .expect("session is created");

        core.sessions
            .send_signal(
                &handle.session.id,
                &viewer,
                &model.id,
                SignalKind::Offer,
                json!({"sdp": "a"}),
            )
            .await
            .expect("first signal is sent");

        core.sessions
            .send_signal(
                &handle.session.id,
                &viewer,
                &model.id,
                SignalKind::IceCandidate,
                json!({"candidate": "b"}),
            )
            .await
            .expect("second signal is sent");

        let drained = core
            .sessions
            .drain_signals(&handle.session.id, &model)
            .await
            .expect("mailbox drains");

        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].kind, SignalKind::Offer);
        assert_eq!(drained[1].kind, SignalKind::IceCandidate);

        let again = core
            .sessions
            .drain_signals(&handle.session.id, &model)
            .await
            .expect("second drain succeeds");

        assert!(again.is_empty(), "drained signals must not come back");
    }

    #[tokio::test]
    async fn test_signal_from_outsider_is_forbidden() {
        let TestCore { core, db, .. } = test_core();
        let model = model_user("model-1");
        let outsider = viewer_user("viewer-2");
        db.add_model(crate::testing::live_model_profile("model-1"));

        let handle = core
            .sessions
            .create_or_get(&model.id, SessionKind::Public, &model)
            .await
            .expect("session is created");

        let result = core
            .sessions
            .send_signal(
                &handle.session.id,
                &outsider,
                &model.id,
                SignalKind::Offer,
                json!({}),
            )
            .await;

        assert!(matches!(result, Err(SessionError::NotAParty)));
    }

    #[tokio::test]
    async fn test_end_survives_gateway_failure() {
        let TestCore { core, db, gateway } = test_core();
        let model = model_user("model-1");
        db.add_model(crate::testing::live_model_profile("model-1"));

        let handle = core
            .sessions
            .create_or_get(&model.id, SessionKind::Public, &model)
            .await
            .expect("session is created");

        gateway.fail_teardown();

        core.sessions
            .end(&handle.session.id, &model)
            .await
            .expect("session ends despite the gateway failure");

        let session = db
            .session_by_id(&handle.session.id)
            .await
            .expect("session still exists");
        assert_eq!(session.status, SessionStatus::Ended);
        assert!(gateway.stopped.lock().is_empty());
        assert!(gateway.deleted.lock().is_empty());

        // The model is free again
        let fresh = core
            .sessions
            .create_or_get(&model.id, SessionKind::Public, &model)
            .await
            .expect("a new session can be created");
        assert!(fresh.created);
        assert_ne!(fresh.session.id, handle.session.id);
    }

    #[tokio::test]
    async fn test_end_by_outsider_is_forbidden() {
        let TestCore { core, db, .. } = test_core();
        let model = model_user("model-1");
        let outsider = viewer_user("viewer-2");
        db.add_model(crate::testing::live_model_profile("model-1"));

        let handle = core
            .sessions
            .create_or_get(&model.id, SessionKind::Public, &model)
            .await
            .expect("session is created");

        let result = core.sessions.end(&handle.session.id, &outsider).await;
        assert!(matches!(result, Err(SessionError::NotAParty)));
    }

    #[tokio::test]
    async fn test_going_offline_ends_the_session() {
        let TestCore { core, db, .. } = test_core();
        let model = model_user("model-1");
        db.add_model(crate::testing::live_model_profile("model-1"));

        let handle = core
            .sessions
            .create_or_get(&model.id, SessionKind::Public, &model)
            .await
            .expect("session is created");

        core.sessions
            .update_model_status(&model, false, false)
            .await
            .expect("status updates");

        let session = db
            .session_by_id(&handle.session.id)
            .await
            .expect("session still exists");
        assert_eq!(session.status, SessionStatus::Ended);
    }
}
