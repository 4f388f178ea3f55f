use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json,
};

use crate::{
    auth::Identity,
    context::ServerContext,
    errors::ServerResult,
    schemas::{SignalSchema, ValidatedJson},
    serialized::{SignalAck, SignalBatch, ToSerialized},
    Router,
};

#[utoipa::path(
    post,
    path = "/webrtc/signal",
    tag = "signaling",
    request_body = SignalSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = SignalAck)
    )
)]
pub(crate) async fn send_signal(
    Identity(user): Identity,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<SignalSchema>,
) -> ServerResult<Json<SignalAck>> {
    let signal = context
        .core
        .sessions
        .send_signal(
            &body.session_id,
            &user,
            &body.target_user_id,
            body.signal_type.into(),
            body.signal_data,
        )
        .await?;

    Ok(Json(SignalAck {
        success: true,
        message: "Signal queued".to_string(),
        signal_id: signal.id,
    }))
}

#[utoipa::path(
    get,
    path = "/webrtc/signals/{session_id}",
    tag = "signaling",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = SignalBatch)
    )
)]
pub(crate) async fn poll_signals(
    Identity(user): Identity,
    State(context): State<ServerContext>,
    Path(session_id): Path<String>,
) -> ServerResult<Json<SignalBatch>> {
    let signals = context
        .core
        .sessions
        .drain_signals(&session_id, &user)
        .await?;

    Ok(Json(SignalBatch {
        success: true,
        signals: signals.to_serialized(),
    }))
}

pub fn router() -> Router {
    Router::new()
        .route("/signal", post(send_signal))
        .route("/signals/:session_id", get(poll_signals))
}
