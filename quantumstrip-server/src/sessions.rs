use axum::{
    extract::{Path, State},
    routing::{delete, post},
    Json,
};
use quantumstrip_core::SessionKind;

use crate::{
    auth::Identity,
    context::ServerContext,
    errors::ServerResult,
    schemas::{SessionRequestSchema, ValidatedJson},
    serialized::{SessionDescriptor, SessionEnded, ToSerialized},
    Router,
};

#[utoipa::path(
    post,
    path = "/session",
    tag = "sessions",
    request_body = SessionRequestSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = SessionDescriptor)
    )
)]
pub(crate) async fn create_session(
    Identity(user): Identity,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<SessionRequestSchema>,
) -> ServerResult<Json<SessionDescriptor>> {
    let handle = context
        .core
        .sessions
        .create_or_get(&body.model_id, body.session_type.into(), &user)
        .await?;

    Ok(Json(handle.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/session/join",
    tag = "sessions",
    request_body = SessionRequestSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = SessionDescriptor)
    )
)]
pub(crate) async fn join_session(
    Identity(user): Identity,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<SessionRequestSchema>,
) -> ServerResult<Json<SessionDescriptor>> {
    let kind: SessionKind = body.session_type.into();

    let handle = context
        .core
        .sessions
        .join(&body.model_id, kind, &user)
        .await?;

    Ok(Json(handle.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/session/{id}",
    tag = "sessions",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = SessionEnded)
    )
)]
pub(crate) async fn end_session(
    Identity(user): Identity,
    State(context): State<ServerContext>,
    Path(session_id): Path<String>,
) -> ServerResult<Json<SessionEnded>> {
    context.core.sessions.end(&session_id, &user).await?;

    Ok(Json(SessionEnded {
        success: true,
        message: "Session ended".to_string(),
        session_id,
    }))
}

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_session))
        .route("/join", post(join_session))
        .route("/:id", delete(end_session))
}
