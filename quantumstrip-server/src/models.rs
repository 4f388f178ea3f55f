use axum::{
    extract::{Path, State},
    routing::{get, patch},
    Json,
};

use crate::{
    auth::Identity,
    context::ServerContext,
    errors::ServerResult,
    schemas::{ModelStatusSchema, ThumbnailSchema, ValidatedJson},
    serialized::{
        LiveModelStatus, OnlineModels, SessionDescriptor, StatusUpdated, ToSerialized, Updated,
    },
    Router,
};

#[utoipa::path(
    get,
    path = "/models/live",
    tag = "models",
    responses(
        (status = 200, body = Vec<LiveModelStatus>)
    )
)]
pub(crate) async fn live_models(
    State(context): State<ServerContext>,
) -> ServerResult<Json<Vec<LiveModelStatus>>> {
    let models = context.core.sessions.live_models().await?;

    Ok(Json(models.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/models/online",
    tag = "models",
    responses(
        (status = 200, body = OnlineModels)
    )
)]
pub(crate) async fn online_models(
    State(context): State<ServerContext>,
) -> ServerResult<Json<OnlineModels>> {
    let counts = context.core.sessions.online_counts().await?;

    Ok(Json(counts.to_serialized()))
}

// Unauthenticated on purpose: clients poll this to discover a model's
// session before deciding to join
#[utoipa::path(
    get,
    path = "/models/{id}/session",
    tag = "models",
    responses(
        (status = 200, body = SessionDescriptor)
    )
)]
pub(crate) async fn model_session(
    State(context): State<ServerContext>,
    Path(model_id): Path<String>,
) -> ServerResult<Json<SessionDescriptor>> {
    let handle = context.core.sessions.active_for_model(&model_id).await?;

    Ok(Json(handle.to_serialized()))
}

#[utoipa::path(
    patch,
    path = "/models/status",
    tag = "models",
    request_body = ModelStatusSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = StatusUpdated)
    )
)]
pub(crate) async fn update_status(
    Identity(user): Identity,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<ModelStatusSchema>,
) -> ServerResult<Json<StatusUpdated>> {
    let profile = context
        .core
        .sessions
        .update_model_status(&user, body.is_live, body.is_available)
        .await?;

    Ok(Json(StatusUpdated {
        success: true,
        is_live: profile.is_live,
        is_available: profile.is_available,
        last_online: profile.last_online,
    }))
}

#[utoipa::path(
    patch,
    path = "/models/{id}/thumbnail",
    tag = "models",
    request_body = ThumbnailSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Updated)
    )
)]
pub(crate) async fn update_thumbnail(
    Identity(user): Identity,
    State(context): State<ServerContext>,
    Path(model_id): Path<String>,
    ValidatedJson(body): ValidatedJson<ThumbnailSchema>,
) -> ServerResult<Json<Updated>> {
    context
        .core
        .sessions
        .update_model_thumbnail(&user, &model_id, &body.thumbnail)
        .await?;

    Ok(Json(Updated {
        success: true,
        message: "Thumbnail updated".to_string(),
    }))
}

pub fn router() -> Router {
    Router::new()
        .route("/live", get(live_models))
        .route("/online", get(online_models))
        .route("/status", patch(update_status))
        .route("/:id/session", get(model_session))
        .route("/:id/thumbnail", patch(update_thumbnail))
}
