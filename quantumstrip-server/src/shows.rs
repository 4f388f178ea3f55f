use axum::{
    extract::{Path, State},
    routing::{patch, post},
    Json,
};

use crate::{
    auth::Identity,
    context::ServerContext,
    errors::ServerResult,
    schemas::{PrivateShowSchema, ValidatedJson},
    serialized::{PrivateShow, ShowOutcome, ToSerialized},
    Router,
};

#[utoipa::path(
    post,
    path = "/private-show",
    tag = "private-shows",
    request_body = PrivateShowSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = PrivateShow)
    )
)]
pub(crate) async fn request_show(
    Identity(user): Identity,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<PrivateShowSchema>,
) -> ServerResult<Json<PrivateShow>> {
    let show = context
        .core
        .shows
        .request(&user, &body.model_id, context.show_rate)
        .await?;

    // The estimate is informational, actual billing is by elapsed time
    let estimated_cost = body
        .duration_minutes
        .map(|minutes| minutes as i64 * show.rate_per_minute);

    Ok(Json(PrivateShow {
        show_id: show.id,
        model_id: show.model_id,
        viewer_id: show.viewer_id,
        status: show.status.as_str().to_string(),
        rate_per_minute: show.rate_per_minute,
        estimated_cost,
        created_at: show.created_at,
        started_at: show.started_at,
    }))
}

#[utoipa::path(
    patch,
    path = "/private-show/{id}/accept",
    tag = "private-shows",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = PrivateShow)
    )
)]
pub(crate) async fn accept_show(
    Identity(user): Identity,
    State(context): State<ServerContext>,
    Path(show_id): Path<String>,
) -> ServerResult<Json<PrivateShow>> {
    let show = context.core.shows.accept(&show_id, &user).await?;

    Ok(Json(PrivateShow {
        show_id: show.id,
        model_id: show.model_id,
        viewer_id: show.viewer_id,
        status: show.status.as_str().to_string(),
        rate_per_minute: show.rate_per_minute,
        estimated_cost: None,
        created_at: show.created_at,
        started_at: show.started_at,
    }))
}

#[utoipa::path(
    patch,
    path = "/private-show/{id}/end",
    tag = "private-shows",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = ShowOutcome)
    )
)]
pub(crate) async fn end_show(
    Identity(user): Identity,
    State(context): State<ServerContext>,
    Path(show_id): Path<String>,
) -> ServerResult<Json<ShowOutcome>> {
    let receipt = context.core.shows.end(&show_id, &user).await?;

    Ok(Json(receipt.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/", post(request_show))
        .route("/:id/accept", patch(accept_show))
        .route("/:id/end", patch(end_show))
}
