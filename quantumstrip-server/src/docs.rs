use std::borrow::BorrowMut;

use axum::{response::IntoResponse, Json};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::{models, schemas, serialized, sessions, shows, signaling};

#[derive(OpenApi)]
#[openapi(
    modifiers(&Security),
    info(
        description = "quantumstrip-server exposes the streaming and private show endpoints of this instance"
    ),
    paths(
        sessions::create_session,
        sessions::join_session,
        sessions::end_session,
        signaling::send_signal,
        signaling::poll_signals,
        shows::request_show,
        shows::accept_show,
        shows::end_show,
        models::live_models,
        models::online_models,
        models::model_session,
        models::update_status,
        models::update_thumbnail,
    ),
    components(schemas(
        schemas::SessionRequestSchema,
        schemas::SessionKindSchema,
        schemas::SignalSchema,
        schemas::SignalKindSchema,
        schemas::PrivateShowSchema,
        schemas::ModelStatusSchema,
        schemas::ThumbnailSchema,
        serialized::SessionDescriptor,
        serialized::WebRtcConfig,
        serialized::IceServerEntry,
        serialized::SessionEnded,
        serialized::PrivateShow,
        serialized::ShowOutcome,
        serialized::SignalMessage,
        serialized::SignalBatch,
        serialized::SignalAck,
        serialized::LiveModelStatus,
        serialized::OnlineModels,
        serialized::StatusUpdated,
        serialized::Updated,
        serialized::Health,
    ))
)]
pub struct ApiDoc;

struct Security;

impl Modify for Security {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.borrow_mut() {
            let scheme = HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .bearer_format("Bearer <token>")
                .build();

            components.add_security_scheme("BearerAuth", SecurityScheme::Http(scheme))
        }
    }
}

pub async fn docs() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod test {
    use utoipa::OpenApi;

    use super::ApiDoc;

    #[test]
    fn test_session_discovery_requires_no_auth() {
        let doc = serde_json::to_value(ApiDoc::openapi()).expect("document serializes");

        // Discovery polling is open, joining and creating are not
        assert!(doc["paths"]["/models/{id}/session"]["get"]["security"].is_null());
        assert!(doc["paths"]["/session"]["post"]["security"].is_array());
        assert!(doc["paths"]["/session/join"]["post"]["security"].is_array());
    }
}
