//! Request bodies accepted by the endpoints

use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::StatusCode,
    Json,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use utoipa::ToSchema;
use validator::Validate;

use quantumstrip_core::{SessionKind, SignalKind};

#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SessionKindSchema {
    Public,
    Private,
}

impl From<SessionKindSchema> for SessionKind {
    fn from(value: SessionKindSchema) -> Self {
        match value {
            SessionKindSchema::Public => Self::Public,
            SessionKindSchema::Private => Self::Private,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum SignalKindSchema {
    Offer,
    Answer,
    IceCandidate,
}

impl From<SignalKindSchema> for SignalKind {
    fn from(value: SignalKindSchema) -> Self {
        match value {
            SignalKindSchema::Offer => Self::Offer,
            SignalKindSchema::Answer => Self::Answer,
            SignalKindSchema::IceCandidate => Self::IceCandidate,
        }
    }
}

#[derive(Debug, Validate, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct SessionRequestSchema {
    #[validate(length(min = 1, max = 64))]
    pub model_id: String,
    pub session_type: SessionKindSchema,
}

#[derive(Debug, Validate, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct SignalSchema {
    #[validate(length(min = 1, max = 64))]
    pub session_id: String,
    #[validate(length(min = 1, max = 64))]
    pub target_user_id: String,
    pub signal_type: SignalKindSchema,
    /// Opaque SDP or ICE payload, relayed untouched
    #[schema(value_type = Object)]
    pub signal_data: Value,
}

#[derive(Debug, Validate, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct PrivateShowSchema {
    #[validate(length(min = 1, max = 64))]
    pub model_id: String,
    /// Planned length, only used for the cost estimate in the response
    #[validate(range(min = 1, max = 480))]
    pub duration_minutes: Option<u32>,
}

#[derive(Debug, Validate, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ModelStatusSchema {
    pub is_live: bool,
    pub is_available: bool,
}

#[derive(Debug, Validate, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ThumbnailSchema {
    #[validate(length(min = 1, max = 2048))]
    pub thumbnail: String,
}

pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let extracted_json: Json<T> = Json::from_request(req, state)
            .await
            .map_err(|_| (StatusCode::BAD_REQUEST, "JSON parse failed"))?;

        extracted_json
            .0
            .validate()
            .map_err(|_| (StatusCode::BAD_REQUEST, "Request body is invalid"))?;

        Ok(Self(extracted_json.0))
    }
}
