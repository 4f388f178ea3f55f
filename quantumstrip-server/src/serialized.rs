//! All schemas that are exposed from endpoints are defined here
//! along with the [ToSerialized] impls

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use quantumstrip_core::{
    BootstrapConfig, IceServer as CoreIceServer, LiveModel, OnlineCounts, SessionHandle,
    ShowReceipt, SignalData,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct IceServerEntry {
    urls: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WebRtcConfig {
    ice_servers: Vec<IceServerEntry>,
    signaling_endpoint: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionDescriptor {
    session_id: String,
    model_id: String,
    session_type: String,
    status: String,
    stream_id: String,
    /// True when this request brought the session into existence
    created: bool,
    created_at: DateTime<Utc>,
    webrtc_config: WebRtcConfig,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionEnded {
    pub success: bool,
    pub message: String,
    pub session_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PrivateShow {
    pub show_id: String,
    pub model_id: String,
    pub viewer_id: String,
    pub status: String,
    pub rate_per_minute: i64,
    /// Present when the request carried a planned duration
    pub estimated_cost: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ShowOutcome {
    success: bool,
    message: String,
    show_id: String,
    status: String,
    duration_minutes: i64,
    cost: i64,
    model_earnings: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SignalMessage {
    signal_id: String,
    session_id: String,
    from_user_id: String,
    signal_type: String,
    #[schema(value_type = Object)]
    signal_data: Value,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SignalBatch {
    pub success: bool,
    pub signals: Vec<SignalMessage>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SignalAck {
    pub success: bool,
    pub message: String,
    pub signal_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LiveModelStatus {
    model_id: String,
    is_live: bool,
    is_available: bool,
    show_rate: i64,
    current_viewers: i64,
    total_viewers: i64,
    thumbnail: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OnlineModels {
    online_models: i64,
    live_models: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusUpdated {
    pub success: bool,
    pub is_live: bool,
    pub is_available: bool,
    pub last_online: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Updated {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Health {
    pub healthy: bool,
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl<I, O> ToSerialized<Vec<O>> for Vec<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Vec<O> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

impl ToSerialized<WebRtcConfig> for BootstrapConfig {
    fn to_serialized(&self) -> WebRtcConfig {
        WebRtcConfig {
            ice_servers: self.ice_servers.to_serialized(),
            signaling_endpoint: self.signaling_endpoint.clone(),
        }
    }
}

impl ToSerialized<IceServerEntry> for CoreIceServer {
    fn to_serialized(&self) -> IceServerEntry {
        IceServerEntry {
            urls: self.urls.clone(),
        }
    }
}

impl ToSerialized<SessionDescriptor> for SessionHandle {
    fn to_serialized(&self) -> SessionDescriptor {
        SessionDescriptor {
            session_id: self.session.id.clone(),
            model_id: self.session.model_id.clone(),
            session_type: self.session.kind.as_str().to_string(),
            status: self.session.status.as_str().to_string(),
            stream_id: self.session.broadcast_id.clone(),
            created: self.created,
            created_at: self.session.created_at,
            webrtc_config: self.bootstrap.to_serialized(),
        }
    }
}

impl ToSerialized<SignalMessage> for SignalData {
    fn to_serialized(&self) -> SignalMessage {
        SignalMessage {
            signal_id: self.id.clone(),
            session_id: self.session_id.clone(),
            from_user_id: self.from_user_id.clone(),
            signal_type: self.kind.as_str().to_string(),
            signal_data: self.payload.clone(),
            created_at: self.created_at,
        }
    }
}

impl ToSerialized<LiveModelStatus> for LiveModel {
    fn to_serialized(&self) -> LiveModelStatus {
        LiveModelStatus {
            model_id: self.profile.user_id.clone(),
            is_live: self.profile.is_live,
            is_available: self.profile.is_available,
            show_rate: self.profile.show_rate,
            current_viewers: self.current_viewers,
            total_viewers: self.profile.total_viewers,
            thumbnail: self.profile.thumbnail.clone(),
        }
    }
}

impl ToSerialized<OnlineModels> for OnlineCounts {
    fn to_serialized(&self) -> OnlineModels {
        OnlineModels {
            online_models: self.online_models,
            live_models: self.live_models,
        }
    }
}

impl ToSerialized<ShowOutcome> for ShowReceipt {
    fn to_serialized(&self) -> ShowOutcome {
        let message = if self.charged {
            format!("Show completed, {} tokens charged", self.total_cost)
        } else {
            "Show ended, balance did not cover the cost".to_string()
        };

        ShowOutcome {
            // An unpaid end is not a successful settlement
            success: self.charged,
            message,
            show_id: self.show.id.clone(),
            status: self.show.status.as_str().to_string(),
            duration_minutes: self.duration_minutes,
            cost: self.total_cost,
            model_earnings: self.model_earnings,
        }
    }
}

#[cfg(test)]
mod test {
    use chrono::Utc;
    use quantumstrip_core::{PrivateShowData, ShowReceipt, ShowStatus};

    use super::ToSerialized;

    fn show(status: ShowStatus, total_cost: Option<i64>) -> PrivateShowData {
        PrivateShowData {
            id: "show-1".to_string(),
            viewer_id: "viewer-1".to_string(),
            model_id: "model-1".to_string(),
            rate_per_minute: 20,
            status,
            created_at: Utc::now(),
            started_at: Some(Utc::now()),
            ended_at: Some(Utc::now()),
            duration_minutes: Some(2),
            total_cost,
        }
    }

    #[test]
    fn test_unpaid_show_outcome_is_not_successful() {
        let receipt = ShowReceipt {
            show: show(ShowStatus::EndedInsufficientFunds, Some(0)),
            charged: false,
            duration_minutes: 2,
            total_cost: 0,
            model_earnings: None,
        };

        let outcome = serde_json::to_value(receipt.to_serialized()).expect("serializes");

        assert_eq!(outcome["success"], false);
        assert_eq!(outcome["cost"], 0);
        assert_eq!(outcome["duration_minutes"], 2);
    }

    #[test]
    fn test_settled_show_outcome_is_successful() {
        let receipt = ShowReceipt {
            show: show(ShowStatus::Completed, Some(40)),
            charged: true,
            duration_minutes: 2,
            total_cost: 40,
            model_earnings: Some(20),
        };

        let outcome = serde_json::to_value(receipt.to_serialized()).expect("serializes");

        assert_eq!(outcome["success"], true);
        assert_eq!(outcome["cost"], 40);
        assert_eq!(outcome["model_earnings"], 20);
    }
}
