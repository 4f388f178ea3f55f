use std::time::Duration;

use async_trait::async_trait;
use log::info;
use reqwest::{Client, Response};
use serde_json::json;

use super::{BootstrapConfig, Broadcast, GatewayError, GatewayResult, IceServer, MediaGateway};

#[derive(Debug, Clone)]
pub struct AntMediaConfig {
    /// Base address of the Ant Media Server, e.g. `http://localhost:5080`
    pub base_url: String,
    /// Application name within the server
    pub app_name: String,
    /// Upper bound for any single request to the server
    pub request_timeout: Duration,
}

impl Default for AntMediaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5080".to_string(),
            app_name: "LiveApp".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Adapter for the Ant Media Server REST API (`/rest/v2`)
pub struct AntMediaGateway {
    http: Client,
    config: AntMediaConfig,
    api_base: String,
}

impl AntMediaGateway {
    pub fn new(config: AntMediaConfig) -> GatewayResult<Self> {
        let http = Client::builder().timeout(config.request_timeout).build()?;

        let api_base = format!("{}/{}/rest/v2", config.base_url, config.app_name);

        Ok(Self {
            http,
            config,
            api_base,
        })
    }

    async fn expect_success(response: Response) -> GatewayResult<Response> {
        let status = response.status();

        if status.is_success() {
            Ok(response)
        } else {
            let message = response.text().await.unwrap_or_default();

            Err(GatewayError::Response {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[async_trait]
impl MediaGateway for AntMediaGateway {
    async fn create_broadcast(
        &self,
        external_id: &str,
        display_name: &str,
        is_public: bool,
    ) -> GatewayResult<Broadcast> {
        let payload = json!({
            "streamId": external_id,
            "name": display_name,
            "type": "liveStream",
            "publicStream": is_public,
        });

        let response = self
            .http
            .post(format!("{}/broadcasts/create", self.api_base))
            .json(&payload)
            .send()
            .await?;

        let broadcast: Broadcast = Self::expect_success(response).await?.json().await?;
        info!("Created broadcast {external_id}");

        Ok(broadcast)
    }

    async fn start_broadcast(&self, external_id: &str) -> GatewayResult<()> {
        let response = self
            .http
            .post(format!("{}/broadcasts/{external_id}/start", self.api_base))
            .send()
            .await?;

        Self::expect_success(response).await?;
        info!("Started broadcast {external_id}");

        Ok(())
    }

    async fn stop_broadcast(&self, external_id: &str) -> GatewayResult<()> {
        let response = self
            .http
            .post(format!("{}/broadcasts/{external_id}/stop", self.api_base))
            .send()
            .await?;

        Self::expect_success(response).await?;
        info!("Stopped broadcast {external_id}");

        Ok(())
    }

    async fn delete_broadcast(&self, external_id: &str) -> GatewayResult<()> {
        let response = self
            .http
            .delete(format!("{}/broadcasts/{external_id}", self.api_base))
            .send()
            .await?;

        Self::expect_success(response).await?;
        info!("Deleted broadcast {external_id}");

        Ok(())
    }

    async fn bootstrap_config(&self) -> GatewayResult<BootstrapConfig> {
        // Synthesized locally: the server does not expose an endpoint for
        // this, the websocket address is derived from the configured base.
        let ws_base = self
            .config
            .base_url
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);

        Ok(BootstrapConfig {
            ice_servers: super::FALLBACK_ICE_SERVERS
                .iter()
                .map(|urls| IceServer {
                    urls: urls.to_string(),
                })
                .collect(),
            signaling_endpoint: Some(format!("{}/{}/websocket", ws_base, self.config.app_name)),
        })
    }

    async fn health_check(&self) -> bool {
        let response = self
            .http
            .get(format!("{}/version", self.api_base))
            .send()
            .await;

        match response {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_bootstrap_config_derivation() {
        let gateway = AntMediaGateway::new(AntMediaConfig {
            base_url: "https://media.quantumstrip.example".to_string(),
            app_name: "LiveApp".to_string(),
            ..Default::default()
        })
        .expect("gateway builds");

        let config = gateway.bootstrap_config().await.expect("config is local");

        assert_eq!(
            config.signaling_endpoint.as_deref(),
            Some("wss://media.quantumstrip.example/LiveApp/websocket")
        );
        assert_eq!(config.ice_servers.len(), 2);
    }
}
