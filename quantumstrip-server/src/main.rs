use std::{env, sync::Arc, time::Duration};

use log::error;
use quantumstrip_core::{AntMediaConfig, AntMediaGateway, Core, PgDatabase};
use quantumstrip_server::{init_logger, run_server, ServerContext};

/// Tokens per minute charged when no rate is configured
const DEFAULT_SHOW_RATE: i64 = 20;

#[tokio::main]
async fn main() {
    init_logger();

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let database = match PgDatabase::new(&database_url).await {
        Ok(database) => database,
        Err(e) => {
            error!("Could not connect to the database: {e}");
            return;
        }
    };

    let gateway_config = AntMediaConfig {
        base_url: env::var("ANT_MEDIA_URL")
            .unwrap_or_else(|_| "http://localhost:5080".to_string()),
        app_name: env::var("ANT_MEDIA_APP").unwrap_or_else(|_| "LiveApp".to_string()),
        request_timeout: Duration::from_secs(10),
    };

    let gateway = match AntMediaGateway::new(gateway_config) {
        Ok(gateway) => gateway,
        Err(e) => {
            error!("Could not set up the media gateway: {e}");
            return;
        }
    };

    let show_rate = env::var("PRIVATE_SHOW_RATE")
        .ok()
        .and_then(|x| x.parse().ok())
        .unwrap_or(DEFAULT_SHOW_RATE);

    let core = Core::new(Arc::new(database), Arc::new(gateway));

    run_server(ServerContext {
        core: Arc::new(core),
        show_rate,
    })
    .await
}
