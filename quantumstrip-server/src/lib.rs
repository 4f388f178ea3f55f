use std::{
    env,
    net::{Ipv6Addr, SocketAddr},
};

use axum::{
    extract::State,
    routing::get,
    Json,
};
use log::info;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

mod auth;
mod context;
mod docs;
mod errors;
mod logging;
mod models;
mod schemas;
mod serialized;
mod sessions;
mod shows;
mod signaling;

pub use context::ServerContext;
pub use logging::init_logger;

use serialized::Health;

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 9070;

pub type Router = axum::Router<ServerContext>;

/// Starts the quantumstrip server
pub async fn run_server(context: ServerContext) {
    let port = env::var("QUANTUMSTRIP_SERVER_PORT")
        .map(|x| x.parse::<u16>().expect("Port must be a number"))
        .unwrap_or(DEFAULT_PORT);

    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let root_router = Router::new()
        .nest("/session", sessions::router())
        .nest("/webrtc", signaling::router())
        .nest("/private-show", shows::router())
        .nest("/models", models::router())
        .route("/health", get(health))
        .route("/api.json", get(docs::docs))
        .with_state(context)
        .layer(cors);

    let listener = TcpListener::bind(&addr).await.expect("listens on address");

    info!("Listening on {addr}");

    axum::serve(listener, root_router.into_make_service())
        .await
        .expect("server runs until shutdown");
}

async fn health(State(context): State<ServerContext>) -> Json<Health> {
    Json(Health {
        healthy: context.core.healthy().await,
    })
}
