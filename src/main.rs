mod api;
mod config;
mod error;
mod store;
mod swap;

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use warp::Filter;

use config::Config;
use store::{InMemoryStore, Store};
use swap::identity::{Authenticator, RejectAllAuthenticator};
use swap::ThoughtSwapServer;

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let server = ThoughtSwapServer::new(
        store,
        config.session.survey_url.clone(),
        Duration::from_secs(config.session.teacher_grace_secs),
    );

    // The real LMS exchange is an external collaborator; without one
    // configured, the callback rejects every code and guests remain the way
    // into a session.
    let authenticator: Arc<dyn Authenticator> = Arc::new(RejectAllAuthenticator);

    let routes = api::swap_routes::swap_websocket_route(server.clone())
        .or(api::swap_routes::health_route())
        .or(api::swap_routes::auth_callback_route(
            server.clone(),
            authenticator,
            config.session.ui_redirect_url.clone(),
        ));

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        "ThoughtSwap session server listening"
    );
    warp::serve(routes).run(config.bind_address()).await;
}
