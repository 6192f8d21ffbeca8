#![allow(dead_code)]

mod ai;
mod breaker;
mod config;
mod db;
mod hub;
mod jwt;
mod limiter;
mod queue;
mod ratelimit;
mod response;
mod routes;
mod services;
mod state;
mod zodiac;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::ai::gemini::GeminiClient;
use crate::ai::{AiClient, GenerateText};
use crate::breaker::CircuitBreaker;
use crate::hub::Hub;
use crate::jwt::TokenManager;
use crate::limiter::TokenBucket;
use crate::queue::{QueueConfig, RequestQueue};
use crate::ratelimit::SlidingWindow;

/// Outbound pacing against the AI provider: 10 calls/sec, burst 10, shared by
/// every dispatch worker.
const AI_CALLS_PER_SEC: usize = 10;

/// Grace period for draining the dispatch queue at shutdown.
const QUEUE_STOP_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = config::Config::from_env();

    let pool = db::init_pool(&config.database_url)
        .await
        .expect("database init failed");

    let tokens = Arc::new(TokenManager::new(&config.jwt_secret, config.jwt_access_expiry, config.jwt_refresh_expiry));

    // The provider credential is a required construction argument.
    let provider: Arc<dyn GenerateText> = {
        let client = GeminiClient::new(config.gemini_api_key.clone(), config.gemini_model.clone())
            .expect("GEMINI_API_KEY is required");
        info!(model = client.model(), "Gemini client initialized");
        Arc::new(client)
    };

    let breaker = Arc::new(CircuitBreaker::with_defaults());
    let outbound = Arc::new(TokenBucket::new(AI_CALLS_PER_SEC, Duration::from_secs(1)));
    let ai = Arc::new(AiClient::new(provider, breaker, outbound));

    let ai_queue = RequestQueue::start(
        QueueConfig { queue_size: config.queue_size, workers: config.queue_workers },
        ai::chat_processor(Arc::clone(&ai)),
    );
    info!(capacity = config.queue_size, workers = config.queue_workers, "AI dispatch queue started");

    let (hub, hub_task) = Hub::spawn();

    let ingress = SlidingWindow::new(config.rate_limit_requests, config.rate_limit_window);
    let sweeper = ingress.spawn_sweeper();

    let state = state::AppState::new(pool, tokens, ai, Arc::clone(&ai_queue), hub, ingress);
    let app = routes::app(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .expect("failed to bind");
    info!(port = config.port, "zodiac backend listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server failed");

    // Teardown mirrors construction in reverse: drain the queue first, then
    // stop the hub and the sweeper.
    info!("shutting down");
    if ai_queue.stop(QUEUE_STOP_TIMEOUT).await.is_err() {
        warn!("AI queue did not drain before the deadline");
    }
    hub_task.abort();
    sweeper.abort();
    info!("shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        _ = terminate => {}
    }
}
