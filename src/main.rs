use std::sync::Arc;

use axum::http::HeaderValue;
use tower_http::cors::{Any, CorsLayer};

use arena_backend::api::{self, AppState};
use arena_backend::battle::{BattleService, BattleSettings};
use arena_backend::config::{self, Config};
use arena_backend::metrics;
use arena_backend::oracle::{LlmClient, LlmConfig, OutcomeOracle};
use arena_backend::rate_limit::RateLimiter;
use arena_backend::store::{MemoryStore, RankingStore, RedisStore};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::load();
    config::set_local_mode(config.local_mode);
    if config.local_mode {
        tracing::info!("Local mode enabled: auth and rate limiting are relaxed");
    }

    metrics::register_metrics();

    let store: Arc<dyn RankingStore> = match &config.redis_url {
        Some(url) => Arc::new(
            RedisStore::connect(url)
                .await
                .expect("Failed to connect to Redis"),
        ),
        None => {
            tracing::warn!("REDIS_URL not set, using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let oracle = match &config.oracle_url {
        Some(url) => {
            tracing::info!(endpoint = %url, timeout_ms = config.oracle_timeout.as_millis() as u64, "Battle oracle enabled");
            let client = LlmClient::new(
                reqwest::Client::new(),
                LlmConfig::new(url.clone(), config.oracle_api_key.clone()),
            );
            OutcomeOracle::new(Arc::new(client), config.oracle_timeout)
        }
        None => {
            tracing::warn!("ORACLE_URL not set, battles use the local fallback only");
            OutcomeOracle::fallback_only()
        }
    };

    let battles = BattleService::new(
        store.clone(),
        Arc::new(oracle),
        BattleSettings {
            cooldown: config.battle_cooldown,
            ..BattleSettings::default()
        },
    );
    let rate_limiter = if config.local_mode {
        RateLimiter::disabled(store.clone())
    } else {
        RateLimiter::new(store.clone())
    };

    let cors = match config
        .cors_origin
        .as_deref()
        .and_then(|o| HeaderValue::from_str(o).ok())
    {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::permissive(),
    };

    let app = api::router(AppState::new(store, battles, rate_limiter)).layer(cors);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {addr}"));

    tracing::info!("Arena backend listening on {addr}");
    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
