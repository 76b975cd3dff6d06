//! Router assembly and server startup.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Router;
use axum::routing::{get, post};
use dashmap::DashMap;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::config::CONFIG;
use crate::engine::Engine;
use crate::oracle::{FeedRegistry, ScenarioFeed};
use crate::routes::{execute, health, oracle_admin, strategy};
use crate::swap::{ScenarioDex, TokenLedger};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    /// Scenario feeds created through the oracle admin routes, kept here so
    /// later updates reach the same feed instance.
    pub scenario_feeds: Arc<DashMap<String, Arc<ScenarioFeed>>>,
    pub scenario_dex: Arc<ScenarioDex>,
    pub sequencer: Arc<ScenarioFeed>,
    sequencer_rounds: Arc<AtomicU64>,
}

impl AppState {
    pub fn new() -> Self {
        let feeds = Arc::new(FeedRegistry::new(CONFIG.oracle.max_stale_price_period));
        let ledger = Arc::new(TokenLedger::new());
        let scenario_dex = ScenarioDex::new(ledger.clone());
        let engine = Arc::new(Engine::new(feeds, ledger));
        engine.dexes().register("scenario", scenario_dex.clone());
        Self {
            engine,
            scenario_feeds: Arc::new(DashMap::new()),
            scenario_dex,
            sequencer: Arc::new(ScenarioFeed::default()),
            sequencer_rounds: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn sequencer_round(&self) -> u64 {
        self.sequencer_rounds.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

pub fn router(state: AppState) -> Router {
    let strategy_routes = Router::new()
        .route("/create", post(strategy::create))
        .route("/create-on-behalf", post(strategy::create_on_behalf))
        .route("/update", post(strategy::update))
        .route("/update-on-behalf", post(strategy::update_on_behalf))
        .route("/cancel", post(strategy::cancel))
        .route("/cancel-on-behalf", post(strategy::cancel_on_behalf))
        .route("/nonce/{owner}", get(strategy::nonce))
        .route("/{id}", get(strategy::get));

    let execute_routes = Router::new()
        .route("/buy", post(execute::buy))
        .route("/buy-twap", post(execute::buy_twap))
        .route("/btd", post(execute::btd))
        .route("/sell", post(execute::sell))
        .route("/sell-twap", post(execute::sell_twap))
        .route("/str", post(execute::str_rally))
        .route("/floor", post(execute::floor));

    let oracle_routes = Router::new()
        .route("/feed", post(oracle_admin::set_feed))
        .route("/feeds", post(oracle_admin::set_feeds))
        .route("/max-stale-period", post(oracle_admin::set_max_stale_period))
        .route("/sequencer-feed", post(oracle_admin::set_sequencer_feed));

    Router::new()
        .route("/ping", get(health::ping))
        .nest("/api/v1/strategy", strategy_routes)
        .nest("/api/v1/execute", execute_routes)
        .nest("/api/v1/oracle", oracle_routes)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start() -> anyhow::Result<()> {
    let state = AppState::new();
    let app = router(state);

    let addr = format!("{}:{}", CONFIG.server.host, CONFIG.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
