//! Oracle setup endpoints. Local and test deployments wire scenario feeds
//! through these; the engine itself only reads whatever the registry holds.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use tracing::info;

use crate::error::Result;
use crate::oracle::ScenarioFeed;
use crate::routes::strategy::Ack;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct FeedRequest {
    pub asset: String,
    pub decimals: u8,
    /// 8-decimal USD price.
    pub price: u128,
    #[serde(default)]
    pub round_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct FeedsRequest {
    pub feeds: Vec<FeedRequest>,
}

#[derive(Debug, Deserialize)]
pub struct StalePeriodRequest {
    pub seconds: u64,
}

#[derive(Debug, Deserialize)]
pub struct SequencerRequest {
    pub up: bool,
}

fn upsert_feed(state: &AppState, req: &FeedRequest) {
    state.engine.ledger().register_asset(&req.asset, req.decimals);
    let feed = state
        .scenario_feeds
        .entry(req.asset.clone())
        .or_insert_with(|| Arc::new(ScenarioFeed::default()))
        .clone();
    let round_id = req.round_id.unwrap_or(1);
    feed.set_price(req.price, round_id);
    state.engine.feeds().register(req.asset.clone(), feed);
    // Local runs quote the scenario venue at the feed price.
    state.scenario_dex.set_rate(&req.asset, req.price);
    info!(asset = %req.asset, price = req.price, "feed configured");
}

pub async fn set_feed(
    State(state): State<AppState>,
    Json(req): Json<FeedRequest>,
) -> Result<Json<Ack>> {
    upsert_feed(&state, &req);
    Ok(Json(Ack { ok: true }))
}

pub async fn set_feeds(
    State(state): State<AppState>,
    Json(req): Json<FeedsRequest>,
) -> Result<Json<Ack>> {
    for feed in &req.feeds {
        upsert_feed(&state, feed);
    }
    Ok(Json(Ack { ok: true }))
}

pub async fn set_max_stale_period(
    State(state): State<AppState>,
    Json(req): Json<StalePeriodRequest>,
) -> Result<Json<Ack>> {
    state.engine.feeds().set_max_stale_period(req.seconds);
    info!(seconds = req.seconds, "max stale period updated");
    Ok(Json(Ack { ok: true }))
}

pub async fn set_sequencer_feed(
    State(state): State<AppState>,
    Json(req): Json<SequencerRequest>,
) -> Result<Json<Ack>> {
    // The gate publishes 0 while up, nonzero during an outage.
    let answer = if req.up { 0 } else { 1 };
    state.sequencer.set_price(answer, state.sequencer_round());
    state.engine.feeds().set_sequencer_feed(state.sequencer.clone());
    info!(up = req.up, "sequencer gate updated");
    Ok(Json(Ack { ok: true }))
}
