//! Execution handlers. These endpoints are permissionless: anyone may call
//! them, the engine only acts when the strategy's own conditions hold.

use axum::Json;
use axum::extract::State;
use serde::Deserialize;

use crate::engine::{ExecutionReport, RoundWindow};
use crate::error::Result;
use crate::server::AppState;
use crate::swap::ExecutorCall;

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub id: u64,
    pub call: ExecutorCall,
}

/// Dip/rally executions additionally carry the oracle round window that
/// attests the movement.
#[derive(Debug, Deserialize)]
pub struct WindowExecuteRequest {
    pub id: u64,
    pub window: RoundWindow,
    pub call: ExecutorCall,
}

/// Floor calls only need swap routing when the strategy liquidates.
#[derive(Debug, Deserialize)]
pub struct FloorRequest {
    pub id: u64,
    #[serde(default)]
    pub call: Option<ExecutorCall>,
}

pub async fn buy(
    State(state): State<AppState>,
    Json(req): Json<ExecuteRequest>,
) -> Result<Json<ExecutionReport>> {
    Ok(Json(state.engine.execute_buy(req.id, req.call).await?))
}

pub async fn buy_twap(
    State(state): State<AppState>,
    Json(req): Json<ExecuteRequest>,
) -> Result<Json<ExecutionReport>> {
    Ok(Json(state.engine.execute_buy_twap(req.id, req.call).await?))
}

pub async fn btd(
    State(state): State<AppState>,
    Json(req): Json<WindowExecuteRequest>,
) -> Result<Json<ExecutionReport>> {
    Ok(Json(state.engine.execute_btd(req.id, req.window, req.call).await?))
}

pub async fn sell(
    State(state): State<AppState>,
    Json(req): Json<ExecuteRequest>,
) -> Result<Json<ExecutionReport>> {
    Ok(Json(state.engine.execute_sell(req.id, req.call).await?))
}

pub async fn sell_twap(
    State(state): State<AppState>,
    Json(req): Json<ExecuteRequest>,
) -> Result<Json<ExecutionReport>> {
    Ok(Json(state.engine.execute_sell_twap(req.id, req.call).await?))
}

pub async fn str_rally(
    State(state): State<AppState>,
    Json(req): Json<WindowExecuteRequest>,
) -> Result<Json<ExecutionReport>> {
    Ok(Json(state.engine.execute_str(req.id, req.window, req.call).await?))
}

pub async fn floor(
    State(state): State<AppState>,
    Json(req): Json<FloorRequest>,
) -> Result<Json<ExecutionReport>> {
    Ok(Json(state.engine.execute_floor(req.id, req.call).await?))
}
