//! Strategy lifecycle handlers: create, update, cancel, their relayed
//! variants, and the read endpoints.
//!
//! Direct calls carry the owner key in the body; transport authentication is
//! a deployment concern outside the engine. Relayed calls carry the owner's
//! nonce and an ed25519 signature over the operation payload instead.

use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};

use crate::engine::types::{Strategy, StrategyParameters, StrategyStatus, StrategyUpdate};
use crate::error::Result;
use crate::routes::{parse_pubkey, parse_signature};
use crate::server::AppState;

/// Owner-granted spending approvals applied before escrow, standing in for
/// the permit payloads of a token that supports them.
#[derive(Debug, Deserialize)]
pub struct Approval {
    pub token: String,
    pub amount: u128,
}

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub owner: String,
    pub invest_token: String,
    pub stable_token: String,
    pub parameters: StrategyParameters,
    #[serde(default)]
    pub approvals: Vec<Approval>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOnBehalfRequest {
    pub owner: String,
    pub nonce: u64,
    pub signature: String,
    pub invest_token: String,
    pub stable_token: String,
    pub parameters: StrategyParameters,
    #[serde(default)]
    pub approvals: Vec<Approval>,
}

#[derive(Debug, Serialize)]
pub struct CreateResponse {
    pub ok: bool,
    pub id: u64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub owner: String,
    pub id: u64,
    pub update: StrategyUpdate,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOnBehalfRequest {
    pub owner: String,
    pub nonce: u64,
    pub signature: String,
    pub id: u64,
    pub update: StrategyUpdate,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub owner: String,
    pub id: u64,
}

#[derive(Debug, Deserialize)]
pub struct CancelOnBehalfRequest {
    pub owner: String,
    pub nonce: u64,
    pub signature: String,
    pub id: u64,
}

#[derive(Debug, Serialize)]
pub struct Ack {
    pub ok: bool,
}

/// Read-model of a strategy with the owner key rendered as base58.
#[derive(Debug, Serialize)]
pub struct StrategyView {
    pub id: u64,
    pub owner: String,
    pub invest_token: String,
    pub stable_token: String,
    pub status: StrategyStatus,
    pub parameters: StrategyParameters,
    pub budget: u128,
    pub profit: i128,
    pub invest_price: u128,
    pub buy_baseline: u128,
    pub sell_baseline: u128,
    pub buy_twap_executed_at: u64,
    pub sell_twap_executed_at: u64,
    pub created_at: u64,
    pub updated_at: u64,
}

impl From<Strategy> for StrategyView {
    fn from(s: Strategy) -> Self {
        Self {
            id: s.id,
            owner: s.owner.to_string(),
            invest_token: s.invest_token,
            stable_token: s.stable_token,
            status: s.status,
            parameters: s.parameters,
            budget: s.budget,
            profit: s.profit,
            invest_price: s.invest_price,
            buy_baseline: s.buy_baseline,
            sell_baseline: s.sell_baseline,
            buy_twap_executed_at: s.buy_twap_executed_at,
            sell_twap_executed_at: s.sell_twap_executed_at,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

fn apply_approvals(state: &AppState, owner: solana_sdk::pubkey::Pubkey, approvals: &[Approval]) {
    for approval in approvals {
        state.engine.ledger().approve(
            &approval.token,
            owner,
            state.engine.account(),
            approval.amount,
        );
    }
}

pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateRequest>,
) -> Result<Json<CreateResponse>> {
    let owner = parse_pubkey(&req.owner)?;
    apply_approvals(&state, owner, &req.approvals);
    let id = state
        .engine
        .create_strategy(owner, req.invest_token, req.stable_token, req.parameters)
        .await?;
    Ok(Json(CreateResponse { ok: true, id }))
}

pub async fn create_on_behalf(
    State(state): State<AppState>,
    Json(req): Json<CreateOnBehalfRequest>,
) -> Result<Json<CreateResponse>> {
    let owner = parse_pubkey(&req.owner)?;
    let signature = parse_signature(&req.signature)?;
    apply_approvals(&state, owner, &req.approvals);
    let id = state
        .engine
        .create_strategy_on_behalf(
            owner,
            req.nonce,
            signature,
            req.invest_token,
            req.stable_token,
            req.parameters,
        )
        .await?;
    Ok(Json(CreateResponse { ok: true, id }))
}

pub async fn update(
    State(state): State<AppState>,
    Json(req): Json<UpdateRequest>,
) -> Result<Json<Ack>> {
    let owner = parse_pubkey(&req.owner)?;
    state.engine.update_strategy(owner, req.id, req.update).await?;
    Ok(Json(Ack { ok: true }))
}

pub async fn update_on_behalf(
    State(state): State<AppState>,
    Json(req): Json<UpdateOnBehalfRequest>,
) -> Result<Json<Ack>> {
    let owner = parse_pubkey(&req.owner)?;
    let signature = parse_signature(&req.signature)?;
    state
        .engine
        .update_strategy_on_behalf(owner, req.nonce, signature, req.id, req.update)
        .await?;
    Ok(Json(Ack { ok: true }))
}

pub async fn cancel(
    State(state): State<AppState>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<Ack>> {
    let owner = parse_pubkey(&req.owner)?;
    state.engine.cancel_strategy(owner, req.id).await?;
    Ok(Json(Ack { ok: true }))
}

pub async fn cancel_on_behalf(
    State(state): State<AppState>,
    Json(req): Json<CancelOnBehalfRequest>,
) -> Result<Json<Ack>> {
    let owner = parse_pubkey(&req.owner)?;
    let signature = parse_signature(&req.signature)?;
    state
        .engine
        .cancel_strategy_on_behalf(owner, req.nonce, signature, req.id)
        .await?;
    Ok(Json(Ack { ok: true }))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<StrategyView>> {
    Ok(Json(state.engine.get_strategy(id)?.into()))
}

#[derive(Debug, Serialize)]
pub struct NonceResponse {
    pub owner: String,
    pub nonce: u64,
}

pub async fn nonce(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> Result<Json<NonceResponse>> {
    let key = parse_pubkey(&owner)?;
    Ok(Json(NonceResponse {
        owner,
        nonce: state.engine.nonce_of(&key),
    }))
}
