//! Engine Error Types
//!
//! Every operation of the strategy engine returns `Result<_, EngineError>`.
//! The variants mirror the failure kinds an off-chain caller needs to tell
//! apart: a `StalePrice` or `RoundInconsistent` rejection is worth retrying
//! with fresh oracle data, while `InvalidState` or `Unauthorized` is not.
//! The `IntoResponse` impl turns every variant into a structured JSON body so
//! relayers always get a machine-readable `kind` field.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Strategy creation/update violates a parameter invariant.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// Referenced strategy id does not exist.
    #[error("strategy {0} not found")]
    NotFound(u64),

    /// Caller is neither the owner nor a validly-authorized relayer.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Operation attempted against a non-Active strategy, or the trigger
    /// needed by this execution kind is not enabled.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Current oracle price does not satisfy the trigger threshold.
    #[error("price condition not met: {0}")]
    PriceConditionNotMet(String),

    /// Oracle data older than the configured maximum age, or the sequencer
    /// uptime gate reports an outage.
    #[error("stale price: {0}")]
    StalePrice(String),

    /// TWAP interval has not elapsed since the last tranche.
    #[error("throttle not elapsed: {0}")]
    ThrottleNotElapsed(String),

    /// Dip/rally round attestation is non-monotonic, already consumed, or
    /// does not show the required price movement.
    #[error("round inconsistent: {0}")]
    RoundInconsistent(String),

    /// Realized swap rate outside the configured tolerance band.
    #[error("slippage exceeded: implied {implied}, actual {actual}, max {max_bps} bps")]
    SlippageExceeded {
        implied: u128,
        actual: u128,
        max_bps: u64,
    },

    /// The swap adapter's declared result disagrees with the balances it
    /// actually moved.
    #[error("executor mismatch: {0}")]
    ExecutorMismatch(String),

    /// No price feed registered for an asset.
    #[error("no price feed registered for {0}")]
    FeedMissing(String),

    /// Escrow or transfer cannot be covered.
    #[error("insufficient balance of {token}: needed {needed}, available {available}")]
    InsufficientBalance {
        token: String,
        needed: u128,
        available: u128,
    },

    /// Fixed-point arithmetic left the representable range.
    #[error("arithmetic overflow in {0}")]
    Arithmetic(&'static str),

    /// Catch-all for unexpected failures.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    /// Stable machine-readable discriminator for API consumers.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InvalidParameters(_) => "invalid_parameters",
            EngineError::NotFound(_) => "not_found",
            EngineError::Unauthorized(_) => "unauthorized",
            EngineError::InvalidState(_) => "invalid_state",
            EngineError::PriceConditionNotMet(_) => "price_condition_not_met",
            EngineError::StalePrice(_) => "stale_price",
            EngineError::ThrottleNotElapsed(_) => "throttle_not_elapsed",
            EngineError::RoundInconsistent(_) => "round_inconsistent",
            EngineError::SlippageExceeded { .. } => "slippage_exceeded",
            EngineError::ExecutorMismatch(_) => "executor_mismatch",
            EngineError::FeedMissing(_) => "feed_missing",
            EngineError::InsufficientBalance { .. } => "insufficient_balance",
            EngineError::Arithmetic(_) => "arithmetic",
            EngineError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            EngineError::InvalidParameters(_) | EngineError::InsufficientBalance { .. } => {
                StatusCode::BAD_REQUEST
            }
            EngineError::NotFound(_) | EngineError::FeedMissing(_) => StatusCode::NOT_FOUND,
            EngineError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            EngineError::InvalidState(_) => StatusCode::CONFLICT,
            EngineError::PriceConditionNotMet(_)
            | EngineError::ThrottleNotElapsed(_)
            | EngineError::RoundInconsistent(_)
            | EngineError::SlippageExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::StalePrice(_) => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::ExecutorMismatch(_) => StatusCode::BAD_GATEWAY,
            EngineError::Arithmetic(_) | EngineError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "ok": false,
            "kind": self.kind(),
            "error": self.to_string(),
        }));
        (self.status(), body).into_response()
    }
}
