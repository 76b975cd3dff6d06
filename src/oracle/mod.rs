//! Price-feed abstraction.
//!
//! The engine only ever sees the [`PriceFeed`] trait and the [`FeedRegistry`]
//! wrapper, which layers the freshness policy (max stale period, optional
//! sequencer-uptime gate) over whatever feeds are registered. Feeds publish
//! 8-decimal USD prices with monotonically increasing round ids.
//!
//! [`ScenarioFeed`] is the settable in-memory implementation used by tests
//! and local runs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::engine::types::AssetId;
use crate::error::{EngineError, Result};

/// Latest observation of a feed.
#[derive(Debug, Clone, Copy)]
pub struct PricePoint {
    pub price: u128,
    pub updated_at: u64,
    pub round_id: u64,
}

/// Historical observation fetched by round id.
#[derive(Debug, Clone, Copy)]
pub struct RoundPoint {
    pub price: u128,
    pub updated_at: u64,
}

#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn latest(&self) -> Result<PricePoint>;
    async fn round(&self, round_id: u64) -> Result<RoundPoint>;
}

pub fn now_secs() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

/// Per-asset feed directory plus the freshness policy the engine enforces
/// before acting on any price.
pub struct FeedRegistry {
    feeds: DashMap<AssetId, Arc<dyn PriceFeed>>,
    max_stale_period: RwLock<u64>,
    sequencer: RwLock<Option<Arc<dyn PriceFeed>>>,
}

impl FeedRegistry {
    pub fn new(max_stale_period: u64) -> Self {
        Self {
            feeds: DashMap::new(),
            max_stale_period: RwLock::new(max_stale_period),
            sequencer: RwLock::new(None),
        }
    }

    pub fn register(&self, asset: AssetId, feed: Arc<dyn PriceFeed>) {
        self.feeds.insert(asset, feed);
    }

    pub fn set_max_stale_period(&self, secs: u64) {
        *self.max_stale_period.write() = secs;
    }

    pub fn max_stale_period(&self) -> u64 {
        *self.max_stale_period.read()
    }

    /// Sequencer-uptime gate. The feed publishes 0 while the sequencer is up;
    /// any nonzero answer blocks executions until it recovers.
    pub fn set_sequencer_feed(&self, feed: Arc<dyn PriceFeed>) {
        *self.sequencer.write() = Some(feed);
    }

    fn feed(&self, asset: &str) -> Result<Arc<dyn PriceFeed>> {
        self.feeds
            .get(asset)
            .map(|f| f.clone())
            .ok_or_else(|| EngineError::FeedMissing(asset.to_string()))
    }

    /// Latest price for `asset`, rejected when older than the stale window
    /// or while the sequencer gate reports an outage.
    pub async fn fresh_price(&self, asset: &str) -> Result<PricePoint> {
        self.check_sequencer().await?;
        let point = self.feed(asset)?.latest().await?;
        let now = now_secs();
        let age = now.saturating_sub(point.updated_at);
        if age > self.max_stale_period() {
            return Err(EngineError::StalePrice(format!(
                "{asset} price is {age}s old (max {})",
                self.max_stale_period()
            )));
        }
        if point.price == 0 {
            return Err(EngineError::StalePrice(format!("{asset} feed reports zero price")));
        }
        Ok(point)
    }

    /// Historical round lookup. No staleness check: round pairs carry their
    /// own timestamps and the caller compares those directly.
    pub async fn round_price(&self, asset: &str, round_id: u64) -> Result<RoundPoint> {
        self.feed(asset)?.round(round_id).await
    }

    async fn check_sequencer(&self) -> Result<()> {
        let gate = self.sequencer.read().clone();
        if let Some(feed) = gate {
            let point = feed.latest().await?;
            if point.price != 0 {
                return Err(EngineError::StalePrice("sequencer reported down".into()));
            }
        }
        Ok(())
    }
}

/// Settable fixture feed. `set_price` stamps the observation with the current
/// time; `set_round` takes an explicit timestamp so tests can build
/// out-of-order round pairs.
#[derive(Default)]
pub struct ScenarioFeed {
    inner: RwLock<ScenarioFeedInner>,
}

#[derive(Default)]
struct ScenarioFeedInner {
    latest_round: u64,
    rounds: HashMap<u64, RoundPoint>,
}

impl ScenarioFeed {
    pub fn new(price: u128) -> Arc<Self> {
        let feed = Arc::new(Self::default());
        feed.set_price(price, 1);
        feed
    }

    pub fn set_price(&self, price: u128, round_id: u64) {
        let mut inner = self.inner.write();
        inner.rounds.insert(round_id, RoundPoint { price, updated_at: now_secs() });
        inner.latest_round = inner.latest_round.max(round_id);
    }

    pub fn set_round(&self, round_id: u64, price: u128, updated_at: u64) {
        let mut inner = self.inner.write();
        inner.rounds.insert(round_id, RoundPoint { price, updated_at });
        inner.latest_round = inner.latest_round.max(round_id);
    }

    /// Backdate the latest observation, for staleness tests.
    pub fn age_latest(&self, updated_at: u64) {
        let mut inner = self.inner.write();
        let round = inner.latest_round;
        if let Some(point) = inner.rounds.get_mut(&round) {
            point.updated_at = updated_at;
        }
    }
}

#[async_trait]
impl PriceFeed for ScenarioFeed {
    async fn latest(&self) -> Result<PricePoint> {
        let inner = self.inner.read();
        let round_id = inner.latest_round;
        let point = inner
            .rounds
            .get(&round_id)
            .ok_or_else(|| EngineError::FeedMissing("feed has no observations".into()))?;
        Ok(PricePoint { price: point.price, updated_at: point.updated_at, round_id })
    }

    async fn round(&self, round_id: u64) -> Result<RoundPoint> {
        let inner = self.inner.read();
        inner.rounds.get(&round_id).copied().ok_or_else(|| {
            EngineError::RoundInconsistent(format!("round {round_id} not recorded"))
        })
    }
}
