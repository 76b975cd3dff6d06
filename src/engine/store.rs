//! Strategy store: the canonical record set.
//!
//! Ids are assigned from a monotonic counter and never reused; records are
//! never deleted, terminal strategies stay readable. Mutations go through
//! `save` under the engine's transaction guard, so the store itself only
//! needs map-level consistency.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::engine::types::Strategy;
use crate::error::{EngineError, Result};

pub struct StrategyStore {
    strategies: DashMap<u64, Strategy>,
    next_id: AtomicU64,
}

impl StrategyStore {
    pub fn new() -> Self {
        Self {
            strategies: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn get(&self, id: u64) -> Result<Strategy> {
        self.strategies
            .get(&id)
            .map(|s| s.clone())
            .ok_or(EngineError::NotFound(id))
    }

    pub fn save(&self, strategy: Strategy) {
        self.strategies.insert(strategy.id, strategy);
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }
}

impl Default for StrategyStore {
    fn default() -> Self {
        Self::new()
    }
}
