//! Periodic block production
//!
//! There is no proof-of-work: "mining" packages the pending pool into a block.
//! The background task ticks at a fixed period and quietly does nothing when
//! the pool is empty.

use crate::blockchain::{Block, Blockchain};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Default period between automatic mining attempts.
pub const DEFAULT_MINE_INTERVAL: Duration = Duration::from_secs(10);

/// Mine once under the ledger's write lock.
pub async fn mine_once(ledger: &RwLock<Blockchain>) -> Option<Block> {
    ledger.write().await.mine_block()
}

/// Spawn the background miner. The first attempt happens one full `interval`
/// after start-up. Abort the returned handle to stop it.
pub fn spawn_miner(ledger: Arc<RwLock<Blockchain>>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs_f64(), "background miner started");
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match mine_once(&ledger).await {
                Some(block) => debug!(index = block.index, "background miner produced a block"),
                None => debug!("no pending records to mine"),
            }
            let height = ledger.read().await.len();
            debug!(height, "node running");
        }
    })
}
