//! Background Probabilistic Expirer
//!
//! Lazy expiry only removes a dead key when somebody reads it; a key that is
//! never touched again would sit in memory forever. This module runs the
//! complementary "active expiry" task.
//!
//! ## Algorithm
//!
//! Every 100 ms the expirer walks the shards in order. For each shard it runs
//! up to 10 cycles, where a cycle:
//!
//! 1. takes the shard write lock,
//! 2. draws `min(20, live)` random positions from the shard's key list
//!    (with replacement),
//! 3. evicts every sampled entry whose expiry has passed,
//! 4. releases the lock.
//!
//! If at least a quarter of the sample size came back expired, the shard is dirty
//! and gets another cycle; otherwise the expirer moves on. A clean keyspace
//! costs O(1) per tick, a dirty one converges quickly, and no shard lock is
//! ever held for more than one bounded sample.
//!
//! The flat key list each shard maintains exists precisely for step 2:
//! random indexing is O(1), where rebuilding a key list from the map every
//! tick would be O(n) under the lock.

use crate::storage::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Keys sampled per cycle.
pub(crate) const SAMPLE_SIZE: usize = 20;

/// How often the expirer wakes up.
const SWEEP_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on cycles per shard per tick.
const MAX_CYCLES: usize = 10;

/// A cycle that evicts at least this many keys earns the shard another cycle.
const REPEAT_THRESHOLD: usize = (SAMPLE_SIZE as f64 * 0.25) as usize;

/// Handle to the running expirer task.
///
/// The task stops when [`Expirer::stop`] is called or the handle is dropped.
#[derive(Debug)]
pub struct Expirer {
    shutdown_tx: watch::Sender<bool>,
}

impl Expirer {
    /// Spawns the expirer as a background task over `store`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use susydb::storage::{Expirer, Store};
    /// use std::sync::Arc;
    ///
    /// let store = Arc::new(Store::new());
    /// let expirer = Expirer::start(Arc::clone(&store));
    ///
    /// // ... expirer sweeps in the background ...
    ///
    /// drop(expirer); // stops the task
    /// ```
    pub fn start(store: Arc<Store>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(sweep_loop(store, shutdown_rx));
        info!("background expirer started");

        Self { shutdown_tx }
    }

    /// Signals the expirer task to exit. Called automatically on drop.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for Expirer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Starts the expirer over `store`. Convenience wrapper around
/// [`Expirer::start`].
pub fn start_expirer(store: Arc<Store>) -> Expirer {
    Expirer::start(store)
}

async fn sweep_loop(store: Arc<Store>, mut shutdown_rx: watch::Receiver<bool>) {
    let mut tick = tokio::time::interval(SWEEP_INTERVAL);

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("expirer received shutdown signal");
                    return;
                }
            }
        }

        // Shards are swept one after another to avoid CPU spikes.
        let mut evicted = 0;
        for index in 0..super::engine::SHARD_COUNT {
            for _ in 0..MAX_CYCLES {
                let expired = store.sweep_shard(index);
                evicted += expired;
                if expired < REPEAT_THRESHOLD {
                    break;
                }
            }
        }

        if evicted > 0 {
            debug!(
                evicted = evicted,
                keys_remaining = store.len(),
                "expired keys evicted"
            );
        }
    }
}
