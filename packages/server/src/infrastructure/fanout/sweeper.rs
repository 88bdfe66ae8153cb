//! Periodic liveness sweep over the room tree.
//!
//! Most ticks ping every connection; every `prune_every`-th tick prunes the
//! tree instead. With the defaults (15 s tick, prune every 4th) a dead
//! connection is reclaimed within about a minute.

use std::{sync::Arc, time::Duration};

use sasayaki_shared::shutdown::ShutdownSignal;
use tokio::{task::JoinHandle, time::MissedTickBehavior};

use super::room_tree::RoomTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepConfig {
    pub tick: Duration,
    /// Prune on every n-th tick, ping on the others.
    pub prune_every: u32,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(15),
            prune_every: 4,
        }
    }
}

/// What a given tick of the sweeper does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sweep {
    Ping,
    Prune,
}

/// Counts ticks and decides between pinging and pruning.
#[derive(Debug)]
struct Cadence {
    count: u32,
    prune_every: u32,
}

impl Cadence {
    fn new(prune_every: u32) -> Self {
        Self {
            count: 0,
            prune_every: prune_every.max(1),
        }
    }

    fn next(&mut self) -> Sweep {
        self.count += 1;
        if self.count >= self.prune_every {
            self.count = 0;
            Sweep::Prune
        } else {
            Sweep::Ping
        }
    }
}

/// Run the sweeper until `shutdown` fires, then prune one last time.
pub fn spawn_liveness_sweeper(
    tree: Arc<RoomTree>,
    config: SweepConfig,
    mut shutdown: ShutdownSignal,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + config.tick, config.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cadence = Cadence::new(config.prune_every);

        loop {
            tokio::select! {
                _ = ticker.tick() => match cadence.next() {
                    Sweep::Ping => {
                        tracing::trace!("Pinging connections");
                        tree.ping().await;
                    }
                    Sweep::Prune => {
                        tracing::debug!("Pruning closed connections");
                        tree.prune().await;
                    }
                },
                _ = shutdown.recv() => {
                    tracing::debug!("Liveness sweeper stopping");
                    tree.prune().await;
                    break;
                }
            }
        }
    })
}
