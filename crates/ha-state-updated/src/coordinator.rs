//! Periodic auto-clear shared by all entries

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use ha_runtime::SharedClock;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::entry::{LoadedEntry, SharedEntry};
use crate::tracker::ClearOutcome;

/// Default time between auto-clear checks
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(60);

pub struct Coordinator {
    entries: Arc<DashMap<String, LoadedEntry>>,
    clock: SharedClock,
    interval: Duration,
}

impl Coordinator {
    pub fn new(entries: Arc<DashMap<String, LoadedEntry>>, clock: SharedClock, interval: Duration) -> Self {
        Self {
            entries,
            clock,
            interval,
        }
    }

    /// Run one auto-clear pass; returns how many entries were cleared
    pub async fn refresh(&self) -> usize {
        // Collect first so no map guard is held across an await
        let runtimes: Vec<SharedEntry> = self
            .entries
            .iter()
            .map(|entry| entry.runtime.clone())
            .collect();

        let now = self.clock.now();
        let mut cleared = 0;
        for runtime in runtimes {
            let mut runtime = runtime.lock().await;
            if !runtime.auto_clear_enabled() {
                trace!(entry_id = runtime.entry_id(), "Auto-clear disabled");
                continue;
            }
            if runtime.auto_clear(now).await == ClearOutcome::Cleared {
                cleared += 1;
            }
        }

        debug!(cleared, "Auto-clear pass finished");
        cleared
    }

    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                self.refresh().await;
            }
        })
    }
}
