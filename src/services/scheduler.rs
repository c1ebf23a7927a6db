// Scheduling loop: one tick runs the daily, weekly and monthly cadences

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::models::Frequency;
use crate::services::clock::Clock;
use crate::services::dispatcher::{BatchReport, Dispatcher};

pub struct Scheduler {
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
    tick_every: Duration,
    shutdown: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(
        dispatcher: Dispatcher,
        clock: Arc<dyn Clock>,
        tick_every: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            dispatcher: dispatcher.with_shutdown(shutdown.clone()),
            clock,
            tick_every,
            shutdown,
        }
    }

    /// Runs every cadence once for `now`. A failing cadence does not stop the others.
    pub async fn tick(&self, now: DateTime<Utc>) -> Vec<BatchReport> {
        let mut reports = Vec::with_capacity(Frequency::ALL.len());
        for frequency in Frequency::ALL {
            if *self.shutdown.borrow() {
                break;
            }
            match self.dispatcher.run_batch(frequency, now).await {
                Ok(report) => reports.push(report),
                Err(e) => error!(%frequency, "Batch failed: {}", e),
            }
        }
        reports
    }

    /// Ticks until shutdown is signalled. The first tick fires immediately.
    pub async fn run(self) {
        info!(every = ?self.tick_every, "Newsletter scheduler started");

        let mut interval = tokio::time::interval(self.tick_every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now = self.clock.now();
                    self.tick(now).await;
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                },
            }
        }

        info!("Newsletter scheduler stopped");
    }
}
