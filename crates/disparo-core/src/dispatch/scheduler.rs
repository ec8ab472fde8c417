//! Campaign Scheduler - Picks up due campaigns and hands them to the pacer

use super::pacer::{DispatchPacer, DispatchRun};
use chrono::{DateTime, Utc};
use disparo_common::Result;
use disparo_storage::repository::Repositories;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info};

/// Campaign scheduler
pub struct CampaignScheduler {
    repos: Repositories,
    pacer: Arc<DispatchPacer>,
    /// Interval between polls (seconds)
    poll_interval_secs: u64,
}

impl CampaignScheduler {
    pub fn new(repos: Repositories, pacer: Arc<DispatchPacer>) -> Self {
        Self {
            repos,
            pacer,
            poll_interval_secs: 5,
        }
    }

    /// Set poll interval
    pub fn with_poll_interval(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs.max(1);
        self
    }

    /// Run the scheduler loop. The first tick fires immediately.
    pub async fn run(&self) {
        let mut ticker = interval(Duration::from_secs(self.poll_interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Campaign scheduler started (interval: {}s)", self.poll_interval_secs);

        loop {
            ticker.tick().await;

            if let Err(e) = self.tick().await {
                error!("Error processing due campaigns: {}", e);
            }
        }
    }

    pub async fn tick(&self) -> Result<usize> {
        self.tick_at(Utc::now()).await
    }

    /// Dispatch every campaign due at `now`, one after another.
    /// Returns how many runs actually started.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let due = self.repos.campaigns.list_due(now).await?;

        if due.is_empty() {
            return Ok(0);
        }

        debug!("{} campaigns due", due.len());

        let mut started = 0;
        for campaign in due {
            match self.pacer.run(&campaign).await {
                DispatchRun::Skipped => {}
                DispatchRun::Completed(_)
                | DispatchRun::Interrupted(_)
                | DispatchRun::Failed(_) => started += 1,
            }
        }

        Ok(started)
    }
}
