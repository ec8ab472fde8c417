//! Campaign Health Monitor - Detects campaigns stuck in `sending`
//!
//! Each tick compares the time since a campaign's last progress with a
//! threshold derived from its class (or a recent acknowledgement). At the
//! threshold a single warning is sent and `next_check_at` suppresses
//! repeats; at twice the threshold the campaign is forced to `error`.

use super::envelope::{campaign_notification, CampaignNotice};
use crate::webhook::WebhookSender;
use chrono::{DateTime, Duration, Utc};
use disparo_common::config::HealthConfig;
use disparo_common::types::CampaignId;
use disparo_common::Result;
use disparo_storage::models::{Campaign, CampaignClass, CampaignStatus, CreateLog};
use disparo_storage::repository::Repositories;
use serde_json::json;
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

const STUCK_EVENT: &str = "campaign_stuck";
const STUCK_ERROR_TYPE: &str = "stuck_campaign";

/// Decision taken for one sending campaign
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthAction {
    Healthy,
    /// Past the threshold, warning sent
    Warned,
    /// Past the threshold, but already warned until `next_check_at`
    Suppressed,
    /// Past twice the threshold, moved to `error`
    ForceFailed,
}

/// Campaign health monitor
pub struct HealthMonitor {
    repos: Repositories,
    sender: Arc<dyn WebhookSender>,
    config: HealthConfig,
}

impl HealthMonitor {
    pub fn new(repos: Repositories, sender: Arc<dyn WebhookSender>, config: HealthConfig) -> Self {
        Self {
            repos,
            sender,
            config,
        }
    }

    /// Run the monitor loop
    pub async fn run(&self) {
        let secs = self.config.poll_interval_secs.max(1);
        let mut ticker = interval(std::time::Duration::from_secs(secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Campaign health monitor started (interval: {}s)", secs);

        loop {
            ticker.tick().await;

            if let Err(e) = self.tick().await {
                error!("Error checking campaign health: {}", e);
            }
        }
    }

    pub async fn tick(&self) -> Result<Vec<(CampaignId, HealthAction)>> {
        self.tick_at(Utc::now()).await
    }

    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<Vec<(CampaignId, HealthAction)>> {
        let sending = self
            .repos
            .campaigns
            .list_by_status(CampaignStatus::Sending)
            .await?;

        let mut actions = Vec::with_capacity(sending.len());
        for campaign in sending {
            match self.check(&campaign, now).await {
                Ok(action) => actions.push((campaign.id, action)),
                Err(e) => error!("Health check for campaign {} failed: {}", campaign.id, e),
            }
        }

        Ok(actions)
    }

    /// Stuck threshold in minutes
    pub fn threshold_minutes(&self, campaign: &Campaign, now: DateTime<Utc>) -> i64 {
        if let Some(ack_at) = campaign.ack_received_at {
            if now - ack_at <= Duration::minutes(self.config.ack_window_minutes) {
                return campaign
                    .ack_timeout_minutes
                    .map(i64::from)
                    .unwrap_or(self.config.ack_default_timeout_minutes);
            }
        }

        let timeouts = &self.config.class_timeouts;
        match campaign.class_enum() {
            Some(CampaignClass::Immediate) => timeouts.immediate,
            Some(CampaignClass::Scheduled) => timeouts.scheduled,
            Some(CampaignClass::Bulk) => timeouts.bulk,
            Some(CampaignClass::LongRunning) => timeouts.long_running,
            None => self.config.base_timeout_minutes,
        }
    }

    async fn check(&self, campaign: &Campaign, now: DateTime<Utc>) -> Result<HealthAction> {
        let elapsed = now - campaign.updated_at;
        let threshold = self.threshold_minutes(campaign, now);
        let limit = Duration::minutes(threshold);
        let stuck_minutes = elapsed.num_minutes();

        if elapsed < limit {
            return Ok(HealthAction::Healthy);
        }

        if elapsed >= limit * 2 {
            let message = format!(
                "Campaign stuck in sending for {} minutes (timeout {} minutes); forced to error",
                stuck_minutes, threshold
            );

            if !self.repos.campaigns.mark_error(campaign.id, &message).await? {
                debug!("Campaign {} changed state before it could be force-failed", campaign.id);
                return Ok(HealthAction::Healthy);
            }

            warn!("{} ({})", message, campaign.id);
            self.log(
                campaign.id,
                "force_failed",
                &message,
                json!({ "time_stuck_minutes": stuck_minutes, "threshold_minutes": threshold }),
            )
            .await;

            let mut snapshot = campaign.clone();
            snapshot.status = CampaignStatus::Error.to_string();
            self.notify(&snapshot, &message, stuck_minutes, "marked_as_error", now)
                .await;

            return Ok(HealthAction::ForceFailed);
        }

        if campaign.next_check_at.map(|at| at > now).unwrap_or(false) {
            return Ok(HealthAction::Suppressed);
        }

        let message = format!(
            "Campaign has made no progress for {} minutes (timeout {} minutes)",
            stuck_minutes, threshold
        );
        warn!("{} ({})", message, campaign.id);

        self.repos
            .campaigns
            .set_next_check(campaign.id, now + limit)
            .await?;
        self.notify(campaign, &message, stuck_minutes, "notified", now)
            .await;
        self.log(
            campaign.id,
            "stuck_warning",
            &message,
            json!({ "time_stuck_minutes": stuck_minutes, "threshold_minutes": threshold }),
        )
        .await;

        Ok(HealthAction::Warned)
    }

    async fn notify(
        &self,
        campaign: &Campaign,
        message: &str,
        stuck_minutes: i64,
        action_taken: &str,
        now: DateTime<Utc>,
    ) {
        let url = self
            .config
            .notify_url
            .as_deref()
            .or(campaign.webhook_url.as_deref());

        let Some(url) = url else {
            debug!("No notification URL for campaign {}", campaign.id);
            return;
        };

        let payload = campaign_notification(
            campaign,
            &CampaignNotice {
                event: STUCK_EVENT,
                error_type: STUCK_ERROR_TYPE,
                message,
                time_stuck: Some(stuck_minutes),
                action_taken,
                detected_at: now,
            },
        );

        let outcome = self.sender.deliver(url, &payload).await;
        if !outcome.success {
            warn!(
                "Stuck notification for campaign {} not delivered: {}",
                campaign.id,
                outcome.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    async fn log(&self, campaign_id: CampaignId, action: &str, message: &str, data: serde_json::Value) {
        if let Err(e) = self
            .repos
            .audit
            .append_campaign_log(campaign_id, CreateLog::new(action, message, data))
            .await
        {
            warn!("Failed to write campaign log for {}: {}", campaign_id, e);
        }
    }
}
