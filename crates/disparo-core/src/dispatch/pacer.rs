//! Dispatch Pacer - Delivers one campaign contact by contact
//!
//! The randomized delay is the gap between consecutive sends: the first
//! contact goes out immediately and each later one waits a fresh draw
//! from `[min_delay, max_delay]` seconds, so a campaign of N contacts
//! takes at most `(N - 1) × max_delay` seconds plus delivery time.

use super::envelope::{campaign_envelope, campaign_notification, CampaignNotice, CampaignSend};
use super::DispatchError;
use crate::template::TemplateRenderer;
use crate::webhook::WebhookSender;
use chrono::Utc;
use disparo_common::types::CampaignId;
use disparo_storage::models::{Campaign, CampaignStatus, CreateLog};
use disparo_storage::repository::Repositories;
use rand::Rng;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Counters for one campaign run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
    /// Contacts not delivered because the campaign has no webhook URL
    pub skipped: usize,
}

/// How a call to [`DispatchPacer::run`] ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchRun {
    /// Another poller owns the campaign, or it is no longer pending
    Skipped,
    Completed(DispatchSummary),
    /// Every contact was processed but the campaign left `sending` meanwhile
    Interrupted(DispatchSummary),
    /// The campaign was moved to `error` with this message, or could not
    /// be marked sent
    Failed(String),
}

/// Campaign dispatch pacer
pub struct DispatchPacer {
    repos: Repositories,
    sender: Arc<dyn WebhookSender>,
    renderer: TemplateRenderer,
    instance: String,
}

impl DispatchPacer {
    pub fn new(repos: Repositories, sender: Arc<dyn WebhookSender>, instance: impl Into<String>) -> Self {
        Self {
            repos,
            sender,
            renderer: TemplateRenderer::new(),
            instance: instance.into(),
        }
    }

    /// Claim and deliver a campaign. Failures end up in the campaign row,
    /// never in the caller.
    pub async fn run(&self, campaign: &Campaign) -> DispatchRun {
        match self.repos.campaigns.claim(campaign.id).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("Campaign {} is no longer pending, skipping", campaign.id);
                return DispatchRun::Skipped;
            }
            Err(e) => {
                error!("Failed to claim campaign {}: {}", campaign.id, e);
                return DispatchRun::Failed(e.to_string());
            }
        }

        info!(
            "Dispatching campaign {} ({}) to {} contacts",
            campaign.id,
            campaign.name,
            campaign.contact_ids.len()
        );
        self.audit(
            campaign.id,
            CreateLog::new(
                "started",
                "Campaign dispatch started",
                json!({ "total_contacts": campaign.contact_ids.len() }),
            ),
        )
        .await;

        match self.dispatch(campaign).await {
            Ok(summary) => match self.repos.campaigns.mark_sent(campaign.id).await {
                Ok(true) => {
                    info!(
                        "Campaign {} completed: {} sent, {} failed, {} skipped",
                        campaign.id, summary.sent, summary.failed, summary.skipped
                    );
                    self.audit(
                        campaign.id,
                        CreateLog::new(
                            "completed",
                            format!("Delivered to {} of {} contacts", summary.sent, summary.total),
                            json!(summary),
                        ),
                    )
                    .await;
                    DispatchRun::Completed(summary)
                }
                Ok(false) => {
                    let status = match self.repos.campaigns.get(campaign.id).await {
                        Ok(Some(current)) => current.status,
                        Ok(None) => "missing".to_string(),
                        Err(e) => {
                            warn!("Failed to reload campaign {}: {}", campaign.id, e);
                            "unknown".to_string()
                        }
                    };
                    warn!(
                        "Campaign {} became {} during dispatch; status left unchanged",
                        campaign.id, status
                    );
                    self.audit(
                        campaign.id,
                        CreateLog::new(
                            "finished_after_close",
                            format!("Dispatch loop finished after the campaign became {}", status),
                            json!({ "status": status, "summary": summary }),
                        ),
                    )
                    .await;
                    DispatchRun::Interrupted(summary)
                }
                Err(e) => {
                    error!("Failed to mark campaign {} as sent: {}", campaign.id, e);
                    DispatchRun::Failed(e.to_string())
                }
            },
            Err(e) => {
                let message = e.to_string();
                self.fail(campaign, &message).await;
                DispatchRun::Failed(message)
            }
        }
    }

    async fn dispatch(&self, campaign: &Campaign) -> Result<DispatchSummary, DispatchError> {
        let message = self
            .repos
            .messages
            .get(campaign.message_id)
            .await?
            .ok_or(DispatchError::MessageNotFound(campaign.message_id))?;

        let contacts = self.repos.contacts.get_many(&campaign.contact_ids).await?;
        if contacts.is_empty() {
            return Err(DispatchError::NoContacts(campaign.id));
        }
        if contacts.len() < campaign.contact_ids.len() {
            warn!(
                "Campaign {}: {} of {} contacts no longer exist",
                campaign.id,
                campaign.contact_ids.len() - contacts.len(),
                campaign.contact_ids.len()
            );
        }

        let (min_delay, max_delay) = delay_range(campaign)?;

        let url = campaign
            .webhook_url
            .as_deref()
            .filter(|u| !u.trim().is_empty());
        if url.is_none() {
            warn!("Campaign {} has no webhook URL; deliveries are skipped", campaign.id);
        }

        let total = contacts.len();
        let mut summary = DispatchSummary {
            total,
            ..Default::default()
        };

        for (index, contact) in contacts.iter().enumerate() {
            let delay = if index == 0 {
                0
            } else {
                draw_delay(min_delay, max_delay)
            };
            if delay > 0 {
                debug!("Campaign {}: waiting {}s before contact {}", campaign.id, delay, index + 1);
                tokio::time::sleep(Duration::from_secs(delay)).await;
            }

            let Some(url) = url else {
                summary.skipped += 1;
                continue;
            };

            let rendered = self.renderer.render_message(&message.content, contact);
            let send = CampaignSend {
                instance: &self.instance,
                campaign,
                message: &message,
                contact,
                rendered: &rendered,
                contact_index: index,
                total_contacts: total,
                delay_applied: delay,
                sent_at: Utc::now(),
            };

            let data = json!({
                "contact_id": contact.id,
                "contact_index": index,
                "delay_applied": delay,
            });

            match campaign_envelope(&send) {
                Ok(payload) => {
                    let outcome = self.sender.deliver(url, &payload).await;
                    let mut data = data;
                    data["delivery"] = json!(outcome);

                    if outcome.success {
                        summary.sent += 1;
                        self.audit(
                            campaign.id,
                            CreateLog::new("contact_sent", format!("Delivered to {}", contact.name), data),
                        )
                        .await;
                    } else {
                        summary.failed += 1;
                        warn!(
                            "Campaign {}: delivery to contact {} failed: {}",
                            campaign.id,
                            contact.id,
                            outcome.error.as_deref().unwrap_or("unknown error")
                        );
                        self.audit(
                            campaign.id,
                            CreateLog::new("contact_failed", format!("Delivery to {} failed", contact.name), data),
                        )
                        .await;
                    }
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!("Campaign {}: could not build envelope for {}: {}", campaign.id, contact.id, e);
                    self.audit(
                        campaign.id,
                        CreateLog::new("contact_failed", e.to_string(), data),
                    )
                    .await;
                }
            }

            self.repos
                .campaigns
                .record_progress(campaign.id, summary.sent as i32, summary.failed as i32)
                .await?;
        }

        Ok(summary)
    }

    async fn fail(&self, campaign: &Campaign, message: &str) {
        error!("Campaign {} failed: {}", campaign.id, message);

        match self.repos.campaigns.mark_error(campaign.id, message).await {
            Ok(true) => {}
            Ok(false) => warn!("Campaign {} was not in a state that can move to error", campaign.id),
            Err(e) => error!("Failed to mark campaign {} as error: {}", campaign.id, e),
        }

        self.audit(
            campaign.id,
            CreateLog::new("error", message, json!({ "error": message })),
        )
        .await;

        let Some(url) = campaign.webhook_url.as_deref() else {
            return;
        };

        let mut snapshot = campaign.clone();
        snapshot.status = CampaignStatus::Error.to_string();
        let payload = campaign_notification(
            &snapshot,
            &CampaignNotice {
                event: "campaign_error",
                error_type: "dispatch_error",
                message,
                time_stuck: None,
                action_taken: "marked_as_error",
                detected_at: Utc::now(),
            },
        );

        let outcome = self.sender.deliver(url, &payload).await;
        if !outcome.success {
            warn!(
                "Error notification for campaign {} not delivered: {}",
                campaign.id,
                outcome.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    async fn audit(&self, campaign_id: CampaignId, entry: CreateLog) {
        if let Err(e) = self.repos.audit.append_campaign_log(campaign_id, entry).await {
            warn!("Failed to write campaign log for {}: {}", campaign_id, e);
        }
    }
}

fn delay_range(campaign: &Campaign) -> Result<(u64, u64), DispatchError> {
    let (min, max) = (
        campaign.min_delay_between_clients,
        campaign.max_delay_between_clients,
    );
    if min < 0 || max < min {
        return Err(DispatchError::InvalidDelayRange { min, max });
    }
    Ok((min as u64, max as u64))
}

/// Uniform integer seconds, inclusive on both ends
fn draw_delay(min: u64, max: u64) -> u64 {
    rand::thread_rng().gen_range(min..=max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, RecordingSender};
    use crate::webhook::DeliveryOutcome;
    use disparo_storage::repository::CampaignRepository;
    use disparo_storage::MemoryStore;
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    const HOOK: &str = "https://hooks.example.com/webhook/campaign";

    struct Fixture {
        store: Arc<MemoryStore>,
        sender: Arc<RecordingSender>,
        pacer: DispatchPacer,
    }

    fn fixture(sender: Arc<RecordingSender>) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let pacer = DispatchPacer::new(
            Repositories::memory(store.clone()),
            sender.clone(),
            "disparo",
        );
        Fixture { store, sender, pacer }
    }

    async fn seed_campaign(store: &MemoryStore, names: &[&str], min: i32, max: i32) -> Campaign {
        let message = testing::message("Oi {{nome}}");
        store.insert_message(message.clone()).await;

        let mut ids = Vec::new();
        for (i, name) in names.iter().enumerate() {
            let contact = testing::contact(name, &format!("55119999900{:02}", i));
            ids.push(contact.id);
            store.insert_contact(contact).await;
        }

        let mut campaign = testing::campaign(message.id, ids, Some(HOOK));
        campaign.min_delay_between_clients = min;
        campaign.max_delay_between_clients = max;
        store.insert_campaign(campaign.clone()).await;
        campaign
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivers_once_per_contact_despite_failures() {
        let sender = RecordingSender::failing_when(|payload| payload["contact"]["name"] == "Bia");
        let f = fixture(sender);
        let campaign = seed_campaign(&f.store, &["Ana", "Bia", "Caio"], 1, 3).await;

        let run = f.pacer.run(&campaign).await;

        assert_eq!(
            run,
            DispatchRun::Completed(DispatchSummary {
                total: 3,
                sent: 2,
                failed: 1,
                skipped: 0
            })
        );
        assert_eq!(f.sender.calls().len(), 3);

        let stored = f.store.campaign(campaign.id).await.unwrap();
        assert_eq!(stored.status, "sent");
        assert_eq!((stored.sent_count, stored.failed_count), (2, 1));
        assert!(stored.completed_at.is_some());

        let actions: Vec<String> = f
            .store
            .campaign_logs(campaign.id)
            .await
            .into_iter()
            .map(|l| l.action)
            .collect();
        assert_eq!(
            actions,
            vec!["started", "contact_sent", "contact_failed", "contact_sent", "completed"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_is_gap_between_sends() {
        let f = fixture(RecordingSender::new());
        let campaign = seed_campaign(&f.store, &["Ana", "Bia", "Caio"], 10, 10).await;

        let started = tokio::time::Instant::now();
        f.pacer.run(&campaign).await;

        assert_eq!(started.elapsed(), Duration::from_secs(20));

        let delays: Vec<u64> = f
            .sender
            .calls()
            .iter()
            .map(|(_, p)| p["metadata"]["delay_applied"].as_u64().unwrap())
            .collect();
        assert_eq!(delays, vec![0, 10, 10]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_random_delays_stay_in_range() {
        let f = fixture(RecordingSender::new());
        let names = ["A", "B", "C", "D", "E", "F", "G", "H"];
        let campaign = seed_campaign(&f.store, &names, 2, 5).await;

        f.pacer.run(&campaign).await;

        let calls = f.sender.calls();
        assert_eq!(calls.len(), names.len());
        for (i, (url, payload)) in calls.iter().enumerate() {
            assert_eq!(url, HOOK);
            assert_eq!(payload["metadata"]["contact_index"], i);
            let delay = payload["metadata"]["delay_applied"].as_u64().unwrap();
            if i == 0 {
                assert_eq!(delay, 0);
            } else {
                assert!((2..=5).contains(&delay), "delay {delay} out of range");
            }
        }
    }

    #[tokio::test]
    async fn test_skips_campaign_not_pending() {
        let f = fixture(RecordingSender::new());
        let mut campaign = seed_campaign(&f.store, &["Ana"], 0, 0).await;
        campaign.status = "sending".to_string();
        f.store.insert_campaign(campaign.clone()).await;

        assert_eq!(f.pacer.run(&campaign).await, DispatchRun::Skipped);
        assert!(f.sender.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_message_marks_error_and_notifies() {
        let f = fixture(RecordingSender::new());
        let contact = testing::contact("Ana", "5511999990000");
        f.store.insert_contact(contact.clone()).await;
        let campaign = testing::campaign(uuid::Uuid::new_v4(), vec![contact.id], Some(HOOK));
        f.store.insert_campaign(campaign.clone()).await;

        let run = f.pacer.run(&campaign).await;

        assert!(matches!(run, DispatchRun::Failed(ref m) if m.contains("not found")));
        let stored = f.store.campaign(campaign.id).await.unwrap();
        assert_eq!(stored.status, "error");
        assert!(stored.error_message.unwrap().contains("not found"));

        let calls = f.sender.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1["event"], "campaign_error");
        assert_eq!(calls[0].1["campaign"]["status"], "error");
    }

    #[tokio::test]
    async fn test_empty_contact_set_marks_error() {
        let f = fixture(RecordingSender::new());
        let campaign = seed_campaign(&f.store, &[], 0, 0).await;

        let run = f.pacer.run(&campaign).await;

        assert!(matches!(run, DispatchRun::Failed(_)));
        assert_eq!(f.store.campaign(campaign.id).await.unwrap().status, "error");
    }

    #[tokio::test]
    async fn test_without_webhook_contacts_are_skipped() {
        let f = fixture(RecordingSender::new());
        let mut campaign = seed_campaign(&f.store, &["Ana", "Bia"], 0, 0).await;
        campaign.webhook_url = None;
        f.store.insert_campaign(campaign.clone()).await;

        let run = f.pacer.run(&campaign).await;

        assert_eq!(
            run,
            DispatchRun::Completed(DispatchSummary {
                total: 2,
                sent: 0,
                failed: 0,
                skipped: 2
            })
        );
        assert!(f.sender.calls().is_empty());
    }

    /// Force-fails the campaign on its first delivery, as the health monitor would
    struct ForceFailOnDelivery {
        store: Arc<MemoryStore>,
    }

    #[async_trait::async_trait]
    impl WebhookSender for ForceFailOnDelivery {
        async fn deliver(&self, _url: &str, payload: &Value) -> DeliveryOutcome {
            let id = payload["campaign"]["id"]
                .as_str()
                .and_then(|s| s.parse().ok())
                .unwrap();
            CampaignRepository::mark_error(self.store.as_ref(), id, "Campaign stuck")
                .await
                .unwrap();
            DeliveryOutcome {
                success: true,
                status: Some(200),
                error: None,
                method_used: Some("direct".to_string()),
                suggestion: None,
            }
        }
    }

    #[tokio::test]
    async fn test_force_failed_mid_run_is_not_completed() {
        let store = Arc::new(MemoryStore::new());
        let pacer = DispatchPacer::new(
            Repositories::memory(store.clone()),
            Arc::new(ForceFailOnDelivery {
                store: store.clone(),
            }),
            "disparo",
        );
        let campaign = seed_campaign(&store, &["Ana", "Bia", "Caio"], 0, 0).await;

        let run = pacer.run(&campaign).await;

        assert_eq!(
            run,
            DispatchRun::Interrupted(DispatchSummary {
                total: 3,
                sent: 3,
                failed: 0,
                skipped: 0
            })
        );

        let stored = store.campaign(campaign.id).await.unwrap();
        assert_eq!(stored.status, "error");
        assert_eq!(stored.error_message.as_deref(), Some("Campaign stuck"));

        let logs = store.campaign_logs(campaign.id).await;
        let actions: Vec<&str> = logs.iter().map(|l| l.action.as_str()).collect();
        assert_eq!(
            actions,
            vec!["started", "contact_sent", "contact_sent", "contact_sent", "finished_after_close"]
        );
        assert_eq!(logs[4].data["status"], "error");
    }
}
