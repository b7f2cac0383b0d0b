use std::{sync::Arc, time::Duration};

use shared::domain::{CampaignAction, CampaignId};
use tracing::{info, warn};

use crate::{
    error::{ClientError, Operation},
    gateway::{within_deadline, RemoteGateway},
    store::EntityStore,
    ActionReport,
};

/// Start/pause pass-through. The displayed status is never flipped locally;
/// it changes only when the follow-up reconciliation says so.
pub struct CampaignLifecycleController {
    gateway: Arc<dyn RemoteGateway>,
    store: Arc<EntityStore>,
    deadline: Option<Duration>,
}

impl CampaignLifecycleController {
    pub fn new(
        gateway: Arc<dyn RemoteGateway>,
        store: Arc<EntityStore>,
        deadline: Option<Duration>,
    ) -> Self {
        Self {
            gateway,
            store,
            deadline,
        }
    }

    pub async fn start(&self, campaign_id: &CampaignId) -> ActionReport<()> {
        self.transition(campaign_id, CampaignAction::Start).await
    }

    pub async fn pause(&self, campaign_id: &CampaignId) -> ActionReport<()> {
        self.transition(campaign_id, CampaignAction::Pause).await
    }

    async fn transition(
        &self,
        campaign_id: &CampaignId,
        action: CampaignAction,
    ) -> ActionReport<()> {
        info!(
            campaign_id = %campaign_id,
            action = action.as_str(),
            "campaign: requesting transition"
        );
        let outcome = match action {
            CampaignAction::Start => {
                within_deadline(self.deadline, self.gateway.start_campaign(campaign_id))
                    .await
                    .map_err(|failure| ClientError::request(Operation::StartCampaign, failure))
            }
            CampaignAction::Pause => {
                within_deadline(self.deadline, self.gateway.pause_campaign(campaign_id))
                    .await
                    .map_err(|failure| ClientError::request(Operation::PauseCampaign, failure))
            }
        };
        if let Err(err) = &outcome {
            warn!(
                campaign_id = %campaign_id,
                action = action.as_str(),
                error = %err,
                "campaign: transition failed"
            );
        }

        let reconciliation = self.store.reconcile().await;
        ActionReport::completed(outcome, reconciliation)
    }
}

#[cfg(test)]
#[path = "tests/campaign_tests.rs"]
mod tests;
