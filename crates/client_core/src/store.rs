//! Entity store: the three collections the view renders, replaced together on
//! every successful reconciliation and never edited in place.

use std::sync::Arc;

use futures::future::join3;
use shared::{
    domain::{CampaignId, LeadId},
    protocol::{Campaign, Lead, Script},
};
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};

use crate::{
    error::{Collection, ReconcileError},
    gateway::RemoteGateway,
};

/// One consistent view of the backend. `generation` is 0 before the first
/// successful reconciliation and grows by one with every applied snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub generation: u64,
    pub leads: Vec<Lead>,
    pub campaigns: Vec<Campaign>,
    pub scripts: Vec<Script>,
}

impl Snapshot {
    pub fn lead(&self, lead_id: &LeadId) -> Option<&Lead> {
        self.leads.iter().find(|lead| &lead.id == lead_id)
    }

    pub fn campaign(&self, campaign_id: &CampaignId) -> Option<&Campaign> {
        self.campaigns
            .iter()
            .find(|campaign| &campaign.id == campaign_id)
    }

    pub fn is_loaded(&self) -> bool {
        self.generation > 0
    }
}

pub struct EntityStore {
    gateway: Arc<dyn RemoteGateway>,
    current: RwLock<Arc<Snapshot>>,
    applied: broadcast::Sender<Arc<Snapshot>>,
}

impl EntityStore {
    pub fn new(gateway: Arc<dyn RemoteGateway>) -> Self {
        let (applied, _) = broadcast::channel(64);
        Self {
            gateway,
            current: RwLock::new(Arc::new(Snapshot::default())),
            applied,
        }
    }

    pub async fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&*self.current.read().await)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Snapshot>> {
        self.applied.subscribe()
    }

    /// Fetches leads, scripts and campaigns concurrently and swaps all three in
    /// at once. If any fetch fails the previous snapshot stays in place.
    ///
    /// Overlapping calls are not serialized: whichever completes last wins.
    pub async fn reconcile(&self) -> Result<Arc<Snapshot>, ReconcileError> {
        let (leads, scripts, campaigns) = join3(
            self.gateway.list_leads(),
            self.gateway.list_scripts(),
            self.gateway.list_campaigns(),
        )
        .await;

        let (leads, scripts, campaigns) = match (leads, scripts, campaigns) {
            (Ok(leads), Ok(scripts), Ok(campaigns)) => (leads, scripts, campaigns),
            (leads, scripts, campaigns) => {
                let failures = [
                    (Collection::Leads, leads.err()),
                    (Collection::Scripts, scripts.err()),
                    (Collection::Campaigns, campaigns.err()),
                ]
                .into_iter()
                .filter_map(|(collection, failure)| failure.map(|failure| (collection, failure)))
                .collect::<Vec<_>>();
                let err = ReconcileError { failures };
                warn!(error = %err, "reconcile: keeping previous snapshot");
                return Err(err);
            }
        };

        let snapshot = {
            let mut current = self.current.write().await;
            let snapshot = Arc::new(Snapshot {
                generation: current.generation + 1,
                leads,
                campaigns,
                scripts,
            });
            *current = Arc::clone(&snapshot);
            snapshot
        };
        info!(
            generation = snapshot.generation,
            leads = snapshot.leads.len(),
            campaigns = snapshot.campaigns.len(),
            scripts = snapshot.scripts.len(),
            "reconcile: snapshot applied"
        );
        let _ = self.applied.send(Arc::clone(&snapshot));
        Ok(snapshot)
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
