use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::Client;
use shared::{
    domain::{CampaignId, LeadId},
    protocol::{CreatedRecord, Lead},
};
use tokio::sync::broadcast;
use tracing::{info, warn};

pub mod call;
pub mod campaign;
pub mod config;
pub mod error;
pub mod forms;
pub mod gateway;
pub mod lock;
pub mod meeting;
pub mod outcomes;
pub mod store;

pub use call::{CallInitiated, CallPlacementController, FirstScript, ScriptSelector};
pub use campaign::CampaignLifecycleController;
pub use config::{load_settings, ClientSettings};
pub use error::{ClientError, Collection, Operation, ReconcileError, RequestError, RequestFailure};
pub use forms::{parse_regions, NewCampaign, NewLead, NewScript};
pub use gateway::{HttpGateway, RemoteGateway};
pub use lock::{ActionGuard, ActionKind, ActionLock};
pub use meeting::{
    extract_join_link, DraftState, MeetingDraft, MeetingPhase, MeetingScheduled, MeetingScheduler,
    MeetingZone,
};
pub use outcomes::{MeetingOutcome, MeetingOutcomeCache};
pub use store::{EntityStore, Snapshot};

use crate::gateway::within_deadline;

/// What an operation did, and the reconciliation it triggered. Rejected
/// operations (validation, busy) send nothing and carry no reconciliation.
#[derive(Debug)]
#[must_use]
pub struct ActionReport<T> {
    pub outcome: Result<T, ClientError>,
    pub reconciliation: Option<Result<Arc<Snapshot>, ReconcileError>>,
}

impl<T> ActionReport<T> {
    pub fn rejected(err: ClientError) -> Self {
        Self {
            outcome: Err(err),
            reconciliation: None,
        }
    }

    pub fn completed(
        outcome: Result<T, ClientError>,
        reconciliation: Result<Arc<Snapshot>, ReconcileError>,
    ) -> Self {
        Self {
            outcome,
            reconciliation: Some(reconciliation),
        }
    }

    pub fn is_rejected(&self) -> bool {
        self.reconciliation.is_none()
    }

    /// Snapshot applied by the follow-up reconciliation, if it succeeded.
    pub fn snapshot(&self) -> Option<&Arc<Snapshot>> {
        self.reconciliation.as_ref().and_then(|result| result.as_ref().ok())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Progress or success line for the operator.
    Status(String),
    Failure(String),
    StoreReconciled { generation: u64 },
}

/// Everything a view layer needs: the store, the controllers sharing one
/// action lock, and an event stream of status lines.
pub struct OutreachClient {
    settings: ClientSettings,
    gateway: Arc<dyn RemoteGateway>,
    store: Arc<EntityStore>,
    lock: ActionLock,
    calls: CallPlacementController,
    meetings: MeetingScheduler,
    campaigns: CampaignLifecycleController,
    events: broadcast::Sender<ClientEvent>,
}

impl OutreachClient {
    pub fn new(settings: ClientSettings) -> Result<Arc<Self>> {
        let base_url = config::normalize_backend_url(&settings.backend_url)
            .context("backend url is not usable")?;
        let http = Client::builder()
            .build()
            .context("failed to build http client")?;
        let gateway = Arc::new(HttpGateway::with_client(http, base_url));
        Ok(Self::with_gateway(settings, gateway))
    }

    pub fn with_gateway(settings: ClientSettings, gateway: Arc<dyn RemoteGateway>) -> Arc<Self> {
        let store = Arc::new(EntityStore::new(Arc::clone(&gateway)));
        let lock = ActionLock::new();
        let deadline = settings.action_timeout();
        let calls = CallPlacementController::new(
            Arc::clone(&gateway),
            Arc::clone(&store),
            lock.clone(),
            deadline,
        );
        let meetings = MeetingScheduler::new(
            Arc::clone(&gateway),
            Arc::clone(&store),
            lock.clone(),
            settings.meeting_zone(),
            deadline,
            settings.meeting_template(),
            settings.meeting_outcome_capacity,
        );
        let campaigns =
            CampaignLifecycleController::new(Arc::clone(&gateway), Arc::clone(&store), deadline);
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            settings,
            gateway,
            store,
            lock,
            calls,
            meetings,
            campaigns,
            events,
        })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> Arc<Snapshot> {
        self.store.snapshot().await
    }

    pub fn is_busy(&self, lead_id: &LeadId) -> bool {
        self.lock.is_locked(lead_id)
    }

    pub async fn refresh(&self) -> Result<Arc<Snapshot>, ReconcileError> {
        let result = self.store.reconcile().await;
        self.publish_reconciliation(&result);
        result
    }

    pub async fn create_lead(&self, lead: &NewLead) -> ActionReport<Lead> {
        let request = match lead.to_request() {
            Ok(request) => request,
            Err(err) => return self.reject(err),
        };
        let outcome = within_deadline(
            self.settings.action_timeout(),
            self.gateway.create_lead(&request),
        )
        .await
        .map_err(|failure| ClientError::request(Operation::CreateLead, failure));
        if let Ok(created) = &outcome {
            info!(lead_id = %created.id, "lead: created");
        }
        self.finish_create(outcome, "Lead saved").await
    }

    pub async fn create_script(&self, script: &NewScript) -> ActionReport<CreatedRecord> {
        let request = match script.to_request() {
            Ok(request) => request,
            Err(err) => return self.reject(err),
        };
        let outcome = within_deadline(
            self.settings.action_timeout(),
            self.gateway.create_script(&request),
        )
        .await
        .map_err(|failure| ClientError::request(Operation::CreateScript, failure));
        self.finish_create(outcome, "Script created").await
    }

    pub async fn create_campaign(&self, campaign: &NewCampaign) -> ActionReport<CreatedRecord> {
        let request = match campaign.to_request() {
            Ok(request) => request,
            Err(err) => return self.reject(err),
        };
        let outcome = within_deadline(
            self.settings.action_timeout(),
            self.gateway.create_campaign(&request),
        )
        .await
        .map_err(|failure| ClientError::request(Operation::CreateCampaign, failure));
        self.finish_create(outcome, "Campaign created").await
    }

    pub async fn place_call(&self, lead_id: &LeadId) -> ActionReport<CallInitiated> {
        if !self.lock.is_locked(lead_id) {
            self.status("Placing call...");
        }
        let report = self.calls.place_call(lead_id).await;
        self.publish_report(
            &report,
            "Call initiated. The system will update the lead after the call input.",
        );
        report
    }

    pub async fn open_meeting_draft(&self, lead_id: &LeadId) -> MeetingDraft {
        self.meetings.open_draft(lead_id).await
    }

    pub async fn update_meeting_draft<F>(
        &self,
        lead_id: &LeadId,
        edit: F,
    ) -> Result<MeetingDraft, ClientError>
    where
        F: FnOnce(&mut MeetingDraft),
    {
        self.meetings.update_draft(lead_id, edit).await
    }

    pub async fn cancel_meeting_draft(&self, lead_id: &LeadId) -> bool {
        self.meetings.cancel_draft(lead_id).await
    }

    pub async fn meeting_draft(&self, lead_id: &LeadId) -> Option<DraftState> {
        self.meetings.draft(lead_id).await
    }

    pub async fn schedule_meeting(&self, lead_id: &LeadId) -> ActionReport<MeetingScheduled> {
        if let Err(err) = self.meetings.prepare(lead_id).await {
            return self.reject(err);
        }
        if !self.lock.is_locked(lead_id) {
            self.status("Creating Google Calendar event...");
        }
        let report = self.meetings.schedule_meeting(lead_id).await;
        self.publish_report(&report, "Meeting created successfully");
        report
    }

    /// Join link to show for `lead_id`: the backend's own meeting record once
    /// it has one, else the link remembered from a recent scheduling.
    pub async fn meeting_link(&self, lead_id: &LeadId) -> Option<String> {
        let snapshot = self.store.snapshot().await;
        let backend = snapshot
            .lead(lead_id)
            .and_then(|lead| lead.meeting.as_ref())
            .and_then(|meeting| meeting.join_link.clone());
        match backend {
            Some(link) => Some(link),
            None => self
                .meetings
                .outcome(lead_id)
                .await
                .and_then(|outcome| outcome.join_link),
        }
    }

    pub async fn start_campaign(&self, campaign_id: &CampaignId) -> ActionReport<()> {
        let report = self.campaigns.start(campaign_id).await;
        self.publish_outcome_failure(&report);
        self.publish_reconciliation_of(&report);
        report
    }

    pub async fn pause_campaign(&self, campaign_id: &CampaignId) -> ActionReport<()> {
        let report = self.campaigns.pause(campaign_id).await;
        self.publish_outcome_failure(&report);
        self.publish_reconciliation_of(&report);
        report
    }

    async fn finish_create<T>(
        &self,
        outcome: Result<T, ClientError>,
        success: &str,
    ) -> ActionReport<T> {
        match outcome {
            Ok(created) => {
                self.status(success);
                let report = ActionReport::completed(Ok(created), self.store.reconcile().await);
                self.publish_reconciliation_of(&report);
                report
            }
            Err(err) => self.reject(err),
        }
    }

    fn reject<T>(&self, err: ClientError) -> ActionReport<T> {
        warn!(error = %err, "client: operation rejected");
        self.publish(ClientEvent::Failure(err.user_message()));
        ActionReport::rejected(err)
    }

    fn publish_report<T>(&self, report: &ActionReport<T>, success: &str) {
        match &report.outcome {
            Ok(_) => self.status(success),
            Err(err) => self.publish(ClientEvent::Failure(err.user_message())),
        }
        self.publish_reconciliation_of(report);
    }

    fn publish_outcome_failure<T>(&self, report: &ActionReport<T>) {
        if let Err(err) = &report.outcome {
            self.publish(ClientEvent::Failure(err.user_message()));
        }
    }

    fn publish_reconciliation_of<T>(&self, report: &ActionReport<T>) {
        if let Some(result) = &report.reconciliation {
            self.publish_reconciliation(result);
        }
    }

    fn publish_reconciliation(&self, result: &Result<Arc<Snapshot>, ReconcileError>) {
        match result {
            Ok(snapshot) => self.publish(ClientEvent::StoreReconciled {
                generation: snapshot.generation,
            }),
            Err(err) => self.publish(ClientEvent::Failure(err.user_message())),
        }
    }

    fn status(&self, message: &str) {
        self.publish(ClientEvent::Status(message.to_string()));
    }

    fn publish(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
#[path = "tests/mock_backend.rs"]
mod mock_backend;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
