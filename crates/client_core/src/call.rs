use std::{sync::Arc, time::Duration};

use serde_json::Value;
use shared::{
    domain::{LeadId, ScriptId},
    protocol::{PlaceCallRequest, Script},
};
use tracing::{info, warn};

use crate::{
    error::{ClientError, Operation},
    gateway::{within_deadline, RemoteGateway},
    lock::{ActionKind, ActionLock},
    store::EntityStore,
    ActionReport,
};

/// Picks the script attached to an outgoing call.
pub trait ScriptSelector: Send + Sync {
    fn select(&self, scripts: &[Script]) -> Option<ScriptId>;
}

/// First script in the current snapshot; none if there are no scripts.
pub struct FirstScript;

impl ScriptSelector for FirstScript {
    fn select(&self, scripts: &[Script]) -> Option<ScriptId> {
        scripts.first().map(|script| script.id.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallInitiated {
    pub lead_id: LeadId,
    pub script_id: Option<ScriptId>,
    /// Whatever the backend returned on acceptance.
    pub response: Value,
}

pub struct CallPlacementController {
    gateway: Arc<dyn RemoteGateway>,
    store: Arc<EntityStore>,
    lock: ActionLock,
    selector: Arc<dyn ScriptSelector>,
    deadline: Option<Duration>,
}

impl CallPlacementController {
    pub fn new(
        gateway: Arc<dyn RemoteGateway>,
        store: Arc<EntityStore>,
        lock: ActionLock,
        deadline: Option<Duration>,
    ) -> Self {
        Self::with_selector(gateway, store, lock, Arc::new(FirstScript), deadline)
    }

    pub fn with_selector(
        gateway: Arc<dyn RemoteGateway>,
        store: Arc<EntityStore>,
        lock: ActionLock,
        selector: Arc<dyn ScriptSelector>,
        deadline: Option<Duration>,
    ) -> Self {
        Self {
            gateway,
            store,
            lock,
            selector,
            deadline,
        }
    }

    /// Requests an outbound call for `lead_id`. Acceptance is terminal success:
    /// the call result only shows up later as the lead's status.
    pub async fn place_call(&self, lead_id: &LeadId) -> ActionReport<CallInitiated> {
        let guard = match self.lock.try_acquire(lead_id, ActionKind::Call) {
            Ok(guard) => guard,
            Err(err) => return ActionReport::rejected(err),
        };

        let script_id = self.selector.select(&self.store.snapshot().await.scripts);
        let request = PlaceCallRequest {
            lead_id: lead_id.clone(),
            script_id: script_id.clone(),
        };
        info!(lead_id = %lead_id, script_id = ?script_id, "call: placing");

        let outcome = within_deadline(self.deadline, self.gateway.place_call(&request))
            .await
            .map(|response| CallInitiated {
                lead_id: lead_id.clone(),
                script_id,
                response,
            })
            .map_err(|failure| ClientError::request(Operation::PlaceCall, failure));

        match &outcome {
            Ok(_) => info!(lead_id = %lead_id, "call: initiated"),
            Err(err) => warn!(lead_id = %lead_id, error = %err, "call: request failed"),
        }

        drop(guard);
        let reconciliation = self.store.reconcile().await;
        ActionReport::completed(outcome, reconciliation)
    }
}

#[cfg(test)]
#[path = "tests/call_tests.rs"]
mod tests;
