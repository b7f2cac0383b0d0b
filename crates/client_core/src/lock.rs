//! Per-lead action lock: at most one call placement or meeting creation in
//! flight for a given lead.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use shared::domain::LeadId;
use tracing::debug;

use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Call,
    Meeting,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Meeting => "meeting",
        }
    }

    pub fn progress_label(self) -> &'static str {
        match self {
            Self::Call => "calling",
            Self::Meeting => "scheduling",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type HeldActions = Arc<Mutex<HashMap<LeadId, ActionKind>>>;

#[derive(Debug, Clone, Default)]
pub struct ActionLock {
    held: HeldActions,
}

impl ActionLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `lead_id` for `kind`, or reports which action already holds it.
    /// Nothing is sent anywhere on rejection.
    pub fn try_acquire(
        &self,
        lead_id: &LeadId,
        kind: ActionKind,
    ) -> Result<ActionGuard, ClientError> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(active) = held.get(lead_id).copied() {
            debug!(lead_id = %lead_id, requested = %kind, %active, "lock: rejected busy lead");
            return Err(ClientError::Busy {
                lead_id: lead_id.clone(),
                active,
            });
        }
        held.insert(lead_id.clone(), kind);
        debug!(lead_id = %lead_id, %kind, "lock: acquired");
        Ok(ActionGuard {
            held: Arc::clone(&self.held),
            lead_id: lead_id.clone(),
            kind,
        })
    }

    pub fn holder(&self, lead_id: &LeadId) -> Option<ActionKind> {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(lead_id)
            .copied()
    }

    pub fn is_locked(&self, lead_id: &LeadId) -> bool {
        self.holder(lead_id).is_some()
    }

    pub fn locked_leads(&self) -> Vec<LeadId> {
        let mut leads = self
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        leads.sort();
        leads
    }
}

/// Releases the lead when dropped, including on early return, error, or a
/// cancelled future.
#[derive(Debug)]
pub struct ActionGuard {
    held: HeldActions,
    lead_id: LeadId,
    kind: ActionKind,
}

impl ActionGuard {
    pub fn lead_id(&self) -> &LeadId {
        &self.lead_id
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }
}

impl Drop for ActionGuard {
    fn drop(&mut self) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if held.get(&self.lead_id) == Some(&self.kind) {
            held.remove(&self.lead_id);
        }
        debug!(lead_id = %self.lead_id, kind = %self.kind, "lock: released");
    }
}

#[cfg(test)]
#[path = "tests/lock_tests.rs"]
mod tests;
