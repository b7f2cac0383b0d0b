use std::collections::VecDeque;

use shared::{domain::LeadId, protocol::Lead};

use crate::store::Snapshot;

/// Join link and event id returned when a meeting was created. A UI hint only:
/// the lead record from the latest snapshot is what counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeetingOutcome {
    pub join_link: Option<String>,
    pub event_id: Option<String>,
}

#[derive(Debug, Clone)]
struct Entry {
    lead_id: LeadId,
    outcome: MeetingOutcome,
    recorded_at_generation: u64,
}

/// Bounded per-lead cache of meeting outcomes, pruned against every newer
/// snapshot. Oldest entries are evicted first when full.
#[derive(Debug, Clone)]
pub struct MeetingOutcomeCache {
    capacity: usize,
    entries: VecDeque<Entry>,
}

impl MeetingOutcomeCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    pub fn record(&mut self, lead_id: LeadId, outcome: MeetingOutcome, generation: u64) {
        self.entries.retain(|entry| entry.lead_id != lead_id);
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(Entry {
            lead_id,
            outcome,
            recorded_at_generation: generation,
        });
    }

    pub fn get(&self, lead_id: &LeadId) -> Option<&MeetingOutcome> {
        self.entries
            .iter()
            .find(|entry| &entry.lead_id == lead_id)
            .map(|entry| &entry.outcome)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops entries a newer snapshot has made stale: the lead is gone, or the
    /// backend now reports its own meeting for it.
    pub fn prune(&mut self, snapshot: &Snapshot) {
        self.entries.retain(|entry| {
            if snapshot.generation <= entry.recorded_at_generation {
                return true;
            }
            snapshot
                .lead(&entry.lead_id)
                .is_some_and(|lead| !has_backend_meeting(lead))
        });
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

fn has_backend_meeting(lead: &Lead) -> bool {
    lead.meeting
        .as_ref()
        .is_some_and(|meeting| meeting.join_link.is_some() || meeting.event_id.is_some())
}
