//! Meeting scheduling: per-lead draft, submission under the action lock,
//! join-link extraction and the transient outcome cache.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone, Utc};
use shared::{
    domain::LeadId,
    protocol::{CalendarEvent, CreateMeetingRequest},
};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    error::{ClientError, Operation},
    gateway::{within_deadline, RemoteGateway},
    lock::{ActionKind, ActionLock},
    outcomes::{MeetingOutcome, MeetingOutcomeCache},
    store::EntityStore,
    ActionReport,
};

pub const MIN_MEETING_MINUTES: u32 = 15;
pub const DEFAULT_MEETING_MINUTES: u32 = 30;

const LOCAL_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
];

/// Zone the operator's wall-clock input is interpreted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeetingZone {
    #[default]
    System,
    Fixed(FixedOffset),
}

impl MeetingZone {
    /// Parses `+05:30`, `-0400`, `Z` or `UTC`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
            return FixedOffset::east_opt(0).map(Self::Fixed);
        }
        let (sign, digits) = match raw.as_bytes().first()? {
            b'+' => (1, &raw[1..]),
            b'-' => (-1, &raw[1..]),
            _ => return None,
        };
        let (hours, minutes) = match digits.split_once(':') {
            Some((hours, minutes)) => (hours, minutes),
            None if digits.len() == 4 && digits.is_ascii() => digits.split_at(2),
            None => (digits, "0"),
        };
        let hours = hours.parse::<i32>().ok()?;
        let minutes = minutes.parse::<i32>().ok()?;
        if !(0..=14).contains(&hours) || !(0..60).contains(&minutes) {
            return None;
        }
        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).map(Self::Fixed)
    }

    /// Earliest instant for an ambiguous wall-clock time; `None` inside a gap.
    pub fn to_utc(&self, local: &NaiveDateTime) -> Option<DateTime<Utc>> {
        match self {
            Self::System => Local
                .from_local_datetime(local)
                .earliest()
                .map(|value| value.with_timezone(&Utc)),
            Self::Fixed(offset) => offset
                .from_local_datetime(local)
                .earliest()
                .map(|value| value.with_timezone(&Utc)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeetingDraft {
    pub senior_name: String,
    /// Wall-clock start as typed, e.g. `2024-05-01T09:30`. Empty means unset.
    pub meeting_time: String,
    pub duration_minutes: u32,
    pub title: String,
    pub description: String,
}

impl Default for MeetingDraft {
    fn default() -> Self {
        Self {
            senior_name: "Senior Advisor".to_string(),
            meeting_time: String::new(),
            duration_minutes: DEFAULT_MEETING_MINUTES,
            title: "NRI Investment Consultation".to_string(),
            description: "Discuss investment options and next steps.".to_string(),
        }
    }
}

impl MeetingDraft {
    /// Validates the draft and converts its wall-clock start to an absolute
    /// instant in `zone`.
    pub fn to_request(
        &self,
        lead_id: &LeadId,
        zone: &MeetingZone,
    ) -> Result<CreateMeetingRequest, ClientError> {
        let raw = self.meeting_time.trim();
        if raw.is_empty() {
            return Err(ClientError::validation("Please select a date and time"));
        }
        let local = LOCAL_TIME_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
            .ok_or_else(|| ClientError::validation(format!("Invalid date and time: {raw}")))?;
        let meeting_time = zone.to_utc(&local).ok_or_else(|| {
            ClientError::validation(format!("{raw} does not exist in the meeting time zone"))
        })?;

        let duration_minutes = match self.duration_minutes {
            0 => DEFAULT_MEETING_MINUTES,
            minutes => minutes,
        };
        if duration_minutes < MIN_MEETING_MINUTES {
            return Err(ClientError::validation(format!(
                "Meeting must last at least {MIN_MEETING_MINUTES} minutes"
            )));
        }

        Ok(CreateMeetingRequest {
            lead_id: lead_id.clone(),
            senior_name: self.senior_name.clone(),
            meeting_time,
            duration_minutes,
            title: self.title.clone(),
            description: self.description.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeetingPhase {
    Draft,
    Submitting,
    /// Last submission failed; the draft stays open for another try.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftState {
    pub draft: MeetingDraft,
    pub phase: MeetingPhase,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeetingScheduled {
    pub lead_id: LeadId,
    pub starts_at: DateTime<Utc>,
    pub join_link: Option<String>,
    pub event_id: Option<String>,
}

/// Join link by priority: `hangoutLink`, first conference entry point URI,
/// then `htmlLink`.
pub fn extract_join_link(event: &CalendarEvent) -> Option<String> {
    non_empty(event.hangout_link.as_deref())
        .or_else(|| {
            event
                .conference_data
                .as_ref()
                .and_then(|data| data.entry_points.first())
                .and_then(|entry| non_empty(entry.uri.as_deref()))
        })
        .or_else(|| non_empty(event.html_link.as_deref()))
}

fn no_open_draft(lead_id: &LeadId) -> ClientError {
    ClientError::validation(format!("No meeting draft open for lead {lead_id}"))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .filter(|value| !value.trim().is_empty())
        .map(str::to_string)
}

pub struct MeetingScheduler {
    gateway: Arc<dyn RemoteGateway>,
    store: Arc<EntityStore>,
    lock: ActionLock,
    zone: MeetingZone,
    deadline: Option<Duration>,
    template: MeetingDraft,
    drafts: Mutex<HashMap<LeadId, DraftState>>,
    outcomes: Mutex<MeetingOutcomeCache>,
}

impl MeetingScheduler {
    pub fn new(
        gateway: Arc<dyn RemoteGateway>,
        store: Arc<EntityStore>,
        lock: ActionLock,
        zone: MeetingZone,
        deadline: Option<Duration>,
        template: MeetingDraft,
        outcome_capacity: usize,
    ) -> Self {
        Self {
            gateway,
            store,
            lock,
            zone,
            deadline,
            template,
            drafts: Mutex::new(HashMap::new()),
            outcomes: Mutex::new(MeetingOutcomeCache::new(outcome_capacity)),
        }
    }

    /// Opens (or reopens) the draft for `lead_id`. The start time is always
    /// cleared; other fields carry over from the previous draft for the lead.
    /// A draft that is being submitted is returned untouched.
    pub async fn open_draft(&self, lead_id: &LeadId) -> MeetingDraft {
        let mut drafts = self.drafts.lock().await;
        if let Some(state) = drafts.get(lead_id) {
            if state.phase == MeetingPhase::Submitting {
                return state.draft.clone();
            }
        }
        let mut draft = drafts
            .get(lead_id)
            .map(|state| state.draft.clone())
            .unwrap_or_else(|| self.template.clone());
        draft.meeting_time.clear();
        drafts.insert(
            lead_id.clone(),
            DraftState {
                draft: draft.clone(),
                phase: MeetingPhase::Draft,
            },
        );
        draft
    }

    pub async fn update_draft<F>(
        &self,
        lead_id: &LeadId,
        edit: F,
    ) -> Result<MeetingDraft, ClientError>
    where
        F: FnOnce(&mut MeetingDraft),
    {
        let mut drafts = self.drafts.lock().await;
        let state = drafts
            .get_mut(lead_id)
            .ok_or_else(|| no_open_draft(lead_id))?;
        if state.phase == MeetingPhase::Submitting {
            return Err(ClientError::validation(format!(
                "Meeting for lead {lead_id} is being submitted"
            )));
        }
        edit(&mut state.draft);
        Ok(state.draft.clone())
    }

    pub async fn cancel_draft(&self, lead_id: &LeadId) -> bool {
        self.drafts.lock().await.remove(lead_id).is_some()
    }

    pub async fn draft(&self, lead_id: &LeadId) -> Option<DraftState> {
        self.drafts.lock().await.get(lead_id).cloned()
    }

    pub async fn open_drafts(&self) -> Vec<LeadId> {
        let mut leads = self.drafts.lock().await.keys().cloned().collect::<Vec<_>>();
        leads.sort();
        leads
    }

    /// Cached outcome for `lead_id`, pruned against the current snapshot.
    pub async fn outcome(&self, lead_id: &LeadId) -> Option<MeetingOutcome> {
        let snapshot = self.store.snapshot().await;
        let mut outcomes = self.outcomes.lock().await;
        outcomes.prune(&snapshot);
        outcomes.get(lead_id).cloned()
    }

    /// Request the open draft for `lead_id` would submit right now.
    pub async fn prepare(&self, lead_id: &LeadId) -> Result<CreateMeetingRequest, ClientError> {
        let drafts = self.drafts.lock().await;
        let state = drafts.get(lead_id).ok_or_else(|| no_open_draft(lead_id))?;
        state.draft.to_request(lead_id, &self.zone)
    }

    /// Submits the open draft for `lead_id`. Validation and busy rejections
    /// send nothing and skip reconciliation; every submitted attempt releases
    /// the lock and then reconciles.
    pub async fn schedule_meeting(&self, lead_id: &LeadId) -> ActionReport<MeetingScheduled> {
        let request = match self.prepare(lead_id).await {
            Ok(request) => request,
            Err(err) => return ActionReport::rejected(err),
        };
        let guard = match self.lock.try_acquire(lead_id, ActionKind::Meeting) {
            Ok(guard) => guard,
            Err(err) => return ActionReport::rejected(err),
        };

        self.set_phase(lead_id, MeetingPhase::Submitting).await;
        let generation = self.store.snapshot().await.generation;
        info!(
            lead_id = %lead_id,
            starts_at = %request.meeting_time,
            duration_minutes = request.duration_minutes,
            "meeting: creating calendar event"
        );

        let outcome = within_deadline(self.deadline, self.gateway.create_meeting(&request))
            .await
            .map_err(|failure| ClientError::request(Operation::CreateMeeting, failure));

        let outcome = match outcome {
            Ok(event) => {
                let scheduled = MeetingScheduled {
                    lead_id: lead_id.clone(),
                    starts_at: request.meeting_time,
                    join_link: extract_join_link(&event),
                    event_id: event.id,
                };
                self.outcomes.lock().await.record(
                    lead_id.clone(),
                    MeetingOutcome {
                        join_link: scheduled.join_link.clone(),
                        event_id: scheduled.event_id.clone(),
                    },
                    generation,
                );
                self.drafts.lock().await.remove(lead_id);
                info!(
                    lead_id = %lead_id,
                    event_id = ?scheduled.event_id,
                    has_join_link = scheduled.join_link.is_some(),
                    "meeting: created"
                );
                Ok(scheduled)
            }
            Err(err) => {
                warn!(lead_id = %lead_id, error = %err, "meeting: request failed");
                self.set_phase(lead_id, MeetingPhase::Failed(err.user_message()))
                    .await;
                Err(err)
            }
        };

        drop(guard);
        let reconciliation = self.store.reconcile().await;
        ActionReport::completed(outcome, reconciliation)
    }

    async fn set_phase(&self, lead_id: &LeadId, phase: MeetingPhase) {
        if let Some(state) = self.drafts.lock().await.get_mut(lead_id) {
            state.phase = phase;
        }
    }
}

#[cfg(test)]
#[path = "tests/meeting_tests.rs"]
mod tests;
