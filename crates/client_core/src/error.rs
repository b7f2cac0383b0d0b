use std::{fmt, time::Duration};

use shared::domain::LeadId;
use thiserror::Error;

use crate::lock::ActionKind;

/// Backend operations, used to pick the generic message when the backend
/// gives no `detail`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    LoadData,
    CreateLead,
    CreateScript,
    CreateCampaign,
    StartCampaign,
    PauseCampaign,
    PlaceCall,
    CreateMeeting,
}

impl Operation {
    pub fn generic_failure(self) -> &'static str {
        match self {
            Self::LoadData => "Failed to load data",
            Self::CreateLead => "Failed to create lead",
            Self::CreateScript => "Failed to create script",
            Self::CreateCampaign => "Failed to create campaign",
            Self::StartCampaign => "Failed to start campaign",
            Self::PauseCampaign => "Failed to pause campaign",
            Self::PlaceCall => "Failed to place call",
            Self::CreateMeeting => "Failed to create meeting",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LoadData => "load_data",
            Self::CreateLead => "create_lead",
            Self::CreateScript => "create_script",
            Self::CreateCampaign => "create_campaign",
            Self::StartCampaign => "start_campaign",
            Self::PauseCampaign => "pause_campaign",
            Self::PlaceCall => "place_call",
            Self::CreateMeeting => "create_meeting",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestFailure {
    #[error("network error: {0}")]
    Network(String),
    #[error("backend returned status {status}{}", detail_suffix(.detail))]
    Status { status: u16, detail: Option<String> },
    #[error("invalid response body: {0}")]
    Decode(String),
    #[error("request timed out after {}s", whole_seconds(.0))]
    Timeout(Duration),
}

fn whole_seconds(after: &Duration) -> u64 {
    after.as_secs()
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail
        .as_deref()
        .map(|detail| format!(": {detail}"))
        .unwrap_or_default()
}

impl RequestFailure {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} failed: {failure}")]
pub struct RequestError {
    pub operation: Operation,
    pub failure: RequestFailure,
}

impl RequestError {
    pub fn new(operation: Operation, failure: RequestFailure) -> Self {
        Self { operation, failure }
    }

    /// Message for the status line: backend `detail` verbatim when present.
    pub fn user_message(&self) -> String {
        let generic = self.operation.generic_failure();
        match &self.failure {
            RequestFailure::Status {
                detail: Some(detail),
                ..
            } => detail.clone(),
            RequestFailure::Status { detail: None, .. } | RequestFailure::Decode(_) => {
                generic.to_string()
            }
            RequestFailure::Network(err) => format!("{generic}: {err}"),
            RequestFailure::Timeout(after) => {
                format!("{generic}: request timed out after {}s", after.as_secs())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error("lead {lead_id} is busy with an outstanding {active} action")]
    Busy { lead_id: LeadId, active: ActionKind },
}

impl ClientError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn request(operation: Operation, failure: RequestFailure) -> Self {
        Self::Request(RequestError::new(operation, failure))
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Request(err) => err.user_message(),
            Self::Busy { active, .. } => {
                format!("Please wait: {} in progress", active.progress_label())
            }
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Leads,
    Scripts,
    Campaigns,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Leads => "leads",
            Self::Scripts => "scripts",
            Self::Campaigns => "campaigns",
        }
    }
}

/// Every list fetch that failed during one reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("reconciliation failed: {}", describe_failures(.failures))]
pub struct ReconcileError {
    pub failures: Vec<(Collection, RequestFailure)>,
}

fn describe_failures(failures: &[(Collection, RequestFailure)]) -> String {
    failures
        .iter()
        .map(|(collection, failure)| format!("{}: {failure}", collection.as_str()))
        .collect::<Vec<_>>()
        .join("; ")
}

impl ReconcileError {
    pub fn user_message(&self) -> String {
        Operation::LoadData.generic_failure().to_string()
    }

    pub fn failed(&self, collection: Collection) -> bool {
        self.failures.iter().any(|(failed, _)| *failed == collection)
    }
}
