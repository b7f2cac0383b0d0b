//! Operator input for the plain create endpoints, with the stock defaults the
//! console starts from.

use shared::{
    domain::InterestLevel,
    protocol::{CreateCampaignRequest, CreateLeadRequest, CreateScriptRequest},
};

use crate::error::ClientError;

pub const DEFAULT_PITCH: &str = "Hi, this is the AI assistant calling on behalf of [Your Company].
We are helping NRIs invest in high-growth real estate projects in India with projected returns of 12-18%.
Would you like to hear a quick overview and schedule a call with our senior advisor?";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLead {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub country: String,
    pub state: String,
    pub nri: bool,
    pub source: String,
    pub interest_level: InterestLevel,
    pub notes: String,
}

impl Default for NewLead {
    fn default() -> Self {
        Self {
            full_name: String::new(),
            email: String::new(),
            phone: String::new(),
            country: "USA".to_string(),
            state: String::new(),
            nri: true,
            source: "manual".to_string(),
            interest_level: InterestLevel::Medium,
            notes: String::new(),
        }
    }
}

impl NewLead {
    /// Full name and phone are required; blank optional fields are left out
    /// of the request body.
    pub fn to_request(&self) -> Result<CreateLeadRequest, ClientError> {
        let full_name = required(&self.full_name, "Full name")?;
        let phone = required(&self.phone, "Phone")?;
        Ok(CreateLeadRequest {
            full_name,
            phone,
            email: optional(&self.email),
            country: optional(&self.country),
            state: optional(&self.state),
            nri: self.nri,
            source: self.source.clone(),
            interest_level: self.interest_level,
            notes: self.notes.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewScript {
    pub title: String,
    pub content: String,
    pub language: String,
}

impl Default for NewScript {
    fn default() -> Self {
        Self {
            title: "NRI Real-Estate Pitch".to_string(),
            content: DEFAULT_PITCH.to_string(),
            language: "en-US".to_string(),
        }
    }
}

impl NewScript {
    pub fn to_request(&self) -> Result<CreateScriptRequest, ClientError> {
        Ok(CreateScriptRequest {
            title: required(&self.title, "Script title")?,
            content: self.content.clone(),
            language: self.language.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCampaign {
    pub name: String,
    pub target_states: Vec<String>,
    pub nri_only: bool,
}

impl Default for NewCampaign {
    fn default() -> Self {
        Self {
            name: "NRI Outreach - USA".to_string(),
            target_states: vec!["CA".to_string(), "NY".to_string(), "TX".to_string()],
            nri_only: true,
        }
    }
}

impl NewCampaign {
    pub fn to_request(&self) -> Result<CreateCampaignRequest, ClientError> {
        Ok(CreateCampaignRequest {
            name: required(&self.name, "Campaign name")?,
            target_states: self.target_states.clone(),
            nri_only: self.nri_only,
        })
    }
}

/// Splits comma-separated region input. Entries are trimmed and blanks
/// dropped; order, duplicates and case are kept as typed.
pub fn parse_regions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|region| !region.is_empty())
        .map(str::to_string)
        .collect()
}

fn required(value: &str, label: &str) -> Result<String, ClientError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ClientError::validation(format!("{label} is required")));
    }
    Ok(value.to_string())
}

fn optional(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}
