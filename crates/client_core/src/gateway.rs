//! Typed access to the outreach backend. One method per capability, one
//! request/response round trip per call, no state.

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::{
    domain::{CampaignAction, CampaignId},
    error::ApiError,
    protocol::{
        CalendarEvent, Campaign, CreateCampaignRequest, CreateLeadRequest, CreateMeetingRequest,
        CreateScriptRequest, CreatedRecord, Lead, PlaceCallRequest, Script,
    },
};
use tracing::debug;
use url::Url;

use crate::error::RequestFailure;

#[async_trait]
pub trait RemoteGateway: Send + Sync {
    async fn list_leads(&self) -> Result<Vec<Lead>, RequestFailure>;
    async fn list_scripts(&self) -> Result<Vec<Script>, RequestFailure>;
    async fn list_campaigns(&self) -> Result<Vec<Campaign>, RequestFailure>;
    async fn create_lead(&self, request: &CreateLeadRequest) -> Result<Lead, RequestFailure>;
    async fn create_script(
        &self,
        request: &CreateScriptRequest,
    ) -> Result<CreatedRecord, RequestFailure>;
    async fn create_campaign(
        &self,
        request: &CreateCampaignRequest,
    ) -> Result<CreatedRecord, RequestFailure>;
    async fn start_campaign(&self, campaign_id: &CampaignId) -> Result<(), RequestFailure>;
    async fn pause_campaign(&self, campaign_id: &CampaignId) -> Result<(), RequestFailure>;
    /// Only confirms the call was initiated; the body is passed through as-is.
    async fn place_call(&self, request: &PlaceCallRequest) -> Result<Value, RequestFailure>;
    async fn create_meeting(
        &self,
        request: &CreateMeetingRequest,
    ) -> Result<CalendarEvent, RequestFailure>;
}

pub struct HttpGateway {
    http: Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `{base}/api/campaigns/{id}/{action}` with the id percent-encoded as a
    /// single path segment.
    fn campaign_url(
        &self,
        campaign_id: &CampaignId,
        action: CampaignAction,
    ) -> Result<Url, RequestFailure> {
        let invalid = |reason: String| {
            RequestFailure::Network(format!("invalid backend url {}: {reason}", self.base_url))
        };
        let mut url = Url::parse(&self.base_url).map_err(|err| invalid(err.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid("cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(["api", "campaigns", campaign_id.as_str(), action.as_str()]);
        Ok(url)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, RequestFailure> {
        let response = self.dispatch(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|err| RequestFailure::Decode(err.to_string()))
    }

    async fn dispatch(
        &self,
        request: RequestBuilder,
    ) -> Result<reqwest::Response, RequestFailure> {
        let response = request
            .send()
            .await
            .map_err(|err| RequestFailure::Network(err.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ApiError>(&body)
            .ok()
            .and_then(|err| err.detail_message());
        debug!(status = status.as_u16(), ?detail, "gateway: non-success response");
        Err(RequestFailure::Status {
            status: status.as_u16(),
            detail,
        })
    }
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn list_leads(&self) -> Result<Vec<Lead>, RequestFailure> {
        self.fetch(self.http.get(format!("{}/api/leads", self.base_url)))
            .await
    }

    async fn list_scripts(&self) -> Result<Vec<Script>, RequestFailure> {
        self.fetch(self.http.get(format!("{}/api/scripts", self.base_url)))
            .await
    }

    async fn list_campaigns(&self) -> Result<Vec<Campaign>, RequestFailure> {
        self.fetch(self.http.get(format!("{}/api/campaigns", self.base_url)))
            .await
    }

    async fn create_lead(&self, request: &CreateLeadRequest) -> Result<Lead, RequestFailure> {
        self.fetch(
            self.http
                .post(format!("{}/api/leads", self.base_url))
                .json(request),
        )
        .await
    }

    async fn create_script(
        &self,
        request: &CreateScriptRequest,
    ) -> Result<CreatedRecord, RequestFailure> {
        self.fetch(
            self.http
                .post(format!("{}/api/scripts", self.base_url))
                .json(request),
        )
        .await
    }

    async fn create_campaign(
        &self,
        request: &CreateCampaignRequest,
    ) -> Result<CreatedRecord, RequestFailure> {
        self.fetch(
            self.http
                .post(format!("{}/api/campaigns", self.base_url))
                .json(request),
        )
        .await
    }

    async fn start_campaign(&self, campaign_id: &CampaignId) -> Result<(), RequestFailure> {
        let url = self.campaign_url(campaign_id, CampaignAction::Start)?;
        self.dispatch(self.http.post(url)).await?;
        Ok(())
    }

    async fn pause_campaign(&self, campaign_id: &CampaignId) -> Result<(), RequestFailure> {
        let url = self.campaign_url(campaign_id, CampaignAction::Pause)?;
        self.dispatch(self.http.post(url)).await?;
        Ok(())
    }

    async fn place_call(&self, request: &PlaceCallRequest) -> Result<Value, RequestFailure> {
        let response = self
            .dispatch(
                self.http
                    .post(format!("{}/api/calls/place", self.base_url))
                    .json(request),
            )
            .await?;
        // An accepted call with an empty or non-JSON body is still accepted.
        Ok(response.json::<Value>().await.unwrap_or(Value::Null))
    }

    async fn create_meeting(
        &self,
        request: &CreateMeetingRequest,
    ) -> Result<CalendarEvent, RequestFailure> {
        self.fetch(
            self.http
                .post(format!("{}/api/meetings/google", self.base_url))
                .json(request),
        )
        .await
    }
}

/// Bounds an outstanding backend request. `None` waits indefinitely.
pub(crate) async fn within_deadline<T, F>(
    deadline: Option<Duration>,
    request: F,
) -> Result<T, RequestFailure>
where
    F: Future<Output = Result<T, RequestFailure>>,
{
    match deadline {
        Some(after) => tokio::time::timeout(after, request)
            .await
            .unwrap_or(Err(RequestFailure::Timeout(after))),
        None => request.await,
    }
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
