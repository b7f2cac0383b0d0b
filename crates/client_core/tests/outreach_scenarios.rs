use std::{sync::Arc, time::Duration};

use client_core::{ActionKind, ClientError, ClientSettings, NewLead, OutreachClient};
use shared::domain::{CampaignId, LeadId, LeadStatus};

#[path = "../src/tests/mock_backend.rs"]
mod mock_backend;

use mock_backend::{campaign_json, lead_json, MockBackend};

fn client_for(backend: &MockBackend, timeout_seconds: u64) -> Arc<OutreachClient> {
    OutreachClient::new(ClientSettings {
        backend_url: backend.base_url.clone(),
        action_timeout_seconds: timeout_seconds,
        meeting_timezone: Some("UTC".to_string()),
        ..Default::default()
    })
    .expect("client")
}

#[tokio::test]
async fn created_lead_is_listed_with_backend_owned_status() {
    let backend = MockBackend::spawn().await;
    let client = client_for(&backend, 30);

    let report = client
        .create_lead(&NewLead {
            full_name: "A Singh".to_string(),
            phone: "+14155550100".to_string(),
            nri: true,
            ..Default::default()
        })
        .await;
    assert_eq!(report.outcome.expect("created").id, LeadId::from("L1"));
    assert_eq!(backend.state.count("POST /api/leads"), 1);
    assert_eq!(backend.state.count("GET /api/leads"), 1);

    backend
        .state
        .set_lead_field("L1", "status", "contacted".into());
    let snapshot = client.refresh().await.expect("refresh");
    assert_eq!(
        snapshot.lead(&LeadId::from("L1")).map(|lead| lead.status.clone()),
        Some(LeadStatus::Contacted)
    );
}

#[tokio::test]
async fn overlapping_call_is_rejected_with_no_extra_requests() {
    let backend = MockBackend::spawn().await;
    backend.state.seed_lead(lead_json("L1", "A Singh", "new"));
    backend.state.seed_lead(lead_json("L2", "B Rao", "new"));
    let gate = backend.state.hold("POST /api/calls/place");
    let client = client_for(&backend, 30);

    let first = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.place_call(&LeadId::from("L1")).await }
    });
    backend.wait_for("POST /api/calls/place", 1).await;
    assert!(client.is_busy(&LeadId::from("L1")));
    let sent = backend.state.requests().len();

    let second = client.place_call(&LeadId::from("L1")).await;
    assert!(matches!(
        second.outcome,
        Err(ClientError::Busy {
            active: ActionKind::Call,
            ..
        })
    ));
    client.open_meeting_draft(&LeadId::from("L1")).await;
    client
        .update_meeting_draft(&LeadId::from("L1"), |draft| {
            draft.meeting_time = "2024-05-01T09:30".to_string()
        })
        .await
        .expect("update");
    let meeting = client.schedule_meeting(&LeadId::from("L1")).await;
    assert!(meeting.outcome.expect_err("busy").is_busy());
    assert_eq!(backend.state.requests().len(), sent);

    // Other leads are unaffected by L1's lock.
    assert!(!client.is_busy(&LeadId::from("L2")));

    gate.notify_one();
    let first = first.await.expect("join");
    assert!(first.outcome.is_ok());
    assert!(!client.is_busy(&LeadId::from("L1")));
}

#[tokio::test]
async fn meeting_without_start_time_sends_nothing() {
    let backend = MockBackend::spawn().await;
    let client = client_for(&backend, 30);
    let lead_id = LeadId::from("L1");
    client.open_meeting_draft(&lead_id).await;

    let report = client.schedule_meeting(&lead_id).await;
    assert!(matches!(report.outcome, Err(ClientError::Validation(_))));
    assert!(backend.state.requests().is_empty());
    assert!(client.meeting_draft(&lead_id).await.is_some());
}

#[tokio::test]
async fn meeting_is_sent_as_absolute_instant() {
    let backend = MockBackend::spawn().await;
    backend.state.seed_lead(lead_json("L1", "A Singh", "interested"));
    let client = client_for(&backend, 30);
    let lead_id = LeadId::from("L1");
    client.open_meeting_draft(&lead_id).await;
    client
        .update_meeting_draft(&lead_id, |draft| {
            draft.meeting_time = "2024-05-01T09:30".to_string();
            draft.duration_minutes = 45;
        })
        .await
        .expect("update");

    let report = client.schedule_meeting(&lead_id).await;
    assert!(report.outcome.is_ok());
    let body = backend
        .state
        .last_body("POST /api/meetings/google")
        .expect("body");
    assert_eq!(body["meeting_time"], "2024-05-01T09:30:00.000Z");
    assert_eq!(body["duration_minutes"], 45);
    assert!(client.meeting_draft(&lead_id).await.is_none());
}

#[tokio::test]
async fn campaign_start_refetches_all_collections_regardless_of_status() {
    let backend = MockBackend::spawn().await;
    backend
        .state
        .seed_campaign(campaign_json("C1", "NRI Outreach - USA", "paused"));
    backend.state.fail("POST /api/campaigns/C1/start", 500, None);
    let client = client_for(&backend, 30);

    let report = client.start_campaign(&CampaignId::from("C1")).await;
    assert_eq!(
        report.outcome.expect_err("must fail").user_message(),
        "Failed to start campaign"
    );

    let keys = backend
        .state
        .requests()
        .iter()
        .map(|request| request.key())
        .collect::<Vec<_>>();
    assert_eq!(keys[0], "POST /api/campaigns/C1/start");
    let mut fetched = keys[1..].to_vec();
    fetched.sort();
    assert_eq!(
        fetched,
        vec!["GET /api/campaigns", "GET /api/leads", "GET /api/scripts"]
    );
}

#[tokio::test]
async fn hung_call_times_out_and_frees_the_lead() {
    let backend = MockBackend::spawn().await;
    backend.state.seed_lead(lead_json("L1", "A Singh", "new"));
    let gate = backend.state.hold("POST /api/calls/place");
    let client = client_for(&backend, 1);

    let report = tokio::time::timeout(
        Duration::from_secs(10),
        client.place_call(&LeadId::from("L1")),
    )
    .await
    .expect("bounded by action timeout");
    assert_eq!(
        report.outcome.expect_err("timed out").user_message(),
        "Failed to place call: request timed out after 1s"
    );
    assert!(!client.is_busy(&LeadId::from("L1")));
    assert_eq!(backend.state.count("GET /api/leads"), 1);
    gate.notify_one();
}

#[tokio::test]
async fn partial_reconcile_failure_changes_nothing() {
    let backend = MockBackend::spawn().await;
    backend.state.seed_lead(lead_json("L1", "A Singh", "new"));
    let client = client_for(&backend, 30);
    let before = client.refresh().await.expect("refresh");

    backend
        .state
        .set_lead_field("L1", "status", "interested".into());
    backend.state.fail("GET /api/scripts", 503, None);
    assert!(client.refresh().await.is_err());
    assert_eq!(client.snapshot().await, before);
}
