use serde_json::json;
use shared::protocol::{ConferenceData, ConferenceEntryPoint};

use super::*;
use crate::{
    gateway::HttpGateway,
    mock_backend::{lead_json, MockBackend},
};

fn ist() -> MeetingZone {
    MeetingZone::parse("+05:30").expect("offset")
}

struct Fixture {
    backend: MockBackend,
    store: Arc<EntityStore>,
    lock: ActionLock,
    scheduler: Arc<MeetingScheduler>,
}

async fn fixture() -> Fixture {
    let backend = MockBackend::spawn().await;
    backend.state.seed_lead(lead_json("L1", "A Singh", "interested"));
    let gateway: Arc<dyn RemoteGateway> = Arc::new(HttpGateway::new(backend.base_url.clone()));
    let store = Arc::new(EntityStore::new(Arc::clone(&gateway)));
    let lock = ActionLock::new();
    let scheduler = Arc::new(MeetingScheduler::new(
        gateway,
        Arc::clone(&store),
        lock.clone(),
        ist(),
        None,
        MeetingDraft::default(),
        8,
    ));
    Fixture {
        backend,
        store,
        lock,
        scheduler,
    }
}

fn lead() -> LeadId {
    LeadId::from("L1")
}

async fn open_with_time(scheduler: &MeetingScheduler, time: &str) {
    scheduler.open_draft(&lead()).await;
    scheduler
        .update_draft(&lead(), |draft| draft.meeting_time = time.to_string())
        .await
        .expect("update");
}

#[test]
fn zone_parsing() {
    let parsed = |raw| match MeetingZone::parse(raw) {
        Some(MeetingZone::Fixed(offset)) => Some(offset.local_minus_utc()),
        _ => None,
    };
    assert_eq!(parsed("+05:30"), Some(19_800));
    assert_eq!(parsed("-0400"), Some(-14_400));
    assert_eq!(parsed("+9"), Some(32_400));
    assert_eq!(parsed("UTC"), Some(0));
    assert_eq!(parsed("z"), Some(0));
    assert_eq!(parsed("Asia/Kolkata"), None);
    assert_eq!(parsed("+25:00"), None);
    assert_eq!(parsed("+1é2"), None);
    assert_eq!(parsed("-é"), None);
    assert_eq!(parsed(""), None);
}

#[test]
fn draft_converts_local_time_to_utc_instant() {
    let draft = MeetingDraft {
        meeting_time: "2024-05-01T09:30".to_string(),
        ..Default::default()
    };
    let request = draft.to_request(&lead(), &ist()).expect("request");
    assert_eq!(request.meeting_time.to_rfc3339(), "2024-05-01T04:00:00+00:00");
    assert_eq!(request.duration_minutes, 30);

    let body = serde_json::to_value(&request).expect("json");
    assert_eq!(body["meeting_time"], "2024-05-01T04:00:00.000Z");
    assert_eq!(body["lead_id"], "L1");
}

#[test]
fn draft_validation() {
    let err = MeetingDraft::default()
        .to_request(&lead(), &ist())
        .expect_err("no time");
    assert_eq!(err.user_message(), "Please select a date and time");

    let err = MeetingDraft {
        meeting_time: "next tuesday".to_string(),
        ..Default::default()
    }
    .to_request(&lead(), &ist())
    .expect_err("bad time");
    assert_eq!(err.user_message(), "Invalid date and time: next tuesday");

    let short = MeetingDraft {
        meeting_time: "2024-05-01 09:30".to_string(),
        duration_minutes: 10,
        ..Default::default()
    };
    let err = short.to_request(&lead(), &ist()).expect_err("too short");
    assert_eq!(err.user_message(), "Meeting must last at least 15 minutes");

    let unset = MeetingDraft {
        duration_minutes: 0,
        ..short
    };
    let request = unset.to_request(&lead(), &ist()).expect("defaulted");
    assert_eq!(request.duration_minutes, DEFAULT_MEETING_MINUTES);
}

#[test]
fn join_link_priority() {
    let entry = |uri: &str| ConferenceData {
        entry_points: vec![ConferenceEntryPoint {
            uri: Some(uri.to_string()),
            entry_point_type: Some("video".to_string()),
        }],
    };
    let full = CalendarEvent {
        id: Some("evt-1".to_string()),
        hangout_link: Some("https://meet.google.com/a".to_string()),
        conference_data: Some(entry("https://meet.google.com/b")),
        html_link: Some("https://calendar.google.com/c".to_string()),
    };
    assert_eq!(
        extract_join_link(&full).as_deref(),
        Some("https://meet.google.com/a")
    );

    let no_hangout = CalendarEvent {
        hangout_link: Some(String::new()),
        ..full.clone()
    };
    assert_eq!(
        extract_join_link(&no_hangout).as_deref(),
        Some("https://meet.google.com/b")
    );

    let html_only = CalendarEvent {
        hangout_link: None,
        conference_data: Some(ConferenceData::default()),
        ..full.clone()
    };
    assert_eq!(
        extract_join_link(&html_only).as_deref(),
        Some("https://calendar.google.com/c")
    );

    assert_eq!(extract_join_link(&CalendarEvent::default()), None);
}

#[tokio::test]
async fn reopening_a_draft_clears_only_the_start_time() {
    let fx = fixture().await;
    open_with_time(&fx.scheduler, "2024-05-01T09:30").await;
    fx.scheduler
        .update_draft(&lead(), |draft| draft.senior_name = "Priya".to_string())
        .await
        .expect("update");

    let reopened = fx.scheduler.open_draft(&lead()).await;
    assert!(reopened.meeting_time.is_empty());
    assert_eq!(reopened.senior_name, "Priya");

    assert!(fx.scheduler.cancel_draft(&lead()).await);
    assert!(!fx.scheduler.cancel_draft(&lead()).await);
    let err = fx
        .scheduler
        .update_draft(&lead(), |_| {})
        .await
        .expect_err("closed");
    assert_eq!(err.user_message(), "No meeting draft open for lead L1");
}

#[tokio::test]
async fn missing_start_time_sends_nothing_and_keeps_draft() {
    let fx = fixture().await;
    fx.scheduler.open_draft(&lead()).await;

    let report = fx.scheduler.schedule_meeting(&lead()).await;
    assert!(report.is_rejected());
    assert_eq!(
        report.outcome.expect_err("validation").user_message(),
        "Please select a date and time"
    );
    assert!(fx.backend.state.requests().is_empty());
    let state = fx.scheduler.draft(&lead()).await.expect("still open");
    assert_eq!(state.phase, MeetingPhase::Draft);
    assert!(!fx.lock.is_locked(&lead()));
}

#[tokio::test]
async fn success_records_outcome_and_closes_draft() {
    let fx = fixture().await;
    open_with_time(&fx.scheduler, "2024-05-01T09:30").await;

    let report = fx.scheduler.schedule_meeting(&lead()).await;
    let scheduled = report.outcome.as_ref().expect("scheduled");
    assert_eq!(
        scheduled.join_link.as_deref(),
        Some("https://meet.google.com/abc-defg-hij")
    );
    assert_eq!(scheduled.event_id.as_deref(), Some("evt-1"));
    assert_eq!(report.snapshot().map(|snapshot| snapshot.generation), Some(1));

    let body = fx
        .backend
        .state
        .last_body("POST /api/meetings/google")
        .expect("body");
    assert_eq!(body["meeting_time"], "2024-05-01T04:00:00.000Z");
    assert_eq!(body["senior_name"], "Senior Advisor");
    assert_eq!(body["duration_minutes"], 30);

    assert!(fx.scheduler.draft(&lead()).await.is_none());
    assert!(!fx.lock.is_locked(&lead()));
    let outcome = fx.scheduler.outcome(&lead()).await.expect("cached");
    assert_eq!(outcome.event_id.as_deref(), Some("evt-1"));
}

#[tokio::test]
async fn backend_meeting_record_supersedes_cached_outcome() {
    let fx = fixture().await;
    open_with_time(&fx.scheduler, "2024-05-01T09:30").await;
    let report = fx.scheduler.schedule_meeting(&lead()).await;
    assert!(report.outcome.is_ok());
    assert!(fx.scheduler.outcome(&lead()).await.is_some());

    fx.backend.state.set_lead_field(
        "L1",
        "meeting",
        json!({ "join_link": "https://meet.google.com/abc-defg-hij", "event_id": "evt-1" }),
    );
    fx.store.reconcile().await.expect("reconcile");
    assert!(fx.scheduler.outcome(&lead()).await.is_none());
}

#[tokio::test]
async fn conference_entry_point_used_without_hangout_link() {
    let fx = fixture().await;
    fx.backend.state.set_meeting_event(json!({
        "id": "evt-2",
        "conferenceData": { "entryPoints": [{ "entryPointType": "video", "uri": "https://zoom.example/j/1" }] },
        "htmlLink": "https://calendar.google.com/event?eid=evt-2",
    }));
    open_with_time(&fx.scheduler, "2024-05-01T09:30").await;

    let report = fx.scheduler.schedule_meeting(&lead()).await;
    assert_eq!(
        report.outcome.expect("scheduled").join_link.as_deref(),
        Some("https://zoom.example/j/1")
    );
}

#[tokio::test]
async fn failure_keeps_draft_open_with_message() {
    let fx = fixture().await;
    fx.backend
        .state
        .fail("POST /api/meetings/google", 500, Some("Calendar quota exceeded"));
    open_with_time(&fx.scheduler, "2024-05-01T09:30").await;

    let report = fx.scheduler.schedule_meeting(&lead()).await;
    assert_eq!(
        report.outcome.as_ref().expect_err("failed").user_message(),
        "Calendar quota exceeded"
    );
    assert!(report.reconciliation.is_some());

    let state = fx.scheduler.draft(&lead()).await.expect("still open");
    assert_eq!(
        state.phase,
        MeetingPhase::Failed("Calendar quota exceeded".to_string())
    );
    assert_eq!(state.draft.meeting_time, "2024-05-01T09:30");
    assert!(fx.scheduler.outcome(&lead()).await.is_none());
    assert!(!fx.lock.is_locked(&lead()));
}

#[tokio::test]
async fn submitting_lead_rejects_meeting_and_call() {
    let fx = fixture().await;
    let gate = fx.backend.state.hold("POST /api/meetings/google");
    open_with_time(&fx.scheduler, "2024-05-01T09:30").await;

    let first = tokio::spawn({
        let scheduler = Arc::clone(&fx.scheduler);
        async move { scheduler.schedule_meeting(&lead()).await }
    });
    fx.backend.wait_for("POST /api/meetings/google", 1).await;
    assert_eq!(
        fx.scheduler.draft(&lead()).await.map(|state| state.phase),
        Some(MeetingPhase::Submitting)
    );

    let second = fx.scheduler.schedule_meeting(&lead()).await;
    assert!(second.outcome.expect_err("busy").is_busy());
    match fx.lock.try_acquire(&lead(), ActionKind::Call) {
        Err(ClientError::Busy { active, .. }) => assert_eq!(active, ActionKind::Meeting),
        other => panic!("unexpected lock result: {other:?}"),
    }
    assert_eq!(fx.backend.state.count("POST /api/meetings/google"), 1);

    gate.notify_one();
    assert!(first.await.expect("join").outcome.is_ok());
    assert!(!fx.lock.is_locked(&lead()));
}

#[tokio::test]
async fn draft_is_frozen_while_submitting() {
    let fx = fixture().await;
    fx.backend
        .state
        .fail("POST /api/meetings/google", 500, Some("Calendar quota exceeded"));
    let gate = fx.backend.state.hold("POST /api/meetings/google");
    open_with_time(&fx.scheduler, "2024-05-01T09:30").await;

    let submit = tokio::spawn({
        let scheduler = Arc::clone(&fx.scheduler);
        async move { scheduler.schedule_meeting(&lead()).await }
    });
    fx.backend.wait_for("POST /api/meetings/google", 1).await;

    let reopened = fx.scheduler.open_draft(&lead()).await;
    assert_eq!(reopened.meeting_time, "2024-05-01T09:30");
    let edit = fx
        .scheduler
        .update_draft(&lead(), |draft| draft.meeting_time.clear())
        .await;
    assert!(matches!(edit, Err(ClientError::Validation(_))));
    assert_eq!(
        fx.scheduler.draft(&lead()).await.map(|state| state.phase),
        Some(MeetingPhase::Submitting)
    );

    gate.notify_one();
    assert!(submit.await.expect("join").outcome.is_err());
    let state = fx.scheduler.draft(&lead()).await.expect("still open");
    assert_eq!(state.draft.meeting_time, "2024-05-01T09:30");
    assert!(matches!(state.phase, MeetingPhase::Failed(_)));
}
