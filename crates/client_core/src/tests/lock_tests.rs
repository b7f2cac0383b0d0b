use super::*;

#[test]
fn second_acquire_for_same_lead_is_rejected() {
    let lock = ActionLock::new();
    let lead = LeadId::from("L1");
    let _guard = lock.try_acquire(&lead, ActionKind::Call).expect("first acquire");

    let err = lock
        .try_acquire(&lead, ActionKind::Meeting)
        .expect_err("second acquire must fail");
    match err {
        ClientError::Busy { lead_id, active } => {
            assert_eq!(lead_id, lead);
            assert_eq!(active, ActionKind::Call);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn different_leads_lock_independently() {
    let lock = ActionLock::new();
    let _a = lock
        .try_acquire(&LeadId::from("L1"), ActionKind::Call)
        .expect("L1");
    let _b = lock
        .try_acquire(&LeadId::from("L2"), ActionKind::Meeting)
        .expect("L2");
    assert_eq!(
        lock.locked_leads(),
        vec![LeadId::from("L1"), LeadId::from("L2")]
    );
}

#[test]
fn dropping_guard_releases_lead() {
    let lock = ActionLock::new();
    let lead = LeadId::from("L1");
    {
        let guard = lock.try_acquire(&lead, ActionKind::Meeting).expect("acquire");
        assert_eq!(guard.kind(), ActionKind::Meeting);
        assert_eq!(lock.holder(&lead), Some(ActionKind::Meeting));
    }
    assert!(!lock.is_locked(&lead));
    lock.try_acquire(&lead, ActionKind::Call)
        .expect("lead is free again");
}

#[tokio::test]
async fn cancelled_future_releases_lead() {
    let lock = ActionLock::new();
    let lead = LeadId::from("L1");
    let task = {
        let lock = lock.clone();
        let lead = lead.clone();
        tokio::spawn(async move {
            let _guard = lock.try_acquire(&lead, ActionKind::Call).expect("acquire");
            std::future::pending::<()>().await;
        })
    };

    while !lock.is_locked(&lead) {
        tokio::task::yield_now().await;
    }
    task.abort();
    let _ = task.await;

    assert!(!lock.is_locked(&lead));
}
