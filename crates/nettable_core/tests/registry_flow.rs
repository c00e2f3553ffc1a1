use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use nettable_core::{
    ConversationError, Event, Field, FsmState, InMemoryTableStore, Outcome, RowId,
    SessionRegistry, TableStore, UserId,
};

const TIMEOUT_SECS: i64 = 600;

fn setup() -> (Arc<InMemoryTableStore>, Arc<SessionRegistry>) {
    let store = Arc::new(InMemoryTableStore::new());
    let registry = Arc::new(SessionRegistry::new(
        store.clone(),
        Duration::seconds(TIMEOUT_SECS),
    ));
    (store, registry)
}

async fn answer(registry: &SessionRegistry, user: &UserId, text: &str) {
    let result = registry
        .advance(user, Event::FieldInput(text.to_string()))
        .await;
    assert!(result.error.is_none(), "answer {:?} rejected: {}", text, result.message);
}

async fn fill_all(registry: &SessionRegistry, user: &UserId, ssid: &str) {
    registry.advance(user, Event::Start).await;
    answer(registry, user, ssid).await;
    answer(registry, user, "192.168.1.10").await;
    answer(registry, user, "192.168.1.1").await;
    answer(registry, user, "no").await;
    answer(registry, user, "second floor").await;
}

#[tokio::test]
async fn confirm_commits_exactly_one_row() {
    let (store, registry) = setup();
    let user = UserId::from("1001");

    fill_all(&registry, &user, "HomeWifi").await;
    assert_eq!(registry.get_or_create(&user).await.state(), FsmState::Confirming);
    assert!(store.is_empty().await);

    let result = registry.advance(&user, Event::Confirm).await;

    assert_eq!(result.outcome, Outcome::Committed);
    assert_eq!(result.state, FsmState::Idle);
    let row = result.committed_row.expect("row should be returned on commit");
    assert_eq!(row.id, RowId(1));
    assert_eq!(row.value(Field::Ssid), Some("HomeWifi"));
    assert_eq!(row.value(Field::Address), Some("192.168.1.10"));
    assert_eq!(row.user_id, user);

    let rows = store.read_all().await.unwrap();
    assert_eq!(rows, vec![row]);
}

#[tokio::test]
async fn empty_ssid_is_rejected_without_touching_the_table() {
    let (store, registry) = setup();
    let user = UserId::from("1002");
    registry.advance(&user, Event::Start).await;

    let result = registry
        .advance(&user, Event::FieldInput(String::new()))
        .await;

    assert_eq!(result.state, FsmState::AwaitingField(Field::Ssid));
    assert_eq!(result.outcome, Outcome::Rejected);
    assert!(matches!(result.error, Some(ConversationError::Validation { .. })));
    assert!(!result.message.is_empty());
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn cancel_from_any_filling_state_keeps_the_table_unchanged() {
    let (store, registry) = setup();
    let user = UserId::from("1003");
    let answers = ["Office", "10.0.0.5", "10.0.0.1", "yes", "closet"];

    // Cancel after 0..=5 answers covers every AwaitingField state and Confirming.
    for answered in 0..=answers.len() {
        registry.advance(&user, Event::Start).await;
        for text in &answers[..answered] {
            answer(&registry, &user, text).await;
        }

        let result = registry.advance(&user, Event::Cancel).await;
        assert_eq!(result.outcome, Outcome::Cancelled);
        assert_eq!(result.state, FsmState::Idle);
        assert!(registry.get_or_create(&user).await.draft().is_none());
    }

    assert!(store.is_empty().await);
}

#[tokio::test]
async fn editing_a_field_before_confirming_changes_only_that_field() {
    let (store, registry) = setup();
    let user = UserId::from("1004");
    fill_all(&registry, &user, "HomeWifi").await;

    let result = registry
        .advance(&user, Event::Edit(Field::Password.index()))
        .await;
    assert_eq!(result.state, FsmState::AwaitingField(Field::Password));

    let result = registry
        .advance(&user, Event::FieldInput("Yes".to_string()))
        .await;
    assert_eq!(result.state, FsmState::Confirming);

    let row = registry
        .advance(&user, Event::Confirm)
        .await
        .committed_row
        .unwrap();
    assert_eq!(row.value(Field::Password), Some("yes"));
    assert_eq!(row.value(Field::Ssid), Some("HomeWifi"));
    assert_eq!(row.value(Field::Address), Some("192.168.1.10"));
    assert_eq!(row.value(Field::Gateway), Some("192.168.1.1"));
    assert_eq!(row.value(Field::Note), Some("second floor"));
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn skipped_fields_are_stored_as_absent() {
    let (_, registry) = setup();
    let user = UserId::from("1005");

    registry.advance(&user, Event::Start).await;
    answer(&registry, &user, "Guest").await;
    answer(&registry, &user, "172.16.0.9").await;
    registry.advance(&user, Event::Skip).await;
    answer(&registry, &user, "no").await;
    registry.advance(&user, Event::Skip).await;

    let row = registry
        .advance(&user, Event::Confirm)
        .await
        .committed_row
        .unwrap();
    assert_eq!(row.value(Field::Gateway), Some(nettable_core::ABSENT));
    assert_eq!(row.value(Field::Note), Some(nettable_core::ABSENT));
}

#[tokio::test]
async fn storage_failure_keeps_the_draft_for_a_retry() {
    let (store, registry) = setup();
    let user = UserId::from("1006");
    fill_all(&registry, &user, "HomeWifi").await;

    store.set_available(false);
    let result = registry.advance(&user, Event::Confirm).await;

    assert_eq!(result.state, FsmState::Confirming);
    assert!(result.committed_row.is_none());
    let error = result.error.expect("storage failure should be reported");
    assert!(matches!(error, ConversationError::StorageFailure { .. }));
    assert!(error.is_retryable());
    let session = registry.get_or_create(&user).await;
    assert_eq!(session.draft().unwrap().value(Field::Ssid), Some("HomeWifi"));

    store.set_available(true);
    let result = registry.advance(&user, Event::Confirm).await;
    assert_eq!(result.outcome, Outcome::Committed);
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn timeout_mid_fill_discards_the_draft() {
    let (store, registry) = setup();
    let user = UserId::from("1007");
    let bystander = UserId::from("1008");

    registry.advance(&user, Event::Start).await;
    answer(&registry, &user, "HomeWifi").await;
    registry.get_or_create(&bystander).await;

    let expired = registry
        .sweep_expired(Utc::now() + Duration::seconds(TIMEOUT_SECS + 1))
        .await;

    assert_eq!(expired, vec![user.clone()]);
    let session = registry.get_or_create(&user).await;
    assert_eq!(session.state(), FsmState::Idle);
    assert!(session.draft().is_none());
    assert!(store.is_empty().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_answers_from_one_user_are_serialized() {
    let (_, registry) = setup();
    let user = UserId::from("2001");
    registry.advance(&user, Event::Start).await;

    // Each of these is a valid SSID, address and gateway, but not a valid
    // password answer, so exactly three of them can be accepted.
    let inputs: Vec<String> = (1..=5).map(|i| format!("10.0.0.{}", i)).collect();

    let tasks: Vec<_> = inputs
        .iter()
        .cloned()
        .map(|input| {
            let registry = registry.clone();
            let user = user.clone();
            tokio::spawn(async move { registry.advance(&user, Event::FieldInput(input)).await })
        })
        .collect();

    let results: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let accepted: HashSet<FsmState> = results
        .iter()
        .filter(|result| result.outcome == Outcome::Advanced)
        .map(|result| result.state)
        .collect();
    let rejected = results
        .iter()
        .filter(|result| result.outcome == Outcome::Rejected)
        .count();

    // Three accepted answers each moved the cursor to a different field.
    assert_eq!(
        accepted,
        HashSet::from([
            FsmState::AwaitingField(Field::Address),
            FsmState::AwaitingField(Field::Gateway),
            FsmState::AwaitingField(Field::Password),
        ])
    );
    assert_eq!(rejected, 2);

    let session = registry.get_or_create(&user).await;
    assert_eq!(session.state(), FsmState::AwaitingField(Field::Password));
    let draft = session.draft().unwrap();
    let stored: HashSet<&str> = [Field::Ssid, Field::Address, Field::Gateway]
        .iter()
        .filter_map(|field| draft.value(*field))
        .collect();
    assert_eq!(stored.len(), 3);
    assert!(stored.iter().all(|value| inputs.iter().any(|input| input == value)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_commits_from_many_users_get_contiguous_ids() {
    let (store, registry) = setup();
    let users = 32;

    let tasks: Vec<_> = (0..users)
        .map(|i| {
            let registry = registry.clone();
            tokio::spawn(async move {
                let user = UserId::new(format!("user-{}", i));
                fill_all(&registry, &user, &format!("Net{}", i)).await;
                registry.advance(&user, Event::Confirm).await
            })
        })
        .collect();

    let mut ids: Vec<i64> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().committed_row.unwrap().id.0)
        .collect();
    ids.sort_unstable();

    assert_eq!(ids, (1..=users as i64).collect::<Vec<_>>());
    assert_eq!(store.len().await, users);
}
