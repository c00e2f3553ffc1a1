//! crates/nettable_core/src/registry.rs
//!
//! Owns every user's `Session` and is the only way events reach the state
//! machine. Events for one user are applied strictly one at a time, in
//! arrival order; events for different users never wait on each other except
//! inside the table store's append.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::conversation::{Event, FsmState, Outcome, Session, Step};
use crate::domain::{Row, UserId};
use crate::error::ConversationError;
use crate::ports::TableStore;

/// What the dispatcher gets back for every event.
#[derive(Debug, Clone)]
pub struct TransitionResult {
    pub state: FsmState,
    pub outcome: Outcome,
    /// Prompt or error text for the user.
    pub message: String,
    /// Present only when this event committed a row.
    pub committed_row: Option<Row>,
    pub error: Option<ConversationError>,
}

impl TransitionResult {
    fn reply(session: &Session, outcome: Outcome, message: String) -> Self {
        Self {
            state: session.state(),
            outcome,
            message,
            committed_row: None,
            error: None,
        }
    }

    fn rejected(session: &Session, error: ConversationError) -> Self {
        Self {
            state: session.state(),
            outcome: Outcome::Rejected,
            message: format!("{}\n{}", error.user_message(), session.expected_action()),
            committed_row: None,
            error: Some(error),
        }
    }
}

/// A session together with its eviction marker. A retired slot has been
/// removed from the map; whoever still holds it must look the user up again.
#[derive(Debug)]
struct SessionSlot {
    session: Session,
    retired: bool,
}

type SessionHandle = Arc<Mutex<SessionSlot>>;

pub struct SessionRegistry {
    store: Arc<dyn TableStore>,
    timeout: Duration,
    sessions: Mutex<HashMap<UserId, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn TableStore>, timeout: Duration) -> Self {
        Self {
            store,
            timeout,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn TableStore> {
        &self.store
    }

    /// Returns a snapshot of the user's session, registering an idle one first
    /// if the user has none.
    pub async fn get_or_create(&self, user_id: &UserId) -> Session {
        loop {
            let handle = self.handle_for(user_id).await;
            let slot = handle.lock().await;
            if slot.retired {
                continue;
            }
            return slot.session.clone();
        }
    }

    /// Feeds one event to the user's state machine and commits the row when
    /// the event confirms a complete draft.
    pub async fn advance(&self, user_id: &UserId, event: Event) -> TransitionResult {
        loop {
            let handle = self.handle_for(user_id).await;
            let mut slot = handle.lock().await;
            if slot.retired {
                debug!(%user_id, "Session was evicted while waiting, retrying");
                continue;
            }
            return self.step(&mut slot.session, event).await;
        }
    }

    /// Forces every session idle for longer than the timeout back to `Idle`,
    /// discarding its draft, and evicts sessions that have nothing left to do.
    /// Returns the users whose fill was abandoned.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Vec<UserId> {
        let handles: Vec<(UserId, SessionHandle)> = {
            let sessions = self.sessions.lock().await;
            sessions
                .iter()
                .map(|(user_id, handle)| (user_id.clone(), handle.clone()))
                .collect()
        };

        let mut expired = Vec::new();
        for (user_id, handle) in handles {
            // Same exclusion as `advance`, so an in-flight answer finishes first
            // and refreshes the activity timestamp before we look at it.
            let mut slot = handle.lock().await;
            if slot.retired || slot.session.is_idle() {
                continue;
            }
            if slot.session.is_expired(now, self.timeout) {
                if let Some(draft) = slot.session.expire() {
                    info!(%user_id, draft_id = %draft.id, "Session timed out, draft discarded");
                }
                expired.push(user_id);
            }
        }

        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, handle| match handle.try_lock() {
            Ok(mut slot) => {
                let stale = slot.session.is_idle() && slot.session.is_expired(now, self.timeout);
                if stale {
                    slot.retired = true;
                }
                !stale
            }
            // Busy sessions are by definition active.
            Err(_) => true,
        });
        let evicted = before - sessions.len();
        if evicted > 0 || !expired.is_empty() {
            info!(
                timed_out = expired.len(),
                evicted,
                remaining = sessions.len(),
                "Session sweep finished"
            );
        }

        expired
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.lock().await.len()
    }

    async fn handle_for(&self, user_id: &UserId) -> SessionHandle {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(user_id.clone())
            .or_insert_with(|| {
                debug!(%user_id, "Registering new session");
                Arc::new(Mutex::new(SessionSlot {
                    session: Session::new(user_id.clone(), Utc::now()),
                    retired: false,
                }))
            })
            .clone()
    }

    async fn step(&self, session: &mut Session, event: Event) -> TransitionResult {
        let now = Utc::now();
        session.touch(now);
        let event_kind = event.kind();

        match session.handle(event, now) {
            Ok(Step::Reply { outcome, message }) => {
                debug!(user_id = %session.user_id, event = event_kind, state = %session.state(), "Event applied");
                TransitionResult::reply(session, outcome, message)
            }
            Ok(Step::Commit(new_row)) => match self.store.append(&new_row).await {
                Ok(row_id) => {
                    let draft_id = session.complete_commit().map(|draft| draft.id);
                    info!(user_id = %session.user_id, %row_id, ?draft_id, "Row committed");
                    TransitionResult {
                        state: session.state(),
                        outcome: Outcome::Committed,
                        message: format!("Row #{} saved to the table.", row_id),
                        committed_row: Some(new_row.into_row(row_id)),
                        error: None,
                    }
                }
                Err(e) => {
                    warn!(user_id = %session.user_id, "Commit failed, draft kept: {}", e);
                    let error = ConversationError::StorageFailure {
                        reason: e.to_string(),
                    };
                    TransitionResult::rejected(session, error)
                }
            },
            Err(error) => {
                if let ConversationError::InvariantViolation { reason } = &error {
                    error!(user_id = %session.user_id, event = event_kind, "Invariant violated: {}", reason);
                    session.reset();
                } else {
                    debug!(user_id = %session.user_id, event = event_kind, "Event rejected: {}", error);
                }
                TransitionResult::rejected(session, error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Field, NewRow, RowId};
    use crate::memory::InMemoryTableStore;
    use crate::ports::PortResult;
    use async_trait::async_trait;
    use tokio::sync::Notify;

    /// Holds every append until the test releases it.
    #[derive(Default)]
    struct GatedStore {
        inner: InMemoryTableStore,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl TableStore for GatedStore {
        async fn append(&self, row: &NewRow) -> PortResult<RowId> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.append(row).await
        }

        async fn read_all(&self) -> PortResult<Vec<Row>> {
            self.inner.read_all().await
        }

        async fn find_by_field(&self, field: Field, value: &str) -> PortResult<Vec<Row>> {
            self.inner.find_by_field(field, value).await
        }
    }

    fn registry() -> (Arc<InMemoryTableStore>, SessionRegistry) {
        let store = Arc::new(InMemoryTableStore::new());
        let registry = SessionRegistry::new(store.clone(), Duration::seconds(600));
        (store, registry)
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let (_, registry) = registry();
        let user = UserId::from("1");

        let first = registry.get_or_create(&user).await;
        let second = registry.get_or_create(&user).await;

        assert_eq!(first.state(), FsmState::Idle);
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(registry.active_sessions().await, 1);
    }

    #[tokio::test]
    async fn first_event_bootstraps_a_session() {
        let (_, registry) = registry();
        let result = registry.advance(&UserId::from("new"), Event::Start).await;

        assert_eq!(result.state, FsmState::AwaitingField(Field::Ssid));
        assert_eq!(result.outcome, Outcome::Advanced);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn rejected_events_carry_a_reprompt() {
        let (_, registry) = registry();
        let result = registry.advance(&UserId::from("1"), Event::Confirm).await;

        assert_eq!(result.outcome, Outcome::Rejected);
        assert_eq!(result.state, FsmState::Idle);
        assert!(matches!(
            result.error,
            Some(ConversationError::UnknownSessionEvent { .. })
        ));
        assert!(result.message.contains("Send start"));
    }

    #[tokio::test]
    async fn sweep_ignores_sessions_that_are_not_expired() {
        let (_, registry) = registry();
        let user = UserId::from("1");
        registry.advance(&user, Event::Start).await;

        let expired = registry.sweep_expired(Utc::now()).await;
        assert!(expired.is_empty());
        assert_eq!(
            registry.get_or_create(&user).await.state(),
            FsmState::AwaitingField(Field::Ssid)
        );
    }

    #[tokio::test]
    async fn sweep_evicts_stale_idle_sessions() {
        let (_, registry) = registry();
        let user = UserId::from("1");
        registry.get_or_create(&user).await;

        let later = Utc::now() + Duration::seconds(601);
        assert!(registry.sweep_expired(later).await.is_empty());
        assert_eq!(registry.active_sessions().await, 0);

        // An evicted user simply gets a fresh session.
        let result = registry.advance(&user, Event::Start).await;
        assert_eq!(result.state, FsmState::AwaitingField(Field::Ssid));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sweep_waits_for_an_in_flight_commit() {
        let store = Arc::new(GatedStore::default());
        let registry = Arc::new(SessionRegistry::new(store.clone(), Duration::seconds(600)));
        let user = UserId::from("1");

        registry.advance(&user, Event::Start).await;
        for answer in ["HomeWifi", "192.168.1.10", "192.168.1.1", "no", "kitchen"] {
            registry
                .advance(&user, Event::FieldInput(answer.to_string()))
                .await;
        }

        let confirm = tokio::spawn({
            let registry = registry.clone();
            let user = user.clone();
            async move { registry.advance(&user, Event::Confirm).await }
        });
        store.entered.notified().await;

        // Far enough ahead that the session would be expired if the sweep
        // could look at it before the commit finished.
        let sweep = tokio::spawn({
            let registry = registry.clone();
            async move {
                registry
                    .sweep_expired(Utc::now() + Duration::seconds(3600))
                    .await
            }
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!sweep.is_finished());

        store.release.notify_one();
        let result = confirm.await.unwrap();
        let expired = sweep.await.unwrap();

        assert_eq!(result.outcome, Outcome::Committed);
        assert!(result.committed_row.is_some());
        assert!(expired.is_empty());
        assert_eq!(store.inner.len().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn advance_retries_after_its_session_was_evicted() {
        let (_, registry) = registry();
        let registry = Arc::new(registry);
        let user = UserId::from("1");

        let old = registry.handle_for(&user).await;
        let mut slot = old.lock().await;

        let pending = tokio::spawn({
            let registry = registry.clone();
            let user = user.clone();
            async move { registry.advance(&user, Event::Start).await }
        });
        // Map, this test and the spawned advance each hold the old handle.
        while Arc::strong_count(&old) < 3 {
            tokio::task::yield_now().await;
        }

        slot.retired = true;
        registry.sessions.lock().await.remove(&user);
        drop(slot);

        let result = pending.await.unwrap();
        assert_eq!(result.state, FsmState::AwaitingField(Field::Ssid));
        assert!(result.error.is_none());
        assert_eq!(registry.active_sessions().await, 1);

        let fresh = registry.handle_for(&user).await;
        assert!(!Arc::ptr_eq(&old, &fresh));
        assert_eq!(old.lock().await.session.state(), FsmState::Idle);
    }
}
