//! Client sessions
//!
//! A session lives for one WebSocket connection. It resolves identity once at
//! open, runs inbound messages one at a time in arrival order on a dedicated
//! worker task, and closes the connection at most once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{RelayConfig, SettingsHandle};
use crate::error::Result;
use crate::services::UserId;

use super::classify::IntentClassifier;
use super::completion::CompletionGuard;
use super::connection::Connection;
use super::coordinator::{CycleOutcome, FallbackCoordinator, MessageContext, RelayServices};
use super::request::ModelHint;

/// One queued inbound message and where to report its outcome
type Job = (String, oneshot::Sender<CycleOutcome>);

/// Opens sessions for authenticated connections
pub struct SessionManager {
    coordinator: Arc<FallbackCoordinator>,
    close_after_message: bool,
}

impl SessionManager {
    pub fn new(services: RelayServices, settings: SettingsHandle, config: &RelayConfig) -> Result<Self> {
        let classifier = IntentClassifier::new(&config.drawing_cues)?;
        let attempt_timeout =
            (config.attempt_timeout_secs > 0).then(|| Duration::from_secs(config.attempt_timeout_secs));

        Ok(Self {
            coordinator: Arc::new(FallbackCoordinator::new(
                Arc::new(services),
                settings,
                classifier,
                attempt_timeout,
            )),
            close_after_message: config.close_after_message,
        })
    }

    /// Resolve `token` and bind a session to `connection`.
    ///
    /// Returns `None` for an unknown token; nothing is sent in that case.
    pub async fn open(
        &self,
        token: &str,
        hint: ModelHint,
        connection: Arc<dyn Connection>,
    ) -> Option<Arc<Session>> {
        let Some(user) = self.coordinator.services().identity.resolve(token).await else {
            debug!("Connection rejected: unknown token");
            return None;
        };

        let (queue, jobs) = mpsc::unbounded_channel();
        let session = Arc::new(Session {
            id: Uuid::new_v4(),
            user,
            hint,
            connection,
            coordinator: Arc::clone(&self.coordinator),
            close_after_message: self.close_after_message,
            closed: AtomicBool::new(false),
            queue,
        });
        tokio::spawn(message_worker(Arc::downgrade(&session), jobs));
        info!(session_id = %session.id, user_id = %user, hint = ?hint, "Session opened");

        Some(session)
    }
}

/// Drain a session's queue in order. Ends once the session is dropped.
async fn message_worker(session: Weak<Session>, mut jobs: mpsc::UnboundedReceiver<Job>) {
    while let Some((payload, reply)) = jobs.recv().await {
        let Some(session) = session.upgrade() else {
            break;
        };
        let outcome = session.run_cycle(payload).await;
        // The caller may not wait for the outcome
        let _ = reply.send(outcome);
    }
}

/// One authenticated client connection
pub struct Session {
    id: Uuid,
    user: UserId,
    hint: ModelHint,
    connection: Arc<dyn Connection>,
    coordinator: Arc<FallbackCoordinator>,
    close_after_message: bool,
    closed: AtomicBool,
    queue: mpsc::UnboundedSender<Job>,
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user(&self) -> UserId {
        self.user
    }

    pub fn hint(&self) -> ModelHint {
        self.hint
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Queue `payload` for the message protocol and return without waiting.
    ///
    /// Messages run one after another in the order they were handed in. The
    /// receiver resolves to the cycle's outcome.
    pub fn handle_message(&self, payload: String) -> oneshot::Receiver<CycleOutcome> {
        let (reply, outcome) = oneshot::channel();
        if self.queue.send((payload, reply)).is_err() {
            debug!(session_id = %self.id, "Message dropped, session worker gone");
        }
        outcome
    }

    async fn run_cycle(&self, payload: String) -> CycleOutcome {
        if self.is_closed() {
            debug!(session_id = %self.id, "Message dropped, session already closed");
            return CycleOutcome::Cancelled;
        }

        let ctx = MessageContext {
            session_id: self.id,
            user: self.user,
            hint: self.hint,
        };
        let guard = CompletionGuard::new();
        let outcome = self
            .coordinator
            .run(&ctx, &payload, self.connection.as_ref(), &guard)
            .await;

        let completed = guard.owner().is_some_and(|owner| guard.complete(owner));
        if completed && self.close_after_message {
            self.close().await;
        }
        outcome
    }

    /// Close the connection. Only the first call has any effect.
    pub async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.connection.close().await;
        info!(session_id = %self.id, user_id = %self.user, "Session closed");
        true
    }

    /// Transport error reported by the socket
    pub fn on_error(&self, error: &dyn std::fmt::Display) {
        warn!(session_id = %self.id, user_id = %self.user, "Connection error: {}", error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeSettings;
    use crate::provider::{CompletionProvider, FragmentStream, ProviderError};
    use crate::relay::moderation::WordlistModerator;
    use crate::relay::{ConversationRequest, CostTier};
    use crate::services::{InMemoryLedger, StaticTokenResolver, TracingRequestLogger};
    use crate::testing::{RecordingConnection, ScriptedProvider, delta};
    use async_trait::async_trait;
    use futures::stream;
    use std::collections::HashMap;
    use std::result::Result;

    /// Replies with the prompt it was given, after a pause that varies per prompt
    struct EchoProvider;

    #[async_trait]
    impl CompletionProvider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn stream(
            &self,
            request: &ConversationRequest,
            _tier: CostTier,
        ) -> Result<FragmentStream, ProviderError> {
            let pause = pause_for(request.prompt_of_record());
            tokio::time::sleep(pause).await;
            let reply = delta(request.prompt_of_record());
            Ok(Box::pin(stream::iter([Ok::<_, ProviderError>(reply)])))
        }

        async fn generate_image(&self, _prompt: &str) -> Result<String, ProviderError> {
            Err(ProviderError::EmptyResponse)
        }
    }

    fn pause_for(seed: &str) -> Duration {
        let micros = seed.bytes().fold(7u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
        Duration::from_micros(micros % 500)
    }

    fn manager(close_after_message: bool) -> SessionManager {
        let services = RelayServices {
            ledger: Arc::new(InMemoryLedger::new(100)),
            moderator: Arc::new(WordlistModerator::new()),
            primary: Arc::new(ScriptedProvider::fragments("primary", &["A"])),
            fallback: Arc::new(ScriptedProvider::fragments("fallback", &["X"])),
            identity: Arc::new(StaticTokenResolver::new(HashMap::from([(
                "tok".to_string(),
                7,
            )]))),
            logger: Arc::new(TracingRequestLogger::new()),
        };
        let config = RelayConfig {
            close_after_message,
            ..RelayConfig::default()
        };
        SessionManager::new(services, SettingsHandle::new(RuntimeSettings::default()), &config)
            .unwrap()
    }

    const PAYLOAD: &str = r#"{"messages":[{"role":"user","content":"hi"}]}"#;

    #[tokio::test]
    async fn test_open_resolves_identity() {
        let conn = Arc::new(RecordingConnection::new());
        let session = manager(true)
            .open("tok", ModelHint::Advanced, conn)
            .await
            .unwrap();
        assert_eq!(session.user(), UserId(7));
        assert_eq!(session.hint(), ModelHint::Advanced);
        assert!(!session.is_closed());
    }

    #[tokio::test]
    async fn test_open_rejects_unknown_token_silently() {
        let conn = Arc::new(RecordingConnection::new());
        let session = manager(true).open("nope", ModelHint::Standard, conn.clone()).await;
        assert!(session.is_none());
        assert!(conn.sent().is_empty());
        assert_eq!(conn.close_count(), 0);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let conn = Arc::new(RecordingConnection::new());
        let session = manager(true)
            .open("tok", ModelHint::Standard, conn.clone())
            .await
            .unwrap();

        assert!(session.close().await);
        assert!(!session.close().await);
        assert_eq!(conn.close_count(), 1);
    }

    #[tokio::test]
    async fn test_message_closes_when_configured() {
        let conn = Arc::new(RecordingConnection::new());
        let session = manager(true)
            .open("tok", ModelHint::Standard, conn.clone())
            .await
            .unwrap();

        let outcome = session.handle_message(PAYLOAD.to_string()).await.unwrap();
        assert!(outcome.is_completed());
        assert!(session.is_closed());
        assert_eq!(conn.close_count(), 1);

        // Later messages on a closed session do nothing
        let outcome = session.handle_message(PAYLOAD.to_string()).await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Cancelled));
        assert_eq!(conn.texts(), vec!["A".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_keep_open_runs_messages_in_arrival_order() {
        let conn = Arc::new(RecordingConnection::new());
        let services = RelayServices {
            ledger: Arc::new(InMemoryLedger::new(1_000)),
            moderator: Arc::new(WordlistModerator::new()),
            primary: Arc::new(EchoProvider),
            fallback: Arc::new(ScriptedProvider::fragments("fallback", &["X"])),
            identity: Arc::new(StaticTokenResolver::new(HashMap::from([(
                "tok".to_string(),
                7,
            )]))),
            logger: Arc::new(TracingRequestLogger::new()),
        };
        let config = RelayConfig {
            close_after_message: false,
            ..RelayConfig::default()
        };
        let session = SessionManager::new(services, SettingsHandle::new(RuntimeSettings::default()), &config)
            .unwrap()
            .open("tok", ModelHint::Standard, conn.clone())
            .await
            .unwrap();

        let pending: Vec<_> = (0..200)
            .map(|n| {
                let payload = serde_json::json!({"messages": [{"role": "user", "content": n.to_string()}]});
                session.handle_message(payload.to_string())
            })
            .collect();
        for outcome in pending {
            assert!(outcome.await.unwrap().is_completed());
        }

        let expected: Vec<String> = (0..200).map(|n| n.to_string()).collect();
        assert_eq!(conn.texts(), expected);
        assert_eq!(conn.close_count(), 0);
    }

    #[tokio::test]
    async fn test_closing_drops_queued_messages() {
        let conn = Arc::new(RecordingConnection::new());
        let session = manager(false)
            .open("tok", ModelHint::Standard, conn.clone())
            .await
            .unwrap();

        session.close().await;
        let outcome = session.handle_message(PAYLOAD.to_string()).await.unwrap();

        assert!(matches!(outcome, CycleOutcome::Cancelled));
        assert!(conn.sent().is_empty());
    }
}
