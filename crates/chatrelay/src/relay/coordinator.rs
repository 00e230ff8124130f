//! Per-message fallback coordinator
//!
//! Runs one message cycle: parse, classify, debit, then either a single image
//! call or a streamed completion on the primary provider with one fallback
//! retry. Every failure is scoped to the message; nothing here ends the
//! process.

use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{RuntimeSettings, SettingsHandle};
use crate::provider::{CompletionProvider, ProviderError};
use crate::services::{IdentityResolver, QuotaError, QuotaLedger, RequestLogger, UserId};

use super::classify::{CostTier, Intent, IntentClassifier};
use super::completion::CompletionGuard;
use super::connection::Connection;
use super::envelope::{Notice, Outbound};
use super::error::CycleError;
use super::fragment::parse_delta;
use super::moderation::{ModerationBuffer, Moderator};
use super::request::{ConversationRequest, ModelHint};

/// Method label recorded with every interaction
pub const INTERACTION_METHOD: &str = "relay.handle_message";

/// Collaborators injected once at startup
#[derive(Clone)]
pub struct RelayServices {
    pub ledger: Arc<dyn QuotaLedger>,
    pub moderator: Arc<dyn Moderator>,
    pub primary: Arc<dyn CompletionProvider>,
    pub fallback: Arc<dyn CompletionProvider>,
    pub identity: Arc<dyn IdentityResolver>,
    pub logger: Arc<dyn RequestLogger>,
}

/// Identity of the message being processed, for logging and accounting
#[derive(Debug, Clone, Copy)]
pub struct MessageContext {
    pub session_id: Uuid,
    pub user: UserId,
    pub hint: ModelHint,
}

/// States a message passes through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
    Received,
    Classified,
    QuotaDebited,
    StreamingPrimary,
    Forwarding,
    FallbackRetry,
    Completed,
    Failed,
}

/// How a message cycle ended
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// Output was delivered; the debit stands
    Completed { tier: CostTier, fallback_used: bool },
    /// The cycle ended with a notice (and a credit if anything was debited)
    Failed(CycleError),
    /// The client went away; nothing further was sent
    Cancelled,
}

impl CycleOutcome {
    pub fn state(&self) -> MessageState {
        match self {
            CycleOutcome::Completed { .. } => MessageState::Completed,
            CycleOutcome::Failed(_) | CycleOutcome::Cancelled => MessageState::Failed,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, CycleOutcome::Completed { .. })
    }
}

/// Quota already taken for the current message
#[derive(Debug, Clone, Copy)]
struct Debit {
    user: UserId,
    amount: u64,
}

/// Drives the message protocol against the injected services
pub struct FallbackCoordinator {
    services: Arc<RelayServices>,
    settings: SettingsHandle,
    classifier: IntentClassifier,
    attempt_timeout: Option<Duration>,
}

impl FallbackCoordinator {
    pub fn new(
        services: Arc<RelayServices>,
        settings: SettingsHandle,
        classifier: IntentClassifier,
        attempt_timeout: Option<Duration>,
    ) -> Self {
        Self {
            services,
            settings,
            classifier,
            attempt_timeout,
        }
    }

    pub fn services(&self) -> &Arc<RelayServices> {
        &self.services
    }

    /// Run one message cycle to its terminal state.
    ///
    /// On return `guard` is owned by the attempt that ended the cycle; the
    /// caller fires the completion step through it once any notice is sent.
    pub async fn run(
        &self,
        ctx: &MessageContext,
        payload: &str,
        conn: &dyn Connection,
        guard: &CompletionGuard,
    ) -> CycleOutcome {
        transition(ctx, MessageState::Received);

        let outcome = match self.process(ctx, payload, conn, guard).await {
            Ok(outcome) => outcome,
            Err(err) => self.fail(ctx, err, conn).await,
        };

        transition(ctx, outcome.state());
        outcome
    }

    async fn process(
        &self,
        ctx: &MessageContext,
        payload: &str,
        conn: &dyn Connection,
        guard: &CompletionGuard,
    ) -> Result<CycleOutcome, CycleError> {
        let request = ConversationRequest::parse(payload)?;
        let prompt = request.prompt_of_record();

        self.services.logger.record_activity(ctx.user);
        self.services
            .logger
            .log_interaction(ctx.user, INTERACTION_METHOD, prompt);

        let settings = self.settings.snapshot().await;
        let intent = self.classifier.classify(prompt);
        let tier = CostTier::select(&intent, ctx.hint, &settings.control);
        let price = tier.price(&settings.pricing);
        transition(ctx, MessageState::Classified);
        debug!(
            session_id = %ctx.session_id,
            user_id = %ctx.user,
            tier = tier.as_str(),
            price,
            "Message classified"
        );

        let debit = self.debit(ctx.user, price).await?;
        transition(ctx, MessageState::QuotaDebited);

        match intent {
            Intent::ImageGeneration { prompt } => {
                self.run_image(ctx, &prompt, debit, conn).await?;
                Ok(CycleOutcome::Completed {
                    tier,
                    fallback_used: false,
                })
            }
            Intent::Conversational => {
                self.run_stream(ctx, &request, tier, &settings, debit, conn, guard)
                    .await
            }
        }
    }

    async fn debit(&self, user: UserId, price: u64) -> Result<Debit, CycleError> {
        self.services
            .ledger
            .debit(user, price)
            .await
            .map_err(|QuotaError::Exhausted { balance, required }| CycleError::QuotaExhausted {
                balance,
                required,
            })?;
        Ok(Debit {
            user,
            amount: price,
        })
    }

    async fn refund(&self, debit: Debit) {
        self.services.ledger.credit(debit.user, debit.amount).await;
        info!(user_id = %debit.user, amount = debit.amount, "Quota refunded");
    }

    /// Single-shot image generation; no streaming and no fallback
    async fn run_image(
        &self,
        ctx: &MessageContext,
        prompt: &str,
        debit: Debit,
        conn: &dyn Connection,
    ) -> Result<(), CycleError> {
        let provider = &self.services.primary;
        let deadline = self.deadline();

        let result = within(deadline, provider.generate_image(prompt))
            .await
            .and_then(|image| image);

        match result {
            Ok(image) => {
                transition(ctx, MessageState::Forwarding);
                conn.send(Outbound::image(image)).await?;
                Ok(())
            }
            Err(err) => {
                log_provider_failure(ctx, provider.name(), prompt, &err);
                self.refund(debit).await;
                Err(err.into())
            }
        }
    }

    /// Primary attempt, then at most one fallback attempt
    #[allow(clippy::too_many_arguments)]
    async fn run_stream(
        &self,
        ctx: &MessageContext,
        request: &ConversationRequest,
        tier: CostTier,
        settings: &RuntimeSettings,
        debit: Debit,
        conn: &dyn Connection,
        guard: &CompletionGuard,
    ) -> Result<CycleOutcome, CycleError> {
        let prompt = request.prompt_of_record();
        let primary = &self.services.primary;

        transition(ctx, MessageState::StreamingPrimary);
        match self.attempt(ctx, primary.as_ref(), request, tier, settings, conn).await {
            Ok(()) => {
                return Ok(CycleOutcome::Completed {
                    tier,
                    fallback_used: false,
                });
            }
            Err(CycleError::Provider(err)) => {
                log_provider_failure(ctx, primary.name(), prompt, &err);
            }
            Err(err) => return Err(err),
        }

        // A client that left while the primary was failing gets no retry
        if !conn.is_open() {
            return Err(CycleError::ClientDisconnected);
        }
        guard.hand_off();

        let fallback = &self.services.fallback;
        transition(ctx, MessageState::FallbackRetry);
        warn!(
            session_id = %ctx.session_id,
            user_id = %ctx.user,
            provider = fallback.name(),
            "Retrying on fallback provider"
        );

        match self.attempt(ctx, fallback.as_ref(), request, tier, settings, conn).await {
            Ok(()) => Ok(CycleOutcome::Completed {
                tier,
                fallback_used: true,
            }),
            Err(CycleError::Provider(err)) => {
                log_provider_failure(ctx, fallback.name(), prompt, &err);
                self.refund(debit).await;
                Err(CycleError::Provider(err))
            }
            Err(err) => Err(err),
        }
    }

    /// Stream one provider attempt to the client with a fresh moderation buffer.
    ///
    /// The timeout bounds opening the stream and each wait for the next
    /// fragment, not the whole reply.
    async fn attempt(
        &self,
        ctx: &MessageContext,
        provider: &dyn CompletionProvider,
        request: &ConversationRequest,
        tier: CostTier,
        settings: &RuntimeSettings,
        conn: &dyn Connection,
    ) -> Result<(), CycleError> {
        let mut fragments = within(self.deadline(), provider.stream(request, tier)).await??;
        let mut buffer = ModerationBuffer::new();
        let mut forwarding = false;

        while let Some(item) = within(self.deadline(), fragments.next()).await? {
            let raw = item?;
            let Some(content) = parse_delta(&raw) else {
                continue;
            };

            if !forwarding {
                forwarding = true;
                transition(ctx, MessageState::Forwarding);
            }
            self.forward(ctx, content, &mut buffer, settings, conn).await?;
        }

        Ok(())
    }

    async fn forward(
        &self,
        ctx: &MessageContext,
        content: String,
        buffer: &mut ModerationBuffer,
        settings: &RuntimeSettings,
        conn: &dyn Connection,
    ) -> Result<(), CycleError> {
        buffer.append(&content);

        let control = &settings.control;
        if control.enable_moderation
            && buffer.check(self.services.moderator.as_ref(), &control.sensitive_words)
        {
            warn!(
                session_id = %ctx.session_id,
                user_id = %ctx.user,
                "Streamed output withheld by moderation"
            );
            conn.send(Outbound::notice(Notice::Moderated)).await?;
            buffer.reset();
            return Ok(());
        }

        conn.send(Outbound::content(content)).await?;
        Ok(())
    }

    /// Notify the client about a failed cycle
    async fn fail(&self, ctx: &MessageContext, err: CycleError, conn: &dyn Connection) -> CycleOutcome {
        match &err {
            CycleError::ClientDisconnected => {
                debug!(
                    session_id = %ctx.session_id,
                    user_id = %ctx.user,
                    "Client disconnected, cycle cancelled"
                );
                return CycleOutcome::Cancelled;
            }
            CycleError::QuotaExhausted { balance, required } => {
                info!(
                    session_id = %ctx.session_id,
                    user_id = %ctx.user,
                    balance,
                    required,
                    "Quota exhausted"
                );
            }
            CycleError::MalformedRequest(reason) => {
                warn!(
                    session_id = %ctx.session_id,
                    user_id = %ctx.user,
                    error_type = err.category(),
                    "Malformed request: {}",
                    reason
                );
            }
            // Already logged per attempt
            CycleError::Provider(_) => {}
        }

        if let Some(notice) = err.notice() {
            if conn.send(Outbound::notice(notice)).await.is_err() {
                debug!(session_id = %ctx.session_id, "Client gone before failure notice");
            }
        }
        CycleOutcome::Failed(err)
    }

    fn deadline(&self) -> Option<Instant> {
        self.attempt_timeout.map(|t| Instant::now() + t)
    }
}

/// Await `future`, failing with a timeout once `deadline` passes
async fn within<F: Future>(deadline: Option<Instant>, future: F) -> Result<F::Output, ProviderError> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, future)
            .await
            .map_err(|_| ProviderError::Timeout),
        None => Ok(future.await),
    }
}

fn transition(ctx: &MessageContext, state: MessageState) {
    debug!(session_id = %ctx.session_id, user_id = %ctx.user, state = ?state, "Message state");
}

fn log_provider_failure(ctx: &MessageContext, provider: &str, prompt: &str, err: &ProviderError) {
    error!(
        session_id = %ctx.session_id,
        user_id = %ctx.user,
        provider,
        error_type = "provider",
        prompt,
        "Provider attempt failed: {}",
        err
    );
}
