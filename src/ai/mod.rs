//! AI caller — prompt composition, retries, and graceful degradation.
//!
//! DESIGN
//! ======
//! `generate_content` is the raw primitive: up to three attempts with
//! exponential backoff, each attempt gated by the shared circuit breaker and
//! paced by the shared token bucket under a per-attempt timeout. It can fail
//! with `Unavailable`.
//!
//! The two user-facing operations, `generate_chat_response` and
//! `generate_insight`, never fail: on terminal upstream failure they
//! substitute a deterministic fallback and say so, which the HTTP layer turns
//! into a 200 labeled as fallback.

pub mod gemini;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::breaker::{CircuitBreaker, ExecuteError};
use crate::limiter::TokenBucket;
use crate::zodiac;

const MAX_ATTEMPTS: u32 = 3;
const BASE_DELAY: Duration = Duration::from_secs(1);
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// ERRORS AND TRAIT
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("invalid prompt")]
    InvalidPrompt,
    #[error("AI service unavailable")]
    Unavailable,
    #[error("missing API key")]
    MissingApiKey,
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
    #[error("API request failed: {0}")]
    ApiRequest(String),
    #[error("API response error: status {status}")]
    ApiResponse { status: u16, body: String },
    #[error("API response parse failed: {0}")]
    ApiParse(String),
    #[error("attempt timed out")]
    Timeout,
    #[error("circuit breaker is open")]
    CircuitOpen,
    #[error("too many recovery probes")]
    TooManyProbes,
}

/// Provider-neutral text generation. Enables mocking in tests.
#[async_trait::async_trait]
pub trait GenerateText: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, AiError>;
}

/// A generated reply, flagged when it came from the fallback table instead of
/// the live provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedReply {
    pub text: String,
    pub fallback: bool,
}

/// Payload for one queued chat generation.
#[derive(Debug, Clone)]
pub struct ChatJob {
    pub zodiac_sign: String,
    pub user_message: String,
}

// =============================================================================
// CLIENT
// =============================================================================

/// Composes the provider with the breaker and the outbound token bucket.
pub struct AiClient {
    provider: Arc<dyn GenerateText>,
    breaker: Arc<CircuitBreaker>,
    limiter: Arc<TokenBucket>,
    max_attempts: u32,
    base_delay: Duration,
    attempt_timeout: Duration,
}

/// One attempt either yields text or a reason to try again.
enum Attempt {
    Ok(String),
    Retry(AiError),
}

impl AiClient {
    #[must_use]
    pub fn new(provider: Arc<dyn GenerateText>, breaker: Arc<CircuitBreaker>, limiter: Arc<TokenBucket>) -> Self {
        Self {
            provider,
            breaker,
            limiter,
            max_attempts: MAX_ATTEMPTS,
            base_delay: BASE_DELAY,
            attempt_timeout: ATTEMPT_TIMEOUT,
        }
    }

    /// Override retry timing. Used by tests to avoid real backoff sleeps.
    #[cfg(test)]
    fn with_timing(mut self, base_delay: Duration, attempt_timeout: Duration) -> Self {
        self.base_delay = base_delay;
        self.attempt_timeout = attempt_timeout;
        self
    }

    /// Breaker state observer, surfaced on the health endpoint.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    // =========================================================================
    // PRIMITIVE
    // =========================================================================

    /// Generate raw text for a prompt.
    ///
    /// # Errors
    ///
    /// `InvalidPrompt` for an empty prompt; `Unavailable` once every attempt
    /// has failed or been rejected.
    pub async fn generate_content(&self, prompt: &str) -> Result<String, AiError> {
        if prompt.is_empty() {
            return Err(AiError::InvalidPrompt);
        }

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s.
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                debug!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "retrying generation");
                tokio::time::sleep(delay).await;
            }

            match self.attempt_once(prompt).await {
                Attempt::Ok(text) => return Ok(text),
                Attempt::Retry(reason) => {
                    warn!(attempt = attempt + 1, max = self.max_attempts, error = %reason, "generation attempt failed");
                }
            }
        }

        Err(AiError::Unavailable)
    }

    /// One gated, paced, deadline-bound provider call.
    async fn attempt_once(&self, prompt: &str) -> Attempt {
        let call = async {
            // The timeout covers limiter wait plus the provider call, so a
            // starved bucket fails the attempt rather than stalling it.
            tokio::time::timeout(self.attempt_timeout, async {
                self.limiter.wait().await;
                self.provider.generate(prompt).await
            })
            .await
            .map_err(|_| AiError::Timeout)?
        };

        match self.breaker.execute(call).await {
            Ok(text) => Attempt::Ok(text),
            Err(ExecuteError::Open) => Attempt::Retry(AiError::CircuitOpen),
            Err(ExecuteError::TooManyProbes) => Attempt::Retry(AiError::TooManyProbes),
            Err(ExecuteError::Inner(e)) => Attempt::Retry(e),
        }
    }

    // =========================================================================
    // USER-FACING OPERATIONS
    // =========================================================================

    /// Chat reply in the caller's zodiac persona. Never fails: upstream
    /// trouble yields the sign's deterministic fallback line.
    pub async fn generate_chat_response(&self, zodiac_sign: &str, user_message: &str) -> GeneratedReply {
        let prompt = build_chat_prompt(zodiac_sign, user_message);
        match self.generate_content(&prompt).await {
            Ok(text) if !text.trim().is_empty() => GeneratedReply { text, fallback: false },
            Ok(_) | Err(_) => {
                GeneratedReply { text: zodiac::fallback_chat_line(zodiac_sign).to_string(), fallback: true }
            }
        }
    }

    /// Life-lesson insight for a transcript. Never fails: upstream trouble
    /// yields the generic fallback insight.
    pub async fn generate_insight(&self, transcript: &str) -> GeneratedReply {
        let prompt = build_insight_prompt(transcript);
        match self.generate_content(&prompt).await {
            Ok(text) if !text.trim().is_empty() => GeneratedReply { text, fallback: false },
            Ok(_) | Err(_) => GeneratedReply { text: zodiac::FALLBACK_INSIGHT.to_string(), fallback: true },
        }
    }
}

// =============================================================================
// PROMPTS
// =============================================================================

pub(crate) fn build_chat_prompt(zodiac_sign: &str, user_message: &str) -> String {
    let traits = zodiac::trait_phrase(zodiac_sign);
    format!(
        "You are a {zodiac_sign} AI companion with these personality traits: {traits}.\n\n\
         Respond to the user's message with empathy, wisdom, and understanding characteristic of {zodiac_sign}.\n\
         Be supportive, insightful, and help them reflect on their feelings.\n\n\
         User message: {user_message}\n\n\
         Respond in a warm, compassionate tone (max 150 words). Speak in Bahasa Indonesia."
    )
}

pub(crate) fn build_insight_prompt(transcript: &str) -> String {
    format!(
        "Analyze this conversation and extract a profound life lesson or insight.\n\
         Create a short, inspirational message (max 200 words) that could help others facing similar situations.\n\n\
         Conversation:\n{transcript}\n\n\
         Generate a wisdom-filled insight that:\n\
         1. Identifies the core emotional theme\n\
         2. Offers a universal life lesson\n\
         3. Provides hope and encouragement\n\
         4. Is relatable to others\n\n\
         Format: A single paragraph of wisdom in Bahasa Indonesia. Make it profound and shareable."
    )
}

// =============================================================================
// QUEUE DISPATCH
// =============================================================================

/// Per-request total deadline at the handler.
pub const REQUEST_DEADLINE: Duration = Duration::from_secs(60);

/// How a queued chat request failed to produce a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChatDispatchError {
    /// Queue at capacity; the client should retry later.
    #[error("server is busy")]
    Busy,
    /// Queue closed; the process is shutting down.
    #[error("service is shutting down")]
    Shutdown,
    /// The 60-second request deadline elapsed.
    #[error("request timed out")]
    Timeout,
    /// The worker failed without a usable reply.
    #[error("failed to generate a reply")]
    Internal,
}

/// Processor run by dispatch workers: one chat generation per job. The AI
/// client masks upstream failure behind fallbacks, so the job itself cannot
/// fail.
#[must_use]
pub fn chat_processor(ai: Arc<AiClient>) -> crate::queue::Processor<ChatJob, GeneratedReply> {
    use futures::FutureExt;
    Arc::new(move |job: ChatJob| {
        let ai = Arc::clone(&ai);
        async move {
            Ok::<_, crate::queue::DispatchError>(ai.generate_chat_response(&job.zodiac_sign, &job.user_message).await)
        }
        .boxed()
    })
}

/// Enqueue one chat job and await its reply under the request deadline.
///
/// # Errors
///
/// `Busy` / `Shutdown` on admission failure, `Timeout` when the deadline
/// fires first, `Internal` when the worker could not produce a reply.
pub async fn dispatch_chat(
    queue: &crate::queue::RequestQueue<ChatJob, GeneratedReply>,
    job: ChatJob,
) -> Result<GeneratedReply, ChatDispatchError> {
    use crate::queue::{DispatchError, EnqueueError, QueuedRequest};

    let deadline = tokio::time::Instant::now() + REQUEST_DEADLINE;
    let (req, reply) = QueuedRequest::new(job, deadline.into_std());
    let id = req.id;

    queue.enqueue(req).map_err(|e| match e {
        EnqueueError::Full => ChatDispatchError::Busy,
        EnqueueError::Closed => ChatDispatchError::Shutdown,
    })?;
    debug!(%id, "chat request enqueued");

    match tokio::time::timeout_at(deadline, reply).await {
        Err(_) => Err(ChatDispatchError::Timeout),
        // Worker dropped the reply channel without answering (forced shutdown).
        Ok(Err(_)) => Err(ChatDispatchError::Internal),
        Ok(Ok(Ok(reply))) => Ok(reply),
        Ok(Ok(Err(DispatchError::Cancelled))) => Err(ChatDispatchError::Timeout),
        Ok(Ok(Err(_))) => Err(ChatDispatchError::Internal),
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
