use super::*;

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::zodiac::ZodiacSign;

// =============================================================================
// Scripted provider
// =============================================================================

enum Step {
    Ok(&'static str),
    Fail,
}

struct Scripted {
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
}

impl Scripted {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self { steps: Mutex::new(steps.into()), calls: AtomicUsize::new(0) })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl GenerateText for Scripted {
    async fn generate(&self, _prompt: &str) -> Result<String, AiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.steps.lock().unwrap().pop_front() {
            Some(Step::Ok(text)) => Ok(text.to_string()),
            Some(Step::Fail) | None => Err(AiError::ApiRequest("provider down".into())),
        }
    }
}

fn client(provider: Arc<Scripted>) -> AiClient {
    let breaker = Arc::new(CircuitBreaker::with_defaults());
    let limiter = Arc::new(TokenBucket::new(100, Duration::from_secs(1)));
    AiClient::new(provider, breaker, limiter)
}

// =============================================================================
// generate_content
// =============================================================================

#[tokio::test]
async fn empty_prompt_is_rejected_without_calling_provider() {
    let provider = Scripted::new(vec![Step::Ok("unused")]);
    let ai = client(Arc::clone(&provider));
    assert!(matches!(ai.generate_content("").await, Err(AiError::InvalidPrompt)));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn first_attempt_success_needs_no_retry() {
    let provider = Scripted::new(vec![Step::Ok("wisdom")]);
    let ai = client(Arc::clone(&provider));
    assert_eq!(ai.generate_content("prompt").await.unwrap(), "wisdom");
    assert_eq!(provider.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn recovers_on_third_attempt_after_backoff() {
    let provider = Scripted::new(vec![Step::Fail, Step::Fail, Step::Ok("finally")]);
    let ai = client(Arc::clone(&provider));
    assert_eq!(ai.generate_content("prompt").await.unwrap(), "finally");
    assert_eq!(provider.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn exhausted_attempts_yield_unavailable() {
    let provider = Scripted::new(vec![Step::Fail, Step::Fail, Step::Fail]);
    let ai = client(Arc::clone(&provider));
    assert!(matches!(ai.generate_content("prompt").await, Err(AiError::Unavailable)));
    assert_eq!(provider.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn open_breaker_short_circuits_every_attempt() {
    let provider = Scripted::new(vec![Step::Ok("never reached")]);
    let breaker = Arc::new(CircuitBreaker::new(1, Duration::from_secs(60), 1));
    let limiter = Arc::new(TokenBucket::new(100, Duration::from_secs(1)));
    // Trip the breaker first.
    let tripped: Result<(), _> = breaker.execute(async { Err::<(), _>(AiError::Timeout) }).await;
    tripped.unwrap_err();

    let ai = AiClient::new(Arc::clone(&provider) as Arc<dyn GenerateText>, breaker, limiter);
    assert!(matches!(ai.generate_content("prompt").await, Err(AiError::Unavailable)));
    // The breaker rejected each attempt before the provider ran.
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn starved_limiter_times_the_attempt_out() {
    let provider = Scripted::new(vec![Step::Ok("never reached")]);
    let breaker = Arc::new(CircuitBreaker::with_defaults());
    let limiter = Arc::new(TokenBucket::new(1, Duration::from_secs(3600)));
    assert!(limiter.allow()); // drain the bucket

    let ai = AiClient::new(Arc::clone(&provider) as Arc<dyn GenerateText>, breaker, limiter)
        .with_timing(Duration::from_millis(1), Duration::from_millis(30));
    assert!(matches!(ai.generate_content("prompt").await, Err(AiError::Unavailable)));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn repeated_failures_open_the_breaker() {
    let provider = Scripted::new(vec![]); // always fails
    let breaker = Arc::new(CircuitBreaker::with_defaults());
    let limiter = Arc::new(TokenBucket::new(100, Duration::from_secs(1)));
    let ai = AiClient::new(Arc::clone(&provider) as Arc<dyn GenerateText>, Arc::clone(&breaker), limiter);

    // Two exhausted requests = 6 provider failures, past the threshold of 5.
    let _ = ai.generate_content("one").await;
    let _ = ai.generate_content("two").await;
    assert_eq!(breaker.state(), crate::breaker::State::Open);
    // 5 real calls before the breaker started rejecting.
    assert_eq!(provider.calls(), 5);
}

// =============================================================================
// Fallback behavior
// =============================================================================

#[tokio::test(start_paused = true)]
async fn chat_response_falls_back_per_sign() {
    let provider = Scripted::new(vec![]);
    let ai = client(provider);
    let reply = ai.generate_chat_response("Scorpio", "hari yang berat").await;
    assert!(reply.fallback);
    assert_eq!(reply.text, crate::zodiac::fallback_chat_line("Scorpio"));
}

#[tokio::test(start_paused = true)]
async fn chat_fallback_covers_every_sign_and_unknown_tags() {
    for tag in ZodiacSign::ALL.iter().map(|s| s.as_str()).chain(["NotASign"]) {
        let provider = Scripted::new(vec![]);
        let ai = client(provider);
        let reply = ai.generate_chat_response(tag, "hi").await;
        assert!(reply.fallback, "{tag} should fall back");
        assert!(!reply.text.is_empty(), "{tag} fallback must be non-empty");
    }
}

#[tokio::test]
async fn chat_success_passes_text_through() {
    let provider = Scripted::new(vec![Step::Ok("jawaban hangat")]);
    let ai = client(provider);
    let reply = ai.generate_chat_response("Leo", "halo").await;
    assert!(!reply.fallback);
    assert_eq!(reply.text, "jawaban hangat");
}

#[tokio::test(start_paused = true)]
async fn blank_provider_text_counts_as_fallback() {
    let provider = Scripted::new(vec![Step::Ok("   ")]);
    let ai = client(provider);
    let reply = ai.generate_chat_response("Leo", "halo").await;
    assert!(reply.fallback);
}

#[tokio::test(start_paused = true)]
async fn insight_falls_back_to_generic_text() {
    let provider = Scripted::new(vec![]);
    let ai = client(provider);
    let reply = ai.generate_insight("User: halo\nAI: halo juga\n").await;
    assert!(reply.fallback);
    assert_eq!(reply.text, crate::zodiac::FALLBACK_INSIGHT);
}

#[tokio::test]
async fn insight_success_passes_through() {
    let provider = Scripted::new(vec![Step::Ok("pelajaran hidup")]);
    let ai = client(provider);
    let reply = ai.generate_insight("User: halo\n").await;
    assert!(!reply.fallback);
    assert_eq!(reply.text, "pelajaran hidup");
}

// =============================================================================
// Prompts
// =============================================================================

#[test]
fn chat_prompt_carries_sign_traits_and_message() {
    let prompt = build_chat_prompt("Virgo", "aku lelah");
    assert!(prompt.contains("Virgo AI companion"));
    assert!(prompt.contains("analytical"));
    assert!(prompt.contains("aku lelah"));
    assert!(prompt.contains("Bahasa Indonesia"));
}

#[test]
fn chat_prompt_unknown_sign_uses_neutral_traits() {
    let prompt = build_chat_prompt("Mystery", "halo");
    assert!(prompt.contains("empathetic and understanding"));
}

#[test]
fn insight_prompt_embeds_transcript() {
    let prompt = build_insight_prompt("User: a\nAI: b\n");
    assert!(prompt.contains("User: a"));
    assert!(prompt.contains("life lesson"));
}
