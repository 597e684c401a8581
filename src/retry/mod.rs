//! Retry orchestration around the transcript fetch client
//!
//! Every attempt goes through a freshly selected proxy. Rate-limited and blocked attempts are
//! retried with exponential backoff plus up to one second of additive jitter; any other failure
//! ends the request immediately.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

use crate::transcript::{FetchClient, FetchOutcome, FetchRequest};
use crate::TranscriptError;

/// Total attempts per request, including the first
pub const MAX_ATTEMPTS: u32 = 10;

/// Backoff before the second attempt; doubles for every attempt after that
pub const BASE_DELAY: Duration = Duration::from_secs(1);

/// Upper bound (exclusive) of the jitter added to every backoff
pub const MAX_JITTER: Duration = Duration::from_secs(1);

/// Retry budget and backoff shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            base_delay: BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Backoff before the attempt after `attempt`, without jitter: `base * 2^(attempt-1)`
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Backoff with `jitter` (a fraction in `[0, 1)` of `MAX_JITTER`) added
    pub fn backoff(&self, attempt: u32, jitter: f64) -> Duration {
        self.base_backoff(attempt) + MAX_JITTER.mul_f64(jitter.clamp(0.0, 1.0))
    }
}

/// Per-request attempt counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    attempt: u32,
    max_attempts: u32,
}

impl RetryState {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            attempt: 1,
            max_attempts: policy.max_attempts.max(1),
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn is_last(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    fn advance(&mut self) {
        debug_assert!(!self.is_last());
        self.attempt += 1;
    }
}

/// Drives fetch attempts until success, a fatal classification, or the budget runs out
pub struct RetryOrchestrator {
    client: Arc<FetchClient>,
    policy: RetryPolicy,
}

impl RetryOrchestrator {
    pub fn new(client: Arc<FetchClient>) -> Self {
        Self::with_policy(client, RetryPolicy::default())
    }

    pub fn with_policy(client: Arc<FetchClient>, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn client(&self) -> &FetchClient {
        &self.client
    }

    /// Fetch the transcript for `video_id` as newline-joined plain text
    pub async fn fetch_with_retry(
        &self,
        video_id: &str,
        languages: &[String],
    ) -> Result<String, TranscriptError> {
        let request = FetchRequest::new(video_id, languages);
        let mut state = RetryState::new(&self.policy);

        loop {
            match self.client.fetch(&request).await {
                FetchOutcome::Success { text } => {
                    if state.attempt() > 1 {
                        tracing::info!(
                            video_id = %request.video_id,
                            attempts = state.attempt(),
                            "Transcript fetched after retry"
                        );
                    }
                    return Ok(text);
                }
                FetchOutcome::RetryableFailure { reason } => {
                    if state.is_last() {
                        tracing::error!(
                            video_id = %request.video_id,
                            attempts = state.attempt(),
                            ?reason,
                            "All transcript attempts were rate-limited or blocked"
                        );
                        return Err(TranscriptError::Exhausted {
                            video_id: request.video_id.clone(),
                            attempts: state.attempt(),
                        });
                    }

                    let delay = self
                        .policy
                        .backoff(state.attempt(), rand::thread_rng().gen::<f64>());

                    tracing::warn!(
                        video_id = %request.video_id,
                        attempt = state.attempt(),
                        max_attempts = self.policy.max_attempts,
                        ?reason,
                        delay_ms = delay.as_millis() as u64,
                        "Attempt failed, rotating proxy and retrying"
                    );

                    tokio::time::sleep(delay).await;
                    state.advance();
                }
                FetchOutcome::FatalFailure { reason, detail } => {
                    let error = reason.into_error(detail, &request);
                    tracing::warn!(
                        video_id = %request.video_id,
                        attempt = state.attempt(),
                        error = %error,
                        "Transcript fetch failed"
                    );
                    return Err(error);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::{ProxyCredentials, ProxyEndpoint, ProxyMode, ProxyStrategy};
    use crate::transcript::{CaptionFragment, MockTranscriptSource, SourceError};
    use crate::ErrorKind;
    use std::sync::Mutex;
    use tokio::time::Instant;

    fn fragments(texts: &[&str]) -> Vec<CaptionFragment> {
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| CaptionFragment {
                text: text.to_string(),
                start: i as f64,
                duration: 1.0,
            })
            .collect()
    }

    fn rate_limited() -> SourceError {
        SourceError::RequestFailed {
            status: Some(429),
            message: "HTTP 429 Too Many Requests".to_string(),
        }
    }

    /// Mock whose responses are scripted per attempt; records when each attempt started
    fn scripted_source(
        script: Vec<Result<Vec<CaptionFragment>, SourceError>>,
        calls: Arc<Mutex<Vec<Instant>>>,
    ) -> MockTranscriptSource {
        let expected = script.len();
        let mut script = script.into_iter();

        let mut source = MockTranscriptSource::new();
        source.expect_source_name().return_const("mock");
        source
            .expect_fetch_fragments()
            .times(expected)
            .returning(move |_, _| {
                calls.lock().unwrap().push(Instant::now());
                script.next().expect("script exhausted")
            });
        source
    }

    fn orchestrator(source: MockTranscriptSource) -> RetryOrchestrator {
        let strategy = ProxyStrategy::resolve(
            ProxyMode::Static,
            Some(ProxyCredentials::new("user", "pass")),
            vec![
                ProxyEndpoint::new("10.0.0.1", 1000),
                ProxyEndpoint::new("10.0.0.2", 2000),
            ],
        );
        let client = FetchClient::new(Arc::new(strategy), Arc::new(source));
        RetryOrchestrator::new(Arc::new(client))
    }

    fn gaps(calls: &[Instant]) -> Vec<Duration> {
        calls.windows(2).map(|w| w[1] - w[0]).collect()
    }

    #[test]
    fn test_backoff_bounds() {
        let policy = RetryPolicy::default();
        for attempt in 1..MAX_ATTEMPTS {
            let base = Duration::from_secs(1u64 << (attempt - 1));
            assert_eq!(policy.base_backoff(attempt), base);
            assert_eq!(policy.backoff(attempt, 0.0), base);

            let high = policy.backoff(attempt, 0.999);
            assert!(high >= base && high < base + Duration::from_secs(1));
        }
    }

    #[test]
    fn test_backoff_never_decreases() {
        let policy = RetryPolicy::default();
        let delays: Vec<_> = (1..MAX_ATTEMPTS).map(|k| policy.base_backoff(k)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_retry_state() {
        let mut state = RetryState::new(&RetryPolicy::default());
        assert_eq!(state.attempt(), 1);
        for _ in 1..MAX_ATTEMPTS {
            assert!(!state.is_last());
            state.advance();
        }
        assert_eq!(state.attempt(), MAX_ATTEMPTS);
        assert!(state.is_last());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_success() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let source = scripted_source(vec![Ok(fragments(&["Hello", "World"]))], calls.clone());

        let text = orchestrator(source)
            .fetch_with_retry("abc123", &[])
            .await
            .unwrap();

        assert_eq!(text, "Hello\nWorld");
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocked_until_exhausted() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let script = (0..MAX_ATTEMPTS)
            .map(|_| Err(SourceError::RequestBlocked("recaptcha".to_string())))
            .collect();
        let source = scripted_source(script, calls.clone());

        let err = orchestrator(source)
            .fetch_with_retry("blocked1", &[])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Exhausted);
        assert_eq!(
            err,
            TranscriptError::Exhausted {
                video_id: "blocked1".to_string(),
                attempts: 10,
            }
        );
        assert!(err.to_string().contains("10 attempts"));

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 10);
        // No sleep after the final attempt: nine backoffs between ten attempts
        assert_eq!(gaps(&calls).len(), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_stops_immediately() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let source = scripted_source(vec![Err(SourceError::TranscriptsDisabled)], calls.clone());

        let started = Instant::now();
        let err = orchestrator(source)
            .fetch_with_retry("nocaps", &[])
            .await
            .unwrap_err();

        assert_eq!(
            err,
            TranscriptError::CaptionsDisabled {
                video_id: "nocaps".to_string()
            }
        );
        assert_eq!(calls.lock().unwrap().len(), 1);
        assert_eq!(Instant::now() - started, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_after_retries_does_not_consume_budget() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let source = scripted_source(
            vec![
                Err(rate_limited()),
                Err(SourceError::AgeRestricted("Sign in to confirm your age".to_string())),
            ],
            calls.clone(),
        );

        let err = orchestrator(source)
            .fetch_with_retry("adult", &[])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::FatalContent);
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_then_success() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let source = scripted_source(
            vec![
                Err(rate_limited()),
                Err(rate_limited()),
                Err(rate_limited()),
                Ok(fragments(&["Finally"])),
            ],
            calls.clone(),
        );

        let text = orchestrator(source)
            .fetch_with_retry("slow", &["en".to_string()])
            .await
            .unwrap();
        assert_eq!(text, "Finally");

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 4);

        let gaps = gaps(&calls);
        for (gap, base_secs) in gaps.iter().zip([1u64, 2, 4]) {
            let base = Duration::from_secs(base_secs);
            assert!(
                *gap >= base && *gap <= base + Duration::from_secs(1),
                "gap {:?} outside [{:?}, {:?}]",
                gap,
                base,
                base + Duration::from_secs(1)
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unclassified_error_keeps_message() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let source = scripted_source(
            vec![Err(SourceError::VideoUnavailable("Video unavailable".to_string()))],
            calls.clone(),
        );

        let err = orchestrator(source)
            .fetch_with_retry("gone", &[])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Unclassified);
        assert!(err.to_string().contains("Video unavailable"));
        assert_eq!(calls.lock().unwrap().len(), 1);
    }
}
