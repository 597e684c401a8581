use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod parse;
pub mod youtube;

use crate::proxy::{ProxyRoute, ProxyStrategy};
use crate::TranscriptError;

/// Language requested when the caller does not specify one
pub const DEFAULT_LANGUAGE: &str = "en";

/// One transcript lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub video_id: String,

    /// Preferred languages, highest priority first
    pub languages: Vec<String>,
}

impl FetchRequest {
    pub fn new(video_id: impl Into<String>, languages: &[String]) -> Self {
        let languages = if languages.is_empty() {
            vec![DEFAULT_LANGUAGE.to_string()]
        } else {
            languages.to_vec()
        };

        Self {
            video_id: video_id.into(),
            languages,
        }
    }
}

/// A single timed unit of caption text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionFragment {
    pub text: String,

    /// Start time in seconds
    pub start: f64,

    /// Duration in seconds
    pub duration: f64,
}

/// Errors reported by a transcript source, before classification
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Request blocked by the platform: {0}")]
    RequestBlocked(String),

    #[error("Request to the platform failed: {message}")]
    RequestFailed {
        /// HTTP status when the transport saw one
        status: Option<u16>,
        message: String,
    },

    #[error("Transcripts are disabled for this video")]
    TranscriptsDisabled,

    #[error("No transcript found for languages [{}], available: [{}]", .requested.join(", "), .available.join(", "))]
    NoTranscriptFound {
        requested: Vec<String>,
        available: Vec<String>,
    },

    #[error("Video is age-restricted: {0}")]
    AgeRestricted(String),

    #[error("Video is unavailable: {0}")]
    VideoUnavailable(String),

    #[error("{0}")]
    Other(String),
}

/// Reasons a failure is worth another attempt through a different proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryableReason {
    RateLimited,
    Blocked,
}

/// Reasons a failure is final regardless of the network path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FatalReason {
    CaptionsDisabled,
    NoTranscriptInLanguages,
    AgeRestricted,
    Other,
}

/// Classified result of one fetch attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success { text: String },
    RetryableFailure { reason: RetryableReason },
    FatalFailure { reason: FatalReason, detail: String },
}

impl FetchOutcome {
    /// Map a source error onto the retry taxonomy
    pub fn classify(error: &SourceError) -> Self {
        match error {
            SourceError::RequestBlocked(_) => FetchOutcome::RetryableFailure {
                reason: RetryableReason::Blocked,
            },
            SourceError::RequestFailed { status, message } if is_rate_limited(*status, message) => {
                FetchOutcome::RetryableFailure {
                    reason: RetryableReason::RateLimited,
                }
            }
            SourceError::TranscriptsDisabled => FetchOutcome::FatalFailure {
                reason: FatalReason::CaptionsDisabled,
                detail: error.to_string(),
            },
            SourceError::NoTranscriptFound { .. } => FetchOutcome::FatalFailure {
                reason: FatalReason::NoTranscriptInLanguages,
                detail: error.to_string(),
            },
            SourceError::AgeRestricted(_) => FetchOutcome::FatalFailure {
                reason: FatalReason::AgeRestricted,
                detail: error.to_string(),
            },
            _ => FetchOutcome::FatalFailure {
                reason: FatalReason::Other,
                detail: error.to_string(),
            },
        }
    }
}

impl FatalReason {
    /// Terminal error for `request`; `detail` is only kept for unclassified failures
    pub fn into_error(self, detail: String, request: &FetchRequest) -> TranscriptError {
        let video_id = request.video_id.clone();
        match self {
            FatalReason::CaptionsDisabled => TranscriptError::CaptionsDisabled { video_id },
            FatalReason::NoTranscriptInLanguages => TranscriptError::NoTranscriptInLanguages {
                video_id,
                languages: request.languages.clone(),
            },
            FatalReason::AgeRestricted => TranscriptError::AgeRestricted { video_id },
            FatalReason::Other => TranscriptError::Unclassified { video_id, detail },
        }
    }
}

/// Rate limiting is read from the HTTP status when the transport exposes one.
/// Without a status (proxy tunnel failures and the like) the message is searched for "429".
fn is_rate_limited(status: Option<u16>, message: &str) -> bool {
    match status {
        Some(code) => code == 429,
        None => message.contains("429"),
    }
}

/// Join fragment texts in temporal order, one per line
pub fn join_fragments(fragments: &[CaptionFragment]) -> String {
    fragments
        .iter()
        .map(|fragment| fragment.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Platform transcript retrieval, performed through an optional proxy
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    /// Fetch the caption fragments for the first available language of `request.languages`
    async fn fetch_fragments(
        &self,
        request: &FetchRequest,
        proxy: Option<ProxyRoute>,
    ) -> Result<Vec<CaptionFragment>, SourceError>;

    /// Name of this source, for logs
    fn source_name(&self) -> &'static str;
}

/// Issues single transcript fetch attempts, each through a freshly selected proxy
pub struct FetchClient {
    strategy: Arc<ProxyStrategy>,
    source: Arc<dyn TranscriptSource>,
}

impl FetchClient {
    pub fn new(strategy: Arc<ProxyStrategy>, source: Arc<dyn TranscriptSource>) -> Self {
        Self { strategy, source }
    }

    pub fn strategy(&self) -> &ProxyStrategy {
        &self.strategy
    }

    /// One attempt: select a proxy, fetch, classify. Never retries.
    pub async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
        let route = self.strategy.select(&mut rand::thread_rng());

        match &route {
            Some(route) => tracing::debug!(
                video_id = %request.video_id,
                proxy = %route,
                source = self.source.source_name(),
                "Fetching transcript through proxy"
            ),
            None => tracing::debug!(
                video_id = %request.video_id,
                source = self.source.source_name(),
                "Fetching transcript without proxy"
            ),
        }

        match self.source.fetch_fragments(request, route).await {
            Ok(fragments) => FetchOutcome::Success {
                text: join_fragments(&fragments),
            },
            Err(error) => {
                let outcome = FetchOutcome::classify(&error);
                tracing::debug!(video_id = %request.video_id, error = %error, ?outcome, "Fetch attempt failed");
                outcome
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::{ProxyCredentials, ProxyEndpoint, ProxyMode};

    fn fragment(text: &str, start: f64) -> CaptionFragment {
        CaptionFragment {
            text: text.to_string(),
            start,
            duration: 1.0,
        }
    }

    fn request(video_id: &str) -> FetchRequest {
        FetchRequest::new(video_id, &[])
    }

    #[test]
    fn test_request_defaults_to_english() {
        assert_eq!(request("abc123").languages, vec!["en".to_string()]);

        let custom = FetchRequest::new("abc123", &["de".to_string(), "en".to_string()]);
        assert_eq!(custom.languages, vec!["de", "en"]);
    }

    #[test]
    fn test_classify_retryable() {
        assert_eq!(
            FetchOutcome::classify(&SourceError::RequestBlocked("recaptcha".into())),
            FetchOutcome::RetryableFailure {
                reason: RetryableReason::Blocked
            }
        );
        assert_eq!(
            FetchOutcome::classify(&SourceError::RequestFailed {
                status: Some(429),
                message: "Too Many Requests".into(),
            }),
            FetchOutcome::RetryableFailure {
                reason: RetryableReason::RateLimited
            }
        );
        assert_eq!(
            FetchOutcome::classify(&SourceError::RequestFailed {
                status: None,
                message: "proxy tunnel answered 429".into(),
            }),
            FetchOutcome::RetryableFailure {
                reason: RetryableReason::RateLimited
            }
        );
    }

    #[test]
    fn test_classify_structured_status_wins_over_message() {
        let outcome = FetchOutcome::classify(&SourceError::RequestFailed {
            status: Some(500),
            message: "request id 4291 failed".into(),
        });
        assert!(matches!(
            outcome,
            FetchOutcome::FatalFailure {
                reason: FatalReason::Other,
                ..
            }
        ));
    }

    #[test]
    fn test_classify_fatal() {
        let cases = [
            (SourceError::TranscriptsDisabled, FatalReason::CaptionsDisabled),
            (
                SourceError::NoTranscriptFound {
                    requested: vec!["en".into()],
                    available: vec!["fr".into()],
                },
                FatalReason::NoTranscriptInLanguages,
            ),
            (
                SourceError::AgeRestricted("Sign in to confirm your age".into()),
                FatalReason::AgeRestricted,
            ),
            (SourceError::VideoUnavailable("gone".into()), FatalReason::Other),
            (SourceError::Other("bad xml".into()), FatalReason::Other),
        ];

        for (error, expected) in cases {
            match FetchOutcome::classify(&error) {
                FetchOutcome::FatalFailure { reason, detail } => {
                    assert_eq!(reason, expected);
                    assert_eq!(detail, error.to_string());
                }
                other => panic!("expected fatal outcome, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_into_error() {
        let req = FetchRequest::new("vid", &["de".to_string()]);

        assert_eq!(
            FatalReason::NoTranscriptInLanguages.into_error(String::new(), &req),
            TranscriptError::NoTranscriptInLanguages {
                video_id: "vid".into(),
                languages: vec!["de".into()],
            }
        );
        assert_eq!(
            FatalReason::CaptionsDisabled.into_error("ignored".into(), &req),
            TranscriptError::CaptionsDisabled {
                video_id: "vid".into()
            }
        );
        assert_eq!(
            FatalReason::Other.into_error("boom".into(), &req),
            TranscriptError::Unclassified {
                video_id: "vid".into(),
                detail: "boom".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_fetch_joins_fragments_in_order() {
        let mut source = MockTranscriptSource::new();
        source.expect_source_name().return_const("mock");
        source
            .expect_fetch_fragments()
            .withf(|req, proxy| req.video_id == "abc123" && proxy.is_none())
            .times(1)
            .returning(|_, _| Ok(vec![fragment("Hello", 0.0), fragment("World", 1.5)]));

        let client = FetchClient::new(Arc::new(ProxyStrategy::Direct), Arc::new(source));
        let outcome = client.fetch(&request("abc123")).await;

        assert_eq!(
            outcome,
            FetchOutcome::Success {
                text: "Hello\nWorld".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_fetch_routes_through_pool_proxy() {
        let pool = vec![
            ProxyEndpoint::new("10.0.0.1", 1000),
            ProxyEndpoint::new("10.0.0.2", 2000),
        ];
        let strategy = ProxyStrategy::resolve(
            ProxyMode::Static,
            Some(ProxyCredentials::new("user", "pass")),
            pool.clone(),
        );

        let mut source = MockTranscriptSource::new();
        source.expect_source_name().return_const("mock");
        source
            .expect_fetch_fragments()
            .withf(move |_, proxy| {
                proxy
                    .as_ref()
                    .map(|route| pool.contains(&route.endpoint) && route.credentials.username == "user")
                    .unwrap_or(false)
            })
            .times(5)
            .returning(|_, _| Err(SourceError::TranscriptsDisabled));

        let client = FetchClient::new(Arc::new(strategy), Arc::new(source));
        for _ in 0..5 {
            let outcome = client.fetch(&request("nocaps")).await;
            assert!(matches!(
                outcome,
                FetchOutcome::FatalFailure {
                    reason: FatalReason::CaptionsDisabled,
                    ..
                }
            ));
        }
    }

    #[test]
    fn test_join_fragments_empty() {
        assert_eq!(join_fragments(&[]), "");
    }
}
