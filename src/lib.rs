//! TubeChat Transcript API - caption tracks as plain text, fetched through rotating proxies
//!
//! The platform rate-limits scripted access aggressively, so every fetch goes out through a
//! randomly selected egress proxy and rate-limit/block responses are retried with exponential
//! backoff. Content-level failures (captions disabled, missing language, age restriction) are
//! surfaced immediately.

pub mod cli;
pub mod config;
pub mod output;
pub mod proxy;
pub mod retry;
pub mod server;
pub mod transcript;
pub mod utils;

pub use cli::{Cli, Commands, OutputFormat};
pub use config::Config;
pub use proxy::{ProxyCredentials, ProxyEndpoint, ProxyMode, ProxyRoute, ProxyStrategy};
pub use retry::{RetryOrchestrator, RetryPolicy};
pub use transcript::{FetchClient, FetchOutcome, FetchRequest, TranscriptSource};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Broad category of a terminal transcript failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A property of the video itself; retrying cannot help
    FatalContent,
    /// Every attempt was rate-limited or blocked
    Exhausted,
    /// Anything the classifier did not recognise
    Unclassified,
}

/// Terminal errors surfaced to callers of the retry orchestrator
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TranscriptError {
    #[error("Captions are disabled for video {video_id}")]
    CaptionsDisabled { video_id: String },

    #[error("No transcript for video {video_id} in any of the requested languages [{}]", .languages.join(", "))]
    NoTranscriptInLanguages {
        video_id: String,
        languages: Vec<String>,
    },

    #[error("Video {video_id} is age-restricted and requires authentication")]
    AgeRestricted { video_id: String },

    #[error(
        "Failed to fetch transcript for video_id={video_id:?} after {attempts} attempts. \
         All proxies appear to be rate-limited or blocked."
    )]
    Exhausted { video_id: String, attempts: u32 },

    #[error("Transcript fetch failed for video {video_id}: {detail}")]
    Unclassified { video_id: String, detail: String },
}

impl TranscriptError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TranscriptError::CaptionsDisabled { .. }
            | TranscriptError::NoTranscriptInLanguages { .. }
            | TranscriptError::AgeRestricted { .. } => ErrorKind::FatalContent,
            TranscriptError::Exhausted { .. } => ErrorKind::Exhausted,
            TranscriptError::Unclassified { .. } => ErrorKind::Unclassified,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_message_mentions_attempts() {
        let err = TranscriptError::Exhausted {
            video_id: "blocked1".to_string(),
            attempts: 10,
        };
        let msg = err.to_string();
        assert!(msg.contains("after 10 attempts"));
        assert!(msg.contains("\"blocked1\""));
        assert_eq!(err.kind(), ErrorKind::Exhausted);
    }

    #[test]
    fn test_error_kinds() {
        let disabled = TranscriptError::CaptionsDisabled {
            video_id: "nocaps".to_string(),
        };
        let missing = TranscriptError::NoTranscriptInLanguages {
            video_id: "x".to_string(),
            languages: vec!["de".to_string(), "fr".to_string()],
        };
        let other = TranscriptError::Unclassified {
            video_id: "x".to_string(),
            detail: "boom".to_string(),
        };

        assert_eq!(disabled.kind(), ErrorKind::FatalContent);
        assert_eq!(missing.kind(), ErrorKind::FatalContent);
        assert!(missing.to_string().contains("[de, fr]"));
        assert_eq!(other.kind(), ErrorKind::Unclassified);
        assert!(other.to_string().ends_with("boom"));
    }
}
