//! Parsing of the platform's watch page, player response and timed-text XML

use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::OnceLock;

use super::{CaptionFragment, SourceError};

const RECAPTCHA_MARKER: &str = "class=\"g-recaptcha\"";

fn api_key_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#""INNERTUBE_API_KEY":\s*"([a-zA-Z0-9_-]+)""#).expect("valid api key regex")
    })
}

fn text_element_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<text\s+([^>]*?)(?:/>|>(.*?)</text>)"#).expect("valid text element regex")
    })
}

fn attribute_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(\w+)="([^"]*)""#).expect("valid attribute regex"))
}

fn markup_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("valid markup regex"))
}

/// Whether the page is a bot-check interstitial
pub fn is_recaptcha_page(html: &str) -> bool {
    html.contains(RECAPTCHA_MARKER)
}

/// Pull the player API key out of a watch page
pub fn extract_api_key(html: &str) -> Result<String, SourceError> {
    if let Some(captures) = api_key_regex().captures(html) {
        return Ok(captures[1].to_string());
    }

    if is_recaptcha_page(html) {
        Err(SourceError::RequestBlocked(
            "watch page returned a reCAPTCHA challenge".to_string(),
        ))
    } else {
        Err(SourceError::Other(
            "could not find the player API key in the watch page".to_string(),
        ))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerResponse {
    #[serde(default)]
    pub playability_status: Option<PlayabilityStatus>,
    #[serde(default)]
    pub captions: Option<Captions>,
}

#[derive(Debug, Deserialize)]
pub struct PlayabilityStatus {
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Captions {
    #[serde(rename = "playerCaptionsTracklistRenderer")]
    pub tracklist: Option<CaptionTracklist>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionTracklist {
    #[serde(default)]
    pub caption_tracks: Vec<CaptionTrack>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionTrack {
    pub base_url: String,
    pub language_code: String,
    /// "asr" for auto-generated tracks
    #[serde(default)]
    pub kind: Option<String>,
}

impl CaptionTrack {
    pub fn is_generated(&self) -> bool {
        self.kind.as_deref() == Some("asr")
    }

    /// Timed-text URL in the classic XML format
    pub fn xml_url(&self) -> String {
        self.base_url.replace("&fmt=srv3", "")
    }
}

/// Check playability and return the caption tracks of a player response
pub fn caption_tracks(response: PlayerResponse) -> Result<Vec<CaptionTrack>, SourceError> {
    if let Some(status) = &response.playability_status {
        check_playability(status)?;
    }

    let tracks = response
        .captions
        .and_then(|captions| captions.tracklist)
        .map(|tracklist| tracklist.caption_tracks)
        .unwrap_or_default();

    if tracks.is_empty() {
        return Err(SourceError::TranscriptsDisabled);
    }

    Ok(tracks)
}

fn check_playability(status: &PlayabilityStatus) -> Result<(), SourceError> {
    if status.status == "OK" {
        return Ok(());
    }

    let reason = status.reason.clone().unwrap_or_default();
    let lowered = reason.to_lowercase();

    if status.status == "LOGIN_REQUIRED" {
        if lowered.contains("not a bot") {
            return Err(SourceError::RequestBlocked(reason));
        }
        if lowered.contains("confirm your age")
            || lowered.contains("age-restricted")
            || lowered.contains("inappropriate")
        {
            return Err(SourceError::AgeRestricted(reason));
        }
    }

    Err(SourceError::VideoUnavailable(if reason.is_empty() {
        status.status.clone()
    } else {
        reason
    }))
}

/// Pick the track for the first requested language that exists, manual tracks before generated ones
pub fn select_track<'a>(
    tracks: &'a [CaptionTrack],
    languages: &[String],
) -> Result<&'a CaptionTrack, SourceError> {
    for language in languages {
        let matching = tracks
            .iter()
            .filter(|track| track.language_code.eq_ignore_ascii_case(language));

        let mut generated = None;
        for track in matching {
            if !track.is_generated() {
                return Ok(track);
            }
            generated.get_or_insert(track);
        }

        if let Some(track) = generated {
            return Ok(track);
        }
    }

    let mut seen = HashSet::new();
    let available: Vec<String> = tracks
        .iter()
        .filter(|t| seen.insert(t.language_code.as_str()))
        .map(|t| t.language_code.clone())
        .collect();

    Err(SourceError::NoTranscriptFound {
        requested: languages.to_vec(),
        available,
    })
}

/// Parse `<text start=".." dur="..">..</text>` elements, dropping fragments with no text
pub fn parse_timed_text(xml: &str) -> Result<Vec<CaptionFragment>, SourceError> {
    if !xml.contains("<transcript") && !xml.contains("<text") {
        return Err(SourceError::Other(
            "timed-text response is not a transcript document".to_string(),
        ));
    }

    let mut fragments = Vec::new();
    for element in text_element_regex().captures_iter(xml) {
        let attributes = &element[1];
        let body = element.get(2).map(|m| m.as_str()).unwrap_or_default();

        let text = clean_text(body);
        if text.is_empty() {
            continue;
        }

        let mut start = 0.0;
        let mut duration = 0.0;
        for attribute in attribute_regex().captures_iter(attributes) {
            match &attribute[1] {
                "start" => start = attribute[2].parse().unwrap_or(0.0),
                "dur" => duration = attribute[2].parse().unwrap_or(0.0),
                _ => {}
            }
        }

        fragments.push(CaptionFragment {
            text,
            start,
            duration,
        });
    }

    Ok(fragments)
}

// Entities are double-encoded in practice ("&amp;#39;"), so unescape before and after stripping markup.
fn clean_text(raw: &str) -> String {
    let unescaped = unescape_entities(raw);
    let stripped = markup_regex().replace_all(&unescaped, "");
    unescape_entities(&stripped).trim().to_string()
}

/// Decode the named and numeric HTML entities that appear in caption text
pub fn unescape_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];

        let decoded = tail.find(';').filter(|&end| end <= 10).and_then(|end| {
            let entity = &tail[1..end];
            decode_entity(entity).map(|c| (c, end + 1))
        });

        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let code = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                entity.strip_prefix('#')?.parse().ok()?
            };
            char::from_u32(code)
        }
    }
}
