use async_trait::async_trait;
use reqwest::{Client, Proxy, StatusCode};
use serde_json::json;
use std::time::Duration;

use super::parse::{self, PlayerResponse};
use super::{CaptionFragment, FetchRequest, SourceError, TranscriptSource};
use crate::proxy::ProxyRoute;

pub const DEFAULT_BASE_URL: &str = "https://www.youtube.com";

const ANDROID_CLIENT_NAME: &str = "ANDROID";
const ANDROID_CLIENT_VERSION: &str = "20.10.38";

/// YouTube caption retrieval over HTTP: watch page, player API, then the timed-text track
pub struct YoutubeSource {
    base_url: String,
    attempt_timeout: Duration,
}

impl YoutubeSource {
    pub fn new(attempt_timeout: Duration) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, attempt_timeout)
    }

    /// Point the source at a different host (used against a local fake in tests)
    pub fn with_base_url(base_url: impl Into<String>, attempt_timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            attempt_timeout,
        }
    }

    /// Build a client bound to one proxy. A new client per attempt keeps connections from
    /// being pooled across proxies.
    fn build_client(&self, proxy: Option<&ProxyRoute>) -> Result<Client, SourceError> {
        let mut builder = Client::builder()
            .timeout(self.attempt_timeout)
            .default_headers(default_headers());

        if let Some(route) = proxy {
            let proxy = Proxy::all(route.url())
                .map_err(|e| SourceError::Other(format!("Invalid proxy {}: {}", route, e)))?
                .basic_auth(&route.credentials.username, &route.credentials.password);
            builder = builder.proxy(proxy);
        }

        builder
            .build()
            .map_err(|e| SourceError::Other(format!("Failed to build HTTP client: {}", e)))
    }

    async fn fetch_watch_page(&self, client: &Client, video_id: &str) -> Result<String, SourceError> {
        let url = format!("{}/watch", self.base_url);
        let response = client
            .get(&url)
            .query(&[("v", video_id)])
            .send()
            .await
            .map_err(transport_error)?;

        let html = read_body(response).await?;

        // Consent interstitials set a cookie and bounce; retrying once with it accepted is enough.
        if html.contains("action=\"https://consent.youtube.com/s\"") {
            let response = client
                .get(&url)
                .query(&[("v", video_id)])
                .header(reqwest::header::COOKIE, "CONSENT=YES+cb")
                .send()
                .await
                .map_err(transport_error)?;
            return read_body(response).await;
        }

        Ok(html)
    }

    async fn fetch_player_response(
        &self,
        client: &Client,
        video_id: &str,
        api_key: &str,
    ) -> Result<PlayerResponse, SourceError> {
        let url = format!("{}/youtubei/v1/player", self.base_url);
        let body = json!({
            "context": {
                "client": {
                    "clientName": ANDROID_CLIENT_NAME,
                    "clientVersion": ANDROID_CLIENT_VERSION,
                }
            },
            "videoId": video_id,
        });

        let response = client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let text = read_body(response).await?;
        serde_json::from_str(&text)
            .map_err(|e| SourceError::Other(format!("Invalid player response: {}", e)))
    }

    async fn fetch_track(
        &self,
        client: &Client,
        track: &parse::CaptionTrack,
    ) -> Result<Vec<CaptionFragment>, SourceError> {
        let response = client
            .get(track.xml_url())
            .send()
            .await
            .map_err(transport_error)?;

        let xml = read_body(response).await?;
        parse::parse_timed_text(&xml)
    }
}

#[async_trait]
impl TranscriptSource for YoutubeSource {
    async fn fetch_fragments(
        &self,
        request: &FetchRequest,
        proxy: Option<ProxyRoute>,
    ) -> Result<Vec<CaptionFragment>, SourceError> {
        let client = self.build_client(proxy.as_ref())?;

        let html = self.fetch_watch_page(&client, &request.video_id).await?;
        let api_key = parse::extract_api_key(&html)?;

        let player = self
            .fetch_player_response(&client, &request.video_id, &api_key)
            .await?;
        let tracks = parse::caption_tracks(player)?;
        let track = parse::select_track(&tracks, &request.languages)?;

        tracing::debug!(
            video_id = %request.video_id,
            language = %track.language_code,
            generated = track.is_generated(),
            "Selected caption track"
        );

        self.fetch_track(&client, track).await
    }

    fn source_name(&self) -> &'static str {
        "youtube"
    }
}

fn default_headers() -> reqwest::header::HeaderMap {
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        reqwest::header::ACCEPT_LANGUAGE,
        reqwest::header::HeaderValue::from_static("en-US"),
    );
    headers
}

/// Read a response body, turning error statuses into `RequestFailed` with the status attached
async fn read_body(response: reqwest::Response) -> Result<String, SourceError> {
    let status = response.status();
    if !status.is_success() {
        return Err(status_error(status));
    }
    response.text().await.map_err(transport_error)
}

fn status_error(status: StatusCode) -> SourceError {
    SourceError::RequestFailed {
        status: Some(status.as_u16()),
        message: format!("HTTP {}", status),
    }
}

fn transport_error(error: reqwest::Error) -> SourceError {
    SourceError::RequestFailed {
        status: error.status().map(|s| s.as_u16()),
        message: error.to_string(),
    }
}
