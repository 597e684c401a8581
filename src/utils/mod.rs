use url::Url;

/// Turn a watch/short/embed URL into its video ID; anything that is not a URL is returned trimmed
pub fn extract_video_id(input: &str) -> crate::Result<String> {
    let input = input.trim();
    if input.is_empty() {
        anyhow::bail!("Video ID must not be empty");
    }

    if !input.starts_with("http://") && !input.starts_with("https://") {
        return Ok(input.to_string());
    }

    let parsed = Url::parse(input)
        .map_err(|_| anyhow::anyhow!("Invalid URL format: {}", input))?;

    let host = parsed
        .host_str()
        .map(|h| h.trim_start_matches("www.").trim_start_matches("m."))
        .unwrap_or_default();

    let id = match host {
        "youtu.be" => parsed
            .path_segments()
            .and_then(|mut segments| segments.next())
            .map(str::to_string),
        "youtube.com" | "music.youtube.com" => {
            if parsed.path() == "/watch" {
                parsed
                    .query_pairs()
                    .find(|(key, _)| key == "v")
                    .map(|(_, value)| value.into_owned())
            } else {
                let mut segments = parsed.path_segments().into_iter().flatten();
                match segments.next() {
                    Some("embed") | Some("v") | Some("shorts") | Some("live") => {
                        segments.next().map(str::to_string)
                    }
                    _ => None,
                }
            }
        }
        _ => anyhow::bail!("Not a YouTube URL: {}", input),
    };

    id.filter(|id| !id.is_empty())
        .ok_or_else(|| anyhow::anyhow!("Could not find a video ID in {}", input))
}
