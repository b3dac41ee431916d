use anyhow::{Result, anyhow, bail};
use log::{debug, info};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::config::SourceConfig;
use crate::identifiers::{candidate_identifiers, is_channel_id};
use crate::transport::{Transport, fetch_with_fallback};

/// Payload fields that may carry the channel id, in priority order.
const CHANNEL_ID_FIELDS: &[&str] = &["id", "channelId", "channelID", "uploaderId", "authorId"];

static CHANNEL_PAGE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#""channelId":"(?P<id>UC[A-Za-z0-9_-]{22})""#,
        r#""externalId":"(?P<id>UC[A-Za-z0-9_-]{22})""#,
        r#"<meta property="og:url" content="https://www\.youtube\.com/channel/(?P<id>UC[A-Za-z0-9_-]{22})""#,
        r#"<link rel="canonical" href="https://www\.youtube\.com/channel/(?P<id>UC[A-Za-z0-9_-]{22})""#,
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect()
});

/// Result of channel resolution. When the id came from a directory lookup,
/// that payload is kept so the feed step can reuse it without refetching.
#[derive(Debug, Clone)]
pub struct ResolvedChannel {
    pub id: String,
    pub directory_payload: Option<Value>,
}

pub fn resolve_channel(
    transport: &(impl Transport + ?Sized),
    sources: &SourceConfig,
    explicit_id: Option<&str>,
    handle: Option<&str>,
) -> Result<ResolvedChannel> {
    if let Some(id) = explicit_id.map(str::trim).filter(|id| !id.is_empty()) {
        debug!("Using configured channel id {id}");
        return Ok(ResolvedChannel {
            id: id.to_string(),
            directory_payload: None,
        });
    }

    let handle = handle.unwrap_or_default();
    let candidates = candidate_identifiers(handle);
    if candidates.is_empty() {
        bail!("Set a channel id or channel handle on the latest videos section");
    }

    for candidate in &candidates {
        match lookup_directory(transport, sources, candidate) {
            Ok(payload) => {
                if let Some(id) = channel_id_from_payload(&payload) {
                    info!("Resolved {candidate} to {id} via directory lookup");
                    return Ok(ResolvedChannel {
                        id,
                        directory_payload: Some(payload),
                    });
                }
                debug!("Directory payload for {candidate} has no channel identifier");
            }
            Err(err) => debug!("Directory lookup for {candidate} failed: {err:#}"),
        }

        match scrape_channel_page(transport, sources, candidate) {
            Ok(id) => {
                info!("Resolved {candidate} to {id} from the channel page");
                return Ok(ResolvedChannel {
                    id,
                    directory_payload: None,
                });
            }
            Err(err) => debug!("Channel page lookup for {candidate} failed: {err:#}"),
        }
    }

    Err(anyhow!(
        "Channel could not be resolved from handle '{}' ({} candidates tried)",
        handle.trim(),
        candidates.len()
    ))
}

pub fn lookup_directory(
    transport: &(impl Transport + ?Sized),
    sources: &SourceConfig,
    identifier: &str,
) -> Result<Value> {
    let mut failures = Vec::new();

    for mirror in &sources.mirrors {
        let url = mirror.url_for(identifier);
        match fetch_with_fallback(transport, &sources.proxies, &url, parse_directory_payload) {
            Ok(payload) => return Ok(payload),
            Err(err) => {
                debug!("Directory mirror {} failed for {identifier}", mirror.template);
                failures.push(format!("{err:#}"));
            }
        }
    }

    if failures.is_empty() {
        bail!("No directory mirrors configured");
    }
    bail!("Every directory mirror failed: {}", failures.join(" | "))
}

pub fn parse_directory_payload(body: String) -> Result<Value> {
    let value: Value = serde_json::from_str(&body)
        .map_err(|err| anyhow!("Directory response was not valid JSON: {err}"))?;

    if !value.is_object() {
        bail!("Directory response was not a JSON object");
    }

    if let Some(error) = value.get("error").filter(|error| !error.is_null()) {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let error = error.as_str().map(String::from).unwrap_or_else(|| error.to_string());
        bail!("Directory API error: {error} {message}");
    }

    Ok(value)
}

pub fn channel_id_from_payload(payload: &Value) -> Option<String> {
    CHANNEL_ID_FIELDS
        .iter()
        .filter_map(|field| payload.get(*field).and_then(Value::as_str))
        .map(str::trim)
        .find(|id| !id.is_empty())
        .map(String::from)
}

fn scrape_channel_page(
    transport: &(impl Transport + ?Sized),
    sources: &SourceConfig,
    candidate: &str,
) -> Result<String> {
    let url = channel_page_url(candidate);
    fetch_with_fallback(transport, &sources.proxies, &url, |body| {
        scrape_channel_id(&body).ok_or_else(|| anyhow!("No channel id found in page"))
    })
}

pub fn channel_page_url(candidate: &str) -> String {
    if let Some(bare) = candidate.strip_prefix('@') {
        format!("https://www.youtube.com/@{}", urlencoding::encode(bare))
    } else if is_channel_id(candidate) {
        format!("https://www.youtube.com/channel/{candidate}")
    } else {
        format!("https://www.youtube.com/c/{}", urlencoding::encode(candidate))
    }
}

pub fn scrape_channel_id(body: &str) -> Option<String> {
    CHANNEL_PAGE_PATTERNS.iter().find_map(|re| {
        re.captures(body)
            .and_then(|caps| caps.name("id"))
            .map(|m| m.as_str().to_string())
    })
}
