use anyhow::{Result, anyhow};
use log::{debug, info, warn};

use crate::config::SourceConfig;
use crate::format::Formatter;
use crate::identifiers::candidates_for;
use crate::parse::{CanonicalVideo, NormalizeContext, directory_items, normalize_all, parse_upload_feed};
use crate::resolver::{ResolvedChannel, parse_directory_payload};
use crate::transport::{Transport, fetch_with_fallback};

pub fn upload_feed_url(channel_id: &str) -> String {
    format!(
        "https://www.youtube.com/feeds/videos.xml?channel_id={}",
        urlencoding::encode(channel_id)
    )
}

// Upload feed, then the payload kept from resolution, then each mirror by id
// and handle. First source with records wins. Ok(empty) if anything answered.
pub fn fetch_videos(
    transport: &(impl Transport + ?Sized),
    sources: &SourceConfig,
    channel: &ResolvedChannel,
    handle: Option<&str>,
    formatter: &Formatter,
) -> Result<Vec<CanonicalVideo>> {
    let ctx = NormalizeContext {
        channel_id: &channel.id,
        formatter,
    };
    let mut answered = false;
    let mut failures = Vec::new();

    let feed_url = upload_feed_url(&channel.id);
    match fetch_with_fallback(transport, &sources.proxies, &feed_url, |body| parse_upload_feed(&body)) {
        Ok(entries) => {
            answered = true;
            let videos = normalize_all(&entries, &ctx);
            if !videos.is_empty() {
                info!("Loaded {} videos from the upload feed", videos.len());
                return Ok(videos);
            }
            debug!("Upload feed for {} had no usable entries", channel.id);
        }
        Err(err) => {
            warn!("Upload feed unavailable for {}: {err:#}", channel.id);
            failures.push(format!("upload feed: {err:#}"));
        }
    }

    if let Some(payload) = &channel.directory_payload {
        answered = true;
        let videos = normalize_all(&directory_items(payload), &ctx);
        if !videos.is_empty() {
            info!("Loaded {} videos from the cached directory payload", videos.len());
            return Ok(videos);
        }
        debug!("Cached directory payload had no usable items");
    }

    let identifiers = candidates_for(&[channel.id.as_str(), handle.unwrap_or_default()]);

    for mirror in &sources.mirrors {
        for identifier in &identifiers {
            let url = mirror.url_for(identifier);
            match fetch_with_fallback(transport, &sources.proxies, &url, parse_directory_payload) {
                Ok(payload) => {
                    answered = true;
                    let videos = normalize_all(&directory_items(&payload), &ctx);
                    if !videos.is_empty() {
                        info!("Loaded {} videos from {}", videos.len(), mirror.template);
                        return Ok(videos);
                    }
                    debug!("{} answered for {identifier} without usable items", mirror.template);
                    break;
                }
                Err(err) => {
                    debug!("{} failed for {identifier}: {err:#}", mirror.template);
                    failures.push(format!("{url}: {err:#}"));
                }
            }
        }
    }

    if answered {
        info!("Every reachable source for {} was empty", channel.id);
        return Ok(Vec::new());
    }

    Err(anyhow!(
        "All video sources failed for {}: {}",
        channel.id,
        failures.join(" | ")
    ))
}
