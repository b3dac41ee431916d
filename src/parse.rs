use anyhow::{Context, Result, bail};
use log::debug;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use url::Url;

use crate::format::{self, Formatter};
use crate::identifiers::{
    channel_videos_url, is_video_id, thumbnail_url, video_id_from_url, watch_url,
};

const YOUTUBE_ORIGIN: &str = "https://www.youtube.com";
const UNTITLED_VIDEO: &str = "Untitled video";

/// Payload fields that may hold the item list. The first non-empty one wins.
const LIST_FIELDS: &[&str] = &["relatedStreams", "latestVideos", "videos", "items"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalVideo {
    pub id: String,
    pub title: String,
    pub url: String,
    pub thumbnail: String,
    pub published_at: String,
    pub display_text: String,
    pub duration: String,
}

impl CanonicalVideo {
    fn dedup_key(&self) -> &str {
        if self.id.is_empty() { &self.url } else { &self.id }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadEntry {
    pub video_id: String,
    pub title: String,
    pub link: String,
    pub thumbnail: String,
    pub published: String,
    pub updated: String,
}

/// One item from a directory API payload, with every alternative field
/// already collapsed to its first non-empty value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectoryItem {
    pub explicit_id: String,
    pub url: String,
    pub title: String,
    pub thumbnail: String,
    pub published: Value,
    pub published_text: String,
    pub duration: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawFeedEntry {
    Upload(UploadEntry),
    Directory(DirectoryItem),
}

pub struct NormalizeContext<'a> {
    pub channel_id: &'a str,
    pub formatter: &'a Formatter,
}

#[derive(Clone, Copy, PartialEq)]
enum Field {
    VideoId,
    Title,
    Published,
    Updated,
}

/// Parses an Atom upload feed. Malformed XML, or a document whose root is
/// not `<feed>`, is an error so the caller can try another source.
pub fn parse_upload_feed(xml: &str) -> Result<Vec<RawFeedEntry>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut entries = Vec::new();
    let mut saw_root = false;
    let mut current: Option<UploadEntry> = None;
    let mut field: Option<Field> = None;
    let mut depth = 0usize;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .with_context(|| format!("Malformed feed XML at byte {}", reader.buffer_position()))?;

        match event {
            Event::Start(ref e) => {
                depth += 1;
                if depth == 1 {
                    if e.name().as_ref() != b"feed" {
                        bail!("Document root is not an Atom feed");
                    }
                    saw_root = true;
                }
                on_element(e, &mut current, &mut field);
            }
            Event::Empty(ref e) => {
                if depth == 0 {
                    if e.name().as_ref() != b"feed" {
                        bail!("Document root is not an Atom feed");
                    }
                    saw_root = true;
                }
                on_element(e, &mut current, &mut None);
            }
            Event::Text(ref e) => {
                if let (Some(entry), Some(f)) = (current.as_mut(), field) {
                    let text = e.unescape().context("Invalid escape in feed text")?;
                    append_field(entry, f, &text);
                }
            }
            Event::CData(ref e) => {
                if let (Some(entry), Some(f)) = (current.as_mut(), field) {
                    append_field(entry, f, &String::from_utf8_lossy(e));
                }
            }
            Event::End(ref e) => {
                depth = depth.saturating_sub(1);
                field = None;
                if e.name().as_ref() == b"entry" {
                    if let Some(entry) = current.take() {
                        entries.push(RawFeedEntry::Upload(entry));
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !saw_root {
        bail!("Document does not contain an Atom feed");
    }

    Ok(entries)
}

fn on_element(e: &BytesStart<'_>, current: &mut Option<UploadEntry>, field: &mut Option<Field>) {
    let name = e.name();
    if name.as_ref() == b"entry" {
        *current = Some(UploadEntry::default());
        return;
    }

    let Some(entry) = current.as_mut() else {
        return;
    };

    *field = match name.as_ref() {
        b"yt:videoId" => Some(Field::VideoId),
        b"title" => Some(Field::Title),
        b"published" => Some(Field::Published),
        b"updated" => Some(Field::Updated),
        b"link" => {
            if entry.link.is_empty() && attribute(e, b"rel").is_none_or(|rel| rel == "alternate") {
                entry.link = attribute(e, b"href").unwrap_or_default();
            }
            None
        }
        b"media:thumbnail" | b"thumbnail" => {
            if entry.thumbnail.is_empty() {
                entry.thumbnail = attribute(e, b"url").unwrap_or_default();
            }
            None
        }
        _ => None,
    };
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .and_then(|attr| attr.unescape_value().ok())
        .map(|value| value.trim().to_string())
}

fn append_field(entry: &mut UploadEntry, field: Field, text: &str) {
    let target = match field {
        Field::VideoId => &mut entry.video_id,
        Field::Title => &mut entry.title,
        Field::Published => &mut entry.published,
        Field::Updated => &mut entry.updated,
    };
    target.push_str(text.trim());
}

pub fn directory_items(payload: &Value) -> Vec<RawFeedEntry> {
    let Some(list) = LIST_FIELDS
        .iter()
        .filter_map(|field| payload.get(*field).and_then(Value::as_array))
        .find(|list| !list.is_empty())
    else {
        return Vec::new();
    };

    list.iter()
        .filter(|item| item.is_object())
        .map(|item| RawFeedEntry::Directory(DirectoryItem::from_value(item)))
        .collect()
}

impl DirectoryItem {
    pub fn from_value(item: &Value) -> Self {
        DirectoryItem {
            explicit_id: first_str(item, &["videoId", "id"]),
            url: first_str(item, &["url", "watchUrl", "originUrl"]),
            title: first_str(item, &["title", "name"]),
            thumbnail: first_thumbnail(item),
            published: first_present(item, &["uploaded", "published", "publishedAt", "date"]),
            published_text: first_str(
                item,
                &["uploadedDate", "uploadedText", "publishedText", "publishedTimeText"],
            ),
            duration: first_present(item, &["duration", "lengthSeconds"]),
        }
    }
}

fn first_str(item: &Value, fields: &[&str]) -> String {
    fields
        .iter()
        .filter_map(|field| item.get(*field).and_then(Value::as_str))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .unwrap_or_default()
        .to_string()
}

fn first_present(item: &Value, fields: &[&str]) -> Value {
    fields
        .iter()
        .filter_map(|field| item.get(*field))
        .find(|value| match value {
            Value::Null => false,
            Value::String(text) => !text.trim().is_empty(),
            _ => true,
        })
        .cloned()
        .unwrap_or(Value::Null)
}

fn first_thumbnail(item: &Value) -> String {
    let direct = first_str(item, &["thumbnail", "thumbnailUrl"]);
    if is_absolute(&direct) {
        return direct;
    }

    ["thumbnails", "videoThumbnails"]
        .iter()
        .filter_map(|field| item.get(*field).and_then(Value::as_array))
        .flatten()
        .filter_map(|thumb| thumb.as_str().or_else(|| thumb.get("url").and_then(Value::as_str)))
        .find(|url| is_absolute(url))
        .unwrap_or_default()
        .to_string()
}

fn is_absolute(url: &str) -> bool {
    url.starts_with("https://") || url.starts_with("http://")
}

/// Builds the canonical record for one raw entry. Entries without a title,
/// or without both an id and a link, are dropped.
pub fn normalize(entry: &RawFeedEntry, ctx: &NormalizeContext<'_>) -> Option<CanonicalVideo> {
    let video = match entry {
        RawFeedEntry::Upload(upload) => normalize_upload(upload, ctx),
        RawFeedEntry::Directory(item) => normalize_directory(item, ctx),
    };

    if video.title.is_empty() || (video.id.is_empty() && video.url.is_empty()) {
        debug!("Dropping unusable entry: {entry:?}");
        return None;
    }

    Some(video)
}

fn normalize_upload(entry: &UploadEntry, ctx: &NormalizeContext<'_>) -> CanonicalVideo {
    let id = if is_video_id(&entry.video_id) {
        entry.video_id.clone()
    } else {
        video_id_from_url(&entry.link).unwrap_or_default()
    };

    let url = if is_absolute(&entry.link) {
        entry.link.clone()
    } else if !id.is_empty() {
        watch_url(&id)
    } else {
        channel_fallback(ctx.channel_id)
    };

    let thumbnail = if is_absolute(&entry.thumbnail) {
        entry.thumbnail.clone()
    } else if !id.is_empty() {
        thumbnail_url(&id)
    } else {
        String::new()
    };

    let title = if entry.title.is_empty() && !id.is_empty() {
        UNTITLED_VIDEO.to_string()
    } else {
        entry.title.clone()
    };

    let raw_published = if entry.published.is_empty() {
        &entry.updated
    } else {
        &entry.published
    };
    let instant = format::parse_timestamp_str(raw_published);

    CanonicalVideo {
        id,
        title,
        url,
        thumbnail,
        published_at: instant.map(format::iso_string).unwrap_or_default(),
        display_text: ctx.formatter.published_text(instant, raw_published),
        duration: String::new(),
    }
}

fn normalize_directory(item: &DirectoryItem, ctx: &NormalizeContext<'_>) -> CanonicalVideo {
    let id = if is_video_id(&item.explicit_id) {
        item.explicit_id.clone()
    } else {
        video_id_from_url(&item.url).unwrap_or_default()
    };

    let url = if is_absolute(&item.url) {
        item.url.clone()
    } else if let Some(resolved) = resolve_site_relative(&item.url) {
        resolved
    } else if !id.is_empty() {
        watch_url(&id)
    } else {
        String::new()
    };

    let thumbnail = if !item.thumbnail.is_empty() {
        item.thumbnail.clone()
    } else if !id.is_empty() {
        thumbnail_url(&id)
    } else {
        String::new()
    };

    let instant = format::parse_timestamp(&item.published);
    let source_text = if item.published_text.is_empty() {
        item.published
            .as_str()
            .filter(|text| !text.trim().chars().all(|c| c.is_ascii_digit()))
            .unwrap_or_default()
    } else {
        item.published_text.as_str()
    };

    CanonicalVideo {
        id,
        title: item.title.clone(),
        url,
        thumbnail,
        published_at: instant.map(format::iso_string).unwrap_or_default(),
        display_text: ctx.formatter.published_text(instant, source_text),
        duration: format::duration_from_value(&item.duration),
    }
}

// Rooted paths resolve against the site origin; `//host/...` keeps its host.
fn resolve_site_relative(link: &str) -> Option<String> {
    if !link.starts_with('/') {
        return None;
    }
    Url::parse(YOUTUBE_ORIGIN)
        .and_then(|origin| origin.join(link))
        .ok()
        .map(String::from)
}

fn channel_fallback(channel_id: &str) -> String {
    if channel_id.is_empty() {
        String::new()
    } else {
        channel_videos_url(channel_id)
    }
}

pub fn normalize_all(entries: &[RawFeedEntry], ctx: &NormalizeContext<'_>) -> Vec<CanonicalVideo> {
    dedupe(entries.iter().filter_map(|entry| normalize(entry, ctx)))
}

/// Keeps the first record for each id (or url when the id is empty).
/// Later duplicates are discarded, never merged.
pub fn dedupe(videos: impl IntoIterator<Item = CanonicalVideo>) -> Vec<CanonicalVideo> {
    let mut seen = HashSet::new();
    videos
        .into_iter()
        .filter(|video| seen.insert(video.dedup_key().to_string()))
        .collect()
}
