use regex::Regex;
use std::sync::LazyLock;

static CHANNEL_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^UC[A-Za-z0-9_-]{22}$").unwrap());

static VIDEO_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").unwrap());

// Ordered by how often each shape shows up in directory payloads.
static VIDEO_URL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"[?&]v=(?P<id>[A-Za-z0-9_-]{11})",
        r"youtu\.be/(?P<id>[A-Za-z0-9_-]{11})",
        r"/embed/(?P<id>[A-Za-z0-9_-]{11})",
        r"/shorts/(?P<id>[A-Za-z0-9_-]{11})",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect()
});

pub fn is_channel_id(value: &str) -> bool {
    CHANNEL_ID_RE.is_match(value)
}

pub fn is_video_id(value: &str) -> bool {
    VIDEO_ID_RE.is_match(value)
}

/// Expands one handle or id into the identifiers worth trying against
/// lookup endpoints: the trimmed input, then its bare form when it starts
/// with `@`, or its `@` form when it is not already a channel id.
pub fn candidate_identifiers(raw: &str) -> Vec<String> {
    candidates_for(&[raw])
}

pub fn candidates_for(inputs: &[&str]) -> Vec<String> {
    let mut queue: Vec<String> = Vec::new();

    for input in inputs {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            continue;
        }

        push_unique(&mut queue, trimmed.to_string());

        if let Some(bare) = trimmed.strip_prefix('@') {
            let bare = bare.trim();
            if !bare.is_empty() {
                push_unique(&mut queue, bare.to_string());
            }
        } else if !is_channel_id(trimmed) {
            push_unique(&mut queue, format!("@{trimmed}"));
        }
    }

    queue
}

fn push_unique(queue: &mut Vec<String>, value: String) {
    if !queue.contains(&value) {
        queue.push(value);
    }
}

pub fn video_id_from_url(url: &str) -> Option<String> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return None;
    }

    VIDEO_URL_PATTERNS.iter().find_map(|re| {
        re.captures(trimmed)
            .and_then(|caps| caps.name("id"))
            .map(|m| m.as_str().to_string())
    })
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

pub fn thumbnail_url(video_id: &str) -> String {
    format!("https://i.ytimg.com/vi/{video_id}/hqdefault.jpg")
}

/// Channel-level link used when a record carries no video link of its own.
pub fn channel_videos_url(channel_id: &str) -> String {
    format!("https://www.youtube.com/channel/{channel_id}/videos")
}
