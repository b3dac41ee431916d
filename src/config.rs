use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::Path;

use crate::transport::{DEFAULT_PROXY_REWRITES, ProxyRewrite};

pub const DEFAULT_MAX_VIDEOS: usize = 3;
pub const DEFAULT_PILL_LABEL: &str = "YouTube";

/// Directory mirrors tried in order. `{id}` is replaced with the
/// URL-encoded handle or channel id.
pub const DEFAULT_DIRECTORY_MIRRORS: &[&str] = &[
    "https://piped.video/api/v1/channel/{id}",
    "https://pipedapi.kavin.rocks/channel/{id}",
    "https://yewtu.be/api/v1/channels/{id}",
];

#[derive(Debug, Clone)]
pub struct SectionConfig {
    pub channel_id: Option<String>,
    pub channel_handle: Option<String>,
    pub max_videos: usize,
    pub pill_label: String,
    pub fallback_markup: String,
}

/// Shape of a section entry in a `--sections` file. Keys follow the
/// `data-*` attribute names the markup layer uses.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawSection {
    pub channel_id: Option<String>,
    pub channel_handle: Option<String>,
    pub max_videos: Option<Value>,
    pub pill_label: Option<String>,
    pub fallback: Option<String>,
}

impl SectionConfig {
    pub fn from_raw(raw: RawSection, default_fallback: &str) -> Self {
        let max_videos = match raw.max_videos {
            Some(Value::String(text)) => parse_positive_int(&text, DEFAULT_MAX_VIDEOS),
            Some(Value::Number(number)) => parse_positive_int(&number.to_string(), DEFAULT_MAX_VIDEOS),
            _ => DEFAULT_MAX_VIDEOS,
        };

        SectionConfig {
            channel_id: non_empty(raw.channel_id),
            channel_handle: non_empty(raw.channel_handle),
            max_videos,
            pill_label: non_empty(raw.pill_label).unwrap_or_else(|| DEFAULT_PILL_LABEL.into()),
            fallback_markup: raw.fallback.unwrap_or_else(|| default_fallback.to_string()),
        }
    }

    pub fn describe(&self) -> String {
        self.channel_id
            .clone()
            .or_else(|| self.channel_handle.clone())
            .unwrap_or_else(|| "<unconfigured>".into())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Leading-integer parse in the spirit of `parseInt`: `"5"`, `" 7 "` and
/// `"4px"` parse; anything that is not a positive integer yields `fallback`.
pub fn parse_positive_int(value: &str, fallback: usize) -> usize {
    let trimmed = value.trim();
    let digits: String = trimmed
        .strip_prefix('+')
        .unwrap_or(trimmed)
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();

    match digits.parse::<usize>() {
        Ok(parsed) if parsed > 0 => parsed,
        _ => fallback,
    }
}

pub fn load_sections(path: &Path, default_fallback: &str) -> Result<Vec<SectionConfig>> {
    let bytes = fs::read(path)
        .with_context(|| format!("Failed to read sections file {}", path.display()))?;
    let raw: Vec<RawSection> = serde_json::from_slice(&bytes)
        .with_context(|| format!("Malformed sections file {}", path.display()))?;

    if raw.is_empty() {
        bail!("Sections file {} does not define any section", path.display());
    }

    Ok(raw
        .into_iter()
        .map(|section| SectionConfig::from_raw(section, default_fallback))
        .collect())
}

#[derive(Debug, Clone)]
pub struct DirectoryMirror {
    pub template: String,
}

impl DirectoryMirror {
    pub fn new(template: impl Into<String>) -> Self {
        DirectoryMirror {
            template: template.into(),
        }
    }

    pub fn url_for(&self, identifier: &str) -> String {
        let encoded = urlencoding::encode(identifier);
        if self.template.contains("{id}") {
            self.template.replace("{id}", &encoded)
        } else {
            format!("{}/{}", self.template.trim_end_matches('/'), encoded)
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub mirrors: Vec<DirectoryMirror>,
    pub proxies: Vec<ProxyRewrite>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            mirrors: DEFAULT_DIRECTORY_MIRRORS
                .iter()
                .map(|template| DirectoryMirror::new(*template))
                .collect(),
            proxies: DEFAULT_PROXY_REWRITES.to_vec(),
        }
    }
}

impl SourceConfig {
    pub fn new(mirror_templates: &[String], use_proxies: bool) -> Self {
        let mut config = SourceConfig::default();
        if !mirror_templates.is_empty() {
            config.mirrors = mirror_templates
                .iter()
                .map(|template| DirectoryMirror::new(template.clone()))
                .collect();
        }
        if !use_proxies {
            config.proxies.clear();
        }
        config
    }
}
