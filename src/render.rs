use anyhow::{Context, Result};
use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};
use serde::Serialize;
use std::fmt::Write;

use crate::config::SectionConfig;
use crate::identifiers::thumbnail_url;
use crate::parse::CanonicalVideo;
use crate::pipeline::{DEFAULT_ERROR_MESSAGE, EMPTY_MESSAGE, SectionOutcome};

/// Turns a section outcome into output. Empty and failed outcomes restore
/// the section's pre-captured fallback markup plus an advisory message.
pub trait Renderer {
    fn render(&self, section: &SectionConfig, outcome: &SectionOutcome) -> Result<String>;
}

pub struct HtmlRenderer;

impl Renderer for HtmlRenderer {
    fn render(&self, section: &SectionConfig, outcome: &SectionOutcome) -> Result<String> {
        let mut out = String::new();
        out.push_str("<section data-video-section>\n");

        match outcome {
            SectionOutcome::Videos(videos) => {
                out.push_str("<div class=\"video-grid\" data-video-grid>\n");
                for video in videos {
                    out.push_str(&video_card(video, &section.pill_label));
                }
                out.push_str("</div>\n");
            }
            SectionOutcome::Empty => restore_fallback(&mut out, section, EMPTY_MESSAGE),
            SectionOutcome::Failed(_) => restore_fallback(&mut out, section, DEFAULT_ERROR_MESSAGE),
        }

        out.push_str("</section>\n");
        Ok(out)
    }
}

fn restore_fallback(out: &mut String, section: &SectionConfig, message: &str) {
    out.push_str("<div class=\"video-grid\" data-video-grid>\n");
    if !section.fallback_markup.trim().is_empty() {
        out.push_str(section.fallback_markup.trim_end());
        out.push('\n');
    }
    out.push_str("</div>\n");
    let _ = writeln!(out, "<p class=\"video-error\" data-video-error>{}</p>", text(message));
}

pub fn video_card(video: &CanonicalVideo, pill_label: &str) -> String {
    let title = video.title.as_str();
    let href = if video.url.is_empty() { "#" } else { video.url.as_str() };
    let thumbnail = if video.thumbnail.is_empty() && !video.id.is_empty() {
        thumbnail_url(&video.id)
    } else {
        video.thumbnail.clone()
    };

    let mut card = String::new();
    let _ = writeln!(
        card,
        "<a class=\"card\" href=\"{}\" target=\"_blank\" rel=\"noopener\" aria-label=\"{} on YouTube\">",
        attr(href),
        attr(title)
    );
    let _ = writeln!(
        card,
        "  <img src=\"{}\" alt=\"{} thumbnail\">",
        attr(&thumbnail),
        attr(title)
    );
    card.push_str("  <div class=\"pad\">\n");
    let _ = writeln!(card, "    <div class=\"pill\">{}</div>", text(pill_label));
    let _ = writeln!(card, "    <div class=\"thq-heading-3\">{}</div>", text(title));
    if !video.display_text.is_empty() {
        let _ = writeln!(
            card,
            "    <div class=\"video-card__meta\">Published {}</div>",
            text(&video.display_text)
        );
    }
    if !video.duration.is_empty() {
        let _ = writeln!(
            card,
            "    <div class=\"video-card__duration\">{}</div>",
            text(&video.duration)
        );
    }
    card.push_str("  </div>\n</a>\n");
    card
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SectionReport<'a> {
    label: &'a str,
    status: &'static str,
    videos: &'a [CanonicalVideo],
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fallback: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub struct JsonRenderer;

impl Renderer for JsonRenderer {
    fn render(&self, section: &SectionConfig, outcome: &SectionOutcome) -> Result<String> {
        let fallback = Some(section.fallback_markup.as_str()).filter(|markup| !markup.is_empty());
        let report = match outcome {
            SectionOutcome::Videos(videos) => SectionReport {
                label: &section.pill_label,
                status: "ok",
                videos,
                message: None,
                fallback: None,
                error: None,
            },
            SectionOutcome::Empty => SectionReport {
                label: &section.pill_label,
                status: "empty",
                videos: &[],
                message: Some(EMPTY_MESSAGE),
                fallback,
                error: None,
            },
            SectionOutcome::Failed(err) => SectionReport {
                label: &section.pill_label,
                status: "failed",
                videos: &[],
                message: Some(DEFAULT_ERROR_MESSAGE),
                fallback,
                error: Some(format!("{err:#}")),
            },
        };

        serde_json::to_string_pretty(&report).context("Failed to serialize section report")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawSection;
    use anyhow::anyhow;

    fn section() -> SectionConfig {
        SectionConfig::from_raw(
            RawSection {
                pill_label: Some("Vlog".into()),
                ..RawSection::default()
            },
            "<a class=\"card\" href=\"/static\">Static card</a>",
        )
    }

    fn video() -> CanonicalVideo {
        CanonicalVideo {
            id: "aaaaaaaaaaa".into(),
            title: "Fish & <Chips>".into(),
            url: "https://www.youtube.com/watch?v=aaaaaaaaaaa".into(),
            thumbnail: String::new(),
            published_at: "2024-03-05T12:00:00.000Z".into(),
            display_text: "3 days ago".into(),
            duration: "1:05".into(),
        }
    }

    #[test]
    fn cards_are_escaped_and_complete() {
        let html = HtmlRenderer
            .render(&section(), &SectionOutcome::Videos(vec![video()]))
            .unwrap();

        assert!(html.contains("Fish &amp; &lt;Chips&gt;"));
        assert!(html.contains("href=\"https://www.youtube.com/watch?v=aaaaaaaaaaa\""));
        assert!(html.contains("https://i.ytimg.com/vi/aaaaaaaaaaa/hqdefault.jpg"));
        assert!(html.contains("<div class=\"pill\">Vlog</div>"));
        assert!(html.contains("Published 3 days ago"));
        assert!(html.contains("1:05"));
        assert!(!html.contains("data-video-error"));
    }

    #[test]
    fn failure_restores_fallback_with_default_message() {
        let html = HtmlRenderer
            .render(&section(), &SectionOutcome::Failed(anyhow!("boom")))
            .unwrap();

        assert!(html.contains("Static card"));
        assert!(html.contains(DEFAULT_ERROR_MESSAGE));
        assert!(!html.contains("boom"));
    }

    #[test]
    fn empty_state_restores_fallback_with_notice() {
        let html = HtmlRenderer.render(&section(), &SectionOutcome::Empty).unwrap();
        assert!(html.contains("Static card"));
        assert!(html.contains(EMPTY_MESSAGE));
    }

    #[test]
    fn json_report_shapes() {
        let ok = JsonRenderer
            .render(&section(), &SectionOutcome::Videos(vec![video()]))
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&ok).unwrap();
        assert_eq!(value["status"], "ok");
        assert_eq!(value["videos"][0]["publishedAt"], "2024-03-05T12:00:00.000Z");
        assert_eq!(value["videos"][0]["displayText"], "3 days ago");
        assert!(value.get("fallback").is_none());

        let failed = JsonRenderer
            .render(&section(), &SectionOutcome::Failed(anyhow!("all sources down")))
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&failed).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["message"], DEFAULT_ERROR_MESSAGE);
        assert_eq!(value["error"], "all sources down");
        assert!(value["fallback"].as_str().unwrap().contains("Static card"));
    }
}
