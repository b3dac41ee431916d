use crate::pipeline::*;
use crate::config::{DirectoryMirror, RawSection, SectionConfig, SourceConfig};
use crate::feed::upload_feed_url;
use crate::format::{Formatter, PublishedStyle};
use crate::transport::fake::FakeTransport;
use crate::transport::{DEFAULT_PROXY_REWRITES, fallback_urls};
use chrono::{TimeZone, Utc};
use serde_json::json;

const CHANNEL: &str = "UCabcdefghijklmnopqrstuv";

fn formatter() -> Formatter {
    Formatter::new(
        Utc.with_ymd_and_hms(2024, 3, 8, 12, 0, 0).unwrap(),
        PublishedStyle::Relative,
    )
}

fn section(raw: serde_json::Value) -> SectionConfig {
    let raw: RawSection = serde_json::from_value(raw).unwrap();
    SectionConfig::from_raw(raw, "<p>static grid</p>")
}

fn three_mirrors() -> SourceConfig {
    SourceConfig {
        mirrors: vec![
            DirectoryMirror::new("https://one.example/api/{id}"),
            DirectoryMirror::new("https://two.example/api/{id}"),
            DirectoryMirror::new("https://three.example/api/{id}"),
        ],
        proxies: DEFAULT_PROXY_REWRITES.to_vec(),
    }
}

fn feed_with(count: usize) -> String {
    let entries: String = (0..count)
        .map(|n| {
            format!(
                "<entry><yt:videoId>video{n:06}</yt:videoId><title>Upload {n}</title>\
                 <published>2024-03-0{}T12:00:00+00:00</published></entry>",
                (n % 7) + 1
            )
        })
        .collect();
    format!(r#"<feed xmlns="http://www.w3.org/2005/Atom">{entries}</feed>"#)
}

fn fail_everywhere(mut transport: FakeTransport, url: &str, status: u16) -> FakeTransport {
    for attempt in fallback_urls(url, DEFAULT_PROXY_REWRITES) {
        transport = transport.with_status(&attempt, status);
    }
    transport
}

#[test]
fn feed_outage_falls_through_to_second_mirror() {
    let payload = json!({
        "relatedStreams": [
            { "url": "/watch?v=aaaaaaaaaaa", "title": "First", "uploaded": 1_709_640_000_000i64 },
            { "url": "/watch?v=bbbbbbbbbbb" },
            { "url": "/watch?v=ccccccccccc", "title": "Third", "duration": 65 }
        ]
    })
    .to_string();

    let mut transport = fail_everywhere(FakeTransport::new(), &upload_feed_url(CHANNEL), 503);
    transport = fail_everywhere(transport, &format!("https://one.example/api/{CHANNEL}"), 500);
    transport = transport.with_body(&format!("https://two.example/api/{CHANNEL}"), &payload);

    let section = section(json!({ "channelId": CHANNEL }));
    let sources = three_mirrors();
    let outcome = load_section(&section, &sources, &transport, formatter());

    let videos = match outcome {
        SectionOutcome::Videos(videos) => videos,
        other => panic!("expected videos, got {other:?}"),
    };
    let titles: Vec<&str> = videos.iter().map(|v| v.title.as_str()).collect();
    assert_eq!(titles, vec!["First", "Third"]);
    assert_eq!(videos[0].display_text, "3 days ago");
    assert_eq!(videos[1].duration, "1:05");

    // Five attempts for the feed, five for mirror one, one for mirror two.
    assert_eq!(transport.calls().len(), 11);
    assert!(!transport.calls().iter().any(|url| url.contains("three.example")));
}

#[test]
fn handle_is_resolved_once_and_reused() {
    let payload = json!({
        "id": CHANNEL,
        "latestVideos": [{ "videoId": "ddddddddddd", "title": "From lookup" }]
    })
    .to_string();
    let feed_url = upload_feed_url(CHANNEL);
    let transport = FakeTransport::new()
        .with_body("https://one.example/api/%40ExampleChannel", &payload)
        .with_body(&feed_url, &feed_with(1));

    let section = section(json!({ "channelHandle": "@ExampleChannel" }));
    let sources = three_mirrors();
    let mut run = PipelineRun::new(&section, &sources, &transport, formatter());

    let videos = run.run().unwrap();
    assert_eq!(videos[0].title, "Upload 0");
    assert_eq!(run.resolved().map(|c| c.id.as_str()), Some(CHANNEL));
    assert_eq!(
        transport.calls(),
        vec![
            "https://one.example/api/%40ExampleChannel".to_string(),
            feed_url.clone(),
        ]
    );

    // A second cycle on the same run skips resolution entirely.
    run.run().unwrap();
    assert_eq!(transport.calls().len(), 3);
    assert_eq!(transport.calls()[2], feed_url);
}

#[test]
fn list_is_truncated_to_max_videos() {
    let transport = FakeTransport::new().with_body(&upload_feed_url(CHANNEL), &feed_with(8));

    let sources = three_mirrors();
    let default_max = section(json!({ "channelId": CHANNEL }));
    let videos = PipelineRun::new(&default_max, &sources, &transport, formatter())
        .run()
        .unwrap();
    assert_eq!(videos.len(), 3);

    let five = section(json!({ "channelId": CHANNEL, "maxVideos": "5" }));
    let videos = PipelineRun::new(&five, &sources, &transport, formatter())
        .run()
        .unwrap();
    assert_eq!(videos.len(), 5);
    assert_eq!(videos[4].title, "Upload 4");
}

#[test]
fn unresolvable_handle_fails_the_cycle() {
    let transport = FakeTransport::new();
    let section = section(json!({ "channelHandle": "Nobody" }));
    let sources = SourceConfig {
        proxies: Vec::new(),
        ..three_mirrors()
    };

    let outcome = load_section(&section, &sources, &transport, formatter());
    let err = match outcome {
        SectionOutcome::Failed(err) => err,
        other => panic!("expected a failure, got {other:?}"),
    };
    assert!(err.to_string().contains("Channel could not be resolved"));
    assert!(!transport.calls().iter().any(|url| url.contains("feeds/videos.xml")));
}

#[test]
fn total_source_exhaustion_fails_the_cycle() {
    let transport = FakeTransport::new();
    let section = section(json!({ "channelId": CHANNEL }));

    let outcome = load_section(&section, &three_mirrors(), &transport, formatter());
    assert!(matches!(outcome, SectionOutcome::Failed(_)));
    // Feed plus one identifier on each of three mirrors, five attempts each.
    assert_eq!(transport.calls().len(), 20);
}

#[test]
fn reachable_but_empty_sources_are_an_empty_state() {
    let transport = FakeTransport::new()
        .with_body(&upload_feed_url(CHANNEL), &feed_with(0));
    let section = section(json!({ "channelId": CHANNEL }));
    let sources = SourceConfig {
        mirrors: Vec::new(),
        proxies: Vec::new(),
    };

    let outcome = load_section(&section, &sources, &transport, formatter());
    assert!(matches!(outcome, SectionOutcome::Empty));
}
