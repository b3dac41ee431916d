use anyhow::{Context, Result, anyhow, bail};
use log::debug;
use reqwest::blocking::Client;
use reqwest::header::{CACHE_CONTROL, HeaderValue, PRAGMA};
use url::Url;

#[cfg(test)]
pub mod fake;

/// Performs a single uncached GET. Non-success statuses are errors.
pub trait Transport {
    fn get_text(&self, url: &str) -> Result<String>;
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        HttpTransport { client }
    }
}

impl Transport for HttpTransport {
    fn get_text(&self, url: &str) -> Result<String> {
        let url = Url::parse(url).with_context(|| format!("Invalid request URL: {url}"))?;

        // No cookie store on the client, so credentials are never attached.
        let response = self
            .client
            .get(url.clone())
            .header(CACHE_CONTROL, HeaderValue::from_static("no-store"))
            .header(PRAGMA, HeaderValue::from_static("no-cache"))
            .send()
            .with_context(|| format!("Request to {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("HTTP {status}");
        }

        response
            .text()
            .with_context(|| format!("Failed to read response body from {url}"))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProxyRewrite {
    pub name: &'static str,
    pub rewrite: fn(&str) -> String,
}

impl ProxyRewrite {
    pub fn apply(&self, target: &str) -> String {
        (self.rewrite)(target)
    }
}

fn isomorphic_git(target: &str) -> String {
    format!("https://cors.isomorphic-git.org/{target}")
}

fn jina_reader(target: &str) -> String {
    format!("https://r.jina.ai/{target}")
}

fn allorigins(target: &str) -> String {
    format!(
        "https://api.allorigins.win/raw?url={}",
        urlencoding::encode(target)
    )
}

fn corsproxy(target: &str) -> String {
    format!("https://corsproxy.io/?url={}", urlencoding::encode(target))
}

pub const DEFAULT_PROXY_REWRITES: &[ProxyRewrite] = &[
    ProxyRewrite {
        name: "isomorphic-git",
        rewrite: isomorphic_git,
    },
    ProxyRewrite {
        name: "jina-reader",
        rewrite: jina_reader,
    },
    ProxyRewrite {
        name: "allorigins",
        rewrite: allorigins,
    },
    ProxyRewrite {
        name: "corsproxy",
        rewrite: corsproxy,
    },
];

pub fn fallback_urls(primary: &str, rewrites: &[ProxyRewrite]) -> Vec<String> {
    let mut urls = vec![primary.to_string()];
    for rewrite in rewrites {
        let url = rewrite.apply(primary);
        if !urls.contains(&url) {
            urls.push(url);
        }
    }
    urls
}

/// Walks the failover chain for `primary`. An attempt succeeds only when the
/// transport returns a body and `accept` turns it into a value; otherwise the
/// next URL is tried. Each URL is tried at most once.
pub fn fetch_with_fallback<T, F>(
    transport: &(impl Transport + ?Sized),
    rewrites: &[ProxyRewrite],
    primary: &str,
    mut accept: F,
) -> Result<T>
where
    F: FnMut(String) -> Result<T>,
{
    let urls = fallback_urls(primary, rewrites);
    let mut failures = Vec::with_capacity(urls.len());

    for url in &urls {
        match transport.get_text(url).and_then(&mut accept) {
            Ok(value) => return Ok(value),
            Err(err) => {
                debug!("Attempt against {url} failed: {err:#}");
                failures.push(format!("{url}: {err:#}"));
            }
        }
    }

    Err(anyhow!(
        "All {} transports failed for {primary}: {}",
        urls.len(),
        failures.join("; ")
    ))
}

#[cfg(test)]
mod tests {
    use super::fake::FakeTransport;
    use super::*;

    const TARGET: &str = "https://www.youtube.com/feeds/videos.xml?channel_id=UCabc";

    #[test]
    fn fallback_order_follows_rewrite_table() {
        let urls = fallback_urls(TARGET, DEFAULT_PROXY_REWRITES);
        assert_eq!(urls.len(), 5);
        assert_eq!(urls[0], TARGET);
        assert_eq!(urls[1], format!("https://cors.isomorphic-git.org/{TARGET}"));
        assert_eq!(urls[2], format!("https://r.jina.ai/{TARGET}"));
        assert!(urls[3].starts_with("https://api.allorigins.win/raw?url=https%3A%2F%2F"));
        assert!(urls[4].starts_with("https://corsproxy.io/?url=https%3A%2F%2F"));
    }

    #[test]
    fn duplicate_rewrites_are_skipped() {
        fn identity(target: &str) -> String {
            target.to_string()
        }
        let rewrites = [
            ProxyRewrite {
                name: "identity",
                rewrite: identity,
            },
            DEFAULT_PROXY_REWRITES[1],
            DEFAULT_PROXY_REWRITES[1],
        ];
        let urls = fallback_urls(TARGET, &rewrites);
        assert_eq!(urls, vec![TARGET.to_string(), format!("https://r.jina.ai/{TARGET}")]);
    }

    #[test]
    fn primary_success_makes_one_call() {
        let transport = FakeTransport::new().with_body(TARGET, "ok");
        let body = fetch_with_fallback(&transport, DEFAULT_PROXY_REWRITES, TARGET, Ok).unwrap();
        assert_eq!(body, "ok");
        assert_eq!(transport.calls(), vec![TARGET.to_string()]);
    }

    #[test]
    fn falls_through_to_later_proxy() {
        let jina = format!("https://r.jina.ai/{TARGET}");
        let transport = FakeTransport::new()
            .with_status(TARGET, 503)
            .with_body(&jina, "proxied");

        let body = fetch_with_fallback(&transport, DEFAULT_PROXY_REWRITES, TARGET, Ok).unwrap();
        assert_eq!(body, "proxied");
        assert_eq!(transport.calls().len(), 3);
        assert_eq!(transport.calls()[2], jina);
    }

    #[test]
    fn rejected_body_moves_to_next_url() {
        let first_proxy = format!("https://cors.isomorphic-git.org/{TARGET}");
        let transport = FakeTransport::new()
            .with_body(TARGET, "not json")
            .with_body(&first_proxy, r#"{"ok":true}"#);

        let value = fetch_with_fallback(&transport, DEFAULT_PROXY_REWRITES, TARGET, |body| {
            serde_json::from_str::<serde_json::Value>(&body).context("Response was not valid JSON")
        })
        .unwrap();
        assert_eq!(value["ok"], true);
        assert_eq!(transport.calls().len(), 2);
    }

    #[test]
    fn exhaustion_aggregates_every_reason() {
        let transport = FakeTransport::new();
        let err = fetch_with_fallback(&transport, DEFAULT_PROXY_REWRITES, TARGET, Ok).unwrap_err();
        let message = format!("{err:#}");

        assert!(message.starts_with("All 5 transports failed"));
        assert_eq!(message.matches("connection refused").count(), 5);
        assert_eq!(transport.calls().len(), 5);
    }

    #[test]
    fn no_proxies_means_single_attempt() {
        let transport = FakeTransport::new().with_status(TARGET, 404);
        let err = fetch_with_fallback(&transport, &[], TARGET, Ok).unwrap_err();
        assert!(format!("{err:#}").contains("HTTP 404"));
        assert_eq!(transport.calls(), vec![TARGET.to_string()]);
    }
}
