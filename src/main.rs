mod config;
mod feed;
mod format;
mod identifiers;
mod parse;
mod pipeline;
mod render;
mod resolver;
mod transport;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use clap::{ArgAction, Parser, ValueEnum};
use env_logger::Env;
use log::{debug, info};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::thread;

use crate::config::{RawSection, SectionConfig, SourceConfig, load_sections};
use crate::format::{Formatter, PublishedStyle};
use crate::pipeline::{SectionOutcome, load_section};
use crate::render::{HtmlRenderer, JsonRenderer, Renderer};
use crate::transport::HttpTransport;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Html,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Render a latest-videos grid for a channel, falling back through feeds, directory mirrors and proxies"
)]
struct Cli {
    /// Channel id (UC...). Skips handle resolution entirely
    #[arg(long, value_name = "ID")]
    channel_id: Option<String>,

    /// Channel handle, with or without the leading @
    #[arg(long, value_name = "HANDLE")]
    handle: Option<String>,

    /// Maximum number of videos to render (positive integer, default 3)
    #[arg(long, value_name = "N")]
    max_videos: Option<String>,

    /// Provenance label shown on every card
    #[arg(long, value_name = "LABEL")]
    label: Option<String>,

    /// JSON file describing several sections; overrides the single-section flags
    #[arg(long, value_name = "FILE")]
    sections: Option<PathBuf>,

    /// Static markup restored when a section cannot be populated
    #[arg(long, value_name = "FILE")]
    fallback: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "html")]
    format: OutputFormat,

    /// Write output to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<String>,

    /// Override the default user agent
    #[arg(long, value_name = "AGENT")]
    user_agent: Option<String>,

    /// Always print absolute dates instead of relative ones
    #[arg(long, action = ArgAction::SetTrue)]
    absolute_dates: bool,

    /// Directory API mirror template, `{id}` is replaced by the identifier (repeatable)
    #[arg(long = "mirror", value_name = "TEMPLATE")]
    mirrors: Vec<String>,

    /// Only contact origins directly, never through public CORS proxies
    #[arg(long, action = ArgAction::SetTrue)]
    no_proxies: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().filter_or("RUST_LOG", "info"))
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    let transport = HttpTransport::new(build_client(cli.user_agent.clone())?);
    let sources = SourceConfig::new(&cli.mirrors, !cli.no_proxies);
    let sections = section_configs(&cli)?;
    info!(
        "Loading {} section(s) through {} mirror(s), proxies: [{}]",
        sections.len(),
        sources.mirrors.len(),
        sources
            .proxies
            .iter()
            .map(|proxy| proxy.name)
            .collect::<Vec<_>>()
            .join(", ")
    );

    let style = if cli.absolute_dates {
        PublishedStyle::Absolute
    } else {
        PublishedStyle::Relative
    };
    let formatter = Formatter::new(Utc::now(), style);

    // Sections are independent; each one's own source loop stays sequential.
    let outcomes: Vec<SectionOutcome> = thread::scope(|scope| {
        let handles: Vec<_> = sections
            .iter()
            .map(|section| {
                let formatter = formatter.clone();
                let sources = &sources;
                let transport = &transport;
                scope.spawn(move || load_section(section, sources, transport, formatter))
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|_| SectionOutcome::Failed(anyhow!("Section worker panicked")))
            })
            .collect()
    });

    let renderer: Box<dyn Renderer> = match cli.format {
        OutputFormat::Html => Box::new(HtmlRenderer),
        OutputFormat::Json => Box::new(JsonRenderer),
    };

    let mut writer: Box<dyn Write> = match cli.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(&path).with_context(|| format!("Failed to create {path}"))?,
        )),
        None => Box::new(io::stdout()),
    };

    for (section, outcome) in sections.iter().zip(&outcomes) {
        debug!("Rendering section {}", section.describe());
        let rendered = renderer.render(section, outcome)?;
        writer.write_all(rendered.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;

    Ok(())
}

fn build_client(user_agent: Option<String>) -> Result<Client> {
    let mut headers = HeaderMap::new();
    let agent = user_agent.unwrap_or_else(|| "latest-videos/0.1".to_string());
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&agent).context("Invalid user agent value")?,
    );

    Client::builder()
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .context("Failed to build HTTP client")
}

fn section_configs(cli: &Cli) -> Result<Vec<SectionConfig>> {
    let fallback = match &cli.fallback {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read fallback markup {}", path.display()))?,
        None => String::new(),
    };

    if let Some(path) = &cli.sections {
        return load_sections(path, &fallback);
    }

    let raw = RawSection {
        channel_id: cli.channel_id.clone(),
        channel_handle: cli.handle.clone(),
        max_videos: cli.max_videos.clone().map(serde_json::Value::String),
        pill_label: cli.label.clone(),
        fallback: None,
    };
    Ok(vec![SectionConfig::from_raw(raw, &fallback)])
}
