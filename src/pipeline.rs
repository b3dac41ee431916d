use anyhow::Result;
use log::{error, info};

use crate::config::{SectionConfig, SourceConfig};
use crate::feed::fetch_videos;
use crate::format::Formatter;
use crate::parse::CanonicalVideo;
use crate::resolver::{ResolvedChannel, resolve_channel};
use crate::transport::Transport;

pub const DEFAULT_ERROR_MESSAGE: &str =
    "Unable to load the latest videos right now. Please try again later.";
pub const EMPTY_MESSAGE: &str = "No videos found yet. Check back soon!";

#[derive(Debug)]
pub enum SectionOutcome {
    Videos(Vec<CanonicalVideo>),
    Empty,
    Failed(anyhow::Error),
}

/// One render cycle for one section. Owns the resolved channel for the
/// rest of the run so resolution happens at most once.
pub struct PipelineRun<'a, T: Transport + ?Sized> {
    section: &'a SectionConfig,
    sources: &'a SourceConfig,
    transport: &'a T,
    formatter: Formatter,
    resolved: Option<ResolvedChannel>,
}

impl<'a, T: Transport + ?Sized> PipelineRun<'a, T> {
    pub fn new(
        section: &'a SectionConfig,
        sources: &'a SourceConfig,
        transport: &'a T,
        formatter: Formatter,
    ) -> Self {
        PipelineRun {
            section,
            sources,
            transport,
            formatter,
            resolved: None,
        }
    }

    pub fn resolved(&self) -> Option<&ResolvedChannel> {
        self.resolved.as_ref()
    }

    pub fn run(&mut self) -> Result<Vec<CanonicalVideo>> {
        let channel = resolve_once(&mut self.resolved, self.transport, self.sources, self.section)?;

        let mut videos = fetch_videos(
            self.transport,
            self.sources,
            channel,
            self.section.channel_handle.as_deref(),
            &self.formatter,
        )?;
        videos.truncate(self.section.max_videos);
        Ok(videos)
    }

    pub fn outcome(&mut self) -> SectionOutcome {
        match self.run() {
            Ok(videos) if videos.is_empty() => {
                info!("No videos for section {}", self.section.describe());
                SectionOutcome::Empty
            }
            Ok(videos) => {
                info!(
                    "Rendering {} videos for {} ({})",
                    videos.len(),
                    self.section.describe(),
                    self.resolved().map(|channel| channel.id.as_str()).unwrap_or_default()
                );
                SectionOutcome::Videos(videos)
            }
            Err(err) => {
                error!(
                    "[Latest videos] Failed to update video grid for {}: {err:#}",
                    self.section.describe()
                );
                SectionOutcome::Failed(err)
            }
        }
    }
}

fn resolve_once<'r>(
    slot: &'r mut Option<ResolvedChannel>,
    transport: &(impl Transport + ?Sized),
    sources: &SourceConfig,
    section: &SectionConfig,
) -> Result<&'r ResolvedChannel> {
    let channel = match slot.take() {
        Some(channel) => channel,
        None => resolve_channel(
            transport,
            sources,
            section.channel_id.as_deref(),
            section.channel_handle.as_deref(),
        )?,
    };
    Ok(slot.insert(channel))
}

pub fn load_section(
    section: &SectionConfig,
    sources: &SourceConfig,
    transport: &(impl Transport + ?Sized),
    formatter: Formatter,
) -> SectionOutcome {
    PipelineRun::new(section, sources, transport, formatter).outcome()
}
