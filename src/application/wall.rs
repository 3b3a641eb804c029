//! Regeneration controller owning the latest sponsor wall build.
//!
//! A single read/write lock guards the build state: readers share it freely
//! between regenerations, while a rebuild holds it exclusively for the whole
//! pipeline run. Concurrent callers that both observe staleness are
//! serialized rather than deduplicated; rebuilds are idempotent and the last
//! writer wins.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;

use askama::Template;
use metrics::{gauge, histogram};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::{fs, sync::RwLock};
use tracing::{info, warn};

use crate::application::aggregate::{AggregateError, Aggregator};
use crate::application::layout::{LayoutResult, layout_sponsors};
use crate::config::RenderSettings;
use crate::domain::policy::SponsorPolicy;
use crate::domain::sponsor::Sponsor;
use crate::infra::avatars::AvatarStore;
use crate::presentation::views::SvgTemplate;

pub const SVG_ARTIFACT: &str = "sponsors.svg";
pub const JSON_ARTIFACT: &str = "sponsors.json";
pub const PNG_ARTIFACT: &str = "sponsors.png";
pub const JPEG_ARTIFACT: &str = "sponsors.jpg";

#[derive(Debug, Error)]
pub enum WallError {
    #[error(transparent)]
    Aggregation(#[from] AggregateError),
    #[error("failed to render sponsor wall template: {0}")]
    Template(#[from] askama::Error),
    #[error("failed to encode sponsor list: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to persist artifacts: {0}")]
    Persistence(#[from] std::io::Error),
}

/// Latest successful build. Replaced wholesale, never patched in place.
#[derive(Debug, Default)]
pub struct BuildState {
    pub sponsors: Vec<Sponsor>,
    pub layout: LayoutResult,
    pub built_at: Option<OffsetDateTime>,
}

pub struct WallService {
    aggregator: Aggregator,
    policy: SponsorPolicy,
    avatars: AvatarStore,
    render: RenderSettings,
    output_dir: PathBuf,
    refresh_interval: time::Duration,
    state: RwLock<BuildState>,
}

impl WallService {
    pub fn new(
        aggregator: Aggregator,
        policy: SponsorPolicy,
        avatars: AvatarStore,
        render: RenderSettings,
        output_dir: PathBuf,
        refresh_interval: std::time::Duration,
    ) -> Self {
        Self {
            aggregator,
            policy,
            avatars,
            render,
            output_dir,
            refresh_interval: time::Duration::try_from(refresh_interval)
                .unwrap_or(time::Duration::MAX),
            state: RwLock::new(BuildState::default()),
        }
    }

    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.output_dir.join(name)
    }

    /// Timestamp of the last successful build, if any.
    pub async fn last_built(&self) -> Option<OffsetDateTime> {
        self.state.read().await.built_at
    }

    /// Ordered sponsor list from the last successful build.
    pub async fn sponsors(&self) -> Vec<Sponsor> {
        self.state.read().await.sponsors.clone()
    }

    /// Rebuild when the current state is stale (never built, or older than
    /// the configured refresh interval).
    pub async fn ensure_fresh(&self) -> Result<(), WallError> {
        if self.is_stale().await {
            self.rebuild().await?;
        }
        Ok(())
    }

    async fn is_stale(&self) -> bool {
        match self.state.read().await.built_at {
            None => true,
            Some(built_at) => OffsetDateTime::now_utc() - built_at > self.refresh_interval,
        }
    }

    /// Run the full pipeline and atomically replace the build state.
    ///
    /// On failure the previous state and artifacts are left untouched and
    /// the error propagates to the caller.
    pub async fn rebuild(&self) -> Result<(), WallError> {
        let mut state = self.state.write().await;
        let started_at = Instant::now();
        info!(target: "mecenate::wall", "rebuilding sponsor wall");

        let raw = self.aggregator.collect().await?;
        let sponsors = self.policy.apply(raw);
        let layout = layout_sponsors(&sponsors, &self.render, &self.avatars).await;
        let svg = SvgTemplate::new(&self.render, &layout).render()?;
        let json = serde_json::to_vec_pretty(&sponsors)?;
        self.write_artifacts(svg.as_bytes(), &json).await?;

        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        gauge!("mecenate_sponsors").set(sponsors.len() as f64);
        histogram!("mecenate_rebuild_ms").record(elapsed_ms as f64);
        info!(
            target: "mecenate::wall",
            sponsors = sponsors.len(),
            elapsed_ms,
            "sponsor wall rebuilt"
        );

        *state = BuildState {
            sponsors,
            layout,
            built_at: Some(OffsetDateTime::now_utc()),
        };
        Ok(())
    }

    async fn write_artifacts(&self, svg: &[u8], json: &[u8]) -> Result<(), WallError> {
        fs::create_dir_all(&self.output_dir).await?;

        // Stage next to the destination so the final rename is atomic and a
        // failed build never clobbers the served artifacts.
        let staged = [(SVG_ARTIFACT, svg), (JSON_ARTIFACT, json)];
        for (name, payload) in staged {
            fs::write(self.staging_path(name), payload).await?;
        }
        for (name, _) in staged {
            fs::rename(self.staging_path(name), self.artifact_path(name)).await?;
        }

        // Raster derivatives are regenerated lazily from the new SVG.
        for stale in [PNG_ARTIFACT, JPEG_ARTIFACT] {
            remove_stale_artifact(&self.artifact_path(stale)).await;
        }

        Ok(())
    }

    fn staging_path(&self, name: &str) -> PathBuf {
        self.output_dir.join(format!("{name}.tmp"))
    }
}

async fn remove_stale_artifact(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => warn!(
            target: "mecenate::wall",
            path = %path.display(),
            error = %err,
            "failed to remove stale raster artifact"
        ),
    }
}
