//! Shared helpers for integration tests: in-memory sponsor sources and a
//! wall service wired to temporary directories.

// Each integration test binary compiles this module separately and uses a
// different subset of the helpers.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use mecenate::application::aggregate::Aggregator;
use mecenate::application::sources::{FetchError, SponsorSource};
use mecenate::application::wall::WallService;
use mecenate::config::RenderSettings;
use mecenate::domain::policy::SponsorPolicy;
use mecenate::domain::sponsor::{Platform, Sponsor};
use mecenate::infra::avatars::AvatarStore;

/// Inline avatar so tests never touch the network or the filesystem.
pub const DATA_URI: &str = "data:image/png;base64,aGVsbG8=";

pub type SharedOutcome = Arc<Mutex<Result<Vec<Sponsor>, String>>>;

pub struct StaticSource {
    platform: Platform,
    outcome: SharedOutcome,
}

impl StaticSource {
    pub fn fixed(platform: Platform, sponsors: Vec<Sponsor>) -> Arc<dyn SponsorSource> {
        Arc::new(Self {
            platform,
            outcome: Arc::new(Mutex::new(Ok(sponsors))),
        })
    }

    pub fn failing(platform: Platform, message: &str) -> Arc<dyn SponsorSource> {
        Arc::new(Self {
            platform,
            outcome: Arc::new(Mutex::new(Err(message.to_string()))),
        })
    }

    /// A source whose outcome the test can swap between calls.
    pub fn swappable(
        platform: Platform,
        sponsors: Vec<Sponsor>,
    ) -> (Arc<dyn SponsorSource>, SharedOutcome) {
        let outcome: SharedOutcome = Arc::new(Mutex::new(Ok(sponsors)));
        let source = Arc::new(Self {
            platform,
            outcome: outcome.clone(),
        });
        (source, outcome)
    }
}

#[async_trait]
impl SponsorSource for StaticSource {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn fetch(&self) -> Result<Vec<Sponsor>, FetchError> {
        match &*self.outcome.lock().expect("outcome lock") {
            Ok(sponsors) => Ok(sponsors.clone()),
            Err(message) => Err(FetchError::Api(message.clone())),
        }
    }
}

pub fn sponsor(login: &str, amount: f64, created_at: &str, platform: Platform) -> Sponsor {
    Sponsor {
        id: format!("{platform}:{login}"),
        name: login.to_string(),
        login: login.to_string(),
        avatar_url: DATA_URI.to_string(),
        link: format!("https://example.com/{login}"),
        platform: platform.as_str().to_string(),
        monthly_amount: amount,
        created_at: created_at.to_string(),
        tier_name: None,
    }
}

pub struct TestWall {
    pub dir: TempDir,
    pub wall: Arc<WallService>,
}

pub fn wall_with_sources(sources: Vec<Arc<dyn SponsorSource>>) -> TestWall {
    wall_with(sources, Duration::from_secs(3600))
}

pub fn wall_with(
    sources: Vec<Arc<dyn SponsorSource>>,
    refresh_interval: Duration,
) -> TestWall {
    let dir = TempDir::new().expect("temp dir");
    let client = reqwest::Client::new();
    let aggregator = Aggregator::new(sources);
    let policy = SponsorPolicy::new(&[], &[], &HashMap::new(), true);
    let avatars = AvatarStore::new(dir.path().join("cache"), client);
    let wall = Arc::new(WallService::new(
        aggregator,
        policy,
        avatars,
        RenderSettings::default(),
        dir.path().join("output"),
        refresh_interval,
    ));

    TestWall { dir, wall }
}
