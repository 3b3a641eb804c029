//! Concurrent multi-source aggregation with partial-failure tolerance.

use std::sync::Arc;

use futures::future::join_all;
use metrics::counter;
use thiserror::Error;
use tracing::{info, warn};

use crate::application::sources::{
    AfdianSource, GithubSource, OpenCollectiveSource, PatreonSource, SponsorSource,
};
use crate::config::SourceSettings;
use crate::domain::sponsor::Sponsor;

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("no sponsor source is configured")]
    NoSourcesConfigured,
    #[error("all sponsor sources failed: {}", failures.join("; "))]
    AllSourcesFailed { failures: Vec<String> },
}

/// Fans out to every enabled platform fetcher and folds the results.
pub struct Aggregator {
    sources: Vec<Arc<dyn SponsorSource>>,
}

impl Aggregator {
    pub fn new(sources: Vec<Arc<dyn SponsorSource>>) -> Self {
        Self { sources }
    }

    /// Enable one source per platform whose credential set is complete.
    pub fn from_settings(settings: &SourceSettings, client: reqwest::Client) -> Self {
        let mut sources: Vec<Arc<dyn SponsorSource>> = Vec::new();

        if let Some(source) = GithubSource::from_settings(&client, &settings.github) {
            sources.push(Arc::new(source));
        }
        if let Some(source) = OpenCollectiveSource::from_settings(&client, &settings.opencollective)
        {
            sources.push(Arc::new(source));
        }
        if let Some(source) = PatreonSource::from_settings(&client, &settings.patreon) {
            sources.push(Arc::new(source));
        }
        if let Some(source) = AfdianSource::from_settings(&client, &settings.afdian) {
            sources.push(Arc::new(source));
        }

        Self::new(sources)
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Fetch every configured source concurrently and combine the results.
    ///
    /// Partial data beats no data: per-source failures are logged as
    /// warnings and only fail the whole aggregation when nothing at all was
    /// fetched. Contribution order across sources is not meaningful; the
    /// policy sort downstream provides the deterministic ordering.
    pub async fn collect(&self) -> Result<Vec<Sponsor>, AggregateError> {
        if self.sources.is_empty() {
            return Err(AggregateError::NoSourcesConfigured);
        }

        let fetches = self.sources.iter().map(|source| {
            let source = Arc::clone(source);
            async move {
                let outcome = source.fetch().await;
                (source.platform(), outcome)
            }
        });

        let mut combined = Vec::new();
        let mut failures = Vec::new();

        for (platform, outcome) in join_all(fetches).await {
            match outcome {
                Ok(sponsors) => {
                    info!(
                        target: "mecenate::aggregate",
                        platform = platform.as_str(),
                        count = sponsors.len(),
                        "source fetch succeeded"
                    );
                    combined.extend(sponsors);
                }
                Err(err) => {
                    counter!(
                        "mecenate_source_fetch_errors_total",
                        "platform" => platform.as_str()
                    )
                    .increment(1);
                    warn!(
                        target: "mecenate::aggregate",
                        platform = platform.as_str(),
                        error = %err,
                        "source fetch failed"
                    );
                    failures.push(format!("{platform}: {err}"));
                }
            }
        }

        if combined.is_empty() && !failures.is_empty() {
            return Err(AggregateError::AllSourcesFailed { failures });
        }

        Ok(combined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::sources::FetchError;
    use crate::domain::sponsor::Platform;
    use async_trait::async_trait;

    struct StaticSource {
        platform: Platform,
        outcome: Result<Vec<Sponsor>, String>,
    }

    impl StaticSource {
        fn ok(platform: Platform, logins: &[&str]) -> Arc<dyn SponsorSource> {
            let sponsors = logins.iter().map(|login| sponsor(platform, login)).collect();
            Arc::new(Self {
                platform,
                outcome: Ok(sponsors),
            })
        }

        fn failing(platform: Platform, message: &str) -> Arc<dyn SponsorSource> {
            Arc::new(Self {
                platform,
                outcome: Err(message.to_string()),
            })
        }
    }

    #[async_trait]
    impl SponsorSource for StaticSource {
        fn platform(&self) -> Platform {
            self.platform
        }

        async fn fetch(&self) -> Result<Vec<Sponsor>, FetchError> {
            match &self.outcome {
                Ok(sponsors) => Ok(sponsors.clone()),
                Err(message) => Err(FetchError::Api(message.clone())),
            }
        }
    }

    fn sponsor(platform: Platform, login: &str) -> Sponsor {
        Sponsor {
            id: format!("{platform}:{login}"),
            name: login.to_string(),
            login: login.to_string(),
            avatar_url: String::new(),
            link: String::new(),
            platform: platform.as_str().to_string(),
            monthly_amount: 1.0,
            created_at: "2023-01-01T00:00:00Z".to_string(),
            tier_name: None,
        }
    }

    #[tokio::test]
    async fn partial_failure_keeps_successful_sources() {
        let aggregator = Aggregator::new(vec![
            StaticSource::ok(Platform::GitHub, &["a", "b"]),
            StaticSource::failing(Platform::Patreon, "token expired"),
            StaticSource::ok(Platform::OpenCollective, &["c"]),
        ]);

        let sponsors = aggregator.collect().await.expect("partial data succeeds");

        let mut logins: Vec<&str> = sponsors.iter().map(|s| s.login.as_str()).collect();
        logins.sort_unstable();
        assert_eq!(logins, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn total_failure_carries_every_message() {
        let aggregator = Aggregator::new(vec![
            StaticSource::failing(Platform::GitHub, "boom"),
            StaticSource::failing(Platform::Afdian, "bust"),
        ]);

        let err = aggregator.collect().await.expect_err("all sources failed");
        match err {
            AggregateError::AllSourcesFailed { failures } => {
                assert_eq!(failures.len(), 2);
                assert!(failures.iter().any(|f| f.contains("github") && f.contains("boom")));
                assert!(failures.iter().any(|f| f.contains("afdian") && f.contains("bust")));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn empty_results_without_errors_succeed() {
        let aggregator = Aggregator::new(vec![StaticSource::ok(Platform::GitHub, &[])]);

        let sponsors = aggregator.collect().await.expect("empty list is fine");
        assert!(sponsors.is_empty());
    }

    #[tokio::test]
    async fn no_sources_is_an_error() {
        let aggregator = Aggregator::new(Vec::new());
        let err = aggregator.collect().await.expect_err("nothing configured");
        assert!(matches!(err, AggregateError::NoSourcesConfigured));
    }
}
