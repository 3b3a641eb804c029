//! GitHub Sponsors via the GraphQL v4 API.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::GithubSettings;
use crate::domain::sponsor::{Platform, Sponsor};

use super::{FetchError, SponsorSource, error_for_status};

const GRAPHQL_ENDPOINT: &str = "https://api.github.com/graphql";
const PAGE_SIZE: u32 = 100;

const SPONSORSHIPS_QUERY: &str = r#"
query($login: String!, $cursor: String, $includePrivate: Boolean!, $pageSize: Int!) {
  user(login: $login) {
    sponsorshipsAsMaintainer(first: $pageSize, after: $cursor, includePrivate: $includePrivate) {
      nodes {
        createdAt
        isOneTimePayment
        sponsorEntity {
          ... on User { id login name avatarUrl url }
          ... on Organization { id login name avatarUrl url }
        }
        tier { name monthlyPriceInDollars }
      }
      pageInfo { hasNextPage endCursor }
    }
  }
}
"#;

pub struct GithubSource {
    client: reqwest::Client,
    token: String,
    login: String,
    include_private: bool,
    orgs: Vec<String>,
}

impl GithubSource {
    /// Construct the source when a complete credential pair is configured.
    pub fn from_settings(client: &reqwest::Client, settings: &GithubSettings) -> Option<Self> {
        let token = settings.token.clone()?;
        let login = settings.login.clone()?;
        Some(Self {
            client: client.clone(),
            token,
            login,
            include_private: settings.include_private,
            orgs: settings.orgs.clone(),
        })
    }

    async fn fetch_user_sponsorships(&self) -> Result<Vec<Sponsor>, FetchError> {
        let mut sponsors = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let body = json!({
                "query": SPONSORSHIPS_QUERY,
                "variables": {
                    "login": self.login,
                    "cursor": cursor,
                    "includePrivate": self.include_private,
                    "pageSize": PAGE_SIZE,
                },
            });

            let response = self
                .client
                .post(GRAPHQL_ENDPOINT)
                .bearer_auth(&self.token)
                .header(reqwest::header::USER_AGENT, "mecenate")
                .json(&body)
                .send()
                .await?;
            let response = error_for_status(response).await?;
            let payload: GraphQlResponse = response.json().await?;

            if let Some(error) = payload.errors.first() {
                return Err(FetchError::Api(error.message.clone()));
            }

            let connection = payload
                .data
                .and_then(|data| data.user)
                .map(|user| user.sponsorships_as_maintainer)
                .unwrap_or_default();

            sponsors.extend(map_sponsorships(connection.nodes));

            if connection.page_info.has_next_page {
                cursor = connection.page_info.end_cursor;
            } else {
                break;
            }
        }

        Ok(sponsors)
    }

    /// Organization sponsorships are accepted by configuration but not yet
    /// listed; this remains an extension point.
    async fn fetch_org_sponsorships(&self, org: &str) -> Result<Vec<Sponsor>, FetchError> {
        debug!(
            target: "mecenate::sources::github",
            org,
            "organization sponsor listing not implemented; returning no records"
        );
        Ok(Vec::new())
    }
}

#[async_trait]
impl SponsorSource for GithubSource {
    fn platform(&self) -> Platform {
        Platform::GitHub
    }

    async fn fetch(&self) -> Result<Vec<Sponsor>, FetchError> {
        let mut sponsors = self.fetch_user_sponsorships().await?;
        for org in &self.orgs {
            sponsors.extend(self.fetch_org_sponsorships(org).await?);
        }
        Ok(sponsors)
    }
}

/// One-time payments and deleted sponsor accounts are dropped here, so the
/// aggregator only ever sees recurring, attributable pledges.
fn map_sponsorships(nodes: Vec<SponsorshipNode>) -> Vec<Sponsor> {
    let mut sponsors = Vec::with_capacity(nodes.len());

    for node in nodes {
        if node.is_one_time_payment {
            continue;
        }
        let Some(entity) = node.sponsor_entity else {
            continue;
        };
        if entity.login.is_empty() {
            continue;
        }

        let monthly_amount = node
            .tier
            .as_ref()
            .and_then(|tier| tier.monthly_price_in_dollars)
            .unwrap_or(0.0);
        let tier_name = node.tier.and_then(|tier| tier.name);
        let name = entity
            .name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| entity.login.clone());

        sponsors.push(Sponsor {
            id: entity.id,
            name,
            login: entity.login,
            avatar_url: entity.avatar_url,
            link: entity.url,
            platform: Platform::GitHub.as_str().to_string(),
            monthly_amount,
            created_at: node.created_at,
            tier_name,
        });
    }

    sponsors
}

#[derive(Debug, Default, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<ResponseData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResponseData {
    user: Option<UserNode>,
}

#[derive(Debug, Deserialize)]
struct UserNode {
    #[serde(rename = "sponsorshipsAsMaintainer")]
    sponsorships_as_maintainer: SponsorshipConnection,
}

#[derive(Debug, Default, Deserialize)]
struct SponsorshipConnection {
    #[serde(default)]
    nodes: Vec<SponsorshipNode>,
    #[serde(rename = "pageInfo", default)]
    page_info: PageInfo,
}

#[derive(Debug, Deserialize)]
struct SponsorshipNode {
    #[serde(rename = "createdAt")]
    created_at: String,
    #[serde(rename = "isOneTimePayment", default)]
    is_one_time_payment: bool,
    #[serde(rename = "sponsorEntity")]
    sponsor_entity: Option<SponsorEntity>,
    #[serde(default)]
    tier: Option<Tier>,
}

#[derive(Debug, Deserialize)]
struct SponsorEntity {
    id: String,
    login: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "avatarUrl", default)]
    avatar_url: String,
    #[serde(default)]
    url: String,
}

#[derive(Debug, Deserialize)]
struct Tier {
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "monthlyPriceInDollars", default)]
    monthly_price_in_dollars: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct PageInfo {
    #[serde(rename = "hasNextPage", default)]
    has_next_page: bool,
    #[serde(rename = "endCursor", default)]
    end_cursor: Option<String>,
}
