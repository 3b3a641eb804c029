//! Afdian sponsors via the signed open API.

use std::time::Duration;

use async_trait::async_trait;
use md5::{Digest, Md5};
use serde::Deserialize;
use serde_json::json;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::config::AfdianSettings;
use crate::domain::sponsor::{Platform, Sponsor};

use super::{FetchError, SponsorSource, error_for_status};

const QUERY_ENDPOINT: &str = "https://afdian.com/api/open/query-sponsor";
const PAGE_SIZE: u32 = 50;
const OK_CODE: i64 = 200;
const SECONDS_PER_MONTH: f64 = 30.0 * 24.0 * 60.0 * 60.0;

// The Afdian API tolerates slower responses than the other platforms.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct AfdianSource {
    client: reqwest::Client,
    user_id: String,
    token: String,
}

impl AfdianSource {
    /// Construct the source when a complete credential pair is configured.
    pub fn from_settings(client: &reqwest::Client, settings: &AfdianSettings) -> Option<Self> {
        let user_id = settings.user_id.clone()?;
        let token = settings.token.clone()?;
        Some(Self {
            client: client.clone(),
            user_id,
            token,
        })
    }

    async fn fetch_page(&self, page: u32) -> Result<QueryResponse, FetchError> {
        let params = json!({ "page": page, "per_page": PAGE_SIZE }).to_string();
        let ts = OffsetDateTime::now_utc().unix_timestamp().to_string();
        let sign = sign_request(&self.token, &self.user_id, &params, &ts);

        let body = json!({
            "user_id": self.user_id,
            "params": params,
            "ts": ts,
            "sign": sign,
        });

        let response = self
            .client
            .post(QUERY_ENDPOINT)
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await?;
        let response = error_for_status(response).await?;
        let payload: QueryResponse = response.json().await?;

        if payload.ec != OK_CODE {
            return Err(FetchError::Api(payload.em));
        }

        Ok(payload)
    }
}

#[async_trait]
impl SponsorSource for AfdianSource {
    fn platform(&self) -> Platform {
        Platform::Afdian
    }

    async fn fetch(&self) -> Result<Vec<Sponsor>, FetchError> {
        let mut sponsors = Vec::new();
        let mut page = 1;
        let mut total_pages = 1;

        while page <= total_pages {
            let payload = self.fetch_page(page).await?;
            total_pages = payload.data.total_page;
            sponsors.extend(map_sponsors(payload.data.list));
            page += 1;
        }

        Ok(sponsors)
    }
}

/// Request signature: `md5(token + "params" + params + "ts" + ts + "user_id" + user_id)`.
fn sign_request(token: &str, user_id: &str, params: &str, ts: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(format!("{token}params{params}ts{ts}user_id{user_id}"));
    hex::encode(hasher.finalize())
}

/// Afdian reports lifetime totals, not a recurring pledge, so the monthly
/// figure is approximated as total paid over the months between the first
/// and the latest payment (clamped to at least one month).
fn monthly_average(all_sum_amount: &str, create_time: i64, last_pay_time: i64) -> f64 {
    let total: f64 = match all_sum_amount.parse() {
        Ok(total) => total,
        Err(_) => return 0.0,
    };
    if total <= 0.0 {
        return 0.0;
    }

    if last_pay_time > 0 && create_time > 0 {
        let months = ((last_pay_time - create_time) as f64 / SECONDS_PER_MONTH).max(1.0);
        total / months
    } else {
        total
    }
}

fn map_sponsors(list: Vec<SponsorEntry>) -> Vec<Sponsor> {
    list.into_iter()
        .map(|entry| {
            let monthly_amount =
                monthly_average(&entry.all_sum_amount, entry.create_time, entry.last_pay_time);
            let tier_name = entry
                .current_plan
                .and_then(|plan| plan.name)
                .filter(|name| !name.is_empty());

            Sponsor {
                id: entry.user.user_id.clone(),
                name: entry.user.name.clone(),
                // Afdian has no separate login concept.
                login: entry.user.name,
                avatar_url: entry.user.avatar,
                link: format!("https://afdian.com/@{}", entry.user.user_id),
                platform: Platform::Afdian.as_str().to_string(),
                monthly_amount,
                created_at: format_unix(entry.create_time),
                tier_name,
            }
        })
        .collect()
}

fn format_unix(ts: i64) -> String {
    OffsetDateTime::from_unix_timestamp(ts)
        .ok()
        .and_then(|time| time.format(&Rfc3339).ok())
        .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    ec: i64,
    #[serde(default)]
    em: String,
    #[serde(default)]
    data: QueryData,
}

#[derive(Debug, Default, Deserialize)]
struct QueryData {
    #[serde(default)]
    total_page: u32,
    #[serde(default)]
    list: Vec<SponsorEntry>,
}

#[derive(Debug, Deserialize)]
struct SponsorEntry {
    #[serde(default)]
    all_sum_amount: String,
    #[serde(default)]
    create_time: i64,
    #[serde(default)]
    last_pay_time: i64,
    #[serde(default)]
    current_plan: Option<Plan>,
    user: UserInfo,
}

#[derive(Debug, Default, Deserialize)]
struct Plan {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    user_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    avatar: String,
}
