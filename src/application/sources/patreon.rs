//! Patreon campaign members via the OAuth v2 API.

use async_trait::async_trait;
use serde::Deserialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::config::PatreonSettings;
use crate::domain::sponsor::{Platform, Sponsor};

use super::{FetchError, SponsorSource, error_for_status};

const CENTS_PER_DOLLAR: f64 = 100.0;

// Patreon does not expose member avatars through this endpoint.
const AVATAR_PLACEHOLDER: &str = "https://c8.patreon.com/2/200/0";

pub struct PatreonSource {
    client: reqwest::Client,
    access_token: String,
    campaign_id: String,
}

impl PatreonSource {
    /// Construct the source when a complete credential pair is configured.
    pub fn from_settings(client: &reqwest::Client, settings: &PatreonSettings) -> Option<Self> {
        let access_token = settings.access_token.clone()?;
        let campaign_id = settings.campaign_id.clone()?;
        Some(Self {
            client: client.clone(),
            access_token,
            campaign_id,
        })
    }

    fn members_url(&self) -> String {
        format!(
            "https://www.patreon.com/api/oauth2/v2/campaigns/{}/members\
             ?include=currently_entitled_tiers\
             &fields%5Bmember%5D=full_name,patron_status,currently_entitled_amount_cents,pledge_relationship_start\
             &fields%5Btier%5D=title",
            self.campaign_id
        )
    }
}

#[async_trait]
impl SponsorSource for PatreonSource {
    fn platform(&self) -> Platform {
        Platform::Patreon
    }

    async fn fetch(&self) -> Result<Vec<Sponsor>, FetchError> {
        let mut sponsors = Vec::new();
        let mut url = self.members_url();

        loop {
            let response = self
                .client
                .get(&url)
                .bearer_auth(&self.access_token)
                .send()
                .await?;
            let response = error_for_status(response).await?;
            let payload: MembersResponse = response.json().await?;

            sponsors.extend(map_members(&payload));

            match payload.links.next {
                Some(next) if !next.is_empty() => url = next,
                _ => break,
            }
        }

        Ok(sponsors)
    }
}

/// Only active patrons are kept; entitled cents become dollars per month.
/// The member id doubles as the login since Patreon exposes no handle here.
fn map_members(response: &MembersResponse) -> Vec<Sponsor> {
    let mut sponsors = Vec::with_capacity(response.data.len());

    for member in &response.data {
        if member.attributes.patron_status.as_deref() != Some("active_patron") {
            continue;
        }

        let monthly_amount =
            f64::from(member.attributes.currently_entitled_amount_cents) / CENTS_PER_DOLLAR;

        let tier_name = member
            .relationships
            .currently_entitled_tiers
            .data
            .first()
            .and_then(|tier_ref| {
                response
                    .included
                    .iter()
                    .find(|included| included.kind == "tier" && included.id == tier_ref.id)
                    .and_then(|tier| tier.attributes.title.clone())
            });

        let name = match member.attributes.full_name.as_deref() {
            Some(full_name) if !full_name.is_empty() => full_name.to_string(),
            _ => "Anonymous Patron".to_string(),
        };

        let created_at = member
            .attributes
            .pledge_relationship_start
            .clone()
            .unwrap_or_else(now_rfc3339);

        sponsors.push(Sponsor {
            id: member.id.clone(),
            name,
            login: member.id.clone(),
            avatar_url: AVATAR_PLACEHOLDER.to_string(),
            link: format!("https://www.patreon.com/user?u={}", member.id),
            platform: Platform::Patreon.as_str().to_string(),
            monthly_amount,
            created_at,
            tier_name,
        });
    }

    sponsors
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

#[derive(Debug, Default, Deserialize)]
struct MembersResponse {
    #[serde(default)]
    data: Vec<Member>,
    #[serde(default)]
    included: Vec<Included>,
    #[serde(default)]
    links: Links,
}

#[derive(Debug, Deserialize)]
struct Member {
    id: String,
    attributes: MemberAttributes,
    #[serde(default)]
    relationships: Relationships,
}

#[derive(Debug, Default, Deserialize)]
struct MemberAttributes {
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    patron_status: Option<String>,
    #[serde(default)]
    currently_entitled_amount_cents: u32,
    #[serde(default)]
    pledge_relationship_start: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Relationships {
    #[serde(default)]
    currently_entitled_tiers: TierRefs,
}

#[derive(Debug, Default, Deserialize)]
struct TierRefs {
    #[serde(default)]
    data: Vec<TierRef>,
}

#[derive(Debug, Deserialize)]
struct TierRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Included {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    attributes: IncludedAttributes,
}

#[derive(Debug, Default, Deserialize)]
struct IncludedAttributes {
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Links {
    #[serde(default)]
    next: Option<String>,
}
