//! OpenCollective contributions via the GraphQL v2 API.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::OpenCollectiveSettings;
use crate::domain::sponsor::{Platform, Sponsor};

use super::{FetchError, SponsorSource, error_for_status};

const GRAPHQL_ENDPOINT: &str = "https://api.opencollective.com/graphql/v2";
const MONTHS_PER_YEAR: f64 = 12.0;

const ORDERS_QUERY: &str = r#"
query($slug: String!) {
  account(slug: $slug) {
    orders(status: ACTIVE, filter: INCOMING) {
      nodes {
        fromAccount { id name slug imageUrl website company isActive }
        amount { value currency }
        frequency
        createdAt
        tier { name }
      }
    }
  }
}
"#;

pub struct OpenCollectiveSource {
    client: reqwest::Client,
    slug: String,
    api_key: Option<String>,
}

impl OpenCollectiveSource {
    /// Construct the source when a collective slug is configured.
    pub fn from_settings(
        client: &reqwest::Client,
        settings: &OpenCollectiveSettings,
    ) -> Option<Self> {
        let slug = settings.slug.clone()?;
        Some(Self {
            client: client.clone(),
            slug,
            api_key: settings.api_key.clone(),
        })
    }
}

#[async_trait]
impl SponsorSource for OpenCollectiveSource {
    fn platform(&self) -> Platform {
        Platform::OpenCollective
    }

    async fn fetch(&self) -> Result<Vec<Sponsor>, FetchError> {
        let body = json!({
            "query": ORDERS_QUERY,
            "variables": { "slug": self.slug },
        });

        let mut request = self.client.post(GRAPHQL_ENDPOINT).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.header("Api-Key", api_key);
        }

        let response = error_for_status(request.send().await?).await?;
        let payload: OrdersResponse = response.json().await?;

        if let Some(error) = payload.errors.first() {
            return Err(FetchError::Api(error.message.clone()));
        }

        let nodes = payload
            .data
            .and_then(|data| data.account)
            .map(|account| account.orders.nodes)
            .unwrap_or_default();

        Ok(map_orders(nodes))
    }
}

/// Inactive contributor accounts and unknown billing frequencies are dropped;
/// yearly and one-time contributions are spread over twelve months.
fn map_orders(nodes: Vec<OrderNode>) -> Vec<Sponsor> {
    let mut sponsors = Vec::with_capacity(nodes.len());

    for node in nodes {
        if !node.from_account.is_active {
            continue;
        }

        let monthly_amount = match node.frequency.as_str() {
            "MONTHLY" => node.amount.value,
            "YEARLY" | "ONE_TIME" => node.amount.value / MONTHS_PER_YEAR,
            _ => continue,
        };

        let account = node.from_account;
        let link = account
            .website
            .filter(|website| !website.is_empty())
            .unwrap_or_else(|| format!("https://opencollective.com/{}", account.slug));
        let name = account
            .company
            .filter(|company| !company.is_empty())
            .unwrap_or(account.name);

        sponsors.push(Sponsor {
            id: account.id,
            name,
            login: account.slug,
            avatar_url: account.image_url,
            link,
            platform: Platform::OpenCollective.as_str().to_string(),
            monthly_amount,
            created_at: node.created_at,
            tier_name: node.tier.and_then(|tier| tier.name),
        });
    }

    sponsors
}

#[derive(Debug, Default, Deserialize)]
struct OrdersResponse {
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
    account: Option<AccountNode>,
}

#[derive(Debug, Deserialize)]
struct AccountNode {
    orders: OrderConnection,
}

#[derive(Debug, Default, Deserialize)]
struct OrderConnection {
    #[serde(default)]
    nodes: Vec<OrderNode>,
}

#[derive(Debug, Deserialize)]
struct OrderNode {
    #[serde(rename = "fromAccount")]
    from_account: FromAccount,
    amount: Amount,
    #[serde(default)]
    frequency: String,
    #[serde(rename = "createdAt", default)]
    created_at: String,
    #[serde(default)]
    tier: Option<Tier>,
}

#[derive(Debug, Deserialize)]
struct FromAccount {
    id: String,
    #[serde(default)]
    name: String,
    slug: String,
    #[serde(rename = "imageUrl", default)]
    image_url: String,
    #[serde(default)]
    website: Option<String>,
    #[serde(default)]
    company: Option<String>,
    #[serde(rename = "isActive", default)]
    is_active: bool,
}

#[derive(Debug, Default, Deserialize)]
struct Amount {
    #[serde(default)]
    value: f64,
}

#[derive(Debug, Deserialize)]
struct Tier {
    #[serde(default)]
    name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(frequency: &str, value: f64, active: bool) -> OrderNode {
        serde_json::from_value(serde_json::json!({
            "fromAccount": {
                "id": "acct-1",
                "name": "Jane",
                "slug": "jane",
                "imageUrl": "https://images.example/jane.png",
                "website": null,
                "company": null,
                "isActive": active
            },
            "amount": { "value": value },
            "frequency": frequency,
            "createdAt": "2022-11-05T08:00:00Z",
            "tier": { "name": "Backer" }
        }))
        .expect("decode order")
    }

    #[test]
    fn monthly_orders_pass_through() {
        let sponsors = map_orders(vec![order("MONTHLY", 12.0, true)]);
        assert_eq!(sponsors.len(), 1);
        assert_eq!(sponsors[0].monthly_amount, 12.0);
        assert_eq!(sponsors[0].platform, "opencollective");
        assert_eq!(sponsors[0].link, "https://opencollective.com/jane");
        assert_eq!(sponsors[0].tier_name.as_deref(), Some("Backer"));
    }

    #[test]
    fn yearly_and_one_time_orders_are_spread_over_a_year() {
        let sponsors = map_orders(vec![order("YEARLY", 120.0, true), order("ONE_TIME", 60.0, true)]);
        assert_eq!(sponsors[0].monthly_amount, 10.0);
        assert_eq!(sponsors[1].monthly_amount, 5.0);
    }

    #[test]
    fn inactive_accounts_and_unknown_frequencies_are_skipped() {
        let sponsors = map_orders(vec![
            order("MONTHLY", 10.0, false),
            order("WEEKLY", 10.0, true),
        ]);
        assert!(sponsors.is_empty());
    }

    #[test]
    fn company_and_website_take_precedence() {
        let node: OrderNode = serde_json::from_value(serde_json::json!({
            "fromAccount": {
                "id": "acct-2",
                "name": "John",
                "slug": "acme",
                "imageUrl": "",
                "website": "https://acme.example",
                "company": "Acme Corp",
                "isActive": true
            },
            "amount": { "value": 50.0 },
            "frequency": "MONTHLY",
            "createdAt": "2021-01-01T00:00:00Z",
            "tier": null
        }))
        .expect("decode order");

        let sponsors = map_orders(vec![node]);
        assert_eq!(sponsors[0].name, "Acme Corp");
        assert_eq!(sponsors[0].link, "https://acme.example");
    }
}
