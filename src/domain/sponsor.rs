//! Sponsor records normalized across funding platforms.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Funding platforms a sponsor record can originate from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    GitHub,
    OpenCollective,
    Patreon,
    Afdian,
}

impl Platform {
    /// Wire tag used in [`Sponsor::platform`] and in artifact output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::GitHub => "github",
            Platform::OpenCollective => "opencollective",
            Platform::Patreon => "patreon",
            Platform::Afdian => "afdian",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One funding relationship, normalized to a monthly amount.
///
/// `login` lowercased is the identity key used for policy filtering and
/// cross-platform merging. `created_at` is an ISO-8601 timestamp, so
/// lexicographic comparison orders chronologically. After a merge,
/// `platform` may carry several comma-joined tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sponsor {
    pub id: String,
    pub name: String,
    pub login: String,
    pub avatar_url: String,
    pub link: String,
    pub platform: String,
    pub monthly_amount: f64,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier_name: Option<String>,
}

impl Sponsor {
    /// Lowercased identity key for dedup and filter matching.
    pub fn merge_key(&self) -> String {
        self.login.to_lowercase()
    }
}
