//! Filter, override, merge and ordering policy for aggregated sponsors.
//!
//! The policy engine is a pure function over the combined sponsor list:
//! exclusions first (an include entry always wins over an exclude entry for
//! the same login), then per-login forced amounts, then an optional merge of
//! records sharing a login across platforms, and finally a stable sort with
//! the newest pledge first.

use std::collections::{HashMap, HashSet, hash_map::Entry};

use crate::domain::sponsor::Sponsor;

/// Operator policy applied to the combined sponsor list before layout.
#[derive(Debug, Clone, Default)]
pub struct SponsorPolicy {
    exclude: HashSet<String>,
    include: HashSet<String>,
    forced_amounts: HashMap<String, f64>,
    merge_accounts: bool,
}

impl SponsorPolicy {
    /// Build a policy; login keys are matched case-insensitively.
    pub fn new(
        exclude: &[String],
        include: &[String],
        forced_amounts: &HashMap<String, f64>,
        merge_accounts: bool,
    ) -> Self {
        Self {
            exclude: exclude.iter().map(|login| login.to_lowercase()).collect(),
            include: include.iter().map(|login| login.to_lowercase()).collect(),
            forced_amounts: forced_amounts
                .iter()
                .map(|(login, amount)| (login.to_lowercase(), *amount))
                .collect(),
            merge_accounts,
        }
    }

    /// Apply the full policy pipeline and return the ordered list.
    pub fn apply(&self, sponsors: Vec<Sponsor>) -> Vec<Sponsor> {
        let mut result: Vec<Sponsor> = sponsors
            .into_iter()
            .filter(|sponsor| self.is_retained(sponsor))
            .collect();

        for sponsor in &mut result {
            if let Some(amount) = self.forced_amounts.get(&sponsor.merge_key()) {
                sponsor.monthly_amount = *amount;
            }
        }

        if self.merge_accounts {
            result = merge_duplicates(result);
        }

        sort_newest_first(&mut result);
        result
    }

    fn is_retained(&self, sponsor: &Sponsor) -> bool {
        let key = sponsor.merge_key();
        !self.exclude.contains(&key) || self.include.contains(&key)
    }
}

/// Combine records sharing a lowercased login: amounts are summed, the
/// earliest pledge start wins, platform tags are unioned without
/// duplicates. Output order is unspecified; callers rely on the sort step.
pub fn merge_duplicates(sponsors: Vec<Sponsor>) -> Vec<Sponsor> {
    let mut merged: HashMap<String, Sponsor> = HashMap::with_capacity(sponsors.len());

    for sponsor in sponsors {
        match merged.entry(sponsor.merge_key()) {
            Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                existing.monthly_amount += sponsor.monthly_amount;
                if sponsor.created_at < existing.created_at {
                    existing.created_at = sponsor.created_at;
                }
                if !existing.platform.split(',').any(|tag| tag == sponsor.platform) {
                    existing.platform.push(',');
                    existing.platform.push_str(&sponsor.platform);
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(sponsor);
            }
        }
    }

    merged.into_values().collect()
}

/// Stable descending order on `created_at`; equal timestamps preserve the
/// prior relative order. The amount is deliberately not a sort key.
pub fn sort_newest_first(sponsors: &mut [Sponsor]) {
    sponsors.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sponsor::Platform;

    fn sponsor(login: &str, amount: f64, created_at: &str, platform: Platform) -> Sponsor {
        Sponsor {
            id: format!("{platform}:{login}"),
            name: login.to_string(),
            login: login.to_string(),
            avatar_url: String::new(),
            link: String::new(),
            platform: platform.as_str().to_string(),
            monthly_amount: amount,
            created_at: created_at.to_string(),
            tier_name: None,
        }
    }

    fn policy(exclude: &[&str], include: &[&str], merge: bool) -> SponsorPolicy {
        let exclude: Vec<String> = exclude.iter().map(|s| s.to_string()).collect();
        let include: Vec<String> = include.iter().map(|s| s.to_string()).collect();
        SponsorPolicy::new(&exclude, &include, &HashMap::new(), merge)
    }

    #[test]
    fn exclusion_matches_case_insensitively() {
        let result = policy(&["spammer"], &[], false).apply(vec![
            sponsor("Spammer", 1.0, "2023-01-01T00:00:00Z", Platform::GitHub),
            sponsor("keeper", 2.0, "2023-01-02T00:00:00Z", Platform::GitHub),
        ]);

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].login, "keeper");
    }

    #[test]
    fn include_overrides_exclude() {
        let result = policy(&["vip"], &["VIP"], false).apply(vec![sponsor(
            "vip",
            10.0,
            "2023-01-01T00:00:00Z",
            Platform::GitHub,
        )]);

        assert_eq!(result.len(), 1, "include must win over exclude");
    }

    #[test]
    fn forced_amount_replaces_fetched_amount() {
        let mut forced = HashMap::new();
        forced.insert("Backer".to_string(), 42.0);
        let policy = SponsorPolicy::new(&[], &[], &forced, false);

        let result = policy.apply(vec![sponsor(
            "backer",
            3.0,
            "2023-01-01T00:00:00Z",
            Platform::Patreon,
        )]);

        assert_eq!(result[0].monthly_amount, 42.0);
    }

    #[test]
    fn merge_sums_amounts_and_keeps_earliest_date() {
        let result = policy(&[], &[], true).apply(vec![
            sponsor("a", 5.0, "2023-01-01T00:00:00Z", Platform::GitHub),
            sponsor("a", 3.0, "2022-06-01T00:00:00Z", Platform::OpenCollective),
        ]);

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].monthly_amount, 8.0);
        assert_eq!(result[0].created_at, "2022-06-01T00:00:00Z");
        assert_eq!(result[0].platform, "github,opencollective");
    }

    #[test]
    fn merge_does_not_duplicate_platform_tags() {
        let merged = merge_duplicates(vec![
            sponsor("a", 1.0, "2023-01-01T00:00:00Z", Platform::GitHub),
            sponsor("a", 2.0, "2023-02-01T00:00:00Z", Platform::GitHub),
        ]);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].platform, "github");
        assert_eq!(merged[0].monthly_amount, 3.0);
    }

    #[test]
    fn merge_conserves_total_amount() {
        let inputs = vec![
            sponsor("a", 1.5, "2023-01-01T00:00:00Z", Platform::GitHub),
            sponsor("A", 2.5, "2023-02-01T00:00:00Z", Platform::Patreon),
            sponsor("b", 4.0, "2023-03-01T00:00:00Z", Platform::Afdian),
        ];
        let total: f64 = inputs.iter().map(|s| s.monthly_amount).sum();

        let merged = merge_duplicates(inputs);
        let merged_total: f64 = merged.iter().map(|s| s.monthly_amount).sum();

        assert_eq!(merged.len(), 2);
        assert!((total - merged_total).abs() < f64::EPSILON);
    }

    #[test]
    fn disabled_merge_keeps_duplicate_logins() {
        let result = policy(&[], &[], false).apply(vec![
            sponsor("a", 5.0, "2023-01-01T00:00:00Z", Platform::GitHub),
            sponsor("a", 3.0, "2022-06-01T00:00:00Z", Platform::OpenCollective),
        ]);

        assert_eq!(result.len(), 2);
    }

    #[test]
    fn output_is_ordered_newest_first() {
        let result = policy(&[], &[], false).apply(vec![
            sponsor("old", 1.0, "2021-05-01T00:00:00Z", Platform::GitHub),
            sponsor("new", 1.0, "2024-02-01T00:00:00Z", Platform::GitHub),
            sponsor("mid", 1.0, "2022-08-01T00:00:00Z", Platform::GitHub),
        ]);

        let logins: Vec<&str> = result.iter().map(|s| s.login.as_str()).collect();
        assert_eq!(logins, ["new", "mid", "old"]);
    }

    #[test]
    fn equal_timestamps_preserve_input_order() {
        let mut sponsors = vec![
            sponsor("first", 1.0, "2023-01-01T00:00:00Z", Platform::GitHub),
            sponsor("second", 9.0, "2023-01-01T00:00:00Z", Platform::Patreon),
            sponsor("third", 5.0, "2023-01-01T00:00:00Z", Platform::Afdian),
        ];

        sort_newest_first(&mut sponsors);

        let logins: Vec<&str> = sponsors.iter().map(|s| s.login.as_str()).collect();
        assert_eq!(logins, ["first", "second", "third"]);
    }
}
