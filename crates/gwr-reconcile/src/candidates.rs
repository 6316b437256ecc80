//! Set-difference of the two key sets and surname-substring candidate search.

use std::collections::{BTreeMap, BTreeSet};

/// Candidate fantasy names per analytics-only name, in lexicographic order.
pub type CandidateMap = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnmatchedNames {
    /// Analytics keys with no fantasy record under the same key.
    pub missing_in_fantasy: BTreeSet<String>,
    /// Fantasy keys with no analytics record under the same key.
    pub missing_in_analytics: BTreeSet<String>,
}

impl UnmatchedNames {
    pub fn is_empty(&self) -> bool {
        self.missing_in_fantasy.is_empty() && self.missing_in_analytics.is_empty()
    }
}

pub fn unmatched_names<'a, F, A>(fantasy_keys: F, analytics_keys: A) -> UnmatchedNames
where
    F: IntoIterator<Item = &'a str>,
    A: IntoIterator<Item = &'a str>,
{
    let fantasy: BTreeSet<&str> = fantasy_keys.into_iter().collect();
    let analytics: BTreeSet<&str> = analytics_keys.into_iter().collect();
    UnmatchedNames {
        missing_in_fantasy: analytics.difference(&fantasy).map(|s| s.to_string()).collect(),
        missing_in_analytics: fantasy.difference(&analytics).map(|s| s.to_string()).collect(),
    }
}

pub fn surname(name: &str) -> &str {
    name.split_whitespace().last().unwrap_or_default()
}

/// For each analytics-only name, the fantasy-only names containing its
/// surname (case-sensitive substring).
pub fn find_candidates(
    missing_in_fantasy: &BTreeSet<String>,
    missing_in_analytics: &BTreeSet<String>,
) -> CandidateMap {
    missing_in_fantasy
        .iter()
        .map(|name| {
            let sub = surname(name);
            let candidates = if sub.is_empty() {
                Vec::new()
            } else {
                missing_in_analytics
                    .iter()
                    .filter(|candidate| candidate.contains(sub))
                    .cloned()
                    .collect()
            };
            (name.clone(), candidates)
        })
        .collect()
}
