//! Similarity scoring of candidate pairs.

use serde::Serialize;
use strsim::normalized_levenshtein;
use tracing::{debug, warn};

use crate::candidates::CandidateMap;
use crate::RenameMapping;

/// Edit-similarity ratio on a 0-100 scale. Symmetric and case-sensitive.
pub fn similarity_ratio(a: &str, b: &str) -> u8 {
    (normalized_levenshtein(a, b) * 100.0).round() as u8
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPair {
    pub fantasy_name: String,
    pub analytics_name: String,
    /// `None` when the pair was the only candidate and was never scored.
    pub score: Option<u8>,
    pub candidate_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub mapping: RenameMapping,
    pub pairs: Vec<ResolvedPair>,
    /// Analytics names left without a fantasy counterpart.
    pub unresolved: Vec<String>,
}

/// Highest-ratio candidate; ties keep the earlier one.
fn best_candidate<'a>(name: &str, candidates: &'a [String]) -> Option<(&'a String, u8)> {
    candidates
        .iter()
        .map(|candidate| (candidate, similarity_ratio(name, candidate)))
        .fold(None, |best, (candidate, score)| match best {
            Some((_, best_score)) if best_score >= score => best,
            _ => Some((candidate, score)),
        })
}

/// Pick one fantasy name per analytics-only name. The mapping runs
/// fantasy → analytics so the merger renames only the fantasy side.
pub fn resolve(candidates: &CandidateMap) -> Resolution {
    candidates
        .iter()
        .fold(Resolution::default(), |mut acc, (name, list)| {
            let chosen = match list.as_slice() {
                [] => None,
                [only] => Some((only, None)),
                many => best_candidate(name, many).map(|(c, score)| (c, Some(score))),
            };

            let Some((candidate, score)) = chosen else {
                debug!(analytics_name = %name, "no surname candidates");
                acc.unresolved.push(name.clone());
                return acc;
            };

            if let Some(claimed_by) = acc.mapping.get(candidate) {
                warn!(
                    fantasy_name = %candidate,
                    claimed_by,
                    analytics_name = %name,
                    "fantasy name already resolved to another player"
                );
                acc.unresolved.push(name.clone());
                return acc;
            }

            acc.mapping.insert(candidate.clone(), name.clone());
            acc.pairs.push(ResolvedPair {
                fantasy_name: candidate.clone(),
                analytics_name: name.clone(),
                score,
                candidate_count: list.len(),
            });
            acc
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(entries: &[(&str, &[&str])]) -> CandidateMap {
        entries
            .iter()
            .map(|(name, list)| (name.to_string(), list.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    #[test]
    fn ratio_is_symmetric_and_bounded() {
        assert_eq!(similarity_ratio("Dele Alli", "Dele Alli"), 100);
        assert_eq!(similarity_ratio("abc", "xyz"), 0);
        assert_eq!(
            similarity_ratio("Ben White", "Benjamin White"),
            similarity_ratio("Benjamin White", "Ben White")
        );
        assert_ne!(similarity_ratio("alli", "Alli"), 100);
    }

    #[test]
    fn empty_candidates_emit_nothing() {
        let resolution = resolve(&candidates(&[("Dele Alli", &[])]));
        assert!(resolution.mapping.is_empty());
        assert_eq!(resolution.unresolved, vec!["Dele Alli".to_string()]);
    }

    #[test]
    fn single_candidate_maps_without_scoring() {
        let resolution = resolve(&candidates(&[("Son Heung-Min", &["Heung-Min Son"])]));
        assert_eq!(resolution.mapping.get("Heung-Min Son"), Some("Son Heung-Min"));
        assert_eq!(resolution.pairs[0].score, None);
        assert!(resolution.unresolved.is_empty());
    }

    #[test]
    fn multiple_candidates_pick_highest_ratio() {
        let list = ["Harvey White", "Benjamin White"];
        let resolution = resolve(&candidates(&[("Ben White", &list)]));
        let chosen = resolution.pairs[0].fantasy_name.clone();
        assert_eq!(chosen, "Benjamin White");
        let chosen_score = similarity_ratio("Ben White", &chosen);
        for other in list {
            assert!(chosen_score >= similarity_ratio("Ben White", other));
        }
        assert_eq!(resolution.pairs[0].score, Some(chosen_score));
    }

    #[test]
    fn ties_keep_first_candidate() {
        let resolution = resolve(&candidates(&[("Sam Jones", &["Sam Jonesa", "Sam Jonesb"])]));
        assert_eq!(resolution.mapping.get("Sam Jonesa"), Some("Sam Jones"));
        assert_eq!(resolution.mapping.get("Sam Jonesb"), None);
    }

    #[test]
    fn contested_fantasy_name_stays_with_first_claim() {
        let resolution = resolve(&candidates(&[
            ("Adam Smith", &["Adam Smith-Jones"]),
            ("Bob Smith", &["Adam Smith-Jones"]),
        ]));
        assert_eq!(resolution.mapping.get("Adam Smith-Jones"), Some("Adam Smith"));
        assert_eq!(resolution.unresolved, vec!["Bob Smith".to_string()]);
    }

    #[test]
    fn input_is_left_untouched() {
        let input = candidates(&[("Dele Alli", &["Bamidele Alli"]), ("Kepa", &[])]);
        let snapshot = input.clone();
        let first = resolve(&input);
        let second = resolve(&input);
        assert_eq!(input, snapshot);
        assert_eq!(first, second);
    }
}
