//! Cross-source player reconciliation: normalize both feeds' names, match the
//! leftovers by surname and similarity, overlay curated aliases, and merge
//! into one unified record per player per gameweek.

use std::collections::BTreeMap;

use gwr_core::{Gameweek, SourceRecord, SourceTag, UnifiedRecord};
use serde::Serialize;
use tracing::{debug, info, info_span};

pub mod candidates;
pub mod error;
pub mod merge;
pub mod normalize;
pub mod overrides;
pub mod resolve;

pub use candidates::{find_candidates, unmatched_names, CandidateMap, UnmatchedNames};
pub use error::{NormalizationAmbiguity, ReconcileError, ResolutionStage, UnresolvedName};
pub use merge::{canonicalize, merge, CanonicalRecord};
pub use normalize::{clean_display_name, normalize, normalize_checked, NormalizedName};
pub use overrides::{apply_overrides, OverrideTable};
pub use resolve::{resolve, similarity_ratio, Resolution, ResolvedPair};

pub const CRATE_NAME: &str = "gwr-reconcile";

/// Fantasy canonical name → analytics canonical name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RenameMapping {
    entries: BTreeMap<String, String>,
}

impl RenameMapping {
    pub fn get(&self, from: &str) -> Option<&str> {
        self.entries.get(from).map(String::as_str)
    }

    pub fn insert(&mut self, from: String, to: String) -> Option<String> {
        self.entries.insert(from, to)
    }

    /// The mapped name, or `name` itself when it has no entry.
    pub fn rename<'a>(&'a self, name: &'a str) -> &'a str {
        self.get(name).unwrap_or(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, String)> for RenameMapping {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Diagnostics of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub gameweek: Gameweek,
    pub override_table_version: u32,
    pub fantasy_records: usize,
    pub analytics_records: usize,
    pub direct_matches: usize,
    pub automatic_pairs: Vec<ResolvedPair>,
    pub override_entries_used: usize,
    pub unresolved_after_automatic: Vec<UnresolvedName>,
    pub unresolved_after_override: Vec<UnresolvedName>,
    pub mapping: RenameMapping,
    pub unified_records: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub records: Vec<UnifiedRecord>,
    pub report: ReconcileReport,
}

fn unresolved_after(
    fantasy: &[CanonicalRecord],
    analytics: &[CanonicalRecord],
    mapping: &RenameMapping,
    stage: ResolutionStage,
) -> Vec<UnresolvedName> {
    let unmatched = unmatched_names(
        fantasy.iter().map(|r| mapping.rename(&r.key)),
        analytics.iter().map(|r| r.key.as_str()),
    );
    let fantasy_only = unmatched.missing_in_analytics.into_iter().map(|name| UnresolvedName {
        name,
        side: SourceTag::Fantasy,
        stage,
    });
    let analytics_only = unmatched.missing_in_fantasy.into_iter().map(|name| UnresolvedName {
        name,
        side: SourceTag::Analytics,
        stage,
    });
    fantasy_only.chain(analytics_only).collect()
}

/// Run normalize → match → resolve → override → merge for one snapshot.
pub fn reconcile(
    fantasy: &[SourceRecord],
    analytics: &[SourceRecord],
    overrides: &OverrideTable,
    gameweek: Gameweek,
) -> Result<Reconciliation, ReconcileError> {
    let span = info_span!("reconcile", %gameweek);
    let _guard = span.enter();

    let fantasy = canonicalize(fantasy);
    let analytics = canonicalize(analytics);

    let unmatched = unmatched_names(
        fantasy.iter().map(|r| r.key.as_str()),
        analytics.iter().map(|r| r.key.as_str()),
    );
    let direct_matches = fantasy
        .iter()
        .filter(|r| !unmatched.missing_in_analytics.contains(&r.key))
        .count();
    let candidates = find_candidates(&unmatched.missing_in_fantasy, &unmatched.missing_in_analytics);
    let resolution = resolve(&candidates);
    let unresolved_after_automatic =
        unresolved_after(&fantasy, &analytics, &resolution.mapping, ResolutionStage::Automatic);

    let active = overrides.active_for(fantasy.iter().map(|r| r.key.as_str()));
    let mapping = apply_overrides(&resolution.mapping, &active);
    let override_entries_used = active.len();
    let unresolved_after_override =
        unresolved_after(&fantasy, &analytics, &mapping, ResolutionStage::Override);

    for name in &unresolved_after_override {
        debug!(%name, "unresolved");
    }

    let records = merge(&fantasy, &analytics, &mapping, gameweek)?;

    info!(
        fantasy = fantasy.len(),
        analytics = analytics.len(),
        direct_matches,
        automatic = resolution.pairs.len(),
        overrides = override_entries_used,
        unresolved_auto = unresolved_after_automatic.len(),
        unresolved_final = unresolved_after_override.len(),
        unified = records.len(),
        "reconciliation complete"
    );

    let report = ReconcileReport {
        gameweek,
        override_table_version: overrides.version(),
        fantasy_records: fantasy.len(),
        analytics_records: analytics.len(),
        direct_matches,
        automatic_pairs: resolution.pairs,
        override_entries_used,
        unresolved_after_automatic,
        unresolved_after_override,
        mapping,
        unified_records: records.len(),
    };
    Ok(Reconciliation { records, report })
}
