//! Outer join of the two canonicalized record sets.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use gwr_core::{Gameweek, SourceRecord, SourceTag, UnifiedRecord};

use crate::error::ReconcileError;
use crate::normalize::normalize;
use crate::RenameMapping;

/// A source record paired with its canonical name key.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    pub key: String,
    pub record: SourceRecord,
}

/// Normalize every record's display name into its canonical key.
pub fn canonicalize(records: &[SourceRecord]) -> Vec<CanonicalRecord> {
    records
        .iter()
        .map(|record| CanonicalRecord {
            key: normalize(&record.display_name, record.short_name.as_deref()).full,
            record: record.clone(),
        })
        .collect()
}

fn index_by_key<'a, I>(side: SourceTag, keyed: I) -> Result<BTreeMap<String, &'a SourceRecord>, ReconcileError>
where
    I: IntoIterator<Item = (String, &'a SourceRecord)>,
{
    let mut index: BTreeMap<String, &'a SourceRecord> = BTreeMap::new();
    for (key, record) in keyed {
        match index.entry(key) {
            Entry::Occupied(existing) => {
                let first = existing.get();
                return Err(ReconcileError::DuplicateCanonicalKey {
                    side,
                    key: existing.key().clone(),
                    first_raw: first.display_name.clone(),
                    second_raw: record.display_name.clone(),
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
        }
    }
    Ok(index)
}

/// Rename the fantasy side through `mapping`, then outer-join both sides on
/// the canonical key. Output is ordered by key.
pub fn merge(
    fantasy: &[CanonicalRecord],
    analytics: &[CanonicalRecord],
    mapping: &RenameMapping,
    gameweek: Gameweek,
) -> Result<Vec<UnifiedRecord>, ReconcileError> {
    let fantasy = index_by_key(
        SourceTag::Fantasy,
        fantasy.iter().map(|r| (mapping.rename(&r.key).to_string(), &r.record)),
    )?;
    let analytics = index_by_key(
        SourceTag::Analytics,
        analytics.iter().map(|r| (r.key.clone(), &r.record)),
    )?;

    let keys: BTreeSet<&String> = fantasy.keys().chain(analytics.keys()).collect();
    Ok(keys
        .into_iter()
        .map(|key| {
            UnifiedRecord::join(
                key.clone(),
                gameweek,
                fantasy.get(key).copied(),
                analytics.get(key).copied(),
            )
        })
        .collect())
}
