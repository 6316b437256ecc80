//! Curated alias table for names the automatic matcher cannot resolve.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::normalize::{clean_display_name, normalize};
use crate::RenameMapping;

/// Name as the merger keys it. Override sides carry no short-name hint.
fn canonical_key(name: &str) -> String {
    normalize(name, None).full
}

/// Compiled-in copy of `rules/overrides.yaml`.
pub const BUILTIN_OVERRIDES_YAML: &str = include_str!("../../../rules/overrides.yaml");

#[derive(Debug, Clone, Deserialize)]
struct OverridesFile {
    version: u32,
    #[serde(default)]
    aliases: Vec<AliasEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct AliasEntry {
    fantasy: String,
    analytics: String,
    #[serde(default)]
    #[allow(dead_code)]
    reason: Option<String>,
}

/// Immutable fantasy → analytics alias table, loaded once per run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideTable {
    version: u32,
    entries: RenameMapping,
}

impl OverrideTable {
    pub fn builtin() -> Result<Self> {
        Self::from_yaml_str(BUILTIN_OVERRIDES_YAML).context("parsing built-in override table")
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let file: OverridesFile = serde_yaml::from_str(text)?;
        let mut entries = RenameMapping::default();
        for alias in file.aliases {
            let fantasy = clean_display_name(&alias.fantasy);
            let analytics = clean_display_name(&alias.analytics);
            if fantasy.is_empty() || analytics.is_empty() {
                bail!("override entry with an empty name: {:?} -> {:?}", alias.fantasy, alias.analytics);
            }
            for name in [&fantasy, &analytics] {
                let canonical = canonical_key(name);
                if &canonical != name {
                    bail!("override name {name:?} is not a canonical key; it normalizes to {canonical:?}");
                }
            }
            if fantasy == analytics {
                bail!("override entry maps {fantasy:?} onto itself");
            }
            if let Some(existing) = entries.get(&fantasy) {
                if existing != analytics {
                    bail!("conflicting overrides for {fantasy:?}: {existing:?} and {analytics:?}");
                }
            }
            entries.insert(fantasy, analytics);
        }
        Ok(Self {
            version: file.version,
            entries,
        })
    }

    pub fn from_pairs<I, K, V>(version: u32, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let entries = pairs
            .into_iter()
            .map(|(k, v)| (canonical_key(k.as_ref()), canonical_key(v.as_ref())))
            .collect();
        Self { version, entries }
    }

    /// Entries whose fantasy name is among `fantasy_keys`. Entries for players
    /// absent from the snapshot are left out.
    pub fn active_for<'a>(&self, fantasy_keys: impl IntoIterator<Item = &'a str>) -> RenameMapping {
        fantasy_keys
            .into_iter()
            .filter_map(|key| self.entries.get(key).map(|to| (key.to_string(), to.to_string())))
            .collect()
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn mapping(&self) -> &RenameMapping {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Overlay `overrides` on `auto`. Override entries win on key collision, and
/// automatic entries that target an analytics name claimed by an override are
/// dropped so the override cannot produce a duplicate key. Pass only the
/// entries active for the snapshot ([`OverrideTable::active_for`]).
pub fn apply_overrides(auto: &RenameMapping, overrides: &RenameMapping) -> RenameMapping {
    let claimed: std::collections::BTreeSet<&str> = overrides.iter().map(|(_, to)| to).collect();
    let mut merged: RenameMapping = auto
        .iter()
        .filter(|(from, to)| {
            let displaced = claimed.contains(to) && overrides.get(from) != Some(*to);
            if displaced {
                debug!(fantasy_name = %from, analytics_name = %to, "automatic match displaced by override");
            }
            !displaced
        })
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .collect();
    for (from, to) in overrides.iter() {
        merged.insert(from.to_string(), to.to_string());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn builtin_table_parses() {
        let table = OverrideTable::builtin().unwrap();
        assert!(table.len() >= 20);
        assert_eq!(table.mapping().get("Bamidele Alli"), Some("Dele Alli"));
        assert_eq!(table.mapping().get("Mahmoud Trezeguet"), Some("Trezeguet"));
    }

    #[test]
    fn entries_are_cleaned_on_load() {
        let table = OverrideTable::from_yaml_str(
            "version: 1\naliases:\n  - fantasy: \"Gabriel Magalhães\"\n    analytics: \"Gabriel\"\n",
        )
        .unwrap();
        assert_eq!(table.version(), 1);
        assert_eq!(table.mapping().get("Gabriel Magalhaes"), Some("Gabriel"));
    }

    #[test]
    fn builtin_entries_are_canonical_keys() {
        let table = OverrideTable::builtin().unwrap();
        for (from, to) in table.mapping().iter() {
            assert_eq!(normalize(from, None).full, from);
            assert_eq!(normalize(to, None).full, to);
            assert_ne!(from, to);
        }
    }

    #[test]
    fn non_canonical_entries_are_rejected() {
        let err = OverrideTable::from_yaml_str(
            "version: 1\naliases:\n  - {fantasy: Anwar Ghazi, analytics: Anwar El Ghazi}\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("normalizes to \"Anwar Ghazi\""));

        let err = OverrideTable::from_yaml_str(
            "version: 1\naliases:\n  - {fantasy: Kepa, analytics: Kepa}\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("onto itself"));
    }

    #[test]
    fn active_entries_follow_the_snapshot() {
        let table = OverrideTable::from_pairs(
            2,
            [("Bamidele Alli", "Dele Alli"), ("Max Kilman", "Maximilian Kilman")],
        );
        let active = table.active_for(["Max Kilman", "Mohamed Salah"]);
        assert_eq!(active.len(), 1);
        assert_eq!(active.get("Max Kilman"), Some("Maximilian Kilman"));
        assert!(table.active_for([]).is_empty());
    }

    #[test]
    fn conflicting_entries_are_rejected() {
        let err = OverrideTable::from_yaml_str(
            "version: 1\naliases:\n  - {fantasy: A B, analytics: C}\n  - {fantasy: A B, analytics: D}\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("conflicting overrides"));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "version: 7\naliases:\n  - fantasy: Max Kilman\n    analytics: Maximilian Kilman").unwrap();
        let table = OverrideTable::from_path(file.path()).unwrap();
        assert_eq!(table.version(), 7);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn overrides_win_and_appear_verbatim() {
        let auto: RenameMapping = [
            ("Bamidele Alli", "Dennis Alli"),
            ("Heung-Min Son", "Son Heung-Min"),
            ("Harvey Alli", "Dele Alli"),
        ]
        .into_iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect();
        let overrides = OverrideTable::from_pairs(1, [("Bamidele Alli", "Dele Alli")]);

        let merged = apply_overrides(&auto, overrides.mapping());
        for (from, to) in overrides.mapping().iter() {
            assert_eq!(merged.get(from), Some(to));
        }
        assert_eq!(merged.get("Heung-Min Son"), Some("Son Heung-Min"));
        assert_eq!(merged.get("Harvey Alli"), None);
    }
}
