//! Core domain model shared by the feed adapters, the reconciliation engine
//! and the persistence/export collaborators.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CRATE_NAME: &str = "gwr-core";

/// Which feed a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    /// Fantasy-points feed (source A).
    Fantasy,
    /// Expected-goals analytics feed (source B).
    Analytics,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::Fantasy => "fantasy",
            SourceTag::Analytics => "analytics",
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time bucket identifying one weekly snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gameweek(pub u32);

impl Gameweek {
    pub fn number(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Gameweek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GW{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid gameweek identifier: {0:?}")]
pub struct ParseGameweekError(pub String);

impl FromStr for Gameweek {
    type Err = ParseGameweekError;

    /// Accepts `5`, `GW5`, `Gameweek 5` and `Gameweek5`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let lower = trimmed.to_ascii_lowercase();
        let digits = lower
            .strip_prefix("gameweek")
            .or_else(|| lower.strip_prefix("gw"))
            .unwrap_or(&lower)
            .trim();
        digits
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .map(Gameweek)
            .ok_or_else(|| ParseGameweekError(trimmed.to_string()))
    }
}

/// Playing position as encoded by the fantasy feed's `element_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Position {
    #[serde(rename = "GK")]
    Goalkeeper,
    #[serde(rename = "DEF")]
    Defender,
    #[serde(rename = "MID")]
    Midfielder,
    #[serde(rename = "FWD")]
    Forward,
}

impl Position {
    pub fn from_element_type(code: i64) -> Option<Self> {
        match code {
            1 => Some(Position::Goalkeeper),
            2 => Some(Position::Defender),
            3 => Some(Position::Midfielder),
            4 => Some(Position::Forward),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Position::Goalkeeper => "GK",
            Position::Defender => "DEF",
            Position::Midfielder => "MID",
            Position::Forward => "FWD",
        }
    }
}

/// One player's stats from one feed for one snapshot. Immutable once decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub source: SourceTag,
    pub source_id: String,
    pub display_name: String,
    /// Secondary short-name hint (the fantasy feed's `web_name`).
    pub short_name: Option<String>,
    pub stats: BTreeMap<String, f64>,
}

impl SourceRecord {
    pub fn new(source: SourceTag, source_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            source,
            source_id: source_id.into(),
            display_name: display_name.into(),
            short_name: None,
            stats: BTreeMap::new(),
        }
    }

    pub fn with_short_name(mut self, short_name: impl Into<String>) -> Self {
        self.short_name = Some(short_name.into());
        self
    }

    pub fn with_stat(mut self, name: impl Into<String>, value: f64) -> Self {
        self.stats.insert(name.into(), value);
        self
    }

    /// Stat value, zero when the feed did not carry it.
    pub fn stat(&self, name: &str) -> f64 {
        self.stats.get(name).copied().unwrap_or(0.0)
    }

    fn stat_int(&self, name: &str) -> i64 {
        self.stat(name).round() as i64
    }
}

/// Stat keys the fantasy adapter must decode for every player.
pub const FANTASY_STAT_KEYS: &[&str] = &[
    "element_type",
    "team",
    "total_points",
    "goals_scored",
    "assists",
    "clean_sheets",
    "bonus",
    "saves",
    "yellow_cards",
    "red_cards",
    "form",
    "points_per_game",
    "penalties_saved",
    "penalties_missed",
    "influence",
    "creativity",
    "threat",
    "ict_index",
    "transfers_in_event",
    "transfers_out_event",
];

/// Stat keys the analytics adapter must decode for every player.
pub const ANALYTICS_STAT_KEYS: &[&str] = &[
    "key_passes",
    "npg",
    "npxG",
    "shots",
    "xA",
    "xG",
    "xGBuildup",
    "xGChain",
];

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FantasyStats {
    pub team: i64,
    pub total_points: i64,
    pub goals_scored: i64,
    pub assists: i64,
    pub clean_sheets: i64,
    pub bonus: i64,
    pub saves: i64,
    pub yellow_cards: i64,
    pub red_cards: i64,
    pub form: f64,
    pub points_per_game: f64,
    pub penalties_saved: i64,
    pub penalties_missed: i64,
    pub influence: f64,
    pub creativity: f64,
    pub threat: f64,
    pub ict_index: f64,
    pub transfers_in_event: i64,
    pub transfers_out_event: i64,
}

impl FantasyStats {
    pub fn from_record(record: &SourceRecord) -> Self {
        Self {
            team: record.stat_int("team"),
            total_points: record.stat_int("total_points"),
            goals_scored: record.stat_int("goals_scored"),
            assists: record.stat_int("assists"),
            clean_sheets: record.stat_int("clean_sheets"),
            bonus: record.stat_int("bonus"),
            saves: record.stat_int("saves"),
            yellow_cards: record.stat_int("yellow_cards"),
            red_cards: record.stat_int("red_cards"),
            form: record.stat("form"),
            points_per_game: record.stat("points_per_game"),
            penalties_saved: record.stat_int("penalties_saved"),
            penalties_missed: record.stat_int("penalties_missed"),
            influence: record.stat("influence"),
            creativity: record.stat("creativity"),
            threat: record.stat("threat"),
            ict_index: record.stat("ict_index"),
            transfers_in_event: record.stat_int("transfers_in_event"),
            transfers_out_event: record.stat_int("transfers_out_event"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalyticsStats {
    pub key_passes: i64,
    pub npg: f64,
    pub npxg: f64,
    pub shots: i64,
    pub xa: f64,
    pub xg: f64,
    pub xg_buildup: f64,
    pub xg_chain: f64,
}

impl AnalyticsStats {
    pub fn from_record(record: &SourceRecord) -> Self {
        Self {
            key_passes: record.stat_int("key_passes"),
            npg: record.stat("npg"),
            npxg: record.stat("npxG"),
            shots: record.stat_int("shots"),
            xa: record.stat("xA"),
            xg: record.stat("xG"),
            xg_buildup: record.stat("xGBuildup"),
            xg_chain: record.stat("xGChain"),
        }
    }
}

/// Merged, gameweek-tagged player row. Either side may be absent; its stat
/// block is then all zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedRecord {
    pub player_key: String,
    pub player_id: String,
    pub gameweek: Gameweek,
    pub fantasy_id: Option<String>,
    pub analytics_id: Option<String>,
    pub fantasy_name: Option<String>,
    pub analytics_name: Option<String>,
    pub web_name: Option<String>,
    pub position: Option<Position>,
    pub fantasy: FantasyStats,
    pub analytics: AnalyticsStats,
}

impl UnifiedRecord {
    /// Outer-join one player's two partial records under `player_key`.
    pub fn join(
        player_key: impl Into<String>,
        gameweek: Gameweek,
        fantasy: Option<&SourceRecord>,
        analytics: Option<&SourceRecord>,
    ) -> Self {
        let player_id = match (fantasy, analytics) {
            (Some(f), _) => format!("fantasy:{}", f.source_id),
            (None, Some(a)) => format!("analytics:{}", a.source_id),
            (None, None) => String::new(),
        };
        Self {
            player_key: player_key.into(),
            player_id,
            gameweek,
            fantasy_id: fantasy.map(|r| r.source_id.clone()),
            analytics_id: analytics.map(|r| r.source_id.clone()),
            fantasy_name: fantasy.map(|r| r.display_name.clone()),
            analytics_name: analytics.map(|r| r.display_name.clone()),
            web_name: fantasy.and_then(|r| r.short_name.clone()),
            position: fantasy.and_then(|r| Position::from_element_type(r.stat_int("element_type"))),
            fantasy: fantasy.map(FantasyStats::from_record).unwrap_or_default(),
            analytics: analytics.map(AnalyticsStats::from_record).unwrap_or_default(),
        }
    }

    pub fn has_analytics(&self) -> bool {
        self.analytics_id.is_some()
    }

    /// Column values in [`UNIFIED_COLUMNS`] order.
    pub fn values(&self) -> Vec<ColumnValue> {
        let f = &self.fantasy;
        let a = &self.analytics;
        vec![
            ColumnValue::Text(Some(self.player_id.clone())),
            ColumnValue::Text(Some(self.player_key.clone())),
            ColumnValue::Integer(i64::from(self.gameweek.0)),
            ColumnValue::Text(self.fantasy_id.clone()),
            ColumnValue::Text(self.analytics_id.clone()),
            ColumnValue::Text(self.web_name.clone()),
            ColumnValue::Text(self.position.map(|p| p.as_str().to_string())),
            ColumnValue::Integer(f.team),
            ColumnValue::Integer(f.total_points),
            ColumnValue::Integer(f.goals_scored),
            ColumnValue::Integer(f.assists),
            ColumnValue::Integer(f.clean_sheets),
            ColumnValue::Integer(f.bonus),
            ColumnValue::Integer(f.saves),
            ColumnValue::Integer(f.yellow_cards),
            ColumnValue::Integer(f.red_cards),
            ColumnValue::Real(f.form),
            ColumnValue::Real(f.points_per_game),
            ColumnValue::Integer(f.penalties_saved),
            ColumnValue::Integer(f.penalties_missed),
            ColumnValue::Real(f.influence),
            ColumnValue::Real(f.creativity),
            ColumnValue::Real(f.threat),
            ColumnValue::Real(f.ict_index),
            ColumnValue::Integer(f.transfers_in_event),
            ColumnValue::Integer(f.transfers_out_event),
            ColumnValue::Integer(a.key_passes),
            ColumnValue::Real(a.npg),
            ColumnValue::Real(a.npxg),
            ColumnValue::Integer(a.shots),
            ColumnValue::Real(a.xa),
            ColumnValue::Real(a.xg),
            ColumnValue::Real(a.xg_buildup),
            ColumnValue::Real(a.xg_chain),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Real,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub nullable: bool,
}

const fn col(name: &'static str, kind: ColumnKind, nullable: bool) -> ColumnSpec {
    ColumnSpec { name, kind, nullable }
}

/// Declared schema of a [`UnifiedRecord`] row, shared by the SQL table, the
/// CSV header and the Parquet snapshot.
pub const UNIFIED_COLUMNS: &[ColumnSpec] = &[
    col("player_id", ColumnKind::Text, false),
    col("player_key", ColumnKind::Text, false),
    col("gameweek", ColumnKind::Integer, false),
    col("fantasy_id", ColumnKind::Text, true),
    col("analytics_id", ColumnKind::Text, true),
    col("web_name", ColumnKind::Text, true),
    col("position", ColumnKind::Text, true),
    col("team", ColumnKind::Integer, false),
    col("total_points", ColumnKind::Integer, false),
    col("goals_scored", ColumnKind::Integer, false),
    col("assists", ColumnKind::Integer, false),
    col("clean_sheets", ColumnKind::Integer, false),
    col("bonus", ColumnKind::Integer, false),
    col("saves", ColumnKind::Integer, false),
    col("yellow_cards", ColumnKind::Integer, false),
    col("red_cards", ColumnKind::Integer, false),
    col("form", ColumnKind::Real, false),
    col("points_per_game", ColumnKind::Real, false),
    col("penalties_saved", ColumnKind::Integer, false),
    col("penalties_missed", ColumnKind::Integer, false),
    col("influence", ColumnKind::Real, false),
    col("creativity", ColumnKind::Real, false),
    col("threat", ColumnKind::Real, false),
    col("ict_index", ColumnKind::Real, false),
    col("transfers_in_event", ColumnKind::Integer, false),
    col("transfers_out_event", ColumnKind::Integer, false),
    col("key_passes", ColumnKind::Integer, false),
    col("npg", ColumnKind::Real, false),
    col("npxg", ColumnKind::Real, false),
    col("shots", ColumnKind::Integer, false),
    col("xa", ColumnKind::Real, false),
    col("xg", ColumnKind::Real, false),
    col("xg_buildup", ColumnKind::Real, false),
    col("xg_chain", ColumnKind::Real, false),
];

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Text(Option<String>),
    Integer(i64),
    Real(f64),
}

impl ColumnValue {
    pub fn kind(&self) -> ColumnKind {
        match self {
            ColumnValue::Text(_) => ColumnKind::Text,
            ColumnValue::Integer(_) => ColumnKind::Integer,
            ColumnValue::Real(_) => ColumnKind::Real,
        }
    }

    /// Flat text rendering used by tabular exports; nulls render empty.
    pub fn to_field(&self) -> String {
        match self {
            ColumnValue::Text(v) => v.clone().unwrap_or_default(),
            ColumnValue::Integer(v) => v.to_string(),
            ColumnValue::Real(v) => v.to_string(),
        }
    }
}
