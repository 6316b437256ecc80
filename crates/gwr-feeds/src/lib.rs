//! Feed adapter contracts and the two statistics feed decoders.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gwr_core::{Gameweek, SourceRecord, SourceTag, ANALYTICS_STAT_KEYS, FANTASY_STAT_KEYS};
use gwr_storage::{FeedRequest, FetchError, HttpFetcher};
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "gwr-feeds";

pub const DEFAULT_FANTASY_URL: &str = "https://fantasy.premierleague.com/api/bootstrap-static/";
pub const DEFAULT_ANALYTICS_URL: &str = "https://understat.com/main/getPlayersStats/";
pub const DEFAULT_LEAGUE: &str = "EPL";
pub const DEFAULT_SEASON: &str = "2025-26";

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("{source_tag} payload is not valid JSON: {error}")]
    InvalidJson {
        source_tag: SourceTag,
        error: serde_json::Error,
    },
    #[error("{source_tag} payload has no {collection:?} array")]
    MissingCollection {
        source_tag: SourceTag,
        collection: &'static str,
    },
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("reading {path}: {error}")]
    Io { path: String, error: std::io::Error },
}

/// A record dropped during decoding. The run continues without it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordSkip {
    pub source: SourceTag,
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedFeed {
    pub records: Vec<SourceRecord>,
    pub skipped: Vec<RecordSkip>,
    /// Current gameweek, when the feed advertises one.
    pub gameweek: Option<Gameweek>,
}

#[derive(Debug, Clone)]
pub struct FeedPayload {
    pub source: SourceTag,
    pub url: String,
    pub fetched_at: DateTime<Utc>,
    pub body: Vec<u8>,
}

#[async_trait]
pub trait FeedAdapter: Send + Sync {
    fn source(&self) -> SourceTag;
    fn request(&self) -> FeedRequest;

    async fn fetch(&self, http: &HttpFetcher, run_id: Uuid) -> Result<FeedPayload, FeedError> {
        let request = self.request();
        let resp = http.fetch_bytes(run_id, self.source(), &request).await?;
        Ok(FeedPayload {
            source: self.source(),
            url: resp.final_url,
            fetched_at: resp.fetched_at,
            body: resp.body,
        })
    }

    fn decode(&self, body: &[u8]) -> Result<DecodedFeed, FeedError>;
}

pub fn load_payload_file(source: SourceTag, path: impl AsRef<Path>) -> Result<FeedPayload, FeedError> {
    let path = path.as_ref();
    let body = std::fs::read(path).map_err(|error| FeedError::Io {
        path: path.display().to_string(),
        error,
    })?;
    Ok(FeedPayload {
        source,
        url: format!("file://{}", path.display()),
        fetched_at: Utc::now(),
        body,
    })
}

fn parse_json(source_tag: SourceTag, body: &[u8]) -> Result<JsonValue, FeedError> {
    serde_json::from_slice(body).map_err(|error| FeedError::InvalidJson { source_tag, error })
}

/// Numbers arrive either as JSON numbers or as decimal strings.
fn json_number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

fn json_id(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

fn json_text<'a>(value: &'a JsonValue, key: &str) -> Option<&'a str> {
    value.get(key).and_then(JsonValue::as_str).map(str::trim).filter(|s| !s.is_empty())
}

fn decode_stats(item: &JsonValue, keys: &[&str], mut record: SourceRecord) -> Result<SourceRecord, String> {
    for key in keys {
        let raw = item.get(*key).ok_or_else(|| format!("missing stat {key:?}"))?;
        let value = json_number(raw).ok_or_else(|| format!("stat {key:?} is not numeric: {raw}"))?;
        record.stats.insert((*key).to_string(), value);
    }
    Ok(record)
}

fn collect_records<F>(source: SourceTag, items: &[JsonValue], decode_one: F) -> (Vec<SourceRecord>, Vec<RecordSkip>)
where
    F: Fn(&JsonValue) -> Result<SourceRecord, String>,
{
    let mut records = Vec::with_capacity(items.len());
    let mut skipped = Vec::new();
    for (index, item) in items.iter().enumerate() {
        match decode_one(item) {
            Ok(record) => records.push(record),
            Err(reason) => {
                warn!(%source, index, %reason, "skipping malformed record");
                skipped.push(RecordSkip { source, index, reason });
            }
        }
    }
    (records, skipped)
}

/// Fantasy-points bootstrap feed: `events` + `elements`.
#[derive(Debug, Clone)]
pub struct FantasyFeedAdapter {
    url: String,
}

impl FantasyFeedAdapter {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    fn current_gameweek(payload: &JsonValue) -> Option<Gameweek> {
        let current = payload
            .get("events")?
            .as_array()?
            .iter()
            .find(|event| event.get("is_current").and_then(JsonValue::as_bool) == Some(true))?;
        json_text(current, "name")
            .and_then(|name| name.parse().ok())
            .or_else(|| {
                current
                    .get("id")
                    .and_then(JsonValue::as_u64)
                    .and_then(|id| u32::try_from(id).ok())
                    .map(Gameweek)
            })
    }

    fn decode_element(item: &JsonValue) -> Result<SourceRecord, String> {
        let id = item.get("id").and_then(json_id).ok_or("missing id")?;
        let first = json_text(item, "first_name").ok_or("missing first_name")?;
        let second = json_text(item, "second_name").ok_or("missing second_name")?;
        let mut record = SourceRecord::new(SourceTag::Fantasy, id, format!("{first} {second}"));
        record.short_name = json_text(item, "web_name").map(str::to_string);
        decode_stats(item, FANTASY_STAT_KEYS, record)
    }
}

impl Default for FantasyFeedAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_FANTASY_URL)
    }
}

#[async_trait]
impl FeedAdapter for FantasyFeedAdapter {
    fn source(&self) -> SourceTag {
        SourceTag::Fantasy
    }

    fn request(&self) -> FeedRequest {
        FeedRequest::get(self.url.clone())
    }

    fn decode(&self, body: &[u8]) -> Result<DecodedFeed, FeedError> {
        let payload = parse_json(SourceTag::Fantasy, body)?;
        let elements = payload
            .get("elements")
            .and_then(JsonValue::as_array)
            .ok_or(FeedError::MissingCollection {
                source_tag: SourceTag::Fantasy,
                collection: "elements",
            })?;
        let gameweek = Self::current_gameweek(&payload);
        let (records, skipped) = collect_records(SourceTag::Fantasy, elements, Self::decode_element);
        debug!(records = records.len(), skipped = skipped.len(), ?gameweek, "decoded fantasy feed");
        Ok(DecodedFeed {
            records,
            skipped,
            gameweek,
        })
    }
}

/// Starting year of a season label: `"2025-26"` and `"2025"` both give
/// `"2025"`. Labels without a leading year pass through trimmed.
pub fn league_season(season: &str) -> String {
    let season = season.trim();
    let year: String = season.chars().take_while(char::is_ascii_digit).collect();
    if year.len() == 4 {
        year
    } else {
        season.to_string()
    }
}

/// Expected-goals league players feed, queried per league and season. The
/// response is a flat array of player objects, or an object wrapping it under
/// `players`.
#[derive(Debug, Clone)]
pub struct AnalyticsFeedAdapter {
    url: String,
    league: String,
    season: String,
}

impl AnalyticsFeedAdapter {
    pub fn new(url: impl Into<String>, season: &str) -> Self {
        Self {
            url: url.into(),
            league: DEFAULT_LEAGUE.to_string(),
            season: league_season(season),
        }
    }

    pub fn with_league(mut self, league: impl Into<String>) -> Self {
        self.league = league.into();
        self
    }

    fn decode_player(item: &JsonValue) -> Result<SourceRecord, String> {
        let id = item.get("id").and_then(json_id).ok_or("missing id")?;
        let name = json_text(item, "player_name").ok_or("missing player_name")?;
        decode_stats(item, ANALYTICS_STAT_KEYS, SourceRecord::new(SourceTag::Analytics, id, name))
    }
}

impl Default for AnalyticsFeedAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_ANALYTICS_URL, DEFAULT_SEASON)
    }
}

#[async_trait]
impl FeedAdapter for AnalyticsFeedAdapter {
    fn source(&self) -> SourceTag {
        SourceTag::Analytics
    }

    fn request(&self) -> FeedRequest {
        FeedRequest::post_form(
            self.url.clone(),
            [("league", self.league.as_str()), ("season", self.season.as_str())],
        )
    }

    fn decode(&self, body: &[u8]) -> Result<DecodedFeed, FeedError> {
        let payload = parse_json(SourceTag::Analytics, body)?;
        let players = payload
            .as_array()
            .or_else(|| payload.get("players").and_then(JsonValue::as_array))
            .ok_or(FeedError::MissingCollection {
                source_tag: SourceTag::Analytics,
                collection: "players",
            })?;
        let (records, skipped) = collect_records(SourceTag::Analytics, players, Self::decode_player);
        debug!(records = records.len(), skipped = skipped.len(), "decoded analytics feed");
        Ok(DecodedFeed {
            records,
            skipped,
            gameweek: None,
        })
    }
}

pub fn adapter_for_source(source: SourceTag, url: impl Into<String>, season: &str) -> Box<dyn FeedAdapter> {
    match source {
        SourceTag::Fantasy => Box::new(FantasyFeedAdapter::new(url)),
        SourceTag::Analytics => Box::new(AnalyticsFeedAdapter::new(url, season)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fixture_path(source: SourceTag, file: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../fixtures")
            .join(source.as_str())
            .join(file)
    }

    fn fixture(source: SourceTag, file: &str) -> FeedPayload {
        load_payload_file(source, fixture_path(source, file)).unwrap()
    }

    #[test]
    fn fantasy_fixture_decodes_with_current_gameweek() {
        let adapter = FantasyFeedAdapter::default();
        let payload = fixture(SourceTag::Fantasy, "bootstrap.json");
        let decoded = adapter.decode(&payload.body).unwrap();

        assert_eq!(decoded.gameweek, Some(Gameweek(5)));
        assert_eq!(decoded.records.len(), 9);
        assert_eq!(decoded.skipped.len(), 1);
        assert_eq!(decoded.skipped[0].reason, "missing second_name");

        let salah = decoded.records.iter().find(|r| r.source_id == "254").unwrap();
        assert_eq!(salah.display_name, "Mohamed Salah");
        assert_eq!(salah.short_name.as_deref(), Some("Salah"));
        assert_eq!(salah.stat("form"), 7.5);
        assert_eq!(salah.stat("total_points"), 48.0);
        for key in FANTASY_STAT_KEYS {
            assert!(salah.stats.contains_key(*key), "missing {key}");
        }
    }

    #[test]
    fn analytics_fixture_decodes_string_numbers() {
        let adapter = AnalyticsFeedAdapter::default();
        let payload = fixture(SourceTag::Analytics, "league_players.json");
        let decoded = adapter.decode(&payload.body).unwrap();

        assert_eq!(decoded.gameweek, None);
        assert_eq!(decoded.records.len(), 9);
        assert_eq!(decoded.skipped.len(), 1);
        assert!(decoded.skipped[0].reason.contains("\"xG\""));

        let salah = decoded.records.iter().find(|r| r.source_id == "1250").unwrap();
        assert_eq!(salah.display_name, "Mohamed Salah");
        assert_eq!(salah.short_name, None);
        assert!((salah.stat("xG") - 4.81).abs() < 1e-9);
        assert_eq!(salah.stat("shots"), 21.0);
    }

    #[test]
    fn analytics_accepts_wrapped_players() {
        let body = br#"{"players":[{"id":"1","player_name":"Kepa","key_passes":"0","npg":"0","npxG":"0","shots":"0","xA":"0","xG":"0","xGBuildup":"0.5","xGChain":"0.5"}]}"#;
        let decoded = AnalyticsFeedAdapter::default().decode(body).unwrap();
        assert_eq!(decoded.records.len(), 1);
        assert_eq!(decoded.records[0].stat("xGBuildup"), 0.5);
    }

    #[test]
    fn gameweek_falls_back_to_event_id() {
        let body = br#"{"events":[{"id":3,"name":"Round three","is_current":true}],"elements":[]}"#;
        let decoded = FantasyFeedAdapter::default().decode(body).unwrap();
        assert_eq!(decoded.gameweek, Some(Gameweek(3)));
        assert!(decoded.records.is_empty());

        let body = br#"{"events":[{"id":4294967301,"name":"Round ?","is_current":true}],"elements":[]}"#;
        let decoded = FantasyFeedAdapter::default().decode(body).unwrap();
        assert_eq!(decoded.gameweek, None);
    }

    #[test]
    fn structural_errors_fail_the_feed() {
        assert!(matches!(
            FantasyFeedAdapter::default().decode(br#"{"events":[]}"#),
            Err(FeedError::MissingCollection { collection: "elements", .. })
        ));
        assert!(matches!(
            AnalyticsFeedAdapter::default().decode(b"not json"),
            Err(FeedError::InvalidJson { .. })
        ));
    }

    #[test]
    fn registry_returns_matching_adapter() {
        let adapter = adapter_for_source(SourceTag::Analytics, "http://localhost/players", "2024-25");
        assert_eq!(adapter.source(), SourceTag::Analytics);
        assert_eq!(adapter.request().url, "http://localhost/players");

        let fantasy = adapter_for_source(SourceTag::Fantasy, DEFAULT_FANTASY_URL, "2024-25");
        assert_eq!(fantasy.request(), FeedRequest::get(DEFAULT_FANTASY_URL));
    }

    #[test]
    fn analytics_request_is_scoped_to_league_and_season() {
        let request = AnalyticsFeedAdapter::new(DEFAULT_ANALYTICS_URL, "2020-21").request();
        assert!(request.is_post());
        assert_eq!(request.url, DEFAULT_ANALYTICS_URL);
        assert_eq!(
            request.form,
            vec![
                ("league".to_string(), "EPL".to_string()),
                ("season".to_string(), "2020".to_string()),
            ]
        );

        let la_liga = AnalyticsFeedAdapter::new(DEFAULT_ANALYTICS_URL, "2023")
            .with_league("La_liga")
            .request();
        assert_eq!(la_liga.form[0].1, "La_liga");
        assert_eq!(la_liga.form[1].1, "2023");
    }

    #[test]
    fn season_labels_reduce_to_starting_year() {
        assert_eq!(league_season("2025-26"), "2025");
        assert_eq!(league_season(" 2019 "), "2019");
        assert_eq!(league_season("current"), "current");
    }
}
