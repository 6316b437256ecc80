//! Weekly sync orchestration: fetch both feeds, archive, reconcile, persist,
//! export and report.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use gwr_core::{Gameweek, SourceTag};
use gwr_feeds::{
    load_payload_file, AnalyticsFeedAdapter, FantasyFeedAdapter, FeedAdapter, FeedPayload, RecordSkip,
    DEFAULT_ANALYTICS_URL, DEFAULT_FANTASY_URL, DEFAULT_SEASON,
};
use gwr_reconcile::{reconcile, OverrideTable, ReconcileReport, UnresolvedName};
use gwr_storage::{ArtifactStore, HttpClientConfig, HttpFetcher, PlayerStore, StoredArtifact};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

pub mod export;

pub use export::{export_parquet_snapshot, write_csv, ParquetManifest, ParquetManifestFile};

pub const CRATE_NAME: &str = "gwr-sync";

/// Tuesdays 09:00. The scheduler expects a leading seconds field.
pub const DEFAULT_SYNC_CRON: &str = "0 0 9 * * Tue";

const REPORT_FILE: &str = "reconcile_report.json";
const BRIEF_FILE: &str = "run_brief.md";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub database_url: String,
    pub artifacts_dir: PathBuf,
    pub workspace_root: PathBuf,
    pub season: String,
    pub fantasy_url: String,
    pub analytics_url: String,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub scheduler_enabled: bool,
    pub sync_cron: String,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let workspace_root = std::env::var("GWR_WORKSPACE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));
        Self {
            database_url: std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://gwr.db".to_string()),
            artifacts_dir: std::env::var("ARTIFACTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| workspace_root.join("artifacts")),
            season: std::env::var("GWR_SEASON").unwrap_or_else(|_| DEFAULT_SEASON.to_string()),
            fantasy_url: std::env::var("GWR_FANTASY_URL").unwrap_or_else(|_| DEFAULT_FANTASY_URL.to_string()),
            analytics_url: std::env::var("GWR_ANALYTICS_URL")
                .unwrap_or_else(|_| DEFAULT_ANALYTICS_URL.to_string()),
            user_agent: std::env::var("GWR_USER_AGENT").unwrap_or_else(|_| "gwr-bot/0.1".to_string()),
            http_timeout_secs: std::env::var("GWR_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            scheduler_enabled: std::env::var("GWR_SCHEDULER_ENABLED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(false),
            sync_cron: std::env::var("GWR_SYNC_CRON").unwrap_or_else(|_| DEFAULT_SYNC_CRON.to_string()),
            workspace_root,
        }
    }

    pub fn reports_root(&self) -> PathBuf {
        self.workspace_root.join("reports")
    }

    pub fn csv_path(&self, gameweek: Gameweek) -> PathBuf {
        self.workspace_root
            .join("exports")
            .join(format!("gw-{}-{}.csv", self.season, gameweek.number()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub season: String,
    pub gameweek: Gameweek,
    pub database_url: String,
    pub persisted_rows: usize,
}

/// Contents of `reports/<run_id>/reconcile_report.json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run: RunRecord,
    pub artifacts: Vec<StoredArtifact>,
    pub skipped_records: Vec<RecordSkip>,
    pub reconcile: ReconcileReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub gameweek: Gameweek,
    pub season: String,
    pub fantasy_records: usize,
    pub analytics_records: usize,
    pub skipped_records: usize,
    pub unified_records: usize,
    pub persisted_rows: usize,
    pub unresolved: usize,
    pub csv_path: String,
    pub reports_dir: String,
    pub parquet_manifest: String,
}

/// Workspace `rules/overrides.yaml` when present, else the compiled-in table.
pub fn load_override_table(workspace_root: &Path) -> Result<OverrideTable> {
    let path = workspace_root.join("rules").join("overrides.yaml");
    if path.exists() {
        OverrideTable::from_path(&path)
    } else {
        debug!(path = %path.display(), "no workspace override table; using built-in copy");
        OverrideTable::builtin()
    }
}

pub struct SyncPipeline {
    config: SyncConfig,
    artifact_store: ArtifactStore,
    http: HttpFetcher,
    fantasy: Box<dyn FeedAdapter>,
    analytics: Box<dyn FeedAdapter>,
}

impl SyncPipeline {
    pub fn new(config: SyncConfig) -> Result<Self> {
        let artifact_store = ArtifactStore::new(config.artifacts_dir.clone());
        let http = HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(config.http_timeout_secs),
            user_agent: Some(config.user_agent.clone()),
            ..Default::default()
        })?;
        let fantasy = Box::new(FantasyFeedAdapter::new(config.fantasy_url.clone()));
        let analytics = Box::new(AnalyticsFeedAdapter::new(config.analytics_url.clone(), &config.season));
        Ok(Self {
            config,
            artifact_store,
            http,
            fantasy,
            analytics,
        })
    }

    /// Fetch both feeds concurrently and run the full pipeline on them.
    pub async fn run_once(&self) -> Result<SyncRunSummary> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let span = info_span!("sync_run", %run_id, season = %self.config.season);
        async {
            let (fantasy, analytics) = tokio::join!(
                self.fantasy.fetch(&self.http, run_id),
                self.analytics.fetch(&self.http, run_id)
            );
            let fantasy = fantasy.context("fetching fantasy feed")?;
            let analytics = analytics.context("fetching analytics feed")?;
            self.process(run_id, started_at, fantasy, analytics, None).await
        }
        .instrument(span)
        .await
    }

    /// Same pipeline over previously saved payloads. `gameweek` overrides the
    /// one advertised by the fantasy payload.
    pub async fn reconcile_files(
        &self,
        fantasy_path: &Path,
        analytics_path: &Path,
        gameweek: Option<Gameweek>,
    ) -> Result<SyncRunSummary> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let fantasy = load_payload_file(SourceTag::Fantasy, fantasy_path)?;
        let analytics = load_payload_file(SourceTag::Analytics, analytics_path)?;
        self.process(run_id, started_at, fantasy, analytics, gameweek)
            .instrument(info_span!("offline_run", %run_id))
            .await
    }

    async fn process(
        &self,
        run_id: Uuid,
        started_at: DateTime<Utc>,
        fantasy_payload: FeedPayload,
        analytics_payload: FeedPayload,
        gameweek: Option<Gameweek>,
    ) -> Result<SyncRunSummary> {
        let mut artifacts = Vec::with_capacity(2);
        for payload in [&fantasy_payload, &analytics_payload] {
            let stored = self
                .artifact_store
                .store_bytes(payload.fetched_at, payload.source, "json", &payload.body)
                .await
                .with_context(|| format!("archiving {} payload from {}", payload.source, payload.url))?;
            artifacts.push(stored);
        }

        let fantasy = self.fantasy.decode(&fantasy_payload.body)?;
        let analytics = self.analytics.decode(&analytics_payload.body)?;
        let gameweek = gameweek
            .or(fantasy.gameweek)
            .context("fantasy feed advertises no current gameweek; pass one explicitly")?;

        let overrides = load_override_table(&self.config.workspace_root)?;
        let outcome = reconcile(&fantasy.records, &analytics.records, &overrides, gameweek)?;

        let store = PlayerStore::connect(&self.config.database_url).await?;
        let persisted_rows = store.upsert(&self.config.season, &outcome.records).await?;

        let csv_path = self.config.csv_path(gameweek);
        write_csv(&csv_path, &outcome.records)?;

        let reports_dir = self.config.reports_root().join(run_id.to_string());
        fs::create_dir_all(&reports_dir)
            .await
            .with_context(|| format!("creating {}", reports_dir.display()))?;
        let manifest_path = export_parquet_snapshot(&reports_dir, &outcome.records)?;

        let mut skipped_records = fantasy.skipped;
        skipped_records.extend(analytics.skipped);
        let report = RunReport {
            run: RunRecord {
                run_id,
                started_at,
                finished_at: Utc::now(),
                season: self.config.season.clone(),
                gameweek,
                database_url: self.config.database_url.clone(),
                persisted_rows,
            },
            artifacts,
            skipped_records,
            reconcile: outcome.report,
        };
        write_reports(&reports_dir, &report).await?;

        info!(
            %gameweek,
            unified = report.reconcile.unified_records,
            skipped = report.skipped_records.len(),
            reports = %reports_dir.display(),
            "sync run complete"
        );

        Ok(SyncRunSummary {
            run_id,
            gameweek,
            season: self.config.season.clone(),
            fantasy_records: report.reconcile.fantasy_records,
            analytics_records: report.reconcile.analytics_records,
            skipped_records: report.skipped_records.len(),
            unified_records: report.reconcile.unified_records,
            persisted_rows,
            unresolved: report.reconcile.unresolved_after_override.len(),
            csv_path: csv_path.display().to_string(),
            reports_dir: reports_dir.display().to_string(),
            parquet_manifest: manifest_path.display().to_string(),
        })
    }

    /// One job per configured cron expression, or `None` when scheduling is
    /// disabled. Each trigger performs a full run; failures are logged.
    pub async fn maybe_build_scheduler(self: &Arc<Self>) -> Result<Option<JobScheduler>> {
        if !self.config.scheduler_enabled {
            return Ok(None);
        }

        let sched = JobScheduler::new().await.context("creating scheduler")?;
        let cron = self.config.sync_cron.as_str();
        let pipeline = Arc::clone(self);
        let job = Job::new_async(cron, move |_uuid, _l| {
            let pipeline = Arc::clone(&pipeline);
            Box::pin(async move {
                match pipeline.run_once().await {
                    Ok(summary) => info!(run_id = %summary.run_id, gameweek = %summary.gameweek, "scheduled sync finished"),
                    Err(err) => error!(error = %format!("{err:#}"), "scheduled sync failed"),
                }
            })
        })
        .with_context(|| format!("creating scheduler job for cron {cron}"))?;
        sched.add(job).await.context("adding scheduler job")?;
        Ok(Some(sched))
    }
}

fn unresolved_lines(names: &[UnresolvedName]) -> String {
    if names.is_empty() {
        return "- none".to_string();
    }
    names
        .iter()
        .map(|n| format!("- {} ({})", n.name, n.side))
        .collect::<Vec<_>>()
        .join("\n")
}

async fn write_reports(reports_dir: &Path, report: &RunReport) -> Result<()> {
    let r = &report.reconcile;
    let brief = format!(
        "# Gameweek Reconcile Brief\n\n- Run ID: `{}`\n- Season: {}\n- Gameweek: {}\n- Started: {}\n- Finished: {}\n- Override table: v{}\n\n## Counts\n- fantasy records: {}\n- analytics records: {}\n- skipped records: {}\n- direct matches: {}\n- automatic pairs: {}\n- override entries used: {}\n- unified records: {}\n- rows persisted: {}\n\n## Unresolved after automatic pass\n{}\n\n## Unresolved after override pass\n{}\n",
        report.run.run_id,
        report.run.season,
        report.run.gameweek,
        report.run.started_at,
        report.run.finished_at,
        r.override_table_version,
        r.fantasy_records,
        r.analytics_records,
        report.skipped_records.len(),
        r.direct_matches,
        r.automatic_pairs.len(),
        r.override_entries_used,
        r.unified_records,
        report.run.persisted_rows,
        unresolved_lines(&r.unresolved_after_automatic),
        unresolved_lines(&r.unresolved_after_override),
    );
    fs::write(reports_dir.join(BRIEF_FILE), brief)
        .await
        .with_context(|| format!("writing {BRIEF_FILE}"))?;

    let json = serde_json::to_vec_pretty(report).context("serializing reconcile report")?;
    fs::write(reports_dir.join(REPORT_FILE), json)
        .await
        .with_context(|| format!("writing {REPORT_FILE}"))?;
    Ok(())
}

pub async fn run_sync_once_from_env() -> Result<SyncRunSummary> {
    SyncPipeline::new(SyncConfig::from_env())?.run_once().await
}

/// Markdown summary of the newest `runs` report directories.
pub fn report_runs_markdown(runs: usize, workspace_root: Option<PathBuf>) -> Result<String> {
    let root = workspace_root.unwrap_or_else(|| PathBuf::from("."));
    let reports_root = root.join("reports");
    let mut dirs = std::fs::read_dir(&reports_root)
        .with_context(|| format!("reading {}", reports_root.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
        .filter(|entry| entry.path().join(REPORT_FILE).exists())
        .collect::<Vec<_>>();
    dirs.sort_by_key(|e| e.metadata().and_then(|m| m.modified()).ok());
    dirs.reverse();

    let mut lines = vec!["# Gameweek Reconcile Runs".to_string(), String::new()];
    for dir in dirs.into_iter().take(runs.max(1)) {
        let run_id = dir.file_name().to_string_lossy().to_string();
        let report_path = dir.path().join(REPORT_FILE);
        let value: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(&report_path)
                .with_context(|| format!("reading {}", report_path.display()))?,
        )
        .with_context(|| format!("parsing {}", report_path.display()))?;

        let run = value.get("run");
        let gameweek = run
            .and_then(|v| v.get("gameweek"))
            .and_then(|v| v.as_u64())
            .map(|n| format!("GW{n}"))
            .unwrap_or_else(|| "unknown".to_string());
        let season = run
            .and_then(|v| v.get("season"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        let reconcile = value.get("reconcile");
        let unified = reconcile
            .and_then(|v| v.get("unified_records"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let unresolved = reconcile
            .and_then(|v| v.get("unresolved_after_override"))
            .and_then(|v| v.as_array())
            .map(|a| a.len())
            .unwrap_or(0);
        let skipped = value
            .get("skipped_records")
            .and_then(|v| v.as_array())
            .map(|a| a.len())
            .unwrap_or(0);

        lines.push(format!("## Run `{run_id}`"));
        lines.push(format!("- season: {season}"));
        lines.push(format!("- gameweek: {gameweek}"));
        lines.push(format!("- unified records: {unified}"));
        lines.push(format!("- unresolved: {unresolved}"));
        lines.push(format!("- skipped records: {skipped}"));
        lines.push(format!("- report: `{}`", report_path.display()));
        let manifest_path = dir.path().join("snapshots").join("manifest.json");
        if manifest_path.exists() {
            lines.push(format!("- parquet manifest: `{}`", manifest_path.display()));
        }
        lines.push(String::new());
    }

    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fixture(source: SourceTag, file: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../fixtures")
            .join(source.as_str())
            .join(file)
    }

    fn config_for(root: &Path) -> SyncConfig {
        SyncConfig {
            database_url: format!("sqlite://{}", root.join("gwr.db").display()),
            artifacts_dir: root.join("artifacts"),
            workspace_root: root.to_path_buf(),
            season: "2025-26".into(),
            fantasy_url: "http://127.0.0.1:9/fantasy".into(),
            analytics_url: "http://127.0.0.1:9/analytics".into(),
            user_agent: "gwr-test".into(),
            http_timeout_secs: 1,
            scheduler_enabled: false,
            sync_cron: DEFAULT_SYNC_CRON.into(),
        }
    }

    async fn offline_run(pipeline: &SyncPipeline) -> SyncRunSummary {
        pipeline
            .reconcile_files(
                &fixture(SourceTag::Fantasy, "bootstrap.json"),
                &fixture(SourceTag::Analytics, "league_players.json"),
                None,
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn offline_run_reconciles_fixtures_end_to_end() {
        let dir = tempdir().unwrap();
        let pipeline = SyncPipeline::new(config_for(dir.path())).unwrap();
        let summary = offline_run(&pipeline).await;

        assert_eq!(summary.gameweek, Gameweek(5));
        assert_eq!(summary.fantasy_records, 9);
        assert_eq!(summary.analytics_records, 9);
        assert_eq!(summary.skipped_records, 2);
        assert_eq!(summary.unified_records, 10);
        assert_eq!(summary.persisted_rows, 10);
        assert_eq!(summary.unresolved, 2);

        let csv = std::fs::read_to_string(&summary.csv_path).unwrap();
        assert_eq!(csv.lines().count(), 11);
        assert!(summary.csv_path.ends_with("gw-2025-26-5.csv"));
        assert!(Path::new(&summary.parquet_manifest).exists());

        let report: serde_json::Value = serde_json::from_slice(
            &std::fs::read(Path::new(&summary.reports_dir).join(REPORT_FILE)).unwrap(),
        )
        .unwrap();
        let reconcile = &report["reconcile"];
        assert_eq!(reconcile["direct_matches"], 4);
        assert_eq!(reconcile["mapping"]["Bamidele Alli"], "Dele Alli");
        assert_eq!(reconcile["mapping"]["Heung-Min Son"], "Son Heung-Min");
        assert_eq!(reconcile["mapping"]["Kepa Arrizabalaga"], "Kepa");
        let unresolved: Vec<&str> = reconcile["unresolved_after_override"]
            .as_array()
            .unwrap()
            .iter()
            .map(|u| u["name"].as_str().unwrap())
            .collect();
        assert_eq!(unresolved, vec!["Illan Meslier", "Jamie Vardy"]);
        assert_eq!(report["artifacts"].as_array().unwrap().len(), 2);

        let brief = std::fs::read_to_string(Path::new(&summary.reports_dir).join(BRIEF_FILE)).unwrap();
        assert!(brief.contains("- Gameweek: GW5"));
        assert!(brief.contains("- Jamie Vardy (analytics)"));
    }

    #[tokio::test]
    async fn repeated_runs_upsert_instead_of_duplicating() {
        let dir = tempdir().unwrap();
        let config = config_for(dir.path());
        let pipeline = SyncPipeline::new(config.clone()).unwrap();
        let first = offline_run(&pipeline).await;
        let second = offline_run(&pipeline).await;
        assert_ne!(first.run_id, second.run_id);

        let store = PlayerStore::connect(&config.database_url).await.unwrap();
        assert_eq!(store.count_for_gameweek(Gameweek(5)).await.unwrap(), 10);
        let rows = store.fetch_gameweek(Gameweek(5)).await.unwrap();
        let vardy = rows.iter().find(|r| r.player_key == "Jamie Vardy").unwrap();
        assert_eq!(vardy.player_id, "analytics:755");
        assert_eq!(vardy.total_points, 0);

        let markdown = report_runs_markdown(5, Some(dir.path().to_path_buf())).unwrap();
        assert!(markdown.contains(&format!("## Run `{}`", first.run_id)));
        assert!(markdown.contains(&format!("## Run `{}`", second.run_id)));
        assert!(markdown.contains("- gameweek: GW5"));
    }

    #[tokio::test]
    async fn explicit_gameweek_wins_over_feed() {
        let dir = tempdir().unwrap();
        let pipeline = SyncPipeline::new(config_for(dir.path())).unwrap();
        let summary = pipeline
            .reconcile_files(
                &fixture(SourceTag::Fantasy, "bootstrap.json"),
                &fixture(SourceTag::Analytics, "league_players.json"),
                Some(Gameweek(12)),
            )
            .await
            .unwrap();
        assert_eq!(summary.gameweek, Gameweek(12));
        assert!(summary.csv_path.ends_with("gw-2025-26-12.csv"));
    }

    #[test]
    fn workspace_override_table_replaces_builtin() {
        let dir = tempdir().unwrap();
        let builtin = load_override_table(dir.path()).unwrap();
        assert_eq!(builtin, OverrideTable::builtin().unwrap());

        std::fs::create_dir_all(dir.path().join("rules")).unwrap();
        std::fs::write(
            dir.path().join("rules").join("overrides.yaml"),
            "version: 9\naliases:\n  - fantasy: Heung-Min Son\n    analytics: Son Heung-Min\n",
        )
        .unwrap();
        let local = load_override_table(dir.path()).unwrap();
        assert_eq!(local.version(), 9);
        assert_eq!(local.len(), 1);
    }

    #[tokio::test]
    async fn scheduler_is_off_unless_enabled() {
        let dir = tempdir().unwrap();
        let pipeline = Arc::new(SyncPipeline::new(config_for(dir.path())).unwrap());
        assert!(pipeline.maybe_build_scheduler().await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn default_weekly_cron_builds_a_scheduler() {
        let dir = tempdir().unwrap();
        let mut config = config_for(dir.path());
        config.scheduler_enabled = true;
        assert_eq!(config.sync_cron, DEFAULT_SYNC_CRON);
        let pipeline = Arc::new(SyncPipeline::new(config).unwrap());
        assert!(pipeline.maybe_build_scheduler().await.unwrap().is_some());
    }
}
