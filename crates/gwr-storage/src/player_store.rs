use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::Utc;
use gwr_core::{ColumnKind, ColumnValue, Gameweek, UnifiedRecord, UNIFIED_COLUMNS};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::info;

pub const PLAYER_TABLE: &str = "player_gameweek";

/// Relational store of unified records, one row per (player_id, gameweek).
#[derive(Debug, Clone)]
pub struct PlayerStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredPlayerRow {
    pub player_id: String,
    pub player_key: String,
    pub gameweek: i64,
    pub season: String,
    pub total_points: i64,
    pub xg: f64,
}

fn sql_type(kind: ColumnKind) -> &'static str {
    match kind {
        ColumnKind::Text => "TEXT",
        ColumnKind::Integer => "INTEGER",
        ColumnKind::Real => "REAL",
    }
}

impl PlayerStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("parsing database url {database_url}"))?
            .create_if_missing(true);
        // A single connection keeps `sqlite::memory:` databases alive across calls.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("connecting to {database_url}"))?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:").await
    }

    pub fn create_table_sql() -> String {
        let columns = UNIFIED_COLUMNS
            .iter()
            .map(|c| {
                let null = if c.nullable { "" } else { " NOT NULL" };
                format!("  {} {}{}", c.name, sql_type(c.kind), null)
            })
            .collect::<Vec<_>>()
            .join(",\n");
        format!(
            "CREATE TABLE IF NOT EXISTS {PLAYER_TABLE} (\n  season TEXT NOT NULL,\n{columns},\n  updated_at TEXT NOT NULL,\n  PRIMARY KEY (player_id, gameweek)\n)"
        )
    }

    fn upsert_sql() -> String {
        let names = UNIFIED_COLUMNS.iter().map(|c| c.name).collect::<Vec<_>>();
        let placeholders = vec!["?"; names.len() + 2].join(", ");
        let updates = names
            .iter()
            .filter(|n| !matches!(**n, "player_id" | "gameweek"))
            .chain(["season", "updated_at"].iter())
            .map(|n| format!("{n} = excluded.{n}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {PLAYER_TABLE} (season, {}, updated_at) VALUES ({placeholders}) \
             ON CONFLICT(player_id, gameweek) DO UPDATE SET {updates}",
            names.join(", ")
        )
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(&Self::create_table_sql())
            .execute(&self.pool)
            .await
            .context("creating player table")?;
        Ok(())
    }

    /// Insert or replace every record in one transaction.
    pub async fn upsert(&self, season: &str, records: &[UnifiedRecord]) -> Result<usize> {
        let sql = Self::upsert_sql();
        let updated_at = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await.context("opening transaction")?;

        for record in records {
            let mut query = sqlx::query(&sql).bind(season);
            for value in record.values() {
                query = match value {
                    ColumnValue::Text(v) => query.bind(v),
                    ColumnValue::Integer(v) => query.bind(v),
                    ColumnValue::Real(v) => query.bind(v),
                };
            }
            query
                .bind(updated_at.as_str())
                .execute(&mut *tx)
                .await
                .with_context(|| format!("upserting {} {}", record.player_id, record.gameweek))?;
        }

        tx.commit().await.context("committing upsert")?;
        info!(season, rows = records.len(), "player rows upserted");
        Ok(records.len())
    }

    pub async fn count_for_gameweek(&self, gameweek: Gameweek) -> Result<i64> {
        let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {PLAYER_TABLE} WHERE gameweek = ?"))
            .bind(i64::from(gameweek.number()))
            .fetch_one(&self.pool)
            .await
            .context("counting player rows")?;
        Ok(row.try_get("n")?)
    }

    pub async fn fetch_gameweek(&self, gameweek: Gameweek) -> Result<Vec<StoredPlayerRow>> {
        let rows = sqlx::query(&format!(
            "SELECT player_id, player_key, gameweek, season, total_points, xg \
             FROM {PLAYER_TABLE} WHERE gameweek = ? ORDER BY player_key"
        ))
        .bind(i64::from(gameweek.number()))
        .fetch_all(&self.pool)
        .await
        .context("loading player rows")?;

        rows.into_iter()
            .map(|row| {
                Ok(StoredPlayerRow {
                    player_id: row.try_get("player_id")?,
                    player_key: row.try_get("player_key")?,
                    gameweek: row.try_get("gameweek")?,
                    season: row.try_get("season")?,
                    total_points: row.try_get("total_points")?,
                    xg: row.try_get("xg")?,
                })
            })
            .collect()
    }
}
