//! Flat tabular exports of unified records.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{ArrayRef, Float64Array, Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field as ArrowField, Schema};
use gwr_core::{ColumnKind, ColumnValue, UnifiedRecord, UNIFIED_COLUMNS};
use parquet::arrow::ArrowWriter;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParquetManifest {
    pub schema_version: u32,
    pub files: Vec<ParquetManifestFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParquetManifestFile {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
    pub rows: usize,
}

/// Header row from the declared schema, one row per record.
pub fn write_csv(path: &Path, records: &[UnifiedRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let mut writer = csv::WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer
        .write_record(UNIFIED_COLUMNS.iter().map(|c| c.name))
        .context("writing csv header")?;
    for record in records {
        writer
            .write_record(record.values().iter().map(ColumnValue::to_field))
            .with_context(|| format!("writing csv row for {}", record.player_key))?;
    }
    writer.flush().with_context(|| format!("flushing {}", path.display()))?;
    Ok(())
}

fn arrow_type(kind: ColumnKind) -> DataType {
    match kind {
        ColumnKind::Text => DataType::Utf8,
        ColumnKind::Integer => DataType::Int64,
        ColumnKind::Real => DataType::Float64,
    }
}

fn unified_schema() -> Schema {
    Schema::new(
        UNIFIED_COLUMNS
            .iter()
            .map(|c| ArrowField::new(c.name, arrow_type(c.kind), c.nullable))
            .collect::<Vec<_>>(),
    )
}

fn column_array(index: usize, kind: ColumnKind, rows: &[Vec<ColumnValue>]) -> ArrayRef {
    match kind {
        ColumnKind::Text => Arc::new(StringArray::from(
            rows.iter()
                .map(|row| match &row[index] {
                    ColumnValue::Text(v) => v.clone(),
                    other => Some(other.to_field()),
                })
                .collect::<Vec<_>>(),
        )),
        ColumnKind::Integer => Arc::new(Int64Array::from(
            rows.iter()
                .map(|row| match row[index] {
                    ColumnValue::Integer(v) => v,
                    _ => 0,
                })
                .collect::<Vec<_>>(),
        )),
        ColumnKind::Real => Arc::new(Float64Array::from(
            rows.iter()
                .map(|row| match row[index] {
                    ColumnValue::Real(v) => v,
                    _ => 0.0,
                })
                .collect::<Vec<_>>(),
        )),
    }
}

pub fn unified_record_batch(records: &[UnifiedRecord]) -> Result<RecordBatch> {
    let rows: Vec<Vec<ColumnValue>> = records.iter().map(UnifiedRecord::values).collect();
    let columns = UNIFIED_COLUMNS
        .iter()
        .enumerate()
        .map(|(index, spec)| column_array(index, spec.kind, &rows))
        .collect::<Vec<_>>();
    RecordBatch::try_new(Arc::new(unified_schema()), columns).context("building unified record batch")
}

fn write_parquet(path: &Path, batch: RecordBatch) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)
        .with_context(|| format!("opening parquet writer {}", path.display()))?;
    writer
        .write(&batch)
        .with_context(|| format!("writing record batch {}", path.display()))?;
    writer
        .close()
        .with_context(|| format!("closing parquet writer {}", path.display()))?;
    Ok(())
}

fn manifest_entry(name: &str, base: &Path, path: &Path, rows: usize) -> Result<ParquetManifestFile> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(ParquetManifestFile {
        name: name.to_string(),
        path: path.strip_prefix(base).unwrap_or(path).display().to_string(),
        sha256: hex::encode(hasher.finalize()),
        bytes: bytes.len() as u64,
        rows,
    })
}

/// Write `snapshots/unified_records.parquet` and its manifest under
/// `run_dir`, returning the manifest path.
pub fn export_parquet_snapshot(run_dir: &Path, records: &[UnifiedRecord]) -> Result<std::path::PathBuf> {
    let snapshot_dir = run_dir.join("snapshots");
    std::fs::create_dir_all(&snapshot_dir).with_context(|| format!("creating {}", snapshot_dir.display()))?;

    let parquet_path = snapshot_dir.join("unified_records.parquet");
    write_parquet(&parquet_path, unified_record_batch(records)?)?;

    let manifest = ParquetManifest {
        schema_version: 1,
        files: vec![manifest_entry("unified_records", run_dir, &parquet_path, records.len())?],
    };
    let manifest_path = snapshot_dir.join("manifest.json");
    let bytes = serde_json::to_vec_pretty(&manifest).context("serializing parquet manifest")?;
    std::fs::write(&manifest_path, bytes).with_context(|| format!("writing {}", manifest_path.display()))?;
    Ok(manifest_path)
}
