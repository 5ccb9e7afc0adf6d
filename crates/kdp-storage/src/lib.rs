//! Snapshot files and immutable report artifacts for the brokerage pipeline.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use kdp_core::{validate_revenue_events, EngineError, Snapshot};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, info_span};
use uuid::Uuid;

pub const CRATE_NAME: &str = "kdp-storage";

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("duplicate opportunity id {0}")]
    DuplicateOpportunity(String),
    #[error("duplicate revenue event id {0}")]
    DuplicateRevenueEvent(Uuid),
    #[error("invalid revenue event {id}: {reason}")]
    InvalidRevenueEvent { id: Uuid, reason: String },
    #[error(transparent)]
    Engine(EngineError),
}

impl From<EngineError> for SnapshotError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidRevenueEvent { id, reason } => {
                Self::InvalidRevenueEvent { id, reason }
            }
            other => Self::Engine(other),
        }
    }
}

/// Rejects snapshots whose record ids are not unique or whose revenue log would not
/// be accepted by the ledger.
pub fn validate_snapshot(snapshot: &Snapshot) -> Result<(), SnapshotError> {
    let mut opportunity_ids = HashSet::new();
    for opportunity in &snapshot.opportunities {
        if !opportunity_ids.insert(opportunity.id.as_str()) {
            return Err(SnapshotError::DuplicateOpportunity(opportunity.id.clone()));
        }
    }
    let mut event_ids = HashSet::new();
    for event in &snapshot.revenue_events {
        if !event_ids.insert(event.id) {
            return Err(SnapshotError::DuplicateRevenueEvent(event.id));
        }
    }
    validate_revenue_events(&snapshot.revenue_events)?;
    Ok(())
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Writes `bytes` to `path` via a sibling temp file and rename, so readers never see
/// a partially written file.
async fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("creating directory {}", parent.display()))?;

    let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .await
        .with_context(|| format!("opening temp file {}", temp_path.display()))?;
    file.write_all(bytes)
        .await
        .with_context(|| format!("writing temp file {}", temp_path.display()))?;
    file.flush()
        .await
        .with_context(|| format!("flushing temp file {}", temp_path.display()))?;
    drop(file);

    if let Err(err) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(err).with_context(|| {
            format!(
                "atomically renaming {} -> {}",
                temp_path.display(),
                path.display()
            )
        });
    }
    Ok(())
}

/// JSON snapshot file holding opportunities and the revenue event log.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> anyhow::Result<Snapshot> {
        let text = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading {}", self.path.display()))?;
        let snapshot: Snapshot = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        validate_snapshot(&snapshot)
            .with_context(|| format!("validating {}", self.path.display()))?;
        info!(
            path = %self.path.display(),
            opportunities = snapshot.opportunities.len(),
            revenue_events = snapshot.revenue_events.len(),
            "loaded snapshot"
        );
        Ok(snapshot)
    }

    pub async fn save(&self, snapshot: &Snapshot) -> anyhow::Result<()> {
        validate_snapshot(snapshot).context("refusing to save invalid snapshot")?;
        let span = info_span!("snapshot_save", path = %self.path.display());
        let _guard = span.enter();
        let bytes = serde_json::to_vec_pretty(snapshot).context("serializing snapshot")?;
        write_atomic(&self.path, &bytes).await
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredReport {
    pub name: String,
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub sha256: String,
    pub bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportManifest {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub files: Vec<ReportManifestFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportManifestFile {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

impl From<&StoredReport> for ReportManifestFile {
    fn from(report: &StoredReport) -> Self {
        Self {
            name: report.name.clone(),
            path: report.relative_path.display().to_string(),
            sha256: report.sha256.clone(),
            bytes: report.bytes,
        }
    }
}

/// Per-run report directory: `<root>/<YYYYmmdd_HHMMSS>_<run_id>/`.
#[derive(Debug, Clone)]
pub struct ReportStore {
    root: PathBuf,
}

impl ReportStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_dir(&self, generated_at: DateTime<Utc>, run_id: Uuid) -> PathBuf {
        let stamp = generated_at.format("%Y%m%d_%H%M%S").to_string();
        self.root.join(format!("{stamp}_{run_id}"))
    }

    /// Stores one artifact. Existing files are never overwritten.
    pub async fn store(
        &self,
        run_dir: &Path,
        name: &str,
        bytes: &[u8],
    ) -> anyhow::Result<StoredReport> {
        let absolute_path = run_dir.join(name);
        if fs::try_exists(&absolute_path)
            .await
            .with_context(|| format!("checking report path {}", absolute_path.display()))?
        {
            anyhow::bail!("report artifact {} already exists", absolute_path.display());
        }
        write_atomic(&absolute_path, bytes).await?;

        let relative_path = absolute_path
            .strip_prefix(&self.root)
            .unwrap_or(&absolute_path)
            .to_path_buf();
        Ok(StoredReport {
            name: name.to_string(),
            relative_path,
            absolute_path,
            sha256: sha256_hex(bytes),
            bytes: bytes.len() as u64,
        })
    }

    /// Writes every artifact plus a `manifest.json` listing their sha256 digests.
    pub async fn write_run(
        &self,
        generated_at: DateTime<Utc>,
        artifacts: &[(&str, Vec<u8>)],
    ) -> anyhow::Result<(PathBuf, ReportManifest)> {
        let run_id = Uuid::new_v4();
        let run_dir = self.run_dir(generated_at, run_id);
        let span = info_span!("report_run", %run_id, dir = %run_dir.display());
        let _guard = span.enter();

        let mut files = Vec::with_capacity(artifacts.len());
        for (name, bytes) in artifacts {
            let stored = self.store(&run_dir, name, bytes).await?;
            files.push(ReportManifestFile::from(&stored));
        }

        let manifest = ReportManifest {
            run_id,
            generated_at,
            files,
        };
        let bytes = serde_json::to_vec_pretty(&manifest).context("serializing report manifest")?;
        self.store(&run_dir, "manifest.json", &bytes).await?;
        info!(files = manifest.files.len(), "report run written");
        Ok((run_dir, manifest))
    }
}
