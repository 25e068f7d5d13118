use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use crate::error::RadarError;
use crate::models::commit::CommitDoc;
use crate::models::record::FileImpactRecord;

const FORMAT_VERSION: u32 = 1;

/// Persisted state of one repository.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SnapshotData {
    pub repo_id: String,
    pub records: BTreeMap<String, FileImpactRecord>,
    pub commits: BTreeMap<String, CommitDoc>,
}

#[derive(Deserialize)]
struct StoredFile {
    version: u32,
    #[serde(flatten)]
    data: SnapshotData,
}

#[derive(Serialize)]
struct StoredFileRef<'a> {
    version: u32,
    repo_id: &'a str,
    records: &'a BTreeMap<String, FileImpactRecord>,
    commits: &'a BTreeMap<String, CommitDoc>,
}

/// One JSON snapshot per repository, sharded by the BLAKE3 hash of its id.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create index directory: {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// Compute the BLAKE3 hash of a repository id.
    pub fn key(repo_id: &str) -> String {
        blake3::hash(repo_id.as_bytes()).to_hex().to_string()
    }

    pub fn load(&self, repo_id: &str) -> Result<Option<SnapshotData>> {
        let path = self.snapshot_path(repo_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read(&path).map_err(|e| RadarError::index_read(repo_id, e))?;
        let stored: StoredFile =
            serde_json::from_slice(&content).map_err(|e| RadarError::index_read(repo_id, e))?;
        if stored.version != FORMAT_VERSION {
            bail!(RadarError::index_read(
                repo_id,
                format!("unsupported snapshot version {}", stored.version),
            ));
        }
        if stored.data.repo_id != repo_id {
            bail!(RadarError::index_read(
                repo_id,
                format!("snapshot belongs to {}", stored.data.repo_id),
            ));
        }
        Ok(Some(stored.data))
    }

    /// Write the snapshot to a temp file and rename it into place, so readers
    /// see either the previous snapshot or the new one.
    pub fn save(
        &self,
        repo_id: &str,
        records: &BTreeMap<String, FileImpactRecord>,
        commits: &BTreeMap<String, CommitDoc>,
    ) -> Result<()> {
        let path = self.snapshot_path(repo_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| RadarError::index_write(repo_id, e))?;
        }

        let stored = StoredFileRef {
            version: FORMAT_VERSION,
            repo_id,
            records,
            commits,
        };
        let data = serde_json::to_vec(&stored)?;

        let tmp = path.with_extension(format!("json.tmp.{}", std::process::id()));
        fs::write(&tmp, &data).map_err(|e| RadarError::index_write(repo_id, e))?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            bail!(RadarError::index_write(repo_id, e));
        }
        Ok(())
    }

    fn snapshot_path(&self, repo_id: &str) -> PathBuf {
        let hash = Self::key(repo_id);
        // Use first 2 chars as directory shard
        let (prefix, rest) = hash.split_at(2.min(hash.len()));
        self.dir.join(prefix).join(format!("{rest}.json"))
    }
}
