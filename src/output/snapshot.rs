// src/output/snapshot.rs
// =============================================================================
// Writes the result store to disk.
//
// Two files, same content:
// - instances.json      pretty-printed, for people
// - instances.min.json  compact, for programs
//
// Each file is written to a temporary file in the same directory and then
// renamed over the old one. A reader (or a crash) therefore sees either the
// previous snapshot or the new one, never half of one.
//
// The crawler calls `save`, which runs the blocking file work on tokio's
// blocking pool so the fsyncs never stall in-flight requests.
// =============================================================================

use crate::crawl::Instance;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

pub const PRETTY_FILE: &str = "instances.json";
pub const COMPACT_FILE: &str = "instances.min.json";

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not encode or decode snapshot {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("snapshot write task failed: {0}")]
    Task(#[source] tokio::task::JoinError),
}

#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    dir: PathBuf,
}

impl SnapshotWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn pretty_path(&self) -> PathBuf {
        self.dir.join(PRETTY_FILE)
    }

    pub fn compact_path(&self) -> PathBuf {
        self.dir.join(COMPACT_FILE)
    }

    // Async wrapper around `write` for use inside the crawl
    pub async fn save(&self, instances: Vec<Instance>) -> Result<(), SnapshotError> {
        let writer = self.clone();
        tokio::task::spawn_blocking(move || writer.write(&instances))
            .await
            .map_err(SnapshotError::Task)?
    }

    // Replaces both files with `instances`
    //
    // The caller passes an already sorted snapshot; this function does not
    // reorder anything.
    pub fn write(&self, instances: &[Instance]) -> Result<(), SnapshotError> {
        fs::create_dir_all(&self.dir).map_err(|source| SnapshotError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let pretty_path = self.pretty_path();
        let pretty = serde_json::to_vec_pretty(instances).map_err(|source| SnapshotError::Json {
            path: pretty_path.clone(),
            source,
        })?;
        self.replace(&pretty_path, &pretty)?;

        let compact_path = self.compact_path();
        let compact = serde_json::to_vec(instances).map_err(|source| SnapshotError::Json {
            path: compact_path.clone(),
            source,
        })?;
        self.replace(&compact_path, &compact)
    }

    fn replace(&self, target: &Path, bytes: &[u8]) -> Result<(), SnapshotError> {
        let io_err = |source| SnapshotError::Io {
            path: target.to_path_buf(),
            source,
        };

        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(io_err)?;
        tmp.write_all(bytes).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(target).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

// Reads a snapshot written by SnapshotWriter (either flavour)
pub fn load_snapshot(path: &Path) -> Result<Vec<Instance>, SnapshotError> {
    let bytes = fs::read(path).map_err(|source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| SnapshotError::Json {
        path: path.to_path_buf(),
        source,
    })
}
