//! Raw frame archive.
//!
//! A frame is written under a temporary name before its incident exists and
//! renamed to `frame_<id>.jpg` once the id is known.

use chrono::Utc;
use lookout_shared::Result;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

pub struct FrameArchive {
    dir: PathBuf,
    seq: AtomicU64,
}

impl FrameArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            seq: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a frame ends up at for incident `id`.
    pub fn final_path(&self, id: i64) -> PathBuf {
        self.dir.join(format!("frame_{}.jpg", id))
    }

    /// Write the frame under a timestamped name.
    pub async fn save_pending(&self, bytes: &[u8]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        // Sequence suffix keeps same-millisecond uploads apart
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let path = self
            .dir
            .join(format!("frame_{}-{}.jpg", Utc::now().timestamp_millis(), seq));
        tokio::fs::write(&path, bytes).await?;
        debug!("Saved frame ({} bytes) to {}", bytes.len(), path.display());
        Ok(path)
    }

    /// Frame stored for incident `id`; `None` when there is none.
    pub async fn read(&self, id: i64) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.final_path(id)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Rename a pending frame to its incident id; returns the stored path.
    pub async fn finalize(&self, pending: &Path, id: i64) -> Result<String> {
        let target = self.final_path(id);
        tokio::fs::rename(pending, &target).await?;
        Ok(target.to_string_lossy().into_owned())
    }
}
