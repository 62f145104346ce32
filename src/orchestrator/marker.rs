use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::GenerationKind;

/// Client-local breadcrumb saying "a batch of this kind may still be live".
/// The server record stays authoritative; the marker only tells a fresh
/// session where to look after a crash or page close.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumptionMarker {
    pub queue_record_id: Uuid,
    pub owner_id: Uuid,
    pub kind: GenerationKind,
    pub last_known_produced_count: i64,
    pub paused: bool,
}

/// One JSON file per (owner, kind) in a client-writable directory. Writes
/// go through a temp file and rename so a crash never leaves a truncated
/// marker behind.
pub struct MarkerStore {
    dir: PathBuf,
}

impl MarkerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        MarkerStore { dir: dir.into() }
    }

    pub fn path(&self, owner_id: Uuid, kind: GenerationKind) -> PathBuf {
        self.dir
            .join(format!("batch-{}-{}.json", owner_id, kind.as_str()))
    }

    /// Load the marker for (owner, kind). Unreadable or mismatched files
    /// are treated as absent and removed, so one bad write cannot wedge
    /// recovery forever.
    pub fn load(&self, owner_id: Uuid, kind: GenerationKind) -> Option<ResumptionMarker> {
        let path = self.path(owner_id, kind);
        let raw = std::fs::read_to_string(&path).ok()?;

        match serde_json::from_str::<ResumptionMarker>(&raw) {
            Ok(marker) if marker.owner_id == owner_id && marker.kind == kind => Some(marker),
            _ => {
                tracing::warn!(path = %path.display(), "Discarding unreadable resumption marker");
                remove_quietly(&path);
                None
            }
        }
    }

    pub fn save(&self, marker: &ResumptionMarker) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;

        let path = self.path(marker.owner_id, marker.kind);
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_vec_pretty(marker)?;

        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &path)?;

        Ok(())
    }

    pub fn clear(&self, owner_id: Uuid, kind: GenerationKind) {
        remove_quietly(&self.path(owner_id, kind));
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove marker file");
        }
    }
}
