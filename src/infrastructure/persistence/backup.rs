//! Backup safety net for file-backed stores
//!
//! The first write-opening of a store file in a process copies the existing
//! file verbatim to `<dir>/backups/<filename>.<YYYYMMDD_HHMMSS>`. Later
//! openings of the same file in the same process copy nothing, and read-only
//! openings never call into this module.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock};

use chrono::{DateTime, Utc};

pub const BACKUP_DIR: &str = "backups";

static BACKED_UP: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();

/// Where a backup of `path` taken at `at` lands
pub fn backup_path_for(path: &Path, at: DateTime<Utc>) -> PathBuf {
    let dir = path
        .parent()
        .map(|parent| parent.join(BACKUP_DIR))
        .unwrap_or_else(|| PathBuf::from(BACKUP_DIR));
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    dir.join(format!("{}.{}", file_name, at.format("%Y%m%d_%H%M%S")))
}

/// Stable identity for a path that may not exist yet
fn canonical(path: &Path) -> PathBuf {
    if let Ok(resolved) = path.canonicalize() {
        return resolved;
    }
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    match (parent.canonicalize(), path.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name),
        _ => path.to_path_buf(),
    }
}

fn registry() -> MutexGuard<'static, HashSet<PathBuf>> {
    let registry = BACKED_UP.get_or_init(|| Mutex::new(HashSet::new()));
    match registry.lock() {
        Ok(seen) => seen,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Claim the once-per-process backup for `path`. Returns false if this
/// process already claimed it.
fn claim(path: &Path) -> bool {
    registry().insert(canonical(path))
}

/// Give a claim back after a failed copy so the next opening retries
fn release(path: &Path) {
    registry().remove(&canonical(path));
}

/// Copy `path` into its backup directory unless this process already did.
///
/// Returns the backup location when a copy was made. A file that does not
/// exist yet has nothing to protect and is not copied.
pub async fn backup_once(path: &Path) -> std::io::Result<Option<PathBuf>> {
    if !claim(path) {
        return Ok(None);
    }
    match copy_to_backup(path).await {
        Ok(copied) => Ok(copied),
        Err(e) => {
            release(path);
            tracing::error!(source = %path.display(), error = %e, "Backup failed");
            Err(e)
        }
    }
}

async fn copy_to_backup(path: &Path) -> std::io::Result<Option<PathBuf>> {
    if !tokio::fs::try_exists(path).await? {
        return Ok(None);
    }

    let target = backup_path_for(path, Utc::now());
    if let Some(dir) = target.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    tokio::fs::copy(path, &target).await?;
    tracing::info!(
        source = %path.display(),
        backup = %target.display(),
        "Backed up store file before first write"
    );
    Ok(Some(target))
}
