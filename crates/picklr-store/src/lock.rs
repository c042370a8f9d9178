//! The `<path>.lock` sidecar (§4.8, §6.5): a cooperative file lock recording
//! the writer's PID and acquisition time. A lock older than 10 minutes is
//! considered abandoned and is taken over rather than honored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

const STALE_AFTER_MINUTES: i64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

impl LockInfo {
    pub fn now() -> LockInfo {
        LockInfo { pid: std::process::id(), acquired_at: Utc::now() }
    }

    fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.acquired_at) > chrono::Duration::minutes(STALE_AFTER_MINUTES)
    }
}

/// Acquire the lock at `lock_path`, refusing if a live lock is already held.
/// A stale lock (older than 10 minutes) is overwritten rather than honored.
pub fn acquire(lock_path: &std::path::Path) -> Result<(), StoreError> {
    if let Ok(bytes) = std::fs::read(lock_path) {
        if let Ok(existing) = serde_json::from_slice::<LockInfo>(&bytes) {
            if !existing.is_stale(Utc::now()) {
                return Err(StoreError::StateLocked {
                    holder: existing.pid.to_string(),
                    acquired_at: existing.acquired_at.to_rfc3339(),
                });
            }
        }
    }

    let info = LockInfo::now();
    let bytes = serde_json::to_vec(&info).map_err(|e| StoreError::StateIo {
        path: lock_path.display().to_string(),
        message: e.to_string(),
    })?;
    std::fs::write(lock_path, bytes).map_err(|e| StoreError::StateIo {
        path: lock_path.display().to_string(),
        message: e.to_string(),
    })
}

/// Remove the sidecar, ignoring "not found" (§4.8: unlock is best-effort).
pub fn release(lock_path: &std::path::Path) -> Result<(), StoreError> {
    match std::fs::remove_file(lock_path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::StateIo { path: lock_path.display().to_string(), message: e.to_string() }),
    }
}
