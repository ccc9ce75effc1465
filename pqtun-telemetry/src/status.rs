//! Atomic JSON status-file writer (spec §6.4, SPEC_FULL §4.11).
//!
//! The file is written after handshake, after each rekey commit/abort,
//! and on a periodic tick, by writing to a `.tmp` sibling and renaming
//! it into place so a reader never observes a half-written file.

use pqtun_core::counters::CountersSnapshot;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::interval;
use tracing::warn;

/// Point-in-time snapshot written to the status file.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    /// Session id, hex-encoded and truncated to an 8-hex-char prefix
    /// unless `full_session_id` was requested (spec §6.4).
    pub session_id: String,
    pub suite_id: String,
    pub counters: CountersSnapshot,
}

/// Hex-encodes `session_id`, truncating to an 8-hex-char prefix (4 bytes)
/// unless `full` is set, matching spec §6.4's default redaction.
pub fn format_session_id(session_id: &[u8], full: bool) -> String {
    let hex = hex::encode(session_id);
    if full {
        hex
    } else {
        hex.chars().take(8).collect()
    }
}

/// Writes `status` to `path` atomically: write to `<path>.tmp`, then
/// rename over `path`.
pub async fn write_status_file(path: &Path, status: &StatusSnapshot) -> io::Result<()> {
    let tmp_path = tmp_path_for(path);
    let data = serde_json::to_vec_pretty(status).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    tokio::fs::write(&tmp_path, data).await?;
    tokio::fs::rename(&tmp_path, path).await
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".tmp");
    PathBuf::from(os)
}

/// Spawns a task that writes the status file on a fixed interval (spec
/// §6.4's "every 1 second" trigger), using `snapshot_fn` to produce a
/// fresh snapshot on each tick. Handshake- and rekey-triggered writes are
/// the caller's responsibility via [`write_status_file`] directly.
pub fn spawn_periodic_writer<F>(
    path: PathBuf,
    tick: Duration,
    mut snapshot_fn: F,
) -> tokio::task::JoinHandle<()>
where
    F: FnMut() -> StatusSnapshot + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(tick);
        loop {
            ticker.tick().await;
            let snap = snapshot_fn();
            if let Err(e) = write_status_file(&path, &snap).await {
                warn!(error = %e, path = %path.display(), "failed to write status file");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pqtun_core::Counters;

    #[test]
    fn session_id_is_truncated_to_eight_hex_chars_by_default() {
        let id = [0xDE, 0xAD, 0xBE, 0xEF, 0x01, 0x02, 0x03, 0x04];
        assert_eq!(format_session_id(&id, false), "deadbeef");
        assert_eq!(format_session_id(&id, true), "deadbeef01020304");
    }

    #[tokio::test]
    async fn write_status_file_is_readable_immediately_after_rename() {
        let dir = std::env::temp_dir().join(format!("pqtun-status-test-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("status.json");

        let counters = Counters::new();
        counters.record_rekey_ok(true);
        let snap = StatusSnapshot {
            session_id: "deadbeef".to_string(),
            suite_id: "cs-mlkem768-aesgcm-mldsa65".to_string(),
            counters: counters.snapshot(),
        };

        write_status_file(&path, &snap).await.unwrap();
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(contents.contains("deadbeef"));
        assert!(!tmp_path_for(&path).exists());

        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
