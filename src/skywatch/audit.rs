use crate::skywatch::paths::SkywatchPaths;
use crate::skywatch::util::now_epoch_secs;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub at_epoch_secs: u64,
    pub phase: String,
    pub status: String,
    pub collection: String,
    pub message: String,
}

pub fn audit_log_path(paths: &SkywatchPaths) -> PathBuf {
    paths.logs_dir.join("audit.log")
}

pub fn append_event(
    paths: &SkywatchPaths,
    phase: &str,
    status: &str,
    collection: &str,
    message: &str,
) -> Result<()> {
    fs::create_dir_all(&paths.logs_dir)
        .with_context(|| format!("failed to create {}", paths.logs_dir.display()))?;
    let event = AuditEvent {
        at_epoch_secs: now_epoch_secs()?,
        phase: phase.to_string(),
        status: status.to_string(),
        collection: collection.to_string(),
        message: message.to_string(),
    };

    let line = format!("{}\n", serde_json::to_string(&event)?);
    let path = audit_log_path(paths);
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn events_append_as_json_lines() {
        let tmp = tempdir().expect("tempdir");
        let paths = SkywatchPaths {
            home: tmp.path().to_path_buf(),
            store_dir: tmp.path().join("store"),
            logs_dir: tmp.path().join("logs"),
            config_path: tmp.path().join("skywatch.toml"),
        };
        append_event(&paths, "upsert", "ok", "news", "size=1").expect("first");
        append_event(&paths, "remove", "noop", "news", "key=https://x").expect("second");

        let raw = fs::read_to_string(audit_log_path(&paths)).expect("read");
        let events: Vec<AuditEvent> = raw
            .lines()
            .map(|l| serde_json::from_str(l).expect("json line"))
            .collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].phase, "remove");
        assert_eq!(events[1].status, "noop");
    }
}
