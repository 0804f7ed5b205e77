//! Versioned scan snapshot, written on completion or interruption.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scanner::{ScanSummary, StatsSnapshot, TargetReport};

pub const SESSION_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to write session '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read session '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse session '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("unsupported session version {found}, expected {expected}")]
    Version { found: u32, expected: u32 },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub interrupted: bool,
    pub targets: Vec<TargetSessionState>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TargetSessionState {
    pub base_url: String,
    pub completed: bool,
    pub skipped: Option<String>,
    pub pending_prefixes: Vec<(String, usize)>,
    pub stats: StatsSnapshot,
}

impl SessionSnapshot {
    pub fn from_summary(summary: &ScanSummary) -> Self {
        Self {
            version: SESSION_VERSION,
            saved_at: Utc::now(),
            interrupted: summary.interrupted,
            targets: summary.reports.iter().map(TargetSessionState::from).collect(),
        }
    }
}

impl From<&TargetReport> for TargetSessionState {
    fn from(report: &TargetReport) -> Self {
        Self {
            base_url: report.base_url.clone(),
            completed: report.completed,
            skipped: report.skipped.clone(),
            pending_prefixes: report.pending_prefixes.clone(),
            stats: report.stats,
        }
    }
}

pub fn save(path: &Path, snapshot: &SessionSnapshot) -> Result<(), SessionError> {
    let contents = serde_yaml::to_string(snapshot).map_err(|e| SessionError::Write {
        path: path.display().to_string(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
    })?;
    std::fs::write(path, contents).map_err(|source| SessionError::Write {
        path: path.display().to_string(),
        source,
    })
}

pub fn load(path: &Path) -> Result<SessionSnapshot, SessionError> {
    let contents = std::fs::read_to_string(path).map_err(|source| SessionError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let snapshot: SessionSnapshot =
        serde_yaml::from_str(&contents).map_err(|source| SessionError::Parse {
            path: path.display().to_string(),
            source,
        })?;
    if snapshot.version != SESSION_VERSION {
        return Err(SessionError::Version {
            found: snapshot.version,
            expected: SESSION_VERSION,
        });
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    fn summary() -> ScanSummary {
        ScanSummary {
            reports: vec![TargetReport {
                base_url: "http://t/".to_string(),
                completed: false,
                skipped: None,
                stats: StatsSnapshot {
                    requests: 120,
                    retries: 2,
                    transport_errors: 1,
                    filtered: 80,
                    delivered: 4,
                },
                pending_prefixes: vec![("api/".to_string(), 1)],
            }],
            interrupted: true,
            fatal_transport: false,
            elapsed: Duration::from_secs(3),
        }
    }

    fn temp_path(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("pathscout-session-{}-{name}.yml", std::process::id()));
        path
    }

    #[test]
    fn snapshot_round_trips() {
        let path = temp_path("roundtrip");
        let snapshot = SessionSnapshot::from_summary(&summary());
        save(&path, &snapshot).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.version, SESSION_VERSION);
        assert!(loaded.interrupted);
        assert_eq!(loaded.targets.len(), 1);
        assert_eq!(loaded.targets[0].pending_prefixes, vec![("api/".to_string(), 1)]);
        assert_eq!(loaded.targets[0].stats.requests, 120);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let path = temp_path("version");
        let mut snapshot = SessionSnapshot::from_summary(&summary());
        snapshot.version = 99;
        save(&path, &snapshot).unwrap();
        assert!(matches!(
            load(&path),
            Err(SessionError::Version { found: 99, .. })
        ));
        std::fs::remove_file(path).ok();
    }
}
