use super::model::{ExecutionReport, RunStatus};
use crate::error::ReportError;
use std::fs;
use std::path::{Path, PathBuf};

const REPORT_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%3fZ";

/// Reports persisted as `<dir>/<plan_hash>-<timestamp>.json`.
#[derive(Debug, Clone)]
pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where `report` is (or would be) saved.
    pub fn path_for(&self, report: &ExecutionReport) -> PathBuf {
        let stamp = report.finished_at.format(REPORT_TIMESTAMP_FORMAT);
        self.dir.join(format!("{}-{stamp}.json", report.plan_hash))
    }

    /// Write `report` as pretty JSON and return its path. Two runs finishing
    /// in the same millisecond get the run id appended instead of colliding.
    pub fn save(&self, report: &ExecutionReport) -> Result<PathBuf, ReportError> {
        let mut path = self.path_for(report);
        if path.exists() {
            let short_id: String = report.run_id.chars().take(8).collect();
            path = path.with_file_name(format!(
                "{}-{}-{short_id}.json",
                report.plan_hash,
                report.finished_at.format(REPORT_TIMESTAMP_FORMAT)
            ));
        }
        let json = serde_json::to_string_pretty(report).map_err(|e| ReportError::Write {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        write_atomic(&path, &json)?;
        tracing::debug!(path = %path.display(), "report.saved");
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<ExecutionReport, ReportError> {
        let read_err = |message: String| ReportError::Read {
            path: path.display().to_string(),
            message,
        };
        let text = fs::read_to_string(path).map_err(|e| read_err(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| read_err(e.to_string()))
    }

    /// Most recent stored `success` report for `plan_hash`, if any. Unreadable
    /// files are skipped with a warning.
    pub fn find_successful(
        &self,
        plan_hash: &str,
    ) -> Result<Option<(PathBuf, ExecutionReport)>, ReportError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ReportError::Read {
                    path: self.dir.display().to_string(),
                    message: e.to_string(),
                });
            }
        };

        let prefix = format!("{plan_hash}-");
        let mut best: Option<(PathBuf, ExecutionReport)> = None;
        for entry in entries.flatten() {
            let path = entry.path();
            let is_candidate = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(&prefix) && name.ends_with(".json"));
            if !is_candidate {
                continue;
            }
            let report = match Self::load(&path) {
                Ok(report) => report,
                Err(e) => {
                    tracing::warn!("skipping unreadable report: {e}");
                    continue;
                }
            };
            if report.plan_hash != plan_hash || report.status != RunStatus::Success {
                continue;
            }
            if best
                .as_ref()
                .is_none_or(|(_, current)| report.finished_at > current.finished_at)
            {
                best = Some((path, report));
            }
        }
        Ok(best)
    }
}

fn write_atomic(path: &Path, content: &str) -> Result<(), ReportError> {
    let write_err = |message: String| ReportError::Write {
        path: path.display().to_string(),
        message,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
    }

    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, content).map_err(|e| write_err(e.to_string()))?;

    if let Err(rename_error) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(write_err(rename_error.to_string()));
    }

    Ok(())
}
