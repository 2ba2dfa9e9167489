//! JSON schedule file.
//!
//! The file holds an array of schedule entries in the order the operator
//! arranged them:
//!
//! ```json
//! [
//!   {"id": "s1", "name": "Period 1", "time": "08:15:00",
//!    "interval_category": "first", "is_active": true, "is_recurring": true}
//! ]
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use bellcast_core::{Error, Result, ScheduleEntry, ScheduleRepository};

/// File backed [`ScheduleRepository`].
#[derive(Debug, Clone)]
pub struct ScheduleFile {
    path: PathBuf,
}

impl ScheduleFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default schedule file location.
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bellcast")
            .join("schedules.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every entry in the file, validated.
    pub fn load(&self) -> Result<Vec<ScheduleEntry>> {
        let content = fs::read_to_string(&self.path)?;
        let entries: Vec<ScheduleEntry> = serde_json::from_str(&content)?;
        for entry in &entries {
            entry
                .validate()
                .map_err(|e| Error::invalid_config(format!("{}: {}", self.path.display(), e)))?;
        }
        Ok(entries)
    }
}

impl ScheduleRepository for ScheduleFile {
    fn list_active(&self) -> Result<Vec<ScheduleEntry>> {
        Ok(self.load()?.into_iter().filter(|e| e.is_active).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bellcast_core::IntervalCategory;
    use time::macros::{date, time};

    fn write_entries(path: &Path, entries: &[ScheduleEntry]) {
        fs::write(path, serde_json::to_string_pretty(entries).unwrap()).unwrap();
    }

    #[test]
    fn test_list_active_keeps_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedules.json");
        write_entries(&path, &[
            ScheduleEntry::recurring("s2", "Lunch", time!(12:00:00), IntervalCategory::Lunch),
            ScheduleEntry::recurring("s1", "Period 1", time!(8:15:00), IntervalCategory::First)
                .active(false),
            ScheduleEntry::on_date(
                "s3",
                "Sports Day",
                time!(9:00:00),
                date!(2026 - 06 - 12),
                IntervalCategory::Custom,
            ),
        ]);

        let file = ScheduleFile::new(&path);
        let ids: Vec<_> = file.list_active().unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["s2", "s3"]);
        assert_eq!(file.load().unwrap().len(), 3);
    }

    #[test]
    fn test_reads_hand_written_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedules.json");
        fs::write(
            &path,
            r#"[{"id":"s1","name":"Dismissal","time":"15:30:00",
                 "interval_category":"dismissal","is_active":true,"is_recurring":true}]"#,
        )
        .unwrap();

        let entries = ScheduleFile::new(&path).list_active().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].time_string(), "15:30:00");
        assert_eq!(entries[0].interval_category, IntervalCategory::Dismissal);
    }

    #[test]
    fn test_one_off_without_date_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedules.json");
        fs::write(
            &path,
            r#"[{"id":"s9","name":"Fire drill","time":"11:00:00",
                 "interval_category":"custom","is_active":true,"is_recurring":false}]"#,
        )
        .unwrap();

        let err = ScheduleFile::new(&path).list_active().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert!(err.to_string().contains("s9"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ScheduleFile::new(dir.path().join("absent.json"))
            .load()
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_malformed_file_is_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedules.json");
        fs::write(&path, r#"[{"id":"s1","time":"8am"}]"#).unwrap();
        let err = ScheduleFile::new(&path).load().unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
