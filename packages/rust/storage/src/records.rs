//! One-JSON-file-per-document stage directories.
//!
//! Every stage writes its records as pretty JSON into its own directory,
//! named by the record's file stem. Readers scan `*.json` in sorted name
//! order and skip (and log) anything that does not parse.

use std::path::{Path, PathBuf};

use paperflow_shared::{PaperRecord, PaperflowError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// A file that could not be read or parsed.
#[derive(Debug, Clone)]
pub struct LoadFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Records loaded from a directory, in sorted file-name order.
#[derive(Debug)]
pub struct Loaded<R> {
    pub records: Vec<R>,
    pub failures: Vec<LoadFailure>,
}

/// A stage's output directory.
#[derive(Debug, Clone)]
pub struct RecordDir {
    root: PathBuf,
}

impl RecordDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Open the directory, creating it if needed.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let dir = Self::new(root);
        std::fs::create_dir_all(&dir.root).map_err(|e| PaperflowError::io(&dir.root, e))?;
        Ok(dir)
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Path of a sibling file (e.g. a downloaded document) in this directory.
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Path the record with `stem` is written to.
    pub fn record_path(&self, stem: &str) -> PathBuf {
        self.root.join(format!("{stem}.json"))
    }

    /// Write `record` as `<stem>.json`, replacing any previous version.
    pub fn write<R>(&self, record: &R) -> Result<PathBuf>
    where
        R: PaperRecord + Serialize,
    {
        std::fs::create_dir_all(&self.root).map_err(|e| PaperflowError::io(&self.root, e))?;

        let path = self.record_path(&record.file_stem());
        let json = serde_json::to_string_pretty(record).map_err(|e| {
            PaperflowError::parse(format!("failed to serialize {}: {e}", record.paper_id()))
        })?;

        // Readers never observe a partial file.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| PaperflowError::io(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| PaperflowError::io(&path, e))?;

        debug!(paper_id = record.paper_id(), path = %path.display(), "wrote record");
        Ok(path)
    }

    /// Sorted list of `*.json` files. A missing directory is empty.
    pub fn json_files(&self) -> Result<Vec<PathBuf>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PaperflowError::io(&self.root, e)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PaperflowError::io(&self.root, e))?;
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Load every record that parses as `R`.
    pub fn load_all<R: DeserializeOwned>(&self) -> Result<Loaded<R>> {
        let mut records = Vec::new();
        let mut failures = Vec::new();

        for path in self.json_files()? {
            match read_record::<R>(&path) {
                Ok(record) => records.push(record),
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping unreadable record");
                    failures.push(LoadFailure {
                        path,
                        error: error.to_string(),
                    });
                }
            }
        }

        debug!(
            dir = %self.root.display(),
            loaded = records.len(),
            failed = failures.len(),
            "loaded records"
        );
        Ok(Loaded { records, failures })
    }
}

fn read_record<R: DeserializeOwned>(path: &Path) -> Result<R> {
    let content = std::fs::read_to_string(path).map_err(|e| PaperflowError::io(path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| PaperflowError::parse(format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use paperflow_shared::PaperMetadata;

    fn metadata(id: &str, title: &str) -> PaperMetadata {
        PaperMetadata {
            paper_id: id.into(),
            title: title.into(),
            authors: vec!["Ada Lovelace".into()],
            abstract_text: None,
            categories: vec!["cs.AI".into()],
            pdf_url: String::new(),
            published: None,
            source: "arxiv".into(),
            document_file: None,
            ingested_at: Utc::now(),
        }
    }

    #[test]
    fn write_then_load_in_name_order() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = RecordDir::create(tmp.path().join("raw")).unwrap();

        dir.write(&metadata("2", "Zebra Paper")).unwrap();
        let path = dir.write(&metadata("1", "Alpha Paper")).unwrap();
        assert_eq!(path.file_name().unwrap(), "Alpha_Paper.json");

        let loaded: Loaded<PaperMetadata> = dir.load_all().unwrap();
        assert!(loaded.failures.is_empty());
        let ids: Vec<_> = loaded.records.iter().map(|r| r.paper_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn rewrite_replaces_same_stem() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = RecordDir::create(tmp.path()).unwrap();
        dir.write(&metadata("1", "Same Title")).unwrap();
        dir.write(&metadata("1b", "Same Title")).unwrap();

        let loaded: Loaded<PaperMetadata> = dir.load_all().unwrap();
        assert_eq!(loaded.records.len(), 1);
        assert_eq!(loaded.records[0].paper_id, "1b");
    }

    #[test]
    fn unparsable_files_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = RecordDir::create(tmp.path()).unwrap();
        dir.write(&metadata("1", "Good")).unwrap();
        std::fs::write(tmp.path().join("broken.json"), "{not json").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();

        let loaded: Loaded<PaperMetadata> = dir.load_all().unwrap();
        assert_eq!(loaded.records.len(), 1);
        assert_eq!(loaded.failures.len(), 1);
        assert!(loaded.failures[0].path.ends_with("broken.json"));
    }

    #[test]
    fn missing_directory_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = RecordDir::new(tmp.path().join("nope"));
        let loaded: Loaded<PaperMetadata> = dir.load_all().unwrap();
        assert!(loaded.records.is_empty());
        assert!(loaded.failures.is_empty());
    }
}
