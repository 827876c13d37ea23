//! Persisting crawl results.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use async_trait::async_trait;

use crate::{error::Result, record::PartnerRecord};

#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn write_records(&self, records: &[PartnerRecord]) -> Result<()>;
}

/// Writes records as one JSON array, to a file or to stdout.
#[derive(Debug, Clone, Default)]
pub struct JsonFileSink {
    path: Option<PathBuf>,
}

impl JsonFileSink {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[async_trait]
impl ResultSink for JsonFileSink {
    async fn write_records(&self, records: &[PartnerRecord]) -> Result<()> {
        let json_string = serde_json::to_string_pretty(records)?;
        match &self.path {
            Some(path) => {
                tracing::info!("sink: writing {} records to '{}'", records.len(), path.display());
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent)?;
                }
                // Staged next to the target, then renamed over it.
                let staging = path.with_extension("json.tmp");
                let mut file = fs::File::create(&staging).map_err(|err| {
                    tracing::error!("failed to create '{}', error '{:?}'", staging.display(), err);
                    err
                })?;
                file.write_all(json_string.as_bytes())?;
                file.sync_all()?;
                fs::rename(&staging, path)?;
                tracing::info!("sink: wrote records to '{}'", path.display());
            }
            None => {
                tracing::info!("sink: writing records to 'stdout'");
                let mut stdout = io::stdout().lock();
                stdout.write_all(json_string.as_bytes())?;
                stdout.write_all(b"\n")?;
            }
        }
        Ok(())
    }
}

/// Reads records written by [`JsonFileSink`]. A missing or unreadable file
/// yields no records; the problem is logged and otherwise ignored.
pub fn read_records(path: &Path) -> Vec<PartnerRecord> {
    match fs::File::open(path) {
        Ok(file) => {
            let reader = io::BufReader::new(file);
            match serde_json::from_reader::<_, Vec<PartnerRecord>>(reader) {
                Ok(records) => {
                    tracing::info!("read {} saved records from '{}'", records.len(), path.display());
                    records
                }
                Err(err) => {
                    tracing::error!(
                        "Failed to read saved records from '{}' Error: '{:?}'. Ignoring",
                        path.display(),
                        err
                    );
                    Vec::new()
                }
            }
        }
        Err(err) => {
            tracing::warn!(
                "Failed to open file from '{}' Error: '{:?}'. Ignoring",
                path.display(),
                err
            );
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Field;

    #[tokio::test]
    async fn writes_a_json_array_that_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("partners.json");
        let mut record = PartnerRecord::new("https://x/p1", "Acme")
            .with_attribute(Field::Description, "Consultancy");
        record.add_tag("Salesforce Expertise", "Commerce");

        JsonFileSink::new(Some(path.clone()))
            .write_records(&[record.clone()])
            .await
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw.is_array());
        assert_eq!(raw[0]["foundIn"][0]["filters"][0], "Commerce");
        assert_eq!(read_records(&path), vec![record]);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn unreadable_files_yield_no_records() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_records(&dir.path().join("missing.json")).is_empty());

        let garbage = dir.path().join("garbage.json");
        fs::write(&garbage, "{not json").unwrap();
        assert!(read_records(&garbage).is_empty());
    }
}
