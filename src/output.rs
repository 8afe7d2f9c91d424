use std::fs;
use std::io::{self, Write};

use camino::Utf8Path;
use serde::Serialize;
use tracing::info;

use crate::catalog::DatasetDescriptor;
use crate::domain::Detection;
use crate::error::FirmsError;
use crate::pipeline::{ChunkStatus, ProgressEvent, ProgressSink, RunOutcome};

#[derive(Debug, Clone, Serialize)]
pub struct RegionListing {
    pub country: String,
    pub large: bool,
    pub subdivisions: Vec<String>,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_run(outcome: &RunOutcome) -> io::Result<()> {
        Self::print_json(outcome)
    }

    pub fn print_datasets(datasets: &[DatasetDescriptor]) -> io::Result<()> {
        Self::print_json(&datasets)
    }

    pub fn print_regions(regions: &[RegionListing]) -> io::Result<()> {
        Self::print_json(&regions)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Human-readable progress lines on stderr, stdout stays machine-readable.
pub struct StderrProgress;

impl ProgressSink for StderrProgress {
    fn event(&self, event: ProgressEvent) {
        let line = match event {
            ProgressEvent::Stage(stage) => format!("[{stage}]"),
            ProgressEvent::Chunk {
                index,
                total,
                chunk,
                status: ChunkStatus::Fetched { rows },
            } => format!("chunk {}/{total} {chunk}: {rows} rows", index + 1),
            ProgressEvent::Chunk {
                index,
                total,
                chunk,
                status: ChunkStatus::Failed { reason },
            } => format!("chunk {}/{total} {chunk}: failed ({reason})", index + 1),
            ProgressEvent::Notice(message) => message,
        };
        eprintln!("{line}");
    }
}

pub fn write_csv_atomic(detections: &[Detection], dest: &Utf8Path) -> Result<(), FirmsError> {
    let parent = match dest.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    fs::create_dir_all(parent.as_std_path()).map_err(|err| FirmsError::Filesystem(err.to_string()))?;
    let temp = tempfile::Builder::new()
        .prefix("firms-incidents-csv")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| FirmsError::Filesystem(err.to_string()))?;

    let mut writer = csv::Writer::from_writer(temp.as_file());
    for detection in detections {
        writer.serialize(detection)?;
    }
    writer
        .flush()
        .map_err(|err| FirmsError::Filesystem(err.to_string()))?;
    drop(writer);

    temp.persist(dest.as_std_path())
        .map_err(|err| FirmsError::Filesystem(err.to_string()))?;
    info!(path = %dest, rows = detections.len(), "wrote CSV export");
    Ok(())
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use super::*;
    use crate::domain::parse_date;

    #[test]
    fn csv_export_has_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let dest = Utf8PathBuf::from_path_buf(dir.path().join("out/fires.csv")).unwrap();
        let mut detection = Detection::new(36.1, 70.2, parse_date("2025-03-01").unwrap(), 10.5);
        detection.cluster = 0;

        write_csv_atomic(&[detection], &dest).unwrap();
        let content = fs::read_to_string(dest.as_std_path()).unwrap();
        let mut lines = content.lines();
        assert!(lines.next().unwrap().starts_with("latitude,longitude,acq_date"));
        assert!(lines.next().unwrap().starts_with("36.1,70.2,2025-03-01"));
        assert!(lines.next().is_none());
    }
}
