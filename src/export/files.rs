//! File-backed sink writing CSV and JSON tables into one directory.

use crate::core::bands::BandTable;
use crate::core::record::FeatureRecord;
use crate::core::windowing::Window;
use crate::export::{channel_names, ExportError, FeatureRow, RecordSink};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Raw samples, one row per sample.
pub const RAW_CSV: &str = "mindbalance_raw.csv";
/// Feature rows, one per channel per window.
pub const FEATURES_CSV: &str = "mindbalance_features.csv";
/// The feature rows as a JSON array.
pub const FEATURES_JSON: &str = "mindbalance_features.json";

/// Writes `mindbalance_raw.csv`, `mindbalance_features.csv` and
/// `mindbalance_features.json` into a directory.
///
/// Both CSV files get their header on creation and are appended to as windows
/// complete. The JSON array is written once, by [`RecordSink::finish`].
pub struct FileSink {
    dir: PathBuf,
    raw: Option<csv::Writer<File>>,
    features: Option<csv::Writer<File>>,
    rows: Vec<FeatureRow>,
}

impl FileSink {
    /// Create `dir` if needed and open both CSV tables.
    pub fn create(
        dir: impl AsRef<Path>,
        channel_count: usize,
        bands: &BandTable,
    ) -> Result<Self, ExportError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut raw = csv::Writer::from_path(dir.join(RAW_CSV))?;
        let mut header = channel_names(channel_count);
        header.push("timestamp".to_string());
        raw.write_record(&header)?;

        let mut features = csv::Writer::from_path(dir.join(FEATURES_CSV))?;
        let mut header = vec!["window".to_string(), "channel".to_string()];
        header.extend(bands.names().into_iter().map(String::from));
        header.push("timestamp".to_string());
        features.write_record(&header)?;

        tracing::debug!("Exporting to {}", dir.display());

        Ok(Self {
            dir,
            raw: Some(raw),
            features: Some(features),
            rows: Vec::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn raw_path(&self) -> PathBuf {
        self.dir.join(RAW_CSV)
    }

    pub fn features_csv_path(&self) -> PathBuf {
        self.dir.join(FEATURES_CSV)
    }

    pub fn features_json_path(&self) -> PathBuf {
        self.dir.join(FEATURES_JSON)
    }
}

impl RecordSink for FileSink {
    fn persist_samples(&mut self, window: &Window) -> Result<(), ExportError> {
        let raw = self.raw.as_mut().ok_or(ExportError::Finished)?;
        for sample in &window.samples {
            let mut cells: Vec<String> = sample.values.iter().map(f64::to_string).collect();
            cells.push(sample.timestamp.to_string());
            raw.write_record(&cells)?;
        }
        raw.flush()?;
        Ok(())
    }

    fn persist_record(&mut self, record: &FeatureRecord) -> Result<(), ExportError> {
        let features = self.features.as_mut().ok_or(ExportError::Finished)?;
        for row in FeatureRow::from_record(record) {
            features.write_record(row.cells())?;
            self.rows.push(row);
        }
        features.flush()?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ExportError> {
        let (Some(mut raw), Some(mut features)) = (self.raw.take(), self.features.take()) else {
            return Err(ExportError::Finished);
        };
        raw.flush()?;
        features.flush()?;

        let mut writer = BufWriter::new(File::create(self.features_json_path())?);
        serde_json::to_writer_pretty(&mut writer, &self.rows)?;
        writer.flush()?;

        tracing::info!(
            "Wrote {} feature rows to {}",
            self.rows.len(),
            self.dir.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::types::{Sample, SourceMode};
    use crate::core::bands::aggregate;
    use crate::core::record::FeatureEmitter;
    use crate::core::spectral::Psd;
    use crate::core::windowing::WindowBuffer;

    fn window() -> Window {
        let mut buffer = WindowBuffer::with_capacity(2, 2, 2);
        buffer.push(Sample::new(vec![0.5, -1.0], 10.0)).unwrap();
        buffer.push(Sample::new(vec![0.25, 2.0], 10.5)).unwrap();
        buffer.drain()
    }

    fn record(window: &Window) -> FeatureRecord {
        let psd = Psd {
            frequencies: vec![0.0, 6.0, 10.0, 20.0],
            densities: vec![vec![1.0, 2.0, 3.0, 4.0]; 2],
            segment_len: 6,
            segments: 1,
        };
        FeatureEmitter::new().emit(
            aggregate(&psd, &BandTable::default()),
            10.0,
            window,
            SourceMode::Synthetic,
        )
    }

    #[test]
    fn test_file_sink_writes_three_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested/out");
        let window = window();

        let mut sink = FileSink::create(&out, 2, &BandTable::default()).unwrap();
        sink.persist_samples(&window).unwrap();
        sink.persist_record(&record(&window)).unwrap();
        sink.finish().unwrap();

        let raw = fs::read_to_string(out.join(RAW_CSV)).unwrap();
        assert_eq!(raw, "ch1,ch2,timestamp\n0.5,-1,10\n0.25,2,10.5\n");

        let features = fs::read_to_string(out.join(FEATURES_CSV)).unwrap();
        let lines: Vec<&str> = features.lines().collect();
        assert_eq!(lines[0], "window,channel,theta,alpha,beta,timestamp");
        assert_eq!(lines[1], "0,ch1,2,3,4,10");
        assert_eq!(lines.len(), 3);

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out.join(FEATURES_JSON)).unwrap()).unwrap();
        let rows = json.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["channel"], "ch2");
        assert_eq!(rows[1]["alpha"], 3.0);
    }

    #[test]
    fn test_headers_written_without_data() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FileSink::create(dir.path(), 3, &BandTable::default()).unwrap();
        sink.finish().unwrap();

        let raw = fs::read_to_string(sink.raw_path()).unwrap();
        assert_eq!(raw, "ch1,ch2,ch3,timestamp\n");
        let json = fs::read_to_string(sink.features_json_path()).unwrap();
        assert_eq!(json.trim(), "[]");
    }

    #[test]
    fn test_persist_after_finish_fails() {
        let dir = tempfile::tempdir().unwrap();
        let window = window();
        let mut sink = FileSink::create(dir.path(), 2, &BandTable::default()).unwrap();
        sink.finish().unwrap();

        assert!(matches!(
            sink.persist_samples(&window),
            Err(ExportError::Finished)
        ));
        assert!(matches!(sink.finish(), Err(ExportError::Finished)));
    }

    #[test]
    fn test_unwritable_directory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "not a directory").unwrap();

        let result = FileSink::create(blocker.join("out"), 2, &BandTable::default());
        assert!(matches!(result, Err(ExportError::Io(_))));
    }
}
