use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use chrono::{NaiveDate, Utc};
use log::info;
use serde::Serialize;

use super::Exporter;
use crate::config::LocalExporterConfig;
use crate::error::ExportError;
use crate::samples::MetricSample;

/// The persisted form of a sample. `description` is intentionally omitted.
#[derive(Serialize)]
struct Record<'a> {
    name: &'a str,
    value: f64,
    unit: &'a str,
    timestamp: f64,
    labels: &'a BTreeMap<String, String>,
}

/// Writes metric samples to append-only JSONL files, one file per UTC day.
///
/// The file is opened lazily on the first write and rolled over to a new
/// file as soon as the UTC date changes between writes. Every batch is
/// flushed immediately: durability is favored over batching throughput.
pub struct LocalExporter {
    output_dir: PathBuf,
    file: Option<File>,
    current_date: Option<NaiveDate>,
}

/// Daily file name for resource samples.
pub fn resource_file_name(date: NaiveDate) -> String {
    format!("resources-{}.jsonl", date.format("%Y-%m-%d"))
}

impl LocalExporter {
    pub fn new(config: &LocalExporterConfig) -> Result<Self, ExportError> {
        let output_dir = PathBuf::from(&config.output_dir);
        std::fs::create_dir_all(&output_dir)?;
        info!("LocalExporter initialized -> {}", output_dir.display());
        Ok(Self {
            output_dir,
            file: None,
            current_date: None,
        })
    }

    fn ensure_file(&mut self, today: NaiveDate) -> Result<&mut File, ExportError> {
        if self.current_date != Some(today) || self.file.is_none() {
            let path = self.output_dir.join(resource_file_name(today));
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            self.file = Some(file);
            self.current_date = Some(today);
        }
        // just ensured above
        Ok(self.file.as_mut().ok_or_else(|| {
            ExportError::IoError(std::io::Error::other("output file unavailable"))
        })?)
    }

    fn write_batch(
        &mut self,
        today: NaiveDate,
        samples: &[MetricSample],
    ) -> Result<(), ExportError> {
        let mut lines = String::new();
        for sample in samples {
            let record = Record {
                name: &sample.name,
                value: sample.value,
                unit: &sample.unit,
                timestamp: sample.timestamp,
                labels: &sample.labels,
            };
            lines.push_str(&serde_json::to_string(&record)?);
            lines.push('\n');
        }
        let file = self.ensure_file(today)?;
        file.write_all(lines.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

impl Exporter for LocalExporter {
    fn export(&mut self, samples: &[MetricSample]) -> Result<(), ExportError> {
        self.write_batch(Utc::now().date_naive(), samples)
    }

    fn shutdown(&mut self) -> Result<(), ExportError> {
        if self.file.take().is_some() {
            info!("LocalExporter shut down");
        }
        Ok(())
    }
}
