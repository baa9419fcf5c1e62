//! # ArgusDB Export Engine
//!
//! Streaming export of query-result records to CSV, TSV, JSON, JSONL, Excel
//! and Parquet, plus a background job manager with progress tracking,
//! cooperative cancellation and TTL-based artifact cleanup. Writers consume
//! records in fixed-size chunks so memory stays bounded regardless of row
//! count.

use futures::stream::BoxStream;
use serde_json::Value;

mod jobs;
mod writers;

pub use jobs::{ExportJob, ExportJobManager, ExportProgress, ExportTemplate, JobStatus};
pub use writers::{export_stream, ExportStats};

/// The record source consumed by every writer: an async stream of JSON rows.
pub type RecordStream = BoxStream<'static, Value>;

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Tsv,
    Json,
    Jsonl,
    Excel,
    Parquet,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Tsv => "tsv",
            Self::Json => "json",
            Self::Jsonl => "jsonl",
            Self::Excel => "xlsx",
            Self::Parquet => "parquet",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "tsv" => Some(Self::Tsv),
            "json" => Some(Self::Json),
            "jsonl" | "json_lines" => Some(Self::Jsonl),
            "excel" | "xlsx" => Some(Self::Excel),
            "parquet" => Some(Self::Parquet),
            _ => None,
        }
    }
}

/// Per-export tuning knobs. Each field maps to one of the format rules;
/// irrelevant fields are ignored by the other writers.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Rows buffered per write.
    pub chunk_size: usize,
    /// CSV/TSV field delimiter.
    pub delimiter: char,
    /// Emit the CSV header row.
    pub include_headers: bool,
    /// Indented JSON output.
    pub pretty: bool,
    /// Excel sheet name.
    pub sheet_name: String,
    /// Parquet compression: `none`, `snappy` or `zstd`.
    pub compression: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            chunk_size: 10_000,
            delimiter: ',',
            include_headers: true,
            pretty: false,
            sheet_name: "Data".to_string(),
            compression: "snappy".to_string(),
        }
    }
}

impl ExportOptions {
    /// Overlay `patch` (a JSON object of option keys) onto `self`. Unknown
    /// keys are ignored; later patches win, which is how template options are
    /// applied before request options.
    pub fn merged_with(&self, patch: &Value) -> Self {
        let mut base = serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Default::default()));
        if let (Value::Object(base_map), Value::Object(patch_map)) = (&mut base, patch) {
            for (key, value) in patch_map {
                base_map.insert(key.clone(), value.clone());
            }
        }
        serde_json::from_value(base).unwrap_or_default()
    }
}

/// Errors from the export engine. `ExportFailed` semantics: the job manager
/// records the message on the job and flips it to `failed`.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("export I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv write error: {0}")]
    Csv(#[from] csv::Error),

    #[error("excel write error: {0}")]
    Excel(#[from] rust_xlsxwriter::XlsxError),

    #[error("parquet write error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("arrow conversion error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("unknown export job: {0}")]
    UnknownJob(String),

    #[error("job {0} has no downloadable artifact")]
    NotDownloadable(String),

    #[error("unknown export template: {0}")]
    UnknownTemplate(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn format_extensions() {
        assert_eq!(ExportFormat::Excel.extension(), "xlsx");
        assert_eq!(ExportFormat::parse("JSONL"), Some(ExportFormat::Jsonl));
        assert_eq!(ExportFormat::parse("bmp"), None);
    }

    #[test]
    fn options_merge_prefers_patch() {
        let base = ExportOptions::default();
        let merged = base.merged_with(&json!({"delimiter": ";", "pretty": true}));
        assert_eq!(merged.delimiter, ';');
        assert!(merged.pretty);
        assert_eq!(merged.chunk_size, base.chunk_size);
    }

    #[test]
    fn options_merge_ignores_unknown_keys() {
        let merged = ExportOptions::default().merged_with(&json!({"no_such_option": 1}));
        assert_eq!(merged.chunk_size, 10_000);
    }
}
