//! Format writers.
//!
//! Every writer consumes the record stream in chunks (default 10 000 rows),
//! writes each chunk, then yields, so peak memory tracks the chunk size and
//! not the row count.

use std::path::Path;
use std::sync::Arc;

use arrow::json::reader::{infer_json_schema_from_iterator, ReaderBuilder};
use futures::StreamExt;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::{ExportError, ExportFormat, ExportOptions, RecordStream};

/// Rows for Parquet schema inference.
const SCHEMA_SAMPLE_ROWS: usize = 100;

/// Outcome of a completed export.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct ExportStats {
    pub rows_exported: u64,
    pub bytes_written: u64,
    pub chunks_processed: u64,
}

/// Write `stream` to `path` in `format`. The stream is fully drained unless
/// an error occurs; partial output is the caller's to clean up.
pub async fn export_stream(
    stream: RecordStream,
    path: &Path,
    format: ExportFormat,
    options: &ExportOptions,
) -> Result<ExportStats, ExportError> {
    debug!(path = %path.display(), ?format, "starting export");
    match format {
        ExportFormat::Csv => write_delimited(stream, path, options, options.delimiter as u8).await,
        ExportFormat::Tsv => write_delimited(stream, path, options, b'\t').await,
        ExportFormat::Json => write_json(stream, path, options).await,
        ExportFormat::Jsonl => write_jsonl(stream, path, options).await,
        ExportFormat::Excel => write_excel(stream, path, options).await,
        ExportFormat::Parquet => write_parquet(stream, path, options).await,
    }
}

/// Render a JSON value as one delimited-text or spreadsheet cell.
fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// Field names of the first row, in map order. Later rows are restricted to
/// this set.
fn header_fields(row: &Value) -> Vec<String> {
    match row {
        Value::Object(map) => map.keys().cloned().collect(),
        _ => vec!["value".to_string()],
    }
}

async fn write_delimited(
    mut stream: RecordStream,
    path: &Path,
    options: &ExportOptions,
    delimiter: u8,
) -> Result<ExportStats, ExportError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut stats = ExportStats::default();
    let mut headers: Option<Vec<String>> = None;
    let mut chunk: Vec<Value> = Vec::with_capacity(options.chunk_size.min(65_536));

    loop {
        let next = stream.next().await;
        let drained = next.is_none();
        if let Some(row) = next {
            chunk.push(row);
            if chunk.len() < options.chunk_size.max(1) {
                continue;
            }
        }

        if !chunk.is_empty() {
            if headers.is_none() {
                headers = Some(header_fields(&chunk[0]));
            }
            let fields = headers.as_deref().unwrap_or(&[]);
            let buffer = encode_delimited_chunk(
                &chunk,
                fields,
                delimiter,
                options.include_headers && stats.chunks_processed == 0,
            )?;
            file.write_all(&buffer).await?;
            stats.bytes_written += buffer.len() as u64;
            stats.rows_exported += chunk.len() as u64;
            stats.chunks_processed += 1;
            chunk.clear();
            tokio::task::yield_now().await;
        }

        if drained {
            break;
        }
    }

    file.flush().await?;
    Ok(stats)
}

fn encode_delimited_chunk(
    rows: &[Value],
    fields: &[String],
    delimiter: u8,
    with_header: bool,
) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .from_writer(Vec::new());
    if with_header {
        writer.write_record(fields)?;
    }
    for row in rows {
        let cells: Vec<String> = fields
            .iter()
            .map(|field| row.get(field).map(cell_text).unwrap_or_default())
            .collect();
        writer.write_record(&cells)?;
    }
    writer
        .into_inner()
        .map_err(|err| ExportError::Io(std::io::Error::other(err)))
}

async fn write_json(
    mut stream: RecordStream,
    path: &Path,
    options: &ExportOptions,
) -> Result<ExportStats, ExportError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut stats = ExportStats::default();

    file.write_all(b"[").await?;
    stats.bytes_written += 1;

    let mut first = true;
    let mut buffer = String::new();
    while let Some(row) = stream.next().await {
        if !first {
            buffer.push(',');
        }
        first = false;
        if options.pretty {
            buffer.push('\n');
            let body = serde_json::to_string_pretty(&row)?;
            for line in body.lines() {
                buffer.push_str("  ");
                buffer.push_str(line);
                buffer.push('\n');
            }
            // Strip the trailing newline so the comma lands on the last line.
            buffer.pop();
        } else {
            buffer.push_str(&serde_json::to_string(&row)?);
        }
        stats.rows_exported += 1;

        if buffer.len() >= 1 << 20 || stats.rows_exported % options.chunk_size.max(1) as u64 == 0 {
            file.write_all(buffer.as_bytes()).await?;
            stats.bytes_written += buffer.len() as u64;
            stats.chunks_processed += 1;
            buffer.clear();
            tokio::task::yield_now().await;
        }
    }

    if options.pretty && stats.rows_exported > 0 {
        buffer.push('\n');
    }
    buffer.push(']');
    file.write_all(buffer.as_bytes()).await?;
    stats.bytes_written += buffer.len() as u64;
    file.flush().await?;
    Ok(stats)
}

async fn write_jsonl(
    mut stream: RecordStream,
    path: &Path,
    options: &ExportOptions,
) -> Result<ExportStats, ExportError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut stats = ExportStats::default();
    let mut buffer = String::new();

    while let Some(row) = stream.next().await {
        buffer.push_str(&serde_json::to_string(&row)?);
        buffer.push('\n');
        stats.rows_exported += 1;

        if stats.rows_exported % options.chunk_size.max(1) as u64 == 0 {
            file.write_all(buffer.as_bytes()).await?;
            stats.bytes_written += buffer.len() as u64;
            stats.chunks_processed += 1;
            buffer.clear();
            tokio::task::yield_now().await;
        }
    }

    file.write_all(buffer.as_bytes()).await?;
    stats.bytes_written += buffer.len() as u64;
    file.flush().await?;
    Ok(stats)
}

async fn write_excel(
    mut stream: RecordStream,
    path: &Path,
    options: &ExportOptions,
) -> Result<ExportStats, ExportError> {
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(&options.sheet_name)?;

    let mut stats = ExportStats::default();
    let mut headers: Option<Vec<String>> = None;
    let mut row_index: u32 = 0;

    while let Some(row) = stream.next().await {
        if headers.is_none() {
            let fields = header_fields(&row);
            for (col, field) in fields.iter().enumerate() {
                worksheet.write_string(0, col as u16, field.as_str())?;
            }
            headers = Some(fields);
            row_index = 1;
        }
        if let Some(fields) = &headers {
            for (col, field) in fields.iter().enumerate() {
                let cell = row.get(field).unwrap_or(&Value::Null);
                match cell {
                    Value::Number(n) => {
                        if let Some(v) = n.as_f64() {
                            worksheet.write_number(row_index, col as u16, v)?;
                        }
                    }
                    Value::Bool(b) => {
                        worksheet.write_boolean(row_index, col as u16, *b)?;
                    }
                    Value::Null => {}
                    other => {
                        worksheet.write_string(row_index, col as u16, cell_text(other))?;
                    }
                }
            }
        }
        row_index += 1;
        stats.rows_exported += 1;
        if stats.rows_exported % options.chunk_size.max(1) as u64 == 0 {
            stats.chunks_processed += 1;
            tokio::task::yield_now().await;
        }
    }

    workbook.save(path)?;
    stats.bytes_written = tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0);
    Ok(stats)
}

async fn write_parquet(
    mut stream: RecordStream,
    path: &Path,
    options: &ExportOptions,
) -> Result<ExportStats, ExportError> {
    let mut stats = ExportStats::default();

    // First batch drives schema inference; later batches reuse the schema.
    let mut sample: Vec<Value> = Vec::with_capacity(SCHEMA_SAMPLE_ROWS);
    while sample.len() < SCHEMA_SAMPLE_ROWS {
        match stream.next().await {
            Some(row) => sample.push(row),
            None => break,
        }
    }
    if sample.is_empty() {
        tokio::fs::File::create(path).await?;
        return Ok(stats);
    }

    let schema = Arc::new(infer_json_schema_from_iterator(
        sample.iter().map(|v| Ok::<_, arrow::error::ArrowError>(v.clone())),
    )?);
    let compression = match options.compression.as_str() {
        "none" => Compression::UNCOMPRESSED,
        "zstd" => Compression::ZSTD(ZstdLevel::default()),
        _ => Compression::SNAPPY,
    };
    let props = WriterProperties::builder().set_compression(compression).build();
    let file = std::fs::File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, Arc::clone(&schema), Some(props))?;

    let mut write_batch = |rows: &[Value]| -> Result<(), ExportError> {
        let mut decoder = ReaderBuilder::new(Arc::clone(&schema)).build_decoder()?;
        decoder.serialize(rows)?;
        if let Some(batch) = decoder.flush()? {
            writer.write(&batch)?;
        }
        Ok(())
    };

    write_batch(&sample)?;
    stats.rows_exported += sample.len() as u64;
    stats.chunks_processed += 1;
    drop(sample);

    let mut chunk: Vec<Value> = Vec::new();
    while let Some(row) = stream.next().await {
        chunk.push(row);
        if chunk.len() >= options.chunk_size.max(1) {
            write_batch(&chunk)?;
            stats.rows_exported += chunk.len() as u64;
            stats.chunks_processed += 1;
            chunk.clear();
            tokio::task::yield_now().await;
        }
    }
    if !chunk.is_empty() {
        write_batch(&chunk)?;
        stats.rows_exported += chunk.len() as u64;
        stats.chunks_processed += 1;
    }

    drop(write_batch);
    writer.close()?;
    stats.bytes_written = tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0);
    Ok(stats)
}
