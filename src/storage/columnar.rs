//! Parquet encoding of [`Paper`] records.
//!
//! Every partition and archive file shares one flat schema. Authors are kept
//! as a JSON array string so the layout stays readable by pandas/pyarrow
//! tooling. Files written by pandas store optional integers as `Float64` and
//! all-null columns as `Null`; both are accepted on read.

use crate::error::{StorageError, StorageResult};
use crate::models::Paper;
use arrow_array::{Array, ArrayRef, Float64Array, Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

static PAPER_SCHEMA: Lazy<SchemaRef> = Lazy::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("paper_id", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, false),
        Field::new("authors", DataType::Utf8, false),
        Field::new("abstract", DataType::Utf8, false),
        Field::new("url", DataType::Utf8, false),
        Field::new("hero_image", DataType::Utf8, true),
        Field::new("arxiv_url", DataType::Utf8, true),
        Field::new("github_url", DataType::Utf8, true),
        Field::new("github_stars", DataType::Int64, true),
        Field::new("hf_upvotes", DataType::Int64, true),
        Field::new("collected_at", DataType::Utf8, false),
    ]))
});

pub fn paper_schema() -> SchemaRef {
    Arc::clone(&PAPER_SCHEMA)
}

/// Build one record batch holding `papers` in order.
pub fn to_record_batch(papers: &[Paper]) -> StorageResult<RecordBatch> {
    let authors = papers
        .iter()
        .map(|p| serde_json::to_string(&p.authors))
        .collect::<Result<Vec<_>, _>>()?;
    let collected_at = papers
        .iter()
        .map(|p| p.collected_at.to_rfc3339())
        .collect::<Vec<_>>();

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(papers.iter().map(|p| p.id.as_str()))),
        Arc::new(StringArray::from_iter_values(papers.iter().map(|p| p.title.as_str()))),
        Arc::new(StringArray::from_iter_values(authors.iter())),
        Arc::new(StringArray::from_iter_values(
            papers.iter().map(|p| p.abstract_text.as_str()),
        )),
        Arc::new(StringArray::from_iter_values(papers.iter().map(|p| p.url.as_str()))),
        Arc::new(StringArray::from(
            papers.iter().map(|p| p.hero_image.as_deref()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            papers.iter().map(|p| p.arxiv_url.as_deref()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            papers.iter().map(|p| p.github_url.as_deref()).collect::<Vec<_>>(),
        )),
        Arc::new(Int64Array::from(
            papers.iter().map(|p| p.github_stars).collect::<Vec<_>>(),
        )),
        Arc::new(Int64Array::from(
            papers.iter().map(|p| p.hf_upvotes).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from_iter_values(collected_at.iter())),
    ];

    Ok(RecordBatch::try_new(paper_schema(), columns)?)
}

/// Decode the rows of `batch`; `path` is only used for error context.
pub fn from_record_batch(batch: &RecordBatch, path: &Path) -> StorageResult<Vec<Paper>> {
    let ids = required_strings(batch, "paper_id", path)?;
    let titles = required_strings(batch, "title", path)?;
    let authors = required_strings(batch, "authors", path)?;
    let abstracts = required_strings(batch, "abstract", path)?;
    let urls = required_strings(batch, "url", path)?;
    let hero_images = optional_strings(batch, "hero_image", path)?;
    let arxiv_urls = optional_strings(batch, "arxiv_url", path)?;
    let github_urls = optional_strings(batch, "github_url", path)?;
    let github_stars = optional_ints(batch, "github_stars", path)?;
    let hf_upvotes = optional_ints(batch, "hf_upvotes", path)?;
    let collected_at = required_strings(batch, "collected_at", path)?;

    let mut papers = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let author_list: Vec<String> =
            serde_json::from_str(authors.value(row)).map_err(|e| corrupt(path, e))?;
        papers.push(Paper {
            id: ids.value(row).to_string(),
            title: titles.value(row).to_string(),
            authors: author_list,
            abstract_text: abstracts.value(row).to_string(),
            url: urls.value(row).to_string(),
            hero_image: hero_images[row].clone(),
            arxiv_url: arxiv_urls[row].clone(),
            github_url: github_urls[row].clone(),
            github_stars: github_stars[row],
            hf_upvotes: hf_upvotes[row],
            collected_at: parse_collected_at(collected_at.value(row))
                .ok_or_else(|| corrupt(path, format!("bad collected_at at row {row}")))?,
        });
    }
    Ok(papers)
}

/// Read every row of a Parquet file written with [`write_papers`] (or by the
/// pandas tooling that shares the layout).
pub fn read_papers(path: &Path) -> StorageResult<Vec<Paper>> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut papers = Vec::new();
    for batch in reader {
        papers.extend(from_record_batch(&batch?, path)?);
    }
    Ok(papers)
}

/// Replace `path` with `papers`, Snappy compressed.
///
/// The file is first written next to the target and then renamed over it,
/// so readers never observe a half-written partition. On failure the
/// temporary file is removed.
pub fn write_papers(path: &Path, papers: &[Paper]) -> StorageResult<()> {
    let batch = to_record_batch(papers)?;
    let tmp_path = path.with_extension("parquet.tmp");

    let result = write_batch(&tmp_path, &batch)
        .and_then(|()| fs::rename(&tmp_path, path).map_err(StorageError::from));
    if result.is_err() {
        if let Err(e) = fs::remove_file(&tmp_path) {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %tmp_path.display(), error = %e, "Could not remove temporary partition");
            }
        }
    }
    result
}

fn write_batch(tmp_path: &Path, batch: &RecordBatch) -> StorageResult<()> {
    let file = File::create(tmp_path)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(batch)?;
    writer.close()?;
    Ok(())
}

fn parse_collected_at(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

fn corrupt(path: &Path, reason: impl ToString) -> StorageError {
    StorageError::Corrupt {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn column<'a>(batch: &'a RecordBatch, name: &str, path: &Path) -> StorageResult<&'a ArrayRef> {
    batch
        .column_by_name(name)
        .ok_or_else(|| corrupt(path, format!("missing column {name}")))
}

fn required_strings<'a>(
    batch: &'a RecordBatch,
    name: &str,
    path: &Path,
) -> StorageResult<&'a StringArray> {
    column(batch, name, path)?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| corrupt(path, format!("column {name} is not utf8")))
}

fn optional_strings(
    batch: &RecordBatch,
    name: &str,
    path: &Path,
) -> StorageResult<Vec<Option<String>>> {
    let array = column(batch, name, path)?;
    if array.data_type() == &DataType::Null {
        return Ok(vec![None; array.len()]);
    }
    let strings = array
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| corrupt(path, format!("column {name} is not utf8")))?;
    Ok(strings.iter().map(|v| v.map(str::to_string)).collect())
}

fn optional_ints(batch: &RecordBatch, name: &str, path: &Path) -> StorageResult<Vec<Option<i64>>> {
    let array = column(batch, name, path)?;
    match array.data_type() {
        DataType::Null => Ok(vec![None; array.len()]),
        DataType::Int64 => Ok(array
            .as_any()
            .downcast_ref::<Int64Array>()
            .ok_or_else(|| corrupt(path, format!("column {name} is not int64")))?
            .iter()
            .collect()),
        DataType::Float64 => Ok(array
            .as_any()
            .downcast_ref::<Float64Array>()
            .ok_or_else(|| corrupt(path, format!("column {name} is not float64")))?
            .iter()
            .map(|v| v.filter(|f| f.is_finite()).map(|f| f as i64))
            .collect()),
        other => Err(corrupt(path, format!("column {name} has type {other}"))),
    }
}
