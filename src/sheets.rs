use anyhow::Context;
use axum::{
    extract::Multipart,
    http::header,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{AppError, AppResult};

/// Request body cap for import routes.
pub const IMPORT_BODY_LIMIT: usize = 5 * 1024 * 1024;
pub const MAX_IMPORT_ROWS: usize = 1000;

/// A row type written by the exports. `HEADERS` must list the serialized
/// fields in declaration order.
pub trait SheetRow: Serialize {
    const HEADERS: &'static [&'static str];
}

/// CSV served as a download.
#[derive(Debug)]
pub struct CsvFile {
    pub filename: String,
    pub body: Vec<u8>,
}

impl IntoResponse for CsvFile {
    fn into_response(self) -> Response {
        (
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", self.filename),
                ),
            ],
            self.body,
        )
            .into_response()
    }
}

pub fn export<R: SheetRow>(
    filename: impl Into<String>,
    rows: impl IntoIterator<Item = R>,
) -> AppResult<CsvFile> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    wtr.write_record(R::HEADERS)
        .context("Failed to write CSV header")?;
    for row in rows {
        wtr.serialize(row).context("Failed to write CSV record")?;
    }
    let body = wtr
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV writer: {}", e.error()))?;
    Ok(CsvFile {
        filename: filename.into(),
        body,
    })
}

/// Reads the `file` field of an import request.
pub async fn read_sheet_field(mp: &mut Multipart) -> AppResult<Bytes> {
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| AppError::validation(format!("Malformed upload: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let is_csv = field.file_name().is_some_and(|n| n.to_ascii_lowercase().ends_with(".csv"))
            || matches!(
                field.content_type(),
                Some("text/csv" | "application/csv" | "application/vnd.ms-excel")
            );
        if !is_csv {
            return Err(AppError::validation("Please upload a CSV file"));
        }
        return field
            .bytes()
            .await
            .map_err(|e| AppError::validation(format!("Malformed upload: {}", e)));
    }
    Err(AppError::validation("Please upload a file"))
}

/// Row number as a spreadsheet shows it: the header is row 1.
fn sheet_row(index: usize) -> usize {
    index + 2
}

/// Parses every record by header name. Blank cells are `None`.
pub fn parse<R: DeserializeOwned>(body: &[u8]) -> AppResult<Vec<R>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(body);
    let mut rows = Vec::new();
    for (i, record) in rdr.deserialize::<R>().enumerate() {
        if i == MAX_IMPORT_ROWS {
            return Err(AppError::validation(format!(
                "Imports are limited to {} rows",
                MAX_IMPORT_ROWS
            )));
        }
        let row = record.map_err(|e| {
            let reason = match e.kind() {
                csv::ErrorKind::Deserialize { err, .. } => err.to_string(),
                _ => e.to_string(),
            };
            AppError::validation(format!("Row {}: {}", sheet_row(i), reason))
        })?;
        rows.push(row);
    }
    if rows.is_empty() {
        return Err(AppError::validation("The file has no rows"));
    }
    Ok(rows)
}

/// Validates each parsed row, prefixing a validation failure with its row.
pub fn convert_rows<R, T>(rows: Vec<R>, mut f: impl FnMut(R) -> AppResult<T>) -> AppResult<Vec<T>> {
    rows.into_iter()
        .enumerate()
        .map(|(i, row)| {
            f(row).map_err(|e| match e {
                AppError::Validation(msg) => {
                    AppError::Validation(format!("Row {}: {}", sheet_row(i), msg))
                }
                other => other,
            })
        })
        .collect()
}
