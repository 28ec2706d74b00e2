//! Turning uploaded roster and legend files into tables, and tables back into
//! the CSV files the stores keep.

use std::borrow::Cow;
use std::io::Cursor;
use std::path::Path;

use calamine::{Reader, open_workbook_auto_from_rs};
use encoding_rs::{EUC_KR, Encoding, UTF_8};

use crate::error::{StoreError, StoreResult};
use crate::types::{DIVISION_COLUMN, Legend, NAME_COLUMN, Table};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Spreadsheet,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("xlsx" | "xlsm" | "xlsb" | "xls" | "ods") => Self::Spreadsheet,
            _ => Self::Csv,
        }
    }
}

/// Decodes uploaded text, trying UTF-8, then UTF-16 (BOM only), then EUC-KR
/// (CP949). The first strict decode wins.
pub fn decode_text(bytes: &[u8]) -> StoreResult<(Cow<'_, str>, &'static Encoding)> {
    let without_bom = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    if let Ok(text) = std::str::from_utf8(without_bom) {
        return Ok((Cow::Borrowed(text), UTF_8));
    }

    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes)
        && encoding != UTF_8
        && let Some(text) =
            encoding.decode_without_bom_handling_and_without_replacement(&bytes[bom_len..])
    {
        return Ok((Cow::Owned(text.into_owned()), encoding));
    }

    if let Some(text) = EUC_KR.decode_without_bom_handling_and_without_replacement(bytes) {
        return Ok((Cow::Owned(text.into_owned()), EUC_KR));
    }

    Err(StoreError::malformed(
        "file is not valid UTF-8, UTF-16 or EUC-KR text",
    ))
}

/// Parses CSV text with a header row. Blank lines are skipped and short rows
/// are allowed.
pub fn parse_csv(text: &str) -> StoreResult<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: Vec<String> = record.iter().map(|c| c.trim().to_string()).collect();
        if row.iter().all(|c| c.is_empty()) {
            continue;
        }
        rows.push(row);
    }

    Ok(Table::new(headers, rows))
}

/// Reads the first worksheet of a spreadsheet. The first row is the header.
pub fn parse_spreadsheet(bytes: &[u8]) -> StoreResult<Table> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| StoreError::malformed(format!("unreadable spreadsheet: {e}")))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| StoreError::malformed("spreadsheet has no worksheets"))?
        .map_err(|e| StoreError::malformed(format!("unreadable worksheet: {e}")))?;

    let mut rows = range
        .rows()
        .map(|row| row.iter().map(|c| c.to_string().trim().to_string()).collect::<Vec<_>>());
    let headers = rows
        .next()
        .ok_or_else(|| StoreError::malformed("worksheet is empty"))?;
    let rows = rows
        .filter(|row| row.iter().any(|c| !c.is_empty()))
        .collect();

    Ok(Table::new(headers, rows))
}

/// Parses an upload according to its file name.
pub fn parse_upload(file_name: &Path, bytes: &[u8]) -> StoreResult<Table> {
    match SourceFormat::from_path(file_name) {
        SourceFormat::Spreadsheet => parse_spreadsheet(bytes),
        SourceFormat::Csv => {
            let (text, encoding) = decode_text(bytes)?;
            tracing::debug!(file = %file_name.display(), encoding = encoding.name(), "decoded upload");
            parse_csv(&text)
        }
    }
}

/// Serialises a table as UTF-8 CSV, optionally with a BOM for spreadsheet apps.
pub fn to_csv(table: &Table, with_bom: bool) -> StoreResult<Vec<u8>> {
    let mut out = Vec::new();
    if with_bom {
        out.extend_from_slice(UTF8_BOM);
    }
    {
        let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(&mut out);
        writer.write_record(&table.headers)?;
        for row in &table.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
    }
    Ok(out)
}

/// Rejects rosters without the division and name columns.
pub fn validate_schedule(table: &Table) -> StoreResult<()> {
    for column in [DIVISION_COLUMN, NAME_COLUMN] {
        if !table.has_column(column) {
            return Err(StoreError::malformed(format!(
                "roster is missing the '{column}' column"
            )));
        }
    }
    Ok(())
}

/// Builds a legend from an uploaded table, rejecting uploads without both
/// legend columns.
pub fn legend_from_upload(table: &Table) -> StoreResult<Legend> {
    Legend::from_table(table).ok_or_else(|| {
        StoreError::malformed(format!(
            "legend must have '{}' and '{}' columns",
            crate::types::LEGEND_CODE_COLUMN,
            crate::types::LEGEND_DESCRIPTOR_COLUMN
        ))
    })
}
