//! Reads word lists out of spreadsheets.
//!
//! Column 1 is the foreign word, column 2 an optional alternate answer and column 3 the
//! Vietnamese meaning. Rows missing either required column are skipped.

use crate::libshiken::kotoba::{Language, VocabItem, VocabUnit};
use calamine::{open_workbook_auto, Data, Reader};
use log::{debug, warn};
use serde::Deserialize;
use std::fs::File;
use std::path::Path;
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum YomikomiError {
    #[error("unsupported file type: {0}")]
    Unsupported(String),
    #[error("cannot read file")]
    Io(#[from] std::io::Error),
    #[error("cannot open workbook: {0}")]
    Workbook(#[from] calamine::Error),
    #[error("workbook has no sheets")]
    NoSheets,
    #[error("malformed csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no vocabulary rows in {0}")]
    NoItems(String),
}

pub const SUPPORTED_EXTENSIONS: [&str; 7] = ["xlsx", "xlsm", "xlsb", "xls", "ods", "csv", "json"];

#[derive(Deserialize, Debug)]
struct ItemJson {
    foreign: Option<String>,
    foreign_alt: Option<String>,
    native: Option<String>,
}

pub fn parse_source(path: &Path, language: Language) -> Result<VocabUnit, YomikomiError> {
    let now = Instant::now();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let items = match ext.as_str() {
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => items_from_rows(read_workbook(path)?),
        "csv" => items_from_rows(read_csv(File::open(path)?)?),
        "json" => items_from_json(&std::fs::read_to_string(path)?)?,
        _ => return Err(YomikomiError::Unsupported(file_name)),
    };
    if items.is_empty() {
        return Err(YomikomiError::NoItems(file_name));
    }

    debug!(
        "[Import] Read {} items from {} in {} ms.",
        items.len(),
        file_name,
        now.elapsed().as_millis()
    );
    Ok(VocabUnit::new(&file_name, language, items))
}

fn read_workbook(path: &Path) -> Result<Vec<Vec<String>>, YomikomiError> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(YomikomiError::NoSheets)??;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn read_csv<R: std::io::Read>(reader: R) -> Result<Vec<Vec<String>>, YomikomiError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(false)
        .from_reader(reader);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(String::from).collect());
    }
    Ok(rows)
}

/// Turns raw rows into items, skipping any row without both required columns.
pub fn items_from_rows(rows: Vec<Vec<String>>) -> Vec<VocabItem> {
    let mut items = Vec::with_capacity(rows.len());
    for (idx, row) in rows.iter().enumerate() {
        let column = |n: usize| row.get(n).map(String::as_str).unwrap_or("");
        match VocabItem::new(column(0), Some(column(1)), column(2)) {
            Ok(item) => items.push(item),
            Err(err) => debug!("[Import] Skipping row {}: {}", idx + 1, err),
        }
    }
    items
}

fn items_from_json(json: &str) -> Result<Vec<VocabItem>, YomikomiError> {
    let json = json.strip_prefix('\u{feff}').unwrap_or(json);
    let raw: Vec<ItemJson> = serde_json::from_str(json)?;
    let mut items = Vec::with_capacity(raw.len());
    for (idx, item) in raw.iter().enumerate() {
        match VocabItem::new(
            item.foreign.as_deref().unwrap_or(""),
            item.foreign_alt.as_deref(),
            item.native.as_deref().unwrap_or(""),
        ) {
            Ok(item) => items.push(item),
            Err(err) => warn!("[Import] Skipping entry {}: {}", idx + 1, err),
        }
    }
    Ok(items)
}
