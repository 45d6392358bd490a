//! Whole-table writers for CSV and XLSX sinks.

use std::path::Path;

use rust_xlsxwriter::{ColNum, Format, RowNum, Workbook, XlsxError};
use tracing::debug;

use goalforge_shared::{GoalforgeError, Result};

use crate::format::TabularFormat;
use crate::reader::Row;

/// Excel worksheet maximum row count.
const N_ROWS_EXCEL_MAX: usize = 1_048_576;
/// Excel sheet name maximum length.
const N_LEN_SHEET_NAME_MAX: usize = 31;
/// Characters not allowed in sheet names.
const SHEET_NAME_ILLEGAL: [char; 7] = ['*', ':', '?', '/', '\\', '[', ']'];

/// An in-memory table of string cells with named columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Row) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Write `table` to `path`; the extension selects CSV or XLSX.
/// `sheet_name` is only used for XLSX output. Rows are padded with blanks
/// (or cut) to the header width so no field is ever omitted.
pub fn write_table(path: &Path, table: &Table, sheet_name: &str) -> Result<()> {
    let format = TabularFormat::for_output(path)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| GoalforgeError::io(parent, e))?;
    }
    match format {
        TabularFormat::Csv => write_csv(path, table),
        TabularFormat::Xlsx => write_xlsx(path, table, sheet_name),
    }?;
    debug!(path = %path.display(), rows = table.len(), "table written");
    Ok(())
}

fn padded(row: &Row, width: usize) -> impl Iterator<Item = &str> {
    row.iter()
        .map(String::as_str)
        .chain(std::iter::repeat(""))
        .take(width)
}

fn write_csv(path: &Path, table: &Table) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| GoalforgeError::tabular(format!("{}: {e}", path.display())))?;
    let width = table.columns.len();

    writer
        .write_record(&table.columns)
        .map_err(GoalforgeError::tabular)?;
    for row in &table.rows {
        writer
            .write_record(padded(row, width))
            .map_err(GoalforgeError::tabular)?;
    }
    writer.flush().map_err(|e| GoalforgeError::io(path, e))
}

fn xlsx_error(err: XlsxError) -> GoalforgeError {
    GoalforgeError::tabular(format!("xlsx: {err}"))
}

fn row_num(idx: usize) -> Result<RowNum> {
    RowNum::try_from(idx).map_err(|_| GoalforgeError::tabular(format!("row {idx} out of range")))
}

fn col_num(idx: usize) -> Result<ColNum> {
    ColNum::try_from(idx)
        .map_err(|_| GoalforgeError::tabular(format!("column {idx} out of range")))
}

/// Replace illegal characters and cut to Excel's length limit.
fn sanitize_sheet_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if SHEET_NAME_ILLEGAL.contains(&c) { '_' } else { c })
        .take(N_LEN_SHEET_NAME_MAX)
        .collect();
    if cleaned.trim().is_empty() {
        "Sheet1".to_string()
    } else {
        cleaned
    }
}

fn write_xlsx(path: &Path, table: &Table, sheet_name: &str) -> Result<()> {
    if table.rows.len() + 1 > N_ROWS_EXCEL_MAX {
        return Err(GoalforgeError::validation(format!(
            "{} rows exceed the Excel sheet limit; write to .csv instead",
            table.rows.len()
        )));
    }

    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();
    let width = table.columns.len();

    let worksheet = workbook.add_worksheet();
    worksheet
        .set_name(sanitize_sheet_name(sheet_name))
        .map_err(xlsx_error)?;

    for (col, name) in table.columns.iter().enumerate() {
        worksheet
            .write_string_with_format(0, col_num(col)?, name, &header_format)
            .map_err(xlsx_error)?;
    }
    for (idx, row) in table.rows.iter().enumerate() {
        let row_idx = row_num(idx + 1)?;
        for (col, value) in padded(row, width).enumerate() {
            if value.is_empty() {
                continue;
            }
            worksheet
                .write_string(row_idx, col_num(col)?, value)
                .map_err(xlsx_error)?;
        }
    }
    worksheet.set_freeze_panes(1, 0).map_err(xlsx_error)?;

    workbook.save(path).map_err(xlsx_error)
}
