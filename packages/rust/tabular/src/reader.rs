//! Sheet-oriented readers that stream string rows in fixed-size batches.
//!
//! A CSV file is a single sheet named after its file stem. XLSX workbooks
//! expose every worksheet and are read cell by cell, so memory is bounded by
//! the batch size rather than the sheet.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use calamine::{Data, Range, Reader, Sheets, Xlsx, open_workbook_auto};
use tracing::debug;

use goalforge_shared::{GoalforgeError, Result};

use crate::format::TabularFormat;

/// One data row; always exactly as wide as the sheet header.
pub type Row = Vec<String>;

/// Lazy, finite sequence of row batches for one sheet.
pub type RowBatches<'a> = Box<dyn Iterator<Item = Result<Vec<Row>>> + 'a>;

/// A sheet-like source that can be re-opened for additional passes.
pub trait TabularSource {
    /// Sheet names in workbook order.
    fn sheet_names(&self) -> Vec<String>;

    /// Column names of a sheet (first row), without reading the data rows.
    fn header(&mut self, sheet: &str) -> Result<Vec<String>>;

    /// Stream data rows of a sheet in batches of at most `batch_size` rows.
    /// Each call starts again from the first data row.
    fn batches(&mut self, sheet: &str, batch_size: usize) -> Result<RowBatches<'_>>;
}

/// Open a source by extension. Fails with `NotFound` for missing paths and
/// `UnsupportedFormat` for unknown extensions.
pub fn open_source(path: &Path) -> Result<Box<dyn TabularSource>> {
    if !path.exists() {
        return Err(GoalforgeError::not_found(path));
    }
    match TabularFormat::from_path(path)? {
        TabularFormat::Csv => Ok(Box::new(CsvSource::open(path)?)),
        TabularFormat::Xlsx => Ok(Box::new(XlsxSource::open(path)?)),
    }
}

/// Pad or cut a row to `width` cells.
fn fit_row<'a>(cells: impl Iterator<Item = &'a str>, width: usize) -> Row {
    cells
        .map(str::to_string)
        .chain(std::iter::repeat(String::new()))
        .take(width)
        .collect()
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

/// Single-sheet CSV source streamed record by record.
pub struct CsvSource {
    path: PathBuf,
    sheet: String,
}

impl CsvSource {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(GoalforgeError::not_found(path));
        }
        let sheet = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "Sheet1".to_string());
        Ok(Self {
            path: path.to_path_buf(),
            sheet,
        })
    }

    fn reader(&self, sheet: &str) -> Result<csv::Reader<File>> {
        if sheet != self.sheet {
            return Err(GoalforgeError::validation(format!(
                "CSV source {} has no sheet '{sheet}'",
                self.path.display()
            )));
        }
        csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)
            .map_err(|e| GoalforgeError::tabular(format!("{}: {e}", self.path.display())))
    }
}

impl TabularSource for CsvSource {
    fn sheet_names(&self) -> Vec<String> {
        vec![self.sheet.clone()]
    }

    fn header(&mut self, sheet: &str) -> Result<Vec<String>> {
        let mut reader = self.reader(sheet)?;
        let headers = reader
            .headers()
            .map_err(|e| GoalforgeError::tabular(format!("{}: {e}", self.path.display())))?;
        Ok(headers
            .iter()
            .enumerate()
            .map(|(i, h)| {
                if i == 0 {
                    h.trim_start_matches('\u{feff}').to_string()
                } else {
                    h.to_string()
                }
            })
            .collect())
    }

    fn batches(&mut self, sheet: &str, batch_size: usize) -> Result<RowBatches<'_>> {
        let width = self.header(sheet)?.len();
        let records = self.reader(sheet)?.into_records();
        debug!(path = %self.path.display(), width, batch_size, "streaming CSV batches");
        Ok(Box::new(CsvBatches {
            records,
            width,
            batch_size: batch_size.max(1),
            done: false,
        }))
    }
}

struct CsvBatches {
    records: csv::StringRecordsIntoIter<File>,
    width: usize,
    batch_size: usize,
    done: bool,
}

impl Iterator for CsvBatches {
    type Item = Result<Vec<Row>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut batch = Vec::with_capacity(self.batch_size.min(4096));
        while batch.len() < self.batch_size {
            match self.records.next() {
                Some(Ok(record)) => batch.push(fit_row(record.iter(), self.width)),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(GoalforgeError::tabular(e)));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        if batch.is_empty() { None } else { Some(Ok(batch)) }
    }
}

// ---------------------------------------------------------------------------
// XLSX
// ---------------------------------------------------------------------------

/// A streamed worksheet cell: row, column and text.
type StreamedCell = (u32, u32, String);

/// A streamed worksheet row: its index and the `(column, text)` cells it holds.
type StreamedRow = (u32, Vec<(u32, String)>);

/// Multi-sheet workbook source backed by calamine.
///
/// XLSX worksheets are streamed cell by cell and never held whole. Legacy
/// `.xls` workbooks have no streaming reader and load one sheet at a time.
pub struct XlsxSource {
    path: PathBuf,
    workbook: Sheets<BufReader<File>>,
    /// Name of the sheet the current batch iterator reads.
    streaming: String,
    cached: Option<(String, Range<Data>)>,
}

impl XlsxSource {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(GoalforgeError::not_found(path));
        }
        let workbook = open_workbook_auto(path)
            .map_err(|e| GoalforgeError::tabular(format!("{}: {e}", path.display())))?;
        Ok(Self {
            path: path.to_path_buf(),
            workbook,
            streaming: String::new(),
            cached: None,
        })
    }
}

fn sheet_error(path: &Path, sheet: &str, err: impl std::fmt::Display) -> GoalforgeError {
    GoalforgeError::tabular(format!("{} [{sheet}]: {err}", path.display()))
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Open a row-grouped cell stream over one XLSX worksheet.
fn stream_rows<'a>(
    xlsx: &'a mut Xlsx<BufReader<File>>,
    sheet: &'a str,
    path: &'a Path,
) -> Result<RowAssembler<impl FnMut() -> Result<Option<StreamedCell>> + 'a>> {
    let mut cells = xlsx
        .worksheet_cells_reader(sheet)
        .map_err(|e| sheet_error(path, sheet, e))?;
    Ok(RowAssembler::new(move || match cells.next_cell() {
        Ok(cell) => Ok(cell.map(|cell| {
            let (row, col) = cell.get_position();
            (row, col, cell_text(&Data::from(cell.get_value().clone())))
        })),
        Err(e) => Err(sheet_error(path, sheet, e)),
    }))
}

/// Load a non-XLSX sheet, keeping only the most recently used one in memory.
fn cached_range<'c>(
    workbook: &mut Sheets<BufReader<File>>,
    cached: &'c mut Option<(String, Range<Data>)>,
    path: &Path,
    sheet: &str,
) -> Result<&'c Range<Data>> {
    let hit = matches!(cached.as_ref(), Some((name, _)) if name == sheet);
    if !hit {
        *cached = None;
        let range = workbook
            .worksheet_range(sheet)
            .map_err(|e| sheet_error(path, sheet, e))?;
        debug!(sheet, rows = range.height(), cols = range.width(), "loaded worksheet");
        *cached = Some((sheet.to_string(), range));
    }
    cached
        .as_ref()
        .map(|(_, range)| range)
        .ok_or_else(|| GoalforgeError::tabular("worksheet cache empty"))
}

/// Spread `(column, text)` cells over a blank row of `width` cells.
fn place_cells(cells: Vec<(u32, String)>, width: usize) -> Row {
    let mut row = vec![String::new(); width];
    for (col, text) in cells {
        if let Some(slot) = row.get_mut(col as usize) {
            *slot = text;
        }
    }
    row
}

impl TabularSource for XlsxSource {
    fn sheet_names(&self) -> Vec<String> {
        self.workbook.sheet_names()
    }

    fn header(&mut self, sheet: &str) -> Result<Vec<String>> {
        let Self {
            path,
            workbook,
            cached,
            ..
        } = self;
        match workbook {
            Sheets::Xlsx(xlsx) => {
                let mut rows = stream_rows(xlsx, sheet, path)?;
                Ok(match rows.next_row()? {
                    Some((_, cells)) => {
                        let width = cells
                            .iter()
                            .map(|(col, _)| *col as usize + 1)
                            .max()
                            .unwrap_or(0);
                        place_cells(cells, width)
                    }
                    None => Vec::new(),
                })
            }
            other => {
                let range = cached_range(other, cached, path, sheet)?;
                if range.is_empty() {
                    return Ok(Vec::new());
                }
                Ok((0..range.width())
                    .map(|col| range.get((0, col)).map(cell_text).unwrap_or_default())
                    .collect())
            }
        }
    }

    fn batches(&mut self, sheet: &str, batch_size: usize) -> Result<RowBatches<'_>> {
        let width = self.header(sheet)?.len();
        let batch_size = batch_size.max(1);
        self.streaming = sheet.to_string();
        let Self {
            path,
            workbook,
            streaming,
            cached,
        } = self;
        match workbook {
            Sheets::Xlsx(xlsx) => {
                debug!(sheet = %streaming, width, batch_size, "streaming XLSX batches");
                Ok(Box::new(StreamBatches {
                    rows: stream_rows(xlsx, streaming.as_str(), path.as_path())?,
                    next_index: None,
                    carry: None,
                    width,
                    batch_size,
                    done: false,
                }))
            }
            other => Ok(Box::new(RangeBatches {
                range: cached_range(other, cached, path, sheet)?,
                next_row: 1,
                width,
                batch_size,
            })),
        }
    }
}

/// Groups a row-major cell stream into rows. Empty rows never appear.
struct RowAssembler<F> {
    next_cell: F,
    pending: Option<StreamedCell>,
    exhausted: bool,
}

impl<F> RowAssembler<F>
where
    F: FnMut() -> Result<Option<StreamedCell>>,
{
    fn new(next_cell: F) -> Self {
        Self {
            next_cell,
            pending: None,
            exhausted: false,
        }
    }

    fn next_row(&mut self) -> Result<Option<StreamedRow>> {
        let (row, col, text) = match self.pending.take() {
            Some(cell) => cell,
            None if self.exhausted => return Ok(None),
            None => match (self.next_cell)()? {
                Some(cell) => cell,
                None => {
                    self.exhausted = true;
                    return Ok(None);
                }
            },
        };
        let mut cells = vec![(col, text)];
        while !self.exhausted {
            match (self.next_cell)()? {
                Some((r, c, t)) if r == row => cells.push((c, t)),
                Some(cell) => {
                    self.pending = Some(cell);
                    break;
                }
                None => self.exhausted = true,
            }
        }
        Ok(Some((row, cells)))
    }
}

/// Batches over a streamed worksheet. The first row is the header and is
/// skipped; rows missing from the stream come back blank.
struct StreamBatches<F> {
    rows: RowAssembler<F>,
    /// Index the next emitted row has; `None` until the header is read.
    next_index: Option<u32>,
    carry: Option<StreamedRow>,
    width: usize,
    batch_size: usize,
    done: bool,
}

impl<F> StreamBatches<F>
where
    F: FnMut() -> Result<Option<StreamedCell>>,
{
    fn fill(&mut self) -> Result<Vec<Row>> {
        let mut expected = match self.next_index {
            Some(index) => index,
            None => match self.rows.next_row()? {
                Some((header, _)) => header + 1,
                None => return Ok(Vec::new()),
            },
        };
        let mut batch = Vec::with_capacity(self.batch_size.min(4096));
        while batch.len() < self.batch_size {
            let row = match self.carry.take() {
                Some(row) => row,
                None => match self.rows.next_row()? {
                    Some(row) => row,
                    None => break,
                },
            };
            if row.0 > expected {
                batch.push(vec![String::new(); self.width]);
                self.carry = Some(row);
                expected += 1;
            } else {
                expected = row.0 + 1;
                batch.push(place_cells(row.1, self.width));
            }
        }
        self.next_index = Some(expected);
        Ok(batch)
    }
}

impl<F> Iterator for StreamBatches<F>
where
    F: FnMut() -> Result<Option<StreamedCell>>,
{
    type Item = Result<Vec<Row>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.fill() {
            Ok(batch) if batch.is_empty() => {
                self.done = true;
                None
            }
            Ok(batch) => Some(Ok(batch)),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

struct RangeBatches<'a> {
    range: &'a Range<Data>,
    next_row: usize,
    width: usize,
    batch_size: usize,
}

impl Iterator for RangeBatches<'_> {
    type Item = Result<Vec<Row>>;

    fn next(&mut self) -> Option<Self::Item> {
        let height = self.range.height();
        if self.next_row >= height {
            return None;
        }
        let end = (self.next_row + self.batch_size).min(height);
        let batch = (self.next_row..end)
            .map(|row| {
                (0..self.width)
                    .map(|col| self.range.get((row, col)).map(cell_text).unwrap_or_default())
                    .collect()
            })
            .collect();
        self.next_row = end;
        Some(Ok(batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{Table, write_table};

    fn collect_rows(source: &mut dyn TabularSource, sheet: &str, batch: usize) -> Vec<Vec<Row>> {
        source
            .batches(sheet, batch)
            .expect("batches")
            .collect::<Result<Vec<_>>>()
            .expect("rows")
    }

    #[test]
    fn csv_streams_fixed_size_batches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bulk.csv");
        std::fs::write(&path, "\u{feff}ASIN,Campaign\nB000000001,a\nB000000002,b\n,c\n").unwrap();

        let mut source = open_source(&path).expect("open");
        assert_eq!(source.sheet_names(), vec!["bulk".to_string()]);
        assert_eq!(source.header("bulk").unwrap(), vec!["ASIN", "Campaign"]);

        let batches = collect_rows(source.as_mut(), "bulk", 2);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1], vec![vec!["".to_string(), "c".to_string()]]);
    }

    #[test]
    fn csv_pads_short_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ragged.csv");
        std::fs::write(&path, "A,B,C\n1\n1,2,3,4\n").unwrap();

        let mut source = open_source(&path).expect("open");
        let rows: Vec<Row> = collect_rows(source.as_mut(), "ragged", 10).concat();
        assert_eq!(rows[0], vec!["1", "", ""]);
        assert_eq!(rows[1], vec!["1", "2", "3"]);
    }

    #[test]
    fn batches_are_restartable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("again.csv");
        std::fs::write(&path, "A\n1\n2\n3\n").unwrap();

        let mut source = open_source(&path).expect("open");
        let first: usize = collect_rows(source.as_mut(), "again", 2).iter().map(Vec::len).sum();
        let second: usize = collect_rows(source.as_mut(), "again", 2).iter().map(Vec::len).sum();
        assert_eq!(first, 3);
        assert_eq!(second, 3);
    }

    #[test]
    fn xlsx_reads_written_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sheet.xlsx");
        let mut table = Table::new(vec!["ASIN".into(), "Keyword Text".into(), "Bid".into()]);
        table.push_row(vec!["B000000001".into(), "buy now".into(), String::new()]);
        table.push_row(vec![String::new(), String::new(), "0.75".into()]);
        write_table(&path, &table, "Sponsored Products").expect("write");

        let mut source = open_source(&path).expect("open");
        assert_eq!(source.sheet_names(), vec!["Sponsored Products".to_string()]);
        let header = source.header("Sponsored Products").unwrap();
        assert_eq!(header, vec!["ASIN", "Keyword Text", "Bid"]);
        let rows: Vec<Row> = collect_rows(source.as_mut(), "Sponsored Products", 1).concat();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec!["B000000001", "buy now", ""]);
        assert_eq!(rows[1], vec!["", "", "0.75"]);
    }

    #[test]
    fn xlsx_blank_rows_survive_streaming() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gaps.xlsx");
        let mut table = Table::new(vec!["ASIN".into(), "Keyword Text".into()]);
        table.push_row(vec!["B000000001".into(), "a".into()]);
        table.push_row(vec![String::new(), String::new()]);
        table.push_row(vec!["B000000002".into(), "b".into()]);
        write_table(&path, &table, "Sheet1").expect("write");

        let mut source = open_source(&path).expect("open");
        let batches = collect_rows(source.as_mut(), "Sheet1", 2);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0][1], vec!["", ""]);
        assert_eq!(batches[1], vec![vec!["B000000002".to_string(), "b".to_string()]]);

        let again: usize = collect_rows(source.as_mut(), "Sheet1", 10).iter().map(Vec::len).sum();
        assert_eq!(again, 3);
    }

    fn cell_feed(cells: Vec<StreamedCell>) -> impl FnMut() -> Result<Option<StreamedCell>> {
        let mut cells = cells.into_iter();
        move || Ok(cells.next())
    }

    #[test]
    fn cells_group_into_rows() {
        let mut rows = RowAssembler::new(cell_feed(vec![
            (0, 0, "ASIN".into()),
            (0, 2, "Bid".into()),
            (3, 1, "x".into()),
        ]));
        assert_eq!(
            rows.next_row().unwrap(),
            Some((0, vec![(0, "ASIN".to_string()), (2, "Bid".to_string())]))
        );
        assert_eq!(rows.next_row().unwrap(), Some((3, vec![(1, "x".to_string())])));
        assert_eq!(rows.next_row().unwrap(), None);
        assert_eq!(rows.next_row().unwrap(), None);
    }

    #[test]
    fn streamed_batches_skip_header_and_fill_gaps() {
        let batches = StreamBatches {
            rows: RowAssembler::new(cell_feed(vec![
                (2, 0, "ASIN".into()),
                (2, 1, "Keyword Text".into()),
                (3, 0, "B000000001".into()),
                (5, 1, "late".into()),
            ])),
            next_index: None,
            carry: None,
            width: 2,
            batch_size: 2,
            done: false,
        };
        let batches: Vec<Vec<Row>> = batches.collect::<Result<_>>().unwrap();
        assert_eq!(
            batches,
            vec![
                vec![
                    vec!["B000000001".to_string(), String::new()],
                    vec![String::new(), String::new()],
                ],
                vec![vec![String::new(), "late".to_string()]],
            ]
        );
    }

    #[test]
    fn stream_errors_end_the_batches() {
        let mut calls = 0;
        let feed = move || {
            calls += 1;
            match calls {
                1 => Ok(Some((0, 0, "ASIN".to_string()))),
                2 => Ok(Some((1, 0, "B000000001".to_string()))),
                _ => Err(GoalforgeError::tabular("truncated sheet")),
            }
        };
        let mut batches = StreamBatches {
            rows: RowAssembler::new(feed),
            next_index: None,
            carry: None,
            width: 1,
            batch_size: 10,
            done: false,
        };
        assert!(matches!(batches.next(), Some(Err(GoalforgeError::Tabular(_)))));
        assert!(batches.next().is_none());
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = open_source(Path::new("/definitely/not/here.csv")).err().unwrap();
        assert!(matches!(err, GoalforgeError::NotFound { .. }));
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bulk.json");
        std::fs::write(&path, "{}").unwrap();
        let err = open_source(&path).err().unwrap();
        assert!(matches!(err, GoalforgeError::UnsupportedFormat { .. }));
    }
}
