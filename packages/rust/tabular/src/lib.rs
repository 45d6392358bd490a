//! Tabular I/O for bulk exports and goal sheets.
//!
//! Every cell is read as text (no type coercion, empty strings instead of
//! null markers). Sources are opened by extension and streamed sheet by
//! sheet in fixed-size batches; results are written whole, as CSV or XLSX.

mod format;
mod reader;
mod writer;

pub use format::TabularFormat;
pub use reader::{CsvSource, Row, RowBatches, TabularSource, XlsxSource, open_source};
pub use writer::{Table, write_table};
