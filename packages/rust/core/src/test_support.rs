//! In-memory sources for unit tests.

use goalforge_shared::{GoalforgeError, Result};
use goalforge_tabular::{Row, RowBatches, Table, TabularSource};

/// Named sheets held in memory, batched the same way file sources are.
#[derive(Debug, Default)]
pub(crate) struct MemorySource {
    sheets: Vec<(String, Vec<String>, Vec<Row>)>,
}

impl MemorySource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn sheet(mut self, name: &str, header: &[&str], rows: &[&[&str]]) -> Self {
        let width = header.len();
        let rows = rows
            .iter()
            .map(|row| {
                let mut row: Row = row.iter().map(|c| c.to_string()).collect();
                row.resize(width, String::new());
                row
            })
            .collect();
        self.sheets.push((
            name.to_string(),
            header.iter().map(|c| c.to_string()).collect(),
            rows,
        ));
        self
    }

    /// A single-sheet source holding a trimmed table.
    pub(crate) fn from_table(name: &str, table: &Table) -> Self {
        Self {
            sheets: vec![(name.to_string(), table.columns.clone(), table.rows.clone())],
        }
    }

    fn find(&self, sheet: &str) -> Result<&(String, Vec<String>, Vec<Row>)> {
        self.sheets
            .iter()
            .find(|(name, _, _)| name == sheet)
            .ok_or_else(|| GoalforgeError::validation(format!("no sheet named {sheet}")))
    }
}

impl TabularSource for MemorySource {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _, _)| name.clone()).collect()
    }

    fn header(&mut self, sheet: &str) -> Result<Vec<String>> {
        Ok(self.find(sheet)?.1.clone())
    }

    fn batches(&mut self, sheet: &str, batch_size: usize) -> Result<RowBatches<'_>> {
        let (_, _, rows) = self.find(sheet)?;
        Ok(Box::new(
            rows.chunks(batch_size.max(1)).map(|chunk| Ok(chunk.to_vec())),
        ))
    }
}
