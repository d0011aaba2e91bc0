use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Column-ordered comparison table; every row holds one value per column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ComparisonTable {
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_index(column).is_some()
    }

    /// Value at (`row`, `column`); `None` if either does not exist.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)
    }

    /// Index of the row whose `input` equals `input`.
    pub fn row_for_input(&self, input: &str) -> Option<usize> {
        let idx = self.column_index("input")?;
        self.rows
            .iter()
            .position(|r| r.get(idx).and_then(|v| v.as_str()) == Some(input))
    }

    pub fn column_values<'a>(&'a self, column: &str) -> Vec<&'a Value> {
        match self.column_index(column) {
            Some(idx) => self.rows.iter().filter_map(|r| r.get(idx)).collect(),
            None => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
