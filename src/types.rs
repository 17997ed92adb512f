use serde::Serialize;
use std::fmt;
use tabled::Tabled;

/// One cell of a loaded table. `None` is an empty/null cell.
pub type Cell = Option<String>;

/// A rectangular table as produced by the loader. Column names are unique.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl RawTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Cell text at `(row, col)`; `None` for null cells and out-of-range lookups.
    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row)?.get(col)?.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ColumnRole {
    OrderId,
    Status,
    Amount,
}

impl ColumnRole {
    pub const ALL: [ColumnRole; 3] = [ColumnRole::OrderId, ColumnRole::Status, ColumnRole::Amount];

    pub fn label(self) -> &'static str {
        match self {
            ColumnRole::OrderId => "Order ID",
            ColumnRole::Status => "SO Status",
            ColumnRole::Amount => "Total Sales",
        }
    }
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Role -> column name mapping for one table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ColumnBinding {
    pub order_id: String,
    pub status: String,
    pub amount: String,
}

impl ColumnBinding {
    pub fn get(&self, role: ColumnRole) -> &str {
        match role {
            ColumnRole::OrderId => &self.order_id,
            ColumnRole::Status => &self.status,
            ColumnRole::Amount => &self.amount,
        }
    }

    pub fn set(&mut self, role: ColumnRole, column: impl Into<String>) {
        let column = column.into();
        match role {
            ColumnRole::OrderId => self.order_id = column,
            ColumnRole::Status => self.status = column,
            ColumnRole::Amount => self.amount = column,
        }
    }
}

/// Column indices of a binding that has been checked against its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundColumns {
    pub order_id: usize,
    pub status: usize,
    pub amount: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    /// Index of the row in `RawTable::rows`.
    pub source_row: usize,
    pub order_id: String,
    pub status: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusAggregate {
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Count")]
    pub count: usize,
    #[serde(rename = "Value")]
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AggregateReport {
    pub groups: Vec<StatusAggregate>,
    pub total_count: usize,
    pub total_value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeDiagnostics {
    pub source_rows: usize,
    pub dropped_rows: usize,
    pub missing_amounts: usize,
    pub unparseable_amounts: usize,
    pub blank_statuses: usize,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct StatusSummaryRow {
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Count")]
    pub count: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct BindingRow {
    #[tabled(rename = "Role")]
    pub role: String,
    #[tabled(rename = "Column")]
    pub column: String,
    #[tabled(rename = "Matched By")]
    pub matched_by: String,
}

#[derive(Debug, Serialize)]
pub struct SummaryStats {
    pub source: String,
    pub header_row: usize,
    pub binding: ColumnBinding,
    pub total_count: usize,
    pub total_value: f64,
    pub statuses: Vec<StatusAggregate>,
    pub pinned: Vec<StatusAggregate>,
    pub diagnostics: NormalizeDiagnostics,
    pub generated_at: String,
}
