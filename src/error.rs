// Error types for the report pipeline.
//
// Only a failed load stops the pipeline. Everything the cleaners can recover
// from is reported through diagnostics instead of this enum.
use crate::loader::LoadFailure;
use crate::types::ColumnRole;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReportError>;

#[derive(Error, Debug)]
pub enum ReportError {
    /// Every parse strategy failed.
    #[error(transparent)]
    Load(#[from] LoadFailure),

    /// A binding (usually a user override) names a column the table lacks.
    #[error("{role} column {column:?} does not exist in the loaded table")]
    UnknownColumn { role: ColumnRole, column: String },

    #[error("no table loaded")]
    NoTable,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XLSX write error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
}
