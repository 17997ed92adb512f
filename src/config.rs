use crate::aggregate::DEFAULT_TARGET_STATUSES;
use crate::error::{ReportError, Result};
use crate::loader::LoadPolicy;
use crate::normalize::{title_case, NormalizeConfig, DEFAULT_BLANK_SENTINELS};
use clap::Parser;
use std::path::PathBuf;

fn default_targets() -> Vec<String> {
    DEFAULT_TARGET_STATUSES.iter().map(|s| s.to_string()).collect()
}

fn default_sentinels() -> Vec<String> {
    DEFAULT_BLANK_SENTINELS.iter().map(|s| s.to_string()).collect()
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "so_volume_report",
    version,
    about = "Service order volume and value report from spreadsheet or CSV exports"
)]
pub struct Args {
    /// Export to load (.xlsx, .xls, .csv or other delimited text)
    #[arg(short, long, env = "SO_REPORT_FILE")]
    pub file: Option<PathBuf>,

    /// Zero-based row holding the column names
    #[arg(long, default_value_t = 0, env = "SO_REPORT_HEADER_ROW")]
    pub header_row: usize,

    /// Statuses pinned in the summary, in display order
    #[arg(long, value_delimiter = ',', default_values_t = default_targets())]
    pub targets: Vec<String>,

    /// Status values treated as blank (case-insensitive; empty is always blank)
    #[arg(long, value_delimiter = ',', default_values_t = default_sentinels())]
    pub blank_sentinels: Vec<String>,

    /// Accept a parse that yields a single column
    #[arg(long)]
    pub allow_single_column: bool,

    /// Try reading the file as an HTML table when every other format fails
    #[arg(long)]
    pub html_fallback: bool,

    /// Directory for exported reports
    #[arg(long, default_value = ".", env = "SO_REPORT_OUT_DIR")]
    pub out_dir: PathBuf,

    /// File name stem for exported reports
    #[arg(long, default_value = "Volume_Value_Report")]
    pub stem: String,

    /// Load, print the summary, export and exit without the menu
    #[arg(long, requires = "file")]
    pub batch: bool,

    /// Enable debug logging on stderr
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn load_policy(&self) -> LoadPolicy {
        LoadPolicy {
            min_columns: if self.allow_single_column { 1 } else { 2 },
            html_fallback: self.html_fallback,
        }
    }

    pub fn normalize_config(&self) -> NormalizeConfig {
        NormalizeConfig {
            blank_sentinels: self
                .blank_sentinels
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Target statuses in canonical form.
    pub fn targets(&self) -> Result<Vec<String>> {
        let targets: Vec<String> = self
            .targets
            .iter()
            .map(|t| title_case(t.trim()))
            .filter(|t| !t.is_empty())
            .collect();
        if targets.is_empty() {
            return Err(ReportError::InvalidConfig(
                "at least one target status is required".to_string(),
            ));
        }
        Ok(targets)
    }
}
