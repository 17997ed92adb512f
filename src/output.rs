use crate::error::Result;
use crate::session::Processed;
use crate::types::{NormalizedRow, RawTable, SummaryStats};
use crate::util;
use rust_xlsxwriter::Workbook;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tabled::{builder::Builder, settings::Style, Table, Tabled};
use tracing::info;

pub const CLEAN_SALES_COLUMN: &str = "CleanSales";
pub const CLEAN_STATUS_COLUMN: &str = "CleanStatus";
pub const FULL_DATA_SHEET: &str = "Full_Data";
pub const SUMMARY_SHEET: &str = "Summary";

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    Ok(())
}

/// Source cells that read as a plain number, so they land in the workbook as
/// numbers. Leading-zero ids like `"00123"` stay text.
fn numeric_cell(text: &str) -> Option<f64> {
    let digits = text.strip_prefix('-').unwrap_or(text);
    if digits.len() > 1 && digits.starts_with('0') && !digits.starts_with("0.") {
        return None;
    }
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Two sheets: the kept rows with their original columns plus the cleaned
/// values, and the per-status table with plain numbers.
pub fn write_xlsx(path: &Path, table: &RawTable, processed: &Processed) -> Result<()> {
    let mut workbook = Workbook::new();

    let data = workbook.add_worksheet();
    data.set_name(FULL_DATA_SHEET)?;
    let width = table.column_count() as u16;
    for (col, name) in table.columns.iter().enumerate() {
        data.write_string(0, col as u16, name)?;
    }
    data.write_string(0, width, CLEAN_SALES_COLUMN)?;
    data.write_string(0, width + 1, CLEAN_STATUS_COLUMN)?;
    for (i, row) in processed.rows.iter().enumerate() {
        let r = i as u32 + 1;
        for col in 0..table.column_count() {
            let Some(text) = table.cell(row.source_row, col) else {
                continue;
            };
            match numeric_cell(text) {
                Some(n) => data.write_number(r, col as u16, n)?,
                None => data.write_string(r, col as u16, text)?,
            };
        }
        data.write_number(r, width, row.amount)?;
        data.write_string(r, width + 1, &row.status)?;
    }

    let summary = workbook.add_worksheet();
    summary.set_name(SUMMARY_SHEET)?;
    summary.write_string(0, 0, "Status")?;
    summary.write_string(0, 1, "Count")?;
    summary.write_string(0, 2, "Value")?;
    for (i, g) in processed.report.groups.iter().enumerate() {
        let r = i as u32 + 1;
        summary.write_string(r, 0, &g.status)?;
        summary.write_number(r, 1, g.count as f64)?;
        summary.write_number(r, 2, g.value)?;
    }

    workbook.save(path)?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    pub workbook: PathBuf,
    pub summary_csv: PathBuf,
    pub summary_json: PathBuf,
}

/// Write `<stem>.xlsx`, `<stem>_summary.csv` and `<stem>_summary.json` into `dir`.
pub fn export_report(
    dir: &Path,
    stem: &str,
    table: &RawTable,
    processed: &Processed,
    summary: &SummaryStats,
) -> Result<ExportPaths> {
    std::fs::create_dir_all(dir)?;
    let paths = ExportPaths {
        workbook: dir.join(format!("{stem}.xlsx")),
        summary_csv: dir.join(format!("{stem}_summary.csv")),
        summary_json: dir.join(format!("{stem}_summary.json")),
    };
    write_xlsx(&paths.workbook, table, processed)?;
    write_csv(&paths.summary_csv, &processed.report.groups)?;
    write_json(&paths.summary_json, summary)?;
    info!(
        workbook = %paths.workbook.display(),
        csv = %paths.summary_csv.display(),
        json = %paths.summary_json.display(),
        "exported report"
    );
    Ok(paths)
}

pub fn preview_table_rows<T>(rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().cloned().take(max_rows).collect();
    if slice.is_empty() {
        println!("(no rows)\n");
        return;
    }
    let table_str = Table::new(slice).with(Style::markdown()).to_string();
    println!("{}\n", table_str);
}

/// First `max_rows` rows of a loaded table, as loaded.
pub fn render_table_head(table: &RawTable, max_rows: usize) -> String {
    let mut builder = Builder::default();
    builder.push_record(table.columns.clone());
    for row in table.rows.iter().take(max_rows) {
        builder.push_record(row.iter().map(|c| c.clone().unwrap_or_default()));
    }
    builder.build().with(Style::markdown()).to_string()
}

/// Markdown preview of kept rows: original columns plus the cleaned values.
pub fn render_data_rows(table: &RawTable, rows: &[&NormalizedRow], max_rows: usize) -> String {
    if rows.is_empty() {
        return "(no rows)".to_string();
    }
    let mut builder = Builder::default();
    let mut header: Vec<String> = table.columns.clone();
    header.push(CLEAN_SALES_COLUMN.to_string());
    header.push(CLEAN_STATUS_COLUMN.to_string());
    builder.push_record(header);
    for row in rows.iter().take(max_rows) {
        let mut record: Vec<String> = (0..table.column_count())
            .map(|col| table.cell(row.source_row, col).unwrap_or_default().to_string())
            .collect();
        record.push(util::format_number(row.amount, 2));
        record.push(row.status.clone());
        builder.push_record(record);
    }
    let mut out = builder.build().with(Style::markdown()).to_string();
    if rows.len() > max_rows {
        out.push_str(&format!("\n... {} more rows", rows.len() - max_rows));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::reports::generate_summary;
    use crate::types::{ColumnBinding, NormalizeDiagnostics};
    use calamine::{open_workbook_auto, Data, Reader};

    fn fixture() -> (RawTable, Processed) {
        let table = RawTable {
            columns: vec!["ServiceOrder".into(), "SO Status".into(), "TotalSales".into()],
            rows: vec![
                vec![Some("A1".into()), Some("costed ".into()), Some("$1,000.00".into())],
                vec![None, Some("Costed".into()), Some("$10".into())],
                vec![Some("B2".into()), None, Some("25".into())],
            ],
        };
        let rows = vec![
            NormalizedRow {
                source_row: 0,
                order_id: "A1".into(),
                status: "Costed".into(),
                amount: 1000.0,
            },
            NormalizedRow {
                source_row: 2,
                order_id: "B2".into(),
                status: "Blank".into(),
                amount: 25.0,
            },
        ];
        let report = aggregate(&rows);
        (
            table,
            Processed {
                rows,
                diagnostics: NormalizeDiagnostics::default(),
                report,
            },
        )
    }

    #[test]
    fn export_writes_two_sheet_workbook_and_summaries() {
        let (table, processed) = fixture();
        let binding = ColumnBinding {
            order_id: "ServiceOrder".into(),
            status: "SO Status".into(),
            amount: "TotalSales".into(),
        };
        let summary = generate_summary("orders.csv", 0, &binding, &processed, &["Costed".to_string()]);
        let dir = tempfile::tempdir().unwrap();
        let paths = export_report(dir.path(), "Volume_Value_Report", &table, &processed, &summary).unwrap();

        let mut wb = open_workbook_auto(&paths.workbook).unwrap();
        assert_eq!(wb.sheet_names(), vec![FULL_DATA_SHEET.to_string(), SUMMARY_SHEET.to_string()]);

        let data = wb.worksheet_range(FULL_DATA_SHEET).unwrap();
        assert_eq!(data.get_size(), (3, 5));
        assert_eq!(data.get_value((0, 3)), Some(&Data::String(CLEAN_SALES_COLUMN.into())));
        assert_eq!(data.get_value((1, 3)), Some(&Data::Float(1000.0)));
        assert_eq!(data.get_value((2, 0)), Some(&Data::String("B2".into())));
        assert_eq!(data.get_value((1, 2)), Some(&Data::String("$1,000.00".into())));
        assert_eq!(data.get_value((2, 2)), Some(&Data::Float(25.0)));
        assert_eq!(data.get_value((2, 4)), Some(&Data::String("Blank".into())));

        let sheet = wb.worksheet_range(SUMMARY_SHEET).unwrap();
        assert_eq!(sheet.get_value((0, 0)), Some(&Data::String("Status".into())));
        assert_eq!(sheet.get_value((1, 0)), Some(&Data::String("Blank".into())));
        assert_eq!(sheet.get_value((2, 2)), Some(&Data::Float(1000.0)));

        let csv_text = std::fs::read_to_string(&paths.summary_csv).unwrap();
        let lines: Vec<&str> = csv_text.lines().collect();
        assert_eq!(lines[0], "Status,Count,Value");
        assert!(lines[1].starts_with("Blank,1,25"));
        assert!(lines[2].starts_with("Costed,1,1000"));

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&paths.summary_json).unwrap()).unwrap();
        assert_eq!(json["total_count"], 2);
        assert_eq!(json["pinned"][0]["Status"], "Costed");
    }

    #[test]
    fn only_plain_numbers_become_numeric_cells() {
        assert_eq!(numeric_cell("25"), Some(25.0));
        assert_eq!(numeric_cell("-0.5"), Some(-0.5));
        assert_eq!(numeric_cell("0"), Some(0.0));
        assert_eq!(numeric_cell("00123"), None);
        assert_eq!(numeric_cell("$1,000.00"), None);
        assert_eq!(numeric_cell("NaN"), None);
        assert_eq!(numeric_cell("A1"), None);
    }

    #[test]
    fn data_preview_includes_cleaned_columns() {
        let (table, processed) = fixture();
        let refs: Vec<&NormalizedRow> = processed.rows.iter().collect();
        let text = render_data_rows(&table, &refs, 1);
        assert!(text.contains("CleanSales"));
        assert!(text.contains("1,000.00"));
        assert!(!text.contains("B2"));
        assert!(text.ends_with("... 1 more rows"));
    }
}
