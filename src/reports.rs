use crate::resolver::Resolution;
use crate::session::Processed;
use crate::types::{BindingRow, ColumnBinding, ColumnRole, StatusAggregate, StatusSummaryRow, SummaryStats};
use crate::util::{format_currency, format_int};
use chrono::Local;

pub fn status_rows(groups: &[StatusAggregate]) -> Vec<StatusSummaryRow> {
    groups
        .iter()
        .map(|g| StatusSummaryRow {
            status: g.status.clone(),
            count: format_int(g.count),
            value: format_currency(g.value),
        })
        .collect()
}

/// One row per role: the column in force and how it was chosen.
pub fn binding_rows(resolution: &Resolution, binding: &ColumnBinding) -> Vec<BindingRow> {
    ColumnRole::ALL
        .into_iter()
        .map(|role| {
            let column = binding.get(role);
            let matched_by = if column == resolution.binding.get(role) {
                resolution.tier(role).to_string()
            } else {
                "manual override".to_string()
            };
            BindingRow {
                role: role.to_string(),
                column: column.to_string(),
                matched_by,
            }
        })
        .collect()
}

pub fn generate_summary(
    source: &str,
    header_row: usize,
    binding: &ColumnBinding,
    processed: &Processed,
    targets: &[String],
) -> SummaryStats {
    let report = &processed.report;
    SummaryStats {
        source: source.to_string(),
        header_row,
        binding: binding.clone(),
        total_count: report.total_count,
        total_value: report.total_value,
        statuses: report.groups.clone(),
        pinned: report.pinned(targets),
        diagnostics: processed.diagnostics.clone(),
        generated_at: Local::now().to_rfc3339(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::resolver::resolve;
    use crate::types::{NormalizeDiagnostics, NormalizedRow};

    fn processed() -> Processed {
        let rows = vec![
            NormalizedRow {
                source_row: 0,
                order_id: "A1".into(),
                status: "Costed".into(),
                amount: 1234.5,
            },
            NormalizedRow {
                source_row: 1,
                order_id: "A2".into(),
                status: "Blank".into(),
                amount: 0.0,
            },
        ];
        let report = aggregate(&rows);
        Processed {
            rows,
            diagnostics: NormalizeDiagnostics::default(),
            report,
        }
    }

    #[test]
    fn status_rows_are_formatted() {
        let rows = status_rows(&processed().report.groups);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].status, "Blank");
        assert_eq!(rows[1].value, "$1,234.50");
    }

    #[test]
    fn binding_rows_mark_overrides() {
        let cols: Vec<String> = ["ServiceOrder", "SO Status", "TotalSales", "Other"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let resolution = resolve(&cols);
        let mut binding = resolution.binding.clone();
        binding.set(ColumnRole::Amount, "Other");
        let rows = binding_rows(&resolution, &binding);
        assert_eq!(rows[0].matched_by, "priority keyword");
        assert_eq!(rows[2].column, "Other");
        assert_eq!(rows[2].matched_by, "manual override");
    }

    #[test]
    fn summary_pins_targets() {
        let binding = ColumnBinding {
            order_id: "ServiceOrder".into(),
            status: "SO Status".into(),
            amount: "TotalSales".into(),
        };
        let targets = vec!["Costed".to_string(), "Released".to_string()];
        let summary = generate_summary("orders.csv", 0, &binding, &processed(), &targets);
        assert_eq!(summary.total_count, 2);
        assert_eq!(summary.pinned.len(), 2);
        assert_eq!(summary.pinned[1].count, 0);
        assert!(!summary.generated_at.is_empty());
    }
}
