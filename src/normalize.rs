// Cleaning of the bound columns into `NormalizedRow`s.
//
// Nothing here fails: bad amounts become 0 and bad statuses become "Blank".
// Each cleaner reports what it had to coerce so callers can count it.
use crate::error::{ReportError, Result};
use crate::types::{BoundColumns, ColumnBinding, ColumnRole, NormalizeDiagnostics, NormalizedRow, RawTable};
use tracing::info;

pub const BLANK_STATUS: &str = "Blank";

/// Values (compared case-insensitively after trimming) that mean "no status".
/// The empty string is always treated as blank on top of these.
pub const DEFAULT_BLANK_SENTINELS: [&str; 5] = ["nan", "none", "na", "n/a", "null"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anomaly {
    /// The cell was empty or held a blank sentinel.
    Missing,
    /// The cell had content that could not be read.
    Unparseable,
}

/// A cleaned value and what, if anything, was coerced to get it.
#[derive(Debug, Clone, PartialEq)]
pub struct Cleaned<T> {
    pub value: T,
    pub anomaly: Option<Anomaly>,
}

impl<T> Cleaned<T> {
    fn ok(value: T) -> Self {
        Self {
            value,
            anomaly: None,
        }
    }

    fn coerced(value: T, anomaly: Anomaly) -> Self {
        Self {
            value,
            anomaly: Some(anomaly),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeConfig {
    pub blank_sentinels: Vec<String>,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            blank_sentinels: DEFAULT_BLANK_SENTINELS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl NormalizeConfig {
    fn is_blank(&self, status: &str) -> bool {
        let lowered = status.trim().to_lowercase();
        lowered.is_empty() || self.blank_sentinels.iter().any(|s| s.trim().to_lowercase() == lowered)
    }
}

/// Turn a currency-formatted cell such as `"$1,234.50"` into a number.
///
/// Everything except digits, `.`, `,` and `-` is dropped, then the commas
/// (thousands separators) are removed before parsing. Missing, unparseable and
/// non-finite inputs all come back as `0.0`.
pub fn clean_amount(raw: Option<&str>) -> Cleaned<f64> {
    let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
        return Cleaned::coerced(0.0, Anomaly::Missing);
    };
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .filter(|c| *c != ',')
        .collect();
    match kept.parse::<f64>() {
        Ok(v) if v.is_finite() => Cleaned::ok(v),
        _ => Cleaned::coerced(0.0, Anomaly::Unparseable),
    }
}

/// Title-case `s`: the first letter of each run of letters is upper-cased and
/// the rest lower-cased, so `"SO-status"` becomes `"So-Status"`.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                // Multi-char mappings keep only their first char upper-cased:
                // `ß` becomes `Ss`, which a second pass leaves alone.
                let mut upper = c.to_uppercase();
                out.extend(upper.next());
                out.extend(upper.flat_map(char::to_lowercase));
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

/// Canonical status label: trimmed and title-cased, or `"Blank"`.
pub fn clean_status(raw: Option<&str>, config: &NormalizeConfig) -> Cleaned<String> {
    let titled = title_case(raw.unwrap_or_default().trim());
    if config.is_blank(&titled) {
        Cleaned::coerced(BLANK_STATUS.to_string(), Anomaly::Missing)
    } else {
        Cleaned::ok(titled)
    }
}

impl ColumnBinding {
    /// Check every role against `table`, returning column indices.
    pub fn bind(&self, table: &RawTable) -> Result<BoundColumns> {
        let index = |role: ColumnRole| {
            let column = self.get(role);
            table.column_index(column).ok_or_else(|| ReportError::UnknownColumn {
                role,
                column: column.to_string(),
            })
        };
        Ok(BoundColumns {
            order_id: index(ColumnRole::OrderId)?,
            status: index(ColumnRole::Status)?,
            amount: index(ColumnRole::Amount)?,
        })
    }
}

/// Clean every row with a usable order id. Rows with an empty id are dropped;
/// nothing else excludes a row.
pub fn normalize(
    table: &RawTable,
    binding: &ColumnBinding,
    config: &NormalizeConfig,
) -> Result<(Vec<NormalizedRow>, NormalizeDiagnostics)> {
    let cols = binding.bind(table)?;
    let mut diagnostics = NormalizeDiagnostics {
        source_rows: table.row_count(),
        ..NormalizeDiagnostics::default()
    };
    let mut rows = Vec::with_capacity(table.row_count());

    for idx in 0..table.row_count() {
        let order_id = match table.cell(idx, cols.order_id) {
            Some(id) if !id.trim().is_empty() => id.to_string(),
            _ => {
                diagnostics.dropped_rows += 1;
                continue;
            }
        };

        let amount = clean_amount(table.cell(idx, cols.amount));
        match amount.anomaly {
            Some(Anomaly::Missing) => diagnostics.missing_amounts += 1,
            Some(Anomaly::Unparseable) => diagnostics.unparseable_amounts += 1,
            None => {}
        }
        let status = clean_status(table.cell(idx, cols.status), config);
        if status.anomaly.is_some() {
            diagnostics.blank_statuses += 1;
        }

        rows.push(NormalizedRow {
            source_row: idx,
            order_id,
            status: status.value,
            amount: amount.value,
        });
    }

    info!(
        kept = rows.len(),
        dropped = diagnostics.dropped_rows,
        unparseable_amounts = diagnostics.unparseable_amounts,
        missing_amounts = diagnostics.missing_amounts,
        blank_statuses = diagnostics.blank_statuses,
        "normalized rows"
    );
    Ok((rows, diagnostics))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(s: &str) -> Option<String> {
        Some(s.to_string())
    }

    fn scenario_table() -> RawTable {
        RawTable {
            columns: vec!["ServiceOrder".into(), "SO Status".into(), "TotalSales".into()],
            rows: vec![
                vec![cell("A1"), cell("costed "), cell("$1,000.00")],
                vec![cell("A1"), cell(" Released"), cell("$500")],
                vec![cell(""), cell("Costed"), cell("$10")],
                vec![cell("B2"), cell("COSTED"), cell("abc")],
            ],
        }
    }

    fn scenario_binding() -> ColumnBinding {
        ColumnBinding {
            order_id: "ServiceOrder".into(),
            status: "SO Status".into(),
            amount: "TotalSales".into(),
        }
    }

    #[test]
    fn amount_strips_currency_and_thousands() {
        assert_eq!(clean_amount(Some("$1,000.00")).value, 1000.0);
        assert_eq!(clean_amount(Some("USD 2,500.75")).value, 2500.75);
        assert_eq!(clean_amount(Some("-42.5")).value, -42.5);
        assert_eq!(clean_amount(Some("1250.5")).anomaly, None);
    }

    #[test]
    fn amount_coerces_garbage_to_zero() {
        let c = clean_amount(Some("abc"));
        assert_eq!(c.value, 0.0);
        assert_eq!(c.anomaly, Some(Anomaly::Unparseable));
        assert_eq!(clean_amount(Some("--")).value, 0.0);
        assert_eq!(clean_amount(None).anomaly, Some(Anomaly::Missing));
        assert_eq!(clean_amount(Some("   ")).anomaly, Some(Anomaly::Missing));
    }

    #[test]
    fn amount_cleaning_is_idempotent() {
        for raw in ["$1,000.00", "12.5", "-3", "0"] {
            let once = clean_amount(Some(raw)).value;
            let twice = clean_amount(Some(&once.to_string())).value;
            assert_eq!(once, twice, "{raw}");
        }
    }

    #[test]
    fn title_case_matches_word_boundaries() {
        assert_eq!(title_case("costed"), "Costed");
        assert_eq!(title_case("COSTED"), "Costed");
        assert_eq!(title_case("partially released"), "Partially Released");
        assert_eq!(title_case("so-status"), "So-Status");
        assert_eq!(title_case("2nd review"), "2Nd Review");
    }

    #[test]
    fn status_trims_titles_and_blanks() {
        let config = NormalizeConfig::default();
        assert_eq!(clean_status(Some(" Released"), &config).value, "Released");
        assert_eq!(clean_status(Some("costed "), &config).value, "Costed");
        for blank in ["", "   ", "nan", "NaN", "None", "NA", "n/a", "NULL"] {
            let c = clean_status(Some(blank), &config);
            assert_eq!(c.value, BLANK_STATUS, "{blank:?}");
            assert_eq!(c.anomaly, Some(Anomaly::Missing));
        }
        assert_eq!(clean_status(None, &config).value, BLANK_STATUS);
    }

    #[test]
    fn custom_sentinels_replace_defaults() {
        let config = NormalizeConfig {
            blank_sentinels: vec!["-".to_string()],
        };
        assert_eq!(clean_status(Some("-"), &config).value, BLANK_STATUS);
        assert_eq!(clean_status(Some("none"), &config).value, "None");
    }

    #[test]
    fn status_cleaning_is_idempotent() {
        let config = NormalizeConfig::default();
        for raw in ["  on HOLD ", "released", "nan", "Mc donald's", "ßtatus"] {
            let once = clean_status(Some(raw), &config).value;
            let twice = clean_status(Some(&once), &config).value;
            assert_eq!(once, twice);
        }
        assert_eq!(title_case("ßtatus"), "Sstatus");
    }

    #[test]
    fn drops_rows_without_order_id() {
        let (rows, diag) = normalize(&scenario_table(), &scenario_binding(), &NormalizeConfig::default()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(diag.source_rows, 4);
        assert_eq!(diag.dropped_rows, 1);
        assert_eq!(diag.unparseable_amounts, 1);
        let labels: Vec<(&str, &str)> = rows.iter().map(|r| (r.order_id.as_str(), r.status.as_str())).collect();
        assert_eq!(labels, vec![("A1", "Costed"), ("A1", "Released"), ("B2", "Costed")]);
        assert_eq!(rows[2].source_row, 3);
        assert_eq!(rows[2].amount, 0.0);
    }

    #[test]
    fn null_and_whitespace_ids_are_dropped() {
        let mut table = scenario_table();
        table.rows[0][0] = None;
        table.rows[1][0] = cell("   ");
        let (rows, diag) = normalize(&table, &scenario_binding(), &NormalizeConfig::default()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(diag.dropped_rows, 3);
    }

    #[test]
    fn unknown_column_is_rejected() {
        let mut binding = scenario_binding();
        binding.set(ColumnRole::Amount, "Net Value");
        let err = normalize(&scenario_table(), &binding, &NormalizeConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            ReportError::UnknownColumn { role: ColumnRole::Amount, .. }
        ));
    }
}
