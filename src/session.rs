// Per-session state: the loaded table, the column binding in force and the
// last computed result.
//
// The table is re-parsed only when (source, header row) changes and the rows
// are re-cleaned only when the binding changes, so changing the status filter
// or re-printing the summary reuses the cached result.
use crate::aggregate::aggregate;
use crate::error::{ReportError, Result};
use crate::loader::{self, LoadPolicy, Source, SourceId};
use crate::normalize::{normalize, NormalizeConfig};
use crate::resolver::{header_warnings, resolve, HeaderWarning, Resolution};
use crate::types::{AggregateReport, ColumnBinding, ColumnRole, NormalizeDiagnostics, NormalizedRow, RawTable};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableKey {
    pub source: SourceId,
    pub header_row: usize,
}

#[derive(Debug)]
pub struct LoadedTable {
    pub key: TableKey,
    pub table: Arc<RawTable>,
    pub resolution: Resolution,
    pub warnings: Vec<HeaderWarning>,
}

#[derive(Debug)]
pub struct Processed {
    pub rows: Vec<NormalizedRow>,
    pub diagnostics: NormalizeDiagnostics,
    pub report: AggregateReport,
}

#[derive(Debug, Default)]
pub struct Session {
    policy: LoadPolicy,
    normalize: NormalizeConfig,
    loaded: Option<LoadedTable>,
    pinned: Option<ColumnBinding>,
    processed: Option<(ColumnBinding, Arc<Processed>)>,
    parse_runs: usize,
    normalize_runs: usize,
}

impl Session {
    pub fn new(policy: LoadPolicy, normalize: NormalizeConfig) -> Self {
        Self {
            policy,
            normalize,
            ..Self::default()
        }
    }

    /// Load `source` using `header_row`, reusing the cached table when neither changed.
    ///
    /// A new table discards the pinned binding and the cached result. A failed
    /// load discards everything, so nothing stale is shown afterwards.
    pub fn load(&mut self, source: &Source, header_row: usize) -> Result<&LoadedTable> {
        let key = TableKey {
            source: source.identity(),
            header_row,
        };
        let cached = self.loaded.as_ref().is_some_and(|l| l.key == key);
        if cached {
            debug!(source = %source.name(), header_row, "table cache hit");
        } else {
            self.loaded = None;
            self.pinned = None;
            self.processed = None;
            self.parse_runs += 1;

            let table = loader::load(source, header_row, &self.policy)?;
            let resolution = resolve(&table.columns);
            let warnings = header_warnings(&table.columns);
            self.loaded = Some(LoadedTable {
                key,
                table: Arc::new(table),
                resolution,
                warnings,
            });
        }
        self.loaded.as_ref().ok_or(ReportError::NoTable)
    }

    pub fn loaded(&self) -> Option<&LoadedTable> {
        self.loaded.as_ref()
    }

    /// The binding in force: the user's pinned one, else the resolver's default.
    pub fn binding(&self) -> Option<&ColumnBinding> {
        self.pinned
            .as_ref()
            .or_else(|| self.loaded.as_ref().map(|l| &l.resolution.binding))
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned.is_some()
    }

    /// True while some role is bound only by the first-column default and the
    /// user has not confirmed or overridden the mapping.
    pub fn needs_confirmation(&self) -> bool {
        match &self.loaded {
            Some(l) => self.pinned.is_none() && !l.resolution.unmatched_roles().is_empty(),
            None => false,
        }
    }

    /// Point `role` at `column`. The override lasts until another table is loaded.
    pub fn override_binding(&mut self, role: ColumnRole, column: &str) -> Result<()> {
        let loaded = self.loaded.as_ref().ok_or(ReportError::NoTable)?;
        if loaded.table.column_index(column).is_none() {
            return Err(ReportError::UnknownColumn {
                role,
                column: column.to_string(),
            });
        }
        let mut binding = self.pinned.clone().unwrap_or_else(|| loaded.resolution.binding.clone());
        binding.set(role, column);
        info!(%role, column, "column binding overridden");
        self.pinned = Some(binding);
        Ok(())
    }

    /// Accept the current binding as-is.
    pub fn confirm_binding(&mut self) -> Result<()> {
        let binding = self.binding().cloned().ok_or(ReportError::NoTable)?;
        self.pinned = Some(binding);
        Ok(())
    }

    /// Drop any override and go back to the resolver's guess.
    pub fn reset_binding(&mut self) {
        self.pinned = None;
    }

    /// Normalized rows and aggregates for the current table and binding.
    pub fn process(&mut self) -> Result<Arc<Processed>> {
        let loaded = self.loaded.as_ref().ok_or(ReportError::NoTable)?;
        let binding = self
            .pinned
            .clone()
            .unwrap_or_else(|| loaded.resolution.binding.clone());

        if let Some((cached_binding, processed)) = &self.processed {
            if *cached_binding == binding {
                return Ok(Arc::clone(processed));
            }
        }

        let (rows, diagnostics) = normalize(&loaded.table, &binding, &self.normalize)?;
        let report = aggregate(&rows);
        self.normalize_runs += 1;
        let processed = Arc::new(Processed {
            rows,
            diagnostics,
            report,
        });
        self.processed = Some((binding, Arc::clone(&processed)));
        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = "ServiceOrder,SO Status,TotalSales\n\
                            A1,costed ,\"$1,000.00\"\n\
                            A1, Released,$500\n\
                            ,Costed,$10\n\
                            B2,COSTED,abc\n";

    fn source(text: &str) -> Source {
        Source::from_bytes("orders.csv", text.as_bytes().to_vec())
    }

    #[test]
    fn end_to_end_scenario() {
        let mut session = Session::default();
        session.load(&source(SCENARIO), 0).unwrap();
        let processed = session.process().unwrap();

        assert_eq!(processed.rows.len(), 3);
        assert_eq!(processed.report.total_count, 2);
        assert_eq!(processed.report.total_value, 1500.0);
        let costed = processed.report.get("Costed").unwrap();
        assert_eq!((costed.count, costed.value), (2, 1000.0));
        let released = processed.report.get("Released").unwrap();
        assert_eq!((released.count, released.value), (1, 500.0));
    }

    #[test]
    fn same_source_and_header_row_is_not_reparsed() {
        let mut session = Session::default();
        let src = source(SCENARIO);
        session.load(&src, 0).unwrap();
        session.process().unwrap();
        session.load(&src, 0).unwrap();
        session.process().unwrap();
        assert_eq!(session.parse_runs, 1);
        assert_eq!(session.normalize_runs, 1);
    }

    #[test]
    fn override_recomputes_and_survives_until_new_table() {
        let text = "ServiceOrder,SO Status,Quotation Status,TotalSales\nA1,Costed,Open,10\n";
        let mut session = Session::default();
        let src = source(text);
        session.load(&src, 0).unwrap();
        assert_eq!(session.process().unwrap().report.groups[0].status, "Costed");

        session.override_binding(ColumnRole::Status, "Quotation Status").unwrap();
        assert!(session.is_pinned());
        assert_eq!(session.process().unwrap().report.groups[0].status, "Open");
        assert_eq!(session.normalize_runs, 2);

        // Same table: override stays.
        session.load(&src, 0).unwrap();
        assert_eq!(session.binding().unwrap().status, "Quotation Status");

        // Different header row means a different table: override is dropped.
        let shifted = source(&format!("Export\n{text}"));
        session.load(&shifted, 1).unwrap();
        assert!(!session.is_pinned());
        assert_eq!(session.binding().unwrap().status, "SO Status");
    }

    #[test]
    fn override_with_unknown_column_is_rejected() {
        let mut session = Session::default();
        session.load(&source(SCENARIO), 0).unwrap();
        let err = session.override_binding(ColumnRole::Amount, "Nope").unwrap_err();
        assert!(matches!(err, ReportError::UnknownColumn { .. }));
        assert!(!session.is_pinned());
    }

    #[test]
    fn fallback_binding_needs_confirmation() {
        let mut session = Session::default();
        session.load(&source("Alpha,Beta\n1,2\n"), 0).unwrap();
        assert!(session.needs_confirmation());
        session.confirm_binding().unwrap();
        assert!(!session.needs_confirmation());
        assert_eq!(session.binding().unwrap().order_id, "Alpha");
    }

    #[test]
    fn failed_load_clears_previous_table() {
        let mut session = Session::default();
        session.load(&source(SCENARIO), 0).unwrap();
        let err = session.load(&source(SCENARIO), 50).unwrap_err();
        assert!(matches!(err, ReportError::Load(_)));
        assert!(session.loaded().is_none());
        assert!(matches!(session.process(), Err(ReportError::NoTable)));
    }
}
