use crate::types::{Cell, RawTable};
use calamine::{Data, Reader, Xls, Xlsx};
use csv::ReaderBuilder;
use scraper::{Html, Selector};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Prefix given to header cells that are empty at the chosen header row.
pub const UNNAMED_PREFIX: &str = "Unnamed: ";

/// An uploaded file held in memory so every strategy can re-read it from the start.
#[derive(Debug, Clone)]
pub struct Source {
    name: String,
    bytes: Vec<u8>,
}

/// Identity of a source for caching: same name and same content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceId {
    pub name: String,
    pub len: usize,
    pub digest: u64,
}

impl Source {
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(Self::from_bytes(path.display().to_string(), bytes))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn kind(&self) -> SourceKind {
        SourceKind::sniff(&self.name)
    }

    pub fn identity(&self) -> SourceId {
        let mut hasher = DefaultHasher::new();
        self.bytes.hash(&mut hasher);
        SourceId {
            name: self.name.clone(),
            len: self.bytes.len(),
            digest: hasher.finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    SpreadsheetModern,
    SpreadsheetLegacy,
    Delimited,
}

impl SourceKind {
    /// Guess the kind from the file extension. Unknown extensions are treated as text.
    pub fn sniff(name: &str) -> Self {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("xlsx") | Some("xlsm") => SourceKind::SpreadsheetModern,
            Some("xls") => SourceKind::SpreadsheetLegacy,
            _ => SourceKind::Delimited,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Xlsx,
    Xls,
    Delimited,
    Html,
}

impl Format {
    fn kind(self) -> Option<SourceKind> {
        match self {
            Format::Xlsx => Some(SourceKind::SpreadsheetModern),
            Format::Xls => Some(SourceKind::SpreadsheetLegacy),
            Format::Delimited => Some(SourceKind::Delimited),
            Format::Html => None,
        }
    }
}

/// One way of reading the source: a format plus, for delimited text, its separator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseStrategy {
    pub format: Format,
    pub delimiter: Option<u8>,
}

impl ParseStrategy {
    pub const fn of(format: Format) -> Self {
        Self {
            format,
            delimiter: None,
        }
    }

    pub const fn delimited(delimiter: u8) -> Self {
        Self {
            format: Format::Delimited,
            delimiter: Some(delimiter),
        }
    }

    fn read_records(&self, bytes: &[u8]) -> Result<Vec<Vec<Cell>>, String> {
        match self.format {
            Format::Xlsx => {
                let workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes)).map_err(|e| e.to_string())?;
                first_sheet_records(workbook)
            }
            Format::Xls => {
                let workbook: Xls<_> = Xls::new(Cursor::new(bytes)).map_err(|e| e.to_string())?;
                first_sheet_records(workbook)
            }
            Format::Delimited => read_delimited(bytes, self.delimiter.unwrap_or(b',')),
            Format::Html => read_html(bytes),
        }
    }

    /// Parse `bytes` with this strategy, using `header_row` as the header line.
    pub fn parse(&self, bytes: &[u8], header_row: usize, policy: &LoadPolicy) -> Result<RawTable, String> {
        let records = self.read_records(bytes)?;
        build_table(records, header_row, policy)
    }
}

impl fmt::Display for ParseStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.format, self.delimiter) {
            (Format::Xlsx, _) => f.write_str("xlsx"),
            (Format::Xls, _) => f.write_str("xls"),
            (Format::Html, _) => f.write_str("html table"),
            (Format::Delimited, Some(b'\t')) => f.write_str("delimited (tab)"),
            (Format::Delimited, Some(d)) => write!(f, "delimited ({:?})", d as char),
            (Format::Delimited, None) => f.write_str("delimited"),
        }
    }
}

/// Strategies in the order they are tried before sniffing reorders them.
pub const DEFAULT_STRATEGIES: [ParseStrategy; 5] = [
    ParseStrategy::of(Format::Xlsx),
    ParseStrategy::of(Format::Xls),
    ParseStrategy::delimited(b','),
    ParseStrategy::delimited(b';'),
    ParseStrategy::delimited(b'\t'),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadPolicy {
    /// Tables narrower than this count as a failed strategy. Never below 1.
    pub min_columns: usize,
    /// Append the HTML-table reader after every other strategy.
    pub html_fallback: bool,
}

impl Default for LoadPolicy {
    fn default() -> Self {
        Self {
            min_columns: 2,
            html_fallback: false,
        }
    }
}

/// The strategy list for a source of `kind`: the defaults, with those matching
/// `kind` moved to the front (order otherwise preserved).
pub fn strategies_for(kind: SourceKind, policy: &LoadPolicy) -> Vec<ParseStrategy> {
    let (mut ordered, rest): (Vec<_>, Vec<_>) = DEFAULT_STRATEGIES
        .iter()
        .copied()
        .partition(|s| s.format.kind() == Some(kind));
    ordered.extend(rest);
    if policy.html_fallback {
        ordered.push(ParseStrategy::of(Format::Html));
    }
    ordered
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyAttempt {
    pub strategy: ParseStrategy,
    pub reason: String,
}

#[derive(Error, Debug, Clone)]
#[error("could not read {source_name} with header row {header_row}: all {} parse strategies failed", .attempts.len())]
pub struct LoadFailure {
    pub source_name: String,
    pub header_row: usize,
    pub attempts: Vec<StrategyAttempt>,
}

/// Try each strategy in turn and return the first table that parses.
pub fn load(source: &Source, header_row: usize, policy: &LoadPolicy) -> Result<RawTable, LoadFailure> {
    let mut attempts = Vec::new();
    for strategy in strategies_for(source.kind(), policy) {
        match strategy.parse(source.bytes(), header_row, policy) {
            Ok(table) => {
                info!(
                    source = %source.name(),
                    %strategy,
                    rows = table.row_count(),
                    columns = table.column_count(),
                    "loaded table"
                );
                return Ok(table);
            }
            Err(reason) => {
                debug!(source = %source.name(), %strategy, %reason, "parse strategy failed");
                attempts.push(StrategyAttempt { strategy, reason });
            }
        }
    }
    Err(LoadFailure {
        source_name: source.name().to_string(),
        header_row,
        attempts,
    })
}

fn first_sheet_records<'a, R>(mut workbook: R) -> Result<Vec<Vec<Cell>>, String>
where
    R: Reader<Cursor<&'a [u8]>>,
    R::Error: fmt::Display,
{
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| "workbook has no worksheets".to_string())?
        .map_err(|e| e.to_string())?;

    // Ranges start at the first used cell; pad back to A1 so row numbers are absolute.
    let (start_row, start_col) = range.start().unwrap_or((0, 0));
    let mut records: Vec<Vec<Cell>> = vec![Vec::new(); start_row as usize];
    for row in range.rows() {
        let mut cells: Vec<Cell> = vec![None; start_col as usize];
        cells.extend(row.iter().map(data_to_cell));
        records.push(cells);
    }
    Ok(records)
}

fn data_to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => None,
        Data::String(s) if s.is_empty() => None,
        Data::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn read_delimited(bytes: &[u8], delimiter: u8) -> Result<Vec<Vec<Cell>>, String> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(bytes);
    let mut records = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| e.to_string())?;
        records.push(
            record
                .iter()
                .map(|field| if field.is_empty() { None } else { Some(field.to_string()) })
                .collect(),
        );
    }
    Ok(records)
}

fn read_html(bytes: &[u8]) -> Result<Vec<Vec<Cell>>, String> {
    let text = std::str::from_utf8(bytes).map_err(|e| e.to_string())?;
    let document = Html::parse_document(text);
    let table_sel = Selector::parse("table").map_err(|e| format!("{e:?}"))?;
    let row_sel = Selector::parse("tr").map_err(|e| format!("{e:?}"))?;
    let cell_sel = Selector::parse("th, td").map_err(|e| format!("{e:?}"))?;

    let table = document
        .select(&table_sel)
        .next()
        .ok_or_else(|| "no <table> element".to_string())?;
    let records = table
        .select(&row_sel)
        .map(|tr| {
            tr.select(&cell_sel)
                .map(|cell| {
                    let text = cell.text().collect::<String>();
                    let text = text.trim();
                    if text.is_empty() { None } else { Some(text.to_string()) }
                })
                .collect()
        })
        .collect();
    Ok(records)
}

fn is_blank(cell: &Cell) -> bool {
    cell.as_deref().map_or(true, |s| s.trim().is_empty())
}

/// Cut `records` at `header_row` and square the remainder off into a table.
fn build_table(records: Vec<Vec<Cell>>, header_row: usize, policy: &LoadPolicy) -> Result<RawTable, String> {
    if header_row >= records.len() {
        return Err(format!(
            "header row {} is past the end of the data ({} rows)",
            header_row,
            records.len()
        ));
    }
    let mut records = records.into_iter().skip(header_row);
    let header = records.next().unwrap_or_default();
    let width = header.len();
    if width == 0 {
        return Err("header row has no columns".to_string());
    }
    if width < policy.min_columns.max(1) {
        return Err(format!(
            "only {} column(s) found, at least {} required",
            width, policy.min_columns
        ));
    }

    let mut rows = Vec::new();
    for (offset, mut row) in records.enumerate() {
        if row.iter().all(is_blank) {
            continue;
        }
        if row.len() > width {
            if row[width..].iter().any(|c| !is_blank(c)) {
                return Err(format!(
                    "row {} has {} fields but the header has {}",
                    header_row + offset + 1,
                    row.len(),
                    width
                ));
            }
            row.truncate(width);
        }
        row.resize(width, None);
        rows.push(row);
    }

    Ok(RawTable {
        columns: column_names(&header),
        rows,
    })
}

/// Header cells become column names: trimmed, placeholders for empty cells,
/// `.1`, `.2`... suffixes for repeats.
fn column_names(header: &[Cell]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut names = Vec::with_capacity(header.len());
    for (idx, cell) in header.iter().enumerate() {
        let base = match cell.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => format!("{UNNAMED_PREFIX}{idx}"),
        };
        let mut name = base.clone();
        let mut n = 1;
        while seen.contains(&name) {
            name = format!("{base}.{n}");
            n += 1;
        }
        seen.insert(name.clone());
        names.push(name);
    }
    names
}
