// Entry point and interactive menu.
//
// The menu drives one `Session`:
// - [1] loads a file at a header row and shows what the resolver picked,
// - [2] lets the user re-point any of the three columns,
// - [3]/[4] print the summary and a filtered row view from the cached result,
// - [5] writes the workbook and summary files.
// `--batch` runs load, summary and export once without prompting.
mod aggregate;
mod config;
mod error;
mod loader;
mod normalize;
mod output;
mod reports;
mod resolver;
mod session;
mod types;
mod util;

use aggregate::{filter_rows, view_metrics, StatusFilter, StatusOrder};
use anyhow::Context;
use clap::Parser;
use config::Args;
use loader::Source;
use once_cell::sync::Lazy;
use session::Session;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use tracing::warn;
use tracing_subscriber::EnvFilter;
use types::ColumnRole;

const PREVIEW_ROWS: usize = 3;
const VIEW_ROWS: usize = 20;

// One session per run; the loaded table and last result live here between menu picks.
static APP_STATE: Lazy<Mutex<AppState>> = Lazy::new(|| Mutex::new(AppState::default()));

#[derive(Default)]
struct AppState {
    session: Session,
    source: Option<Source>,
    file: Option<PathBuf>,
    header_row: usize,
    targets: Vec<String>,
    out_dir: PathBuf,
    stem: String,
}

fn app_state() -> MutexGuard<'static, AppState> {
    APP_STATE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One trimmed line from `reader`, or `None` once input is closed or unreadable.
fn read_trimmed_line<R: BufRead>(reader: &mut R) -> Option<String> {
    let mut buf = String::new();
    match reader.read_line(&mut buf) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(buf.trim().to_string()),
    }
}

/// Print `label` and read one trimmed line from stdin.
fn prompt(label: &str) -> Option<String> {
    print!("{}", label);
    let _ = io::stdout().flush();
    read_trimmed_line(&mut io::stdin().lock())
}

fn read_choice() -> Option<String> {
    prompt("Enter choice: ")
}

/// Read the file and hand it to the session at `header_row`. The session
/// skips the parse when the content and header row are unchanged.
fn load_into(state: &mut AppState, path: PathBuf, header_row: usize) -> error::Result<()> {
    let source = Source::from_path(&path)?;
    state.file = Some(path);
    state.header_row = header_row;
    state.session.load(&source, header_row)?;
    state.source = Some(source);
    Ok(())
}

fn print_load_result(state: &AppState) {
    let Some(loaded) = state.session.loaded() else {
        return;
    };
    println!(
        "Loaded {} rows x {} columns (header row {}).\n",
        util::format_int(loaded.table.row_count()),
        loaded.table.column_count(),
        state.header_row
    );
    println!("Data preview (first {} rows):", PREVIEW_ROWS);
    println!("{}\n", output::render_table_head(&loaded.table, PREVIEW_ROWS));
    for w in &loaded.warnings {
        println!("Warning: {}", w);
    }
    if !loaded.warnings.is_empty() {
        println!("Try a different header row number.\n");
    }
    print_binding(state);
}

fn print_binding(state: &AppState) {
    let (Some(loaded), Some(binding)) = (state.session.loaded(), state.session.binding()) else {
        return;
    };
    println!("Column mapping:");
    output::preview_table_rows(&reports::binding_rows(&loaded.resolution, binding), 3);
    let unmatched = loaded.resolution.unmatched_roles();
    if !unmatched.is_empty() && !state.session.is_pinned() {
        let names: Vec<String> = unmatched.iter().map(|r| r.to_string()).collect();
        println!(
            "Warning: no matching column found for {}; the first column was used.\n",
            names.join(", ")
        );
    }
}

/// Handle option [1]: pick a file and header row, then load.
fn handle_load() {
    let mut state = app_state();
    let default_file = state
        .file
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let Some(file) = prompt(&format!("File path [{}]: ", default_file)) else {
        return;
    };
    let file = if file.is_empty() { default_file } else { file };
    if file.is_empty() {
        println!("No file given.\n");
        return;
    }
    let Some(header_input) = prompt(&format!("Header row number [{}]: ", state.header_row)) else {
        return;
    };
    let header_row = if header_input.is_empty() {
        state.header_row
    } else {
        match header_input.parse::<usize>() {
            Ok(n) => n,
            Err(_) => {
                println!("Invalid header row. Please enter a non-negative number.\n");
                return;
            }
        }
    };

    println!("Processing file...");
    let result = load_into(&mut state, PathBuf::from(file), header_row);
    match result {
        Ok(()) => {
            print_load_result(&state);
            if state.session.needs_confirmation() {
                println!("Please confirm or fix the column mapping before running reports.\n");
                drop(state);
                handle_mapping();
            }
        }
        Err(error::ReportError::Load(failure)) => {
            eprintln!("Failed to load file: {}", failure);
            for attempt in &failure.attempts {
                eprintln!("  - {}: {}", attempt.strategy, attempt.reason);
            }
            eprintln!();
        }
        Err(e) => eprintln!("Failed to load file: {}\n", e),
    }
}

/// Handle option [2]: review and override the column mapping.
fn handle_mapping() {
    let mut state = app_state();
    if state.session.loaded().is_none() {
        println!("Error: No data loaded. Please load a file first (option 1).\n");
        return;
    }
    loop {
        print_binding(&state);
        println!("[1] Change {}", ColumnRole::OrderId);
        println!("[2] Change {}", ColumnRole::Status);
        println!("[3] Change {}", ColumnRole::Amount);
        println!("[C] Confirm mapping");
        println!("[R] Reset to detected mapping\n");
        let Some(choice) = read_choice() else {
            return;
        };
        let role = match choice.to_uppercase().as_str() {
            "1" => ColumnRole::OrderId,
            "2" => ColumnRole::Status,
            "3" => ColumnRole::Amount,
            "C" | "" => {
                if let Err(e) = state.session.confirm_binding() {
                    eprintln!("{}\n", e);
                }
                println!("Mapping confirmed.\n");
                return;
            }
            "R" => {
                state.session.reset_binding();
                continue;
            }
            _ => {
                println!("Invalid choice.\n");
                continue;
            }
        };

        let columns = match state.session.loaded() {
            Some(loaded) => loaded.table.columns.clone(),
            None => return,
        };
        for (i, c) in columns.iter().enumerate() {
            println!("[{}] {}", i + 1, c);
        }
        let Some(pick) = prompt(&format!("Column for {}: ", role)) else {
            return;
        };
        let column = match pick.parse::<usize>() {
            Ok(n) if (1..=columns.len()).contains(&n) => columns[n - 1].clone(),
            _ => {
                println!("Invalid column number.\n");
                continue;
            }
        };
        if let Err(e) = state.session.override_binding(role, &column) {
            eprintln!("{}\n", e);
        }
    }
}

fn print_summary(state: &mut AppState) -> error::Result<()> {
    let processed = state.session.process()?;
    let report = &processed.report;
    let diag = &processed.diagnostics;

    println!("TOTAL ORDERS: {}", util::format_int(report.total_count));
    println!("TOTAL VALUE:  {}\n", util::format_currency(report.total_value));
    let pinned = report.pinned(&state.targets);
    output::preview_table_rows(&reports::status_rows(&pinned), pinned.len());
    println!("All statuses by order count:");
    let by_count = report.sorted(StatusOrder::CountDesc);
    output::preview_table_rows(&reports::status_rows(&by_count), by_count.len());
    println!(
        "Rows kept: {} of {} ({} without an order id).",
        util::format_int(processed.rows.len()),
        util::format_int(diag.source_rows),
        util::format_int(diag.dropped_rows)
    );
    if diag.unparseable_amounts > 0 || diag.missing_amounts > 0 {
        println!(
            "Note: {} unreadable and {} empty amounts counted as 0.",
            util::format_int(diag.unparseable_amounts),
            util::format_int(diag.missing_amounts)
        );
    }
    if diag.blank_statuses > 0 {
        println!(
            "Note: {} rows have a blank status.",
            util::format_int(diag.blank_statuses)
        );
    }
    println!();
    Ok(())
}

/// Handle option [3]: totals and the pinned status list.
fn handle_summary() {
    let mut state = app_state();
    if state.session.loaded().is_none() {
        println!("Error: No data loaded. Please load a file first (option 1).\n");
        return;
    }
    if let Err(e) = print_summary(&mut state) {
        eprintln!("Failed to build summary: {}\n", e);
    }
}

/// Handle option [4]: "Show All" or one observed status, with its rows.
fn handle_filter() {
    let mut state = app_state();
    if state.session.loaded().is_none() {
        println!("Error: No data loaded. Please load a file first (option 1).\n");
        return;
    }
    let processed = match state.session.process() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to build view: {}\n", e);
            return;
        }
    };

    let statuses = processed.report.observed_statuses();
    println!("[0] Show All");
    for (i, s) in statuses.iter().enumerate() {
        println!("[{}] {}", i + 1, s);
    }
    let Some(choice) = read_choice() else {
        return;
    };
    let filter = match choice.parse::<usize>() {
        Ok(0) => StatusFilter::All,
        Ok(n) if n <= statuses.len() => StatusFilter::Only(statuses[n - 1].clone()),
        _ => {
            println!("Invalid choice.\n");
            return;
        }
    };

    let selected = filter_rows(&processed.rows, &filter);
    let (count, value) = view_metrics(&selected);
    println!("\nSelected Volume: {} Orders", util::format_int(count));
    println!("Selected Value:  {}\n", util::format_currency(value));
    if let Some(loaded) = state.session.loaded() {
        println!("{}\n", output::render_data_rows(&loaded.table, &selected, VIEW_ROWS));
    }
}

fn export(state: &mut AppState) -> error::Result<output::ExportPaths> {
    let processed = state.session.process()?;
    let loaded = state.session.loaded().ok_or(error::ReportError::NoTable)?;
    let binding = state.session.binding().ok_or(error::ReportError::NoTable)?;
    let source = state.source.as_ref().map(|s| s.name()).unwrap_or_default();
    let summary = reports::generate_summary(source, state.header_row, binding, &processed, &state.targets);
    output::export_report(&state.out_dir, &state.stem, &loaded.table, &processed, &summary)
}

/// Handle option [5]: write the workbook plus CSV/JSON summaries.
fn handle_export() {
    let mut state = app_state();
    if state.session.loaded().is_none() {
        println!("Error: No data loaded. Please load a file first (option 1).\n");
        return;
    }
    match export(&mut state) {
        Ok(paths) => {
            println!("Report saved to {}", paths.workbook.display());
            println!("Summary saved to {} and {}\n", paths.summary_csv.display(), paths.summary_json.display());
        }
        Err(e) => eprintln!("Write error: {}\n", e),
    }
}

fn run_batch(args: &Args) -> anyhow::Result<()> {
    let mut state = app_state();
    let path = args.file.clone().context("--batch needs --file")?;
    load_into(&mut state, path.clone(), args.header_row)
        .with_context(|| format!("failed to load {}", path.display()))?;
    print_load_result(&state);
    if state.session.needs_confirmation() {
        warn!("continuing with first-column defaults for unmatched roles");
    }
    print_summary(&mut state).context("failed to build summary")?;
    let paths = export(&mut state).context("failed to export report")?;
    println!("Report saved to {}", paths.workbook.display());
    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "so_volume_report=debug"
    } else {
        "so_volume_report=warn"
    };
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(env)
        .with_writer(io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    {
        let mut state = app_state();
        state.session = Session::new(args.load_policy(), args.normalize_config());
        state.targets = args.targets()?;
        state.file = args.file.clone();
        state.header_row = args.header_row;
        state.out_dir = args.out_dir.clone();
        state.stem = args.stem.clone();
    }

    if args.batch {
        return run_batch(&args);
    }

    loop {
        println!("Service Order Volume & Value Report");
        println!("[1] Load file");
        println!("[2] Column mapping");
        println!("[3] Summary");
        println!("[4] Filter & view");
        println!("[5] Export report");
        println!("[6] Exit\n");
        // Closed input exits like [6].
        match read_choice().as_deref() {
            Some("1") => handle_load(),
            Some("2") => handle_mapping(),
            Some("3") => handle_summary(),
            Some("4") => handle_filter(),
            Some("5") => handle_export(),
            Some("6") | None => {
                println!("Exiting the program.");
                break;
            }
            _ => println!("Invalid choice. Please enter 1-6.\n"),
        }
    }
    Ok(())
}
