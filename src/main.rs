use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Result};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use spantree::bounds::{compute_bounds, duration_string, TraceBounds};
use spantree::input::{load_trace_file, TraceInput};
use spantree::ordering::{order_spans, SpanStatus};
use spantree::settings::{self, Settings};
use spantree::span_tree::build_forest;
use spantree::summary::{sort_summaries, summarize, TraceSummary};
use spantree::types::{stringify_span, time_point_to_utc_string};
use spantree::view_state::ViewState;
use spantree::waterfall::{build_waterfall, WaterfallRow};

const USAGE: &str = "Usage:
  spantree <trace-file> [trace-id]   show the traces in an OTLP or trace data JSON file
  spantree --init-settings           write the default settings file";

fn main() -> ExitCode {
    let settings = match settings::load_settings() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("Error loading settings, using defaults: {err:#}");
            Settings::default()
        }
    };
    init_logging(&settings);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let result = match args.first().map(String::as_str) {
        None => {
            eprintln!("{USAGE}");
            return ExitCode::FAILURE;
        }
        Some("-h" | "--help") => {
            println!("{USAGE}");
            return ExitCode::SUCCESS;
        }
        Some("--init-settings") => init_settings(),
        Some(path) => show_traces(
            &PathBuf::from(path),
            args.get(1).map(String::as_str),
            &settings,
        ),
    };

    if let Err(err) = result {
        error!("{err:#}");
        eprintln!("Error: {err:#}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn init_logging(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn init_settings() -> Result<()> {
    if let Some(path) = settings::settings_file_path() {
        if path.try_exists()? {
            bail!("Settings file {} already exists", path.display());
        }
    }
    let path = settings::save_settings(&Settings::default())?;
    println!("Wrote default settings to {}", path.display());
    Ok(())
}

fn show_traces(path: &Path, trace_id: Option<&str>, settings: &Settings) -> Result<()> {
    let traces = load_trace_file(path)?;
    info!(traces = traces.len(), "loaded traces");

    let mut summaries: Vec<TraceSummary> = traces
        .iter()
        .map(|trace| summarize(&trace.trace_id, &trace.spans))
        .collect();
    sort_summaries(&mut summaries);
    print_summaries(&summaries);

    let selected: Vec<&TraceInput> = match trace_id {
        Some(trace_id) => {
            let Some(trace) = traces.iter().find(|trace| trace.trace_id == trace_id) else {
                bail!("Trace {trace_id} not found in {}", path.display());
            };
            vec![trace]
        }
        None => summaries
            .iter()
            .filter_map(|summary| {
                traces
                    .iter()
                    .find(|trace| trace.trace_id == summary.trace_id)
            })
            .collect(),
    };

    for trace in selected {
        println!();
        show_trace(trace, settings, trace_id.is_some())?;
    }
    Ok(())
}

fn print_summaries(summaries: &[TraceSummary]) {
    println!("{} traces", summaries.len());
    for summary in summaries {
        match &summary.root_span {
            Some(root) => println!(
                "  {}  {} / {}  {} spans  {}",
                summary.trace_id,
                root.service_name,
                root.name,
                summary.span_count,
                summary.duration_string().unwrap_or_default(),
            ),
            None => println!(
                "  {}  <root span not received>  {} spans",
                summary.trace_id, summary.span_count,
            ),
        }
    }
}

fn show_trace(trace: &TraceInput, settings: &Settings, show_details: bool) -> Result<()> {
    let forest = build_forest(&trace.spans)?;
    let ordered = order_spans(&forest)?;
    let bounds = compute_bounds(&trace.spans);
    if forest.ghost_count() > 0 {
        warn!(
            trace_id = %trace.trace_id,
            missing = forest.ghost_count(),
            "trace has missing spans"
        );
    }

    let mut view_state = ViewState::new();
    view_state.select_default(&ordered);
    let rows = build_waterfall(&ordered, bounds, &view_state);

    print_trace_header(&trace.trace_id, bounds, settings);
    for row in &rows {
        if row.status == SpanStatus::Missing && !settings.show_missing_spans {
            continue;
        }
        println!("{}", format_row(row, settings));
    }

    if show_details {
        if let Some(span) = rows
            .iter()
            .find(|row| row.selected)
            .and_then(|row| row.span)
        {
            println!();
            println!("{}", stringify_span(span));
        }
    }
    Ok(())
}

fn print_trace_header(trace_id: &str, bounds: TraceBounds, settings: &Settings) {
    let duration =
        duration_string(Some(bounds.start_time), Some(bounds.end_time)).unwrap_or_default();
    if settings.show_timestamps {
        println!(
            "Trace {trace_id}  {} .. {}  ({duration})",
            time_point_to_utc_string(bounds.start_time),
            time_point_to_utc_string(bounds.end_time),
        );
    } else {
        println!("Trace {trace_id}  ({duration})");
    }
}

fn format_row(row: &WaterfallRow, settings: &Settings) -> String {
    let marker = match (row.has_children, row.collapsed) {
        (false, _) => ' ',
        (true, false) => '-',
        (true, true) => '+',
    };
    let selection = if row.selected { '>' } else { ' ' };
    let label = match row.name() {
        Some(name) => format!("{name} [{}]", row.service_name().unwrap_or_default()),
        None => format!("<missing span {}>", row.span_id),
    };
    let label: String = format!("{}{marker} {label}", "  ".repeat(row.depth))
        .chars()
        .take(settings.name_width)
        .collect();

    format!(
        "{selection}{label:<width$} |{}| {}",
        draw_bar(row, settings.bar_width),
        row.duration.as_deref().unwrap_or(""),
        width = settings.name_width,
    )
}

fn draw_bar(row: &WaterfallRow, bar_width: usize) -> String {
    let mut cells = vec![' '; bar_width];
    if row.status == SpanStatus::Missing || bar_width == 0 {
        return cells.into_iter().collect();
    }

    let to_cell = |percent: i64| -> usize {
        let percent = percent.clamp(0, 100) as usize;
        (percent * bar_width / 100).min(bar_width - 1)
    };
    let start = to_cell(row.offset_percent);
    let length = (row.width_percent.clamp(0, 100) as usize * bar_width / 100).max(1);
    for cell in cells.iter_mut().skip(start).take(length) {
        *cell = '=';
    }
    for &event_offset in &row.event_offsets {
        cells[to_cell(event_offset)] = '*';
    }

    cells.into_iter().collect()
}
