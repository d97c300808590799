use crate::analyzer::{total_series, AnalysisReport, GroupKey, KeySection};
use crate::store::{AggregateRow, Granularity, Series, Timeline};
use chrono::DateTime;
use colored::{ColoredString, Colorize};
use std::io;
use std::path::Path;

const SEPARATOR: &str =
    "════════════════════════════════════════════════════════════════════════════════════════════════════════";
const THIN_SEP: &str =
    "────────────────────────────────────────────────────────────────────────────────────────────────────────";

const NAME_WIDTH: usize = 32;
const CELL_WIDTH: usize = 10;
const SPARK_WIDTH: usize = 72;
const SPARKS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Presentation switches
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    /// Collapse every timeline into a single `Total` series
    pub show_totals: bool,
}

/// Print a fully formatted analysis report to stdout
pub fn print_report(report: &AnalysisReport, source: &Path, options: RenderOptions) {
    println!("\n{}", SEPARATOR.cyan().bold());
    println!("{}", "  📦  ROUTER REQUEST REPORT".white().bold());
    println!("{}", SEPARATOR.cyan().bold());
    println!("  Source : {}", source.display().to_string().yellow());
    println!();

    // ── Overview ──────────────────────────────────────────────────────────────
    section_header("OVERVIEW");
    println!("  {:<28} {:>12}", "Records indexed:", report.ingest.accepted.to_string().green().bold());
    println!("  {:<28} {:>12}", "Duplicates skipped:", report.ingest.skipped_duplicate);
    println!("  {:<28} {:>12}", "Self traffic filtered:", report.ingest.skipped_filtered);
    println!("  {:<28} {:>12}", "Total downloaded:", format_bytes(report.total_bytes));
    println!();

    for section in &report.sections {
        print_section(section, report.top_n);
        if let Some(timeline) = &section.timeline {
            print_timeline(section.key, timeline, report.interval_seconds, report.top_n, options);
        }
    }

    println!("{}\n", SEPARATOR.cyan());
}

/// Export the analysis report as JSON to the given path
pub fn export_json(report: &AnalysisReport, path: &Path) -> Result<(), io::Error> {
    let json = serde_json::to_string_pretty(report).map_err(|e| {
        io::Error::new(io::ErrorKind::InvalidData, format!("serialization failed: {}", e))
    })?;
    std::fs::write(path, json)
}

fn print_section(section: &KeySection, limit: usize) {
    section_header(&format!("{} STATS", section.key.label().to_uppercase()));
    if section.rows.is_empty() {
        println!("  (no data)\n");
        return;
    }

    let mut header = format!("  {:<width$}", section.key.label(), width = NAME_WIDTH);
    for column in [
        "Total Reqs",
        "Total Down",
        "Peak Req/1s",
        "Peak Req/1m",
        "Peak Req/1h",
        "Peak Down/1s",
        "Peak Down/1m",
        "Peak Down/1h",
    ] {
        header.push_str(&format!(" {:>width$}", column, width = CELL_WIDTH + 2));
    }
    println!("{}", header.bold());
    println!("  {}", THIN_SEP);

    let total_requests = section.rows.iter().map(|r| r.requests).fold(0, u64::saturating_add);
    let total_bytes = section
        .rows
        .iter()
        .filter_map(|r| r.bytes)
        .reduce(u64::saturating_add);
    println!(
        "  {:<width$} {:>cell$} {:>cell$}",
        "Total".bold(),
        format_num(Some(total_requests)),
        format_bytes(total_bytes),
        width = NAME_WIDTH,
        cell = CELL_WIDTH + 2
    );

    let mut rows: Vec<&AggregateRow> = section.rows.iter().collect();
    if section.key == GroupKey::RequestPath {
        rows.sort_by(|a, b| b.bytes.cmp(&a.bytes).then(a.value.cmp(&b.value)));
    }
    for row in rows.iter().take(limit) {
        let mut line = format!("  {:<width$}", truncate(&row.value), width = NAME_WIDTH);
        line.push_str(&format!(" {:>cell$}", format_num(Some(row.requests)), cell = CELL_WIDTH + 2));
        line.push_str(&format!(" {:>cell$}", format_bytes(row.bytes), cell = CELL_WIDTH + 2));
        for granularity in Granularity::ALL {
            line.push_str(&format!(
                " {:>cell$}",
                format_num(Some(row.peak_requests.get(granularity))),
                cell = CELL_WIDTH + 2
            ));
        }
        for granularity in Granularity::ALL {
            line.push_str(&format!(
                " {:>cell$}",
                format_bytes(row.peak_bytes.map(|p| p.get(granularity))),
                cell = CELL_WIDTH + 2
            ));
        }
        println!("{}", line);
    }
    if rows.len() > limit {
        println!("  {}", format!("… {} more", rows.len() - limit).dimmed());
    }
    println!();
}

fn print_timeline(
    key: GroupKey,
    timeline: &Timeline,
    interval_seconds: u64,
    limit: usize,
    options: RenderOptions,
) {
    section_header(&format!(
        "{} TIMELINE — REQUESTS PER {}s",
        key.label().to_uppercase(),
        interval_seconds
    ));

    let series: Vec<(String, Series)> = if options.show_totals {
        total_series(timeline)
            .map(|s| vec![("Total".to_string(), s)])
            .unwrap_or_default()
    } else {
        let mut ranked: Vec<(&String, &Series)> = timeline.iter().collect();
        ranked.sort_by(|a, b| {
            let total = |s: &Series| s.counts.iter().sum::<u64>();
            total(b.1).cmp(&total(a.1)).then(a.0.cmp(b.0))
        });
        ranked
            .into_iter()
            .take(limit)
            .map(|(name, s)| (name.clone(), s.clone()))
            .collect()
    };

    let Some((_, first)) = series.first() else {
        println!("  (no data)\n");
        return;
    };
    if let (Some(start), Some(end)) = (first.buckets.first(), first.buckets.last()) {
        println!(
            "  {} → {} UTC",
            format_epoch(*start).dimmed(),
            format_epoch(*end + interval_seconds as i64).dimmed()
        );
    }

    for (name, s) in &series {
        let peak = s.counts.iter().max().copied().unwrap_or(0);
        println!(
            "  {:<width$} {} {:>8}",
            truncate(name).cyan(),
            sparkline(&squeeze(&s.counts, SPARK_WIDTH)).green(),
            format_num(Some(peak)),
            width = NAME_WIDTH
        );
    }
    println!();
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn section_header(title: &str) {
    println!("  {} {}", "▶".cyan(), title.white().bold());
    println!("  {}", THIN_SEP);
}

fn truncate(value: &str) -> String {
    let display = if value.is_empty() { "(none)" } else { value };
    if display.chars().count() > NAME_WIDTH {
        let head: String = display.chars().take(NAME_WIDTH - 1).collect();
        format!("{}…", head)
    } else {
        display.to_string()
    }
}

fn format_epoch(epoch: i64) -> String {
    DateTime::from_timestamp(epoch, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| epoch.to_string())
}

/// Counts scaled by 1000 with a `k`/`M`/`B` suffix.
fn human_num(num: u64) -> String {
    let mut value = num as f64;
    let mut suffix = "";
    for next in ["k", "M", "B"] {
        if value > 1000.0 {
            value /= 1000.0;
            suffix = next;
        }
    }
    format!("{:.2}{}", value, suffix)
}

/// Sizes scaled by 1024 with a `kB`/`MB`/`GB`/`TB` suffix.
fn human_bytes(num: u64) -> String {
    let mut value = num as f64;
    let mut suffix = "";
    for next in ["kB", "MB", "GB", "TB"] {
        if value > 1024.0 {
            value /= 1024.0;
            suffix = next;
        }
    }
    format!("{:.2}{}", value, suffix)
}

/// Colorize a count by magnitude
fn format_num(num: Option<u64>) -> ColoredString {
    let Some(num) = num else {
        return "N/A".dimmed();
    };
    let text = human_num(num);
    match num {
        0..=1_000 => text.bright_black(),
        1_001..=1_000_000 => text.normal(),
        1_000_001..=1_000_000_000 => text.white().bold(),
        _ => text.red().bold(),
    }
}

/// Colorize a byte size by magnitude
fn format_bytes(num: Option<u64>) -> ColoredString {
    const MB: u64 = 1024 * 1024;
    const GB: u64 = 1024 * MB;
    let Some(num) = num else {
        return "N/A".dimmed();
    };
    let text = human_bytes(num);
    match num {
        0..=MB => text.dimmed(),
        n if n <= GB => text.bright_black(),
        n if n <= 10 * GB => text.normal(),
        n if n <= 1024 * GB => text.white().bold(),
        _ => text.red().bold(),
    }
}

/// Sum adjacent buckets so at most `width` remain.
fn squeeze(counts: &[u64], width: usize) -> Vec<u64> {
    if width == 0 || counts.len() <= width {
        return counts.to_vec();
    }
    let chunk = counts.len().div_ceil(width);
    counts.chunks(chunk).map(|c| c.iter().sum()).collect()
}

/// One block character per value, scaled to the largest value; zero is blank.
fn sparkline(counts: &[u64]) -> String {
    let max = counts.iter().max().copied().unwrap_or(0);
    counts
        .iter()
        .map(|&c| {
            if c == 0 {
                ' '
            } else {
                let idx = ((c * (SPARKS.len() as u64 - 1)) / max) as usize;
                SPARKS[idx]
            }
        })
        .collect()
}
