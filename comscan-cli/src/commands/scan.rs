//! Scan and discovery command implementations.

use anyhow::Result;
use comscan::{
    DetailLevel, Discovery, PortInspector, PortRecord, PresenceFilter, ScanReport,
    format::{detail_lines, format_port_table, summary_line},
    inspector::SourceOutcome,
};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;

use crate::{CliError, use_fancy_output};

/// Output switches shared by the scan commands.
#[derive(Debug, Clone, Copy)]
pub(crate) struct OutputOptions {
    pub json: bool,
    pub quiet: bool,
    pub progress: bool,
}

impl OutputOptions {
    fn show_progress(self) -> bool {
        self.progress && !self.json && !self.quiet && use_fancy_output()
    }
}

fn progress_bar(options: OutputOptions) -> ProgressBar {
    if !options.show_progress() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(100);
    #[allow(clippy::unwrap_used)] // Static template string
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
    pb.set_message("scanning");
    pb
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn run_scan(
    inspector: &PortInspector,
    detail: DetailLevel,
    filter: PresenceFilter,
    options: OutputOptions,
) -> ScanReport {
    let pb = progress_bar(options);
    let report = inspector.scan_report(
        detail,
        filter,
        Some(&mut |percent: f64| pb.set_position(percent.round() as u64)),
    );
    pb.finish_and_clear();

    debug!(
        "Scan finished: {}/{} port(s) processed, {} returned",
        report.processed_count,
        report.total_targets,
        report.records.len()
    );
    report
}

fn print_json(data: &serde_json::Value) -> Result<()> {
    let output = serde_json::json!({
        "ok": true,
        "data": data,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&output)?
    );
    Ok(())
}

fn print_header(title: &str, options: OutputOptions) {
    if !options.quiet {
        eprintln!(
            "{}",
            style(title)
                .bold()
                .underlined()
        );
    }
}

fn finish(report: &ScanReport) -> Result<()> {
    if report.interrupted {
        return Err(CliError::Cancelled(format!(
            "scan interrupted after {} of {} port(s)",
            report.processed_count, report.total_targets
        ))
        .into());
    }
    Ok(())
}

/// List ports at summary level, filtered on presence.
pub(crate) fn cmd_summary(
    inspector: &PortInspector,
    filter: PresenceFilter,
    options: OutputOptions,
) -> Result<()> {
    let report = run_scan(inspector, DetailLevel::Summary, filter, options);
    let summaries: Vec<_> = report
        .records
        .iter()
        .map(PortRecord::summary)
        .collect();

    if options.json {
        print_json(&serde_json::json!({
            "ports": summaries,
            "interrupted": report.interrupted,
        }))?;
        return finish(&report);
    }

    print_header(
        match filter {
            PresenceFilter::Present => "Present ports",
            PresenceFilter::Absent => "Absent ports",
            PresenceFilter::All => "Ports",
        },
        options,
    );

    if summaries.is_empty() {
        if !options.quiet {
            eprintln!("  {}", style("No ports found").dim());
        }
    } else {
        for summary in &summaries {
            let marker = if summary.is_present {
                style("•").green()
            } else {
                style("•").dim()
            };
            println!("  {marker} {}", summary_line(summary));
        }
    }

    finish(&report)
}

/// List every port with full details.
pub(crate) fn cmd_all(inspector: &PortInspector, long: bool, options: OutputOptions) -> Result<()> {
    let report = run_scan(inspector, DetailLevel::Detailed, PresenceFilter::All, options);
    let details: Vec<_> = report
        .records
        .iter()
        .map(PortRecord::details)
        .collect();

    if options.json {
        print_json(&serde_json::json!({
            "ports": details,
            "interrupted": report.interrupted,
        }))?;
        return finish(&report);
    }

    print_header("All ports", options);

    if details.is_empty() {
        if !options.quiet {
            eprintln!("  {}", style("No ports found").dim());
        }
        return finish(&report);
    }

    if !long {
        for line in format_port_table(&details) {
            println!("  {line}");
        }
        return finish(&report);
    }

    for (record, port) in report
        .records
        .iter()
        .zip(&details)
    {
        let mut lines = detail_lines(port).into_iter();
        if let Some(header) = lines.next() {
            println!("{}", style(header).cyan().bold());
        }
        for line in lines {
            println!("{line}");
        }
        for (subsystem, reason) in record.report().degraded() {
            println!(
                "  {} {}: {}",
                style("!").yellow(),
                subsystem.name(),
                style(reason).dim()
            );
        }
        println!();
    }

    finish(&report)
}

fn source_json(outcome: &SourceOutcome) -> serde_json::Value {
    match outcome {
        Ok(count) => serde_json::json!({ "ok": true, "count": count }),
        Err(reason) => serde_json::json!({ "ok": false, "reason": reason.to_string() }),
    }
}

fn source_line(label: &str, outcome: Option<&SourceOutcome>) -> String {
    match outcome {
        None => format!("{label}: {}", style("disabled").dim()),
        Some(Ok(count)) => format!("{label}: {count} port(s)"),
        Some(Err(reason)) => format!("{label}: {}", style(reason).yellow()),
    }
}

/// Discover identifiers only.
pub(crate) fn cmd_discover(inspector: &PortInspector, options: OutputOptions) -> Result<()> {
    let Discovery {
        identifiers,
        device_query,
        fallback,
        ignored,
    } = inspector.discover();

    if options.json {
        return print_json(&serde_json::json!({
            "ports": identifiers,
            "sources": {
                "device_query": source_json(&device_query),
                "fallback": fallback.as_ref().map(source_json),
            },
            "ignored": ignored,
        }));
    }

    print_header("Discovered ports", options);
    for id in &identifiers {
        println!("  {} {}", style("•").green(), style(id).cyan());
    }
    if identifiers.is_empty() && !options.quiet {
        eprintln!("  {}", style("No ports found").dim());
    }

    if !options.quiet {
        eprintln!();
        eprintln!("  {}", source_line("device inventory", Some(&device_query)));
        eprintln!("  {}", source_line("fallback command", fallback.as_ref()));
        if ignored > 0 {
            eprintln!("  ignored: {ignored}");
        }
    }

    Ok(())
}
