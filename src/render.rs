//! Human-readable execution summaries

use std::fmt::Write;

use colored::Colorize;

use crate::executor::ExecutionResult;
use crate::validation::{blank_figures, ContentStatus, Issue, Severity, ValidationReport};

fn severity_marker(severity: Severity) -> colored::ColoredString {
    match severity {
        Severity::Critical => "✗".red().bold(),
        Severity::Warning => "⚠".yellow(),
        Severity::Info => "ℹ".cyan(),
    }
}

fn push_issues<'a>(out: &mut String, issues: impl Iterator<Item = &'a Issue>) {
    for issue in issues {
        let _ = writeln!(
            out,
            "  {} [{}] {}",
            severity_marker(issue.severity),
            issue.severity.as_str().to_uppercase(),
            issue.message
        );
    }
}

fn push_streams(out: &mut String, result: &ExecutionResult, label: &str) {
    let stdout = result.stdout.trim_end();
    if !stdout.is_empty() {
        let _ = writeln!(out, "\n{}", label.cyan().bold());
        let _ = writeln!(out, "{}", stdout);
    }
    let stderr = result.stderr.trim_end();
    if !stderr.is_empty() {
        let _ = writeln!(out, "\n{}", "Errors/Warnings:".yellow().bold());
        let _ = writeln!(out, "{}", stderr);
    }
}

fn render_failure(result: &ExecutionResult) -> String {
    let mut out = String::new();
    let message = result.error.as_deref().unwrap_or("unknown error");
    let _ = writeln!(out, "{} {}", "✗ Execution failed:".red().bold(), message);

    if let Some(report) = &result.validation {
        let critical: Vec<&Issue> = report.critical_issues().collect();
        if !critical.is_empty() {
            let _ = writeln!(out, "\n{}", "Critical issues:".red().bold());
            push_issues(&mut out, critical.into_iter());
        } else if report.has_errors {
            // strict mode: warning-tier issues caused the failure
            let _ = writeln!(out, "\n{}", "Issues (strict mode):".red().bold());
            push_issues(
                &mut out,
                report.issues.iter().filter(|i| i.severity == Severity::Warning),
            );
        }
    }

    push_streams(&mut out, result, "Output before error:");
    out
}

fn push_report(out: &mut String, report: &ValidationReport) {
    if !report.warnings.is_empty() {
        let _ = writeln!(out, "\n{}", "MATLAB warnings:".yellow().bold());
        for warning in &report.warnings {
            if warning.id.is_empty() {
                let _ = writeln!(out, "  {} {}", severity_marker(warning.severity), warning.message);
            } else {
                let _ = writeln!(
                    out,
                    "  {} {} ({})",
                    severity_marker(warning.severity),
                    warning.message,
                    warning.id.dimmed()
                );
            }
        }
    }

    if !report.issues.is_empty() {
        let _ = writeln!(out, "\n{}", "Issues:".yellow().bold());
        push_issues(out, report.issues.iter());
    }

    if !report.figures.is_empty() {
        let _ = writeln!(out, "\n{}", "Figures:".cyan().bold());
        for figure in &report.figures {
            let summary = match figure.content {
                ContentStatus::HasContent => format!(
                    "{} axes, {} plot objects",
                    figure.axes_count.unwrap_or(0),
                    figure.plot_object_count.unwrap_or(0)
                )
                .green(),
                ContentStatus::Empty => "empty".yellow(),
                ContentStatus::Unknown => "not inspected".dimmed(),
            };
            let _ = writeln!(out, "  Figure {}: {}", figure.handle, summary);
        }

        let blank = blank_figures(report);
        if !blank.is_empty() {
            let list: Vec<String> = blank.iter().map(|h| h.to_string()).collect();
            let _ = writeln!(out, "  {} blank: {}", "⚠".yellow(), list.join(", "));
        }
    }
}

/// Summary of one execution for a person reading a terminal
pub fn render_execution(result: &ExecutionResult) -> String {
    if !result.success {
        return render_failure(result);
    }

    let mut out = String::new();
    if result.has_warnings {
        let _ = writeln!(out, "{}", "⚠ Execution completed with warnings".yellow().bold());
    } else {
        let _ = writeln!(out, "{}", "✓ Execution completed".green().bold());
    }

    let mut details = false;

    if result.figures_created > 0 {
        let _ = writeln!(out, "Created {} new figure(s)", result.figures_created);
        details = true;
    }

    if let Some(report) = &result.validation {
        let before = out.len();
        push_report(&mut out, report);
        details |= out.len() > before;
    }

    if let Some(positioned) = result.figures_positioned {
        let _ = writeln!(out, "\nRepositioned {} figure window(s)", positioned);
        details = true;
    }

    if let Some(path) = &result.script_saved {
        let _ = writeln!(out, "\n{} {}", "Script saved:".dimmed(), path.display());
        details = true;
    }

    let before = out.len();
    push_streams(&mut out, result, "Output:");
    details |= out.len() > before;

    if !details {
        let _ = writeln!(out, "{}", "(No output produced)".dimmed());
    }
    out
}
