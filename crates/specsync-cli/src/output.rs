//! Terminal rendering of engine and validator results

use colored::Colorize;
use specsync_core::{GenerationReport, OutcomeStatus, TemplateOutcome, ValidationReport};

pub fn print_outcome(outcome: &TemplateOutcome) {
    match outcome.status {
        OutcomeStatus::Success => {
            let output = outcome.output.as_deref().unwrap_or("-");
            println!(
                "{} {} -> {} ({} field(s))",
                "✓".green(),
                outcome.template,
                output,
                outcome.replaced.len()
            );
        }
        OutcomeStatus::Skipped => {
            println!("{} {} (no tokens)", "-".yellow(), outcome.template);
        }
        OutcomeStatus::Error => {
            println!(
                "{} {}: {}",
                "✗".red(),
                outcome.template,
                outcome.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    for key in &outcome.missing {
        println!("    {} no SSOT value for {}", "!".yellow(), key);
    }
    for marker in &outcome.unmatched {
        println!("    {} marker not in template: {}", "!".yellow(), marker);
    }
}

pub fn print_summary(report: &GenerationReport) {
    println!();
    println!(
        "{} succeeded, {} skipped, {} failed",
        report.succeeded(),
        report.skipped(),
        report.failed()
    );
}

pub fn print_generation(report: &GenerationReport) {
    for outcome in &report.outcomes {
        print_outcome(outcome);
    }
    print_summary(report);
}

pub fn print_validation(report: &ValidationReport) {
    for doc in &report.checked {
        println!("  checked {} ({})", doc.template, doc.path.display());
    }
    for item in &report.unverifiable {
        println!(
            "  {} {}: no SSOT value for {}, not checked",
            "!".yellow(),
            item.template,
            item.key
        );
    }
    if report.passed() {
        println!("{} all documents match the SSOT", "✓".green());
    } else {
        for message in report.messages() {
            println!("{} {}", "✗".red(), message);
        }
        println!(
            "{} discrepancy(ies) found",
            report.discrepancies.len().to_string().red().bold()
        );
    }
}
