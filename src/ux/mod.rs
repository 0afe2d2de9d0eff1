use colored::Colorize;
use humansize::{format_size, DECIMAL};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

use crate::pipeline::CreatedDatapack;
use crate::prompt::VersionRuleSet;
use crate::wire::{ValidationResult, ValidationStatus};

/// Spinner on stderr while a backend call is in flight.
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

pub fn print_created(created: &CreatedDatapack, written_to: &Path) {
    println!(
        "\n{}",
        "┏━━━━━━━━━━━━━━━━━━━━━━━━ Datapack ━━━━━━━━━━━━━━━━━━━━━━━━┓".bold()
    );
    println!("  {}: {}", "Name".bold(), created.spec.name);
    println!("  {}: {}", "Id".bold(), created.id);
    println!(
        "  {}: {}   {}: {}   {}: {}",
        "Files".bold(),
        created.entries.len(),
        "Repairs".bold(),
        created.repair_attempts,
        "Size".bold(),
        format_size(created.archive.len(), DECIMAL)
    );
    println!("  {}: {}", "Validation".bold(), status_label(created.status));
    println!("{}", "┗━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━┛".bold());

    for path in &created.entries {
        println!("  {} {}", "+".green(), path);
    }
    if !created.errors.is_empty() {
        println!("\n{}", "Unresolved validation errors:".yellow().bold());
        print_errors(&created.errors);
    }
    if !created.spec.description.is_empty() {
        println!("\n{}", created.spec.description);
    }
    if !created.spec.install_instructions.is_empty() {
        println!("\n{}\n{}", "Install:".bold(), indent(&created.spec.install_instructions, 2));
    }
    println!("\nwrote {}", written_to.display().to_string().bold());
}

pub fn print_validation(result: &ValidationResult) {
    match result {
        ValidationResult::Valid => println!("{}", "valid".green().bold()),
        ValidationResult::Invalid(errors) => {
            println!("{} ({} error(s))", "invalid".red().bold(), errors.len());
            print_errors(errors);
        }
    }
}

pub fn print_versions(rules: &VersionRuleSet, default_version: &str) {
    for v in rules.versions() {
        let marker = if v.id == default_version { " (default)".dimmed().to_string() } else { String::new() };
        println!("{}  pack_format {}{}", v.id.bold(), v.pack_format, marker);
    }
}

fn status_label(status: ValidationStatus) -> colored::ColoredString {
    match status {
        ValidationStatus::Ok => status.as_str().green().bold(),
        ValidationStatus::Failed => status.as_str().red().bold(),
    }
}

fn print_errors(errors: &[String]) {
    for (i, e) in errors.iter().enumerate() {
        println!("  {}. {}", i + 1, e);
    }
}

fn indent(s: &str, n: usize) -> String {
    let pad = " ".repeat(n);
    s.lines()
        .map(|l| format!("{}{}", pad, l))
        .collect::<Vec<_>>()
        .join("\n")
}
