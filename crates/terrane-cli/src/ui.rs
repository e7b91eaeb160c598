//! Operator-facing diagnostics.

use colored::Colorize;

use terrane_common::{Error, ErrorCategory};

/// Categorised diagnostic with the suggested remediation, if any
pub fn format_error(err: &Error) -> String {
    let category = err.category();
    let label = format!("error[{}]", category);
    let label = match category {
        ErrorCategory::Precondition | ErrorCategory::Configuration => label.yellow().bold(),
        _ => label.red().bold(),
    };
    let mut out = format!("{} {}", label, err);
    if let Some(hint) = err.remediation() {
        out.push_str(&format!("\n  {} {}", "hint:".cyan().bold(), hint));
    }
    out
}

pub fn print_error(err: &Error) {
    eprintln!("{}", format_error(err));
}

pub fn print_warning(message: &str) {
    eprintln!("{} {}", "warning:".yellow().bold(), message);
}
