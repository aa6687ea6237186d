//! Terminal output for the `kc` commands.
//!
//! Status lines go to stderr when they report a problem so that `--output
//! json` stays machine-readable on stdout.

use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use crate::config::OutputFormat;

/// Green check line.
pub fn success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Red cross line on stderr.
pub fn error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Yellow warning line on stderr.
pub fn warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), message);
}

/// Blue note line.
pub fn info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Renders rows as a rounded table, or as a JSON array.
///
/// ## Errors
///
/// Returns an error if JSON serialization fails.
pub fn output<T: Tabled + serde::Serialize>(
    data: &[T],
    format: OutputFormat,
) -> crate::CliResult<()> {
    match format {
        OutputFormat::Table => {
            if data.is_empty() {
                info("nothing to show");
            } else {
                let table = Table::new(data).with(Style::rounded()).to_string();
                println!("{table}");
            }
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(data)?;
            println!("{json}");
        }
    }
    Ok(())
}

/// Renders one record as indented `key: value` lines, or as JSON.
///
/// ## Errors
///
/// Returns an error if JSON serialization fails.
pub fn output_single<T: serde::Serialize>(item: &T, format: OutputFormat) -> crate::CliResult<()> {
    match format {
        OutputFormat::Table => {
            let json = serde_json::to_value(item)?;
            print_value(&json, 0);
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(item)?;
            println!("{json}");
        }
    }
    Ok(())
}

/// Prints a JSON value as indented `key: value` lines.
fn print_value(value: &serde_json::Value, indent: usize) {
    let prefix = "  ".repeat(indent);

    match value {
        serde_json::Value::Array(arr) => {
            for item in arr {
                if item.is_object() || item.is_array() {
                    println!("{prefix}-");
                    print_value(item, indent + 1);
                } else {
                    println!("{prefix}- {}", scalar(item));
                }
            }
        }
        serde_json::Value::Object(map) => {
            for (key, val) in map {
                if val.is_object() || val.is_array() {
                    println!("{prefix}{}:", key.bold());
                    print_value(val, indent + 1);
                } else {
                    println!("{prefix}{}: {}", key.bold(), scalar(val));
                }
            }
        }
        other => println!("{prefix}{}", scalar(other)),
    }
}

fn scalar(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
