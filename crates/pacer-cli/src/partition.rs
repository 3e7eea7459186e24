//! Partition command implementation for Pacer CLI.
//!
//! Shows how a program file would be split into setup and loop code.

use std::path::Path;

use pacer_core::PartitionResult;

use crate::colors;

/// Partition a program file and print the result.
pub fn execute(file: &Path, debug_level: u8, raw: bool, json: bool) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(file)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", file.display(), e))?;

    let result = if raw {
        pacer_core::partition(&text)
    } else {
        pacer_core::partition::split(&text, debug_level)
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    Ok(())
}

fn print_result(result: &PartitionResult) {
    if let Some(token) = result.directive.token() {
        println!("{}Directive{} {}", colors::BOLD, colors::RESET, token);
        return;
    }

    if !result.header_valid {
        println!(
            "{}Header unreadable: defaults applied{}",
            colors::YELLOW,
            colors::RESET
        );
    }
    println!("{}Debug level{} {}", colors::BOLD, colors::RESET, result.debug_level);

    print_section("Setup", &result.setup_code);
    print_section("Loop", &result.loop_code);
}

fn print_section(title: &str, code: &str) {
    println!("\n{}{}{}", colors::BOLD, title, colors::RESET);
    println!("{}", "─".repeat(50));
    if code.is_empty() {
        println!("{}(empty){}", colors::DIM, colors::RESET);
    } else {
        print!("{}", code);
        if !code.ends_with('\n') {
            println!();
        }
    }
}
