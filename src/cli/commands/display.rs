//! Console output for result records.

use console::style;

use crate::environment::{OutputLine, OutputStream, ProcessSnapshot};
use crate::utils::{format_uptime, truncate};

pub fn print_step(label: &str) {
    println!("{} {}", style("◐").cyan(), style(label).dim());
}

/// Print messages dimmed and errors in red, then a one-line verdict.
pub fn print_outcome(success: bool, done: &str, messages: &[String], errors: &[String]) {
    for message in messages {
        if message.starts_with("Warning:") {
            println!("  {} {}", style("!").yellow().bold(), message);
        } else {
            println!("  {}", style(message).dim());
        }
    }
    for error in errors {
        println!("  {} {}", style("✕").red(), style(error).red());
    }

    println!();
    if success {
        println!("{} {}", style("✓").green().bold(), style(done).green());
    } else {
        println!("{} {}", style("✕").red().bold(), style("Failed").red().bold());
    }
}

pub fn print_line(line: &OutputLine) {
    match line.stream {
        OutputStream::Stdout => println!("  {}", line.text),
        OutputStream::Stderr => println!("  {}", style(&line.text).yellow()),
    }
}

pub fn print_processes(processes: &[ProcessSnapshot]) {
    if processes.is_empty() {
        println!("  {}", style("No tracked processes").dim());
        return;
    }

    println!(
        "  {:<12} {:<24} {:>8}  {}",
        style("KIND").dim(),
        style("LECTURE").dim(),
        style("PID").dim(),
        style("UPTIME").dim()
    );
    for process in processes {
        let pid = process
            .pid
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<12} {:<24} {:>8}  {}",
            process.kind.to_string(),
            truncate(&process.lecture_id, 24),
            pid,
            format_uptime(process.uptime_seconds)
        );
    }
}
