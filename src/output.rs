//! Colored status output and progress reporting.
//!
//! Direct generalization of the teacher's `core/output.rs`: `owo-colors` for
//! terminal colors (disabled via `REDPILL_NOCOLOR`), `indicatif` for
//! progress bars during fetch and build phases.

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::{OwoColorize, Style};
use std::sync::OnceLock;
use std::time::Duration;

fn color_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| std::env::var_os("REDPILL_NOCOLOR").is_none())
}

fn styled(s: &str, style: Style) -> String {
    if color_enabled() {
        s.style(style).to_string()
    } else {
        s.to_string()
    }
}

/// "==> Installing ripgrep"
pub fn action(message: &str) {
    println!(
        "{} {}",
        styled("==>", Style::new().blue().bold()),
        styled(message, Style::new().bold())
    );
}

/// "(1/5) Installing ripgrep"
pub fn action_numbered(current: usize, total: usize, message: &str) {
    println!(
        "{} {}",
        styled(&format!("({current}/{total})"), Style::new().cyan()),
        styled(message, Style::new().bold())
    );
}

/// "  -> acquire"
pub fn sub_action(phase: &str) {
    println!("  {} {}", styled("->", Style::new().cyan()), phase);
}

/// "     downloading https://..."
pub fn detail(message: &str) {
    println!("     {}", styled(message, Style::new().dimmed()));
}

/// "==> ripgrep installed"
pub fn success(message: &str) {
    println!(
        "{} {}",
        styled("==>", Style::new().green().bold()),
        styled(message, Style::new().green())
    );
}

pub fn info(message: &str) {
    println!("{} {}", styled("::", Style::new().cyan()), message);
}

pub fn warning(message: &str) {
    eprintln!(
        "{} {}",
        styled("warning:", Style::new().yellow().bold()),
        styled(message, Style::new().yellow())
    );
}

pub fn error(message: &str) {
    eprintln!(
        "{} {}",
        styled("error:", Style::new().red().bold()),
        styled(message, Style::new().red())
    );
}

/// "==> ripgrep already installed, skipping"
pub fn skip(message: &str) {
    println!("{} {}", styled("==>", Style::new().dimmed()), styled(message, Style::new().dimmed()));
}

/// A spinner for an indeterminate-length step (extraction, a build command).
pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("     {spinner:.cyan} {msg}")
            .unwrap()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// A byte-counted progress bar for a distfile download of known size.
pub fn download_progress(total_size: u64) -> ProgressBar {
    let pb = ProgressBar::new(total_size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("     {spinner:.cyan} [{bar:30.cyan/dim}] {bytes}/{total_bytes} ({eta})")
            .unwrap()
            .progress_chars("━╸━"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
