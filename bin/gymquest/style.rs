//! Terminal styling for CLI output

/// ANSI color codes
pub mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";

    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const MAGENTA: &str = "\x1b[35m";
    pub const CYAN: &str = "\x1b[36m";
    pub const WHITE: &str = "\x1b[37m";
    pub const GRAY: &str = "\x1b[90m";
}

use colors::*;
use gymquest::{ChallengeStatus, Rank};

pub fn style_dim(s: &str) -> String {
    format!("{}{}{}", DIM, s, RESET)
}

pub fn icon_success() -> String {
    format!("{}✓{}", GREEN, RESET)
}

pub fn icon_error() -> String {
    format!("{}✗{}", RED, RESET)
}

pub fn icon_info() -> String {
    format!("{}ℹ{}", CYAN, RESET)
}

pub fn print_success(msg: &str) {
    println!("{} {}", icon_success(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}{}{}", icon_error(), RED, msg, RESET);
}

pub fn print_info(msg: &str) {
    println!("{} {}", icon_info(), msg);
}

pub fn print_header(title: &str) {
    println!();
    println!(
        "{}{} {} {}{}",
        BOLD,
        CYAN,
        title,
        "─".repeat(50usize.saturating_sub(title.chars().count())),
        RESET
    );
    println!();
}

pub fn print_section(title: &str) {
    println!();
    println!("  {}{}{}", BOLD, title, RESET);
    println!("  {}", style_dim(&"─".repeat(40)));
}

pub fn print_key_value(key: &str, value: &str) {
    println!("  {}{}:{} {}", GRAY, key, RESET, value);
}

pub fn print_key_value_colored(key: &str, value: &str, color: &str) {
    println!("  {}{}:{} {}{}{}", GRAY, key, RESET, color, value, RESET);
}

/// `progress` in [0, 1]
pub fn progress_bar(progress: f64, width: usize) -> String {
    let filled = ((progress.clamp(0.0, 1.0)) * width as f64) as usize;
    let empty = width - filled;

    format!(
        "{}{}{}{}{}",
        GREEN,
        "█".repeat(filled),
        GRAY,
        "░".repeat(empty),
        RESET
    )
}

pub fn rank_color(rank: Rank) -> &'static str {
    match rank {
        Rank::E => WHITE,
        Rank::D => GREEN,
        Rank::C => CYAN,
        Rank::B => YELLOW,
        Rank::A => MAGENTA,
        Rank::S => RED,
    }
}

pub fn status_color(status: ChallengeStatus) -> &'static str {
    match status {
        ChallengeStatus::Available => CYAN,
        ChallengeStatus::Active => YELLOW,
        ChallengeStatus::Completed => GREEN,
        ChallengeStatus::Claimed => GRAY,
        ChallengeStatus::Expired | ChallengeStatus::Abandoned => RED,
    }
}
