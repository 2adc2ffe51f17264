//! CLI output formatting utilities.
//!
//! Provides consistent formatting for terminal output: colored status
//! messages, section headings and labelled values.

use owo_colors::{OwoColorize, Stream};

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

/// Print a section heading framed by rules of the same width.
pub fn print_heading(title: &str) {
  let rule = format_rule(title);
  println!("{}", rule.if_supports_color(Stream::Stdout, |s| s.dimmed()));
  println!("{}", title.if_supports_color(Stream::Stdout, |s| s.bold()));
  println!("{}", rule.if_supports_color(Stream::Stdout, |s| s.dimmed()));
}

/// Print one item of a list, e.g. a tag.
pub fn print_item(item: &str) {
  println!(
    "  {} {}",
    symbols::ARROW.if_supports_color(Stream::Stdout, |s| s.cyan()),
    item
  );
}

fn format_rule(title: &str) -> String {
  "-".repeat(title.chars().count().max(20))
}
