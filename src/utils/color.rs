//! Bucket colors.
//!
//! Buckets store colors as `#RRGGBB`. The command-line client also accepts a
//! few palette names which are converted here.

use once_cell::sync::Lazy;
use regex::Regex;

static HEX_COLOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#[0-9a-fA-F]{6}$").expect("hex color pattern"));

/// Check that a color is a `#RRGGBB` hex string.
#[must_use]
pub fn is_hex_color(color: &str) -> bool {
    HEX_COLOR.is_match(color)
}

/// Convert palette names to hex colors
#[must_use]
pub fn palette_color(name: &str) -> Option<&'static str> {
    match name.to_lowercase().as_str() {
        "red" => Some("#ef4444"),
        "orange" => Some("#f97316"),
        "amber" | "yellow" => Some("#f59e0b"),
        "green" => Some("#22c55e"),
        "teal" => Some("#14b8a6"),
        "blue" => Some("#3b82f6"),
        "violet" | "purple" => Some("#8b5cf6"),
        "pink" => Some("#ec4899"),
        "grey" | "gray" => Some("#6b7280"),
        _ => None,
    }
}

/// Normalize user input into a lower-case `#rrggbb` color.
///
/// Accepts hex colors (with or without the leading `#`) and palette names.
#[must_use]
pub fn normalize_color(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if let Some(hex) = palette_color(trimmed) {
        return Some(hex.to_string());
    }
    let candidate = if trimmed.starts_with('#') {
        trimmed.to_string()
    } else {
        format!("#{trimmed}")
    };
    is_hex_color(&candidate).then(|| candidate.to_lowercase())
}
