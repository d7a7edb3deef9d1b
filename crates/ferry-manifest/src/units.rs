//! Memory and disk quantities
//!
//! Quantities are stored as megabytes. Text values accept a `G`, `GB`, `M`
//! or `MB` suffix in any case. A bare number is already megabytes.

use crate::document::Node;
use tracing::warn;

const GIBI: u32 = 1_024;

/// Parse a textual quantity into megabytes.
///
/// Returns `None` when the numeric part is malformed. An unrecognised
/// suffix yields `Some(0)`, matching how platforms historically read such
/// values; a warning is logged so the under-provisioning is visible.
pub fn parse_megabytes(raw: &str) -> Option<u32> {
    let text = raw.trim().to_ascii_uppercase();

    if let Ok(megabytes) = text.parse::<u32>() {
        return Some(megabytes);
    }

    let (digits, factor) = if let Some(digits) = text.strip_suffix("GB") {
        (digits, GIBI)
    } else if let Some(digits) = text.strip_suffix('G') {
        (digits, GIBI)
    } else if let Some(digits) = text.strip_suffix("MB") {
        (digits, 1)
    } else if let Some(digits) = text.strip_suffix('M') {
        (digits, 1)
    } else {
        warn!(value = %raw, "Unrecognised quantity suffix, treating as 0");
        return Some(0);
    };

    digits.trim().parse::<u32>().ok()?.checked_mul(factor)
}

/// Quantity node into megabytes; non-numeric scalars count as 0
pub fn node_megabytes(node: &Node) -> Option<u32> {
    match node {
        Node::Integer(i) => u32::try_from(*i).ok(),
        Node::String(s) => parse_megabytes(s),
        _ => Some(0),
    }
}

/// Render megabytes with the `M` suffix
pub fn format_megabytes(megabytes: u32) -> String {
    format!("{}M", megabytes)
}
