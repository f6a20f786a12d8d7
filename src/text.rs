//! Watermark text normalization and circular arc layout.
//!
//! Angles here are compass style: 0 degrees is straight up from the ring
//! center and angles grow clockwise. Text covers 270 degrees starting at
//! -135, which leaves the gap at the bottom of the ring.

use serde::{Deserialize, Serialize};

pub const DEFAULT_TEXT: &str = "I support AMIT Maurya";

/// Share of the full circle the text is spread over, in degrees.
pub const ARC_SPAN_DEG: f64 = 270.0;
pub const ARC_START_DEG: f64 = -ARC_SPAN_DEG / 2.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextPolicy {
    /// Used when the caller supplies no text.
    pub default_text: String,
    /// Replaces any text that reads as "support <name_token>".
    pub canonical_phrase: String,
    pub name_token: String,
}

impl Default for TextPolicy {
    fn default() -> Self {
        Self {
            default_text: DEFAULT_TEXT.to_string(),
            canonical_phrase: "#ISUPPORTAMIT".to_string(),
            name_token: "amit".to_string(),
        }
    }
}

/// Normalize caller text for the ring: upper-cased and hash-prefixed, or
/// the canonical phrase for a support message. Idempotent.
pub fn normalize(text: &str, policy: &TextPolicy) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let lower = trimmed.to_lowercase();
    let token = policy.name_token.trim().to_lowercase();
    if !token.is_empty() && lower.contains("support") && lower.contains(&token) {
        return policy.canonical_phrase.clone();
    }

    let upper = trimmed.to_uppercase();
    if upper.starts_with('#') {
        upper
    } else {
        format!("#{}", upper)
    }
}

/// Compass angle of each of `n` characters, `ARC_SPAN_DEG / n` apart.
pub fn arc_angles(n: usize) -> Vec<f64> {
    if n == 0 {
        return vec![];
    }
    let step = ARC_SPAN_DEG / n as f64;
    (0..n).map(|i| ARC_START_DEG + i as f64 * step).collect()
}

/// A character and the point on the ring it is centered on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlyphSlot {
    pub ch: char,
    pub angle_deg: f64,
    pub x: f64,
    pub y: f64,
}

/// Place each character of `text` on a circle of `radius` around `center`.
pub fn layout_arc(text: &str, center: (f64, f64), radius: f64) -> Vec<GlyphSlot> {
    let chars: Vec<char> = text.chars().collect();
    arc_angles(chars.len())
        .into_iter()
        .zip(chars)
        .map(|(angle_deg, ch)| {
            // image y grows downwards, so compass 0 sits at screen -90
            let theta = (angle_deg - 90.0).to_radians();
            GlyphSlot {
                ch,
                angle_deg,
                x: center.0 + radius * theta.cos(),
                y: center.1 + radius * theta.sin(),
            }
        })
        .collect()
}
