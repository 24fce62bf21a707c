//! Poison markers and watermarked rasterization.
//!
//! Two anti-extraction artifacts for question text:
//!
//! - [`PoisonMarker`] embeds a trap word that is invisible on screen but lands
//!   in the clipboard when the whole question is copied. [`PoisonMarker::detect_in`]
//!   is the deterministic check that finds it in an answer.
//! - [`WatermarkedRenderer`] lays the question out as pixels only (no
//!   selectable text) and scatters faint `ID:<id>` stamps over it. The layout
//!   is computed here against a [`TextMeasure`]; painting is left to the
//!   surface (canvas in the browser).
//!
//! Only noise placement is random. Word wrap and the marker check do not touch
//! the RNG.

use std::fmt;

use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Trap word configured on the grading backend.
pub const DEFAULT_TRAP_WORD: &str = "Cyberdyne";

const TRAP_STYLE: &str = "font-size:0;opacity:0;position:absolute";

// ---------------------------------------------------------------------------
// HTML escaping
// ---------------------------------------------------------------------------

/// Escape text for use inside HTML element content or a quoted attribute.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Poison marker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoisonMarker {
    word: String,
}

impl Default for PoisonMarker {
    fn default() -> Self {
        Self::new(DEFAULT_TRAP_WORD)
    }
}

impl PoisonMarker {
    pub fn new(word: impl Into<String>) -> Self {
        Self { word: word.into() }
    }

    pub fn word(&self) -> &str {
        &self.word
    }

    /// Question heading with the trap word in a zero-size span after the text.
    pub fn poisoned_question_html(&self, question: &str) -> String {
        format!(
            r#"<h3 class="poisoned-question">{}<span style="{}"> {} </span></h3>"#,
            escape_html(question),
            TRAP_STYLE,
            escape_html(&self.word),
        )
    }

    /// What the clipboard holds after copying the whole rendered question.
    pub fn clipboard_text(&self, question: &str) -> String {
        format!("{question} {} ", self.word)
    }

    /// Case-insensitive presence of the trap word.
    pub fn detect_in(&self, text: &str) -> bool {
        if self.word.is_empty() {
            return false;
        }
        text.to_lowercase().contains(&self.word.to_lowercase())
    }
}

// ---------------------------------------------------------------------------
// Watermark identifier
// ---------------------------------------------------------------------------

/// Per-rendering identifier stamped into rasterized questions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct WatermarkId(String);

impl WatermarkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// 12 hex digits of SHA-256 over the principal, exam, question and a
    /// per-render nonce.
    pub fn derive(principal_id: i64, exam_id: &str, question_id: &str, nonce: &str) -> Self {
        let mut h = Sha256::new();
        h.update(principal_id.to_le_bytes());
        for part in [exam_id, question_id, nonce] {
            h.update((part.len() as u64).to_le_bytes());
            h.update(part.as_bytes());
        }
        let digest = h.finalize();
        Self(digest[..6].iter().map(|b| format!("{b:02x}")).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Text of one noise stamp.
    pub fn label(&self) -> String {
        format!("ID:{}", self.0)
    }
}

impl fmt::Display for WatermarkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Width of rendered text in surface units.
pub trait TextMeasure {
    fn width(&self, text: &str) -> f64;
}

/// Fixed advance per character. Used off-canvas.
#[derive(Debug, Clone, Copy)]
pub struct MonospaceMeasure {
    pub advance: f64,
}

impl Default for MonospaceMeasure {
    fn default() -> Self {
        // 16px text at roughly 0.55em per glyph.
        Self { advance: 8.8 }
    }
}

impl TextMeasure for MonospaceMeasure {
    fn width(&self, text: &str) -> f64 {
        text.chars().count() as f64 * self.advance
    }
}

/// Greedy word wrap on single spaces.
///
/// A word moves to the next line when appending it would exceed `max_width`,
/// unless it is the first word. A single over-long word keeps its own line.
pub fn wrap_lines(text: &str, max_width: f64, measure: &impl TextMeasure) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for (n, word) in text.split(' ').enumerate() {
        let candidate = format!("{line}{word} ");
        if n > 0 && measure.width(&candidate) > max_width {
            lines.push(line.trim_end().to_string());
            line = format!("{word} ");
        } else {
            line = candidate;
        }
    }
    lines.push(line.trim_end().to_string());
    lines
}

#[derive(Debug, Clone, PartialEq)]
pub struct RasterStyle {
    pub text_font: String,
    pub text_fill: String,
    pub padding: f64,
    pub line_height: f64,
    pub noise_font: String,
    pub noise_fill: String,
    pub noise_stamps: usize,
}

impl Default for RasterStyle {
    fn default() -> Self {
        Self {
            text_font: "16px Inter, sans-serif".into(),
            text_fill: "#1e293b".into(),
            padding: 20.0,
            line_height: 28.0,
            noise_font: "10px monospace".into(),
            noise_fill: "rgba(0,0,0,0.03)".into(),
            noise_stamps: 5,
        }
    }
}

/// A string drawn at a surface position (top baseline).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedText {
    pub text: String,
    pub x: f64,
    pub y: f64,
}

/// Everything a surface needs to paint one watermarked question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RasterPlan {
    pub width: f64,
    pub height: f64,
    pub text_font: String,
    pub text_fill: String,
    pub lines: Vec<PlacedText>,
    pub noise_font: String,
    pub noise_fill: String,
    pub noise: Vec<PlacedText>,
}

#[derive(Debug, Clone, Default)]
pub struct WatermarkedRenderer {
    style: RasterStyle,
}

impl WatermarkedRenderer {
    pub fn new(style: RasterStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &RasterStyle {
        &self.style
    }

    /// Lay out `text` on a `width` x `height` surface and scatter noise stamps.
    pub fn plan(
        &self,
        text: &str,
        id: &WatermarkId,
        width: f64,
        height: f64,
        measure: &impl TextMeasure,
        rng: &mut impl Rng,
    ) -> RasterPlan {
        let s = &self.style;
        let max_width = (width - 2.0 * s.padding).max(0.0);
        let lines = wrap_lines(text, max_width, measure)
            .into_iter()
            .enumerate()
            .map(|(i, line)| PlacedText {
                text: line,
                x: s.padding,
                y: s.padding + i as f64 * s.line_height,
            })
            .collect();

        let label = id.label();
        let noise = (0..s.noise_stamps)
            .map(|_| PlacedText {
                text: label.clone(),
                x: rng.random::<f64>() * width.max(0.0),
                y: rng.random::<f64>() * height.max(0.0),
            })
            .collect();

        RasterPlan {
            width,
            height,
            text_font: s.text_font.clone(),
            text_fill: s.text_fill.clone(),
            lines,
            noise_font: s.noise_font.clone(),
            noise_fill: s.noise_fill.clone(),
            noise,
        }
    }
}
