//! Fonts for ring text.
//!
//! TrueType fonts are tried from a ranked list of paths; the first one that
//! parses is used. When none loads, the DejaVu Sans Bold face bundled into
//! the binary takes over.

use anyhow::{Context, Result};
use log::{debug, error, warn};
use once_cell::sync::Lazy;
use rusttype::{point, Font, Scale};
use std::fmt::Display;
use std::path::{Path, PathBuf};

/// Fonts tried when the configuration does not name any.
pub const DEFAULT_FONT_PATHS: [&str; 3] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
];

const BUNDLED_FONT_DATA: &[u8] = include_bytes!("../assets/fonts/DejaVuSans-Bold.ttf");

static BUNDLED_FONT: Lazy<Option<Font<'static>>> =
    Lazy::new(|| Font::try_from_bytes(BUNDLED_FONT_DATA));

/// Share of the font size used as a glyph's width and height when it cannot be measured.
const APPROX_GLYPH_FRACTION: f32 = 0.5;

/// Walk `candidates` in order and return the first that `load` accepts.
pub fn first_success<C, T, E, F>(candidates: impl IntoIterator<Item = C>, mut load: F) -> Option<(C, T)>
where
    E: Display,
    F: FnMut(&C) -> std::result::Result<T, E>,
{
    for candidate in candidates {
        match load(&candidate) {
            Ok(value) => return Some((candidate, value)),
            Err(e) => debug!("font candidate rejected: {}", e),
        }
    }
    None
}

pub fn load_truetype(path: &Path) -> Result<Font<'static>> {
    let bytes = std::fs::read(path).with_context(|| format!("reading font {}", path.display()))?;
    Font::try_from_vec(bytes)
        .ok_or_else(|| anyhow::anyhow!("{} is not a usable font", path.display()))
}

/// Text size for a band: half its width, kept within `[min, max]`.
pub fn font_size_for_band(band_width: u32, min: f32, max: f32) -> f32 {
    (band_width as f32 / 2.0).clamp(min, max.max(min))
}

/// Pixel box of a glyph relative to its drawing origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlyphBox {
    pub min_x: f32,
    pub min_y: f32,
    pub width: f32,
    pub height: f32,
}

impl GlyphBox {
    fn approximate(size: f32) -> Self {
        let side = size * APPROX_GLYPH_FRACTION;
        Self {
            min_x: 0.0,
            min_y: -side,
            width: side,
            height: side,
        }
    }
}

/// A font at a fixed pixel size.
pub struct RingFont {
    font: Font<'static>,
    /// `None` for the bundled face.
    source: Option<PathBuf>,
    pub size: f32,
}

impl RingFont {
    /// The bundled face at `size`.
    pub fn bundled(size: f32) -> Option<Self> {
        Option::clone(&BUNDLED_FONT).map(|font| Self {
            font,
            source: None,
            size,
        })
    }

    pub fn is_bundled(&self) -> bool {
        self.source.is_none()
    }

    /// File the font was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// True when the font has an outline for `ch` rather than its fallback box.
    pub fn has_glyph(&self, ch: char) -> bool {
        self.font.glyph(ch).id().0 != 0
    }

    /// Pixel bounding box of `ch`, or `None` if the font lacks it or it has no ink.
    pub fn measure(&self, ch: char) -> Option<GlyphBox> {
        if !self.has_glyph(ch) {
            return None;
        }
        self.font
            .glyph(ch)
            .scaled(Scale::uniform(self.size))
            .positioned(point(0.0, 0.0))
            .pixel_bounding_box()
            .map(|bb| GlyphBox {
                min_x: bb.min.x as f32,
                min_y: bb.min.y as f32,
                width: bb.width() as f32,
                height: bb.height() as f32,
            })
    }

    /// Like [`measure`](Self::measure), estimating a box for glyphs that cannot be measured.
    pub fn measure_or_estimate(&self, ch: char) -> GlyphBox {
        self.measure(ch).unwrap_or_else(|| {
            debug!("cannot measure {:?}, estimating its box", ch);
            GlyphBox::approximate(self.size)
        })
    }

    /// Rasterize `ch` centered on `(cx, cy)`, reporting coverage in `(0, 1]` per pixel.
    ///
    /// Returns whether any pixel was inked.
    pub fn draw_centered<F>(&self, ch: char, cx: f64, cy: f64, mut plot: F) -> bool
    where
        F: FnMut(i64, i64, f32),
    {
        if !self.has_glyph(ch) {
            return false;
        }
        let bb = self.measure_or_estimate(ch);
        let origin_x = (cx - bb.min_x as f64 - bb.width as f64 / 2.0).round();
        let origin_y = (cy - bb.min_y as f64 - bb.height as f64 / 2.0).round();

        let glyph = self
            .font
            .glyph(ch)
            .scaled(Scale::uniform(self.size))
            .positioned(point(origin_x as f32, origin_y as f32));
        let Some(pbb) = glyph.pixel_bounding_box() else {
            return false;
        };

        let mut inked = false;
        glyph.draw(|gx, gy, v| {
            if v > 0.0 {
                inked = true;
                plot(pbb.min.x as i64 + gx as i64, pbb.min.y as i64 + gy as i64, v);
            }
        });
        inked
    }
}

/// Load the first usable font from `paths` at `size`, else the bundled face.
pub fn load_font(paths: &[PathBuf], size: f32) -> Option<RingFont> {
    if let Some((path, font)) = first_success(paths.iter(), |path| load_truetype(path)) {
        debug!("using font {} at {}px", path.display(), size);
        return Some(RingFont {
            font,
            source: Some(path.clone()),
            size,
        });
    }

    if !paths.is_empty() {
        warn!(
            "none of {} font(s) could be loaded, using bundled DejaVu Sans Bold",
            paths.len()
        );
    }
    let bundled = RingFont::bundled(size);
    if bundled.is_none() {
        error!("bundled font failed to parse");
    }
    bundled
}
