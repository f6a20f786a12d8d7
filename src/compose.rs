use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use imageproc::drawing::draw_filled_circle_mut;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::font::{self, DEFAULT_FONT_PATHS};
use crate::geometry::RingGeometry;
use crate::text;

/// Look of the ring and its text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingStyle {
    pub accent: [u8; 3],
    /// Band opacity; below 255 so the photo shows through.
    pub alpha: u8,
    pub text_color: [u8; 3],
    /// Ranked font files, most preferred first.
    pub fonts: Vec<PathBuf>,
    pub min_font_size: f32,
    pub max_font_size: f32,
}

impl Default for RingStyle {
    fn default() -> Self {
        Self {
            accent: [34, 139, 34],
            alpha: 180,
            text_color: [255, 255, 255],
            fonts: DEFAULT_FONT_PATHS.iter().map(PathBuf::from).collect(),
            min_font_size: 12.0,
            max_font_size: 48.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Keep the alpha channel.
    Rgba,
    /// Flatten onto opaque white.
    Opaque,
}

impl OutputMode {
    pub fn for_format(format: ImageFormat) -> Self {
        match format {
            ImageFormat::Jpeg | ImageFormat::Pnm => OutputMode::Opaque,
            _ => OutputMode::Rgba,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderedImage {
    pub image: DynamicImage,
    pub mode: OutputMode,
    /// Characters that put ink on the canvas.
    pub glyphs_drawn: usize,
    /// Non-blank characters left out: anchor point off the canvas, or no
    /// glyph for the character in the font.
    pub glyphs_skipped: usize,
}

/// Straight-alpha "over" of `src` (with extra coverage) onto `dst`.
fn over(src: Rgba<u8>, coverage: f32, dst: Rgba<u8>) -> Rgba<u8> {
    let sa = coverage.clamp(0.0, 1.0) * src[3] as f32 / 255.0;
    if sa <= 0.0 {
        return dst;
    }
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let mut out = [0u8; 4];
    for c in 0..3 {
        let v = (src[c] as f32 * sa + dst[c] as f32 * da * (1.0 - sa)) / out_a;
        out[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba(out)
}

fn blend_pixel(img: &mut RgbaImage, x: i64, y: i64, color: Rgba<u8>, coverage: f32) {
    if x < 0 || y < 0 || x >= img.width() as i64 || y >= img.height() as i64 {
        return;
    }
    let dst = img.get_pixel_mut(x as u32, y as u32);
    *dst = over(color, coverage, *dst);
}

/// Alpha-composite `overlay` onto `base`; both must share dimensions.
pub fn alpha_over(base: &mut RgbaImage, overlay: &RgbaImage) {
    for (dst, src) in base.pixels_mut().zip(overlay.pixels()) {
        *dst = over(*src, 1.0, *dst);
    }
}

pub fn flatten_onto_white(img: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(img.width(), img.height(), |x, y| {
        let p = img.get_pixel(x, y);
        let a = p[3] as f32 / 255.0;
        let mix = |c: u8| (c as f32 * a + 255.0 * (1.0 - a)).round() as u8;
        Rgb([mix(p[0]), mix(p[1]), mix(p[2])])
    })
}

/// Convert a finished RGBA buffer into the requested output mode.
pub fn finish(img: RgbaImage, mode: OutputMode) -> DynamicImage {
    match mode {
        OutputMode::Rgba => DynamicImage::ImageRgba8(img),
        OutputMode::Opaque => DynamicImage::ImageRgb8(flatten_onto_white(&img)),
    }
}

/// Translucent annulus: a filled outer disk with the inner disk cleared.
pub fn draw_band(overlay: &mut RgbaImage, geometry: &RingGeometry, style: &RingStyle) {
    let center = (geometry.center.x as i32, geometry.center.y as i32);
    let [r, g, b] = style.accent;
    draw_filled_circle_mut(
        overlay,
        center,
        geometry.outer_radius as i32,
        Rgba([r, g, b, style.alpha]),
    );
    draw_filled_circle_mut(overlay, center, geometry.inner_radius as i32, Rgba([0, 0, 0, 0]));
}

/// Lay `text` around the band's mid circle. Returns (drawn, skipped).
pub fn draw_arc_text(
    overlay: &mut RgbaImage,
    geometry: &RingGeometry,
    text: &str,
    style: &RingStyle,
) -> (usize, usize) {
    if text.is_empty() {
        return (0, 0);
    }

    let size = font::font_size_for_band(
        geometry.band_width(),
        style.min_font_size,
        style.max_font_size,
    );
    let Some(ring_font) = font::load_font(&style.fonts, size) else {
        warn!("no font available, ring text left out");
        return (0, text.chars().filter(|c| !c.is_whitespace()).count());
    };
    let [r, g, b] = style.text_color;
    let color = Rgba([r, g, b, 255]);
    let (width, height) = (overlay.width() as f64, overlay.height() as f64);
    let center = (geometry.center.x as f64, geometry.center.y as f64);

    let mut drawn = 0;
    let mut skipped = 0;
    for slot in text::layout_arc(text, center, geometry.mid_radius()) {
        if slot.ch.is_whitespace() {
            continue;
        }
        if slot.x < 0.0 || slot.y < 0.0 || slot.x > width || slot.y > height {
            debug!(
                "skipping {:?} at ({:.1}, {:.1}), outside the canvas",
                slot.ch, slot.x, slot.y
            );
            skipped += 1;
            continue;
        }
        let inked = ring_font.draw_centered(slot.ch, slot.x, slot.y, |x, y, v| {
            blend_pixel(overlay, x, y, color, v)
        });
        if inked {
            drawn += 1;
        } else {
            debug!("no glyph for {:?} in the ring font", slot.ch);
            skipped += 1;
        }
    }
    (drawn, skipped)
}

/// Draw the ring and its text over a copy of `canvas`.
///
/// `text` is laid out as given; normalize it first.
pub fn render(
    canvas: &DynamicImage,
    geometry: &RingGeometry,
    text: &str,
    style: &RingStyle,
    mode: OutputMode,
) -> RenderedImage {
    let (width, height) = canvas.dimensions();
    let mut overlay = RgbaImage::new(width, height);

    draw_band(&mut overlay, geometry, style);
    let (glyphs_drawn, glyphs_skipped) = draw_arc_text(&mut overlay, geometry, text, style);

    let mut base = canvas.to_rgba8();
    alpha_over(&mut base, &overlay);

    RenderedImage {
        image: finish(base, mode),
        mode,
        glyphs_drawn,
        glyphs_skipped,
    }
}
