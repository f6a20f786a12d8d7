use anyhow::Result;
use image::{DynamicImage, Rgb, RgbImage};
use ringmark::compose::{render, OutputMode, RingStyle};
use ringmark::font::{self, DEFAULT_FONT_PATHS};
use ringmark::{FaceAnchor, RingGeometry};
use std::path::{Path, PathBuf};

/// Runs only on machines with at least one of the default fonts installed.
fn installed_fonts() -> Option<Vec<PathBuf>> {
    let found: Vec<PathBuf> = DEFAULT_FONT_PATHS
        .iter()
        .map(PathBuf::from)
        .filter(|p| p.exists())
        .collect();
    if found.is_empty() {
        eprintln!("Skipping: none of {:?} installed", DEFAULT_FONT_PATHS);
        return None;
    }
    Some(found)
}

#[test]
fn test_first_installed_font_is_used() -> Result<()> {
    env_logger::try_init().ok();
    let Some(installed) = installed_fonts() else {
        return Ok(());
    };

    let paths: Vec<PathBuf> = DEFAULT_FONT_PATHS.iter().map(PathBuf::from).collect();
    let ring_font = font::load_font(&paths, 27.0).expect("a font loads");
    assert!(!ring_font.is_bundled());
    assert_eq!(ring_font.source(), Some(installed[0].as_path()));

    let bb = ring_font.measure('H').expect("H has ink");
    assert!(bb.width > 0.0 && bb.height > 0.0);
    assert!(bb.min_y < 0.0, "glyph sits above the baseline");
    Ok(())
}

#[test]
fn test_system_font_text_stays_in_band() -> Result<()> {
    env_logger::try_init().ok();
    if installed_fonts().is_none() {
        return Ok(());
    }

    let geometry = RingGeometry {
        center: FaceAnchor { x: 400, y: 280 },
        inner_radius: 176,
        outer_radius: 230,
    };
    let canvas = DynamicImage::ImageRgb8(RgbImage::from_pixel(800, 800, Rgb([0, 0, 0])));
    let out = render(&canvas, &geometry, "#HELLO", &RingStyle::default(), OutputMode::Rgba);
    assert_eq!(out.glyphs_drawn, 6);
    assert_eq!(out.glyphs_skipped, 0);

    let img = out.image.to_rgba8();
    let mut ink = 0;
    for (x, y, p) in img.enumerate_pixels() {
        // band over black is (24, 98, 24); brighter red means text
        if p[0] > 100 {
            let r = ((x as f64 - 400.0).powi(2) + (y as f64 - 280.0).powi(2)).sqrt();
            assert!((176.0..=230.0).contains(&r), "({}, {}) at {:.1}", x, y, r);
            ink += 1;
        }
    }
    assert!(ink > 0);
    Ok(())
}

#[test]
fn test_unreadable_paths_before_installed_one_are_passed_over() -> Result<()> {
    let Some(installed) = installed_fonts() else {
        return Ok(());
    };

    let paths = vec![PathBuf::from("/nonexistent/first.ttf"), installed[0].clone()];
    let ring_font = font::load_font(&paths, 16.0).expect("a font loads");
    assert_eq!(ring_font.source(), Some(Path::new(&installed[0])));
    Ok(())
}
