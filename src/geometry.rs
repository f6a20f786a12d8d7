use log::debug;
use ringmark_vision::FaceAnchor;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RingError {
    #[error("no ring fits a {width}x{height} image around {anchor}")]
    GeometryInfeasible {
        width: u32,
        height: u32,
        anchor: FaceAnchor,
    },
}

/// One sizing attempt: radius fractions of the usable radius plus absolute floors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadiusPass {
    pub outer_fraction: f64,
    pub inner_fraction: f64,
    pub min_outer: u32,
    pub min_inner: u32,
}

/// Tunables for [`plan`]. The primary pass is tried first; the conservative
/// pass is used once if the primary ring does not fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryPolicy {
    pub margin_px: u32,
    /// Margin is at most `fit / margin_divisor`.
    pub margin_divisor: u32,
    pub min_usable_radius: u32,
    /// Bands thinner than this get their inner radius pulled in.
    pub min_band_width: u32,
    /// Inner radius floor when widening a band.
    pub min_inner_radius: u32,
    /// Thinnest band a finished plan may have.
    pub min_legible_band: u32,
    pub primary: RadiusPass,
    pub conservative: RadiusPass,
}

impl Default for GeometryPolicy {
    fn default() -> Self {
        Self {
            margin_px: 10,
            margin_divisor: 20,
            min_usable_radius: 30,
            min_band_width: 20,
            min_inner_radius: 15,
            min_legible_band: 15,
            primary: RadiusPass {
                outer_fraction: 0.85,
                inner_fraction: 0.65,
                min_outer: 50,
                min_inner: 35,
            },
            conservative: RadiusPass {
                outer_fraction: 0.75,
                inner_fraction: 0.55,
                min_outer: 40,
                min_inner: 25,
            },
        }
    }
}

impl GeometryPolicy {
    /// Outer and inner radius for one pass, band floor applied.
    fn size(&self, pass: &RadiusPass, max_radius: u32) -> (u32, u32) {
        let scaled = |fraction: f64| (max_radius as f64 * fraction).round() as u32;
        let outer = scaled(pass.outer_fraction).max(pass.min_outer);
        let mut inner = scaled(pass.inner_fraction).max(pass.min_inner);

        if outer.saturating_sub(inner) < self.min_band_width {
            inner = self
                .min_inner_radius
                .max(outer.saturating_sub(self.min_band_width));
        }
        (outer, inner)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingGeometry {
    pub center: FaceAnchor,
    pub inner_radius: u32,
    pub outer_radius: u32,
}

impl RingGeometry {
    pub fn band_width(&self) -> u32 {
        self.outer_radius.saturating_sub(self.inner_radius)
    }

    /// Radius of the circle the text sits on.
    pub fn mid_radius(&self) -> f64 {
        (self.inner_radius + self.outer_radius) as f64 / 2.0
    }

    /// True if the outer disk lies within `[0, width] x [0, height]`.
    pub fn fits(&self, width: u32, height: u32) -> bool {
        self.outer_radius <= fit_radius(self.center, width, height)
    }
}

/// Largest radius centered at `anchor` that stays inside the canvas.
pub fn fit_radius(anchor: FaceAnchor, width: u32, height: u32) -> u32 {
    anchor
        .x
        .min(width.saturating_sub(anchor.x))
        .min(anchor.y)
        .min(height.saturating_sub(anchor.y))
}

/// Size a ring around `anchor` that stays inside a `width` x `height` canvas.
pub fn plan(
    anchor: FaceAnchor,
    width: u32,
    height: u32,
    policy: &GeometryPolicy,
) -> Result<RingGeometry, RingError> {
    let fit = fit_radius(anchor, width, height);
    let margin = policy.margin_px.min(fit / policy.margin_divisor.max(1));
    let max_radius = (fit - margin).max(policy.min_usable_radius);

    let mut sized = policy.size(&policy.primary, max_radius);
    if sized.0 > fit {
        debug!(
            "primary ring {}/{} exceeds fit radius {}, retrying conservatively",
            sized.0, sized.1, fit
        );
        sized = policy.size(&policy.conservative, max_radius);
    }

    let (outer_radius, inner_radius) = sized;
    if outer_radius > fit
        || inner_radius >= outer_radius
        || outer_radius - inner_radius < policy.min_legible_band
    {
        return Err(RingError::GeometryInfeasible {
            width,
            height,
            anchor,
        });
    }

    let geometry = RingGeometry {
        center: anchor,
        inner_radius,
        outer_radius,
    };
    debug!(
        "ring at {}: inner {} outer {} (fit {}, usable {})",
        anchor, inner_radius, outer_radius, fit, max_radius
    );
    Ok(geometry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor(x: u32, y: u32) -> FaceAnchor {
        FaceAnchor { x, y }
    }

    #[test]
    fn test_square_portrait_reference() {
        let g = plan(anchor(400, 280), 800, 800, &GeometryPolicy::default()).unwrap();
        assert_eq!(g.center, anchor(400, 280));
        assert_eq!(g.inner_radius, 176);
        assert_eq!(g.outer_radius, 230);
        assert_eq!(g.band_width(), 54);
    }

    #[test]
    fn test_margin_is_five_percent_when_small() {
        // fit 100, margin min(10, 5) = 5, usable 95 -> 81/62, band widened to 20
        let g = plan(anchor(100, 100), 200, 200, &GeometryPolicy::default()).unwrap();
        assert_eq!(g.outer_radius, 81);
        assert_eq!(g.inner_radius, 61);
    }

    #[test]
    fn test_floors_push_into_conservative_pass() {
        // fit 55: primary floors give 50/35, band widened to 50/30, which fits
        let g = plan(anchor(55, 55), 110, 110, &GeometryPolicy::default()).unwrap();
        assert_eq!((g.outer_radius, g.inner_radius), (50, 30));

        // fit 45: primary outer 50 does not fit, conservative floors 40/25 widened to 40/20
        let g = plan(anchor(45, 45), 90, 90, &GeometryPolicy::default()).unwrap();
        assert_eq!((g.outer_radius, g.inner_radius), (40, 20));
        assert!(g.fits(90, 90));
    }

    #[test]
    fn test_band_widened_when_thin() {
        let mut policy = GeometryPolicy::default();
        policy.primary.inner_fraction = 0.80;
        let g = plan(anchor(400, 280), 800, 800, &policy).unwrap();
        // outer 230, inner 216 -> pulled in to 210
        assert_eq!((g.outer_radius, g.inner_radius), (230, 210));
    }

    #[test]
    fn test_tiny_canvas_is_infeasible() {
        let err = plan(anchor(30, 30), 60, 60, &GeometryPolicy::default()).unwrap_err();
        assert_eq!(
            err,
            RingError::GeometryInfeasible {
                width: 60,
                height: 60,
                anchor: anchor(30, 30)
            }
        );
    }

    #[test]
    fn test_anchor_on_edge_is_infeasible() {
        assert!(plan(anchor(0, 500), 1000, 1000, &GeometryPolicy::default()).is_err());
        assert!(plan(anchor(500, 1000), 1000, 1000, &GeometryPolicy::default()).is_err());
    }

    #[test]
    fn test_inverted_ring_has_no_band() {
        let g = RingGeometry {
            center: anchor(100, 100),
            inner_radius: 50,
            outer_radius: 40,
        };
        assert_eq!(g.band_width(), 0);
    }

    #[test]
    fn test_planned_rings_stay_inside_and_legible() {
        let policy = GeometryPolicy::default();
        for (width, height) in [(40, 40), (90, 160), (320, 240), (800, 800), (1000, 2000)] {
            for x in (0..=width).step_by(7) {
                for y in (0..=height).step_by(11) {
                    let a = anchor(x, y);
                    if let Ok(g) = plan(a, width, height, &policy) {
                        assert!(x >= g.outer_radius && x + g.outer_radius <= width);
                        assert!(y >= g.outer_radius && y + g.outer_radius <= height);
                        assert!(g.inner_radius < g.outer_radius);
                        assert!(g.band_width() >= 15, "{:?}", g);
                    }
                }
            }
        }
    }
}
