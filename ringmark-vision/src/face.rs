use image::{DynamicImage, GenericImageView};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Two candidates whose intersection exceeds this share of the smaller
/// rectangle's area are treated as the same face.
pub const DUPLICATE_OVERLAP: f32 = 0.5;

/// Aspect-ratio buckets (`height / width` lower bound, anchor y fraction),
/// tallest first. Taller images tend to be full-body shots with the face
/// near the top.
const ASPECT_BUCKETS: [(f64, f64); 3] = [(2.0, 0.15), (1.6, 0.22), (1.3, 0.30)];
const DEFAULT_FACE_HEIGHT: f64 = 0.35;

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("face detection unavailable: {0}")]
    Unavailable(String),
}

/// Candidate face rectangle in image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceCandidate {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub score: f32,
}

impl FaceCandidate {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            x,
            y,
            w,
            h,
            score: 1.0,
        }
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = score;
        self
    }

    pub fn area(&self) -> f32 {
        self.w.max(0.0) * self.h.max(0.0)
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    pub fn intersection_area(&self, other: &FaceCandidate) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.w).min(other.x + other.w);
        let y2 = (self.y + self.h).min(other.y + other.h);

        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }
        (x2 - x1) * (y2 - y1)
    }

    /// Intersection over union, used for suppression inside a single detector pass.
    pub fn iou(&self, other: &FaceCandidate) -> f32 {
        let inter = self.intersection_area(other);
        if inter == 0.0 {
            return 0.0;
        }
        inter / (self.area() + other.area() - inter)
    }

    /// True when the shared area is more than `fraction` of the smaller rectangle.
    pub fn overlaps(&self, other: &FaceCandidate, fraction: f32) -> bool {
        let smaller = self.area().min(other.area());
        if smaller <= 0.0 {
            return false;
        }
        self.intersection_area(other) > fraction * smaller
    }
}

/// Believed center of the subject's face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceAnchor {
    pub x: u32,
    pub y: u32,
}

impl fmt::Display for FaceAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnchorSource {
    Detected,
    Heuristic,
}

#[derive(Debug, Clone)]
pub struct LocatedFace {
    pub anchor: FaceAnchor,
    /// Deduplicated candidates, largest area first.
    pub candidates: Vec<FaceCandidate>,
    pub source: AnchorSource,
}

/// Anything that can report candidate face rectangles for an image.
///
/// Output order is not significant. An empty list is a valid answer; an
/// error means the detector could not run on this image at all.
pub trait Detector {
    fn detect(&mut self, img: &DynamicImage) -> Result<Vec<FaceCandidate>, DetectError>;
}

/// Reports a fixed set of rectangles regardless of the image.
#[derive(Debug, Clone, Default)]
pub struct FixedDetector {
    pub candidates: Vec<FaceCandidate>,
}

impl FixedDetector {
    pub fn new(candidates: Vec<FaceCandidate>) -> Self {
        Self { candidates }
    }
}

impl Detector for FixedDetector {
    fn detect(&mut self, _img: &DynamicImage) -> Result<Vec<FaceCandidate>, DetectError> {
        Ok(self.candidates.clone())
    }
}

/// Stand-in for a missing detector.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDetector;

impl Detector for NoDetector {
    fn detect(&mut self, _img: &DynamicImage) -> Result<Vec<FaceCandidate>, DetectError> {
        Err(DetectError::Unavailable("no detector configured".to_string()))
    }
}

/// Collapse candidates that cover the same face.
///
/// Candidates are visited largest first (ties in first-seen order) and one
/// is kept only if it duplicates none of those already kept, so no two
/// survivors overlap. The result is ranked by area.
pub fn dedup_candidates(candidates: &[FaceCandidate], overlap: f32) -> Vec<FaceCandidate> {
    let mut ranked = candidates.to_vec();
    rank_by_area(&mut ranked);

    let mut kept: Vec<FaceCandidate> = Vec::with_capacity(ranked.len());
    for candidate in ranked {
        if kept.iter().all(|k| !k.overlaps(&candidate, overlap)) {
            kept.push(candidate);
        }
    }
    kept
}

/// Sort by area, largest first. Stable, so ties keep first-seen order.
pub fn rank_by_area(candidates: &mut [FaceCandidate]) {
    candidates.sort_by(|a, b| {
        b.area()
            .partial_cmp(&a.area())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Non-maximum suppression by IoU, highest score wins.
pub fn nms(candidates: &[FaceCandidate], iou_threshold: f32) -> Vec<FaceCandidate> {
    let mut sorted = candidates.to_vec();
    sorted.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<FaceCandidate> = Vec::new();
    for candidate in sorted {
        if keep.iter().all(|k| k.iou(&candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

/// Compositional guess used when no detector produced anything.
pub fn heuristic_anchor(width: u32, height: u32) -> FaceAnchor {
    let ratio = height as f64 / width.max(1) as f64;
    let fraction = ASPECT_BUCKETS
        .iter()
        .find(|(min_ratio, _)| ratio >= *min_ratio)
        .map(|(_, fraction)| *fraction)
        .unwrap_or(DEFAULT_FACE_HEIGHT);

    FaceAnchor {
        x: width / 2,
        y: (height as f64 * fraction).round() as u32,
    }
}

fn anchor_from_candidate(candidate: &FaceCandidate, width: u32, height: u32) -> FaceAnchor {
    let (cx, cy) = candidate.center();
    FaceAnchor {
        x: cx.round().clamp(0.0, width as f32) as u32,
        y: cy.round().clamp(0.0, height as f32) as u32,
    }
}

/// Runs every configured detector and turns their output into one anchor.
#[derive(Default)]
pub struct FaceLocator {
    detectors: Vec<Box<dyn Detector>>,
}

impl FaceLocator {
    pub fn new(detectors: Vec<Box<dyn Detector>>) -> Self {
        Self { detectors }
    }

    pub fn push(&mut self, detector: Box<dyn Detector>) {
        self.detectors.push(detector);
    }

    pub fn locate(&mut self, img: &DynamicImage) -> LocatedFace {
        let (width, height) = img.dimensions();

        let mut found = Vec::new();
        for (pass, detector) in self.detectors.iter_mut().enumerate() {
            match detector.detect(img) {
                Ok(candidates) => {
                    debug!("detector pass {}: {} candidate(s)", pass, candidates.len());
                    found.extend(candidates);
                }
                Err(e) => warn!("detector pass {}: {}", pass, e),
            }
        }

        let candidates = dedup_candidates(&found, DUPLICATE_OVERLAP);

        match candidates.first() {
            Some(best) => {
                let anchor = anchor_from_candidate(best, width, height);
                info!(
                    "face at {} from {} candidate(s) ({} before dedup)",
                    anchor,
                    candidates.len(),
                    found.len()
                );
                LocatedFace {
                    anchor,
                    candidates,
                    source: AnchorSource::Detected,
                }
            }
            None => {
                let anchor = heuristic_anchor(width, height);
                info!("no face detected, using compositional anchor {}", anchor);
                LocatedFace {
                    anchor,
                    candidates,
                    source: AnchorSource::Heuristic,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou() {
        let a = FaceCandidate::new(10.0, 10.0, 20.0, 20.0);
        let b = FaceCandidate::new(15.0, 15.0, 20.0, 20.0);
        let iou = a.iou(&b);
        assert!(iou > 0.0 && iou < 1.0);

        let c = FaceCandidate::new(100.0, 100.0, 10.0, 10.0);
        assert_eq!(a.iou(&c), 0.0);
    }

    #[test]
    fn test_nms() {
        let candidates = vec![
            FaceCandidate::new(10.0, 10.0, 20.0, 20.0).with_score(0.9),
            FaceCandidate::new(12.0, 12.0, 20.0, 20.0).with_score(0.8),
            FaceCandidate::new(100.0, 100.0, 20.0, 20.0).with_score(0.85),
        ];

        let result = nms(&candidates, 0.3);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].score, 0.9);
        assert_eq!(result[1].score, 0.85);
    }

    #[test]
    fn test_overlap_uses_smaller_area() {
        // small box fully inside a big one: IoU is tiny, overlap is total
        let big = FaceCandidate::new(0.0, 0.0, 100.0, 100.0);
        let small = FaceCandidate::new(10.0, 10.0, 20.0, 20.0);
        assert!(big.iou(&small) < 0.1);
        assert!(big.overlaps(&small, DUPLICATE_OVERLAP));
        assert!(small.overlaps(&big, DUPLICATE_OVERLAP));
    }

    #[test]
    fn test_dedup_collapses_heavy_overlap() {
        // 60% of the 100x100 box is shared
        let a = FaceCandidate::new(0.0, 0.0, 100.0, 100.0);
        let b = FaceCandidate::new(40.0, 0.0, 100.0, 100.0);
        let kept = dedup_candidates(&[a, b], DUPLICATE_OVERLAP);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_dedup_keeps_light_overlap() {
        // 40% shared
        let a = FaceCandidate::new(0.0, 0.0, 100.0, 100.0);
        let b = FaceCandidate::new(60.0, 0.0, 100.0, 100.0);
        let kept = dedup_candidates(&[a, b], DUPLICATE_OVERLAP);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_dedup_keeps_larger_and_ranks() {
        let small = FaceCandidate::new(10.0, 10.0, 50.0, 50.0);
        let other = FaceCandidate::new(500.0, 500.0, 30.0, 30.0);
        let large = FaceCandidate::new(0.0, 0.0, 80.0, 80.0);
        let kept = dedup_candidates(&[small, other, large], DUPLICATE_OVERLAP);
        assert_eq!(kept, vec![large, other]);
    }

    #[test]
    fn test_dedup_late_large_box_absorbs_two_kept() {
        // a and c are disjoint; b arrives last and covers both
        let a = FaceCandidate::new(0.0, 0.0, 50.0, 50.0);
        let c = FaceCandidate::new(60.0, 0.0, 50.0, 50.0);
        let b = FaceCandidate::new(0.0, 0.0, 120.0, 60.0);
        let kept = dedup_candidates(&[a, c, b], DUPLICATE_OVERLAP);
        assert_eq!(kept, vec![b]);
    }

    #[test]
    fn test_dedup_survivors_never_overlap() {
        let mut boxes = Vec::new();
        for i in 0..12 {
            let f = i as f32;
            boxes.push(FaceCandidate::new(
                f * 17.0 % 90.0,
                f * 29.0 % 70.0,
                30.0 + f * 7.0,
                25.0 + f * 5.0,
            ));
        }
        let kept = dedup_candidates(&boxes, DUPLICATE_OVERLAP);
        for (i, a) in kept.iter().enumerate() {
            for b in &kept[i + 1..] {
                assert!(!a.overlaps(b, DUPLICATE_OVERLAP), "{:?} {:?}", a, b);
            }
        }
        assert!(kept.windows(2).all(|w| w[0].area() >= w[1].area()));
    }

    #[test]
    fn test_dedup_equal_areas_keep_first_seen() {
        let first = FaceCandidate::new(0.0, 0.0, 40.0, 40.0).with_score(0.3);
        let second = FaceCandidate::new(5.0, 5.0, 40.0, 40.0).with_score(0.9);
        let kept = dedup_candidates(&[first, second], DUPLICATE_OVERLAP);
        assert_eq!(kept, vec![first]);
    }

    #[test]
    fn test_rank_by_area_is_stable() {
        let first = FaceCandidate::new(0.0, 0.0, 10.0, 10.0).with_score(0.1);
        let second = FaceCandidate::new(50.0, 50.0, 10.0, 10.0).with_score(0.2);
        let biggest = FaceCandidate::new(100.0, 100.0, 30.0, 30.0);
        let mut list = vec![first, second, biggest];
        rank_by_area(&mut list);
        assert_eq!(list, vec![biggest, first, second]);
    }

    #[test]
    fn test_heuristic_buckets() {
        assert_eq!(heuristic_anchor(800, 800), FaceAnchor { x: 400, y: 280 });
        // ratio 2.0 lands in the tallest bucket
        assert_eq!(heuristic_anchor(1000, 2000), FaceAnchor { x: 500, y: 300 });
        assert_eq!(heuristic_anchor(1000, 2100), FaceAnchor { x: 500, y: 315 });
        assert_eq!(heuristic_anchor(1000, 1700), FaceAnchor { x: 500, y: 374 });
        assert_eq!(heuristic_anchor(1000, 1600), FaceAnchor { x: 500, y: 352 });
        assert_eq!(heuristic_anchor(1000, 1400), FaceAnchor { x: 500, y: 420 });
        assert_eq!(heuristic_anchor(1000, 1200), FaceAnchor { x: 500, y: 420 });
        assert_eq!(heuristic_anchor(1200, 800), FaceAnchor { x: 600, y: 280 });
    }

    #[test]
    fn test_anchor_clamped_into_canvas() {
        let c = FaceCandidate::new(90.0, 90.0, 40.0, 40.0);
        assert_eq!(anchor_from_candidate(&c, 100, 100), FaceAnchor { x: 100, y: 100 });
    }
}
