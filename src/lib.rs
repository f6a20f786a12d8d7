pub mod compose;
pub mod config;
pub mod font;
pub mod geometry;
pub mod pipeline;
pub mod text;

// Re-export vision types for convenience
pub use ringmark_vision::{
    face, yunet, AnchorSource, Detector, FaceAnchor, FaceCandidate, FaceLocator, FixedDetector,
    LocatedFace, NoDetector,
};

pub use compose::{OutputMode, RenderedImage, RingStyle};
pub use geometry::{GeometryPolicy, RingError, RingGeometry};
pub use pipeline::Pipeline;
