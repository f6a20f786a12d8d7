//! Face location for ring placement: detector collaborators, candidate
//! deduplication and the compositional fallback anchor.

pub mod face;
pub mod model;
pub mod yunet;

pub use face::{
    AnchorSource, DetectError, Detector, FaceAnchor, FaceCandidate, FaceLocator, FixedDetector,
    LocatedFace, NoDetector,
};
pub use yunet::{YuNetDetector, YuNetOptions};
