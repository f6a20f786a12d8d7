use image::{DynamicImage, GenericImageView};
use log::{info, warn};
use ringmark_vision::{Detector, FaceLocator, LocatedFace, YuNetDetector};

use crate::compose::{self, OutputMode, RenderedImage, RingStyle};
use crate::config::{Config, DetectorConfig};
use crate::geometry::{self, GeometryPolicy, RingError, RingGeometry};
use crate::text::{self, TextPolicy};

/// Build the detector passes named in the config.
///
/// A model that fails to load is logged and left out; the locator then
/// falls back to its heuristic anchor.
pub fn detectors_from_config(cfg: &DetectorConfig) -> Vec<Box<dyn Detector>> {
    let Some(model) = cfg.model.as_deref() else {
        return vec![];
    };

    let mut detectors: Vec<Box<dyn Detector>> = Vec::new();
    for pass in cfg.passes() {
        match YuNetDetector::load(model, pass) {
            Ok(d) => {
                info!("detector pass ready at {}px", d.options().input_size);
                detectors.push(Box::new(d));
            }
            Err(e) => warn!("detector pass at {}px unavailable: {:#}", pass.input_size, e),
        }
    }
    detectors
}

/// Full pipeline: locate face → plan ring → composite.
pub struct Pipeline {
    pub locator: FaceLocator,
    pub policy: GeometryPolicy,
    pub style: RingStyle,
    pub text: TextPolicy,
}

impl Pipeline {
    pub fn new(locator: FaceLocator, cfg: &Config) -> Self {
        Self {
            locator,
            policy: cfg.geometry.clone(),
            style: cfg.ring.clone(),
            text: cfg.text.clone(),
        }
    }

    /// Pipeline with the detectors configured in `cfg`.
    pub fn from_config(cfg: &Config) -> Self {
        let locator = FaceLocator::new(detectors_from_config(&cfg.detector));
        Self::new(locator, cfg)
    }

    pub fn locate(&mut self, img: &DynamicImage) -> LocatedFace {
        self.locator.locate(img)
    }

    /// Locate the face and size the ring around it.
    pub fn plan(&mut self, img: &DynamicImage) -> Result<(LocatedFace, RingGeometry), RingError> {
        let (width, height) = img.dimensions();
        let located = self.locate(img);
        let geometry = geometry::plan(located.anchor, width, height, &self.policy)?;
        Ok((located, geometry))
    }

    /// Normalized form of `raw`, or of the default text when `raw` is blank.
    pub fn watermark_text(&self, raw: &str) -> String {
        let raw = if raw.trim().is_empty() {
            self.text.default_text.as_str()
        } else {
            raw
        };
        text::normalize(raw, &self.text)
    }

    /// Draw the status ring with `raw_text` around the face in `img`.
    pub fn watermark(
        &mut self,
        img: &DynamicImage,
        raw_text: &str,
        mode: OutputMode,
    ) -> Result<RenderedImage, RingError> {
        let (located, geometry) = self.plan(img)?;
        let text = self.watermark_text(raw_text);
        info!(
            "ring at {} ({:?}): inner {} outer {}, text {:?}",
            located.anchor, located.source, geometry.inner_radius, geometry.outer_radius, text
        );
        Ok(compose::render(img, &geometry, &text, &self.style, mode))
    }
}
