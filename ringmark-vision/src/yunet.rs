//! YuNet face detector.
//!
//! YuNet is anchor-free: for each stride (8, 16, 32) it predicts, per grid
//! cell, a classification score, an objectness score, a box delta and five
//! landmarks. The model emits twelve tensors in the order
//! cls_8, cls_16, cls_32, obj_8, .., bbox_8, .., kps_8, ..
//! Only the boxes are consumed here.
//!
//! Box decoding is grid based:
//! cx = (col + dx) * stride, cy = (row + dy) * stride
//! w = dw * stride, h = dh * stride

use anyhow::Result;
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::Array4;
use ort::{session::Session, value::Value};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::face::{self, DetectError, Detector, FaceCandidate};

const STRIDES: [usize; 3] = [8, 16, 32];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct YuNetOptions {
    /// Side of the square network input, a multiple of 32.
    pub input_size: u32,
    pub score_threshold: f32,
    pub nms_threshold: f32,
}

impl Default for YuNetOptions {
    fn default() -> Self {
        Self {
            input_size: 640,
            score_threshold: 0.6,
            nms_threshold: 0.3,
        }
    }
}

/// Scale and padding used to fit an image into the square network input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub width: u32,
    pub height: u32,
    pub offset_x: u32,
    pub offset_y: u32,
}

impl Letterbox {
    pub fn fit(width: u32, height: u32, target: u32) -> Self {
        let scale = target as f32 / width.max(height) as f32;
        let new_width = ((width as f32 * scale) as u32).clamp(1, target);
        let new_height = ((height as f32 * scale) as u32).clamp(1, target);
        Self {
            scale,
            width: new_width,
            height: new_height,
            offset_x: (target - new_width) / 2,
            offset_y: (target - new_height) / 2,
        }
    }

    /// Map a rectangle from network input space back to the source image.
    pub fn unmap(&self, c: &FaceCandidate) -> FaceCandidate {
        FaceCandidate {
            x: (c.x - self.offset_x as f32) / self.scale,
            y: (c.y - self.offset_y as f32) / self.scale,
            w: c.w / self.scale,
            h: c.h / self.scale,
            score: c.score,
        }
    }
}

/// Raw outputs of one stride.
#[derive(Debug)]
pub struct StrideOutputs<'a> {
    pub stride: usize,
    pub cls: &'a [f32],
    pub obj: &'a [f32],
    pub bbox: &'a [f32],
}

fn expect_tensor<'a>(
    outputs: &'a [(Vec<i64>, Vec<f32>)],
    index: usize,
    cells: usize,
    channels: usize,
    label: &str,
) -> Result<&'a [f32]> {
    let Some((shape, data)) = outputs.get(index) else {
        anyhow::bail!("missing {} output at index {}", label, index);
    };
    let shape_ok = shape.len() == 3
        && shape[0] == 1
        && shape[1] as usize == cells
        && shape[2] as usize == channels
        && data.len() == cells * channels;
    if !shape_ok {
        anyhow::bail!(
            "unexpected {} shape at index {}: {:?}, expected [1, {}, {}]",
            label,
            index,
            shape,
            cells,
            channels
        );
    }
    Ok(data.as_slice())
}

/// Split the flat model output list into per-stride views.
pub fn split_outputs(
    outputs: &[(Vec<i64>, Vec<f32>)],
    input_size: usize,
) -> Result<Vec<StrideOutputs<'_>>> {
    let n = STRIDES.len();
    STRIDES
        .iter()
        .enumerate()
        .map(|(i, &stride)| {
            let grid = input_size / stride;
            let cells = grid * grid;
            Ok(StrideOutputs {
                stride,
                cls: expect_tensor(outputs, i, cells, 1, "cls")?,
                obj: expect_tensor(outputs, i + n, cells, 1, "obj")?,
                bbox: expect_tensor(outputs, i + 2 * n, cells, 4, "bbox")?,
            })
        })
        .collect()
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Decode one stride into rectangles in network input pixels.
pub fn decode_stride(
    out: &StrideOutputs<'_>,
    input_size: usize,
    score_threshold: f32,
) -> Vec<FaceCandidate> {
    let grid = input_size / out.stride;
    let stride = out.stride as f32;
    let mut found = Vec::new();

    for row in 0..grid {
        for col in 0..grid {
            let idx = row * grid + col;
            let score = sigmoid(out.cls[idx] * out.obj[idx]);
            if score < score_threshold {
                continue;
            }

            let delta = &out.bbox[idx * 4..idx * 4 + 4];
            let cx = (col as f32 + delta[0]) * stride;
            let cy = (row as f32 + delta[1]) * stride;
            let w = delta[2] * stride;
            let h = delta[3] * stride;

            found.push(FaceCandidate {
                x: cx - w / 2.0,
                y: cy - h / 2.0,
                w,
                h,
                score,
            });
        }
    }

    found
}

/// Letterbox the image into a BGR NCHW tensor.
pub fn preprocess(img: &DynamicImage, letterbox: &Letterbox, input_size: u32) -> Array4<f32> {
    let side = input_size as usize;
    let resized = img
        .resize_exact(letterbox.width, letterbox.height, FilterType::Triangle)
        .to_rgb8();

    let mut input = Array4::<f32>::zeros((1, 3, side, side));
    for (x, y, p) in resized.enumerate_pixels() {
        let tx = (x + letterbox.offset_x) as usize;
        let ty = (y + letterbox.offset_y) as usize;
        input[[0, 0, ty, tx]] = p[2] as f32;
        input[[0, 1, ty, tx]] = p[1] as f32;
        input[[0, 2, ty, tx]] = p[0] as f32;
    }
    input
}

/// One YuNet pass at a fixed input size.
pub struct YuNetDetector {
    session: Session,
    options: YuNetOptions,
}

impl YuNetDetector {
    pub fn load(model_path: &Path, options: YuNetOptions) -> Result<Self> {
        if options.input_size == 0 || options.input_size % 32 != 0 {
            anyhow::bail!(
                "detector input size must be a positive multiple of 32, got {}",
                options.input_size
            );
        }
        let session = crate::model::detector_session(model_path)?;
        log::debug!(
            "loaded detector {} (input {}, score {}, nms {})",
            model_path.display(),
            options.input_size,
            options.score_threshold,
            options.nms_threshold
        );
        Ok(Self { session, options })
    }

    pub fn options(&self) -> &YuNetOptions {
        &self.options
    }

    fn run(&mut self, img: &DynamicImage) -> Result<Vec<FaceCandidate>> {
        let (width, height) = img.dimensions();
        let size = self.options.input_size;
        let letterbox = Letterbox::fit(width, height, size);

        let input_tensor = Value::from_array(preprocess(img, &letterbox, size))?;
        let outputs = self.session.run(ort::inputs![input_tensor])?;

        let mut output_data: Vec<(Vec<i64>, Vec<f32>)> = Vec::new();
        for (_name, output) in outputs.iter() {
            let (shape, data) = output.try_extract_tensor::<f32>()?;
            output_data.push((shape.iter().copied().collect(), data.to_vec()));
        }

        let strides = split_outputs(&output_data, size as usize)?;
        let raw: Vec<FaceCandidate> = strides
            .iter()
            .flat_map(|s| decode_stride(s, size as usize, self.options.score_threshold))
            .map(|c| letterbox.unmap(&c))
            .collect();

        let kept = face::nms(&raw, self.options.nms_threshold);
        log::debug!(
            "yunet@{}: {} raw, {} after nms",
            size,
            raw.len(),
            kept.len()
        );
        Ok(kept)
    }
}

impl Detector for YuNetDetector {
    fn detect(&mut self, img: &DynamicImage) -> Result<Vec<FaceCandidate>, DetectError> {
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return Err(DetectError::Unavailable(format!(
                "cannot sample a {}x{} image",
                width, height
            )));
        }
        self.run(img)
            .map_err(|e| DetectError::Unavailable(format!("{:#}", e)))
    }
}
