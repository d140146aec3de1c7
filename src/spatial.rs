// src/spatial.rs
//
// Fixed pretrained backbone used as a stateless feature function. The
// backbone is never trained here; it only has to honor `encode` with a
// declared output width, so any feature-extractor export works.

use crate::types::Frame;
use anyhow::{Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::path::Path;
use tracing::info;

/// Per-channel normalization matching the backbone's training
/// distribution. Wrong constants do not error, they just quietly cost
/// accuracy, so these stay next to the preprocessing code.
const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Maps a masked frame to a fixed-length spatial feature vector.
pub trait SpatialEncoder {
    /// Declared output width; constant for the encoder's lifetime.
    fn dim(&self) -> usize;

    fn encode(&mut self, frame: &Frame) -> Result<Vec<f32>>;
}

pub struct OnnxBackbone {
    session: Session,
    input_size: usize,
    dim: usize,
}

impl OnnxBackbone {
    pub fn new(model_path: &Path, input_size: usize, dim: usize, intra_threads: usize) -> Result<Self> {
        info!("Loading backbone model: {}", model_path.display());

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?
            .commit_from_file(model_path)
            .with_context(|| format!("failed to load backbone model {}", model_path.display()))?;

        info!("✓ Backbone ready ({}x{} input, {} features)", input_size, input_size, dim);

        Ok(Self {
            session,
            input_size,
            dim,
        })
    }
}

impl SpatialEncoder for OnnxBackbone {
    fn dim(&self) -> usize {
        self.dim
    }

    fn encode(&mut self, frame: &Frame) -> Result<Vec<f32>> {
        let input = preprocess(frame, self.input_size);
        let shape = [1usize, 3, self.input_size, self.input_size];
        let input_value =
            ort::value::Value::from_array((shape.as_slice(), input.into_boxed_slice()))?;

        let outputs = self.session.run(ort::inputs![input_value])?;
        let (_, features) = outputs[0].try_extract_tensor::<f32>()?;

        if features.len() != self.dim {
            anyhow::bail!(
                "backbone produced {} features, configured for {} — wrong model export or backbone_dim",
                features.len(),
                self.dim
            );
        }

        Ok(features.to_vec())
    }
}

/// Resize to the backbone's square input, normalize with the ImageNet
/// constants, and lay out channel-major.
pub fn preprocess(frame: &Frame, size: usize) -> Vec<f32> {
    let resized = resize_rgb(&frame.data, frame.width, frame.height, size, size);

    let mut output = vec![0.0f32; 3 * size * size];
    for c in 0..3 {
        for y in 0..size {
            for x in 0..size {
                let hwc_idx = (y * size + x) * 3 + c;
                let chw_idx = c * size * size + y * size + x;
                let pixel = resized[hwc_idx] as f32 / 255.0;
                output[chw_idx] = (pixel - MEAN[c]) / STD[c];
            }
        }
    }

    output
}

/// Bilinear RGB resize on raw bytes.
fn resize_rgb(src: &[u8], src_w: usize, src_h: usize, dst_w: usize, dst_h: usize) -> Vec<u8> {
    let mut dst = vec![0u8; dst_h * dst_w * 3];
    if src_w == 0 || src_h == 0 {
        return dst;
    }

    let x_ratio = src_w as f32 / dst_w as f32;
    let y_ratio = src_h as f32 / dst_h as f32;

    for dy in 0..dst_h {
        let sy = dy as f32 * y_ratio;
        let sy0 = sy.floor() as usize;
        let sy1 = (sy0 + 1).min(src_h - 1);
        let fy = sy - sy0 as f32;

        for dx in 0..dst_w {
            let sx = dx as f32 * x_ratio;
            let sx0 = sx.floor() as usize;
            let sx1 = (sx0 + 1).min(src_w - 1);
            let fx = sx - sx0 as f32;

            for c in 0..3 {
                let p00 = src[(sy0 * src_w + sx0) * 3 + c] as f32;
                let p10 = src[(sy0 * src_w + sx1) * 3 + c] as f32;
                let p01 = src[(sy1 * src_w + sx0) * 3 + c] as f32;
                let p11 = src[(sy1 * src_w + sx1) * 3 + c] as f32;

                let top = p00 + (p10 - p00) * fx;
                let bottom = p01 + (p11 - p01) * fx;
                let val = top + (bottom - top) * fy;

                dst[(dy * dst_w + dx) * 3 + c] = val.round() as u8;
            }
        }
    }

    dst
}
