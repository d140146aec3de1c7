// src/segmentation.rs
//
// Instance segmentation behind a trait. The pipeline only needs
// "give me instance masks with confidences for this frame"; the shipped
// adapter runs a Mask R-CNN-style ONNX export (boxes, labels, scores,
// soft masks), but anything honoring the trait slots in, and tests use
// canned fakes instead of a real model.

use crate::types::Frame;
use anyhow::{Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::path::Path;
use tracing::{debug, info};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Soft masks are probability maps; pixels above this become foreground.
const MASK_BINARY_THRESHOLD: f32 = 0.5;

/// Output slots of a Mask R-CNN-style export: boxes, labels, scores, masks.
const OUTPUT_SCORES: usize = 2;
const OUTPUT_MASKS: usize = 3;

// ============================================================================
// TYPES
// ============================================================================

/// One detected instance: a binary mask at the model's native mask
/// resolution plus its confidence. Mask bytes are 0 or 255.
#[derive(Debug, Clone)]
pub struct InstanceMask {
    pub confidence: f32,
    pub mask: Vec<u8>,
    pub mask_width: usize,
    pub mask_height: usize,
}

/// External segmentation capability consumed by the foreground stage.
pub trait SegmentationModel {
    /// Return all detected instances for the frame, best first is not
    /// required; callers pick by confidence.
    fn segment(&mut self, frame: &Frame) -> Result<Vec<InstanceMask>>;
}

// ============================================================================
// ONNX ADAPTER
// ============================================================================

pub struct OnnxSegmenter {
    session: Session,
}

impl OnnxSegmenter {
    pub fn new(model_path: &Path, intra_threads: usize) -> Result<Self> {
        info!("Loading segmentation model: {}", model_path.display());

        // CPU session; a CUDA-enabled runtime can be swapped in externally.
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?
            .commit_from_file(model_path)
            .with_context(|| {
                format!("failed to load segmentation model {}", model_path.display())
            })?;

        info!("✓ Segmentation model ready");

        Ok(Self { session })
    }

    /// Normalize RGB bytes to [0, 1] and lay out as [1, 3, H, W].
    fn preprocess(frame: &Frame) -> Vec<f32> {
        let (w, h) = (frame.width, frame.height);
        let mut input = vec![0.0f32; 3 * h * w];

        for c in 0..3 {
            for y in 0..h {
                for x in 0..w {
                    let hwc_idx = (y * w + x) * 3 + c;
                    let chw_idx = c * h * w + y * w + x;
                    input[chw_idx] = frame.data[hwc_idx] as f32 / 255.0;
                }
            }
        }

        input
    }
}

impl SegmentationModel for OnnxSegmenter {
    fn segment(&mut self, frame: &Frame) -> Result<Vec<InstanceMask>> {
        let input = Self::preprocess(frame);
        let shape = [1usize, 3, frame.height, frame.width];
        let input_value =
            ort::value::Value::from_array((shape.as_slice(), input.into_boxed_slice()))?;

        let outputs = self.session.run(ort::inputs![input_value])?;

        if outputs.len() <= OUTPUT_MASKS {
            anyhow::bail!(
                "segmentation model returned {} outputs, expected boxes/labels/scores/masks",
                outputs.len()
            );
        }

        let (_, scores) = outputs[OUTPUT_SCORES].try_extract_tensor::<f32>()?;
        let scores = scores.to_vec();

        let (mask_shape, mask_data) = outputs[OUTPUT_MASKS].try_extract_tensor::<f32>()?;
        let dims: Vec<i64> = mask_shape.iter().copied().collect();
        let (count, mask_h, mask_w) = mask_dims(&dims)?;

        let count = count.min(scores.len());
        let mask_len = mask_h * mask_w;
        let mut instances = Vec::with_capacity(count);

        for i in 0..count {
            let start = i * mask_len;
            let end = start + mask_len;
            if end > mask_data.len() {
                break;
            }
            instances.push(InstanceMask {
                confidence: scores[i],
                mask: binarize_mask(&mask_data[start..end], MASK_BINARY_THRESHOLD),
                mask_width: mask_w,
                mask_height: mask_h,
            });
        }

        debug!("Segmentation found {} instances", instances.len());
        Ok(instances)
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// Accept mask tensors shaped [N, 1, H, W] or [N, H, W].
fn mask_dims(shape: &[i64]) -> Result<(usize, usize, usize)> {
    match shape {
        [n, 1, h, w] => Ok((*n as usize, *h as usize, *w as usize)),
        [n, h, w] => Ok((*n as usize, *h as usize, *w as usize)),
        other => anyhow::bail!("unexpected mask tensor shape {other:?}"),
    }
}

fn binarize_mask(soft: &[f32], threshold: f32) -> Vec<u8> {
    soft.iter()
        .map(|&p| if p > threshold { 255 } else { 0 })
        .collect()
}
