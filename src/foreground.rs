// src/foreground.rs

use crate::segmentation::{InstanceMask, SegmentationModel};
use crate::types::Frame;
use anyhow::Result;
use tracing::debug;

/// Removes everything but the signer from a frame. Selection policy is
/// best-available: the highest-confidence instance wins, with no minimum
/// score. When the segmenter finds nothing the frame passes through
/// untouched — recognition keeps running on the full frame (fail-open).
pub struct ForegroundIsolator {
    segmenter: Box<dyn SegmentationModel>,
}

impl ForegroundIsolator {
    pub fn new(segmenter: Box<dyn SegmentationModel>) -> Self {
        Self { segmenter }
    }

    pub fn isolate(&mut self, frame: &Frame) -> Result<Frame> {
        let instances = self.segmenter.segment(frame)?;

        match best_mask(&instances) {
            Some(best) => Ok(apply_mask(frame, best)),
            None => {
                debug!("No foreground mask at t={:.2}s, passing frame through", frame.timestamp);
                Ok(frame.clone())
            }
        }
    }
}

fn best_mask(instances: &[InstanceMask]) -> Option<&InstanceMask> {
    instances.iter().max_by(|a, b| {
        a.confidence
            .partial_cmp(&b.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    })
}

/// Zero every pixel outside the mask. The mask is nearest-neighbor
/// resampled when its resolution differs from the frame's.
fn apply_mask(frame: &Frame, instance: &InstanceMask) -> Frame {
    let mut out = frame.clone();
    let (w, h) = (frame.width, frame.height);
    let (mw, mh) = (instance.mask_width, instance.mask_height);

    if mw == 0 || mh == 0 {
        return out;
    }

    for y in 0..h {
        let my = y * mh / h;
        for x in 0..w {
            let mx = x * mw / w;
            if instance.mask[my * mw + mx] == 0 {
                let base = (y * w + x) * 3;
                out.data[base] = 0;
                out.data[base + 1] = 0;
                out.data[base + 2] = 0;
            }
        }
    }

    out
}
