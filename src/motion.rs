// src/motion.rs
//
// Dense optical-flow motion features. The encoder is stateful: it keeps
// the previous grayscale frame (already at the target resolution) and
// emits per-pixel flow magnitude against it. The very first frame of a
// clip has no predecessor and yields the zero baseline, which is defined
// behavior, not an error.

use crate::types::Frame;
use anyhow::Result;
use opencv::{
    core::{self, Mat, Size},
    imgproc,
    prelude::*,
    video,
};

// Farneback parameters, fixed for every clip and the live demo alike.
const FLOW_PYR_SCALE: f64 = 0.5;
const FLOW_LEVELS: i32 = 3;
const FLOW_WINSIZE: i32 = 15;
const FLOW_ITERATIONS: i32 = 3;
const FLOW_POLY_N: i32 = 5;
const FLOW_POLY_SIGMA: f64 = 1.2;
const FLOW_FLAGS: i32 = 0;

pub struct MotionEncoder {
    resolution: usize,
    prev: Option<Mat>,
}

impl MotionEncoder {
    pub fn new(resolution: usize) -> Self {
        Self {
            resolution,
            prev: None,
        }
    }

    /// Motion vector length: one magnitude per pixel of the flow field.
    pub fn dim(&self) -> usize {
        self.resolution * self.resolution
    }

    /// Forget the previous frame at a clip boundary so the next frame
    /// starts a fresh zero-baseline sequence.
    pub fn reset(&mut self) {
        self.prev = None;
    }

    pub fn encode(&mut self, frame: &Frame) -> Result<Vec<f32>> {
        let gray = self.to_gray(frame)?;

        let prev = match self.prev.take() {
            Some(prev) => prev,
            None => {
                self.prev = Some(gray);
                return Ok(vec![0.0; self.dim()]);
            }
        };

        let mut flow = Mat::default();
        video::calc_optical_flow_farneback(
            &prev,
            &gray,
            &mut flow,
            FLOW_PYR_SCALE,
            FLOW_LEVELS,
            FLOW_WINSIZE,
            FLOW_ITERATIONS,
            FLOW_POLY_N,
            FLOW_POLY_SIGMA,
            FLOW_FLAGS,
        )?;

        let mut channels = core::Vector::<Mat>::new();
        core::split(&flow, &mut channels)?;
        let flow_x = channels.get(0)?;
        let flow_y = channels.get(1)?;

        let mut magnitude = Mat::default();
        let mut angle = Mat::default();
        core::cart_to_polar(&flow_x, &flow_y, &mut magnitude, &mut angle, false)?;

        let mut normalized = Mat::default();
        core::normalize(
            &magnitude,
            &mut normalized,
            0.0,
            255.0,
            core::NORM_MINMAX,
            -1,
            &core::no_array(),
        )?;

        let features = normalized.data_typed::<f32>()?.to_vec();

        self.prev = Some(gray);
        Ok(features)
    }

    /// Grayscale at the target resolution, independent of the source
    /// frame size. Resampling before flow keeps consecutive flow inputs
    /// at identical dimensions.
    fn to_gray(&self, frame: &Frame) -> Result<Mat> {
        let expected = frame.width * frame.height * 3;
        if frame.data.len() != expected {
            anyhow::bail!(
                "frame buffer holds {} bytes, expected {} for {}x{} RGB",
                frame.data.len(),
                expected,
                frame.width,
                frame.height
            );
        }

        let mat = Mat::from_slice(&frame.data)?;
        let mat = mat.reshape(3, frame.height as i32)?;

        let mut gray = Mat::default();
        imgproc::cvt_color_def(&mat, &mut gray, imgproc::COLOR_RGB2GRAY)?;

        let side = self.resolution as i32;
        let mut small = Mat::default();
        imgproc::resize(
            &gray,
            &mut small,
            Size::new(side, side),
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )?;

        Ok(small)
    }
}
