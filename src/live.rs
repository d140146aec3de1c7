// src/live.rs
//
// Real-time recognition: camera frames feed the same feature pipeline
// the corpus was built with, a streaming window assembles them, and the
// classifier scores the window once the buffer is full. The loop is
// single-threaded and cooperative: one blocking camera read per
// iteration, quit key polled once per frame after processing completes.

use crate::config::Config;
use crate::model::classify_window;
use crate::pipeline::FeatureExtractor;
use crate::trainer::{load_checkpoint, InferenceBackend};
use crate::types::{ClassMap, Frame, Prediction};
use crate::video::{CameraSource, FrameSource};
use crate::window::StreamingWindow;
use anyhow::Result;
use burn::tensor::backend::Backend;
use opencv::{core, highgui, imgproc, prelude::*};
use std::path::Path;
use tracing::{info, warn};

const KEY_ESC: i32 = 27;
const KEY_Q: i32 = 113;

/// Display-policy outcome for one classified window. Low confidence is
/// a defined state, not an error: flickery guesses are suppressed in
/// favor of an explicit "no sign detected".
#[derive(Debug, Clone, PartialEq)]
pub enum LiveDecision {
    Sign { name: String, confidence: f32 },
    NoSign,
}

/// Strictly-above threshold; a prediction at exactly the threshold is
/// still rejected.
pub fn decide(prediction: &Prediction, classes: &ClassMap, threshold: f32) -> LiveDecision {
    if prediction.confidence > threshold {
        if let Some(name) = classes.name_of(prediction.class_id) {
            return LiveDecision::Sign {
                name: name.to_string(),
                confidence: prediction.confidence,
            };
        }
    }
    LiveDecision::NoSign
}

pub fn run_live(cfg: &Config) -> Result<()> {
    let (model, meta) = load_checkpoint(Path::new(&cfg.data.checkpoint_path))?;

    let mut extractor = FeatureExtractor::from_config(&cfg.pipeline)?;
    if extractor.feature_dim() != meta.feature_dim {
        anyhow::bail!(
            "pipeline produces {}-dim features but the checkpoint was trained on {} — \
             check backbone_dim and motion_resolution against the training run",
            extractor.feature_dim(),
            meta.feature_dim
        );
    }

    let device = <InferenceBackend as Backend>::Device::default();
    let mut window = StreamingWindow::new(meta.sequence_length);
    let mut camera = CameraSource::open(cfg.live.camera_index)?;

    highgui::named_window(&cfg.live.window_name, highgui::WINDOW_AUTOSIZE)?;
    info!("🤟 Live recognition started — press q to quit");

    loop {
        // The one blocking point per iteration
        let frame = match camera.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                warn!("Camera stream ended");
                break;
            }
            Err(e) => {
                warn!("⚠️ Camera read failed, stopping: {:#}", e);
                break;
            }
        };

        // A frame the pipeline cannot process terminates the loop; the
        // buffer never sees a partial feature vector.
        let features = match extractor.process_frame(&frame) {
            Ok(features) => features,
            Err(e) => {
                warn!("⚠️ Frame processing failed, stopping: {:#}", e);
                break;
            }
        };
        window.push(features.combined());

        let verdict = match window.window() {
            Some(flat) => {
                let prediction = classify_window(
                    &model,
                    &flat,
                    meta.sequence_length,
                    meta.feature_dim,
                    &device,
                )?;
                Some(decide(&prediction, &meta.class_map, cfg.live.confidence_threshold))
            }
            None => None,
        };

        let mut display = frame_to_bgr(&frame)?;
        draw_verdict(&mut display, &verdict, window.len(), window.capacity())?;
        highgui::imshow(&cfg.live.window_name, &display)?;

        let key = highgui::wait_key(1)?;
        if key == KEY_Q || key == KEY_ESC {
            info!("Quit requested");
            break;
        }
    }

    highgui::destroy_all_windows()?;
    info!("✅ Live recognition stopped");
    Ok(())
}

fn frame_to_bgr(frame: &Frame) -> Result<Mat> {
    let rgb = Mat::from_slice(&frame.data)?;
    let rgb = rgb.reshape(3, frame.height as i32)?;
    let mut bgr = Mat::default();
    imgproc::cvt_color_def(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR)?;
    Ok(bgr)
}

fn draw_verdict(
    display: &mut Mat,
    verdict: &Option<LiveDecision>,
    buffered: usize,
    capacity: usize,
) -> Result<()> {
    imgproc::rectangle(
        display,
        core::Rect::new(5, 5, 420, 50),
        core::Scalar::new(40.0, 40.0, 40.0, 0.0),
        -1,
        imgproc::LINE_8,
        0,
    )?;

    let (text, color) = match verdict {
        None => (
            format!("collecting frames {}/{}", buffered, capacity),
            core::Scalar::new(200.0, 200.0, 200.0, 0.0),
        ),
        Some(LiveDecision::Sign { name, confidence }) => (
            format!("{} {:.1}%", name.to_uppercase(), confidence * 100.0),
            core::Scalar::new(0.0, 255.0, 0.0, 0.0),
        ),
        Some(LiveDecision::NoSign) => (
            "no sign detected".to_string(),
            core::Scalar::new(200.0, 200.0, 200.0, 0.0),
        ),
    };

    imgproc::put_text(
        display,
        &text,
        core::Point::new(15, 38),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.8,
        color,
        2,
        imgproc::LINE_8,
        false,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classes() -> ClassMap {
        ClassMap::from_names(vec!["hello".to_string(), "thanks".to_string()])
    }

    #[test]
    fn test_confident_prediction_names_the_sign() {
        let prediction = Prediction {
            class_id: 0,
            confidence: 0.95,
        };
        let decision = decide(&prediction, &classes(), 0.90);
        assert_eq!(
            decision,
            LiveDecision::Sign {
                name: "hello".to_string(),
                confidence: 0.95
            }
        );
    }

    #[test]
    fn test_low_confidence_is_no_sign() {
        let prediction = Prediction {
            class_id: 0,
            confidence: 0.6,
        };
        assert_eq!(decide(&prediction, &classes(), 0.90), LiveDecision::NoSign);
    }

    #[test]
    fn test_threshold_is_strict() {
        let prediction = Prediction {
            class_id: 1,
            confidence: 0.90,
        };
        assert_eq!(decide(&prediction, &classes(), 0.90), LiveDecision::NoSign);
    }

    #[test]
    fn test_out_of_range_class_id_is_no_sign() {
        let prediction = Prediction {
            class_id: 7,
            confidence: 0.99,
        };
        assert_eq!(decide(&prediction, &classes(), 0.90), LiveDecision::NoSign);
    }
}
