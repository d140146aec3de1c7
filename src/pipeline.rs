// src/pipeline.rs
//
// Per-frame feature pipeline and corpus extraction. Order within a frame
// is fixed: isolate the signer, then encode appearance and motion from
// the masked frame. The motion stage is stateful across frames of one
// clip, so clips must be processed frame-contiguously and the state
// reset at every clip boundary.

use crate::config::{Config, PipelineConfig};
use crate::features::{FeatureKind, FeatureStore};
use crate::foreground::ForegroundIsolator;
use crate::motion::MotionEncoder;
use crate::segmentation::{OnnxSegmenter, SegmentationModel};
use crate::spatial::{OnnxBackbone, SpatialEncoder};
use crate::types::Frame;
use crate::video::{find_clip_files, FrameSource, VideoFileSource};
use anyhow::Result;
use std::path::Path;
use tracing::{debug, info, warn};

pub struct FrameFeatures {
    pub spatial: Vec<f32>,
    pub motion: Vec<f32>,
}

impl FrameFeatures {
    /// Spatial followed by motion, the per-frame layout every window uses.
    pub fn combined(&self) -> Vec<f32> {
        let mut v = Vec::with_capacity(self.spatial.len() + self.motion.len());
        v.extend_from_slice(&self.spatial);
        v.extend_from_slice(&self.motion);
        v
    }
}

pub struct FeatureExtractor {
    isolator: ForegroundIsolator,
    spatial: Box<dyn SpatialEncoder>,
    motion: MotionEncoder,
}

impl FeatureExtractor {
    pub fn from_config(cfg: &PipelineConfig) -> Result<Self> {
        let segmenter = OnnxSegmenter::new(Path::new(&cfg.segmentation_model), cfg.intra_threads)?;
        let backbone = OnnxBackbone::new(
            Path::new(&cfg.backbone_model),
            cfg.backbone_input_size,
            cfg.backbone_dim,
            cfg.intra_threads,
        )?;

        Ok(Self::new(
            Box::new(segmenter),
            Box::new(backbone),
            MotionEncoder::new(cfg.motion_resolution),
        ))
    }

    pub fn new(
        segmenter: Box<dyn SegmentationModel>,
        spatial: Box<dyn SpatialEncoder>,
        motion: MotionEncoder,
    ) -> Self {
        Self {
            isolator: ForegroundIsolator::new(segmenter),
            spatial,
            motion,
        }
    }

    /// Combined per-frame vector length, spatial plus motion.
    pub fn feature_dim(&self) -> usize {
        self.spatial.dim() + self.motion.dim()
    }

    pub fn process_frame(&mut self, frame: &Frame) -> Result<FrameFeatures> {
        let masked = self.isolator.isolate(frame)?;
        let spatial = self.spatial.encode(&masked)?;
        let motion = self.motion.encode(&masked)?;
        Ok(FrameFeatures { spatial, motion })
    }

    /// Drop cross-frame state so the next frame starts a fresh clip.
    pub fn reset_clip(&mut self) {
        self.motion.reset();
    }
}

/// Run a whole clip through the extractor, caching both feature kinds
/// per frame. Returns the number of frames written.
pub fn featurize_clip(
    extractor: &mut FeatureExtractor,
    source: &mut dyn FrameSource,
    store: &FeatureStore,
    class_name: &str,
    clip_id: &str,
) -> Result<usize> {
    extractor.reset_clip();
    let mut index = 0usize;

    while let Some(frame) = source.next_frame()? {
        let features = extractor.process_frame(&frame)?;
        store.write_frame(class_name, clip_id, FeatureKind::Spatial, index, &features.spatial)?;
        store.write_frame(class_name, clip_id, FeatureKind::Motion, index, &features.motion)?;

        index += 1;
        if index % 25 == 0 {
            debug!("{}/{}: {} frames featurized", class_name, clip_id, index);
        }
    }

    Ok(index)
}

#[derive(Debug, Default)]
pub struct ExtractionSummary {
    pub clips_ok: usize,
    pub clips_failed: usize,
    pub frames: usize,
}

/// Featurize every clip under the video corpus root. A clip that fails
/// to decode or process is skipped with a warning; the corpus is only
/// unusable when it contains no clips at all.
pub fn extract_corpus(cfg: &Config) -> Result<ExtractionSummary> {
    let clips = find_clip_files(Path::new(&cfg.data.video_dir))?;
    if clips.is_empty() {
        anyhow::bail!("no clip files found under {}", cfg.data.video_dir);
    }

    let mut extractor = FeatureExtractor::from_config(&cfg.pipeline)?;
    let store = FeatureStore::new(&cfg.data.features_dir);
    let mut summary = ExtractionSummary::default();

    for clip in &clips {
        info!("🎬 Extracting {}/{}", clip.class_name, clip.clip_id);

        let result = VideoFileSource::open(&clip.path).and_then(|mut source| {
            featurize_clip(
                &mut extractor,
                &mut source,
                &store,
                &clip.class_name,
                &clip.clip_id,
            )
        });

        match result {
            Ok(frames) => {
                summary.clips_ok += 1;
                summary.frames += frames;
            }
            Err(e) => {
                summary.clips_failed += 1;
                warn!("⚠️ Skipping {}/{}: {:#}", clip.class_name, clip.clip_id, e);
            }
        }
    }

    info!(
        "✅ Feature extraction complete: {} clips, {} frames, {} failed",
        summary.clips_ok, summary.frames, summary.clips_failed
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::InstanceMask;

    struct KeepAllSegmenter;

    impl SegmentationModel for KeepAllSegmenter {
        fn segment(&mut self, frame: &Frame) -> Result<Vec<InstanceMask>> {
            Ok(vec![InstanceMask {
                confidence: 1.0,
                mask: vec![255; frame.width * frame.height],
                mask_width: frame.width,
                mask_height: frame.height,
            }])
        }
    }

    /// Deterministic stand-in for the backbone: mean intensity per
    /// channel plus a constant slot.
    struct FakeSpatial;

    impl SpatialEncoder for FakeSpatial {
        fn dim(&self) -> usize {
            4
        }

        fn encode(&mut self, frame: &Frame) -> Result<Vec<f32>> {
            let mut sums = [0.0f32; 3];
            for px in frame.data.chunks_exact(3) {
                for c in 0..3 {
                    sums[c] += px[c] as f32;
                }
            }
            let n = frame.pixel_count().max(1) as f32;
            Ok(vec![sums[0] / n, sums[1] / n, sums[2] / n, 1.0])
        }
    }

    struct ScriptedSource {
        frames: Vec<Frame>,
    }

    impl FrameSource for ScriptedSource {
        fn next_frame(&mut self) -> Result<Option<Frame>> {
            if self.frames.is_empty() {
                Ok(None)
            } else {
                Ok(Some(self.frames.remove(0)))
            }
        }
    }

    fn textured_frame(shift: usize) -> Frame {
        let (width, height) = (32, 32);
        let mut data = vec![0u8; width * height * 3];
        for y in 0..height {
            for x in 0..width {
                let v = (((x + shift) * 5 + y * 3) % 256) as u8;
                let base = (y * width + x) * 3;
                data[base] = v;
                data[base + 1] = v / 2;
                data[base + 2] = v / 3;
            }
        }
        Frame {
            data,
            width,
            height,
            timestamp: shift as f64,
        }
    }

    fn test_extractor() -> FeatureExtractor {
        FeatureExtractor::new(
            Box::new(KeepAllSegmenter),
            Box::new(FakeSpatial),
            MotionEncoder::new(16),
        )
    }

    #[test]
    fn test_combined_length_and_first_frame_baseline() {
        let mut extractor = test_extractor();
        assert_eq!(extractor.feature_dim(), 4 + 16 * 16);

        let features = extractor.process_frame(&textured_frame(0)).unwrap();
        assert_eq!(features.combined().len(), extractor.feature_dim());
        assert!(features.motion.iter().all(|&v| v == 0.0));

        let next = extractor.process_frame(&textured_frame(2)).unwrap();
        assert_eq!(next.motion.len(), 16 * 16);
    }

    #[test]
    fn test_combined_orders_spatial_before_motion() {
        let mut extractor = test_extractor();
        let features = extractor.process_frame(&textured_frame(0)).unwrap();
        let combined = features.combined();
        assert_eq!(&combined[..4], features.spatial.as_slice());
        assert_eq!(&combined[4..], features.motion.as_slice());
    }

    #[test]
    fn test_reset_clip_restores_motion_baseline() {
        let mut extractor = test_extractor();
        extractor.process_frame(&textured_frame(0)).unwrap();
        extractor.process_frame(&textured_frame(1)).unwrap();

        extractor.reset_clip();
        let features = extractor.process_frame(&textured_frame(2)).unwrap();
        assert!(features.motion.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_featurize_clip_writes_both_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let store = FeatureStore::new(dir.path());
        let mut extractor = test_extractor();

        let mut source = ScriptedSource {
            frames: (0..3).map(textured_frame).collect(),
        };
        let frames = featurize_clip(&mut extractor, &mut source, &store, "hello", "clip_0").unwrap();
        assert_eq!(frames, 3);

        let spatial = store.read_clip("hello", "clip_0", FeatureKind::Spatial).unwrap();
        let motion = store.read_clip("hello", "clip_0", FeatureKind::Motion).unwrap();
        assert_eq!(spatial.len(), 3);
        assert_eq!(motion.len(), 3);
        assert!(spatial.iter().all(|f| f.len() == 4));
        assert!(motion.iter().all(|f| f.len() == 256));
        // First frame of the clip carries the zero motion baseline
        assert!(motion[0].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_featurize_clip_resets_between_clips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FeatureStore::new(dir.path());
        let mut extractor = test_extractor();

        let mut first = ScriptedSource {
            frames: (0..2).map(textured_frame).collect(),
        };
        featurize_clip(&mut extractor, &mut first, &store, "hello", "clip_0").unwrap();

        let mut second = ScriptedSource {
            frames: (3..5).map(textured_frame).collect(),
        };
        featurize_clip(&mut extractor, &mut second, &store, "hello", "clip_1").unwrap();

        let motion = store.read_clip("hello", "clip_1", FeatureKind::Motion).unwrap();
        assert!(motion[0].iter().all(|&v| v == 0.0));
    }
}
