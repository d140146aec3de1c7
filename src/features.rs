// src/features.rs
//
// Persisted per-frame feature cache. One JSON file per frame per kind:
//
//   <root>/<class>/<clip>/spatial_features/frame_0000.json
//   <root>/<class>/<clip>/motion_features/frame_0000.json
//
// File names are zero-padded so lexicographic order is frame order.
// Featurization is expensive; everything downstream (training,
// evaluation, window assembly) rebuilds from these files instead of
// re-running the encoders.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    Spatial,
    Motion,
}

impl FeatureKind {
    pub fn dir_name(&self) -> &'static str {
        match self {
            FeatureKind::Spatial => "spatial_features",
            FeatureKind::Motion => "motion_features",
        }
    }
}

pub struct FeatureStore {
    root: PathBuf,
}

impl FeatureStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn kind_dir(&self, class_name: &str, clip_id: &str, kind: FeatureKind) -> PathBuf {
        self.root.join(class_name).join(clip_id).join(kind.dir_name())
    }

    pub fn write_frame(
        &self,
        class_name: &str,
        clip_id: &str,
        kind: FeatureKind,
        frame_index: usize,
        values: &[f32],
    ) -> Result<()> {
        let dir = self.kind_dir(class_name, clip_id, kind);
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create feature dir {}", dir.display()))?;

        let path = dir.join(frame_file_name(frame_index));
        let file = File::create(&path)
            .with_context(|| format!("failed to create feature file {}", path.display()))?;
        serde_json::to_writer(BufWriter::new(file), values)
            .with_context(|| format!("failed to write feature file {}", path.display()))?;

        Ok(())
    }

    /// Read every frame array of one kind for a clip, in frame order.
    /// A corrupt or unreadable file is fatal: silently skipping one
    /// array would break window contiguity for the whole clip.
    pub fn read_clip(
        &self,
        class_name: &str,
        clip_id: &str,
        kind: FeatureKind,
    ) -> Result<Vec<Vec<f32>>> {
        let dir = self.kind_dir(class_name, clip_id, kind);
        let entries = fs::read_dir(&dir)
            .with_context(|| format!("failed to read feature dir {}", dir.display()))?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
            .collect();
        paths.sort();

        let mut frames = Vec::with_capacity(paths.len());
        for path in paths {
            let file = File::open(&path)
                .with_context(|| format!("failed to open feature file {}", path.display()))?;
            let values: Vec<f32> = serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("corrupt feature file {}", path.display()))?;
            frames.push(values);
        }

        Ok(frames)
    }
}

fn frame_file_name(index: usize) -> String {
    format!("frame_{index:04}.json")
}
