// src/corpus.rs
//
// Corpus assembly from the persisted feature cache: class enumeration,
// per-clip spatial/motion pairing, and stride-1 window bookkeeping.
// Windows are (clip, start) views regenerated on every load, never
// stored entities.

use crate::features::{FeatureKind, FeatureStore};
use crate::types::{ClassMap, FeatureVector};
use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// All cached features of one clip, combined spatial ⧺ motion per frame.
#[derive(Debug, Clone)]
pub struct ClipFeatures {
    pub class_id: usize,
    pub class_name: String,
    pub clip_id: String,
    pub frames: Vec<FeatureVector>,
}

#[derive(Debug, Clone)]
pub struct Corpus {
    pub clips: Vec<ClipFeatures>,
    pub class_map: ClassMap,
    /// Combined per-frame feature width, constant across the corpus.
    pub dim: usize,
}

impl Corpus {
    /// Re-label every clip against a previously persisted class map, so
    /// evaluation agrees with the ids the checkpoint was trained with.
    pub fn align_to(&mut self, target: &ClassMap) -> Result<()> {
        for clip in &mut self.clips {
            let id = target.id_of(&clip.class_name).with_context(|| {
                format!(
                    "class '{}' is present in the corpus but missing from the checkpoint class map",
                    clip.class_name
                )
            })?;
            clip.class_id = id;
        }
        self.class_map = target.clone();
        Ok(())
    }
}

/// Enumerate class directories under the cache root in sorted order.
pub fn build_class_map(root: &Path) -> Result<ClassMap> {
    let names = list_subdirs(root)
        .with_context(|| format!("failed to enumerate classes under {}", root.display()))?;
    Ok(ClassMap::from_names(names))
}

/// Load every complete clip under the cache root. Incomplete clips
/// (missing a feature kind) are skipped with a warning; corrupt feature
/// files abort the load.
pub fn load_corpus(root: &Path) -> Result<Corpus> {
    let class_map = build_class_map(root)?;
    if class_map.is_empty() {
        anyhow::bail!("no class directories under {}", root.display());
    }

    let store = FeatureStore::new(root);
    let mut clips = Vec::new();
    let mut dim = 0usize;
    let mut skipped = 0usize;

    for class_name in class_map.names() {
        let class_id = class_map
            .id_of(class_name)
            .context("class map lost a name it produced")?;
        let class_dir = root.join(class_name);

        let mut clip_ids = list_subdirs(&class_dir)?;
        clip_ids.sort();

        for clip_id in clip_ids {
            let spatial_dir = store.kind_dir(class_name, &clip_id, FeatureKind::Spatial);
            let motion_dir = store.kind_dir(class_name, &clip_id, FeatureKind::Motion);
            if !spatial_dir.is_dir() || !motion_dir.is_dir() {
                warn!(
                    "⚠️ Skipping incomplete clip {}/{} (missing feature kind)",
                    class_name, clip_id
                );
                skipped += 1;
                continue;
            }

            let spatial = store.read_clip(class_name, &clip_id, FeatureKind::Spatial)?;
            let motion = store.read_clip(class_name, &clip_id, FeatureKind::Motion)?;

            // Counts can drift when extraction was interrupted; pair up
            // to the shorter side rather than failing the load.
            let count = spatial.len().min(motion.len());
            if spatial.len() != motion.len() {
                debug!(
                    "Clip {}/{}: {} spatial vs {} motion frames, truncating to {}",
                    class_name,
                    clip_id,
                    spatial.len(),
                    motion.len(),
                    count
                );
            }
            if count == 0 {
                warn!("⚠️ Skipping empty clip {}/{}", class_name, clip_id);
                skipped += 1;
                continue;
            }

            let frames: Vec<FeatureVector> = spatial
                .into_iter()
                .zip(motion)
                .take(count)
                .map(|(mut s, m)| {
                    s.extend(m);
                    s
                })
                .collect();

            if dim == 0 {
                dim = frames[0].len();
            }
            for (i, frame) in frames.iter().enumerate() {
                if frame.len() != dim {
                    anyhow::bail!(
                        "feature width mismatch in {}/{} frame {}: {} vs corpus width {}",
                        class_name,
                        clip_id,
                        i,
                        frame.len(),
                        dim
                    );
                }
            }

            clips.push(ClipFeatures {
                class_id,
                class_name: class_name.clone(),
                clip_id,
                frames,
            });
        }
    }

    if clips.is_empty() {
        anyhow::bail!("no complete clips under {}", root.display());
    }

    info!(
        "Corpus loaded: {} clips, {} classes, feature width {} ({} skipped)",
        clips.len(),
        class_map.len(),
        dim,
        skipped
    );

    Ok(Corpus {
        clips,
        class_map,
        dim,
    })
}

fn list_subdirs(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("failed to read directory {}", dir.display()))?
    {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

// ============================================================================
// WINDOWING
// ============================================================================

/// Stride-1 window count for a clip of `len` frames.
pub fn window_count(len: usize, t: usize) -> usize {
    if t == 0 || len < t {
        0
    } else {
        len - t + 1
    }
}

/// A window is a view into one clip: frames [start, start + T).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowIndex {
    pub clip: usize,
    pub start: usize,
}

/// All (window, label) pairs of the corpus in deterministic clip order.
/// Clips shorter than the window length contribute nothing and are
/// reported, not failed.
pub fn enumerate_windows(corpus: &Corpus, t: usize) -> Vec<WindowIndex> {
    let mut windows = Vec::new();

    for (idx, clip) in corpus.clips.iter().enumerate() {
        let count = window_count(clip.frames.len(), t);
        if count == 0 {
            warn!(
                "⚠️ Clip {}/{} has {} frames, below window length {} — no windows",
                clip.class_name,
                clip.clip_id,
                clip.frames.len(),
                t
            );
            continue;
        }
        for start in 0..count {
            windows.push(WindowIndex { clip: idx, start });
        }
    }

    windows
}

/// Train/validation window split over a loaded corpus. The shuffle is
/// seeded, so the same corpus and seed always produce the same split.
pub struct WindowDataset {
    corpus: Corpus,
    sequence_length: usize,
    train: Vec<WindowIndex>,
    val: Vec<WindowIndex>,
}

impl WindowDataset {
    pub fn build(corpus: Corpus, sequence_length: usize, val_split: f64, seed: u64) -> Result<Self> {
        if sequence_length == 0 {
            anyhow::bail!("window length must be at least 1");
        }

        let mut windows = enumerate_windows(&corpus, sequence_length);
        if windows.is_empty() {
            anyhow::bail!(
                "corpus produced no windows for window length {sequence_length} — all clips too short?"
            );
        }

        let mut rng = StdRng::seed_from_u64(seed);
        windows.shuffle(&mut rng);

        let val_len = ((windows.len() as f64) * val_split).round() as usize;
        let val_len = val_len.min(windows.len() - 1);
        let val = windows.split_off(windows.len() - val_len);

        info!(
            "Dataset ready: {} training windows, {} validation windows, {} classes",
            windows.len(),
            val.len(),
            corpus.class_map.len()
        );

        Ok(Self {
            corpus,
            sequence_length,
            train: windows,
            val,
        })
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    pub fn feature_dim(&self) -> usize {
        self.corpus.dim
    }

    pub fn num_classes(&self) -> usize {
        self.corpus.class_map.len()
    }

    pub fn train_windows(&self) -> &[WindowIndex] {
        &self.train
    }

    pub fn val_windows(&self) -> &[WindowIndex] {
        &self.val
    }

    /// Flatten a set of windows into a contiguous batch buffer plus
    /// labels, laid out [windows, T, dim] row-major.
    pub fn gather(&self, windows: &[WindowIndex]) -> (Vec<f32>, Vec<i64>) {
        let t = self.sequence_length;
        let mut flat = Vec::with_capacity(windows.len() * t * self.corpus.dim);
        let mut labels = Vec::with_capacity(windows.len());

        for w in windows {
            let clip = &self.corpus.clips[w.clip];
            for frame in &clip.frames[w.start..w.start + t] {
                flat.extend_from_slice(frame);
            }
            labels.push(clip.class_id as i64);
        }

        (flat, labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FeatureKind, FeatureStore};

    fn write_clip(
        store: &FeatureStore,
        class_name: &str,
        clip_id: &str,
        spatial_frames: usize,
        motion_frames: usize,
    ) {
        for i in 0..spatial_frames {
            store
                .write_frame(class_name, clip_id, FeatureKind::Spatial, i, &[i as f32, 1.0, 2.0])
                .unwrap();
        }
        for i in 0..motion_frames {
            store
                .write_frame(class_name, clip_id, FeatureKind::Motion, i, &[10.0, 20.0])
                .unwrap();
        }
    }

    #[test]
    fn test_window_count() {
        assert_eq!(window_count(12, 10), 3);
        assert_eq!(window_count(10, 10), 1);
        assert_eq!(window_count(9, 10), 0);
        assert_eq!(window_count(5, 1), 5);
        assert_eq!(window_count(0, 10), 0);
        assert_eq!(window_count(5, 0), 0);
    }

    #[test]
    fn test_class_map_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        for class in ["zebra", "alpha", "mid"] {
            std::fs::create_dir_all(dir.path().join(class)).unwrap();
        }

        let first = build_class_map(dir.path()).unwrap();
        let second = build_class_map(dir.path()).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.id_of("alpha"), Some(0));
        assert_eq!(first.id_of("mid"), Some(1));
        assert_eq!(first.id_of("zebra"), Some(2));
    }

    #[test]
    fn test_load_corpus_combines_and_labels() {
        let dir = tempfile::tempdir().unwrap();
        let store = FeatureStore::new(dir.path());
        write_clip(&store, "hello", "clip_0", 12, 12);
        write_clip(&store, "thanks", "clip_0", 12, 12);

        let corpus = load_corpus(dir.path()).unwrap();

        assert_eq!(corpus.clips.len(), 2);
        assert_eq!(corpus.dim, 5); // 3 spatial + 2 motion
        assert_eq!(corpus.clips[0].class_name, "hello");
        assert_eq!(corpus.clips[0].class_id, 0);
        assert_eq!(corpus.clips[1].class_id, 1);
        // Combined vector is spatial then motion
        assert_eq!(corpus.clips[0].frames[3], vec![3.0, 1.0, 2.0, 10.0, 20.0]);

        let windows = enumerate_windows(&corpus, 10);
        assert_eq!(windows.len(), 6); // 3 per 12-frame clip

        // Contiguity: every start stays in range
        for w in &windows {
            assert!(w.start + 10 <= corpus.clips[w.clip].frames.len());
        }
    }

    #[test]
    fn test_unequal_counts_truncate_to_minimum() {
        let dir = tempfile::tempdir().unwrap();
        let store = FeatureStore::new(dir.path());
        write_clip(&store, "hello", "clip_0", 5, 3);

        let corpus = load_corpus(dir.path()).unwrap();
        assert_eq!(corpus.clips[0].frames.len(), 3);
    }

    #[test]
    fn test_incomplete_clip_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = FeatureStore::new(dir.path());
        write_clip(&store, "hello", "good", 4, 4);
        // Only spatial features, no motion directory
        for i in 0..4 {
            store
                .write_frame("hello", "broken", FeatureKind::Spatial, i, &[0.0, 0.0, 0.0])
                .unwrap();
        }

        let corpus = load_corpus(dir.path()).unwrap();
        assert_eq!(corpus.clips.len(), 1);
        assert_eq!(corpus.clips[0].clip_id, "good");
    }

    #[test]
    fn test_short_clip_yields_zero_windows() {
        let dir = tempfile::tempdir().unwrap();
        let store = FeatureStore::new(dir.path());
        write_clip(&store, "hello", "long", 12, 12);
        write_clip(&store, "hello", "short", 4, 4);

        let corpus = load_corpus(dir.path()).unwrap();
        let windows = enumerate_windows(&corpus, 10);
        assert_eq!(windows.len(), 3); // only the long clip contributes
    }

    #[test]
    fn test_dataset_split_is_seeded() {
        let dir = tempfile::tempdir().unwrap();
        let store = FeatureStore::new(dir.path());
        write_clip(&store, "hello", "clip_0", 14, 14);
        write_clip(&store, "thanks", "clip_0", 14, 14);

        let a = WindowDataset::build(load_corpus(dir.path()).unwrap(), 10, 0.2, 9).unwrap();
        let b = WindowDataset::build(load_corpus(dir.path()).unwrap(), 10, 0.2, 9).unwrap();

        assert_eq!(a.train_windows(), b.train_windows());
        assert_eq!(a.val_windows(), b.val_windows());
        assert_eq!(a.train_windows().len() + a.val_windows().len(), 10);
        assert_eq!(a.val_windows().len(), 2);
    }

    #[test]
    fn test_gather_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FeatureStore::new(dir.path());
        write_clip(&store, "hello", "clip_0", 12, 12);

        let dataset = WindowDataset::build(load_corpus(dir.path()).unwrap(), 10, 0.0, 1).unwrap();
        let windows = dataset.train_windows().to_vec();
        let (flat, labels) = dataset.gather(&windows);

        assert_eq!(labels.len(), windows.len());
        assert_eq!(flat.len(), windows.len() * 10 * 5);
        assert!(labels.iter().all(|&l| l == 0));
    }

    #[test]
    fn test_align_to_checkpoint_map() {
        let dir = tempfile::tempdir().unwrap();
        let store = FeatureStore::new(dir.path());
        write_clip(&store, "hello", "clip_0", 4, 4);

        let mut corpus = load_corpus(dir.path()).unwrap();
        // Checkpoint trained with an extra class sorted ahead of "hello"
        let persisted = ClassMap::from_names(vec!["goodbye".to_string(), "hello".to_string()]);
        corpus.align_to(&persisted).unwrap();
        assert_eq!(corpus.clips[0].class_id, 1);

        let missing = ClassMap::from_names(vec!["other".to_string()]);
        assert!(corpus.align_to(&missing).is_err());
    }
}
