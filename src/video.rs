// src/video.rs

use crate::types::Frame;
use anyhow::{Context, Result};
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;
use walkdir::WalkDir;

const VIDEO_EXTENSIONS: [&str; 8] = ["mp4", "avi", "mov", "mkv", "MP4", "AVI", "MOV", "MKV"];

/// A source of decoded RGB frames: file-backed for dataset preparation,
/// device-backed for the live demo. `Ok(None)` means end of stream.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// One raw clip discovered under the video corpus root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipEntry {
    pub class_name: String,
    pub clip_id: String,
    pub path: PathBuf,
}

/// Find all clip files under `root`, expected layout `root/<class>/<clip>`.
/// Returned entries are sorted by class then clip id, so processing order
/// is deterministic across runs.
pub fn find_clip_files(root: &Path) -> Result<Vec<ClipEntry>> {
    let mut clips = Vec::new();

    for entry in WalkDir::new(root)
        .min_depth(2)
        .max_depth(2)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if !VIDEO_EXTENSIONS.contains(&ext) {
            continue;
        }

        let class_name = path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str());
        let clip_id = path.file_stem().and_then(|s| s.to_str());

        if let (Some(class_name), Some(clip_id)) = (class_name, clip_id) {
            clips.push(ClipEntry {
                class_name: class_name.to_string(),
                clip_id: clip_id.to_string(),
                path: path.to_path_buf(),
            });
        }
    }

    clips.sort_by(|a, b| {
        (a.class_name.as_str(), a.clip_id.as_str()).cmp(&(b.class_name.as_str(), b.clip_id.as_str()))
    });

    info!("Found {} clip files under {}", clips.len(), root.display());
    Ok(clips)
}

/// Frame source reading a stored clip file.
pub struct VideoFileSource {
    cap: VideoCapture,
    fps: f64,
    frame_index: u64,
}

impl VideoFileSource {
    pub fn open(path: &Path) -> Result<Self> {
        let path_str = path
            .to_str()
            .with_context(|| format!("non-UTF-8 video path {}", path.display()))?;
        let cap = VideoCapture::from_file(path_str, videoio::CAP_ANY)
            .with_context(|| format!("failed to open video {}", path.display()))?;

        if !cap.is_opened()? {
            anyhow::bail!("failed to open video {}", path.display());
        }

        let fps = cap.get(videoio::CAP_PROP_FPS)?;
        let fps = if fps > 0.0 { fps } else { 30.0 };
        let total_frames = cap.get(videoio::CAP_PROP_FRAME_COUNT)? as i64;

        info!(
            "Opened {} @ {:.1} FPS, {} frames",
            path.display(),
            fps,
            total_frames
        );

        Ok(Self {
            cap,
            fps,
            frame_index: 0,
        })
    }
}

impl FrameSource for VideoFileSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let timestamp = self.frame_index as f64 / self.fps;
        match read_rgb_frame(&mut self.cap, timestamp)? {
            Some(frame) => {
                self.frame_index += 1;
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }
}

/// Frame source reading a live capture device.
pub struct CameraSource {
    cap: VideoCapture,
    started: Instant,
}

impl CameraSource {
    pub fn open(index: i32) -> Result<Self> {
        let cap = VideoCapture::new(index, videoio::CAP_ANY)
            .with_context(|| format!("failed to open camera {index}"))?;

        if !cap.is_opened()? {
            anyhow::bail!("camera {index} is not available");
        }

        info!("📷 Camera {} opened", index);

        Ok(Self {
            cap,
            started: Instant::now(),
        })
    }
}

impl FrameSource for CameraSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let timestamp = self.started.elapsed().as_secs_f64();
        read_rgb_frame(&mut self.cap, timestamp)
    }
}

fn read_rgb_frame(cap: &mut VideoCapture, timestamp: f64) -> Result<Option<Frame>> {
    let mut mat = Mat::default();

    if !cap.read(&mut mat)? || mat.empty() {
        return Ok(None);
    }

    let mut rgb = Mat::default();
    imgproc::cvt_color_def(&mat, &mut rgb, imgproc::COLOR_BGR2RGB)?;

    let width = rgb.cols() as usize;
    let height = rgb.rows() as usize;
    let data = rgb.data_bytes()?.to_vec();

    Ok(Some(Frame {
        data,
        width,
        height,
        timestamp,
    }))
}
