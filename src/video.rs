// src/video.rs

use std::path::{Path, PathBuf};

use anyhow::Result;
use opencv::{
    core::{self, Mat},
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTraitConst, VideoWriter},
};
use tracing::info;
use walkdir::WalkDir;

use crate::error::CountError;
use crate::types::{Frame, VideoConfig};

pub fn find_video_files(config: &VideoConfig) -> Result<Vec<PathBuf>> {
    let mut videos = Vec::new();

    let video_extensions = ["mp4", "avi", "mov", "mkv", "MP4", "AVI", "MOV", "MKV"];

    for entry in WalkDir::new(&config.input_dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if let Some(ext) = path.extension() {
            if video_extensions.contains(&ext.to_str().unwrap_or("")) {
                videos.push(path.to_path_buf());
            }
        }
    }
    videos.sort();

    info!("Found {} video files", videos.len());
    Ok(videos)
}

pub fn open_video(path: &Path, resize_factor: f32) -> Result<VideoReader> {
    info!("Opening video: {}", path.display());

    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("non-UTF8 video path: {}", path.display()))?;
    let cap = VideoCapture::from_file(path_str, videoio::CAP_ANY)?;

    if !cap.is_opened()? {
        return Err(CountError::source(format!(
            "failed to open video file: {}",
            path.display()
        ))
        .into());
    }

    let fps = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FPS)?;
    let total_frames = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_COUNT)? as i32;
    let src_width = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_WIDTH)? as i32;
    let src_height = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_HEIGHT)? as i32;

    if src_width <= 0 || src_height <= 0 {
        return Err(CountError::source(format!(
            "video reports invalid dimensions {}x{}: {}",
            src_width,
            src_height,
            path.display()
        ))
        .into());
    }

    let width = ((src_width as f32 * resize_factor) as i32).max(1);
    let height = ((src_height as f32 * resize_factor) as i32).max(1);

    info!(
        "Video properties: {}x{} @ {:.1} FPS, {} frames (processing at {}x{})",
        src_width, src_height, fps, total_frames, width, height
    );

    Ok(VideoReader {
        cap,
        fps,
        total_frames,
        current_frame: 0,
        width,
        height,
    })
}

pub fn create_writer(
    config: &VideoConfig,
    input_path: &Path,
    width: i32,
    height: i32,
    fps: f64,
) -> Result<Option<VideoWriter>> {
    if !config.save_annotated {
        return Ok(None);
    }

    std::fs::create_dir_all(&config.output_dir)?;

    let input_name = input_path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow::anyhow!("cannot derive output name from {}", input_path.display()))?;
    let output_path =
        PathBuf::from(&config.output_dir).join(format!("{}_counted.mp4", input_name));

    info!("Output video: {}", output_path.display());

    let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')?;
    let writer = VideoWriter::new(
        output_path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("non-UTF8 output path"))?,
        fourcc,
        fps,
        core::Size::new(width, height),
        true,
    )?;

    Ok(Some(writer))
}

pub struct VideoReader {
    pub cap: VideoCapture,
    pub fps: f64,
    pub total_frames: i32,
    pub current_frame: i32,
    /// Processing resolution (after the downscale factor)
    pub width: i32,
    pub height: i32,
}

impl VideoReader {
    /// Next frame, downscaled to processing resolution, as RGB24.
    pub fn read_frame(&mut self) -> Result<Option<Frame>> {
        use opencv::videoio::VideoCaptureTrait;

        let mut mat = Mat::default();

        if !VideoCaptureTrait::read(&mut self.cap, &mut mat)? || mat.empty() {
            return Ok(None);
        }

        self.current_frame += 1;
        let timestamp_ms = if self.fps > 0.0 {
            (self.current_frame as f64 / self.fps) * 1000.0
        } else {
            0.0
        };

        let mut resized = Mat::default();
        if mat.cols() != self.width || mat.rows() != self.height {
            imgproc::resize(
                &mat,
                &mut resized,
                core::Size::new(self.width, self.height),
                0.0,
                0.0,
                imgproc::INTER_LINEAR,
            )?;
        } else {
            resized = mat;
        }

        let mut rgb_mat = Mat::default();
        imgproc::cvt_color(&resized, &mut rgb_mat, imgproc::COLOR_BGR2RGB, 0)?;

        let data = rgb_mat.data_bytes()?.to_vec();

        Ok(Some(Frame {
            data,
            width: self.width as usize,
            height: self.height as usize,
            timestamp_ms,
        }))
    }

    pub fn progress(&self) -> f32 {
        if self.total_frames <= 0 {
            return 0.0;
        }
        (self.current_frame as f32 / self.total_frames as f32) * 100.0
    }
}
