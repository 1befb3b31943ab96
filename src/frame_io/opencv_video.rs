use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use image::RgbImage;
use opencv::{
    core::{self, Mat},
    highgui, imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoWriter},
};
use crate::common::Frame;
use crate::data::ensure_parent_dir;
use crate::frame_io::{FrameSink, FrameSource};

fn mat_to_frame(mat: &Mat, index: u64) -> Result<Frame> {
    let mut rgb_mat = Mat::default();
    imgproc::cvt_color(mat, &mut rgb_mat, imgproc::COLOR_BGR2RGB, 0)?;
    let data = rgb_mat.data_bytes()?.to_vec();
    let (w, h) = (rgb_mat.cols() as u32, rgb_mat.rows() as u32);
    let image = RgbImage::from_vec(w, h, data)
        .with_context(|| format!("Captured frame buffer does not match {}x{}", w, h))?;
    Ok(Frame::new(image, index))
}

fn frame_to_bgr(frame: &Frame) -> Result<Mat> {
    let mat = Mat::from_slice(frame.image.as_raw())?;
    let mat = mat.reshape(3, frame.height() as i32)?;
    let mut bgr_mat = Mat::default();
    imgproc::cvt_color(&mat, &mut bgr_mat, imgproc::COLOR_RGB2BGR, 0)?;
    Ok(bgr_mat)
}

/// Webcam or video file read through OpenCV.
pub struct CaptureSource {
    cap: VideoCapture,
    name: String,
    next: u64,
}

impl CaptureSource {
    pub fn camera(index: i32) -> Result<Self> {
        let cap = VideoCapture::new(index, videoio::CAP_ANY)?;
        if !cap.is_opened()? {
            anyhow::bail!("Camera {} could not be opened", index);
        }
        Ok(Self { cap, name: format!("camera {index}"), next: 0 })
    }

    pub fn file(path: &Path) -> Result<Self> {
        let path_str = path.to_str().context("Video path is not valid UTF-8")?;
        let cap = VideoCapture::from_file(path_str, videoio::CAP_ANY)
            .with_context(|| format!("Failed to open video {}", path.display()))?;
        if !cap.is_opened()? {
            anyhow::bail!("Video {} could not be opened", path.display());
        }
        Ok(Self { cap, name: format!("video {}", path.display()), next: 0 })
    }
}

impl FrameSource for CaptureSource {
    fn read_frame(&mut self) -> Result<Option<Frame>> {
        let mut mat = Mat::default();
        if !self.cap.read(&mut mat)? || mat.empty() {
            return Ok(None);
        }
        let frame = mat_to_frame(&mat, self.next)?;
        self.next += 1;
        Ok(Some(frame))
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// `mp4v` video at the input resolution, opened on the first frame.
pub struct VideoFileSink {
    path: PathBuf,
    fps: f64,
    writer: Option<VideoWriter>,
    written: u64,
}

impl VideoFileSink {
    pub fn new(path: &Path, fps: f64) -> Self {
        Self { path: path.to_path_buf(), fps, writer: None, written: 0 }
    }

    fn open(&self, width: i32, height: i32) -> Result<VideoWriter> {
        ensure_parent_dir(&self.path)?;
        let path_str = self.path.to_str().context("Video path is not valid UTF-8")?;
        let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')?;
        let writer = VideoWriter::new(path_str, fourcc, self.fps, core::Size::new(width, height), true)?;
        if !writer.is_opened()? {
            anyhow::bail!("Video writer for {} could not be opened", self.path.display());
        }
        log::info!("Writing annotated video to {} ({}x{} @ {} fps)", self.path.display(), width, height, self.fps);
        Ok(writer)
    }
}

impl FrameSink for VideoFileSink {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        let bgr = frame_to_bgr(frame)?;
        let writer = match self.writer {
            Some(ref mut w) => w,
            None => {
                let w = self.open(bgr.cols(), bgr.rows())?;
                self.writer.insert(w)
            }
        };
        writer.write(&bgr)?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.release()?;
            log::info!("Annotated video saved: {} frames in {}", self.written, self.path.display());
        }
        Ok(())
    }
}

/// Live preview window. Pressing `q` ends the run.
pub struct DisplaySink {
    window: String,
    stop: bool,
}

impl DisplaySink {
    pub fn new(window: &str) -> Result<Self> {
        highgui::named_window(window, highgui::WINDOW_AUTOSIZE)?;
        Ok(Self { window: window.to_string(), stop: false })
    }
}

impl FrameSink for DisplaySink {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        highgui::imshow(&self.window, &frame_to_bgr(frame)?)?;
        let key = highgui::wait_key(1)?;
        if key == 'q' as i32 {
            self.stop = true;
        }
        Ok(())
    }

    fn wants_stop(&self) -> bool {
        self.stop
    }

    fn finish(&mut self) -> Result<()> {
        highgui::destroy_window(&self.window)?;
        Ok(())
    }
}
