//! Where frames come from and where annotated frames go.

use std::path::{Path, PathBuf};
use anyhow::Context;
use crate::common::Frame;
use crate::data::{create_directory, OutputConfig, SourceConfig};
use crate::error::MonitorError;

#[cfg(feature = "opencv")]
mod opencv_video;
#[cfg(feature = "opencv")]
pub use opencv_video::{CaptureSource, DisplaySink, VideoFileSink};

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

/// A finite or unbounded stream of frames. `Ok(None)` marks the end of the stream.
pub trait FrameSource: Send {
    fn read_frame(&mut self) -> anyhow::Result<Option<Frame>>;

    fn describe(&self) -> String;
}

/// Consumer of annotated frames, in processing order.
pub trait FrameSink {
    fn write(&mut self, frame: &Frame) -> anyhow::Result<()>;

    /// Lets an interactive sink end the run early.
    fn wants_stop(&self) -> bool {
        false
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Still images from a directory, in file-name order.
#[derive(Debug)]
pub struct ImageDirSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    next: usize,
}

impl ImageDirSource {
    pub fn open(dir: &Path) -> anyhow::Result<Self> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read frames directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            })
            .collect();
        files.sort();

        if files.is_empty() {
            anyhow::bail!("No images found in {}", dir.display());
        }
        log::info!("Found {} frames in {}", files.len(), dir.display());

        Ok(Self {
            dir: dir.to_path_buf(),
            files,
            next: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ImageDirSource {
    fn read_frame(&mut self) -> anyhow::Result<Option<Frame>> {
        let Some(path) = self.files.get(self.next) else {
            return Ok(None);
        };
        let image = image::open(path)
            .with_context(|| format!("Failed to decode {}", path.display()))?;
        let frame = Frame::from(image).with_index(self.next as u64);
        self.next += 1;
        Ok(Some(frame))
    }

    fn describe(&self) -> String {
        format!("image directory {}", self.dir.display())
    }
}

/// Writes each frame as `frame_000000.jpg`, `frame_000001.jpg`, ...
#[derive(Debug)]
pub struct ImageSequenceSink {
    dir: PathBuf,
    written: u64,
}

impl ImageSequenceSink {
    pub fn new(dir: &Path) -> anyhow::Result<Self> {
        create_directory(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            written: 0,
        })
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl FrameSink for ImageSequenceSink {
    fn write(&mut self, frame: &Frame) -> anyhow::Result<()> {
        let path = self.dir.join(format!("frame_{:06}.jpg", self.written));
        frame.image.save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        log::info!("Wrote {} annotated frames to {}", self.written, self.dir.display());
        Ok(())
    }
}

/// Picks the frame source: a frames directory if configured, else the camera,
/// else the fallback video.
pub fn open_source(config: &SourceConfig) -> Result<Box<dyn FrameSource>, MonitorError> {
    if let Some(dir) = &config.frames_dir {
        let source = ImageDirSource::open(Path::new(dir))
            .map_err(|e| MonitorError::SourceUnavailable(format!("{e:#}")))?;
        return Ok(Box::new(source));
    }

    #[cfg(feature = "opencv")]
    {
        match CaptureSource::camera(config.camera_index) {
            Ok(camera) => return Ok(Box::new(camera)),
            Err(err) => log::warn!("Webcam not available, switching to sample video... ({err:#})"),
        }
        CaptureSource::file(Path::new(&config.fallback_video))
            .map(|s| Box::new(s) as Box<dyn FrameSource>)
            .map_err(|e| MonitorError::SourceUnavailable(format!("{e:#}")))
    }

    #[cfg(not(feature = "opencv"))]
    {
        Err(MonitorError::SourceUnavailable(format!(
            "no frames directory configured and camera/video capture ({}) needs the `opencv` feature",
            config.fallback_video
        )))
    }
}

/// Builds the configured annotated-output sinks.
pub fn open_sinks(config: &OutputConfig) -> anyhow::Result<Vec<Box<dyn FrameSink>>> {
    let mut sinks: Vec<Box<dyn FrameSink>> = Vec::new();

    if let Some(dir) = &config.frames_dir {
        sinks.push(Box::new(ImageSequenceSink::new(Path::new(dir))?));
    }

    #[cfg(feature = "opencv")]
    {
        sinks.push(Box::new(VideoFileSink::new(Path::new(&config.video_path), config.fps)));
        if config.display {
            sinks.push(Box::new(DisplaySink::new("Safety System")?));
        }
    }

    if sinks.is_empty() {
        log::warn!("No annotated output configured, frames will not be saved");
    }
    Ok(sinks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_frames(dir: &Path, names: &[&str]) {
        for (i, name) in names.iter().enumerate() {
            RgbImage::from_pixel(8, 6, Rgb([i as u8 * 40, 0, 0]))
                .save(dir.join(name))
                .unwrap();
        }
    }

    #[test]
    fn image_dir_reads_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), &["b.png", "a.png", "c.png"]);
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut source = ImageDirSource::open(dir.path()).unwrap();
        assert_eq!(source.len(), 3);

        let first = source.read_frame().unwrap().unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(first.dimensions(), (8, 6));
        // a.png was written second
        assert_eq!(first.get_pixel(0, 0), &Rgb([40, 0, 0]));

        assert!(source.read_frame().unwrap().is_some());
        assert_eq!(source.read_frame().unwrap().unwrap().index, 2);
        assert!(source.read_frame().unwrap().is_none());
    }

    #[test]
    fn empty_dir_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let config = SourceConfig {
            frames_dir: Some(dir.path().to_string_lossy().into_owned()),
            ..Default::default()
        };
        assert!(matches!(open_source(&config), Err(MonitorError::SourceUnavailable(_))));
    }

    #[test]
    fn sequence_sink_numbers_frames() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let mut sink = ImageSequenceSink::new(&out).unwrap();
        let frame = Frame::from(RgbImage::new(4, 4)).with_index(7);
        sink.write(&frame).unwrap();
        sink.write(&frame).unwrap();
        sink.finish().unwrap();

        assert_eq!(sink.written(), 2);
        assert!(out.join("frame_000000.jpg").is_file());
        assert!(out.join("frame_000001.jpg").is_file());
        assert!(!sink.wants_stop());
    }
}
