pub mod actuator;
pub mod annotate;
pub mod camera_stream;
pub mod common;
pub mod control;
pub mod dashboard;
pub mod data;
pub mod detection_runners;
pub mod detectors;
pub mod error;
pub mod event_log;
pub mod frame_io;
pub mod hazard;
mod utils;

use std::path::Path;
use std::time::Instant;
use image::RgbImage;
use crate::actuator::GpioSimulator;
use crate::annotate::Annotator;
use crate::common::{Frame, ModelConfig};
use crate::control::{ControlLoop, LoopSummary, MachineController};
use crate::data::MonitorConfig;
use crate::detection_runners::OrtYolo;
use crate::detectors::Detector;
use crate::event_log::CsvEventLog;
use crate::hazard::HazardPolicy;

/// Loads the ONNX model and runs one warm-up inference.
pub fn init_detector(model: &ModelConfig) -> anyhow::Result<OrtYolo> {
    log::info!("Initializing detector: {}", model.summary());
    let mut yolo = OrtYolo::new(model)?;

    let now = Instant::now();
    yolo.detect(&Frame::from(RgbImage::new(model.width, model.height)), model.conf_threshold)?;
    log::debug!("Warm-up inference took {:?}", now.elapsed());
    Ok(yolo)
}

/// Runs the monitor over the configured source until it ends.
pub fn run_monitor(config: &MonitorConfig) -> anyhow::Result<LoopSummary> {
    config.ensure_output_dirs()?;

    let mut source = frame_io::open_source(&config.source)?;
    let detector = init_detector(&config.model)?;
    let annotator = Annotator::from_font_path(config.output.font_path.as_deref().map(Path::new))?;
    let mut sinks = frame_io::open_sinks(&config.output)?;

    let actuator = GpioSimulator::new(config.relay_pin);
    let recorder = CsvEventLog::new(&config.output.event_log);
    let controller = MachineController::new(actuator, recorder).with_log_policy(config.on_log_error);

    let mut control = ControlLoop::new(detector, HazardPolicy::new(config.hazard_classes.clone()), controller)
        .with_annotator(annotator)
        .with_conf_threshold(config.model.conf_threshold)
        .with_detector_failure_policy(config.on_detector_error);

    let summary = control.run(source.as_mut(), &mut sinks, config.source.max_frames)?;
    log::info!("Event log saved to {}", config.output.event_log);
    Ok(summary)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub source: String,
    pub frames: u64,
    pub resolution: Option<(u32, u32)>,
}

/// Opens the configured source and reads up to `max_frames` frames.
pub fn probe_source(config: &MonitorConfig, max_frames: u64) -> anyhow::Result<ProbeReport> {
    let mut source = frame_io::open_source(&config.source)?;
    let mut report = ProbeReport {
        source: source.describe(),
        frames: 0,
        resolution: None,
    };

    while report.frames < max_frames {
        match source.read_frame()? {
            Some(frame) => {
                report.resolution.get_or_insert(frame.dimensions());
                report.frames += 1;
            }
            None => break,
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn frames_dir_source_reports_size() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..3 {
            RgbImage::from_pixel(32, 24, Rgb([0, 0, 0]))
                .save(dir.path().join(format!("{i}.png")))
                .unwrap();
        }
        let mut config = MonitorConfig::default();
        config.source.frames_dir = Some(dir.path().to_string_lossy().into_owned());

        let report = probe_source(&config, 2).unwrap();
        assert_eq!(report.frames, 2);
        assert_eq!(report.resolution, Some((32, 24)));
        assert_eq!(probe_source(&config, 10).unwrap().frames, 3);
    }
}
