use std::path::Path;
use anyhow::Result;
use ndarray::{ArrayViewD, Axis, Ix2};
use ort::{
    execution_providers::{CPUExecutionProvider, CUDAExecutionProvider, ExecutionProvider, TensorRTExecutionProvider},
    session::builder::{GraphOptimizationLevel, SessionBuilder},
    session::Session,
};
use rayon::prelude::*;
use regex::Regex;
use crate::common::{BBox, Detection, Frame, InferenceDevice, ModelConfig};
use crate::data::CROSS_MARK;
use crate::detection_runners::ort_detector::image_ops;
use crate::detection_runners::ort_detector::nms::nms;
use crate::detectors::Detector;
use crate::utils;

/// YOLOv8/v11 export run through ONNX Runtime.
///
/// Expects a single `[1, 4 + nc, anchors]` output: `cx, cy, w, h` in input
/// pixels followed by one score per class.
pub struct OrtYolo {
    session: Session,
    input_name: String,
    output_name: String,
    width: u32,
    height: u32,
    iou: f32,
    names: Vec<String>,
}

impl OrtYolo {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        ort::init_from(&config.ort_lib_path).commit()?;

        let mut builder = Session::builder()?;
        let mut device = config.inference_device()?;
        match device {
            InferenceDevice::TensorRT(device_id) => {
                Self::build_trt(&mut builder, device_id).unwrap_or_else(|err| {
                    log::warn!("{err}, Using cpu");
                    device = InferenceDevice::CPU;
                })
            }
            InferenceDevice::CUDA(device_id) => {
                Self::build_cuda(&mut builder, device_id).unwrap_or_else(|err| {
                    log::warn!("{err}, Using cpu");
                    device = InferenceDevice::CPU;
                })
            }
            InferenceDevice::CPU => {
                Self::build_cpu(&mut builder)?;
            }
        }

        let session = builder
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(&config.weights_path)?;

        let input_name = match session.inputs.first() {
            Some(input) => input.name.clone(),
            None => anyhow::bail!("{CROSS_MARK} Model {} has no inputs", config.weights_path),
        };
        let output_name = match session.outputs.first() {
            Some(output) => output.name.clone(),
            None => anyhow::bail!("{CROSS_MARK} Model {} has no outputs", config.weights_path),
        };

        // Class names: model metadata, else the labels file
        let names = match Self::fetch_names(&session) {
            Some(names) => names,
            None => match &config.labels_path {
                Some(path) => utils::file_to_vec(Path::new(path))?,
                None => anyhow::bail!(
                    "Model {} carries no class names. Please set `labels_path`.",
                    config.weights_path
                ),
            },
        };

        log::info!(
            "Backend: ONNXRuntime | Device: {} | Input: {}x{} | Classes: {}",
            device, config.width, config.height, names.len()
        );

        Ok(Self {
            session,
            input_name,
            output_name,
            width: config.width,
            height: config.height,
            iou: config.iou_threshold,
            names,
        })
    }

    fn build_trt(builder: &mut SessionBuilder, device_id: usize) -> Result<()> {
        let ep = TensorRTExecutionProvider::default()
            .with_device_id(device_id as i32)
            .with_engine_cache(true)
            .with_engine_cache_path("trt-cache");
        if ep.is_available()? {
            match ep.register(builder) {
                Ok(_) => { }
                Err(err) => { anyhow::bail!("{CROSS_MARK} TensorRT initialization failed: {:?}", err) }
            }
            log::info!("Initial model serialization with TensorRT may take some time...");
            Ok(())
        } else {
            anyhow::bail!("{CROSS_MARK} TensorRT execution provider not available")
        }
    }

    fn build_cuda(builder: &mut SessionBuilder, device_id: usize) -> Result<()> {
        let ep = CUDAExecutionProvider::default().with_device_id(device_id as i32);
        if ep.is_available()? {
            match ep.register(builder) {
                Ok(_) => { }
                Err(err) => { anyhow::bail!("{CROSS_MARK} CUDA initialization failed: {:?}", err) }
            }
            Ok(())
        } else {
            anyhow::bail!("{CROSS_MARK} CUDA execution provider not available")
        }
    }

    fn build_cpu(builder: &mut SessionBuilder) -> Result<()> {
        let ep = CPUExecutionProvider::default();
        if ep.is_available()? {
            match ep.register(builder) {
                Ok(_) => { }
                Err(err) => { anyhow::bail!("{CROSS_MARK} CPU initialization failed: {:?}", err) }
            }
            Ok(())
        } else {
            anyhow::bail!("{CROSS_MARK} CPU execution provider not available")
        }
    }

    fn fetch_names(session: &Session) -> Option<Vec<String>> {
        // String format: `{0: 'person', 1: 'helmet', 2: 'no-helmet'}`
        let metadata = session.metadata().ok()?;
        let raw = metadata.custom("names").ok()??;
        parse_names(&raw)
    }
}

impl Detector for OrtYolo {
    fn detect(&mut self, frame: &Frame, conf_threshold: f32) -> Result<Vec<Detection>> {
        let (input, ratio) = image_ops::letterbox_nchw(&frame.image, self.width, self.height)?;

        let outputs = self.session.run(ort::inputs![self.input_name.as_str() => input.view()]?)?;
        let output = outputs[self.output_name.as_str()].try_extract_tensor::<f32>()?;

        let (img_w, img_h) = frame.dimensions();
        let mut detections = decode_predictions(output.view(), &self.names, ratio, conf_threshold, img_w, img_h)?;
        nms(&mut detections, self.iou);
        Ok(detections)
    }
}

pub(crate) fn parse_names(raw: &str) -> Option<Vec<String>> {
    let re = Regex::new(r#"(['"])([-()\w '"]+)(['"])"#).ok()?;
    let names: Vec<String> = re
        .captures_iter(raw)
        .map(|c| c.extract::<3>().1[1].to_string())
        .collect();
    if names.is_empty() { None } else { Some(names) }
}

/// Turns a raw `[1, 4 + nc, anchors]` output into detections in source-frame pixels.
pub(crate) fn decode_predictions(
    output: ArrayViewD<'_, f32>,
    names: &[String],
    ratio: f32,
    conf_threshold: f32,
    img_w: u32,
    img_h: u32,
) -> Result<Vec<Detection>> {
    let shape = output.shape().to_vec();
    if shape.len() != 3 || shape[0] != 1 || shape[1] < 5 {
        anyhow::bail!("Unexpected YOLO output shape {:?}", shape);
    }
    let nc = shape[1] - 4;
    let preds = output.index_axis(Axis(0), 0).into_dimensionality::<Ix2>()?;

    let detections = preds
        .axis_iter(Axis(1))
        .into_par_iter()
        .filter_map(|anchor| {
            let (class_id, confidence) = anchor
                .iter()
                .skip(4)
                .copied()
                .enumerate()
                .filter(|(_, score)| !score.is_nan())
                .max_by(|a, b| a.1.total_cmp(&b.1))?;
            if confidence < conf_threshold {
                return None;
            }

            let (cx, cy, w, h) = (anchor[0] / ratio, anchor[1] / ratio, anchor[2] / ratio, anchor[3] / ratio);
            let bbox = BBox::default().with_cxcy_wh(cx, cy, w, h).clamp_to(img_w, img_h);
            let class_name = names
                .get(class_id)
                .cloned()
                .unwrap_or_else(|| class_id.to_string());

            Some(Detection {
                bbox,
                class_id,
                class_name,
                confidence,
            })
        })
        .collect::<Vec<_>>();

    if names.len() != nc {
        log::debug!("Model reports {} classes but {} names are loaded", nc, names.len());
    }
    Ok(detections)
}
