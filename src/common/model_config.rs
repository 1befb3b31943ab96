use serde::{Deserialize, Serialize};
use crate::common::inference_device::InferenceDevice;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub weights_path: String,
    pub ort_lib_path: String,
    /// One label per line. Only used when the model carries no `names` metadata.
    pub labels_path: Option<String>,
    pub device: String,
    pub device_id: usize,
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    pub width: u32,
    pub height: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            weights_path: "models/yolov8n.onnx".to_string(),
            ort_lib_path: "libonnxruntime.so".to_string(),
            labels_path: None,
            device: "cpu".to_string(),
            device_id: 0,
            conf_threshold: 0.3,
            iou_threshold: 0.45,
            width: 640,
            height: 640,
        }
    }
}

impl ModelConfig {
    pub fn inference_device(&self) -> anyhow::Result<InferenceDevice> {
        InferenceDevice::from_str(&self.device, self.device_id).ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown inference device '{}'. Supported: {}",
                self.device,
                InferenceDevice::all_inference_devices().join(", ")
            )
        })
    }

    pub fn summary(&self) -> String {
        format!("Weights File Path: {}\n\
        Labels Path: {}\n\
        OnnxRuntime Lib Path: {}\n\
        Inference Device: {}:{}\n\
        Model Input Resolution: {}x{}\n\
        Detection Threshold: {}",
                self.weights_path, self.labels_path.as_deref().unwrap_or("<model metadata>"),
                self.ort_lib_path, self.device, self.device_id,
                self.width, self.height, self.conf_threshold)
    }
}
