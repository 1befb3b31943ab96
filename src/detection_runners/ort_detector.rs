pub mod image_ops;
pub mod nms;
mod ort_yolo;

pub use ort_yolo::OrtYolo;
