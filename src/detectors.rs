use crate::common::{Detection, Frame};

/// Object detector backend. Implementations drop detections below `conf_threshold`.
pub trait Detector {
    fn detect(&mut self, frame: &Frame, conf_threshold: f32) -> anyhow::Result<Vec<Detection>>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn detect(&mut self, frame: &Frame, conf_threshold: f32) -> anyhow::Result<Vec<Detection>> {
        (**self).detect(frame, conf_threshold)
    }
}
