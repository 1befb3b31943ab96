use crate::common::Detection;
use crate::data::HazardClass;

/// Per-frame verdict. Consumed immediately by the controller, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HazardAssessment {
    pub is_hazard: bool,
    pub reasons: Vec<String>,
}

impl HazardAssessment {
    pub fn clear() -> Self {
        Self::default()
    }

    pub fn hazard(reason: impl Into<String>) -> Self {
        Self {
            is_hazard: true,
            reasons: vec![reason.into()],
        }
    }

    pub fn details(&self) -> String {
        self.reasons.join("; ")
    }
}

/// The configured hazard class set.
#[derive(Debug, Clone)]
pub struct HazardPolicy {
    classes: Vec<HazardClass>,
}

impl Default for HazardPolicy {
    fn default() -> Self {
        Self::new(HazardClass::defaults())
    }
}

impl HazardPolicy {
    pub fn new(classes: Vec<HazardClass>) -> Self {
        Self { classes }
    }

    pub fn hazard_class(&self, class_name: &str) -> Option<&HazardClass> {
        self.classes.iter().find(|c| c.matches(class_name))
    }

    /// One reason per matching detection, in detector order. Confidence is
    /// not re-checked here; the detector already applied its threshold.
    pub fn classify(&self, detections: &[Detection]) -> HazardAssessment {
        let reasons: Vec<String> = detections
            .iter()
            .filter_map(|det| self.hazard_class(&det.class_name))
            .map(HazardClass::message)
            .collect();

        HazardAssessment {
            is_hazard: !reasons.is_empty(),
            reasons,
        }
    }
}
