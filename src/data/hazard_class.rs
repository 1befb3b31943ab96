use serde::{Deserialize, Serialize};

/// A detector label that means "unsafe condition present", with the operator-facing message.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HazardClass {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl HazardClass {
    pub fn new(label: &str, reason: &str) -> Self {
        Self {
            label: label.to_string(),
            reason: Some(reason.to_string()),
        }
    }

    pub fn bare(label: &str) -> Self {
        Self {
            label: label.to_string(),
            reason: None,
        }
    }

    pub fn matches(&self, class_name: &str) -> bool {
        self.label == class_name
    }

    pub fn message(&self) -> String {
        match &self.reason {
            Some(reason) => reason.clone(),
            None => format!("{} detected!", self.label),
        }
    }

    pub fn defaults() -> Vec<HazardClass> {
        vec![
            HazardClass::new("person", "Human detected in hazard zone!"),
            HazardClass::new("no-helmet", "No helmet detected!"),
        ]
    }
}
