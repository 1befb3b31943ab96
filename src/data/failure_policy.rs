use serde::{Deserialize, Serialize};

/// What a frame means when the detector errors on it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorFailurePolicy {
    /// The frame counts as hazardous until a later frame proves otherwise.
    #[default] FailClosed,
    NoDetections,
}

/// What happens when an event row cannot be appended.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFailurePolicy {
    #[default] Fatal,
    Degrade,
}
