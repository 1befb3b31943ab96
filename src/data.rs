mod failure_policy;
mod filesystem_access;
mod hazard_class;
mod monitor_config;
mod time_calc;

pub use failure_policy::*;
pub use filesystem_access::{create_directory, ensure_parent_dir, FsAccess};
pub use hazard_class::HazardClass;
pub use monitor_config::*;
pub use time_calc::TimeCalc;

pub(crate) const CROSS_MARK: &str = "❌";
