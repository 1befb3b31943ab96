mod bbox;
mod detection;
mod frame;
mod inference_device;
mod model_config;

pub use bbox::*;
pub use detection::*;
pub use frame::*;
pub use inference_device::*;
pub use model_config::*;
