pub mod config;
pub mod dataset;
pub mod error;
pub mod eval;
pub mod model;
pub mod pose;
pub mod projection;
pub mod stats;

pub use dataset::{DataProvider, KeypointSet, NpzDataProvider, Split};
pub use error::EvalError;
pub use eval::{measure_depth, measure_kp_error};
pub use model::{DepthModel, Device};
