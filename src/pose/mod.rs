pub mod detector;
pub mod keypoint;
pub mod shape;

pub use detector::OnnxDepthNet;
pub use keypoint::{Orientation, NUM_KEYPOINTS, XYZ_DIMS, XY_DIMS};
pub use shape::{depth_channel, params_to_3d, PARAMS_WIDTH};
