pub mod depth;
pub mod keypoint;

pub use depth::{evaluate_depth, measure_depth, DepthMetrics, DepthReport};
pub use keypoint::{kp_errors, measure_kp_error, KpErrorCell, KpErrorReport};

use std::fmt;

use crate::dataset::Split;
use crate::error::EvalError;
use crate::pose::Orientation;

/// 集計対象（分割全体または顔向きごと）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subset {
    All,
    Oriented(Orientation),
}

impl fmt::Display for Subset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Oriented(o) => write!(f, "{}", o),
        }
    }
}

/// 顔向きグリッドは test のみ
pub(crate) fn check_grid(grid: bool, mode: Split) -> Result<(), EvalError> {
    if grid && mode == Split::Valid {
        return Err(EvalError::GridOnValidSplit);
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use anyhow::Result;
    use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};

    use crate::dataset::KeypointSet;
    use crate::model::DepthModel;
    use crate::pose::{NUM_KEYPOINTS, PARAMS_WIDTH};

    /// 決定的な代替生成器: x, y はそのまま、z = x + 0.5 * y
    #[derive(Debug, Default)]
    pub(crate) struct LinearDepthModel {
        pub eval_calls: usize,
        pub batch_sizes: Vec<usize>,
    }

    pub(crate) fn linear_depth(x: f32, y: f32) -> f32 {
        x + 0.5 * y
    }

    impl DepthModel for LinearDepthModel {
        type Features = Array3<f32>;

        fn prepare_batch(&self, xy: ArrayView3<f32>, _z: ArrayView2<f32>) -> Result<Array3<f32>> {
            Ok(xy.to_owned())
        }

        fn g(&mut self, features: &Array3<f32>) -> Result<Array2<f32>> {
            let batch = features.len_of(Axis(0));
            self.batch_sizes.push(batch);
            Ok(Array2::from_shape_fn((batch, PARAMS_WIDTH), |(b, p)| {
                let channel = p / NUM_KEYPOINTS;
                let k = p % NUM_KEYPOINTS;
                let x = features[[b, k, 0]];
                let y = features[[b, k, 1]];
                match channel {
                    0 => x,
                    1 => y,
                    _ => linear_depth(x, y),
                }
            }))
        }

        fn eval_mode(&mut self) {
            self.eval_calls += 1;
        }
    }

    /// 真の深度を [`LinearDepthModel`] の予測で置き換える
    pub(crate) fn with_linear_depth(set: &KeypointSet) -> KeypointSet {
        let xy = set.xy();
        let z = Array2::from_shape_fn((set.len(), NUM_KEYPOINTS), |(i, k)| {
            linear_depth(xy[[i, k, 0]], xy[[i, k, 1]])
        });
        KeypointSet::new(xy.to_owned(), z, set.orientations().map(|o| o.to_vec())).unwrap()
    }
}
