use anyhow::{anyhow, Result};
use nalgebra::DMatrix;
use ndarray::{Array2, ArrayBase, ArrayView1, ArrayView2, Data, Dimension};

use crate::error::EvalError;
use crate::pose::{NUM_KEYPOINTS, XY_DIMS};

/// 同次座標の行数 (x, y, z, 1)
const HOMOGENEOUS_ROWS: usize = 4;

/// SVD の反復上限 (0 だと nalgebra は無制限に回る)
pub const MAX_SVD_ITERATIONS: usize = 1000;

/// 特異値の切り捨て閾値: max(m, n) * eps * sigma_max
fn pinv_tolerance(sigma_max: f64) -> f64 {
    HOMOGENEOUS_ROWS.max(NUM_KEYPOINTS) as f64 * f64::EPSILON * sigma_max
}

fn check_xy(what: &'static str, xy: &ArrayView2<f32>) -> Result<()> {
    if xy.dim() != (NUM_KEYPOINTS, XY_DIMS) {
        let (r, c) = xy.dim();
        return Err(EvalError::shape(what, &[NUM_KEYPOINTS, XY_DIMS], &[r, c]).into());
    }
    Ok(())
}

/// NaN / inf があると SVD が収束しない
fn check_finite<S, D>(what: &'static str, values: &ArrayBase<S, D>) -> Result<(), EvalError>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(EvalError::NonFinite { what })
    }
}

/// ソース点群 (x, y, 予測z) から擬似逆行列でターゲットの2Dキーポイントを再構成
///
/// - A: ソースの同次座標 [4, 66] (x, y, z, 1)
/// - B: ターゲットの2D座標 [2, 66]
/// - M = B · A⁺ (2x4 アフィンカメラ)
/// - 戻り値: (M · A)ᵀ = [66, 2]
pub fn predict_tgt_kp_pseudoinv(
    src_xy: ArrayView2<f32>,
    src_z: ArrayView1<f32>,
    tgt_xy: ArrayView2<f32>,
) -> Result<Array2<f32>> {
    check_xy("source keypoints", &src_xy)?;
    check_xy("target keypoints", &tgt_xy)?;
    if src_z.len() != NUM_KEYPOINTS {
        return Err(EvalError::shape("source depth", &[NUM_KEYPOINTS], &[src_z.len()]).into());
    }
    check_finite("source keypoints", &src_xy)?;
    check_finite("source depth", &src_z)?;
    check_finite("target keypoints", &tgt_xy)?;

    let a = DMatrix::<f64>::from_fn(HOMOGENEOUS_ROWS, NUM_KEYPOINTS, |row, k| match row {
        0 => src_xy[[k, 0]] as f64,
        1 => src_xy[[k, 1]] as f64,
        2 => src_z[k] as f64,
        _ => 1.0,
    });
    let b = DMatrix::<f64>::from_fn(XY_DIMS, NUM_KEYPOINTS, |row, k| tgt_xy[[k, row]] as f64);

    let svd = a
        .clone()
        .try_svd(true, true, f64::EPSILON, MAX_SVD_ITERATIONS)
        .ok_or(EvalError::SvdNotConverged {
            iterations: MAX_SVD_ITERATIONS,
        })?;
    let sigma_max = svd.singular_values.max();
    let a_pinv = svd
        .pseudo_inverse(pinv_tolerance(sigma_max))
        .map_err(|e| anyhow!("pseudo-inverse failed: {}", e))?;

    let m = &b * a_pinv;
    let reconstructed = m * a;

    Ok(Array2::from_shape_fn((NUM_KEYPOINTS, XY_DIMS), |(k, c)| {
        reconstructed[(c, k)] as f32
    }))
}

/// 再構成結果と真の2Dキーポイントの平均二乗誤差 (66x2要素の平均)
pub fn reprojection_mse(predicted: ArrayView2<f32>, target: ArrayView2<f32>) -> f32 {
    let diff = &predicted - &target;
    diff.mapv(|d| d * d).mean().unwrap_or(f32::NAN)
}
