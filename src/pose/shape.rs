use anyhow::Result;
use ndarray::{s, Array2, Array3, ArrayView2, ArrayView3};

use super::keypoint::{NUM_KEYPOINTS, XYZ_DIMS};
use crate::error::EvalError;

/// 生成器パラメータの幅 (x66 + y66 + z66)
pub const PARAMS_WIDTH: usize = XYZ_DIMS * NUM_KEYPOINTS;

/// 生成器の出力パラメータを3D点群に変換
///
/// 入力: [batch, 198] (x0..x65, y0..y65, z0..z65 の順)
/// 出力: [batch, 3, 66] (チャンネル順 x, y, z)
pub fn params_to_3d(params: ArrayView2<f32>) -> Result<Array3<f32>> {
    let (batch, width) = params.dim();
    if width != PARAMS_WIDTH {
        return Err(EvalError::shape("params", &[batch, PARAMS_WIDTH], &[batch, width]).into());
    }

    let cloud = params
        .to_owned()
        .into_shape_with_order((batch, XYZ_DIMS, NUM_KEYPOINTS))?;
    Ok(cloud)
}

/// 点群の最後のチャンネル (z) を取り出す: [batch, 66]
pub fn depth_channel(cloud: ArrayView3<f32>) -> Array2<f32> {
    cloud.slice(s![.., XYZ_DIMS - 1, ..]).to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn channel_params(batch: usize) -> Array2<f32> {
        Array2::from_shape_fn((batch, PARAMS_WIDTH), |(b, k)| {
            let channel = k / NUM_KEYPOINTS;
            let landmark = k % NUM_KEYPOINTS;
            (b * 1000 + channel * 100 + landmark) as f32
        })
    }

    #[test]
    fn test_params_to_3d_channel_order() {
        let cloud = params_to_3d(channel_params(2).view()).unwrap();
        assert_eq!(cloud.dim(), (2, 3, 66));
        assert_eq!(cloud[[0, 0, 5]], 5.0);
        assert_eq!(cloud[[0, 1, 5]], 105.0);
        assert_eq!(cloud[[1, 2, 65]], 1265.0);
    }

    #[test]
    fn test_params_to_3d_rejects_wrong_width() {
        let params = Array2::<f32>::zeros((1, 132));
        let err = params_to_3d(params.view()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EvalError>(),
            Some(EvalError::ShapeMismatch { what: "params", .. })
        ));
    }

    #[test]
    fn test_depth_channel() {
        let cloud = params_to_3d(channel_params(1).view()).unwrap();
        let z = depth_channel(cloud.view());
        assert_eq!(z.dim(), (1, 66));
        assert_eq!(z[[0, 0]], 200.0);
        assert_eq!(z[[0, 65]], 265.0);
    }
}
