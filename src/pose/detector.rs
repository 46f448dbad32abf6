use anyhow::{Context, Result};
use ndarray::{Array2, ArrayView2, ArrayView3};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;

use super::keypoint::{NUM_KEYPOINTS, XY_DIMS};
use super::shape::PARAMS_WIDTH;
use crate::config::ModelConfig;
use crate::error::EvalError;
use crate::model::{DepthModel, Device};

fn build_session(config: &ModelConfig, device: Device) -> Result<Session> {
    let builder = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?;

    #[cfg(feature = "cuda")]
    let builder = if device.is_cuda() {
        log::info!("[ort] Attempting CUDA execution provider...");
        builder.with_execution_providers([ort::execution_providers::CUDAExecutionProvider::default().build()])?
    } else {
        builder
    };

    if cfg!(not(feature = "cuda")) && device.is_cuda() {
        log::warn!("[ort] CUDA requested but built without the `cuda` feature, running on CPU");
    }

    builder
        .commit_from_file(&config.path)
        .with_context(|| format!("Failed to load ONNX model {}", config.path.display()))
}

/// ONNX にエクスポートした生成器 g
///
/// 入力: [batch, 132] (x0, y0, x1, y1, ...)
/// 出力: [batch, 198] 形状パラメータ
pub struct OnnxDepthNet {
    session: Session,
    input_name: String,
    output_name: String,
    device: Device,
}

impl OnnxDepthNet {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let device = Device::from_use_cuda(config.use_cuda);
        let session = build_session(config, device)?;
        Ok(Self {
            session,
            input_name: config.input_name.clone(),
            output_name: config.output_name.clone(),
            device,
        })
    }
}

/// キーポイントを [batch, 132] の特徴量に平坦化
pub fn flatten_keypoints(xy: ArrayView3<f32>) -> Result<Array2<f32>> {
    let (batch, n, dims) = xy.dim();
    if (n, dims) != (NUM_KEYPOINTS, XY_DIMS) {
        return Err(EvalError::shape("xy batch", &[batch, NUM_KEYPOINTS, XY_DIMS], &[batch, n, dims]).into());
    }
    let features = xy
        .as_standard_layout()
        .into_owned()
        .into_shape_with_order((batch, NUM_KEYPOINTS * XY_DIMS))?;
    Ok(features)
}

impl DepthModel for OnnxDepthNet {
    type Features = Array2<f32>;

    /// 推論時は z を入力に使わない（学習時の教師信号のみ）
    fn prepare_batch(&self, xy: ArrayView3<f32>, _z: ArrayView2<f32>) -> Result<Array2<f32>> {
        flatten_keypoints(xy)
    }

    fn g(&mut self, features: &Array2<f32>) -> Result<Array2<f32>> {
        let batch = features.nrows();
        let input_tensor = Tensor::from_array(features.clone())?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .context("Inference failed")?;

        let output: ndarray::ArrayViewD<f32> = outputs[self.output_name.as_str()]
            .try_extract_array()
            .context("Failed to extract output tensor")?;

        let params = output
            .to_owned()
            .into_shape_with_order((batch, PARAMS_WIDTH))
            .with_context(|| {
                format!("Unexpected output shape {:?}, expected [{}, {}]", output.shape(), batch, PARAMS_WIDTH)
            })?;
        Ok(params)
    }

    fn device(&self) -> Device {
        self.device
    }
}
