//! 評価ルーチンが使うモデルのインターフェース

use anyhow::Result;
use ndarray::{Array2, ArrayView2, ArrayView3};
use std::fmt;

/// 推論デバイス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    #[default]
    Cpu,
    Cuda,
}

impl Device {
    pub fn from_use_cuda(use_cuda: bool) -> Self {
        if use_cuda {
            Self::Cuda
        } else {
            Self::Cpu
        }
    }

    pub fn is_cuda(&self) -> bool {
        matches!(self, Self::Cuda)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
            Self::Cuda => f.write_str("cuda"),
        }
    }
}

/// 学習済みの生成器（キーポイント → 形状パラメータ）
///
/// バッチごとに `prepare_batch` → `g` の順で呼ばれる
pub trait DepthModel {
    /// モデル固有の入力表現
    type Features;

    /// `xy` [batch, 66, 2] と真の深度 `z` [batch, 66] から入力を作る
    fn prepare_batch(&self, xy: ArrayView3<f32>, z: ArrayView2<f32>) -> Result<Self::Features>;

    /// 生成器の順伝播。形状パラメータ [batch, 198] を返す
    /// （[`crate::pose::params_to_3d`] で3D点群に変換）
    fn g(&mut self, features: &Self::Features) -> Result<Array2<f32>>;

    /// 推論モードに切り替え
    fn eval_mode(&mut self) {}

    fn device(&self) -> Device {
        Device::Cpu
    }
}
