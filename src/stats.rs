//! 評価用の集計統計
//!
//! 分散ゼロや空入力はエラーではなく `NaN` を返す

use ndarray::{ArrayView1, ArrayView2, Axis};
use std::fmt;

/// 平均と母標準偏差
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeanStd {
    pub mean: f64,
    pub std: f64,
}

impl MeanStd {
    pub fn nan() -> Self {
        Self {
            mean: f64::NAN,
            std: f64::NAN,
        }
    }

    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<f64>,
    {
        // Welford法（1パス）
        let mut n = 0usize;
        let mut mean = 0.0f64;
        let mut m2 = 0.0f64;
        for v in values {
            let v: f64 = v.into();
            n += 1;
            let delta = v - mean;
            mean += delta / n as f64;
            m2 += delta * (v - mean);
        }

        if n == 0 {
            return Self::nan();
        }
        Self {
            mean,
            std: (m2 / n as f64).sqrt(),
        }
    }
}

impl fmt::Display for MeanStd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}  +/-  {}", self.mean, self.std)
    }
}

/// 同じ長さの2ベクトルのピアソン相関係数
pub fn pearson(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let n = a.len();
    if n == 0 {
        return f64::NAN;
    }

    let mean_a = a.iter().map(|&v| v as f64).sum::<f64>() / n as f64;
    let mean_b = b.iter().map(|&v| v as f64).sum::<f64>() / n as f64;

    let mut num = 0.0;
    let mut den_a = 0.0;
    let mut den_b = 0.0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let dx = x as f64 - mean_a;
        let dy = y as f64 - mean_b;
        num += dx * dy;
        den_a += dx * dx;
        den_b += dy * dy;
    }

    if den_a == 0.0 || den_b == 0.0 {
        return f64::NAN;
    }
    (num / (den_a.sqrt() * den_b.sqrt())).clamp(-1.0, 1.0)
}

/// 予測深度と真の深度 [サンプル, ランドマーク] の相関トレース
///
/// ランドマークごとにサンプル方向のピアソン相関を取り、その総和を返す
/// （完全な予測で 66）
pub fn depth_corr(preds: ArrayView2<f32>, gt: ArrayView2<f32>) -> f64 {
    debug_assert_eq!(preds.dim(), gt.dim());
    preds
        .axis_iter(Axis(1))
        .zip(gt.axis_iter(Axis(1)))
        .map(|(p, g)| pearson(p, g))
        .sum()
}
