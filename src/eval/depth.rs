use anyhow::{Context, Result};
use ndarray::{s, Array2};
use ndarray_npy::NpzWriter;
use std::fs::File;
use std::path::Path;

use super::{check_grid, Subset};
use crate::dataset::{select_split, DataProvider, KeypointSet, Split};
use crate::model::DepthModel;
use crate::pose::{depth_channel, params_to_3d, NUM_KEYPOINTS};
use crate::stats::{depth_corr, pearson, MeanStd};

/// 予測深度 [N, 66] (f64) を保存する配列名
pub const DUMP_ARRAY_NAME: &str = "preds";

/// 部分集合ごとの深度評価
#[derive(Debug, Clone, PartialEq)]
pub struct DepthMetrics {
    /// サンプルごとのピアソン相関の平均 ± 標準偏差
    pub pearson: MeanStd,
    /// 全サンプル・全ランドマークの二乗誤差
    pub l2: MeanStd,
    /// ランドマークごとのサンプル間相関の総和
    pub depth_corr: f64,
    pub pearsons: Vec<f64>,
    /// [N, 66]
    pub squared_errors: Array2<f32>,
    /// [N, 66]
    pub predictions: Array2<f32>,
}

impl DepthMetrics {
    pub fn len(&self) -> usize {
        self.pearsons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pearsons.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DepthReport {
    pub subsets: Vec<(Subset, DepthMetrics)>,
}

impl DepthReport {
    pub fn get(&self, subset: Subset) -> Option<&DepthMetrics> {
        self.subsets
            .iter()
            .find(|(s, _)| *s == subset)
            .map(|(_, m)| m)
    }
}

/// 1サンプルずつ推論し、予測深度を真値と比較する
///
/// `dump_path` があれば予測を `.npz` に保存
pub fn evaluate_depth<M: DepthModel>(
    net: &mut M,
    set: &KeypointSet,
    dump_path: Option<&Path>,
) -> Result<DepthMetrics> {
    let n = set.len();
    let xy = set.xy();
    let z = set.z();

    let mut pearsons = Vec::with_capacity(n);
    let mut squared_errors = Array2::<f32>::zeros((n, NUM_KEYPOINTS));
    let mut predictions = Array2::<f32>::zeros((n, NUM_KEYPOINTS));

    for i in 0..n {
        let keypt_xy = xy.slice(s![i..i + 1, .., ..]);
        let keypt_z = z.slice(s![i..i + 1, ..]);

        let features = net.prepare_batch(keypt_xy, keypt_z)?;
        let params = net.g(&features)?;
        let cloud = params_to_3d(params.view())?;
        let pred_z = depth_channel(cloud.view());
        let pred = pred_z.row(0);
        let truth = z.row(i);

        pearsons.push(pearson(pred, truth));
        squared_errors
            .row_mut(i)
            .assign(&(&pred - &truth).mapv(|d| d * d));
        predictions.row_mut(i).assign(&pred);
    }

    if let Some(path) = dump_path {
        write_predictions(path, &predictions)?;
    }

    Ok(DepthMetrics {
        pearson: MeanStd::from_values(pearsons.iter().copied()),
        l2: MeanStd::from_values(squared_errors.iter().copied()),
        depth_corr: depth_corr(predictions.view(), z),
        pearsons,
        squared_errors,
        predictions,
    })
}

fn write_predictions(path: &Path, predictions: &Array2<f32>) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut npz = NpzWriter::new(file);
    npz.add_array(DUMP_ARRAY_NAME, &predictions.mapv(f64::from))
        .context("Failed to write predictions")?;
    npz.finish().context("Failed to finish prediction archive")?;
    log::info!(
        "wrote {} depth predictions to {}",
        predictions.nrows(),
        path.display()
    );
    Ok(())
}

/// 分割全体、または顔向きごとの深度評価
///
/// グリッドでは left / center / right を個別に評価し、保存はしない。
/// valid でのグリッドはデータを読む前にエラー。
pub fn measure_depth<M, D>(
    net: &mut M,
    data: &D,
    grid: bool,
    dump_path: Option<&Path>,
    mode: Split,
) -> Result<DepthReport>
where
    M: DepthModel,
    D: DataProvider + ?Sized,
{
    check_grid(grid, mode)?;

    net.eval_mode();
    log::info!("measuring depth on {} split (grid: {}, device: {})", mode, grid, net.device());

    let set = select_split(data, mode)?;

    let mut subsets = Vec::new();
    if !grid {
        let metrics = evaluate_depth(net, &set, dump_path)?;
        subsets.push((Subset::All, metrics));
    } else {
        if dump_path.is_some() {
            log::warn!("prediction dump is only written for non-grid runs, ignoring");
        }
        for (orientation, part) in set.partition_by_orientation()? {
            let metrics = evaluate_depth(net, &part, None)?;
            subsets.push((Subset::Oriented(orientation), metrics));
        }
    }

    for (subset, metrics) in &subsets {
        log::info!(
            "{}: n={}, pearson {}, depth l2 {}",
            subset,
            metrics.len(),
            metrics.pearson,
            metrics.l2
        );
        println!("{} = {}", subset, metrics.depth_corr);
    }

    Ok(DepthReport { subsets })
}
