use anyhow::Result;
use ndarray::Axis;

use super::{check_grid, Subset};
use crate::dataset::{select_split, DataProvider, KeypointSet, Split};
use crate::model::DepthModel;
use crate::pose::{depth_channel, params_to_3d};
use crate::projection::{predict_tgt_kp_pseudoinv, reprojection_mse};
use crate::stats::MeanStd;

/// (ソース, ターゲット) 部分集合ペアごとの再投影誤差
#[derive(Debug, Clone, PartialEq)]
pub struct KpErrorCell {
    pub src: Subset,
    pub tgt: Subset,
    pub summary: MeanStd,
    pub errors: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KpErrorReport {
    pub cells: Vec<KpErrorCell>,
}

impl KpErrorReport {
    pub fn get(&self, src: Subset, tgt: Subset) -> Option<&KpErrorCell> {
        self.cells.iter().find(|c| c.src == src && c.tgt == tgt)
    }
}

/// 各ソースの予測深度から全ターゲットを再構成したときの誤差
///
/// ソースは1バッチでまとめて推論する。`same` のときは同一部分集合なので
/// i == j を除外して M·(M−1) 個、それ以外は M·K 個。
pub fn kp_errors<M: DepthModel>(
    net: &mut M,
    src: &KeypointSet,
    tgt: &KeypointSet,
    same: bool,
) -> Result<Vec<f32>> {
    if src.is_empty() || tgt.is_empty() {
        return Ok(Vec::new());
    }

    let features = net.prepare_batch(src.xy(), src.z())?;
    let params = net.g(&features)?;
    let cloud = params_to_3d(params.view())?;
    let pred_src_zs = depth_channel(cloud.view());

    let src_xy = src.xy();
    let tgt_xy = tgt.xy();

    let mut errors = Vec::with_capacity(src.len() * tgt.len());
    for i in 0..src.len() {
        let xy_src = src_xy.index_axis(Axis(0), i);
        let pred_src_z = pred_src_zs.row(i);
        for j in 0..tgt.len() {
            if same && i == j {
                continue;
            }
            let xy_tgt = tgt_xy.index_axis(Axis(0), j);
            let rhs = predict_tgt_kp_pseudoinv(xy_src, pred_src_z, xy_tgt)?;
            errors.push(reprojection_mse(rhs.view(), xy_tgt));
        }
    }

    log::debug!("kp error: {} sources x {} targets -> {} pairs", src.len(), tgt.len(), errors.len());
    Ok(errors)
}

fn run_cell<M: DepthModel>(
    net: &mut M,
    (src_label, src): (Subset, &KeypointSet),
    (tgt_label, tgt): (Subset, &KeypointSet),
) -> Result<KpErrorCell> {
    println!("src: {}, tgt: {}", src_label, tgt_label);
    let same = src_label == tgt_label;
    let errors = kp_errors(net, src, tgt, same)?;
    let summary = MeanStd::from_values(errors.iter().copied());
    println!("{}", summary);
    Ok(KpErrorCell {
        src: src_label,
        tgt: tgt_label,
        summary,
        errors,
    })
}

/// 分割全体のキーポイント相互予測誤差
///
/// 非グリッドは全体同士、グリッドは顔向きの順序付きペア 9 通り。
/// valid でのグリッドはデータを読む前にエラー。
pub fn measure_kp_error<M, D>(
    net: &mut M,
    data: &D,
    grid: bool,
    mode: Split,
) -> Result<KpErrorReport>
where
    M: DepthModel,
    D: DataProvider + ?Sized,
{
    check_grid(grid, mode)?;

    net.eval_mode();
    log::info!("measuring keypoint error on {} split (grid: {}, device: {})", mode, grid, net.device());

    let set = select_split(data, mode)?;

    let mut cells = Vec::new();
    if !grid {
        cells.push(run_cell(net, (Subset::All, &set), (Subset::All, &set))?);
    } else {
        let parts = set.partition_by_orientation()?;
        for (dir1, src) in &parts {
            for (dir2, tgt) in &parts {
                cells.push(run_cell(
                    net,
                    (Subset::Oriented(*dir1), src),
                    (Subset::Oriented(*dir2), tgt),
                )?);
            }
        }
    }

    Ok(KpErrorReport { cells })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::tests::{synthetic_set, MemoryProvider};
    use crate::error::EvalError;
    use crate::eval::fixtures::LinearDepthModel;
    use crate::pose::Orientation;

    #[test]
    fn test_same_subset_skips_self_pairs() {
        let set = synthetic_set(5, None);
        let mut net = LinearDepthModel::default();
        let errors = kp_errors(&mut net, &set, &set, true).unwrap();
        assert_eq!(errors.len(), 5 * 4);
    }

    #[test]
    fn test_cross_subset_all_pairs() {
        let src = synthetic_set(4, None);
        let tgt = synthetic_set(3, None);
        let mut net = LinearDepthModel::default();
        let errors = kp_errors(&mut net, &src, &tgt, false).unwrap();
        assert_eq!(errors.len(), 4 * 3);
        assert!(errors.iter().all(|e| e.is_finite() && *e >= 0.0));
    }

    #[test]
    fn test_sources_batched_once() {
        let src = synthetic_set(6, None);
        let mut net = LinearDepthModel::default();
        kp_errors(&mut net, &src, &src, true).unwrap();
        assert_eq!(net.batch_sizes, vec![6]);
    }

    #[test]
    fn test_empty_set_skips_model() {
        let src = synthetic_set(0, None);
        let tgt = synthetic_set(3, None);
        let mut net = LinearDepthModel::default();
        assert!(kp_errors(&mut net, &src, &tgt, false).unwrap().is_empty());
        assert!(kp_errors(&mut net, &tgt, &src, false).unwrap().is_empty());
        assert!(net.batch_sizes.is_empty());
    }

    #[test]
    fn test_non_grid_single_cell() {
        let data = MemoryProvider::new(5, 6);
        let mut net = LinearDepthModel::default();
        let report = measure_kp_error(&mut net, &data, false, Split::Test).unwrap();
        assert_eq!(report.cells.len(), 1);

        let cell = report.get(Subset::All, Subset::All).unwrap();
        assert_eq!(cell.errors.len(), 6 * 5);
        assert_eq!(net.eval_calls, 1);
    }

    #[test]
    fn test_grid_walks_ordered_pairs() {
        // 巡回ラベル: left 4, center 3, right 3
        let data = MemoryProvider::new(5, 10);
        let mut net = LinearDepthModel::default();
        let report = measure_kp_error(&mut net, &data, true, Split::Test).unwrap();
        assert_eq!(report.cells.len(), 9);

        let sizes = [4usize, 3, 3];
        let mut idx = 0;
        for (a, dir1) in Orientation::ALL.iter().enumerate() {
            for (b, dir2) in Orientation::ALL.iter().enumerate() {
                let cell = &report.cells[idx];
                assert_eq!(cell.src, Subset::Oriented(*dir1));
                assert_eq!(cell.tgt, Subset::Oriented(*dir2));
                let expected = if a == b {
                    sizes[a] * (sizes[a] - 1)
                } else {
                    sizes[a] * sizes[b]
                };
                assert_eq!(cell.errors.len(), expected, "src {} tgt {}", dir1, dir2);
                idx += 1;
            }
        }
    }

    #[test]
    fn test_grid_on_valid_fails_before_loading() {
        let data = MemoryProvider::new(300, 9);
        let mut net = LinearDepthModel::default();
        let err = measure_kp_error(&mut net, &data, true, Split::Valid).unwrap_err();
        assert_eq!(err.downcast_ref::<EvalError>(), Some(&EvalError::GridOnValidSplit));
        assert_eq!(data.loads.get(), 0);
        assert_eq!(net.eval_calls, 0);
    }

    #[test]
    fn test_valid_non_grid_uses_first_225() {
        let data = MemoryProvider::new(230, 3);
        let mut net = LinearDepthModel::default();
        let report = measure_kp_error(&mut net, &data, false, Split::Valid).unwrap();
        assert_eq!(report.cells[0].errors.len(), 225 * 224);
        assert_eq!(net.batch_sizes, vec![225]);
    }

    #[test]
    fn test_non_finite_prediction_propagates() {
        // NaN 座標 → LinearDepthModel の予測深度も NaN
        let good = synthetic_set(3, None);
        let mut xy = good.xy().to_owned();
        xy[[1, 5, 0]] = f32::NAN;
        let src = KeypointSet::new(xy, good.z().to_owned(), None).unwrap();

        let mut net = LinearDepthModel::default();
        let err = kp_errors(&mut net, &src, &good, false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EvalError>(),
            Some(EvalError::NonFinite { .. })
        ));
    }

    #[test]
    fn test_repeated_calls_identical() {
        let data = MemoryProvider::new(5, 7);
        let mut net = LinearDepthModel::default();
        let first = measure_kp_error(&mut net, &data, false, Split::Test).unwrap();
        let second = measure_kp_error(&mut net, &data, false, Split::Test).unwrap();
        assert_eq!(first, second);
    }
}
