//! キーポイントのデータ分割と読み込み

use anyhow::{Context, Result};
use ndarray::{s, Array, Array2, Array3, ArrayView2, ArrayView3, Axis, Dimension};
use ndarray_npy::{NpzReader, ReadableElement};
use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::EvalError;
use crate::pose::{Orientation, NUM_KEYPOINTS, XY_DIMS};

/// valid 分割で評価する先頭サンプル数
pub const VALID_LIMIT: usize = 225;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Test,
    Valid,
}

impl Split {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Test => "test",
            Self::Valid => "valid",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Split {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "test" => Ok(Self::Test),
            "valid" => Ok(Self::Valid),
            other => Err(EvalError::UnknownSplit(other.to_string())),
        }
    }
}

/// 2Dキーポイントと真の深度 (N サンプル)
#[derive(Debug, Clone, PartialEq)]
pub struct KeypointSet {
    xy: Array3<f32>,
    z: Array2<f32>,
    orientations: Option<Vec<Orientation>>,
}

impl KeypointSet {
    /// `xy`: [N, 66, 2], `z`: [N, 66], `orientations`: N 個のラベル（任意）
    pub fn new(
        xy: Array3<f32>,
        z: Array2<f32>,
        orientations: Option<Vec<Orientation>>,
    ) -> Result<Self, EvalError> {
        let n = xy.len_of(Axis(0));
        if xy.dim() != (n, NUM_KEYPOINTS, XY_DIMS) {
            return Err(EvalError::shape(
                "xy",
                &[n, NUM_KEYPOINTS, XY_DIMS],
                xy.shape(),
            ));
        }
        if z.dim() != (n, NUM_KEYPOINTS) {
            return Err(EvalError::shape("z", &[n, NUM_KEYPOINTS], z.shape()));
        }
        if let Some(labels) = &orientations {
            if labels.len() != n {
                return Err(EvalError::shape("orientations", &[n], &[labels.len()]));
            }
        }
        Ok(Self { xy, z, orientations })
    }

    pub fn len(&self) -> usize {
        self.z.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn xy(&self) -> ArrayView3<'_, f32> {
        self.xy.view()
    }

    pub fn z(&self) -> ArrayView2<'_, f32> {
        self.z.view()
    }

    pub fn orientations(&self) -> Option<&[Orientation]> {
        self.orientations.as_deref()
    }

    /// 先頭 `limit` サンプルのみ残す
    pub fn truncate(self, limit: usize) -> Self {
        let n = self.len().min(limit);
        Self {
            xy: self.xy.slice(s![..n, .., ..]).to_owned(),
            z: self.z.slice(s![..n, ..]).to_owned(),
            orientations: self.orientations.map(|mut o| {
                o.truncate(n);
                o
            }),
        }
    }

    /// `indices` の順にサンプルを取り出す
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            xy: self.xy.select(Axis(0), indices),
            z: self.z.select(Axis(0), indices),
            orientations: self
                .orientations
                .as_ref()
                .map(|o| indices.iter().map(|&i| o[i]).collect()),
        }
    }

    /// left / center / right の順に互いに素な部分集合へ分割
    pub fn partition_by_orientation(&self) -> Result<[(Orientation, KeypointSet); 3], EvalError> {
        let labels = self
            .orientations
            .as_ref()
            .ok_or(EvalError::MissingOrientations)?;

        Ok(Orientation::ALL.map(|target| {
            let indices: Vec<usize> = labels
                .iter()
                .enumerate()
                .filter(|(_, o)| **o == target)
                .map(|(i, _)| i)
                .collect();
            (target, self.select(&indices))
        }))
    }
}

/// train / valid / test の供給元
pub trait DataProvider {
    fn train(&self) -> Result<KeypointSet>;
    fn valid(&self) -> Result<KeypointSet>;
    /// 顔向きラベル付き
    fn test(&self) -> Result<KeypointSet>;
}

/// 分割を読み込む
///
/// `test` はラベル付き、`valid` は先頭 [`VALID_LIMIT`] 件のみ（ラベルなし）
pub fn select_split<D: DataProvider + ?Sized>(data: &D, split: Split) -> Result<KeypointSet> {
    let set = match split {
        Split::Test => data.test()?,
        Split::Valid => {
            let valid = data.valid()?.truncate(VALID_LIMIT);
            KeypointSet {
                orientations: None,
                ..valid
            }
        }
    };
    log::debug!("selected {} split: {} samples", split, set.len());
    Ok(set)
}

/// ディレクトリ内の `.npz` から分割を読む
///
/// - `<dir>/train.npz`, `<dir>/valid.npz`, `<dir>/test.npz`: 配列 `xy`, `z` (f32 / f64)
/// - `<dir>/test_orientations.json`: `["left", "center", ...]`
#[derive(Debug, Clone)]
pub struct NpzDataProvider {
    dir: PathBuf,
}

impl NpzDataProvider {
    pub const ORIENTATIONS_FILE: &'static str = "test_orientations.json";

    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn load(&self, split: &str, with_orientations: bool) -> Result<KeypointSet> {
        let path = self.dir.join(format!("{}.npz", split));
        let file = File::open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let mut npz = NpzReader::new(file)
            .with_context(|| format!("Failed to read archive {}", path.display()))?;

        let xy: Array3<f32> = read_f32_array(&mut npz, "xy")
            .with_context(|| format!("Failed to read xy from {}", path.display()))?;
        let z: Array2<f32> = read_f32_array(&mut npz, "z")
            .with_context(|| format!("Failed to read z from {}", path.display()))?;

        let orientations = if with_orientations {
            Some(self.load_orientations()?)
        } else {
            None
        };

        let set = KeypointSet::new(xy, z, orientations)
            .with_context(|| format!("Invalid keypoint data in {}", path.display()))?;
        log::info!("loaded {} samples from {}", set.len(), path.display());
        Ok(set)
    }

    fn load_orientations(&self) -> Result<Vec<Orientation>> {
        let path = self.dir.join(Self::ORIENTATIONS_FILE);
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let labels: Vec<Orientation> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse orientation labels in {}", path.display()))?;
        Ok(labels)
    }
}

impl DataProvider for NpzDataProvider {
    fn train(&self) -> Result<KeypointSet> {
        self.load("train", false)
    }

    fn valid(&self) -> Result<KeypointSet> {
        self.load("valid", false)
    }

    fn test(&self) -> Result<KeypointSet> {
        self.load("test", true)
    }
}

/// 名前付き配列を読む（NumPy が付ける `.npy` 接尾辞の有無どちらも可）
pub(crate) fn read_array<A, D>(npz: &mut NpzReader<File>, name: &str) -> Result<Array<A, D>>
where
    A: ReadableElement,
    D: Dimension,
{
    match npz.by_name(name) {
        Ok(array) => Ok(array),
        Err(_) => Ok(npz.by_name(&format!("{}.npy", name))?),
    }
}

/// f32 で読み、dtype が f64 (NumPy の既定) なら f32 に変換
pub(crate) fn read_f32_array<D>(npz: &mut NpzReader<File>, name: &str) -> Result<Array<f32, D>>
where
    D: Dimension,
{
    match read_array::<f32, D>(npz, name) {
        Ok(array) => Ok(array),
        Err(f32_err) => match read_array::<f64, D>(npz, name) {
            Ok(wide) => {
                log::debug!("{}: converting f64 array to f32", name);
                Ok(wide.mapv(|v| v as f32))
            }
            Err(_) => Err(f32_err),
        },
    }
}
