use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::dataset::Split;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub eval: EvalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    /// train/valid/test.npz と test_orientations.json のディレクトリ
    #[serde(default = "default_data_dir")]
    pub dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// 生成器 g の ONNX エクスポート
    #[serde(default = "default_model_path")]
    pub path: PathBuf,
    #[serde(default = "default_input_name")]
    pub input_name: String,
    #[serde(default = "default_output_name")]
    pub output_name: String,
    #[serde(default)]
    pub use_cuda: bool,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    #[default]
    All,
    Depth,
    Keypoint,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EvalConfig {
    #[serde(default)]
    pub task: Task,
    /// "test" or "valid"
    #[serde(default = "default_mode")]
    pub mode: String,
    /// left/center/right ごとに評価
    #[serde(default = "default_grid")]
    pub grid: bool,
    /// 深度予測の保存先 (.npz, 非グリッド時のみ)
    #[serde(default)]
    pub dump_path: Option<PathBuf>,
}

fn default_data_dir() -> PathBuf { PathBuf::from("data") }
fn default_model_path() -> PathBuf { PathBuf::from("models/aign_g.onnx") }
fn default_input_name() -> String { "keypoints".to_string() }
fn default_output_name() -> String { "params".to_string() }
fn default_mode() -> String { "test".to_string() }
fn default_grid() -> bool { true }

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: default_data_dir(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: default_model_path(),
            input_name: default_input_name(),
            output_name: default_output_name(),
            use_cuda: false,
        }
    }
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            task: Task::default(),
            mode: default_mode(),
            grid: default_grid(),
            dump_path: None,
        }
    }
}

impl EvalConfig {
    pub fn split(&self) -> Result<Split> {
        Ok(self.mode.parse::<Split>()?)
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read {}", path.as_ref().display()))?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// 設定ファイルがなければデフォルト
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!(
                    "{}: {:#}, using defaults",
                    path.as_ref().display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// コマンドライン引数で指定されたファイルは必須（読めなければエラー）
    /// 省略時は `default_path` を読み、なければデフォルト
    pub fn load_from_args<P: AsRef<Path>>(arg: Option<String>, default_path: P) -> Result<Self> {
        match arg {
            Some(path) => Self::load(&path),
            None => Ok(Self::load_or_default(default_path)),
        }
    }
}
