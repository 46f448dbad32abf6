use thiserror::Error;

/// このクレート自身が返すエラー
///
/// I/O、アーカイブ、ONNX ランタイムのエラーは `anyhow` のコンテキスト付きでそのまま伝播
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    #[error("Cannot do left/center/right with valid set!")]
    GridOnValidSplit,

    #[error("keypoint set has no orientation labels")]
    MissingOrientations,

    #[error("shape mismatch in {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("unknown split: {0} (expected \"test\" or \"valid\")")]
    UnknownSplit(String),

    #[error("unknown orientation label: {0}")]
    UnknownOrientation(String),

    #[error("non-finite value in {what}")]
    NonFinite { what: &'static str },

    #[error("SVD did not converge in {iterations} iterations")]
    SvdNotConverged { iterations: usize },
}

impl EvalError {
    pub fn shape(what: &'static str, expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            what,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}
