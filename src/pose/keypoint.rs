use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EvalError;

/// 顔ランドマーク数（66点）
pub const NUM_KEYPOINTS: usize = 66;

/// 2D座標のチャンネル数 (x, y)
pub const XY_DIMS: usize = 2;

/// 3D点群のチャンネル数 (x, y, z)
pub const XYZ_DIMS: usize = 3;

/// テストサンプルの顔向きラベル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Left,
    Center,
    Right,
}

impl Orientation {
    pub const COUNT: usize = 3;

    /// グリッド評価で使う順序
    pub const ALL: [Orientation; Self::COUNT] =
        [Orientation::Left, Orientation::Center, Orientation::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Center => "center",
            Self::Right => "right",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Orientation {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(Self::Left),
            "center" => Ok(Self::Center),
            "right" => Ok(Self::Right),
            other => Err(EvalError::UnknownOrientation(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypoint_count() {
        assert_eq!(NUM_KEYPOINTS, 66);
    }

    #[test]
    fn test_orientation_from_str() {
        assert_eq!("left".parse::<Orientation>(), Ok(Orientation::Left));
        assert_eq!("center".parse::<Orientation>(), Ok(Orientation::Center));
        assert_eq!("right".parse::<Orientation>(), Ok(Orientation::Right));
        assert_eq!(
            "up".parse::<Orientation>(),
            Err(EvalError::UnknownOrientation("up".to_string()))
        );
    }

    #[test]
    fn test_orientation_display_roundtrip() {
        for o in Orientation::ALL {
            assert_eq!(o.to_string().parse::<Orientation>(), Ok(o));
        }
    }

    #[test]
    fn test_orientation_serde_lowercase() {
        let labels: Vec<Orientation> =
            serde_json::from_str(r#"["left", "center", "right"]"#).unwrap();
        assert_eq!(labels, Orientation::ALL.to_vec());
        assert!(serde_json::from_str::<Vec<Orientation>>(r#"["Left"]"#).is_err());
    }
}
