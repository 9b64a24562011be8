use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FaceCropError;

/// Aspect ratio the crop rectangle is locked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AspectChoice {
    /// 1:1
    #[default]
    #[serde(rename = "1:1")]
    Square,

    /// 4:5, taller than wide.
    #[serde(rename = "4:5")]
    Portrait,

    /// 16:9, wider than tall.
    #[serde(rename = "16:9")]
    Wide,
}

impl AspectChoice {
    /// Every selectable ratio, in toolbar order.
    pub const ALL: [AspectChoice; 3] = [
        AspectChoice::Square,
        AspectChoice::Portrait,
        AspectChoice::Wide,
    ];

    /// Width divided by height.
    pub fn ratio(self) -> f64 {
        match self {
            AspectChoice::Square => 1.0,
            AspectChoice::Portrait => 4.0 / 5.0,
            AspectChoice::Wide => 16.0 / 9.0,
        }
    }

    pub fn as_label(self) -> &'static str {
        match self {
            AspectChoice::Square => "1:1",
            AspectChoice::Portrait => "4:5",
            AspectChoice::Wide => "16:9",
        }
    }
}

impl fmt::Display for AspectChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

impl FromStr for AspectChoice {
    type Err = FaceCropError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1:1" | "square" => Ok(AspectChoice::Square),
            "4:5" | "portrait" => Ok(AspectChoice::Portrait),
            "16:9" | "wide" => Ok(AspectChoice::Wide),
            other => Err(FaceCropError::InvalidAspect(other.to_string())),
        }
    }
}
