use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Widths used when neither the config nor the snapshot sets any.
pub const DEFAULT_WIDTHS: [u32; 2] = [375, 1280];

/// Height every resize uses unless `minHeight` says otherwise.
pub const DEFAULT_MIN_HEIGHT: u32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Deduplicates and sorts widths ascending, dropping zeros.
pub fn normalize_widths(widths: &[u32]) -> Vec<u32> {
    let mut out: Vec<u32> = widths.iter().copied().filter(|w| *w > 0).collect();
    out.sort_unstable();
    out.dedup();
    out
}

/// A comma-separated width list such as `375,1280`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidthList(pub Vec<u32>);

#[derive(Debug, Error)]
pub enum WidthParseError {
    #[error("Invalid width list: expected comma-separated pixels (e.g., 375,1280)")]
    Empty,
    #[error("Invalid width: {0}")]
    InvalidWidth(String),
    #[error("Width must be positive")]
    ZeroWidth,
}

impl FromStr for WidthList {
    type Err = WidthParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut widths = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let width: u32 = part
                .parse()
                .map_err(|_| WidthParseError::InvalidWidth(part.to_string()))?;
            if width == 0 {
                return Err(WidthParseError::ZeroWidth);
            }
            widths.push(width);
        }

        if widths.is_empty() {
            return Err(WidthParseError::Empty);
        }

        Ok(WidthList(normalize_widths(&widths)))
    }
}
