//! Chess position capture for Lichess and Chess.com pages.
//!
//! Pipeline: site detection → PGN extraction → FEN extraction/reconstruction →
//! off-screen board rendering → rasterization → stored capture record.

pub mod analysis;
pub mod capture;
pub mod config;
pub mod error;
pub mod extract;
pub mod fen;
pub mod page;
pub mod pieces;
pub mod raster;
pub mod render;
pub mod site;
pub mod store;
pub mod tab;

use serde::{Deserialize, Serialize};

pub use capture::{CaptureResponse, CaptureResult, CaptureSession, CaptureStage, Capturer};
pub use config::CaptureConfig;
pub use error::{CaptureError, InjectionError};
pub use site::Site;

/// Which side is drawn at the bottom of the board.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    White,
    Black,
}

impl Orientation {
    pub fn is_flipped(self) -> bool {
        self == Orientation::Black
    }

    /// Mirrors a 0..8 board index when the board is flipped.
    pub fn mirror(self, index: usize) -> usize {
        debug_assert!(index < 8, "board index {} out of range", index);
        if self.is_flipped() { 7 - index } else { index }
    }
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Orientation::White => write!(f, "white"),
            Orientation::Black => write!(f, "black"),
        }
    }
}

impl std::str::FromStr for Orientation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "white" => Ok(Orientation::White),
            "black" => Ok(Orientation::Black),
            other => anyhow::bail!("unknown orientation '{}', expected white or black", other),
        }
    }
}
