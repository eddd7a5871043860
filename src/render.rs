//! Board rendering: FEN + orientation → a standalone SVG board.
//!
//! The board is rebuilt from scratch rather than copied off the page, so the
//! output depends only on the FEN and orientation, and every piece graphic is
//! inline markup.

use serde::{Deserialize, Serialize};

use crate::Orientation;
use crate::config::CaptureConfig;
use crate::fen::placed_pieces;
use crate::pieces::{PIECE_VIEWBOX, piece_glyph, piece_key};

const LIGHT_SQUARE: &str = "#f0d9b5";
const DARK_SQUARE: &str = "#b58863";
const BACKGROUND: &str = "#f0f0f0";
const BORDER: &str = "#555";
const LABEL_COLOR: &str = "#333";
const LABEL_FONT_SIZE: f64 = 12.0;
const FONT_FAMILY: &str = "system-ui, -apple-system, 'Segoe UI', Roboto, sans-serif";
/// Share of a square taken by the piece graphic.
const PIECE_SCALE: f64 = 0.85;

const FILES: [char; 8] = ['a', 'b', 'c', 'd', 'e', 'f', 'g', 'h'];

/// Pixel layout of the rendered board.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoardGeometry {
    pub size: f64,
    pub padding: f64,
    pub square: f64,
}

impl Default for BoardGeometry {
    fn default() -> Self {
        Self { size: 600.0, padding: 20.0, square: 70.0 }
    }
}

impl From<&CaptureConfig> for BoardGeometry {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            size: f64::from(config.board_size),
            padding: config.board_padding,
            square: config.square_size,
        }
    }
}

impl BoardGeometry {
    /// Pixel offset of the top/left edge of display cell `index`.
    pub fn offset(&self, index: usize) -> f64 {
        self.padding + index as f64 * self.square
    }

    pub fn grid(&self) -> f64 {
        self.square * 8.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SquareCell {
    pub x: f64,
    pub y: f64,
    pub light: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKind {
    File,
    Rank,
}

/// Coordinate label, positioned by its centre.
#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub kind: LabelKind,
    pub text: char,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedPiece {
    /// `"wk"` .. `"bp"`.
    pub key: String,
    /// Algebraic square the piece stands on, e.g. `"e1"`.
    pub square: String,
    pub display_file: usize,
    pub display_row: usize,
    pub left: f64,
    pub top: f64,
}

/// Everything drawn for one capture, in display coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardScene {
    pub geometry: BoardGeometry,
    pub orientation: Orientation,
    pub squares: Vec<SquareCell>,
    pub labels: Vec<Label>,
    pub pieces: Vec<PlacedPiece>,
}

/// Lays out the board for `fen` as seen from `orientation`.
///
/// A malformed placement field is not an error: pieces read before the first
/// bad character are drawn and the rest of the board is left empty.
pub fn render_board(fen: &str, orientation: Orientation, geometry: BoardGeometry) -> BoardScene {
    let mut squares = Vec::with_capacity(64);
    for row in 0..8 {
        for file in 0..8 {
            squares.push(SquareCell {
                x: geometry.offset(file),
                y: geometry.offset(row),
                light: (row + file) % 2 == 0,
            });
        }
    }

    let half = geometry.square / 2.0;
    let mut labels = Vec::with_capacity(16);
    for i in 0..8 {
        let file = FILES[orientation.mirror(i)];
        labels.push(Label {
            kind: LabelKind::File,
            text: file,
            x: geometry.offset(i) + half,
            y: geometry.size - geometry.padding / 2.0,
        });
    }
    for i in 0..8 {
        // Display row 0 is rank 8 for white, rank 1 for black
        let rank = char::from(b'8' - orientation.mirror(i) as u8);
        labels.push(Label {
            kind: LabelKind::Rank,
            text: rank,
            x: geometry.padding / 2.0,
            y: geometry.offset(i) + half,
        });
    }

    let pieces = placed_pieces(fen)
        .into_iter()
        .map(|(row, file, piece)| {
            let display_file = orientation.mirror(file);
            let display_row = orientation.mirror(row);
            PlacedPiece {
                key: piece_key(piece),
                square: format!("{}{}", FILES[file], 8 - row),
                display_file,
                display_row,
                left: geometry.offset(display_file),
                top: geometry.offset(display_row),
            }
        })
        .collect();

    BoardScene { geometry, orientation, squares, labels, pieces }
}

fn px(value: f64) -> String {
    // 59.5 stays 59.5, 70.0 prints as 70
    format!("{}", (value * 100.0).round() / 100.0)
}

impl BoardScene {
    pub fn piece_on(&self, square: &str) -> Option<&PlacedPiece> {
        self.pieces.iter().find(|p| p.square == square)
    }

    pub fn piece_at(&self, display_file: usize, display_row: usize) -> Option<&PlacedPiece> {
        self.pieces
            .iter()
            .find(|p| p.display_file == display_file && p.display_row == display_row)
    }

    /// Serialises the scene as a self-contained SVG document. No external
    /// references: fonts come from the rasterizer's system font set.
    pub fn to_svg(&self) -> String {
        let g = &self.geometry;
        let size = px(g.size);
        let mut svg = String::with_capacity(32 * 1024);

        svg.push_str(&format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{size}" height="{size}" viewBox="0 0 {size} {size}">"#
        ));
        svg.push_str(&format!(r#"<rect width="{size}" height="{size}" fill="{BACKGROUND}"/>"#));

        svg.push_str(r#"<g class="squares" shape-rendering="crispEdges">"#);
        for cell in &self.squares {
            svg.push_str(&format!(
                r#"<rect x="{}" y="{}" width="{sq}" height="{sq}" fill="{}"/>"#,
                px(cell.x),
                px(cell.y),
                if cell.light { LIGHT_SQUARE } else { DARK_SQUARE },
                sq = px(g.square),
            ));
        }
        svg.push_str("</g>");
        svg.push_str(&format!(
            r#"<rect x="{p}" y="{p}" width="{w}" height="{w}" fill="none" stroke="{BORDER}" stroke-width="1"/>"#,
            p = px(g.padding),
            w = px(g.grid()),
        ));

        svg.push_str(&format!(
            r#"<g class="coordinates" font-family="{FONT_FAMILY}" font-size="{}" fill="{LABEL_COLOR}" text-anchor="middle" dominant-baseline="central">"#,
            px(LABEL_FONT_SIZE)
        ));
        for label in &self.labels {
            svg.push_str(&format!(r#"<text x="{}" y="{}">{}</text>"#, px(label.x), px(label.y), label.text));
        }
        svg.push_str("</g>");

        let piece_size = g.square * PIECE_SCALE;
        let inset = (g.square - piece_size) / 2.0;
        svg.push_str(r#"<g class="pieces">"#);
        for piece in &self.pieces {
            let Some(glyph) = piece_glyph(&piece.key) else {
                continue;
            };
            svg.push_str(&format!(
                r#"<svg x="{}" y="{}" width="{s}" height="{s}" viewBox="0 0 {v} {v}">{glyph}</svg>"#,
                px(piece.left + inset),
                px(piece.top + inset),
                s = px(piece_size),
                v = px(PIECE_VIEWBOX),
            ));
        }
        svg.push_str("</g></svg>");
        svg
    }
}
