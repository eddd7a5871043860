//! Board reconstruction from rendered piece elements.
//!
//! Everything here works on `PieceElement`, a plain description of one piece
//! node (classes, a few attributes, inline transform), so the coordinate math
//! can be tested without a page.

use std::sync::LazyLock;

use regex::Regex;
use shakmaty::{Color, Piece, Role};

use super::StrategyMiss;
use crate::Orientation;
use crate::fen::{BoardGrid, validate_fen};

static TRANSLATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"translate(?:3d)?\(\s*(-?[\d.]+)px\s*,\s*(-?[\d.]+)px").expect("translate pattern")
});
static MATRIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"matrix\([^,]+,[^,]+,[^,]+,[^,]+,\s*(-?[\d.]+)\s*,\s*(-?[\d.]+)").expect("matrix pattern")
});

/// One rendered piece node, detached from the DOM.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PieceElement {
    pub classes: Vec<String>,
    pub data_piece: Option<String>,
    pub data_square: Option<String>,
    /// `href` of a nested SVG `<use>`, e.g. `#wk`.
    pub use_href: Option<String>,
    pub transform: Option<String>,
}

impl PieceElement {
    pub fn with_classes(classes: &str) -> Self {
        Self {
            classes: classes.split_whitespace().map(str::to_string).collect(),
            ..Self::default()
        }
    }
}

/// Converts a pixel translation into board indices `(file, row)`, row 0 being
/// the top of the board as drawn for white. Flipped boards are mirrored back.
pub fn pixel_to_square(offset: (f64, f64), square_size: f64, orientation: Orientation) -> Option<(usize, usize)> {
    if square_size <= 0.0 || !offset.0.is_finite() || !offset.1.is_finite() {
        return None;
    }
    let file = (offset.0 / square_size).round();
    let row = (offset.1 / square_size).round();
    if !(0.0..=7.0).contains(&file) || !(0.0..=7.0).contains(&row) {
        return None;
    }
    Some((orientation.mirror(file as usize), orientation.mirror(row as usize)))
}

/// Pixel offset from an inline transform: `translate`, `translate3d` or `matrix`.
pub fn parse_transform(transform: &str) -> Option<(f64, f64)> {
    let caps = TRANSLATE_RE.captures(transform).or_else(|| MATRIX_RE.captures(transform))?;
    let x = caps[1].parse().ok()?;
    let y = caps[2].parse().ok()?;
    Some((x, y))
}

fn algebraic(square: &str) -> Option<(usize, usize)> {
    let bytes = square.as_bytes();
    if bytes.len() != 2 || !(b'a'..=b'h').contains(&bytes[0]) || !(b'1'..=b'8').contains(&bytes[1]) {
        return None;
    }
    Some(((bytes[0] - b'a') as usize, (b'8' - bytes[1]) as usize))
}

/// Absolute square from `square-XY` (numeric file/rank), `square-e4` or `e4`.
pub fn square_from_classes<S: AsRef<str>>(classes: &[S]) -> Option<(usize, usize)> {
    classes.iter().find_map(|class| {
        let class = class.as_ref();
        match class.strip_prefix("square-") {
            Some(sq) if sq.len() == 2 && sq.bytes().all(|b| (b'1'..=b'8').contains(&b)) => {
                let bytes = sq.as_bytes();
                Some(((bytes[0] - b'1') as usize, (b'8' - bytes[1]) as usize))
            }
            Some(sq) => algebraic(sq),
            None => algebraic(class),
        }
    })
}

fn color_char(c: char) -> Option<Color> {
    match c.to_ascii_lowercase() {
        'w' => Some(Color::White),
        'b' => Some(Color::Black),
        _ => None,
    }
}

/// `"wk"` → white king, `"bp"` → black pawn.
fn piece_code(code: &str) -> Option<Piece> {
    let mut chars = code.chars();
    let color = color_char(chars.next()?)?;
    let role = Role::from_char(chars.next()?.to_ascii_lowercase())?;
    chars.next().is_none().then_some(Piece { color, role })
}

const ROLE_WORDS: [(&str, Role); 6] = [
    ("king", Role::King),
    ("queen", Role::Queen),
    ("rook", Role::Rook),
    ("bishop", Role::Bishop),
    ("knight", Role::Knight),
    ("pawn", Role::Pawn),
];

fn piece_from_words(classes: &[String]) -> Option<Piece> {
    let color = classes
        .iter()
        .find(|c| *c == "white" || *c == "black")
        .or_else(|| classes.iter().find(|c| c.contains("white") || c.contains("black")))
        .map(|c| if c.contains("white") { Color::White } else { Color::Black })?;
    let role = ROLE_WORDS
        .iter()
        .find(|(word, _)| classes.iter().any(|c| c == word))
        .or_else(|| ROLE_WORDS.iter().find(|(word, _)| classes.iter().any(|c| c.contains(word))))
        .map(|(_, role)| *role)?;
    Some(Piece { color, role })
}

// piece_w_k, piece_white_knight, ...
fn piece_from_underscored(classes: &[String]) -> Option<Piece> {
    let class = classes.iter().find(|c| c.starts_with("piece_"))?;
    let parts: Vec<&str> = class.split('_').collect();
    if parts.len() < 3 {
        return None;
    }
    let color = if parts[1].contains('w') { Color::White } else { Color::Black };
    let role = ['k', 'q', 'r', 'b', 'n', 'p']
        .into_iter()
        .find(|c| parts[2].contains(*c))
        .and_then(Role::from_char)?;
    Some(Piece { color, role })
}

/// Colour and role from the many class/attribute conventions the two sites use.
/// Classes are treated as a set; their order on the element is not meaningful.
pub fn identify_piece(element: &PieceElement) -> Option<Piece> {
    let classes = &element.classes;

    let coded = classes.iter().find_map(|class| {
        let code = class
            .strip_prefix("chess-piece-")
            .or_else(|| class.strip_prefix("piece-"))
            .or_else(|| class.strip_suffix("-piece"))
            .unwrap_or(class.as_str());
        piece_code(code).filter(|_| code.chars().all(|c| c.is_ascii_lowercase()))
    });
    if coded.is_some() {
        return coded;
    }

    if let Some(piece) = element.data_piece.as_deref().and_then(piece_code) {
        return Some(piece);
    }

    if let Some(piece) = piece_from_words(classes).or_else(|| piece_from_underscored(classes)) {
        return Some(piece);
    }

    let href = element.use_href.as_deref()?;
    let code = &href[href.find('#')? + 1..];
    piece_code(code.get(..2)?)
}

/// Board indices `(file, row)` for a piece: position classes, then
/// `data-square`, then the pixel transform.
pub fn locate(element: &PieceElement, orientation: Orientation, square_size: Option<f64>) -> Option<(usize, usize)> {
    if let Some(square) = square_from_classes(&element.classes) {
        return Some(square);
    }
    if let Some(square) = element.data_square.as_deref().and_then(algebraic) {
        return Some(square);
    }
    let offset = parse_transform(element.transform.as_deref()?)?;
    pixel_to_square(offset, square_size?, orientation)
}

/// Builds a FEN from piece elements. Side to move and castling rights cannot
/// be read off a static layout, so they are always `w` and `KQkq`.
pub fn reconstruct_fen(
    elements: &[PieceElement],
    orientation: Orientation,
    square_size: Option<f64>,
    min_pieces: usize,
) -> Result<String, StrategyMiss> {
    if elements.is_empty() {
        return Err(StrategyMiss::NotFound);
    }

    let mut grid = BoardGrid::new();
    for element in elements {
        let Some(piece) = identify_piece(element) else {
            continue;
        };
        if let Some((file, row)) = locate(element, orientation, square_size) {
            grid.place(row, file, piece);
        }
    }

    let (white_kings, black_kings) = (grid.king_count(Color::White), grid.king_count(Color::Black));
    if white_kings != 1 || black_kings != 1 {
        return Err(StrategyMiss::Rejected(format!(
            "expected one king per side, found {} white and {} black",
            white_kings, black_kings
        )));
    }
    if grid.piece_count() < min_pieces {
        return Err(StrategyMiss::Rejected(format!(
            "only {} pieces placed (minimum {})",
            grid.piece_count(),
            min_pieces
        )));
    }

    let fen = format!("{} w KQkq - 0 1", grid.placement());
    validate_fen(&fen).map_err(|e| StrategyMiss::Invalid(e.to_string()))?;
    Ok(fen)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(classes: &str, x: f64, y: f64) -> PieceElement {
        PieceElement {
            transform: Some(format!("translate({}px, {}px)", x, y)),
            ..PieceElement::with_classes(classes)
        }
    }

    #[test]
    fn test_pixel_to_square_white_and_black() {
        assert_eq!(pixel_to_square((0.0, 0.0), 60.0, Orientation::White), Some((0, 0)));
        assert_eq!(pixel_to_square((240.0, 420.0), 60.0, Orientation::White), Some((4, 7)));
        assert_eq!(pixel_to_square((240.0, 420.0), 60.0, Orientation::Black), Some((3, 0)));
        assert_eq!(pixel_to_square((59.0, 1.0), 60.0, Orientation::White), Some((1, 0)));
        assert_eq!(pixel_to_square((480.0, 0.0), 60.0, Orientation::White), None);
        assert_eq!(pixel_to_square((-60.0, 0.0), 60.0, Orientation::White), None);
        assert_eq!(pixel_to_square((10.0, 10.0), 0.0, Orientation::White), None);
    }

    #[test]
    fn test_parse_transform_forms() {
        assert_eq!(parse_transform("translate(120px, 60px)"), Some((120.0, 60.0)));
        assert_eq!(parse_transform("translate3d(12.5px,60px,0px)"), Some((12.5, 60.0)));
        assert_eq!(parse_transform("matrix(1, 0, 0, 1, 180, 240)"), Some((180.0, 240.0)));
        assert_eq!(parse_transform("rotate(90deg)"), None);
    }

    #[test]
    fn test_square_from_classes() {
        assert_eq!(square_from_classes(&["piece", "wp", "square-52"]), Some((4, 6)));
        assert_eq!(square_from_classes(&["square-a8"]), Some((0, 0)));
        assert_eq!(square_from_classes(&["h1"]), Some((7, 7)));
        assert_eq!(square_from_classes(&["square-09", "piece"]), None);
    }

    #[test]
    fn test_identify_piece_conventions() {
        let wk = Piece::from_char('K');
        let bn = Piece::from_char('n');
        assert_eq!(identify_piece(&PieceElement::with_classes("piece wk square-51")), wk);
        assert_eq!(identify_piece(&PieceElement::with_classes("piece-bn")), bn);
        assert_eq!(identify_piece(&PieceElement::with_classes("chess-piece-wk")), wk);
        assert_eq!(identify_piece(&PieceElement::with_classes("bn-piece")), bn);
        assert_eq!(identify_piece(&PieceElement::with_classes("white king")), wk);
        assert_eq!(identify_piece(&PieceElement::with_classes("black knight")), bn);
        assert_eq!(identify_piece(&PieceElement::with_classes("piece_w_k")), wk);
        let data = PieceElement { data_piece: Some("BN".into()), ..Default::default() };
        assert_eq!(identify_piece(&data), bn);
        let svg = PieceElement { use_href: Some("sprite.svg#wk".into()), ..Default::default() };
        assert_eq!(identify_piece(&svg), wk);
        assert_eq!(identify_piece(&PieceElement::with_classes("square-52 highlight")), None);
    }

    #[test]
    fn test_class_order_does_not_matter() {
        let wk = Piece::from_char('K');
        assert_eq!(identify_piece(&PieceElement::with_classes("king white")), wk);
        assert_eq!(identify_piece(&PieceElement::with_classes("square-51 wk piece")), wk);
        assert_eq!(square_from_classes(&["square-51", "wk", "piece"]), Some((4, 7)));
    }

    #[test]
    fn test_locate_prefers_classes_over_transform() {
        let el = PieceElement {
            transform: Some("translate(0px, 0px)".into()),
            ..PieceElement::with_classes("wk square-51")
        };
        assert_eq!(locate(&el, Orientation::White, Some(60.0)), Some((4, 7)));
        let el = PieceElement { data_square: Some("e8".into()), ..Default::default() };
        assert_eq!(locate(&el, Orientation::Black, Some(60.0)), Some((4, 0)));
        assert_eq!(locate(&at("white king", 0.0, 0.0), Orientation::White, None), None);
    }

    #[test]
    fn test_reconstruct_simple_position() {
        let pieces = vec![
            at("white king", 240.0, 420.0),
            at("black king", 240.0, 0.0),
            at("white pawn", 0.0, 360.0),
        ];
        let fen = reconstruct_fen(&pieces, Orientation::White, Some(60.0), 2).unwrap();
        assert_eq!(fen, "4k3/8/8/8/8/8/P7/4K3 w KQkq - 0 1");
    }

    #[test]
    fn test_reconstruct_flipped_board() {
        // Drawn from black's side: white king at the top, black king at the bottom
        let pieces = vec![at("white king", 180.0, 0.0), at("black king", 180.0, 420.0)];
        let fen = reconstruct_fen(&pieces, Orientation::Black, Some(60.0), 2).unwrap();
        assert_eq!(fen, "4k3/8/8/8/8/8/8/4K3 w KQkq - 0 1");
    }

    #[test]
    fn test_reconstruct_rejects_bad_king_counts() {
        let no_black_king = vec![at("white king", 0.0, 0.0), at("black queen", 60.0, 0.0)];
        assert!(matches!(
            reconstruct_fen(&no_black_king, Orientation::White, Some(60.0), 2),
            Err(StrategyMiss::Rejected(_))
        ));

        let two_white_kings = vec![
            at("white king", 0.0, 0.0),
            at("white king", 120.0, 0.0),
            at("black king", 0.0, 420.0),
        ];
        assert!(matches!(
            reconstruct_fen(&two_white_kings, Orientation::White, Some(60.0), 2),
            Err(StrategyMiss::Rejected(_))
        ));
    }

    #[test]
    fn test_reconstruct_enforces_minimum_piece_count() {
        let kings = vec![at("white king", 0.0, 0.0), at("black king", 0.0, 420.0)];
        assert!(reconstruct_fen(&kings, Orientation::White, Some(60.0), 2).is_ok());
        assert!(matches!(
            reconstruct_fen(&kings, Orientation::White, Some(60.0), 3),
            Err(StrategyMiss::Rejected(_))
        ));
        assert_eq!(reconstruct_fen(&[], Orientation::White, Some(60.0), 2), Err(StrategyMiss::NotFound));
    }
}
