//! Position extraction: ordered strategy cascades for FEN and PGN.
//!
//! Each strategy returns `Result<T, StrategyMiss>`; the cascade stops at the
//! first `Ok` and logs every miss. Nothing in here fails the capture.

pub mod fen;
pub mod pgn;
pub mod reconstruct;

use scraper::ElementRef;
use thiserror::Error;
use tracing::debug;

use crate::Orientation;
use crate::page::{self, Page};
use crate::site::Site;

/// Why a single strategy produced nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrategyMiss {
    #[error("nothing found")]
    NotFound,
    #[error("candidate failed validation: {0}")]
    Invalid(String),
    #[error("rejected: {0}")]
    Rejected(String),
}

pub type StrategyResult<T> = Result<T, StrategyMiss>;

/// A named step in a cascade.
pub struct Strategy<T> {
    pub name: &'static str,
    pub run: fn(&ExtractContext<'_>) -> StrategyResult<T>,
}

/// Everything a strategy may look at.
pub struct ExtractContext<'a> {
    pub page: &'a Page,
    pub site: Site,
    pub orientation: Orientation,
    pub min_pieces: usize,
}

impl<'a> ExtractContext<'a> {
    pub fn new(page: &'a Page, site: Site, min_pieces: usize) -> Self {
        Self {
            page,
            site,
            orientation: detect_orientation(page, site),
            min_pieces,
        }
    }
}

/// Runs strategies in order and returns the first hit.
pub fn first_hit<T>(ctx: &ExtractContext<'_>, strategies: &[Strategy<T>]) -> Option<T> {
    for strategy in strategies {
        match (strategy.run)(ctx) {
            Ok(value) => {
                debug!(site = %ctx.site, strategy = strategy.name, "strategy hit");
                return Some(value);
            }
            Err(miss) => debug!(site = %ctx.site, strategy = strategy.name, %miss, "strategy miss"),
        }
    }
    None
}

/// Result of the extraction half of a capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub fen: String,
    pub pgn: String,
    pub orientation: Orientation,
}

pub fn extract(page: &Page, site: Site, min_pieces: usize) -> Extraction {
    let ctx = ExtractContext::new(page, site, min_pieces);
    let pgn = pgn::extract_pgn(&ctx);
    let fen = fen::extract_fen(&ctx);
    Extraction { fen, pgn, orientation: ctx.orientation }
}

const LICHESS_BOARD_CONTAINERS: &[&str] = &[
    ".study__board .cg-wrap",
    ".analyse__board .cg-wrap",
    ".main-board .cg-wrap",
    "cg-board",
];

const CHESSCOM_BOARD: &str = "chess-board, wc-chess-board, div[class^=\"board\"], div[class*=\"board-\"], \
    div[class*=\"chessboard\"], div[data-board], div[id*=\"board\"], .board-b72b1, .board-modal-board, .board-container";

pub fn lichess_board_container(page: &Page) -> Option<ElementRef<'_>> {
    LICHESS_BOARD_CONTAINERS.iter().find_map(|css| page.select_first(css))
}

pub fn chesscom_board(page: &Page) -> Option<ElementRef<'_>> {
    page.select_first(CHESSCOM_BOARD)
}

/// Which side the page draws at the bottom. Defaults to white when no board is found.
pub fn detect_orientation(page: &Page, site: Site) -> Orientation {
    let flipped = match site {
        Site::Lichess => lichess_board_container(page).is_some_and(|container| {
            let holder = page::closest(container, ".orientation-white, .orientation-black").unwrap_or(container);
            page::has_class(holder, "orientation-black")
        }),
        Site::ChessCom => {
            let board_flipped = chesscom_board(page).is_some_and(|board| {
                page::has_class(board, "flipped") || page::attr(board, "data-orientation") == Some("black")
            });
            board_flipped || page.select_first(".board-flipped").is_some()
        }
        Site::Unknown => false,
    };
    if flipped { Orientation::Black } else { Orientation::White }
}

/// Board width in pixels: reported layout first, then an inline `width: Npx`.
pub fn board_width(page: &Page, board: Option<ElementRef<'_>>) -> Option<f64> {
    page.board_width().or_else(|| {
        let width = page::inline_style(board?, "width")?;
        width.trim_end_matches("px").trim().parse::<f64>().ok().filter(|w| *w > 0.0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageCapture;

    fn page(url: &str, html: &str) -> Page {
        Page::parse(&PageCapture { url: url.into(), html: html.into(), ..Default::default() })
    }

    #[test]
    fn test_lichess_orientation() {
        let black = page(
            "https://lichess.org/abc",
            r#"<div class="main-board orientation-black"><div class="cg-wrap"><cg-board></cg-board></div></div>"#,
        );
        assert_eq!(detect_orientation(&black, Site::Lichess), Orientation::Black);

        let white = page(
            "https://lichess.org/abc",
            r#"<div class="main-board"><div class="cg-wrap orientation-white"><cg-board></cg-board></div></div>"#,
        );
        assert_eq!(detect_orientation(&white, Site::Lichess), Orientation::White);
        assert_eq!(detect_orientation(&page("https://lichess.org", ""), Site::Lichess), Orientation::White);
    }

    #[test]
    fn test_chesscom_orientation() {
        let flipped = page("https://www.chess.com/game/1", r#"<wc-chess-board class="board flipped"></wc-chess-board>"#);
        assert_eq!(detect_orientation(&flipped, Site::ChessCom), Orientation::Black);

        let attr = page("https://www.chess.com/game/1", r#"<chess-board data-orientation="black"></chess-board>"#);
        assert_eq!(detect_orientation(&attr, Site::ChessCom), Orientation::Black);

        let plain = page("https://www.chess.com/game/1", r#"<div class="board"></div>"#);
        assert_eq!(detect_orientation(&plain, Site::ChessCom), Orientation::White);
    }

    #[test]
    fn test_board_width_falls_back_to_inline_style() {
        let p = page("https://www.chess.com/", r#"<div class="board" style="width: 480px"></div>"#);
        assert_eq!(board_width(&p, chesscom_board(&p)), Some(480.0));
        assert_eq!(board_width(&p, None), None);
    }

    #[test]
    fn test_first_hit_stops_at_first_success() {
        fn miss(_: &ExtractContext<'_>) -> StrategyResult<u32> {
            Err(StrategyMiss::NotFound)
        }
        fn one(_: &ExtractContext<'_>) -> StrategyResult<u32> {
            Ok(1)
        }
        fn two(_: &ExtractContext<'_>) -> StrategyResult<u32> {
            Ok(2)
        }
        let p = page("https://lichess.org", "");
        let ctx = ExtractContext::new(&p, Site::Lichess, 2);
        let strategies = [
            Strategy { name: "miss", run: miss },
            Strategy { name: "one", run: one },
            Strategy { name: "two", run: two },
        ];
        assert_eq!(first_hit(&ctx, &strategies), Some(1));
        assert_eq!(first_hit(&ctx, &strategies[..1]), None);
    }
}
