//! FEN strategies, in priority order:
//! study nodes → board data attributes → page globals → FEN text widgets →
//! reconstruction from piece elements → `?fen=` URL parameter → start position.

use scraper::ElementRef;
use serde_json::Value;

use super::reconstruct::{PieceElement, reconstruct_fen};
use super::{ExtractContext, Strategy, StrategyMiss, StrategyResult, board_width, chesscom_board, first_hit};
use crate::fen;
use crate::page::{self, Page};
use crate::site::Site;

const LICHESS_STRATEGIES: &[Strategy<String>] = &[
    Strategy { name: "lichess-study-nodes", run: lichess_study_nodes },
    Strategy { name: "lichess-board-data", run: lichess_board_data },
    Strategy { name: "lichess-globals", run: lichess_globals },
    Strategy { name: "lichess-fen-widgets", run: lichess_fen_widgets },
    Strategy { name: "lichess-reconstruct", run: lichess_reconstruct },
    Strategy { name: "url-parameter", run: url_parameter },
];

const CHESSCOM_STRATEGIES: &[Strategy<String>] = &[
    Strategy { name: "chesscom-board-data", run: chesscom_board_data },
    Strategy { name: "chesscom-globals", run: chesscom_globals },
    Strategy { name: "chesscom-fen-widgets", run: chesscom_fen_widgets },
    Strategy { name: "chesscom-reconstruct", run: chesscom_reconstruct },
    Strategy { name: "url-parameter", run: url_parameter },
];

/// Never fails: the result always passes `fen::validate_fen`.
pub fn extract_fen(ctx: &ExtractContext<'_>) -> String {
    let strategies = match ctx.site {
        Site::Lichess => LICHESS_STRATEGIES,
        Site::ChessCom => CHESSCOM_STRATEGIES,
        Site::Unknown => &[],
    };
    fen::or_default(first_hit(ctx, strategies).as_deref())
}

fn accept(candidate: &str) -> StrategyResult<String> {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return Err(StrategyMiss::NotFound);
    }
    fen::validate_fen(candidate).map_err(|e| StrategyMiss::Invalid(e.to_string()))?;
    Ok(fen::normalize(candidate))
}

/// First valid candidate out of a list, keeping the last failure as the miss.
fn first_valid<'s, I>(candidates: I) -> StrategyResult<String>
where
    I: IntoIterator<Item = &'s str>,
{
    let mut miss = StrategyMiss::NotFound;
    for candidate in candidates {
        match accept(candidate) {
            Ok(fen) => return Ok(fen),
            Err(e) => miss = e,
        }
    }
    Err(miss)
}

fn attr_candidates<'a>(page: &'a Page, css: &str, attr: &str) -> Vec<&'a str> {
    page.select(css).into_iter().filter_map(|el| page::attr(el, attr)).collect()
}

fn global_candidates<'a>(page: &'a Page, paths: &[&str]) -> Vec<&'a str> {
    paths.iter().filter_map(|path| page.global_str(path)).collect()
}

fn lichess_study_nodes(ctx: &ExtractContext<'_>) -> StrategyResult<String> {
    if !ctx.page.path().contains("/study/") {
        return Err(StrategyMiss::NotFound);
    }
    let mut candidates = attr_candidates(ctx.page, ".analyse__moves .node.active, .moves .node.active", "data-fen");
    candidates.extend(attr_candidates(ctx.page, ".study__chapter[data-fen]", "data-fen"));
    first_valid(candidates)
}

fn lichess_board_data(ctx: &ExtractContext<'_>) -> StrategyResult<String> {
    first_valid(attr_candidates(
        ctx.page,
        ".cg-wrap[data-fen], .round__app__board[data-fen], .main-board[data-fen], .study__board [data-fen]",
        "data-fen",
    ))
}

fn lichess_globals(ctx: &ExtractContext<'_>) -> StrategyResult<String> {
    let mut paths = Vec::new();
    if ctx.page.path().contains("/study/") {
        paths.push("Lichess.study.currentNode.fen");
    }
    paths.extend([
        "Lichess.analysis.node.fen",
        "Lichess.chessground.state.fen",
        "Lichess.boot.data.game.fen",
        "Lichess.puzzle.data.puzzle.fen",
    ]);
    first_valid(global_candidates(ctx.page, &paths))
}

fn lichess_fen_widgets(ctx: &ExtractContext<'_>) -> StrategyResult<String> {
    let widgets: Vec<String> = ctx
        .page
        .select(r#"input.copyable[spellcheck="false"], .fen .copyable, .copyables .fen"#)
        .into_iter()
        .map(page::value_or_text)
        .collect();
    first_valid(widgets.iter().map(String::as_str))
}

fn piece_element(el: ElementRef<'_>) -> PieceElement {
    PieceElement {
        classes: page::classes(el).into_iter().map(str::to_string).collect(),
        data_piece: page::attr(el, "data-piece").map(str::to_string),
        data_square: page::attr(el, "data-square").map(str::to_string),
        use_href: page::first_within(el, "use")
            .and_then(|u| page::attr(u, "href").or_else(|| page::attr(u, "xlink:href")))
            .map(str::to_string),
        transform: page::inline_style(el, "transform").map(str::to_string),
    }
}

fn lichess_reconstruct(ctx: &ExtractContext<'_>) -> StrategyResult<String> {
    let board = ctx.page.select_first("cg-board").ok_or(StrategyMiss::NotFound)?;
    page::closest(board, ".cg-wrap, .round__app__board, .main-board, .study__board").ok_or(StrategyMiss::NotFound)?;

    let pieces: Vec<PieceElement> = page::select_within(board, "piece").into_iter().map(piece_element).collect();
    let square_size = board_width(ctx.page, Some(board)).map(|w| w / 8.0);
    reconstruct_fen(&pieces, ctx.orientation, square_size, ctx.min_pieces)
}

fn chesscom_board_data(ctx: &ExtractContext<'_>) -> StrategyResult<String> {
    let board = chesscom_board(ctx.page).ok_or(StrategyMiss::NotFound)?;
    let raw = ["data-fen", "data-position", "data-board"]
        .iter()
        .find_map(|name| page::attr(board, name))
        .ok_or(StrategyMiss::NotFound)?;

    // The attribute is either JSON carrying a `fen` field or the FEN itself.
    match serde_json::from_str::<Value>(raw) {
        Ok(data) => accept(data.get("fen").and_then(Value::as_str).unwrap_or("")),
        Err(_) if raw.contains('/') => accept(raw),
        Err(_) => Err(StrategyMiss::Invalid(format!("unrecognised board data {:?}", raw))),
    }
}

fn chesscom_globals(ctx: &ExtractContext<'_>) -> StrategyResult<String> {
    first_valid(global_candidates(
        ctx.page,
        &[
            "ChessComGame.game.state.fen",
            "ChessComGame.game.position.fen",
            "ChessComGame.game.fen",
            "game.fen",
            "chessboard.fen",
            "chess.fen",
        ],
    ))
}

const CHESSCOM_FEN_WIDGETS: &[&str] = &[
    "[data-fen]",
    "[data-position]",
    "[data-game-state]",
    ".move.selected[data-fen]",
    ".copy-fen-btn",
    ".share-menu-tab-pgn-textarea",
    ".board-modal-pgn-textarea",
    ".board-modal-fen-textarea",
    ".board-modal-position-textarea",
    ".board-modal-fen",
    ".board-modal-position",
    ".board-modal-state",
];

fn chesscom_fen_widgets(ctx: &ExtractContext<'_>) -> StrategyResult<String> {
    let mut miss = StrategyMiss::NotFound;
    for css in CHESSCOM_FEN_WIDGETS {
        for el in ctx.page.select(css) {
            let candidate = ["data-fen", "data-position", "data-game-state"]
                .iter()
                .find_map(|name| page::attr(el, name).map(str::to_string))
                .unwrap_or_else(|| page::value_or_text(el));
            match accept(&candidate) {
                Ok(fen) => return Ok(fen),
                Err(e) => miss = e,
            }
        }
    }
    Err(miss)
}

const CHESSCOM_PIECES: &[&str] = &[
    r#"div.piece[class*="square-"]"#,
    r#"div[class*="piece-"]"#,
    r#"div[class*="square-"] > div[class*="piece"]"#,
    r#"div[class*="chess-piece"]"#,
    r#"div[class*="piece"][class*="square-"]"#,
    ".piece",
    r#"[class*="piece"]"#,
    r#"img[src*="piece"]"#,
    r#"div[class*="piece_"]"#,
    r#"chess-board div[class*="square-"] div"#,
    r#"*[style*="transform"]"#,
    "div[data-piece]",
    "div[data-square]",
];

fn chesscom_piece_nodes(board: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    CHESSCOM_PIECES
        .iter()
        .map(|css| page::select_within(board, css))
        .find(|found| !found.is_empty())
        .unwrap_or_default()
}

fn chesscom_reconstruct(ctx: &ExtractContext<'_>) -> StrategyResult<String> {
    let board = chesscom_board(ctx.page).ok_or(StrategyMiss::NotFound)?;

    let mut nodes = chesscom_piece_nodes(board);
    if nodes.is_empty() {
        if let Some(parent) = page::parent(board) {
            nodes = chesscom_piece_nodes(parent);
        }
    }
    if nodes.is_empty() {
        nodes = page::select_within(board, "*");
    }

    let pieces: Vec<PieceElement> = nodes.into_iter().map(piece_element).collect();
    let square_size = board_width(ctx.page, Some(board)).map(|w| w / 8.0);
    reconstruct_fen(&pieces, ctx.orientation, square_size, ctx.min_pieces)
}

fn url_parameter(ctx: &ExtractContext<'_>) -> StrategyResult<String> {
    let fen = ctx.page.query_param("fen").ok_or(StrategyMiss::NotFound)?;
    // Lichess analysis URLs use underscores for spaces
    accept(&fen.replace('_', " "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Orientation;
    use crate::fen::DEFAULT_FEN;
    use crate::page::PageCapture;
    use serde_json::json;

    const ITALIAN: &str = "r1bqkbnr/pppp1ppp/2n5/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R b KQkq - 3 3";
    const SICILIAN: &str = "rnbqkbnr/pp1ppppp/8/2p5/4P3/8/PPPP1PPP/RNBQKBNR w KQkq c6 0 2";

    fn run(site: Site, url: &str, html: &str, globals: Value, width: Option<f64>) -> (String, Orientation) {
        let page = Page::parse(&PageCapture {
            url: url.into(),
            html: html.into(),
            globals,
            board_width: width,
        });
        let ctx = ExtractContext::new(&page, site, 2);
        (extract_fen(&ctx), ctx.orientation)
    }

    #[test]
    fn test_lichess_study_node_wins_on_study_pages() {
        let html = format!(
            r#"<div class="analyse__moves"><div class="node active" data-fen="{}"></div></div>
               <div class="cg-wrap" data-fen="{}"></div>"#,
            ITALIAN, SICILIAN
        );
        let (fen, _) = run(Site::Lichess, "https://lichess.org/study/xyz", &html, Value::Null, None);
        assert_eq!(fen, ITALIAN);

        // Not a study page: the active node is ignored and the board wrapper wins
        let (fen, _) = run(Site::Lichess, "https://lichess.org/analysis", &html, Value::Null, None);
        assert_eq!(fen, SICILIAN);
    }

    #[test]
    fn test_lichess_globals_then_widgets() {
        let (fen, _) = run(
            Site::Lichess,
            "https://lichess.org/abc",
            "",
            json!({ "Lichess": { "chessground": { "state": { "fen": SICILIAN } } } }),
            None,
        );
        assert_eq!(fen, SICILIAN);

        let html = format!(r#"<input class="copyable" spellcheck="false" value="{}">"#, ITALIAN);
        let (fen, _) = run(Site::Lichess, "https://lichess.org/abc", &html, Value::Null, None);
        assert_eq!(fen, ITALIAN);
    }

    #[test]
    fn test_invalid_candidate_falls_through() {
        let html = r#"<div class="cg-wrap" data-fen="rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0"></div>"#;
        let (fen, _) = run(
            Site::Lichess,
            &format!("https://lichess.org/analysis?fen={}", SICILIAN.replace(' ', "_")),
            html,
            Value::Null,
            None,
        );
        assert_eq!(fen, SICILIAN);
    }

    #[test]
    fn test_lichess_reconstruction_from_pieces() {
        let html = r#"
            <div class="main-board"><div class="cg-wrap orientation-white"><cg-board>
              <piece class="white king" style="transform: translate(240px, 420px);"></piece>
              <piece class="black king" style="transform: translate(240px, 0px);"></piece>
              <piece class="black rook" style="transform: translate(0px, 0px);"></piece>
              <square class="last-move" style="transform: translate(0px, 60px);"></square>
            </cg-board></div></div>"#;
        let (fen, orientation) = run(Site::Lichess, "https://lichess.org/abc", html, Value::Null, Some(480.0));
        assert_eq!(orientation, Orientation::White);
        assert_eq!(fen, "r3k3/8/8/8/8/8/8/4K3 w KQkq - 0 1");
    }

    #[test]
    fn test_lichess_reconstruction_flipped() {
        let html = r#"
            <div class="main-board"><div class="cg-wrap orientation-black"><cg-board>
              <piece class="white king" style="transform: translate(180px, 0px);"></piece>
              <piece class="black king" style="transform: translate(180px, 420px);"></piece>
            </cg-board></div></div>"#;
        let (fen, orientation) = run(Site::Lichess, "https://lichess.org/abc", html, Value::Null, Some(480.0));
        assert_eq!(orientation, Orientation::Black);
        assert_eq!(fen, "4k3/8/8/8/8/8/8/4K3 w KQkq - 0 1");
    }

    #[test]
    fn test_reconstruction_without_black_king_falls_back_to_default() {
        let html = r#"
            <div class="main-board"><div class="cg-wrap"><cg-board>
              <piece class="white king" style="transform: translate(240px, 420px);"></piece>
              <piece class="white queen" style="transform: translate(240px, 0px);"></piece>
            </cg-board></div></div>"#;
        let (fen, _) = run(Site::Lichess, "https://lichess.org/abc", html, Value::Null, Some(480.0));
        assert_eq!(fen, DEFAULT_FEN);
    }

    #[test]
    fn test_chesscom_board_data_json_and_raw() {
        let html = format!(r#"<wc-chess-board class="board" data-board='{{"fen":"{}"}}'></wc-chess-board>"#, ITALIAN);
        let (fen, _) = run(Site::ChessCom, "https://www.chess.com/game/live/1", &html, Value::Null, None);
        assert_eq!(fen, ITALIAN);

        let html = format!(r#"<chess-board data-fen="{}"></chess-board>"#, SICILIAN);
        let (fen, _) = run(Site::ChessCom, "https://www.chess.com/game/live/1", &html, Value::Null, None);
        assert_eq!(fen, SICILIAN);
    }

    #[test]
    fn test_chesscom_globals() {
        let (fen, _) = run(
            Site::ChessCom,
            "https://www.chess.com/game/live/1",
            r#"<div class="board"></div>"#,
            json!({ "ChessComGame": { "game": { "fen": ITALIAN } } }),
            None,
        );
        assert_eq!(fen, ITALIAN);
    }

    #[test]
    fn test_chesscom_reconstruction_from_square_classes() {
        let html = r#"
            <wc-chess-board class="board">
              <div class="piece wr square-11"></div>
              <div class="piece wk square-51"></div>
              <div class="piece bk square-58"></div>
              <div class="piece bp square-47"></div>
              <div class="highlight square-44"></div>
            </wc-chess-board>"#;
        let (fen, _) = run(Site::ChessCom, "https://www.chess.com/play/computer", html, Value::Null, None);
        assert_eq!(fen, "4k3/3p4/8/8/8/8/8/R3K3 w KQkq - 0 1");
    }

    #[test]
    fn test_chesscom_flipped_transform_reconstruction() {
        let html = r#"
            <chess-board class="flipped" style="width: 400px">
              <div class="piece" data-piece="wk" style="transform: translate(150px, 0px)"></div>
              <div class="piece" data-piece="bk" style="transform: translate(150px, 350px)"></div>
            </chess-board>"#;
        let (fen, orientation) = run(Site::ChessCom, "https://www.chess.com/game/1", html, Value::Null, None);
        assert_eq!(orientation, Orientation::Black);
        assert_eq!(fen, "4k3/8/8/8/8/8/8/4K3 w KQkq - 0 1");
    }

    #[test]
    fn test_chesscom_fen_widget_textarea() {
        let html = format!(r#"<textarea class="board-modal-fen-textarea">{}</textarea>"#, ITALIAN);
        let (fen, _) = run(Site::ChessCom, "https://www.chess.com/analysis", &html, Value::Null, None);
        assert_eq!(fen, ITALIAN);
    }

    #[test]
    fn test_invalid_widget_falls_through_to_url() {
        let html = r#"<div class="board-modal-fen">1/2 draw agreed</div>"#;
        let url = "https://www.chess.com/analysis?fen=rnbqkbnr/pp1ppppp/8/2p5/4P3/8/PPPP1PPP/RNBQKBNR%20w%20KQkq%20c6%200%202";
        let (fen, _) = run(Site::ChessCom, url, html, Value::Null, None);
        assert_eq!(fen, SICILIAN);

        // Same widget with no URL fallback ends on the start position
        let (fen, _) = run(Site::ChessCom, "https://www.chess.com/analysis", html, Value::Null, None);
        assert_eq!(fen, DEFAULT_FEN);
    }

    #[test]
    fn test_lichess_url_parameter_with_underscores() {
        let (fen, _) = run(Site::Lichess, "https://lichess.org/analysis?fen=8/8/8/8/8/8/8/4K2k_w_-_-_0_1", "", Value::Null, None);
        assert_eq!(fen, "8/8/8/8/8/8/8/4K2k w - - 0 1");
    }

    #[test]
    fn test_extracted_fen_whitespace_is_collapsed() {
        let html = "<chess-board data-fen=\"8/8/8/8/8/8/8/4K2k w  -\t- 0 1\"></chess-board>";
        let (fen, _) = run(Site::ChessCom, "https://www.chess.com/game/live/1", html, Value::Null, None);
        assert_eq!(fen, "8/8/8/8/8/8/8/4K2k w - - 0 1");
    }

    #[test]
    fn test_empty_pages_default_and_stay_valid() {
        for site in [Site::Lichess, Site::ChessCom, Site::Unknown] {
            let (fen, _) = run(site, "https://example.com", "", Value::Null, None);
            assert_eq!(fen, DEFAULT_FEN);
            assert!(fen::is_valid_fen(&fen));
        }
    }
}
