//! PGN strategies. Output is a bare move list (`"1. e4 e5 2. Nf3"`) or `""`.

use std::sync::LazyLock;

use regex::Regex;

use super::{ExtractContext, Strategy, StrategyMiss, StrategyResult, first_hit};
use crate::page::{self, Page};
use crate::site::Site;

const SAN: &str = r"(?:[KQRBN]?[a-h]?[1-8]?x?[a-h][1-8](?:=[QRBN])?[+#]?|O-O(?:-O)?)";

/// One move number followed by one or two half-moves.
static MOVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"\b[1-9]\d*\.\s+{SAN}(?:\s+{SAN})?")).expect("move pattern"));

/// Looser form used inside known notation containers.
static NOTATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\.\s+[a-zA-Z0-9+#=\-]+(?:\s+[a-zA-Z0-9+#=\-]+)?").expect("notation pattern"));

static MOVE_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+\.+$").expect("move number pattern"));

/// Body scans need at least this many numbered moves before they count.
const MIN_BODY_MOVES: usize = 3;

const LICHESS_STRATEGIES: &[Strategy<String>] = &[
    Strategy { name: "lichess-pgn-element", run: lichess_pgn_element },
    Strategy { name: "lichess-move-elements", run: lichess_move_elements },
    Strategy { name: "lichess-notation", run: lichess_notation },
    Strategy { name: "body-scan", run: body_scan },
];

const CHESSCOM_STRATEGIES: &[Strategy<String>] = &[
    Strategy { name: "chesscom-share-textarea", run: chesscom_share_textarea },
    Strategy { name: "chesscom-pgn-button", run: chesscom_pgn_button },
    Strategy { name: "chesscom-game-object", run: chesscom_game_object },
    Strategy { name: "chesscom-move-list", run: chesscom_move_list },
    Strategy { name: "chesscom-game-data", run: chesscom_game_data },
    Strategy { name: "chesscom-data-attributes", run: chesscom_data_attributes },
    Strategy { name: "body-scan", run: body_scan },
];

pub fn extract_pgn(ctx: &ExtractContext<'_>) -> String {
    let strategies = match ctx.site {
        Site::Lichess => LICHESS_STRATEGIES,
        Site::ChessCom => CHESSCOM_STRATEGIES,
        Site::Unknown => &[],
    };
    first_hit(ctx, strategies).unwrap_or_default()
}

/// Numbers half-moves as they are pushed: `1. e4 e5 2. Nf3`.
#[derive(Debug, Default)]
pub struct MoveList {
    tokens: Vec<String>,
    plies: usize,
}

impl MoveList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one half-move. Blank tokens and bare move numbers (`12.`, `12...`) are skipped.
    pub fn push(&mut self, san: &str) {
        let san = san.trim();
        if san.is_empty() || MOVE_NUMBER_RE.is_match(san) {
            return;
        }
        if self.plies % 2 == 0 {
            self.tokens.push(format!("{}.", self.plies / 2 + 1));
        }
        self.tokens.push(san.to_string());
        self.plies += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.plies == 0
    }

    pub fn finish(self) -> StrategyResult<String> {
        if self.is_empty() {
            return Err(StrategyMiss::NotFound);
        }
        Ok(self.tokens.join(" "))
    }
}

fn non_empty(text: &str) -> StrategyResult<String> {
    let text = text.trim();
    if text.is_empty() { Err(StrategyMiss::NotFound) } else { Ok(text.to_string()) }
}

fn lichess_pgn_element(ctx: &ExtractContext<'_>) -> StrategyResult<String> {
    let el = ctx.page.select_first(".pgn").ok_or(StrategyMiss::NotFound)?;
    non_empty(&page::text_of(el))
}

fn lichess_move_elements(ctx: &ExtractContext<'_>) -> StrategyResult<String> {
    let mut moves = MoveList::new();
    for el in ctx.page.select(".analyse__moves .move, .replay .move") {
        let san = page::attr(el, "data-san")
            .or_else(|| page::attr(el, "san"))
            .map(str::to_string)
            .unwrap_or_else(|| page::text_of(el));
        moves.push(&san);
    }
    moves.finish()
}

fn lichess_notation(ctx: &ExtractContext<'_>) -> StrategyResult<String> {
    for container in ctx.page.select(".notation-322V9, .analyse__move-list, .move-list") {
        let nodes = page::select_within(container, "move, .move, san, .san");
        if !nodes.is_empty() {
            let mut moves = MoveList::new();
            for node in nodes {
                moves.push(&page::text_of(node));
            }
            if !moves.is_empty() {
                return moves.finish();
            }
            continue;
        }

        let text = page::text_of(container);
        let found: Vec<&str> = NOTATION_RE.find_iter(&text).map(|m| m.as_str()).collect();
        if !found.is_empty() {
            return Ok(found.join(" "));
        }
    }
    Err(StrategyMiss::NotFound)
}

/// Numbered moves found anywhere in the body text.
pub fn scan_moves(text: &str) -> Vec<&str> {
    MOVE_RE.find_iter(text).map(|m| m.as_str()).collect()
}

fn body_scan(ctx: &ExtractContext<'_>) -> StrategyResult<String> {
    let text = ctx.page.body_text();
    let found = scan_moves(&text);
    if found.is_empty() {
        return Err(StrategyMiss::NotFound);
    }
    if found.len() < MIN_BODY_MOVES {
        return Err(StrategyMiss::Rejected(format!("only {} move-like tokens in page text", found.len())));
    }
    Ok(found.join(" "))
}

fn chesscom_share_textarea(ctx: &ExtractContext<'_>) -> StrategyResult<String> {
    let el = ctx
        .page
        .select_first(".share-menu-tab-pgn-textarea, textarea.copy-pgn, .share-menu__pgn-textarea")
        .ok_or(StrategyMiss::NotFound)?;
    non_empty(&page::value_or_text(el))
}

fn chesscom_pgn_button(ctx: &ExtractContext<'_>) -> StrategyResult<String> {
    let button = ctx
        .page
        .select_first(r#"button[data-cy="share-menu-pgn-button"], .share-menu__pgn-button, .share-menu__button--pgn"#)
        .ok_or(StrategyMiss::NotFound)?;
    ["data-pgn", "data-clipboard-text", "data-pgn-text"]
        .iter()
        .find_map(|name| page::attr(button, name))
        .ok_or(StrategyMiss::NotFound)
        .and_then(non_empty)
}

fn first_global(page: &Page, paths: &[&str]) -> StrategyResult<String> {
    paths
        .iter()
        .filter_map(|path| page.global_str(path))
        .find_map(|pgn| non_empty(pgn).ok())
        .ok_or(StrategyMiss::NotFound)
}

fn chesscom_game_object(ctx: &ExtractContext<'_>) -> StrategyResult<String> {
    first_global(ctx.page, &["ChessComGame.game.pgn", "ChessComGame.pgn"])
}

fn chesscom_game_data(ctx: &ExtractContext<'_>) -> StrategyResult<String> {
    first_global(ctx.page, &["gameData.pgn", "chessGameData.pgn"])
}

/// Leading move number of `"12."` or `"12"`.
fn move_number(text: &str) -> Option<u32> {
    let digits: String = text.trim().chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

fn chesscom_move_list(ctx: &ExtractContext<'_>) -> StrategyResult<String> {
    let list = ctx
        .page
        .select_first(".move-list-container, .vertical-move-list, .move-list, .moves")
        .ok_or(StrategyMiss::NotFound)?;

    let rows = page::select_within(
        list,
        r#"[data-whole-move-number], .node, .move, .move-text-component, [class*="node-"]"#,
    );
    let mut moves = Vec::new();
    let mut last_number = 0;

    for row in rows {
        let mut number = page::first_within(row, r#".move-number, [class*="move-number"], [class*="node-number"]"#)
            .map(page::text_of)
            .or_else(|| page::attr(row, "data-whole-move-number").map(str::to_string))
            .and_then(|text| move_number(&text));

        let halves: Vec<String> = page::select_within(
            row,
            r#"[data-figurine], [class*="node-highlight"], [class*="move-text"], [class*="san"], [class*="notation"]"#,
        )
        .into_iter()
        .take(2)
        .map(page::text_of)
        .filter(|text| !text.is_empty())
        .collect();

        let (white, black) = if halves.is_empty() {
            // Plain rows read "12. Nf3 Nc6"
            let text = page::text_of(row);
            let parts: Vec<&str> = text.split_whitespace().collect();
            match parts.first() {
                Some(first) if MOVE_NUMBER_RE.is_match(first) && parts.len() > 1 => {
                    number = move_number(first);
                    (parts[1].to_string(), parts.get(2).map(|s| s.to_string()))
                }
                _ => continue,
            }
        } else {
            (halves[0].clone(), halves.get(1).cloned())
        };

        let Some(number) = number else {
            continue;
        };
        if number <= last_number {
            continue;
        }
        last_number = number;
        moves.push(match black {
            Some(black) => format!("{}. {} {}", number, white, black),
            None => format!("{}. {}", number, white),
        });
    }

    if moves.is_empty() {
        return Err(StrategyMiss::NotFound);
    }
    Ok(moves.join(" "))
}

fn chesscom_data_attributes(ctx: &ExtractContext<'_>) -> StrategyResult<String> {
    ctx.page
        .select(r#"[data-pgn], [data-game-pgn], [data-clipboard-text*="1."]"#)
        .into_iter()
        .filter_map(|el| {
            ["data-pgn", "data-game-pgn", "data-clipboard-text"]
                .iter()
                .find_map(|name| page::attr(el, name))
        })
        .find(|pgn| pgn.contains("1."))
        .map(|pgn| pgn.trim().to_string())
        .ok_or(StrategyMiss::NotFound)
}
