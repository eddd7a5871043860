//! Read-only view of a captured page: URL, parsed DOM, exposed JS globals.

use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// What a tab hands back to the core. Serialized form is also the on-disk
/// snapshot format used by `tab::SnapshotDir`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageCapture {
    pub url: String,
    pub html: String,
    /// Site JS state (`Lichess`, `ChessComGame`, `game`, ...) with getters already resolved.
    #[serde(default)]
    pub globals: Value,
    /// Rendered width of the board element in CSS pixels.
    #[serde(default)]
    pub board_width: Option<f64>,
}

/// Parsed page. Holds the DOM for the duration of one extraction pass.
pub struct Page {
    url: Option<Url>,
    document: Html,
    globals: Value,
    board_width: Option<f64>,
}

impl Page {
    pub fn parse(capture: &PageCapture) -> Self {
        let url = match Url::parse(&capture.url) {
            Ok(url) => Some(url),
            Err(e) => {
                debug!("unparseable page url {:?}: {}", capture.url, e);
                None
            }
        };
        Self {
            url,
            document: Html::parse_document(&capture.html),
            globals: capture.globals.clone(),
            board_width: capture.board_width,
        }
    }

    pub fn hostname(&self) -> &str {
        self.url.as_ref().and_then(|u| u.host_str()).unwrap_or("")
    }

    pub fn path(&self) -> &str {
        self.url.as_ref().map(|u| u.path()).unwrap_or("")
    }

    pub fn query_param(&self, name: &str) -> Option<String> {
        self.url
            .as_ref()?
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    /// Looks up a dotted path (`"Lichess.analysis.node.fen"`) in the page globals.
    pub fn global(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(&self.globals, |value, key| value.get(key))
            .filter(|value| !value.is_null())
    }

    pub fn global_str(&self, path: &str) -> Option<&str> {
        self.global(path).and_then(Value::as_str)
    }

    pub fn board_width(&self) -> Option<f64> {
        self.board_width.filter(|w| *w > 0.0)
    }

    pub fn select(&self, css: &str) -> Vec<ElementRef<'_>> {
        match selector(css) {
            Some(sel) => self.document.select(&sel).collect(),
            None => Vec::new(),
        }
    }

    pub fn select_first(&self, css: &str) -> Option<ElementRef<'_>> {
        let sel = selector(css)?;
        self.document.select(&sel).next()
    }

    /// Text content of `<body>`, or of the whole document when there is none.
    pub fn body_text(&self) -> String {
        match self.select_first("body") {
            Some(body) => body.text().collect(),
            None => self.document.root_element().text().collect(),
        }
    }
}

pub fn selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(sel) => Some(sel),
        Err(e) => {
            debug!("bad selector {:?}: {:?}", css, e);
            None
        }
    }
}

pub fn select_within<'a>(element: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match selector(css) {
        Some(sel) => element.select(&sel).collect(),
        None => Vec::new(),
    }
}

pub fn first_within<'a>(element: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let sel = selector(css)?;
    element.select(&sel).next()
}

/// Nearest ancestor-or-self matching `css`.
pub fn closest<'a>(element: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let sel = selector(css)?;
    if sel.matches(&element) {
        return Some(element);
    }
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|ancestor| sel.matches(ancestor))
}

pub fn parent(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    element.parent().and_then(ElementRef::wrap)
}

pub fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Form value when present (`<input value>`), otherwise text content.
pub fn value_or_text(element: ElementRef<'_>) -> String {
    match element.value().attr("value") {
        Some(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => text_of(element),
    }
}

pub fn attr<'a>(element: ElementRef<'a>, name: &str) -> Option<&'a str> {
    element.value().attr(name).filter(|v| !v.is_empty())
}

/// Class names in no particular order.
pub fn classes<'a>(element: ElementRef<'a>) -> Vec<&'a str> {
    element.value().classes().collect()
}

pub fn has_class(element: ElementRef<'_>, name: &str) -> bool {
    element.value().classes().any(|c| c == name)
}

/// Value of one property from the inline `style` attribute.
pub fn inline_style<'a>(element: ElementRef<'a>, property: &str) -> Option<&'a str> {
    element.value().attr("style")?.split(';').find_map(|decl| {
        let (name, value) = decl.split_once(':')?;
        (name.trim().eq_ignore_ascii_case(property)).then(|| value.trim())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page(url: &str, html: &str) -> Page {
        Page::parse(&PageCapture {
            url: url.to_string(),
            html: html.to_string(),
            globals: json!({ "Lichess": { "analysis": { "node": { "fen": "x" } }, "puzzle": null } }),
            board_width: Some(480.0),
        })
    }

    #[test]
    fn test_url_parts() {
        let p = page("https://lichess.org/study/abc?fen=8/8&x=1", "");
        assert_eq!(p.hostname(), "lichess.org");
        assert_eq!(p.path(), "/study/abc");
        assert_eq!(p.query_param("fen").as_deref(), Some("8/8"));
        assert_eq!(p.query_param("missing"), None);

        let broken = page("not a url", "");
        assert_eq!(broken.hostname(), "");
        assert_eq!(broken.query_param("fen"), None);
    }

    #[test]
    fn test_global_paths() {
        let p = page("https://lichess.org", "");
        assert_eq!(p.global_str("Lichess.analysis.node.fen"), Some("x"));
        assert!(p.global("Lichess.puzzle").is_none());
        assert!(p.global("Lichess.study.currentNode.fen").is_none());
    }

    #[test]
    fn test_dom_helpers() {
        let html = r#"<html><body>
            <div class="orientation-black"><div class="cg-wrap" id="wrap"><cg-board>
              <piece class="white king" style="transform: translate(240px, 420px); opacity: 1"></piece>
            </cg-board></div></div>
            <input class="copyable" value=" 8/8 ">
            <p>hello</p>
        </body></html>"#;
        let p = page("https://lichess.org", html);

        let piece = p.select_first("cg-board piece").unwrap();
        let mut names = classes(piece);
        names.sort_unstable();
        assert_eq!(names, vec!["king", "white"]);
        assert!(has_class(piece, "king"));
        assert_eq!(inline_style(piece, "transform"), Some("translate(240px, 420px)"));
        assert_eq!(inline_style(piece, "width"), None);

        let wrap = closest(piece, ".cg-wrap").unwrap();
        assert_eq!(attr(wrap, "id"), Some("wrap"));
        assert!(closest(piece, ".orientation-black").is_some());
        assert!(closest(piece, ".orientation-white").is_none());
        assert_eq!(parent(piece).unwrap().value().name(), "cg-board");

        let input = p.select_first("input.copyable").unwrap();
        assert_eq!(value_or_text(input), "8/8");
        assert!(p.body_text().contains("hello"));
        assert!(p.select("[[bad").is_empty());
    }
}
