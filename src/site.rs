//! Site detection from the page hostname.

use serde::{Deserialize, Serialize};

/// Provenance of a capture. `detect` never yields `Unknown`, so stored
/// records always name a supported site; extraction on `Unknown` runs no
/// strategies and falls back to the defaults.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Site {
    Lichess,
    #[serde(rename = "chesscom")]
    ChessCom,
    Unknown,
}

impl Site {
    /// Plain substring check against the hostname; `None` means unsupported.
    pub fn detect(hostname: &str) -> Option<Site> {
        if hostname.contains("lichess.org") {
            Some(Site::Lichess)
        } else if hostname.contains("chess.com") {
            Some(Site::ChessCom)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Site::Lichess => "lichess",
            Site::ChessCom => "chesscom",
            Site::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Site {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_supported_hosts() {
        assert_eq!(Site::detect("lichess.org"), Some(Site::Lichess));
        assert_eq!(Site::detect("www.chess.com"), Some(Site::ChessCom));
        assert_eq!(Site::detect("example.com"), None);
        assert_eq!(Site::detect(""), None);
    }

    #[test]
    fn test_site_serializes_like_stored_record() {
        assert_eq!(serde_json::to_string(&Site::ChessCom).unwrap(), "\"chesscom\"");
        assert_eq!(serde_json::to_string(&Site::Lichess).unwrap(), "\"lichess\"");
        assert_eq!(Site::Unknown.to_string(), "unknown");
    }
}
