//! Error taxonomy for the capture pipeline.
//! Extraction misses are not errors (see `extract::StrategyMiss`); only
//! orchestration-level failures are represented here.

use thiserror::Error;

use crate::raster::RenderError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Unsupported chess site for capture.")]
    UnsupportedSite,

    #[error(transparent)]
    Injection(#[from] InjectionError),

    #[error("Failed to render board image: {0}")]
    Rendering(#[from] RenderError),

    #[error("Failed to store captured board: {0}")]
    Storage(#[from] StoreError),
}

/// The capture logic could not be delivered into (or read back from) the tab.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InjectionError {
    #[error("The target tab could not be found. It might have been closed.")]
    TabClosed,

    #[error("Cannot access this page due to browser restrictions ({0}). Try on a different page.")]
    RestrictedPage(String),

    #[error("Cannot connect to the tab. It might be closed, reloading, or a special page (e.g., chrome://).")]
    ConnectionLost(String),
}

const RESTRICTED_SCHEMES: &[&str] = &[
    "chrome://",
    "chrome-extension://",
    "chrome-search://",
    "edge://",
    "about:",
    "view-source:",
    "devtools://",
];

impl InjectionError {
    /// Maps a raw host error message onto a classified injection failure.
    pub fn classify(message: &str) -> Self {
        if message.contains("No target with given id") || message.contains("No tab with id") {
            InjectionError::TabClosed
        } else if message.contains("Cannot access contents of url") {
            let url = message.split('"').nth(1).unwrap_or("URL restricted");
            InjectionError::RestrictedPage(url.to_string())
        } else {
            InjectionError::ConnectionLost(message.to_string())
        }
    }

    /// Fails for URL schemes that a page script can never be injected into.
    pub fn check_url(url: &str) -> Result<(), InjectionError> {
        let lower = url.trim().to_ascii_lowercase();
        if RESTRICTED_SCHEMES.iter().any(|scheme| lower.starts_with(scheme)) {
            return Err(InjectionError::RestrictedPage(url.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_site_message() {
        assert_eq!(CaptureError::UnsupportedSite.to_string(), "Unsupported chess site for capture.");
    }

    #[test]
    fn test_classify_host_errors() {
        assert_eq!(InjectionError::classify("No target with given id 42"), InjectionError::TabClosed);
        assert_eq!(
            InjectionError::classify(r#"Cannot access contents of url "chrome://settings". Extension manifest..."#),
            InjectionError::RestrictedPage("chrome://settings".to_string())
        );
        let lost = InjectionError::classify("Could not establish connection. Receiving end does not exist.");
        assert!(matches!(lost, InjectionError::ConnectionLost(_)));
        assert!(lost.to_string().starts_with("Cannot connect to the tab."));
    }

    #[test]
    fn test_check_url_rejects_browser_pages() {
        assert!(InjectionError::check_url("chrome://extensions").is_err());
        assert!(InjectionError::check_url("about:blank").is_err());
        assert!(InjectionError::check_url("https://lichess.org/abc").is_ok());
        let err = InjectionError::check_url("edge://newtab").unwrap_err();
        assert!(err.to_string().contains("edge://newtab"));
    }
}
