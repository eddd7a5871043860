//! Tab sources: where page captures come from.
//!
//! `SnapshotDir` replays captures saved as JSON files. `ChromeTabs` (feature
//! `chrome`) pulls them from a running browser over the DevTools protocol.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::InjectionError;
use crate::page::PageCapture;

/// Identifier of one tab: a DevTools target id or a snapshot file stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TabId(String);

impl TabId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TabId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Delivers the collector into a tab and returns what it read.
#[allow(async_fn_in_trait)]
pub trait TabSource {
    async fn fetch(&self, tab: &TabId) -> Result<PageCapture, InjectionError>;
}

// *************** Snapshot directory ***************

/// A directory of `<tab-id>.json` page captures.
#[derive(Debug, Clone)]
pub struct SnapshotDir {
    dir: PathBuf,
}

impl SnapshotDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, tab: &TabId) -> Option<PathBuf> {
        let id = tab.as_str();
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return None;
        }
        Some(self.dir.join(format!("{}.json", id)))
    }

    /// Tab ids available in the directory, sorted.
    pub fn list(&self) -> std::io::Result<Vec<TabId>> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(TabId::new(stem));
                }
            }
        }
        ids.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(ids)
    }
}

impl TabSource for SnapshotDir {
    async fn fetch(&self, tab: &TabId) -> Result<PageCapture, InjectionError> {
        let path = self.file_for(tab).ok_or(InjectionError::TabClosed)?;
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(InjectionError::TabClosed),
            Err(e) => return Err(InjectionError::ConnectionLost(format!("{}: {}", path.display(), e))),
        };
        let capture: PageCapture = serde_json::from_str(&text)
            .map_err(|e| InjectionError::ConnectionLost(format!("{}: {}", path.display(), e)))?;
        InjectionError::check_url(&capture.url)?;
        debug!(tab = %tab, url = %capture.url, bytes = capture.html.len(), "snapshot loaded");
        Ok(capture)
    }
}

// *************** Live browser ***************

/// Script evaluated in the page; resolves to the capture as a JSON string.
pub const COLLECTOR_JS: &str = include_str!("collector.js");

#[cfg(feature = "chrome")]
pub use chrome::ChromeTabs;

#[cfg(feature = "chrome")]
mod chrome {
    use chromiumoxide::{Browser, Page};
    use futures_util::StreamExt;
    use tokio::task::JoinHandle;
    use tracing::{debug, info};

    use super::{COLLECTOR_JS, TabId, TabSource};
    use crate::error::InjectionError;
    use crate::page::PageCapture;

    fn classify(e: impl std::fmt::Display) -> InjectionError {
        InjectionError::classify(&e.to_string())
    }

    /// Tabs of an already running Chrome, reached through its DevTools websocket.
    pub struct ChromeTabs {
        browser: Browser,
        handler: JoinHandle<()>,
    }

    impl ChromeTabs {
        pub async fn connect(ws_url: &str) -> Result<Self, InjectionError> {
            let (browser, mut handler) = Browser::connect(ws_url)
                .await
                .map_err(|e| InjectionError::ConnectionLost(e.to_string()))?;

            let handler = tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if let Err(e) = event {
                        debug!("devtools handler error: {e}");
                    }
                }
            });
            info!(ws_url, "connected to browser");
            Ok(Self { browser, handler })
        }

        async fn page(&self, tab: &TabId) -> Result<Page, InjectionError> {
            self.browser
                .pages()
                .await
                .map_err(classify)?
                .into_iter()
                .find(|page| page.target_id().as_ref() == tab.as_str())
                .ok_or(InjectionError::TabClosed)
        }

        /// `(tab id, url)` for every open page.
        pub async fn list(&self) -> Result<Vec<(TabId, String)>, InjectionError> {
            let mut tabs = Vec::new();
            for page in self.browser.pages().await.map_err(classify)? {
                let url = page.url().await.map_err(classify)?.unwrap_or_default();
                tabs.push((TabId::new(page.target_id().as_ref()), url));
            }
            Ok(tabs)
        }
    }

    impl Drop for ChromeTabs {
        fn drop(&mut self) {
            self.handler.abort();
        }
    }

    impl TabSource for ChromeTabs {
        async fn fetch(&self, tab: &TabId) -> Result<PageCapture, InjectionError> {
            let page = self.page(tab).await?;
            let url = page.url().await.map_err(classify)?.unwrap_or_default();
            InjectionError::check_url(&url)?;

            let json: String = page
                .evaluate(COLLECTOR_JS)
                .await
                .map_err(classify)?
                .into_value()
                .map_err(|e| InjectionError::ConnectionLost(format!("collector returned no capture: {}", e)))?;
            serde_json::from_str(&json)
                .map_err(|e| InjectionError::ConnectionLost(format!("collector returned malformed capture: {}", e)))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        #[ignore = "requires Chrome with --remote-debugging-port=9222 and CHROME_WS_URL set"]
        async fn test_live_tab_capture() {
            let ws_url = std::env::var("CHROME_WS_URL").expect("CHROME_WS_URL not set");
            let tabs = ChromeTabs::connect(&ws_url).await.expect("connect failed");
            let listed = tabs.list().await.expect("list failed");
            println!("Tabs: {:?}", listed);
            let (tab, _) = listed.first().expect("no open tabs");
            let capture = tabs.fetch(tab).await;
            println!("Capture: {:?}", capture.as_ref().map(|c| &c.url));
        }
    }
}
