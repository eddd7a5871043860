//! Capture orchestration.
//!
//! One capture walks `Idle → Injecting → Capturing → Rendering → Rasterizing →
//! Storing → Done`, or stops in `Error` at the first failing stage. The stage
//! record lives in a caller-owned `CaptureSession`; nothing here is global.
//! A record is written to the store only after every earlier stage succeeded.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::Orientation;
use crate::config::CaptureConfig;
use crate::error::CaptureError;
use crate::extract::{Extraction, extract};
use crate::page::{Page, PageCapture};
use crate::raster::Rasterizer;
use crate::render::{BoardGeometry, render_board};
use crate::site::Site;
use crate::store::{CAPTURED_BOARD_KEY, KeyValueStore, StoreError};
use crate::tab::{TabId, TabSource};

/// The stored capture record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureResult {
    /// `data:image/png;base64,...`
    pub image_data: String,
    pub fen: String,
    pub pgn: String,
    pub orientation: Orientation,
    pub site: Site,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

/// What the entry point hands back: `{success, data}` or `{success, error}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<CaptureResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CaptureResponse {
    pub fn ok(result: CaptureResult) -> Self {
        Self { success: true, data: Some(result), error: None }
    }

    pub fn failed(error: &CaptureError) -> Self {
        Self { success: false, data: None, error: Some(error.to_string()) }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureStage {
    #[default]
    Idle,
    Injecting,
    Capturing,
    Rendering,
    Rasterizing,
    Storing,
    Done,
    Error,
}

impl CaptureStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, CaptureStage::Done | CaptureStage::Error)
    }
}

/// Per-caller capture state. `&mut` access keeps one capture per session at a time.
#[derive(Debug, Default)]
pub struct CaptureSession {
    stage: CaptureStage,
    history: Vec<CaptureStage>,
    last_response: Option<CaptureResponse>,
}

impl CaptureSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> CaptureStage {
        self.stage
    }

    /// Stages visited by the most recent capture, starting with `Idle`.
    pub fn history(&self) -> &[CaptureStage] {
        &self.history
    }

    pub fn last_response(&self) -> Option<&CaptureResponse> {
        self.last_response.as_ref()
    }

    fn begin(&mut self) {
        self.stage = CaptureStage::Idle;
        self.history.clear();
        self.history.push(CaptureStage::Idle);
    }

    fn advance(&mut self, stage: CaptureStage) {
        debug!(from = ?self.stage, to = ?stage, "capture stage");
        self.stage = stage;
        self.history.push(stage);
    }
}

/// Parses a page capture, detects the site and runs extraction.
///
/// Synchronous on purpose: the parsed DOM never lives across an await.
pub fn capture_position(capture: &PageCapture, min_pieces: usize) -> Result<(Site, Extraction), CaptureError> {
    let page = Page::parse(capture);
    let site = Site::detect(page.hostname()).ok_or(CaptureError::UnsupportedSite)?;
    let extraction = extract(&page, site, min_pieces);
    debug!(%site, fen = %extraction.fen, pgn_len = extraction.pgn.len(), orientation = %extraction.orientation, "position extracted");
    Ok((site, extraction))
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

pub struct Capturer<S, K> {
    tabs: S,
    store: K,
    rasterizer: Rasterizer,
    geometry: BoardGeometry,
    min_pieces: usize,
}

impl<S: TabSource, K: KeyValueStore> Capturer<S, K> {
    pub fn new(tabs: S, store: K, config: &CaptureConfig) -> Self {
        Self {
            tabs,
            store,
            rasterizer: Rasterizer::new(config),
            geometry: BoardGeometry::from(config),
            min_pieces: config.min_reconstructed_pieces,
        }
    }

    pub fn store(&self) -> &K {
        &self.store
    }

    pub fn rasterizer(&self) -> &Rasterizer {
        &self.rasterizer
    }

    /// Runs one capture of `tab`. Never fails: errors come back as
    /// `CaptureResponse { success: false, error }`.
    pub async fn capture(&self, session: &mut CaptureSession, tab: &TabId) -> CaptureResponse {
        session.begin();
        let response = match self.run(session, tab).await {
            Ok(result) => {
                session.advance(CaptureStage::Done);
                info!(%tab, site = %result.site, fen = %result.fen, "capture stored");
                CaptureResponse::ok(result)
            }
            Err(e) => {
                warn!(%tab, stage = ?session.stage(), "capture failed: {}", e);
                session.advance(CaptureStage::Error);
                CaptureResponse::failed(&e)
            }
        };
        session.last_response = Some(response.clone());
        response
    }

    async fn run(&self, session: &mut CaptureSession, tab: &TabId) -> Result<CaptureResult, CaptureError> {
        session.advance(CaptureStage::Injecting);
        let page = self.tabs.fetch(tab).await?;

        session.advance(CaptureStage::Capturing);
        let (site, extraction) = capture_position(&page, self.min_pieces)?;

        session.advance(CaptureStage::Rendering);
        let scene = render_board(&extraction.fen, extraction.orientation, self.geometry);

        session.advance(CaptureStage::Rasterizing);
        let image_data = self.rasterizer.rasterize(&scene).await?;

        let result = CaptureResult {
            image_data,
            fen: extraction.fen,
            pgn: extraction.pgn,
            orientation: extraction.orientation,
            site,
            timestamp: now_millis(),
        };

        session.advance(CaptureStage::Storing);
        let record = serde_json::to_value(&result).map_err(StoreError::Json)?;
        self.store.set(CAPTURED_BOARD_KEY, record).await?;
        Ok(result)
    }
}

/// Reads the last stored capture, if any.
pub async fn load_captured<K: KeyValueStore>(store: &K) -> Result<Option<CaptureResult>, StoreError> {
    match store.get(CAPTURED_BOARD_KEY).await? {
        Some(value) => serde_json::from_value(value).map(Some).map_err(StoreError::Json),
        None => Ok(None),
    }
}
