//! Rasterizer: board SVG → PNG data URL.
//!
//! The board markup is mounted into an off-screen host for the duration of the
//! render and unmounted by a guard on every exit path. Rendering uses resvg
//! with the system font database only; nothing is fetched.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose};
use image::{ImageFormat, RgbaImage};
use resvg::usvg::fontdb::Database;
use resvg::{tiny_skia, usvg};
use thiserror::Error;
use tracing::debug;

use crate::config::CaptureConfig;
use crate::render::BoardScene;

const DATA_URL_PREFIX: &str = "data:image/png;base64,";

static SYSTEM_FONTS: LazyLock<Arc<Database>> = LazyLock::new(|| {
    let mut db = Database::new();
    db.load_system_fonts();
    debug!(faces = db.len(), "loaded system fonts");
    Arc::new(db)
});

/// System font database, loaded on first use and shared afterwards.
pub fn system_fonts() -> Arc<Database> {
    Arc::clone(&SYSTEM_FONTS)
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("board markup could not be parsed: {0}")]
    Markup(String),
    #[error("cannot allocate a {width}x{height} canvas")]
    Canvas { width: u32, height: u32 },
    #[error("PNG encoding failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("rasterization timed out after {0} ms")]
    Timeout(u64),
    #[error("rasterizer task failed: {0}")]
    Worker(String),
}

// *************** Off-screen host ***************

/// Holds board documents while they are being rasterized. Nothing mounted
/// here is ever visible; the host only exists so that cleanup is observable.
#[derive(Debug, Default)]
pub struct OffscreenHost {
    next_id: AtomicU64,
    mounted: Mutex<BTreeMap<u64, Arc<str>>>,
}

impl OffscreenHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Mounts a document. It stays mounted until the returned guard is dropped.
    pub fn mount(self: &Arc<Self>, markup: String) -> Mounted {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let markup: Arc<str> = markup.into();
        self.slots().insert(id, Arc::clone(&markup));
        debug!(id, bytes = markup.len(), "mounted board off-screen");
        Mounted { host: Arc::clone(self), id, markup }
    }

    pub fn mounted_count(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.mounted_count() == 0
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, BTreeMap<u64, Arc<str>>> {
        // A poisoned map is still a valid map
        self.mounted.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Guard for one mounted document.
#[derive(Debug)]
pub struct Mounted {
    host: Arc<OffscreenHost>,
    id: u64,
    markup: Arc<str>,
}

impl Mounted {
    pub fn markup(&self) -> Arc<str> {
        Arc::clone(&self.markup)
    }
}

impl Drop for Mounted {
    fn drop(&mut self) {
        self.host.slots().remove(&self.id);
        debug!(id = self.id, "unmounted board");
    }
}

// *************** Rasterization ***************

/// Renders SVG markup into a `size × size` logical canvas oversampled by
/// `scale`, and returns it as a PNG data URL. Text uses `fonts` only.
pub fn rasterize_svg(markup: &str, size: u32, scale: f32, fonts: Arc<Database>) -> Result<String, RenderError> {
    let width = (size as f32 * scale).round() as u32;
    let height = width;
    let mut pixmap = tiny_skia::Pixmap::new(width, height).ok_or(RenderError::Canvas { width, height })?;

    let options = usvg::Options { fontdb: fonts, ..usvg::Options::default() };
    let tree = usvg::Tree::from_str(markup, &options).map_err(|e| RenderError::Markup(e.to_string()))?;

    // Fit the document to the canvas whatever its declared size
    let doc = tree.size();
    let transform = tiny_skia::Transform::from_scale(width as f32 / doc.width(), height as f32 / doc.height());
    resvg::render(&tree, transform, &mut pixmap.as_mut());

    let png = encode_png(&pixmap)?;
    Ok(format!("{}{}", DATA_URL_PREFIX, general_purpose::STANDARD.encode(png)))
}

fn encode_png(pixmap: &tiny_skia::Pixmap) -> Result<Vec<u8>, RenderError> {
    let (width, height) = (pixmap.width(), pixmap.height());
    let mut rgba = Vec::with_capacity(pixmap.data().len());
    for pixel in pixmap.pixels() {
        let c = pixel.demultiply();
        rgba.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
    }
    let image = RgbaImage::from_raw(width, height, rgba).ok_or(RenderError::Canvas { width, height })?;

    let mut png = Vec::new();
    image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}

/// Decodes a data URL produced by `rasterize_svg` back to PNG bytes.
pub fn png_bytes(data_url: &str) -> Option<Vec<u8>> {
    let encoded = data_url.strip_prefix(DATA_URL_PREFIX)?;
    general_purpose::STANDARD.decode(encoded).ok()
}

/// Async front end: mounts the scene, rasterizes it on a blocking thread under
/// a timeout, and always unmounts.
#[derive(Debug, Clone)]
pub struct Rasterizer {
    host: Arc<OffscreenHost>,
    fonts: Arc<Database>,
    size: u32,
    scale: f32,
    timeout: Duration,
}

impl Rasterizer {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            host: OffscreenHost::new(),
            fonts: system_fonts(),
            size: config.board_size,
            scale: config.raster_scale,
            timeout: Duration::from_millis(config.image_timeout_ms),
        }
    }

    pub fn host(&self) -> &Arc<OffscreenHost> {
        &self.host
    }

    pub fn fonts(&self) -> &Arc<Database> {
        &self.fonts
    }

    pub async fn rasterize(&self, scene: &BoardScene) -> Result<String, RenderError> {
        let mounted = self.host.mount(scene.to_svg());
        let markup = mounted.markup();
        let (size, scale, fonts) = (self.size, self.scale, Arc::clone(&self.fonts));

        let job = tokio::task::spawn_blocking(move || rasterize_svg(&markup, size, scale, fonts));
        let result = match tokio::time::timeout(self.timeout, job).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(RenderError::Worker(e.to_string())),
            Err(_) => Err(RenderError::Timeout(self.timeout.as_millis() as u64)),
        };
        drop(mounted);
        result
    }
}
