//! Off-screen rendering of print documents
//!
//! A document is written to a temporary `.html` file (or, when the temp
//! directory is unusable, encoded into a `data:` URL) and loaded into a fresh
//! surface sized for the paper. The surface and the temporary file are owned
//! by a [`RenderedDocument`], which releases both exactly once: explicitly via
//! [`RenderedDocument::release`] or, on any early exit, when dropped.

use crate::paper::{PageSetup, PaperProfile};
use crate::{Error, LoadSignal, PrintArtifact, Result, Surface, SurfaceFactory, SurfaceOptions};
use base64::Engine as _;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempPath;
use url::Url;

/// A print document made loadable by URL
#[derive(Debug)]
pub struct TempDocument {
    url: String,
    path: Option<TempPath>,
}

impl TempDocument {
    /// Write `markup` to a temporary `.html` file in `dir` (system temp dir
    /// when `None`). Falls back to a base64 `data:` URL when the file cannot
    /// be written.
    pub fn materialize(markup: &str, dir: Option<&Path>) -> Result<Self> {
        match write_temp_file(markup, dir) {
            Ok(path) => {
                let url = Url::from_file_path(&path)
                    .map_err(|_| {
                        Error::RenderError(format!(
                            "temporary document path is not absolute: {}",
                            path.display()
                        ))
                    })?
                    .to_string();
                log::debug!("materialized print document at {}", path.display());
                Ok(Self {
                    url,
                    path: Some(path),
                })
            }
            Err(e) => {
                log::warn!("temp directory unusable ({}); using a data URL", e);
                Ok(Self::inline(markup))
            }
        }
    }

    /// Encode `markup` into a `data:` URL without touching the filesystem.
    pub fn inline(markup: &str) -> Self {
        let encoded = base64::engine::general_purpose::STANDARD.encode(markup.as_bytes());
        Self {
            url: format!("data:text/html;charset=utf-8;base64,{}", encoded),
            path: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Backing file, if the document was written to disk.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Delete the backing file now.
    pub fn remove(self) -> Result<()> {
        match self.path {
            Some(path) => {
                let display = path.display().to_string();
                path.close().map_err(|e| {
                    Error::ResourceCleanupFailure(format!("could not remove {}: {}", display, e))
                })
            }
            None => Ok(()),
        }
    }
}

fn write_temp_file(markup: &str, dir: Option<&Path>) -> std::io::Result<TempPath> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("printbridge-").suffix(".html");
    let mut file = match dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    file.write_all(markup.as_bytes())?;
    file.flush()?;
    Ok(file.into_temp_path())
}

/// A loaded surface plus the temporary document backing it
pub struct RenderedDocument {
    surface: Option<Box<dyn Surface>>,
    document: Option<TempDocument>,
    /// Borrowed surfaces (the host's primary view) are dropped, never closed
    owned: bool,
}

impl std::fmt::Debug for RenderedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderedDocument")
            .field("live", &self.surface.is_some())
            .field("owned", &self.owned)
            .field("document", &self.document)
            .finish()
    }
}

impl RenderedDocument {
    pub fn new(surface: Box<dyn Surface>, document: Option<TempDocument>) -> Self {
        Self {
            surface: Some(surface),
            document,
            owned: true,
        }
    }

    /// Wrap a surface the job does not own, such as the primary view.
    pub fn borrowed(surface: Box<dyn Surface>) -> Self {
        Self {
            surface: Some(surface),
            document: None,
            owned: false,
        }
    }

    pub fn owns_surface(&self) -> bool {
        self.owned
    }

    /// URL the surface was loaded from; `None` for the primary view.
    pub fn document_url(&self) -> Option<&str> {
        self.document.as_ref().map(TempDocument::url)
    }

    fn surface_mut(&mut self) -> Result<&mut Box<dyn Surface>> {
        self.surface
            .as_mut()
            .ok_or_else(|| Error::RenderError("surface already released".into()))
    }

    pub fn settle(&mut self) -> Result<()> {
        self.surface_mut()?.settle()
    }

    pub fn capture(&mut self, setup: &PageSetup) -> Result<PrintArtifact> {
        self.surface_mut()?.capture(setup)
    }

    /// Close an owned surface and remove the temporary document.
    ///
    /// Cleanup failures are logged, never returned: the print outcome is
    /// already decided by the time resources are released.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(surface) = self.surface.take() {
            if !self.owned {
                drop(surface);
            } else if let Err(e) = surface.close() {
                log::warn!("{}", Error::ResourceCleanupFailure(e.to_string()));
            }
        }
        if let Some(document) = self.document.take() {
            if let Err(e) = document.remove() {
                log::warn!("{}", e);
            }
        }
    }
}

impl Drop for RenderedDocument {
    fn drop(&mut self) {
        self.release_inner();
    }
}

/// Loads print documents into fresh surfaces
#[derive(Clone)]
pub struct OffscreenRenderer {
    surfaces: Arc<dyn SurfaceFactory>,
    timeout: Duration,
    temp_dir: Option<PathBuf>,
}

impl OffscreenRenderer {
    pub fn new(surfaces: Arc<dyn SurfaceFactory>, timeout: Duration, temp_dir: Option<PathBuf>) -> Self {
        Self {
            surfaces,
            timeout,
            temp_dir,
        }
    }

    /// Render `document` off-screen at the paper's width.
    ///
    /// `None` hands back the primary view unchanged. On timeout the surface
    /// is destroyed and the temporary document removed before
    /// [`Error::RenderTimeout`] is returned.
    pub async fn render(&self, document: Option<&str>, paper: &PaperProfile) -> Result<RenderedDocument> {
        let Some(markup) = document else {
            let surface = self.surfaces.primary_view()?;
            return Ok(RenderedDocument::borrowed(surface));
        };

        let document = TempDocument::materialize(markup, self.temp_dir.as_deref())?;
        let surface = match self.surfaces.create(&SurfaceOptions::for_paper(paper)) {
            Ok(surface) => surface,
            Err(e) => {
                if let Err(cleanup) = document.remove() {
                    log::warn!("{}", cleanup);
                }
                return Err(e);
            }
        };
        let url = document.url().to_string();
        let mut rendered = RenderedDocument::new(surface, Some(document));

        let (signal, loaded) = LoadSignal::channel();
        rendered.surface_mut()?.load(&url, signal)?;

        match tokio::time::timeout(self.timeout, loaded).await {
            Ok(Ok(Ok(()))) => Ok(rendered),
            Ok(Ok(Err(e))) => {
                rendered.release();
                Err(e)
            }
            Ok(Err(_)) => {
                rendered.release();
                Err(Error::RenderError(
                    "surface dropped its load signal without reporting".into(),
                ))
            }
            Err(_) => {
                let ms = self.timeout.as_millis() as u64;
                log::warn!("surface did not finish loading within {}ms", ms);
                rendered.release();
                Err(Error::RenderTimeout(ms))
            }
        }
    }
}
