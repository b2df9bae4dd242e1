//! CDP renderer (uses the `headless_chrome` crate)

use crate::paper::PageSetup;
use crate::{Error, LoadSignal, PrintArtifact, Result, Surface, SurfaceFactory, SurfaceOptions};
use headless_chrome::browser::tab::Tab;
use headless_chrome::types::PrintToPdfOptions;
use headless_chrome::{Browser, LaunchOptions};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

const MM_PER_INCH: f64 = 25.4;

/// Off-screen surface backed by its own headless Chrome instance
///
/// Every surface launches a private browser so nothing (cookies, storage,
/// open pages) leaks between print jobs; closing the surface ends the
/// process.
pub struct CdpSurface {
    browser: Browser,
    tab: Arc<Tab>,
    navigation: Option<JoinHandle<()>>,
}

impl CdpSurface {
    pub fn launch(options: &SurfaceOptions) -> Result<Self> {
        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .window_size(Some((options.width_px, options.height_px)))
            .build()
            .map_err(|e| Error::CdpError(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::CdpError(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| Error::CdpError(format!("Failed to create tab: {}", e)))?;

        Ok(Self {
            browser,
            tab,
            navigation: None,
        })
    }
}

/// PDF options matching the page setup exactly.
pub fn pdf_options(setup: &PageSetup) -> PrintToPdfOptions {
    let (width, height) = setup.paper.size_inches();
    let m = setup.margins;
    PrintToPdfOptions {
        print_background: Some(true),
        scale: Some(setup.scale),
        paper_width: Some(width),
        paper_height: Some(height),
        margin_top: Some(m.top / MM_PER_INCH),
        margin_bottom: Some(m.bottom / MM_PER_INCH),
        margin_left: Some(m.left / MM_PER_INCH),
        margin_right: Some(m.right / MM_PER_INCH),
        prefer_css_page_size: Some(false),
        ..Default::default()
    }
}

impl Surface for CdpSurface {
    fn load(&mut self, url: &str, signal: LoadSignal) -> Result<()> {
        let tab = Arc::clone(&self.tab);
        let url = url.to_string();
        // navigation blocks until the load event; the renderer owns the timeout
        let handle = thread::Builder::new()
            .name("printbridge-cdp-nav".into())
            .spawn(move || {
                let result = tab
                    .navigate_to(&url)
                    .and_then(|tab| tab.wait_until_navigated())
                    .map(|_| ());
                match result {
                    Ok(()) => signal.loaded(),
                    Err(e) => signal.failed(Error::RenderError(format!("Navigation failed: {}", e))),
                }
            })?;
        self.navigation = Some(handle);
        Ok(())
    }

    fn capture(&mut self, setup: &PageSetup) -> Result<PrintArtifact> {
        let data = self
            .tab
            .print_to_pdf(Some(pdf_options(setup)))
            .map_err(|e| Error::RenderError(format!("print_to_pdf failed: {}", e)))?;
        Ok(PrintArtifact::pdf(data))
    }

    fn close(self: Box<Self>) -> Result<()> {
        let CdpSurface {
            browser,
            tab,
            navigation,
        } = *self;
        if let Err(e) = tab.close(false) {
            log::warn!("Failed to close tab: {}", e);
        }
        drop(tab);
        // Dropping the browser terminates the Chrome process
        drop(browser);
        if let Some(handle) = navigation {
            if handle.is_finished() && handle.join().is_err() {
                return Err(Error::ResourceCleanupFailure("navigation thread panicked".into()));
            }
        }
        Ok(())
    }
}

/// Creates a [`CdpSurface`] per print job
#[derive(Debug, Clone, Default)]
pub struct CdpSurfaceFactory;

impl CdpSurfaceFactory {
    pub fn new() -> Self {
        CdpSurfaceFactory
    }
}

impl SurfaceFactory for CdpSurfaceFactory {
    fn create(&self, options: &SurfaceOptions) -> Result<Box<dyn Surface>> {
        Ok(Box::new(CdpSurface::launch(options)?))
    }

    fn primary_view(&self) -> Result<Box<dyn Surface>> {
        Err(Error::RenderError(
            "no primary view is attached to the CDP renderer".into(),
        ))
    }
}
