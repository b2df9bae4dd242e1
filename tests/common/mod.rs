#![allow(dead_code)]

use printbridge::config::MemorySettingsStore;
use printbridge::spooler::Spooler;
use printbridge::{
    BridgeOptions, BridgeParts, Device, DialogRequest, Error, HostUi, JobId, LoadSignal,
    PageSetup, PrintArtifact, PrintBridge, Result, Settings, Surface, SurfaceFactory,
    SurfaceOptions,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Spooler with a scripted device list and per-device failures
#[derive(Default)]
pub struct FakeSpooler {
    devices: Mutex<Vec<Device>>,
    failing: Mutex<HashSet<String>>,
    /// (device, artifact) for every submit call, successful or not
    pub attempts: Mutex<Vec<(String, PrintArtifact)>>,
}

impl FakeSpooler {
    pub fn new(devices: Vec<Device>) -> Self {
        Self {
            devices: Mutex::new(devices),
            ..Default::default()
        }
    }

    pub fn fail_on(&self, device: &str) {
        self.failing.lock().unwrap().insert(device.to_string());
    }

    pub fn attempted_devices(&self) -> Vec<String> {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .map(|(d, _)| d.clone())
            .collect()
    }

    pub fn printed_text(&self, index: usize) -> String {
        let attempts = self.attempts.lock().unwrap();
        String::from_utf8(attempts[index].1.data.clone()).unwrap()
    }
}

impl Spooler for FakeSpooler {
    fn devices(&self) -> Result<Vec<Device>> {
        Ok(self.devices.lock().unwrap().clone())
    }

    fn submit(&self, device: &str, artifact: &PrintArtifact, _setup: &PageSetup) -> Result<()> {
        self.attempts
            .lock()
            .unwrap()
            .push((device.to_string(), artifact.clone()));
        if self.failing.lock().unwrap().contains(device) {
            return Err(Error::DispatchError(format!("{} is offline", device)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum LoadBehavior {
    Immediate,
    /// Completes after the delay on the tokio clock
    Delayed(Duration),
    /// Holds the signal and never reports
    Never,
}

/// Surface factory that counts live surfaces
pub struct FakeSurfaces {
    behavior: Mutex<LoadBehavior>,
    pub live: Arc<AtomicUsize>,
    pub widths: Mutex<Vec<u32>>,
    pub urls: Arc<Mutex<Vec<String>>>,
}

impl FakeSurfaces {
    pub fn new(behavior: LoadBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            live: Arc::new(AtomicUsize::new(0)),
            widths: Mutex::new(Vec::new()),
            urls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn live_surfaces(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn widths(&self) -> Vec<u32> {
        self.widths.lock().unwrap().clone()
    }

    pub fn loaded_urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

impl SurfaceFactory for FakeSurfaces {
    fn create(&self, options: &SurfaceOptions) -> Result<Box<dyn Surface>> {
        self.widths.lock().unwrap().push(options.width_px);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSurface {
            behavior: *self.behavior.lock().unwrap(),
            live: Arc::clone(&self.live),
            urls: Arc::clone(&self.urls),
            content: None,
            pending: None,
        }))
    }

    fn primary_view(&self) -> Result<Box<dyn Surface>> {
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSurface {
            behavior: LoadBehavior::Immediate,
            live: Arc::clone(&self.live),
            urls: Arc::clone(&self.urls),
            content: Some("primary view".to_string()),
            pending: None,
        }))
    }
}

pub struct FakeSurface {
    behavior: LoadBehavior,
    live: Arc<AtomicUsize>,
    urls: Arc<Mutex<Vec<String>>>,
    content: Option<String>,
    pending: Option<LoadSignal>,
}

impl Surface for FakeSurface {
    fn load(&mut self, url: &str, signal: LoadSignal) -> Result<()> {
        self.urls.lock().unwrap().push(url.to_string());
        let path = url::Url::parse(url)
            .ok()
            .and_then(|u| u.to_file_path().ok())
            .ok_or_else(|| Error::RenderError(format!("not a file URL: {}", url)))?;
        self.content = Some(std::fs::read_to_string(path)?);
        match self.behavior {
            LoadBehavior::Immediate => signal.loaded(),
            LoadBehavior::Delayed(delay) => {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    signal.loaded();
                });
            }
            LoadBehavior::Never => self.pending = Some(signal),
        }
        Ok(())
    }

    fn capture(&mut self, _setup: &PageSetup) -> Result<PrintArtifact> {
        let content = self
            .content
            .clone()
            .ok_or_else(|| Error::RenderError("nothing loaded".into()))?;
        Ok(PrintArtifact::text(content))
    }

    fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

impl Drop for FakeSurface {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Host UI that records dialogs and notifications
#[derive(Default)]
pub struct RecordingUi {
    pub dialogs: Mutex<Vec<DialogRequest>>,
    pub notes: Mutex<Vec<String>>,
}

impl RecordingUi {
    pub fn dialog_count(&self) -> usize {
        self.dialogs.lock().unwrap().len()
    }

    pub fn notes(&self) -> Vec<String> {
        self.notes.lock().unwrap().clone()
    }
}

impl HostUi for RecordingUi {
    fn present_dialog(&self, request: &DialogRequest) -> Result<()> {
        self.dialogs.lock().unwrap().push(request.clone());
        Ok(())
    }

    fn notify(&self, message: &str) {
        self.notes.lock().unwrap().push(message.to_string());
    }
}

pub struct Harness {
    pub bridge: PrintBridge,
    pub spooler: Arc<FakeSpooler>,
    pub surfaces: Arc<FakeSurfaces>,
    pub ui: Arc<RecordingUi>,
    pub events: Arc<Mutex<Vec<(JobId, &'static str)>>>,
    pub temp_dir: tempfile::TempDir,
}

impl Harness {
    pub fn new(settings: Settings, devices: Vec<Device>, behavior: LoadBehavior) -> Self {
        Self::with_options(settings, devices, behavior, |_| {})
    }

    pub fn with_options(
        settings: Settings,
        devices: Vec<Device>,
        behavior: LoadBehavior,
        configure: impl FnOnce(&mut BridgeOptions),
    ) -> Self {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut options = BridgeOptions {
            settle_delay_ms: 0,
            temp_dir: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        };
        configure(&mut options);

        let spooler = Arc::new(FakeSpooler::new(devices));
        let surfaces = Arc::new(FakeSurfaces::new(behavior));
        let ui = Arc::new(RecordingUi::default());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);

        let bridge = PrintBridge::new(BridgeParts {
            settings: Arc::new(MemorySettingsStore::new(settings)),
            spooler: spooler.clone(),
            surfaces: surfaces.clone(),
            ui: ui.clone(),
            options,
            observer: Some(Arc::new(move |id, state| {
                sink.lock().unwrap().push((id, state.label()));
            })),
        });

        Self {
            bridge,
            spooler,
            surfaces,
            ui,
            events,
            temp_dir,
        }
    }

    pub fn states_of(&self, id: JobId) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(job, _)| *job == id)
            .map(|(_, label)| *label)
            .collect()
    }

    /// Files left behind in the document directory.
    pub fn leftover_documents(&self) -> usize {
        std::fs::read_dir(self.temp_dir.path()).unwrap().count()
    }
}

pub fn devices(list: &[(&str, bool)]) -> Vec<Device> {
    list.iter()
        .map(|(name, is_default)| Device::new(*name, *is_default))
        .collect()
}

pub fn settings_with_printer(name: Option<&str>) -> Settings {
    let mut settings = Settings::default();
    settings.printer.printer_name = name.map(str::to_string);
    settings
}
