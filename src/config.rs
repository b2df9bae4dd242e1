//! Persisted settings and the printer configuration snapshot
//!
//! The bridge never owns settings storage. A [`SettingsStore`] is injected at
//! construction and read once at the start of every print job, which gives
//! each job an immutable [`PrinterConfig`] snapshot.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

/// Paper stock loaded in the target printer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaperFormat {
    /// ISO A4 sheet (210 x 297 mm)
    #[serde(alias = "standard")]
    A4,
    /// 58 mm continuous receipt roll
    #[serde(alias = "58mm")]
    Thermal58,
    /// 80 mm continuous receipt roll
    #[default]
    #[serde(alias = "80mm")]
    Thermal80,
}

impl PaperFormat {
    /// Receipt rolls are fed continuously and have no fixed page height.
    pub fn is_receipt(self) -> bool {
        matches!(self, PaperFormat::Thermal58 | PaperFormat::Thermal80)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaperFormat::A4 => "a4",
            PaperFormat::Thermal58 => "thermal58",
            PaperFormat::Thermal80 => "thermal80",
        }
    }
}

impl fmt::Display for PaperFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaperFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a4" | "standard" => Ok(PaperFormat::A4),
            "thermal58" | "58mm" | "58" => Ok(PaperFormat::Thermal58),
            "thermal80" | "80mm" | "80" => Ok(PaperFormat::Thermal80),
            other => Err(Error::ConfigError(format!("unknown paper format '{}'", other))),
        }
    }
}

/// Page margins in millimetres
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Margins {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Margins {
    pub const fn zero() -> Self {
        Self {
            top: 0.0,
            right: 0.0,
            bottom: 0.0,
            left: 0.0,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.top == 0.0 && self.right == 0.0 && self.bottom == 0.0 && self.left == 0.0
    }
}

impl FromStr for Margins {
    type Err = Error;

    /// Parses `top,right,bottom,left` (a single value applies to all sides).
    fn from_str(s: &str) -> Result<Self> {
        let values = s
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<f64>()
                    .map_err(|e| Error::ConfigError(format!("invalid margin '{}': {}", part, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        match values.as_slice() {
            [all] => Ok(Margins {
                top: *all,
                right: *all,
                bottom: *all,
                left: *all,
            }),
            [top, right, bottom, left] => Ok(Margins {
                top: *top,
                right: *right,
                bottom: *bottom,
                left: *left,
            }),
            _ => Err(Error::ConfigError(format!(
                "expected 1 or 4 margin values, got {}",
                values.len()
            ))),
        }
    }
}

/// Printer configuration read at the start of every print attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterConfig {
    /// Preferred printer; `None` means the system default device
    pub printer_name: Option<String>,
    /// Paper stock loaded in the printer
    pub paper_format: PaperFormat,
    /// Print without showing the platform print dialog
    pub silent: bool,
    /// Page margins in millimetres (ignored for receipt rolls)
    pub margins: Margins,
    /// Scale as a percentage (100 = actual size)
    pub scale: u32,
    /// Base font size in CSS pixels for composed documents
    pub font_size: u32,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            printer_name: None,
            paper_format: PaperFormat::Thermal80,
            silent: true,
            margins: Margins::zero(),
            scale: 100,
            font_size: 12,
        }
    }
}

impl PrinterConfig {
    /// The configured printer name, treating blank names as unset.
    pub fn configured_printer(&self) -> Option<&str> {
        self.printer_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    fn validate(&self) -> Result<()> {
        if self.scale == 0 || self.scale > 400 {
            return Err(Error::ConfigError(format!(
                "scale must be between 1 and 400 percent, got {}",
                self.scale
            )));
        }
        if self.font_size == 0 {
            return Err(Error::ConfigError("font size must be positive".into()));
        }
        let m = &self.margins;
        if [m.top, m.right, m.bottom, m.left]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return Err(Error::ConfigError("margins must be non-negative".into()));
        }
        Ok(())
    }
}

/// Everything the host application persists between runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Address of the hosted web application
    pub home_url: Option<String>,
    /// Last page the primary view navigated to
    pub last_visited_url: Option<String>,
    /// UI language code ("en", "ar", ...)
    pub language: String,
    #[serde(flatten)]
    pub printer: PrinterConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            home_url: None,
            last_visited_url: None,
            language: "en".to_string(),
            printer: PrinterConfig::default(),
        }
    }
}

impl Settings {
    /// URL the primary view should open with: last visited, then home.
    pub fn start_url(&self) -> Option<&str> {
        self.last_visited_url
            .as_deref()
            .or(self.home_url.as_deref())
            .filter(|url| !url.is_empty())
    }

    /// Origin (scheme + host) of the hosted application, if one is configured.
    pub fn content_origin(&self) -> Option<String> {
        self.home_url.as_deref().and_then(crate::normalize::content_origin)
    }

    /// Whether composed documents should flow right-to-left.
    pub fn is_rtl(&self) -> bool {
        matches!(
            self.language.split(['-', '_']).next().unwrap_or(""),
            "ar" | "he" | "fa" | "ur"
        )
    }

    /// Apply only the fields present in `patch`.
    pub fn apply(&mut self, patch: SettingsPatch) -> Result<()> {
        if let Some(url) = patch.home_url {
            let normalized = normalize_home_url(&url);
            self.last_visited_url = normalized.clone();
            self.home_url = normalized;
        }
        if let Some(url) = patch.last_visited_url {
            self.last_visited_url = Some(url).filter(|u| !u.trim().is_empty());
        }
        if let Some(language) = patch.language {
            self.language = language;
        }
        if let Some(name) = patch.printer_name {
            let name = name.trim();
            self.printer.printer_name = if name.is_empty() {
                None
            } else {
                Some(name.to_string())
            };
        }
        if let Some(format) = patch.paper_format {
            self.printer.paper_format = format;
        }
        if let Some(silent) = patch.silent {
            self.printer.silent = silent;
        }
        if let Some(margins) = patch.margins {
            self.printer.margins = margins;
        }
        if let Some(scale) = patch.scale {
            self.printer.scale = scale;
        }
        if let Some(font_size) = patch.font_size {
            self.printer.font_size = font_size;
        }
        self.printer.validate()
    }
}

/// Partial settings update; absent fields are left unchanged.
///
/// An empty `printer_name` clears the configured printer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsPatch {
    pub home_url: Option<String>,
    /// Applied after `home_url`, so a patch carrying both keeps this value
    pub last_visited_url: Option<String>,
    pub language: Option<String>,
    pub printer_name: Option<String>,
    pub paper_format: Option<PaperFormat>,
    pub silent: Option<bool>,
    pub margins: Option<Margins>,
    pub scale: Option<u32>,
    pub font_size: Option<u32>,
}

/// Trims a user-entered address and defaults the scheme to https.
pub fn normalize_home_url(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Some(trimmed.to_string())
    } else {
        Some(format!("https://{}", trimmed))
    }
}

/// Settings collaborator injected into the bridge
pub trait SettingsStore: Send + Sync {
    /// Read the current settings (defaults when nothing is stored yet).
    fn load(&self) -> Result<Settings>;

    /// Replace the stored settings.
    fn store(&self, settings: &Settings) -> Result<()>;

    /// Apply a partial update and return the resulting settings.
    fn update(&self, patch: SettingsPatch) -> Result<Settings> {
        let mut settings = self.load()?;
        settings.apply(patch)?;
        self.store(&settings)?;
        Ok(settings)
    }
}

/// In-memory store, used by tests and hosts that persist elsewhere
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    settings: Mutex<Settings>,
}

impl MemorySettingsStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Mutex::new(settings),
        }
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Result<Settings> {
        self.settings
            .lock()
            .map(|s| s.clone())
            .map_err(|_| Error::SettingsError("settings lock poisoned".into()))
    }

    fn store(&self, settings: &Settings) -> Result<()> {
        let mut guard = self
            .settings
            .lock()
            .map_err(|_| Error::SettingsError("settings lock poisoned".into()))?;
        *guard = settings.clone();
        Ok(())
    }

    fn update(&self, patch: SettingsPatch) -> Result<Settings> {
        let mut guard = self
            .settings
            .lock()
            .map_err(|_| Error::SettingsError("settings lock poisoned".into()))?;
        let mut next = guard.clone();
        next.apply(patch)?;
        *guard = next.clone();
        Ok(next)
    }
}

/// JSON file store with atomic writes
#[derive(Debug)]
pub struct JsonSettingsStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store at the per-user default location.
    pub fn open_default() -> Result<Self> {
        default_settings_path()
            .map(Self::new)
            .ok_or_else(|| Error::SettingsError("could not determine a settings directory".into()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonSettingsStore {
    fn load(&self) -> Result<Settings> {
        if !self.path.exists() {
            return Ok(Settings::default());
        }
        let contents = fs::read_to_string(&self.path).map_err(|e| {
            Error::SettingsError(format!("failed to read {}: {}", self.path.display(), e))
        })?;
        serde_json::from_str(&contents).map_err(|e| {
            Error::SettingsError(format!("failed to parse {}: {}", self.path.display(), e))
        })
    }

    fn store(&self, settings: &Settings) -> Result<()> {
        let _guard = self.lock()?;
        self.write(settings)
    }

    fn update(&self, patch: SettingsPatch) -> Result<Settings> {
        let _guard = self.lock()?;
        let mut settings = self.load()?;
        settings.apply(patch)?;
        self.write(&settings)?;
        Ok(settings)
    }
}

impl JsonSettingsStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| Error::SettingsError("settings lock poisoned".into()))
    }

    fn write(&self, settings: &Settings) -> Result<()> {
        let payload = serde_json::to_vec_pretty(settings)
            .map_err(|e| Error::SettingsError(format!("failed to serialize settings: {}", e)))?;
        write_atomic(&self.path, &payload)
    }
}

/// Write to a unique temp file beside `path`, then rename it into place.
fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;
    let mut file = tempfile::NamedTempFile::new_in(parent)?;
    file.write_all(data)?;
    file.flush()?;
    file.persist(path).map_err(|e| {
        Error::SettingsError(format!("failed to replace {}: {}", path.display(), e.error))
    })?;
    Ok(())
}

/// Per-user settings file location.
pub fn default_settings_path() -> Option<PathBuf> {
    let base = if cfg!(windows) {
        dirs::data_local_dir()
    } else {
        dirs::config_dir()
    }?;
    Some(base.join("printbridge").join("settings.json"))
}
