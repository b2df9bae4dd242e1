//! Printer device resolution
//!
//! Installed printers come and go (USB and network printers attach and
//! detach), so the device list is fetched from the spooler every time a job
//! resolves its target and is never cached.

use crate::spooler::Spooler;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// An installed printer as reported by the spooler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    pub is_default: bool,
}

impl Device {
    pub fn new(name: impl Into<String>, is_default: bool) -> Self {
        Self {
            name: name.into(),
            is_default,
        }
    }
}

/// Outcome of resolving a configured printer against the installed devices
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The configured printer is installed
    Configured(Device),
    /// No usable configured printer; the system default device was chosen
    SystemDefault(Device),
    /// No devices are installed
    NoDevice,
}

impl Resolution {
    pub fn device(&self) -> Option<&Device> {
        match self {
            Resolution::Configured(d) | Resolution::SystemDefault(d) => Some(d),
            Resolution::NoDevice => None,
        }
    }

    pub fn device_name(&self) -> Option<&str> {
        self.device().map(|d| d.name.as_str())
    }
}

/// Pick the configured device when installed, else the system default.
///
/// When the spooler reports devices but none is flagged as default, the first
/// device stands in for the default.
pub fn resolve_device(configured: Option<&str>, devices: &[Device]) -> Resolution {
    if let Some(name) = configured {
        if let Some(device) = devices.iter().find(|d| d.name == name) {
            return Resolution::Configured(device.clone());
        }
    }
    match system_default(devices) {
        Some(device) => Resolution::SystemDefault(device.clone()),
        None => Resolution::NoDevice,
    }
}

/// The device flagged as default, falling back to the first installed one.
pub fn system_default(devices: &[Device]) -> Option<&Device> {
    devices
        .iter()
        .find(|d| d.is_default)
        .or_else(|| devices.first())
}

/// Resolves printers against a live spooler
#[derive(Clone)]
pub struct PrinterResolver {
    spooler: Arc<dyn Spooler>,
}

impl PrinterResolver {
    pub fn new(spooler: Arc<dyn Spooler>) -> Self {
        Self { spooler }
    }

    /// Fresh snapshot of the installed devices.
    pub fn devices(&self) -> Result<Vec<Device>> {
        self.spooler.devices()
    }

    pub fn resolve(&self, configured: Option<&str>) -> Result<Resolution> {
        let devices = self.spooler.devices()?;
        let resolution = resolve_device(configured, &devices);
        log::debug!(
            "resolved printer {:?} -> {:?} ({} installed)",
            configured,
            resolution.device_name(),
            devices.len()
        );
        Ok(resolution)
    }

    /// Current system default device, looked up fresh.
    pub fn default_device(&self) -> Result<Option<Device>> {
        let devices = self.spooler.devices()?;
        Ok(system_default(&devices).cloned())
    }
}
