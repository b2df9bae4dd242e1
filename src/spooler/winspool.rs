//! Win32 spooler backend (raw data type)

use super::Spooler;
use crate::paper::PageSetup;
use crate::printers::Device;
use crate::{ArtifactKind, Error, PrintArtifact, Result};
use std::ffi::OsStr;
use std::iter::once;
use std::os::windows::ffi::OsStrExt;
use std::ptr::null_mut;
use winapi::shared::minwindef::{DWORD, LPBYTE};
use winapi::um::winnt::HANDLE;
use winapi::um::winspool::{
    ClosePrinter, EndDocPrinter, EndPagePrinter, EnumPrintersW, GetDefaultPrinterW,
    OpenPrinterW, StartDocPrinterW, StartPagePrinter, WritePrinter, DOC_INFO_1W,
    PRINTER_ENUM_CONNECTIONS, PRINTER_ENUM_LOCAL, PRINTER_INFO_4W,
};

/// Spooler that writes raw job data through the Win32 print spooler
#[derive(Debug, Clone, Default)]
pub struct WinSpooler;

impl WinSpooler {
    pub fn new() -> Self {
        WinSpooler
    }
}

fn wide(s: &str) -> Vec<u16> {
    OsStr::new(s).encode_wide().chain(once(0)).collect()
}

unsafe fn from_wide_ptr(ptr: *const u16) -> String {
    if ptr.is_null() {
        return String::new();
    }
    let mut len = 0usize;
    while *ptr.add(len) != 0 {
        len += 1;
    }
    String::from_utf16_lossy(std::slice::from_raw_parts(ptr, len))
}

fn installed_printers() -> Result<Vec<String>> {
    let flags = PRINTER_ENUM_LOCAL | PRINTER_ENUM_CONNECTIONS;
    let mut needed: DWORD = 0;
    let mut returned: DWORD = 0;

    unsafe {
        // First call only reports the buffer size
        EnumPrintersW(flags, null_mut(), 4, null_mut(), 0, &mut needed, &mut returned);
    }
    if needed == 0 {
        return Ok(Vec::new());
    }

    // u64 storage keeps the PRINTER_INFO_4W records pointer-aligned
    let mut buf = vec![0u64; (needed as usize + 7) / 8];
    let ok = unsafe {
        EnumPrintersW(
            flags,
            null_mut(),
            4,
            buf.as_mut_ptr() as LPBYTE,
            needed,
            &mut needed,
            &mut returned,
        )
    };
    if ok == 0 {
        return Err(Error::Other("EnumPrintersW failed".into()));
    }

    let infos = buf.as_ptr() as *const PRINTER_INFO_4W;
    Ok((0..returned as usize)
        .map(|i| unsafe { from_wide_ptr((*infos.add(i)).pPrinterName) })
        .collect())
}

fn default_printer() -> Option<String> {
    let mut size: DWORD = 0;
    unsafe {
        GetDefaultPrinterW(null_mut(), &mut size);
    }
    if size == 0 {
        return None;
    }
    let mut buf = vec![0u16; size as usize];
    let ok = unsafe { GetDefaultPrinterW(buf.as_mut_ptr(), &mut size) };
    if ok == 0 {
        return None;
    }
    Some(unsafe { from_wide_ptr(buf.as_ptr()) })
}

fn send_raw(printer_name: &str, doc_name: &str, data: &[u8]) -> Result<()> {
    let mut wide_name = wide(printer_name);
    let mut wide_doc = wide(doc_name);
    let mut wide_raw = wide("RAW");

    unsafe {
        let mut handle: HANDLE = null_mut();
        if OpenPrinterW(wide_name.as_mut_ptr(), &mut handle, null_mut()) == 0 {
            return Err(Error::PrinterUnavailable(format!(
                "OpenPrinterW failed for {}",
                printer_name
            )));
        }

        let mut doc_info = DOC_INFO_1W {
            pDocName: wide_doc.as_mut_ptr(),
            pOutputFile: null_mut(),
            pDatatype: wide_raw.as_mut_ptr(),
        };

        if StartDocPrinterW(handle, 1, &mut doc_info as *mut DOC_INFO_1W as LPBYTE) == 0 {
            ClosePrinter(handle);
            return Err(Error::DispatchError("StartDocPrinterW failed".into()));
        }

        if StartPagePrinter(handle) == 0 {
            EndDocPrinter(handle);
            ClosePrinter(handle);
            return Err(Error::DispatchError("StartPagePrinter failed".into()));
        }

        let mut written: DWORD = 0;
        let ok = WritePrinter(
            handle,
            data.as_ptr() as *mut _,
            data.len() as DWORD,
            &mut written,
        );

        EndPagePrinter(handle);
        EndDocPrinter(handle);
        ClosePrinter(handle);

        if ok == 0 {
            return Err(Error::DispatchError("WritePrinter failed".into()));
        }
        if (written as usize) < data.len() {
            return Err(Error::DispatchError(format!(
                "WritePrinter wrote {} of {} bytes",
                written,
                data.len()
            )));
        }
    }
    Ok(())
}

impl Spooler for WinSpooler {
    fn devices(&self) -> Result<Vec<Device>> {
        let default = default_printer();
        Ok(installed_printers()?
            .into_iter()
            .map(|name| {
                let is_default = default.as_deref() == Some(name.as_str());
                Device { name, is_default }
            })
            .collect())
    }

    fn submit(&self, device: &str, artifact: &PrintArtifact, setup: &PageSetup) -> Result<()> {
        match artifact.kind {
            ArtifactKind::Text | ArtifactKind::Raw => send_raw(device, &setup.title, &artifact.data),
            ArtifactKind::Pdf => Err(Error::DispatchError(
                "PDF output needs a driver-level print path; the raw spooler accepts text or device data only".into(),
            )),
        }
    }
}
