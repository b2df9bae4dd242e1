//! CUPS backend driven through the `lp` and `lpstat` command line tools

use super::Spooler;
use crate::paper::{mm_to_points, PageSetup};
use crate::printers::Device;
use crate::{ArtifactKind, Error, PrintArtifact, Result};
use std::io::{ErrorKind, Write};
use std::process::{Command, Stdio};

/// Spooler that shells out to the CUPS client tools
#[derive(Debug, Clone)]
pub struct CupsSpooler {
    lp: String,
    lpstat: String,
}

impl Default for CupsSpooler {
    fn default() -> Self {
        Self {
            lp: "lp".to_string(),
            lpstat: "lpstat".to_string(),
        }
    }
}

impl CupsSpooler {
    /// Use custom tool paths (e.g. a bundled CUPS client).
    pub fn with_tools(lp: impl Into<String>, lpstat: impl Into<String>) -> Self {
        Self {
            lp: lp.into(),
            lpstat: lpstat.into(),
        }
    }

    /// Run `lpstat`; `None` when the tool is not installed.
    fn lpstat(&self, args: &[&str]) -> Result<Option<String>> {
        match Command::new(&self.lpstat).args(args).output() {
            Ok(out) => {
                if !out.status.success() {
                    // lpstat exits non-zero when no destinations exist
                    log::debug!(
                        "lpstat {:?} exited with {}: {}",
                        args,
                        out.status,
                        String::from_utf8_lossy(&out.stderr).trim()
                    );
                }
                Ok(Some(String::from_utf8_lossy(&out.stdout).into_owned()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Other(format!("failed to run lpstat: {}", e))),
        }
    }
}

impl Spooler for CupsSpooler {
    fn devices(&self) -> Result<Vec<Device>> {
        let Some(destinations) = self.lpstat(&["-e"])? else {
            log::warn!("lpstat not found; reporting no printers");
            return Ok(Vec::new());
        };
        let default = self.lpstat(&["-d"])?.and_then(|out| parse_default(&out));
        Ok(parse_destinations(&destinations)
            .into_iter()
            .map(|name| {
                let is_default = default.as_deref() == Some(name.as_str());
                Device { name, is_default }
            })
            .collect())
    }

    fn submit(&self, device: &str, artifact: &PrintArtifact, setup: &PageSetup) -> Result<()> {
        let args = lp_args(device, artifact.kind, setup);
        log::debug!("{} {}", self.lp, args.join(" "));

        let mut child = Command::new(&self.lp)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::DispatchError(format!("failed to start lp: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(&artifact.data) {
                // lp may have exited early; its stderr explains why
                log::warn!("writing job data to lp failed: {}", e);
            }
        }

        let out = child
            .wait_with_output()
            .map_err(|e| Error::DispatchError(format!("lp did not finish: {}", e)))?;
        let stdout = String::from_utf8_lossy(&out.stdout);
        let stderr = String::from_utf8_lossy(&out.stderr);

        if out.status.success() {
            match parse_request_id(&stdout) {
                Some(id) => log::info!("spooled {} as {}", setup.title, id),
                None => log::info!("spooled {} to {}", setup.title, device),
            }
            Ok(())
        } else {
            Err(classify_lp_failure(device, stderr.trim()))
        }
    }
}

/// Options passed to `lp` for one job.
pub fn lp_args(device: &str, kind: ArtifactKind, setup: &PageSetup) -> Vec<String> {
    let mut args = vec![
        "-d".to_string(),
        device.to_string(),
        "-t".to_string(),
        setup.title.clone(),
        "-o".to_string(),
        format!(
            "media=Custom.{}x{}mm",
            setup.paper.width_mm,
            setup.paper.page_height_mm()
        ),
    ];

    let m = setup.margins;
    for (side, mm) in [("top", m.top), ("right", m.right), ("bottom", m.bottom), ("left", m.left)] {
        args.push("-o".to_string());
        args.push(format!("page-{}={}", side, mm_to_points(mm).round() as i64));
    }

    if (setup.scale - 1.0).abs() > f64::EPSILON {
        args.push("-o".to_string());
        args.push(format!("scaling={}", (setup.scale * 100.0).round() as i64));
    }

    match kind {
        ArtifactKind::Raw => {
            args.push("-o".to_string());
            args.push("raw".to_string());
        }
        ArtifactKind::Pdf | ArtifactKind::Text => {
            args.push("-o".to_string());
            args.push(format!("document-format={}", kind.mime_type()));
        }
    }
    args
}

/// Destination names from `lpstat -e` output.
pub fn parse_destinations(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.split_whitespace().next().unwrap_or(line).to_string())
        .collect()
}

/// Default destination from `lpstat -d` output.
pub fn parse_default(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        line.trim()
            .strip_prefix("system default destination:")
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
    })
}

/// Job id from `lp` output ("request id is Receipt-80-12 (1 file(s))").
pub fn parse_request_id(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        line.trim()
            .strip_prefix("request id is ")
            .and_then(|rest| rest.split_whitespace().next())
            .map(str::to_string)
    })
}

fn classify_lp_failure(device: &str, stderr: &str) -> Error {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("does not exist")
        || lower.contains("unknown destination")
        || lower.contains("not accepting jobs")
    {
        Error::PrinterUnavailable(format!("{}: {}", device, stderr))
    } else if stderr.is_empty() {
        Error::DispatchError(format!("lp failed for {}", device))
    } else {
        Error::DispatchError(stderr.to_string())
    }
}
