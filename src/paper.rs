//! Physical paper dimensions for the supported formats

use crate::config::{Margins, PaperFormat, PrinterConfig};

/// Reference resolution used to size off-screen surfaces (CSS pixels).
pub const REFERENCE_DPI: f64 = 96.0;

const MM_PER_INCH: f64 = 25.4;

/// Placeholder page height sent to print APIs for continuous-feed rolls.
pub const CONTINUOUS_FEED_HEIGHT_MM: f64 = 200.0;

/// Physical dimensions and page-size parameters of a paper format
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaperProfile {
    pub format: PaperFormat,
    /// Paper width in millimetres
    pub width_mm: f64,
    /// Page height in millimetres; `None` for continuous-feed rolls
    pub height_mm: Option<f64>,
    /// Surface width in pixels at [`REFERENCE_DPI`]
    pub pixel_width: u32,
    /// Characters per line for text output
    pub columns: usize,
}

impl PaperProfile {
    pub fn for_format(format: PaperFormat) -> Self {
        match format {
            PaperFormat::Thermal58 => Self {
                format,
                width_mm: 58.0,
                height_mm: None,
                pixel_width: 219,
                columns: 32,
            },
            PaperFormat::Thermal80 => Self {
                format,
                width_mm: 80.0,
                height_mm: None,
                pixel_width: 302,
                columns: 48,
            },
            PaperFormat::A4 => Self {
                format,
                width_mm: 210.0,
                height_mm: Some(297.0),
                pixel_width: 794,
                columns: 80,
            },
        }
    }

    /// Height to hand to print APIs that require one.
    pub fn page_height_mm(&self) -> f64 {
        self.height_mm.unwrap_or(CONTINUOUS_FEED_HEIGHT_MM)
    }

    /// Page size in microns (width, height).
    pub fn size_microns(&self) -> (u32, u32) {
        (mm_to_microns(self.width_mm), mm_to_microns(self.page_height_mm()))
    }

    /// Page size in inches (width, height).
    pub fn size_inches(&self) -> (f64, f64) {
        (self.width_mm / MM_PER_INCH, self.page_height_mm() / MM_PER_INCH)
    }

    /// Page size in hundredths of an inch (width, height), rounded.
    pub fn size_hundredths_inch(&self) -> (u32, u32) {
        let (w, h) = self.size_inches();
        ((w * 100.0).round() as u32, (h * 100.0).round() as u32)
    }

    /// Margins that apply to this format; receipt rolls never get margins.
    pub fn effective_margins(&self, configured: Margins) -> Margins {
        if self.format.is_receipt() {
            Margins::zero()
        } else {
            configured
        }
    }
}

fn mm_to_microns(mm: f64) -> u32 {
    (mm * 1000.0).round() as u32
}

/// Millimetres to PostScript points.
pub fn mm_to_points(mm: f64) -> f64 {
    mm / MM_PER_INCH * 72.0
}

/// Paper, margin and scale parameters applied to a single dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct PageSetup {
    pub paper: PaperProfile,
    /// Margins in millimetres after the receipt-roll rule was applied
    pub margins: Margins,
    /// Scale as a fraction of 100%
    pub scale: f64,
    pub font_size: u32,
    /// Human readable job title shown in printer queues
    pub title: String,
}

impl PageSetup {
    pub fn from_config(config: &PrinterConfig, title: impl Into<String>) -> Self {
        let paper = PaperProfile::for_format(config.paper_format);
        Self {
            margins: paper.effective_margins(config.margins),
            scale: f64::from(config.scale) / 100.0,
            font_size: config.font_size,
            paper,
            title: title.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_match_paper_table() {
        assert_eq!(PaperProfile::for_format(PaperFormat::Thermal58).width_mm, 58.0);
        assert_eq!(PaperProfile::for_format(PaperFormat::Thermal80).width_mm, 80.0);
        assert_eq!(PaperProfile::for_format(PaperFormat::A4).width_mm, 210.0);
    }

    #[test]
    fn only_a4_has_fixed_height() {
        assert_eq!(PaperProfile::for_format(PaperFormat::A4).height_mm, Some(297.0));
        assert_eq!(PaperProfile::for_format(PaperFormat::Thermal58).height_mm, None);
        assert_eq!(PaperProfile::for_format(PaperFormat::Thermal80).height_mm, None);
    }

    #[test]
    fn micron_sizes_for_print_api() {
        assert_eq!(
            PaperProfile::for_format(PaperFormat::Thermal80).size_microns(),
            (80_000, 200_000)
        );
        assert_eq!(
            PaperProfile::for_format(PaperFormat::Thermal58).size_microns(),
            (58_000, 200_000)
        );
        assert_eq!(
            PaperProfile::for_format(PaperFormat::A4).size_microns(),
            (210_000, 297_000)
        );
    }

    #[test]
    fn a4_in_hundredths_of_an_inch() {
        assert_eq!(
            PaperProfile::for_format(PaperFormat::A4).size_hundredths_inch(),
            (827, 1169)
        );
    }

    #[test]
    fn receipt_formats_drop_margins() {
        let config = PrinterConfig {
            paper_format: PaperFormat::Thermal58,
            margins: Margins {
                top: 5.0,
                right: 5.0,
                bottom: 5.0,
                left: 5.0,
            },
            scale: 80,
            ..Default::default()
        };
        let setup = PageSetup::from_config(&config, "receipt");
        assert!(setup.margins.is_zero());
        assert!((setup.scale - 0.8).abs() < f64::EPSILON);

        let a4 = PageSetup::from_config(
            &PrinterConfig {
                paper_format: PaperFormat::A4,
                ..config
            },
            "report",
        );
        assert_eq!(a4.margins.top, 5.0);
    }
}
