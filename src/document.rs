//! Print document composition
//!
//! Extracted markup is wrapped (or patched) with a print stylesheet that pins
//! the page to the configured paper: receipt rolls get their exact width and
//! no margins, A4 gets the configured margins. Text direction follows the UI
//! language.

use crate::config::Settings;
use crate::paper::PaperProfile;

/// Compose `markup` into a document sized for `paper`.
///
/// Fragments are wrapped in a full document. Markup that already is a
/// document gets the print stylesheet injected into its head.
pub fn compose(markup: &str, settings: &Settings, paper: &PaperProfile) -> String {
    let style = print_style(settings, paper);
    if is_full_document(markup) {
        inject_style(markup, &style)
    } else {
        format!(
            "<!DOCTYPE html>\n<html dir=\"{dir}\" lang=\"{lang}\">\n<head>\n<meta charset=\"UTF-8\">\n<style>\n{style}</style>\n</head>\n<body>\n{markup}\n</body>\n</html>\n",
            dir = direction(settings),
            lang = escape_html(&settings.language),
            style = style,
            markup = markup,
        )
    }
}

/// Diagnostic page printed by the test-print operation.
pub fn test_document(settings: &Settings, paper: &PaperProfile, printer: Option<&str>) -> String {
    let printer = escape_html(printer.unwrap_or("Default"));
    let body = format!(
        concat!(
            "<div class=\"test-print\">\n",
            "<h2>Test Print</h2>\n",
            "<h3>طباعة تجريبية</h3>\n",
            "<hr>\n",
            "<p>Printer: {printer}</p>\n",
            "<p>Paper: {format} ({width}mm)</p>\n",
            "<p>Language: {lang} ({dir})</p>\n",
            "<p>Font size: {font}px</p>\n",
            "<hr>\n",
            "<p><strong>Print Test OK</strong></p>\n",
            "</div>"
        ),
        printer = printer,
        format = paper.format,
        width = paper.width_mm,
        lang = escape_html(&settings.language),
        dir = direction(settings),
        font = settings.printer.font_size,
    );
    compose(&body, settings, paper)
}

/// Preview page showing the composed document inside a paper-width frame.
pub fn preview_document(markup: &str, settings: &Settings, paper: &PaperProfile) -> String {
    let composed = compose(markup, settings, paper);
    format!(
        concat!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n",
            "<title>Print preview</title>\n",
            "<style>\n",
            "body {{ margin: 0; background: #e5e5e5; font-family: sans-serif; }}\n",
            "header {{ padding: 8px 16px; background: #333; color: #fff; font-size: 14px; }}\n",
            ".sheet {{ display: block; margin: 16px auto; width: {px}px; height: 80vh; border: 0; background: #fff; box-shadow: 0 0 6px rgba(0,0,0,.3); }}\n",
            "</style>\n</head>\n<body>\n",
            "<header>Print preview: {format} ({width}mm)</header>\n",
            "<iframe class=\"sheet\" srcdoc=\"{doc}\"></iframe>\n",
            "</body>\n</html>\n"
        ),
        px = paper.pixel_width,
        format = paper.format,
        width = paper.width_mm,
        doc = escape_html(&composed),
    )
}

fn direction(settings: &Settings) -> &'static str {
    if settings.is_rtl() {
        "rtl"
    } else {
        "ltr"
    }
}

/// Print stylesheet for the paper and settings.
pub fn print_style(settings: &Settings, paper: &PaperProfile) -> String {
    let page = if paper.format.is_receipt() {
        format!("@page {{ size: {}mm auto; margin: 0; }}\n", paper.width_mm)
    } else {
        let m = paper.effective_margins(settings.printer.margins);
        format!(
            "@page {{ size: A4; margin: {}mm {}mm {}mm {}mm; }}\n",
            m.top, m.right, m.bottom, m.left
        )
    };
    let width = if paper.format.is_receipt() {
        format!("width: {}mm; ", paper.width_mm)
    } else {
        String::new()
    };
    format!(
        "{page}html, body {{ margin: 0; padding: 0; }}\nbody {{ {width}font-size: {font}px; direction: {dir}; -webkit-print-color-adjust: exact; }}\nimg {{ max-width: 100%; }}\n",
        page = page,
        width = width,
        font = settings.printer.font_size,
        dir = direction(settings),
    )
}

fn is_full_document(markup: &str) -> bool {
    let lower = markup.to_ascii_lowercase();
    lower.contains("<html") || lower.contains("<!doctype")
}

fn inject_style(document: &str, style: &str) -> String {
    let block = format!("<style>\n{}</style>\n", style);
    // ASCII lowercasing keeps byte offsets valid for the original string
    let lower = document.to_ascii_lowercase();
    if let Some(at) = lower.find("</head>") {
        let mut out = String::with_capacity(document.len() + block.len());
        out.push_str(&document[..at]);
        out.push_str(&block);
        out.push_str(&document[at..]);
        return out;
    }
    if let Some(open) = lower.find("<html") {
        if let Some(close) = lower[open..].find('>') {
            let at = open + close + 1;
            let mut out = String::with_capacity(document.len() + block.len() + 16);
            out.push_str(&document[..at]);
            out.push_str("<head>");
            out.push_str(&block);
            out.push_str("</head>");
            out.push_str(&document[at..]);
            return out;
        }
    }
    format!("{}{}", block, document)
}

/// Escape text for use in element content and double-quoted attributes.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Margins, PaperFormat};

    fn settings(format: PaperFormat) -> Settings {
        let mut s = Settings::default();
        s.printer.paper_format = format;
        s
    }

    #[test]
    fn fragment_is_wrapped_for_receipt_paper() {
        let s = settings(PaperFormat::Thermal58);
        let paper = PaperProfile::for_format(PaperFormat::Thermal58);
        let doc = compose("<p>Total 10.00</p>", &s, &paper);
        assert!(doc.starts_with("<!DOCTYPE html>"));
        assert!(doc.contains("@page { size: 58mm auto; margin: 0; }"));
        assert!(doc.contains("width: 58mm;"));
        assert!(doc.contains("font-size: 12px"));
        assert!(doc.contains("<p>Total 10.00</p>"));
    }

    #[test]
    fn a4_uses_configured_margins() {
        let mut s = settings(PaperFormat::A4);
        s.printer.margins = Margins {
            top: 10.0,
            right: 5.0,
            bottom: 10.0,
            left: 5.0,
        };
        let paper = PaperProfile::for_format(PaperFormat::A4);
        let doc = compose("<p>Report</p>", &s, &paper);
        assert!(doc.contains("@page { size: A4; margin: 10mm 5mm 10mm 5mm; }"));
        assert!(!doc.contains("width: 210mm"));
    }

    #[test]
    fn arabic_is_right_to_left() {
        let mut s = settings(PaperFormat::Thermal80);
        s.language = "ar".into();
        let paper = PaperProfile::for_format(PaperFormat::Thermal80);
        let doc = compose("<p>فاتورة</p>", &s, &paper);
        assert!(doc.contains("dir=\"rtl\""));
        assert!(doc.contains("direction: rtl"));
    }

    #[test]
    fn full_document_gets_style_in_head() {
        let s = settings(PaperFormat::Thermal80);
        let paper = PaperProfile::for_format(PaperFormat::Thermal80);
        let doc = compose(
            "<html><HEAD><title>R</title></HEAD><body>x</body></html>",
            &s,
            &paper,
        );
        let style_at = doc.find("@page").unwrap();
        let head_close = doc.find("</HEAD>").unwrap();
        assert!(style_at < head_close);
        assert_eq!(doc.matches("<html").count(), 1);
    }

    #[test]
    fn headless_document_gets_a_head() {
        let s = settings(PaperFormat::Thermal80);
        let paper = PaperProfile::for_format(PaperFormat::Thermal80);
        let doc = compose("<html lang=\"en\"><body>x</body></html>", &s, &paper);
        assert!(doc.starts_with("<html lang=\"en\"><head><style>"));
    }

    #[test]
    fn test_page_names_printer_and_paper() {
        let s = settings(PaperFormat::Thermal80);
        let paper = PaperProfile::for_format(PaperFormat::Thermal80);
        let doc = test_document(&s, &paper, Some("Receipt <80>"));
        assert!(doc.contains("Printer: Receipt &lt;80&gt;"));
        assert!(doc.contains("Paper: thermal80 (80mm)"));
        assert!(doc.contains("Print Test OK"));

        let doc = test_document(&s, &paper, None);
        assert!(doc.contains("Printer: Default"));
    }

    #[test]
    fn preview_frames_escaped_document() {
        let s = settings(PaperFormat::Thermal58);
        let paper = PaperProfile::for_format(PaperFormat::Thermal58);
        let page = preview_document("<p class=\"x\">Hi</p>", &s, &paper);
        assert!(page.contains("width: 219px"));
        assert!(page.contains("srcdoc=\"&lt;!DOCTYPE html&gt;"));
        assert!(page.contains("&lt;p class=&quot;x&quot;&gt;Hi&lt;/p&gt;"));
    }
}
