//! Pure-Rust text renderer
//!
//! Parses the print document with `scraper` and lays its text out in the
//! character columns of the paper, which is what ESC/POS and other line
//! printers consume. Loading happens on a worker thread so the dispatcher's
//! load timeout applies exactly as it does for a browser-backed surface.

use crate::paper::PageSetup;
use crate::{Error, LoadSignal, PrintArtifact, Result, Surface, SurfaceFactory, SurfaceOptions};
use base64::Engine as _;
use scraper::{ElementRef, Html, Node};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use url::Url;

/// Blank lines appended so the last line clears the tear bar.
const FEED_LINES: usize = 4;

const SKIPPED: [&str; 6] = ["head", "script", "style", "noscript", "template", "title"];

const BLOCKS: [&str; 24] = [
    "address", "article", "aside", "blockquote", "body", "center", "dd", "div", "dl", "dt",
    "footer", "form", "h4", "h5", "h6", "header", "li", "main", "ol", "p", "pre", "section",
    "table", "tr",
];

const HEADINGS: [&str; 3] = ["h1", "h2", "h3"];

/// Line-level structure extracted from a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Text(String),
    Centered(String),
    Rule,
}

/// Text content of a parsed print document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageText {
    pub title: String,
    pub blocks: Vec<Block>,
}

impl PageText {
    pub fn parse(html: &str) -> Self {
        let document = Html::parse_document(html);
        let mut builder = Builder::default();
        walk(document.root_element(), &mut builder);
        builder.flush();

        let title = document
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == "title")
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        PageText {
            title,
            blocks: builder.blocks,
        }
    }

    /// Lay the page out in `columns` characters per line.
    pub fn layout(&self, columns: usize) -> String {
        let columns = columns.max(1);
        let mut out = String::new();
        for block in &self.blocks {
            match block {
                Block::Text(text) => {
                    for line in wrap(text, columns) {
                        out.push_str(&line);
                        out.push('\n');
                    }
                }
                Block::Centered(text) => {
                    for line in wrap(text, columns) {
                        let pad = (columns - line.chars().count()) / 2;
                        out.push_str(&" ".repeat(pad));
                        out.push_str(&line);
                        out.push('\n');
                    }
                }
                Block::Rule => {
                    out.push_str(&"-".repeat(columns));
                    out.push('\n');
                }
            }
        }
        out.push_str(&"\n".repeat(FEED_LINES));
        out
    }
}

#[derive(Default)]
struct Builder {
    blocks: Vec<Block>,
    current: String,
    centered: bool,
}

impl Builder {
    fn push_text(&mut self, text: &str) {
        for word in text.split_whitespace() {
            if !self.current.is_empty() {
                self.current.push(' ');
            }
            self.current.push_str(word);
        }
    }

    fn flush(&mut self) {
        if !self.current.is_empty() {
            let text = std::mem::take(&mut self.current);
            self.blocks.push(if self.centered {
                Block::Centered(text)
            } else {
                Block::Text(text)
            });
        }
    }
}

fn walk(element: ElementRef<'_>, out: &mut Builder) {
    let name = element.value().name();
    if SKIPPED.contains(&name) {
        return;
    }
    match name {
        "br" => {
            out.flush();
            return;
        }
        "hr" => {
            out.flush();
            out.blocks.push(Block::Rule);
            return;
        }
        _ => {}
    }

    let heading = HEADINGS.contains(&name);
    let block = heading || BLOCKS.contains(&name);
    let was_centered = out.centered;
    if block {
        out.flush();
        out.centered = heading || name == "center" || is_centered(element) || was_centered;
    }

    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_text(text),
            Node::Element(_) => {
                if let Some(el) = ElementRef::wrap(child) {
                    walk(el, out);
                }
            }
            _ => {}
        }
    }

    if block {
        out.flush();
        out.centered = was_centered;
    }
}

fn is_centered(element: ElementRef<'_>) -> bool {
    let el = element.value();
    let style = el.attr("style").unwrap_or("").replace(' ', "");
    style.contains("text-align:center")
        || el.attr("align").map_or(false, |a| a.eq_ignore_ascii_case("center"))
        || el.classes().any(|c| c == "center" || c == "text-center")
}

/// Greedy word wrap; words longer than a line are split.
pub fn wrap(text: &str, columns: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut len = 0;

    for word in text.split_whitespace() {
        let mut chars: Vec<char> = word.chars().collect();
        while chars.len() > columns {
            if len > 0 {
                lines.push(std::mem::take(&mut current));
                len = 0;
            }
            let rest = chars.split_off(columns);
            lines.push(chars.into_iter().collect());
            chars = rest;
        }
        if chars.is_empty() {
            continue;
        }
        let needed = if len == 0 { chars.len() } else { len + 1 + chars.len() };
        if needed > columns {
            lines.push(std::mem::take(&mut current));
            len = 0;
        }
        if len > 0 {
            current.push(' ');
            len += 1;
        }
        len += chars.len();
        current.extend(chars);
    }
    if len > 0 {
        lines.push(current);
    }
    lines
}

/// Read the markup behind a `file:` or `data:` URL.
fn read_document(url: &str) -> Result<String> {
    if let Some(rest) = url.strip_prefix("data:") {
        let (meta, payload) = rest
            .split_once(',')
            .ok_or_else(|| Error::RenderError("malformed data URL".into()))?;
        if !meta.ends_with(";base64") {
            return Ok(payload.to_string());
        }
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| Error::RenderError(format!("invalid data URL payload: {}", e)))?;
        return String::from_utf8(bytes)
            .map_err(|e| Error::RenderError(format!("document is not UTF-8: {}", e)));
    }

    let parsed = Url::parse(url).map_err(|e| Error::RenderError(format!("bad URL {}: {}", url, e)))?;
    if parsed.scheme() != "file" {
        return Err(Error::RenderError(format!(
            "headless renderer only loads local documents, got {}",
            parsed.scheme()
        )));
    }
    let path = parsed
        .to_file_path()
        .map_err(|_| Error::RenderError(format!("not a local path: {}", url)))?;
    Ok(std::fs::read_to_string(&path)?)
}

/// Off-screen surface backed by [`PageText`]
///
/// Text output is laid out by character columns at capture time, so the
/// surface itself carries no pixel width.
#[derive(Default)]
pub struct HeadlessSurface {
    page: Arc<Mutex<Option<PageText>>>,
    worker: Option<JoinHandle<()>>,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Surface for HeadlessSurface {
    fn load(&mut self, url: &str, signal: LoadSignal) -> Result<()> {
        let url = url.to_string();
        let page = Arc::clone(&self.page);
        let worker = thread::Builder::new()
            .name("printbridge-headless".into())
            .spawn(move || match read_document(&url).map(|html| PageText::parse(&html)) {
                Ok(parsed) => match page.lock() {
                    Ok(mut slot) => {
                        *slot = Some(parsed);
                        drop(slot);
                        signal.loaded();
                    }
                    Err(_) => signal.failed(Error::RenderError("page lock poisoned".into())),
                },
                Err(e) => signal.failed(e),
            })?;
        self.worker = Some(worker);
        Ok(())
    }

    fn capture(&mut self, setup: &PageSetup) -> Result<PrintArtifact> {
        let guard = self
            .page
            .lock()
            .map_err(|_| Error::RenderError("page lock poisoned".into()))?;
        let page = guard
            .as_ref()
            .ok_or_else(|| Error::RenderError("capture before the document finished loading".into()))?;
        Ok(PrintArtifact::text(page.layout(setup.paper.columns)))
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        if let Some(worker) = self.worker.take() {
            if worker.is_finished() {
                worker
                    .join()
                    .map_err(|_| Error::ResourceCleanupFailure("headless loader panicked".into()))?;
            }
            // an unfinished loader only holds its own copy of the page slot
        }
        Ok(())
    }
}

/// Creates [`HeadlessSurface`]s
#[derive(Debug, Clone, Default)]
pub struct HeadlessSurfaceFactory;

impl HeadlessSurfaceFactory {
    pub fn new() -> Self {
        HeadlessSurfaceFactory
    }
}

impl SurfaceFactory for HeadlessSurfaceFactory {
    fn create(&self, options: &SurfaceOptions) -> Result<Box<dyn Surface>> {
        log::debug!("headless surface {}px wide", options.width_px);
        Ok(Box::new(HeadlessSurface::new()))
    }

    fn primary_view(&self) -> Result<Box<dyn Surface>> {
        Err(Error::RenderError(
            "the headless renderer has no primary view; print the page markup instead".into(),
        ))
    }
}
