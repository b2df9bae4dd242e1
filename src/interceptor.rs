//! In-page print interception
//!
//! [`script`] produces the JavaScript a host injects into every document of
//! the embedded view (including frames). It replaces `window.print` with a
//! function that captures the document markup and posts a print intent to
//! the native side instead of opening the engine's dialog. The native side
//! turns the posted message into a [`PrintRequest`] with
//! [`PrintRequest::from_message`].

use crate::job::PrintSource;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Channel the script uses to reach the native side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageTransport {
    /// `window.ipc.postMessage` (wry / tao based hosts)
    Ipc,
    /// `window.chrome.webview.postMessage` (WebView2)
    WebView2,
    /// `window.webkit.messageHandlers[handler].postMessage` (WKWebView, WebKitGTK)
    WebKit { handler: String },
    /// A global function, e.g. a CDP runtime binding
    Binding(String),
}

impl Default for MessageTransport {
    fn default() -> Self {
        MessageTransport::Ipc
    }
}

impl std::str::FromStr for MessageTransport {
    type Err = Error;

    /// `ipc`, `webview2`, `webkit[:handler]` or `binding:<name>`.
    fn from_str(s: &str) -> Result<Self> {
        let (kind, arg) = match s.split_once(':') {
            Some((kind, arg)) => (kind, Some(arg)),
            None => (s, None),
        };
        match (kind.to_ascii_lowercase().as_str(), arg) {
            ("ipc", None) => Ok(MessageTransport::Ipc),
            ("webview2", None) => Ok(MessageTransport::WebView2),
            ("webkit", handler) => Ok(MessageTransport::WebKit {
                handler: handler.unwrap_or("printbridge").to_string(),
            }),
            ("binding", Some(name)) if !name.is_empty() => {
                Ok(MessageTransport::Binding(name.to_string()))
            }
            _ => Err(Error::ConfigError(format!("unknown transport '{}'", s))),
        }
    }
}

/// Options for the generated interception script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptorOptions {
    pub transport: MessageTransport,
    /// Also provide `flutter_inappwebview.callHandler('printHandler', html)`
    /// for pages written against the older embedding API
    pub legacy_handler: bool,
}

impl Default for InterceptorOptions {
    fn default() -> Self {
        Self {
            transport: MessageTransport::default(),
            legacy_handler: true,
        }
    }
}

const SCRIPT_TEMPLATE: &str = r#"(function () {
  'use strict';
  var MARK = '__printbridgeHooked';
  var FRAME_MARK = '__printbridgeFrame';

  function lookup(w) {
    __LOOKUP__
  }

  function post(data) {
    var w = window;
    for (var depth = 0; w && depth < 16; depth++) {
      var sink = null;
      try { sink = lookup(w); } catch (e) { sink = null; }
      if (sink) { sink(data); return true; }
      var parent = null;
      try { parent = w.parent; } catch (e) { parent = null; }
      if (!parent || parent === w) { break; }
      w = parent;
    }
    return false;
  }

  function capture(w) {
    try {
      var doc = w.document;
      for (var depth = 0; depth < 16; depth++) {
        var active = doc.activeElement;
        if (!active || active.tagName !== 'IFRAME') { break; }
        doc = active.contentWindow.document;
        if (!doc) { return null; }
      }
      var root = doc.documentElement;
      return root ? root.outerHTML : null;
    } catch (e) {
      return null;
    }
  }

  function forward(w, html, original) {
    var data = JSON.stringify({ type: 'print', html: html });
    var sent = false;
    try { sent = post(data); } catch (e) { sent = false; }
    if (sent) { return; }
    if (typeof original === 'function') {
      original.call(w);
    } else if (w.console && typeof w.console.warn === 'function') {
      w.console.warn('printbridge: no native channel for print request');
    }
  }

  function attachFrame(frame) {
    try { hook(frame.contentWindow); } catch (e) {}
    try {
      if (frame[FRAME_MARK]) { return; }
      Object.defineProperty(frame, FRAME_MARK, { value: true, enumerable: false });
    } catch (e) {
      return;
    }
    if (typeof frame.addEventListener === 'function') {
      frame.addEventListener('load', function () {
        try { hook(frame.contentWindow); } catch (e) {}
      });
    }
  }

  function scan(node) {
    if (!node) { return; }
    if (node.tagName === 'IFRAME') { attachFrame(node); return; }
    if (typeof node.querySelectorAll === 'function') {
      var frames = node.querySelectorAll('iframe');
      for (var i = 0; i < frames.length; i++) { attachFrame(frames[i]); }
    }
  }

  function watchFrames(w) {
    var doc = w.document;
    if (!doc) { return; }
    scan(doc);
    if (typeof w.MutationObserver === 'function') {
      var observer = new w.MutationObserver(function (mutations) {
        for (var i = 0; i < mutations.length; i++) {
          var added = mutations[i].addedNodes || [];
          for (var j = 0; j < added.length; j++) { scan(added[j]); }
        }
      });
      observer.observe(doc.documentElement || doc, { childList: true, subtree: true });
    }
  }

  function installLegacy(w) {
    var existing = w.flutter_inappwebview;
    if (existing && typeof existing.callHandler === 'function') { return; }
    w.flutter_inappwebview = {
      callHandler: function (name, html) {
        if (name === 'printHandler') {
          var text = html === undefined || html === null ? '' : String(html);
          forward(w, text.trim().length > 0 ? text : null, null);
        }
        return typeof Promise === 'function' ? Promise.resolve(null) : null;
      }
    };
  }

  function hook(w) {
    if (!w) { return; }
    try {
      if (w[MARK]) { return; }
      Object.defineProperty(w, MARK, { value: true, enumerable: false });
    } catch (e) {
      return;
    }
    var original = w.print;
    w.print = function () { forward(w, capture(w), original); };
    if (__LEGACY__) {
      try { installLegacy(w); } catch (e) {}
    }
    try { watchFrames(w); } catch (e) {}
  }

  hook(window);
})();
"#;

/// JavaScript that intercepts `window.print` in the current document and
/// every same-origin frame.
///
/// Safe to inject more than once; the hook is installed once per window.
pub fn script(options: &InterceptorOptions) -> String {
    SCRIPT_TEMPLATE
        .replace("__LOOKUP__", &lookup_body(&options.transport))
        .replace(
            "__LEGACY__",
            if options.legacy_handler { "true" } else { "false" },
        )
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

fn lookup_body(transport: &MessageTransport) -> String {
    match transport {
        MessageTransport::Ipc => "var c = w.ipc;\n    return c && typeof c.postMessage === 'function' ? function (d) { c.postMessage(d); } : null;".to_string(),
        MessageTransport::WebView2 => "var c = w.chrome && w.chrome.webview;\n    return c && typeof c.postMessage === 'function' ? function (d) { c.postMessage(d); } : null;".to_string(),
        MessageTransport::WebKit { handler } => format!(
            "var h = w.webkit && w.webkit.messageHandlers && w.webkit.messageHandlers[{}];\n    return h && typeof h.postMessage === 'function' ? function (d) {{ h.postMessage(d); }} : null;",
            js_string(handler)
        ),
        MessageTransport::Binding(name) => format!(
            "var f = w[{}];\n    return typeof f === 'function' ? function (d) {{ f(d); }} : null;",
            js_string(name)
        ),
    }
}

/// Message posted by the interception script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum IntentMessage {
    Print {
        #[serde(default)]
        html: Option<String>,
    },
}

/// A print intent received from the embedded content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintRequest {
    /// Extracted markup; `None` prints the current view
    pub html: Option<String>,
}

impl PrintRequest {
    pub fn from_html(html: Option<String>) -> Self {
        let html = html.filter(|h| !h.trim().is_empty());
        Self { html }
    }

    /// Parse a message posted by the interception script.
    ///
    /// Some hosts hand over the posted value JSON-encoded a second time, so a
    /// message that decodes to a JSON string is decoded again.
    pub fn from_message(raw: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| Error::MessageError(format!("not JSON: {}", e)))?;
        let value = match value {
            serde_json::Value::String(inner) => serde_json::from_str(&inner)
                .map_err(|e| Error::MessageError(format!("not JSON: {}", e)))?,
            other => other,
        };
        let message: IntentMessage = serde_json::from_value(value)
            .map_err(|e| Error::MessageError(format!("not a print intent: {}", e)))?;
        match message {
            IntentMessage::Print { html } => Ok(Self::from_html(html)),
        }
    }

    pub fn into_source(self) -> PrintSource {
        PrintSource::from_html(self.html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_print_with_markup() {
        let req = PrintRequest::from_message(r#"{"type":"print","html":"<p>Hi</p>"}"#).unwrap();
        assert_eq!(req.html.as_deref(), Some("<p>Hi</p>"));
        assert_eq!(req.into_source(), PrintSource::Markup("<p>Hi</p>".into()));
    }

    #[test]
    fn null_missing_or_blank_html_is_current_view() {
        for raw in [
            r#"{"type":"print","html":null}"#,
            r#"{"type":"print"}"#,
            r#"{"type":"print","html":"   "}"#,
        ] {
            let req = PrintRequest::from_message(raw).unwrap();
            assert_eq!(req.into_source(), PrintSource::CurrentView, "{}", raw);
        }
    }

    #[test]
    fn double_encoded_message_is_accepted() {
        let inner = r#"{"type":"print","html":"<b>x</b>"}"#;
        let raw = serde_json::to_string(inner).unwrap();
        let req = PrintRequest::from_message(&raw).unwrap();
        assert_eq!(req.html.as_deref(), Some("<b>x</b>"));
    }

    #[test]
    fn rejects_other_messages() {
        assert!(matches!(
            PrintRequest::from_message(r#"{"type":"navigate","url":"/"}"#),
            Err(Error::MessageError(_))
        ));
        assert!(matches!(
            PrintRequest::from_message("print please"),
            Err(Error::MessageError(_))
        ));
    }

    #[test]
    fn script_targets_selected_transport() {
        let ipc = script(&InterceptorOptions::default());
        assert!(ipc.contains("w.ipc"));
        assert!(ipc.contains("if (true)"));

        let webkit = script(&InterceptorOptions {
            transport: MessageTransport::WebKit {
                handler: "pos\"bridge".into(),
            },
            legacy_handler: false,
        });
        assert!(webkit.contains(r#"messageHandlers["pos\"bridge"]"#));
        assert!(webkit.contains("if (false)"));
        assert!(!webkit.contains("__LOOKUP__"));
    }

    #[test]
    fn transport_from_str() {
        assert_eq!("ipc".parse::<MessageTransport>().unwrap(), MessageTransport::Ipc);
        assert_eq!(
            "webkit".parse::<MessageTransport>().unwrap(),
            MessageTransport::WebKit {
                handler: "printbridge".into()
            }
        );
        assert_eq!(
            "binding:sendPrint".parse::<MessageTransport>().unwrap(),
            MessageTransport::Binding("sendPrint".into())
        );
        assert!("carrier-pigeon".parse::<MessageTransport>().is_err());
    }
}
