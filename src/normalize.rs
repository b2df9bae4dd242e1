//! Root-relative resource rewriting for extracted markup
//!
//! Markup captured from the embedded page is printed from a temporary
//! document with a different base, so `href="/css/a.css"` would no longer
//! resolve. [`normalize`] anchors such references at the application's
//! origin. It is a plain text pass: no parsing, no network, and markup it does
//! not understand is passed through untouched.

use std::borrow::Cow;
use url::Url;

const URL_ATTRIBUTES: [&[u8]; 2] = [b"href", b"src"];

/// Rewrite root-relative `href`/`src` attributes and CSS `url()` references
/// to absolute URLs on `origin`.
///
/// Returns the input unchanged (borrowed) when nothing needed rewriting.
/// Protocol-relative references (`//cdn.example.com/...`) are left alone.
pub fn normalize<'a>(markup: &'a str, origin: &str) -> Cow<'a, str> {
    let origin = origin.trim_end_matches('/');
    if origin.is_empty() {
        return Cow::Borrowed(markup);
    }

    let bytes = markup.as_bytes();
    let mut out: Option<String> = None;
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        let found = match bytes[i] {
            b'h' | b'H' | b's' | b'S' => attribute_value_start(bytes, i),
            b'u' | b'U' => css_url_start(bytes, i),
            _ => None,
        };
        match found {
            Some(value_start) => {
                let buf = out.get_or_insert_with(|| String::with_capacity(markup.len() + 64));
                buf.push_str(&markup[copied..value_start]);
                buf.push_str(origin);
                copied = value_start;
                i = value_start + 1;
            }
            None => i += 1,
        }
    }

    match out {
        Some(mut buf) => {
            buf.push_str(&markup[copied..]);
            Cow::Owned(buf)
        }
        None => Cow::Borrowed(markup),
    }
}

/// `scheme://host[:port]` of an absolute http(s) URL.
pub fn content_origin(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    let origin = parsed.origin();
    if origin.is_tuple() {
        Some(origin.ascii_serialization())
    } else {
        None
    }
}

fn starts_with_ignore_case(bytes: &[u8], at: usize, needle: &[u8]) -> bool {
    bytes.len() >= at + needle.len() && bytes[at..at + needle.len()].eq_ignore_ascii_case(needle)
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn skip_spaces(bytes: &[u8], mut at: usize) -> usize {
    while at < bytes.len() && bytes[at].is_ascii_whitespace() {
        at += 1;
    }
    at
}

fn is_root_relative(bytes: &[u8], at: usize) -> bool {
    bytes.get(at) == Some(&b'/') && bytes.get(at + 1) != Some(&b'/')
}

/// Index of the leading `/` of a root-relative `href`/`src` value at `at`.
fn attribute_value_start(bytes: &[u8], at: usize) -> Option<usize> {
    if at > 0 && is_name_byte(bytes[at - 1]) {
        return None;
    }
    let name = URL_ATTRIBUTES
        .iter()
        .find(|name| starts_with_ignore_case(bytes, at, name))?;

    let mut j = skip_spaces(bytes, at + name.len());
    if bytes.get(j) != Some(&b'=') {
        return None;
    }
    j = skip_spaces(bytes, j + 1);
    if matches!(bytes.get(j), Some(b'"') | Some(b'\'')) {
        j += 1;
    }
    is_root_relative(bytes, j).then_some(j)
}

/// Index of the leading `/` inside a CSS `url(/...)` at `at`.
fn css_url_start(bytes: &[u8], at: usize) -> Option<usize> {
    if at > 0 && is_name_byte(bytes[at - 1]) {
        return None;
    }
    if !starts_with_ignore_case(bytes, at, b"url(") {
        return None;
    }
    let mut j = skip_spaces(bytes, at + 4);
    if matches!(bytes.get(j), Some(b'"') | Some(b'\'')) {
        j += 1;
    }
    is_root_relative(bytes, j).then_some(j)
}
