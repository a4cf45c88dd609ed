/*
 * url.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Rebasing and inlining of url(...) references.
 */

//! Asset URL resolution.
//!
//! A relative `url(...)` is written relative to the stylesheet it appears
//! in. When that text moves into another file, [`UrlResolver::rewrite`]
//! either rebases the reference so it resolves from the new location, or
//! replaces it with a data URI.

use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use cssbundle_runtime::SystemRuntime;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::config::UrlMode;
use crate::error::AssetResolutionError;
use crate::source::{normalize, relative_path};

static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\burl\(\s*(?:"([^"]*)"|'([^']*)'|([^)"'\s]*))\s*\)"#).unwrap()
});

static IMPORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)@import\s+(?:"([^"]*)"|'([^']*)')"#).unwrap());

static SCHEME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:").unwrap());

/// Whether `url` is left alone by every rewrite: it has a scheme, is
/// protocol-relative, root-relative or a fragment.
pub fn is_absolute_url(url: &str) -> bool {
    url.is_empty()
        || url.starts_with('/')
        || url.starts_with('#')
        || SCHEME_RE.is_match(url)
}

/// Split `a.svg?v=1#icon` into `("a.svg", "?v=1#icon")`.
fn split_suffix(url: &str) -> (&str, &str) {
    match url.find(['?', '#']) {
        Some(idx) => url.split_at(idx),
        None => (url, ""),
    }
}

fn dir_of(path: &Path) -> &Path {
    path.parent().unwrap_or(Path::new(""))
}

/// Rewrite `url` (relative to the file `from`) so it resolves from `to`.
pub fn rebase_url(url: &str, from: &Path, to: &Path) -> String {
    if is_absolute_url(url) {
        return url.to_string();
    }
    let (path, suffix) = split_suffix(url);
    if path.is_empty() {
        return url.to_string();
    }
    let target = normalize(&dir_of(from).join(path));
    format!("{}{}", relative_path(dir_of(to), &target), suffix)
}

/// Rebase the string targets of `@import` rules.
///
/// `@import url(...)` is covered by [`UrlResolver::rewrite`].
pub fn rebase_imports(css: &str, from: &Path, to: &Path) -> String {
    IMPORT_RE
        .replace_all(css, |caps: &Captures<'_>| {
            let (value, quote) = match (caps.get(1), caps.get(2)) {
                (Some(m), _) => (m.as_str(), '"'),
                (_, Some(m)) => (m.as_str(), '\''),
                _ => return caps[0].to_string(),
            };
            if is_absolute_url(value) {
                return caps[0].to_string();
            }
            format!("@import {quote}{}{quote}", rebase_url(value, from, to))
        })
        .into_owned()
}

fn quote_if_needed(url: &str, quote: Option<char>) -> String {
    match quote {
        Some(q) => format!("url({q}{url}{q})"),
        None if url.contains([' ', '(', ')', '"', '\'']) => format!("url(\"{url}\")"),
        None => format!("url({url})"),
    }
}

fn mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "bmp" => "image/bmp",
        "ico" => "image/x-icon",
        "svg" => "image/svg+xml",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "eot" => "application/vnd.ms-fontobject",
        "css" => "text/css",
        _ => "application/octet-stream",
    }
}

/// Build a data URI for `bytes` read from `path`.
///
/// SVG stays readable as percent-encoded text, everything else is base64.
pub fn data_uri(path: &Path, bytes: &[u8]) -> String {
    let mime = mime_type(path);
    if mime == "image/svg+xml" {
        let text = String::from_utf8_lossy(bytes);
        format!(
            "data:image/svg+xml;charset=US-ASCII,{}",
            urlencoding::encode(&text)
        )
    } else {
        format!("data:{mime};base64,{}", STANDARD.encode(bytes))
    }
}

/// Rewrites `url(...)` references against a runtime.
#[derive(Clone, Copy)]
pub struct UrlResolver<'a> {
    runtime: &'a dyn SystemRuntime,
    include_paths: &'a [PathBuf],
}

impl<'a> UrlResolver<'a> {
    pub fn new(runtime: &'a dyn SystemRuntime, include_paths: &'a [PathBuf]) -> Self {
        Self {
            runtime,
            include_paths,
        }
    }

    /// Rewrite every relative `url(...)` in `css`, which was written
    /// relative to `from`, for a stylesheet living at `to`.
    ///
    /// Absolute references are kept byte for byte, as are all references
    /// when `mode` is [`UrlMode::None`].
    pub fn rewrite(
        &self,
        css: &str,
        mode: UrlMode,
        from: &Path,
        to: &Path,
    ) -> Result<String, AssetResolutionError> {
        if !mode.rewrites() {
            return Ok(css.to_string());
        }

        let mut out = String::with_capacity(css.len());
        let mut last = 0;
        for caps in URL_RE.captures_iter(css) {
            let Some(whole) = caps.get(0) else { continue };
            let (value, quote) = match (caps.get(1), caps.get(2), caps.get(3)) {
                (Some(m), _, _) => (m.as_str(), Some('"')),
                (_, Some(m), _) => (m.as_str(), Some('\'')),
                (_, _, Some(m)) => (m.as_str(), None),
                _ => continue,
            };
            if is_absolute_url(value) {
                continue;
            }

            let replacement = match mode {
                UrlMode::Inline => {
                    let uri = self.inline(value, from)?;
                    format!("url(\"{uri}\")")
                }
                _ => {
                    let rebased = rebase_url(value, from, to);
                    if rebased == value {
                        continue;
                    }
                    quote_if_needed(&rebased, quote)
                }
            };

            out.push_str(&css[last..whole.start()]);
            out.push_str(&replacement);
            last = whole.end();
        }
        out.push_str(&css[last..]);
        Ok(out)
    }

    /// Locate the asset `url` referenced from `from`: next to it first,
    /// then in each include path.
    pub fn locate(&self, url: &str, from: &Path) -> Option<PathBuf> {
        let (path, _) = split_suffix(url);
        std::iter::once(dir_of(from))
            .chain(self.include_paths.iter().map(PathBuf::as_path))
            .map(|dir| normalize(&dir.join(path)))
            .find(|candidate| self.runtime.is_file(candidate).unwrap_or(false))
    }

    fn inline(&self, url: &str, from: &Path) -> Result<String, AssetResolutionError> {
        let path = self
            .locate(url, from)
            .ok_or_else(|| AssetResolutionError::Missing {
                url: url.to_string(),
                importer: from.to_path_buf(),
            })?;
        let bytes = self
            .runtime
            .file_read(&path)
            .map_err(|source| AssetResolutionError::Read {
                path: path.clone(),
                source,
            })?;
        tracing::debug!(asset = %path.display(), bytes = bytes.len(), "Inlining asset");
        Ok(data_uri(&path, &bytes))
    }
}
