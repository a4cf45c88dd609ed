/*
 * postprocess/lightning.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Shared lightningcss plumbing of the rule rewrite, prefix and minify passes.
 */

//! lightningcss parses statements out of place as errors and drops comments
//! and `@charset`. Before a pass, top-level `@import` rules, boundary
//! markers and (when hoisting) `@charset` rules are renamed to unknown
//! at-rules, which lightningcss keeps where they stand; the printed output
//! gets their real names back.

use std::fmt::Display;

use cssbundle_source_map::SourceMap;
use lightningcss::error::Error as CssError;
use lightningcss::printer::PrinterOptions;
use lightningcss::rules::CssRule;
use lightningcss::selector::{Component, Selector};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use lightningcss::values::ident::Ident;
use lightningcss::visit_types;
use lightningcss::visitor::{Visit, VisitTypes, Visitor};

use super::StageContext;
use crate::RenderResult;
use crate::error::ProcessError;
use crate::imports::is_marker;
use crate::statements::{find_comments, find_statements};

/// Stand-in names; each is as long as the name it replaces, so positions
/// in the input stay put.
const IMPORT: (&str, &str) = ("import", "-x-imp");
const CHARSET: (&str, &str) = ("charset", "-x-char");
const MARKER: &str = "-x-mark";

/// What one lightningcss run does between parsing and printing.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Pass<'a> {
    /// Optimize for these targets, adding the vendor prefixes they need
    pub optimize: Option<Targets>,
    pub minify: bool,
    /// Inserted at the start of every class name; empty for none
    pub class_prefix: &'a str,
    /// Move the first `@charset`, then every `@import`, ahead of other rules
    pub hoist: bool,
}

/// Resolve browserslist `queries` into lightningcss targets.
pub(crate) fn browser_targets(
    stage: &'static str,
    queries: &[String],
) -> Result<Targets, ProcessError> {
    let browsers = Browsers::from_browserslist(queries.iter().map(String::as_str)).map_err(|e| {
        ProcessError::Targets {
            stage,
            query: queries.join(", "),
            message: e.to_string(),
        }
    })?;
    Ok(Targets {
        browsers,
        ..Targets::default()
    })
}

fn css_error<T: Display>(stage: &'static str, file: &str, e: CssError<T>) -> ProcessError {
    let (line, column) = e.loc.as_ref().map_or((0, 0), |loc| (loc.line + 1, loc.column));
    ProcessError::Css {
        stage,
        file: file.to_string(),
        line,
        column,
        message: e.kind.to_string(),
    }
}

/// Parse, optimize for `targets` and print `css` as a pipeline stage.
pub(crate) fn transform(
    stage: &'static str,
    css: &str,
    ctx: &StageContext,
    targets: Targets,
    minify: bool,
) -> Result<RenderResult, ProcessError> {
    let pass = Pass {
        optimize: Some(targets),
        minify,
        ..Pass::default()
    };
    run(stage, css, &ctx.file_name(), ctx.maps(), pass)
}

/// Run `pass` over `css`.
///
/// The map lightningcss produces is reduced to a single source, the pass
/// input, named `file`.
pub(crate) fn run(
    stage: &'static str,
    css: &str,
    file: &str,
    maps: bool,
    pass: Pass<'_>,
) -> Result<RenderResult, ProcessError> {
    let protected = protect(css, pass.hoist, !pass.minify);
    let options = ParserOptions {
        filename: file.to_string(),
        ..ParserOptions::default()
    };
    let mut stylesheet =
        StyleSheet::parse(&protected, options).map_err(|e| css_error(stage, file, e))?;

    if !pass.class_prefix.is_empty() {
        let Ok(()) = stylesheet.visit(&mut ClassPrefixer {
            prefix: pass.class_prefix,
        });
    }
    if pass.hoist {
        hoist(&mut stylesheet.rules.0);
    }
    if let Some(targets) = pass.optimize {
        stylesheet
            .minify(MinifyOptions {
                targets,
                ..MinifyOptions::default()
            })
            .map_err(|e| css_error(stage, file, e))?;
    }

    let mut source_map = if maps {
        let mut map = parcel_sourcemap::SourceMap::new("/");
        map.add_source(file);
        map.set_source_content(0, &protected)
            .map_err(|e| ProcessError::source_map(stage, format!("{e:?}")))?;
        Some(map)
    } else {
        None
    };

    let printed = stylesheet
        .to_css(PrinterOptions {
            minify: pass.minify,
            targets: pass.optimize.unwrap_or_default(),
            source_map: source_map.as_mut(),
            ..PrinterOptions::default()
        })
        .map_err(|e| css_error(stage, file, e))?;

    let map = match source_map {
        Some(mut parcel) => {
            let json = parcel
                .to_json(None)
                .map_err(|e| ProcessError::source_map(stage, format!("{e:?}")))?;
            let mut map =
                SourceMap::from_json(&json).map_err(|e| ProcessError::source_map(stage, e))?;
            map.file = Some(file.to_string());
            map.source_root = None;
            map.sources = vec![file.to_string()];
            map.sources_content = vec![None];
            Some(map)
        }
        None => None,
    };

    Ok(RenderResult {
        css: restore(&printed.code),
        map,
    })
}

/// Rename the statements lightningcss would reject or drop.
fn protect(css: &str, charset: bool, markers: bool) -> String {
    let mut names = vec![IMPORT.0];
    if charset {
        names.push(CHARSET.0);
    }

    let mut edits: Vec<(std::ops::Range<usize>, String)> = Vec::new();
    for statement in find_statements(css, &names) {
        let stand_in = if statement.is(IMPORT.0) {
            IMPORT.1
        } else {
            CHARSET.1
        };
        // An escaped name has another length; leave it to lightningcss
        if statement.name.len() == stand_in.len() {
            let name = statement.range.start + 1;
            edits.push((name..name + stand_in.len(), stand_in.to_string()));
        }
    }
    if markers {
        for range in find_comments(css) {
            let comment = &css[range.clone()];
            if !is_marker(comment) {
                continue;
            }
            let label = &comment[3..comment.len() - 3];
            if !label.contains(['"', '\\', '\n']) {
                edits.push((range, format!("@{MARKER} \"{label}\";")));
            }
        }
    }
    if edits.is_empty() {
        return css.to_string();
    }
    edits.sort_by_key(|(range, _)| range.start);

    let mut out = String::with_capacity(css.len() + edits.len() * 8);
    let mut last = 0;
    for (range, text) in edits {
        out.push_str(&css[last..range.start]);
        out.push_str(&text);
        last = range.end;
    }
    out.push_str(&css[last..]);
    out
}

/// Give protected statements their names back.
fn restore(css: &str) -> String {
    let statements = find_statements(css, &[IMPORT.1, CHARSET.1, MARKER]);
    if statements.is_empty() {
        return css.to_string();
    }

    let mut out = String::with_capacity(css.len());
    let mut last = 0;
    for statement in statements {
        out.push_str(&css[last..statement.range.start]);
        if statement.is(MARKER) {
            let label = statement.prelude.trim_matches('"');
            out.push_str(&format!("/* {label} */"));
            last = statement.range.end;
        } else {
            let name = if statement.is(IMPORT.1) {
                IMPORT.0
            } else {
                CHARSET.0
            };
            out.push('@');
            out.push_str(name);
            last = statement.range.start + 1 + statement.name.len();
        }
    }
    out.push_str(&css[last..]);
    out
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Placement {
    Charset,
    Import,
    Other,
}

fn placement<R>(rule: &CssRule<'_, R>) -> Placement {
    match rule {
        CssRule::Import(_) => Placement::Import,
        CssRule::Unknown(unknown) if *unknown.name == *IMPORT.1 => Placement::Import,
        CssRule::Unknown(unknown) if *unknown.name == *CHARSET.1 => Placement::Charset,
        _ => Placement::Other,
    }
}

/// Reorder top-level rules: the first `@charset`, then every `@import` in
/// order, then the rest. Later `@charset` rules are dropped.
fn hoist<R>(rules: &mut Vec<CssRule<'_, R>>) {
    let mut charset = None;
    let mut imports = Vec::new();
    let mut rest = Vec::with_capacity(rules.len());
    for rule in rules.drain(..) {
        match placement(&rule) {
            Placement::Charset => {
                if charset.is_none() {
                    charset = Some(rule);
                }
            }
            Placement::Import => imports.push(rule),
            Placement::Other => rest.push(rule),
        }
    }
    rules.extend(charset);
    rules.extend(imports);
    rules.extend(rest);
}

/// Inserts a prefix into every class selector, including those nested in
/// `:not()`, `:is()`, `:where()`, `:has()`, `::slotted()` and `:host()`.
struct ClassPrefixer<'a> {
    prefix: &'a str,
}

impl<'i> Visitor<'i> for ClassPrefixer<'_> {
    type Error = std::convert::Infallible;

    fn visit_types(&self) -> VisitTypes {
        visit_types!(SELECTORS)
    }

    fn visit_selector(&mut self, selector: &mut Selector<'i>) -> Result<(), Self::Error> {
        prefix_selector(selector, self.prefix);
        Ok(())
    }
}

fn prefix_selector(selector: &mut Selector<'_>, prefix: &str) {
    for component in selector.iter_mut_raw_match_order() {
        match component {
            Component::Class(name) => *name = Ident(format!("{prefix}{}", &*name.0).into()),
            Component::Negation(list)
            | Component::Is(list)
            | Component::Where(list)
            | Component::Has(list)
            | Component::Any(_, list) => {
                for inner in list.iter_mut() {
                    prefix_selector(inner, prefix);
                }
            }
            Component::Slotted(inner) | Component::Host(Some(inner)) => {
                prefix_selector(inner, prefix)
            }
            _ => {}
        }
    }
}
