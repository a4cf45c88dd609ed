/*
 * statements.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Top-level statement at-rules of rendered CSS.
 */

//! Locating `@import` and `@charset` statements without reprinting the
//! stylesheet. The text is tokenized with `cssparser`, so strings, comments,
//! `url(...)` tokens and blocks are never mistaken for statements.

use std::ops::Range;

use cssparser::{Parser, ParserInput, Token};

/// A top-level statement at-rule such as `@import "a.css";`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtStatement<'a> {
    /// Rule name without the `@`, as written
    pub name: &'a str,
    /// Byte range including the terminating `;`
    pub range: Range<usize>,
    /// Text between the rule name and the `;`, trimmed
    pub prelude: &'a str,
}

impl AtStatement<'_> {
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Every top-level `@<name> ...;` statement whose name is one of `names`,
/// in source order.
///
/// At-rules of those names that open a block are skipped with their block,
/// as is anything nested inside a block. A statement running to the end of
/// input ends there.
pub fn find_statements<'a>(css: &'a str, names: &[&str]) -> Vec<AtStatement<'a>> {
    let mut input = ParserInput::new(css);
    let mut parser = Parser::new(&mut input);
    let mut found = Vec::new();

    loop {
        let start = parser.position().byte_index();
        let name = match parser.next_including_whitespace_and_comments() {
            Ok(Token::AtKeyword(name)) => name.clone(),
            Ok(_) => continue,
            Err(_) => break,
        };
        if !names.iter().any(|n| name.eq_ignore_ascii_case(n)) {
            continue;
        }

        let name_end = parser.position().byte_index();
        let mut end = None;
        loop {
            let before = parser.position().byte_index();
            match parser.next_including_whitespace_and_comments() {
                Ok(Token::Semicolon) => {
                    end = Some((before, parser.position().byte_index()));
                    break;
                }
                // Block at-rule; the block is skipped by the next call
                Ok(Token::CurlyBracketBlock) => break,
                Ok(_) => {}
                Err(_) => {
                    end = Some((before, before));
                    break;
                }
            }
        }

        if let Some((prelude_end, end)) = end {
            found.push(AtStatement {
                name: &css[start + 1..name_end],
                range: start..end,
                prelude: css[name_end..prelude_end].trim(),
            });
        }
    }

    found
}

/// Byte range of every comment outside of blocks, delimiters included.
pub fn find_comments(css: &str) -> Vec<Range<usize>> {
    let mut input = ParserInput::new(css);
    let mut parser = Parser::new(&mut input);
    let mut found = Vec::new();

    loop {
        let start = parser.position().byte_index();
        match parser.next_including_whitespace_and_comments() {
            Ok(Token::Comment(_)) => found.push(start..parser.position().byte_index()),
            Ok(_) => {}
            Err(_) => break,
        }
    }

    found
}
