//! kakikae - a directive-driven template rewriting engine
//!
//! kakikae reads source documents (arbitrary text or code files, and
//! HTML/XML files) that embed conditional and loop directives plus
//! interpolation expressions inside comments or tag attributes, and
//! compiles them into a reusable program that reproduces the document
//! with directives executed and expressions substituted.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//!
//! let out = kakikae::render(
//!     "start {{ a + '1' }} end",
//!     &json!({"a": "x"}),
//! ).unwrap();
//!
//! assert_eq!(out, "start x1 end");
//! ```
//!
//! Text documents carry directives in comment lines:
//!
//! ```rust
//! use serde_json::json;
//!
//! let source = "\
//! //=IF(debug)
//! log_level = trace
//! //=ELSE
//! log_level = info
//! //=END IF
//! ";
//! let out = kakikae::render(source, &json!({"debug": false})).unwrap();
//! assert_eq!(out, "log_level = info\n");
//! ```
//!
//! HTML documents carry them as attribute operators:
//!
//! ```rust
//! use serde_json::json;
//!
//! let out = kakikae::render_html(
//!     r#"<span v-if="ok">yes</span><span v-else>no</span>"#,
//!     &json!({"ok": false}),
//! ).unwrap();
//! assert_eq!(out, "<span>no</span>");
//! ```

// Public modules - part of the API
pub mod error;
pub mod files;
pub mod options;
pub mod program;
pub mod value;

// Internal implementation modules
mod codegen;
mod diagnostics;
mod expr;
mod grammar;
mod html;
mod interpolation;
mod machine;
mod scope;
mod text;

pub use error::{Diagnostic, KakikaeError, Location, Result};
pub use options::{HtmlOptions, RewriteOptions, TextOptions};
pub use program::Program;

use diagnostics::SourceDocument;
use program::Parts;
use regex::Regex;

/// The two surface grammars, plus a mixed mode that switches between
/// them on `html-mode-on` / `html-mode-off` instruction lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Text,
    Html,
    Mixed,
}

/// Compiles documents once and renders them against many scopes.
pub struct Rewriter {
    options: RewriteOptions,
    text_grammar: grammar::Grammar,
    html_grammar: grammar::Grammar,
    no_rewrite: Regex,
    mode_switch: Regex,
    debug: bool,
}

impl Rewriter {
    /// A rewriter with the default option set.
    pub fn new() -> Result<Self> {
        Self::with_options(RewriteOptions::default())
    }

    pub fn with_options(options: RewriteOptions) -> Result<Self> {
        let text_grammar = text::grammar(&options.text)?;
        let html_grammar = html::grammar(&options.html)?;
        let comment = text::comment_alternation(&options.text.comment_prefixes);
        let sign = regex::escape(&options.text.instruction_sign);
        let no_rewrite = compile_marker(&format!(
            r"(?m)^[ \t]*{comment}[ \t]*{sign}(?i:no-rewrite)[ \t]*\r?$"
        ))?;
        let mode_switch = compile_marker(&format!(
            r"(?m)^[ \t]*{comment}[ \t]*{sign}(?i)html-mode-(?P<mode>on|off)[ \t]*\r?$"
        ))?;
        Ok(Self {
            options,
            text_grammar,
            html_grammar,
            no_rewrite,
            mode_switch,
            debug: false,
        })
    }

    /// Log parse trees and program listings through `tracing`.
    pub fn debug(mut self, on: bool) -> Self {
        self.debug = on;
        self
    }

    pub fn options(&self) -> &RewriteOptions {
        &self.options
    }

    /// Compile a document into its emission program.
    pub fn compile(&self, source: &str, dialect: Dialect) -> Result<Program> {
        self.compile_named(source, None, dialect)
    }

    /// Compile with a source name used in diagnostics.
    pub fn compile_named(
        &self,
        source: &str,
        name: Option<&str>,
        dialect: Dialect,
    ) -> Result<Program> {
        let doc = SourceDocument::new(source, name);
        if matches!(dialect, Dialect::Text | Dialect::Mixed) && self.no_rewrite.is_match(source)
        {
            return Ok(Program::verbatim(&doc));
        }
        let parts = match dialect {
            Dialect::Text => self.compile_range(&doc, 0..source.len(), &self.text_grammar)?,
            Dialect::Html => self.compile_range(&doc, 0..source.len(), &self.html_grammar)?,
            Dialect::Mixed => {
                let mut merged = Parts::default();
                for (range, is_html) in self.segments(source) {
                    let grammar = if is_html {
                        &self.html_grammar
                    } else {
                        &self.text_grammar
                    };
                    merged.merge(self.compile_range(&doc, range, grammar)?);
                }
                merged
            }
        };
        let program = Program::assemble(&doc, parts)?;
        if self.debug {
            tracing::debug!(source = ?name, "emission program:\n{}", program.dump());
        }
        Ok(program)
    }

    /// One-shot convenience: compile and render against a scope.
    pub fn render(
        &self,
        source: &str,
        data: &serde_json::Value,
        dialect: Dialect,
    ) -> Result<String> {
        self.compile(source, dialect)?.render(data)
    }

    /// The parse tree as a printable outline, for debugging grammars.
    pub fn outline(&self, source: &str, dialect: Dialect) -> Result<String> {
        let doc = SourceDocument::new(source, None);
        let grammar = match dialect {
            Dialect::Html => &self.html_grammar,
            _ => &self.text_grammar,
        };
        let tree = grammar::Parser::parse(grammar, &doc, 0..source.len())?;
        Ok(tree.outline(grammar))
    }

    fn compile_range(
        &self,
        doc: &SourceDocument,
        range: std::ops::Range<usize>,
        grammar: &grammar::Grammar,
    ) -> Result<Parts> {
        let tree = grammar::Parser::parse(grammar, doc, range)?;
        if self.debug {
            tracing::debug!("parse tree:\n{}", tree.outline(grammar));
        }
        codegen::generate(doc, &tree)
    }

    /// Split a mixed document at mode-switch instruction lines. The
    /// marker lines themselves belong to no segment.
    fn segments(&self, source: &str) -> Vec<(std::ops::Range<usize>, bool)> {
        let mut out = Vec::new();
        let mut cursor = 0usize;
        let mut html = false;
        for caps in self.mode_switch.captures_iter(source) {
            let Some(whole) = caps.get(0) else { continue };
            if whole.start() > cursor {
                out.push((cursor..whole.start(), html));
            }
            html = caps
                .name("mode")
                .is_some_and(|g| g.as_str().eq_ignore_ascii_case("on"));
            cursor = whole.end();
            if source.as_bytes().get(cursor) == Some(&b'\n') {
                cursor += 1;
            }
        }
        if cursor < source.len() {
            out.push((cursor..source.len(), html));
        }
        out
    }
}

fn compile_marker(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| KakikaeError::Options {
        message: e.to_string(),
    })
}

/// Render a text-dialect document in one call.
pub fn render(source: &str, data: &serde_json::Value) -> Result<String> {
    Rewriter::new()?.render(source, data, Dialect::Text)
}

/// Render an HTML-dialect document in one call.
pub fn render_html(source: &str, data: &serde_json::Value) -> Result<String> {
    Rewriter::new()?.render(source, data, Dialect::Html)
}

/// Compile a document in one call; the program can be cached and
/// rendered against many scopes.
pub fn compile(source: &str, dialect: Dialect) -> Result<Program> {
    Rewriter::new()?.compile(source, dialect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_render_simple() {
        let out = render("Hello, {{ name }}!", &json!({"name": "World"})).unwrap();
        assert_eq!(out, "Hello, World!");
    }

    #[test]
    fn test_program_reuse() {
        let program = compile("Hello, {{ name }}!", Dialect::Text).unwrap();
        assert_eq!(program.render(&json!({"name": "Alice"})).unwrap(), "Hello, Alice!");
        assert_eq!(program.render(&json!({"name": "Bob"})).unwrap(), "Hello, Bob!");
    }

    #[test]
    fn test_idempotent_without_directives() {
        let source = "no directives here\njust text\n";
        assert_eq!(render(source, &json!({})).unwrap(), source);
        assert_eq!(
            render(source, &json!({"unused": 1})).unwrap(),
            source
        );
    }

    #[test]
    fn test_no_rewrite_returns_source_verbatim() {
        let source = "// @rw:no-rewrite\n\nstart {{ some.var + '123' }} end";
        assert_eq!(render(source, &json!({})).unwrap(), source);
        assert_eq!(
            render(source, &json!({"some": {"var": "x"}})).unwrap(),
            source
        );
    }

    #[test]
    fn test_outline_shows_tree() {
        let rw = Rewriter::new().unwrap();
        let outline = rw.outline("{{ a }}", Dialect::Text).unwrap();
        assert!(outline.contains("document"));
        assert!(outline.contains("expression"));
    }

    #[test]
    fn test_mixed_mode_switches_dialects() {
        let source = "\
value = {{ n }}
// @rw:html-mode-on
<b v-if=\"on\">bold</b>
// @rw:html-mode-off
tail = {{ n }}
";
        let rw = Rewriter::new().unwrap();
        let out = rw
            .render(source, &json!({"n": 1, "on": true}), Dialect::Mixed)
            .unwrap();
        assert_eq!(out, "value = 1\n<b>bold</b>\ntail = 1\n");
    }

    #[test]
    fn test_mixed_mode_off_by_default_in_text_dialect() {
        // without mixed mode the marker stays an ordinary comment line
        let source = "// @rw:html-mode-on\nx\n";
        let out = render(source, &json!({})).unwrap();
        assert_eq!(out, source);
    }

    #[test]
    fn test_custom_delimiters() {
        let mut options = RewriteOptions::default();
        options.text.delimiters = ("{{=".to_owned(), "=}}".to_owned());
        let rw = Rewriter::with_options(options).unwrap();
        let out = rw
            .render(
                "start {{= some.var + '123' =}} end",
                &json!({"some": {"var": "somevar"}}),
                Dialect::Text,
            )
            .unwrap();
        assert_eq!(out, "start somevar123 end");
    }
}
