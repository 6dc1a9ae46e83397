//! Flattens a parse tree into the emission program.

use crate::diagnostics::{self, SourceDocument};
use crate::error::{Diagnostic, KakikaeError, Location, Result};
use crate::expr;
use crate::grammar::{AttrData, AttrRole, NodeData, ParseNode, Piece};
use crate::machine::{BlockKind, BlockStack};
use crate::program::{BlockHeader, ExprEntry, ForEntry, Instr, Parts};
use std::collections::HashSet;

pub struct Generator<'d> {
    doc: &'d SourceDocument,
    instrs: Vec<Instr>,
    lines: Vec<usize>,
    exprs: Vec<ExprEntry>,
    fors: Vec<ForEntry>,
    buf: String,
    buf_line: usize,
    suppressed_lines: HashSet<usize>,
    suppress_all: bool,
    stack: BlockStack,
}

/// Produce the emission program parts for one parsed document range.
pub fn generate(doc: &SourceDocument, root: &ParseNode) -> Result<Parts> {
    let mut generator = Generator {
        doc,
        instrs: Vec::new(),
        lines: Vec::new(),
        exprs: Vec::new(),
        fors: Vec::new(),
        buf: String::new(),
        buf_line: 1,
        suppressed_lines: HashSet::new(),
        suppress_all: false,
        stack: BlockStack::new(),
    };
    generator.collect_instructions(root);
    generator.walk(root)?;
    generator.flush();
    if generator.stack.depth() != 0 {
        return Err(KakikaeError::Grammar(Diagnostic::new(
            "internal error: unbalanced block frames after generation",
            Location::new(1, 1),
        )));
    }
    tracing::debug!(
        instructions = generator.instrs.len(),
        expressions = generator.exprs.len(),
        "generated emission program"
    );
    Ok(Parts {
        instrs: generator.instrs,
        lines: generator.lines,
        exprs: generator.exprs,
        fors: generator.fors,
    })
}

impl<'d> Generator<'d> {
    fn collect_instructions(&mut self, node: &ParseNode) {
        if let NodeData::Instruction { name } = &node.data {
            match name.as_str() {
                "no-interpolate-next-line" => {
                    self.suppressed_lines.insert(node.location.line + 1);
                }
                "no-interpolate-file" => self.suppress_all = true,
                _ => {}
            }
        }
        for piece in &node.content {
            if let Piece::Node(child) = piece {
                self.collect_instructions(child);
            }
        }
    }

    fn append_text(&mut self, text: &str, line: usize) {
        if self.buf.is_empty() {
            self.buf_line = line;
        }
        self.buf.push_str(text);
    }

    fn flush(&mut self) {
        if !self.buf.is_empty() {
            let text = std::mem::take(&mut self.buf);
            self.instrs.push(Instr::Literal(text));
            self.lines.push(self.buf_line);
        }
    }

    fn push_instr(&mut self, instr: Instr, line: usize) {
        self.flush();
        self.instrs.push(instr);
        self.lines.push(line);
    }

    fn expr_id(&mut self, text: &str, location: Location) -> Result<usize> {
        let ast = expr::parse(text).map_err(|e| self.expr_err(&e, location))?;
        self.exprs.push(ExprEntry {
            text: text.to_owned(),
            location,
            ast,
        });
        Ok(self.exprs.len() - 1)
    }

    fn for_id(&mut self, text: &str, location: Location) -> Result<usize> {
        let header = expr::parse_for_header(text).map_err(|e| self.expr_err(&e, location))?;
        self.fors.push(ForEntry {
            text: text.to_owned(),
            location,
            header,
        });
        Ok(self.fors.len() - 1)
    }

    fn expr_err(&self, e: &expr::SyntaxError, location: Location) -> KakikaeError {
        let frame =
            diagnostics::caret_frame(self.doc, location.line, Some(location.column), None);
        KakikaeError::ExpressionSyntax(
            Diagnostic::new(format!("Invalid expression: {}", e.message), location)
                .with_source(self.doc.name.as_deref())
                .with_frame(frame),
        )
    }

    fn header_instr(
        &mut self,
        kind: BlockKind,
        expr: Option<&str>,
        location: Location,
    ) -> Result<BlockHeader> {
        let text = expr.unwrap_or("");
        Ok(match kind {
            BlockKind::If => BlockHeader::If(self.expr_id(text, location)?),
            BlockKind::ElseIf => BlockHeader::ElseIf(self.expr_id(text, location)?),
            BlockKind::Else => BlockHeader::Else,
            BlockKind::For => BlockHeader::For(self.for_id(text, location)?),
        })
    }

    fn walk(&mut self, node: &ParseNode) -> Result<()> {
        match &node.data {
            NodeData::Plain | NodeData::Str { .. } | NodeData::Value(_) => {
                self.walk_content(node)?;
            }
            NodeData::Instruction { .. } => {}
            NodeData::Expression(e) => {
                let line = node.location.line;
                if self.suppress_all || self.suppressed_lines.contains(&line) {
                    let raw = node.raw(self.doc).to_owned();
                    self.append_text(&raw, line);
                } else {
                    let id = self.expr_id(&e.text, node.location)?;
                    self.push_instr(Instr::Interpolate(id), line);
                }
            }
            NodeData::Block(block) => {
                let line = node.location.line;
                let descr_opening = matches!(block.kind, BlockKind::If | BlockKind::For);
                if !descr_opening {
                    self.push_instr(Instr::CloseBlock, line);
                    self.stack.pop();
                }
                let header =
                    self.header_instr(block.kind, block.expr.as_deref(), node.location)?;
                self.push_instr(Instr::OpenBlock(header), line);
                self.stack.push(block.kind, node.location);
                self.walk_content(node)?;
                if block.closed_by_end {
                    self.push_instr(Instr::CloseBlock, line);
                    self.stack.pop();
                }
            }
            NodeData::Tag(tag) => {
                let line = node.location.line;
                if !tag.headers.is_empty() {
                    let overtaking = tag
                        .headers
                        .first()
                        .is_some_and(|h| matches!(h.kind, BlockKind::ElseIf | BlockKind::Else));
                    if overtaking {
                        self.push_instr(Instr::CloseBlock, line);
                        self.stack.pop();
                    }
                    for header in tag.headers.clone() {
                        let instr = self.header_instr(
                            header.kind,
                            header.expr.as_deref(),
                            header.location,
                        )?;
                        self.push_instr(Instr::OpenBlock(instr), header.location.line);
                        self.stack.push(header.kind, header.location);
                    }
                }
                self.walk_content(node)?;
                if !tag.headers.is_empty() {
                    let mut closes = tag.headers.len();
                    if tag.close_suppressed {
                        closes -= 1;
                    }
                    for _ in 0..closes {
                        self.push_instr(Instr::CloseBlock, line);
                        self.stack.pop();
                    }
                }
            }
            NodeData::Attr(attr) => match attr.role {
                AttrRole::Plain => {
                    let text = plain_attr_text(attr);
                    self.append_text(&text, node.location.line);
                }
                AttrRole::Bound => {
                    let value = attr.value.as_deref().unwrap_or("''");
                    let id = self.expr_id(value, node.location)?;
                    self.push_instr(
                        Instr::InterpolateAttr {
                            name: attr.key.clone(),
                            expr: id,
                            quote: attr.quote.unwrap_or('"'),
                        },
                        node.location.line,
                    );
                }
                AttrRole::Operator => {}
            },
        }
        Ok(())
    }

    fn walk_content(&mut self, node: &ParseNode) -> Result<()> {
        for piece in &node.content {
            match piece {
                Piece::Text(text) => self.append_text(text, node.location.line),
                Piece::Node(child) => self.walk(child)?,
            }
        }
        Ok(())
    }
}

fn plain_attr_text(attr: &AttrData) -> String {
    let mut out = attr.key.clone();
    if let Some(value) = &attr.value {
        out.push('=');
        match attr.quote {
            Some(q) => {
                out.push(q);
                out.push_str(&escape_quote(value, q));
                out.push(q);
            }
            None => out.push_str(value),
        }
    }
    out
}

/// Re-escape the quote character when an attribute value is emitted
/// back between the same quotes.
pub fn escape_quote(value: &str, quote: char) -> String {
    let entity = match quote {
        '"' => "&quot;",
        '\'' => "&apos;",
        _ => "&#96;",
    };
    value.replace(quote, entity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::AttrRole;

    fn attr(key: &str, value: Option<&str>, quote: Option<char>) -> AttrData {
        AttrData {
            key: key.to_owned(),
            value: value.map(str::to_owned),
            quote,
            role: AttrRole::Plain,
        }
    }

    #[test]
    fn test_plain_attr_reconstruction() {
        assert_eq!(plain_attr_text(&attr("disabled", None, None)), "disabled");
        assert_eq!(
            plain_attr_text(&attr("class", Some("red"), Some('"'))),
            "class=\"red\""
        );
        assert_eq!(
            plain_attr_text(&attr("type", Some("text"), None)),
            "type=text"
        );
    }

    #[test]
    fn test_quote_escaping() {
        assert_eq!(escape_quote("say \"hi\"", '"'), "say &quot;hi&quot;");
        assert_eq!(escape_quote("it's", '\''), "it&apos;s");
    }
}
