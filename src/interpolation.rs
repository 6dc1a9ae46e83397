//! The expression-span and quoted-string sub-grammar shared by both
//! dialects.
//!
//! An expression span runs between the configured delimiters and
//! absorbs quoted strings into its own text, so delimiter-like
//! characters inside a string cannot terminate it early. The captured
//! text gets a standalone syntax pre-check when the span closes.

use crate::error::{Location, Result};
use crate::expr;
use crate::grammar::{
    ExprData, Frame, NodeData, NodeId, NodeType, Parser, Piece, Policy, Token, TokenMatch,
};

/// Build the expression span node type. `string_id` is the grammar id
/// of the quoted string node it absorbs.
pub fn expression_node(open: &str, close: &str, string_id: NodeId) -> NodeType {
    let mut node = NodeType::new(
        "expression",
        Token::lit(open),
        Some(Token::lit(close)),
    );
    node.start_policy = Policy::Omit;
    node.end_policy = Policy::Omit;
    node.recognizes = vec![string_id];
    node.absorbs = vec![string_id];
    node.close = Some(expression_close);
    node
}

/// Build the quoted string node type: any of the three quote
/// characters, backslash-escaped, terminated by the same quote.
pub fn string_node() -> Result<NodeType> {
    let mut node = NodeType::new("string", Token::re(r#"^(?P<quote>["'`])"#)?, None);
    node.end_escape = true;
    node.open = string_open;
    node.setup = Some(string_setup);
    node.close = Some(string_close);
    Ok(node)
}

fn string_open(_: &mut Parser<'_, '_>, tm: &TokenMatch) -> Result<NodeData> {
    let quote = tm
        .group_text("quote")
        .and_then(|s| s.chars().next())
        .unwrap_or('"');
    Ok(NodeData::Str { quote })
}

fn string_setup(_: &mut Parser<'_, '_>, frame: &mut Frame) -> Result<()> {
    if let NodeData::Str { quote } = &frame.data {
        frame.end_override = Some((Token::Lit(quote.to_string()), Policy::Keep));
    }
    Ok(())
}

fn string_close(
    p: &mut Parser<'_, '_>,
    frame: &mut Frame,
    end: Option<&TokenMatch>,
) -> Result<()> {
    if end.is_none() {
        return Err(p.err_at(frame.location, Some(1), "Unclosed string"));
    }
    Ok(())
}

fn expression_close(
    p: &mut Parser<'_, '_>,
    frame: &mut Frame,
    end: Option<&TokenMatch>,
) -> Result<()> {
    let open_width = p.grammar().opts.open_delim.len();
    if end.is_none() {
        return Err(p.err_at(frame.location, Some(open_width), "Unclosed expression"));
    }
    let mut text = String::new();
    for piece in &frame.content {
        if let Piece::Text(t) = piece {
            text.push_str(t);
        }
    }
    if let Err(e) = expr::parse(&text) {
        let location = Location::new(
            frame.location.line,
            frame.location.column + open_width + e.offset,
        );
        return Err(p.err_expr(location, None, format!("Invalid expression: {}", e.message)));
    }
    frame.data = NodeData::Expression(ExprData { text });
    Ok(())
}
