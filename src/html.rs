//! The HTML dialect: markup nodes plus block operator attributes
//! (`v-if`, `v-for`, `v-else-if`, `v-else`) and interpolated attributes
//! (`:name="expr"`).

use crate::error::{Location, Result};
use crate::expr;
use crate::grammar::{
    AttrData, AttrRole, Frame, Grammar, GrammarOpts, HeaderSpec, Hoist, NodeData, NodeId,
    NodeType, OpAttr, ParseNode, Parser, Piece, Policy, TagData, Token, TokenMatch, ValueData,
};
use crate::interpolation;
use crate::machine::{self, BlockKind};
use crate::options::HtmlOptions;

pub const ROOT: NodeId = 0;
pub const EXPRESSION: NodeId = 1;
pub const STRING: NodeId = 2;
pub const DOCTYPE: NodeId = 3;
pub const COMMENT: NodeId = 4;
pub const CDATA: NodeId = 5;
pub const TAG: NodeId = 6;
pub const INNER: NodeId = 7;
pub const OP_ATTR: NodeId = 8;
pub const BOUND_ATTR: NodeId = 9;
pub const ATTR: NodeId = 10;
pub const QUOTED_VALUE: NodeId = 11;
pub const BARE_VALUE: NodeId = 12;

/// Assemble the HTML-dialect grammar for the given options.
pub fn grammar(opts: &HtmlOptions) -> Result<Grammar> {
    let mut root = NodeType::new("document", Token::lit(""), None);
    root.eof_closes = true;
    root.recognizes = vec![DOCTYPE, COMMENT, TAG, EXPRESSION];

    let expression =
        interpolation::expression_node(&opts.delimiters.0, &opts.delimiters.1, STRING);
    let string = interpolation::string_node()?;

    let doctype = NodeType::new("doctype", Token::lit("<!DOCTYPE "), Some(Token::lit(">")));

    let mut comment = NodeType::new("comment", Token::lit("<!--"), Some(Token::lit("-->")));
    comment.recognizes = vec![EXPRESSION];

    let mut cdata = NodeType::new("cdata", Token::lit("<![CDATA["), Some(Token::lit("]]>")));
    cdata.recognizes = vec![EXPRESSION];

    let mut tag = NodeType::new(
        "tag",
        Token::re(r"^\s*<(?P<tag>[A-Za-z][\w:.\-]*)")?,
        Some(Token::re(r"^(?:/>|</(?P<endtag>[\w:.\-]+)\s*>)")?),
    );
    tag.recognizes = vec![INNER, OP_ATTR, BOUND_ATTR, ATTR];
    tag.clear_after = vec![INNER];
    tag.hoists = vec![Hoist {
        child: OP_ATTR,
        apply: hoist_operation,
    }];
    tag.open = tag_open;
    tag.setup = Some(tag_setup);
    tag.before_child = Some(tag_before_child);
    tag.close = Some(tag_close);

    let mut inner = NodeType::new("inner", Token::lit(">"), Some(Token::lit("</")));
    inner.end_policy = Policy::Eject;
    inner.eof_closes = true;
    inner.recognizes = vec![COMMENT, CDATA, TAG, EXPRESSION];

    // the leading whitespace is part of the token so no trace of the
    // operator is left in the output
    let operator_prefix = regex::escape(&opts.operator_prefix);
    let mut op_attr = NodeType::new(
        "operator",
        Token::re(&format!(r"^\s+{operator_prefix}(?P<key>[\w:.\-]+)"))?,
        Some(Token::re(r"^[\s/>]")?),
    );
    op_attr.start_policy = Policy::Omit;
    op_attr.end_policy = Policy::Eject;
    op_attr.eof_closes = true;
    op_attr.recognizes = vec![QUOTED_VALUE];
    op_attr.pops_after = vec![QUOTED_VALUE];
    op_attr.hoists = vec![Hoist {
        child: QUOTED_VALUE,
        apply: hoist_value,
    }];
    op_attr.open = operator_open;
    op_attr.close = Some(operator_close);

    let bound_prefix = regex::escape(&opts.bound_prefix);
    let mut bound_attr = NodeType::new(
        "bound-attribute",
        Token::re(&format!(r"^\s+{bound_prefix}(?P<key>[\w:.\-]+)"))?,
        Some(Token::re(r"^[\s/>]")?),
    );
    bound_attr.start_policy = Policy::Omit;
    bound_attr.end_policy = Policy::Eject;
    bound_attr.eof_closes = true;
    bound_attr.recognizes = vec![QUOTED_VALUE];
    bound_attr.pops_after = vec![QUOTED_VALUE];
    bound_attr.hoists = vec![Hoist {
        child: QUOTED_VALUE,
        apply: hoist_value,
    }];
    bound_attr.open = bound_open;
    bound_attr.close = Some(bound_close);

    let mut attr = NodeType::new(
        "attribute",
        Token::re(r"^(?P<key>[A-Za-z][\w:.\-]*)")?,
        Some(Token::re(r"^[\s/>]")?),
    );
    attr.start_policy = Policy::Omit;
    attr.end_policy = Policy::Eject;
    attr.eof_closes = true;
    attr.recognizes = vec![QUOTED_VALUE, BARE_VALUE];
    attr.pops_after = vec![QUOTED_VALUE, BARE_VALUE];
    attr.hoists = vec![
        Hoist {
            child: QUOTED_VALUE,
            apply: hoist_value,
        },
        Hoist {
            child: BARE_VALUE,
            apply: hoist_value,
        },
    ];
    attr.open = attr_open;

    let mut quoted_value = NodeType::new(
        "value",
        Token::re(r#"^=(?P<quote>["'`])"#)?,
        None,
    );
    quoted_value.start_policy = Policy::Omit;
    quoted_value.end_escape = true;
    quoted_value.open = value_open;
    quoted_value.setup = Some(value_setup);
    quoted_value.close = Some(quoted_value_close);

    let mut bare_value = NodeType::new(
        "bare-value",
        Token::re(r"^=(?P<val>\w+)")?,
        Some(Token::re(r"^[\s/>]")?),
    );
    bare_value.start_policy = Policy::Omit;
    bare_value.end_policy = Policy::Eject;
    bare_value.eof_closes = true;
    bare_value.open = bare_value_open;

    Ok(Grammar {
        types: vec![
            root,
            expression,
            string,
            doctype,
            comment,
            cdata,
            tag,
            inner,
            op_attr,
            bound_attr,
            attr,
            quoted_value,
            bare_value,
        ],
        root: ROOT,
        opts: GrammarOpts {
            open_delim: opts.delimiters.0.clone(),
            close_delim: opts.delimiters.1.clone(),
            void_tags: opts.void_tags.iter().map(|t| t.to_lowercase()).collect(),
            text_tags: opts.text_tags.iter().map(|t| t.to_lowercase()).collect(),
            operator_prefix: opts.operator_prefix.clone(),
        },
    })
}

fn tag_open(p: &mut Parser<'_, '_>, tm: &TokenMatch) -> Result<NodeData> {
    let name = tm.group_text("tag").unwrap_or_default().to_owned();
    let lower = name.to_lowercase();
    let opts = &p.grammar().opts;
    let is_void = opts.void_tags.iter().any(|t| *t == lower);
    let is_text = opts.text_tags.iter().any(|t| *t == lower);
    Ok(NodeData::Tag(TagData {
        name,
        is_void,
        is_text,
        ..TagData::default()
    }))
}

fn tag_setup(_: &mut Parser<'_, '_>, frame: &mut Frame) -> Result<()> {
    let NodeData::Tag(tag) = &frame.data else {
        return Ok(());
    };
    if tag.is_void {
        frame.recognizes.retain(|id| *id != INNER);
        frame.end_override = Some((Token::re(r"^\s*/?>")?, Policy::Keep));
    } else if tag.is_text {
        let pattern = format!(r"^</(?P<endtag>{})\s*>", regex::escape(&tag.name));
        frame.end_override = Some((Token::re(&pattern)?, Policy::Keep));
    }
    Ok(())
}

/// Opaque text tags take their whole body as one literal run up to the
/// exact closing tag, bypassing nested markup recognition.
fn tag_before_child(p: &mut Parser<'_, '_>, child: &mut Frame) -> Result<()> {
    if child.ty != INNER {
        return Ok(());
    }
    let text_tag = match p.top_frame() {
        Some(parent) => match &parent.data {
            NodeData::Tag(tag) if tag.is_text => Some(tag.name.clone()),
            _ => None,
        },
        None => None,
    };
    if let Some(name) = text_tag {
        child.recognizes.clear();
        let pattern = format!(r"^</{}\s*>", regex::escape(&name));
        child.end_override = Some((Token::re(&pattern)?, Policy::Eject));
        if let Some(parent) = p.top_frame_mut() {
            parent.absorbs.push(INNER);
        }
    }
    Ok(())
}

fn tag_close(
    p: &mut Parser<'_, '_>,
    frame: &mut Frame,
    end: Option<&TokenMatch>,
) -> Result<()> {
    let tag_name = match &frame.data {
        NodeData::Tag(tag) => tag.name.clone(),
        _ => return Ok(()),
    };
    let location = frame.location;
    let Some(tm) = end else {
        return Err(p.err_block(
            location.line,
            location,
            format!("Missing closing tag for <{tag_name}>."),
        ));
    };
    let end_name = tm.group_text("endtag").map(str::to_owned);

    let (ops, is_void) = match &frame.data {
        NodeData::Tag(tag) => (tag.ops.clone(), tag.is_void),
        _ => (Vec::new(), false),
    };
    let mut headers = Vec::new();
    let mut chain = None;
    if !ops.is_empty() {
        let ordered = order_operations(p, &ops, &tag_name, location)?;
        let outer = machine::descriptor(ordered[0].kind);
        if !outer.opening {
            suppress_predecessor(p, outer.kind, outer.overtakes, &tag_name, location)?;
        }
        chain = Some(ordered[0].kind);
        headers = ordered
            .iter()
            .map(|o| HeaderSpec {
                kind: o.kind,
                expr: o.value.clone(),
                location: o.location,
            })
            .collect();
    }

    if !is_void {
        if let Some(end_name) = &end_name {
            if *end_name != tag_name {
                return Err(p.err_block(
                    location.line,
                    location,
                    format!(
                        "Open tag <{tag_name}> and closing tag </{end_name}> must be equal."
                    ),
                ));
            }
        }
    }

    if let NodeData::Tag(tag) = &mut frame.data {
        tag.end_name = end_name;
        tag.headers = headers;
        tag.chain = chain;
    }
    Ok(())
}

/// Validate an operator pair and produce the emission order: `for`
/// outermost, except that an overtaking conditional must stay outermost
/// to merge with the preceding chain.
fn order_operations(
    p: &Parser<'_, '_>,
    ops: &[OpAttr],
    tag_name: &str,
    location: Location,
) -> Result<Vec<OpAttr>> {
    let caret = Some(tag_name.len() + 1);
    if ops.len() > 2 {
        let list = ops
            .iter()
            .map(|o| o.kind.operator())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(p.err_at(
            location,
            caret,
            format!("Too many block operations \"{list}\"."),
        ));
    }
    let mut ordered = ops.to_vec();
    if ordered.len() == 2 {
        let a = machine::descriptor(ordered[0].kind);
        let b = machine::descriptor(ordered[1].kind);
        if !a.compatible.contains(&b.kind) || !b.compatible.contains(&a.kind) {
            return Err(p.err_at(
                location,
                caret,
                format!(
                    "Block operation \"{}\" is not compatible with \"{}\".",
                    a.kind.operator(),
                    b.kind.operator()
                ),
            ));
        }
        ordered.sort_by_key(|o| if o.kind == BlockKind::For { 0 } else { 1 });
        if !machine::descriptor(ordered[1].kind).opening {
            ordered.reverse();
        }
    }
    Ok(ordered)
}

/// An overtaking operator continues the nearest preceding sibling tag
/// (skipping whitespace-only text) that carries an unclosed compatible
/// operation; its final CloseBlock is suppressed so the two native
/// bodies chain into one construct.
fn suppress_predecessor(
    p: &mut Parser<'_, '_>,
    kind: BlockKind,
    overtakes: &[BlockKind],
    tag_name: &str,
    location: Location,
) -> Result<()> {
    let found = match p.top_frame_mut() {
        Some(parent) if parent.buf.trim().is_empty() => {
            let mut found = false;
            for piece in parent.content.iter_mut().rev() {
                match piece {
                    Piece::Text(t) if t.trim().is_empty() => continue,
                    Piece::Node(node) => {
                        if let NodeData::Tag(prev) = &mut node.data {
                            if prev.chain.is_some_and(|k| overtakes.contains(&k)) {
                                prev.close_suppressed = true;
                                found = true;
                            }
                        }
                        break;
                    }
                    Piece::Text(_) => break,
                }
            }
            found
        }
        _ => false,
    };
    if !found {
        return Err(p.err_at(
            location,
            Some(tag_name.len() + 1),
            format!("Unexpected block operation \"{}\".", kind.operator()),
        ));
    }
    Ok(())
}

fn hoist_operation(data: &mut NodeData, child: &ParseNode) {
    if let NodeData::Tag(tag) = data {
        if let NodeData::Attr(attr) = &child.data {
            if let Some(descr) = machine::html_descriptor(&attr.key) {
                tag.ops.push(OpAttr {
                    kind: descr.kind,
                    value: attr.value.clone(),
                    location: child.location,
                });
            }
        }
    }
}

fn hoist_value(data: &mut NodeData, child: &ParseNode) {
    if let NodeData::Attr(attr) = data {
        if let NodeData::Value(value) = &child.data {
            attr.value = Some(value.text.clone());
            attr.quote = value.quote;
        }
    }
}

fn attr_data(tm: &TokenMatch, role: AttrRole) -> NodeData {
    NodeData::Attr(AttrData {
        key: tm.group_text("key").unwrap_or_default().to_owned(),
        value: None,
        quote: None,
        role,
    })
}

fn attr_open(_: &mut Parser<'_, '_>, tm: &TokenMatch) -> Result<NodeData> {
    Ok(attr_data(tm, AttrRole::Plain))
}

fn bound_open(_: &mut Parser<'_, '_>, tm: &TokenMatch) -> Result<NodeData> {
    Ok(attr_data(tm, AttrRole::Bound))
}

fn operator_open(_: &mut Parser<'_, '_>, tm: &TokenMatch) -> Result<NodeData> {
    Ok(attr_data(tm, AttrRole::Operator))
}

fn operator_close(
    p: &mut Parser<'_, '_>,
    frame: &mut Frame,
    _end: Option<&TokenMatch>,
) -> Result<()> {
    let NodeData::Attr(attr) = &frame.data else {
        return Ok(());
    };
    let Some(descr) = machine::html_descriptor(&attr.key) else {
        return Err(p.err_at(
            frame.location,
            Some(attr.key.len()),
            format!("Unknown block operation \"{}\".", attr.key),
        ));
    };
    let value = attr.value.as_deref().map(str::trim).filter(|v| !v.is_empty());
    if descr.expr_required && value.is_none() {
        return Err(p.err_at(
            frame.location,
            Some(attr.key.len()),
            format!("Expression required for \"{}\" operation.", attr.key),
        ));
    }
    if !descr.expr_required && attr.value.is_some() {
        return Err(p.err_at(
            frame.location,
            Some(attr.key.len()),
            format!("Unexpected expression for \"{}\" operation.", attr.key),
        ));
    }
    if let Some(value) = value {
        let precheck = match descr.kind {
            BlockKind::For => expr::parse_for_header(value).map(|_| ()),
            _ => expr::parse(value).map(|_| ()),
        };
        if let Err(e) = precheck {
            return Err(p.err_expr(
                frame.location,
                Some(attr.key.len()),
                format!("Invalid expression: {}", e.message),
            ));
        }
    }
    Ok(())
}

fn bound_close(
    p: &mut Parser<'_, '_>,
    frame: &mut Frame,
    _end: Option<&TokenMatch>,
) -> Result<()> {
    let NodeData::Attr(attr) = &frame.data else {
        return Ok(());
    };
    if let Some(value) = &attr.value {
        if let Err(e) = expr::parse(value) {
            return Err(p.err_expr(
                frame.location,
                Some(attr.key.len()),
                format!("Invalid expression: {}", e.message),
            ));
        }
    }
    Ok(())
}

fn value_open(_: &mut Parser<'_, '_>, tm: &TokenMatch) -> Result<NodeData> {
    let quote = tm
        .group_text("quote")
        .and_then(|s| s.chars().next())
        .unwrap_or('"');
    Ok(NodeData::Value(ValueData {
        text: String::new(),
        quote: Some(quote),
    }))
}

fn value_setup(_: &mut Parser<'_, '_>, frame: &mut Frame) -> Result<()> {
    if let NodeData::Value(value) = &frame.data {
        if let Some(quote) = value.quote {
            frame.end_override = Some((Token::Lit(quote.to_string()), Policy::Omit));
        }
    }
    Ok(())
}

fn quoted_value_close(
    p: &mut Parser<'_, '_>,
    frame: &mut Frame,
    end: Option<&TokenMatch>,
) -> Result<()> {
    if end.is_none() {
        return Err(p.err_at(frame.location, Some(1), "Unclosed attribute value"));
    }
    let mut text = String::new();
    for piece in &frame.content {
        if let Piece::Text(t) = piece {
            text.push_str(t);
        }
    }
    if let NodeData::Value(value) = &mut frame.data {
        value.text = text;
    }
    Ok(())
}

fn bare_value_open(_: &mut Parser<'_, '_>, tm: &TokenMatch) -> Result<NodeData> {
    Ok(NodeData::Value(ValueData {
        text: tm.group_text("val").unwrap_or_default().to_owned(),
        quote: None,
    }))
}
