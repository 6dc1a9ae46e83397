//! The text dialect: block directives and reveal lines carried in
//! comment lines, interpolation everywhere else.

use crate::error::Result;
use crate::expr;
use crate::grammar::{
    BlockData, Frame, Grammar, GrammarOpts, NodeData, NodeId, NodeType, Parser, Policy, Token,
    TokenMatch,
};
use crate::interpolation;
use crate::machine;
use crate::options::TextOptions;

pub const ROOT: NodeId = 0;
pub const EXPRESSION: NodeId = 1;
pub const STRING: NodeId = 2;
pub const BLOCK: NodeId = 3;
pub const REVEAL: NodeId = 4;
pub const INSTRUCTION: NodeId = 5;

/// Instruction names recognized in the text dialect.
pub const INSTRUCTIONS: &[&str] = &["no-interpolate-next-line", "no-interpolate-file", "no-rewrite"];

pub(crate) fn comment_alternation(prefixes: &[String]) -> String {
    let escaped: Vec<String> = prefixes.iter().map(|p| regex::escape(p)).collect();
    format!("(?:{})", escaped.join("|"))
}

/// Assemble the text-dialect grammar for the given options.
pub fn grammar(opts: &TextOptions) -> Result<Grammar> {
    let comment = comment_alternation(&opts.comment_prefixes);
    let sign = regex::escape(&opts.block_sign);
    let reveal_sign = regex::escape(&opts.reveal_sign);
    let instruction_sign = regex::escape(&opts.instruction_sign);

    let mut root = NodeType::new("document", Token::lit(""), None);
    root.eof_closes = true;
    root.recognizes = vec![INSTRUCTION, BLOCK, REVEAL, EXPRESSION];

    let expression =
        interpolation::expression_node(&opts.delimiters.0, &opts.delimiters.1, STRING);
    let string = interpolation::string_node()?;

    let mut block = NodeType::new(
        "block",
        Token::re(&format!(
            r"^[ \t]*{comment}{sign}[ \t]*(?P<kw>[A-Za-z]+(?:[ \t]+[A-Za-z]+)*)[ \t]*(?P<expr>\(.*\))?(?P<rest>[^\n]*)\n?"
        ))?,
        Some(Token::re(&format!(
            r"^[ \t]*{comment}{sign}[ \t]*END[ \t]*(?P<kw>[A-Za-z]*)(?P<rest>[^\n]*)\n?"
        ))?),
    );
    block.start_policy = Policy::Omit;
    block.end_policy = Policy::Omit;
    block.line_start = true;
    block.end_line_start = true;
    block.recognizes = vec![INSTRUCTION, BLOCK, REVEAL, EXPRESSION];
    block.open = block_open;
    block.close = Some(block_close);

    let mut reveal = NodeType::new(
        "reveal",
        Token::re(&format!(r"^[ \t]*{comment}{reveal_sign}"))?,
        Some(Token::lit("\n")),
    );
    reveal.start_policy = Policy::Omit;
    reveal.end_policy = Policy::Keep;
    reveal.line_start = true;
    reveal.eof_closes = true;
    reveal.recognizes = vec![EXPRESSION];
    reveal.open = reveal_open;

    let names = INSTRUCTIONS.join("|");
    let mut instruction = NodeType::new(
        "instruction",
        Token::re(&format!(
            r"^[ \t]*{comment}[ \t]*{instruction_sign}(?i)(?P<name>{names})[ \t]*\r?\n?"
        ))?,
        Some(Token::lit("")),
    );
    instruction.start_policy = Policy::Omit;
    instruction.end_policy = Policy::Omit;
    instruction.line_start = true;
    instruction.eof_closes = true;
    instruction.open = instruction_open;

    Ok(Grammar {
        types: vec![root, expression, string, block, reveal, instruction],
        root: ROOT,
        opts: GrammarOpts {
            open_delim: opts.delimiters.0.clone(),
            close_delim: opts.delimiters.1.clone(),
            ..GrammarOpts::default()
        },
    })
}

fn block_open(p: &mut Parser<'_, '_>, tm: &TokenMatch) -> Result<NodeData> {
    let doc = p.doc();
    let (kw_text, kw_loc, kw_len) = match tm.group("kw") {
        Some(g) => (g.text.clone(), doc.location(g.start), g.len),
        None => (String::new(), tm.location, tm.len),
    };
    let keyword: String = kw_text.chars().filter(|c| !c.is_whitespace()).collect();
    let line = tm.location.line;

    if keyword.starts_with("END") {
        return Err(p.err_at(
            kw_loc,
            Some(kw_len),
            format!("Unexpected end of block at line {line}."),
        ));
    }
    let Some(descr) = machine::text_descriptor(&keyword) else {
        return Err(p.err_at(
            kw_loc,
            Some(kw_len),
            format!("Unrecognized block statement \"{}\".", kw_text.trim()),
        ));
    };
    if let Some(rest) = tm.group("rest") {
        if !rest.text.trim().is_empty() {
            return Err(p.err_at(
                doc.location(rest.start),
                Some(rest.len),
                format!(
                    "Unexpected text \"{}\" in \"{}\" operation.",
                    rest.text.trim(),
                    descr.kind.keyword()
                ),
            ));
        }
    }
    let expr_group = tm.group("expr").cloned();
    if descr.expr_required && expr_group.is_none() {
        return Err(p.err_at(
            kw_loc,
            Some(kw_len),
            format!(
                "Expression required for \"{}\" operation.",
                descr.kind.keyword()
            ),
        ));
    }
    if !descr.expr_required && expr_group.is_some() {
        let g = expr_group.as_ref().map(|g| (g.start, g.len));
        let (start, len) = g.unwrap_or((tm.start, tm.len));
        return Err(p.err_at(
            doc.location(start),
            Some(len),
            format!(
                "Unexpected expression for \"{}\" operation.",
                descr.kind.keyword()
            ),
        ));
    }

    let expr_text = expr_group
        .as_ref()
        .map(|g| g.text[1..g.text.len() - 1].to_owned());
    if let (Some(text), Some(g)) = (&expr_text, &expr_group) {
        let precheck = match descr.kind {
            machine::BlockKind::For => expr::parse_for_header(text).map(|_| ()),
            _ => expr::parse(text).map(|_| ()),
        };
        if let Err(e) = precheck {
            let loc = doc.location(g.start + 1 + e.offset);
            return Err(p.err_expr(loc, None, format!("Invalid expression: {}", e.message)));
        }
    }

    if !descr.opening {
        let continues = matches!(
            p.top_frame(),
            Some(f) if matches!(&f.data, NodeData::Block(b) if descr.overtakes.contains(&b.kind))
        );
        if !continues {
            return Err(p.err_at(
                kw_loc,
                Some(kw_len),
                format!("Unexpected \"{}\" at line {line}.", descr.kind.keyword()),
            ));
        }
        if let Some(frame) = p.top_frame_mut() {
            if let NodeData::Block(b) = &mut frame.data {
                b.overtaken = true;
            }
        }
        p.pop_top_frame()?;
    }

    Ok(NodeData::Block(BlockData {
        kind: descr.kind,
        expr: expr_text,
        closed_by_end: false,
        overtaken: false,
    }))
}

fn block_close(
    p: &mut Parser<'_, '_>,
    frame: &mut Frame,
    end: Option<&TokenMatch>,
) -> Result<()> {
    let NodeData::Block(data) = &mut frame.data else {
        return Ok(());
    };
    let expected = data.kind.closing_keyword();
    let Some(tm) = end else {
        if data.overtaken {
            return Ok(());
        }
        return Err(p.err_block(
            frame.location.line,
            frame.location,
            format!(
                "Missing end of block for line {}. Expected END {expected}.",
                frame.location.line
            ),
        ));
    };
    if let Some(rest) = tm.group("rest") {
        if !rest.text.trim().is_empty() {
            return Err(p.err_at(
                p.doc().location(rest.start),
                Some(rest.len),
                format!("Unexpected text \"{}\" in END operation.", rest.text.trim()),
            ));
        }
    }
    let keyword = tm.group_text("kw").unwrap_or("");
    if keyword != expected {
        let line_len = p.doc().line(tm.location.line).len();
        return Err(p.err_at(
            tm.location,
            Some(line_len.max(1)),
            format!(
                "Wrong closing block statement at line {}. Expected END {expected}.",
                tm.location.line
            ),
        ));
    }
    data.closed_by_end = true;
    Ok(())
}

fn reveal_open(p: &mut Parser<'_, '_>, tm: &TokenMatch) -> Result<NodeData> {
    let inside_block = matches!(
        p.top_frame(),
        Some(f) if matches!(f.data, NodeData::Block(_))
    );
    if !inside_block {
        return Err(p.err_at(
            tm.location,
            Some(tm.len),
            format!("Unexpected reveal expression at line {}.", tm.location.line),
        ));
    }
    Ok(NodeData::Plain)
}

fn instruction_open(_: &mut Parser<'_, '_>, tm: &TokenMatch) -> Result<NodeData> {
    Ok(NodeData::Instruction {
        name: tm.group_text("name").unwrap_or_default().to_lowercase(),
    })
}
