//! The generic tree-builder both dialects are configured on.
//!
//! A grammar is a set of node type descriptors: start/end tokens with
//! per-token consumption policies, escape handling, the child types a
//! node recognizes, absorption and hoisting rules, and a few hooks the
//! dialects use to validate and shape node data. The engine itself
//! knows nothing about directives or tags; it scans the document,
//! matching the innermost open node's end token first and then each
//! recognized child type in declaration order.

use crate::diagnostics::{self, SourceDocument};
use crate::error::{Diagnostic, KakikaeError, Location, Result};
use crate::machine::BlockKind;
use regex::Regex;

pub type NodeId = usize;

/// What happens to a matched delimiter: kept in the node's content,
/// consumed and discarded, or left for the next match attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Keep,
    Omit,
    Eject,
}

#[derive(Debug, Clone)]
pub enum Token {
    Lit(String),
    Re(Regex),
}

impl Token {
    pub fn lit(s: impl Into<String>) -> Self {
        Token::Lit(s.into())
    }

    /// Compile an anchored pattern. Patterns are matched at the cursor,
    /// so they must begin with `^`.
    pub fn re(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Token::Re)
            .map_err(|e| KakikaeError::Options {
                message: e.to_string(),
            })
    }
}

/// A matched token with absolute offsets and its named capture groups.
#[derive(Debug, Clone)]
pub struct TokenMatch {
    pub start: usize,
    pub len: usize,
    pub location: Location,
    groups: Vec<Group>,
}

#[derive(Debug, Clone)]
pub struct Group {
    pub name: String,
    pub text: String,
    pub start: usize,
    pub len: usize,
}

impl TokenMatch {
    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn group_text(&self, name: &str) -> Option<&str> {
        self.group(name).map(|g| g.text.as_str())
    }
}

/// Per-kind custom data, a tagged variant carrying exactly the fields
/// that kind needs.
#[derive(Debug, Clone)]
pub enum NodeData {
    Plain,
    Expression(ExprData),
    Str { quote: char },
    Block(BlockData),
    Instruction { name: String },
    Tag(TagData),
    Attr(AttrData),
    Value(ValueData),
}

#[derive(Debug, Clone)]
pub struct ExprData {
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct BlockData {
    pub kind: BlockKind,
    pub expr: Option<String>,
    /// Set when the block was closed by its END directive rather than
    /// overtaken by an ELSE / ELSE IF sibling.
    pub closed_by_end: bool,
    /// Set on the predecessor when an ELSE / ELSE IF takes over its
    /// frame; its close hook then expects no END token.
    pub overtaken: bool,
}

/// One operator attribute hoisted off an HTML tag.
#[derive(Debug, Clone)]
pub struct OpAttr {
    pub kind: BlockKind,
    pub value: Option<String>,
    pub location: Location,
}

/// A block header the tag contributes to the emission program.
#[derive(Debug, Clone)]
pub struct HeaderSpec {
    pub kind: BlockKind,
    pub expr: Option<String>,
    pub location: Location,
}

#[derive(Debug, Clone, Default)]
pub struct TagData {
    pub name: String,
    pub end_name: Option<String>,
    pub is_void: bool,
    pub is_text: bool,
    pub ops: Vec<OpAttr>,
    pub headers: Vec<HeaderSpec>,
    /// The outermost operation, checked by a following overtaking tag.
    pub chain: Option<BlockKind>,
    /// Set by a following overtaking tag; the final CloseBlock is then
    /// emitted by that tag instead.
    pub close_suppressed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrRole {
    Plain,
    Bound,
    Operator,
}

#[derive(Debug, Clone)]
pub struct AttrData {
    pub key: String,
    pub value: Option<String>,
    pub quote: Option<char>,
    pub role: AttrRole,
}

#[derive(Debug, Clone)]
pub struct ValueData {
    pub text: String,
    pub quote: Option<char>,
}

/// Content of a parse node: literal fragments interleaved with child
/// nodes, exclusively owned by their parent.
#[derive(Debug, Clone)]
pub enum Piece {
    Text(String),
    Node(ParseNode),
}

#[derive(Debug, Clone)]
pub struct ParseNode {
    pub ty: NodeId,
    pub data: NodeData,
    pub content: Vec<Piece>,
    /// Raw span of the whole node in the source, delimiters included.
    pub start: usize,
    pub end: usize,
    pub location: Location,
}

impl ParseNode {
    pub fn raw<'d>(&self, doc: &'d SourceDocument) -> &'d str {
        &doc.text[self.start..self.end]
    }

    /// Printable outline of the tree, one node per line.
    pub fn outline(&self, grammar: &Grammar) -> String {
        let mut out = String::new();
        self.outline_into(grammar, 0, &mut out);
        out
    }

    fn outline_into(&self, grammar: &Grammar, depth: usize, out: &mut String) {
        let indent = "  ".repeat(depth);
        out.push_str(&indent);
        out.push_str(grammar.types[self.ty].name);
        match &self.data {
            NodeData::Expression(e) => out.push_str(&format!(" {{{{ {} }}}}", e.text.trim())),
            NodeData::Block(b) => {
                out.push_str(&format!(" {}", b.kind.keyword()));
                if let Some(expr) = &b.expr {
                    out.push_str(&format!("({expr})"));
                }
            }
            NodeData::Instruction { name } => out.push_str(&format!(" {name}")),
            NodeData::Tag(t) => out.push_str(&format!(" <{}>", t.name)),
            NodeData::Attr(a) => out.push_str(&format!(" {}", a.key)),
            _ => {}
        }
        out.push('\n');
        for piece in &self.content {
            match piece {
                Piece::Text(text) => {
                    let shown: String = text.chars().take(40).collect();
                    out.push_str(&format!("{indent}  {:?}\n", shown));
                }
                Piece::Node(node) => node.outline_into(grammar, depth + 1, out),
            }
        }
    }
}

pub type OpenHook = fn(&mut Parser<'_, '_>, &TokenMatch) -> Result<NodeData>;
pub type SetupHook = fn(&mut Parser<'_, '_>, &mut Frame) -> Result<()>;
pub type BeforeChildHook = fn(&mut Parser<'_, '_>, &mut Frame) -> Result<()>;
pub type CloseHook = fn(&mut Parser<'_, '_>, &mut Frame, Option<&TokenMatch>) -> Result<()>;

/// Copies a popped child's computed value onto the parent's data and
/// drops the child from the content stream.
pub struct Hoist {
    pub child: NodeId,
    pub apply: fn(&mut NodeData, &ParseNode),
}

/// Declarative description of one node type. Never mutated after
/// grammar construction; shared across parses.
pub struct NodeType {
    pub name: &'static str,
    pub start: Token,
    pub end: Option<Token>,
    pub start_policy: Policy,
    pub end_policy: Policy,
    /// An end token preceded by an odd number of backslashes is voided.
    pub end_escape: bool,
    /// The start token only matches at the beginning of a line.
    pub line_start: bool,
    /// The end token only matches at the beginning of a line.
    pub end_line_start: bool,
    /// The node closes silently at end of input instead of erroring.
    pub eof_closes: bool,
    pub recognizes: Vec<NodeId>,
    /// Children whose raw span is folded into this node's literal
    /// content instead of nesting.
    pub absorbs: Vec<NodeId>,
    /// Children whose pop also pops this node.
    pub pops_after: Vec<NodeId>,
    /// Children whose pop stops further child recognition.
    pub clear_after: Vec<NodeId>,
    pub hoists: Vec<Hoist>,
    pub open: OpenHook,
    pub setup: Option<SetupHook>,
    pub before_child: Option<BeforeChildHook>,
    pub close: Option<CloseHook>,
}

pub fn plain_open(_: &mut Parser<'_, '_>, _: &TokenMatch) -> Result<NodeData> {
    Ok(NodeData::Plain)
}

impl NodeType {
    /// A descriptor with keep/keep policies and no rules; builders
    /// override what they need.
    pub fn new(name: &'static str, start: Token, end: Option<Token>) -> Self {
        Self {
            name,
            start,
            end,
            start_policy: Policy::Keep,
            end_policy: Policy::Keep,
            end_escape: false,
            line_start: false,
            end_line_start: false,
            eof_closes: false,
            recognizes: Vec::new(),
            absorbs: Vec::new(),
            pops_after: Vec::new(),
            clear_after: Vec::new(),
            hoists: Vec::new(),
            open: plain_open,
            setup: None,
            before_child: None,
            close: None,
        }
    }
}

pub struct Grammar {
    pub types: Vec<NodeType>,
    pub root: NodeId,
    pub opts: GrammarOpts,
}

/// Option values the hooks consult during a parse.
#[derive(Debug, Clone, Default)]
pub struct GrammarOpts {
    pub open_delim: String,
    pub close_delim: String,
    pub void_tags: Vec<String>,
    pub text_tags: Vec<String>,
    pub operator_prefix: String,
}

/// One entry of the parse stack: a node under construction.
pub struct Frame {
    pub ty: NodeId,
    pub data: NodeData,
    pub content: Vec<Piece>,
    pub buf: String,
    pub recognizes: Vec<NodeId>,
    pub absorbs: Vec<NodeId>,
    pub end_override: Option<(Token, Policy)>,
    pub start: usize,
    pub location: Location,
}

impl Frame {
    fn flush(&mut self) {
        if !self.buf.is_empty() {
            let text = std::mem::take(&mut self.buf);
            self.content.push(Piece::Text(text));
        }
    }

    fn into_node(mut self, end: usize) -> ParseNode {
        self.flush();
        ParseNode {
            ty: self.ty,
            data: self.data,
            content: self.content,
            start: self.start,
            end,
            location: self.location,
        }
    }
}

pub struct Parser<'g, 'd> {
    grammar: &'g Grammar,
    doc: &'d SourceDocument,
    range_end: usize,
    pos: usize,
    stack: Vec<Frame>,
}

impl<'g, 'd> Parser<'g, 'd> {
    /// Parse `range` of the document with the given grammar, producing
    /// the root parse node or the first diagnostic.
    pub fn parse(
        grammar: &'g Grammar,
        doc: &'d SourceDocument,
        range: std::ops::Range<usize>,
    ) -> Result<ParseNode> {
        let root_ty = &grammar.types[grammar.root];
        let mut parser = Parser {
            grammar,
            doc,
            range_end: range.end.min(doc.text.len()),
            pos: range.start,
            stack: Vec::new(),
        };
        parser.stack.push(Frame {
            ty: grammar.root,
            data: NodeData::Plain,
            content: Vec::new(),
            buf: String::new(),
            recognizes: root_ty.recognizes.clone(),
            absorbs: root_ty.absorbs.clone(),
            end_override: None,
            start: range.start,
            location: doc.location(range.start),
        });
        parser.run()?;
        parser.unwind()?;
        match parser.stack.pop() {
            Some(frame) => Ok(frame.into_node(parser.pos)),
            None => Err(parser.internal("parse stack exhausted")),
        }
    }

    pub fn grammar(&self) -> &'g Grammar {
        self.grammar
    }

    pub fn doc(&self) -> &'d SourceDocument {
        self.doc
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn location(&self) -> Location {
        self.doc.location(self.pos)
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn top_frame(&self) -> Option<&Frame> {
        self.stack.last()
    }

    pub fn top_frame_mut(&mut self) -> Option<&mut Frame> {
        self.stack.last_mut()
    }

    /// Pop the innermost open node without consuming an end token. Used
    /// when a non-opening directive overtakes its predecessor.
    pub fn pop_top_frame(&mut self) -> Result<()> {
        self.pop_frame(None)
    }

    /// A grammar violation at an explicit location.
    pub fn err_at(
        &self,
        location: Location,
        len: Option<usize>,
        message: impl Into<String>,
    ) -> KakikaeError {
        KakikaeError::Grammar(self.diagnostic(location, len, message))
    }

    /// A grammar violation spanning multiple lines, rendered in block
    /// mode.
    pub fn err_block(
        &self,
        from_line: usize,
        location: Location,
        message: impl Into<String>,
    ) -> KakikaeError {
        let to_line = self.doc.location(self.pos.min(self.doc.text.len())).line;
        let frame = diagnostics::block_frame(self.doc, from_line, to_line);
        KakikaeError::Grammar(
            Diagnostic::new(message, location)
                .with_source(self.doc.name.as_deref())
                .with_frame(frame),
        )
    }

    /// An expression that failed the standalone syntax pre-check.
    pub fn err_expr(
        &self,
        location: Location,
        len: Option<usize>,
        message: impl Into<String>,
    ) -> KakikaeError {
        KakikaeError::ExpressionSyntax(self.diagnostic(location, len, message))
    }

    fn diagnostic(
        &self,
        location: Location,
        len: Option<usize>,
        message: impl Into<String>,
    ) -> Diagnostic {
        let frame = diagnostics::caret_frame(self.doc, location.line, Some(location.column), len);
        Diagnostic::new(message, location)
            .with_source(self.doc.name.as_deref())
            .with_frame(frame)
    }

    fn internal(&self, message: &str) -> KakikaeError {
        KakikaeError::Grammar(Diagnostic::new(
            format!("internal parser error: {message}"),
            self.doc.location(self.pos.min(self.doc.text.len())),
        ))
    }

    fn run(&mut self) -> Result<()> {
        while self.pos < self.range_end {
            if self.try_end()? {
                continue;
            }
            if self.try_children()? {
                continue;
            }
            self.consume_char();
        }
        Ok(())
    }

    fn consume_char(&mut self) {
        let text = &self.doc.text[self.pos..];
        if let Some(c) = text.chars().next() {
            let top = self.stack.len() - 1;
            self.stack[top].buf.push(c);
            self.pos += c.len_utf8();
        } else {
            self.pos = self.range_end;
        }
    }

    fn current_end(&self) -> Option<(&Token, Policy, bool)> {
        let frame = self.stack.last()?;
        let ty = &self.grammar.types[frame.ty];
        if let Some((token, policy)) = &frame.end_override {
            return Some((token, *policy, ty.end_escape));
        }
        ty.end.as_ref().map(|t| (t, ty.end_policy, ty.end_escape))
    }

    fn try_end(&mut self) -> Result<bool> {
        let Some(frame) = self.stack.last() else {
            return Ok(false);
        };
        if self.grammar.types[frame.ty].end_line_start && !self.at_line_start() {
            return Ok(false);
        }
        let Some((token, policy, escape)) = self.current_end() else {
            return Ok(false);
        };
        let Some(tm) = self.try_match(token) else {
            return Ok(false);
        };
        if escape && self.escaped() {
            return Ok(false);
        }
        self.pop_frame(Some((policy, tm)))?;
        Ok(true)
    }

    fn try_children(&mut self) -> Result<bool> {
        let count = match self.stack.last() {
            Some(frame) => frame.recognizes.len(),
            None => 0,
        };
        for i in 0..count {
            let top = self.stack.len() - 1;
            if i >= self.stack[top].recognizes.len() {
                break;
            }
            let id = self.stack[top].recognizes[i];
            let ty = &self.grammar.types[id];
            if ty.line_start && !self.at_line_start() {
                continue;
            }
            let Some(tm) = self.try_match(&ty.start) else {
                continue;
            };
            if tm.len == 0 {
                continue;
            }
            self.open_child(id, tm)?;
            return Ok(true);
        }
        Ok(false)
    }

    fn at_line_start(&self) -> bool {
        self.pos == 0 || self.doc.text.as_bytes().get(self.pos - 1) == Some(&b'\n')
    }

    fn escaped(&self) -> bool {
        let bytes = self.doc.text.as_bytes();
        let mut n = 0;
        let mut i = self.pos;
        while i > 0 && bytes[i - 1] == b'\\' {
            n += 1;
            i -= 1;
        }
        n % 2 == 1
    }

    fn try_match(&self, token: &Token) -> Option<TokenMatch> {
        let hay = &self.doc.text[self.pos..self.range_end];
        match token {
            Token::Lit(s) => {
                if hay.starts_with(s.as_str()) {
                    Some(TokenMatch {
                        start: self.pos,
                        len: s.len(),
                        location: self.doc.location(self.pos),
                        groups: Vec::new(),
                    })
                } else {
                    None
                }
            }
            Token::Re(re) => {
                let caps = re.captures(hay)?;
                let whole = caps.get(0)?;
                if whole.start() != 0 {
                    return None;
                }
                let groups = re
                    .capture_names()
                    .flatten()
                    .filter_map(|name| {
                        caps.name(name).map(|m| Group {
                            name: name.to_owned(),
                            text: m.as_str().to_owned(),
                            start: self.pos + m.start(),
                            len: m.len(),
                        })
                    })
                    .collect();
                Some(TokenMatch {
                    start: self.pos,
                    len: whole.end(),
                    location: self.doc.location(self.pos),
                    groups,
                })
            }
        }
    }

    fn open_child(&mut self, id: NodeId, tm: TokenMatch) -> Result<()> {
        let g = self.grammar;
        let doc = self.doc;
        let ty = &g.types[id];
        let data = (ty.open)(self, &tm)?;
        let top = self.stack.len() - 1;
        self.stack[top].flush();
        let mut frame = Frame {
            ty: id,
            data,
            content: Vec::new(),
            buf: String::new(),
            recognizes: ty.recognizes.clone(),
            absorbs: ty.absorbs.clone(),
            end_override: None,
            start: self.pos,
            location: tm.location,
        };
        match ty.start_policy {
            Policy::Keep => frame.buf.push_str(&doc.text[self.pos..self.pos + tm.len]),
            Policy::Omit | Policy::Eject => {}
        }
        self.pos += tm.len;
        if let Some(setup) = ty.setup {
            setup(self, &mut frame)?;
        }
        let top = self.stack.len() - 1;
        let parent_ty = self.stack[top].ty;
        if let Some(before) = g.types[parent_ty].before_child {
            before(self, &mut frame)?;
        }
        self.stack.push(frame);
        Ok(())
    }

    fn pop_frame(&mut self, end: Option<(Policy, TokenMatch)>) -> Result<()> {
        let g = self.grammar;
        let doc = self.doc;
        let mut frame = match self.stack.pop() {
            Some(f) => f,
            None => return Err(self.internal("pop on empty stack")),
        };
        if let Some((policy, tm)) = &end {
            match policy {
                Policy::Keep => {
                    frame.buf.push_str(&doc.text[self.pos..self.pos + tm.len]);
                    self.pos += tm.len;
                }
                Policy::Omit => self.pos += tm.len,
                Policy::Eject => {}
            }
        }
        frame.flush();
        if let Some(close) = g.types[frame.ty].close {
            close(self, &mut frame, end.as_ref().map(|(_, tm)| tm))?;
        }
        let node = frame.into_node(self.pos);
        let child_ty = node.ty;
        let Some(parent) = self.stack.last_mut() else {
            return Err(KakikaeError::Grammar(Diagnostic::new(
                "internal parser error: root node closed early",
                node.location,
            )));
        };
        let parent_ty = parent.ty;
        if parent.absorbs.contains(&child_ty) {
            parent.buf.push_str(&doc.text[node.start..node.end]);
        } else if let Some(hoist) = g.types[parent_ty]
            .hoists
            .iter()
            .find(|h| h.child == child_ty)
        {
            (hoist.apply)(&mut parent.data, &node);
        } else {
            parent.flush();
            parent.content.push(Piece::Node(node));
        }
        if g.types[parent_ty].clear_after.contains(&child_ty) {
            if let Some(parent) = self.stack.last_mut() {
                parent.recognizes.clear();
            }
        }
        if g.types[parent_ty].pops_after.contains(&child_ty) {
            self.pop_frame(None)?;
        }
        Ok(())
    }

    /// End of input: nodes flagged as closing at EOF pop silently, any
    /// other open node is a grammar violation reported by its close
    /// hook.
    fn unwind(&mut self) -> Result<()> {
        while self.stack.len() > 1 {
            let top = self.stack.len() - 1;
            let ty = self.stack[top].ty;
            let strict = !self.grammar.types[ty].eof_closes;
            let location = self.stack[top].location;
            let name = self.grammar.types[ty].name;
            self.pop_frame(None)?;
            if strict {
                return Err(self.err_block(
                    location.line,
                    location,
                    format!("Unexpected end of input inside {name}"),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grammar() -> Grammar {
        // a toy grammar: quoted spans absorbed into bracketed groups
        let mut root = NodeType::new("root", Token::lit(""), None);
        root.eof_closes = true;
        root.recognizes = vec![1, 2];

        let mut group = NodeType::new("group", Token::lit("("), Some(Token::lit(")")));
        group.start_policy = Policy::Omit;
        group.end_policy = Policy::Omit;
        group.recognizes = vec![1, 2];

        let mut quoted = NodeType::new("quoted", Token::lit("'"), Some(Token::lit("'")));
        quoted.end_escape = true;

        Grammar {
            types: vec![root, group, quoted],
            root: 0,
            opts: GrammarOpts::default(),
        }
    }

    fn parse(text: &str) -> ParseNode {
        let doc = SourceDocument::new(text, None);
        Parser::parse(&grammar(), &doc, 0..text.len()).unwrap()
    }

    #[test]
    fn test_plain_text_single_piece() {
        let node = parse("hello world");
        assert_eq!(node.content.len(), 1);
        assert!(matches!(&node.content[0], Piece::Text(t) if t == "hello world"));
    }

    #[test]
    fn test_nested_groups() {
        let node = parse("a(b(c)d)e");
        assert_eq!(node.content.len(), 3);
        let Piece::Node(outer) = &node.content[1] else {
            panic!("Expected group node");
        };
        assert_eq!(outer.content.len(), 3);
        assert!(matches!(&outer.content[0], Piece::Text(t) if t == "b"));
        let Piece::Node(inner) = &outer.content[1] else {
            panic!("Expected inner group node");
        };
        assert!(matches!(&inner.content[0], Piece::Text(t) if t == "c"));
    }

    #[test]
    fn test_omit_policy_drops_delimiters() {
        let node = parse("(x)");
        let Piece::Node(group) = &node.content[0] else {
            panic!("Expected group node");
        };
        assert!(matches!(&group.content[0], Piece::Text(t) if t == "x"));
        // the raw span still covers the delimiters
        assert_eq!(group.start, 0);
        assert_eq!(group.end, 3);
    }

    #[test]
    fn test_escaped_end_token_voided() {
        let node = parse(r"'a\'b'");
        let Piece::Node(quoted) = &node.content[0] else {
            panic!("Expected quoted node");
        };
        assert!(matches!(&quoted.content[0], Piece::Text(t) if t == r"a\'b"));
    }

    #[test]
    fn test_unclosed_group_is_an_error() {
        let doc = SourceDocument::new("(open", None);
        let err = Parser::parse(&grammar(), &doc, 0..5).unwrap_err();
        assert!(err.to_string().contains("group"));
    }

    #[test]
    fn test_quote_guards_group_end() {
        let node = parse("(a'b)c')");
        // the quoted span contains the ) so the group ends at the later one
        let Piece::Node(group) = &node.content[0] else {
            panic!("Expected group node");
        };
        assert_eq!(group.end, 8);
    }
}
