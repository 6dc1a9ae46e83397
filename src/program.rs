//! The emission program: the durable compiled artifact, and the
//! instruction-walking evaluator that renders it against a scope.
//!
//! A program is a pure function of (document text, option set); it is
//! immutable and may be rendered concurrently with different scopes.

use crate::diagnostics::{self, SourceDocument};
use crate::error::{Diagnostic, KakikaeError, Location, Result};
use crate::expr::{self, IterMode};
use crate::scope::Scope;
use crate::value::Value;

/// Native block header carried by an `OpenBlock` instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockHeader {
    If(usize),
    ElseIf(usize),
    Else,
    For(usize),
}

/// One instruction of the emission program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instr {
    Literal(String),
    Interpolate(usize),
    InterpolateAttr {
        name: String,
        expr: usize,
        quote: char,
    },
    OpenBlock(BlockHeader),
    CloseBlock,
}

#[derive(Debug, Clone)]
pub struct ExprEntry {
    pub text: String,
    pub location: Location,
    pub ast: expr::Expr,
}

#[derive(Debug, Clone)]
pub struct ForEntry {
    pub text: String,
    pub location: Location,
    pub header: expr::ForHeader,
}

/// Unassembled program pieces; segments of a mixed-dialect document are
/// merged at this stage before linking.
#[derive(Debug, Default)]
pub struct Parts {
    pub instrs: Vec<Instr>,
    pub lines: Vec<usize>,
    pub exprs: Vec<ExprEntry>,
    pub fors: Vec<ForEntry>,
}

impl Parts {
    pub fn merge(&mut self, other: Parts) {
        let expr_offset = self.exprs.len();
        let for_offset = self.fors.len();
        for instr in other.instrs {
            self.instrs.push(match instr {
                Instr::Interpolate(id) => Instr::Interpolate(id + expr_offset),
                Instr::InterpolateAttr { name, expr, quote } => Instr::InterpolateAttr {
                    name,
                    expr: expr + expr_offset,
                    quote,
                },
                Instr::OpenBlock(BlockHeader::If(id)) => {
                    Instr::OpenBlock(BlockHeader::If(id + expr_offset))
                }
                Instr::OpenBlock(BlockHeader::ElseIf(id)) => {
                    Instr::OpenBlock(BlockHeader::ElseIf(id + expr_offset))
                }
                Instr::OpenBlock(BlockHeader::For(id)) => {
                    Instr::OpenBlock(BlockHeader::For(id + for_offset))
                }
                other => other,
            });
        }
        self.lines.extend(other.lines);
        self.exprs.extend(other.exprs);
        self.fors.extend(other.fors);
    }
}

#[derive(Debug, Clone)]
enum Step {
    Literal(String),
    Interpolate(usize),
    InterpolateAttr {
        name: String,
        expr: usize,
        quote: char,
    },
    Cond {
        arms: Vec<Arm>,
    },
    Loop {
        header: usize,
        body: Vec<Step>,
    },
}

#[derive(Debug, Clone)]
struct Arm {
    cond: Option<usize>,
    body: Vec<Step>,
}

enum Builder {
    Chain { arms: Vec<Arm>, closed: bool },
    Loop { header: usize, body: Vec<Step>, closed: bool },
}

/// The compiled, cacheable artifact produced once per (document,
/// options) pair.
#[derive(Debug, Clone)]
pub struct Program {
    source_name: Option<String>,
    source: SourceDocument,
    instrs: Vec<Instr>,
    lines: Vec<usize>,
    exprs: Vec<ExprEntry>,
    fors: Vec<ForEntry>,
    steps: Vec<Step>,
}

impl Program {
    pub(crate) fn assemble(doc: &SourceDocument, parts: Parts) -> Result<Self> {
        let steps = link(&parts.instrs).map_err(|message| {
            KakikaeError::Grammar(Diagnostic::new(
                format!("internal error: {message}"),
                Location::new(1, 1),
            ))
        })?;
        Ok(Self {
            source_name: doc.name.clone(),
            source: doc.clone(),
            instrs: parts.instrs,
            lines: parts.lines,
            exprs: parts.exprs,
            fors: parts.fors,
            steps,
        })
    }

    /// A program that reproduces the source verbatim for every scope.
    pub(crate) fn verbatim(doc: &SourceDocument) -> Self {
        let text = doc.text.clone();
        Self {
            source_name: doc.name.clone(),
            source: doc.clone(),
            instrs: vec![Instr::Literal(text.clone())],
            lines: vec![1],
            exprs: Vec::new(),
            fors: Vec::new(),
            steps: vec![Step::Literal(text)],
        }
    }

    pub fn source_name(&self) -> Option<&str> {
        self.source_name.as_deref()
    }

    pub fn instructions(&self) -> &[Instr] {
        &self.instrs
    }

    /// Render against a scope. The scope must be a JSON object; lookups
    /// are read-only. No partial output is returned on failure.
    pub fn render(&self, data: &serde_json::Value) -> Result<String> {
        let root = Value::from_json(data);
        let mut scope = Scope::new(root)
            .map_err(|message| self.eval_err(Location::new(1, 1), message))?;
        let mut out = String::new();
        self.exec(&self.steps, &mut scope, &mut out)?;
        tracing::trace!(bytes = out.len(), source = ?self.source_name, "render finished");
        Ok(out)
    }

    /// The program as a callable bound to one scope per invocation.
    pub fn callable(&self) -> impl Fn(&serde_json::Value) -> Result<String> + '_ {
        move |data| self.render(data)
    }

    /// The generated program as inspectable text.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (i, instr) in self.instrs.iter().enumerate() {
            let line = self.lines.get(i).copied().unwrap_or(0);
            let text = match instr {
                Instr::Literal(t) => format!("LITERAL {:?}", preview(t)),
                Instr::Interpolate(id) => {
                    format!("INTERPOLATE ({})", self.exprs[*id].text.trim())
                }
                Instr::InterpolateAttr { name, expr, .. } => {
                    format!("ATTR {} ({})", name, self.exprs[*expr].text.trim())
                }
                Instr::OpenBlock(header) => format!("OPEN {}", self.header_text(header)),
                Instr::CloseBlock => "CLOSE }".to_owned(),
            };
            out.push_str(&format!("{i:>4} [{line:>3}] {text}\n"));
        }
        out
    }

    fn header_text(&self, header: &BlockHeader) -> String {
        match header {
            BlockHeader::If(id) => format!("if ({}) {{", self.exprs[*id].text.trim()),
            BlockHeader::ElseIf(id) => {
                format!("}} else if ({}) {{", self.exprs[*id].text.trim())
            }
            BlockHeader::Else => "} else {".to_owned(),
            BlockHeader::For(id) => format!("for ({}) {{", self.fors[*id].text.trim()),
        }
    }

    fn eval_err(&self, location: Location, message: String) -> KakikaeError {
        let frame = diagnostics::caret_frame(
            &self.source,
            location.line,
            Some(location.column),
            None,
        );
        KakikaeError::Evaluation(
            Diagnostic::new(message, location)
                .with_source(self.source_name.as_deref())
                .with_frame(frame),
        )
    }

    fn eval_expr(&self, id: usize, scope: &Scope) -> Result<Value> {
        let entry = &self.exprs[id];
        expr::eval(&entry.ast, scope).map_err(|message| self.eval_err(entry.location, message))
    }

    fn exec(&self, steps: &[Step], scope: &mut Scope, out: &mut String) -> Result<()> {
        for step in steps {
            match step {
                Step::Literal(text) => out.push_str(text),
                Step::Interpolate(id) => {
                    let value = self.eval_expr(*id, scope)?;
                    let text = value
                        .stringify()
                        .map_err(|m| self.eval_err(self.exprs[*id].location, m))?;
                    out.push_str(&text);
                }
                Step::InterpolateAttr { name, expr, quote } => {
                    // boolean values keep attribute semantics: bare name
                    // when true, nothing at all when false
                    let value = self.eval_expr(*expr, scope)?;
                    match value {
                        Value::Bool(true) => {
                            out.push(' ');
                            out.push_str(name);
                        }
                        Value::Bool(false) => {}
                        other => {
                            let text = other
                                .stringify()
                                .map_err(|m| self.eval_err(self.exprs[*expr].location, m))?;
                            out.push(' ');
                            out.push_str(name);
                            out.push('=');
                            out.push(*quote);
                            out.push_str(&crate::codegen::escape_quote(&text, *quote));
                            out.push(*quote);
                        }
                    }
                }
                Step::Cond { arms } => {
                    for arm in arms {
                        let taken = match arm.cond {
                            Some(id) => self.eval_expr(id, scope)?.is_truthy(),
                            None => true,
                        };
                        if taken {
                            self.exec(&arm.body, scope, out)?;
                            break;
                        }
                    }
                }
                Step::Loop { header, body } => self.exec_loop(*header, body, scope, out)?,
            }
        }
        Ok(())
    }

    fn exec_loop(
        &self,
        header: usize,
        body: &[Step],
        scope: &mut Scope,
        out: &mut String,
    ) -> Result<()> {
        let entry = &self.fors[header];
        let iterable = expr::eval(&entry.header.iterable, scope)
            .map_err(|m| self.eval_err(entry.location, m))?;
        let items: Vec<Value> = match (entry.header.mode, iterable) {
            (IterMode::Of, Value::Array(items)) => items,
            (IterMode::In, Value::Object(map)) => {
                map.keys().map(|k| Value::String(k.clone())).collect()
            }
            (IterMode::In, Value::Array(items)) => {
                (0..items.len() as i64).map(Value::Int).collect()
            }
            (_, other) => {
                return Err(self.eval_err(
                    entry.location,
                    format!("cannot iterate a {}", other.type_name()),
                ));
            }
        };
        for (position, item) in items.into_iter().enumerate() {
            scope.push(expr::loop_bindings(&entry.header, item, position));
            let result = self.exec(body, scope, out);
            scope.pop();
            result?;
        }
        Ok(())
    }
}

fn preview(text: &str) -> String {
    if text.len() > 40 {
        let cut: String = text.chars().take(40).collect();
        format!("{cut}\u{2026}")
    } else {
        text.to_owned()
    }
}

fn current_body<'a>(stack: &'a mut Vec<Builder>, root: &'a mut Vec<Step>) -> &'a mut Vec<Step> {
    match stack.last_mut() {
        Some(Builder::Chain { arms, .. }) => match arms.last_mut() {
            Some(arm) => &mut arm.body,
            None => root,
        },
        Some(Builder::Loop { body, .. }) => body,
        None => root,
    }
}

fn finalize_one(stack: &mut Vec<Builder>, root: &mut Vec<Step>) -> std::result::Result<(), String> {
    let top = match stack.pop() {
        Some(top) => top,
        None => return Err("close without open".to_owned()),
    };
    let step = match top {
        Builder::Chain { arms, .. } => Step::Cond { arms },
        Builder::Loop { header, body, .. } => Step::Loop { header, body },
    };
    current_body(stack, root).push(step);
    Ok(())
}

fn finalize_closed(
    stack: &mut Vec<Builder>,
    root: &mut Vec<Step>,
) -> std::result::Result<(), String> {
    loop {
        let done = match stack.last() {
            Some(Builder::Chain { closed, .. }) | Some(Builder::Loop { closed, .. }) => !closed,
            None => true,
        };
        if done {
            return Ok(());
        }
        finalize_one(stack, root)?;
    }
}

/// Link the flat instruction list into the executable step tree:
/// ELSE IF / ELSE arms reopen the conditional their preceding
/// `CloseBlock` sealed, everything else nests by open/close pairing.
fn link(instrs: &[Instr]) -> std::result::Result<Vec<Step>, String> {
    let mut root: Vec<Step> = Vec::new();
    let mut stack: Vec<Builder> = Vec::new();
    for instr in instrs {
        match instr {
            Instr::OpenBlock(BlockHeader::If(id)) => {
                finalize_closed(&mut stack, &mut root)?;
                stack.push(Builder::Chain {
                    arms: vec![Arm {
                        cond: Some(*id),
                        body: Vec::new(),
                    }],
                    closed: false,
                });
            }
            Instr::OpenBlock(BlockHeader::For(id)) => {
                finalize_closed(&mut stack, &mut root)?;
                stack.push(Builder::Loop {
                    header: *id,
                    body: Vec::new(),
                    closed: false,
                });
            }
            Instr::OpenBlock(BlockHeader::ElseIf(id)) => match stack.last_mut() {
                Some(Builder::Chain { arms, closed }) if *closed => {
                    arms.push(Arm {
                        cond: Some(*id),
                        body: Vec::new(),
                    });
                    *closed = false;
                }
                _ => return Err("else-if without a sealed conditional".to_owned()),
            },
            Instr::OpenBlock(BlockHeader::Else) => match stack.last_mut() {
                Some(Builder::Chain { arms, closed }) if *closed => {
                    arms.push(Arm {
                        cond: None,
                        body: Vec::new(),
                    });
                    *closed = false;
                }
                _ => return Err("else without a sealed conditional".to_owned()),
            },
            Instr::CloseBlock => {
                finalize_closed(&mut stack, &mut root)?;
                match stack.last_mut() {
                    Some(Builder::Chain { closed, .. }) | Some(Builder::Loop { closed, .. }) => {
                        *closed = true;
                    }
                    None => return Err("close without open".to_owned()),
                }
            }
            Instr::Literal(text) => {
                finalize_closed(&mut stack, &mut root)?;
                current_body(&mut stack, &mut root).push(Step::Literal(text.clone()));
            }
            Instr::Interpolate(id) => {
                finalize_closed(&mut stack, &mut root)?;
                current_body(&mut stack, &mut root).push(Step::Interpolate(*id));
            }
            Instr::InterpolateAttr { name, expr, quote } => {
                finalize_closed(&mut stack, &mut root)?;
                current_body(&mut stack, &mut root).push(Step::InterpolateAttr {
                    name: name.clone(),
                    expr: *expr,
                    quote: *quote,
                });
            }
        }
    }
    loop {
        match stack.last() {
            None => break,
            Some(Builder::Chain { closed, .. }) | Some(Builder::Loop { closed, .. }) => {
                if !closed {
                    return Err("unclosed block at end of program".to_owned());
                }
                finalize_one(&mut stack, &mut root)?;
            }
        }
    }
    Ok(root)
}
