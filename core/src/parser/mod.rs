//! PEST-based parser for flow script
//!
//! Produces the AST consumed by the executor, with span information so that
//! runtime positions map back to generated lines.

use pest::iterators::{Pair, Pairs};
use pest::Parser;
use pest_derive::Parser;

use crate::executor::types::ast::{
    BinaryOp, Binding, Declarator, Expr, MemberAccess, Span, Stmt, UnaryOp,
};

#[cfg(test)]
mod tests;

/* ===================== Program ===================== */

/// A parsed program: top-level statements in source order.
#[derive(Debug, Clone)]
pub struct ProgramDef {
    pub body: Vec<Stmt>,
    pub span: Span,
}

/* ===================== PEST Parser ===================== */

#[derive(Parser)]
#[grammar = "parser/flow.pest"]
struct FlowParser;

/// Words the grammar reserves. Kept in sync with the `keyword` rule.
pub const KEYWORDS: &[&str] = &[
    "let", "if", "else", "while", "for", "of", "try", "catch", "break", "continue", "true",
    "false", "null", "undefined",
];

/// A name usable after `.` or as an object key.
pub fn is_identifier_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// A name usable as a variable.
pub fn is_identifier(s: &str) -> bool {
    is_identifier_name(s) && !KEYWORDS.contains(&s)
}

/* ===================== Error Types ===================== */

#[derive(Debug)]
pub enum ParseError {
    PestError(String, Option<Span>),
    BuildError(String, Option<Span>),
}

impl ParseError {
    pub fn span(&self) -> Option<Span> {
        match self {
            ParseError::PestError(_, span) => *span,
            ParseError::BuildError(_, span) => *span,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ParseError::PestError(msg, _) => msg,
            ParseError::BuildError(msg, _) => msg,
        }
    }

    /// 1-based line of the error, when known
    pub fn line(&self) -> Option<usize> {
        self.span().map(|s| s.line())
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ParseError {}

impl From<pest::error::Error<Rule>> for ParseError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        let span = match err.line_col {
            pest::error::LineColLocation::Pos((line, col)) => Some(Span {
                start: 0,
                end: 0,
                start_line: line.saturating_sub(1),
                start_col: col.saturating_sub(1),
                end_line: line.saturating_sub(1),
                end_col: col,
            }),
            pest::error::LineColLocation::Span((start_line, start_col), (end_line, end_col)) => {
                Some(Span {
                    start: 0,
                    end: 0,
                    start_line: start_line.saturating_sub(1),
                    start_col: start_col.saturating_sub(1),
                    end_line: end_line.saturating_sub(1),
                    end_col: end_col.saturating_sub(1),
                })
            }
        };
        ParseError::PestError(err.to_string(), span)
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/* ===================== Span Helpers ===================== */

/// Line start offsets, so spans are computed without rescanning the source.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    /// (line, column), 0-indexed; column counts chars
    fn position(&self, source: &str, offset: usize) -> (usize, usize) {
        let line = match self.starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let start = self.starts[line];
        let col = source.get(start..offset).map_or(0, |s| s.chars().count());
        (line, col)
    }
}

struct Ctx<'s> {
    source: &'s str,
    lines: LineIndex,
}

impl<'s> Ctx<'s> {
    fn span(&self, pair: &Pair<Rule>) -> Span {
        let pest_span = pair.as_span();
        let (start_line, start_col) = self.lines.position(self.source, pest_span.start());
        let (end_line, end_col) = self.lines.position(self.source, pest_span.end());
        Span::new(
            pest_span.start(),
            pest_span.end(),
            start_line,
            start_col,
            end_line,
            end_col,
        )
    }
}

fn next_pair<'i>(pairs: &mut Pairs<'i, Rule>, what: &str, span: Span) -> ParseResult<Pair<'i, Rule>> {
    pairs
        .next()
        .ok_or_else(|| ParseError::BuildError(format!("missing {}", what), Some(span)))
}

/* ===================== Public API ===================== */

/// Parse a program into its top-level statements.
pub fn parse_program(source: &str) -> ParseResult<ProgramDef> {
    let ctx = Ctx {
        source,
        lines: LineIndex::new(source),
    };
    let mut pairs = FlowParser::parse(Rule::program, source)?;
    let program = next_pair(&mut pairs, "program", Span::default())?;
    let span = ctx.span(&program);

    let mut body = Vec::new();
    for pair in program.into_inner() {
        match pair.as_rule() {
            Rule::statement => body.push(build_statement(pair, &ctx)?),
            Rule::EOI => {}
            other => {
                return Err(ParseError::BuildError(
                    format!("unexpected top-level rule {:?}", other),
                    Some(ctx.span(&pair)),
                ))
            }
        }
    }
    Ok(ProgramDef { body, span })
}

/// Parse a single expression (testing and tooling API).
pub fn parse_expression(source: &str) -> ParseResult<Expr> {
    let program = parse_program(&format!("{};", source))?;
    match program.body.into_iter().next() {
        Some(Stmt::Expr { expr, .. }) => Ok(expr),
        _ => Err(ParseError::BuildError(
            "input is not a single expression".to_string(),
            None,
        )),
    }
}

/* ===================== Statements ===================== */

fn build_statement(pair: Pair<Rule>, ctx: &Ctx) -> ParseResult<Stmt> {
    let span = ctx.span(&pair);

    match pair.as_rule() {
        Rule::statement => {
            let inner = next_pair(&mut pair.into_inner(), "statement", span)?;
            build_statement(inner, ctx)
        }
        Rule::block => build_block(pair, ctx),
        Rule::empty_stmt => Ok(Stmt::Empty { span }),
        Rule::if_stmt => build_if(pair, ctx),
        Rule::while_stmt => {
            let mut inner = pair.into_inner();
            let test = build_expression(next_pair(&mut inner, "condition", span)?, ctx)?;
            let body = build_block(next_pair(&mut inner, "loop body", span)?, ctx)?;
            Ok(Stmt::While {
                test,
                body: Box::new(body),
                span,
            })
        }
        Rule::for_stmt => {
            let mut inner = pair.into_inner();
            let binding = next_pair(&mut inner, "loop variable", span)?.as_str().to_string();
            let iterable = build_expression(next_pair(&mut inner, "iterable", span)?, ctx)?;
            let body = build_block(next_pair(&mut inner, "loop body", span)?, ctx)?;
            Ok(Stmt::ForOf {
                binding,
                iterable,
                body: Box::new(body),
                span,
            })
        }
        Rule::try_stmt => {
            let mut inner = pair.into_inner();
            let body = build_block(next_pair(&mut inner, "try body", span)?, ctx)?;
            let catch_var = next_pair(&mut inner, "catch variable", span)?.as_str().to_string();
            let catch_body = build_block(next_pair(&mut inner, "catch body", span)?, ctx)?;
            Ok(Stmt::Try {
                body: Box::new(body),
                catch_var,
                catch_body: Box::new(catch_body),
                span,
            })
        }
        Rule::break_stmt => Ok(Stmt::Break { span }),
        Rule::continue_stmt => Ok(Stmt::Continue { span }),
        Rule::declare_stmt => {
            let mut declarators = Vec::new();
            for declarator in pair.into_inner() {
                let d_span = ctx.span(&declarator);
                let mut inner = declarator.into_inner();
                let name = next_pair(&mut inner, "variable name", d_span)?.as_str().to_string();
                let init = inner.next().map(|e| build_expression(e, ctx)).transpose()?;
                declarators.push(Declarator {
                    name,
                    init,
                    span: d_span,
                });
            }
            Ok(Stmt::Declare { declarators, span })
        }
        Rule::destructure_stmt => {
            let mut bindings = Vec::new();
            let mut value = None;
            for part in pair.into_inner() {
                match part.as_rule() {
                    Rule::binding_list => {
                        for binding in part.into_inner() {
                            bindings.push(build_binding(binding, ctx)?);
                        }
                    }
                    _ => value = Some(build_expression(part, ctx)?),
                }
            }
            let value = value.ok_or_else(|| {
                ParseError::BuildError("destructuring without a value".to_string(), Some(span))
            })?;
            Ok(Stmt::Destructure {
                bindings,
                value,
                span,
            })
        }
        Rule::assign_stmt => {
            let mut inner = pair.into_inner();
            let var = next_pair(&mut inner, "assignment target", span)?.as_str().to_string();
            let mut path = Vec::new();
            let mut value = None;
            for part in inner {
                match part.as_rule() {
                    Rule::assign_segment => {
                        let seg_span = ctx.span(&part);
                        let seg = next_pair(&mut part.into_inner(), "member", seg_span)?;
                        if seg.as_rule() == Rule::identifier_name {
                            path.push(MemberAccess::Prop {
                                property: seg.as_str().to_string(),
                                span: seg_span,
                            });
                        } else {
                            path.push(MemberAccess::Index {
                                expr: build_expression(seg, ctx)?,
                                span: seg_span,
                            });
                        }
                    }
                    _ => value = Some(build_expression(part, ctx)?),
                }
            }
            let value = value.ok_or_else(|| {
                ParseError::BuildError("assignment without a value".to_string(), Some(span))
            })?;
            Ok(Stmt::Assign {
                var,
                path,
                value,
                span,
            })
        }
        Rule::expr_stmt => {
            let expr = build_expression(next_pair(&mut pair.into_inner(), "expression", span)?, ctx)?;
            Ok(Stmt::Expr { expr, span })
        }
        _ => Err(ParseError::BuildError(
            format!("Unexpected statement rule: {:?}", pair.as_rule()),
            Some(span),
        )),
    }
}

fn build_block(pair: Pair<Rule>, ctx: &Ctx) -> ParseResult<Stmt> {
    let span = ctx.span(&pair);
    let body = pair
        .into_inner()
        .map(|s| build_statement(s, ctx))
        .collect::<ParseResult<Vec<_>>>()?;
    Ok(Stmt::Block { body, span })
}

fn build_if(pair: Pair<Rule>, ctx: &Ctx) -> ParseResult<Stmt> {
    let span = ctx.span(&pair);
    let mut inner = pair.into_inner();
    let test = build_expression(next_pair(&mut inner, "condition", span)?, ctx)?;
    let then_s = build_block(next_pair(&mut inner, "if body", span)?, ctx)?;
    let else_s = match inner.next() {
        Some(clause) => {
            let clause_span = ctx.span(&clause);
            let branch = next_pair(&mut clause.into_inner(), "else branch", clause_span)?;
            let stmt = match branch.as_rule() {
                Rule::if_stmt => build_if(branch, ctx)?,
                _ => build_block(branch, ctx)?,
            };
            Some(Box::new(stmt))
        }
        None => None,
    };
    Ok(Stmt::If {
        test,
        then_s: Box::new(then_s),
        else_s,
        span,
    })
}

fn build_binding(pair: Pair<Rule>, ctx: &Ctx) -> ParseResult<Binding> {
    let span = ctx.span(&pair);
    let mut inner = pair.into_inner();
    let key_pair = next_pair(&mut inner, "binding key", span)?;
    let key = build_prop_key(key_pair, ctx)?;
    let name = match inner.next() {
        Some(name) => name.as_str().to_string(),
        None if is_identifier(&key) => key.clone(),
        None => {
            return Err(ParseError::BuildError(
                format!("'{}' cannot be bound without a variable name", key),
                Some(span),
            ))
        }
    };
    Ok(Binding { key, name })
}

fn build_prop_key(pair: Pair<Rule>, ctx: &Ctx) -> ParseResult<String> {
    let span = ctx.span(&pair);
    let key = next_pair(&mut pair.into_inner(), "property key", span)?;
    match key.as_rule() {
        Rule::string => build_string(key, ctx),
        _ => Ok(key.as_str().to_string()),
    }
}

/* ===================== Expressions ===================== */

fn build_expression(pair: Pair<Rule>, ctx: &Ctx) -> ParseResult<Expr> {
    let span = ctx.span(&pair);

    match pair.as_rule() {
        Rule::expression | Rule::paren_expr => {
            build_expression(next_pair(&mut pair.into_inner(), "expression", span)?, ctx)
        }
        Rule::logical_or_expr
        | Rule::logical_and_expr
        | Rule::equality_expr
        | Rule::comparison_expr
        | Rule::additive_expr
        | Rule::multiplicative_expr => build_binary_chain(pair, ctx),
        Rule::unary_expr => {
            let mut inner = pair.into_inner();
            let first = next_pair(&mut inner, "operand", span)?;
            let op = match first.as_rule() {
                Rule::op_not => UnaryOp::Not,
                Rule::op_neg => UnaryOp::Neg,
                _ => return build_expression(first, ctx),
            };
            let operand = build_expression(next_pair(&mut inner, "operand", span)?, ctx)?;
            Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
                span,
            })
        }
        Rule::postfix_expr => build_postfix(pair, ctx),
        Rule::number => {
            let v = pair.as_str().parse::<f64>().map_err(|e| {
                ParseError::BuildError(format!("invalid number: {}", e), Some(span))
            })?;
            Ok(Expr::LitNum { v, span })
        }
        Rule::string => Ok(Expr::LitStr {
            v: build_string(pair, ctx)?,
            span,
        }),
        Rule::boolean => Ok(Expr::LitBool {
            v: pair.as_str() == "true",
            span,
        }),
        Rule::null_lit => Ok(Expr::LitNull { span }),
        Rule::undefined_lit => Ok(Expr::LitUndefined { span }),
        Rule::identifier => Ok(Expr::Ident {
            name: pair.as_str().to_string(),
            span,
        }),
        Rule::array_lit => {
            let elements = pair
                .into_inner()
                .map(|e| build_expression(e, ctx))
                .collect::<ParseResult<Vec<_>>>()?;
            Ok(Expr::LitList { elements, span })
        }
        Rule::object_lit => {
            let mut properties = Vec::new();
            for property in pair.into_inner() {
                let p_span = ctx.span(&property);
                let mut inner = property.into_inner();
                let key = build_prop_key(next_pair(&mut inner, "property key", p_span)?, ctx)?;
                let value = build_expression(next_pair(&mut inner, "property value", p_span)?, ctx)?;
                properties.push((key, value));
            }
            Ok(Expr::LitObj { properties, span })
        }
        _ => Err(ParseError::BuildError(
            format!("Unexpected expression rule: {:?}", pair.as_rule()),
            Some(span),
        )),
    }
}

/// Left-associative fold of `operand (op operand)*`.
fn build_binary_chain(pair: Pair<Rule>, ctx: &Ctx) -> ParseResult<Expr> {
    let span = ctx.span(&pair);
    let mut inner = pair.into_inner();
    let mut left = build_expression(next_pair(&mut inner, "operand", span)?, ctx)?;

    while let Some(op_pair) = inner.next() {
        let op = match op_pair.as_rule() {
            Rule::op_or => BinaryOp::Or,
            Rule::op_and => BinaryOp::And,
            Rule::op_eq => BinaryOp::Eq,
            Rule::op_ne => BinaryOp::Ne,
            Rule::op_lt => BinaryOp::Lt,
            Rule::op_le => BinaryOp::Le,
            Rule::op_gt => BinaryOp::Gt,
            Rule::op_ge => BinaryOp::Ge,
            Rule::op_add => BinaryOp::Add,
            Rule::op_sub => BinaryOp::Sub,
            Rule::op_mul => BinaryOp::Mul,
            Rule::op_div => BinaryOp::Div,
            Rule::op_mod => BinaryOp::Mod,
            other => {
                return Err(ParseError::BuildError(
                    format!("unexpected operator {:?}", other),
                    Some(ctx.span(&op_pair)),
                ))
            }
        };
        let right = build_expression(next_pair(&mut inner, "right operand", span)?, ctx)?;
        let merged = Span {
            end: right.span().end,
            end_line: right.span().end_line,
            end_col: right.span().end_col,
            ..left.span()
        };
        left = Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
            span: merged,
        };
    }
    Ok(left)
}

fn build_postfix(pair: Pair<Rule>, ctx: &Ctx) -> ParseResult<Expr> {
    let span = ctx.span(&pair);
    let mut inner = pair.into_inner();
    let mut expr = build_expression(next_pair(&mut inner, "primary expression", span)?, ctx)?;

    for suffix in inner {
        let suffix_span = ctx.span(&suffix);
        let whole = Span {
            end: suffix_span.end,
            end_line: suffix_span.end_line,
            end_col: suffix_span.end_col,
            ..expr.span()
        };
        expr = match suffix.as_rule() {
            Rule::call_suffix => Expr::Call {
                callee: Box::new(expr),
                args: suffix
                    .into_inner()
                    .map(|a| build_expression(a, ctx))
                    .collect::<ParseResult<Vec<_>>>()?,
                span: whole,
            },
            Rule::member_access => Expr::Member {
                object: Box::new(expr),
                property: next_pair(&mut suffix.into_inner(), "property", suffix_span)?
                    .as_str()
                    .to_string(),
                span: whole,
            },
            Rule::index_access => Expr::Index {
                object: Box::new(expr),
                index: Box::new(build_expression(
                    next_pair(&mut suffix.into_inner(), "index", suffix_span)?,
                    ctx,
                )?),
                span: whole,
            },
            other => {
                return Err(ParseError::BuildError(
                    format!("unexpected suffix {:?}", other),
                    Some(suffix_span),
                ))
            }
        };
    }
    Ok(expr)
}

/* ===================== Strings ===================== */

fn build_string(pair: Pair<Rule>, ctx: &Ctx) -> ParseResult<String> {
    let span = ctx.span(&pair);
    let inner = next_pair(&mut pair.into_inner(), "string body", span)?;
    unescape(inner.as_str()).map_err(|msg| ParseError::BuildError(msg, Some(span)))
}

/// Resolve backslash escapes. Unknown escapes yield the escaped character.
pub fn unescape(raw: &str) -> Result<String, String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('0') => out.push('\0'),
            Some('u') => out.push(read_unicode(&mut chars)?),
            Some(other) => out.push(other),
            None => return Err("dangling escape at end of string".to_string()),
        }
    }
    Ok(out)
}

fn read_unicode(chars: &mut std::str::Chars) -> Result<char, String> {
    let lookahead = chars.clone().next();
    if lookahead == Some('{') {
        chars.next();
        let hex: String = chars.by_ref().take_while(|c| *c != '}').collect();
        let code = u32::from_str_radix(&hex, 16).map_err(|_| format!("bad escape \\u{{{}}}", hex))?;
        return char::from_u32(code).ok_or_else(|| format!("invalid code point {:x}", code));
    }
    let high = read_hex4(chars)?;
    if (0xD800..0xDC00).contains(&high) {
        let mut rest = chars.clone();
        if rest.next() == Some('\\') && rest.next() == Some('u') {
            if let Ok(low) = read_hex4(&mut rest) {
                if (0xDC00..0xE000).contains(&low) {
                    *chars = rest;
                    let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
                    return char::from_u32(code).ok_or_else(|| format!("invalid code point {:x}", code));
                }
            }
        }
    }
    Ok(char::from_u32(high).unwrap_or('\u{FFFD}'))
}

fn read_hex4(chars: &mut std::str::Chars) -> Result<u32, String> {
    let hex: String = chars.by_ref().take(4).collect();
    if hex.len() != 4 {
        return Err(format!("short unicode escape \\u{}", hex));
    }
    u32::from_str_radix(&hex, 16).map_err(|_| format!("bad unicode escape \\u{}", hex))
}
