//! The condition and text-operation language.
//!
//! `if` attributes hold a single expression. `{{ ... }}` blocks in card text
//! hold `;`-separated statements, where `name = expr` assigns into the scope
//! and a bare expression is shown in place of the block.
//!
//! ```text
//! gold >= 10 and not cursed
//! _.adventurers < 2 || (_.round > 6 && _.tier == 1)
//! gold = gold + 5; cursed = false
//! ```

use std::fmt;

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use logos::Logos;
use tracing::warn;

use crate::context::{BUILTIN_PREFIX, TemplateContext, Value};

/// Errors raised while parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConditionError {
    /// The source does not parse.
    #[error("syntax error at {offset}: {message}")]
    Syntax {
        /// Byte offset into the expression.
        offset: usize,
        /// What went wrong.
        message: String,
    },

    /// A name is neither a built-in nor in scope.
    #[error("unknown variable `{0}`")]
    UnknownVariable(String),

    /// An operator was applied to the wrong kind of value.
    #[error("type error: {0}")]
    Type(String),

    /// An assignment targeted a built-in.
    #[error("`{0}` is read-only")]
    ReadOnly(String),
}

/// Result type for condition parsing and evaluation.
pub type ConditionResult<T> = Result<T, ConditionError>;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
enum Token {
    #[regex(r"[0-9]+(\.[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),

    #[token("true")]
    True,

    #[token("false")]
    False,

    #[token("and")]
    #[token("&&")]
    And,

    #[token("or")]
    #[token("||")]
    Or,

    #[token("not")]
    #[token("!")]
    Not,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*", |lex| lex.slice().to_string())]
    Ident(String),

    #[token("==")]
    Eq,

    #[token("!=")]
    Ne,

    #[token("<=")]
    Le,

    #[token(">=")]
    Ge,

    #[token("<")]
    Lt,

    #[token(">")]
    Gt,

    #[token("=")]
    Assign,

    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token("*")]
    Star,

    #[token("/")]
    Slash,

    #[token("%")]
    Percent,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token(";")]
    Semi,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{n}"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::And => write!(f, "and"),
            Token::Or => write!(f, "or"),
            Token::Not => write!(f, "not"),
            Token::Ident(name) => write!(f, "{name}"),
            Token::Eq => write!(f, "=="),
            Token::Ne => write!(f, "!="),
            Token::Le => write!(f, "<="),
            Token::Ge => write!(f, ">="),
            Token::Lt => write!(f, "<"),
            Token::Gt => write!(f, ">"),
            Token::Assign => write!(f, "="),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Semi => write!(f, ";"),
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `and`
    And,
    /// `or`
    Or,
}

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric literal.
    Number(f64),
    /// Boolean literal.
    Bool(bool),
    /// Variable reference.
    Var(String),
    /// Arithmetic negation.
    Neg(Box<Expr>),
    /// Logical negation.
    Not(Box<Expr>),
    /// Binary operation.
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

/// A parsed statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `name = expr`
    Assign(String, Expr),
    /// A bare expression.
    Expr(Expr),
}

/// Deepest allowed nesting of parentheses and prefix operators.
pub const MAX_NESTING: usize = 64;

/// Most tokens a single expression or block may hold.
pub const MAX_TOKENS: usize = 512;

type Span = SimpleSpan;

fn syntax(offset: usize, message: impl Into<String>) -> ConditionError {
    ConditionError::Syntax {
        offset,
        message: message.into(),
    }
}

fn lex(source: &str) -> ConditionResult<Vec<(Token, Span)>> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut depth = 0usize;
    let mut prefix_run = 0usize;
    while let Some(result) = lexer.next() {
        let span = lexer.span();
        let token = result
            .map_err(|()| syntax(span.start, format!("unexpected {:?}", lexer.slice())))?;

        match token {
            Token::LParen => depth += 1,
            Token::RParen => depth = depth.saturating_sub(1),
            _ => {}
        }
        if matches!(token, Token::Not | Token::Minus) {
            prefix_run += 1;
        } else {
            prefix_run = 0;
        }
        if depth + prefix_run > MAX_NESTING {
            return Err(syntax(span.start, "expression nested too deeply"));
        }
        if tokens.len() == MAX_TOKENS {
            return Err(syntax(span.start, "expression too long"));
        }
        tokens.push((token, Span::from(span)));
    }
    Ok(tokens)
}

fn binary_expr(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary(op, Box::new(lhs), Box::new(rhs))
}

/// Expression parser, loosest binding first: `or`, `and`, `not`, comparison,
/// `+ -`, `* / %`, unary minus, atoms.
fn expression_parser<'a, I>() -> impl Parser<'a, I, Expr, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = Span>,
{
    recursive(|expr| {
        let literal = select! {
            Token::Number(n) => Expr::Number(n),
            Token::True => Expr::Bool(true),
            Token::False => Expr::Bool(false),
            Token::Ident(name) => Expr::Var(name),
        }
        .labelled("value");

        let atom = literal.or(expr.delimited_by(just(Token::LParen), just(Token::RParen)));

        let unary = just(Token::Minus)
            .repeated()
            .foldr(atom, |_, rhs| Expr::Neg(Box::new(rhs)));

        let product = unary.clone().foldl(
            choice((
                just(Token::Star).to(BinaryOp::Mul),
                just(Token::Slash).to(BinaryOp::Div),
                just(Token::Percent).to(BinaryOp::Rem),
            ))
            .then(unary)
            .repeated(),
            |lhs, (op, rhs)| binary_expr(op, lhs, rhs),
        );

        let sum = product.clone().foldl(
            choice((
                just(Token::Plus).to(BinaryOp::Add),
                just(Token::Minus).to(BinaryOp::Sub),
            ))
            .then(product)
            .repeated(),
            |lhs, (op, rhs)| binary_expr(op, lhs, rhs),
        );

        // Comparisons do not chain.
        let comparison = sum
            .clone()
            .then(
                choice((
                    just(Token::Eq).to(BinaryOp::Eq),
                    just(Token::Ne).to(BinaryOp::Ne),
                    just(Token::Le).to(BinaryOp::Le),
                    just(Token::Ge).to(BinaryOp::Ge),
                    just(Token::Lt).to(BinaryOp::Lt),
                    just(Token::Gt).to(BinaryOp::Gt),
                ))
                .then(sum)
                .or_not(),
            )
            .map(|(lhs, rhs)| match rhs {
                Some((op, rhs)) => binary_expr(op, lhs, rhs),
                None => lhs,
            });

        let negation = just(Token::Not)
            .repeated()
            .foldr(comparison, |_, inner| Expr::Not(Box::new(inner)));

        let conjunction = negation.clone().foldl(
            just(Token::And).ignore_then(negation).repeated(),
            |lhs, rhs| binary_expr(BinaryOp::And, lhs, rhs),
        );

        conjunction.clone().foldl(
            just(Token::Or).ignore_then(conjunction).repeated(),
            |lhs, rhs| binary_expr(BinaryOp::Or, lhs, rhs),
        )
    })
}

fn program_parser<'a, I>() -> impl Parser<'a, I, Vec<Statement>, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = Span>,
{
    let assignment = select! { Token::Ident(name) => name }
        .then_ignore(just(Token::Assign))
        .then(expression_parser())
        .map(|(name, expr)| Statement::Assign(name, expr));

    let statement = assignment.or(expression_parser().map(Statement::Expr));

    statement
        .separated_by(just(Token::Semi).repeated().at_least(1))
        .allow_leading()
        .allow_trailing()
        .collect::<Vec<Statement>>()
        .then_ignore(end())
}

/// Parse a single expression.
pub fn parse_expression(source: &str) -> ConditionResult<Expr> {
    let tokens = lex(source)?;
    let eoi: Span = (source.len()..source.len()).into();
    let stream = Stream::from_iter(tokens.into_iter()).map(eoi, |(t, s): (_, _)| (t, s));
    expression_parser()
        .then_ignore(end())
        .parse(stream)
        .into_result()
        .map_err(first_error)
}

/// Parse `;`-separated statements.
pub fn parse_program(source: &str) -> ConditionResult<Vec<Statement>> {
    let tokens = lex(source)?;
    let eoi: Span = (source.len()..source.len()).into();
    let stream = Stream::from_iter(tokens.into_iter()).map(eoi, |(t, s): (_, _)| (t, s));
    program_parser()
        .parse(stream)
        .into_result()
        .map_err(first_error)
}

fn first_error(errors: Vec<Rich<'_, Token>>) -> ConditionError {
    match errors.into_iter().next() {
        Some(error) => syntax(error.span().into_range().start, error.to_string()),
        None => syntax(0, "invalid expression"),
    }
}

fn number(value: Value, op: BinaryOp) -> ConditionResult<f64> {
    match value {
        Value::Number(n) => Ok(n),
        Value::Bool(_) => Err(ConditionError::Type(format!(
            "{op:?} expects numbers, found {value}"
        ))),
    }
}

/// Evaluate an expression against a context.
pub fn evaluate(expr: &Expr, ctx: &TemplateContext) -> ConditionResult<Value> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Var(name) => ctx
            .lookup(name)
            .ok_or_else(|| ConditionError::UnknownVariable(name.clone())),
        Expr::Neg(inner) => match evaluate(inner, ctx)? {
            Value::Number(n) => Ok(Value::Number(-n)),
            other => Err(ConditionError::Type(format!("cannot negate {other}"))),
        },
        Expr::Not(inner) => Ok(Value::Bool(!evaluate(inner, ctx)?.is_truthy())),
        Expr::Binary(BinaryOp::And, lhs, rhs) => {
            let value = evaluate(lhs, ctx)?.is_truthy() && evaluate(rhs, ctx)?.is_truthy();
            Ok(Value::Bool(value))
        }
        Expr::Binary(BinaryOp::Or, lhs, rhs) => {
            let value = evaluate(lhs, ctx)?.is_truthy() || evaluate(rhs, ctx)?.is_truthy();
            Ok(Value::Bool(value))
        }
        Expr::Binary(op, lhs, rhs) => {
            let (l, r) = (evaluate(lhs, ctx)?, evaluate(rhs, ctx)?);
            binary(*op, l, r)
        }
    }
}

fn binary(op: BinaryOp, l: Value, r: Value) -> ConditionResult<Value> {
    match op {
        BinaryOp::Eq | BinaryOp::Ne => {
            let equal = match (l, r) {
                (Value::Number(a), Value::Number(b)) => a == b,
                (Value::Bool(a), Value::Bool(b)) => a == b,
                _ => {
                    return Err(ConditionError::Type(format!("cannot compare {l} with {r}")));
                }
            };
            Ok(Value::Bool(if op == BinaryOp::Eq { equal } else { !equal }))
        }
        _ => {
            let (a, b) = (number(l, op)?, number(r, op)?);
            Ok(match op {
                BinaryOp::Add => Value::Number(a + b),
                BinaryOp::Sub => Value::Number(a - b),
                BinaryOp::Mul => Value::Number(a * b),
                BinaryOp::Div => Value::Number(a / b),
                BinaryOp::Rem => Value::Number(a % b),
                BinaryOp::Lt => Value::Bool(a < b),
                BinaryOp::Le => Value::Bool(a <= b),
                BinaryOp::Gt => Value::Bool(a > b),
                _ => Value::Bool(a >= b),
            })
        }
    }
}

/// Evaluate an `if` attribute.
pub fn evaluate_condition(source: &str, ctx: &TemplateContext) -> ConditionResult<bool> {
    let expr = parse_expression(source)?;
    Ok(evaluate(&expr, ctx)?.is_truthy())
}

/// Run statements against the context. Returns the value of the last bare
/// expression, if any.
pub fn execute(
    statements: &[Statement],
    ctx: &mut TemplateContext,
) -> ConditionResult<Option<Value>> {
    let mut last = None;
    for statement in statements {
        match statement {
            Statement::Assign(name, expr) => {
                if name.starts_with(BUILTIN_PREFIX) {
                    return Err(ConditionError::ReadOnly(name.clone()));
                }
                let value = evaluate(expr, ctx)?;
                ctx.scope.insert(name.clone(), value);
            }
            Statement::Expr(expr) => last = Some(evaluate(expr, ctx)?),
        }
    }
    Ok(last)
}

/// The contents of every `{{ ... }}` block in `text`, in order.
pub fn blocks(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            break;
        };
        out.push(after[..end].trim());
        rest = &after[end + 2..];
    }
    out
}

/// Apply the assignments of every `{{ ... }}` block in `text`.
///
/// A failing block is skipped with a warning; the others still run.
pub fn apply_text_ops(text: &str, ctx: &mut TemplateContext) {
    for block in blocks(text) {
        let result = parse_program(block).and_then(|program| {
            if program.iter().any(|s| matches!(s, Statement::Assign(..))) {
                execute(&program, ctx).map(|_| ())
            } else {
                Ok(())
            }
        });
        if let Err(error) = result {
            warn!(block, %error, "skipping card operation");
        }
    }
}

/// Replace each `{{ ... }}` block with the value of its last bare expression.
/// Assignments are evaluated on a scratch copy and render as nothing.
pub fn interpolate(text: &str, ctx: &TemplateContext) -> String {
    let mut scratch = ctx.clone();
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            break;
        };
        out.push_str(&rest[..start]);
        let block = after[..end].trim();
        match parse_program(block).and_then(|p| execute(&p, &mut scratch)) {
            Ok(Some(value)) => out.push_str(&value.to_string()),
            Ok(None) => {}
            Err(error) => warn!(block, %error, "cannot render text block"),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}
