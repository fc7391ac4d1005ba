//! Nom parser for compile-time code blocks
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! body      := stmt? (";" stmt?)*
//! stmt      := "echo" expr ("," expr)* | "print" expr | $var "=" expr | expr
//! expr      := or ("?" expr ":" expr)?
//! or        := and ("||" and)*
//! and       := cmp ("&&" cmp)*
//! cmp       := concat (("=="|"!="|"<="|">="|"<"|">") concat)?
//! concat    := additive ("." additive)*
//! additive  := term (("+"|"-") term)*
//! term      := unary (("*"|"/"|"%") unary)*
//! unary     := ("-"|"!") unary | primary
//! primary   := number | string | true | false | null | $var | name "(" args ")" | "(" expr ")"
//! ```

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_until},
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace1, not_line_ending, satisfy},
    combinator::{all_consuming, map, map_res, not, opt, peek, recognize, value},
    multi::{many0_count, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use super::value::Value;
use crate::error::EvaluationError;

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Echo(Vec<Expr>),
    Assign(String, Expr),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(String),
    Call(String, Vec<Expr>),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Concat => ".",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }
}

/// Parse a statement body (the inside of `<?php ... ?>`).
pub fn parse_statements(body: &str) -> Result<Vec<Stmt>, EvaluationError> {
    all_consuming(terminated(statements, sp))(body)
        .map(|(_, stmts)| stmts)
        .map_err(|e| parse_error(body, e))
}

/// Parse a lone expression (the inside of `<?= ... ?>`).
pub fn parse_expression(body: &str) -> Result<Expr, EvaluationError> {
    all_consuming(terminated(expression, pair(opt(tok(char(';'))), sp)))(body)
        .map(|(_, e)| e)
        .map_err(|e| parse_error(body, e))
}

fn parse_error(body: &str, err: nom::Err<nom::error::Error<&str>>) -> EvaluationError {
    let (near, message) = match err {
        nom::Err::Failure(e) if e.code == nom::error::ErrorKind::TooLarge => {
            (e.input, "expression nested too deeply".to_string())
        }
        nom::Err::Error(e) | nom::Err::Failure(e) => (e.input, format!("unexpected input ({:?})", e.code)),
        nom::Err::Incomplete(_) => (body, "unexpected input (incomplete)".to_string()),
    };
    EvaluationError::Parse {
        near: near.trim().chars().take(24).collect(),
        message,
    }
}

// =============================================================================
// WHITESPACE AND COMMENTS
// =============================================================================

fn sp(input: &str) -> IResult<&str, ()> {
    value(
        (),
        many0_count(alt((
            multispace1,
            recognize(tuple((tag("/*"), take_until("*/"), tag("*/")))),
            recognize(pair(tag("//"), not_line_ending)),
            recognize(pair(char('#'), not_line_ending)),
        ))),
    )(input)
}

fn tok<'a, O, F>(parser: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    preceded(sp, parser)
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0_count(alt((alphanumeric1, tag("_")))),
    ))(input)
}

fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    terminated(tag_no_case(word), not(peek(satisfy(is_ident_char))))
}

// =============================================================================
// STATEMENTS
// =============================================================================

fn statements(input: &str) -> IResult<&str, Vec<Stmt>> {
    map(separated_list0(tok(char(';')), opt(statement)), |stmts| {
        stmts.into_iter().flatten().collect()
    })(input)
}

fn statement(input: &str) -> IResult<&str, Stmt> {
    alt((echo_stmt, print_stmt, assign_stmt, map(expression, Stmt::Expr)))(input)
}

fn echo_stmt(input: &str) -> IResult<&str, Stmt> {
    map(
        preceded(tok(keyword("echo")), separated_list1(tok(char(',')), expression)),
        Stmt::Echo,
    )(input)
}

fn print_stmt(input: &str) -> IResult<&str, Stmt> {
    map(preceded(tok(keyword("print")), expression), |e| Stmt::Echo(vec![e]))(input)
}

fn assign_stmt(input: &str) -> IResult<&str, Stmt> {
    map(
        pair(
            terminated(tok(variable), tok(terminated(char('='), not(char('='))))),
            expression,
        ),
        |(name, e)| Stmt::Assign(name, e),
    )(input)
}

// =============================================================================
// EXPRESSIONS
// =============================================================================

/// Deepest nesting of parentheses, ternaries, call arguments and unary
/// operators accepted in one expression.
pub const MAX_DEPTH: usize = 64;

fn expression(input: &str) -> IResult<&str, Expr> {
    expr(input, 0)
}

fn nested(input: &str, depth: usize) -> Result<(), nom::Err<nom::error::Error<&str>>> {
    if depth > MAX_DEPTH {
        return Err(nom::Err::Failure(nom::error::Error::new(
            input,
            nom::error::ErrorKind::TooLarge,
        )));
    }
    Ok(())
}

fn expr(input: &str, depth: usize) -> IResult<&str, Expr> {
    nested(input, depth)?;
    let (input, cond) = or_expr(input, depth)?;
    let (input, branches) = opt(pair(
        preceded(tok(char('?')), |i| expr(i, depth + 1)),
        preceded(tok(char(':')), |i| expr(i, depth + 1)),
    ))(input)?;

    Ok(match branches {
        Some((then, otherwise)) => (
            input,
            Expr::Ternary(Box::new(cond), Box::new(then), Box::new(otherwise)),
        ),
        None => (input, cond),
    })
}

fn left_assoc<'a>(
    input: &'a str,
    depth: usize,
    operand: fn(&'a str, usize) -> IResult<&'a str, Expr>,
    operator: fn(&'a str) -> IResult<&'a str, BinOp>,
) -> IResult<&'a str, Expr> {
    let (mut input, mut acc) = operand(input, depth)?;
    loop {
        match pair(tok(operator), |i| operand(i, depth))(input) {
            Ok((rest, (op, rhs))) => {
                acc = Expr::Binary(op, Box::new(acc), Box::new(rhs));
                input = rest;
            }
            Err(nom::Err::Error(_)) => return Ok((input, acc)),
            Err(e) => return Err(e),
        }
    }
}

fn or_expr(input: &str, depth: usize) -> IResult<&str, Expr> {
    left_assoc(input, depth, and_expr, |i| value(BinOp::Or, tag("||"))(i))
}

fn and_expr(input: &str, depth: usize) -> IResult<&str, Expr> {
    left_assoc(input, depth, cmp_expr, |i| value(BinOp::And, tag("&&"))(i))
}

fn cmp_expr(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (input, lhs) = concat_expr(input, depth)?;
    let (input, rhs) = opt(pair(tok(cmp_op), |i| concat_expr(i, depth)))(input)?;

    Ok(match rhs {
        Some((op, rhs)) => (input, Expr::Binary(op, Box::new(lhs), Box::new(rhs))),
        None => (input, lhs),
    })
}

fn cmp_op(input: &str) -> IResult<&str, BinOp> {
    alt((
        value(BinOp::Eq, tag("==")),
        value(BinOp::Ne, tag("!=")),
        value(BinOp::Le, tag("<=")),
        value(BinOp::Ge, tag(">=")),
        value(BinOp::Lt, char('<')),
        value(BinOp::Gt, char('>')),
    ))(input)
}

fn concat_expr(input: &str, depth: usize) -> IResult<&str, Expr> {
    left_assoc(input, depth, additive, |i| value(BinOp::Concat, char('.'))(i))
}

fn additive(input: &str, depth: usize) -> IResult<&str, Expr> {
    left_assoc(input, depth, term, |i| {
        alt((value(BinOp::Add, char('+')), value(BinOp::Sub, char('-'))))(i)
    })
}

fn term(input: &str, depth: usize) -> IResult<&str, Expr> {
    left_assoc(input, depth, unary, |i| {
        alt((
            value(BinOp::Mul, char('*')),
            value(BinOp::Div, char('/')),
            value(BinOp::Mod, char('%')),
        ))(i)
    })
}

fn unary(input: &str, depth: usize) -> IResult<&str, Expr> {
    nested(input, depth)?;
    alt((
        map(preceded(tok(char('-')), |i| unary(i, depth + 1)), |e| {
            Expr::Neg(Box::new(e))
        }),
        map(
            preceded(tok(terminated(char('!'), not(char('=')))), |i| unary(i, depth + 1)),
            |e| Expr::Not(Box::new(e)),
        ),
        tok(|i| primary(i, depth)),
    ))(input)
}

fn primary(input: &str, depth: usize) -> IResult<&str, Expr> {
    alt((
        map(number, Expr::Literal),
        map(single_quoted, |s| Expr::Literal(Value::Str(s))),
        map(double_quoted, |s| Expr::Literal(Value::Str(s))),
        value(Expr::Literal(Value::Bool(true)), keyword("true")),
        value(Expr::Literal(Value::Bool(false)), keyword("false")),
        value(Expr::Literal(Value::Null), keyword("null")),
        map(variable, Expr::Var),
        |i| call(i, depth),
        delimited(char('('), |i| expr(i, depth + 1), tok(char(')'))),
    ))(input)
}

fn call(input: &str, depth: usize) -> IResult<&str, Expr> {
    map(
        pair(
            identifier,
            delimited(
                tok(char('(')),
                separated_list0(tok(char(',')), |i| expr(i, depth + 1)),
                tok(char(')')),
            ),
        ),
        |(name, args)| Expr::Call(name.to_string(), args),
    )(input)
}

fn variable(input: &str) -> IResult<&str, String> {
    map(preceded(char('$'), identifier), str::to_string)(input)
}

fn number(input: &str) -> IResult<&str, Value> {
    alt((
        map_res(recognize(tuple((digit1, char('.'), digit1))), |s: &str| {
            s.parse::<f64>().map(Value::Float)
        }),
        // Past i64 the literal becomes a float.
        map_res(digit1, |s: &str| {
            s.parse::<i64>()
                .map(Value::Int)
                .or_else(|_| s.parse::<f64>().map(Value::Float))
        }),
    ))(input)
}

/// `'...'` with only `\'` and `\\` recognised as escapes.
fn single_quoted(input: &str) -> IResult<&str, String> {
    quoted(input, '\'', |c| match c {
        '\'' => Some("'"),
        '\\' => Some("\\"),
        _ => None,
    })
}

fn double_quoted(input: &str) -> IResult<&str, String> {
    quoted(input, '"', |c| match c {
        '"' => Some("\""),
        '\\' => Some("\\"),
        'n' => Some("\n"),
        't' => Some("\t"),
        'r' => Some("\r"),
        '$' => Some("$"),
        _ => None,
    })
}

fn quoted(input: &str, quote: char, escape: fn(char) -> Option<&'static str>) -> IResult<&str, String> {
    let (rest, _) = char(quote)(input)?;
    let mut out = String::new();
    let mut chars = rest.char_indices();

    while let Some((i, c)) = chars.next() {
        if c == quote {
            return Ok((&rest[i + c.len_utf8()..], out));
        }
        if c == '\\' {
            match chars.next() {
                Some((_, next)) => match escape(next) {
                    Some(replacement) => out.push_str(replacement),
                    None => {
                        out.push('\\');
                        out.push(next);
                    }
                },
                None => out.push('\\'),
            }
            continue;
        }
        out.push(c);
    }

    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}
