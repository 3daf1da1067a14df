use std::borrow::Cow;
use std::fmt;

use crate::compiler::ast::{self, Expr, ForHeader, InputPattern, Stmt};
use crate::compiler::lexer::{lex_identifier, ExprTokenizer};
use crate::compiler::tokens::ExprToken;
use crate::error::{Error, ErrorKind};
use crate::value::Value;

const MAX_RECURSION: usize = 150;

fn unexpected<D: fmt::Display>(unexpected: D, expected: &str) -> Error {
    Error::new(
        ErrorKind::SyntaxError,
        format!("unexpected {unexpected}, expected {expected}"),
    )
}

fn unexpected_eof(expected: &str) -> Error {
    unexpected("end of input", expected)
}

fn syntax_error(msg: Cow<'static, str>) -> Error {
    Error::new(ErrorKind::SyntaxError, msg)
}

macro_rules! syntax_error {
    ($msg:expr) => {{
        return Err(syntax_error(Cow::Borrowed($msg)));
    }};
    ($msg:expr, $($tt:tt)*) => {{
        return Err(syntax_error(Cow::Owned(format!($msg, $($tt)*))));
    }};
}

macro_rules! expect_token {
    ($parser:expr, $expectation:expr) => {{
        match ok!($parser.stream.next()) {
            Some(rv) => rv,
            None => return Err(unexpected_eof($expectation)),
        }
    }};
    ($parser:expr, $match:pat, $expectation:expr) => {{
        match ok!($parser.stream.next()) {
            Some(token @ $match) => token,
            Some(token) => return Err(unexpected(token, $expectation)),
            None => return Err(unexpected_eof($expectation)),
        }
    }};
    ($parser:expr, $match:pat => $target:expr, $expectation:expr) => {{
        match ok!($parser.stream.next()) {
            Some($match) => $target,
            Some(token) => return Err(unexpected(token, $expectation)),
            None => return Err(unexpected_eof($expectation)),
        }
    }};
}

macro_rules! skip_token {
    ($p:expr, $match:pat) => {
        match $p.stream.current() {
            Err(err) => return Err(err),
            Ok(Some($match)) => {
                let _ = $p.stream.next();
                true
            }
            _ => false,
        }
    };
}

struct TokenStream<'a> {
    tokenizer: ExprTokenizer<'a>,
    current: Option<Result<ExprToken<'a>, Error>>,
}

impl<'a> TokenStream<'a> {
    pub fn new(source: &'a str) -> TokenStream<'a> {
        let mut tokenizer = ExprTokenizer::new(source);
        let current = tokenizer.next_token().transpose();
        TokenStream { tokenizer, current }
    }

    /// Advance the stream.
    pub fn next(&mut self) -> Result<Option<ExprToken<'a>>, Error> {
        let rv = self.current.take();
        self.current = self.tokenizer.next_token().transpose();
        rv.transpose()
    }

    /// Look at the current token
    pub fn current(&mut self) -> Result<Option<&ExprToken<'a>>, Error> {
        match self.current {
            Some(Ok(ref tok)) => Ok(Some(tok)),
            Some(Err(_)) => Err(self.current.take().unwrap().unwrap_err()),
            None => Ok(None),
        }
    }
}

struct Parser<'a> {
    stream: TokenStream<'a>,
    depth: usize,
}

macro_rules! binop {
    ($func:ident, $next:ident, { $($tok:tt)* }) => {
        fn $func(&mut self) -> Result<Expr<'a>, Error> {
            let mut left = ok!(self.$next());
            loop {
                let op = match ok!(self.stream.current()) {
                    $($tok)*
                    _ => break,
                };
                ok!(self.stream.next());
                let right = ok!(self.$next());
                left = Expr::BinOp(Box::new(ast::BinOp { op, left, right }));
            }
            Ok(left)
        }
    };
}

macro_rules! unaryop {
    ($func:ident, $next:ident, { $($tok:tt)* }) => {
        fn $func(&mut self) -> Result<Expr<'a>, Error> {
            let op = match ok!(self.stream.current()) {
                $($tok)*
                _ => return self.$next()
            };
            ok!(self.stream.next());
            Ok(Expr::UnaryOp(Box::new(ast::UnaryOp {
                op,
                expr: ok!(self.$func()),
            })))
        }
    };
}

macro_rules! with_recursion_guard {
    ($parser:expr, $expr:expr) => {{
        $parser.depth += 1;
        if $parser.depth > MAX_RECURSION {
            return Err(syntax_error(Cow::Borrowed(
                "expression exceeds maximum recursion limits",
            )));
        }
        let rv = $expr;
        $parser.depth -= 1;
        rv
    }};
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Parser<'a> {
        Parser {
            stream: TokenStream::new(source),
            depth: 0,
        }
    }

    fn expect_end(&mut self) -> Result<(), Error> {
        if ok!(self.stream.next()).is_some() {
            syntax_error!("unexpected input after expression")
        }
        Ok(())
    }

    fn parse_expr(&mut self) -> Result<Expr<'a>, Error> {
        with_recursion_guard!(self, self.parse_ternary())
    }

    fn parse_ternary(&mut self) -> Result<Expr<'a>, Error> {
        let test_expr = ok!(self.parse_or());
        if !skip_token!(self, ExprToken::Question) {
            return Ok(test_expr);
        }
        let true_expr = ok!(self.parse_expr());
        expect_token!(self, ExprToken::Colon, "`:`");
        let false_expr = ok!(self.parse_expr());
        Ok(Expr::Ternary(Box::new(ast::Ternary {
            test_expr,
            true_expr,
            false_expr,
        })))
    }

    binop!(parse_or, parse_and, {
        Some(ExprToken::Or) => ast::BinOpKind::ScOr,
    });
    binop!(parse_and, parse_equality, {
        Some(ExprToken::And) => ast::BinOpKind::ScAnd,
    });
    binop!(parse_equality, parse_compare, {
        Some(ExprToken::Eq) => ast::BinOpKind::Eq,
        Some(ExprToken::Ne) => ast::BinOpKind::Ne,
        Some(ExprToken::StrictEq) => ast::BinOpKind::StrictEq,
        Some(ExprToken::StrictNe) => ast::BinOpKind::StrictNe,
    });
    binop!(parse_compare, parse_math1, {
        Some(ExprToken::Lt) => ast::BinOpKind::Lt,
        Some(ExprToken::Lte) => ast::BinOpKind::Lte,
        Some(ExprToken::Gt) => ast::BinOpKind::Gt,
        Some(ExprToken::Gte) => ast::BinOpKind::Gte,
    });
    binop!(parse_math1, parse_math2, {
        Some(ExprToken::Plus) => ast::BinOpKind::Add,
        Some(ExprToken::Minus) => ast::BinOpKind::Sub,
    });
    binop!(parse_math2, parse_unary, {
        Some(ExprToken::Mul) => ast::BinOpKind::Mul,
        Some(ExprToken::Div) => ast::BinOpKind::Div,
        Some(ExprToken::Mod) => ast::BinOpKind::Rem,
    });
    unaryop!(parse_unary, parse_postfix, {
        Some(ExprToken::Bang) => ast::UnaryOpKind::Not,
        Some(ExprToken::Minus) => ast::UnaryOpKind::Neg,
        Some(ExprToken::Plus) => ast::UnaryOpKind::Pos,
    });

    fn parse_postfix(&mut self) -> Result<Expr<'a>, Error> {
        let mut expr = ok!(self.parse_primary());
        loop {
            match ok!(self.stream.current()) {
                Some(ExprToken::Dot) => {
                    ok!(self.stream.next());
                    let name = expect_token!(self, ExprToken::Ident(name) => name, "identifier");
                    expr = Expr::GetAttr(Box::new(ast::GetAttr { expr, name }));
                }
                Some(ExprToken::BracketOpen) => {
                    ok!(self.stream.next());
                    let subscript_expr = ok!(self.parse_expr());
                    expect_token!(self, ExprToken::BracketClose, "`]`");
                    expr = Expr::GetItem(Box::new(ast::GetItem {
                        expr,
                        subscript_expr,
                    }));
                }
                Some(ExprToken::ParenOpen) => {
                    ok!(self.stream.next());
                    let args = ok!(self.parse_args());
                    expr = Expr::Call(Box::new(ast::Call { expr, args }));
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_args(&mut self) -> Result<Vec<Expr<'a>>, Error> {
        let mut args = Vec::new();
        loop {
            if skip_token!(self, ExprToken::ParenClose) {
                break;
            }
            if !args.is_empty() {
                expect_token!(self, ExprToken::Comma, "`,`");
                if skip_token!(self, ExprToken::ParenClose) {
                    break;
                }
            }
            args.push(ok!(self.parse_expr()));
        }
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr<'a>, Error> {
        with_recursion_guard!(self, self.parse_primary_impl())
    }

    fn parse_primary_impl(&mut self) -> Result<Expr<'a>, Error> {
        let token = expect_token!(self, "expression");
        match token {
            ExprToken::Ident("true") => Ok(Expr::Const(Value::from(true))),
            ExprToken::Ident("false") => Ok(Expr::Const(Value::from(false))),
            ExprToken::Ident("null" | "none") => Ok(Expr::Const(Value::from(()))),
            ExprToken::Ident("undefined") => Ok(Expr::Const(Value::UNDEFINED)),
            ExprToken::Ident(name) => Ok(Expr::Var(name)),
            ExprToken::Str(val) => Ok(Expr::Const(Value::from(val))),
            ExprToken::String(val) => Ok(Expr::Const(Value::from(val))),
            ExprToken::Int(val) => Ok(Expr::Const(Value::from(val))),
            ExprToken::Float(val) => Ok(Expr::Const(Value::from(val))),
            ExprToken::ParenOpen => {
                let expr = ok!(self.parse_expr());
                expect_token!(self, ExprToken::ParenClose, "`)`");
                Ok(expr)
            }
            ExprToken::BracketOpen => self.parse_list_expr(),
            ExprToken::BraceOpen => self.parse_map_expr(),
            token => Err(unexpected(token, "expression")),
        }
    }

    fn parse_list_expr(&mut self) -> Result<Expr<'a>, Error> {
        let mut items = Vec::new();
        loop {
            if skip_token!(self, ExprToken::BracketClose) {
                break;
            }
            if !items.is_empty() {
                expect_token!(self, ExprToken::Comma, "`,`");
                if skip_token!(self, ExprToken::BracketClose) {
                    break;
                }
            }
            items.push(ok!(self.parse_expr()));
        }
        Ok(Expr::List(items))
    }

    fn parse_map_expr(&mut self) -> Result<Expr<'a>, Error> {
        let mut pairs = Vec::new();
        loop {
            if skip_token!(self, ExprToken::BraceClose) {
                break;
            }
            if !pairs.is_empty() {
                expect_token!(self, ExprToken::Comma, "`,`");
                if skip_token!(self, ExprToken::BraceClose) {
                    break;
                }
            }
            let key = match ok!(self.stream.next()) {
                Some(ExprToken::Ident(name)) => Expr::Const(Value::from(name)),
                Some(ExprToken::Str(val)) => Expr::Const(Value::from(val)),
                Some(ExprToken::String(val)) => Expr::Const(Value::from(val)),
                Some(ExprToken::Int(val)) => Expr::Const(Value::from(val.to_string())),
                Some(ExprToken::BracketOpen) => {
                    let key = ok!(self.parse_expr());
                    expect_token!(self, ExprToken::BracketClose, "`]`");
                    key
                }
                Some(token) => return Err(unexpected(token, "map key")),
                None => return Err(unexpected_eof("map key")),
            };
            expect_token!(self, ExprToken::Colon, "`:`");
            pairs.push((key, ok!(self.parse_expr())));
        }
        Ok(Expr::Map(pairs))
    }
}

/// Parses a standalone expression.
pub fn parse_expr(source: &str) -> Result<Expr<'_>, Error> {
    let mut parser = Parser::new(source);
    let rv = ok!(parser.parse_expr());
    ok!(parser.expect_end());
    Ok(rv)
}

/// Parses the argument of a `do` directive.
///
/// This is either an expression or an assignment of an expression to a
/// name (`name = expr`).
pub fn parse_stmt(source: &str) -> Result<Stmt<'_>, Error> {
    let mut parser = Parser::new(source);
    let expr = ok!(parser.parse_expr());
    let rv = if skip_token!(parser, ExprToken::Assign) {
        match expr {
            Expr::Var(name) => Stmt::Assign(name, ok!(parser.parse_expr())),
            other => syntax_error!("cannot assign to {}", other.description()),
        }
    } else {
        Stmt::Expr(expr)
    };
    ok!(parser.expect_end());
    Ok(rv)
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && lex_identifier(s) == s.len()
}

/// Parses the pattern of an `in` directive.
///
/// Accepts `{a, b, c}` to pick attributes from the input or a bare name
/// that binds the whole input.
pub fn parse_input_pattern(source: &str) -> Result<InputPattern<'_>, Error> {
    let source = source.trim();
    if let Some(inner) = source
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
    {
        let mut names = Vec::new();
        for name in inner.split(',').map(str::trim) {
            if !is_identifier(name) {
                syntax_error!("Invalid input pattern");
            }
            names.push(name);
        }
        Ok(InputPattern::Destructure(names))
    } else if is_identifier(source) {
        Ok(InputPattern::Whole(source))
    } else {
        syntax_error!("Invalid input pattern")
    }
}

/// Strips at least one whitespace character.
fn strip_whitespace(s: &str) -> Option<&str> {
    let rv = s.trim_start();
    (rv.len() < s.len()).then_some(rv)
}

/// Splits `k(, v)? in expr` into its parts.
fn split_keyed_header(vars: &str) -> Option<(Option<&str>, &str)> {
    let mut rest = vars;
    let mut second_var = None;
    if let Some(after_comma) = rest.strip_prefix(',') {
        let after_comma = after_comma.trim_start();
        let len = lex_identifier(after_comma);
        if len == 0 {
            return None;
        }
        let (var, after_var) = after_comma.split_at(len);
        second_var = Some(var);
        rest = after_var;
    }
    let rest = some!(strip_whitespace(rest));
    let expr = some!(strip_whitespace(some!(rest.strip_prefix("in"))));
    (!expr.trim_end().is_empty()).then_some((second_var, expr))
}

/// Parses the header of a `for` directive.
///
/// `k, v in expr` and `k in expr` iterate keys (and values), `item expr`
/// iterates the items of a sequence.
pub fn parse_for_header(source: &str) -> Result<ForHeader<'_>, Error> {
    fn malformed() -> Error {
        syntax_error(Cow::Borrowed(
            "Malformed arguments to 'for' form -- expected variable name followed by expression",
        ))
    }

    let first_len = lex_identifier(source);
    if first_len == 0 {
        return Err(malformed());
    }
    let (first_var, rest) = source.split_at(first_len);

    if let Some((second_var, expr)) = split_keyed_header(rest) {
        return Ok(ForHeader {
            keyed: true,
            first_var,
            second_var,
            iter: ok!(parse_expr(expr)),
        });
    }

    match strip_whitespace(rest) {
        Some(expr) if !expr.trim_end().is_empty() && expr.trim_end() != "in" => Ok(ForHeader {
            keyed: false,
            first_var,
            second_var: None,
            iter: ok!(parse_expr(expr)),
        }),
        _ => Err(malformed()),
    }
}
