use std::borrow::Cow;

use crate::compiler::tokens::{ExprToken, Token};
use crate::error::{Error, ErrorKind};
use crate::utils::{line_for_offset, unescape};

const OPEN_MARKER: &str = "<<";
const CLOSE_MARKER: &str = ">>";

fn memstr(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Trims directive adjacent whitespace from a literal segment.
///
/// A segment that follows a directive and starts with a newline loses that
/// newline and all the whitespace that follows it.  A segment that precedes
/// a directive and ends in a newline followed only by whitespace is cut at
/// that newline.  Text at the very start or end of a template is kept.
fn trim_literal(s: &str, after_directive: bool, before_directive: bool) -> &str {
    let mut s = s;
    if after_directive && s.starts_with('\n') {
        s = s.trim_start();
    }
    if !before_directive {
        return s;
    }
    let cut = s
        .match_indices('\n')
        .map(|(idx, _)| idx)
        .find(|&idx| s[idx..].trim_start().is_empty());
    match cut {
        Some(idx) => &s[..idx],
        None => s,
    }
}

/// Splits a directive body into command and arguments.
fn split_directive(body: &str) -> Option<(&str, Option<&str>)> {
    let command_len = body
        .bytes()
        .take_while(|&c| c.is_ascii_alphanumeric() || c == b'_' || c == b'/')
        .count();
    if command_len == 0 {
        return None;
    }
    let (command, rest) = body.split_at(command_len);
    if rest.is_empty() {
        return Some((command, None));
    }
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let args = rest.trim_start();
    Some((command, if args.is_empty() { None } else { Some(args) }))
}

/// Tokenizes mold templates into literal segments and directives.
pub struct Tokenizer<'s> {
    source: &'s str,
    name: Option<&'s str>,
    offset: usize,
    pending: Option<Token<'s>>,
}

impl<'s> Tokenizer<'s> {
    /// Creates a new tokenizer.
    ///
    /// The name is only used for error reporting.
    pub fn new(source: &'s str, name: Option<&'s str>) -> Tokenizer<'s> {
        Tokenizer {
            source,
            name,
            offset: 0,
            pending: None,
        }
    }

    fn syntax_error(&self, msg: &'static str, offset: usize) -> Error {
        Error::new(ErrorKind::SyntaxError, msg)
            .with_location(self.name, line_for_offset(self.source, offset))
    }

    /// Produces the next token from the tokenizer.
    pub fn next_token(&mut self) -> Result<Option<Token<'s>>, Error> {
        if let Some(token) = self.pending.take() {
            return Ok(Some(token));
        }
        if self.offset >= self.source.len() {
            return Ok(None);
        }
        let bytes = self.source.as_bytes();
        let mut open = match memstr(&bytes[self.offset..], OPEN_MARKER.as_bytes()) {
            Some(idx) => self.offset + idx,
            None => {
                let literal = trim_literal(&self.source[self.offset..], self.offset > 0, false);
                self.offset = self.source.len();
                if literal.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(Token::Literal(literal)));
            }
        };

        // extra open characters are literal text
        while bytes.get(open + 2) == Some(&b'<') {
            open += 1;
        }
        let literal = trim_literal(&self.source[self.offset..open], self.offset > 0, true);

        let body_start = open + OPEN_MARKER.len();
        let close = match memstr(&bytes[body_start..], CLOSE_MARKER.as_bytes()) {
            Some(idx) => body_start + idx,
            None => return Err(self.syntax_error("Unclosed template tag", open)),
        };
        let (command, args) = match split_directive(&self.source[body_start..close]) {
            Some(rv) => rv,
            None => return Err(self.syntax_error("Invalid template tag", body_start)),
        };
        self.offset = close + CLOSE_MARKER.len();

        let directive = Token::Directive {
            command,
            args,
            pos: body_start,
        };
        if literal.is_empty() {
            return Ok(Some(directive));
        }
        self.pending = Some(directive);
        Ok(Some(Token::Literal(literal)))
    }
}

/// Tokenizes a whole template.
#[cfg(any(test, feature = "unstable_machinery"))]
pub fn tokenize<'s>(source: &'s str, name: Option<&'s str>) -> Result<Vec<Token<'s>>, Error> {
    let mut tokenizer = Tokenizer::new(source, name);
    let mut rv = Vec::new();
    while let Some(token) = ok!(tokenizer.next_token()) {
        rv.push(token);
    }
    Ok(rv)
}

pub(crate) fn lex_identifier(s: &str) -> usize {
    s.as_bytes()
        .iter()
        .enumerate()
        .take_while(|&(idx, &c)| {
            if c == b'_' || c == b'$' {
                true
            } else if idx == 0 {
                c.is_ascii_alphabetic()
            } else {
                c.is_ascii_alphanumeric()
            }
        })
        .count()
}

/// Tokenizes the expression language used in directive arguments.
pub struct ExprTokenizer<'s> {
    rest: &'s str,
}

impl<'s> ExprTokenizer<'s> {
    /// Creates a new expression tokenizer.
    pub fn new(input: &'s str) -> ExprTokenizer<'s> {
        ExprTokenizer { rest: input }
    }

    #[inline]
    fn rest_bytes(&self) -> &[u8] {
        self.rest.as_bytes()
    }

    fn advance(&mut self, bytes: usize) -> &'s str {
        let (skipped, new_rest) = self.rest.split_at(bytes);
        self.rest = new_rest;
        skipped
    }

    #[inline]
    fn syntax_error(&mut self, msg: &'static str) -> Error {
        Error::new(ErrorKind::SyntaxError, msg)
    }

    fn eat_number(&mut self) -> Result<ExprToken<'s>, Error> {
        #[derive(Copy, Clone)]
        enum State {
            RadixInteger, // 0x10
            Integer,      // 123
            Fraction,     // .123
            Exponent,     // E | e
            ExponentSign, // +|-
        }

        let radix = match self.rest_bytes().get(..2) {
            Some(b"0b" | b"0B") => 2,
            Some(b"0o" | b"0O") => 8,
            Some(b"0x" | b"0X") => 16,
            _ => 10,
        };

        let mut state = if radix == 10 {
            State::Integer
        } else {
            self.advance(2);
            State::RadixInteger
        };

        let mut num_len = self
            .rest_bytes()
            .iter()
            .take_while(|&c| c.is_ascii_digit())
            .count();
        let mut has_underscore = false;
        for c in self.rest_bytes()[num_len..].iter().copied() {
            state = match (c, state) {
                (b'.', State::Integer) => State::Fraction,
                (b'E' | b'e', State::Integer | State::Fraction) => State::Exponent,
                (b'+' | b'-', State::Exponent) => State::ExponentSign,
                (b'0'..=b'9', State::Exponent) => State::ExponentSign,
                (b'0'..=b'9', state) => state,
                (b'a'..=b'f' | b'A'..=b'F', State::RadixInteger) if radix == 16 => state,
                (b'_', _) => {
                    has_underscore = true;
                    state
                }
                _ => break,
            };
            num_len += 1;
        }
        let is_float = !matches!(state, State::Integer | State::RadixInteger);

        let mut num = Cow::Borrowed(self.advance(num_len));
        if has_underscore {
            if num.ends_with('_') {
                return Err(self.syntax_error("'_' may not occur at end of number"));
            }
            num = Cow::Owned(num.replace('_', ""));
        }

        if is_float {
            num.parse()
                .map(ExprToken::Float)
                .map_err(|_| self.syntax_error("invalid float"))
        } else if let Ok(int) = u64::from_str_radix(&num, radix) {
            Ok(ExprToken::Int(int))
        } else if radix == 10 {
            num.parse()
                .map(ExprToken::Float)
                .map_err(|_| self.syntax_error("invalid integer"))
        } else {
            Err(self.syntax_error("invalid integer"))
        }
    }

    fn eat_identifier(&mut self) -> Result<ExprToken<'s>, Error> {
        let ident_len = lex_identifier(self.rest);
        if ident_len > 0 {
            Ok(ExprToken::Ident(self.advance(ident_len)))
        } else {
            Err(self.syntax_error("unexpected character"))
        }
    }

    fn eat_string(&mut self, delim: u8) -> Result<ExprToken<'s>, Error> {
        let mut escaped = false;
        let mut has_escapes = false;
        let str_len = self
            .rest_bytes()
            .iter()
            .skip(1)
            .take_while(|&&c| match (escaped, c) {
                (true, _) => {
                    escaped = false;
                    true
                }
                (_, b'\\') => {
                    escaped = true;
                    has_escapes = true;
                    true
                }
                (_, c) if c == delim => false,
                _ => true,
            })
            .count();
        if escaped || self.rest_bytes().get(str_len + 1) != Some(&delim) {
            return Err(self.syntax_error("unexpected end of string"));
        }
        let s = self.advance(str_len + 2);
        Ok(if has_escapes {
            ExprToken::String(ok!(unescape(&s[1..s.len() - 1])))
        } else {
            ExprToken::Str(&s[1..s.len() - 1])
        })
    }

    fn skip_whitespace(&mut self) {
        let skipped = self
            .rest
            .chars()
            .map_while(|c| c.is_whitespace().then(|| c.len_utf8()))
            .sum();
        if skipped > 0 {
            self.advance(skipped);
        }
    }

    /// Produces the next expression token.
    pub fn next_token(&mut self) -> Result<Option<ExprToken<'s>>, Error> {
        self.skip_whitespace();
        if self.rest.is_empty() {
            return Ok(None);
        }

        // three character operators
        let op = match self.rest_bytes().get(..3) {
            Some(b"===") => Some(ExprToken::StrictEq),
            Some(b"!==") => Some(ExprToken::StrictNe),
            _ => None,
        };
        if let Some(op) = op {
            self.advance(3);
            return Ok(Some(op));
        }

        // two character operators
        let op = match self.rest_bytes().get(..2) {
            Some(b"==") => Some(ExprToken::Eq),
            Some(b"!=") => Some(ExprToken::Ne),
            Some(b">=") => Some(ExprToken::Gte),
            Some(b"<=") => Some(ExprToken::Lte),
            Some(b"&&") => Some(ExprToken::And),
            Some(b"||") => Some(ExprToken::Or),
            _ => None,
        };
        if let Some(op) = op {
            self.advance(2);
            return Ok(Some(op));
        }

        // single character operators (and strings)
        let op = match self.rest_bytes().first() {
            Some(b'+') => Some(ExprToken::Plus),
            Some(b'-') => Some(ExprToken::Minus),
            Some(b'*') => Some(ExprToken::Mul),
            Some(b'/') => Some(ExprToken::Div),
            Some(b'%') => Some(ExprToken::Mod),
            Some(b'!') => Some(ExprToken::Bang),
            Some(b'.') => Some(ExprToken::Dot),
            Some(b',') => Some(ExprToken::Comma),
            Some(b':') => Some(ExprToken::Colon),
            Some(b'?') => Some(ExprToken::Question),
            Some(b'=') => Some(ExprToken::Assign),
            Some(b'>') => Some(ExprToken::Gt),
            Some(b'<') => Some(ExprToken::Lt),
            Some(b'(') => Some(ExprToken::ParenOpen),
            Some(b')') => Some(ExprToken::ParenClose),
            Some(b'[') => Some(ExprToken::BracketOpen),
            Some(b']') => Some(ExprToken::BracketClose),
            Some(b'{') => Some(ExprToken::BraceOpen),
            Some(b'}') => Some(ExprToken::BraceClose),
            Some(b'\'') => return self.eat_string(b'\'').map(Some),
            Some(b'"') => return self.eat_string(b'"').map(Some),
            Some(c) if c.is_ascii_digit() => return self.eat_number().map(Some),
            _ => None,
        };
        if let Some(op) = op {
            self.advance(1);
            Ok(Some(op))
        } else {
            self.eat_identifier().map(Some)
        }
    }
}

/// Utility function to quickly tokenize an expression.
#[cfg(any(test, feature = "unstable_machinery"))]
pub fn tokenize_expr(input: &str) -> Result<Vec<ExprToken<'_>>, Error> {
    let mut tokenizer = ExprTokenizer::new(input);
    let mut rv = Vec::new();
    while let Some(token) = ok!(tokenizer.next_token()) {
        rv.push(token);
    }
    Ok(rv)
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_trim_literal() {
        assert_eq!(trim_literal("\n    foo\n  ", true, true), "foo");
        assert_eq!(trim_literal("foo\n  bar", true, true), "foo\n  bar");
        assert_eq!(trim_literal(" foo ", true, true), " foo ");
        assert_eq!(trim_literal("\n\n  \n", true, true), "");
        assert_eq!(trim_literal("a\n b\n\n  ", true, true), "a\n b");
        assert_eq!(trim_literal("\n  foo\n", false, true), "\n  foo");
        assert_eq!(trim_literal("\n  foo\n", true, false), "foo\n");
        assert_eq!(trim_literal("\n  foo\n", false, false), "\n  foo\n");
    }

    #[test]
    fn test_split_directive() {
        assert_eq!(split_directive("t x"), Some(("t", Some("x"))));
        assert_eq!(split_directive("/if"), Some(("/if", None)));
        assert_eq!(split_directive("else   "), Some(("else", None)));
        assert_eq!(split_directive("for x\nin y"), Some(("for", Some("x\nin y"))));
        assert_eq!(split_directive(" t x"), None);
        assert_eq!(split_directive("t(x)"), None);
        assert_eq!(split_directive(""), None);
    }

    #[test]
    fn test_basic_identifiers() {
        fn assert_ident(s: &str) {
            match ExprTokenizer::new(s).next_token() {
                Ok(Some(ExprToken::Ident(ident))) if ident == s => {}
                _ => panic!("did not get a matching token result: {s:?}"),
            }
        }

        fn assert_not_ident(s: &str) {
            if let Ok(Some(ExprToken::Ident(ident))) = ExprTokenizer::new(s).next_token() {
                if ident == s {
                    panic!("got a matching token result: {s:?}");
                }
            }
        }

        assert_ident("foo_bar_baz");
        assert_ident("_foo_bar_baz");
        assert_ident("$i");
        assert_ident("$in");
        assert_ident("a42");
        assert_not_ident("42a");
        assert_not_ident("ö");
    }

    #[test]
    fn test_expression_operators() {
        let tokens = tokenize_expr("a === b !== c == d != e && f || !g").unwrap();
        assert_eq!(
            tokens,
            vec![
                ExprToken::Ident("a"),
                ExprToken::StrictEq,
                ExprToken::Ident("b"),
                ExprToken::StrictNe,
                ExprToken::Ident("c"),
                ExprToken::Eq,
                ExprToken::Ident("d"),
                ExprToken::Ne,
                ExprToken::Ident("e"),
                ExprToken::And,
                ExprToken::Ident("f"),
                ExprToken::Or,
                ExprToken::Bang,
                ExprToken::Ident("g"),
            ]
        );
    }

    #[test]
    fn test_numbers_and_strings() {
        let tokens = tokenize_expr(r#"42 2.5 1e3 0x1f 'a' "b\nc""#).unwrap();
        assert_eq!(
            tokens,
            vec![
                ExprToken::Int(42),
                ExprToken::Float(2.5),
                ExprToken::Float(1000.0),
                ExprToken::Int(31),
                ExprToken::Str("a"),
                ExprToken::String("b\nc".into()),
            ]
        );
        assert!(tokenize_expr("'open").is_err());
        assert!(tokenize_expr("a # b").is_err());
    }
}
