#![cfg(feature = "unstable_machinery")]
use mold::machinery::{line_for_offset, tokenize, Token, Tokenizer};
use mold::ErrorKind;

use similar_asserts::assert_eq;

fn directive<'a>(command: &'a str, args: Option<&'a str>, pos: usize) -> Token<'a> {
    Token::Directive { command, args, pos }
}

#[test]
fn test_basic_tokens() {
    let tokens = tokenize("Hello <<t name>>!", None).unwrap();
    assert_eq!(
        tokens,
        vec![
            Token::Literal("Hello "),
            directive("t", Some("name"), 8),
            Token::Literal("!"),
        ]
    );
}

#[test]
fn test_no_directives() {
    let tokens = tokenize("just <b>text</b>", None).unwrap();
    assert_eq!(tokens, vec![Token::Literal("just <b>text</b>")]);
    assert_eq!(tokenize("", None).unwrap(), vec![]);
}

#[test]
fn test_blank_args_and_closers() {
    let tokens = tokenize("<<else  >><</if>><<custom>>", None).unwrap();
    assert_eq!(
        tokens,
        vec![
            directive("else", None, 2),
            directive("/if", None, 12),
            directive("custom", None, 19),
        ]
    );
}

#[test]
fn test_literal_trimming() {
    let tokens = tokenize("<<if x>>\n    yes\n<</if>>\n", None).unwrap();
    assert_eq!(
        tokens,
        vec![
            directive("if", Some("x"), 2),
            Token::Literal("yes"),
            directive("/if", None, 19),
        ]
    );
}

#[test]
fn test_escaped_open_marker() {
    let tokens = tokenize("a<<<t x>>", None).unwrap();
    assert_eq!(
        tokens,
        vec![Token::Literal("a<"), directive("t", Some("x"), 4)]
    );
}

#[test]
fn test_multiline_arguments() {
    let tokens = tokenize("<<for x\n  items>>", None).unwrap();
    assert_eq!(tokens, vec![directive("for", Some("x\n  items"), 2)]);
}

#[test]
fn test_unclosed_tag() {
    let err = tokenize("line one\nline two <<t x\nline three", Some("page")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SyntaxError);
    assert_eq!(err.detail(), Some("Unclosed template tag"));
    assert_eq!(err.name(), Some("page"));
    assert_eq!(err.line(), Some(2));
}

#[test]
fn test_invalid_tag() {
    for source in ["<< t x>>", "<<t(x)>>", "x\n<<>>"] {
        let err = tokenize(source, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SyntaxError, "source: {source:?}");
        assert_eq!(err.detail(), Some("Invalid template tag"));
    }
    assert_eq!(tokenize("x\n<<>>", None).unwrap_err().line(), Some(2));
}

#[test]
fn test_streaming_tokenizer() {
    let mut tokenizer = Tokenizer::new("a<<t b>>c", None);
    let mut seen = Vec::new();
    while let Some(token) = tokenizer.next_token().unwrap() {
        seen.push(token.to_string());
    }
    assert_eq!(seen, vec!["literal \"a\"", "directive `t` \"b\"", "literal \"c\""]);
}

#[test]
fn test_line_for_offset() {
    let source = "a\nbb\nccc";
    assert_eq!(line_for_offset(source, 0), 1);
    assert_eq!(line_for_offset(source, 2), 2);
    assert_eq!(line_for_offset(source, 5), 3);
}
