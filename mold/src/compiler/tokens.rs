use std::fmt;

/// A piece of a template as produced by the template tokenizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    /// Raw template text, already trimmed around directives.
    Literal(&'a str),
    /// A `<<command args>>` directive.
    Directive {
        /// The command name (`t`, `if`, `/for`, or a custom name).
        command: &'a str,
        /// The argument text with leading whitespace removed, `None` if blank.
        args: Option<&'a str>,
        /// Byte offset of the directive body in the source.
        pos: usize,
    },
}

impl<'a> fmt::Display for Token<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Literal(text) => write!(f, "literal {text:?}"),
            Token::Directive {
                command,
                args: Some(args),
                ..
            } => write!(f, "directive `{command}` {args:?}"),
            Token::Directive { command, .. } => write!(f, "directive `{command}`"),
        }
    }
}

/// Represents a token in an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprToken<'a> {
    /// An identifier.
    Ident(&'a str),
    /// A borrowed string.
    Str(&'a str),
    /// An allocated string.
    String(String),
    /// An integer (limited to i64)
    Int(u64),
    /// A float
    Float(f64),
    /// A plus (`+`) operator.
    Plus,
    /// A minus (`-`) operator.
    Minus,
    /// A mul (`*`) operator.
    Mul,
    /// A div (`/`) operator.
    Div,
    /// A mod (`%`) operator.
    Mod,
    /// A bang (`!`) operator.
    Bang,
    /// A dot operator (`.`)
    Dot,
    /// The comma operator (`,`)
    Comma,
    /// The colon operator (`:`)
    Colon,
    /// The question mark (`?`)
    Question,
    /// The assignment operator (`=`)
    Assign,
    /// `&&` operator
    And,
    /// `||` operator
    Or,
    /// `==` operator
    Eq,
    /// `!=` operator
    Ne,
    /// `===` operator
    StrictEq,
    /// `!==` operator
    StrictNe,
    /// `>` operator
    Gt,
    /// `>=` operator
    Gte,
    /// `<` operator
    Lt,
    /// `<=` operator
    Lte,
    /// Open Bracket
    BracketOpen,
    /// Close Bracket
    BracketClose,
    /// Open Parenthesis
    ParenOpen,
    /// Close Parenthesis
    ParenClose,
    /// Open Brace
    BraceOpen,
    /// Close Brace
    BraceClose,
}

impl<'a> fmt::Display for ExprToken<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprToken::Ident(_) => f.write_str("identifier"),
            ExprToken::Str(_) | ExprToken::String(_) => f.write_str("string"),
            ExprToken::Int(_) => f.write_str("integer"),
            ExprToken::Float(_) => f.write_str("float"),
            ExprToken::Plus => f.write_str("`+`"),
            ExprToken::Minus => f.write_str("`-`"),
            ExprToken::Mul => f.write_str("`*`"),
            ExprToken::Div => f.write_str("`/`"),
            ExprToken::Mod => f.write_str("`%`"),
            ExprToken::Bang => f.write_str("`!`"),
            ExprToken::Dot => f.write_str("`.`"),
            ExprToken::Comma => f.write_str("`,`"),
            ExprToken::Colon => f.write_str("`:`"),
            ExprToken::Question => f.write_str("`?`"),
            ExprToken::Assign => f.write_str("`=`"),
            ExprToken::And => f.write_str("`&&`"),
            ExprToken::Or => f.write_str("`||`"),
            ExprToken::Eq => f.write_str("`==`"),
            ExprToken::Ne => f.write_str("`!=`"),
            ExprToken::StrictEq => f.write_str("`===`"),
            ExprToken::StrictNe => f.write_str("`!==`"),
            ExprToken::Gt => f.write_str("`>`"),
            ExprToken::Gte => f.write_str("`>=`"),
            ExprToken::Lt => f.write_str("`<`"),
            ExprToken::Lte => f.write_str("`<=`"),
            ExprToken::BracketOpen => f.write_str("`[`"),
            ExprToken::BracketClose => f.write_str("`]`"),
            ExprToken::ParenOpen => f.write_str("`(`"),
            ExprToken::ParenClose => f.write_str("`)`"),
            ExprToken::BraceOpen => f.write_str("`{`"),
            ExprToken::BraceClose => f.write_str("`}`"),
        }
    }
}
