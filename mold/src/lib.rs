//! Mold: a micro-templating engine for `<<directive>>` templates.
//!
//! A template is text with embedded directives.  Mold compiles the template
//! once into a [`Renderer`] which then turns input values into strings as
//! often as needed.
//!
//! ```
//! use mold::{Mold, context};
//!
//! let mold = Mold::new();
//! let renderer = mold.bake(r#"
//! <<in {title, items}>>
//! <h1><<t title>></h1>
//! <ul>
//! <<for item items>>
//!   <li><<t $i + 1>>. <<t item>></li>
//! <</for>>
//! </ul>
//! "#).unwrap();
//! let rv = renderer.render(context! {
//!     title => "Fish & Chips",
//!     items => vec!["cod", "haddock"],
//! }).unwrap();
//! assert_eq!(rv, "<h1>Fish &amp; Chips</h1>\n<ul><li>1. cod</li><li>2. haddock</li></ul>\n");
//! ```
//!
//! # Directives
//!
//! A directive is written as `<<command args>>`.  The command is a run of
//! letters, digits, `_` and `/`, the arguments are everything after the
//! whitespace that follows it.  A literal `<` right before a directive is
//! written by adding more `<` in front: `<<<t x>>` renders `<` followed by
//! the value of `x`.
//!
//! | Directive | Meaning |
//! |---|---|
//! | `<<in {a, b}>>` | binds attributes of the input to names, `<<in x>>` binds the whole input |
//! | `<<t expr>>` / `<<text expr>>` | appends the HTML escaped value |
//! | `<<h expr>>` / `<<html expr>>` | appends the value without escaping |
//! | `<<d stmt>>` / `<<do stmt>>` | evaluates an expression or an assignment `name = expr` |
//! | `<<if expr>>` `<<elif expr>>` `<<else>>` `<</if>>` | conditionals |
//! | `<<for x expr>>` `<</for>>` | loops over the items of a sequence |
//! | `<<for k, v in expr>>` `<</for>>` | loops over keys and values of a map (or string indexes and items of a sequence) |
//! | `<<name expr>>` | dispatches a named template or a custom command |
//!
//! Inside a template the input is always available as `$in` and inside a
//! loop `$i` holds the position of the current item.  A newline (and the
//! indentation following it) right after or before a directive is dropped,
//! so directives may be placed on lines of their own.
//!
//! # Expressions
//!
//! Directive arguments are written in a small expression language: literals
//! (`1`, `2.5`, `"str"`, `true`, `null`, `undefined`, `[1, 2]`,
//! `{"a": 1}`), names, attribute and item access (`a.b`, `a[0]`), calls of
//! function values (`f(x)`), `!`, unary `-`, arithmetic (`+ - * / %`),
//! comparisons (`== != === !== < <= > >=`), `&&`, `||` and `c ? a : b`.
//!
//! # Named Templates and Commands
//!
//! Every [`Mold`] has a registry.  Templates baked with
//! [`Mold::bake_named`] and commands registered with [`Mold::define`] can be
//! invoked from any template of the same mold:
//!
//! ```
//! # use mold::{Mold, Value};
//! let mold = Mold::new();
//! mold.bake_named("item", "(<<t $in>>)").unwrap();
//! mold.define("bracket", |_, arg: Value| Ok(Value::from(format!("[{arg}]"))));
//! let renderer = mold.bake("<<item 10>><<bracket 20>>").unwrap();
//! assert_eq!(renderer.render(()).unwrap(), "(10)[20]");
//! ```
//!
//! # Learn more
//!
//! - [`Settings`]: controls escaping, undefined handling and limits.
//! - [`value`]: the dynamic value type.
//! - [`RenderSession`]: collecting deferred snippets.
//!
//! # Optional Features
//!
//! - `stacker`: enabled by default.  Grows the stack on demand so that
//!   deeply nested dispatches stay within the recursion limit instead of
//!   overflowing the stack.  Without it the default recursion limit is
//!   lowered to 100.
//! - `unstable_machinery`: exposes the tokenizer, the expression parser and
//!   the code generator in the [`machinery`] module.  There are no semver
//!   guarantees for this module.
#![allow(clippy::cognitive_complexity)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]

#[macro_use]
mod macros;

mod compiler;
mod environment;
mod error;
mod output;
mod session;
mod settings;
mod template;
mod utils;
mod vm;

pub mod value;

pub use self::environment::Mold;
pub use self::error::{Error, ErrorKind};
pub use self::session::{RenderSession, Snippet};
pub use self::settings::Settings;
pub use self::template::{CompiledTemplate, Renderer};
pub use self::utils::{HtmlEscape, HtmlEscapeMode, UndefinedBehavior};
pub use self::value::Value;

#[doc(hidden)]
pub use self::macros::__context;
pub use self::vm::State;

/// This module gives access to the low level machinery.
///
/// This module is only provided by the `unstable_machinery` feature and does not
/// have a stable interface.  It mostly exists for debugging and tooling
/// purposes.
#[cfg(feature = "unstable_machinery")]
#[cfg_attr(docsrs, doc(cfg(feature = "unstable_machinery")))]
pub mod machinery {
    #![allow(missing_docs)]
    pub use crate::compiler::ast;
    pub use crate::compiler::codegen::CodeGenerator;
    pub use crate::compiler::instructions::{Instruction, Instructions};
    pub use crate::compiler::lexer::{tokenize, tokenize_expr, Tokenizer};
    pub use crate::compiler::parser::{parse_expr, parse_for_header, parse_stmt};
    pub use crate::compiler::tokens::{ExprToken, Token};
    pub use crate::utils::{line_for_offset, unescape};
}
