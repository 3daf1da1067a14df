use std::cell::RefCell;
use std::sync::Arc;
use std::{fmt, io, mem};

use crate::compiler::codegen::CodeGenerator;
use crate::compiler::instructions::Instructions;
use crate::compiler::lexer::Tokenizer;
use crate::environment::MoldShared;
use crate::error::Error;
use crate::output::{Output, WriteWrapper};
use crate::session::RenderSession;
use crate::value::Value;
use crate::vm::Vm;

/// A compiled template.
///
/// Compiling does not depend on any [`Mold`](crate::Mold): the same compiled
/// template can be instantiated by many of them with
/// [`Mold::instantiate`](crate::Mold::instantiate).
#[derive(Clone, Default)]
pub struct CompiledTemplate {
    name: Option<String>,
    source: String,
    instructions: Instructions,
}

impl fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ds = f.debug_struct("CompiledTemplate");
        ds.field("name", &self.name);
        ds.field("instructions", &self.instructions.len());
        ds.finish()
    }
}

impl CompiledTemplate {
    /// Compiles a template.
    ///
    /// The name shows up in error messages.  Compilation fails on malformed
    /// directives, malformed expressions and unbalanced blocks.
    ///
    /// ```
    /// # use mold::CompiledTemplate;
    /// let compiled = CompiledTemplate::new(Some("greeting"), "Hello <<t $in>>!").unwrap();
    /// assert_eq!(compiled.name(), Some("greeting"));
    /// ```
    pub fn new(name: Option<&str>, source: &str) -> Result<CompiledTemplate, Error> {
        let mut tokenizer = Tokenizer::new(source, name);
        let mut codegen = CodeGenerator::new(name, source);
        while let Some(token) = ok!(tokenizer.next_token()) {
            ok!(codegen.compile_token(&token));
        }
        let instructions = ok!(codegen.finish());
        log::debug!(
            "compiled template {} into {} instructions",
            name.unwrap_or("<string>"),
            instructions.len()
        );
        Ok(CompiledTemplate {
            name: name.map(Into::into),
            source: source.into(),
            instructions,
        })
    }

    /// Returns the name of the template.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the source of the template.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the compiled instructions.
    #[cfg(feature = "unstable_machinery")]
    pub fn instructions(&self) -> &Instructions {
        &self.instructions
    }

    #[cfg(not(feature = "unstable_machinery"))]
    pub(crate) fn instructions(&self) -> &Instructions {
        &self.instructions
    }
}

/// A compiled template bound to a [`Mold`](crate::Mold).
///
/// Renderers are produced by [`Mold::bake`](crate::Mold::bake) and friends.
/// They see the bindings and registered commands of the mold they were
/// created by, are cheap to clone and can render from many threads at once.
///
/// The input of a render is available to the template as `$in` and can be
/// destructured with the `in` directive:
///
/// ```
/// # use mold::{Mold, context};
/// let mold = Mold::new();
/// let renderer = mold.bake("<<in {name}>>Hello <<t name>>!").unwrap();
/// let rv = renderer.render(context! { name => "World" }).unwrap();
/// assert_eq!(rv, "Hello World!");
/// ```
#[derive(Clone)]
pub struct Renderer {
    pub(crate) template: Arc<CompiledTemplate>,
    pub(crate) shared: Arc<MoldShared>,
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("name", &self.template.name())
            .finish()
    }
}

impl Renderer {
    /// Returns the name of the template.
    pub fn name(&self) -> Option<&str> {
        self.template.name()
    }

    /// Returns the compiled template.
    pub fn compiled(&self) -> &CompiledTemplate {
        &self.template
    }

    /// Renders the template into a string.
    ///
    /// Nothing is returned if the render fails part way.
    pub fn render<I: Into<Value>>(&self, input: I) -> Result<String, Error> {
        let mut rv = String::new();
        ok!(self._render(input.into(), &mut Output::new(&mut rv), None));
        Ok(rv)
    }

    /// Renders the template and appends the output to a buffer.
    ///
    /// If rendering fails the buffer keeps what was rendered up to the
    /// failure.
    pub fn render_into<I: Into<Value>>(&self, input: I, buffer: &mut String) -> Result<(), Error> {
        self._render(input.into(), &mut Output::new(buffer), None)
    }

    /// Renders the template into an [`io::Write`].
    ///
    /// This works exactly like [`render`](Self::render) but instead writes the template
    /// as it's evaluating into an [`io::Write`].
    pub fn render_to_write<I: Into<Value>, W: io::Write>(&self, input: I, w: W) -> Result<(), Error> {
        let mut wrapper = WriteWrapper::new(w);
        self._render(input.into(), &mut Output::new(&mut wrapper), None)
            .map_err(|err| wrapper.take_err(err))
    }

    /// Renders the template while collecting deferred snippets.
    ///
    /// Commands that call [`State::defer`](crate::State::defer) record their
    /// snippets into the session, in render order.  Snippets of earlier
    /// renders with the same session are kept and numbering continues.
    ///
    /// ```
    /// # use mold::{Mold, RenderSession};
    /// let mold = Mold::new();
    /// mold.add_snippet_commands();
    /// let renderer = mold.bake(r#"<button><<event "click">></button>"#).unwrap();
    /// let mut session = RenderSession::new();
    /// let rv = renderer.render_session((), &mut session).unwrap();
    /// assert_eq!(rv, r#"<button><span data-mold-snippet="0"></span></button>"#);
    /// assert_eq!(session.snippets()[0].kind(), "event");
    /// ```
    pub fn render_session<I: Into<Value>>(
        &self,
        input: I,
        session: &mut RenderSession,
    ) -> Result<String, Error> {
        let cell = RefCell::new(mem::take(session));
        let mut rv = String::new();
        let result = self._render(input.into(), &mut Output::new(&mut rv), Some(&cell));
        *session = cell.into_inner();
        result.map(|_| rv)
    }

    fn _render(
        &self,
        input: Value,
        out: &mut Output,
        session: Option<&RefCell<RenderSession>>,
    ) -> Result<(), Error> {
        Vm::new(&self.shared).eval(&self.template, input, out, 0, session)
    }
}
