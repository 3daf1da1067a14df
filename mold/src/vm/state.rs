use std::cell::{Cell, RefCell};
use std::fmt;

use crate::environment::{Command, MoldShared};
use crate::error::{Error, ErrorKind};
use crate::output::Output;
use crate::session::RenderSession;
use crate::template::CompiledTemplate;
use crate::utils::UndefinedBehavior;
use crate::value::Value;
use crate::vm::context::Context;
use crate::vm::{recurse, Vm};

/// Provides access to the current execution state of the engine.
///
/// A read only reference is passed to custom commands and to functions
/// called from expressions.  It gives access to the name of the template
/// that is rendering, the variables that are visible at the point of the
/// call and to other registered commands.
///
/// **Notes on lifetimes:** the state object exposes some of the internal
/// lifetimes through the type.  You should always elide these lifetimes
/// as there might be lifetimes added or removed between releases.
pub struct State<'vm, 'env> {
    pub(crate) shared: &'env MoldShared,
    pub(crate) ctx: Context<'vm>,
    pub(crate) template: &'vm CompiledTemplate,
    pub(crate) depth: usize,
    pub(crate) dispatch_depth: Cell<usize>,
    pub(crate) session: Option<&'env RefCell<RenderSession>>,
}

impl fmt::Debug for State<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ds = f.debug_struct("State");
        ds.field("name", &self.name());
        ds.field("depth", &self.depth);
        ds.field("ctx", &self.ctx);
        ds.finish()
    }
}

impl<'vm, 'env> State<'vm, 'env> {
    /// Creates a new state.
    pub(crate) fn new(
        shared: &'env MoldShared,
        ctx: Context<'vm>,
        template: &'vm CompiledTemplate,
        depth: usize,
        session: Option<&'env RefCell<RenderSession>>,
    ) -> State<'vm, 'env> {
        State {
            shared,
            ctx,
            template,
            depth,
            dispatch_depth: Cell::new(0),
            session,
        }
    }

    /// Returns the name of the current template.
    ///
    /// Templates baked with [`Mold::bake`](crate::Mold::bake) have no name.
    pub fn name(&self) -> Option<&str> {
        self.template.name()
    }

    /// Returns the current undefined behavior.
    #[inline(always)]
    pub fn undefined_behavior(&self) -> UndefinedBehavior {
        self.shared.settings.undefined_behavior
    }

    /// Looks up a variable by name.
    ///
    /// Variables bound by the template (`in` patterns, loop variables,
    /// `$in` and `$i`) shadow the bindings of the mold.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.ctx
            .load(name)
            .or_else(|| self.shared.get_binding(name))
    }

    /// How deep the current render is nested into other renders.
    fn current_depth(&self) -> usize {
        self.depth + self.dispatch_depth.get()
    }

    /// Dispatches a registered command.
    ///
    /// Named templates are rendered with `arg` as input and produce their
    /// output as string.  Custom commands return whatever they return.
    pub fn dispatch(&self, name: &str, arg: Value) -> Result<Value, Error> {
        let depth = self.current_depth() + 1;
        ok!(self.shared.check_recursion(depth));
        log::trace!("dispatching command {name:?} at depth {depth}");
        let command = ok!(self.shared.get_command(name));
        recurse(|| match command {
            Command::Template(template) => {
                let mut rv = String::new();
                ok!(Vm::new(self.shared).eval(
                    &template,
                    arg,
                    &mut Output::new(&mut rv),
                    depth,
                    self.session,
                ));
                Ok(Value::from(rv))
            }
            Command::Custom(f) => {
                self.dispatch_depth.set(self.dispatch_depth.get() + 1);
                let rv = f(self, arg);
                self.dispatch_depth.set(self.dispatch_depth.get() - 1);
                rv
            }
        })
    }

    /// Records a deferred snippet and returns its placeholder markup.
    ///
    /// The snippet is added to the [`RenderSession`] of the render.  The
    /// returned markup (`<span data-mold-snippet="N"></span>`) is meant to be
    /// emitted into the output so that the snippet can later be attached to
    /// the rendered document.  Fails if the render has no session.
    pub fn defer(&self, kind: &str, payload: Value) -> Result<String, Error> {
        let session = ok!(self.session());
        let id = session.borrow_mut().push_snippet(kind, payload);
        Ok(RenderSession::placeholder(id))
    }

    /// Records a label snippet and binds `name` to it.
    pub fn label(&self, name: &str) -> Result<String, Error> {
        let session = ok!(self.session());
        let mut session = session.borrow_mut();
        let id = session.push_snippet("label", Value::from(name));
        session.add_label(name, id);
        Ok(RenderSession::placeholder(id))
    }

    fn session(&self) -> Result<&'env RefCell<RenderSession>, Error> {
        self.session.ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidOperation,
                "snippets can only be deferred while rendering with a session",
            )
        })
    }
}
