use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use indexmap::IndexMap;

use crate::error::{Error, ErrorKind};
use crate::settings::Settings;
use crate::template::{CompiledTemplate, Renderer};
use crate::value::Value;
use crate::vm::{State, Vm};

type CommandFn = dyn Fn(&State, Value) -> Result<Value, Error> + Send + Sync + 'static;

/// A registered command.
#[derive(Clone)]
pub(crate) enum Command {
    Template(Arc<CompiledTemplate>),
    Custom(Arc<CommandFn>),
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Template(template) => write!(f, "<template {:?}>", template.name()),
            Command::Custom(_) => write!(f, "<custom command>"),
        }
    }
}

/// The state shared between a [`Mold`] and all the renderers it made.
pub(crate) struct MoldShared {
    bindings: Value,
    pub(crate) settings: Settings,
    registry: RwLock<IndexMap<String, Command>>,
}

impl fmt::Debug for MoldShared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Mold")
            .field("bindings", &self.bindings)
            .field("settings", &self.settings)
            .field("commands", &registry.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl MoldShared {
    /// Looks up an environment binding.
    pub fn get_binding(&self, name: &str) -> Option<Value> {
        self.bindings.as_map()?.get(name).cloned()
    }

    /// Fails if a render nested `depth` levels deep is not allowed.
    pub fn check_recursion(&self, depth: usize) -> Result<(), Error> {
        if depth > self.settings.recursion_limit {
            Err(Error::new(
                ErrorKind::InvalidOperation,
                "recursion limit exceeded",
            ))
        } else {
            Ok(())
        }
    }

    /// Resolves a command.
    ///
    /// The lock is released before the command is returned so that the
    /// command itself may use the registry.
    pub fn get_command(&self, name: &str) -> Result<Command, Error> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        registry
            .get(name)
            .cloned()
            .ok_or_else(|| Error::new_unknown_command(name))
    }

    fn register(&self, name: &str, command: Command) {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        registry.insert(name.to_string(), command);
    }
}

/// A template engine instance.
///
/// A mold holds the bindings that are visible to all of its templates, its
/// [`Settings`] and the registry of named templates and custom commands that
/// directives dispatch to.  Two molds never see each other's bindings or
/// commands.  Cloning a mold is cheap and the clone shares the registry with
/// the original.
///
/// ```
/// # use mold::{Mold, context};
/// let mold = Mold::with_bindings(context! { site => "example.com" });
/// mold.bake_named("link", r#"<a href="https://<<t site>>/<<t $in>>"><<t $in>></a>"#).unwrap();
/// let page = mold.bake("<<for page $in>><<link page>><</for>>").unwrap();
/// let rv = page.render(vec!["about"]).unwrap();
/// assert_eq!(rv, r#"<a href="https://example.com/about">about</a>"#);
/// ```
#[derive(Clone)]
pub struct Mold {
    shared: Arc<MoldShared>,
}

impl Default for Mold {
    fn default() -> Self {
        Mold::new()
    }
}

impl fmt::Debug for Mold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.shared, f)
    }
}

impl Mold {
    /// Creates a mold without bindings and with default settings.
    pub fn new() -> Mold {
        Mold::with_settings(Value::from(()), Settings::default())
    }

    /// Creates a mold with the given bindings.
    ///
    /// The bindings should be a map.  Its keys become free identifiers in all
    /// expressions of the templates baked by this mold.
    pub fn with_bindings<B: Into<Value>>(bindings: B) -> Mold {
        Mold::with_settings(bindings, Settings::default())
    }

    /// Creates a mold with the given bindings and settings.
    pub fn with_settings<B: Into<Value>>(bindings: B, settings: Settings) -> Mold {
        let bindings = bindings.into();
        if bindings.as_map().is_none() && !bindings.is_none() && !bindings.is_undefined() {
            log::warn!("ignoring mold bindings of type {}", bindings.kind());
        }
        Mold {
            shared: Arc::new(MoldShared {
                bindings,
                settings,
                registry: RwLock::new(IndexMap::new()),
            }),
        }
    }

    /// Returns the settings of this mold.
    pub fn settings(&self) -> &Settings {
        &self.shared.settings
    }

    /// Compiles a template into a renderer.
    ///
    /// ```
    /// # use mold::Mold;
    /// let mold = Mold::new();
    /// let renderer = mold.bake("<<if $in>>yes<<else>>no<</if>>").unwrap();
    /// assert_eq!(renderer.render(true).unwrap(), "yes");
    /// ```
    pub fn bake(&self, source: &str) -> Result<Renderer, Error> {
        self._bake(None, source)
    }

    /// Compiles a template and registers it under a name.
    ///
    /// Other templates of this mold can then render it with `<<name arg>>`.
    /// A template or command registered under the same name before is
    /// replaced.
    pub fn bake_named(&self, name: &str, source: &str) -> Result<Renderer, Error> {
        self._bake(Some(name), source)
    }

    /// Compiles a template given as a value.
    ///
    /// This is the entry point for templates coming from dynamic data.  Only
    /// strings are accepted.
    pub fn bake_value(&self, name: Option<&str>, source: &Value) -> Result<Renderer, Error> {
        match source.as_str() {
            Some(source) => self._bake(name, source),
            None => Err(Error::new(
                ErrorKind::TypeError,
                "Mold template must be a string",
            )),
        }
    }

    fn _bake(&self, name: Option<&str>, source: &str) -> Result<Renderer, Error> {
        let compiled = match CompiledTemplate::new(name, source) {
            Ok(compiled) => compiled,
            Err(mut err) => {
                if self.shared.settings.debug {
                    err.attach_debug_source(source);
                }
                return Err(err);
            }
        };
        let template = Arc::new(compiled);
        if let Some(name) = name {
            log::debug!("registering template {name:?}");
            self.shared
                .register(name, Command::Template(template.clone()));
        }
        Ok(Renderer {
            template,
            shared: self.shared.clone(),
        })
    }

    /// Binds an already compiled template to this mold.
    ///
    /// The template is not registered, even if it carries a name.
    pub fn instantiate(&self, template: &CompiledTemplate) -> Renderer {
        Renderer {
            template: Arc::new(template.clone()),
            shared: self.shared.clone(),
        }
    }

    /// Dispatches a registered command.
    ///
    /// Named templates render `arg` and return their output.  Custom commands
    /// return their result converted to a string, where `none` and
    /// `undefined` become the empty string.
    pub fn dispatch<A: Into<Value>>(&self, name: &str, arg: A) -> Result<String, Error> {
        let root = CompiledTemplate::default();
        let rv = ok!(Vm::new(&self.shared).dispatch(&root, name, arg.into()));
        if rv.is_none() || rv.is_undefined() {
            Ok(String::new())
        } else {
            Ok(rv.to_string())
        }
    }

    /// Registers a custom command.
    ///
    /// The command receives the evaluated argument of the directive (or
    /// `none` if the directive has no argument).  Its return value is
    /// appended to the output unescaped, unless it is `none` or `undefined`.
    ///
    /// ```
    /// # use mold::{Mold, Value};
    /// let mold = Mold::new();
    /// mold.define("shout", |_state, arg: Value| {
    ///     Ok(Value::from(arg.to_string().to_uppercase()))
    /// });
    /// let renderer = mold.bake(r#"<<shout "hi">>"#).unwrap();
    /// assert_eq!(renderer.render(()).unwrap(), "HI");
    /// ```
    pub fn define<F>(&self, name: &str, f: F)
    where
        F: Fn(&State, Value) -> Result<Value, Error> + Send + Sync + 'static,
    {
        log::debug!("defining command {name:?}");
        self.shared.register(name, Command::Custom(Arc::new(f)));
    }

    /// Removes a named template or custom command.
    ///
    /// Returns `true` if something was registered under the name.
    pub fn remove(&self, name: &str) -> bool {
        let mut registry = self
            .shared
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        registry.shift_remove(name).is_some()
    }

    /// Returns the names of all registered templates and commands in the
    /// order they were first registered.
    pub fn registered_names(&self) -> Vec<String> {
        let registry = self
            .shared
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        registry.keys().cloned().collect()
    }

    /// Registers the `run`, `event` and `label` commands.
    ///
    /// `run` and `event` defer their argument as a snippet of the same kind,
    /// `label` records a named label.  All of them emit a placeholder and
    /// need a render started with
    /// [`Renderer::render_session`](crate::Renderer::render_session).
    pub fn add_snippet_commands(&self) {
        self.define("run", |state, arg| {
            state.defer("run", arg).map(Value::from)
        });
        self.define("event", |state, arg| {
            state.defer("event", arg).map(Value::from)
        });
        self.define("label", |state, arg| match arg.as_str() {
            Some(name) => state.label(name).map(Value::from),
            None => Err(Error::new(
                ErrorKind::InvalidOperation,
                "label name must be a string",
            )),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_registry_order_and_replace() {
        let mold = Mold::new();
        mold.bake_named("b", "B").unwrap();
        mold.define("a", |_, _| Ok(Value::from("A")));
        mold.bake_named("b", "B2").unwrap();
        assert_eq!(mold.registered_names(), vec!["b".to_string(), "a".to_string()]);
        assert_eq!(mold.dispatch("b", ()).unwrap(), "B2");
        assert!(mold.remove("b"));
        assert!(!mold.remove("b"));
        assert_eq!(mold.registered_names(), vec!["a".to_string()]);
    }

    #[test]
    fn test_recursion_check() {
        let mold = Mold::with_settings(
            (),
            Settings {
                recursion_limit: 2,
                ..Settings::default()
            },
        );
        assert!(mold.shared.check_recursion(2).is_ok());
        let err = mold.shared.check_recursion(3).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    }

    #[test]
    fn test_bindings_must_be_map() {
        let mold = Mold::with_bindings(42);
        assert!(mold.shared.get_binding("x").is_none());
    }
}
