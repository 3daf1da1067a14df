use crate::utils::{HtmlEscapeMode, UndefinedBehavior};

#[cfg(feature = "stacker")]
const DEFAULT_RECURSION_LIMIT: usize = 500;
#[cfg(not(feature = "stacker"))]
const DEFAULT_RECURSION_LIMIT: usize = 100;

/// Settings that control how a [`Mold`](crate::Mold) compiles and renders.
///
/// ```
/// # use mold::{Mold, Settings, HtmlEscapeMode, UndefinedBehavior, context};
/// let settings = Settings {
///     html_escape: HtmlEscapeMode::Extended,
///     undefined_behavior: UndefinedBehavior::Strict,
///     ..Settings::default()
/// };
/// let mold = Mold::with_settings(context! {}, settings);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Characters escaped by the `text` directive.
    pub html_escape: HtmlEscapeMode,
    /// How undefined values are treated.
    pub undefined_behavior: UndefinedBehavior,
    /// Keeps template sources around for error reporting.
    ///
    /// When enabled, errors carry the source of the failing template and the
    /// alternative display (`{:#}`) shows the lines around the error.
    pub debug: bool,
    /// How deep renders may dispatch into other renders.
    ///
    /// Defaults to 500, or 100 when the `stacker` feature is disabled.
    pub recursion_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            html_escape: HtmlEscapeMode::default(),
            undefined_behavior: UndefinedBehavior::default(),
            debug: cfg!(debug_assertions),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }
}
