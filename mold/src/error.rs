use std::borrow::Cow;
use std::fmt;

/// Represents template errors.
///
/// Errors carry an [`ErrorKind`], an optional detail message and, for
/// everything that can be attributed to a place in a template, the name of
/// the template and the 1-based line number.
///
/// If the [`Mold`](crate::Mold) was created with debug settings, errors also
/// carry the template source which is shown around the failing line when the
/// error is formatted with the alternative formatting (``format!("{:#}", err)``).
///
/// # Example
///
/// ```rust
/// # use mold::Mold;
/// let mold = Mold::new();
/// match mold.bake("<<if x>>never closed") {
///     Ok(_) => unreachable!(),
///     Err(err) => {
///         eprintln!("Could not compile template:");
///         eprintln!("  {:#}", err);
///     }
/// }
/// ```
pub struct Error {
    kind: ErrorKind,
    detail: Option<Cow<'static, str>>,
    name: Option<String>,
    lineno: usize,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
    debug_source: Option<String>,
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut err = f.debug_struct("Error");
        err.field("kind", &self.kind);
        if let Some(ref detail) = self.detail {
            err.field("detail", detail);
        }
        if let Some(ref name) = self.name {
            err.field("name", name);
        }
        if self.lineno > 0 {
            err.field("line", &self.lineno);
        }
        if let Some(ref source) = self.source {
            err.field("source", source);
        }
        err.finish()
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind()
    }
}

impl Eq for Error {}

/// An enum describing the error kind.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A template or expression could not be tokenized or parsed.
    SyntaxError,
    /// A block directive was closed by the wrong closer or never closed.
    NestingError,
    /// A template source was not a string.
    TypeError,
    /// A directive dispatched to a command that is not registered.
    UnknownCommand,
    /// An operation was applied to values it does not support.
    InvalidOperation,
    /// An undefined value was used where the undefined behavior forbids it.
    UndefinedError,
    /// A string literal contained an invalid escape sequence.
    BadEscape,
    /// A value could not be converted from or to its serde representation.
    BadSerialization,
    /// Writing the rendered output failed.
    WriteFailure,
}

impl ErrorKind {
    fn description(self) -> &'static str {
        match self {
            ErrorKind::SyntaxError => "syntax error",
            ErrorKind::NestingError => "unbalanced block",
            ErrorKind::TypeError => "type error",
            ErrorKind::UnknownCommand => "unknown command",
            ErrorKind::InvalidOperation => "invalid operation",
            ErrorKind::UndefinedError => "undefined value",
            ErrorKind::BadEscape => "bad string escape",
            ErrorKind::BadSerialization => "could not convert value",
            ErrorKind::WriteFailure => "failed to write output",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref detail) = self.detail {
            ok!(write!(f, "{}: {}", self.kind, detail));
        } else {
            ok!(write!(f, "{}", self.kind));
        }
        match (self.name.as_deref(), self.line()) {
            (Some(name), Some(line)) => ok!(write!(f, " (at {name}:{line})")),
            (None, Some(line)) => ok!(write!(f, " (at line {line})")),
            _ => {}
        }
        if f.alternate() {
            if let (Some(source), Some(line)) = (self.template_source(), self.line()) {
                ok!(writeln!(f));
                ok!(writeln!(f, "{:-^1$}", " Template Source ", 74));
                let lines: Vec<_> = source.lines().enumerate().collect();
                let idx = (line - 1).min(lines.len().saturating_sub(1));
                let skip = idx.saturating_sub(3);
                for (idx, line) in lines.iter().skip(skip).take(idx - skip) {
                    ok!(writeln!(f, "{:>4} | {}", idx + 1, line));
                }
                if let Some((idx, line)) = lines.get(idx) {
                    ok!(writeln!(f, "{:>4} > {}", idx + 1, line));
                }
                for (idx, line) in lines.iter().skip(idx + 1).take(3) {
                    ok!(writeln!(f, "{:>4} | {}", idx + 1, line));
                }
                ok!(write!(f, "{:-^1$}", "", 74));
            }
        }
        Ok(())
    }
}

impl Error {
    /// Creates a new error with kind and detail.
    pub fn new<D: Into<Cow<'static, str>>>(kind: ErrorKind, detail: D) -> Error {
        Error {
            kind,
            detail: Some(detail.into()),
            name: None,
            lineno: 0,
            source: None,
            debug_source: None,
        }
    }

    pub(crate) fn new_unknown_command(name: &str) -> Error {
        Error::new(
            ErrorKind::UnknownCommand,
            format!("Unrecognised template command: '{name}'."),
        )
    }

    /// Attaches a location unless the error already has one.
    ///
    /// Errors raised by nested renders keep the location of the innermost
    /// template.
    pub(crate) fn set_location(&mut self, name: Option<&str>, lineno: usize) {
        if self.lineno == 0 {
            self.name = name.map(Into::into);
            self.lineno = lineno;
        }
    }

    pub(crate) fn with_location(mut self, name: Option<&str>, lineno: usize) -> Error {
        self.set_location(name, lineno);
        self
    }

    pub(crate) fn attach_debug_source(&mut self, source: &str) {
        if self.debug_source.is_none() && self.lineno > 0 {
            self.debug_source = Some(source.to_string());
        }
    }

    /// Attaches another error as source to this error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error kind
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error detail
    ///
    /// The detail is an error message that provides further details about
    /// the error kind.
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Returns the name of the template the error happened in.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the 1-based line the error happened on.
    pub fn line(&self) -> Option<usize> {
        if self.lineno > 0 {
            Some(self.lineno)
        } else {
            None
        }
    }

    /// Returns the template source if debug information is available.
    ///
    /// The source is only embedded into the error if debug mode is enabled
    /// in the [`Settings`](crate::Settings) of the mold.
    pub fn template_source(&self) -> Option<&str> {
        self.debug_source.as_deref()
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|err| err.as_ref() as _)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error {
            kind,
            detail: None,
            name: None,
            lineno: 0,
            source: None,
            debug_source: None,
        }
    }
}

impl From<fmt::Error> for Error {
    fn from(_: fmt::Error) -> Self {
        Error::new(ErrorKind::WriteFailure, "formatting failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_display_with_location() {
        let err = Error::new(ErrorKind::SyntaxError, "Unclosed template tag")
            .with_location(Some("page"), 3);
        assert_eq!(
            err.to_string(),
            "syntax error: Unclosed template tag (at page:3)"
        );
        let err = Error::new(ErrorKind::SyntaxError, "Unclosed template tag")
            .with_location(None, 2);
        assert_eq!(
            err.to_string(),
            "syntax error: Unclosed template tag (at line 2)"
        );
    }

    #[test]
    fn test_location_is_sticky() {
        let mut err = Error::from(ErrorKind::InvalidOperation).with_location(Some("inner"), 4);
        err.set_location(Some("outer"), 9);
        assert_eq!(err.name(), Some("inner"));
        assert_eq!(err.line(), Some(4));
    }

    #[test]
    fn test_alternate_display_shows_source() {
        let mut err = Error::new(ErrorKind::NestingError, "Unclosed if block in template")
            .with_location(None, 2);
        err.attach_debug_source("first\n<<if x>>\nthird");
        let rendered = format!("{err:#}");
        assert!(rendered.contains("   2 > <<if x>>"));
        assert!(rendered.contains("   1 | first"));
        assert!(rendered.contains("   3 | third"));
    }
}
