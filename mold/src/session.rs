use indexmap::IndexMap;

use crate::value::Value;

/// A side effect deferred by a command during rendering.
///
/// Snippets are recorded by [`State::defer`](crate::State::defer).  The
/// rendered output contains a placeholder element for every snippet which
/// the code attaching the output to a document uses to find where the
/// snippet belongs.
#[derive(Debug, Clone)]
pub struct Snippet {
    id: usize,
    kind: String,
    payload: Value,
}

impl Snippet {
    /// The id of the snippet, as found in its placeholder.
    pub fn id(&self) -> usize {
        self.id
    }

    /// The kind of snippet (for instance `run` or `event`).
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The value the snippet was deferred with.
    pub fn payload(&self) -> &Value {
        &self.payload
    }
}

/// Collects the snippets deferred while rendering.
///
/// A session is owned by the caller and passed to
/// [`Renderer::render_session`](crate::Renderer::render_session).  Nested
/// renders (named templates dispatched from the template) record into the
/// same session, so snippets appear in output order.
#[derive(Debug, Default)]
pub struct RenderSession {
    snippets: Vec<Snippet>,
    labels: IndexMap<String, usize>,
}

impl RenderSession {
    /// Creates an empty session.
    pub fn new() -> RenderSession {
        RenderSession::default()
    }

    /// Returns the recorded snippets in the order they were deferred.
    pub fn snippets(&self) -> &[Snippet] {
        &self.snippets
    }

    /// Returns the labels and the ids of their snippets.
    pub fn labels(&self) -> &IndexMap<String, usize> {
        &self.labels
    }

    /// Looks up the snippet of a label.
    pub fn label(&self, name: &str) -> Option<&Snippet> {
        self.labels
            .get(name)
            .and_then(|&id| self.snippets.get(id))
    }

    /// Removes all snippets and labels from the session.
    ///
    /// Ids start over at zero afterwards.
    pub fn take_snippets(&mut self) -> Vec<Snippet> {
        self.labels.clear();
        std::mem::take(&mut self.snippets)
    }

    /// Returns `true` if nothing was deferred.
    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }

    /// Returns the placeholder markup for a snippet id.
    pub fn placeholder(id: usize) -> String {
        format!("<span data-mold-snippet=\"{id}\"></span>")
    }

    pub(crate) fn push_snippet(&mut self, kind: &str, payload: Value) -> usize {
        let id = self.snippets.len();
        log::trace!("deferring {kind} snippet {id}");
        self.snippets.push(Snippet {
            id,
            kind: kind.to_string(),
            payload,
        });
        id
    }

    pub(crate) fn add_label(&mut self, name: &str, id: usize) {
        self.labels.insert(name.to_string(), id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_ids_and_labels() {
        let mut session = RenderSession::new();
        assert!(session.is_empty());
        assert_eq!(session.push_snippet("run", Value::from(1)), 0);
        let id = session.push_snippet("label", Value::from("top"));
        session.add_label("top", id);
        assert_eq!(session.label("top").map(|s| s.kind()), Some("label"));
        assert!(session.label("bottom").is_none());
        assert_eq!(RenderSession::placeholder(1), "<span data-mold-snippet=\"1\"></span>");

        let taken = session.take_snippets();
        assert_eq!(taken.len(), 2);
        assert!(session.is_empty());
        assert!(session.labels().is_empty());
        assert_eq!(session.push_snippet("event", Value::from(())), 0);
    }
}
