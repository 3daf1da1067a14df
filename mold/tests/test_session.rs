use mold::value::Value;
use mold::{ErrorKind, Mold, RenderSession};

use similar_asserts::assert_eq;

fn snippet_mold() -> Mold {
    let mold = Mold::new();
    mold.add_snippet_commands();
    mold
}

#[test]
fn test_placeholders_and_order() {
    let mold = snippet_mold();
    mold.bake_named("button", "<button><<event $in>></button>").unwrap();
    let r = mold
        .bake("<<run \"init\">><<for x $in>><<button x>><</for>><<label \"end\">>")
        .unwrap();
    let mut session = RenderSession::new();
    let rv = r.render_session(vec!["a", "b"], &mut session).unwrap();
    assert_eq!(
        rv,
        "<span data-mold-snippet=\"0\"></span>\
         <button><span data-mold-snippet=\"1\"></span></button>\
         <button><span data-mold-snippet=\"2\"></span></button>\
         <span data-mold-snippet=\"3\"></span>"
    );

    let kinds: Vec<_> = session.snippets().iter().map(|s| s.kind()).collect();
    assert_eq!(kinds, vec!["run", "event", "event", "label"]);
    let ids: Vec<_> = session.snippets().iter().map(|s| s.id()).collect();
    assert_eq!(ids, vec![0, 1, 2, 3]);
    assert_eq!(session.snippets()[2].payload(), &Value::from("b"));
    assert_eq!(session.label("end").map(|s| s.id()), Some(3));
}

#[test]
fn test_session_accumulates_across_renders() {
    let mold = snippet_mold();
    let r = mold.bake("<<run $in>>").unwrap();
    let mut session = RenderSession::new();
    r.render_session(1, &mut session).unwrap();
    let rv = r.render_session(2, &mut session).unwrap();
    assert_eq!(rv, "<span data-mold-snippet=\"1\"></span>");
    assert_eq!(session.snippets().len(), 2);

    let taken = session.take_snippets();
    assert_eq!(taken.len(), 2);
    let rv = r.render_session(3, &mut session).unwrap();
    assert_eq!(rv, "<span data-mold-snippet=\"0\"></span>");
}

#[test]
fn test_session_survives_failed_render() {
    let mold = snippet_mold();
    let r = mold.bake("<<run 1>><<missing>>").unwrap();
    let mut session = RenderSession::new();
    let err = r.render_session((), &mut session).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownCommand);
    assert_eq!(session.snippets().len(), 1);
}

#[test]
fn test_defer_requires_session() {
    let mold = snippet_mold();
    let r = mold.bake("<<run 1>>").unwrap();
    let err = r.render(()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    assert_eq!(
        err.detail(),
        Some("snippets can only be deferred while rendering with a session")
    );
}

#[test]
fn test_label_needs_string() {
    let mold = snippet_mold();
    let r = mold.bake("<<label 42>>").unwrap();
    let err = r.render_session((), &mut RenderSession::new()).unwrap_err();
    assert_eq!(err.detail(), Some("label name must be a string"));
}

#[test]
fn test_custom_commands_can_defer() {
    let mold = Mold::new();
    mold.define("tooltip", |state, arg| {
        let marker = state.defer("tooltip", arg.clone())?;
        Ok(Value::from(format!("<abbr>{arg}</abbr>{marker}")))
    });
    let r = mold.bake("<<tooltip \"hi\">>").unwrap();
    let mut session = RenderSession::new();
    let rv = r.render_session((), &mut session).unwrap();
    assert_eq!(rv, "<abbr>hi</abbr><span data-mold-snippet=\"0\"></span>");
    assert_eq!(session.snippets()[0].kind(), "tooltip");
}
